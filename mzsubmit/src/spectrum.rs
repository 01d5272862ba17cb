//! Rewrite the comment line of MGF spectrum files.
//!
//! The rewrite is purely textual, peak data is never interpreted. All lines except the comment
//! lines are copied byte for byte, including their line terminators.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use context_error::{BoxedError, Context, CreateError};

use crate::SubmitError;

/// The marker of the free text comment line in MGF files
pub const COMMENT_MARKER: &[u8] = b"COM=";

/// Copy all lines from `reader` to `writer`, replacing every line starting with
/// [`COMMENT_MARKER`] with a comment line containing the identifier. Returns the number of
/// replaced lines.
/// # Errors
/// If reading or writing failed.
pub fn rewrite_spectrum(
    reader: impl BufRead,
    writer: impl Write,
    identifier: &str,
) -> std::io::Result<usize> {
    rewrite_lines(reader, writer, identifier).map_err(|(_, e)| e)
}

/// See [`rewrite_spectrum`], errors are tagged with the side that failed.
fn rewrite_lines(
    mut reader: impl BufRead,
    mut writer: impl Write,
    identifier: &str,
) -> Result<usize, (SubmitError, std::io::Error)> {
    let read = |e| (SubmitError::FileNotReadable, e);
    let write = |e| (SubmitError::FileNotWritable, e);
    let mut replaced = 0;
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).map_err(read)? == 0 {
            break;
        }
        if line.starts_with(COMMENT_MARKER) {
            let terminator = line_terminator(&line);
            writer.write_all(COMMENT_MARKER).map_err(write)?;
            writer.write_all(identifier.as_bytes()).map_err(write)?;
            writer.write_all(terminator).map_err(write)?;
            replaced += 1;
        } else {
            writer.write_all(&line).map_err(write)?;
        }
    }
    writer.flush().map_err(write)?;
    Ok(replaced)
}

fn line_terminator(line: &[u8]) -> &[u8] {
    if line.ends_with(b"\r\n") {
        b"\r\n"
    } else if line.ends_with(b"\n") {
        b"\n"
    } else {
        b""
    }
}

/// The filename for a rewritten spectrum file: the identifier with the lowercased extension of
/// the original file.
pub fn spectrum_file_name(original: &Path, identifier: &str) -> String {
    original
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .map_or_else(
            || identifier.to_string(),
            |extension| format!("{identifier}.{extension}"),
        )
}

/// Rewrite the spectrum file at `path` into `output_directory` under the identifier derived
/// filename. Returns the new filename and the number of replaced comment lines.
/// # Errors
/// If the original could not be read or the new file could not be written. A partially written
/// output file is removed again.
pub fn rewrite_spectrum_file(
    path: &Path,
    identifier: &str,
    output_directory: &Path,
) -> Result<(String, usize), BoxedError<'static, SubmitError>> {
    let file_name = spectrum_file_name(path, identifier);
    let output = output_directory.join(&file_name);
    let reader = File::open(path).map(BufReader::new).map_err(|e| {
        BoxedError::new(
            SubmitError::FileNotReadable,
            "Spectrum file could not be read",
            e.to_string(),
            Context::none().source(path.to_string_lossy()).to_owned(),
        )
    })?;
    let writer = File::create(&output).map(BufWriter::new).map_err(|e| {
        BoxedError::new(
            SubmitError::FileNotWritable,
            "Spectrum file could not be created",
            e.to_string(),
            Context::none().source(output.to_string_lossy()).to_owned(),
        )
    })?;
    match rewrite_lines(reader, writer, identifier) {
        Ok(replaced) => Ok((file_name, replaced)),
        Err((kind, e)) => {
            drop(std::fs::remove_file(&output));
            Err(if kind == SubmitError::FileNotReadable {
                BoxedError::new(
                    kind,
                    "Spectrum file could not be read",
                    e.to_string(),
                    Context::none().source(path.to_string_lossy()).to_owned(),
                )
            } else {
                BoxedError::new(
                    kind,
                    "Spectrum file could not be written",
                    e.to_string(),
                    Context::none().source(output.to_string_lossy()).to_owned(),
                )
            })
        }
    }
}

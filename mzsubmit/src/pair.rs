//! Discover bundle members and pair identification files with their spectrum files.

use std::path::{Path, PathBuf};

use context_error::{BoxedError, Context, CreateError};
use walkdir::WalkDir;

use crate::{Settings, SubmitError};

/// The raw identifier of a file: its filename without the extension.
pub fn raw_identifier(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Find the spectrum file belonging to an identification file by its raw identifier.
///
/// A candidate matches if the identifier occurs anywhere in its filename, the caller is
/// expected to only give candidates with the correct extension. Matches are ranked: a filename
/// stem equal to the identifier first, then filenames where the identifier is followed by a
/// character that is not alphanumeric (so `S1` prefers `S1_run.mgf` over `S10_run.mgf`), then
/// any other match. Within a rank the lexicographically smallest path is returned, so the result
/// never depends on the order in which the file system lists the files.
pub fn resolve_by_file_name<'a>(identifier: &str, candidates: &'a [PathBuf]) -> Option<&'a Path> {
    if identifier.is_empty() {
        return None;
    }
    candidates
        .iter()
        .filter_map(|candidate| match_rank(identifier, candidate).map(|rank| (rank, candidate)))
        .min()
        .map(|(_, candidate)| candidate.as_path())
}

/// The rank of a candidate for an identifier, lower is better, `None` if it does not match.
fn match_rank(identifier: &str, candidate: &Path) -> Option<u8> {
    let name = candidate.file_name()?.to_str()?;
    if candidate.file_stem().and_then(|s| s.to_str()) == Some(identifier) {
        return Some(0);
    }
    let mut rank = None;
    for (index, _) in name.match_indices(identifier) {
        let delimited = name[index + identifier.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if delimited {
            return Some(1);
        }
        rank = Some(2);
    }
    rank
}

/// Find the spectrum file referenced by a spectrum location as found in an identification file.
/// Only the final component of the location is used, both `/` and `\` are accepted as separators
/// and a `file:` URI scheme is ignored. If multiple candidates have that filename the one with
/// the lexicographically smallest path is returned.
pub fn resolve_by_reference<'a>(location: &str, candidates: &'a [PathBuf]) -> Option<&'a Path> {
    let name = reference_file_name(location)?;
    candidates
        .iter()
        .filter(|candidate| {
            candidate
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|candidate| candidate == name)
        })
        .min()
        .map(PathBuf::as_path)
}

/// The filename part of a spectrum location.
pub fn reference_file_name(location: &str) -> Option<&str> {
    let location = location.trim();
    let location = location.strip_prefix("file:").unwrap_or(location);
    location
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .filter(|name| !name.is_empty())
}

/// All files in a directory (or its whole subtree when recursive) that satisfy the filter,
/// sorted by path. The `exclude` directory is never entered and symbolic links are not followed,
/// so a link pointing back up the tree cannot make files show up twice.
/// # Errors
/// If the top directory could not be listed. Subdirectories that cannot be listed are ignored.
pub fn list_files(
    directory: &Path,
    recursive: bool,
    exclude: Option<&Path>,
    filter: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, BoxedError<'static, SubmitError>> {
    std::fs::read_dir(directory).map_err(|e| {
        BoxedError::new(
            SubmitError::FileNotReadable,
            "Directory could not be listed",
            e.to_string(),
            Context::none().source(directory.to_string_lossy()).to_owned(),
        )
    })?;
    let exclude = exclude.map(|e| e.canonicalize().unwrap_or_else(|_| e.to_path_buf()));

    let mut files = Vec::new();
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && exclude.as_ref().is_some_and(|exclude| {
                    entry
                        .path()
                        .canonicalize()
                        .is_ok_and(|path| path == *exclude)
                }))
        })
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() && filter(entry.path()) => {
                files.push(entry.into_path());
            }
            Ok(_) => (),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Find all spectrum candidates for the given settings.
/// # Errors
/// If the directory could not be listed.
pub fn spectrum_candidates(
    directory: &Path,
    settings: &Settings,
    recursive: bool,
    exclude: Option<&Path>,
) -> Result<Vec<PathBuf>, BoxedError<'static, SubmitError>> {
    list_files(directory, recursive, exclude, |p| settings.is_spectrum_file(p))
}

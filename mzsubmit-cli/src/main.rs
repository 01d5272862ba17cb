//! Prepare a directory of mzIdentML and MGF files for submission

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use context_error::{BoxedError, Context, CreateError};
use mzsubmit::{
    Batch, PairingStrategy, ReferenceStyle, SanitizePolicy, Settings, SubmitError,
};
use tracing_subscriber::EnvFilter;

/// The command line interface arguments
#[expect(clippy::struct_excessive_bools)]
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// The directory containing the identification and spectrum files
    input: PathBuf,
    /// Also process files in subdirectories
    #[arg(short, long)]
    recursive: bool,
    /// Match the file extensions case sensitively
    #[arg(long)]
    case_sensitive: bool,
    /// What to do with characters that are not allowed in identifiers
    #[arg(long, value_enum, default_value_t = Policy::Delete)]
    policy: Policy,
    /// Allow `-` in identifiers
    #[arg(long)]
    allow_hyphen: bool,
    /// How to find the spectrum file for an identification file
    #[arg(long, value_enum, default_value_t = Pairing::FileName)]
    pairing: Pairing,
    /// What the spectrum reference in the identification file is set to
    #[arg(long, value_enum, default_value_t = Reference::FileName)]
    reference: Reference,
    /// The output directory, defaults to `results` in the input directory
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// A JSON settings file, when given all other settings flags are ignored
    #[arg(short, long)]
    settings: Option<PathBuf>,
    /// Write a JSON report of the run to this path
    #[arg(long)]
    report: Option<PathBuf>,
    /// Only show warnings and errors in the log
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    Delete,
    Replace,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Pairing {
    FileName,
    EmbeddedReference,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Reference {
    FileName,
    OutputPath,
}

impl Cli {
    fn settings(&self) -> Result<Settings, BoxedError<'static, SubmitError>> {
        if let Some(path) = &self.settings {
            let mut settings = Settings::from_json_file(path)?;
            if self.output.is_some() {
                settings.output_directory.clone_from(&self.output);
            }
            return Ok(settings);
        }
        Ok(Settings {
            recursive: self.recursive,
            extension_case_sensitive: self.case_sensitive,
            sanitize_policy: match self.policy {
                Policy::Delete => SanitizePolicy::Delete,
                Policy::Replace => SanitizePolicy::Replace,
            },
            allow_hyphen: self.allow_hyphen,
            pairing: match self.pairing {
                Pairing::FileName => PairingStrategy::FileName,
                Pairing::EmbeddedReference => PairingStrategy::EmbeddedReference,
            },
            spectrum_reference: match self.reference {
                Reference::FileName => ReferenceStyle::FileName,
                Reference::OutputPath => ReferenceStyle::OutputPath,
            },
            output_directory: self.output.clone(),
            ..Settings::default()
        })
    }
}

fn main() -> ExitCode {
    let args = Cli::parse();
    let default_level = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            println!("{error}");
            ExitCode::FAILURE
        }
    }
}

/// Run the batch, returns false if any pair failed.
fn run(args: &Cli) -> Result<bool, BoxedError<'static, SubmitError>> {
    let settings = args.settings()?;
    let summary = Batch::new(&args.input, settings)?.run()?;
    println!("{summary}");

    if let Some(path) = &args.report {
        let report = serde_json::to_string_pretty(&summary.report()).map_err(|e| {
            BoxedError::new(
                SubmitError::FileNotWritable,
                "Report could not be serialised",
                e.to_string(),
                Context::none().source(path.to_string_lossy()).to_owned(),
            )
        })?;
        std::fs::write(path, report).map_err(|e| {
            BoxedError::new(
                SubmitError::FileNotWritable,
                "Report could not be written",
                e.to_string(),
                Context::none().source(path.to_string_lossy()).to_owned(),
            )
        })?;
        tracing::info!(report = %path.display(), "wrote report");
    }
    Ok(summary.failed() == 0)
}

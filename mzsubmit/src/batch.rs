//! Drive the rewriting of a whole bundle directory.

use std::{
    collections::HashMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use context_error::{BoxedError, Context, CreateError, FullErrorContent};
use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    Document, PairingStrategy, Propagation, ReferenceStyle, Sanitizer, Settings, SubmitError,
    pair::{
        list_files, raw_identifier, resolve_by_file_name, resolve_by_reference, spectrum_candidates,
    },
    propagate,
    spectrum::rewrite_spectrum_file,
};

/// A batch run over one input directory.
///
/// Pairs are processed one after the other. The only state shared between pairs is the output
/// directory, which is created once before the first pair, and the set of claimed identifiers
/// that guarantees that no pair overwrites the output of another pair.
#[derive(Debug)]
pub struct Batch {
    input: PathBuf,
    output: PathBuf,
    settings: Settings,
    sanitizer: Sanitizer,
    /// Lowercased identifier to the identification file that claimed it
    claimed: HashMap<String, PathBuf>,
    /// Spectrum file to the first identification file it was paired with
    paired: HashMap<PathBuf, PathBuf>,
}

/// The outcome of a single identification file.
#[derive(Debug)]
pub struct PairOutcome {
    /// The identification file
    pub identification: PathBuf,
    /// The sanitized identifier, if sanitizing succeeded
    pub identifier: Option<String>,
    /// What happened
    pub status: PairStatus,
}

/// What happened with a single identification file.
#[derive(Debug)]
pub enum PairStatus {
    /// Both files were rewritten into the output directory
    Processed {
        /// The spectrum file that was paired
        spectrum: PathBuf,
        /// The rewritten identification file
        identification_output: PathBuf,
        /// The rewritten spectrum file
        spectrum_output: PathBuf,
        /// The changes made to the identification document
        propagation: Propagation,
    },
    /// No spectrum file could be paired, nothing was written
    Skipped(BoxedError<'static, SubmitError>),
    /// Something went wrong, nothing was written
    Failed(BoxedError<'static, SubmitError>),
}

/// The aggregate result of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// The output directory of this run
    pub output_directory: PathBuf,
    /// The outcome per identification file, in processing order
    pub outcomes: Vec<PairOutcome>,
}

impl Batch {
    /// Set up a batch run: check the input directory, validate the settings, and create the
    /// output directory.
    /// # Errors
    /// If the input directory does not exist (no output directory is created in that case), the
    /// settings are invalid, or the output directory could not be created.
    pub fn new(
        input: impl Into<PathBuf>,
        settings: Settings,
    ) -> Result<Self, BoxedError<'static, SubmitError>> {
        let input = input.into();
        if !input.is_dir() {
            return Err(BoxedError::new(
                SubmitError::InputDirectoryMissing,
                "Input directory does not exist",
                "The given input path does not exist or is not a directory",
                Context::none().source(input.to_string_lossy()).to_owned(),
            ));
        }
        let sanitizer = settings.sanitizer()?;
        let output = settings.output_directory_for(&input);
        std::fs::create_dir_all(&output).map_err(|e| {
            BoxedError::new(
                SubmitError::OutputDirectoryNotCreated,
                "Output directory could not be created",
                e.to_string(),
                Context::none().source(output.to_string_lossy()).to_owned(),
            )
        })?;
        info!(input = %input.display(), output = %output.display(), "starting batch");
        Ok(Self {
            input,
            output,
            settings,
            sanitizer,
            claimed: HashMap::new(),
            paired: HashMap::new(),
        })
    }

    /// The output directory of this run
    pub fn output_directory(&self) -> &Path {
        &self.output
    }

    /// Discover all identification files and process them one by one. Problems with a single
    /// pair never stop the batch, they are recorded in the summary.
    /// # Errors
    /// If the input directory could not be listed.
    pub fn run(mut self) -> Result<BatchSummary, BoxedError<'static, SubmitError>> {
        let identification_files = list_files(
            &self.input,
            self.settings.recursive,
            Some(&self.output),
            |p| self.settings.is_identification_file(p),
        )?;
        let spectrum_files = spectrum_candidates(
            &self.input,
            &self.settings,
            self.settings.recursive,
            Some(&self.output),
        )?;
        info!(
            identification_files = identification_files.len(),
            spectrum_files = spectrum_files.len(),
            "discovered bundle members"
        );

        let mut summary = BatchSummary {
            output_directory: self.output.clone(),
            outcomes: Vec::with_capacity(identification_files.len()),
        };
        for identification in identification_files {
            let outcome = self.process(&identification, &spectrum_files);
            match &outcome.status {
                PairStatus::Processed {
                    identification_output,
                    ..
                } => info!(
                    identification = %identification.display(),
                    output = %identification_output.display(),
                    "processed"
                ),
                PairStatus::Skipped(reason) => {
                    warn!(identification = %identification.display(), "skipped: {reason}");
                }
                PairStatus::Failed(reason) => {
                    error!(identification = %identification.display(), "failed: {reason}");
                }
            }
            summary.outcomes.push(outcome);
        }
        info!(
            processed = summary.processed(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "batch complete"
        );
        Ok(summary)
    }

    /// Process a single identification file, catching all errors at this boundary.
    fn process(&mut self, identification: &Path, spectrum_files: &[PathBuf]) -> PairOutcome {
        let mut identifier = None;
        let status = match self.process_inner(identification, spectrum_files, &mut identifier) {
            Ok(status) => status,
            Err(error) if error.get_kind() == SubmitError::MissingSpectrumFile => {
                PairStatus::Skipped(error)
            }
            Err(error) => PairStatus::Failed(error),
        };
        PairOutcome {
            identification: identification.to_path_buf(),
            identifier,
            status,
        }
    }

    fn process_inner(
        &mut self,
        identification: &Path,
        spectrum_files: &[PathBuf],
        identifier: &mut Option<String>,
    ) -> Result<PairStatus, BoxedError<'static, SubmitError>> {
        let raw = raw_identifier(identification).ok_or_else(|| {
            BoxedError::new(
                SubmitError::EmptyIdentifier,
                "Invalid file name",
                "The file name of this identification file is not valid UTF-8 or has no stem",
                Context::none()
                    .source(identification.to_string_lossy())
                    .to_owned(),
            )
        })?;
        let new_identifier = self.sanitizer.sanitize(raw)?;
        *identifier = Some(new_identifier.clone());

        // Spectrum files in the same directory, or for embedded references anywhere in the bundle
        let local_candidates = spectrum_files
            .iter()
            .filter(|s| s.parent() == identification.parent())
            .cloned()
            .collect_vec();

        let (spectrum, mut document) = match self.settings.pairing {
            PairingStrategy::FileName => {
                let spectrum = resolve_by_file_name(raw, &local_candidates)
                    .ok_or_else(|| missing_spectrum(identification, raw))?
                    .to_path_buf();
                (spectrum, Document::load(identification)?)
            }
            PairingStrategy::EmbeddedReference => {
                let document = Document::load(identification)?;
                let candidates = if self.settings.recursive {
                    spectrum_files
                } else {
                    local_candidates.as_slice()
                };
                let spectrum = document
                    .spectrum_locations()
                    .iter()
                    .find_map(|location| resolve_by_reference(location, candidates))
                    .ok_or_else(|| {
                        missing_spectrum(
                            identification,
                            &document.spectrum_locations().join(", "),
                        )
                    })?
                    .to_path_buf();
                (spectrum, document)
            }
        };
        debug!(
            identification = %identification.display(),
            spectrum = %spectrum.display(),
            "paired"
        );
        if let Some(earlier) = self.paired.get(&spectrum) {
            warn!(
                identification = %identification.display(),
                earlier = %earlier.display(),
                spectrum = %spectrum.display(),
                "spectrum file is paired with more than one identification file"
            );
        } else {
            self.paired
                .insert(spectrum.clone(), identification.to_path_buf());
        }

        self.claim(&new_identifier, identification)?;

        let (spectrum_name, comments) =
            rewrite_spectrum_file(&spectrum, &new_identifier, &self.output)?;
        let spectrum_output = self.output.join(&spectrum_name);
        if comments == 0 {
            debug!(spectrum = %spectrum.display(), "no comment line to rewrite");
        }

        let reference = match self.settings.spectrum_reference {
            ReferenceStyle::FileName => spectrum_name,
            ReferenceStyle::OutputPath => spectrum_output.to_string_lossy().to_string(),
        };
        let propagation = propagate(&mut document, raw, &new_identifier, &reference);
        debug!(
            texts = propagation.texts,
            attributes = propagation.attributes,
            spectrum_references = propagation.spectrum_references,
            "propagated identifier"
        );
        if propagation.spectrum_references == 0 {
            warn!(
                identification = %identification.display(),
                "no spectrum reference element found, the document does not link to the spectrum file"
            );
        }

        let identification_output = self.output.join(format!(
            "{new_identifier}.{}",
            self.settings.identification_extension.to_ascii_lowercase()
        ));
        if let Err(error) = document.write_to(&identification_output) {
            drop(std::fs::remove_file(&spectrum_output));
            drop(std::fs::remove_file(&identification_output));
            return Err(error);
        }

        Ok(PairStatus::Processed {
            spectrum,
            identification_output,
            spectrum_output,
            propagation,
        })
    }

    /// Claim an identifier for this identification file.
    fn claim(
        &mut self,
        identifier: &str,
        identification: &Path,
    ) -> Result<(), BoxedError<'static, SubmitError>> {
        let key = identifier.to_ascii_lowercase();
        if let Some(existing) = self.claimed.get(&key) {
            return Err(BoxedError::new(
                SubmitError::IdentifierCollision,
                "Identifier collision",
                format!(
                    "The identifier '{identifier}' is already used for '{}', rename one of the files so that they sanitize to different identifiers",
                    existing.display()
                ),
                Context::none()
                    .source(identification.to_string_lossy())
                    .to_owned(),
            ));
        }
        self.claimed.insert(key, identification.to_path_buf());
        Ok(())
    }
}

fn missing_spectrum(identification: &Path, searched: &str) -> BoxedError<'static, SubmitError> {
    BoxedError::new(
        SubmitError::MissingSpectrumFile,
        "No matching spectrum file",
        format!("No spectrum file matching '{searched}' was found, this identification file is left unprocessed"),
        Context::none()
            .source(identification.to_string_lossy())
            .to_owned(),
    )
}

impl PairStatus {
    /// A short name for the kind of outcome
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Processed { .. } => "processed",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

impl BatchSummary {
    /// The number of pairs that were fully processed
    pub fn processed(&self) -> usize {
        self.count(|s| matches!(s, PairStatus::Processed { .. }))
    }

    /// The number of identification files without a spectrum file
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, PairStatus::Skipped(_)))
    }

    /// The number of pairs that failed
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, PairStatus::Failed(_)))
    }

    fn count(&self, f: impl Fn(&PairStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(&o.status)).count()
    }

    /// A serializable report of this run.
    pub fn report(&self) -> BatchReport {
        BatchReport {
            output_directory: self.output_directory.clone(),
            processed: self.processed(),
            skipped: self.skipped(),
            failed: self.failed(),
            pairs: self
                .outcomes
                .iter()
                .map(|outcome| PairReport {
                    identification: outcome.identification.clone(),
                    identifier: outcome.identifier.clone(),
                    status: outcome.status.label(),
                    spectrum: match &outcome.status {
                        PairStatus::Processed { spectrum, .. } => Some(spectrum.clone()),
                        _ => None,
                    },
                    outputs: match &outcome.status {
                        PairStatus::Processed {
                            identification_output,
                            spectrum_output,
                            ..
                        } => vec![identification_output.clone(), spectrum_output.clone()],
                        _ => Vec::new(),
                    },
                    message: match &outcome.status {
                        PairStatus::Processed { .. } => None,
                        PairStatus::Skipped(e) | PairStatus::Failed(e) => Some(e.to_string()),
                    },
                })
                .collect(),
        }
    }
}

impl Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.status {
                PairStatus::Processed {
                    spectrum,
                    identification_output,
                    spectrum_output,
                    ..
                } => writeln!(
                    f,
                    "processed {} + {} -> {}, {}",
                    outcome.identification.display(),
                    spectrum.display(),
                    identification_output.display(),
                    spectrum_output.display()
                )?,
                PairStatus::Skipped(e) | PairStatus::Failed(e) => writeln!(
                    f,
                    "{} {}\n{e}",
                    outcome.status.label(),
                    outcome.identification.display()
                )?,
            }
        }
        write!(
            f,
            "{} processed, {} skipped, {} failed (output in {})",
            self.processed(),
            self.skipped(),
            self.failed(),
            self.output_directory.display()
        )
    }
}

/// A serializable report of a batch run
#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    /// The output directory
    pub output_directory: PathBuf,
    /// Number of processed pairs
    pub processed: usize,
    /// Number of skipped identification files
    pub skipped: usize,
    /// Number of failed pairs
    pub failed: usize,
    /// Per identification file details
    pub pairs: Vec<PairReport>,
}

/// The report of a single identification file
#[derive(Clone, Debug, Serialize)]
pub struct PairReport {
    /// The identification file
    pub identification: PathBuf,
    /// The sanitized identifier
    pub identifier: Option<String>,
    /// `processed`, `skipped`, or `failed`
    pub status: &'static str,
    /// The paired spectrum file
    pub spectrum: Option<PathBuf>,
    /// The written files
    pub outputs: Vec<PathBuf>,
    /// The reason for skipping or failing
    pub message: Option<String>,
}

//! The explicit configuration of a batch run.

use std::path::{Path, PathBuf};

use context_error::{BoxedError, Context, CreateError};
use serde::{Deserialize, Serialize};

use crate::{SanitizePolicy, Sanitizer, SubmitError, Substitution};

/// How an identification file finds its companion spectrum file.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum PairingStrategy {
    /// The raw identifier of the identification file has to occur in the spectrum filename
    #[default]
    FileName,
    /// The filename referenced by the `SpectraData` element of the identification file
    EmbeddedReference,
}

/// What the rewritten spectrum link in the identification file points to.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ReferenceStyle {
    /// Only the new spectrum filename
    #[default]
    FileName,
    /// The full path of the rewritten spectrum file in the output directory
    OutputPath,
}

/// All settings for a batch run, see [`crate::Batch`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Walk the whole subtree instead of only the top level of the input directory
    pub recursive: bool,
    /// Match the file extensions case sensitively
    pub extension_case_sensitive: bool,
    /// What to do with disallowed characters in identifiers
    pub sanitize_policy: SanitizePolicy,
    /// Allow `-` in identifiers
    pub allow_hyphen: bool,
    /// Known problematic patterns that are rewritten before filtering
    pub substitutions: Vec<Substitution>,
    /// How spectrum files are paired with identification files
    pub pairing: PairingStrategy,
    /// What the spectrum link in the identification file is set to
    pub spectrum_reference: ReferenceStyle,
    /// The output directory, defaults to `results` inside the input directory
    pub output_directory: Option<PathBuf>,
    /// The extension of identification files (without the leading period)
    pub identification_extension: String,
    /// The extension of spectrum files (without the leading period)
    pub spectrum_extension: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recursive: false,
            extension_case_sensitive: false,
            sanitize_policy: SanitizePolicy::default(),
            allow_hyphen: false,
            substitutions: Substitution::known(),
            pairing: PairingStrategy::default(),
            spectrum_reference: ReferenceStyle::default(),
            output_directory: None,
            identification_extension: "mzid".to_string(),
            spectrum_extension: "mgf".to_string(),
        }
    }
}

impl Settings {
    /// Name of the output directory when none is set explicitly.
    pub const DEFAULT_OUTPUT_DIRECTORY: &'static str = "results";

    /// Load settings from a JSON file, missing fields take their default value.
    /// # Errors
    /// If the file could not be read or is not valid JSON for these settings.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BoxedError<'static, SubmitError>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BoxedError::new(
                SubmitError::FileNotReadable,
                "Settings file could not be read",
                e.to_string(),
                Context::none().source(path.to_string_lossy()).to_owned(),
            )
        })?;
        serde_json::from_str(&text).map_err(|e| {
            BoxedError::new(
                SubmitError::InvalidSettings,
                "Invalid settings file",
                e.to_string(),
                Context::none()
                    .source(path.to_string_lossy())
                    .line_index(e.line().saturating_sub(1) as u32)
                    .to_owned(),
            )
        })
    }

    /// Build the sanitizer for these settings.
    /// # Errors
    /// If the substitution table is invalid, see [`Sanitizer::new`].
    pub fn sanitizer(&self) -> Result<Sanitizer, BoxedError<'static, SubmitError>> {
        Sanitizer::new(
            self.sanitize_policy,
            self.allow_hyphen,
            self.substitutions.clone(),
        )
    }

    /// The output directory for a given input directory.
    pub fn output_directory_for(&self, input: &Path) -> PathBuf {
        self.output_directory
            .clone()
            .unwrap_or_else(|| input.join(Self::DEFAULT_OUTPUT_DIRECTORY))
    }

    /// Check if the path has the identification extension.
    pub fn is_identification_file(&self, path: &Path) -> bool {
        self.has_extension(path, &self.identification_extension)
    }

    /// Check if the path has the spectrum extension.
    pub fn is_spectrum_file(&self, path: &Path) -> bool {
        self.has_extension(path, &self.spectrum_extension)
    }

    fn has_extension(&self, path: &Path, extension: &str) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| {
                if self.extension_case_sensitive {
                    e == extension
                } else {
                    e.eq_ignore_ascii_case(extension)
                }
            })
    }
}

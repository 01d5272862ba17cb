//! The [`SubmitError`] which makes it easy for downstream users of the error type to match on the exact error.

use context_error::ErrorKind;
use serde::{Deserialize, Serialize};

/// All kinds of errors that can occur while preparing a submission bundle.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum SubmitError {
    /// The input directory does not exist, fatal for the whole batch
    InputDirectoryMissing,
    /// The output directory could not be created, fatal for the whole batch
    OutputDirectoryNotCreated,
    /// The settings are inconsistent (for example an invalid substitution table)
    InvalidSettings,
    /// Sanitizing a name removed every character
    EmptyIdentifier,
    /// Two identification files in the same batch sanitize to the same identifier
    IdentifierCollision,
    /// No spectrum file could be paired with an identification file
    MissingSpectrumFile,
    /// The identification document is not valid XML, even after repair
    InvalidXml,
    /// A file could not be read
    #[default]
    FileNotReadable,
    /// A file could not be written
    FileNotWritable,
}

impl ErrorKind for SubmitError {
    type Settings = ();
    fn descriptor(&self) -> &'static str {
        match self {
            Self::MissingSpectrumFile => "warning",
            _ => "error",
        }
    }
    fn ignored(&self, _settings: Self::Settings) -> bool {
        false
    }
    fn is_error(&self, _settings: Self::Settings) -> bool {
        !matches!(self, Self::MissingSpectrumFile)
    }
}

impl SubmitError {
    /// Errors of these kinds abort the whole batch instead of a single pair.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::InputDirectoryMissing | Self::OutputDirectoryNotCreated | Self::InvalidSettings
        )
    }
}

//! # Preparing identification bundles for submission
//! This library rewrites a directory of mzIdentML identification files and their MGF spectrum
//! files into a consistent set ready for submission to a proteomics repository. Every pair gets a
//! sanitized identifier which is used for both output filenames, inside the identification
//! document, and in the comment line of the spectrum file.
//!
//! Handles:
//! * Sanitizing identifiers ([`Sanitizer`])
//! * Repairing and parsing raw identification files ([`repair::repair`], [`Document::load`])
//! * Pairing identification files with spectrum files ([`resolve_by_file_name`], [`resolve_by_reference`])
//! * Propagating the new identifier through the document ([`propagate()`])
//! * Rewriting the spectrum file ([`rewrite_spectrum_file`])
//! * Running a whole bundle in one go ([`Batch`])
//!
//! ```no_run
//! let summary = mzsubmit::Batch::new("bundle", mzsubmit::Settings::default())
//!     .and_then(mzsubmit::Batch::run)
//!     .unwrap();
//! println!("{summary}");
//! ```
//!
//! # Features
//! * `coloured-errors` turns on colours in the error messages.

mod batch;
pub mod document;
mod error;
mod pair;
mod propagate;
pub mod repair;
mod sanitize;
mod settings;
mod spectrum;

pub use batch::*;
pub use document::Document;
pub use error::*;
pub use pair::*;
pub use propagate::*;
pub use sanitize::*;
pub use settings::*;
pub use spectrum::*;

//! Derive filename safe identifiers from arbitrary file stems.

use context_error::{BoxedError, Context, CreateError};
use serde::{Deserialize, Serialize};

use crate::SubmitError;

/// What to do with characters outside of the allowed alphabet.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum SanitizePolicy {
    /// Remove every disallowed character
    #[default]
    Delete,
    /// Replace every run of disallowed characters with a single underscore
    Replace,
}

/// A fixed rewrite for a known problematic pattern, applied before the generic filtering.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Substitution {
    /// The exact text to look for
    pub pattern: String,
    /// The text to put in its place
    pub replacement: String,
}

impl Substitution {
    /// Create a new substitution
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// The table of known problematic filename patterns.
    pub fn known() -> Vec<Self> {
        vec![Self::new("(F004051)", "_F004051")]
    }
}

/// Maps filename stems to identifiers that only contain `A-Z a-z 0-9 _ .` (and optionally `-`).
///
/// Sanitizing is pure: the same name always gives the same identifier and sanitizing an
/// identifier again gives back the same identifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sanitizer {
    policy: SanitizePolicy,
    allow_hyphen: bool,
    substitutions: Vec<Substitution>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            policy: SanitizePolicy::Delete,
            allow_hyphen: false,
            substitutions: Substitution::known(),
        }
    }
}

impl Sanitizer {
    /// Create a sanitizer with the given policy and substitution table.
    /// # Errors
    /// If any substitution pattern consists only of allowed characters or if any replacement
    /// contains a disallowed character. Either would make sanitizing not idempotent.
    pub fn new(
        policy: SanitizePolicy,
        allow_hyphen: bool,
        substitutions: Vec<Substitution>,
    ) -> Result<Self, BoxedError<'static, SubmitError>> {
        let sanitizer = Self {
            policy,
            allow_hyphen,
            substitutions: Vec::new(),
        };
        for substitution in &substitutions {
            if substitution.pattern.chars().all(|c| sanitizer.is_allowed(c)) {
                return Err(BoxedError::new(
                    SubmitError::InvalidSettings,
                    "Invalid substitution pattern",
                    "A substitution pattern has to contain at least one character that is not allowed in identifiers",
                    Context::show(substitution.pattern.clone()),
                ));
            }
            if !substitution.replacement.chars().all(|c| sanitizer.is_allowed(c)) {
                return Err(BoxedError::new(
                    SubmitError::InvalidSettings,
                    "Invalid substitution replacement",
                    "A substitution replacement can only contain characters that are allowed in identifiers",
                    Context::show(substitution.replacement.clone()),
                ));
            }
        }
        Ok(Self {
            substitutions,
            ..sanitizer
        })
    }

    /// The policy for disallowed characters
    pub const fn policy(&self) -> SanitizePolicy {
        self.policy
    }

    /// Check if a character is part of the allowed alphabet.
    pub const fn is_allowed(&self, c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '.' || (self.allow_hyphen && c == '-')
    }

    /// Sanitize a filename stem (extension already removed).
    /// # Errors
    /// If no allowed characters are left.
    pub fn sanitize(&self, name: &str) -> Result<String, BoxedError<'static, SubmitError>> {
        let mut name = name.to_string();
        for substitution in &self.substitutions {
            name = name.replace(&substitution.pattern, &substitution.replacement);
        }

        let mut result = String::with_capacity(name.len());
        let mut in_disallowed_run = false;
        for c in name.chars() {
            if self.is_allowed(c) {
                result.push(c);
                in_disallowed_run = false;
            } else if self.policy == SanitizePolicy::Replace && !in_disallowed_run {
                result.push('_');
                in_disallowed_run = true;
            }
        }

        if result.is_empty() {
            Err(BoxedError::new(
                SubmitError::EmptyIdentifier,
                "Empty identifier",
                "Sanitizing this name removed all characters, rename the file so that it contains at least one letter, digit, underscore, or period",
                Context::show(name),
            ))
        } else {
            Ok(result)
        }
    }
}

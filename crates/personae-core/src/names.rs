//! Character name validation.
//!
//! A name is accepted when its length (in `char`s) is within bounds, it
//! matches the configured pattern in full, and no blacklisted word appears
//! in it once every override word has been masked out. Uniqueness is not
//! checked here; that is the identity registry's job.

use regex::Regex;

use crate::config::NamesConfig;

/// Masks override words so their letters cannot complete a blacklisted word.
const OVERRIDE_MASK: char = '\u{0}';

/// Why a name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// The name is shorter than the configured minimum.
    #[error("name must be at least {min} characters long")]
    TooShort {
        /// The configured minimum.
        min: usize,
    },

    /// The name is longer than the configured maximum.
    #[error("name must be at most {max} characters long")]
    TooLong {
        /// The configured maximum.
        max: usize,
    },

    /// The name contains characters the pattern does not allow.
    #[error("name contains characters that are not allowed")]
    BadCharacters,

    /// The name contains a blacklisted word.
    #[error("name contains a blocked word")]
    Blacklisted {
        /// The blacklisted word that matched.
        word: String,
    },
}

/// Compiled name rules.
#[derive(Debug, Clone)]
pub struct NameRules {
    min_length: usize,
    max_length: usize,
    pattern: Regex,
    blacklist: Vec<String>,
    overrides: Vec<String>,
}

impl NameRules {
    /// Compile the rules from configuration.
    ///
    /// The pattern is anchored at both ends, so it must cover the whole
    /// name whether or not the configured text carries `^` and `$`.
    ///
    /// # Errors
    ///
    /// Returns [`regex::Error`] if the configured pattern does not compile.
    pub fn from_config(config: &NamesConfig) -> Result<Self, regex::Error> {
        let lowered = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .map(|word| word.trim().to_lowercase())
                .filter(|word| !word.is_empty())
                .collect()
        };
        Ok(Self {
            min_length: config.min_length,
            max_length: config.max_length,
            pattern: Regex::new(&format!("^(?:{})$", config.pattern))?,
            blacklist: lowered(&config.blacklist),
            overrides: lowered(&config.overrides),
        })
    }

    /// Check `name` against every rule.
    ///
    /// # Errors
    ///
    /// Returns the first [`NameError`] that applies, checking length,
    /// then characters, then the blacklist.
    pub fn validate(&self, name: &str) -> Result<(), NameError> {
        let length = name.chars().count();
        if length < self.min_length {
            return Err(NameError::TooShort {
                min: self.min_length,
            });
        }
        if length > self.max_length {
            return Err(NameError::TooLong {
                max: self.max_length,
            });
        }
        if !self.pattern.is_match(name) {
            return Err(NameError::BadCharacters);
        }
        if let Some(word) = self.blacklisted_word(name) {
            return Err(NameError::Blacklisted {
                word: word.to_owned(),
            });
        }
        Ok(())
    }

    fn blacklisted_word(&self, name: &str) -> Option<&str> {
        let mut masked = name.to_lowercase();
        for word in &self.overrides {
            masked = masked.replace(word.as_str(), &OVERRIDE_MASK.to_string());
        }
        self.blacklist
            .iter()
            .find(|word| masked.contains(word.as_str()))
            .map(String::as_str)
    }
}

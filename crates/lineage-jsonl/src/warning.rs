//! Non-fatal problems met while loading a JSONL file.

use std::fmt;

/// A line that was skipped during a resilient load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A non-empty line did not decode into the expected record shape.
    MalformedJson {
        /// 1-based line number.
        line_number: usize,
        /// Decoder message.
        error: String,
    },
}

impl Warning {
    /// The 1-based line the warning refers to.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineage_jsonl::Warning;
    ///
    /// let warning = Warning::MalformedJson {
    ///     line_number: 42,
    ///     error: "unexpected token".to_string(),
    /// };
    /// assert_eq!(warning.line_number(), 42);
    /// ```
    #[must_use]
    pub fn line_number(&self) -> usize {
        match self {
            Self::MalformedJson { line_number, .. } => *line_number,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedJson { line_number, error } => {
                write!(f, "line {line_number}: malformed JSON: {error}")
            }
        }
    }
}

impl std::error::Error for Warning {}

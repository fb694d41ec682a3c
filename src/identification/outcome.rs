//! Typed identification outcomes.

use serde::Serialize;
use std::fmt;

/// Suggestion shown when the service does not recognise the book and
/// offers no text of its own.
pub const DEFAULT_SUGGESTION: &str = "This may be a book that is not in the catalogue yet";

/// A recognised book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookMatch {
    /// Book title.
    pub title: String,
    /// Similarity between the cover and the catalogue entry, 0-100.
    pub similarity_score: f64,
    /// Link for the book, if the catalogue has one.
    pub url: Option<String>,
    /// Catalogue identifier, used when reporting an incorrect match.
    pub id: Option<i64>,
    /// ISBN, if recorded.
    pub isbn: Option<String>,
    /// Cover rotation the match was found at, in degrees.
    pub rotation_angle: Option<i32>,
    /// Matching method reported by the service.
    pub comparison_method: Option<String>,
    /// Warning attached to an uncertain match.
    pub warning: Option<String>,
}

impl BookMatch {
    /// Creates a match with only the required fields.
    pub fn new(title: impl Into<String>, similarity_score: f64) -> Self {
        Self {
            title: title.into(),
            similarity_score,
            url: None,
            id: None,
            isbn: None,
            rotation_angle: None,
            comparison_method: None,
            warning: None,
        }
    }

    /// Advisory confidence bucket for the score.
    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_score(self.similarity_score)
    }
}

/// Result of one identification call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentificationOutcome {
    /// The cover matched a catalogue entry.
    Success(BookMatch),
    /// The service saw a cover it does not know.
    UnknownBook {
        /// What the user could do next.
        suggestion: String,
    },
    /// The call did not produce a usable answer.
    Failure {
        /// Transport error or server-provided message.
        message: String,
    },
}

impl IdentificationOutcome {
    /// Builds a `Failure`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    /// Builds an `UnknownBook`, falling back to the default suggestion.
    pub fn unknown(suggestion: Option<String>) -> Self {
        let suggestion = suggestion
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUGGESTION.to_string());
        Self::UnknownBook { suggestion }
    }

    /// Tier of a successful match.
    pub fn tier(&self) -> Option<ConfidenceTier> {
        match self {
            Self::Success(book) => Some(book.tier()),
            _ => None,
        }
    }

    /// Returns true for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::UnknownBook { .. } => "unknown_book",
            Self::Failure { .. } => "failure",
        }
    }
}

impl fmt::Display for IdentificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(book) => write!(
                f,
                "{} ({:.1}% similar, {} confidence)",
                book.title,
                book.similarity_score,
                book.tier()
            ),
            Self::UnknownBook { suggestion } => write!(f, "unknown book: {suggestion}"),
            Self::Failure { message } => write!(f, "identification failed: {message}"),
        }
    }
}

/// Advisory confidence bucket. Does not affect control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    /// Below 60.
    Low,
    /// 60 up to (not including) 81.
    Medium,
    /// 81 and above.
    High,
}

impl ConfidenceTier {
    /// Lower bound of the high tier.
    pub const HIGH_THRESHOLD: f64 = 81.0;
    /// Lower bound of the medium tier.
    pub const MEDIUM_THRESHOLD: f64 = 60.0;

    /// Buckets a 0-100 similarity score.
    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            Self::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Text the presenter shows next to a match.
    pub fn advisory(&self) -> &'static str {
        match self {
            Self::High => "Confident match.",
            Self::Medium => "Probable match; please check the title.",
            Self::Low => "Low confidence; this may not be the right book.",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(ConfidenceTier::from_score(81.0), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(80.0), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(80.99), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(60.0), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(59.0), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_score(0.0), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_score(100.0), ConfidenceTier::High);
    }

    #[test]
    fn test_unknown_default_suggestion() {
        assert_eq!(
            IdentificationOutcome::unknown(None),
            IdentificationOutcome::UnknownBook {
                suggestion: DEFAULT_SUGGESTION.to_string()
            }
        );
        assert_eq!(
            IdentificationOutcome::unknown(Some("  ".into())),
            IdentificationOutcome::unknown(None)
        );
    }

    #[test]
    fn test_outcome_display() {
        let outcome = IdentificationOutcome::Success(BookMatch::new("X", 92.0));
        assert_eq!(outcome.tier(), Some(ConfidenceTier::High));
        assert_eq!(outcome.to_string(), "X (92.0% similar, high confidence)");
        assert_eq!(IdentificationOutcome::failure("boom").kind(), "failure");
    }

    proptest! {
        #[test]
        fn prop_tier_monotonic(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ConfidenceTier::from_score(lo) <= ConfidenceTier::from_score(hi));
        }
    }
}

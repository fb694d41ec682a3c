//! Mapping of the service's JSON responses onto typed outcomes.
//!
//! The service answers `{success, book?, message?}`. Only a successful
//! response carrying a titled book with a numeric score, or one flagged
//! `unknown_book`, is accepted; every other shape is a fault that the
//! client turns into `Failure`.

use super::{BookMatch, IdentificationOutcome};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why an identification call produced no usable answer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentificationFault {
    #[error("{0}")]
    TransportFailure(String),

    #[error("identification service returned HTTP {status}")]
    HttpStatus { status: u16, message: Option<String> },

    #[error("{0}")]
    Rejected(String),

    #[error("unrecognised response from identification service: {0}")]
    InvalidOutcomeShape(String),
}

impl IdentificationFault {
    /// Message for the `Failure` outcome: transport text first, then any
    /// server-provided message, then a generic description.
    pub fn message(&self) -> String {
        match self {
            Self::HttpStatus {
                message: Some(message),
                ..
            } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<IdentificationFault> for IdentificationOutcome {
    fn from(fault: IdentificationFault) -> Self {
        IdentificationOutcome::failure(fault.message())
    }
}

/// Maps an HTTP status and body to an outcome.
pub fn map_response(status: u16, body: &str) -> Result<IdentificationOutcome, IdentificationFault> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string);

    if !(200..300).contains(&status) {
        return Err(IdentificationFault::HttpStatus { status, message });
    }

    let value = parsed.ok_or_else(|| {
        IdentificationFault::InvalidOutcomeShape("body is not JSON".to_string())
    })?;
    let success = value
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| IdentificationFault::InvalidOutcomeShape("missing `success`".to_string()))?;

    if !success {
        return Err(IdentificationFault::Rejected(
            message.unwrap_or_else(|| "no matching book was found".to_string()),
        ));
    }

    let book = value
        .get("book")
        .and_then(Value::as_object)
        .ok_or_else(|| IdentificationFault::InvalidOutcomeShape("missing `book`".to_string()))?;

    if book.get("unknown_book").and_then(Value::as_bool) == Some(true) {
        return Ok(IdentificationOutcome::unknown(string_field(book, "suggestion")));
    }

    let title = string_field(book, "title")
        .ok_or_else(|| IdentificationFault::InvalidOutcomeShape("book has no title".to_string()))?;
    let score = book
        .get("similarity_score")
        .or_else(|| book.get("similarityScore"))
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .ok_or_else(|| {
            IdentificationFault::InvalidOutcomeShape("book has no numeric similarity score".to_string())
        })?;

    let warning = if book.get("uncertain_match").and_then(Value::as_bool) == Some(true) {
        string_field(book, "warning")
    } else {
        None
    };

    Ok(IdentificationOutcome::Success(BookMatch {
        title,
        similarity_score: score.clamp(0.0, 100.0),
        url: string_field(book, "url"),
        id: book.get("id").and_then(Value::as_i64),
        isbn: string_field(book, "isbn"),
        rotation_angle: book
            .get("rotation_angle")
            .and_then(Value::as_i64)
            .and_then(|a| i32::try_from(a).ok()),
        comparison_method: string_field(book, "comparison_method"),
        warning,
    }))
}

/// Non-empty string field; the service sends `""` for absent values.
fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identification::{ConfidenceTier, DEFAULT_SUGGESTION};

    #[test]
    fn test_success_with_snake_case_score() {
        let body = r#"{"success": true, "message": "ok", "book": {
            "id": 7, "title": "X", "isbn": "", "url": "https://example.org/x",
            "similarity_score": 92.0, "rotation_angle": 90,
            "comparison_method": "clip"}}"#;

        let outcome = map_response(200, body).unwrap();

        let IdentificationOutcome::Success(book) = outcome else {
            panic!("expected success");
        };
        assert_eq!(book.title, "X");
        assert_eq!(book.similarity_score, 92.0);
        assert_eq!(book.tier(), ConfidenceTier::High);
        assert_eq!(book.url.as_deref(), Some("https://example.org/x"));
        assert_eq!(book.id, Some(7));
        assert_eq!(book.isbn, None);
        assert_eq!(book.rotation_angle, Some(90));
        assert!(book.warning.is_none());
    }

    #[test]
    fn test_success_with_camel_case_score() {
        let body = r#"{"success": true, "book": {"title": "Y", "similarityScore": 61}}"#;
        let outcome = map_response(200, body).unwrap();
        assert_eq!(outcome.tier(), Some(ConfidenceTier::Medium));
    }

    #[test]
    fn test_uncertain_match_carries_warning() {
        let body = r#"{"success": true, "book": {"title": "Z", "similarity_score": 57.5,
            "uncertain_match": true, "warning": "please confirm"}}"#;
        let IdentificationOutcome::Success(book) = map_response(200, body).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(book.warning.as_deref(), Some("please confirm"));
        assert_eq!(book.tier(), ConfidenceTier::Low);
    }

    #[test]
    fn test_unknown_book() {
        let body = r#"{"success": true, "book": {"unknown_book": true,
            "best_match_score": 31.2, "suggestion": "add it"}}"#;
        assert_eq!(
            map_response(200, body).unwrap(),
            IdentificationOutcome::UnknownBook {
                suggestion: "add it".to_string()
            }
        );

        let body = r#"{"success": true, "book": {"unknown_book": true}}"#;
        assert_eq!(
            map_response(200, body).unwrap(),
            IdentificationOutcome::UnknownBook {
                suggestion: DEFAULT_SUGGESTION.to_string()
            }
        );
    }

    #[test]
    fn test_unsuccessful_uses_server_message() {
        let body = r#"{"success": false, "message": "database is empty"}"#;
        let fault = map_response(200, body).unwrap_err();
        assert_eq!(
            IdentificationOutcome::from(fault),
            IdentificationOutcome::failure("database is empty")
        );
    }

    #[test]
    fn test_http_error_status() {
        let fault = map_response(503, r#"{"success": false, "message": "model loading"}"#).unwrap_err();
        assert_eq!(fault.message(), "model loading");

        let fault = map_response(502, "<html>bad gateway</html>").unwrap_err();
        assert_eq!(fault.message(), "identification service returned HTTP 502");
    }

    #[test]
    fn test_unrecognised_shapes() {
        for body in [
            "not json",
            r#"{"book": {"title": "X", "similarity_score": 90}}"#,
            r#"{"success": true}"#,
            r#"{"success": true, "book": {"similarity_score": 90}}"#,
            r#"{"success": true, "book": {"title": "X", "similarity_score": "90"}}"#,
            r#"{"success": "yes", "book": {"title": "X", "similarity_score": 90}}"#,
        ] {
            assert!(
                matches!(
                    map_response(200, body),
                    Err(IdentificationFault::InvalidOutcomeShape(_))
                ),
                "body accepted: {body}"
            );
        }
    }

    #[test]
    fn test_score_clamped() {
        let body = r#"{"success": true, "book": {"title": "X", "similarity_score": 104.2}}"#;
        let IdentificationOutcome::Success(book) = map_response(200, body).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(book.similarity_score, 100.0);
    }
}

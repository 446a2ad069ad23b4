//! Request validation and sanitization
//!
//! Pure functions only: no IO, no shared state. Callers are responsible for
//! discarding any spooled attachment when validation fails (the spool guard
//! in [`crate::attachment`] makes that automatic).
//!
//! Sanitization rules, applied to subject and body before length checks:
//! 1. Trim leading/trailing whitespace.
//! 2. Collapse CR/LF/TAB to a single space (header-injection defense).
//! 3. Strip any remaining control characters.
//! 4. HTML-entity escape `& < > " '`.

use crate::error::{RelayError, Result};
use lettre::Address;

pub const SUBJECT_MIN: usize = 3;
pub const SUBJECT_MAX: usize = 255;
pub const BODY_MIN: usize = 10;
pub const BODY_MAX: usize = 5000;

/// Raw scalar fields as received from the client.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SendFields {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
}

/// A fully validated, sanitized send request.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub sender: Address,
    pub recipient: Address,
    pub subject: String,
    pub body: String,
}

/// Sanitize a free-text field.
pub fn sanitize(input: &str) -> String {
    let mut flattened = String::with_capacity(input.len());
    for c in input.trim().chars() {
        match c {
            '\r' | '\n' | '\t' => flattened.push(' '),
            c if c.is_control() => {}
            c => flattened.push(c),
        }
    }

    let mut escaped = String::with_capacity(flattened.len());
    for c in flattened.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Validate the scalar fields of a send request.
///
/// Checks run in a fixed order and short-circuit on the first failure:
/// sender address, recipient address, subject bounds, body bounds.
pub fn validate(fields: &SendFields) -> Result<SendRequest> {
    let sender = parse_address(fields.from.as_deref(), "from")?;
    let recipient = parse_address(fields.to.as_deref(), "to")?;

    let subject = sanitize(fields.subject.as_deref().unwrap_or(""));
    let subject_len = subject.chars().count();
    if subject_len < SUBJECT_MIN || subject_len > SUBJECT_MAX {
        return Err(RelayError::Validation(format!(
            "subject length {} outside [{}, {}]",
            subject_len, SUBJECT_MIN, SUBJECT_MAX
        )));
    }

    let body = sanitize(fields.text.as_deref().unwrap_or(""));
    let body_len = body.chars().count();
    if body_len < BODY_MIN || body_len > BODY_MAX {
        return Err(RelayError::Validation(format!(
            "body length {} outside [{}, {}]",
            body_len, BODY_MIN, BODY_MAX
        )));
    }

    Ok(SendRequest {
        sender,
        recipient,
        subject,
        body,
    })
}

fn parse_address(value: Option<&str>, field: &str) -> Result<Address> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::Validation(format!("missing required field: {}", field)))?;

    value
        .parse::<Address>()
        .map_err(|_| RelayError::Validation(format!("invalid email address in {}: {}", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(from: &str, to: &str, subject: &str, text: &str) -> SendFields {
        SendFields {
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            subject: Some(subject.to_string()),
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn test_sanitize_collapses_crlf() {
        assert_eq!(sanitize("a\r\nb\tc"), "a  b c");
    }

    #[test]
    fn test_sanitize_strips_control_chars() {
        assert_eq!(sanitize("he\x00llo\x1b"), "hello");
    }

    #[test]
    fn test_sanitize_escapes_entities() {
        assert_eq!(
            sanitize("<script>\"x\" & 'y'</script>"),
            "&lt;script&gt;&quot;x&quot; &amp; &#x27;y&#x27;&lt;/script&gt;"
        );
    }

    #[test]
    fn test_valid_request() {
        let req = validate(&fields("a@x.com", "b@y.com", "Hello there", "1234567890")).unwrap();
        assert_eq!(req.subject, "Hello there");
        assert_eq!(req.body, "1234567890");
        assert_eq!(req.recipient.to_string(), "b@y.com");
    }

    #[test]
    fn test_subject_too_short() {
        // "Hi" is length 2, below the minimum of 3
        let err = validate(&fields("a@x.com", "b@y.com", "Hi", "1234567890")).unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }

    #[test]
    fn test_subject_too_long() {
        let long = "s".repeat(256);
        let err = validate(&fields("a@x.com", "b@y.com", &long, "1234567890")).unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }

    #[test]
    fn test_subject_bounds_apply_post_sanitization() {
        // Raw length 5 but sanitizes down to 2 visible characters
        let err = validate(&fields("a@x.com", "b@y.com", "H\x00\x01\x02i", "1234567890"))
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }

    #[test]
    fn test_body_bounds() {
        assert!(validate(&fields("a@x.com", "b@y.com", "Hello", "short")).is_err());
        let long = "b".repeat(5001);
        assert!(validate(&fields("a@x.com", "b@y.com", "Hello", &long)).is_err());
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(validate(&fields("not-an-email", "b@y.com", "Hello", "1234567890")).is_err());
        assert!(validate(&fields("a@x.com", "b@", "Hello", "1234567890")).is_err());
        let missing = SendFields {
            from: None,
            to: Some("b@y.com".to_string()),
            subject: Some("Hello".to_string()),
            text: Some("1234567890".to_string()),
        };
        assert!(validate(&missing).is_err());
    }

    #[test]
    fn test_addresses_are_trimmed() {
        let req = validate(&fields(" a@x.com ", "b@y.com", "Hello", "1234567890")).unwrap();
        assert_eq!(req.sender.to_string(), "a@x.com");
    }
}

//! Error taxonomy (spec §4.1): a closed set of error kinds with fixed
//! retry semantics, plus the deterministic classifier that assigns a kind
//! to an HTNG error code and message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of error kinds. Retry semantics are fixed per kind, never
/// per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Validation,
    BusinessLogic,
    SoapXml,
    Connection,
    Timeout,
    RateLimit,
    Warning,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl ErrorKind {
    /// Whether the core may automatically retry a failure of this kind.
    pub fn can_retry(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout | Self::RateLimit | Self::Unknown)
    }

    /// Default backoff base delay in seconds. `None` for non-retryable kinds.
    pub fn default_retry_delay_seconds(self) -> Option<u32> {
        match self {
            Self::Connection => Some(30),
            Self::Timeout => Some(60),
            Self::RateLimit => Some(120),
            Self::Unknown => Some(60),
            _ => None,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::Authentication => Severity::Critical,
            Self::Validation | Self::BusinessLogic => Severity::High,
            Self::SoapXml | Self::Connection | Self::Timeout | Self::RateLimit | Self::Unknown => {
                Severity::Medium
            }
            Self::Warning => Severity::Low,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Authentication => "authentication",
            Self::Validation => "validation",
            Self::BusinessLogic => "business_logic",
            Self::SoapXml => "soap_xml",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Warning => "warning",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A classified error value as carried through the core (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub code: Option<String>,
    pub message: String,
    pub severity: Severity,
    pub can_retry: bool,
    pub retry_delay_seconds: Option<u32>,
    /// String rendering of the underlying cause, if any (kept as a plain
    /// string so `CoreError` stays `Serialize` for audit storage).
    pub cause: Option<String>,
}

impl CoreError {
    /// Build a `CoreError` by classifying a raw HTNG error code / message
    /// pair, per the rules in spec §4.1.
    pub fn classify(code: Option<&str>, message: &str) -> Self {
        let kind = classify_kind(code, message);
        Self {
            kind,
            code: code.map(str::to_string),
            message: message.to_string(),
            severity: kind.severity(),
            can_retry: kind.can_retry(),
            retry_delay_seconds: kind.default_retry_delay_seconds(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

/// Pure classification function. MUST be deterministic: first by HTNG code
/// prefix, then by well-known opaque codes, then by case-insensitive
/// substring match on the message, else `unknown`.
pub fn classify_kind(code: Option<&str>, message: &str) -> ErrorKind {
    if let Some(code) = code {
        if let Some(kind) = classify_by_prefix(code) {
            return kind;
        }
        if let Some(kind) = classify_by_known_code(code) {
            return kind;
        }
    }
    classify_by_message(message)
}

fn classify_by_prefix(code: &str) -> Option<ErrorKind> {
    let upper = code.to_uppercase();
    let prefix = |p: &str| upper.starts_with(p);
    if prefix("AUT") {
        Some(ErrorKind::Authentication)
    } else if prefix("VAL") {
        Some(ErrorKind::Validation)
    } else if prefix("SYS") {
        Some(ErrorKind::SoapXml)
    } else if prefix("BUS") {
        Some(ErrorKind::BusinessLogic)
    } else if prefix("CON") {
        Some(ErrorKind::Connection)
    } else if prefix("LIM") {
        Some(ErrorKind::RateLimit)
    } else {
        None
    }
}

fn classify_by_known_code(code: &str) -> Option<ErrorKind> {
    match code.to_uppercase().as_str() {
        "EMPTY_RESPONSE" | "XML_PARSE_ERROR" | "SOAP_FAULT" => Some(ErrorKind::SoapXml),
        _ => None,
    }
}

fn classify_by_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("authentica") || has("credential") || has("access denied") {
        ErrorKind::Authentication
    } else if has("valid") || has("required field") || has("format") {
        ErrorKind::Validation
    } else if has("timeout") {
        ErrorKind::Timeout
    } else if has("connect") {
        ErrorKind::Connection
    } else if has("limit") || has("too many") {
        ErrorKind::RateLimit
    } else if has("xml") || has("soap") || has("parse") {
        ErrorKind::SoapXml
    } else {
        ErrorKind::Unknown
    }
}

/// Exponential backoff from a kind's base delay, capped at 30 minutes
/// (spec §4.6). `retry_count` is the 1-based attempt number about to be
/// scheduled.
pub fn exponential_backoff_seconds(base_seconds: u32, retry_count: u32) -> u32 {
    const CAP_SECONDS: u32 = 1800;
    let exponent = retry_count.saturating_sub(1).min(16);
    let factor = 1u32 << exponent;
    base_seconds.saturating_mul(factor).min(CAP_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pins the classifier against one example per HTNG code prefix plus
    /// the sentinel opaque codes (spec §8, "Error classification is a
    /// function").
    #[test]
    fn classifies_by_code_prefix() {
        let cases = [
            ("AUT001", ErrorKind::Authentication),
            ("VAL042", ErrorKind::Validation),
            ("SYS003", ErrorKind::SoapXml),
            ("BUS010", ErrorKind::BusinessLogic),
            ("CON500", ErrorKind::Connection),
            ("LIM429", ErrorKind::RateLimit),
        ];
        for (code, expected) in cases {
            assert_eq!(classify_kind(Some(code), "irrelevant message"), expected, "code {code}");
        }
    }

    #[test]
    fn classifies_well_known_opaque_codes() {
        for code in ["EMPTY_RESPONSE", "XML_PARSE_ERROR", "SOAP_FAULT"] {
            assert_eq!(classify_kind(Some(code), "whatever"), ErrorKind::SoapXml, "code {code}");
        }
    }

    #[test]
    fn classifies_by_message_substring() {
        let cases = [
            ("Invalid credentials supplied", ErrorKind::Authentication),
            ("Access Denied for this hotel", ErrorKind::Authentication),
            ("Required field RatePlanCode missing", ErrorKind::Validation),
            ("Invalid date format", ErrorKind::Validation),
            ("Connection timeout after 60s", ErrorKind::Timeout),
            ("Unable to connect to endpoint", ErrorKind::Connection),
            ("Rate limit exceeded, too many requests", ErrorKind::RateLimit),
            ("Malformed XML in request body", ErrorKind::SoapXml),
            ("SOAP envelope missing body", ErrorKind::SoapXml),
        ];
        for (msg, expected) in cases {
            assert_eq!(classify_kind(None, msg), expected, "message {msg:?}");
        }
    }

    #[test]
    fn falls_back_to_unknown() {
        assert_eq!(classify_kind(None, "something entirely unrelated happened"), ErrorKind::Unknown);
        assert_eq!(classify_kind(Some("ZZZ999"), "no hints here"), ErrorKind::Unknown);
    }

    #[test]
    fn retry_policy_matches_table() {
        assert!(!ErrorKind::Authentication.can_retry());
        assert!(!ErrorKind::Validation.can_retry());
        assert!(!ErrorKind::BusinessLogic.can_retry());
        assert!(!ErrorKind::SoapXml.can_retry());
        assert!(ErrorKind::Connection.can_retry());
        assert!(ErrorKind::Timeout.can_retry());
        assert!(ErrorKind::RateLimit.can_retry());
        assert!(!ErrorKind::Warning.can_retry());
        assert!(ErrorKind::Unknown.can_retry());

        assert_eq!(ErrorKind::Connection.default_retry_delay_seconds(), Some(30));
        assert_eq!(ErrorKind::Timeout.default_retry_delay_seconds(), Some(60));
        assert_eq!(ErrorKind::RateLimit.default_retry_delay_seconds(), Some(120));
        assert_eq!(ErrorKind::Unknown.default_retry_delay_seconds(), Some(60));
        assert_eq!(ErrorKind::Authentication.default_retry_delay_seconds(), None);
    }

    #[test]
    fn severity_matches_table() {
        assert_eq!(ErrorKind::Authentication.severity(), Severity::Critical);
        assert_eq!(ErrorKind::Validation.severity(), Severity::High);
        assert_eq!(ErrorKind::BusinessLogic.severity(), Severity::High);
        assert_eq!(ErrorKind::SoapXml.severity(), Severity::Medium);
        assert_eq!(ErrorKind::Warning.severity(), Severity::Low);
    }

    #[test]
    fn backoff_doubles_then_caps_at_30_minutes() {
        assert_eq!(exponential_backoff_seconds(60, 1), 60);
        assert_eq!(exponential_backoff_seconds(60, 2), 120);
        assert_eq!(exponential_backoff_seconds(60, 3), 240);
        assert_eq!(exponential_backoff_seconds(60, 10), 1800);
    }

    #[test]
    fn core_error_classify_populates_policy_fields() {
        let err = CoreError::classify(Some("CON500"), "connection reset by peer");
        assert_eq!(err.kind, ErrorKind::Connection);
        assert!(err.can_retry);
        assert_eq!(err.retry_delay_seconds, Some(30));
        assert_eq!(err.severity, Severity::Medium);
    }
}

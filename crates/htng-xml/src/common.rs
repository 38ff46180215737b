//! Shared helpers for the per-kind builders: date-range bounds (spec
//! §4.3), XML escaping, and a small validation-error accumulator.

use chrono::NaiveDate;
use htng_errors::CoreError;

pub fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Accumulates rule violations during a builder's precondition check, then
/// folds them into a single `validation` `CoreError` with a multi-line
/// message, mirroring the business-rule pass in the validation pipeline.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), CoreError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(CoreError::classify(Some("VAL_BUILDER"), &self.0.join("\n")))
        }
    }
}

/// Date-range bounds shared by inventory and restrictions: at most 365
/// days span, at most 730 days ahead of `today`.
pub fn validate_date_range(start: NaiveDate, end: NaiveDate, today: NaiveDate, violations: &mut Violations) {
    if end < start {
        violations.push(format!("date range end {end} precedes start {start}"));
        return;
    }
    let span = (end - start).num_days();
    if span > 365 {
        violations.push(format!("date range span {span} days exceeds 365-day maximum"));
    }
    let ahead = (end - today).num_days();
    if ahead > 730 {
        violations.push(format!("date range extends {ahead} days ahead, exceeds 730-day maximum"));
    }
}

pub fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| CoreError::classify(Some("XML_PARSE_ERROR"), &format!("invalid date {raw:?}: {e}")))
}

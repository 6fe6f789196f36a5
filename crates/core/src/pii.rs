//! PII detection and redaction for transcripts and free text.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
    ApiKey,
}

impl PiiKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Ssn => "ssn",
            Self::CreditCard => "credit_card",
            Self::IpAddress => "ip_address",
            Self::ApiKey => "api_key",
        }
    }

    /// Replacement text, e.g. `[REDACTED_EMAIL]`.
    #[must_use]
    pub const fn placeholder(&self) -> &'static str {
        match *self {
            Self::Email => "[REDACTED_EMAIL]",
            Self::Phone => "[REDACTED_PHONE]",
            Self::Ssn => "[REDACTED_SSN]",
            Self::CreditCard => "[REDACTED_CREDIT_CARD]",
            Self::IpAddress => "[REDACTED_IP_ADDRESS]",
            Self::ApiKey => "[REDACTED_API_KEY]",
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected span. Offsets are byte offsets into the scanned text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PiiMatch {
    pub kind: PiiKind,
    pub start: usize,
    pub end: usize,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Redaction {
    pub text: String,
    pub counts: BTreeMap<PiiKind, usize>,
}

impl Redaction {
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

// Order is precedence: earlier detectors win overlapping spans.
#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static DETECTORS: LazyLock<Vec<(PiiKind, Regex)>> = LazyLock::new(|| {
    [
        (
            PiiKind::ApiKey,
            r"(?i)\b(?:bearer\s+[A-Za-z0-9\-._~+/]{16,}=*|(?:sk|pk|rk)[-_](?:live[-_]|test[-_])?[A-Za-z0-9]{16,}|AKIA[0-9A-Z]{16})",
        ),
        (PiiKind::Email, r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b"),
        (PiiKind::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
        (PiiKind::CreditCard, r"\b(?:\d[ \-]?){12,18}\d\b"),
        (
            PiiKind::IpAddress,
            r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
        ),
        (
            PiiKind::Phone,
            r"(?:\+?1[ .\-]?)?(?:\(\d{3}\)|\b\d{3})[ .\-]?\d{3}[ .\-]\d{4}\b",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).unwrap()))
    .collect()
});

/// Largest text accepted by the scan and redact endpoints.
pub const MAX_SCAN_INPUT_BYTES: usize = 1024 * 1024;

/// Luhn checksum over the digits of `candidate`.
#[must_use]
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Find PII spans, sorted by offset and non-overlapping.
#[must_use]
pub fn scan(text: &str) -> Vec<PiiMatch> {
    // Accepted spans keyed by start offset; never overlapping.
    let mut found: BTreeMap<usize, PiiMatch> = BTreeMap::new();
    for (kind, regex) in DETECTORS.iter() {
        for m in regex.find_iter(text) {
            if *kind == PiiKind::CreditCard && !luhn_valid(m.as_str()) {
                continue;
            }
            let before = found.range(..=m.start()).next_back().is_some_and(|(_, f)| f.end > m.start());
            let inside = found.range(m.start()..m.end()).next().is_some();
            if !before && !inside {
                found.insert(
                    m.start(),
                    PiiMatch { kind: *kind, start: m.start(), end: m.end(), value: m.as_str().to_owned() },
                );
            }
        }
    }
    found.into_values().collect()
}

/// Replace every detected span with its `[REDACTED_<KIND>]` placeholder.
#[must_use]
pub fn redact(text: &str) -> Redaction {
    let matches = scan(text);
    let mut out = String::with_capacity(text.len());
    let mut counts = BTreeMap::new();
    let mut cursor = 0;
    for m in &matches {
        out.push_str(text.get(cursor..m.start).unwrap_or_default());
        out.push_str(m.kind.placeholder());
        *counts.entry(m.kind).or_insert(0) += 1;
        cursor = m.end;
    }
    out.push_str(text.get(cursor..).unwrap_or_default());
    Redaction { text: out, counts }
}

/// Shorthand for log fields.
#[must_use]
pub fn redact_for_log(text: &str) -> String {
    redact(text).text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_email_and_phone() {
        let r = redact("Call me at 555-123-4567 or mail jane.doe@example.com today");
        assert_eq!(r.text, "Call me at [REDACTED_PHONE] or mail [REDACTED_EMAIL] today");
        assert_eq!(r.counts.get(&PiiKind::Phone), Some(&1));
        assert_eq!(r.counts.get(&PiiKind::Email), Some(&1));
        assert_eq!(r.total(), 2);
    }

    #[test]
    fn ssn_is_not_mistaken_for_phone() {
        let matches = scan("ssn 123-45-6789");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].kind, PiiKind::Ssn);
    }

    #[test]
    fn credit_cards_require_luhn() {
        let valid = scan("card 4111 1111 1111 1111 ok");
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].kind, PiiKind::CreditCard);
        let invalid = scan("order 4111 1111 1111 1112 ok");
        assert!(invalid.iter().all(|m| m.kind != PiiKind::CreditCard));
    }

    #[test]
    fn detects_ip_and_bearer_tokens() {
        let r = redact("host 10.0.0.12 auth Bearer abcdefghijklmnopqrstuvwxyz123456");
        assert_eq!(r.text, "host [REDACTED_IP_ADDRESS] auth [REDACTED_API_KEY]");
    }

    #[test]
    fn matches_are_sorted_and_disjoint() {
        let text = "a@b.io 192.168.1.1 sk_live_0123456789abcdef0123 123-45-6789";
        let matches = scan(text);
        assert_eq!(matches.len(), 4);
        for pair in matches.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        assert_eq!(&text[matches[0].start..matches[0].end], "a@b.io");
    }

    #[test]
    fn clean_text_is_unchanged() {
        let r = redact("Build the launch plan by Friday");
        assert_eq!(r.text, "Build the launch plan by Friday");
        assert_eq!(r.total(), 0);
    }

    #[test]
    fn luhn() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("5500-0000-0000-0004"));
        assert!(!luhn_valid("1234567890123"));
        assert!(!luhn_valid("42"));
    }

    #[test]
    fn overlapping_detectors_keep_first_precedence() {
        let matches = scan("from sk-live-abcdefghijklmnop1234@corp.io and a@b.co");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].kind, PiiKind::ApiKey);
        assert_eq!(matches[0].value, "sk-live-abcdefghijklmnop1234");
        assert_eq!(matches[1].kind, PiiKind::Email);
        assert_eq!(matches[1].value, "a@b.co");
    }

    #[test]
    fn scan_scales_to_many_matches() {
        let text = "a@b.co ".repeat(100_000);
        let started = std::time::Instant::now();
        let matches = scan(&text);
        assert_eq!(matches.len(), 100_000);
        assert!(matches.windows(2).all(|w| w[0].end <= w[1].start));
        assert!(started.elapsed() < std::time::Duration::from_secs(30));
    }
}

//! Personally identifiable information detection and redaction.
//!
//! Each detector carries a fixed confidence and sensitivity. Credit card
//! candidates must pass a mod-10 checksum before they are counted at all.
//! Redaction replaces highest-offset detections first so earlier offsets
//! stay valid during in-place replacement.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Severity;

/// Categories of PII the moderator recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiType {
    /// Email address.
    Email,
    /// Phone number in common formats.
    Phone,
    /// Credit card number (checksum-validated).
    CreditCard,
    /// US social security number.
    Ssn,
    /// 12-digit national-id-style number.
    NationalId,
    /// IPv4 address.
    IpAddress,
}

impl PiiType {
    /// Placeholder substituted when a detection of this type is redacted.
    pub fn placeholder(&self) -> &'static str {
        match self {
            PiiType::Email => "[EMAIL-REDACTED]",
            PiiType::Phone => "[PHONE-REDACTED]",
            PiiType::CreditCard => "[CARD-REDACTED]",
            PiiType::Ssn => "[SSN-REDACTED]",
            PiiType::NationalId => "[ID-REDACTED]",
            PiiType::IpAddress => "[IP-REDACTED]",
        }
    }
}

/// One PII finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiDetection {
    /// What was found.
    pub pii_type: PiiType,
    /// Byte offset where the match starts.
    pub start: usize,
    /// Byte offset one past the match end.
    pub end: usize,
    /// Detector confidence (fixed per type).
    pub confidence: f32,
    /// How sensitive a leak of this type is.
    pub sensitivity: Severity,
    /// The replacement text used if this detection is redacted.
    pub redacted_value: String,
}

/// PII detector with precompiled patterns.
pub struct PiiDetector {
    re_email: Regex,
    re_card: Regex,
    re_ssn: Regex,
    re_national_id: Regex,
    re_ip: Regex,
    re_phone: Regex,
}

impl PiiDetector {
    /// Creates a detector.
    pub fn new() -> Self {
        Self {
            re_email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("invalid pii pattern"),
            re_card: Regex::new(r"\b\d(?:[ -]?\d){12,18}\b").expect("invalid pii pattern"),
            re_ssn: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("invalid pii pattern"),
            re_national_id: Regex::new(r"\b\d{12}\b").expect("invalid pii pattern"),
            re_ip: Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("invalid pii pattern"),
            re_phone: Regex::new(r"(?:\+?\d{1,3}[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}")
                .expect("invalid pii pattern"),
        }
    }

    /// Finds all PII, resolving overlaps in favor of the more specific,
    /// earlier-run detector. Detections below the caller's confidence
    /// threshold are still reported; the threshold only gates redaction.
    pub fn detect(&self, text: &str) -> Vec<PiiDetection> {
        let mut detections: Vec<PiiDetection> = Vec::new();

        // Specific detectors first so generic ones (phone, national id)
        // cannot claim their spans.
        for m in self.re_email.find_iter(text) {
            push_non_overlapping(
                &mut detections,
                detection(PiiType::Email, m.start(), m.end(), 0.95, Severity::High),
            );
        }
        for m in self.re_card.find_iter(text) {
            let digits: Vec<u8> = m
                .as_str()
                .chars()
                .filter(|c| c.is_ascii_digit())
                .map(|c| c as u8 - b'0')
                .collect();
            if (13..=19).contains(&digits.len()) && luhn_valid(&digits) {
                push_non_overlapping(
                    &mut detections,
                    detection(
                        PiiType::CreditCard,
                        m.start(),
                        m.end(),
                        0.9,
                        Severity::Critical,
                    ),
                );
            }
        }
        for m in self.re_ssn.find_iter(text) {
            push_non_overlapping(
                &mut detections,
                detection(PiiType::Ssn, m.start(), m.end(), 0.85, Severity::Critical),
            );
        }
        for m in self.re_national_id.find_iter(text) {
            push_non_overlapping(
                &mut detections,
                detection(
                    PiiType::NationalId,
                    m.start(),
                    m.end(),
                    0.6,
                    Severity::High,
                ),
            );
        }
        for m in self.re_ip.find_iter(text) {
            let valid_octets = m
                .as_str()
                .split('.')
                .all(|o| o.parse::<u16>().map(|v| v <= 255).unwrap_or(false));
            if valid_octets {
                push_non_overlapping(
                    &mut detections,
                    detection(
                        PiiType::IpAddress,
                        m.start(),
                        m.end(),
                        0.8,
                        Severity::Medium,
                    ),
                );
            }
        }
        for m in self.re_phone.find_iter(text) {
            push_non_overlapping(
                &mut detections,
                detection(PiiType::Phone, m.start(), m.end(), 0.7, Severity::Medium),
            );
        }

        detections.sort_by_key(|d| d.start);
        detections
    }

    /// Redacts detections at or above `confidence_threshold`, replacing
    /// highest offsets first.
    pub fn redact(
        &self,
        text: &str,
        detections: &[PiiDetection],
        confidence_threshold: f32,
    ) -> String {
        let mut redactable: Vec<&PiiDetection> = detections
            .iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .collect();
        redactable.sort_by(|a, b| b.start.cmp(&a.start));

        let mut out = text.to_string();
        for d in redactable {
            out.replace_range(d.start..d.end, &d.redacted_value);
        }
        out
    }
}

impl Default for PiiDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn detection(
    pii_type: PiiType,
    start: usize,
    end: usize,
    confidence: f32,
    sensitivity: Severity,
) -> PiiDetection {
    PiiDetection {
        pii_type,
        start,
        end,
        confidence,
        sensitivity,
        redacted_value: pii_type.placeholder().to_string(),
    }
}

fn push_non_overlapping(detections: &mut Vec<PiiDetection>, candidate: PiiDetection) {
    let overlaps = detections
        .iter()
        .any(|d| candidate.start < d.end && d.start < candidate.end);
    if !overlaps {
        detections.push(candidate);
    }
}

/// Mod-10 checksum.
fn luhn_valid(digits: &[u8]) -> bool {
    let mut sum = 0u32;
    let mut double = false;
    for &d in digits.iter().rev() {
        let mut value = u32::from(d);
        if double {
            value *= 2;
            if value > 9 {
                value -= 9;
            }
        }
        sum += value;
        double = !double;
    }
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> PiiDetector {
        PiiDetector::new()
    }

    #[test]
    fn detects_email_with_high_confidence() {
        let detections = detector().detect("contact test@example.com for details");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].pii_type, PiiType::Email);
        assert!(detections[0].confidence >= 0.9);
    }

    #[test]
    fn redacts_email() {
        let d = detector();
        let text = "contact test@example.com for details";
        let detections = d.detect(text);
        let redacted = d.redact(text, &detections, 0.5);
        assert!(!redacted.contains("test@example.com"));
        assert_eq!(redacted, "contact [EMAIL-REDACTED] for details");
    }

    #[test]
    fn valid_card_passes_luhn_and_is_detected() {
        let detections = detector().detect("card: 4111 1111 1111 1111 exp 12/26");
        assert!(detections
            .iter()
            .any(|d| d.pii_type == PiiType::CreditCard));
    }

    #[test]
    fn luhn_failures_are_not_counted_as_cards() {
        let detections = detector().detect("order number 1234 5678 9012 3456 shipped");
        assert!(!detections
            .iter()
            .any(|d| d.pii_type == PiiType::CreditCard));
    }

    #[test]
    fn detects_ssn() {
        let detections = detector().detect("ssn 123-45-6789 on file");
        assert!(detections.iter().any(|d| d.pii_type == PiiType::Ssn));
    }

    #[test]
    fn detects_national_id_with_lower_confidence() {
        let detections = detector().detect("id 123456789012 registered");
        let id = detections
            .iter()
            .find(|d| d.pii_type == PiiType::NationalId)
            .unwrap();
        assert!(id.confidence < 0.7);
    }

    #[test]
    fn sub_threshold_detection_is_reported_but_not_redacted() {
        let d = detector();
        let text = "id 123456789012 registered";
        let detections = d.detect(text);
        assert!(!detections.is_empty());
        let redacted = d.redact(text, &detections, 0.7);
        assert!(redacted.contains("123456789012"));
    }

    #[test]
    fn detects_ip_and_rejects_invalid_octets() {
        let d = detector();
        assert!(d
            .detect("server at 192.168.1.1 responded")
            .iter()
            .any(|x| x.pii_type == PiiType::IpAddress));
        assert!(!d
            .detect("version 999.999.999.999 string")
            .iter()
            .any(|x| x.pii_type == PiiType::IpAddress));
    }

    #[test]
    fn detects_phone_formats() {
        let d = detector();
        for text in [
            "call 555-123-4567 today",
            "call (555) 123-4567 today",
            "call +1 555 123 4567 today",
        ] {
            assert!(
                d.detect(text).iter().any(|x| x.pii_type == PiiType::Phone),
                "missed phone in {text:?}"
            );
        }
    }

    #[test]
    fn overlapping_spans_resolve_to_one_detection() {
        // A card number would also look like a phone-ish digit run; only the
        // card detection must survive.
        let detections = detector().detect("4111 1111 1111 1111");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].pii_type, PiiType::CreditCard);
    }

    #[test]
    fn multi_detection_redaction_preserves_surrounding_text() {
        let d = detector();
        let text = "mail test@example.com, ssn 123-45-6789, ip 10.0.0.1 end";
        let detections = d.detect(text);
        assert_eq!(detections.len(), 3);
        let redacted = d.redact(text, &detections, 0.5);
        assert_eq!(
            redacted,
            "mail [EMAIL-REDACTED], ssn [SSN-REDACTED], ip [IP-REDACTED] end"
        );
    }

    #[test]
    fn detections_are_sorted_by_offset() {
        let detections = detector().detect("a 10.0.0.1 then test@example.com");
        let starts: Vec<_> = detections.iter().map(|d| d.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
    }

    #[test]
    fn luhn_checksum_known_values() {
        assert!(luhn_valid(&[4, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1]));
        assert!(!luhn_valid(&[
            1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1, 2, 3, 4, 5, 6
        ]));
    }
}

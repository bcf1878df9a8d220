//! Referral tracking numbers and the confidence heuristic

use carelink_db::Referral;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const TRACKING_PREFIX: &str = "REF-";

const DEFAULT_CONFIDENCE: f64 = 0.85;
const ESCALATED_CONFIDENCE: f64 = 0.95;
const ESCALATION_KEYWORDS: &[&str] = &["severe", "emergency"];

/// Build a tracking number of the form `REF-<unix millis>-<4 digits>`
///
/// Uniqueness is not guaranteed here; the store's unique index is the
/// authority.
pub fn generate_tracking_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().as_u128() % 10_000;
    format!("{}{}-{:04}", TRACKING_PREFIX, now.timestamp_millis(), suffix)
}

/// Check the `REF-<digits>-<digits>` shape
pub fn is_tracking_number(value: &str) -> bool {
    let Some(rest) = value.strip_prefix(TRACKING_PREFIX) else {
        return false;
    };
    let Some((millis, suffix)) = rest.split_once('-') else {
        return false;
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    all_digits(millis) && all_digits(suffix)
}

/// Confidence assigned when a referral arrives without one
pub fn estimate_ai_confidence(referral: &Referral) -> f64 {
    let mentions_escalation = |text: &str| {
        let lower = text.to_lowercase();
        ESCALATION_KEYWORDS.iter().any(|k| lower.contains(k))
    };

    let escalated = referral
        .description
        .as_deref()
        .is_some_and(mentions_escalation)
        || mentions_escalation(&referral.reason);

    if escalated {
        ESCALATED_CONFIDENCE
    } else {
        DEFAULT_CONFIDENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_numbers_match_pattern() {
        let now = Utc::now();
        for _ in 0..50 {
            let tracking = generate_tracking_number(now);
            assert!(is_tracking_number(&tracking), "bad shape: {}", tracking);
            let suffix = tracking.rsplit('-').next().unwrap();
            assert_eq!(suffix.len(), 4);
        }
        assert!(generate_tracking_number(now).contains(&now.timestamp_millis().to_string()));
    }

    #[test]
    fn test_pattern_rejects_malformed() {
        assert!(is_tracking_number("REF-1700000000000-0042"));
        assert!(!is_tracking_number("REF-1700000000000-"));
        assert!(!is_tracking_number("REF--0042"));
        assert!(!is_tracking_number("ref-1-2"));
        assert!(!is_tracking_number("REF-12a-0042"));
        assert!(!is_tracking_number("REF-1-2-3"));
    }

    #[test]
    fn test_confidence_keywords() {
        let plain = Referral::new("P1", "cardiology", "follow-up", "low");
        assert_eq!(estimate_ai_confidence(&plain), 0.85);

        let described = plain.clone().with_description("SEVERE chest pain");
        assert_eq!(estimate_ai_confidence(&described), 0.95);

        let by_reason = Referral::new("P1", "cardiology", "Emergency review", "urgent");
        assert_eq!(estimate_ai_confidence(&by_reason), 0.95);
    }
}

use chrono::{DateTime, Utc};
use rand::{distr::Alphanumeric, Rng};

fn random_suffix(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn stamped(prefix: &str, now: DateTime<Utc>, suffix_len: usize) -> String {
    format!("{}{}{}", prefix, now.format("%Y%m%d%H%M%S"), random_suffix(suffix_len))
}

/// Booking reference: `BK` + UTC timestamp + 6 random characters.
pub fn booking_reference() -> String {
    stamped("BK", Utc::now(), 6)
}

pub fn payment_reference() -> String {
    stamped("PAY", Utc::now(), 8)
}

pub fn wallet_reference(kind: &str) -> String {
    stamped(&format!("WT{}", kind.to_ascii_uppercase()), Utc::now(), 8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn booking_reference_shape() {
        let reference = booking_reference();
        assert!(reference.starts_with("BK"));
        assert_eq!(reference.len(), 2 + 14 + 6);
        assert!(reference[2..16].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn stamped_references_sort_by_time() {
        let earlier = stamped("BK", Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(), 6);
        let later = stamped("BK", Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 1).unwrap(), 6);
        assert!(earlier[..16] < later[..16]);
        assert!(earlier.starts_with("BK20250601100000"));
    }

    #[test]
    fn references_do_not_collide() {
        assert_ne!(payment_reference(), payment_reference());
        assert!(wallet_reference("rf").starts_with("WTRF"));
    }
}

/// Currency utility functions for handling Rupee conversions
///
/// All monetary values in the database are stored in paise (1 Rupee = 100 paise)
/// to avoid floating-point precision issues.

/// Convert Rupees to paise (multiply by 100)
pub fn rupees_to_paise(rupees: f64) -> i64 {
    (rupees * 100.0).round() as i64
}

/// Convert paise to Rupees (divide by 100)
pub fn paise_to_rupees(paise: i64) -> f64 {
    paise as f64 / 100.0
}

/// Validate a client supplied rupee amount and convert it to paise
pub fn positive_rupees_to_paise(rupees: f64) -> Result<i64, String> {
    if !rupees.is_finite() {
        return Err("Invalid amount format".to_string());
    }
    let paise = rupees_to_paise(rupees);
    if paise <= 0 {
        return Err("Amount must be greater than zero".to_string());
    }
    Ok(paise)
}

/// `percentage` of `paise`, rounded down to whole paise.
pub fn percentage_of(paise: i64, percentage: i64) -> i64 {
    paise * percentage.clamp(0, 100) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rupees_to_paise() {
        assert_eq!(rupees_to_paise(100.0), 10000);
        assert_eq!(rupees_to_paise(0.50), 50);
        assert_eq!(rupees_to_paise(123.45), 12345);
    }

    #[test]
    fn test_paise_to_rupees() {
        assert_eq!(paise_to_rupees(10000), 100.0);
        assert_eq!(paise_to_rupees(12345), 123.45);
    }

    #[test]
    fn test_positive_amounts_only() {
        assert_eq!(positive_rupees_to_paise(1000.0), Ok(100000));
        assert!(positive_rupees_to_paise(0.0).is_err());
        assert!(positive_rupees_to_paise(-5.0).is_err());
        assert!(positive_rupees_to_paise(f64::NAN).is_err());
    }

    #[test]
    fn test_percentage_of() {
        assert_eq!(percentage_of(10000, 50), 5000);
        assert_eq!(percentage_of(10001, 50), 5000);
        assert_eq!(percentage_of(10000, 0), 0);
        assert_eq!(percentage_of(10000, 150), 10000);
    }
}

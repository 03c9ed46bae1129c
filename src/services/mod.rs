use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

pub mod availability;
pub mod invoicing;
pub mod payments;
pub mod pricing;
pub mod promotions;
pub mod rental_orders;

/// Human-readable document number: `{prefix}-YYYYMMDD-XXXXXX`. Uniqueness
/// is enforced by the column constraint; the suffix just makes collisions
/// unlikely.
pub(crate) fn document_number(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("{}-{}-{}", prefix, Utc::now().format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_number_has_expected_shape() {
        let number = document_number("RO");
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "RO");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}

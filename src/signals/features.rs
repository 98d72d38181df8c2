use serde::Serialize;

use crate::config::ThresholdConfig;
use crate::core::TransactionCandidate;

/// Intermediate signals derived from a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSet {
    pub amount_to_origin_ratio: f64,
    pub origin_zeroed_out: bool,
    pub origin_was_empty: bool,
    pub is_high_risk_type: bool,
    pub dest_is_new: bool,
}

/// Derive the feature set. Pure; inputs are validated at construction.
pub fn extract_features(tx: &TransactionCandidate, config: &ThresholdConfig) -> FeatureSet {
    let amount = tx.amount();
    FeatureSet {
        // Floor the denominator at 1 so an empty origin doesn't divide by zero.
        amount_to_origin_ratio: amount / tx.origin_balance_before().max(1.0),
        origin_zeroed_out: tx.origin_balance_after() == 0.0 && amount > config.zero_out_min_amount,
        origin_was_empty: tx.origin_balance_before() == 0.0 && amount > 0.0,
        is_high_risk_type: tx.tx_type().is_high_risk(),
        dest_is_new: tx.dest_balance_before() == 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CandidateInput, TransactionType};

    fn candidate(tx_type: TransactionType, amount: f64, origin: f64, dest: f64) -> TransactionCandidate {
        TransactionCandidate::new(
            &CandidateInput {
                step: 1,
                tx_type,
                amount,
                origin_balance_before: origin,
                dest_balance_before: dest,
                allow_overdraft: false,
            },
            &ThresholdConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn normal_payment() {
        let f = extract_features(&candidate(TransactionType::Payment, 5_000.0, 150_000.0, 0.0), &ThresholdConfig::default());
        assert!((f.amount_to_origin_ratio - 0.0333).abs() < 0.001);
        assert!(!f.origin_zeroed_out);
        assert!(!f.origin_was_empty);
        assert!(!f.is_high_risk_type);
        assert!(f.dest_is_new);
    }

    #[test]
    fn empty_origin_guards_division() {
        let f = extract_features(&candidate(TransactionType::CashIn, 500.0, 0.0, 10.0), &ThresholdConfig::default());
        assert_eq!(f.amount_to_origin_ratio, 500.0);
        assert!(f.origin_was_empty);
        assert!(!f.dest_is_new);
    }

    #[test]
    fn zero_amount_from_empty_origin() {
        let f = extract_features(&candidate(TransactionType::Payment, 0.0, 0.0, 0.0), &ThresholdConfig::default());
        assert_eq!(f.amount_to_origin_ratio, 0.0);
        assert!(!f.origin_was_empty);
        assert!(!f.origin_zeroed_out);
    }

    #[test]
    fn zeroed_out_needs_minimum_amount() {
        let cfg = ThresholdConfig::default();
        let small = extract_features(&candidate(TransactionType::Transfer, 10_000.0, 10_000.0, 0.0), &cfg);
        assert!(!small.origin_zeroed_out, "amount must be strictly above the minimum");
        let large = extract_features(&candidate(TransactionType::Transfer, 10_001.0, 10_001.0, 0.0), &cfg);
        assert!(large.origin_zeroed_out);
    }

    #[test]
    fn cash_out_is_high_risk() {
        let f = extract_features(&candidate(TransactionType::CashOut, 1.0, 10.0, 0.0), &ThresholdConfig::default());
        assert!(f.is_high_risk_type);
    }
}

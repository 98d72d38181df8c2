use crate::config::ThresholdConfig;
use crate::core::{Severity, TransactionCandidate, TransactionType};

use super::features::FeatureSet;

/// A heuristic rule. Triggered rules add their weight to the score and
/// contribute their reason to the explanation.
pub trait Rule {
    fn name(&self) -> &str;
    fn weight(&self) -> f64;
    fn reason(&self) -> &'static str;
    fn severity(&self) -> Severity {
        Severity::Warning
    }
    fn triggered(&self, features: &FeatureSet, tx: &TransactionCandidate, config: &ThresholdConfig) -> bool;
}

/// The rule table in priority order. Order matters for both the summation
/// and the reasons list.
pub fn default_rules() -> Vec<Box<dyn Rule + Send + Sync>> {
    vec![
        Box::new(HighRatioRule),
        Box::new(BalanceZeroedRule),
        Box::new(EmptyOriginRule),
        Box::new(LargeHighRiskRule),
        Box::new(LegacyFlagRule),
        Box::new(NewDestinationRule),
    ]
}

/// Always-applied per-type contribution. Carries no reason.
pub fn type_baseline(tx_type: TransactionType) -> f64 {
    match tx_type {
        TransactionType::Transfer => 0.05,
        TransactionType::CashOut => 0.08,
        TransactionType::Payment => 0.02,
        TransactionType::CashIn => 0.03,
        TransactionType::Debit => 0.01,
    }
}

// --- Individual Rules ---

struct HighRatioRule;
impl Rule for HighRatioRule {
    fn name(&self) -> &str { "high_ratio" }
    fn weight(&self) -> f64 { 0.30 }
    fn reason(&self) -> &'static str { "Amount is high compared to origin balance" }
    fn severity(&self) -> Severity { Severity::Danger }
    fn triggered(&self, f: &FeatureSet, _: &TransactionCandidate, _: &ThresholdConfig) -> bool {
        f.amount_to_origin_ratio > 0.9
    }
}

struct BalanceZeroedRule;
impl Rule for BalanceZeroedRule {
    fn name(&self) -> &str { "balance_zeroed" }
    fn weight(&self) -> f64 { 0.20 }
    fn reason(&self) -> &'static str { "Balance becomes zero after transaction" }
    fn severity(&self) -> Severity { Severity::Danger }
    fn triggered(&self, f: &FeatureSet, _: &TransactionCandidate, _: &ThresholdConfig) -> bool {
        f.origin_zeroed_out
    }
}

struct EmptyOriginRule;
impl Rule for EmptyOriginRule {
    fn name(&self) -> &str { "empty_origin" }
    fn weight(&self) -> f64 { 0.15 }
    fn reason(&self) -> &'static str { "Origin balance is zero but amount is non-zero" }
    fn triggered(&self, f: &FeatureSet, _: &TransactionCandidate, _: &ThresholdConfig) -> bool {
        f.origin_was_empty
    }
}

struct LargeHighRiskRule;
impl Rule for LargeHighRiskRule {
    fn name(&self) -> &str { "large_high_risk_type" }
    fn weight(&self) -> f64 { 0.15 }
    fn reason(&self) -> &'static str { "High-risk transaction type with large amount" }
    fn triggered(&self, f: &FeatureSet, tx: &TransactionCandidate, cfg: &ThresholdConfig) -> bool {
        f.is_high_risk_type && tx.amount() > cfg.high_risk_amount
    }
}

/// Inherited from the dataset's own labeling convention.
struct LegacyFlagRule;
impl Rule for LegacyFlagRule {
    fn name(&self) -> &str { "legacy_flag" }
    fn weight(&self) -> f64 { 0.10 }
    fn reason(&self) -> &'static str { "Flagged by legacy rule" }
    fn triggered(&self, _: &FeatureSet, tx: &TransactionCandidate, _: &ThresholdConfig) -> bool {
        tx.legacy_flag()
    }
}

struct NewDestinationRule;
impl Rule for NewDestinationRule {
    fn name(&self) -> &str { "new_destination" }
    fn weight(&self) -> f64 { 0.10 }
    fn reason(&self) -> &'static str { "Large transfer to new/empty destination" }
    fn triggered(&self, f: &FeatureSet, tx: &TransactionCandidate, cfg: &ThresholdConfig) -> bool {
        f.dest_is_new && tx.amount() > cfg.new_dest_large_amount
    }
}

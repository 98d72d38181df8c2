pub mod features;
pub mod rules;
pub mod score;

use crate::config::ThresholdConfig;
use crate::core::{ScoringResult, TransactionCandidate};
use features::extract_features;
use rules::Rule;
use score::{HeuristicScore, ModelOutcome, RuleHit};

/// The signal engine applies the rule table and produces a decision.
pub struct RiskEngine {
    rules: Vec<Box<dyn Rule + Send + Sync>>,
}

impl RiskEngine {
    pub fn new() -> Self {
        Self {
            rules: rules::default_rules(),
        }
    }

    /// Run the rule table. Contributions are summed from 0.0 in table order,
    /// then the type baseline is added.
    pub fn evaluate(&self, tx: &TransactionCandidate, config: &ThresholdConfig) -> HeuristicScore {
        let features = extract_features(tx, config);
        tracing::debug!(?features, "Features extracted");

        let mut total = 0.0;
        let mut hits = Vec::new();
        for rule in &self.rules {
            if rule.triggered(&features, tx, config) {
                let hit = RuleHit {
                    rule_name: rule.name().to_string(),
                    weight: rule.weight(),
                    reason: rule.reason(),
                    severity: rule.severity(),
                };
                total += hit.weight;
                tracing::debug!(rule = %hit.rule_name, weight = hit.weight, "Rule triggered");
                hits.push(hit);
            }
        }
        let baseline = rules::type_baseline(tx.tx_type());
        total += baseline;
        tracing::debug!(
            rules = ?hits.iter().map(|h| h.rule_name.as_str()).collect::<Vec<_>>(),
            baseline,
            total,
            "Rule table evaluated"
        );

        HeuristicScore { score: total, hits }
    }

    /// Score one candidate against one configuration snapshot.
    pub fn score(
        &self,
        tx: &TransactionCandidate,
        config: &ThresholdConfig,
        model: &ModelOutcome,
    ) -> ScoringResult {
        let heuristic = self.evaluate(tx, config);
        let ensembled = score::ensemble(&heuristic, model);
        let decision = score::classify(ensembled.risk_score, config);

        ScoringResult {
            risk_score: ensembled.risk_score,
            heuristic_score: heuristic.score,
            decision,
            reasons: ensembled.reasons,
            risk_factors: ensembled.risk_factors,
            source: ensembled.source,
        }
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience entry point using the default rule table.
pub fn score(tx: &TransactionCandidate, config: &ThresholdConfig, model: &ModelOutcome) -> ScoringResult {
    RiskEngine::new().score(tx, config, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CandidateInput, Decision, ScoreSource, TransactionType};
    use crate::signals::score::{DEFAULT_REASON, DEGRADED_REASON, ModelSignal};

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
    fn scenario_normal_payment() {
        let tx = candidate(TransactionType::Payment, 5_000.0, 150_000.0, 0.0);
        let result = score(&tx, &ThresholdConfig::default(), &ModelOutcome::NotRequested);
        assert!((result.risk_score - 0.02).abs() < 1e-12);
        assert_eq!(result.decision, Decision::Approve);
        assert_eq!(result.reasons, vec![DEFAULT_REASON]);
        assert_eq!(result.source, ScoreSource::Heuristic);
    }

    #[test]
    fn scenario_large_transfer_hits_approve_boundary() {
        // funded destination: only the ratio rule and the baseline apply
        let tx = candidate(TransactionType::Transfer, 140_000.0, 150_000.0, 10_000.0);
        let result = score(&tx, &ThresholdConfig::default(), &ModelOutcome::NotRequested);
        // 0.30 + 0.05 is exactly 0.35 in f64
        assert_eq!(result.risk_score, 0.35);
        assert_eq!(result.risk_score, ThresholdConfig::default().approve_threshold);
        assert_eq!(result.decision, Decision::StepUp);
        assert_eq!(result.reasons, vec!["Amount is high compared to origin balance"]);
    }

    #[test]
    fn large_transfer_to_empty_destination_adds_new_destination_rule() {
        let tx = candidate(TransactionType::Transfer, 140_000.0, 150_000.0, 0.0);
        let result = score(&tx, &ThresholdConfig::default(), &ModelOutcome::NotRequested);
        assert!((result.risk_score - 0.45).abs() < 1e-12);
        assert_eq!(result.decision, Decision::StepUp);
        assert_eq!(
            result.reasons,
            vec![
                "Amount is high compared to origin balance",
                "Large transfer to new/empty destination",
            ]
        );
    }

    #[test]
    fn scenario_known_fraud_pattern_is_step_up() {
        let tx = candidate(TransactionType::Transfer, 50_000.0, 50_000.0, 0.0);
        let result = score(&tx, &ThresholdConfig::default(), &ModelOutcome::NotRequested);
        assert!((result.risk_score - 0.55).abs() < 1e-12);
        assert_eq!(result.decision, Decision::StepUp);
        assert_eq!(
            result.reasons,
            vec![
                "Amount is high compared to origin balance",
                "Balance becomes zero after transaction",
            ]
        );
    }

    #[test]
    fn every_rule_firing_clamps_to_one() {
        let cfg = ThresholdConfig {
            block_insufficient_balance: false,
            ..Default::default()
        };
        let tx = TransactionCandidate::new(
            &CandidateInput {
                step: 1,
                tx_type: TransactionType::Transfer,
                amount: 250_000.0,
                origin_balance_before: 0.0,
                dest_balance_before: 0.0,
                allow_overdraft: false,
            },
            &cfg,
        )
        .unwrap();
        let result = score(&tx, &cfg, &ModelOutcome::NotRequested);
        // rules 1,2,3,4,5,6 + 0.05 baseline
        assert!((result.heuristic_score - 1.05).abs() < 1e-9);
        assert_eq!(result.risk_score, 1.0);
        assert_eq!(result.decision, Decision::Block);
        assert_eq!(result.reasons.len(), 3);
        assert_eq!(result.reasons[0], "Amount is high compared to origin balance");
    }

    #[test]
    fn scoring_is_idempotent() {
        let engine = RiskEngine::new();
        let cfg = ThresholdConfig::default();
        let tx = candidate(TransactionType::CashOut, 25_000.0, 25_000.0, 0.0);
        let a = engine.score(&tx, &cfg, &ModelOutcome::NotRequested);
        let b = engine.score(&tx, &cfg, &ModelOutcome::NotRequested);
        assert_eq!(a, b);
    }

    #[test]
    fn model_overrides_heuristic_score() {
        let tx = candidate(TransactionType::Payment, 5_000.0, 150_000.0, 0.0);
        let model = ModelOutcome::Scored(ModelSignal {
            probability: 0.85,
            risk_factors: vec![],
        });
        let result = score(&tx, &ThresholdConfig::default(), &model);
        assert_eq!(result.risk_score, 0.85);
        assert_eq!(result.decision, Decision::Block);
        assert!((result.heuristic_score - 0.02).abs() < 1e-12);
    }

    #[test]
    fn unavailable_model_uses_heuristic() {
        let tx = candidate(TransactionType::CashOut, 25_000.0, 25_000.0, 0.0);
        let result = score(&tx, &ThresholdConfig::default(), &ModelOutcome::Unavailable);
        assert!((result.risk_score - 0.58).abs() < 1e-12);
        assert_eq!(result.decision, Decision::StepUp);
        assert_eq!(result.reasons[0], DEGRADED_REASON);
        assert_eq!(result.source, ScoreSource::HeuristicFallback);
    }

    #[test]
    fn score_always_in_unit_interval() {
        let cfg = ThresholdConfig {
            block_insufficient_balance: false,
            ..Default::default()
        };
        let engine = RiskEngine::new();
        for tx_type in TransactionType::ALL {
            for amount in [0.0, 1.0, 9_999.0, 50_001.0, 150_001.0, 250_000.0, 1e9] {
                for origin in [0.0, 1.0, 50_000.0, 1e7] {
                    for dest in [0.0, 100.0] {
                        let tx = TransactionCandidate::new(
                            &CandidateInput {
                                step: 1,
                                tx_type,
                                amount,
                                origin_balance_before: origin,
                                dest_balance_before: dest,
                                allow_overdraft: false,
                            },
                            &cfg,
                        )
                        .unwrap();
                        let r = engine.score(&tx, &cfg, &ModelOutcome::NotRequested);
                        assert!((0.0..=1.0).contains(&r.risk_score));
                        assert!(!r.reasons.is_empty() && r.reasons.len() <= 3);
                    }
                }
            }
        }
    }
}

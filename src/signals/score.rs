use crate::config::ThresholdConfig;
use crate::core::{Decision, RiskFactor, ScoreSource, Severity};

pub const DEFAULT_REASON: &str = "Transaction appears normal";
pub const DEGRADED_REASON: &str = "AI model unavailable — using rule-based fallback";
pub const MAX_REASONS: usize = 3;
pub const MAX_RISK_FACTORS: usize = 5;

/// A rule that fired during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub rule_name: String,
    pub weight: f64,
    pub reason: &'static str,
    pub severity: Severity,
}

/// Heuristic pass output: the raw (unclamped) sum and the triggered rules in
/// table order.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicScore {
    pub score: f64,
    pub hits: Vec<RuleHit>,
}

/// Probability and explanation reported by the prediction service.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSignal {
    pub probability: f64,
    pub risk_factors: Vec<RiskFactor>,
}

/// What the caller knows about the external model for this candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    /// No model in play; pure heuristic scoring.
    NotRequested,
    /// The model was asked but timed out, failed, or is not loaded.
    Unavailable,
    Scored(ModelSignal),
}

impl From<Option<ModelSignal>> for ModelOutcome {
    fn from(signal: Option<ModelSignal>) -> Self {
        match signal {
            Some(signal) => ModelOutcome::Scored(signal),
            None => ModelOutcome::NotRequested,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ensembled {
    pub risk_score: f64,
    pub reasons: Vec<String>,
    pub risk_factors: Vec<RiskFactor>,
    pub source: ScoreSource,
}

fn is_valid_probability(p: f64) -> bool {
    p.is_finite() && (0.0..=1.0).contains(&p)
}

/// Append factors skipping any whose text is already present.
fn push_unique(into: &mut Vec<RiskFactor>, factors: impl IntoIterator<Item = RiskFactor>) {
    for factor in factors {
        if !into.iter().any(|f| f.factor == factor.factor) {
            into.push(factor);
        }
    }
}

/// Merge the heuristic result with the model outcome into the final score
/// and explanation lists.
pub fn ensemble(heuristic: &HeuristicScore, model: &ModelOutcome) -> Ensembled {
    let heuristic_factors = heuristic
        .hits
        .iter()
        .map(|hit| RiskFactor::new(hit.reason, hit.severity));

    let (risk_score, mut factors, source) = match model {
        ModelOutcome::Scored(signal) if is_valid_probability(signal.probability) => {
            let mut factors = Vec::new();
            push_unique(&mut factors, signal.risk_factors.iter().cloned());
            push_unique(&mut factors, heuristic_factors);
            (signal.probability, factors, ScoreSource::Model)
        }
        ModelOutcome::NotRequested => (
            heuristic.score.clamp(0.0, 1.0),
            heuristic_factors.collect(),
            ScoreSource::Heuristic,
        ),
        // Unavailable, or a probability that is NaN / out of range.
        _ => {
            let mut factors = vec![RiskFactor::new(DEGRADED_REASON, Severity::Warning)];
            push_unique(&mut factors, heuristic_factors);
            (heuristic.score.clamp(0.0, 1.0), factors, ScoreSource::HeuristicFallback)
        }
    };

    let only_degraded = factors.len() == 1 && factors[0].factor == DEGRADED_REASON;
    if factors.is_empty() || only_degraded {
        factors.push(RiskFactor::new(DEFAULT_REASON, Severity::Info));
    }
    factors.truncate(MAX_RISK_FACTORS);

    let reasons = factors
        .iter()
        .take(MAX_REASONS)
        .map(|f| f.factor.clone())
        .collect();

    Ensembled {
        risk_score,
        reasons,
        risk_factors: factors,
        source,
    }
}

/// Map a final score onto a decision. Boundaries fall into the riskier
/// bucket: `score == approve` is STEP_UP, `score == block` is BLOCK.
pub fn classify(score: f64, config: &ThresholdConfig) -> Decision {
    if score < config.approve_threshold {
        Decision::Approve
    } else if score >= config.block_threshold {
        Decision::Block
    } else {
        Decision::StepUp
    }
}

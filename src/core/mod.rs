pub mod candidate;
pub mod pipeline;
pub mod presets;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use candidate::{CandidateError, CandidateInput, TransactionCandidate};

/// PaySim transaction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum TransactionType {
    Payment,
    Transfer,
    CashOut,
    CashIn,
    Debit,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::Payment,
        TransactionType::Transfer,
        TransactionType::CashOut,
        TransactionType::CashIn,
        TransactionType::Debit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Payment => "PAYMENT",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::CashOut => "CASH_OUT",
            TransactionType::CashIn => "CASH_IN",
            TransactionType::Debit => "DEBIT",
        }
    }

    /// TRANSFER and CASH_OUT are the only types fraud shows up in.
    pub fn is_high_risk(&self) -> bool {
        matches!(self, TransactionType::Transfer | TransactionType::CashOut)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for TransactionType {
    type Error = CandidateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for TransactionType {
    type Err = CandidateError;

    /// Accepts `CASH_OUT`, `CASH OUT`, `cash-out` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| CandidateError::UnknownType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    StepUp,
    Block,
    #[serde(rename = "APPROVE_AFTER_STEPUP")]
    ApproveAfterStepUp,
    #[serde(rename = "BLOCK_STEPUP_FAILED")]
    BlockStepUpFailed,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::StepUp => "STEP_UP",
            Decision::Block => "BLOCK",
            Decision::ApproveAfterStepUp => "APPROVE_AFTER_STEPUP",
            Decision::BlockStepUpFailed => "BLOCK_STEPUP_FAILED",
        }
    }

    /// Whether money moves under this decision.
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approve | Decision::ApproveAfterStepUp)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Decision::StepUp)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "APPROVE" => Ok(Decision::Approve),
            "STEP_UP" => Ok(Decision::StepUp),
            "BLOCK" => Ok(Decision::Block),
            "APPROVE_AFTER_STEPUP" => Ok(Decision::ApproveAfterStepUp),
            "BLOCK_STEPUP_FAILED" => Ok(Decision::BlockStepUpFailed),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Danger,
}

/// One explanation entry, in the shape the prediction service reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub severity: Severity,
}

impl RiskFactor {
    pub fn new(factor: impl Into<String>, severity: Severity) -> Self {
        Self {
            factor: factor.into(),
            severity,
        }
    }
}

/// Where the final risk score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Heuristic,
    Model,
    HeuristicFallback,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Heuristic => "heuristic",
            ScoreSource::Model => "model",
            ScoreSource::HeuristicFallback => "heuristic_fallback",
        }
    }
}

impl FromStr for ScoreSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heuristic" => Ok(ScoreSource::Heuristic),
            "model" => Ok(ScoreSource::Model),
            "heuristic_fallback" => Ok(ScoreSource::HeuristicFallback),
            other => Err(format!("unknown score source: {other}")),
        }
    }
}

/// Output of one scoring call. Never recomputed once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResult {
    pub risk_score: f64, // 0-1
    pub heuristic_score: f64,
    pub decision: Decision,
    pub reasons: Vec<String>,
    pub risk_factors: Vec<RiskFactor>,
    pub source: ScoreSource,
}

/// Human-assigned label applied after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroundTruth {
    Fraud,
    Legitimate,
}

impl GroundTruth {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroundTruth::Fraud => "FRAUD",
            GroundTruth::Legitimate => "LEGITIMATE",
        }
    }
}

impl FromStr for GroundTruth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FRAUD" => Ok(GroundTruth::Fraud),
            "LEGITIMATE" | "LEGIT" => Ok(GroundTruth::Legitimate),
            other => Err(format!("unknown label: {other}")),
        }
    }
}

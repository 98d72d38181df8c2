use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::TransactionType;
use crate::config::ThresholdConfig;

/// Raw fields a caller submits. Derived balances are never accepted from
/// outside; they are computed in [`TransactionCandidate::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateInput {
    pub step: u32,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: f64,
    pub origin_balance_before: f64,
    pub dest_balance_before: f64,
    /// Explicit override for the insufficient-balance check.
    #[serde(default)]
    pub allow_overdraft: bool,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CandidateError {
    #[error("step must be >= 1, got {0}")]
    InvalidStep(u32),

    #[error("unknown transaction type: {0}")]
    UnknownType(String),

    #[error("{field} must be a finite non-negative number, got {value}")]
    InvalidNumber { field: &'static str, value: f64 },

    #[error("insufficient balance: amount {amount} exceeds origin balance {balance}")]
    InsufficientBalance { amount: f64, balance: f64 },
}

/// A transaction proposed for scoring. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCandidate {
    step: u32,
    #[serde(rename = "type")]
    tx_type: TransactionType,
    amount: f64,
    origin_balance_before: f64,
    origin_balance_after: f64,
    dest_balance_before: f64,
    dest_balance_after: f64,
    legacy_flag: bool,
}

impl TransactionCandidate {
    /// Validate the raw input and derive the post-transaction balances.
    pub fn new(input: &CandidateInput, config: &ThresholdConfig) -> Result<Self, CandidateError> {
        if input.step < 1 {
            return Err(CandidateError::InvalidStep(input.step));
        }
        for (field, value) in [
            ("amount", input.amount),
            ("origin_balance_before", input.origin_balance_before),
            ("dest_balance_before", input.dest_balance_before),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CandidateError::InvalidNumber { field, value });
            }
        }
        if config.block_insufficient_balance
            && !input.allow_overdraft
            && input.tx_type != TransactionType::CashIn
            && input.amount > input.origin_balance_before
        {
            return Err(CandidateError::InsufficientBalance {
                amount: input.amount,
                balance: input.origin_balance_before,
            });
        }

        let origin_balance_after = match input.tx_type {
            TransactionType::CashIn => input.origin_balance_before + input.amount,
            _ => (input.origin_balance_before - input.amount).max(0.0),
        };
        // Cash agent float is not modeled: CASH_OUT leaves the destination alone.
        let dest_balance_after = match input.tx_type {
            TransactionType::CashOut => input.dest_balance_before,
            _ => input.dest_balance_before + input.amount,
        };
        let legacy_flag =
            input.tx_type == TransactionType::Transfer && input.amount >= config.flag_threshold_amount;

        Ok(Self {
            step: input.step,
            tx_type: input.tx_type,
            amount: input.amount,
            origin_balance_before: input.origin_balance_before,
            origin_balance_after,
            dest_balance_before: input.dest_balance_before,
            dest_balance_after,
            legacy_flag,
        })
    }

    /// Rebuild a candidate exactly as it was stored.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_stored(
        step: u32,
        tx_type: TransactionType,
        amount: f64,
        origin_balance_before: f64,
        origin_balance_after: f64,
        dest_balance_before: f64,
        dest_balance_after: f64,
        legacy_flag: bool,
    ) -> Self {
        Self {
            step,
            tx_type,
            amount,
            origin_balance_before,
            origin_balance_after,
            dest_balance_before,
            dest_balance_after,
            legacy_flag,
        }
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Simulated day, 1-based (24 steps per day).
    pub fn day(&self) -> u32 {
        self.step.div_ceil(24)
    }

    pub fn tx_type(&self) -> TransactionType {
        self.tx_type
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn origin_balance_before(&self) -> f64 {
        self.origin_balance_before
    }

    pub fn origin_balance_after(&self) -> f64 {
        self.origin_balance_after
    }

    pub fn dest_balance_before(&self) -> f64 {
        self.dest_balance_before
    }

    pub fn dest_balance_after(&self) -> f64 {
        self.dest_balance_after
    }

    pub fn legacy_flag(&self) -> bool {
        self.legacy_flag
    }
}

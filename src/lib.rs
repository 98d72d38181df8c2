//! Risk scoring and decisioning for simulated payment transactions.
//!
//! Six weighted rules plus a per-type baseline produce a heuristic score; an
//! optional external model probability overrides it. The score maps onto
//! APPROVE / STEP_UP / BLOCK, and STEP_UP resolves through a one-time code.

pub mod config;
pub mod core;
pub mod db;
pub mod rpc;
pub mod signals;
pub mod stepup;

pub use crate::config::{Config, SharedThresholds, ThresholdConfig};
pub use crate::core::pipeline::{ScoringPipeline, Submission};
pub use crate::core::{CandidateInput, Decision, ScoringResult, TransactionCandidate, TransactionType};
pub use crate::signals::RiskEngine;

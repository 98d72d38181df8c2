use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, SharedThresholds, ThresholdConfig, ThresholdError};
use crate::core::{
    CandidateError, CandidateInput, Decision, GroundTruth, ScoringResult, TransactionCandidate,
};
use crate::db::{DbError, RecordUpdate, TransactionRecord, TransactionRepository};
use crate::rpc::PredictionClient;
use crate::signals::RiskEngine;
use crate::signals::score::ModelOutcome;
use crate::stepup::{self, StepUpChallenge, StepUpError, StepUpPolicy, VerificationOutcome};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid transaction: {0}")]
    Candidate(#[from] CandidateError),

    #[error("invalid thresholds: {0}")]
    Thresholds(#[from] ThresholdError),

    #[error(transparent)]
    StepUp(#[from] StepUpError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("no transaction with id {0}")]
    NotFound(i64),
}

/// A scored and persisted submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: i64,
    pub candidate: TransactionCandidate,
    pub result: ScoringResult,
}

/// Counts over the transaction log, split by current decision and by label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionSummary {
    pub total: usize,
    pub approved: usize,
    pub pending_step_up: usize,
    pub blocked: usize,
    pub approved_after_step_up: usize,
    pub step_up_failed: usize,
    pub labeled: usize,
    /// Labeled fraud the engine did not approve outright.
    pub fraud_caught: usize,
    /// Labeled fraud the engine approved outright.
    pub fraud_missed: usize,
    /// Labeled legitimate the engine challenged or blocked.
    pub false_alarms: usize,
}

impl DecisionSummary {
    pub fn from_records(records: &[TransactionRecord]) -> Self {
        let mut s = Self {
            total: records.len(),
            ..Default::default()
        };
        for r in records {
            match r.decision {
                Decision::Approve => s.approved += 1,
                Decision::StepUp => s.pending_step_up += 1,
                Decision::Block => s.blocked += 1,
                Decision::ApproveAfterStepUp => s.approved_after_step_up += 1,
                Decision::BlockStepUpFailed => s.step_up_failed += 1,
            }
            let flagged = r.result.decision != Decision::Approve;
            match r.ground_truth {
                Some(GroundTruth::Fraud) if flagged => s.fraud_caught += 1,
                Some(GroundTruth::Fraud) => s.fraud_missed += 1,
                Some(GroundTruth::Legitimate) if flagged => s.false_alarms += 1,
                _ => {}
            }
            if r.ground_truth.is_some() {
                s.labeled += 1;
            }
        }
        s
    }
}

/// Application service: validate, score, persist, and follow up on records.
pub struct ScoringPipeline<R> {
    engine: RiskEngine,
    thresholds: SharedThresholds,
    model: Option<PredictionClient>,
    step_up: StepUpPolicy,
    repo: R,
}

impl<R: TransactionRepository> ScoringPipeline<R> {
    pub fn new(
        repo: R,
        thresholds: SharedThresholds,
        model: Option<PredictionClient>,
        step_up: StepUpPolicy,
    ) -> Self {
        Self {
            engine: RiskEngine::new(),
            thresholds,
            model,
            step_up,
            repo,
        }
    }

    /// Wire a pipeline from file config. Thresholds saved through the
    /// settings surface take precedence over the file.
    pub fn from_config(config: &Config, repo: R) -> Result<Self, PipelineError> {
        let thresholds = match repo.load_thresholds()? {
            Some(saved) if saved.validate().is_ok() => {
                info!("Using thresholds saved in the database");
                saved
            }
            Some(_) => {
                warn!("Saved thresholds are invalid, using configured ones");
                config.engine.clone()
            }
            None => config.engine.clone(),
        };
        let thresholds = SharedThresholds::new(thresholds)?;

        let model = if config.model.enabled {
            match PredictionClient::from_config(&config.model) {
                Ok(client) => {
                    info!(url = %config.model.base_url, timeout_ms = config.model.timeout_ms, "Prediction client configured");
                    Some(client)
                }
                Err(e) => {
                    warn!("Failed to build prediction client: {e}, scoring with rules only");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(repo, thresholds, model, StepUpPolicy::from(&config.step_up)))
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        self.thresholds.snapshot()
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    async fn model_outcome(&self, tx: &TransactionCandidate) -> ModelOutcome {
        let Some(client) = &self.model else {
            return ModelOutcome::NotRequested;
        };
        match client.predict(tx).await {
            Ok(signal) => ModelOutcome::Scored(signal),
            Err(e) => {
                warn!("Prediction unavailable, falling back to rules: {e}");
                ModelOutcome::Unavailable
            }
        }
    }

    /// Score one submission and append it to the log.
    pub async fn submit(&self, input: &CandidateInput) -> Result<Submission, PipelineError> {
        let start = Instant::now();
        // One snapshot for the whole call.
        let config = self.thresholds.snapshot();
        let candidate = TransactionCandidate::new(input, &config)?;

        let model = self.model_outcome(&candidate).await;
        let result = self.engine.score(&candidate, &config, &model);
        let id = self.repo.append(&candidate, &result)?;

        info!(
            id,
            tx_type = %candidate.tx_type(),
            amount = candidate.amount(),
            risk_score = result.risk_score,
            decision = %result.decision,
            source = result.source.as_str(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Transaction scored"
        );

        Ok(Submission {
            id,
            candidate,
            result,
        })
    }

    fn pending_record(&self, id: i64) -> Result<TransactionRecord, PipelineError> {
        let record = self.repo.get(id)?.ok_or(PipelineError::NotFound(id))?;
        if record.decision != Decision::StepUp {
            return Err(StepUpError::NotPending(record.decision).into());
        }
        Ok(record)
    }

    fn finish_step_up(&self, id: i64, decision: Decision) -> Result<TransactionRecord, PipelineError> {
        let record = self.repo.update(
            id,
            &RecordUpdate {
                decision: Some(decision),
                expected_decision: Some(Decision::StepUp),
                ..Default::default()
            },
        )
        .map_err(|e| match e {
            DbError::DecisionChanged { current, .. } => StepUpError::NotPending(current).into(),
            other => PipelineError::from(other),
        })?;
        self.repo.append_audit("step_up_resolved", &format!("#{id} {decision}"))?;
        info!(id, decision = %decision, "Step-up resolved");
        Ok(record)
    }

    /// Run a code-entry challenge for a pending record. Codes are taken in
    /// order as entered `elapsed` after the challenge started; a challenge
    /// still pending when the codes run out is torn down and fails.
    pub fn verify_step_up(
        &self,
        id: i64,
        codes: &[String],
        elapsed: Duration,
    ) -> Result<TransactionRecord, PipelineError> {
        let record = self.pending_record(id)?;
        let mut challenge = StepUpChallenge::new(record.decision, self.step_up.clone())?;
        challenge.tick(elapsed);
        for code in codes {
            if challenge.submit(code, elapsed).is_terminal() {
                break;
            }
        }
        challenge.cancel();
        debug!(id, state = ?challenge.state(), failed = challenge.failed_attempts(), "Step-up challenge closed");

        let decision = challenge.outcome().unwrap_or(Decision::BlockStepUpFailed);
        self.finish_step_up(id, decision)
    }

    /// Resolve a pending record from an externally verified outcome.
    pub fn resolve_step_up(
        &self,
        id: i64,
        outcome: VerificationOutcome,
    ) -> Result<TransactionRecord, PipelineError> {
        let record = self.pending_record(id)?;
        let decision = stepup::resolve_step_up(record.decision, outcome, &self.step_up)?;
        self.finish_step_up(id, decision)
    }

    /// Attach a ground-truth label. The score and decision stay as they are.
    pub fn label(&self, id: i64, label: GroundTruth) -> Result<TransactionRecord, PipelineError> {
        if self.repo.get(id)?.is_none() {
            return Err(PipelineError::NotFound(id));
        }
        let record = self.repo.update(
            id,
            &RecordUpdate {
                ground_truth: Some(label),
                ..Default::default()
            },
        )?;
        self.repo.append_audit("labeled", &format!("#{id} {}", label.as_str()))?;
        Ok(record)
    }

    /// Validate, apply and persist new thresholds. On error nothing changes.
    pub fn update_thresholds(&self, next: ThresholdConfig) -> Result<ThresholdConfig, PipelineError> {
        let previous = self
            .thresholds
            .update_with(next.clone(), |t| self.repo.save_thresholds(t).map_err(PipelineError::from))?;
        self.repo.append_audit(
            "thresholds_updated",
            &format!(
                "approve {} -> {}, block {} -> {}",
                previous.approve_threshold, next.approve_threshold, previous.block_threshold, next.block_threshold
            ),
        )?;
        Ok(previous)
    }

    pub fn history(&self) -> Result<Vec<TransactionRecord>, PipelineError> {
        Ok(self.repo.list()?)
    }

    pub fn summary(&self) -> Result<DecisionSummary, PipelineError> {
        Ok(DecisionSummary::from_records(&self.repo.list()?))
    }
}

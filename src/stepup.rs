//! Step-up verification for STEP_UP decisions.
//!
//! Headless: the caller supplies both the code attempts and the elapsed time,
//! so there is no timer here to cancel or leak.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::StepUpConfig;
use crate::core::Decision;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepUpError {
    #[error("step-up only applies to STEP_UP decisions, got {0}")]
    NotPending(Decision),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpPolicy {
    pub expected_code: String,
    pub max_attempts: u32,
    pub ttl: Duration,
}

impl From<&StepUpConfig> for StepUpPolicy {
    fn from(config: &StepUpConfig) -> Self {
        Self {
            expected_code: config.code.clone(),
            max_attempts: config.max_attempts.max(1),
            ttl: Duration::from_secs(config.ttl_seconds),
        }
    }
}

impl Default for StepUpPolicy {
    fn default() -> Self {
        Self::from(&StepUpConfig::default())
    }
}

/// Result of an out-of-band verification, as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub elapsed: Duration,
}

/// Resolve a pending STEP_UP to a terminal decision.
///
/// Expiry wins over a late success.
pub fn resolve_step_up(
    pending: Decision,
    outcome: VerificationOutcome,
    policy: &StepUpPolicy,
) -> Result<Decision, StepUpError> {
    if pending != Decision::StepUp {
        return Err(StepUpError::NotPending(pending));
    }
    if outcome.elapsed >= policy.ttl {
        return Ok(Decision::BlockStepUpFailed);
    }
    Ok(if outcome.verified {
        Decision::ApproveAfterStepUp
    } else {
        Decision::BlockStepUpFailed
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeState {
    Pending,
    Verified,
    Exhausted,
    Expired,
    Cancelled,
}

impl ChallengeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChallengeState::Pending)
    }
}

/// One code-entry challenge: PENDING until a correct code, the attempt limit,
/// the TTL, or a cancel moves it to a terminal state.
#[derive(Debug, Clone)]
pub struct StepUpChallenge {
    policy: StepUpPolicy,
    state: ChallengeState,
    failed_attempts: u32,
}

impl StepUpChallenge {
    pub fn new(pending: Decision, policy: StepUpPolicy) -> Result<Self, StepUpError> {
        if pending != Decision::StepUp {
            return Err(StepUpError::NotPending(pending));
        }
        Ok(Self {
            policy,
            state: ChallengeState::Pending,
            failed_attempts: 0,
        })
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.policy.max_attempts.saturating_sub(self.failed_attempts)
    }

    /// Advance the clock. Reaching the TTL expires the challenge regardless of
    /// attempts left.
    pub fn tick(&mut self, elapsed: Duration) -> ChallengeState {
        if self.state == ChallengeState::Pending && elapsed >= self.policy.ttl {
            tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Step-up challenge expired");
            self.state = ChallengeState::Expired;
        }
        self.state
    }

    /// Check a code entered `elapsed` after the challenge started.
    pub fn submit(&mut self, code: &str, elapsed: Duration) -> ChallengeState {
        if self.tick(elapsed).is_terminal() {
            return self.state;
        }
        if code.trim() == self.policy.expected_code {
            self.state = ChallengeState::Verified;
        } else {
            self.failed_attempts += 1;
            tracing::debug!(
                failed_attempts = self.failed_attempts,
                max_attempts = self.policy.max_attempts,
                "Step-up code mismatch"
            );
            if self.failed_attempts >= self.policy.max_attempts {
                self.state = ChallengeState::Exhausted;
            }
        }
        self.state
    }

    /// Tear the challenge down without a verdict.
    pub fn cancel(&mut self) -> ChallengeState {
        if self.state == ChallengeState::Pending {
            self.state = ChallengeState::Cancelled;
        }
        self.state
    }

    /// Terminal decision, once the challenge has one.
    pub fn outcome(&self) -> Option<Decision> {
        match self.state {
            ChallengeState::Pending => None,
            ChallengeState::Verified => Some(Decision::ApproveAfterStepUp),
            ChallengeState::Exhausted | ChallengeState::Expired | ChallengeState::Cancelled => {
                Some(Decision::BlockStepUpFailed)
            }
        }
    }
}

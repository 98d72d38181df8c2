use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub engine: ThresholdConfig,
    pub model: ModelConfig,
    pub step_up: StepUpConfig,
    pub database: DatabaseConfig,
}

/// Tunable parameters of the scoring engine. Owned by the admin surface,
/// passed by value into every scoring call.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    /// score < this → APPROVE
    pub approve_threshold: f64,
    /// score ≥ this → BLOCK
    pub block_threshold: f64,
    /// Legacy TRANSFER flag cutoff.
    pub flag_threshold_amount: f64,
    /// Large-amount cutoff for TRANSFER / CASH_OUT.
    pub high_risk_amount: f64,
    /// Minimum amount for the "balance zeroed" rule.
    pub zero_out_min_amount: f64,
    /// Minimum amount for the "new destination" rule.
    pub new_dest_large_amount: f64,
    /// Reject candidates that overdraw the origin account (outside CASH_IN).
    pub block_insufficient_balance: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StepUpConfig {
    /// Fixed demo code. Not a security mechanism.
    pub code: String,
    pub max_attempts: u32,
    pub ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            approve_threshold: 0.35,
            block_threshold: 0.70,
            flag_threshold_amount: 200_000.0,
            high_risk_amount: 150_000.0,
            zero_out_min_amount: 10_000.0,
            new_dest_large_amount: 50_000.0,
            block_insufficient_balance: true,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://127.0.0.1:8000".into(),
            timeout_ms: 3_000,
        }
    }
}

impl Default for StepUpConfig {
    fn default() -> Self {
        Self {
            code: "123456".into(),
            max_attempts: 3,
            ttl_seconds: 60,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/riskgate.db".into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("approve threshold ({approve}) must be below block threshold ({block})")]
    Inverted { approve: f64, block: f64 },

    #[error("{name} must be a finite non-negative amount, got {value}")]
    InvalidAmount { name: &'static str, value: f64 },
}

impl ThresholdConfig {
    /// Check every invariant. A configuration that fails here must never
    /// reach the engine.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        for (name, value) in [
            ("approve_threshold", self.approve_threshold),
            ("block_threshold", self.block_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ThresholdError::OutOfRange { name, value });
            }
        }
        if self.approve_threshold >= self.block_threshold {
            return Err(ThresholdError::Inverted {
                approve: self.approve_threshold,
                block: self.block_threshold,
            });
        }
        for (name, value) in [
            ("flag_threshold_amount", self.flag_threshold_amount),
            ("high_risk_amount", self.high_risk_amount),
            ("zero_out_min_amount", self.zero_out_min_amount),
            ("new_dest_large_amount", self.new_dest_large_amount),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ThresholdError::InvalidAmount { name, value });
            }
        }
        Ok(())
    }
}

/// Live, admin-mutable thresholds shared between the scoring path and the
/// settings surface. Readers always get a whole snapshot, never a torn one.
#[derive(Debug, Clone)]
pub struct SharedThresholds {
    inner: Arc<RwLock<ThresholdConfig>>,
}

impl SharedThresholds {
    pub fn new(initial: ThresholdConfig) -> Result<Self, ThresholdError> {
        initial.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(initial)),
        })
    }

    pub fn snapshot(&self) -> ThresholdConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the thresholds. On error the previous configuration stays active.
    pub fn update(&self, next: ThresholdConfig) -> Result<ThresholdConfig, ThresholdError> {
        self.update_with(next, |_| Ok(()))
    }

    /// Validate, run `persist`, then swap, all under the write lock. If
    /// either step fails the previous configuration stays active, and
    /// concurrent updates persist in the same order they go live.
    pub fn update_with<E, F>(&self, next: ThresholdConfig, persist: F) -> Result<ThresholdConfig, E>
    where
        E: From<ThresholdError>,
        F: FnOnce(&ThresholdConfig) -> Result<(), E>,
    {
        next.validate()?;
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        persist(&next)?;
        let previous = std::mem::replace(&mut *guard, next);
        tracing::info!(
            approve = guard.approve_threshold,
            block = guard.block_threshold,
            "Thresholds updated"
        );
        Ok(previous)
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        self.engine.validate()
    }

    /// Load config from a TOML file. Falls back to defaults if the file doesn't
    /// exist, can't be parsed, or carries invalid thresholds.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        let config: Self = match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    return Self::default();
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                return Self::default();
            }
        };
        if let Err(e) = config.validate() {
            tracing::warn!("Invalid thresholds in {}: {e}, using default thresholds", path.display());
            return Self {
                engine: ThresholdConfig::default(),
                ..config
            };
        }
        config
    }
}

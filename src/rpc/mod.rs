#[cfg(test)]
pub(crate) mod stub;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::ModelConfig;
use crate::core::{RiskFactor, TransactionCandidate, TransactionType};
use crate::signals::score::ModelSignal;

/// Request body in the PaySim column names the prediction service trained on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRequest {
    pub step: u32,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: f64,
    #[serde(rename = "oldbalanceOrg")]
    pub old_balance_org: f64,
    #[serde(rename = "newbalanceOrig")]
    pub new_balance_orig: f64,
    #[serde(rename = "oldbalanceDest")]
    pub old_balance_dest: f64,
    #[serde(rename = "newbalanceDest")]
    pub new_balance_dest: f64,
}

impl From<&TransactionCandidate> for PredictionRequest {
    fn from(tx: &TransactionCandidate) -> Self {
        // The service's label encoder was fit on "CASH IN" / "CASH OUT".
        let tx_type = match tx.tx_type() {
            TransactionType::CashIn => "CASH IN".to_string(),
            TransactionType::CashOut => "CASH OUT".to_string(),
            other => other.as_str().to_string(),
        };
        Self {
            step: tx.step(),
            tx_type,
            amount: tx.amount(),
            old_balance_org: tx.origin_balance_before(),
            new_balance_orig: tx.origin_balance_after(),
            old_balance_dest: tx.dest_balance_before(),
            new_balance_dest: tx.dest_balance_after(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionResponse {
    pub probability: f64,
    /// Server-side thresholding; informational only.
    pub is_fraud: bool,
    pub risk_level: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub models_loaded: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("prediction timed out after {0:?}")]
    Timeout(Duration),

    #[error("prediction service returned {0}")]
    Status(StatusCode),

    #[error("invalid probability: {0}")]
    InvalidProbability(f64),
}

/// Client for the external fraud-prediction service.
pub struct PredictionClient {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl PredictionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PredictionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, PredictionError> {
        Self::new(&config.base_url, Duration::from_millis(config.timeout_ms))
    }

    fn map_err(&self, e: reqwest::Error) -> PredictionError {
        if e.is_timeout() {
            PredictionError::Timeout(self.timeout)
        } else {
            PredictionError::Http(e)
        }
    }

    /// Raw call to `POST /predict/primary`.
    pub async fn predict_raw(&self, tx: &TransactionCandidate) -> Result<PredictionResponse, PredictionError> {
        let body = PredictionRequest::from(tx);
        let resp = self
            .client
            .post(format!("{}/predict/primary", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_err(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PredictionError::Status(status));
        }

        resp.json().await.map_err(|e| self.map_err(e))
    }

    /// Fetch and validate a probability for one candidate.
    pub async fn predict(&self, tx: &TransactionCandidate) -> Result<ModelSignal, PredictionError> {
        let resp = self.predict_raw(tx).await?;
        if !resp.probability.is_finite() || !(0.0..=1.0).contains(&resp.probability) {
            return Err(PredictionError::InvalidProbability(resp.probability));
        }
        tracing::debug!(
            probability = resp.probability,
            risk_level = %resp.risk_level,
            is_fraud = resp.is_fraud,
            "Model prediction received"
        );
        Ok(ModelSignal {
            probability: resp.probability,
            risk_factors: resp.risk_factors,
        })
    }

    /// Service health and the list of loaded models.
    pub async fn health(&self) -> Result<HealthStatus, PredictionError> {
        let resp = self
            .client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .map_err(|e| self.map_err(e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PredictionError::Status(status));
        }
        resp.json().await.map_err(|e| self.map_err(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdConfig;
    use crate::core::{CandidateInput, Severity};

    fn cash_out() -> TransactionCandidate {
        TransactionCandidate::new(
            &CandidateInput {
                step: 3,
                tx_type: TransactionType::CashOut,
                amount: 25_000.0,
                origin_balance_before: 25_000.0,
                dest_balance_before: 0.0,
                allow_overdraft: false,
            },
            &ThresholdConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn request_uses_paysim_names() {
        let json = serde_json::to_value(PredictionRequest::from(&cash_out())).unwrap();
        assert_eq!(json["type"], "CASH OUT");
        assert_eq!(json["step"], 3);
        assert_eq!(json["oldbalanceOrg"], 25_000.0);
        assert_eq!(json["newbalanceOrig"], 0.0);
        assert_eq!(json["newbalanceDest"], 0.0);
    }

    #[tokio::test]
    async fn predict_parses_response() {
        let (url, handle) = stub::serve_once(
            "200 OK",
            r#"{"probability":0.93,"is_fraud":true,"risk_level":"High","risk_factors":[{"factor":"Balance Drain","severity":"danger"}]}"#,
        )
        .await;
        let client = PredictionClient::new(&url, Duration::from_secs(2)).unwrap();
        let signal = client.predict(&cash_out()).await.unwrap();
        assert_eq!(signal.probability, 0.93);
        assert_eq!(signal.risk_factors, vec![RiskFactor::new("Balance Drain", Severity::Danger)]);

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /predict/primary"));
        assert!(request.contains(r#""type":"CASH OUT""#));
    }

    #[tokio::test]
    async fn out_of_range_probability_is_error() {
        let (url, _handle) =
            stub::serve_once("200 OK", r#"{"probability":1.7,"is_fraud":true,"risk_level":"High"}"#).await;
        let client = PredictionClient::new(&url, Duration::from_secs(2)).unwrap();
        let err = client.predict(&cash_out()).await.unwrap_err();
        assert!(matches!(err, PredictionError::InvalidProbability(p) if p == 1.7));
    }

    #[tokio::test]
    async fn service_unavailable_status() {
        let (url, _handle) = stub::serve_once("503 Service Unavailable", r#"{"detail":"not loaded"}"#).await;
        let client = PredictionClient::new(&url, Duration::from_secs(2)).unwrap();
        let err = client.predict(&cash_out()).await.unwrap_err();
        assert!(matches!(err, PredictionError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let url = stub::serve_silent().await;
        let client = PredictionClient::new(&url, Duration::from_millis(100)).unwrap();
        let err = client.predict(&cash_out()).await.unwrap_err();
        assert!(matches!(err, PredictionError::Timeout(_)), "got {err}");
    }

    #[tokio::test]
    async fn refused_connection_is_http_error() {
        let url = stub::closed_port_url().await;
        let client = PredictionClient::new(&url, Duration::from_secs(2)).unwrap();
        let err = client.predict(&cash_out()).await.unwrap_err();
        assert!(matches!(err, PredictionError::Http(_)));
    }

    #[tokio::test]
    async fn health_lists_models() {
        let (url, handle) =
            stub::serve_once("200 OK", r#"{"status":"ok","models_loaded":["primary","encoder"]}"#).await;
        let client = PredictionClient::new(&format!("{url}/"), Duration::from_secs(2)).unwrap();
        let health = client.health().await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.models_loaded, vec!["primary", "encoder"]);
        assert!(handle.await.unwrap().starts_with("GET / "));
    }
}

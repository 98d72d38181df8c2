pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::config::ThresholdConfig;
use crate::core::{
    Decision, GroundTruth, RiskFactor, ScoreSource, ScoringResult, TransactionCandidate, TransactionType,
};

const THRESHOLDS_KEY: &str = "thresholds";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no transaction with id {0}")]
    NotFound(i64),

    #[error("transaction {id} is already {current}")]
    DecisionChanged { id: i64, current: Decision },
}

/// A scored transaction as stored. `result` is frozen at scoring time;
/// `decision` moves on after step-up resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub candidate: TransactionCandidate,
    pub result: ScoringResult,
    pub decision: Decision,
    pub ground_truth: Option<GroundTruth>,
    pub labeled_at: Option<DateTime<Utc>>,
}

/// Fields that may change on a stored record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub decision: Option<Decision>,
    /// Only apply `decision` if the stored one still equals this.
    pub expected_decision: Option<Decision>,
    pub ground_truth: Option<GroundTruth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

/// Storage seen by the application layer. The engine never touches it.
pub trait TransactionRepository {
    fn append(&self, tx: &TransactionCandidate, result: &ScoringResult) -> Result<i64, DbError>;
    fn list(&self) -> Result<Vec<TransactionRecord>, DbError>;
    fn get(&self, id: i64) -> Result<Option<TransactionRecord>, DbError>;
    fn update(&self, id: i64, update: &RecordUpdate) -> Result<TransactionRecord, DbError>;

    fn load_thresholds(&self) -> Result<Option<ThresholdConfig>, DbError>;
    fn save_thresholds(&self, thresholds: &ThresholdConfig) -> Result<(), DbError>;

    fn append_audit(&self, action: &str, detail: &str) -> Result<(), DbError>;
    fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>, DbError>;
}

pub struct Database {
    conn: Connection,
}

/// Thread-safe wrapper around Database.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let db = Database::open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(db)),
        })
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Database { conn })),
        })
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TransactionRepository for SharedDatabase {
    fn append(&self, tx: &TransactionCandidate, result: &ScoringResult) -> Result<i64, DbError> {
        self.db().append(tx, result)
    }

    fn list(&self) -> Result<Vec<TransactionRecord>, DbError> {
        self.db().list()
    }

    fn get(&self, id: i64) -> Result<Option<TransactionRecord>, DbError> {
        self.db().get(id)
    }

    fn update(&self, id: i64, update: &RecordUpdate) -> Result<TransactionRecord, DbError> {
        self.db().update(id, update)
    }

    fn load_thresholds(&self) -> Result<Option<ThresholdConfig>, DbError> {
        self.db().load_thresholds()
    }

    fn save_thresholds(&self, thresholds: &ThresholdConfig) -> Result<(), DbError> {
        self.db().save_thresholds(thresholds)
    }

    fn append_audit(&self, action: &str, detail: &str) -> Result<(), DbError> {
        self.db().append_audit(action, detail)
    }

    fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>, DbError> {
        self.db().audit_log(limit)
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn parse_col<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn json_col<T: serde::de::DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn time_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        DateTime::parse_from_rfc3339(&t)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

const RECORD_COLUMNS: &str = "id, step, tx_type, amount, origin_before, origin_after, dest_before, dest_after, legacy_flag,
     risk_score, heuristic_score, initial_decision, decision, reasons, risk_factors, source,
     ground_truth, labeled_at, created_at";

impl Database {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn append(&self, tx: &TransactionCandidate, result: &ScoringResult) -> Result<i64, DbError> {
        let reasons = serde_json::to_string(&result.reasons)?;
        let factors = serde_json::to_string(&result.risk_factors)?;
        self.conn.execute(
            "INSERT INTO transactions (step, tx_type, amount, origin_before, origin_after, dest_before, dest_after, legacy_flag,
                                       risk_score, heuristic_score, initial_decision, decision, reasons, risk_factors, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12, ?13, ?14, ?15)",
            rusqlite::params![
                tx.step(),
                tx.tx_type().as_str(),
                tx.amount(),
                tx.origin_balance_before(),
                tx.origin_balance_after(),
                tx.dest_balance_before(),
                tx.dest_balance_after(),
                tx.legacy_flag(),
                result.risk_score,
                result.heuristic_score,
                result.decision.as_str(),
                reasons,
                factors,
                result.source.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TransactionRecord> {
        let tx_type: TransactionType = parse_col(row, 2)?;
        let candidate = TransactionCandidate::from_stored(
            row.get(1)?,
            tx_type,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
        );
        let reasons: Vec<String> = json_col(row, 13)?;
        let risk_factors: Vec<RiskFactor> = json_col(row, 14)?;
        let source: ScoreSource = parse_col(row, 15)?;
        let ground_truth = row
            .get::<_, Option<String>>(16)?
            .map(|g| g.parse::<GroundTruth>().map_err(|e| conversion_error(16, e)))
            .transpose()?;
        let created_at = time_col(row, 18)?.unwrap_or_default();

        Ok(TransactionRecord {
            id: row.get(0)?,
            created_at,
            candidate,
            result: ScoringResult {
                risk_score: row.get(9)?,
                heuristic_score: row.get(10)?,
                decision: parse_col(row, 11)?,
                reasons,
                risk_factors,
                source,
            },
            decision: parse_col(row, 12)?,
            ground_truth,
            labeled_at: time_col(row, 17)?,
        })
    }

    /// All records, oldest first.
    pub fn list(&self) -> Result<Vec<TransactionRecord>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RECORD_COLUMNS} FROM transactions ORDER BY id ASC"))?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get(&self, id: i64) -> Result<Option<TransactionRecord>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {RECORD_COLUMNS} FROM transactions WHERE id = ?1"))?;
        Ok(stmt.query_row(rusqlite::params![id], Self::row_to_record).optional()?)
    }

    /// Apply the given field changes. Scores are never touched.
    pub fn update(&self, id: i64, update: &RecordUpdate) -> Result<TransactionRecord, DbError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        if let Some(decision) = update.decision {
            changed = match update.expected_decision {
                Some(expected) => tx.execute(
                    "UPDATE transactions SET decision = ?1 WHERE id = ?2 AND decision = ?3",
                    rusqlite::params![decision.as_str(), id, expected.as_str()],
                )?,
                None => tx.execute(
                    "UPDATE transactions SET decision = ?1 WHERE id = ?2",
                    rusqlite::params![decision.as_str(), id],
                )?,
            };
            if changed == 0 {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT decision FROM transactions WHERE id = ?1",
                        rusqlite::params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                return Err(match current {
                    None => DbError::NotFound(id),
                    Some(current) => DbError::DecisionChanged {
                        id,
                        current: current.parse().map_err(|e: String| conversion_error(0, e))?,
                    },
                });
            }
        }
        if let Some(label) = update.ground_truth {
            changed = tx.execute(
                "UPDATE transactions SET ground_truth = ?1, labeled_at = ?2 WHERE id = ?3",
                rusqlite::params![label.as_str(), Utc::now().to_rfc3339(), id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound(id));
            }
        }
        tx.commit()?;
        tracing::debug!(id, changed, "Transaction record updated");
        self.get(id)?.ok_or(DbError::NotFound(id))
    }

    pub fn load_thresholds(&self) -> Result<Option<ThresholdConfig>, DbError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                rusqlite::params![THRESHOLDS_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(|v| serde_json::from_str(&v)).transpose()?)
    }

    pub fn save_thresholds(&self, thresholds: &ThresholdConfig) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![THRESHOLDS_KEY, serde_json::to_string(thresholds)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn append_audit(&self, action: &str, detail: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO audit_log (action, detail, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![action, detail, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent entries first.
    pub fn audit_log(&self, limit: usize) -> Result<Vec<AuditEntry>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, action, detail, created_at FROM audit_log ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                action: row.get(1)?,
                detail: row.get(2)?,
                created_at: time_col(row, 3)?.unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CandidateInput, Severity};
    use crate::signals::score::ModelOutcome;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn open_temp_db() -> SharedDatabase {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "riskgate_test_{}_{}.db",
            std::process::id(),
            id
        ));
        // Remove if leftover from previous run
        let _ = std::fs::remove_file(&path);
        SharedDatabase::open(&path).unwrap()
    }

    fn scored(tx_type: TransactionType, amount: f64, origin: f64) -> (TransactionCandidate, ScoringResult) {
        let cfg = ThresholdConfig::default();
        let tx = TransactionCandidate::new(
            &CandidateInput {
                step: 7,
                tx_type,
                amount,
                origin_balance_before: origin,
                dest_balance_before: 0.0,
                allow_overdraft: false,
            },
            &cfg,
        )
        .unwrap();
        let result = crate::signals::score(&tx, &cfg, &ModelOutcome::NotRequested);
        (tx, result)
    }

    #[test]
    fn append_and_read_back_exactly() {
        let db = open_temp_db();
        let (tx, mut result) = scored(TransactionType::CashIn, 180_000.0, 0.0);
        // a score with no short decimal form
        result.risk_score = 0.1 + 0.2;
        result.risk_factors.push(RiskFactor::new("ünïcode — reason", Severity::Danger));
        let id = db.append(&tx, &result).unwrap();

        let record = db.get(id).unwrap().unwrap();
        assert_eq!(record.candidate, tx);
        assert_eq!(record.result, result);
        assert_eq!(record.result.risk_score.to_bits(), (0.1f64 + 0.2).to_bits());
        assert_eq!(record.decision, result.decision);
        assert!(record.ground_truth.is_none());
    }

    #[test]
    fn list_in_insertion_order() {
        let db = open_temp_db();
        let (a, ra) = scored(TransactionType::Payment, 5_000.0, 150_000.0);
        let (b, rb) = scored(TransactionType::Transfer, 50_000.0, 50_000.0);
        let id_a = db.append(&a, &ra).unwrap();
        let id_b = db.append(&b, &rb).unwrap();
        let all = db.list().unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![id_a, id_b]);
        assert_eq!(all[1].result.reasons, rb.reasons);
    }

    #[test]
    fn get_missing_is_none() {
        let db = open_temp_db();
        assert!(db.get(42).unwrap().is_none());
    }

    #[test]
    fn update_decision_keeps_score() {
        let db = open_temp_db();
        let (tx, result) = scored(TransactionType::Transfer, 50_000.0, 50_000.0);
        assert_eq!(result.decision, Decision::StepUp);
        let id = db.append(&tx, &result).unwrap();

        let updated = db
            .update(id, &RecordUpdate { decision: Some(Decision::ApproveAfterStepUp), ..Default::default() })
            .unwrap();
        assert_eq!(updated.decision, Decision::ApproveAfterStepUp);
        assert_eq!(updated.result.decision, Decision::StepUp);
        assert_eq!(updated.result.risk_score, result.risk_score);
    }

    #[test]
    fn guarded_decision_update_refuses_stale_state() {
        let db = open_temp_db();
        let (tx, result) = scored(TransactionType::Transfer, 50_000.0, 50_000.0);
        let id = db.append(&tx, &result).unwrap();
        let resolve = |decision| RecordUpdate {
            decision: Some(decision),
            expected_decision: Some(Decision::StepUp),
            ..Default::default()
        };

        db.update(id, &resolve(Decision::ApproveAfterStepUp)).unwrap();
        let err = db.update(id, &resolve(Decision::BlockStepUpFailed)).unwrap_err();
        assert!(matches!(
            err,
            DbError::DecisionChanged { current: Decision::ApproveAfterStepUp, .. }
        ));
        assert_eq!(db.get(id).unwrap().unwrap().decision, Decision::ApproveAfterStepUp);

        assert!(matches!(
            db.update(404, &resolve(Decision::ApproveAfterStepUp)),
            Err(DbError::NotFound(404))
        ));
    }

    #[test]
    fn label_ground_truth() {
        let db = open_temp_db();
        let (tx, result) = scored(TransactionType::Payment, 5_000.0, 150_000.0);
        let id = db.append(&tx, &result).unwrap();
        let updated = db
            .update(id, &RecordUpdate { ground_truth: Some(GroundTruth::Fraud), ..Default::default() })
            .unwrap();
        assert_eq!(updated.ground_truth, Some(GroundTruth::Fraud));
        assert!(updated.labeled_at.is_some());
        assert_eq!(updated.decision, Decision::Approve);
    }

    #[test]
    fn update_unknown_id() {
        let db = open_temp_db();
        let err = db
            .update(9, &RecordUpdate { ground_truth: Some(GroundTruth::Legitimate), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(9)));
    }

    #[test]
    fn thresholds_roundtrip() {
        let db = open_temp_db();
        assert!(db.load_thresholds().unwrap().is_none());
        let custom = ThresholdConfig {
            approve_threshold: 0.25,
            block_insufficient_balance: false,
            ..Default::default()
        };
        db.save_thresholds(&custom).unwrap();
        db.save_thresholds(&custom).unwrap();
        assert_eq!(db.load_thresholds().unwrap(), Some(custom));
    }

    #[test]
    fn audit_newest_first() {
        let db = open_temp_db();
        db.append_audit("settings_updated", "approve 0.35 -> 0.30").unwrap();
        db.append_audit("labeled", "#1 FRAUD").unwrap();
        let log = db.audit_log(10).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, "labeled");
        assert_eq!(db.audit_log(1).unwrap().len(), 1);
    }

    #[test]
    fn in_memory_database() {
        let db = SharedDatabase::open_in_memory().unwrap();
        let (tx, result) = scored(TransactionType::Debit, 500.0, 50_000.0);
        db.append(&tx, &result).unwrap();
        assert_eq!(db.list().unwrap().len(), 1);
    }
}

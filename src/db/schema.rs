use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS transactions (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            step             INTEGER NOT NULL,
            tx_type          TEXT NOT NULL,
            amount           REAL NOT NULL,
            origin_before    REAL NOT NULL,
            origin_after     REAL NOT NULL,
            dest_before      REAL NOT NULL,
            dest_after       REAL NOT NULL,
            legacy_flag      INTEGER NOT NULL,
            risk_score       REAL NOT NULL,
            heuristic_score  REAL NOT NULL,
            initial_decision TEXT NOT NULL,
            decision         TEXT NOT NULL,
            reasons          TEXT NOT NULL, -- JSON
            risk_factors     TEXT NOT NULL, -- JSON
            source           TEXT NOT NULL,
            ground_truth     TEXT,
            labeled_at       TEXT,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settings (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL, -- JSON
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            action     TEXT NOT NULL,
            detail     TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_decision ON transactions(decision);
        CREATE INDEX IF NOT EXISTS idx_transactions_created ON transactions(created_at DESC);
        ",
    )?;
    Ok(())
}

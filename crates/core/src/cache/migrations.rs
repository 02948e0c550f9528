//! Partition store schema.
//!
//! `schema_version` holds one row per applied step; startup applies every
//! step above the highest recorded one, each in its own transaction.

use chrono::Utc;
use tokio_rusqlite::{Connection, params};

use super::Error;

/// Ordered schema steps.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_partitions.sql")),
    (2, include_str!("../../migrations/002_entry_indexes.sql")),
];

/// Bring the partition store up to the latest schema.
///
/// Returns how many steps were applied.
pub async fn run(conn: &Connection) -> Result<usize, Error> {
    conn.call(|conn| -> Result<usize, Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))?;

        let mut applied = 0;
        for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("schema step {version}: {e}")))?;
            tx.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![version, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;

            tracing::debug!(version, "applied partition store schema step");
            applied += 1;
        }

        Ok(applied)
    })
    .await
    .map_err(Error::from)
}

//! Database schema migrations.
//!
//! A version table records which migrations have run; each migration is a
//! SQL batch applied once, in order.

use super::Error;
use tokio_rusqlite::{Connection, params};

/// Migration list: (version, description, SQL).
///
/// Versions must be strictly increasing. All statements use
/// `IF NOT EXISTS` so a partially recorded run can be repeated.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "generations and entries", include_str!("../../migrations/001_generations.sql")),
    (2, "entry url index", include_str!("../../migrations/002_entries_url_index.sql")),
];

/// Run any pending migrations.
///
/// # Errors
///
/// Returns an error if a migration SQL fails to execute.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(Error::from)?;

        let current: i64 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
                row.get(0)
            })
            .map_err(Error::from)?;

        for (version, description, sql) in MIGRATIONS {
            if *version <= current {
                continue;
            }
            conn.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("{version} ({description}): {e}")))?;
            conn.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(Error::from)?;
            tracing::info!(version, description, "applied cache migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

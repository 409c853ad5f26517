//! Excursion operations via direct SQLx.

use crate::allocator::{ExcursionStore, next_id};
use crate::error::{Error, Result};
use crate::model::{Excursion, ExcursionId};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

/// Advisory lock key serializing atomic allocation across connections.
const ALLOCATION_LOCK_KEY: i64 = 0x6265_6176_6572;

/// Highest identifier, ordered by integer prefix then suffix levels.
///
/// A plain `MAX(id)` compares text, which ranks `"9"` above `"10"` and would
/// hand out `"10"` forever once ten excursions exist.
const MAX_ID_SQL: &str = "SELECT COALESCE(
        (SELECT id FROM excursions
         ORDER BY split_part(id, '.', 1)::bigint DESC,
                  NULLIF(split_part(id, '.', 2), '')::bigint DESC NULLS LAST,
                  NULLIF(split_part(id, '.', 3), '')::bigint DESC NULLS LAST
         LIMIT 1),
        '0')";

const INSERT_SQL: &str = "INSERT INTO excursions (id, sticks_collected) VALUES ($1, $2)";

/// Turn a unique-key violation into a typed duplicate error.
fn map_insert_error(id: &ExcursionId, e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::DuplicateExcursion(id.to_string())
        }
        _ => Error::Database(e),
    }
}

fn record_op(operation: &'static str) {
    metrics::store_operations().add(1, &[KeyValue::new("operation", operation)]);
}

impl super::Db {
    /// Read the current maximum excursion id, `"0"` for an empty table.
    pub async fn max_excursion_id(&self) -> Result<String> {
        let max: String = sqlx::query_scalar(MAX_ID_SQL)
            .fetch_one(self.pool())
            .await?;
        record_op("max_id");
        Ok(max)
    }

    /// Insert one excursion. Duplicate ids surface as [`Error::DuplicateExcursion`].
    pub async fn insert_excursion(&self, excursion: &Excursion) -> Result<()> {
        sqlx::query(INSERT_SQL)
            .bind(excursion.id.to_string())
            .bind(excursion.sticks_collected)
            .execute(self.pool())
            .await
            .map_err(|e| map_insert_error(&excursion.id, e))?;
        record_op("insert");
        Ok(())
    }

    /// Read-increment-insert in one transaction under an advisory lock.
    pub async fn insert_next_excursion(&self, sticks_collected: i64) -> Result<ExcursionId> {
        let mut tx = self.pool().begin().await?;

        // Released automatically on commit or rollback.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(ALLOCATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let max: String = sqlx::query_scalar(MAX_ID_SQL).fetch_one(&mut *tx).await?;
        let id = next_id(&max)?;

        sqlx::query(INSERT_SQL)
            .bind(id.to_string())
            .bind(sticks_collected)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_error(&id, e))?;

        tx.commit().await?;
        record_op("insert_next");
        Ok(id)
    }

    /// All excursions in identifier order.
    pub async fn list_excursions(&self) -> Result<Vec<Excursion>> {
        let rows: Vec<ExcursionRow> =
            sqlx::query_as("SELECT id, sticks_collected FROM excursions")
                .fetch_all(self.pool())
                .await?;

        let mut excursions = rows
            .into_iter()
            .map(ExcursionRow::try_into_excursion)
            .collect::<Result<Vec<_>>>()?;
        excursions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(excursions)
    }

    pub async fn count_excursions(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM excursions")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    /// Remove every excursion. Used when seeding a demo run.
    pub async fn truncate_excursions(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE excursions")
            .execute(self.pool())
            .await?;
        record_op("truncate");
        Ok(())
    }
}

impl ExcursionStore for super::Db {
    async fn max_excursion_id(&self) -> Result<String> {
        super::Db::max_excursion_id(self).await
    }

    async fn insert_excursion(&self, excursion: &Excursion) -> Result<()> {
        super::Db::insert_excursion(self, excursion).await
    }

    async fn insert_next_excursion(&self, sticks_collected: i64) -> Result<ExcursionId> {
        super::Db::insert_next_excursion(self, sticks_collected).await
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct ExcursionRow {
    id: String,
    sticks_collected: i64,
}

impl ExcursionRow {
    fn try_into_excursion(self) -> Result<Excursion> {
        Ok(Excursion {
            id: self.id.parse()?,
            sticks_collected: self.sticks_collected,
        })
    }
}

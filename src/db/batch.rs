//! Chunked transactional batch updates.
//!
//! Chunks run strictly sequentially, each in its own transaction: a failure
//! inside chunk N rolls back chunk N only and stops the run, leaving earlier
//! chunks committed and later chunks unattempted. Callers that need
//! all-or-nothing must size the batch to cover the whole update set.

use sqlx::postgres::PgArguments;
use sqlx::{Arguments, PgPool};
use uuid::Uuid;

use crate::db::query_builder::QueryParam;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Partial update for one row: column name → bound value.
#[derive(Debug, Clone)]
pub struct RowUpdate {
    pub id: Uuid,
    pub fields: Vec<(String, QueryParam)>,
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("column '{0}' is not allowed in batch updates")]
    DisallowedColumn(String),
    #[error("row {0} has no fields to update")]
    EmptyUpdate(Uuid),
    #[error("failed to encode parameter for row {0}")]
    Encode(Uuid),
    #[error("batch {batch} failed: {source}")]
    Db {
        batch: usize,
        #[source]
        source: sqlx::Error,
    },
}

/// Chunk bounds for `total` items: 250 items at size 100 → (0,100), (100,200), (200,250).
pub fn plan_batches(total: usize, batch_size: usize) -> Vec<(usize, usize)> {
    let size = batch_size.max(1);
    (0..total)
        .step_by(size)
        .map(|start| (start, (start + size).min(total)))
        .collect()
}

fn build_update_sql(table: &str, fields: &[(String, QueryParam)]) -> String {
    let sets: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, (col, _))| format!("{col} = ${}", i + 2))
        .collect();
    format!(
        "UPDATE {table} SET {}, updated_at = NOW() WHERE id = $1 RETURNING id",
        sets.join(", ")
    )
}

/// Validates every update against the column whitelist before any SQL runs,
/// then applies chunks sequentially. Returns the number of rows updated.
pub async fn execute_batch_update(
    pool: &PgPool,
    table: &str,
    allowed_columns: &[&str],
    updates: &[RowUpdate],
    batch_size: usize,
) -> Result<u64, BatchError> {
    for update in updates {
        if update.fields.is_empty() {
            return Err(BatchError::EmptyUpdate(update.id));
        }
        for (column, _) in &update.fields {
            if !allowed_columns.contains(&column.as_str()) {
                return Err(BatchError::DisallowedColumn(column.clone()));
            }
        }
    }

    let mut applied: u64 = 0;
    for (index, (start, end)) in plan_batches(updates.len(), batch_size).into_iter().enumerate() {
        let mut tx = pool
            .begin()
            .await
            .map_err(|source| BatchError::Db { batch: index, source })?;

        for update in &updates[start..end] {
            let sql = build_update_sql(table, &update.fields);
            let mut args = PgArguments::default();
            args.add(update.id).map_err(|_| BatchError::Encode(update.id))?;
            for (_, value) in &update.fields {
                let res = match value {
                    QueryParam::Text(v) => args.add(v),
                    QueryParam::Bool(v) => args.add(v),
                    QueryParam::Int(v) => args.add(v),
                    QueryParam::Uuid(v) => args.add(v),
                    QueryParam::Timestamp(v) => args.add(v),
                };
                res.map_err(|_| BatchError::Encode(update.id))?;
            }
            // fetch_one so a missing row surfaces as RowNotFound and
            // rolls the chunk back when the transaction is dropped.
            sqlx::query_with(&sql, args)
                .fetch_one(&mut *tx)
                .await
                .map_err(|source| BatchError::Db { batch: index, source })?;
            applied += 1;
        }

        tx.commit()
            .await
            .map_err(|source| BatchError::Db { batch: index, source })?;
        tracing::debug!("batch update on {table}: chunk {index} committed ({} rows)", end - start);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_splits_into_expected_chunks() {
        assert_eq!(
            plan_batches(250, 100),
            vec![(0, 100), (100, 200), (200, 250)]
        );
        assert_eq!(plan_batches(100, 100), vec![(0, 100)]);
        assert_eq!(plan_batches(0, 100), Vec::<(usize, usize)>::new());
        assert_eq!(plan_batches(3, 1), vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn zero_batch_size_degrades_to_one() {
        assert_eq!(plan_batches(2, 0), vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn update_sql_numbers_placeholders_after_the_id() {
        let fields = vec![
            ("status".to_string(), QueryParam::Text("suspended".into())),
            ("is_active".to_string(), QueryParam::Bool(false)),
        ];
        let sql = build_update_sql("users", &fields);
        assert_eq!(
            sql,
            "UPDATE users SET status = $2, is_active = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING id"
        );
    }
}

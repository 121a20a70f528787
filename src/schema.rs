//! Database schema management for the sample tables.
//!
//! Table definitions are generated from the row descriptors in
//! [`rows`](crate::rows), so the DDL and the converter always agree on
//! column names and types.

use anyhow::Result;
use sqlx::PgPool;

use crate::rows::{AnswerRow, AttachmentRow, SampleRow, StorageRow, ROW_ID, SAMPLE_ID};

// ---

/// Double-quote a column name so words like `key` are safe to use.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE IF NOT EXISTS` statement for one row type.
///
/// `row_id` becomes a generated primary key and `sample_id` a foreign key
/// to `sample(row_id)` that cascades on delete.
pub fn create_table_sql<R: StorageRow>() -> String {
    // ---
    let columns = R::columns()
        .iter()
        .map(|c| match c.name {
            ROW_ID => format!("    {} BIGSERIAL PRIMARY KEY", quote_ident(c.name)),
            SAMPLE_ID => format!(
                "    {} BIGINT NOT NULL REFERENCES {} ({}) ON DELETE CASCADE",
                quote_ident(c.name),
                SampleRow::TABLE,
                quote_ident(ROW_ID)
            ),
            _ => format!("    {} {}", quote_ident(c.name), c.kind.sql_type()),
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n)", R::TABLE, columns)
}

fn create_index_sql(table: &str, columns: &[&str]) -> String {
    // ---
    let quoted = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>();
    format!(
        "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({})",
        table,
        columns.join("_"),
        table,
        quoted.join(", ")
    )
}

/// Create the sample tables and their indexes (idempotent).
///
/// Runs in a single transaction; safe to call on every start.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    let statements = [
        create_table_sql::<SampleRow>(),
        create_table_sql::<AnswerRow>(),
        create_table_sql::<AttachmentRow>(),
        create_index_sql(SampleRow::TABLE, &["source", "recorded_at"]),
        create_index_sql(AnswerRow::TABLE, &[SAMPLE_ID]),
        create_index_sql(AttachmentRow::TABLE, &[SAMPLE_ID]),
    ];

    for sql in &statements {
        sqlx::query(sql).execute(&mut *tx).await?;
    }

    tx.commit().await?;
    tracing::info!("Schema ready ({} statements)", statements.len());
    Ok(())
}

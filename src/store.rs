//! Persisting converted samples to PostgreSQL.
//!
//! Inserts write only populated columns and let the database assign
//! `row_id`. A sample and its children are written in one transaction, and
//! so is a whole import batch.

use anyhow::Result;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::convert::{SampleRows, SchemaConverter};
use crate::rows::{AnswerRow, AttachmentRow, CellValue, SampleRow, StorageRow, ROW_ID, SAMPLE_ID};
use crate::schema::quote_ident;

// ---

/// Insert a sample with its answers and attachments; returns the sample's
/// new `row_id`.
pub async fn insert_sample(pool: &PgPool, converter: &SchemaConverter, rows: SampleRows) -> Result<i64> {
    // ---
    let mut tx = pool.begin().await?;
    let row_id = insert_in_tx(&mut tx, converter, rows).await?;
    tx.commit().await?;
    Ok(row_id)
}

/// Insert a batch of samples in a single transaction; returns their new
/// `row_id`s in input order. Any failure rolls back the whole batch.
pub async fn insert_samples(
    pool: &PgPool,
    converter: &SchemaConverter,
    batch: Vec<SampleRows>,
) -> Result<Vec<i64>> {
    // ---
    let mut tx = pool.begin().await?;
    let mut row_ids = Vec::with_capacity(batch.len());
    for rows in batch {
        row_ids.push(insert_in_tx(&mut tx, converter, rows).await?);
    }
    tx.commit().await?;
    tracing::debug!(samples = row_ids.len(), "inserted sample batch");
    Ok(row_ids)
}

async fn insert_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    converter: &SchemaConverter,
    rows: SampleRows,
) -> Result<i64> {
    // ---
    let (mut sample, mut answers, mut attachments) = rows.into_parts();

    let row_id = insert_row(tx, &sample).await?;
    sample.set(ROW_ID, Some(CellValue::Integer(row_id)))?;
    converter.attach_children(&sample, &mut answers, &mut attachments)?;

    for answer in &answers {
        insert_row(tx, answer).await?;
    }
    for attachment in &attachments {
        insert_row(tx, attachment).await?;
    }

    tracing::debug!(
        row_id,
        answers = answers.len(),
        attachments = attachments.len(),
        "inserted sample"
    );
    Ok(row_id)
}

/// Load a sample row with its answers and attachments attached.
pub async fn load_sample(pool: &PgPool, row_id: i64) -> Result<Option<SampleRow>> {
    // ---
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1",
        column_list::<SampleRow>(),
        SampleRow::TABLE,
        quote_ident(ROW_ID)
    );
    let Some(mut sample) = sqlx::query_as::<_, SampleRow>(&sql)
        .bind(row_id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    let answers = sqlx::query_as::<_, AnswerRow>(&children_sql::<AnswerRow>("\"answer_order\", \"row_id\""))
        .bind(row_id)
        .fetch_all(pool)
        .await?;
    let attachments = sqlx::query_as::<_, AttachmentRow>(&children_sql::<AttachmentRow>("\"row_id\""))
        .bind(row_id)
        .fetch_all(pool)
        .await?;

    sample.answers = Some(answers);
    sample.attachments = Some(attachments);
    Ok(Some(sample))
}

async fn insert_row<R: StorageRow>(tx: &mut Transaction<'_, Postgres>, row: &R) -> Result<i64> {
    // ---
    let populated: Vec<(&'static str, CellValue)> = R::columns()
        .iter()
        .filter(|c| c.name != ROW_ID)
        .filter_map(|c| row.get(c.name).map(|cell| (c.name, cell)))
        .collect();

    let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} ", R::TABLE));
    if populated.is_empty() {
        qb.push("DEFAULT VALUES");
    } else {
        qb.push("(");
        {
            let mut names = qb.separated(", ");
            for (name, _) in &populated {
                names.push(quote_ident(name));
            }
        }
        qb.push(") VALUES (");
        {
            let mut values = qb.separated(", ");
            for (_, cell) in populated {
                match cell {
                    CellValue::Integer(v) => values.push_bind(v),
                    CellValue::Real(v) => values.push_bind(v),
                    CellValue::Text(v) => values.push_bind(v),
                    CellValue::Boolean(v) => values.push_bind(v),
                    CellValue::Timestamp(v) => values.push_bind(v),
                    CellValue::Json(v) => values.push_bind(sqlx::types::Json(v)),
                };
            }
        }
        qb.push(")");
    }
    qb.push(" RETURNING ");
    qb.push(quote_ident(ROW_ID));

    let row_id: i64 = qb.build_query_scalar().fetch_one(&mut **tx).await?;
    Ok(row_id)
}

fn column_list<R: StorageRow>() -> String {
    R::columns()
        .iter()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn children_sql<R: StorageRow>(order_by: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1 ORDER BY {}",
        column_list::<R>(),
        R::TABLE,
        quote_ident(SAMPLE_ID),
        order_by
    )
}

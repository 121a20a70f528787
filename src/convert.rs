//! Conversion between validated sample records and flat storage rows.
//!
//! Domain → rows copies every populated field whose (possibly renamed) name
//! is a declared column of the target row type. Fields without a matching
//! column are dropped and logged; schema drift therefore loses data rather
//! than failing the conversion.
//!
//! Rows → domain reads every declared column, reverses the rename table,
//! nests any loaded child rows, and runs the normal validating parse.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::SchemaError;
use crate::models::SampleModel;
use crate::rows::{AnswerRow, AttachmentRow, CellValue, SampleRow, StorageRow, ROW_ID, SAMPLE_ID};

// ---

/// Domain field name → storage column name, for the fields whose names differ.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    renames: BTreeMap<String, String>,
}

impl FieldMap {
    /// The renames the bundled tables need.
    pub fn standard() -> Self {
        Self::default().with("timestamp", "recorded_at")
    }

    pub fn with(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.renames.insert(field.into(), column.into());
        self
    }

    /// Add every rename of `other`, overriding existing entries.
    pub fn merge(mut self, other: FieldMap) -> Self {
        self.renames.extend(other.renames);
        self
    }

    /// Column name for a domain field; unmapped names pass through.
    pub fn column_for<'a>(&'a self, field: &'a str) -> &'a str {
        self.renames.get(field).map_or(field, String::as_str)
    }

    /// Domain field name for a column; the inverse of [`column_for`](Self::column_for).
    pub fn field_for<'a>(&'a self, column: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(_, c)| c.as_str() == column)
            .map_or(column, |(f, _)| f.as_str())
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.renames.iter().map(|(f, c)| (f.as_str(), c.as_str()))
    }
}

/// A sample flattened into its table rows. Children are not yet linked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleRows {
    pub sample: SampleRow,
    pub answers: Vec<AnswerRow>,
    pub attachments: Vec<AttachmentRow>,
}

impl SampleRows {
    pub fn into_parts(self) -> (SampleRow, Vec<AnswerRow>, Vec<AttachmentRow>) {
        (self.sample, self.answers, self.attachments)
    }
}

/// Bidirectional sample ↔ row converter with a fixed rename table.
#[derive(Debug, Clone, Default)]
pub struct SchemaConverter {
    field_map: FieldMap,
}

impl SchemaConverter {
    pub fn new(field_map: FieldMap) -> Self {
        Self { field_map }
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    /// Flatten a sample into a sample row plus one row per answer and
    /// attachment. Identifiers are left unset.
    pub fn domain_to_rows(&self, sample: &SampleModel) -> Result<SampleRows, SchemaError> {
        // ---
        let mut fields = record_fields(sample)?;
        fields.remove("answers");
        fields.remove("attachments");

        let rows = SampleRows {
            sample: self.fields_to_row(fields)?,
            answers: sample
                .answers
                .iter()
                .map(|a| self.fields_to_row(record_fields(a)?))
                .collect::<Result<_, _>>()?,
            attachments: sample
                .attachments
                .iter()
                .map(|a| self.fields_to_row(record_fields(a)?))
                .collect::<Result<_, _>>()?,
        };

        debug!(
            answers = rows.answers.len(),
            attachments = rows.attachments.len(),
            "converted sample to rows"
        );
        Ok(rows)
    }

    /// Set `sample_id` on every child row from the sample row's `row_id`.
    ///
    /// The sample row must already have been assigned an identifier.
    pub fn attach_children(
        &self,
        sample: &SampleRow,
        answers: &mut [AnswerRow],
        attachments: &mut [AttachmentRow],
    ) -> Result<(), SchemaError> {
        // ---
        let Some(CellValue::Integer(id)) = sample.get(ROW_ID) else {
            return Err(SchemaError::Precomposition {
                reason: "sample row must have row_id set before attaching children",
            });
        };
        link_to_parent(answers, id)?;
        link_to_parent(attachments, id)?;
        Ok(())
    }

    /// Rebuild a validated sample from its row and any child rows loaded on it.
    pub fn row_to_domain(&self, row: &SampleRow) -> Result<SampleModel, SchemaError> {
        // ---
        let mut data = self.row_fields(row);
        if let Some(answers) = &row.answers {
            let items = answers.iter().map(|a| Value::Object(self.row_fields(a)));
            data.insert("answers".to_string(), Value::Array(items.collect()));
        }
        if let Some(attachments) = &row.attachments {
            let items = attachments.iter().map(|a| Value::Object(self.row_fields(a)));
            data.insert("attachments".to_string(), Value::Array(items.collect()));
        }
        SampleModel::parse(Value::Object(data))
    }

    /// Convert every sample in order; the first failure fails the batch.
    pub fn batch_convert(&self, samples: &[SampleModel]) -> Result<Vec<SampleRows>, SchemaError> {
        // ---
        let rows = samples
            .iter()
            .map(|s| self.domain_to_rows(s))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(samples = rows.len(), "converted batch");
        Ok(rows)
    }

    fn fields_to_row<R: StorageRow>(&self, fields: Map<String, Value>) -> Result<R, SchemaError> {
        // ---
        let mut row = R::default();
        for (field, value) in fields {
            if value.is_null() {
                continue;
            }
            let Some(column) = R::column(self.field_map.column_for(&field)) else {
                // TODO: confirm with the data owners whether dropping is intended
                warn!(table = R::TABLE, field = %field, "dropping field with no matching column");
                continue;
            };
            let cell = CellValue::from_json(column.kind, &value).map_err(|expected| {
                SchemaError::ColumnType {
                    table: R::TABLE,
                    column: column.name.to_string(),
                    expected,
                }
            })?;
            if row.get(column.name).is_some() {
                warn!(
                    table = R::TABLE,
                    column = column.name,
                    field = %field,
                    "column already populated by another field; overwriting"
                );
            }
            row.set(column.name, cell)?;
        }
        Ok(row)
    }

    fn row_fields<R: StorageRow>(&self, row: &R) -> Map<String, Value> {
        // Unset cells are skipped so they cannot shadow a renamed field.
        R::columns()
            .iter()
            .filter_map(|c| {
                let cell = row.get(c.name)?;
                Some((self.field_map.field_for(c.name).to_string(), cell.to_json()))
            })
            .collect()
    }
}

fn link_to_parent<R: StorageRow>(rows: &mut [R], id: i64) -> Result<(), SchemaError> {
    // ---
    if !R::has_column(SAMPLE_ID) {
        return Ok(());
    }
    for row in rows {
        row.set(SAMPLE_ID, Some(CellValue::Integer(id)))?;
    }
    Ok(())
}

/// Populated fields of a record as a JSON object.
fn record_fields<T: Serialize>(record: &T) -> Result<Map<String, Value>, SchemaError> {
    // ---
    match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(SchemaError::validation("<record>", "did not serialize to an object")),
        Err(e) => Err(SchemaError::validation("<record>", e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::rows::ColumnType;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn create_test_sample(extra: Value) -> SampleModel {
        // ---
        let mut input = json!({
            "source": "field-app",
            "timestamp": "2025-03-26T18:45:00Z",
            "name": "Creek outfall",
            "latitude": 32.78,
            "organization_id": 7,
            "answers": [
                {"key": "q1_depth", "question_text": "Depth (m)?", "value_numeric": 1.5, "answer_order": 1},
                {"key": "q2_odor", "value_boolean": true, "answer_order": 2}
            ],
            "attachments": [
                {"filename": "site.jpg", "storage_type": "url", "storage_url": "https://cdn.example.org/site.jpg"}
            ]
        });
        if let (Value::Object(base), Value::Object(more)) = (&mut input, extra) {
            base.extend(more);
        }
        SampleModel::parse(input).unwrap()
    }

    #[test]
    fn field_map_renames_both_ways() {
        // ---
        let map = FieldMap::standard().with("name", "sample_name");
        assert_eq!(map.column_for("timestamp"), "recorded_at");
        assert_eq!(map.column_for("city"), "city");
        assert_eq!(map.field_for("recorded_at"), "timestamp");
        assert_eq!(map.field_for("sample_name"), "name");
        assert_eq!(map.field_for("city"), "city");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn domain_to_rows_copies_matching_fields() {
        // ---
        let converter = SchemaConverter::new(FieldMap::standard());
        let rows = converter.domain_to_rows(&create_test_sample(json!({}))).unwrap();

        assert_eq!(rows.sample.name.as_deref(), Some("Creek outfall"));
        assert_eq!(rows.sample.latitude, Some(32.78));
        assert_eq!(rows.sample.organization_id, Some(7));
        assert!(rows.sample.recorded_at.is_some());
        assert_eq!(rows.sample.row_id, None);
        assert_eq!(rows.sample.attributes, Some(json!({})));
        assert_eq!(rows.sample.longitude, None);

        assert_eq!(rows.answers.len(), 2);
        assert_eq!(rows.answers[0].value_numeric, Some(1.5));
        assert_eq!(rows.answers[1].value_boolean, Some(true));
        assert_eq!(rows.answers[1].value_text, None);
        assert_eq!(rows.answers[0].sample_id, None);

        let att = &rows.attachments[0];
        assert_eq!(att.storage_type.as_deref(), Some("url"));
        assert_eq!(att.storage_url.as_deref(), Some("https://cdn.example.org/site.jpg"));
    }

    #[test]
    fn unknown_fields_are_dropped() {
        // ---
        let converter = SchemaConverter::new(FieldMap::standard());
        let sample = create_test_sample(json!({"firmware": "7.02"}));
        assert_eq!(sample.extra["firmware"], json!("7.02"));

        let rows = converter.domain_to_rows(&sample).unwrap();
        let back = converter.row_to_domain(&rows.sample).unwrap();
        assert!(!back.extra.contains_key("firmware"));
    }

    #[test]
    fn extra_key_with_wrong_type_for_column_fails() {
        // ---
        let converter = SchemaConverter::new(FieldMap::standard());
        let sample = create_test_sample(json!({"row_id": "pending"}));
        let err = converter.domain_to_rows(&sample).unwrap_err();
        assert_eq!(
            err,
            SchemaError::ColumnType {
                table: "sample",
                column: "row_id".to_string(),
                expected: ColumnType::Integer,
            }
        );
    }

    #[test]
    fn attach_children_requires_row_id() {
        // ---
        let converter = SchemaConverter::new(FieldMap::standard());
        let SampleRows {
            mut sample,
            mut answers,
            mut attachments,
        } = converter.domain_to_rows(&create_test_sample(json!({}))).unwrap();

        let err = converter
            .attach_children(&sample, &mut answers, &mut attachments)
            .unwrap_err();
        assert!(matches!(err, SchemaError::Precomposition { .. }));
        assert!(answers.iter().all(|a| a.sample_id.is_none()));

        sample.row_id = Some(41);
        converter
            .attach_children(&sample, &mut answers, &mut attachments)
            .unwrap();
        assert!(answers.iter().all(|a| a.sample_id == Some(41)));
        assert!(attachments.iter().all(|a| a.sample_id == Some(41)));
    }

    #[test]
    fn row_to_domain_nests_loaded_children() {
        // ---
        let converter = SchemaConverter::new(FieldMap::standard());
        let sample = create_test_sample(json!({}));
        let mut rows = converter.domain_to_rows(&sample).unwrap();
        rows.sample.answers = Some(rows.answers.clone());
        rows.sample.attachments = Some(rows.attachments.clone());

        let back = converter.row_to_domain(&rows.sample).unwrap();
        assert_eq!(back.answers, sample.answers);
        assert_eq!(back.attachments, sample.attachments);
    }

    #[test]
    fn row_to_domain_surfaces_validation_errors() {
        // ---
        let converter = SchemaConverter::new(FieldMap::standard());
        let mut rows = converter.domain_to_rows(&create_test_sample(json!({}))).unwrap();
        rows.sample.latitude = Some(123.0);

        let err = converter.row_to_domain(&rows.sample).unwrap_err();
        assert!(matches!(err, SchemaError::Validation { ref field, .. } if field == "latitude"));
    }

    #[test]
    fn colliding_renames_warn_before_overwriting() {
        // ---
        let converter = SchemaConverter::new(FieldMap::standard().with("name", "city"));
        let sample = create_test_sample(json!({"city": "Dallas"}));

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let rows = tracing::subscriber::with_default(subscriber, || converter.domain_to_rows(&sample))
            .unwrap();

        // Fields are visited in key order, so `name` lands last.
        assert_eq!(rows.sample.city.as_deref(), Some("Creek outfall"));
        assert_eq!(rows.sample.name, None);

        let output = logs.contents();
        assert!(output.contains("already populated"), "missing warning in: {output}");
        assert!(output.contains("column=\"city\""), "missing column in: {output}");
        assert!(output.contains("field=name"), "missing field in: {output}");
    }
}

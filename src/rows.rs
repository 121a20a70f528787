//! Flat storage rows for the `sample`, `sample_answer` and `sample_attachment`
//! tables.
//!
//! Every row type carries a static, ordered column descriptor and get/set
//! access by column name. The converter iterates the descriptor instead of
//! inspecting fields at run time, so adding a column means adding one line
//! to the `storage_row!` invocation below.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::SchemaError;

/// Primary key column shared by all tables.
pub const ROW_ID: &str = "row_id";

/// Back-reference from child rows to their sample.
pub const SAMPLE_ID: &str = "sample_id";

// ---

/// Scalar type of a storage column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
    Json,
}

impl ColumnType {
    /// PostgreSQL type used when creating the table.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Real => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMPTZ",
            ColumnType::Json => "JSONB",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "an integer",
            ColumnType::Real => "a number",
            ColumnType::Text => "text",
            ColumnType::Boolean => "a boolean",
            ColumnType::Timestamp => "an RFC 3339 timestamp",
            ColumnType::Json => "a JSON document",
        };
        f.write_str(name)
    }
}

/// One entry of a row type's column descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
}

/// A single populated cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl CellValue {
    /// Coerce a JSON value into a cell of the given column type.
    ///
    /// `Null` maps to `Ok(None)`. Integers are accepted for real columns;
    /// timestamps are read from RFC 3339 strings.
    pub fn from_json(kind: ColumnType, value: &Value) -> Result<Option<Self>, ColumnType> {
        // ---
        if value.is_null() {
            return Ok(None);
        }
        let cell = match kind {
            ColumnType::Integer => value.as_i64().map(CellValue::Integer),
            ColumnType::Real => value.as_f64().map(CellValue::Real),
            ColumnType::Text => value.as_str().map(|s| CellValue::Text(s.to_string())),
            ColumnType::Boolean => value.as_bool().map(CellValue::Boolean),
            ColumnType::Timestamp => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| CellValue::Timestamp(t.with_timezone(&Utc))),
            ColumnType::Json => Some(CellValue::Json(value.clone())),
        };
        cell.map(Some).ok_or(kind)
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Integer(v) => Value::from(*v),
            CellValue::Real(v) => Value::from(*v),
            CellValue::Text(v) => Value::String(v.clone()),
            CellValue::Boolean(v) => Value::Bool(*v),
            CellValue::Timestamp(v) => Value::String(v.to_rfc3339()),
            CellValue::Json(v) => v.clone(),
        }
    }

    pub fn kind(&self) -> ColumnType {
        match self {
            CellValue::Integer(_) => ColumnType::Integer,
            CellValue::Real(_) => ColumnType::Real,
            CellValue::Text(_) => ColumnType::Text,
            CellValue::Boolean(_) => ColumnType::Boolean,
            CellValue::Timestamp(_) => ColumnType::Timestamp,
            CellValue::Json(_) => ColumnType::Json,
        }
    }
}

/// Rust types that can back a storage column.
pub trait Cell: Sized {
    const KIND: ColumnType;

    fn to_cell(&self) -> CellValue;

    fn from_cell(cell: CellValue) -> Option<Self>;
}

macro_rules! impl_cell {
    ($ty:ty, $variant:ident) => {
        impl Cell for $ty {
            const KIND: ColumnType = ColumnType::$variant;

            fn to_cell(&self) -> CellValue {
                CellValue::$variant(self.clone())
            }

            fn from_cell(cell: CellValue) -> Option<Self> {
                match cell {
                    CellValue::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_cell!(i64, Integer);
impl_cell!(f64, Real);
impl_cell!(String, Text);
impl_cell!(bool, Boolean);
impl_cell!(DateTime<Utc>, Timestamp);
impl_cell!(Value, Json);

/// A flat row with a static column descriptor.
pub trait StorageRow: Default {
    /// Table name.
    const TABLE: &'static str;

    /// Declared columns, in table order.
    fn columns() -> &'static [Column];

    /// Current value of `column`; `None` when unset or unknown.
    fn get(&self, column: &str) -> Option<CellValue>;

    /// Set (or clear, with `None`) the value of `column`.
    fn set(&mut self, column: &str, value: Option<CellValue>) -> Result<(), SchemaError>;

    fn column(name: &str) -> Option<Column> {
        Self::columns().iter().copied().find(|c| c.name == name)
    }

    fn has_column(name: &str) -> bool {
        Self::column(name).is_some()
    }
}

/// Declare a storage row struct together with its column descriptor.
///
/// Every column becomes an `Option<T>` field where `T: Cell`. The optional
/// `relations` block adds loaded child rows that are not columns.
macro_rules! storage_row {
    (
        $(#[$meta:meta])*
        pub struct $name:ident => $table:literal {
            $($column:ident : $ty:ty),* $(,)?
        }
        $(relations { $($rel:ident : $rel_ty:ty),* $(,)? })?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
        pub struct $name {
            $(pub $column: Option<$ty>,)*
            $($(
                #[sqlx(skip)]
                pub $rel: Option<$rel_ty>,
            )*)?
        }

        impl StorageRow for $name {
            const TABLE: &'static str = $table;

            fn columns() -> &'static [Column] {
                const COLUMNS: &[Column] = &[
                    $(Column { name: stringify!($column), kind: <$ty as Cell>::KIND },)*
                ];
                COLUMNS
            }

            fn get(&self, column: &str) -> Option<CellValue> {
                match column {
                    $(stringify!($column) => self.$column.as_ref().map(Cell::to_cell),)*
                    _ => None,
                }
            }

            fn set(&mut self, column: &str, value: Option<CellValue>) -> Result<(), SchemaError> {
                match column {
                    $(stringify!($column) => {
                        self.$column = match value {
                            None => None,
                            Some(cell) => Some(<$ty as Cell>::from_cell(cell).ok_or_else(|| {
                                SchemaError::ColumnType {
                                    table: $table,
                                    column: column.to_string(),
                                    expected: <$ty as Cell>::KIND,
                                }
                            })?),
                        };
                        Ok(())
                    })*
                    _ => Err(SchemaError::UnknownColumn {
                        table: $table,
                        column: column.to_string(),
                    }),
                }
            }
        }
    };
}

storage_row! {
    /// A row of the `sample` table.
    pub struct SampleRow => "sample" {
        row_id: i64,
        source: String,
        recorded_at: DateTime<Utc>,
        external_id: String,
        plugin_id: String,
        plugin_version: String,
        name: String,
        description: String,
        sample_date: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        street_address: String,
        city: String,
        postal_code: String,
        country_code: String,
        organization_id: i64,
        collector_id: String,
        collector_name: String,
        attributes: Value,
        raw_payload: Value,
    }
    relations {
        answers: Vec<AnswerRow>,
        attachments: Vec<AttachmentRow>,
    }
}

storage_row! {
    /// A row of the `sample_answer` table.
    pub struct AnswerRow => "sample_answer" {
        row_id: i64,
        sample_id: i64,
        key: String,
        question_text: String,
        value_text: String,
        value_numeric: f64,
        value_boolean: bool,
        value_json: Value,
        answer_order: i64,
        qc_flag: i64,
        qc_comment_field: String,
        note: String,
    }
}

storage_row! {
    /// A row of the `sample_attachment` table.
    pub struct AttachmentRow => "sample_attachment" {
        row_id: i64,
        sample_id: i64,
        filename: String,
        mime_type: String,
        storage_type: String,
        storage_path: String,
        storage_bucket: String,
        storage_object_key: String,
        storage_url: String,
        storage_meta: Value,
        caption: String,
        file_size_bytes: i64,
        uploaded_by: String,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_lists_columns_in_declaration_order() {
        // ---
        let names: Vec<_> = AnswerRow::columns().iter().map(|c| c.name).collect();
        assert_eq!(names[0], ROW_ID);
        assert_eq!(names[1], SAMPLE_ID);
        assert_eq!(names.last(), Some(&"note"));
        assert_eq!(
            SampleRow::column("recorded_at").map(|c| c.kind),
            Some(ColumnType::Timestamp)
        );
        assert!(!SampleRow::has_column("answers"));
        assert!(!SampleRow::has_column("kind"));
    }

    #[test]
    fn set_then_get_by_name() {
        // ---
        let mut row = AttachmentRow::default();
        row.set("filename", Some(CellValue::Text("plot.jpg".into())))
            .unwrap();
        row.set("file_size_bytes", Some(CellValue::Integer(2048)))
            .unwrap();

        assert_eq!(row.filename.as_deref(), Some("plot.jpg"));
        assert_eq!(row.get("file_size_bytes"), Some(CellValue::Integer(2048)));
        assert_eq!(row.get("caption"), None);

        row.set("filename", None).unwrap();
        assert_eq!(row.filename, None);
    }

    #[test]
    fn set_rejects_wrong_type_and_unknown_column() {
        // ---
        let mut row = SampleRow::default();
        let err = row
            .set(ROW_ID, Some(CellValue::Text("pending".into())))
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::ColumnType {
                table: "sample",
                column: ROW_ID.to_string(),
                expected: ColumnType::Integer,
            }
        );

        let err = row.set("answers", None).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownColumn { table: "sample", .. }));
    }

    #[test]
    fn cell_from_json_coerces_by_column_type() {
        // ---
        assert_eq!(
            CellValue::from_json(ColumnType::Real, &json!(3)),
            Ok(Some(CellValue::Real(3.0)))
        );
        assert_eq!(CellValue::from_json(ColumnType::Text, &Value::Null), Ok(None));
        assert_eq!(
            CellValue::from_json(ColumnType::Integer, &json!(1.5)),
            Err(ColumnType::Integer)
        );

        let ts = CellValue::from_json(ColumnType::Timestamp, &json!("2025-03-26T18:45:00Z"))
            .unwrap()
            .unwrap();
        assert_eq!(ts.kind(), ColumnType::Timestamp);
        assert_eq!(ts.to_json(), json!("2025-03-26T18:45:00+00:00"));
    }
}

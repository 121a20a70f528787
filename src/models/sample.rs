//! Validated sample records: a sample, its answers, and its attachments.
//!
//! Input is first deserialized into loose `Raw*` structs, where every field is
//! optional and type errors carry their path. A separate `validate` step then
//! enforces required fields, ranges, lengths and storage rules. Serialization
//! emits populated fields only, which is what the converter copies into
//! storage rows.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use url::Url;

use super::de::{bounded_text, from_value, opt_datetime, required};
use crate::error::SchemaError;

const FILENAME_MAX_CHARS: usize = 255;
const ANSWER_KEY_MAX_CHARS: usize = 150;

// ---

/// A field sample as produced by a collection plugin or typed in by a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleModel {
    // ---
    pub source: String,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sample_date: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector_name: Option<String>,

    pub answers: Vec<AnswerModel>,
    pub attachments: Vec<AttachmentModel>,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<Map<String, Value>>,

    /// Input keys that matched no declared field.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sample as it arrives, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSample {
    // ---
    kind: Option<String>,
    source: Option<String>,
    #[serde(deserialize_with = "opt_datetime")]
    timestamp: Option<DateTime<Utc>>,
    external_id: Option<String>,
    plugin_id: Option<String>,
    plugin_version: Option<String>,
    name: Option<String>,
    description: Option<String>,
    #[serde(deserialize_with = "opt_datetime")]
    sample_date: Option<DateTime<Utc>>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    street_address: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    country_code: Option<String>,
    organization_id: Option<i64>,
    collector_id: Option<String>,
    collector_name: Option<String>,
    answers: Option<Vec<RawAnswer>>,
    attachments: Option<Vec<RawAttachment>>,
    attributes: Option<Map<String, Value>>,
    raw_payload: Option<Map<String, Value>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl RawSample {
    fn validate(self) -> Result<SampleModel, SchemaError> {
        // ---
        if let Some(kind) = &self.kind {
            if kind != SampleModel::KIND {
                return Err(SchemaError::validation(
                    "kind",
                    format!("must be \"{}\"", SampleModel::KIND),
                ));
            }
        }

        let source = required(self.source, "source")?;
        let timestamp = required(self.timestamp, "timestamp")?;
        let latitude = in_range(self.latitude, "latitude", -90.0, 90.0)?;
        let longitude = in_range(self.longitude, "longitude", -180.0, 180.0)?;
        if let Some(code) = &self.country_code {
            if code.chars().count() != 2 {
                return Err(SchemaError::validation(
                    "country_code",
                    "must be exactly 2 characters",
                ));
            }
        }

        let answers = self
            .answers
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, raw)| raw.validate().map_err(|e| e.within(&format!("answers[{i}]"))))
            .collect::<Result<Vec<_>, _>>()?;
        let attachments = self
            .attachments
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, raw)| raw.validate().map_err(|e| e.within(&format!("attachments[{i}]"))))
            .collect::<Result<Vec<_>, _>>()?;

        let mut extra = self.extra;
        extra.retain(|_, v| !v.is_null());

        Ok(SampleModel {
            source,
            timestamp,
            external_id: self.external_id,
            plugin_id: self.plugin_id,
            plugin_version: self.plugin_version,
            name: self.name,
            description: self.description,
            sample_date: self.sample_date.unwrap_or_else(default_sample_date),
            latitude,
            longitude,
            street_address: self.street_address,
            city: self.city,
            postal_code: self.postal_code,
            country_code: self.country_code,
            organization_id: self.organization_id,
            collector_id: self.collector_id,
            collector_name: self.collector_name,
            answers,
            attachments,
            attributes: self.attributes.unwrap_or_default(),
            raw_payload: self.raw_payload,
            extra,
        })
    }
}

impl SampleModel {
    /// Record discriminator accepted in the `kind` key.
    pub const KIND: &'static str = "samplerecord";

    /// Validate a JSON object into a sample.
    pub fn parse(value: Value) -> Result<Self, SchemaError> {
        from_value::<RawSample>(value)?.validate()
    }
}

/// Placeholder date for samples that do not carry one.
pub fn default_sample_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn in_range(value: Option<f64>, field: &str, min: f64, max: f64) -> Result<Option<f64>, SchemaError> {
    // ---
    match value {
        Some(v) if v < min || v > max => Err(SchemaError::validation(
            field,
            format!("must be between {min} and {max}"),
        )),
        other => Ok(other),
    }
}

// ---

/// The single populated value of an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AnswerValue {
    #[serde(rename = "value_text")]
    Text(String),
    #[serde(rename = "value_numeric")]
    Numeric(f64),
    #[serde(rename = "value_boolean")]
    Boolean(bool),
    #[serde(rename = "value_json")]
    Structured(Map<String, Value>),
}

/// One answered question of a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerModel {
    // ---
    /// Canonical question key such as `q1_depth`.
    pub key: String,
    pub question_text: String,
    #[serde(flatten)]
    pub value: Option<AnswerValue>,
    pub answer_order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qc_flag: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qc_comment_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnswer {
    // ---
    key: Option<String>,
    question_text: Option<String>,
    value_text: Option<String>,
    value_numeric: Option<f64>,
    value_boolean: Option<bool>,
    value_json: Option<Map<String, Value>>,
    answer_order: Option<i64>,
    qc_flag: Option<i64>,
    qc_comment_field: Option<String>,
    note: Option<String>,
}

impl RawAnswer {
    fn validate(self) -> Result<AnswerModel, SchemaError> {
        // ---
        let key = bounded_text("key", required(self.key, "key")?, ANSWER_KEY_MAX_CHARS)?;

        let mut slots: Vec<AnswerValue> = [
            self.value_text.map(AnswerValue::Text),
            self.value_numeric.map(AnswerValue::Numeric),
            self.value_boolean.map(AnswerValue::Boolean),
            self.value_json.map(AnswerValue::Structured),
        ]
        .into_iter()
        .flatten()
        .collect();
        if slots.len() > 1 {
            return Err(SchemaError::validation(
                "value",
                "at most one of value_text, value_numeric, value_boolean, value_json may be set",
            ));
        }

        Ok(AnswerModel {
            key,
            question_text: self.question_text.unwrap_or_default(),
            value: slots.pop(),
            answer_order: self.answer_order.unwrap_or(0),
            qc_flag: self.qc_flag,
            qc_comment_field: self.qc_comment_field,
            note: self.note,
        })
    }
}

impl AnswerModel {
    pub fn parse(value: Value) -> Result<Self, SchemaError> {
        from_value::<RawAnswer>(value)?.validate()
    }
}

// ---

/// Where an attachment's bytes live.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "storage_type", rename_all = "snake_case")]
pub enum StorageLocation {
    Local {
        #[serde(rename = "storage_path")]
        path: String,
    },
    S3 {
        #[serde(rename = "storage_bucket")]
        bucket: String,
        #[serde(rename = "storage_object_key")]
        key: String,
    },
    Gcs {
        #[serde(rename = "storage_bucket")]
        bucket: String,
        #[serde(rename = "storage_object_key")]
        key: String,
    },
    AzureBlob {
        #[serde(rename = "storage_bucket")]
        bucket: String,
        #[serde(rename = "storage_object_key")]
        key: String,
    },
    Url {
        #[serde(rename = "storage_url", serialize_with = "url_as_str")]
        url: Url,
    },
}

fn url_as_str<S: Serializer>(url: &Url, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(url.as_str())
}

/// Raw location fields as they arrive, before the storage kind is checked.
struct LocationFields {
    path: Option<String>,
    bucket: Option<String>,
    key: Option<String>,
    url: Option<String>,
}

impl StorageLocation {
    fn from_fields(kind: Option<String>, f: LocationFields) -> Result<Option<Self>, SchemaError> {
        // ---
        let Some(kind) = kind else {
            if f.path.is_some() || f.bucket.is_some() || f.key.is_some() || f.url.is_some() {
                return Err(SchemaError::validation(
                    "storage_type",
                    "required when a storage location is given",
                ));
            }
            return Ok(None);
        };

        let location = match kind.as_str() {
            "local" => {
                reject_unused(&kind, &[("storage_bucket", &f.bucket), ("storage_object_key", &f.key), ("storage_url", &f.url)])?;
                StorageLocation::Local {
                    path: required_for(f.path, "storage_path", &kind)?,
                }
            }
            "s3" | "gcs" | "azure_blob" => {
                reject_unused(&kind, &[("storage_path", &f.path), ("storage_url", &f.url)])?;
                let bucket = required_for(f.bucket, "storage_bucket", &kind)?;
                let key = required_for(f.key, "storage_object_key", &kind)?;
                match kind.as_str() {
                    "s3" => StorageLocation::S3 { bucket, key },
                    "gcs" => StorageLocation::Gcs { bucket, key },
                    _ => StorageLocation::AzureBlob { bucket, key },
                }
            }
            "url" => {
                reject_unused(&kind, &[("storage_path", &f.path), ("storage_bucket", &f.bucket), ("storage_object_key", &f.key)])?;
                let raw = required_for(f.url, "storage_url", &kind)?;
                let url = Url::parse(&raw)
                    .map_err(|e| SchemaError::validation("storage_url", format!("invalid URL: {e}")))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(SchemaError::validation(
                        "storage_url",
                        "URL scheme must be http or https",
                    ));
                }
                StorageLocation::Url { url }
            }
            _ => {
                return Err(SchemaError::validation(
                    "storage_type",
                    "must be one of local, s3, gcs, azure_blob, url",
                ))
            }
        };
        Ok(Some(location))
    }
}

fn required_for(value: Option<String>, field: &str, kind: &str) -> Result<String, SchemaError> {
    value.ok_or_else(|| SchemaError::validation(field, format!("required for {kind} storage")))
}

fn reject_unused(kind: &str, fields: &[(&str, &Option<String>)]) -> Result<(), SchemaError> {
    // ---
    match fields.iter().find(|(_, value)| value.is_some()) {
        Some((field, _)) => Err(SchemaError::validation(
            *field,
            format!("not used by {kind} storage"),
        )),
        None => Ok(()),
    }
}

/// A file attached to a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentModel {
    // ---
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(flatten)]
    pub storage: Option<StorageLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_meta: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAttachment {
    // ---
    filename: Option<String>,
    mime_type: Option<String>,
    storage_type: Option<String>,
    storage_path: Option<String>,
    storage_bucket: Option<String>,
    storage_object_key: Option<String>,
    storage_url: Option<String>,
    storage_meta: Option<Map<String, Value>>,
    caption: Option<String>,
    file_size_bytes: Option<i64>,
    uploaded_by: Option<String>,
}

impl RawAttachment {
    fn validate(self) -> Result<AttachmentModel, SchemaError> {
        // ---
        let filename = bounded_text("filename", required(self.filename, "filename")?, FILENAME_MAX_CHARS)?;

        let fields = LocationFields {
            path: self.storage_path,
            bucket: self.storage_bucket,
            key: self.storage_object_key,
            url: self.storage_url,
        };
        let storage = StorageLocation::from_fields(self.storage_type, fields)?;

        if matches!(self.file_size_bytes, Some(size) if size < 0) {
            return Err(SchemaError::validation("file_size_bytes", "must not be negative"));
        }

        Ok(AttachmentModel {
            filename,
            mime_type: self.mime_type,
            storage,
            storage_meta: self.storage_meta,
            caption: self.caption,
            file_size_bytes: self.file_size_bytes,
            uploaded_by: self.uploaded_by,
        })
    }
}

impl AttachmentModel {
    pub fn parse(value: Value) -> Result<Self, SchemaError> {
        from_value::<RawAttachment>(value)?.validate()
    }
}

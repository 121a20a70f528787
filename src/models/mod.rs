//! Domain records: validated sample records and platform observations.

mod de;
mod platform;
mod sample;

pub use platform::{BaseRecord, DataRecord, PlatformDataRecord, PlatformRecord};
pub use sample::{
    default_sample_date, AnswerModel, AnswerValue, AttachmentModel, SampleModel, StorageLocation,
};

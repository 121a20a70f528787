//! Client and storage utilities for PurpleAir air-quality data.
//!
//! Two independent halves:
//! - [`api`]: an async client for the PurpleAir v1 REST API.
//! - [`models`], [`rows`] and [`convert`]: validated sample records and
//!   their conversion to and from flat storage rows, persisted by
//!   [`schema`] and [`store`].

pub mod api;
pub mod config;
pub mod convert;
pub mod error;
pub mod models;
pub mod rows;
pub mod schema;
pub mod store;

pub use api::{ApiResponse, ClientOptions, PurpleAirClient};
pub use config::Config;
pub use convert::{FieldMap, SampleRows, SchemaConverter};
pub use error::{ApiError, ErrorBody, RemoteApiError, RemoteErrorKind, SchemaError};

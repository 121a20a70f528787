//! PurpleAir REST API client.

mod client;
mod fields;
mod lines;
mod request;
mod transport;

pub use client::{
    ApiResponse, ClientOptions, HistoryQuery, PurpleAirClient, SensorsQuery, DEFAULT_BASE_URL,
    DEFAULT_TIMEOUT,
};
pub use fields::{Average, FieldGroup};
pub use lines::LineStream;
pub use request::{ApiRequest, Method, QueryParams};
pub use transport::{BoxError, RawResponse, ReqwestBody, ReqwestTransport, ResponseBody, Transport};

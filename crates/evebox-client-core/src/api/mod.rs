//! REST API client module for the EveBox server.
//!
//! This module provides the `ApiClient` facade and the `RequestPipeline`
//! every call runs through. Authentication is a session id obtained from
//! `api/1/login` and sent back in the `x-evebox-session-id` header.

pub mod client;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, PcapSource};
pub use error::ApiError;
pub use pipeline::{
    ClientObserver, LogNavigator, Navigator, RequestPipeline, ResponseBody, TracingObserver,
    SESSION_HEADER, VERSION_HEADER,
};
pub use query::{
    AlertQueryOptions, EventQueryOptions, FlowHistogramOptions, QueryParams, ReportAggOptions,
    ReportHistogramOptions,
};
pub use transport::{HttpResponse, RequestBody, RequestOptions, ReqwestTransport, Transport};

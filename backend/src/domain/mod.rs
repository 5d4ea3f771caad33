//! Domain core: normalized models, ports, and the enrichment services.
//!
//! Nothing in this tree depends on actix, Diesel, or reqwest; adapters live
//! under `outbound/` and `inbound/` and meet the domain at the port traits.

mod cancel;
pub mod credentials;
mod descriptor;
pub mod dispatch;
mod error;
mod job;
pub mod jobs;
pub mod normalize;
mod operation;
pub mod ports;
mod records;
pub mod registry;
mod request;
mod response;

pub use cancel::CancelToken;
pub use descriptor::{ProviderDescriptor, ProviderFeature};
pub use error::{Error, ErrorCode};
pub use job::{
    DisplayStatus, JobLogEntry, JobLogLevel, JobProgress, JobRecord, JobStatus,
};
pub use operation::{Operation, ProviderCategory};
pub use records::{CanonicalCompany, CanonicalPerson};
pub use request::{DEFAULT_REQUEST_TIMEOUT, EnrichmentRequest, RequestOptions};
pub use response::{EnrichmentResponse, ResponseMetadata};

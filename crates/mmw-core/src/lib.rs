//! Shared types for the ModelMW client: job descriptors and records, the failure
//! taxonomy, area-of-interest identifiers and the endpoint catalogue.

pub mod aoi;
pub mod endpoints;
pub mod error;
pub mod types;

pub use aoi::{AoiError, AreaOfInterest};
pub use endpoints::EndpointFamily;
pub use error::{JobFailure, RecordError};
pub use types::{JobDescriptor, JobRecord, JobStatus, ModelPackage, Payload};

//! Client for the ModelMyWatershed geoprocessing service.
//!
//! Jobs are submitted, polled and persisted by [`ModelMwClient`]; individual
//! requests are retried by the [`Executor`] on top of the blind retries of the
//! [`Transport`].

pub mod batch;
pub mod cache;
pub mod client;
pub mod controller;
pub mod error;
pub mod executor;
pub mod interrupt;
pub mod normalize;
pub mod projects;
pub mod throttle;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::GwlfeRun;
pub use cache::{CachedJob, ResultCache, dump_file_name};
pub use client::ModelMwClient;
pub use controller::JobRun;
pub use error::ClientError;
pub use executor::{Executor, Outcome, RetryPolicy};
pub use interrupt::Interrupt;
pub use normalize::Normalizer;
pub use projects::{LayerOverrides, ProjectRequest};
pub use throttle::{DetailThrottle, FailedResponse, ThrottleInterpreter};
pub use transport::{PreparedRequest, RawResponse, ReqwestTransport, RequestBody, Transport, TransportError};

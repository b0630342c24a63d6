use mmw_core::RecordError;

/// Caller mistakes and setup failures.
///
/// Anything the remote service does (bad statuses, throttling, broken jobs) is
/// recorded in the job record instead of surfacing here.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error(
        "Endpoint '{0}' does not belong to a known family (api/, mmw/modeling/projects/, mmw/modeling/)"
    )]
    UnknownEndpoint(String),

    #[error("Endpoint '{0}' expects a JSON body but was given a pre-encoded form")]
    FormForJsonEndpoint(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid value for header '{0}'")]
    InvalidHeader(&'static str),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Record(#[from] RecordError),
}

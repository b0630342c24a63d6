//! Turns (endpoint, payload) into a fully resolved request.
//!
//! Headers are computed per request from the endpoint family and the session
//! state (API key, CSRF token); nothing here mutates shared headers between
//! calls, so two jobs on different families can be prepared in any order.

use std::sync::{PoisonError, RwLock};

use reqwest::Method;
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
    ORIGIN, PRAGMA, REFERER, USER_AGENT,
};
use serde_json::{Map, Value};

use mmw_core::endpoints::{self, EndpointFamily};
use mmw_core::{JobDescriptor, Payload};

use crate::error::ClientError;
use crate::transport::{PreparedRequest, RequestBody};

const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");
const X_CSRF_TOKEN: HeaderName = HeaderName::from_static("x-csrftoken");

fn user_agent() -> String {
    format!("modelmw-client/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug)]
pub struct Normalizer {
    host: String,
    api_key: Option<String>,
    csrf_token: RwLock<Option<String>>,
}

impl Normalizer {
    pub fn new(host: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            api_key,
            csrf_token: RwLock::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path.trim_start_matches('/'))
    }

    pub fn set_csrf_token(&self, token: impl Into<String>) {
        let mut guard = self
            .csrf_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(token.into());
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.csrf_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Build a request for `endpoint`, encoding `payload` the way its family expects.
    pub fn normalize(
        &self,
        method: Method,
        endpoint: &str,
        payload: Option<&Payload>,
    ) -> Result<PreparedRequest, ClientError> {
        let family = EndpointFamily::classify(endpoint)
            .ok_or_else(|| ClientError::UnknownEndpoint(endpoint.to_string()))?;

        let mut headers = self.session_headers(&self.url(family.referer_path()))?;
        let body = match payload {
            None => None,
            Some(payload) => Some(encode_body(family, endpoint, payload)?),
        };
        if let Some(body) = &body {
            let content_type = match body {
                RequestBody::Json(_) => JSON_CONTENT_TYPE,
                RequestBody::Form(_) => FORM_CONTENT_TYPE,
            };
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        Ok(PreparedRequest {
            method,
            url: self.url(endpoint),
            headers,
            body,
            timeout: None,
        })
    }

    /// Submission POST for a job.
    pub fn submission(&self, descriptor: &JobDescriptor) -> Result<PreparedRequest, ClientError> {
        self.normalize(Method::POST, descriptor.endpoint(), descriptor.payload())
    }

    /// Status GET for a job submitted to `endpoint`.
    pub fn poll_request(
        &self,
        endpoint: &str,
        job_id: &str,
    ) -> Result<PreparedRequest, ClientError> {
        let family = EndpointFamily::classify(endpoint)
            .ok_or_else(|| ClientError::UnknownEndpoint(endpoint.to_string()))?;
        let path = format!("{}{}/", family.jobs_root(), job_id);
        self.normalize(Method::GET, &path, None)
    }

    pub fn login_request(&self, user: &str, password: &str) -> Result<PreparedRequest, ClientError> {
        let mut headers = self.session_headers(&self.host)?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let form = format!(
            "username={}&password={}",
            urlencoding::encode(user),
            urlencoding::encode(password)
        );

        Ok(PreparedRequest {
            method: Method::POST,
            url: self.url(endpoints::LOGIN),
            headers,
            body: Some(RequestBody::Form(form)),
            timeout: None,
        })
    }

    fn session_headers(&self, referer: &str) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(X_REQUESTED_WITH, HeaderValue::from_static("XMLHttpRequest"));
        headers.insert(USER_AGENT, header_value("User-Agent", &user_agent())?);
        headers.insert(ORIGIN, header_value("Origin", &self.host)?);
        headers.insert(REFERER, header_value("Referer", referer)?);
        if let Some(key) = &self.api_key {
            let mut value = header_value("Authorization", &format!("Token {key}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        if let Some(token) = self.csrf_token() {
            headers.insert(X_CSRF_TOKEN, header_value("X-CSRFToken", &token)?);
        }
        Ok(headers)
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name))
}

fn encode_body(
    family: EndpointFamily,
    endpoint: &str,
    payload: &Payload,
) -> Result<RequestBody, ClientError> {
    match (family.uses_json(), payload) {
        (true, Payload::Fields(value)) => Ok(RequestBody::Json(value.clone())),
        (true, Payload::Form(_)) => Err(ClientError::FormForJsonEndpoint(endpoint.to_string())),
        (false, Payload::Form(form)) => Ok(RequestBody::Form(form.clone())),
        (false, Payload::Fields(Value::Object(fields))) => Ok(RequestBody::Form(form_encode(fields))),
        (false, Payload::Fields(_)) => Err(ClientError::InvalidRequest(format!(
            "form endpoint '{endpoint}' needs a key-value payload"
        ))),
    }
}

/// `application/x-www-form-urlencoded` body: strings verbatim, other values as
/// compact JSON.
pub fn form_encode(fields: &Map<String, Value>) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&text)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

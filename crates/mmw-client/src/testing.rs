//! In-memory transport that replays a fixed script of responses.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::transport::{PreparedRequest, RawResponse, Transport, TransportError};

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    sent: Mutex<Vec<PreparedRequest>>,
    cookies: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn json(self, status: u16, body: Value) -> Self {
        self.text(status, &body.to_string())
    }

    pub(crate) fn text(self, status: u16, body: &str) -> Self {
        self.push(Ok(RawResponse {
            status,
            url: String::new(),
            headers: HeaderMap::new(),
            body: body.to_string(),
        }))
    }

    pub(crate) fn error(self, err: TransportError) -> Self {
        self.push(Err(err))
    }

    pub(crate) fn timeout(self) -> Self {
        self.error(TransportError::Timeout {
            url: "scripted".into(),
        })
    }

    pub(crate) fn cookie(self, name: &str, value: &str) -> Self {
        self.cookies
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        self
    }

    fn push(self, entry: Result<RawResponse, TransportError>) -> Self {
        self.script.lock().unwrap().push_back(entry);
        self
    }

    pub(crate) fn requests(&self) -> Vec<PreparedRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(mut response)) => {
                response.url = request.url.clone();
                Ok(response)
            }
            Some(Err(err)) => Err(err),
            None => Err(TransportError::Other {
                url: request.url.clone(),
                message: "script exhausted".into(),
            }),
        }
    }

    fn cookie(&self, _url: &str, name: &str) -> Option<String> {
        self.cookies
            .lock()
            .unwrap()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }
}

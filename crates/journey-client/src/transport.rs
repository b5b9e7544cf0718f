use std::time::Duration;

use journey_protocol::ErrorBody;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::{Instant, timeout};

use crate::error::ClientError;

pub(crate) fn build_client() -> Result<Client, ClientError> {
    Client::builder()
        .build()
        .map_err(|e| ClientError::Build(e.to_string()))
}

pub(crate) struct RawResponse {
    pub(crate) status: StatusCode,
    pub(crate) body: Vec<u8>,
}

/// Send a request with `limit` as a hard cap over connect, send, and body read.
pub(crate) async fn execute(req: RequestBuilder, limit: Duration) -> Result<RawResponse, ClientError> {
    let started = Instant::now();
    let response = match timeout(limit, req.send()).await {
        Ok(Ok(r)) => r,
        Ok(Err(e)) if e.is_timeout() => return Err(ClientError::Timeout(limit)),
        Ok(Err(e)) => return Err(ClientError::Connection(e.to_string())),
        Err(_) => return Err(ClientError::Timeout(limit)),
    };
    let status = response.status();
    let remaining = limit.saturating_sub(started.elapsed());
    let body = match timeout(remaining, response.bytes()).await {
        Ok(Ok(bytes)) => bytes.to_vec(),
        Ok(Err(e)) => return Err(ClientError::Connection(format!("read body: {e}"))),
        Err(_) => return Err(ClientError::Timeout(limit)),
    };
    Ok(RawResponse { status, body })
}

impl RawResponse {
    /// Decode a success body, or turn an error status into `ClientError::Api`.
    pub(crate) fn json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        if !self.status.is_success() {
            return Err(self.api_error());
        }
        self.decode()
    }

    pub(crate) fn decode<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub(crate) fn api_error(&self) -> ClientError {
        let status = self.status.as_u16();
        match serde_json::from_slice::<ErrorBody>(&self.body) {
            Ok(body) => ClientError::Api {
                status,
                code: body.code,
                message: body.message,
            },
            Err(_) => ClientError::Api {
                status,
                code: "http_error".into(),
                message: String::from_utf8_lossy(&self.body).into_owned(),
            },
        }
    }
}

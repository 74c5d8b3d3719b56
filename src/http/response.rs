//! Buffered downstream response.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::http::error::{ClientError, ClientResult};

/// A downstream response with its body fully read.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Attempts it took to obtain this response (1 = no retry).
    pub attempts: u32,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.as_u16() < 400
    }

    /// Body as UTF-8 text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        serde_json::from_slice(&self.body).map_err(ClientError::Decode)
    }

    /// Turn a 4xx response into [`ClientError::ClientStatus`].
    pub fn error_for_status(self) -> ClientResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::ClientStatus {
                status: self.status,
                body: self.text(),
            })
        }
    }
}

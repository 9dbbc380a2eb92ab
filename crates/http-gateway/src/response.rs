//! Buffered backend response

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// A completed HTTP exchange with its body fully read.
///
/// Buffered so one response can be handed to every deduplicated caller.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Category {
        id: u32,
        name: String,
    }

    #[test]
    fn json_decodes_body() {
        let response = Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(br#"[{"id":1,"name":"Plumbing"}]"#),
        );
        let categories: Vec<Category> = response.json().unwrap();
        assert_eq!(
            categories,
            vec![Category {
                id: 1,
                name: "Plumbing".into()
            }]
        );
    }

    #[test]
    fn json_reports_decode_error() {
        let response = Response::new(StatusCode::OK, HeaderMap::new(), Bytes::from_static(b"<html>"));
        let result: Result<Vec<Category>> = response.json();
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn text_is_lossy() {
        let response = Response::new(
            StatusCode::BAD_REQUEST,
            HeaderMap::new(),
            Bytes::from_static(b"bad \xff input"),
        );
        assert_eq!(response.text(), "bad \u{fffd} input");
    }
}

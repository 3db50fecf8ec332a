//! Response classification and body decoding.
//!
//! # Design
//! Classification looks only at the status code. A failure never attempts
//! data-type decoding: the body, read as text, is the error message. A
//! success is decoded according to `DataType`, and a decode failure is
//! returned as an ordinary `RequestError` so it takes the same completion
//! path as a status failure.

use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::transport::ResponseHead;

/// Status codes at or above this value are protocol failures.
pub const FAILURE_STATUS: u16 = 400;

/// How a successful response body is decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Raw accumulated payload, unchanged.
    #[default]
    Text,
    /// Parsed as a JSON document.
    Json,
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Binary(Bytes),
    Text(String),
    Json(serde_json::Value),
}

impl Payload {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Binary(bytes) => Some(bytes),
            Payload::Text(text) => Some(text.as_bytes()),
            Payload::Json(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Binary(bytes) => bytes.is_empty(),
            Payload::Text(text) => text.is_empty(),
            Payload::Json(_) => false,
        }
    }

    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        match self {
            Payload::Binary(bytes) => String::from_utf8_lossy(bytes),
            Payload::Text(text) => Cow::Borrowed(text),
            Payload::Json(value) => Cow::Owned(value.to_string()),
        }
    }
}

pub fn is_failure(status: u16) -> bool {
    status >= FAILURE_STATUS
}

/// Classify a finished response and decode its body.
pub fn parse_response(
    head: &ResponseHead,
    body: Payload,
    data_type: DataType,
) -> Result<Payload, RequestError> {
    if is_failure(head.status) {
        return Err(RequestError::Status {
            status: head.status,
            message: failure_message(head, &body),
        });
    }
    decode(body, data_type)
}

/// Decode a successful body as `data_type`.
pub fn decode(body: Payload, data_type: DataType) -> Result<Payload, RequestError> {
    match data_type {
        DataType::Text => Ok(body),
        DataType::Json => {
            let parsed = match body {
                Payload::Binary(bytes) => serde_json::from_slice(&bytes),
                Payload::Text(text) => serde_json::from_str(&text),
                Payload::Json(value) => return Ok(Payload::Json(value)),
            };
            parsed
                .map(Payload::Json)
                .map_err(|e| RequestError::Decode(e.to_string()))
        }
    }
}

fn failure_message(head: &ResponseHead, body: &Payload) -> String {
    if !body.is_empty() {
        return body.to_text_lossy().into_owned();
    }
    if !head.reason.is_empty() {
        return head.reason.clone();
    }
    format!("HTTP {}", head.status)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn head(status: u16, reason: &str) -> ResponseHead {
        ResponseHead {
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
        }
    }

    fn binary(s: &'static str) -> Payload {
        Payload::Binary(Bytes::from_static(s.as_bytes()))
    }

    #[test]
    fn json_success_is_parsed() {
        let data = parse_response(&head(200, "OK"), binary(r#"{"ok":true}"#), DataType::Json).unwrap();
        assert_eq!(data, Payload::Json(json!({"ok": true})));
    }

    #[test]
    fn text_success_is_unchanged() {
        let data = parse_response(&head(200, "OK"), binary("plain"), DataType::Text).unwrap();
        assert_eq!(data, binary("plain"));

        let text = Payload::Text("plain".into());
        let data = parse_response(&head(204, ""), text.clone(), DataType::Text).unwrap();
        assert_eq!(data, text);
    }

    #[test]
    fn failure_uses_body_not_json_decoding() {
        let err = parse_response(&head(404, "Not Found"), binary("not found"), DataType::Json).unwrap_err();
        assert_eq!(
            err,
            RequestError::Status {
                status: 404,
                message: "not found".to_string()
            }
        );
        assert_eq!(err.to_string(), "not found");
    }

    #[test]
    fn failure_with_empty_body_falls_back_to_reason() {
        let err = parse_response(&head(500, "Internal Server Error"), binary(""), DataType::Text).unwrap_err();
        assert_eq!(err.to_string(), "Internal Server Error");

        let err = parse_response(&head(599, ""), binary(""), DataType::Text).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 599");
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let err = parse_response(&head(200, "OK"), binary("not-json"), DataType::Json).unwrap_err();
        assert!(matches!(err, RequestError::Decode(_)));
    }

    #[test]
    fn empty_json_body_is_decode_error() {
        let err = parse_response(&head(200, "OK"), Payload::Text(String::new()), DataType::Json).unwrap_err();
        assert!(matches!(err, RequestError::Decode(_)));
    }

    #[test]
    fn boundary_is_400() {
        assert!(!is_failure(399));
        assert!(is_failure(400));
    }
}

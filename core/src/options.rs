//! Construction options and their validation.
//!
//! # Design
//! `RequestOptions` is the loose, caller-facing record: it can be built in
//! code or deserialized from JSON, and every field is optional. `normalize`
//! validates it once and produces `Options`, the immutable record a
//! `Request` keeps for its whole life. All validation failures surface here,
//! before any network activity.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::chunks::Encoding;
use crate::error::OptionsError;
use crate::parse::DataType;
use crate::transport::ConnectParams;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }

    /// GET and HEAD never carry a request body.
    pub fn allows_body(self) -> bool {
        !matches!(self, Method::Get | Method::Head)
    }
}

impl FromStr for Method {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(OptionsError::UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing construction options.
///
/// Either `url` or `hostname` must be set. Discrete fields override the
/// matching component of `url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    pub url: Option<String>,
    #[serde(alias = "host")]
    pub hostname: Option<String>,
    pub path: Option<String>,
    pub port: Option<u16>,
    /// `http` or `https`, with or without a trailing colon.
    pub protocol: Option<String>,
    /// Case-insensitive; defaults to `GET`.
    pub method: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Shortcut merged into `headers` as `content-type`.
    #[serde(alias = "contentType")]
    pub content_type: Option<String>,
    #[serde(alias = "dataType")]
    pub data_type: DataType,
    /// Keep-alive interval in milliseconds; `0` disables keep-alive.
    #[serde(alias = "keepAlive")]
    pub keep_alive: u64,
    /// Decode response fragments as text. Unset keeps them binary.
    pub encoding: Option<Encoding>,
}

impl RequestOptions {
    pub fn new(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Self::default()
        }
    }

    /// Parse a loosely typed options document.
    pub fn from_value(value: serde_json::Value) -> Result<Self, OptionsError> {
        if !value.is_object() {
            return Err(OptionsError::InvalidOptions(format!(
                "expected an options object, got {value}"
            )));
        }
        serde_json::from_value(value).map_err(|e| OptionsError::InvalidOptions(e.to_string()))
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn keep_alive(mut self, millis: u64) -> Self {
        self.keep_alive = millis;
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Validate and resolve into the immutable `Options` record.
    pub fn normalize(self) -> Result<Options, OptionsError> {
        let method = match &self.method {
            Some(m) => m.parse()?,
            None => Method::Get,
        };

        let mut secure = false;
        let mut host = None;
        let mut port = None;
        let mut path = None;

        if let Some(raw) = &self.url {
            let url = Url::parse(raw).map_err(|e| OptionsError::InvalidUrl {
                url: raw.clone(),
                reason: e.to_string(),
            })?;
            secure = parse_protocol(url.scheme())?;
            host = Some(
                url.host_str()
                    .ok_or_else(|| OptionsError::InvalidUrl {
                        url: raw.clone(),
                        reason: "missing host".to_string(),
                    })?
                    .to_string(),
            );
            port = url.port();
            path = Some(match url.query() {
                Some(query) => format!("{}?{query}", url.path()),
                None => url.path().to_string(),
            });
        }

        if let Some(protocol) = &self.protocol {
            secure = parse_protocol(protocol)?;
        }
        if let Some(hostname) = &self.hostname {
            host = Some(hostname.clone());
        }
        let host = host
            .filter(|h| !h.is_empty())
            .ok_or(OptionsError::MissingDestination)?;
        if self.port.is_some() {
            port = self.port;
        }
        if let Some(p) = &self.path {
            path = Some(p.clone());
        }
        let path = match path {
            Some(p) if p.starts_with('/') => p,
            Some(p) => format!("/{p}"),
            None => "/".to_string(),
        };

        let mut headers: Vec<(String, String)> = self
            .headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .filter(|(k, _)| self.content_type.is_none() || k != "content-type")
            .collect();
        if let Some(content_type) = self.content_type {
            headers.push(("content-type".to_string(), content_type));
        }

        Ok(Options {
            method,
            secure,
            host,
            port: port.unwrap_or(if secure { 443 } else { 80 }),
            path,
            headers,
            data_type: self.data_type,
            keep_alive: (self.keep_alive > 0).then(|| Duration::from_millis(self.keep_alive)),
            encoding: self.encoding,
        })
    }
}

fn parse_protocol(protocol: &str) -> Result<bool, OptionsError> {
    match protocol.trim_end_matches(':').to_ascii_lowercase().as_str() {
        "http" => Ok(false),
        "https" => Ok(true),
        other => Err(OptionsError::UnsupportedProtocol(other.to_string())),
    }
}

/// Validated, immutable options held by a `Request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub method: Method,
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Lower-cased names.
    pub headers: Vec<(String, String)>,
    pub data_type: DataType,
    pub keep_alive: Option<Duration>,
    pub encoding: Option<Encoding>,
}

impl Options {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            secure: self.secure,
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            method: self.method,
            headers: self.headers.clone(),
            keep_alive: self.keep_alive,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn url_resolves_components() {
        let opts = RequestOptions::new("https://api.example.com/v1/items?limit=2")
            .normalize()
            .unwrap();
        assert!(opts.secure);
        assert_eq!(opts.host, "api.example.com");
        assert_eq!(opts.port, 443);
        assert_eq!(opts.path, "/v1/items?limit=2");
        assert_eq!(opts.method, Method::Get);
        assert_eq!(opts.data_type, DataType::Text);
        assert_eq!(opts.keep_alive, None);
    }

    #[test]
    fn discrete_fields_without_url() {
        let opts = RequestOptions {
            hostname: Some("localhost".into()),
            port: Some(3000),
            path: Some("status".into()),
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert!(!opts.secure);
        assert_eq!(opts.port, 3000);
        assert_eq!(opts.path, "/status");
        assert_eq!(opts.connect_params().url(), "http://localhost:3000/status");
    }

    #[test]
    fn discrete_fields_override_url() {
        let opts = RequestOptions {
            url: Some("http://a.example/x".into()),
            hostname: Some("b.example".into()),
            protocol: Some("https:".into()),
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert_eq!(opts.connect_params().url(), "https://b.example/x");
    }

    #[test]
    fn method_is_case_normalized() {
        let opts = RequestOptions::new("http://x.test/").method("post").normalize().unwrap();
        assert_eq!(opts.method, Method::Post);
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = RequestOptions::new("http://x.test/").method("FETCH").normalize().unwrap_err();
        assert_eq!(err, OptionsError::UnknownMethod("FETCH".into()));
    }

    #[test]
    fn missing_destination_is_rejected() {
        let err = RequestOptions::default().normalize().unwrap_err();
        assert_eq!(err, OptionsError::MissingDestination);
    }

    #[test]
    fn bad_url_and_protocol_are_rejected() {
        assert!(matches!(
            RequestOptions::new("not a url").normalize(),
            Err(OptionsError::InvalidUrl { .. })
        ));
        assert_eq!(
            RequestOptions::new("ftp://x.test/").normalize().unwrap_err(),
            OptionsError::UnsupportedProtocol("ftp".into())
        );
    }

    #[test]
    fn content_type_shortcut_wins_over_header() {
        let opts = RequestOptions::new("http://x.test/")
            .header("Content-Type", "text/plain")
            .header("X-Trace", "1")
            .content_type("application/json")
            .normalize()
            .unwrap();
        assert_eq!(opts.header("content-type"), Some("application/json"));
        assert_eq!(opts.header("x-trace"), Some("1"));
        assert_eq!(opts.headers.len(), 2);
    }

    #[test]
    fn keep_alive_zero_disables() {
        let off = RequestOptions::new("http://x.test/").normalize().unwrap();
        assert_eq!(off.keep_alive, None);
        let on = RequestOptions::new("http://x.test/").keep_alive(1500).normalize().unwrap();
        assert_eq!(on.keep_alive, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn json_document_with_camel_case_fields() {
        let opts = RequestOptions::from_value(json!({
            "url": "http://x.test/data",
            "method": "put",
            "dataType": "json",
            "keepAlive": 1000,
            "encoding": "utf-8",
            "headers": {"Accept": "application/json"}
        }))
        .unwrap()
        .normalize()
        .unwrap();
        assert_eq!(opts.method, Method::Put);
        assert_eq!(opts.data_type, DataType::Json);
        assert_eq!(opts.encoding, Some(Encoding::Utf8));
        assert_eq!(opts.header("accept"), Some("application/json"));
    }

    #[test]
    fn json_document_shape_errors() {
        assert!(matches!(
            RequestOptions::from_value(json!({"url": 42})),
            Err(OptionsError::InvalidOptions(_))
        ));
        assert!(matches!(
            RequestOptions::from_value(json!({"url": "http://x.test/", "headers": ["a"]})),
            Err(OptionsError::InvalidOptions(_))
        ));
        assert!(matches!(
            RequestOptions::from_value(json!("http://x.test/")),
            Err(OptionsError::InvalidOptions(_))
        ));
    }
}

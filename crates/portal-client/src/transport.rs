//! HTTP seam between the client layer and the wire.
//!
//! Every component takes a [`Transport`] rather than a concrete HTTP client
//! so tests can swap in a mock and never touch the network. The production
//! implementation is [`HttpTransport`], a thin wrapper over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;

use crate::error::{PortalError, Result};

pub const ACCEPT_JSON: (&str, &str) = ("Accept", "application/json");
pub const CONTENT_TYPE_JSON: (&str, &str) = ("Content-Type", "application/json");

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    /// Form-encoded key/value pairs (hub and JSF logins).
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
    /// `name=value` pairs parsed from `Set-Cookie` response headers.
    pub cookies: Vec<(String, String)>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Error text for a failed response: the parsed JSON `error` field when
    /// present and parseable, the HTTP status text otherwise.
    pub fn error_message(&self) -> String {
        serde_json::from_str::<Value>(&self.body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_owned))
            .unwrap_or_else(|| self.status_text.clone())
    }

    /// Turns a non-2xx response into a [`PortalError::Rejected`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PortalError::Rejected {
                status: self.status,
                message: self.error_message(),
            })
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// Production transport over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(default_client())
    }
}

pub fn default_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client")
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        match request.body {
            Some(RequestBody::Json(value)) => builder = builder.json(&value),
            Some(RequestBody::Form(fields)) => builder = builder.form(&fields),
            None => {}
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_redirect() {
                PortalError::RedirectBlocked(e.to_string())
            } else {
                PortalError::Http(e)
            }
        })?;
        let status = response.status();
        let cookies = parse_set_cookies(response.headers());
        let body = response.text().await?;

        Ok(ApiResponse {
            status: status.as_u16(),
            status_text: status
                .canonical_reason()
                .unwrap_or("Unknown Status")
                .to_owned(),
            body,
            cookies,
        })
    }
}

/// Extract `name=value` pairs from `Set-Cookie` headers, dropping attributes
/// such as `Path` and `Expires`.
fn parse_set_cookies(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    let mut cookies = Vec::new();
    for value in headers.get_all(reqwest::header::SET_COOKIE).iter() {
        if let Ok(cookie_str) = value.to_str()
            && let Some(cookie_part) = cookie_str.split(';').next()
            && let Some((name, value)) = cookie_part.split_once('=')
        {
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                continue;
            }
            cookies.push((name.to_owned(), value.to_owned()));
        }
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_json_error_field() {
        let response = ApiResponse {
            status: 400,
            status_text: "Bad Request".to_owned(),
            body: r#"{"error": "name already taken"}"#.to_owned(),
            cookies: vec![],
        };
        assert_eq!(response.error_message(), "name already taken");
    }

    #[test]
    fn error_message_falls_back_to_status_text() {
        let response = ApiResponse {
            status: 502,
            status_text: "Bad Gateway".to_owned(),
            body: "<html>upstream died</html>".to_owned(),
            cookies: vec![],
        };
        assert_eq!(response.error_message(), "Bad Gateway");
    }

    #[test]
    fn into_result_rejects_non_2xx() {
        let response = ApiResponse {
            status: 403,
            status_text: "Forbidden".to_owned(),
            body: String::new(),
            cookies: vec![],
        };
        match response.into_result() {
            Err(PortalError::Rejected { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Forbidden");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn set_cookie_parsing_drops_attributes() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.append(
            reqwest::header::SET_COOKIE,
            "sessionid=abc123; Path=/; HttpOnly".parse().unwrap(),
        );
        headers.append(
            reqwest::header::SET_COOKIE,
            "csrftoken=xyz".parse().unwrap(),
        );
        let cookies = parse_set_cookies(&headers);
        assert_eq!(
            cookies,
            vec![
                ("sessionid".to_owned(), "abc123".to_owned()),
                ("csrftoken".to_owned(), "xyz".to_owned()),
            ]
        );
    }
}

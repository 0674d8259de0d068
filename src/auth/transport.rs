// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! HTTP transport for the device authorization flow.
//!
//! The device flow only ever needs two kinds of request: a form-encoded POST
//! to a login endpoint, and an authenticated GET against the provider's API.
//! Both are expressed through [`DeviceFlowTransport`] so the polling logic
//! can be driven without a live provider.

use crate::auth::{AccessToken, AuthError};

use serde_json::Value;
use std::{collections::HashMap, time::Duration};
use tracing::debug;

const USER_AGENT: &str = concat!("dotfyles/", env!("CARGO_PKG_VERSION"));

/// Raw reply of a provider endpoint.
///
/// Non-success statuses are not errors at this level. The caller decides
/// what any given status means.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl HttpReply {
    /// Construct new reply.
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Decode reply body into flat key-value fields.
    ///
    /// Accepts both JSON objects and form-encoded bodies, because providers do
    /// not always honor the `Accept` header. Non-string JSON values are kept
    /// in their textual form, and nulls are dropped.
    ///
    /// # Errors
    ///
    /// - Return [`AuthError::Provider`] if a JSON body is not a valid object.
    pub fn fields(&self) -> Result<HashMap<String, String>, AuthError> {
        let body = self.body.trim();
        if self.content_type.contains("json") || body.starts_with('{') {
            let object: serde_json::Map<String, Value> = serde_json::from_str(body)
                .map_err(|err| AuthError::Provider(format!("malformed JSON body: {err}")))?;

            return Ok(object
                .into_iter()
                .filter_map(|(key, value)| match value {
                    Value::Null => None,
                    Value::String(text) => Some((key, text)),
                    other => Some((key, other.to_string())),
                })
                .collect());
        }

        Ok(url::form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect())
    }
}

/// Layer of indirection for provider requests.
pub trait DeviceFlowTransport {
    /// POST form-encoded fields to target URL.
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpReply, AuthError>;

    /// GET target URL with bearer token.
    fn get_with_token(&self, url: &str, token: &AccessToken) -> Result<HttpReply, AuthError>;
}

/// Blocking transport through ureq.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Construct new transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();

        Self { agent }
    }
}

impl DeviceFlowTransport for UreqTransport {
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpReply, AuthError> {
        debug!("POST {url}");
        into_reply(
            self.agent
                .post(url)
                .set("Accept", "application/json")
                .send_form(form),
        )
    }

    fn get_with_token(&self, url: &str, token: &AccessToken) -> Result<HttpReply, AuthError> {
        debug!("GET {url}");
        into_reply(
            self.agent
                .get(url)
                .set("Authorization", &format!("Bearer {}", token.secret()))
                .set("Accept", "application/vnd.github+json")
                .call(),
        )
    }
}

fn into_reply(response: Result<ureq::Response, ureq::Error>) -> Result<HttpReply, AuthError> {
    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(err) => return Err(AuthError::Network(err.to_string())),
    };

    let status = response.status();
    let content_type = response.content_type().to_owned();
    let body = response
        .into_string()
        .map_err(|err| AuthError::Network(err.to_string()))?;

    Ok(HttpReply {
        status,
        content_type,
        body,
    })
}

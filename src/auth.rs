// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! OAuth2 device authorization grant.
//!
//! Dotfyles runs headless, so it cannot open a browser to log the user in.
//! Instead it asks the provider for a __device session__: a short user code
//! and a verification URI that the user visits on any device with a browser.
//! Meanwhile dotfyles polls the provider's token endpoint until the user
//! either approves or declines the request, or until the session expires.
//!
//! # Polling
//!
//! The provider dictates the polling cadence through the session interval.
//! Dotfyles sleeps for the full interval before _every_ poll, the first one
//! included. Each reply moves the session into one of the states of
//! [`PollState`]:
//!
//! - __Pending__: HTTP 428, or HTTP 200 without a token. Keep polling.
//! - __SlowDown__: provider asked to back off. Widen interval, keep polling.
//! - __Authorized__: HTTP 200 with a token. Done.
//! - __Denied__: HTTP 403, or an `access_denied` error code. Give up.
//! - __Expired__: session expiry passed, or an `expired_token` error code.
//!   Give up.
//!
//! # See Also
//!
//! 1. [RFC 8628](https://www.rfc-editor.org/rfc/rfc8628)
//! 2. [GitHub device flow](https://docs.github.com/en/apps/oauth-apps/building-oauth-apps/authorizing-oauth-apps#device-flow)

pub mod transport;

use crate::{
    auth::transport::{DeviceFlowTransport, HttpReply, UreqTransport},
    config::AuthSettings,
};

use std::{
    collections::HashMap,
    fmt::{Debug, Formatter, Result as FmtResult},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Grant type identifying device code token requests.
pub const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

const DEFAULT_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_STEP_SECS: u64 = 5;

/// Source of time for the polling loop.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Suspend polling for given duration.
    fn sleep(&self, duration: Duration);
}

/// Wall clock that actually blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Opaque bearer token.
///
/// Only lives as long as one run of dotfyles. Never persisted, and never
/// shown through [`Debug`].
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Construct new access token.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Expose the raw secret.
    pub fn secret(&self) -> &str {
        self.0.as_str()
    }
}

impl Debug for AccessToken {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str("AccessToken(<redacted>)")
    }
}

/// One attempt at device authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthSession {
    /// Code identifying this device to the token endpoint.
    pub device_code: String,

    /// Code the user enters at the verification URI.
    pub user_code: String,

    /// Where the user goes to approve the request.
    pub verification_uri: String,

    /// Seconds to wait before each poll.
    pub interval_secs: u64,

    /// Instant after which the session is dead.
    pub expires_at: Instant,
}

impl DeviceAuthSession {
    /// Polling interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    // INVARIANT: Interval only ever grows.
    fn widen_interval(&mut self, requested: Option<u64>) {
        let widened =
            requested.unwrap_or_else(|| self.interval_secs.saturating_add(SLOW_DOWN_STEP_SECS));
        self.interval_secs = self.interval_secs.max(widened);
    }
}

/// State of a device session after one poll.
#[derive(Debug, PartialEq, Eq)]
pub enum PollState {
    Pending,
    SlowDown(Option<u64>),
    Authorized(AccessToken),
    Denied,
    Expired,
}

impl PollState {
    /// Interpret reply of the token endpoint.
    ///
    /// # Errors
    ///
    /// - Return [`AuthError::Provider`] if reply body is malformed, or
    ///   carries an unknown error code.
    /// - Return [`AuthError::Status`] for any status other than 200, 403,
    ///   and 428.
    pub fn from_reply(reply: &HttpReply) -> Result<Self> {
        match reply.status {
            200 => {
                let fields = reply.fields()?;
                if let Some(token) = fields.get("access_token").filter(|token| !token.is_empty()) {
                    return Ok(Self::Authorized(AccessToken::new(token.as_str())));
                }

                match fields.get("error").map(String::as_str) {
                    None | Some("authorization_pending") => Ok(Self::Pending),
                    Some("slow_down") => Ok(Self::SlowDown(
                        fields.get("interval").and_then(|secs| secs.parse().ok()),
                    )),
                    Some("access_denied") => Ok(Self::Denied),
                    Some("expired_token") => Ok(Self::Expired),
                    Some(code) => Err(AuthError::Provider(describe_error(code, &fields))),
                }
            }
            428 => Ok(Self::Pending),
            403 => Ok(Self::Denied),
            status => Err(AuthError::Status {
                status,
                body: reply.body.clone(),
            }),
        }
    }
}

/// Device authorization client.
///
/// Talks to a fixed provider with a fixed client identifier and scope.
#[derive(Debug)]
pub struct DeviceAuthClient<T = UreqTransport, C = SystemClock>
where
    T: DeviceFlowTransport,
    C: Clock,
{
    transport: T,
    clock: C,
    client_id: String,
    scope: String,
    base_url: String,
    api_url: String,
}

impl DeviceAuthClient {
    /// Construct new client over HTTP and the wall clock.
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let transport = UreqTransport::new(Duration::from_secs(settings.timeout_secs));
        Self::new(transport, SystemClock, settings)
    }
}

impl<T, C> DeviceAuthClient<T, C>
where
    T: DeviceFlowTransport,
    C: Clock,
{
    /// Construct new client.
    pub fn new(transport: T, clock: C, settings: &AuthSettings) -> Self {
        Self {
            transport,
            clock,
            client_id: settings.client_id.clone(),
            scope: settings.scope.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_owned(),
            api_url: settings.api_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Base URL of provider, without trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Request a new device session from the provider.
    ///
    /// # Errors
    ///
    /// - Return [`AuthError::Network`] if provider cannot be reached.
    /// - Return [`AuthError::Status`] if provider does not answer with 200.
    /// - Return [`AuthError::Provider`] if reply cannot be parsed, or lacks
    ///   required fields.
    #[instrument(skip(self), level = "debug")]
    pub fn request_device_session(&self) -> Result<DeviceAuthSession> {
        let url = format!("{}/login/device/code", self.base_url);
        let reply = self.transport.post_form(
            &url,
            &[
                ("client_id", self.client_id.as_str()),
                ("scope", self.scope.as_str()),
            ],
        )?;

        if reply.status != 200 {
            return Err(AuthError::Status {
                status: reply.status,
                body: reply.body,
            });
        }

        let mut fields = reply.fields()?;
        if let Some(code) = fields.get("error") {
            return Err(AuthError::Provider(describe_error(code, &fields)));
        }

        let interval_secs = match fields.remove("interval") {
            Some(secs) => parse_secs("interval", &secs)?,
            None => DEFAULT_INTERVAL_SECS,
        };
        let expires_in = parse_secs("expires_in", &required(&mut fields, "expires_in")?)?;
        let expires_at = self
            .clock
            .now()
            .checked_add(Duration::from_secs(expires_in))
            .ok_or_else(|| {
                AuthError::Provider(format!("field \"expires_in\" is out of range: {expires_in}"))
            })?;

        Ok(DeviceAuthSession {
            device_code: required(&mut fields, "device_code")?,
            user_code: required(&mut fields, "user_code")?,
            verification_uri: required(&mut fields, "verification_uri")?,
            interval_secs,
            expires_at,
        })
    }

    /// Poll token endpoint until device session reaches a terminal state.
    ///
    /// Calls `notice` exactly once with the session before the first poll, so
    /// the user can be told where to go and which code to enter.
    ///
    /// # Errors
    ///
    /// - Return [`AuthError::Denied`] if user declined the request.
    /// - Return [`AuthError::Expired`] if session expired first.
    /// - Return [`AuthError::Network`] if provider cannot be reached.
    /// - Return [`AuthError::Status`] or [`AuthError::Provider`] if provider
    ///   replies with something unexpected.
    #[instrument(skip(self, session, notice), level = "debug")]
    pub fn poll_for_token(
        &self,
        session: &mut DeviceAuthSession,
        notice: impl FnOnce(&DeviceAuthSession),
    ) -> Result<AccessToken> {
        let url = format!("{}/login/oauth/access_token", self.base_url);
        notice(session);

        loop {
            self.clock.sleep(session.interval());
            if self.clock.now() >= session.expires_at {
                return Err(AuthError::Expired);
            }

            debug!("poll for access token");
            let reply = self.transport.post_form(
                &url,
                &[
                    ("client_id", self.client_id.as_str()),
                    ("device_code", session.device_code.as_str()),
                    ("grant_type", DEVICE_GRANT_TYPE),
                ],
            )?;

            match PollState::from_reply(&reply)? {
                PollState::Authorized(token) => {
                    info!("device authorization granted");
                    return Ok(token);
                }
                PollState::Pending => {
                    debug!("authorization pending, retry in {}s", session.interval_secs);
                }
                PollState::SlowDown(requested) => {
                    session.widen_interval(requested);
                    warn!("provider asked to slow down, retry in {}s", session.interval_secs);
                }
                PollState::Denied => return Err(AuthError::Denied),
                PollState::Expired => return Err(AuthError::Expired),
            }
        }
    }

    /// Run the full device flow: request a session, then poll it.
    ///
    /// # Errors
    ///
    /// - Return any error of [`Self::request_device_session`] or
    ///   [`Self::poll_for_token`].
    pub fn authenticate(&self, notice: impl FnOnce(&DeviceAuthSession)) -> Result<AccessToken> {
        let mut session = self.request_device_session()?;
        self.poll_for_token(&mut session, notice)
    }

    /// Determine login name of the user that owns the token.
    ///
    /// # Errors
    ///
    /// - Return [`AuthError::Network`] if provider cannot be reached.
    /// - Return [`AuthError::Status`] if provider does not answer with 200.
    /// - Return [`AuthError::Provider`] if reply lacks a login.
    #[instrument(skip(self, token), level = "debug")]
    pub fn resolve_login(&self, token: &AccessToken) -> Result<String> {
        let url = format!("{}/user", self.api_url);
        let reply = self.transport.get_with_token(&url, token)?;
        if reply.status != 200 {
            return Err(AuthError::Status {
                status: reply.status,
                body: reply.body,
            });
        }

        required(&mut reply.fields()?, "login")
    }
}

fn required(fields: &mut HashMap<String, String>, name: &str) -> Result<String> {
    fields
        .remove(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AuthError::Provider(format!("response lacks field {name:?}")))
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| AuthError::Provider(format!("field {name:?} is not a number: {value:?}")))
}

fn describe_error(code: &str, fields: &HashMap<String, String>) -> String {
    match fields.get("error_description") {
        Some(description) => format!("{code}: {description}"),
        None => code.to_owned(),
    }
}

/// Device authorization failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Provider reply is malformed or unexpected.
    #[error("unexpected provider response: {0}")]
    Provider(String),

    /// Provider answered with an unexpected HTTP status.
    #[error("provider responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// User declined the authorization request.
    #[error("authorization denied; user may have declined the request")]
    Denied,

    /// Device session expired before user approved it.
    #[error("device authorization session expired")]
    Expired,

    /// Provider cannot be reached.
    #[error("failed to reach provider: {0}")]
    Network(String),
}

/// Friendly result alias :3
type Result<T, E = AuthError> = std::result::Result<T, E>;

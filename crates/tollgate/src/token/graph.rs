// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde_json::Value;

use super::{IntrospectError, Introspection};
use crate::time::from_unix_seconds;

#[cfg(feature = "graph")]
pub use client::GraphIntrospector;

#[cfg(feature = "graph")]
mod client {
    use std::time::Duration;

    use serde_json::Value;

    use super::parse_debug_token;
    use crate::config::{ConfigError, CredentialConfig};
    use crate::token::{Introspect, IntrospectError, Introspection, SecretToken};

    /// [`Introspect`] implementation for the provider's `debug_token` endpoint.
    ///
    /// Sends `GET {endpoint}?input_token={token}&access_token={app_id}|{app_secret}` and reads
    /// `{"data": {"is_valid", "expires_at", "scopes", "type", "app_id", "error": {"message"}}}`
    /// from the response. Request URLs are stripped from transport errors so the secrets never
    /// reach logs.
    #[derive(Debug, Clone)]
    pub struct GraphIntrospector {
        client: reqwest::Client,
        endpoint: String,
        app_id: String,
        app_secret: SecretToken,
    }

    impl GraphIntrospector {
        /// Creates an introspector for the given endpoint and application credentials.
        ///
        /// # Errors
        ///
        /// Returns [`IntrospectError::Transport`] when the HTTP client cannot be built.
        pub fn new(
            endpoint: impl Into<String>,
            app_id: impl Into<String>,
            app_secret: impl Into<SecretToken>,
            timeout: Duration,
        ) -> Result<Self, IntrospectError> {
            let client = reqwest::Client::builder().timeout(timeout).build().map_err(transport)?;

            Ok(Self {
                client,
                endpoint: endpoint.into(),
                app_id: app_id.into(),
                app_secret: app_secret.into(),
            })
        }

        /// Creates an introspector from the credential configuration.
        ///
        /// # Errors
        ///
        /// Returns [`ConfigError::Invalid`] when the application ID or secret is missing or the HTTP
        /// client cannot be built.
        pub fn from_config(config: &CredentialConfig) -> Result<Self, ConfigError> {
            let (Some(app_id), Some(app_secret)) = (&config.app_id, &config.app_secret) else {
                return Err(ConfigError::Invalid {
                    problems: vec!["credential.appId and credential.appSecret must be set for token introspection".to_owned()],
                });
            };

            Self::new(&config.introspection_endpoint, app_id, app_secret.clone(), config.request_timeout).map_err(|error| {
                ConfigError::Invalid {
                    problems: vec![format!("credential: {error}")],
                }
            })
        }
    }

    impl Introspect for GraphIntrospector {
        async fn introspect(&self, token: &SecretToken) -> Result<Introspection, IntrospectError> {
            let access_token = format!("{}|{}", self.app_id, self.app_secret.as_declassified());

            let response = self
                .client
                .get(&self.endpoint)
                .query(&[("input_token", token.as_declassified()), ("access_token", access_token.as_str())])
                .send()
                .await
                .map_err(transport)?;

            let status = response.status().as_u16();
            let body = match response.json::<Value>().await {
                Ok(body) => body,
                Err(error) if error.is_timeout() => return Err(IntrospectError::Timeout),
                Err(_) => Value::Null,
            };

            parse_debug_token(status, &body)
        }
    }

    fn transport(error: reqwest::Error) -> IntrospectError {
        if error.is_timeout() {
            IntrospectError::Timeout
        } else {
            IntrospectError::Transport(Box::new(error.without_url()))
        }
    }
}

/// Interprets a `debug_token` response.
pub(crate) fn parse_debug_token(status: u16, body: &Value) -> Result<Introspection, IntrospectError> {
    if status != 200 {
        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");

        return Err(IntrospectError::Rejected {
            status,
            message: message.to_owned(),
        });
    }

    let data = body.get("data").unwrap_or(&Value::Null);

    if !data.get("is_valid").and_then(Value::as_bool).unwrap_or(false) {
        let message = data
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("token invalid");

        return Ok(Introspection::invalid(message));
    }

    let mut introspection = Introspection::valid();
    // An expiry of 0 means the token never expires.
    introspection.expires_at = data.get("expires_at").and_then(Value::as_f64).and_then(from_unix_seconds);
    introspection.scopes = data
        .get("scopes")
        .and_then(Value::as_array)
        .map(|scopes| scopes.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default();
    introspection.token_type = data.get("type").and_then(Value::as_str).map(str::to_owned);
    introspection.app_id = data.get("app_id").and_then(|app_id| match app_id {
        Value::String(app_id) => Some(app_id.clone()),
        Value::Number(app_id) => Some(app_id.to_string()),
        _ => None,
    });

    Ok(introspection)
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Lifecycle of the provider credential.
//!
//! The [`TokenManager`] tracks whether the access token is valid and when it expires. It asks the
//! provider through the [`Introspect`] seam and caches the answer for a freshness window.
//! Page tokens of the supported provider cannot be refreshed automatically: a near expiry is
//! only logged, and replacing the token is an operator action through
//! [`TokenManager::update_token`].

use std::time::Duration;

mod error;
#[cfg(any(feature = "graph", test))]
mod graph;
mod info;
mod introspect;
mod manager;
mod secret;

pub use error::{AuthError, IntrospectError};
#[cfg(feature = "graph")]
#[cfg_attr(docsrs, doc(cfg(feature = "graph")))]
pub use graph::GraphIntrospector;
pub use info::{TokenInfo, TokenStatus};
pub use introspect::{Introspect, Introspection, StaticIntrospector};
pub use manager::TokenManager;
pub use secret::{SecretToken, TollgateTaxonomy};

/// Default freshness window of a validation result.
pub const DEFAULT_VALIDATION_TTL: Duration = Duration::from_secs(5 * 60);

/// Default distance to expiry below which the credential is reported as near expiration.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Default timeout of a single introspection request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default credential type.
pub const DEFAULT_TOKEN_TYPE: &str = "PAGE_ACCESS_TOKEN";

/// Default token introspection endpoint.
pub const DEFAULT_INTROSPECTION_ENDPOINT: &str = "https://graph.facebook.com/debug_token";

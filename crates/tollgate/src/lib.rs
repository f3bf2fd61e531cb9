// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Quota and failure protection for outbound calls to rate-limited provider APIs.
//!
//! Several independent processes often share one provider account: a fast poll loop answering
//! new comments, a deep sweep over historical posts, a dashboard refreshing insights. Each of them
//! must stay inside the same account-wide quota and must back off together when the provider
//! starts throttling. This crate provides the resilience layer that sits between such processes
//! and the provider:
//!
//! - [`classify`]: turns provider error payloads and transport errors into a normalized
//!   [`FailureRecord`][classify::FailureRecord].
//! - [`policy`]: maps a classified failure to a recommended [`ErrorAction`][policy::ErrorAction].
//! - [`limiter`]: a cross-process rolling-window call budget persisted in a locked file, with a
//!   fleet-wide panic cooldown.
//! - [`breaker`]: per endpoint class circuit breakers.
//! - [`token`]: access token validity and expiry tracking.
//! - [`caller`]: the [`ProtectedCaller`] facade that ties everything together.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tick::Clock;
//! use tollgate::ProtectedCaller;
//! use tollgate::classify::ProviderError;
//! use tollgate::config::TollgateConfig;
//! use tollgate::token::StaticIntrospector;
//!
//! # async fn send_reply(text: &str) -> Result<String, ProviderError> { Ok(text.to_string()) }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TollgateConfig::from_json_file("tollgate.json")?;
//! let caller = ProtectedCaller::new(&config, Clock::new_tokio(), StaticIntrospector::valid())?;
//!
//! match caller.execute("comments", || send_reply("thanks!")).await {
//!     Ok(id) => println!("sent {id}"),
//!     Err(error) => println!("not sent: {error}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Advisory recovery
//!
//! The layer never sleeps and never retries on its own. Failures come back as
//! [`CallError`] values that carry the classified failure and the recommended action, including
//! any delay hint. Both [`CallError`] and [`FailureRecord`][classify::FailureRecord] implement
//! [`Recovery`], so they work with any retry loop that understands [`RecoveryInfo`].
//!
//! # Process model
//!
//! Only the rate limiter state crosses process boundaries. Circuit breakers are process-local:
//! every process boots with all circuits closed even when another process currently sees the
//! same endpoint class as open.
//!
//! # Features
//!
//! - `graph`: enables [`GraphIntrospector`][token::GraphIntrospector], an HTTP implementation of
//!   the token introspection seam built on `reqwest`.

#[doc(inline)]
pub use recoverable::{Recovery, RecoveryInfo, RecoveryKind};

pub mod breaker;
pub mod caller;
pub mod classify;
pub mod config;
pub mod limiter;
pub mod policy;
pub mod token;

mod constants;
mod fn_wrapper;
mod time;

pub(crate) use fn_wrapper::define_fn_wrapper;

#[doc(inline)]
pub use caller::{CallError, ProtectedCaller};

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Routes a burst of simulated provider calls through a `ProtectedCaller` and prints what the
//! layer decided for each of them:
//!
//! 1. The first replies succeed and consume the shared budget.
//! 2. Repeated server failures trip the `comments` circuit.
//! 3. A provider rate limit puts every process sharing the state file into panic mode.
//!
//! Run with `RUST_LOG=tollgate=debug` to see the structured events.

use std::error::Error;

use serde_json::json;
use tick::Clock;
use tollgate::classify::ProviderError;
use tollgate::config::TollgateConfig;
use tollgate::token::StaticIntrospector;
use tollgate::{CallError, ProtectedCaller};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tollgate=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dir = tempfile::tempdir()?;
    let config = TollgateConfig::from_json_str(
        &json!({
            "rateLimit": { "statePath": dir.path().join("rate_limit_state.json"), "capacityPerWindow": 20 },
            "credential": { "initialToken": "demo-page-token" },
            "locale": "english"
        })
        .to_string(),
    )?;

    let caller = ProtectedCaller::new(&config, Clock::new_tokio(), StaticIntrospector::valid())?;
    caller.valid_token().await?;

    for attempt in 0..8 {
        let result = caller.execute("comments", || reply_to_comment(attempt)).await;
        report("comments", attempt, result);
    }

    let result = caller.execute("messages", || send_message(true)).await;
    report("messages", 0, result);

    // Every caller sharing the state file now refuses to call the provider.
    let result = caller.execute("insights", || send_message(false)).await;
    report("insights", 0, result);

    println!("{}", serde_json::to_string_pretty(&caller.rate_limit_status()?)?);
    println!("{}", serde_json::to_string_pretty(&caller.all_circuit_states())?);

    Ok(())
}

fn report(endpoint_class: &str, attempt: u32, result: Result<String, CallError<ProviderError>>) {
    match result {
        Ok(id) => println!("{endpoint_class} #{attempt}: sent {id}"),
        Err(error) => match error.action() {
            Some(action) => println!(
                "{endpoint_class} #{attempt}: {error} ({}), retry in {:?}",
                action.safe_message,
                action.delay.unwrap_or_default()
            ),
            None => println!("{endpoint_class} #{attempt}: {error}"),
        },
    }
}

// The provider answers the first three replies, then starts failing.
async fn reply_to_comment(attempt: u32) -> Result<String, ProviderError> {
    if attempt < 3 {
        return Ok(format!("reply-{attempt}"));
    }

    Err(ProviderError::response(
        Some(500),
        json!({"error": {"code": 2, "message": "An unexpected error has occurred. Please retry your request later."}}),
    ))
}

async fn send_message(throttled: bool) -> Result<String, ProviderError> {
    if throttled {
        return Err(ProviderError::from_body(
            Some(400),
            br#"{"error": {"code": 4, "message": "Application request limit reached", "fbtrace_id": "AbC123"}}"#,
        ));
    }

    Ok("message-1".to_owned())
}

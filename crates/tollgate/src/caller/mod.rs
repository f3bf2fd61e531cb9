// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The protected call facade.
//!
//! ```text
//! execute(class, call)
//!   ├─ RateLimiter::check_and_increment_async   rejected → CallError::RateLimited
//!   ├─ CircuitBreakerRegistry::get(class).call  open     → CallError::CircuitOpen
//!   └─ call()                                   failed   → classify → handle → CallError::Failed
//!                                                           ├─ RATE_LIMIT     → trigger panic mode
//!                                                           └─ CIRCUIT_BREAK  → force the circuit open
//! ```

mod error;
mod protected;

pub use error::CallError;
pub use protected::ProtectedCaller;

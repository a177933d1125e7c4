//! # stepverify: Step-by-step verification of reactive producers
//!
//! This crate checks that a producer of signals emits exactly what a test
//! script expects, in order: a sequence of values closed by completion, an
//! error, or an explicit cancellation. Producers driven by timers can be run
//! against a virtual clock, so hours of scheduled emission verify in
//! milliseconds of wall time.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StepVerifier ──▶ Steps ──▶ Verification ──verify()──┐      │
//! │                                                       ▼      │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │ Producer     │──▶│ Observer     │──▶│ Engine / Matcher │  │
//! │  │ (subscribe)  │   │ (protocol)   │   │ (one step/signal)│  │
//! │  └──────┬───────┘   └──────────────┘   └────────┬─────────┘  │
//! │         │ schedule                              │ advance    │
//! │         ▼                                       ▼            │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │ Scheduler: VirtualClock (virtual) | timer threads    │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use stepverify::{StepVerifier, sources};
//!
//! StepVerifier::create(sources::just(["foo", "bar"]))
//!     .expect_next(["foo", "bar"])
//!     .expect_complete()
//!     .verify()?;
//!
//! // An hour of one-second ticks, verified without waiting an hour
//! StepVerifier::with_virtual_time(4_000, || {
//!     sources::interval(Duration::from_secs(1)).take(3600)
//! })
//! .expect_next_count(3600)
//! .expect_complete()
//! .verify()?;
//! ```
//!
//! ## Key Concepts
//!
//! - **`Signal`**: `Next(value)`, `Error(err)` or `Complete`
//! - **`VirtualClock`**: Discrete time that only moves when the verifier advances it
//! - **`VerificationScript`**: Ordered expectation steps ending in one terminal step
//! - **`Failure`**: Step index, expected condition and offending signal of a failed run

// Boxed predicates and subscribe closures
#![allow(clippy::type_complexity)]

use std::sync::OnceLock;

pub use stepverify_config::VerifierConfig;

mod builder;
pub mod clock;
mod engine;
mod error;
pub mod producer;
mod script;
mod signal;
pub mod sources;

pub use builder::{StepVerifier, Steps, Verification, verify_script, verify_script_virtual};
pub use clock::{TaskId, VirtualClock};
pub use engine::VerificationReport;
pub use error::{Failure, FailureReason, VerifyError};
pub use producer::{Observer, Producer, Scheduler, Subscription};
pub use script::{
    ConfigurationError, ErrorPredicate, ExpectationStep, ValuePredicate, VerificationScript,
};
pub use signal::{ProducerError, Signal, Timed, kind_of};

static DEFAULT_CONFIG: OnceLock<VerifierConfig> = OnceLock::new();

/// Process-wide configuration used by [`Verification::verify`].
///
/// Loaded once from the layered config sources (user, project, local files
/// and `STEPVERIFY_*` environment). A configuration that fails to load falls
/// back to built-in defaults.
pub fn default_config() -> &'static VerifierConfig {
    DEFAULT_CONFIG.get_or_init(|| match stepverify_config::ConfigLoader::new().load() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("falling back to default verifier configuration: {err:#}");
            VerifierConfig::default()
        }
    })
}

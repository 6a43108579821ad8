//! Feature flag evaluation for Mixpanel.
//!
//! # Overview
//!
//! Flags are resolved for an [`EvaluationContext`]: a `distinct_id` plus arbitrary key-value
//! attributes describing the entity being evaluated. Resolution yields a [`SelectedVariant`], or
//! the caller's fallback when no variant applies.
//!
//! Two providers implement the [`FlagsProvider`] interface:
//! - [`LocalFlagsProvider`] periodically downloads flag definitions and evaluates them in-process.
//!   Assignment is deterministic: the same entity always lands in the same variant for a given
//!   flag definition.
//! - [`RemoteFlagsProvider`] asks the server to evaluate flags on every call.
//!
//! An [`EventTracker`] should be provided to forward exposure events to your analytics pipeline,
//! so experiment results can be attributed to the variant each user actually saw.
//!
//! # Error Handling
//!
//! Flag evaluation never fails: problems are logged and the fallback is returned. Errors are only
//! surfaced by setup operations such as [`LocalFlagsProvider::start_polling`] and are represented
//! by the [`Error`] enum.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `mixpanel_flags` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into SDK operations.
//!
//! # Examples
//!
//! A runnable example lives in the `demos/` directory of the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod config;
mod context;
mod definition_store;
mod definitions;
mod error;
mod eval;
mod exposure;
mod hashing;
mod http;
mod local;
mod poller;
mod provider;
mod remote;
mod rules;
mod variant;

pub use config::ClientConfig;
pub use context::{AttributeValue, Attributes, EvaluationContext};
pub use definitions::{
    Definitions, FlagDefinition, Rollout, RuleSet, TestOverrides, Variant, VariantOverride,
};
pub use error::{Error, Result};
pub use exposure::{
    EvaluationMode, EventTracker, ExposureEvent, Properties, TrackResult, EXPOSURE_EVENT_NAME,
};
pub use hashing::normalized_hash;
pub use local::LocalFlagsProvider;
pub use poller::PollerThread;
pub use provider::FlagsProvider;
pub use remote::RemoteFlagsProvider;
pub use variant::SelectedVariant;

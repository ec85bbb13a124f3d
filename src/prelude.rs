//! Prelude module for convenient imports.
//!
//! ```
//! use larder::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Client`] - Shared cache, dedupe map, and transport
//! - [`Resource`] / [`ResourceState`] / [`Phase`] - The read lifecycle
//! - [`Mutation`] / [`MutationState`] / [`MutationHooks`] - The write lifecycle
//! - [`Request`] / [`Response`] - Descriptors and results
//! - [`Cell`] - Observable input and output values
//! - [`ResourceOptions`] / [`MutationOptions`] and their option enums

pub use crate::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use crate::cell::{Cell, Input};
pub use crate::client::Client;
pub use crate::config::{
    BreakerMode, CacheMode, CacheOptions, MutationOptions, ResourceOptions,
};
pub use crate::error::{FetchError, TransportError};
pub use crate::mutation::{Mutation, MutationHooks, MutationState};
pub use crate::request::{ParamValue, Request, Response};
pub use crate::resource::{Phase, Resource, ResourceState};
pub use crate::retry::{Backoff, RetryPolicy};
pub use crate::transport::Transport;

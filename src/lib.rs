//! # Larder - Reactive Data Fetching & Caching
//!
//! Larder sits between an application's reactive state and a remote HTTP
//! API. You describe *what request should be active right now* — as a value
//! or a live [`Cell`](cell::Cell) — and larder manages the rest of the
//! request lifecycle:
//!
//! - **Caching** with TTL and stale-while-revalidate semantics, reconciled
//!   with the server's `Cache-Control` directives and conditional
//!   (`ETag`/`304`) revalidation
//! - **Deduplication**: concurrent identical requests share one network call
//! - **Retries** with exponential, jittered backoff
//! - **Circuit breaking** that suppresses requests after repeated failures
//! - **Mutations** with optimistic apply and rollback
//!
//! The result is exposed as an observable
//! [`ResourceState`](resource::ResourceState): `idle -> loading ->
//! (resolved | error)`, re-entering `loading` whenever the derived request
//! changes.
//!
//! ## Architecture
//!
//! - [`Client`](client::Client): shared cache + in-flight map + transport
//! - [`Resource`](resource::Resource): reactive read lifecycle
//! - [`Mutation`](mutation::Mutation): one-shot write lifecycle
//! - [`Transport`](transport::Transport): the boundary to a real HTTP
//!   client; larder never performs raw I/O itself
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use larder::prelude::*;
//! use larder::transport::mock::MockTransport;
//!
//! # async fn example() {
//! let client = Arc::new(Client::new(MockTransport::ok("[1, 2, 3]")));
//!
//! let request = Cell::new(Some(
//!     Request::get("https://api.example.com/items").param("page", 1),
//! ));
//!
//! let items = Resource::new(
//!     Arc::clone(&client),
//!     request.clone(),
//!     ResourceOptions::new().keep_previous(),
//! );
//!
//! // Pagination: writing the input supersedes the in-flight request.
//! request.set(Some(
//!     Request::get("https://api.example.com/items").param("page", 2),
//! ));
//!
//! let mut states = items.subscribe();
//! while states.changed().await.is_ok() {
//!     let state = states.borrow().clone();
//!     if state.is_resolved() {
//!         println!("items: {:?}", state.value());
//!         break;
//!     }
//! }
//! # }
//! ```

pub mod breaker;
pub mod cache;
pub mod cell;
pub mod client;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod mutation;
pub mod prelude;
pub mod request;
pub mod resource;
pub mod retry;
pub mod transport;

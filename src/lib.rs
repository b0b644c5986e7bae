//! Snapcache - Local record-replay caching proxy for HTTP APIs
//!
//! Point a client at snapcache instead of a remote service: the first
//! request for a given (method, URL, query, body) is forwarded upstream,
//! captured, and persisted; identical requests afterwards replay the
//! captured response without touching the network.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::multiple_crate_versions
)]

pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod proxy;
pub mod server;
pub mod upstream;

pub use error::{Result, SnapError};

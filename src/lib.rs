//! Oxipix - An image loading pipeline.
//!
//! This crate turns remote image URLs into decoded, optionally transformed
//! assets: format sniffing, memory and disk caching, single-flight
//! prefetching, lazy animated GIF/WebP decoding with pooled frame buffers,
//! and shape/blur transforms for still images.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "oxipix";

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! # Stratum: double-buffered surface state for wayland compositors
//!
//! This crate implements the state model at the heart of a wayland compositor: a client
//! incrementally describes a surface (its buffer, damage, transform, crop, subsurface
//! ordering...) through many small requests, and then atomically promotes that description
//! into a single consistent state with `wl_surface.commit`.
//!
//! ## Structure of the crate
//!
//! - [`wayland`] contains the surface state machinery and the protocol extensions plugging
//!   into it.
//! - [`utils`] contains the geometry types, regions, serials and other helpers.
//!
//! Wire marshalling is out of scope: the compositor decodes client requests and calls the
//! corresponding methods of [`Surface`](wayland::compositor::Surface), and posts the protocol
//! errors returned by them.
//!
//! ### Threading
//!
//! Everything in this crate is single-threaded, and meant to be driven from a single event
//! loop such as [`calloop`](https://docs.rs/calloop). Deferred work, like waiting for an
//! acquire fence, is expressed by locking a surface state and unlocking it later from a
//! callback of that same loop.
//!
//! ### Logging
//!
//! Stratum makes extensive use of [`tracing`] for its internal logging.
//!
//! For release builds it is recommended to limit the log level during compile time.
//! This can be done by adding a dependency to [`tracing`] and enabling the corresponding features.
//! For example to enable `trace` messages for debug builds, but limit release builds to `debug` add
//! the following in your binary crate `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tracing = { version = "0.1", features = ["max_level_trace", "release_max_level_debug"] }
//! ```
//!
//! If you do not want to use [`tracing`] for your compositor, refer to [`log compatibility`](tracing#log-compatibility)
//! for how to forward stratum's debug output to other `log` compatible frameworks.

pub mod utils;
pub mod wayland;

//! Protocol-related utilities
//!
//! This module contains the state machinery behind `wl_surface` and the protocol
//! extensions built on top of it.
//!
//! - [`buffer`] holds the client buffers and their release semantics.
//! - [`compositor`] is the core of the crate: the [`Surface`](compositor::Surface) with its
//!   pending, current and cached states, locking, synced extension state and roles.
//!
//! The remaining modules are optional extensions, each behind the cargo feature of the same
//! name. They only use the public API of [`compositor`] (hooks, synced extensions, roles),
//! and as such are good examples of how to write more of them.

pub mod buffer;
pub mod compositor;
#[cfg(feature = "cursor")]
pub mod cursor;
#[cfg(feature = "explicit_sync")]
pub mod explicit_sync;
#[cfg(feature = "viewporter")]
pub mod viewporter;

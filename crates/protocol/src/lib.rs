//! Wire types for the two protocols bridged by `jsdap`.
//!
//! This crate contains the serde-serializable types exchanged with the
//! editor (Debug Adapter Protocol, see [`dap`]) and with the JavaScript
//! engine (Chrome DevTools / inspector protocol, see [`cdp`]). These types
//! represent the "protocol layer": the shapes of data as they appear on the
//! wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization and the
//!   discriminating decode step that turns an envelope into a closed variant
//! * 1:1 with protocol: Field names follow the upstream protocol schemas
//! * Stable: Changes only when a wire protocol changes
//!
//! Session behavior is built on top of these types in `jsdap-runtime`.

pub mod cdp;
pub mod dap;

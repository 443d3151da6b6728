//! Core library for the scope_daq acquisition controller.
//!
//! Coordinates a camera, a three-axis stage and a serial LED controller from a single
//! cooperative dispatch loop. It is used by the `scope_daq` binary and by the integration
//! tests, which drive it with the simulated devices in [`hardware::mock`].
//!
//! Layering, leaf first: [`hardware`] adapters, the [`acquisition`] engine, naming and
//! persistence in [`data`], then [`session`] and [`dispatch`] tying them to a
//! [`surface`] through the [`messages`] work queue.

pub mod acquisition;
pub mod config;
pub mod controls;
pub mod core;
pub mod data;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod messages;
pub mod session;
pub mod surface;

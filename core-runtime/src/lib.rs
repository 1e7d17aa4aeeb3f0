//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the auto-upload engine:
//! - Configuration ([`config::AutoUploadConfig`]) with fail-fast bridge validation
//! - Logging and tracing setup, including privacy helpers for coordinates and paths
//! - Typed event bus for permission, wake-trigger and sync notifications
//!
//! ## Overview
//!
//! Hosts build an [`AutoUploadConfig`](config::AutoUploadConfig), call
//! [`init_logging`](logging::init_logging) once, and hand both to the engine in
//! `core-sync`. UI layers subscribe to the [`EventBus`](events::EventBus) to
//! reflect flag changes and sync progress.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};

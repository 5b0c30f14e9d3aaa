// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! This module contains all message types used throughout the banyan engine
//! for diagnostic and operational logging. Each message type implements the
//! `Display` trait to provide consistent, human-readable output while enabling
//! future internationalization.
//!
//! # Organization
//!
//! Messages are organized by subsystem to maintain Single Responsibility Principle:
//!
//! * `engine` - run lifecycle and tick execution events
//! * `graph` - tree assembly and tag registry events
//!
//! # Usage Pattern
//!
//! ```rust
//! use the_banyan::observability::messages::engine::RunStarted;
//! use the_banyan::observability::messages::StructuredLog;
//!
//! let msg = RunStarted {
//!     target: "source",
//!     max_depth: 256,
//! };
//!
//! msg.log();
//! ```

use tracing::Span;

pub mod engine;
pub mod graph;

/// Common surface of every loggable message type.
///
/// `log` emits the message at its canonical level with structured fields
/// attached; `span` builds a span carrying the same fields for callers that
/// want to scope work under the event.
pub trait StructuredLog {
    fn log(&self);

    fn span(&self, name: &str) -> Span;
}

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! This module provides centralized message types for all diagnostic and operational
//! logging throughout the banyan engine. Message types follow a struct-based pattern
//! with `Display` trait implementation to:
//!
//! * Eliminate magic strings scattered throughout the codebase
//! * Enable future internationalization without code changes
//! * Maintain Single Responsibility Principle (SRP)
//! * Provide consistent, structured logging output
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - run lifecycle and tick execution events
//! * `messages::graph` - tree assembly and tag registry events
//!
//! # Usage
//!
//! ```rust
//! use the_banyan::observability::messages::graph::NodeRegistered;
//! use the_banyan::observability::messages::StructuredLog;
//!
//! let msg = NodeRegistered {
//!     tag: "source",
//!     node_count: 3,
//! };
//!
//! msg.log();
//! ```

pub mod messages;

// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for run lifecycle and tick execution events.
//!
//! This module contains message types for logging events related to:
//! * Run start, completion, and failure
//! * Individual tick execution inside a node's scheduling loop

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A run was started at a target node.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_banyan::observability::messages::engine::RunStarted;
///
/// let msg = RunStarted {
///     target: "source",
///     max_depth: 256,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunStarted<'a> {
    pub target: &'a str,
    pub max_depth: usize,
}

impl Display for RunStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting run at '{}' (max propagation depth {})",
            self.target, self.max_depth
        )
    }
}

impl StructuredLog for RunStarted<'_> {
    fn log(&self) {
        tracing::info!(
            target_node = self.target,
            max_depth = self.max_depth,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run",
            span_name = name,
            target_node = self.target,
            max_depth = self.max_depth,
        )
    }
}

/// A run completed, propagation subtree included.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_banyan::observability::messages::engine::RunCompleted;
/// use std::time::Duration;
///
/// let msg = RunCompleted {
///     target: "source",
///     duration: Duration::from_millis(12),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct RunCompleted<'a> {
    pub target: &'a str,
    pub duration: std::time::Duration,
}

impl Display for RunCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Run at '{}' completed in {:?}",
            self.target, self.duration
        )
    }
}

impl StructuredLog for RunCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            target_node = self.target,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "run_completed",
            span_name = name,
            target_node = self.target,
            duration = ?self.duration,
        )
    }
}

/// A run failed.
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use the_banyan::observability::messages::engine::RunFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "test error");
/// let msg = RunFailed {
///     target: "source",
///     error: &error,
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct RunFailed<'a> {
    pub target: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for RunFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Run at '{}' failed: {}", self.target, self.error)
    }
}

impl StructuredLog for RunFailed<'_> {
    fn log(&self) {
        tracing::error!(
            target_node = self.target,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "run_failed",
            span_name = name,
            target_node = self.target,
            error = %self.error,
        )
    }
}

/// One tick of a node's scheduling loop finished.
///
/// # Log Level
/// `debug!` - Per-tick event, high volume under `repeat`/`recursive`
///
/// # Example
/// ```
/// use the_banyan::observability::messages::engine::TickExecuted;
///
/// let msg = TickExecuted {
///     node: "accumulator",
///     tick: 2,
///     ticks: 5,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct TickExecuted<'a> {
    pub node: &'a str,
    pub tick: u32,
    pub ticks: u32,
}

impl Display for TickExecuted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' executed tick {}/{}",
            self.node, self.tick, self.ticks
        )
    }
}

impl StructuredLog for TickExecuted<'_> {
    fn log(&self) {
        tracing::debug!(
            node = self.node,
            tick = self.tick,
            ticks = self.ticks,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "tick",
            span_name = name,
            node = self.node,
            tick = self.tick,
            ticks = self.ticks,
        )
    }
}

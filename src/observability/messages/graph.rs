// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for tree assembly and tag registry events.
//!
//! This module contains message types for logging events related to:
//! * Node registration and removal
//! * Tag map replacement under the default (non-strict) policy
//! * Rejected shared-subtree references

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A tagged node was registered in the graph's tag map.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_banyan::observability::messages::graph::NodeRegistered;
///
/// let msg = NodeRegistered {
///     tag: "source",
///     node_count: 3,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct NodeRegistered<'a> {
    pub tag: &'a str,
    pub node_count: usize,
}

impl Display for NodeRegistered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Registered node '{}' ({} tags in graph)",
            self.tag, self.node_count
        )
    }
}

impl StructuredLog for NodeRegistered<'_> {
    fn log(&self) {
        tracing::info!(
            tag = self.tag,
            node_count = self.node_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "node_registered",
            span_name = name,
            tag = self.tag,
            node_count = self.node_count,
        )
    }
}

/// Registering a tag silently replaced an existing mapping.
///
/// # Log Level
/// `warn!` - Legal under the default policy, but usually a declaration bug
///
/// # Example
/// ```
/// use the_banyan::observability::messages::graph::TagReplaced;
///
/// let msg = TagReplaced { tag: "source" };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct TagReplaced<'a> {
    pub tag: &'a str,
}

impl Display for TagReplaced<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Tag '{}' replaced an existing node mapping", self.tag)
    }
}

impl StructuredLog for TagReplaced<'_> {
    fn log(&self) {
        tracing::warn!(tag = self.tag, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("tag_replaced", span_name = name, tag = self.tag)
    }
}

/// A node was removed from the graph.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_banyan::observability::messages::graph::NodeRemoved;
///
/// let msg = NodeRemoved {
///     tag: "source",
///     dropped_subscriptions: 2,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct NodeRemoved<'a> {
    pub tag: &'a str,
    pub dropped_subscriptions: usize,
}

impl Display for NodeRemoved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Removed node '{}' ({} subscriptions dropped)",
            self.tag, self.dropped_subscriptions
        )
    }
}

impl StructuredLog for NodeRemoved<'_> {
    fn log(&self) {
        tracing::info!(
            tag = self.tag,
            dropped_subscriptions = self.dropped_subscriptions,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "node_removed",
            span_name = name,
            tag = self.tag,
            dropped_subscriptions = self.dropped_subscriptions,
        )
    }
}

/// A shared-subtree reference was rejected because it would close a cycle.
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use the_banyan::observability::messages::graph::CycleRejected;
///
/// let msg = CycleRejected {
///     tag: "loop",
///     path: "loop -> mid -> loop",
/// };
///
/// tracing::error!("{}", msg);
/// ```
pub struct CycleRejected<'a> {
    pub tag: &'a str,
    pub path: &'a str,
}

impl Display for CycleRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rejected reference to '{}': would close a cycle ({})",
            self.tag, self.path
        )
    }
}

impl StructuredLog for CycleRejected<'_> {
    fn log(&self) {
        tracing::error!(
            tag = self.tag,
            path = self.path,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "cycle_rejected",
            span_name = name,
            tag = self.tag,
            path = self.path,
        )
    }
}

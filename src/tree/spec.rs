//! Declarative node descriptions.
//!
//! A [`NodeSpec`] is the programmatic form of the description format: it holds
//! everything a node needs before it exists (operator, flags, extension
//! fields, nested children) and is consumed by `Graph::add_node` /
//! `Graph::append_node`, which materialize real nodes from it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::traits::Operator;

/// One entry in a spec's `children` list: either a nested declaration or a
/// tag-string reference to a node that is already registered in the graph
/// (shared subtree by reference, not duplication).
pub enum ChildSpec {
    Node(NodeSpec),
    Ref(String),
}

/// Builder for a node declaration.
///
/// Defaults match the description format: forward propagation on, backward
/// off, no repetition, no timing modifier, identity operator.
pub struct NodeSpec {
    pub(crate) tag: Option<String>,
    pub(crate) operator: Option<Arc<dyn Operator>>,
    pub(crate) forward: bool,
    pub(crate) backward: bool,
    pub(crate) repeat: Option<u32>,
    pub(crate) recursive: Option<u32>,
    pub(crate) delay: Option<Duration>,
    pub(crate) frame: bool,
    pub(crate) props: Map<String, Value>,
    pub(crate) children: Vec<ChildSpec>,
}

impl NodeSpec {
    pub fn new() -> Self {
        Self {
            tag: None,
            operator: None,
            forward: true,
            backward: false,
            repeat: None,
            recursive: None,
            delay: None,
            frame: false,
            props: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Push this node's result into all children after it finishes ticking.
    pub fn forward(mut self, forward: bool) -> Self {
        self.forward = forward;
        self
    }

    /// Push this node's result into its parent after it finishes ticking.
    pub fn backward(mut self, backward: bool) -> Self {
        self.backward = backward;
        self
    }

    /// Re-invoke the operator with the same original input up to `n` times.
    pub fn repeat(mut self, n: u32) -> Self {
        self.repeat = Some(n);
        self
    }

    /// Re-invoke the operator feeding back its own previous output up to `n`
    /// times. Takes precedence over `repeat` when both are set.
    pub fn recursive(mut self, n: u32) -> Self {
        self.recursive = Some(n);
        self
    }

    /// Defer each invocation by a fixed timer. Takes precedence over `frame`.
    pub fn delay_ms(mut self, millis: u64) -> Self {
        self.delay = Some(Duration::from_millis(millis));
        self
    }

    /// Defer each invocation to the next tick of the graph's external clock.
    pub fn frame(mut self, frame: bool) -> Self {
        self.frame = frame;
        self
    }

    /// Attach an arbitrary extension field, visible to the operator through
    /// the node handle.
    pub fn prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    /// Append a nested child declaration.
    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(ChildSpec::Node(child));
        self
    }

    /// Append a reference to an already-registered node by tag.
    pub fn child_ref(mut self, tag: impl Into<String>) -> Self {
        self.children.push(ChildSpec::Ref(tag.into()));
        self
    }
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec")
            .field("tag", &self.tag)
            .field(
                "operator",
                &self.operator.as_ref().map(|op| op.name()).unwrap_or("-"),
            )
            .field("forward", &self.forward)
            .field("backward", &self.backward)
            .field("repeat", &self.repeat)
            .field("recursive", &self.recursive)
            .field("delay", &self.delay)
            .field("frame", &self.frame)
            .field("props", &self.props.len())
            .field("children", &self.children.len())
            .finish()
    }
}

impl std::fmt::Debug for ChildSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildSpec::Node(spec) => f.debug_tuple("Node").field(spec).finish(),
            ChildSpec::Ref(tag) => f.debug_tuple("Ref").field(tag).finish(),
        }
    }
}

//! Graph: tag-indexed ownership of the tree and the execution entry point.
//!
//! The graph owns every node reachable from its registered declarations, both
//! through the flat tag map and through parent-to-child links. Assembly is
//! transactional per declaration: nothing lands in the tag map unless the
//! whole declaration materializes, so a rejected batch leaves the graph
//! exactly as it was.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::engine::runner::{run_node, RunContext, RunOptions};
use crate::errors::{BuildError, RunError};
use crate::observability::messages::engine::{RunCompleted, RunFailed, RunStarted};
use crate::observability::messages::graph::{
    CycleRejected, NodeRegistered, NodeRemoved, TagReplaced,
};
use crate::observability::messages::StructuredLog;
use crate::store::{StateStore, SubscriptionId};
use crate::traits::TickClock;
use crate::tree::{ChildSpec, Node, NodeSpec};

/// Engine-level knobs, settable in code or carried by a config file.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GraphOptions {
    /// Reject duplicate tags instead of silently replacing the old mapping.
    pub strict_tags: bool,
    /// Propagation hop cap per run. Mixed forward/backward flags can bounce
    /// a result around a tree indefinitely; the cap turns that into
    /// `RunError::DepthExceeded`.
    pub max_depth: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            strict_tags: false,
            max_depth: 256,
        }
    }
}

/// Builder for graphs that need non-default options or an external clock.
#[derive(Default)]
pub struct GraphBuilder {
    options: GraphOptions,
    clock: Option<Arc<dyn TickClock>>,
}

impl GraphBuilder {
    pub fn strict_tags(mut self, strict: bool) -> Self {
        self.options.strict_tags = strict;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.options.max_depth = depth;
        self
    }

    pub fn options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    /// Throttling clock used by `frame`-flagged nodes. Without one they run
    /// immediately.
    pub fn clock(mut self, clock: Arc<dyn TickClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Graph {
        Graph {
            nodes: RwLock::new(HashMap::new()),
            store: Arc::new(StateStore::new()),
            options: self.options,
            clock: self.clock,
        }
    }
}

/// What `run` should resolve: a registered tag or a node handle.
pub enum RunTarget {
    Tag(String),
    Node(Arc<Node>),
}

impl From<&str> for RunTarget {
    fn from(tag: &str) -> Self {
        RunTarget::Tag(tag.to_string())
    }
}

impl From<String> for RunTarget {
    fn from(tag: String) -> Self {
        RunTarget::Tag(tag)
    }
}

impl From<Arc<Node>> for RunTarget {
    fn from(node: Arc<Node>) -> Self {
        RunTarget::Node(node)
    }
}

impl From<&Arc<Node>> for RunTarget {
    fn from(node: &Arc<Node>) -> Self {
        RunTarget::Node(Arc::clone(node))
    }
}

/// The tag-indexed execution tree.
pub struct Graph {
    nodes: RwLock<HashMap<String, Arc<Node>>>,
    store: Arc<StateStore>,
    options: GraphOptions,
    clock: Option<Arc<dyn TickClock>>,
}

impl Graph {
    pub fn new() -> Self {
        GraphBuilder::default().build()
    }

    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Materialize a declaration as a new root.
    ///
    /// Nested children are wired depth-first. A `children` entry that is a
    /// tag string resolves to the already-registered node with that tag and
    /// attaches it without re-parenting (shared subtree, read access only);
    /// the reference is rejected if it would close a cycle. An untagged root
    /// receives a generated `top<id>` tag so it stays reachable.
    pub fn add_node(&self, spec: NodeSpec) -> Result<Arc<Node>, BuildError> {
        let mut staged = Vec::new();
        let root = self.materialize(spec, None, &mut staged)?;
        self.commit(staged);
        Ok(root)
    }

    /// Materialize a declaration as a new child of the node tagged `parent`.
    pub fn append_node(&self, spec: NodeSpec, parent: &str) -> Result<Arc<Node>, BuildError> {
        let parent = self.get_node(parent).ok_or_else(|| BuildError::UnknownTag {
            tag: parent.to_string(),
        })?;
        let mut staged = Vec::new();
        let child = self.materialize(spec, Some(&parent), &mut staged)?;
        parent.push_child(Arc::clone(&child));
        self.commit(staged);
        Ok(child)
    }

    pub fn get_node(&self, tag: &str) -> Option<Arc<Node>> {
        self.nodes
            .read()
            .expect("graph tag map lock poisoned")
            .get(tag)
            .cloned()
    }

    /// Unmap `tag`, detach its node from the parent, and drop the tag's
    /// subscriptions. Descendants keep their own tag map entries, so a
    /// removed subtree stays reachable through any tags it contains.
    pub fn remove_node(&self, tag: &str) -> bool {
        let removed = self
            .nodes
            .write()
            .expect("graph tag map lock poisoned")
            .remove(tag);
        let Some(node) = removed else {
            return false;
        };

        if let Some(parent) = node.parent() {
            parent.remove_child(node.id());
        }
        node.clear_parent();
        let dropped = self.store.unsubscribe_all(tag);
        NodeRemoved {
            tag,
            dropped_subscriptions: dropped,
        }
        .log();
        true
    }

    /// Execute the target node and everything its propagation flags reach.
    ///
    /// Returns the target node's own final output; results of propagated
    /// nodes are observable through the store. The call completes only after
    /// the entire propagation subtree has finished.
    pub async fn run(
        &self,
        target: impl Into<RunTarget>,
        input: Value,
    ) -> Result<Value, RunError> {
        self.run_with_options(target, input, RunOptions::default())
            .await
    }

    pub async fn run_with_options(
        &self,
        target: impl Into<RunTarget>,
        input: Value,
        options: RunOptions,
    ) -> Result<Value, RunError> {
        let node = match target.into() {
            RunTarget::Tag(tag) => self
                .get_node(&tag)
                .ok_or_else(|| RunError::UnknownTag { tag })?,
            RunTarget::Node(node) => node,
        };
        let label = node.label();
        RunStarted {
            target: &label,
            max_depth: self.options.max_depth,
        }
        .log();

        // Child token so a deadline abort cancels this run without touching
        // the caller's token.
        let ctx = RunContext {
            clock: self.clock.clone(),
            cancel: options.cancel.child_token(),
            deadline: options.timeout.map(|timeout| Instant::now() + timeout),
            max_depth: self.options.max_depth,
        };

        let started = std::time::Instant::now();
        let outcome = run_node(ctx, node, input, None, 0).await;
        match &outcome {
            Ok(_) => RunCompleted {
                target: &label,
                duration: started.elapsed(),
            }
            .log(),
            Err(err) => RunFailed {
                target: &label,
                error: err,
            }
            .log(),
        }
        outcome
    }

    pub fn subscribe<F>(&self, tag: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.store.subscribe(tag, callback)
    }

    pub fn subscribe_once<F>(&self, tag: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.store.subscribe_once(tag, callback)
    }

    pub fn unsubscribe(&self, tag: &str, id: SubscriptionId) -> bool {
        self.store.unsubscribe(tag, id)
    }

    pub fn unsubscribe_all(&self, tag: &str) -> usize {
        self.store.unsubscribe_all(tag)
    }

    /// Most recent value published under `tag`, if any.
    pub fn latest(&self, tag: &str) -> Option<Value> {
        self.store.latest(tag)
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn options(&self) -> GraphOptions {
        self.options
    }

    /// Number of registered tags.
    pub fn node_count(&self) -> usize {
        self.nodes.read().expect("graph tag map lock poisoned").len()
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        self.nodes
            .read()
            .expect("graph tag map lock poisoned")
            .contains_key(tag)
    }

    pub fn tags(&self) -> Vec<String> {
        self.nodes
            .read()
            .expect("graph tag map lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Build the node for `spec` and, recursively, its children. Tagged
    /// nodes are staged rather than registered so the caller can commit all
    /// or nothing.
    fn materialize(
        &self,
        mut spec: NodeSpec,
        parent: Option<&Arc<Node>>,
        staged: &mut Vec<(String, Arc<Node>)>,
    ) -> Result<Arc<Node>, BuildError> {
        let children = std::mem::take(&mut spec.children);

        let node = match parent {
            None => Node::from_spec_auto_tagged(spec, Arc::clone(&self.store)),
            Some(parent) => {
                let node = Node::from_spec(spec, Arc::clone(&self.store));
                node.set_parent(parent);
                node
            }
        };

        if let Some(tag) = node.tag() {
            let already_staged = staged.iter().any(|(staged_tag, _)| staged_tag == tag);
            if self.options.strict_tags && (already_staged || self.contains_tag(tag)) {
                return Err(BuildError::DuplicateTag {
                    tag: tag.to_string(),
                });
            }
            staged.push((tag.to_string(), Arc::clone(&node)));
        }

        for child in children {
            match child {
                ChildSpec::Node(child_spec) => {
                    let child = self.materialize(child_spec, Some(&node), staged)?;
                    node.push_child(child);
                }
                ChildSpec::Ref(tag) => {
                    let shared = self.resolve_reference(&tag, staged)?;
                    self.check_no_cycle(&node, &shared, &tag)?;
                    node.push_child(shared);
                }
            }
        }

        Ok(node)
    }

    /// Resolve a tag-string child entry, preferring the live map and falling
    /// back to tags registered earlier in the same batch.
    fn resolve_reference(
        &self,
        tag: &str,
        staged: &[(String, Arc<Node>)],
    ) -> Result<Arc<Node>, BuildError> {
        if let Some(node) = self.get_node(tag) {
            return Ok(node);
        }
        staged
            .iter()
            .rev()
            .find(|(staged_tag, _)| staged_tag == tag)
            .map(|(_, node)| Arc::clone(node))
            .ok_or_else(|| BuildError::UnknownTag {
                tag: tag.to_string(),
            })
    }

    /// A shared subtree must not reach back to the node it is being attached
    /// under, nor to any ancestor of that node. Runs when the reference is
    /// resolved, before anything is committed.
    fn check_no_cycle(
        &self,
        attach: &Arc<Node>,
        shared: &Arc<Node>,
        tag: &str,
    ) -> Result<(), BuildError> {
        // Ancestor chain of the attach point, nearest first. Fresh parents
        // already carry their links, so the chain crosses into the existing
        // tree for append_node batches.
        let mut ancestors = Vec::new();
        let mut cursor = Some(Arc::clone(attach));
        while let Some(node) = cursor {
            cursor = node.parent();
            ancestors.push(node);
        }

        let mut stack = vec![(Arc::clone(shared), vec![shared.label()])];
        let mut seen = HashSet::new();
        while let Some((node, path)) = stack.pop() {
            if let Some(pos) = ancestors.iter().position(|a| a.id() == node.id()) {
                // Read the offending loop child-edge by child-edge: through
                // the referenced subtree to the hit ancestor, down to the
                // attach point, and back into the reference.
                let mut full = path;
                for ancestor in ancestors[..pos].iter().rev() {
                    full.push(ancestor.label());
                }
                full.push(shared.label());
                CycleRejected {
                    tag,
                    path: &full.join(" -> "),
                }
                .log();
                return Err(BuildError::CycleDetected {
                    tag: tag.to_string(),
                    path: full,
                });
            }
            if !seen.insert(node.id()) {
                continue;
            }
            for child in node.children() {
                let mut next = path.clone();
                next.push(child.label());
                stack.push((child, next));
            }
        }
        Ok(())
    }

    fn commit(&self, staged: Vec<(String, Arc<Node>)>) {
        let mut events = Vec::with_capacity(staged.len());
        {
            let mut nodes = self.nodes.write().expect("graph tag map lock poisoned");
            for (tag, node) in staged {
                let replaced = nodes.insert(tag.clone(), node).is_some();
                events.push((tag, replaced, nodes.len()));
            }
        }
        for (tag, replaced, node_count) in events {
            if replaced {
                TagReplaced { tag: &tag }.log();
            }
            NodeRegistered {
                tag: &tag,
                node_count,
            }
            .log();
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("tags", &self.node_count())
            .field("options", &self.options)
            .field("clock", &self.clock.is_some())
            .finish()
    }
}

//! A single unit of execution: operator, scheduling policy, tree links.
//!
//! Nodes are always handled as `Arc<Node>`. The graph owns them through its
//! tag map and through parent-to-child links; the parent back-reference is a
//! `Weak` so dropping a subtree never keeps its parent alive. Mutation is
//! synchronized per node, and the run path snapshots the policy once per
//! invocation, so an edit landing mid-run applies from the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::store::StateStore;
use crate::traits::{Identity, Operator};
use crate::tree::NodeSpec;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identity, independent of tags. Untagged nodes are
/// only distinguishable by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observable lifecycle of one node invocation.
///
/// `Idle -> Running(tick 1..=N) -> Propagating -> Idle`; `Failed` is entered
/// only when the operator itself reports failure and sticks until the next
/// invocation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    Running { tick: u32 },
    Propagating,
    Failed,
}

/// How many operator invocations one run of the node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    Once,
    /// Every tick receives the same original input; the last output wins.
    Repeat(u32),
    /// Tick k+1 receives tick k's output (a fold over the node's own output).
    Recursive(u32),
}

impl SchedulePolicy {
    /// Total ticks to execute. Counts below 2 collapse to a single plain
    /// invocation.
    pub fn ticks(&self) -> u32 {
        match *self {
            SchedulePolicy::Once => 1,
            SchedulePolicy::Repeat(n) | SchedulePolicy::Recursive(n) => n.max(1),
        }
    }
}

/// What every tick waits for before the operator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    Immediate,
    Delay(Duration),
    /// Next tick of the graph's external clock; immediate when the graph has
    /// no clock configured.
    Frame,
}

/// The typed scheduling core of a node. Everything not covered here lives in
/// the open extension map.
#[derive(Debug, Clone, Copy)]
pub struct NodePolicy {
    pub forward: bool,
    pub backward: bool,
    pub repeat: Option<u32>,
    pub recursive: Option<u32>,
    pub delay: Option<Duration>,
    pub frame: bool,
}

impl Default for NodePolicy {
    fn default() -> Self {
        Self {
            forward: true,
            backward: false,
            repeat: None,
            recursive: None,
            delay: None,
            frame: false,
        }
    }
}

impl NodePolicy {
    /// `recursive` takes precedence over `repeat` when both are set.
    pub fn schedule(&self) -> SchedulePolicy {
        if let Some(n) = self.recursive {
            SchedulePolicy::Recursive(n)
        } else if let Some(n) = self.repeat {
            SchedulePolicy::Repeat(n)
        } else {
            SchedulePolicy::Once
        }
    }

    /// `delay` takes precedence over `frame` when both are set.
    pub fn pacing(&self) -> Pacing {
        if let Some(delay) = self.delay {
            Pacing::Delay(delay)
        } else if self.frame {
            Pacing::Frame
        } else {
            Pacing::Immediate
        }
    }
}

/// One executable node of a graph.
pub struct Node {
    id: NodeId,
    tag: Option<String>,
    operator: RwLock<Arc<dyn Operator>>,
    policy: RwLock<NodePolicy>,
    props: RwLock<Map<String, Value>>,
    parent: RwLock<Weak<Node>>,
    children: RwLock<Vec<Arc<Node>>>,
    state: Mutex<NodeState>,
    // Held across the tick loop so two runs of the same node never overlap;
    // released before propagation so a shared subtree can re-enter.
    run_gate: tokio::sync::Mutex<()>,
    store: Arc<StateStore>,
}

impl Node {
    /// Materialize a single node from `spec`. Nested child declarations are
    /// not wired here; graph-level registration does that so tag bookkeeping
    /// and cycle checks stay enforced.
    pub(crate) fn from_spec(spec: NodeSpec, store: Arc<StateStore>) -> Arc<Node> {
        Self::build(spec, store, false)
    }

    /// Like [`Node::from_spec`], but an untagged spec receives a generated
    /// `top<id>` tag. Roots must always be reachable through the tag map.
    pub(crate) fn from_spec_auto_tagged(spec: NodeSpec, store: Arc<StateStore>) -> Arc<Node> {
        Self::build(spec, store, true)
    }

    fn build(spec: NodeSpec, store: Arc<StateStore>, auto_tag: bool) -> Arc<Node> {
        let id = NodeId::next();
        let tag = spec.tag.or_else(|| auto_tag.then(|| format!("top{}", id.0)));
        let operator: Arc<dyn Operator> = spec.operator.unwrap_or_else(|| Arc::new(Identity));
        let policy = NodePolicy {
            forward: spec.forward,
            backward: spec.backward,
            repeat: spec.repeat,
            recursive: spec.recursive,
            delay: spec.delay,
            frame: spec.frame,
        };

        Arc::new(Node {
            id,
            tag,
            operator: RwLock::new(operator),
            policy: RwLock::new(policy),
            props: RwLock::new(spec.props),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            state: Mutex::new(NodeState::Idle),
            run_gate: tokio::sync::Mutex::new(()),
            store,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The graph-wide lookup key. Absent for structural children declared
    /// without one; immutable after construction.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Identity for logs and errors: the tag when present, the id otherwise.
    pub fn label(&self) -> String {
        self.tag.clone().unwrap_or_else(|| self.id.to_string())
    }

    pub fn operator(&self) -> Arc<dyn Operator> {
        Arc::clone(&self.operator.read().expect("node operator lock poisoned"))
    }

    pub fn set_operator(&self, operator: Arc<dyn Operator>) {
        *self.operator.write().expect("node operator lock poisoned") = operator;
    }

    /// Snapshot of the typed scheduling core.
    pub fn policy(&self) -> NodePolicy {
        *self.policy.read().expect("node policy lock poisoned")
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock().expect("node state lock poisoned")
    }

    pub(crate) fn set_state(&self, state: NodeState) {
        *self.state.lock().expect("node state lock poisoned") = state;
    }

    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent
            .read()
            .expect("node parent lock poisoned")
            .upgrade()
    }

    /// Snapshot of the child list in declaration order.
    pub fn children(&self) -> Vec<Arc<Node>> {
        self.children
            .read()
            .expect("node children lock poisoned")
            .clone()
    }

    pub(crate) fn set_parent(&self, parent: &Arc<Node>) {
        *self.parent.write().expect("node parent lock poisoned") = Arc::downgrade(parent);
    }

    pub(crate) fn clear_parent(&self) {
        *self.parent.write().expect("node parent lock poisoned") = Weak::new();
    }

    pub(crate) fn push_child(&self, child: Arc<Node>) {
        self.children
            .write()
            .expect("node children lock poisoned")
            .push(child);
    }

    pub(crate) fn remove_child(&self, id: NodeId) -> bool {
        let mut children = self.children.write().expect("node children lock poisoned");
        let before = children.len();
        children.retain(|child| child.id != id);
        children.len() < before
    }

    /// Read one extension field.
    pub fn prop(&self, key: &str) -> Option<Value> {
        self.props
            .read()
            .expect("node props lock poisoned")
            .get(key)
            .cloned()
    }

    /// Write one extension field.
    pub fn set_prop(&self, key: impl Into<String>, value: Value) {
        self.props
            .write()
            .expect("node props lock poisoned")
            .insert(key.into(), value);
    }

    /// Snapshot of the whole extension map.
    pub fn props(&self) -> Map<String, Value> {
        self.props.read().expect("node props lock poisoned").clone()
    }

    /// Merge a batch of fields into the node.
    ///
    /// The typed core keys (`forward`, `backward`, `repeat`, `recursive`,
    /// `delay`, `frame`) update the scheduling policy when the value coerces;
    /// `null` clears the optional ones. Everything else, including core keys
    /// whose value does not coerce, lands in the extension map.
    pub fn set_props(&self, fields: Map<String, Value>) {
        for (key, value) in fields {
            if self.apply_policy_field(&key, &value) {
                continue;
            }
            self.set_prop(key, value);
        }
    }

    fn apply_policy_field(&self, key: &str, value: &Value) -> bool {
        let mut policy = self.policy.write().expect("node policy lock poisoned");
        match (key, value) {
            ("forward", Value::Bool(b)) => policy.forward = *b,
            ("backward", Value::Bool(b)) => policy.backward = *b,
            ("frame", Value::Bool(b)) => policy.frame = *b,
            ("repeat", Value::Null) => policy.repeat = None,
            ("repeat", v) if coerce_count(v).is_some() => policy.repeat = coerce_count(v),
            ("recursive", Value::Null) => policy.recursive = None,
            ("recursive", v) if coerce_count(v).is_some() => policy.recursive = coerce_count(v),
            ("delay", Value::Null) => policy.delay = None,
            ("delay", v) if v.as_u64().is_some() => {
                policy.delay = v.as_u64().map(Duration::from_millis)
            }
            _ => return false,
        }
        true
    }

    /// The store this node publishes into.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub(crate) fn run_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.run_gate
    }

    /// Run exactly one operator call, then publish the output under the
    /// node's tag when it has one. Scheduling and propagation are layered on
    /// top by the engine; this suspends only inside the operator itself.
    pub(crate) async fn invoke(
        self: &Arc<Self>,
        input: Value,
        origin: Option<Arc<Node>>,
    ) -> anyhow::Result<Value> {
        let operator = self.operator();
        let output = operator.run(input, Arc::clone(self), origin).await?;
        if let Some(tag) = &self.tag {
            self.store.publish(tag, output.clone());
        }
        Ok(output)
    }
}

fn coerce_count(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("operator", &self.operator().name())
            .field("state", &self.state())
            .field("children", &self.children().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::op;
    use serde_json::json;

    fn store() -> Arc<StateStore> {
        Arc::new(StateStore::new())
    }

    #[test]
    fn test_from_spec_defaults() {
        let node = Node::from_spec(NodeSpec::new(), store());
        assert!(node.tag().is_none());
        assert_eq!(node.operator().name(), "identity");
        assert_eq!(node.state(), NodeState::Idle);
        let policy = node.policy();
        assert!(policy.forward && !policy.backward);
        assert_eq!(policy.schedule(), SchedulePolicy::Once);
        assert_eq!(policy.pacing(), Pacing::Immediate);
    }

    #[test]
    fn test_auto_tag_uses_node_id() {
        let node = Node::from_spec_auto_tagged(NodeSpec::new(), store());
        let tag = node.tag().expect("auto-tagged");
        assert!(tag.starts_with("top"));
        assert_eq!(
            format!("#{}", tag.trim_start_matches("top")),
            node.id().to_string()
        );
    }

    #[test]
    fn test_explicit_tag_survives_auto_tagging() {
        let node = Node::from_spec_auto_tagged(NodeSpec::new().tag("root"), store());
        assert_eq!(node.tag(), Some("root"));
    }

    #[test]
    fn test_label_prefers_tag() {
        let tagged = Node::from_spec(NodeSpec::new().tag("source"), store());
        assert_eq!(tagged.label(), "source");
        let anonymous = Node::from_spec(NodeSpec::new(), store());
        assert_eq!(anonymous.label(), anonymous.id().to_string());
        assert!(anonymous.label().starts_with('#'));
    }

    #[test]
    fn test_policy_precedence() {
        let node = Node::from_spec(
            NodeSpec::new().repeat(3).recursive(5).delay_ms(10).frame(true),
            store(),
        );
        let policy = node.policy();
        assert_eq!(policy.schedule(), SchedulePolicy::Recursive(5));
        assert_eq!(policy.pacing(), Pacing::Delay(Duration::from_millis(10)));
    }

    #[test]
    fn test_tick_counts_below_two_collapse() {
        assert_eq!(SchedulePolicy::Once.ticks(), 1);
        assert_eq!(SchedulePolicy::Repeat(0).ticks(), 1);
        assert_eq!(SchedulePolicy::Repeat(1).ticks(), 1);
        assert_eq!(SchedulePolicy::Recursive(0).ticks(), 1);
        assert_eq!(SchedulePolicy::Repeat(4).ticks(), 4);
    }

    #[test]
    fn test_set_props_routes_core_keys_to_policy() {
        let node = Node::from_spec(NodeSpec::new(), store());
        let mut fields = Map::new();
        fields.insert("backward".to_string(), json!(true));
        fields.insert("repeat".to_string(), json!(4));
        fields.insert("delay".to_string(), json!(250));
        fields.insert("weight".to_string(), json!(0.5));
        node.set_props(fields);

        let policy = node.policy();
        assert!(policy.backward);
        assert_eq!(policy.repeat, Some(4));
        assert_eq!(policy.delay, Some(Duration::from_millis(250)));
        // Core keys never leak into the extension map.
        assert!(node.prop("backward").is_none());
        assert_eq!(node.prop("weight"), Some(json!(0.5)));
    }

    #[test]
    fn test_set_props_null_clears_counts_and_delay() {
        let node = Node::from_spec(NodeSpec::new().repeat(3).delay_ms(10), store());
        let mut fields = Map::new();
        fields.insert("repeat".to_string(), Value::Null);
        fields.insert("delay".to_string(), Value::Null);
        node.set_props(fields);
        let policy = node.policy();
        assert_eq!(policy.repeat, None);
        assert_eq!(policy.delay, None);
        assert_eq!(policy.schedule(), SchedulePolicy::Once);
    }

    #[test]
    fn test_set_props_uncoercible_core_key_becomes_extension() {
        let node = Node::from_spec(NodeSpec::new(), store());
        let mut fields = Map::new();
        fields.insert("repeat".to_string(), json!("three"));
        node.set_props(fields);
        assert_eq!(node.policy().repeat, None);
        assert_eq!(node.prop("repeat"), Some(json!("three")));
    }

    #[test]
    fn test_parent_link_is_weak() {
        let store = store();
        let parent = Node::from_spec(NodeSpec::new().tag("p"), Arc::clone(&store));
        let child = Node::from_spec(NodeSpec::new().tag("c"), store);
        child.set_parent(&parent);
        parent.push_child(Arc::clone(&child));

        assert_eq!(child.parent().unwrap().tag(), Some("p"));
        assert_eq!(parent.children().len(), 1);

        drop(parent);
        assert!(child.parent().is_none());
    }

    #[test]
    fn test_remove_child_by_id() {
        let store = store();
        let parent = Node::from_spec(NodeSpec::new(), Arc::clone(&store));
        let child = Node::from_spec(NodeSpec::new(), store);
        parent.push_child(Arc::clone(&child));

        assert!(parent.remove_child(child.id()));
        assert!(!parent.remove_child(child.id()));
        assert!(parent.children().is_empty());
    }

    #[tokio::test]
    async fn test_invoke_publishes_under_tag() {
        let store = store();
        let node = Node::from_spec(
            NodeSpec::new()
                .tag("doubler")
                .operator(op(|input, _, _| Ok(json!(input.as_i64().unwrap_or(0) * 2)))),
            Arc::clone(&store),
        );
        let out = node.invoke(json!(21), None).await.unwrap();
        assert_eq!(out, json!(42));
        assert_eq!(store.latest("doubler"), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_invoke_without_tag_skips_publish() {
        let store = store();
        let node = Node::from_spec(NodeSpec::new(), Arc::clone(&store));
        let out = node.invoke(json!("pass"), None).await.unwrap();
        assert_eq!(out, json!("pass"));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_set_operator_replaces_behavior() {
        let store = store();
        let node = Node::from_spec(NodeSpec::new().tag("n"), store);
        assert_eq!(node.invoke(json!(7), None).await.unwrap(), json!(7));

        node.set_operator(op(|input, _, _| {
            Ok(json!(input.as_i64().unwrap_or(0) + 100))
        }));
        assert_eq!(node.invoke(json!(7), None).await.unwrap(), json!(107));
    }

    #[tokio::test]
    async fn test_operator_sees_node_props() {
        let store = store();
        let node = Node::from_spec(
            NodeSpec::new()
                .prop("offset", json!(5))
                .operator(op(|input, node, _| {
                    let offset = node
                        .prop("offset")
                        .and_then(|v| v.as_i64())
                        .unwrap_or(0);
                    Ok(json!(input.as_i64().unwrap_or(0) + offset))
                })),
            store,
        );
        assert_eq!(node.invoke(json!(10), None).await.unwrap(), json!(15));
    }
}

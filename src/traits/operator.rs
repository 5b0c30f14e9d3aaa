use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::tree::Node;

/// A user-supplied transformation wrapped by a node.
///
/// The engine never inspects an operator's body, only its result. `node` is
/// the node being executed, handed over as a read/write capability object
/// (tag, extension properties, state); `origin` is the node whose propagation
/// triggered this invocation, or `None` for a direct `run` call.
#[async_trait]
pub trait Operator: Send + Sync {
    async fn run(
        &self,
        input: Value,
        node: Arc<Node>,
        origin: Option<Arc<Node>>,
    ) -> anyhow::Result<Value>;

    fn name(&self) -> &'static str {
        "anonymous"
    }
}

/// Pass-through operator used when a declaration names no operator.
///
/// Keeps pure wiring nodes (fan-out points, tagged observation taps) runnable
/// without forcing authors to write `|x| x` everywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

#[async_trait]
impl Operator for Identity {
    async fn run(
        &self,
        input: Value,
        _node: Arc<Node>,
        _origin: Option<Arc<Node>>,
    ) -> anyhow::Result<Value> {
        Ok(input)
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Adapter turning a plain closure into an [`Operator`].
///
/// Covers the common synchronous case; operators that genuinely need to
/// suspend implement the trait directly.
pub struct FnOperator<F> {
    f: F,
    name: &'static str,
}

impl<F> FnOperator<F>
where
    F: Fn(Value, Arc<Node>, Option<Arc<Node>>) -> anyhow::Result<Value> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f, name: "closure" }
    }

    pub fn named(name: &'static str, f: F) -> Self {
        Self { f, name }
    }
}

#[async_trait]
impl<F> Operator for FnOperator<F>
where
    F: Fn(Value, Arc<Node>, Option<Arc<Node>>) -> anyhow::Result<Value> + Send + Sync,
{
    async fn run(
        &self,
        input: Value,
        node: Arc<Node>,
        origin: Option<Arc<Node>>,
    ) -> anyhow::Result<Value> {
        (self.f)(input, node, origin)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Shorthand for registering closures: `op(|x, _, _| Ok(x))`.
pub fn op<F>(f: F) -> Arc<dyn Operator>
where
    F: Fn(Value, Arc<Node>, Option<Arc<Node>>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnOperator::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StateStore;
    use crate::tree::NodeSpec;
    use serde_json::json;

    fn test_node() -> Arc<Node> {
        Node::from_spec(NodeSpec::new(), Arc::new(StateStore::new()))
    }

    #[tokio::test]
    async fn test_identity_passes_input_through() {
        let node = test_node();
        let out = Identity.run(json!({"a": 1}), node, None).await.unwrap();
        assert_eq!(out, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_fn_operator_runs_closure() {
        let node = test_node();
        let double = FnOperator::named("double", |input, _node, _origin| {
            let n = input.as_i64().unwrap_or(0);
            Ok(json!(n * 2))
        });
        let out = double.run(json!(21), node, None).await.unwrap();
        assert_eq!(out, json!(42));
        assert_eq!(double.name(), "double");
    }

    #[tokio::test]
    async fn test_fn_operator_propagates_errors() {
        let node = test_node();
        let fails = FnOperator::new(|_input, _node, _origin| anyhow::bail!("nope"));
        let err = fails.run(json!(null), node, None).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn test_default_names() {
        assert_eq!(Identity.name(), "identity");
        let anon = FnOperator::new(|input, _, _| Ok(input));
        assert_eq!(anon.name(), "closure");
    }
}

//! The run path: per-node tick loop, pacing, and propagation.
//!
//! A run is one boxed recursive future per node it touches. The tick loop
//! holds the node's run gate so two runs of the same node never overlap;
//! propagation happens after the gate is released so a shared subtree can hop
//! back into a node that appears twice in the traversal.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::RunError;
use crate::observability::messages::engine::TickExecuted;
use crate::observability::messages::StructuredLog;
use crate::traits::TickClock;
use crate::tree::{Node, NodeState, Pacing, SchedulePolicy};

/// Caller-side controls for one `run` call.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stops the run when fired. The engine derives a child token internally,
    /// so a deadline abort never cancels the caller's own token.
    pub cancel: CancellationToken,
    /// Wall-clock budget for the whole run, pacing waits included.
    pub timeout: Option<Duration>,
}

/// Everything a recursive hop needs. Cheap to clone into spawned siblings.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub(crate) clock: Option<Arc<dyn TickClock>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) deadline: Option<Instant>,
    pub(crate) max_depth: usize,
}

type NodeFuture = Pin<Box<dyn Future<Output = Result<Value, RunError>> + Send>>;

/// Execute one node and everything its propagation flags reach.
///
/// Boxed because the future recurses through propagation; owned arguments so
/// sibling hops can run as independent spawned tasks.
pub(crate) fn run_node(
    ctx: RunContext,
    node: Arc<Node>,
    input: Value,
    origin: Option<Arc<Node>>,
    depth: usize,
) -> NodeFuture {
    Box::pin(async move {
        if depth >= ctx.max_depth {
            return Err(RunError::DepthExceeded {
                limit: ctx.max_depth,
            });
        }

        let result = {
            let _gate = tokio::select! {
                gate = node.run_gate().lock() => gate,
                _ = ctx.cancel.cancelled() => return Err(interruption(&ctx)),
            };
            run_ticks(&ctx, &node, input, origin.clone()).await?
        };

        node.set_state(NodeState::Propagating);
        let propagated = propagate(&ctx, &node, &result, origin, depth).await;
        node.set_state(NodeState::Idle);
        propagated?;

        Ok(result)
    })
}

/// Drive the node's scheduling policy: N paced, strictly sequential ticks.
/// Tick i+1 never starts before tick i's publish completed.
async fn run_ticks(
    ctx: &RunContext,
    node: &Arc<Node>,
    input: Value,
    origin: Option<Arc<Node>>,
) -> Result<Value, RunError> {
    let policy = node.policy();
    let schedule = policy.schedule();
    let pacing = policy.pacing();
    let ticks = schedule.ticks();
    let label = node.label();

    let mut output = input.clone();
    for tick in 1..=ticks {
        if ctx.cancel.is_cancelled() {
            node.set_state(NodeState::Idle);
            return Err(interruption(ctx));
        }
        if let Err(err) = wait_for_slot(ctx, &pacing).await {
            node.set_state(NodeState::Idle);
            return Err(err);
        }

        node.set_state(NodeState::Running { tick });
        let tick_input = match schedule {
            // Feed the previous output back in; the first tick still sees
            // the caller's input.
            SchedulePolicy::Recursive(_) if tick > 1 => output.clone(),
            _ => input.clone(),
        };
        match node.invoke(tick_input, origin.clone()).await {
            Ok(value) => output = value,
            Err(source) => {
                node.set_state(NodeState::Failed);
                return Err(RunError::Operator {
                    node: label,
                    operator: node.operator().name().to_string(),
                    source,
                });
            }
        }
        TickExecuted {
            node: &label,
            tick,
            ticks,
        }
        .log();
    }

    Ok(output)
}

/// Hold this tick until its slot arrives. `frame` with no clock configured
/// degrades to immediate execution so headless runs cannot deadlock.
async fn wait_for_slot(ctx: &RunContext, pacing: &Pacing) -> Result<(), RunError> {
    match pacing {
        Pacing::Immediate => Ok(()),
        Pacing::Delay(delay) => bounded_wait(ctx, tokio::time::sleep(*delay)).await,
        Pacing::Frame => match ctx.clock.as_ref() {
            Some(clock) => bounded_wait(ctx, clock.next_tick()).await,
            None => Ok(()),
        },
    }
}

/// Race a pacing wait against cancellation and the run deadline. Hitting the
/// deadline cancels the rest of the run before reporting it.
async fn bounded_wait<F>(ctx: &RunContext, wait: F) -> Result<(), RunError>
where
    F: Future<Output = ()>,
{
    match ctx.deadline {
        Some(deadline) => {
            tokio::select! {
                _ = wait => Ok(()),
                _ = ctx.cancel.cancelled() => Err(interruption(ctx)),
                _ = tokio::time::sleep_until(deadline) => {
                    ctx.cancel.cancel();
                    Err(RunError::DeadlineExceeded)
                }
            }
        }
        None => {
            tokio::select! {
                _ = wait => Ok(()),
                _ = ctx.cancel.cancelled() => Err(interruption(ctx)),
            }
        }
    }
}

/// Map an interruption to the right error. A fired deadline reads as
/// `DeadlineExceeded` even on branches that only observed the cancellation
/// it triggered.
fn interruption(ctx: &RunContext) -> RunError {
    match ctx.deadline {
        Some(deadline) if Instant::now() >= deadline => RunError::DeadlineExceeded,
        _ => RunError::Cancelled,
    }
}

/// Push `result` to the parent and/or children per the node's flags.
///
/// Backward first; a failed backward hop short-circuits the forward fan-out.
/// Neither direction re-targets the origin node, which stops a parent and
/// child from bouncing one result back and forth forever.
async fn propagate(
    ctx: &RunContext,
    node: &Arc<Node>,
    result: &Value,
    origin: Option<Arc<Node>>,
    depth: usize,
) -> Result<(), RunError> {
    if ctx.cancel.is_cancelled() {
        return Err(interruption(ctx));
    }

    let policy = node.policy();
    let origin_id = origin.as_ref().map(|n| n.id());

    if policy.backward {
        if let Some(parent) = node.parent() {
            if Some(parent.id()) != origin_id {
                run_node(
                    ctx.clone(),
                    parent,
                    result.clone(),
                    Some(Arc::clone(node)),
                    depth + 1,
                )
                .await?;
            }
        }
    }

    if policy.forward {
        let children: Vec<Arc<Node>> = node
            .children()
            .into_iter()
            .filter(|child| Some(child.id()) != origin_id)
            .collect();

        // Siblings run as independent tasks, dispatched and joined in
        // declaration order so failures aggregate deterministically.
        let mut handles = Vec::with_capacity(children.len());
        for child in children {
            let hop = run_node(
                ctx.clone(),
                child,
                result.clone(),
                Some(Arc::clone(node)),
                depth + 1,
            );
            handles.push(tokio::spawn(hop));
        }

        let mut failures = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => failures.push(err),
                Err(join_err) => failures.push(RunError::Internal {
                    message: format!("propagation task failed to join: {join_err}"),
                }),
            }
        }
        if let Some(err) = RunError::from_failures(failures) {
            return Err(err);
        }
    }

    Ok(())
}

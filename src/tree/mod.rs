//! The execution tree: nodes and the declarations they are built from.

pub mod node;
pub mod spec;

pub use node::{Node, NodeId, NodePolicy, NodeState, Pacing, SchedulePolicy};
pub use spec::{ChildSpec, NodeSpec};

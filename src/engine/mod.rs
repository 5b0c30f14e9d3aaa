pub mod graph;
pub mod runner;

pub use graph::{Graph, GraphBuilder, GraphOptions, RunTarget};
pub use runner::RunOptions;

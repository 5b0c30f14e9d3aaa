// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors surfaced by `Graph::run` and the propagation machinery.
//!
//! A run is a tree of awaited sub-executions, so two shapes matter here: the
//! single error that aborted the caller's own path, and the aggregate form
//! collecting failures from sibling branches that were already in flight when
//! one of them went down.

use thiserror::Error;

/// Execution-time failures.
#[derive(Error, Debug)]
pub enum RunError {
    /// `run` was asked for a tag that is not registered in the graph.
    #[error("no node registered under tag '{tag}'")]
    UnknownTag { tag: String },

    /// The user-supplied operator reported failure. The failing tick is not
    /// retried and its result is not propagated.
    #[error("operator '{operator}' failed at node '{node}': {source}")]
    Operator {
        node: String,
        operator: String,
        #[source]
        source: anyhow::Error,
    },

    /// The run's cancellation token fired before the node finished ticking.
    #[error("run cancelled")]
    Cancelled,

    /// A `delay`/`frame` wait ran past the caller-supplied deadline. The rest
    /// of the run is cancelled when this fires.
    #[error("scheduling wait exceeded the run deadline")]
    DeadlineExceeded,

    /// Propagation walked more hops than the graph allows. Mixed forward and
    /// backward flags can bounce results around a tree indefinitely; the hop
    /// cap turns that into an error instead.
    #[error("propagation exceeded {limit} hops")]
    DepthExceeded { limit: usize },

    /// Two or more sibling branches of a forward fan-out failed. Failures are
    /// kept in declaration order.
    #[error("{} propagation branches failed (first: {})", .failures.len(), .failures.first().map(|e| e.to_string()).unwrap_or_default())]
    Aggregate { failures: Vec<RunError> },

    /// A spawned sibling task could not be joined. Indicates a panic inside
    /// the runtime, not a graph-level failure.
    #[error("internal execution error: {message}")]
    Internal { message: String },
}

impl RunError {
    /// Collapse a batch of sibling failures: zero is `None`, one failure
    /// passes through untouched, more than one becomes `Aggregate`.
    pub fn from_failures(mut failures: Vec<RunError>) -> Option<RunError> {
        match failures.len() {
            0 => None,
            1 => Some(failures.remove(0)),
            _ => Some(RunError::Aggregate { failures }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_failures_empty_is_none() {
        assert!(RunError::from_failures(vec![]).is_none());
    }

    #[test]
    fn test_from_failures_single_passes_through() {
        let single = RunError::from_failures(vec![RunError::Cancelled]);
        assert!(matches!(single, Some(RunError::Cancelled)));
    }

    #[test]
    fn test_from_failures_many_aggregate() {
        let got = RunError::from_failures(vec![
            RunError::UnknownTag {
                tag: "a".to_string(),
            },
            RunError::Cancelled,
        ]);
        match got {
            Some(RunError::Aggregate { failures }) => {
                assert_eq!(failures.len(), 2);
                assert!(matches!(&failures[0], RunError::UnknownTag { tag } if tag == "a"));
            }
            other => panic!("expected Aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_aggregate_display_mentions_count_and_first() {
        let err = RunError::Aggregate {
            failures: vec![
                RunError::Cancelled,
                RunError::DeadlineExceeded,
            ],
        };
        let text = err.to_string();
        assert!(text.contains("2 propagation branches failed"));
        assert!(text.contains("run cancelled"));
    }
}

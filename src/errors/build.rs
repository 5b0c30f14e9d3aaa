// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while materializing node declarations into a graph.

use thiserror::Error;

/// Construction-time failures from `add_node` / `append_node`.
///
/// These are all detectable before any operator runs: the declaration either
/// references something the graph does not know about, collides with an
/// existing tag while strict mode is on, or would wire a cycle into what must
/// stay a tree.
#[derive(Error, Debug)]
pub enum BuildError {
    /// A tag-string child reference (or an `append_node` target) named a tag
    /// that is not registered in the graph.
    #[error("no node registered under tag '{tag}'")]
    UnknownTag { tag: String },

    /// Strict mode only: the declaration carries a tag that is already
    /// registered. The default policy replaces the old mapping silently.
    #[error("tag '{tag}' is already registered")]
    DuplicateTag { tag: String },

    /// Resolving a shared-subtree reference would create a path from the
    /// referenced node back to one of its new ancestors.
    #[error("reference to '{tag}' would close a cycle: {}", .path.join(" -> "))]
    CycleDetected { tag: String, path: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_detected_display_joins_path() {
        let err = BuildError::CycleDetected {
            tag: "a".to_string(),
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "reference to 'a' would close a cycle: a -> b -> a"
        );
    }

    #[test]
    fn test_unknown_tag_display() {
        let err = BuildError::UnknownTag {
            tag: "missing".to_string(),
        };
        assert_eq!(err.to_string(), "no node registered under tag 'missing'");
    }
}

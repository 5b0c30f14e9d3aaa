// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while loading and binding declarative graph files.

use thiserror::Error;

use crate::errors::BuildError;

/// Failures from `config::load_config` and from binding a loaded description
/// against an [`OperatorRegistry`](crate::config::OperatorRegistry).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read graph description: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML, or its shape does not match the
    /// description format.
    #[error("failed to parse graph description: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A node names an operator the registry does not know.
    #[error("node '{node}' names unknown operator '{operator}'")]
    UnknownOperator { node: String, operator: String },

    /// The described tree could not be registered (duplicate tag under strict
    /// mode, dangling tag reference, cycle).
    #[error("graph description failed to assemble: {0}")]
    Build(#[from] BuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_operator_display() {
        let err = ConfigError::UnknownOperator {
            node: "source".to_string(),
            operator: "uppercase".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "node 'source' names unknown operator 'uppercase'"
        );
    }
}

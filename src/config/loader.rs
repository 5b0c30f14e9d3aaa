// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::OperatorRegistry;
use crate::engine::{Graph, GraphOptions};
use crate::errors::ConfigError;
use crate::tree::NodeSpec;

/// Top-level structure of a declarative graph file.
///
/// This struct represents a complete graph description: engine options and
/// the root node declarations with their nested children. It is typically
/// loaded from a YAML file and bound against an [`OperatorRegistry`].
///
/// # Fields
/// * `options` - engine options (optional; strict tag mode, propagation depth cap)
/// * `nodes` - root node declarations, registered in order
///
/// # Example
/// ```yaml
/// options:
///   strict_tags: true
///   max_depth: 64
/// nodes:
///   - tag: source
///     operator: increment
///     children:
///       - tag: sink
///         operator: double
/// ```
#[derive(Debug, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub options: GraphOptions,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

/// One node declaration.
///
/// The typed core keys cover identity, the operator name, propagation flags,
/// and the scheduling policy. Every other key in the mapping is preserved
/// verbatim in the extension map and visible to the operator at run time.
///
/// # Fields
/// * `tag` - graph-wide lookup key (optional; untagged roots get a generated one)
/// * `operator` - operator name, resolved through the registry at bind time
///   (optional; defaults to the identity pass-through)
/// * `forward` / `backward` - propagation flags (default: forward only)
/// * `repeat` / `recursive` - re-invocation counts (optional)
/// * `delay` - per-tick timer deferral in milliseconds (optional)
/// * `frame` - defer each tick to the graph's external clock instead
/// * `children` - one nested declaration, a list of them, or tag-string
///   references to already-registered nodes
#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default = "default_forward")]
    pub forward: bool,
    #[serde(default)]
    pub backward: bool,
    #[serde(default)]
    pub repeat: Option<u32>,
    #[serde(default)]
    pub recursive: Option<u32>,
    #[serde(default)]
    pub delay: Option<u64>,
    #[serde(default)]
    pub frame: bool,
    #[serde(default)]
    pub children: Option<ChildrenConfig>,
    #[serde(flatten)]
    pub props: Map<String, Value>,
}

fn default_forward() -> bool {
    true
}

/// `children` accepts a single nested declaration or a list of entries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChildrenConfig {
    One(Box<ChildConfig>),
    Many(Vec<ChildConfig>),
}

/// One `children` entry: a tag-string reference to an already-registered
/// node, or a nested declaration.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChildConfig {
    Ref(String),
    Node(Box<NodeConfig>),
}

impl NodeConfig {
    /// Resolve operator names through `registry` and produce the builder
    /// form of this declaration, children included.
    pub fn bind(&self, registry: &OperatorRegistry) -> Result<NodeSpec, ConfigError> {
        let mut spec = NodeSpec::new()
            .forward(self.forward)
            .backward(self.backward)
            .frame(self.frame);

        if let Some(tag) = &self.tag {
            spec = spec.tag(tag.clone());
        }
        if let Some(name) = &self.operator {
            let operator = registry
                .get(name)
                .ok_or_else(|| ConfigError::UnknownOperator {
                    node: self.label(),
                    operator: name.clone(),
                })?;
            spec = spec.operator(operator);
        }
        if let Some(n) = self.repeat {
            spec = spec.repeat(n);
        }
        if let Some(n) = self.recursive {
            spec = spec.recursive(n);
        }
        if let Some(millis) = self.delay {
            spec = spec.delay_ms(millis);
        }
        for (key, value) in &self.props {
            spec = spec.prop(key.clone(), value.clone());
        }

        match &self.children {
            None => {}
            Some(ChildrenConfig::One(child)) => {
                spec = bind_child(spec, child, registry)?;
            }
            Some(ChildrenConfig::Many(children)) => {
                for child in children {
                    spec = bind_child(spec, child, registry)?;
                }
            }
        }

        Ok(spec)
    }

    fn label(&self) -> String {
        self.tag.clone().unwrap_or_else(|| "<untagged>".to_string())
    }
}

fn bind_child(
    spec: NodeSpec,
    child: &ChildConfig,
    registry: &OperatorRegistry,
) -> Result<NodeSpec, ConfigError> {
    Ok(match child {
        ChildConfig::Ref(tag) => spec.child_ref(tag.clone()),
        ChildConfig::Node(node) => spec.child(node.bind(registry)?),
    })
}

/// Load a graph description from a YAML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<GraphConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GraphConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Assemble a graph from a loaded description: bind every declaration
/// against `registry`, then register the roots in order.
///
/// `frame`-flagged nodes need a clock supplied at graph construction, which
/// a file cannot carry; hosts that want one assemble through
/// [`Graph::builder`] and bind declarations themselves.
pub fn build_graph(config: &GraphConfig, registry: &OperatorRegistry) -> Result<Graph, ConfigError> {
    let graph = Graph::builder().options(config.options).build();
    for node in &config.nodes {
        let spec = node.bind(registry)?;
        graph.add_node(spec)?;
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_description() {
        let yaml = r#"
nodes:
  - tag: source
    operator: increment
    children:
      - tag: left
        operator: double
      - tag: right
        backward: true
"#;
        let config: GraphConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.nodes.len(), 1);

        let source = &config.nodes[0];
        assert_eq!(source.tag.as_deref(), Some("source"));
        assert_eq!(source.operator.as_deref(), Some("increment"));
        assert!(source.forward && !source.backward);

        let Some(ChildrenConfig::Many(children)) = &source.children else {
            panic!("expected a children list");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[1], ChildConfig::Node(node) if node.backward));
    }

    #[test]
    fn test_parse_single_child_and_reference_forms() {
        let yaml = r#"
nodes:
  - tag: a
    children:
      tag: only
  - tag: b
    children: a
"#;
        let config: GraphConfig = serde_yaml::from_str(yaml).unwrap();

        let Some(ChildrenConfig::One(child)) = &config.nodes[0].children else {
            panic!("expected the single-child form");
        };
        assert!(matches!(child.as_ref(), ChildConfig::Node(node) if node.tag.as_deref() == Some("only")));

        let Some(ChildrenConfig::One(reference)) = &config.nodes[1].children else {
            panic!("expected the single-child form");
        };
        assert!(matches!(reference.as_ref(), ChildConfig::Ref(tag) if tag == "a"));
    }

    #[test]
    fn test_unknown_keys_flatten_into_props() {
        let yaml = r#"
nodes:
  - tag: open
    weight: 0.5
    label: "display me"
    repeat: 2
"#;
        let config: GraphConfig = serde_yaml::from_str(yaml).unwrap();
        let node = &config.nodes[0];
        assert_eq!(node.repeat, Some(2));
        assert_eq!(node.props.get("weight"), Some(&json!(0.5)));
        assert_eq!(node.props.get("label"), Some(&json!("display me")));
        assert!(node.props.get("tag").is_none());
    }

    #[test]
    fn test_options_default_when_absent() {
        let config: GraphConfig = serde_yaml::from_str("nodes: []").unwrap();
        assert!(!config.options.strict_tags);
        assert_eq!(config.options.max_depth, 256);

        let config: GraphConfig =
            serde_yaml::from_str("options:\n  strict_tags: true\nnodes: []").unwrap();
        assert!(config.options.strict_tags);
    }

    #[test]
    fn test_bind_unknown_operator() {
        let yaml = r#"
nodes:
  - tag: source
    operator: vanish
"#;
        let config: GraphConfig = serde_yaml::from_str(yaml).unwrap();
        let registry = OperatorRegistry::new();
        let err = config.nodes[0].bind(&registry).unwrap_err();
        match err {
            ConfigError::UnknownOperator { node, operator } => {
                assert_eq!(node, "source");
                assert_eq!(operator, "vanish");
            }
            other => panic!("expected UnknownOperator, got {:?}", other),
        }
    }

    #[test]
    fn test_build_graph_registers_all_tags() {
        let yaml = r#"
nodes:
  - tag: source
    children:
      - tag: sink
  - tag: extra
    children: sink
"#;
        let config: GraphConfig = serde_yaml::from_str(yaml).unwrap();
        let registry = OperatorRegistry::new();
        let graph = build_graph(&config, &registry).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert!(graph.contains_tag("source"));
        assert!(graph.contains_tag("sink"));
        // The second root shares the first root's child by reference.
        let shared = graph.get_node("sink").unwrap();
        let extra = graph.get_node("extra").unwrap();
        assert!(std::sync::Arc::ptr_eq(&extra.children()[0], &shared));
    }

    #[test]
    fn test_build_graph_carries_options() {
        let yaml = r#"
options:
  strict_tags: true
nodes:
  - tag: twin
  - tag: twin
"#;
        let config: GraphConfig = serde_yaml::from_str(yaml).unwrap();
        let registry = OperatorRegistry::new();
        let err = build_graph(&config, &registry).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Build(crate::errors::BuildError::DuplicateTag { tag }) if tag == "twin"
        ));
    }

    #[test]
    fn test_load_config_round_trip() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"nodes:\n  - tag: disk\n    repeat: 3\n")
            .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.nodes[0].tag.as_deref(), Some("disk"));
        assert_eq!(config.nodes[0].repeat, Some(3));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_load_config_malformed_yaml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"nodes: [unclosed").unwrap();
        let err = load_config(temp_file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

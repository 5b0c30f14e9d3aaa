use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::{Identity, Operator};

/// Resolves operator names in graph descriptions into runtime instances.
///
/// Descriptions on disk carry operator *names*; the host registers the
/// matching implementations here before binding a config. A fresh registry
/// knows `identity`, so pure wiring nodes bind without any registration.
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<dyn Operator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        let mut operators: HashMap<String, Arc<dyn Operator>> = HashMap::new();
        operators.insert("identity".to_string(), Arc::new(Identity));
        Self { operators }
    }

    /// Register `operator` under `name`, replacing any previous mapping.
    pub fn register(&mut self, name: impl Into<String>, operator: Arc<dyn Operator>) -> &mut Self {
        self.operators.insert(name.into(), operator);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.operators.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// Registered names, sorted for stable display.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operators.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.names())
            .finish()
    }
}

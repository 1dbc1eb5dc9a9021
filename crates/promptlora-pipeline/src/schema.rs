//! Node contract as seen by the host graph engine

use serde::Serialize;
use std::collections::BTreeMap;

/// Class name the node registers under
pub const NODE_CLASS: &str = "PromptLora";
/// Name shown in the host's node menu
pub const NODE_DISPLAY_NAME: &str = "Prompt Lora";
/// Entry point the host invokes
pub const NODE_FUNCTION: &str = "apply";

/// Value types flowing along graph edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueKind {
    Model,
    Clip,
    String,
    Conditioning,
}

/// A declared node input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSpec {
    pub name: &'static str,
    pub kind: ValueKind,
    pub required: bool,
    /// Render as a multi-line text box (strings only)
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub multiline: bool,
}

/// A declared node output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSpec {
    pub name: &'static str,
    pub kind: ValueKind,
}

/// Full description of a node type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSchema {
    pub class_name: &'static str,
    pub display_name: &'static str,
    pub category: String,
    pub function: &'static str,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
}

impl NodeSchema {
    /// Schema of the PromptLora node
    pub fn prompt_lora(category: impl Into<String>) -> Self {
        let required = |name, kind, multiline| InputSpec {
            name,
            kind,
            required: true,
            multiline,
        };

        Self {
            class_name: NODE_CLASS,
            display_name: NODE_DISPLAY_NAME,
            category: category.into(),
            function: NODE_FUNCTION,
            inputs: vec![
                required("model", ValueKind::Model, false),
                required("clip", ValueKind::Clip, false),
                required("positive", ValueKind::String, true),
                required("negative", ValueKind::String, true),
            ],
            outputs: vec![
                OutputSpec {
                    name: "model",
                    kind: ValueKind::Model,
                },
                OutputSpec {
                    name: "clip",
                    kind: ValueKind::Clip,
                },
                OutputSpec {
                    name: "positive",
                    kind: ValueKind::Conditioning,
                },
                OutputSpec {
                    name: "negative",
                    kind: ValueKind::Conditioning,
                },
            ],
        }
    }

    /// Output types in order
    pub fn return_types(&self) -> Vec<ValueKind> {
        self.outputs.iter().map(|o| o.kind).collect()
    }

    /// Output names in order
    pub fn return_names(&self) -> Vec<&'static str> {
        self.outputs.iter().map(|o| o.name).collect()
    }

    /// Serialize for the host
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Node types exported by this plugin
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: BTreeMap<&'static str, NodeSchema>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    /// Registry holding the PromptLora node under `category`
    pub fn with_prompt_lora(category: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.register(NodeSchema::prompt_lora(category));
        registry
    }

    /// Register a node schema
    pub fn register(&mut self, schema: NodeSchema) {
        self.nodes.insert(schema.class_name, schema);
    }

    /// Get a node schema by class name
    pub fn get(&self, class_name: &str) -> Option<&NodeSchema> {
        self.nodes.get(class_name)
    }

    /// Class name → display name
    pub fn display_names(&self) -> BTreeMap<&'static str, &'static str> {
        self.nodes
            .values()
            .map(|s| (s.class_name, s.display_name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_prompt_lora(crate::node::NodeConfig::default().category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lora_contract() {
        let schema = NodeSchema::prompt_lora("loaders");

        let inputs: Vec<&str> = schema.inputs.iter().map(|i| i.name).collect();
        assert_eq!(inputs, vec!["model", "clip", "positive", "negative"]);
        assert!(schema.inputs.iter().all(|i| i.required));

        assert_eq!(
            schema.return_types(),
            vec![
                ValueKind::Model,
                ValueKind::Clip,
                ValueKind::Conditioning,
                ValueKind::Conditioning
            ]
        );
        assert_eq!(
            schema.return_names(),
            vec!["model", "clip", "positive", "negative"]
        );
        assert_eq!(schema.function, "apply");
    }

    #[test]
    fn test_schema_json() {
        let json: serde_json::Value =
            serde_json::from_str(&NodeSchema::prompt_lora("loaders").to_json().unwrap()).unwrap();

        assert_eq!(json["inputs"][0]["kind"], "MODEL");
        assert!(json["inputs"][0].get("multiline").is_none());
        assert_eq!(json["inputs"][2]["multiline"], true);
        assert_eq!(json["outputs"][3]["kind"], "CONDITIONING");
    }

    #[test]
    fn test_registry() {
        let registry = NodeRegistry::default();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.display_names()["PromptLora"], "Prompt Lora");
        assert_eq!(registry.get("PromptLora").unwrap().category, "loaders");
        assert!(registry.get("Other").is_none());
    }
}

//! Node contract output

use promptlora_pipeline::{NodeConfig, NodeRegistry};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let registry = NodeRegistry::with_prompt_lora(NodeConfig::default().category);

    for (class_name, display_name) in registry.display_names() {
        if let Some(schema) = registry.get(class_name) {
            println!("// {} ({})", display_name, class_name);
            println!("{}", schema.to_json()?);
        }
    }

    Ok(())
}

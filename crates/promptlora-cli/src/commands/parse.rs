//! Directive inspection

use promptlora_core::{DirectiveOutcome, MalformedReason, scan_directives};

pub fn run(prompt: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let outcomes = scan_directives(prompt);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    if outcomes.is_empty() {
        println!("No LoRA directives found.");
        return Ok(());
    }

    println!("Found {} directive(s):", outcomes.len());
    for outcome in &outcomes {
        match outcome {
            DirectiveOutcome::Parsed(d) => {
                println!(
                    "  ✓ {:<24} weight={:<6} clip={:<6} {}",
                    d.name, d.weight, d.clip_weight, d.matched_text
                );
            }
            DirectiveOutcome::Malformed(m) => {
                let reason = match &m.reason {
                    MalformedReason::TooFewFields { found } => {
                        format!("expected at least 3 fields, found {}", found)
                    }
                    MalformedReason::InvalidWeight { value, .. } => {
                        format!("invalid weight '{}'", value)
                    }
                };
                println!("  ✗ {} ({})", m.matched_text, reason);
            }
        }
    }

    Ok(())
}

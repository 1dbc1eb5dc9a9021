//! Prompt directive parsing
//!
//! Directives are bracketed spans embedded in free-form prompt text:
//!
//! ```text
//! <lora:NAME:WEIGHT[:CLIP_WEIGHT]>
//! ```
//!
//! Every `<...>` span whose content starts with `lora` is a candidate.
//! Candidates become an [`AdapterDirective`] when the weight parses, and a
//! [`MalformedDirective`] otherwise. Other spans are left alone.
//!
//! Parsing never edits the prompt; callers remove a directive's
//! `matched_text` once they have acted on it (see [`strip_directive`]).

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{debug, error};

/// Any bracketed span; the capture is the span's content
static SPAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]+)>").expect("Invalid directive regex"));

/// Prefix that marks a span as a LoRA directive
pub const DIRECTIVE_TAG: &str = "lora";

/// Clip weight used when the directive does not give one
pub const DEFAULT_CLIP_WEIGHT: f32 = 1.0;

/// A parsed LoRA directive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterDirective {
    /// Adapter identifier, trimmed
    pub name: String,
    /// Strength applied to the model
    pub weight: f32,
    /// Strength applied to the text encoder
    pub clip_weight: f32,
    /// The full span as it appears in the prompt, brackets included
    pub matched_text: String,
}

/// Why a `lora` span did not produce a directive
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MalformedReason {
    /// Fewer than three `:`-separated fields
    TooFewFields { found: usize },
    /// The weight field is not a number
    InvalidWeight { name: String, value: String },
}

/// A `lora` span that could not be turned into a directive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedDirective {
    pub matched_text: String,
    pub reason: MalformedReason,
}

/// Result of examining one `lora` span
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DirectiveOutcome {
    Parsed(AdapterDirective),
    Malformed(MalformedDirective),
}

impl DirectiveOutcome {
    /// The directive, if parsing succeeded
    pub fn directive(&self) -> Option<&AdapterDirective> {
        match self {
            Self::Parsed(d) => Some(d),
            Self::Malformed(_) => None,
        }
    }

    pub fn into_directive(self) -> Option<AdapterDirective> {
        match self {
            Self::Parsed(d) => Some(d),
            Self::Malformed(_) => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// The span text, brackets included
    pub fn matched_text(&self) -> &str {
        match self {
            Self::Parsed(d) => &d.matched_text,
            Self::Malformed(m) => &m.matched_text,
        }
    }
}

/// Examine every `lora` span in `prompt`, left to right
pub fn scan_directives(prompt: &str) -> Vec<DirectiveOutcome> {
    SPAN_REGEX
        .captures_iter(prompt)
        .filter_map(|caps| caps.get(1))
        .filter_map(|content| parse_span(content.as_str()))
        .collect()
}

/// Parse the directives in `prompt`, dropping malformed ones
pub fn parse_directives(prompt: &str) -> Vec<AdapterDirective> {
    scan_directives(prompt)
        .into_iter()
        .filter_map(DirectiveOutcome::into_directive)
        .collect()
}

/// Remove the first occurrence of the directive's text from `prompt`
pub fn strip_directive(prompt: &str, directive: &AdapterDirective) -> String {
    prompt.replacen(&directive.matched_text, "", 1)
}

fn parse_span(content: &str) -> Option<DirectiveOutcome> {
    if !content.starts_with(DIRECTIVE_TAG) {
        return None;
    }

    let matched_text = format!("<{}>", content);
    let fields: Vec<&str> = content.split(':').collect();

    if fields.len() < 3 {
        return Some(DirectiveOutcome::Malformed(MalformedDirective {
            matched_text,
            reason: MalformedReason::TooFewFields {
                found: fields.len(),
            },
        }));
    }

    let name = fields[1].trim().to_string();
    let weight_field = fields[2].trim();

    let weight = match weight_field.parse::<f32>() {
        Ok(w) => w,
        Err(_) => {
            error!(name = %name, value = weight_field, "invalid weight for {}", name);
            return Some(DirectiveOutcome::Malformed(MalformedDirective {
                matched_text,
                reason: MalformedReason::InvalidWeight {
                    name,
                    value: weight_field.to_string(),
                },
            }));
        }
    };

    let clip_weight = match fields.get(3).map(|f| f.trim().parse::<f32>()) {
        Some(Ok(w)) => w,
        _ => {
            debug!(name = %name, "no clip weight found for {}", name);
            DEFAULT_CLIP_WEIGHT
        }
    };

    Some(DirectiveOutcome::Parsed(AdapterDirective {
        name,
        weight,
        clip_weight,
        matched_text,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_directive() {
        let directives = parse_directives("<lora:foo:0.8:0.5> a cat");

        assert_eq!(
            directives,
            vec![AdapterDirective {
                name: "foo".to_string(),
                weight: 0.8,
                clip_weight: 0.5,
                matched_text: "<lora:foo:0.8:0.5>".to_string(),
            }]
        );
    }

    #[test]
    fn test_clip_weight_defaults() {
        let directives = parse_directives("<lora:foo:0.7> <lora:bar:1.2:oops>");

        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0].clip_weight, DEFAULT_CLIP_WEIGHT);
        assert_eq!(directives[1].weight, 1.2);
        assert_eq!(directives[1].clip_weight, DEFAULT_CLIP_WEIGHT);
    }

    #[test]
    fn test_no_spans() {
        assert!(parse_directives("a photo of a cat, highly detailed").is_empty());
        assert!(scan_directives("").is_empty());
    }

    #[test]
    fn test_invalid_weight_is_malformed() {
        let outcomes = scan_directives("<lora:foo:bad>");

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_malformed());
        assert_eq!(
            outcomes[0],
            DirectiveOutcome::Malformed(MalformedDirective {
                matched_text: "<lora:foo:bad>".to_string(),
                reason: MalformedReason::InvalidWeight {
                    name: "foo".to_string(),
                    value: "bad".to_string(),
                },
            })
        );
        assert!(parse_directives("<lora:foo:bad>").is_empty());
    }

    #[test]
    fn test_too_few_fields() {
        let outcomes = scan_directives("<lora:foo> <lora>");

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            &outcomes[0],
            DirectiveOutcome::Malformed(MalformedDirective {
                reason: MalformedReason::TooFewFields { found: 2 },
                ..
            })
        ));
        assert!(matches!(
            &outcomes[1],
            DirectiveOutcome::Malformed(MalformedDirective {
                reason: MalformedReason::TooFewFields { found: 1 },
                ..
            })
        ));
    }

    #[test]
    fn test_other_tags_ignored() {
        assert!(scan_directives("<other:x:1> <embedding:foo:1.0>").is_empty());
    }

    #[test]
    fn test_tag_is_a_prefix_match() {
        let directives = parse_directives("<loras:foo:0.5>");
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].name, "foo");
    }

    #[test]
    fn test_order_and_duplicates_preserved() {
        let names: Vec<String> = parse_directives("<lora:a:1> <lora:b:1> <lora:a:0.5>")
            .into_iter()
            .map(|d| d.name)
            .collect();

        assert_eq!(names, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_fields_are_trimmed() {
        let directives = parse_directives("<lora: foo : 0.25 : 0.75 >");

        assert_eq!(directives[0].name, "foo");
        assert_eq!(directives[0].weight, 0.25);
        assert_eq!(directives[0].clip_weight, 0.75);
        assert_eq!(directives[0].matched_text, "<lora: foo : 0.25 : 0.75 >");
    }

    #[test]
    fn test_strip_first_occurrence() {
        let prompt = "<lora:a:1> x <lora:a:1>";
        let directive = parse_directives(prompt).remove(0);

        assert_eq!(strip_directive(prompt, &directive), " x <lora:a:1>");
    }

    #[test]
    fn test_outcome_serializes() {
        let outcomes = scan_directives("<lora:foo:bad>");
        let json = serde_json::to_value(&outcomes).unwrap();

        assert_eq!(json[0]["outcome"], "malformed");
        assert_eq!(json[0]["reason"]["kind"], "invalid_weight");
    }
}

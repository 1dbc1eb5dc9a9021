//! Text encoding into conditioning

use crate::tensor::{Tensor, TensorError};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Encoding errors
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Encoding failed: {0}")]
    Failed(String),

    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),
}

/// Token ids produced by a text encoder's tokenizer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Tokens {
    pub ids: Vec<u32>,
}

impl Tokens {
    pub fn new(ids: Vec<u32>) -> Self {
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Auxiliary encoder outputs carried next to the embedding
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EncoderExtras {
    /// Pooled embedding, used by models with a global text vector
    pub pooled_output: Option<Tensor>,
    /// Any further named outputs
    pub extra: BTreeMap<String, Tensor>,
}

/// Raw output of a text encoder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncoderOutput {
    /// Per-token embedding, `[batch, tokens, dim]`
    pub cond: Tensor,
    pub extras: EncoderExtras,
}

/// Text encoder (tokenizer + encoder), such as a CLIP model
pub trait TextEncoder {
    /// Split text into token ids
    fn tokenize(&self, text: &str) -> Tokens;

    /// Run the encoder over tokens
    fn encode_from_tokens(&self, tokens: &Tokens) -> Result<EncoderOutput, EncodeError>;
}

/// One embedding with its auxiliary outputs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditioningPart {
    pub cond: Tensor,
    pub extras: EncoderExtras,
}

/// Conditioning as consumed by samplers: a list of embedding parts
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Conditioning(Vec<ConditioningPart>);

impl Conditioning {
    pub fn new(parts: Vec<ConditioningPart>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[ConditioningPart] {
        &self.0
    }

    pub fn first(&self) -> Option<&ConditioningPart> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_parts(self) -> Vec<ConditioningPart> {
        self.0
    }
}

/// Tokenize and encode `text`, wrapping the result as single-part conditioning
pub fn prompt_encode<E: TextEncoder + ?Sized>(
    clip: &E,
    text: &str,
) -> Result<Conditioning, EncodeError> {
    let tokens = clip.tokenize(text);
    let output = clip.encode_from_tokens(&tokens)?;

    Ok(Conditioning::new(vec![ConditioningPart {
        cond: output.cond,
        extras: output.extras,
    }]))
}

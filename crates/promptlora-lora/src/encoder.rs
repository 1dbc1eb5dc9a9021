//! Deterministic weight-backed text encoder
//!
//! Hashes words to token ids and token ids to embedding vectors, then runs
//! them through an optional `text_projection.weight` matrix. Because the
//! projection is an ordinary weight, LoRA adapters targeting
//! `lora_te_text_projection` visibly change the conditioning.

use promptlora_core::{
    EncodeError, EncoderExtras, EncoderOutput, Tensor, TextEncoder, Tokens, WeightMap,
};

/// Maximum sequence length, start and end tokens included
pub const MAX_TOKENS: usize = 77;
/// Vocabulary size; the two highest ids are start/end markers
pub const VOCAB_SIZE: u32 = 49408;
pub const START_TOKEN: u32 = VOCAB_SIZE - 2;
pub const END_TOKEN: u32 = VOCAB_SIZE - 1;

/// Weight key of the output projection
pub const PROJECTION_KEY: &str = "text_projection.weight";

/// Text encoder backed by a weight map
#[derive(Debug, Clone, PartialEq)]
pub struct WeightClip {
    /// Patchable weights
    pub weights: WeightMap,
    embedding_dim: usize,
}

impl WeightClip {
    /// Create an encoder with no weights (identity projection)
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            weights: WeightMap::new(),
            embedding_dim,
        }
    }

    /// Replace the weight map
    pub fn with_weights(mut self, weights: WeightMap) -> Self {
        self.weights = weights;
        self
    }

    /// Build from weights, taking the dimension from the projection matrix
    pub fn from_weights(weights: WeightMap, default_dim: usize) -> Self {
        let embedding_dim = weights
            .get(PROJECTION_KEY)
            .and_then(Tensor::as_matrix)
            .map(|(_, cols)| cols)
            .unwrap_or(default_dim);

        Self {
            weights,
            embedding_dim,
        }
    }

    /// Get embedding dimension
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Hash-based unit vector for a token id
    fn token_embedding(&self, id: u32) -> Vec<f32> {
        let mut embedding = vec![0.0; self.embedding_dim];

        // xorshift seeded by the id
        let mut state = (u64::from(id) + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        for x in &mut embedding {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            *x = ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0;
        }

        // Normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        embedding
    }

    /// `projection @ v` when a projection weight is present
    fn project(&self, v: Vec<f32>) -> Result<Vec<f32>, EncodeError> {
        let Some(projection) = self.weights.get(PROJECTION_KEY) else {
            return Ok(v);
        };

        let (rows, cols) = projection
            .as_matrix()
            .ok_or_else(|| EncodeError::Failed("projection is not a matrix".to_string()))?;
        if cols != v.len() {
            return Err(EncodeError::Failed(format!(
                "projection expects {} inputs, embedding has {}",
                cols,
                v.len()
            )));
        }

        let w = projection.data();
        Ok((0..rows)
            .map(|r| w[r * cols..(r + 1) * cols].iter().zip(&v).map(|(a, b)| a * b).sum())
            .collect())
    }
}

impl Default for WeightClip {
    fn default() -> Self {
        Self::new(768)
    }
}

impl TextEncoder for WeightClip {
    fn tokenize(&self, text: &str) -> Tokens {
        let mut ids = vec![START_TOKEN];

        ids.extend(
            text.split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .take(MAX_TOKENS - 2)
                .map(|word| {
                    let hash = blake3::hash(word.to_lowercase().as_bytes());
                    let bytes = hash.as_bytes();
                    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) % START_TOKEN
                }),
        );

        ids.push(END_TOKEN);
        Tokens::new(ids)
    }

    fn encode_from_tokens(&self, tokens: &Tokens) -> Result<EncoderOutput, EncodeError> {
        let mut rows = Vec::with_capacity(tokens.len());
        for &id in &tokens.ids {
            rows.push(self.project(self.token_embedding(id))?);
        }

        let dim = rows.first().map(Vec::len).unwrap_or(self.embedding_dim);
        let hidden = Tensor::new(vec![rows.len(), dim], rows.concat())?;
        // Pooled output is the token mean
        let pooled = hidden.mean_rows();

        let cond = Tensor::new(vec![1, rows.len(), dim], hidden.into_data())?;

        Ok(EncoderOutput {
            cond,
            extras: EncoderExtras {
                pooled_output: pooled,
                ..Default::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptlora_core::prompt_encode;

    #[test]
    fn test_tokenize_wraps_and_truncates() {
        let clip = WeightClip::new(8);

        let tokens = clip.tokenize("A cat, a CAT!");
        assert_eq!(tokens.ids.first(), Some(&START_TOKEN));
        assert_eq!(tokens.ids.last(), Some(&END_TOKEN));
        assert_eq!(tokens.len(), 6);
        // Case-insensitive
        assert_eq!(tokens.ids[1], tokens.ids[3]);
        assert_eq!(tokens.ids[2], tokens.ids[4]);

        let long = "word ".repeat(200);
        assert_eq!(clip.tokenize(&long).len(), MAX_TOKENS);
    }

    #[test]
    fn test_encode_shapes() {
        let clip = WeightClip::new(16);
        let conditioning = prompt_encode(&clip, "red fighter ship").unwrap();

        let part = conditioning.first().unwrap();
        assert_eq!(part.cond.shape(), &[1, 5, 16]);
        assert_eq!(part.extras.pooled_output.as_ref().unwrap().shape(), &[1, 16]);
    }

    #[test]
    fn test_pooled_output_is_token_mean() {
        let clip = WeightClip::new(4);
        let conditioning = prompt_encode(&clip, "red fighter ship").unwrap();

        let part = conditioning.first().unwrap();
        let pooled = part.extras.pooled_output.as_ref().unwrap();
        let tokens = part.cond.shape()[1];

        for col in 0..4 {
            let mean = part.cond.data()[col..]
                .iter()
                .step_by(4)
                .sum::<f32>()
                / tokens as f32;
            assert!((pooled.data()[col] - mean).abs() < 1e-5);
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let clip = WeightClip::new(16);
        let a = prompt_encode(&clip, "blue bomber").unwrap();
        let b = prompt_encode(&clip, "blue bomber").unwrap();
        let c = prompt_encode(&clip, "red fighter").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_projection_changes_output() {
        let plain = WeightClip::new(2);

        let mut weights = WeightMap::new();
        weights.insert(
            PROJECTION_KEY.to_string(),
            Tensor::new(vec![2, 2], vec![2.0, 0.0, 0.0, 2.0]).unwrap(),
        );
        let scaled = WeightClip::from_weights(weights, 8);
        assert_eq!(scaled.embedding_dim(), 2);

        let a = prompt_encode(&plain, "cat").unwrap();
        let b = prompt_encode(&scaled, "cat").unwrap();

        for (x, y) in a.first().unwrap().cond.data().iter().zip(b.first().unwrap().cond.data()) {
            assert!((2.0 * x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_projection_dimension_mismatch() {
        let mut weights = WeightMap::new();
        weights.insert(PROJECTION_KEY.to_string(), Tensor::zeros(vec![2, 3]));
        let clip = WeightClip::new(2).with_weights(weights);

        assert!(prompt_encode(&clip, "cat").is_err());
    }
}

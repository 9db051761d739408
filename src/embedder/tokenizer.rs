/// WordPiece tokenization for the bge encoder, padded into one
/// rectangular batch per inference call.
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Position-embedding limit of BERT-base style encoders.
const MAX_SEQUENCE_TOKENS: usize = 512;

pub struct BertTokenizer {
    inner: Tokenizer,
}

/// Row-major `[batch, seq_len]` model inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub batch: usize,
    pub seq_len: usize,
}

impl EncodedBatch {
    /// All-zero segment ids of the same shape.
    #[must_use]
    pub fn token_type_ids(&self) -> Vec<i64> {
        vec![0; self.batch * self.seq_len]
    }

    fn from_rows(rows: Vec<(Vec<i64>, Vec<i64>)>) -> Result<Self> {
        let batch = rows.len();
        let seq_len = rows.first().map(|(ids, _)| ids.len()).unwrap_or(0);
        let mut input_ids = Vec::with_capacity(batch * seq_len);
        let mut attention_mask = Vec::with_capacity(batch * seq_len);
        for (i, (ids, mask)) in rows.into_iter().enumerate() {
            anyhow::ensure!(
                ids.len() == seq_len && mask.len() == seq_len,
                "row {i} has {} tokens, expected {seq_len}",
                ids.len()
            );
            input_ids.extend(ids);
            attention_mask.extend(mask);
        }
        Ok(Self {
            input_ids,
            attention_mask,
            batch,
            seq_len,
        })
    }
}

impl BertTokenizer {
    /// Load `tokenizer.json` from the model directory, truncating to the
    /// encoder limit and padding each batch to its longest row.
    pub fn from_model_dir(model_dir: &Path) -> Result<Self> {
        let path = model_dir.join("tokenizer.json");
        anyhow::ensure!(path.exists(), "tokenizer.json not found in {}", model_dir.display());

        let mut inner = Tokenizer::from_file(&path)
            .map_err(|e| anyhow!("failed to load {}: {e}", path.display()))?;
        inner
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("failed to configure truncation: {e}"))?;
        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self { inner })
    }

    pub fn encode_batch(&self, texts: &[&str]) -> Result<EncodedBatch> {
        let encodings = self
            .inner
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("failed to encode batch: {e}"))?;

        let rows = encodings
            .iter()
            .map(|enc| {
                let ids = enc.get_ids().iter().map(|&id| i64::from(id)).collect();
                let mask = enc.get_attention_mask().iter().map(|&m| i64::from(m)).collect();
                (ids, mask)
            })
            .collect();
        EncodedBatch::from_rows(rows).context("tokenizer produced ragged batch")
    }

    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(false)
    }
}

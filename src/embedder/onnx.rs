/// bge-small-en-v1.5 sentence embeddings on ONNX Runtime.
///
/// A batch is tokenized into one padded tensor and run in a single session
/// call; the `[CLS]` hidden state of each row is L2-normalized.
use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::tokenizer::BertTokenizer;
use super::{Embedder, EmbedderError};

/// Hidden size of bge-small-en-v1.5.
pub const BGE_SMALL_DIMENSIONS: usize = 384;

/// Rows per session call; indexing a large PDF is split into several runs.
const MAX_BATCH_ROWS: usize = 32;

const SESSION_THREADS: usize = 4;

pub struct OnnxEmbedder {
    session: Mutex<Session>,
    tokenizer: BertTokenizer,
    dimensions: usize,
}

fn load_err<E: std::fmt::Display>(stage: &str) -> impl FnOnce(E) -> EmbedderError + '_ {
    move |e| EmbedderError::ModelLoadFailed(format!("{stage}: {e}"))
}

fn infer_err<E: std::fmt::Display>(stage: &str) -> impl FnOnce(E) -> EmbedderError + '_ {
    move |e| EmbedderError::InferenceFailed(format!("{stage}: {e}"))
}

impl OnnxEmbedder {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`.
    pub fn new(model_dir: &Path) -> Result<Self, EmbedderError> {
        let model_path = model_dir.join("model.onnx");
        if !model_path.exists() {
            return Err(EmbedderError::ModelLoadFailed(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }

        let session = Session::builder()
            .map_err(load_err("session builder"))?
            .with_intra_threads(SESSION_THREADS)
            .map_err(load_err("thread config"))?
            .commit_from_file(&model_path)
            .map_err(load_err("model load"))?;

        let tokenizer = BertTokenizer::from_model_dir(model_dir)
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("tokenizer: {e}")))?;

        info!(
            model = %model_path.display(),
            vocab = tokenizer.vocab_size(),
            "Embedding model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions: BGE_SMALL_DIMENSIONS,
        })
    }

    fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let encoded = self
            .tokenizer
            .encode_batch(texts)
            .map_err(|e| EmbedderError::TokenizerError(e.to_string()))?;
        let shape = [encoded.batch, encoded.seq_len];
        debug!(rows = encoded.batch, seq_len = encoded.seq_len, "Running embedding batch");

        let token_type_ids = encoded.token_type_ids();
        let input_ids = Tensor::from_array((shape, encoded.input_ids)).map_err(infer_err("input_ids"))?;
        let attention_mask =
            Tensor::from_array((shape, encoded.attention_mask)).map_err(infer_err("attention_mask"))?;
        let token_type_ids =
            Tensor::from_array((shape, token_type_ids)).map_err(infer_err("token_type_ids"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedderError::InferenceFailed(format!("session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])
            .map_err(infer_err("inference"))?;

        // last_hidden_state: [batch, seq_len, hidden]
        let (_shape, hidden) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(infer_err("output extraction"))?;

        cls_rows(hidden, encoded.batch, encoded.seq_len, self.dimensions)
            .map(|rows| rows.into_iter().map(l2_normalize).collect())
            .ok_or_else(|| {
                EmbedderError::InferenceFailed(format!(
                    "model output has {} values, expected {} x {} x {}",
                    hidden.len(),
                    encoded.batch,
                    encoded.seq_len,
                    self.dimensions
                ))
            })
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        self.run_batch(&[text])?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty model output".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for group in texts.chunks(MAX_BATCH_ROWS) {
            vectors.extend(self.run_batch(group)?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// First-token hidden state of every row in a flat `[batch, seq_len, hidden]`
/// buffer, or `None` when the buffer is too short for that shape.
fn cls_rows(hidden: &[f32], batch: usize, seq_len: usize, hidden_size: usize) -> Option<Vec<&[f32]>> {
    if hidden.len() < batch * seq_len * hidden_size {
        return None;
    }
    let stride = seq_len * hidden_size;
    Some(
        (0..batch)
            .map(|row| &hidden[row * stride..row * stride + hidden_size])
            .collect(),
    )
}

fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vec.to_vec();
    }
    vec.iter().map(|v| v / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let normed = l2_normalize(&[3.0, 4.0]);
        assert!((normed[0] - 0.6).abs() < 1e-6);
        assert!((normed[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_cls_rows_picks_first_token_per_row() {
        // batch=2, seq_len=2, hidden=2
        let hidden = [1.0, 2.0, 9.0, 9.0, 3.0, 4.0, 9.0, 9.0];
        let rows = cls_rows(&hidden, 2, 2, 2).unwrap();
        assert_eq!(rows, vec![&[1.0, 2.0][..], &[3.0, 4.0][..]]);
    }

    #[test]
    fn test_cls_rows_short_buffer() {
        assert!(cls_rows(&[1.0, 2.0, 3.0], 2, 1, 2).is_none());
    }

    #[test]
    #[ignore = "needs downloaded model files"]
    fn test_batch_matches_single_embeddings() {
        let embedder = OnnxEmbedder::new(Path::new("models/bge-small-en-v1.5")).unwrap();
        let single = embedder.embed("revenue grew in 2023").unwrap();
        let batch = embedder
            .embed_batch(&["a much longer sentence that forces padding", "revenue grew in 2023"])
            .unwrap();
        assert_eq!(single.len(), BGE_SMALL_DIMENSIONS);
        let dot: f32 = single.iter().zip(&batch[1]).map(|(a, b)| a * b).sum();
        assert!(dot > 0.999, "padded row drifted: {dot}");
    }
}

use crate::core::CancelFlag;
use crate::core::dataset::{CleanRecord, LabeledRecord};
use crate::error::{Error, Result};
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{VarBuilder, ops::softmax};
use candle_transformers::models::modernbert::{Config, ModernBertForSequenceClassification};
use hf_hub::{Repo, RepoType, api::sync::Api};
use serde::Deserialize;
use std::collections::HashMap;
use tokenizers::{Tokenizer, TruncationParams};

pub const DEFAULT_BATCH_SIZE: usize = 32;

// Head-truncation bound for over-length comments; the tokenizer drops the
// tail instead of failing.
const MAX_TOKENS: usize = 512;

/// One classifier verdict: the argmax label and its softmax probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

/// Batch text classification capability. The production implementation is
/// [`ModernBertClassifier`]; tests substitute a mock.
pub trait TextClassifier {
    /// Classify a batch of texts, returning exactly one prediction per input
    /// in input order.
    fn predict_batch(&self, texts: &[&str]) -> Result<Vec<Prediction>>;
}

/// The two interchangeable classification tasks. A task fixes the label set,
/// the static numeric-code table, and the default checkpoint; the batching
/// and I/O around it are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Sentiment,
    Emotion,
}

impl Task {
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Task::Sentiment => &["negative", "neutral", "positive"],
            Task::Emotion => &["anger", "disgust", "fear", "joy", "sadness", "surprise"],
        }
    }

    /// Static label-to-code table. Fixed per task so numeric comparisons are
    /// stable across runs and subsets; labels outside the table map to
    /// `None` rather than inventing a code from observed data.
    pub fn numeric_code(self, label: &str) -> Option<i32> {
        let label = label.to_ascii_lowercase();
        match self {
            Task::Sentiment => match label.as_str() {
                "negative" => Some(-1),
                "neutral" => Some(0),
                "positive" => Some(1),
                _ => None,
            },
            Task::Emotion => match label.as_str() {
                "anger" => Some(0),
                "disgust" => Some(1),
                "fear" => Some(2),
                "joy" => Some(3),
                "sadness" => Some(4),
                "surprise" => Some(5),
                _ => None,
            },
        }
    }

    /// Built-in checkpoint, when one exists for the task. Emotion has no
    /// ModernBERT checkpoint with this exact six-label head, so it must be
    /// supplied with `--model`.
    pub fn default_model_id(self) -> Option<&'static str> {
        match self {
            Task::Sentiment => Some("clapAI/modernBERT-base-multilingual-sentiment"),
            Task::Emotion => None,
        }
    }

    /// File-name tag for the labeled dataset of this task.
    pub fn tag(self) -> &'static str {
        match self {
            Task::Sentiment => "sentiment",
            Task::Emotion => "emotion",
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Request for an execution device. Selection changes latency only; outputs
/// are numerically equivalent across devices.
#[derive(Debug, Clone, Copy, Default)]
pub enum DeviceRequest {
    /// CUDA 0 if available, otherwise CPU.
    #[default]
    Default,
    /// Force CPU even if CUDA is available.
    Cpu,
    /// A specific CUDA device by index.
    Cuda(usize),
}

impl DeviceRequest {
    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceRequest::Default => Ok(Device::cuda_if_available(0)?),
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Cuda(index) => Device::new_cuda(index)
                .map_err(|e| Error::model(format!("CUDA device {index} unavailable: {e}"))),
        }
    }
}

/// ModernBERT sequence-classification checkpoint loaded from the Hugging
/// Face hub, with the label names taken from the checkpoint's own
/// `id2label` table.
pub struct ModernBertClassifier {
    model: ModernBertForSequenceClassification,
    tokenizer: Tokenizer,
    id2label: HashMap<String, String>,
    device: Device,
}

#[derive(Deserialize)]
struct ClassifierConfigJson {
    #[serde(default)]
    id2label: HashMap<String, String>,
}

impl ModernBertClassifier {
    /// Download (or reuse from the hub cache) config, tokenizer, and weights,
    /// and build the classifier. Any failure here is fatal to the run.
    pub fn load(model_id: &str, device: Device) -> Result<Self> {
        tracing::info!(model = model_id, device = ?device, "loading classifier");

        let api = Api::new().map_err(|e| Error::model(e.to_string()))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo.get("config.json")?;
        let tokenizer_path = repo.get("tokenizer.json")?;
        let weights_path = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))?;

        let config_str = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_str)
            .map_err(|e| Error::model(format!("incompatible config for {model_id}: {e}")))?;
        let class_cfg: ClassifierConfigJson = serde_json::from_str(&config_str)?;
        if class_cfg.id2label.is_empty() {
            return Err(Error::model(format!(
                "{model_id} has no id2label table; not a classification checkpoint"
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::model(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| Error::model(format!("tokenizer truncation setup: {e}")))?;

        let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? }
        } else {
            VarBuilder::from_pth(&weights_path, DType::F32, &device)?
        };
        let model = ModernBertForSequenceClassification::load(vb, &config)
            .map_err(|e| Error::model(format!("incompatible weights for {model_id}: {e}")))?;

        Ok(Self {
            model,
            tokenizer,
            id2label: class_cfg.id2label,
            device,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Label names from the checkpoint, in id order.
    pub fn labels(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.id2label.iter().collect();
        ids.sort_by_key(|(id, _)| id.parse::<u32>().unwrap_or(u32::MAX));
        ids.into_iter().map(|(_, label)| label.clone()).collect()
    }
}

impl TextClassifier for ModernBertClassifier {
    fn predict_batch(&self, texts: &[&str]) -> Result<Vec<Prediction>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| Error::input(format!("tokenization failed: {e}")))?;

        let pad_token_id = self
            .tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| self.tokenizer.token_to_id("<pad>"))
            .or_else(|| self.tokenizer.token_to_id("[PAD]"))
            .unwrap_or(0);

        // Pad to the longest sequence in the batch; padding positions get a
        // zero attention mask.
        let max_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let mut all_token_ids: Vec<u32> = Vec::with_capacity(texts.len() * max_len);
        let mut all_attention_masks: Vec<u32> = Vec::with_capacity(texts.len() * max_len);

        for encoding in &encodings {
            let mut token_ids = encoding.get_ids().to_vec();
            let mut attention_mask = encoding.get_attention_mask().to_vec();
            token_ids.resize(max_len, pad_token_id);
            attention_mask.resize(max_len, 0);
            all_token_ids.extend(token_ids);
            all_attention_masks.extend(attention_mask);
        }

        let input_ids = Tensor::from_vec(all_token_ids, (texts.len(), max_len), &self.device)?;
        let attention_mask =
            Tensor::from_vec(all_attention_masks, (texts.len(), max_len), &self.device)?;

        let logits = self.model.forward(&input_ids, &attention_mask)?;
        let probs = softmax(&logits, D::Minus1)?;
        let pred_ids = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
        let probs_2d = probs.to_vec2::<f32>()?;

        let mut predictions = Vec::with_capacity(texts.len());
        for (row, pred_id) in probs_2d.iter().zip(pred_ids) {
            let score = row.get(pred_id as usize).copied().unwrap_or(0.0);
            let label = self
                .id2label
                .get(&pred_id.to_string())
                .ok_or_else(|| {
                    Error::data_format(format!("predicted label ID {pred_id} not in id2label"))
                })?
                .clone();
            predictions.push(Prediction { label, score });
        }

        Ok(predictions)
    }
}

/// Run every cleaned record through the classifier in fixed-size consecutive
/// batches, preserving input order, and attach label, score, and the task's
/// static numeric code. Cancellation is honored between batches only.
pub fn label_records<C: TextClassifier>(
    classifier: &C,
    task: Task,
    records: &[CleanRecord],
    batch_size: usize,
    cancel: &CancelFlag,
) -> Result<Vec<LabeledRecord>> {
    let batch_size = batch_size.max(1);

    // The normalizer guarantees non-empty cleaned text; check anyway so a
    // hand-edited dataset cannot reach the model.
    if let Some(pos) = records.iter().position(|r| r.comment_clean.trim().is_empty()) {
        return Err(Error::input(format!(
            "record {pos} has empty cleaned text; re-run the clean stage"
        )));
    }

    let mut labeled = Vec::with_capacity(records.len());

    for (batch_index, chunk) in records.chunks(batch_size).enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let texts: Vec<&str> = chunk.iter().map(|r| r.comment_clean.as_str()).collect();
        let predictions = classifier.predict_batch(&texts)?;
        if predictions.len() != texts.len() {
            return Err(Error::data_format(format!(
                "classifier returned {} predictions for a batch of {}",
                predictions.len(),
                texts.len()
            )));
        }
        tracing::debug!(batch = batch_index, size = texts.len(), "labeled batch");

        for (record, prediction) in chunk.iter().zip(predictions) {
            labeled.push(LabeledRecord {
                author: record.author.clone(),
                comment: record.comment.clone(),
                likes: record.likes,
                published_at: record.published_at.clone(),
                comment_clean: record.comment_clean.clone(),
                numeric_code: task.numeric_code(&prediction.label),
                label: prediction.label,
                score: prediction.score,
            });
        }
    }

    Ok(labeled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clean::normalize_records;
    use crate::core::dataset::CommentRecord;
    use std::sync::Mutex;

    struct MockClassifier {
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl MockClassifier {
        fn new() -> Self {
            Self {
                batch_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextClassifier for MockClassifier {
        fn predict_batch(&self, texts: &[&str]) -> Result<Vec<Prediction>> {
            self.batch_sizes.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .map(|text| {
                    if text.contains("check") || text.contains("love") {
                        Prediction {
                            label: "positive".to_string(),
                            score: 0.92,
                        }
                    } else {
                        Prediction {
                            label: "neutral".to_string(),
                            score: 0.5,
                        }
                    }
                })
                .collect())
        }
    }

    fn clean(text: &str) -> CleanRecord {
        CleanRecord {
            author: None,
            comment: text.to_string(),
            likes: Some(2),
            published_at: Some("2024-01-01T00:00:00Z".to_string()),
            comment_clean: text.to_string(),
        }
    }

    #[test]
    fn preserves_order_and_length() {
        let records: Vec<CleanRecord> =
            ["i love it", "fine", "love again", "ok", "meh"]
                .iter()
                .map(|t| clean(t))
                .collect();

        let classifier = MockClassifier::new();
        let labeled =
            label_records(&classifier, Task::Sentiment, &records, 2, &CancelFlag::new())
                .expect("label");

        assert_eq!(labeled.len(), records.len());
        for (before, after) in records.iter().zip(&labeled) {
            assert_eq!(before.comment_clean, after.comment_clean);
            assert!(after.score >= 0.0 && after.score <= 1.0);
        }
        assert_eq!(labeled[0].label, "positive");
        assert_eq!(labeled[1].label, "neutral");
        // Fixed-size consecutive batches: 5 records at batch size 2
        assert_eq!(*classifier.batch_sizes.lock().unwrap(), vec![2, 2, 1]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let classifier = MockClassifier::new();
        let labeled = label_records(
            &classifier,
            Task::Sentiment,
            &[],
            DEFAULT_BATCH_SIZE,
            &CancelFlag::new(),
        )
        .expect("label");
        assert!(labeled.is_empty());
        assert!(classifier.batch_sizes.lock().unwrap().is_empty());
    }

    #[test]
    fn rejects_empty_cleaned_text() {
        let mut record = clean("ok");
        record.comment_clean = "  ".to_string();
        let classifier = MockClassifier::new();

        let result = label_records(
            &classifier,
            Task::Sentiment,
            &[record],
            DEFAULT_BATCH_SIZE,
            &CancelFlag::new(),
        );
        assert!(matches!(result, Err(Error::Input(_))));
    }

    #[test]
    fn cancellation_checked_between_batches() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let classifier = MockClassifier::new();

        let result = label_records(
            &classifier,
            Task::Sentiment,
            &[clean("hello")],
            DEFAULT_BATCH_SIZE,
            &cancel,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn static_numeric_codes() {
        assert_eq!(Task::Sentiment.numeric_code("negative"), Some(-1));
        assert_eq!(Task::Sentiment.numeric_code("NEUTRAL"), Some(0));
        assert_eq!(Task::Sentiment.numeric_code("Positive"), Some(1));
        assert_eq!(Task::Sentiment.numeric_code("joy"), None);

        assert_eq!(Task::Emotion.numeric_code("anger"), Some(0));
        assert_eq!(Task::Emotion.numeric_code("surprise"), Some(5));
        assert_eq!(Task::Emotion.numeric_code("positive"), None);
    }

    #[test]
    fn raw_records_to_labeled_end_to_end() {
        let raw = vec![
            CommentRecord {
                author: Some("a".to_string()),
                comment: Some("Check this out http://x.co 😀".to_string()),
                likes: Some(5),
                published_at: Some("2024-01-01T00:00:00Z".to_string()),
            },
            CommentRecord {
                author: Some("b".to_string()),
                comment: None,
                likes: Some(1),
                published_at: Some("2024-01-02T00:00:00Z".to_string()),
            },
        ];

        let cleaned = normalize_records(raw);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].comment_clean, "check this out");

        let classifier = MockClassifier::new();
        let labeled = label_records(
            &classifier,
            Task::Sentiment,
            &cleaned,
            DEFAULT_BATCH_SIZE,
            &CancelFlag::new(),
        )
        .expect("label");

        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].label, "positive");
        assert_eq!(labeled[0].score, 0.92);
        assert_eq!(labeled[0].numeric_code, Some(1));
        assert_eq!(labeled[0].likes, Some(5));
    }
}

use crate::core::comments;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

const DATASETS_DIR: &str = "datasets";
const DATASET_PREFIX: &str = "comments_";
const DATASET_SUFFIX: &str = ".csv";
const CLEAN_TAG: &str = "_clean";

/// One comment as returned by the fetcher. `comment` may be missing for
/// deleted or restricted comments; such rows are dropped by the normalizer,
/// not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(rename = "publishedAt", default)]
    pub published_at: Option<String>,
}

/// A comment that survived normalization. `comment_clean` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    #[serde(default)]
    pub author: Option<String>,
    pub comment: String,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(rename = "publishedAt", default)]
    pub published_at: Option<String>,
    pub comment_clean: String,
}

/// A cleaned comment enriched with the classifier's verdict. `numeric_code`
/// comes from the task's static label table and is `None` for labels outside
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    #[serde(default)]
    pub author: Option<String>,
    pub comment: String,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(rename = "publishedAt", default)]
    pub published_at: Option<String>,
    pub comment_clean: String,
    pub label: String,
    pub score: f32,
    #[serde(default)]
    pub numeric_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stage {
    Raw,
    Clean,
    Labeled,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Raw => "raw",
            Stage::Clean => "clean",
            Stage::Labeled => "labeled",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct DatasetEntry {
    pub path: PathBuf,
    pub name: String,
    pub stage: Stage,
    pub size: u64,
    pub modified: SystemTime,
}

/// Staged CSV storage under `datasets/`. One file per pipeline stage so a
/// run can resume from the last completed stage.
pub struct DatasetStore;

impl DatasetStore {
    fn ensure_directory() -> Result<()> {
        fs::create_dir_all(DATASETS_DIR)?;
        Ok(())
    }

    pub fn raw_path(video_id: &str) -> Result<PathBuf> {
        let sanitized = comments::sanitize_video_id(video_id)?;
        Ok(Path::new(DATASETS_DIR).join(format!("{DATASET_PREFIX}{sanitized}{DATASET_SUFFIX}")))
    }

    pub fn clean_path(video_id: &str) -> Result<PathBuf> {
        let sanitized = comments::sanitize_video_id(video_id)?;
        Ok(Path::new(DATASETS_DIR)
            .join(format!("{DATASET_PREFIX}{sanitized}{CLEAN_TAG}{DATASET_SUFFIX}")))
    }

    pub fn labeled_path(video_id: &str, task_tag: &str) -> Result<PathBuf> {
        let sanitized = comments::sanitize_video_id(video_id)?;
        Ok(Path::new(DATASETS_DIR)
            .join(format!("{DATASET_PREFIX}{sanitized}_{task_tag}{DATASET_SUFFIX}")))
    }

    pub fn raw_exists(video_id: &str) -> bool {
        Self::raw_path(video_id).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn clean_exists(video_id: &str) -> bool {
        Self::clean_path(video_id)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    pub fn labeled_exists(video_id: &str, task_tag: &str) -> bool {
        Self::labeled_path(video_id, task_tag)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    pub fn save_raw(video_id: &str, records: &[CommentRecord]) -> Result<PathBuf> {
        Self::ensure_directory()?;
        let path = Self::raw_path(video_id)?;
        write_records(&path, records)?;
        Ok(path)
    }

    pub fn save_clean(video_id: &str, records: &[CleanRecord]) -> Result<PathBuf> {
        Self::ensure_directory()?;
        let path = Self::clean_path(video_id)?;
        write_records(&path, records)?;
        Ok(path)
    }

    pub fn save_labeled(
        video_id: &str,
        task_tag: &str,
        records: &[LabeledRecord],
    ) -> Result<PathBuf> {
        Self::ensure_directory()?;
        let path = Self::labeled_path(video_id, task_tag)?;
        write_records(&path, records)?;
        Ok(path)
    }

    pub fn load_raw(video_id: &str) -> Result<Vec<CommentRecord>> {
        read_records(&Self::raw_path(video_id)?)
    }

    pub fn load_clean(video_id: &str) -> Result<Vec<CleanRecord>> {
        read_records(&Self::clean_path(video_id)?)
    }

    pub fn load_labeled(video_id: &str, task_tag: &str) -> Result<Vec<LabeledRecord>> {
        read_records(&Self::labeled_path(video_id, task_tag)?)
    }

    pub fn list_datasets() -> Result<Vec<DatasetEntry>> {
        Self::ensure_directory()?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(DATASETS_DIR)? {
            let entry = entry?;
            let path = entry.path();

            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && name.starts_with(DATASET_PREFIX)
                && name.ends_with(DATASET_SUFFIX)
            {
                let stem = name
                    .trim_start_matches(DATASET_PREFIX)
                    .trim_end_matches(DATASET_SUFFIX);
                let stage = if stem.ends_with(CLEAN_TAG) {
                    Stage::Clean
                } else if stem.ends_with("_sentiment") || stem.ends_with("_emotion") {
                    Stage::Labeled
                } else {
                    Stage::Raw
                };

                let metadata = entry.metadata()?;
                entries.push(DatasetEntry {
                    path: path.clone(),
                    name: name.to_string(),
                    stage,
                    size: metadata.len(),
                    modified: metadata.modified()?,
                });
            }
        }

        // Newest first
        entries.sort_by(|a, b| b.modified.cmp(&a.modified));

        Ok(entries)
    }
}

/// Serialize records to CSV with a header row. Writes to a temporary sibling
/// first and renames into place so a failed write never clobbers an existing
/// dataset.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");

    let mut writer = csv::Writer::from_path(&tmp)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    drop(writer);

    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(Error::custom(format!(
            "dataset not found: {} (run the earlier pipeline stages first)",
            path.display()
        )));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

type CacheEntries = HashMap<PathBuf, (SystemTime, Arc<Vec<LabeledRecord>>)>;

/// Explicit dataset cache keyed by path, invalidated by file modification
/// time. Callers that reload the same labeled dataset repeatedly (the stats
/// surface) share one parsed copy.
#[derive(Default)]
pub struct DatasetCache {
    entries: Mutex<CacheEntries>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, path: &Path) -> Result<Arc<Vec<LabeledRecord>>> {
        let modified = fs::metadata(path)?.modified()?;

        {
            let entries = self.entries.lock().unwrap();
            if let Some((cached_mtime, records)) = entries.get(path)
                && *cached_mtime == modified
            {
                return Ok(Arc::clone(records));
            }
        }

        let records: Arc<Vec<LabeledRecord>> = Arc::new(read_records(path)?);

        let mut entries = self.entries.lock().unwrap();
        entries.insert(path.to_path_buf(), (modified, Arc::clone(&records)));

        Ok(records)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_labeled() -> Vec<LabeledRecord> {
        vec![
            LabeledRecord {
                author: Some("alice".to_string()),
                comment: "Great video!".to_string(),
                likes: Some(5),
                published_at: Some("2024-01-01T00:00:00Z".to_string()),
                comment_clean: "great video!".to_string(),
                label: "positive".to_string(),
                score: 0.92,
                numeric_code: Some(1),
            },
            LabeledRecord {
                author: None,
                comment: "meh".to_string(),
                likes: None,
                published_at: Some("2024-01-02T12:30:00Z".to_string()),
                comment_clean: "meh".to_string(),
                label: "neutral".to_string(),
                score: 0.51,
                numeric_code: Some(0),
            },
        ]
    }

    #[test]
    fn labeled_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("labeled.csv");

        let records = sample_labeled();
        write_records(&path, &records).expect("write");
        let loaded: Vec<LabeledRecord> = read_records(&path).expect("read");

        assert_eq!(loaded, records);
    }

    #[test]
    fn raw_round_trip_preserves_missing_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("raw.csv");

        let records = vec![
            CommentRecord {
                author: Some("bob".to_string()),
                comment: Some("hello".to_string()),
                likes: Some(0),
                published_at: Some("2024-03-01T08:00:00Z".to_string()),
            },
            CommentRecord {
                author: None,
                comment: None,
                likes: None,
                published_at: None,
            },
        ];
        write_records(&path, &records).expect("write");
        let loaded: Vec<CommentRecord> = read_records(&path).expect("read");

        assert_eq!(loaded, records);
    }

    #[test]
    fn write_replaces_atomically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("labeled.csv");

        write_records(&path, &sample_labeled()).expect("first write");
        let one = sample_labeled().into_iter().take(1).collect::<Vec<_>>();
        write_records(&path, &one).expect("second write");

        let loaded: Vec<LabeledRecord> = read_records(&path).expect("read");
        assert_eq!(loaded.len(), 1);
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn read_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.csv");
        assert!(read_records::<LabeledRecord>(&path).is_err());
    }

    #[test]
    fn cache_returns_shared_copy_until_file_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("labeled.csv");
        write_records(&path, &sample_labeled()).expect("write");

        let cache = DatasetCache::new();
        let first = cache.load(&path).expect("load");
        let second = cache.load(&path).expect("load again");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        // Rewrite with different content; mtime moves forward and the cache
        // must pick up the new file.
        std::thread::sleep(std::time::Duration::from_millis(50));
        let one = sample_labeled().into_iter().take(1).collect::<Vec<_>>();
        write_records(&path, &one).expect("rewrite");

        let third = cache.load(&path).expect("reload");
        assert_eq!(third.len(), 1);
    }
}

//! Worker configuration.
//!
//! One file describes one run: where the source image comes from, where
//! results are published, and the ordered operation list. JSON is the
//! native format; a `.toml` extension switches to TOML.
//!
//! ```json
//! {
//!   "source_image_url": "https://cdn.example.com/uploads/poster.jpg",
//!   "source_image_keypath": "uploads/poster.jpg",
//!   "offer_id": 42,
//!   "work_dir": "/tmp/image-worker",
//!   "max_threads": 4,
//!   "publish": {
//!     "bucket_dir": "/srv/bucket",
//!     "public_base_url": "https://cdn.example.com/",
//!     "ledger": "/srv/bucket/versions.jsonl"
//!   },
//!   "operations": [
//!     {"op": "thumbnail", "width": 100, "height": 100, "destination_path": "offers/42"},
//!     {"op": "sketch", "destination_path": "offers/42", "version": "sketch"}
//!   ]
//! }
//! ```
//!
//! Unknown top-level keys are rejected to catch typos early. Unknown keys
//! inside an operation are ignored.

use crate::operation::OperationDescriptor;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// http(s) URL, `file://` URL or local path of the source image.
    pub source_image_url: Option<String>,
    /// Bucket key of the uploaded source, deleted during cleanup.
    pub source_image_keypath: Option<String>,
    /// Skip download and publishing; outputs stay in `work_dir`.
    pub disable_network: bool,
    /// Scratch directory for the source copy and encoded outputs.
    pub work_dir: PathBuf,
    #[serde(deserialize_with = "lenient_id")]
    pub offer_id: Option<String>,
    #[serde(deserialize_with = "lenient_id")]
    pub change_request_id: Option<String>,
    /// Upper bound on tile workers. Absent means one per core.
    pub max_threads: Option<usize>,
    pub publish: PublishConfig,
    pub operations: Vec<OperationDescriptor>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            source_image_url: None,
            source_image_keypath: None,
            disable_network: false,
            work_dir: default_work_dir(),
            offer_id: None,
            change_request_id: None,
            max_threads: None,
            publish: PublishConfig::default(),
            operations: Vec::new(),
        }
    }
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("image-worker")
}

/// Object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Root directory standing in for the bucket.
    pub bucket_dir: PathBuf,
    /// Prepended to a key to form its public URL.
    pub public_base_url: String,
    /// JSON-lines file receiving one record per published version.
    pub ledger: Option<PathBuf>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            bucket_dir: PathBuf::from("bucket"),
            public_base_url: String::new(),
            ledger: None,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_image_url.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Validation(
                "source_image_url must be set".into(),
            ));
        }
        if self.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "max_threads must be at least 1".into(),
            ));
        }
        for (index, operation) in self.operations.iter().enumerate() {
            if operation.op.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "operations[{index}].op must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// The config as pretty JSON, echoed at start-up.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(u64),
    Text(String),
}

/// Ids arrive as numbers or strings; empty strings and `0` mean unset.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<IdValue>::deserialize(deserializer)? {
        Some(IdValue::Number(0)) | None => None,
        Some(IdValue::Number(n)) => Some(n.to_string()),
        Some(IdValue::Text(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty() && trimmed != "0").then(|| trimmed.to_string())
        }
    })
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &WorkerConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Parse config text; `toml` selects the TOML parser.
pub fn parse_config(content: &str, toml: bool) -> Result<WorkerConfig, ConfigError> {
    let config: WorkerConfig = if toml {
        toml::from_str(content)?
    } else {
        serde_json::from_str(content)?
    };
    Ok(config)
}

/// Load a config file without validating it.
///
/// Callers apply command-line overrides first, then call
/// [`WorkerConfig::validate`].
pub fn load_config(path: &Path) -> Result<WorkerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    parse_config(&content, toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"{"source_image_url": "file:///tmp/poster.jpg"}"#;

    #[test]
    fn defaults() {
        let config = parse_config(MINIMAL, false).unwrap();
        assert!(!config.disable_network);
        assert!(config.operations.is_empty());
        assert_eq!(config.max_threads, None);
        assert_eq!(config.publish.public_base_url, "");
        assert!(config.work_dir.ends_with("image-worker"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_json() {
        let config = parse_config(
            r#"{
                "source_image_url": "https://cdn.example.com/uploads/poster.jpg?v=2",
                "source_image_keypath": "uploads/poster.jpg",
                "offer_id": 42,
                "change_request_id": "7",
                "disable_network": true,
                "work_dir": "/var/tmp/w",
                "max_threads": 2,
                "publish": {
                    "bucket_dir": "/srv/bucket",
                    "public_base_url": "https://cdn.example.com/",
                    "ledger": "/srv/ledger.jsonl"
                },
                "operations": [
                    {"op": "thumbnail", "width": "100", "height": 100},
                    {"op": "sketch", "version": "sketch"}
                ]
            }"#,
            false,
        )
        .unwrap();
        assert_eq!(config.offer_id.as_deref(), Some("42"));
        assert_eq!(config.change_request_id.as_deref(), Some("7"));
        assert!(config.disable_network);
        assert_eq!(config.work_dir, PathBuf::from("/var/tmp/w"));
        assert_eq!(config.publish.ledger, Some(PathBuf::from("/srv/ledger.jsonl")));
        assert_eq!(config.operations.len(), 2);
        assert_eq!(config.operations[0].params.width, Some(100.0));
        assert_eq!(config.operations[1].version_label(), "sketch");
    }

    #[test]
    fn zero_and_empty_ids_are_unset() {
        let config = parse_config(
            r#"{"source_image_url": "a.jpg", "offer_id": 0, "change_request_id": " "}"#,
            false,
        )
        .unwrap();
        assert_eq!(config.offer_id, None);
        assert_eq!(config.change_request_id, None);
    }

    #[test]
    fn parse_toml() {
        let config = parse_config(
            r#"
source_image_url = "poster.jpg"
offer_id = "42"

[publish]
bucket_dir = "out"

[[operations]]
op = "level"
black_point = 10
white_point = 240
gamma = 1.0
"#,
            true,
        )
        .unwrap();
        assert_eq!(config.offer_id.as_deref(), Some("42"));
        assert_eq!(config.publish.bucket_dir, PathBuf::from("out"));
        assert_eq!(config.operations[0].op, "level");
        assert_eq!(config.operations[0].params.white_point, Some(240.0));
    }

    #[test]
    fn unknown_key_rejected() {
        let result = parse_config(r#"{"source_image_url": "a.jpg", "sorce": "b"}"#, false);
        assert!(result.is_err());
        let result = parse_config(
            r#"{"source_image_url": "a.jpg", "publish": {"bucket": "b"}}"#,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn validate_requires_source() {
        let err = WorkerConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("source_image_url"));
    }

    #[test]
    fn validate_rejects_zero_threads_and_blank_op() {
        let mut config = parse_config(MINIMAL, false).unwrap();
        config.max_threads = Some(0);
        assert!(config.validate().is_err());

        config.max_threads = None;
        config.operations.push(OperationDescriptor::new(" "));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("operations[0]"));
    }

    #[test]
    fn load_config_picks_parser_by_extension() {
        let tmp = TempDir::new().unwrap();
        let json = tmp.path().join("worker.json");
        fs::write(&json, MINIMAL).unwrap();
        assert!(load_config(&json).is_ok());

        let toml = tmp.path().join("worker.toml");
        fs::write(&toml, "source_image_url = \"a.jpg\"\n").unwrap();
        assert_eq!(
            load_config(&toml).unwrap().source_image_url.as_deref(),
            Some("a.jpg")
        );

        // JSON content behind a .toml name goes to the TOML parser.
        fs::write(&toml, MINIMAL).unwrap();
        assert!(matches!(load_config(&toml), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_config(&tmp.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let mut config = WorkerConfig::default();
        assert_eq!(effective_threads(&config), cores);
        config.max_threads = Some(99999);
        assert_eq!(effective_threads(&config), cores);
        config.max_threads = Some(1);
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn pretty_json_round_trips_operations() {
        let config = parse_config(
            r#"{"source_image_url": "a.jpg", "operations": [{"op": "thumbnail", "width": 80}]}"#,
            false,
        )
        .unwrap();
        let echoed = config.to_pretty_json();
        assert!(echoed.contains("\"thumbnail\""));
        assert!(echoed.contains("\"width\": 80.0"));
    }
}

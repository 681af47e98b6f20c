//! Publishing produced files to the object store.
//!
//! The bucket is a directory: a key `offers/42/poster_sketch.jpg` lives at
//! `bucket_dir/offers/42/poster_sketch.jpg` and is served at
//! `public_base_url + key`. The SHA-256 of every stored object is kept in
//! `.digests.json` at the bucket root, so republishing identical bytes leaves
//! the stored object untouched without reading it back.
//!
//! Each published version can be recorded in a JSON-lines ledger, one
//! `{"owner": ..., "version": ..., "url": ...}` object per line. The owner
//! is the change request when the run has one, otherwise the offer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publish to {target} failed: {source}")]
    Failure {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid key {0:?}")]
    InvalidKey(String),
}

/// Entity a published version is recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AssetOwner {
    ChangeRequest(String),
    Offer(String),
}

impl AssetOwner {
    /// A change request takes precedence over the offer.
    pub fn resolve(offer_id: Option<&str>, change_request_id: Option<&str>) -> Option<Self> {
        change_request_id
            .map(|id| AssetOwner::ChangeRequest(id.to_string()))
            .or_else(|| offer_id.map(|id| AssetOwner::Offer(id.to_string())))
    }
}

impl std::fmt::Display for AssetOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetOwner::ChangeRequest(id) => write!(f, "change request {id}"),
            AssetOwner::Offer(id) => write!(f, "offer {id}"),
        }
    }
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub owner: AssetOwner,
    pub version: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedFile {
    pub key: String,
    pub url: String,
    pub version: String,
    /// Identical content was already stored under `key`.
    pub reused: bool,
    /// `None` when there was no owner to attach the version to.
    pub recorded: Option<AssetOwner>,
}

/// Result of deleting a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    NothingToDelete,
}

pub trait Publisher {
    /// Store `local_file` under `destination_path` and record `version`.
    fn publish(
        &self,
        local_file: &Path,
        destination_path: Option<&str>,
        version: &str,
    ) -> Result<PublishedFile, PublishError>;

    fn remove(&self, key: &str) -> Result<Removal, PublishError>;
}

/// `""` for no prefix, otherwise the prefix with exactly one trailing `/`.
pub fn normalize_prefix(destination_path: Option<&str>) -> String {
    match destination_path.map(|p| p.trim_matches('/')) {
        None | Some("") => String::new(),
        Some(p) => format!("{p}/"),
    }
}

fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Name of the digest index within the bucket directory.
const DIGESTS_FILENAME: &str = ".digests.json";

/// Stored key → SHA-256 of the object's bytes.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DigestIndex {
    entries: BTreeMap<String, String>,
}

impl DigestIndex {
    /// Missing or unreadable indexes load empty; the next store rewrites them.
    fn load(bucket_dir: &Path) -> Self {
        fs::read_to_string(bucket_dir.join(DIGESTS_FILENAME))
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn save(&self, bucket_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(bucket_dir.join(DIGESTS_FILENAME), json)
    }
}

/// Reject keys that would escape the bucket directory.
fn key_path(bucket_dir: &Path, key: &str) -> Result<PathBuf, PublishError> {
    let mut path = bucket_dir.to_path_buf();
    let mut segments = 0;
    for segment in key.split('/') {
        match segment {
            "" => continue,
            "." | ".." => return Err(PublishError::InvalidKey(key.to_string())),
            s if s.contains('\\') => return Err(PublishError::InvalidKey(key.to_string())),
            s => {
                path.push(s);
                segments += 1;
            }
        }
    }
    if segments == 0 || key.trim_matches('/') == DIGESTS_FILENAME {
        return Err(PublishError::InvalidKey(key.to_string()));
    }
    Ok(path)
}

/// Publishes into a bucket directory.
#[derive(Debug, Clone)]
pub struct BucketPublisher {
    bucket_dir: PathBuf,
    public_base_url: String,
    ledger: Option<PathBuf>,
    owner: Option<AssetOwner>,
}

impl BucketPublisher {
    pub fn new(bucket_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            bucket_dir: bucket_dir.into(),
            public_base_url: public_base_url.into(),
            ledger: None,
            owner: None,
        }
    }

    pub fn with_ledger(mut self, ledger: impl Into<PathBuf>, owner: Option<AssetOwner>) -> Self {
        self.ledger = Some(ledger.into());
        self.owner = owner;
        self
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.public_base_url, key)
    }

    fn failure(target: impl Into<String>) -> impl FnOnce(io::Error) -> PublishError {
        let target = target.into();
        move |source| PublishError::Failure { target, source }
    }

    /// Copy `bytes` to `path` unless the digest index says `key` already
    /// holds the same content.
    fn store(&self, path: &Path, bytes: &[u8], key: &str) -> Result<bool, PublishError> {
        let digest = content_hash(bytes);
        let mut index = DigestIndex::load(&self.bucket_dir);
        if path.is_file() && index.entries.get(key) == Some(&digest) {
            log::debug!("{key} unchanged, skipping upload");
            return Ok(true);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Self::failure(key))?;
        }
        fs::write(path, bytes).map_err(Self::failure(key))?;
        index.entries.insert(key.to_string(), digest);
        index.save(&self.bucket_dir).map_err(Self::failure(key))?;
        Ok(false)
    }

    fn record(&self, version: &str, url: &str) -> Result<Option<AssetOwner>, PublishError> {
        let Some(ledger) = &self.ledger else {
            return Ok(None);
        };
        let Some(owner) = &self.owner else {
            log::warn!("no owner to attach {url} to");
            return Ok(None);
        };
        let record = VersionRecord {
            owner: owner.clone(),
            version: version.to_string(),
            url: url.to_string(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| Self::failure(ledger.display().to_string())(io::Error::other(e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(ledger)
            .map_err(Self::failure(ledger.display().to_string()))?;
        writeln!(file, "{line}").map_err(Self::failure(ledger.display().to_string()))?;
        Ok(Some(owner.clone()))
    }
}

impl Publisher for BucketPublisher {
    fn publish(
        &self,
        local_file: &Path,
        destination_path: Option<&str>,
        version: &str,
    ) -> Result<PublishedFile, PublishError> {
        let filename = local_file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PublishError::InvalidKey(local_file.display().to_string()))?;
        let key = format!("{}{}", normalize_prefix(destination_path), filename);
        let target = key_path(&self.bucket_dir, &key)?;

        let bytes = fs::read(local_file).map_err(Self::failure(&key))?;
        let reused = self.store(&target, &bytes, &key)?;
        let url = self.public_url(&key);
        let recorded = self.record(version, &url)?;

        Ok(PublishedFile {
            key,
            url,
            version: version.to_string(),
            reused,
            recorded,
        })
    }

    fn remove(&self, key: &str) -> Result<Removal, PublishError> {
        let path = key_path(&self.bucket_dir, key)?;
        let mut index = DigestIndex::load(&self.bucket_dir);
        if index.entries.remove(key).is_some() {
            index.save(&self.bucket_dir).map_err(Self::failure(key))?;
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(Removal::Deleted),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::NothingToDelete),
            Err(e) => Err(PublishError::Failure {
                target: key.to_string(),
                source: e,
            }),
        }
    }
}

/// Read every record from a ledger file.
pub fn read_ledger(path: &Path) -> Result<Vec<VersionRecord>, PublishError> {
    let content = fs::read_to_string(path).map_err(BucketPublisher::failure(path.display().to_string()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| PublishError::Failure {
                target: path.display().to_string(),
                source: io::Error::new(io::ErrorKind::InvalidData, e),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, BucketPublisher) {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("poster_sketch.jpg");
        fs::write(&file, b"jpeg bytes").unwrap();
        let publisher = BucketPublisher::new(tmp.path().join("bucket"), "https://cdn.test/");
        (tmp, file, publisher)
    }

    #[test]
    fn prefix_normalization() {
        assert_eq!(normalize_prefix(None), "");
        assert_eq!(normalize_prefix(Some("")), "");
        assert_eq!(normalize_prefix(Some("/")), "");
        assert_eq!(normalize_prefix(Some("offers/42")), "offers/42/");
        assert_eq!(normalize_prefix(Some("offers/42/")), "offers/42/");
        assert_eq!(normalize_prefix(Some("/offers/42//")), "offers/42/");
    }

    #[test]
    fn owner_prefers_change_request() {
        assert_eq!(
            AssetOwner::resolve(Some("1"), Some("2")),
            Some(AssetOwner::ChangeRequest("2".into()))
        );
        assert_eq!(
            AssetOwner::resolve(Some("1"), None),
            Some(AssetOwner::Offer("1".into()))
        );
        assert_eq!(AssetOwner::resolve(None, None), None);
    }

    #[test]
    fn publish_copies_into_bucket() {
        let (tmp, file, publisher) = setup();
        let published = publisher.publish(&file, Some("offers/42"), "sketch").unwrap();

        assert_eq!(published.key, "offers/42/poster_sketch.jpg");
        assert_eq!(published.url, "https://cdn.test/offers/42/poster_sketch.jpg");
        assert_eq!(published.version, "sketch");
        assert!(!published.reused);
        assert_eq!(published.recorded, None);
        let stored = tmp.path().join("bucket/offers/42/poster_sketch.jpg");
        assert_eq!(fs::read(stored).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn publish_without_prefix_uses_bucket_root() {
        let (tmp, file, publisher) = setup();
        let published = publisher.publish(&file, None, "original").unwrap();
        assert_eq!(published.key, "poster_sketch.jpg");
        assert!(tmp.path().join("bucket/poster_sketch.jpg").exists());
    }

    #[test]
    fn identical_content_is_not_rewritten() {
        let (_tmp, file, publisher) = setup();
        assert!(!publisher.publish(&file, Some("a"), "v").unwrap().reused);
        assert!(publisher.publish(&file, Some("a"), "v").unwrap().reused);

        fs::write(&file, b"new bytes").unwrap();
        assert!(!publisher.publish(&file, Some("a"), "v").unwrap().reused);
    }

    #[test]
    fn reuse_is_decided_from_the_digest_index() {
        let (tmp, file, publisher) = setup();
        publisher.publish(&file, Some("a"), "v").unwrap();

        let index = DigestIndex::load(&tmp.path().join("bucket"));
        assert_eq!(
            index.entries.get("a/poster_sketch.jpg"),
            Some(&content_hash(b"jpeg bytes"))
        );

        // A vanished object is stored again even though the digest matches.
        fs::remove_file(tmp.path().join("bucket/a/poster_sketch.jpg")).unwrap();
        assert!(!publisher.publish(&file, Some("a"), "v").unwrap().reused);
        assert!(tmp.path().join("bucket/a/poster_sketch.jpg").exists());
    }

    #[test]
    fn remove_forgets_the_digest() {
        let (tmp, file, publisher) = setup();
        publisher.publish(&file, Some("a"), "v").unwrap();
        publisher.remove("a/poster_sketch.jpg").unwrap();

        let index = DigestIndex::load(&tmp.path().join("bucket"));
        assert!(index.entries.is_empty());
        assert!(matches!(
            publisher.remove(".digests.json"),
            Err(PublishError::InvalidKey(_))
        ));
    }

    #[test]
    fn ledger_records_owner_version_and_url() {
        let (tmp, file, publisher) = setup();
        let ledger = tmp.path().join("versions.jsonl");
        let publisher = publisher.with_ledger(&ledger, AssetOwner::resolve(Some("42"), None));

        publisher.publish(&file, Some("offers/42"), "sketch").unwrap();
        publisher.publish(&file, Some("offers/42"), "thumb").unwrap();

        let records = read_ledger(&ledger).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].owner, AssetOwner::Offer("42".into()));
        assert_eq!(records[0].version, "sketch");
        assert_eq!(records[1].url, "https://cdn.test/offers/42/poster_sketch.jpg");
        let raw = fs::read_to_string(&ledger).unwrap();
        assert!(raw.lines().next().unwrap().contains(r#""kind":"offer""#));
    }

    #[test]
    fn ledger_without_owner_still_publishes() {
        let (tmp, file, publisher) = setup();
        let ledger = tmp.path().join("versions.jsonl");
        let publisher = publisher.with_ledger(&ledger, None);

        let published = publisher.publish(&file, None, "v").unwrap();
        assert_eq!(published.recorded, None);
        assert!(!ledger.exists());
    }

    #[test]
    fn missing_local_file_is_a_failure() {
        let (tmp, _file, publisher) = setup();
        let err = publisher
            .publish(&tmp.path().join("gone.jpg"), Some("x"), "v")
            .unwrap_err();
        assert!(matches!(err, PublishError::Failure { ref target, .. } if target == "x/gone.jpg"));
    }

    #[test]
    fn remove_reports_nothing_to_delete() {
        let (_tmp, file, publisher) = setup();
        publisher.publish(&file, Some("uploads"), "v").unwrap();
        assert_eq!(publisher.remove("uploads/poster_sketch.jpg").unwrap(), Removal::Deleted);
        assert_eq!(
            publisher.remove("uploads/poster_sketch.jpg").unwrap(),
            Removal::NothingToDelete
        );
    }

    #[test]
    fn keys_cannot_escape_bucket() {
        let (_tmp, _file, publisher) = setup();
        assert!(matches!(publisher.remove("../etc/passwd"), Err(PublishError::InvalidKey(_))));
        assert!(matches!(publisher.remove("/"), Err(PublishError::InvalidKey(_))));
        assert!(matches!(
            publisher.publish(Path::new("x.jpg"), Some(".."), "v"),
            Err(PublishError::InvalidKey(_))
        ));
    }
}

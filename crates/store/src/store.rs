//! File-backed change log.
//!
//! Layout inside the store directory:
//! ```text
//! log.meta.json            - metadata and schema versions
//! segments/
//!   00000001.seg.cbor.zst  - CBOR+zstd record batches, one per append
//! integrity/
//!   manifest.json          - hash chain manifest
//! ```
//!
//! Every `append_batch` call writes exactly one segment, so the records of
//! one logical user action (a compound pair, a natural-break cascade, a bulk
//! edit) become visible to queries together or not at all.

use crate::record::{ChangeFilter, ChangeRecord, QueryOrder, RecordDraft};
use blocktrace_common::GlobalPos;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Current schema version of stored records.
const RECORD_SCHEMA_VERSION: u32 = 1;

/// Errors from change log operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("store lock poisoned")]
    Poisoned,
}

/// Metadata stored in log.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMeta {
    pub record_schema_version: u32,
    pub segment_count: u32,
    pub next_id: u64,
}

/// A single entry in the integrity manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

/// Integrity manifest tracking all segment hashes in a chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

/// Append-only, queryable change log with single-writer discipline.
///
/// Interior mutex makes `append`/`query` safe to call from outside the
/// simulation thread; each append is atomic with respect to others.
pub struct ChangeLogStore {
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    root: PathBuf,
    meta: LogMeta,
    manifest: IntegrityManifest,
    /// All records, dense: `records[i].id == i as u64 + 1`.
    records: Vec<ChangeRecord>,
    by_position: HashMap<GlobalPos, Vec<u64>>,
    by_time: BTreeMap<u64, Vec<u64>>,
    by_actor: HashMap<String, Vec<u64>>,
    by_group: HashMap<Uuid, Vec<u64>>,
}

impl ChangeLogStore {
    /// Open or create a change log at the given directory.
    ///
    /// Existing segments are replayed to rebuild the in-memory indexes;
    /// a schema mismatch fails closed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("segments"))?;
        std::fs::create_dir_all(root.join("integrity"))?;

        let meta_path = root.join("log.meta.json");
        let manifest_path = root.join("integrity").join("manifest.json");

        let (meta, manifest) = if meta_path.exists() {
            let meta: LogMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.record_schema_version != RECORD_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.record_schema_version,
                    expected_version: RECORD_SCHEMA_VERSION,
                });
            }
            let manifest: IntegrityManifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            (meta, manifest)
        } else {
            let meta = LogMeta {
                record_schema_version: RECORD_SCHEMA_VERSION,
                segment_count: 0,
                next_id: 1,
            };
            let manifest = IntegrityManifest::default();
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            serde_json::to_writer_pretty(std::fs::File::create(&manifest_path)?, &manifest)?;
            (meta, manifest)
        };

        let mut inner = StoreInner {
            root,
            meta,
            manifest,
            records: Vec::new(),
            by_position: HashMap::new(),
            by_time: BTreeMap::new(),
            by_actor: HashMap::new(),
            by_group: HashMap::new(),
        };

        for seg_idx in 1..=inner.meta.segment_count {
            let batch = inner.load_segment(seg_idx)?;
            for record in batch {
                inner.index(&record);
                inner.records.push(record);
            }
        }
        tracing::debug!(
            records = inner.records.len(),
            segments = inner.meta.segment_count,
            "change log opened"
        );

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Append a single record. Returns its assigned id.
    pub fn append(&self, draft: RecordDraft) -> Result<u64, StoreError> {
        let ids = self.append_batch(vec![draft])?;
        Ok(ids[0])
    }

    /// Append a batch of records as one durable unit.
    ///
    /// Ids are assigned in input order. Either the whole batch becomes
    /// visible to queries or, on error, none of it.
    pub fn append_batch(&self, drafts: Vec<RecordDraft>) -> Result<Vec<u64>, StoreError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;

        let mut batch = Vec::with_capacity(drafts.len());
        let mut ids = Vec::with_capacity(drafts.len());
        let mut next_id = inner.meta.next_id;
        for draft in drafts {
            let record = draft.into_record(next_id);
            ids.push(next_id);
            next_id += 1;
            batch.push(record);
        }

        // Durable write first; memory state only changes after it succeeds.
        inner.write_segment(&batch)?;
        inner.meta.next_id = next_id;
        inner.save_meta()?;
        inner.save_manifest()?;

        for record in batch {
            inner.index(&record);
            inner.records.push(record);
        }
        Ok(ids)
    }

    /// Fetch matching records ordered by id.
    ///
    /// The result is finite and restartable: repeated calls with the same
    /// filter yield the same sequence.
    pub fn query(
        &self,
        filter: &ChangeFilter,
        order: QueryOrder,
    ) -> Result<Vec<ChangeRecord>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;

        // Narrow by the timestamp index, then apply the remaining clauses.
        let mut ids: Vec<u64> = inner
            .by_time
            .range(filter.time_from..=filter.time_to)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        ids.sort_unstable();
        if order == QueryOrder::Descending {
            ids.reverse();
        }

        Ok(ids
            .into_iter()
            .filter_map(|id| inner.record(id))
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    /// Every record sharing a compound group, in id order.
    pub fn group_members(&self, group: Uuid) -> Result<Vec<ChangeRecord>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let mut ids = inner.by_group.get(&group).cloned().unwrap_or_default();
        ids.sort_unstable();
        Ok(ids
            .into_iter()
            .filter_map(|id| inner.record(id).cloned())
            .collect())
    }

    /// Total number of stored records.
    pub fn record_count(&self) -> usize {
        self.inner.lock().map(|i| i.records.len()).unwrap_or(0)
    }

    /// Store metadata snapshot.
    pub fn meta(&self) -> Result<LogMeta, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.meta.clone())
    }

    /// Verify the segment hash chain. Fails closed on any mismatch.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        let mut prev_hash: Option<String> = None;
        for entry in &inner.manifest.entries {
            if entry.prev_hash != prev_hash {
                return Err(StoreError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }
            let data = std::fs::read(inner.root.join("segments").join(&entry.filename))?;
            let actual = sha256_hex(&data);
            if actual != entry.sha256 {
                return Err(StoreError::IntegrityMismatch {
                    expected: entry.sha256.clone(),
                    actual,
                });
            }
            prev_hash = Some(entry.sha256.clone());
        }
        Ok(())
    }
}

impl StoreInner {
    fn record(&self, id: u64) -> Option<&ChangeRecord> {
        // Ids are dense and 1-based.
        self.records.get((id - 1) as usize)
    }

    fn index(&mut self, record: &ChangeRecord) {
        self.by_position
            .entry(record.position.clone())
            .or_default()
            .push(record.id);
        self.by_time
            .entry(record.timestamp)
            .or_default()
            .push(record.id);
        self.by_actor
            .entry(record.actor.identity.clone())
            .or_default()
            .push(record.id);
        if let Some(group) = record.compound_group {
            self.by_group.entry(group).or_default().push(record.id);
        }
    }

    fn write_segment(&mut self, batch: &[ChangeRecord]) -> Result<(), StoreError> {
        let seg_idx = self.meta.segment_count + 1;
        let filename = format!("{seg_idx:08}.seg.cbor.zst");
        let path = self.root.join("segments").join(&filename);

        let cbor = cbor_serialize(batch)?;
        let compressed = zstd_compress(&cbor)?;
        let hash = sha256_hex(&compressed);
        let prev_hash = self.manifest.entries.last().map(|e| e.sha256.clone());

        std::fs::write(&path, &compressed)?;
        // Commit bookkeeping only after the bytes are on disk.
        self.meta.segment_count = seg_idx;
        self.manifest.entries.push(ManifestEntry {
            filename,
            sha256: hash,
            prev_hash,
        });
        Ok(())
    }

    fn load_segment(&self, index: u32) -> Result<Vec<ChangeRecord>, StoreError> {
        let filename = format!("{index:08}.seg.cbor.zst");
        let compressed = std::fs::read(self.root.join("segments").join(&filename))?;
        let cbor = zstd_decompress(&compressed)?;
        cbor_deserialize(&cbor)
    }

    fn save_meta(&self) -> Result<(), StoreError> {
        let path = self.root.join("log.meta.json");
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.meta)?;
        Ok(())
    }

    fn save_manifest(&self) -> Result<(), StoreError> {
        let path = self.root.join("integrity").join("manifest.json");
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.manifest)?;
        Ok(())
    }
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

//! Fan-in collectors: one task per output resource, fed by any number of workers.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{HarvestError, Result};
use crate::models::{EntityInfoArtifact, GroupResult, JoinTuple};

/// A serialized join record must be longer than this; anything shorter is
/// missing dimensions.
pub const MIN_JOIN_RECORD_LEN: usize = 10;

/// Exclusive owner of one output resource.
pub trait RecordSink: Send + 'static {
    type Record: Send + 'static;

    fn write(&mut self, record: Self::Record) -> Result<()>;

    /// Flushes and closes the resource.
    fn finish(self) -> Result<()>;
}

pub struct Collector {
    name: &'static str,
    handle: JoinHandle<Result<u64>>,
}

impl Collector {
    /// Drains `rx` into `sink` on a blocking thread until every sender is gone.
    pub fn spawn<S: RecordSink>(name: &'static str, sink: S, mut rx: mpsc::Receiver<S::Record>) -> Self {
        let handle = tokio::task::spawn_blocking(move || {
            let mut sink = sink;
            let mut written = 0u64;
            while let Some(record) = rx.blocking_recv() {
                sink.write(record)?;
                written += 1;
            }
            sink.finish()?;
            debug!(collector = name, written, "collector closed");
            Ok(written)
        });
        Self { name, handle }
    }

    /// Number of records written once the resource is closed.
    pub async fn join(self) -> Result<u64> {
        self.handle.await.map_err(|source| HarvestError::Join {
            stage: self.name,
            source,
        })?
    }
}

// ====== JOIN TUPLE FILE ======
pub struct JoinTupleSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JoinTupleSink {
    /// Creates (or truncates) the join file.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }
}

impl RecordSink for JoinTupleSink {
    type Record = JoinTuple;

    fn write(&mut self, record: JoinTuple) -> Result<()> {
        let line = record.to_string();
        if line.len() <= MIN_JOIN_RECORD_LEN {
            return Err(HarvestError::CollectorInvariant {
                collector: "join_tuples",
                record: line,
                reason: "serialized join tuple too short",
            });
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self
            .writer
            .into_inner()
            .map_err(|e| HarvestError::Io(e.into_error()))?;
        file.sync_all()?;
        info!("Join tuples written to {}", self.path.display());
        Ok(())
    }
}

// ====== JSON ARTIFACTS ======

/// A record persisted as its own pretty-printed JSON file.
pub trait Artifact: Serialize + Send + 'static {
    fn artifact_stem(&self) -> String;
}

impl Artifact for EntityInfoArtifact {
    fn artifact_stem(&self) -> String {
        format!("{}_{}", self.school_id, self.school_name)
    }
}

impl Artifact for GroupResult {
    fn artifact_stem(&self) -> String {
        let mut stem = self.entity_id.to_string();
        if let Some(province) = self.province_id {
            stem.push_str(&format!("_p{province}"));
        }
        if let Some(year) = self.year {
            stem.push_str(&format!("_y{year}"));
        }
        stem
    }
}

/// Replaces characters that are not safe in file names.
pub fn sanitize_file_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

pub struct JsonArtifactSink<T> {
    dir: PathBuf,
    _record: PhantomData<fn(T)>,
}

impl<T: Artifact> JsonArtifactSink<T> {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            _record: PhantomData,
        })
    }
}

impl<T: Artifact> RecordSink for JsonArtifactSink<T> {
    type Record = T;

    fn write(&mut self, record: T) -> Result<()> {
        let stem = sanitize_file_stem(&record.artifact_stem());
        if stem.is_empty() {
            return Err(HarvestError::CollectorInvariant {
                collector: "json_artifacts",
                record: String::new(),
                reason: "artifact has no name",
            });
        }
        let content = serde_json::to_vec_pretty(&record).map_err(|source| {
            HarvestError::Serialize {
                what: stem.clone(),
                source,
            }
        })?;
        fs::write(self.dir.join(format!("{stem}.json")), content)?;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        info!("Artifacts written to {}", self.dir.display());
        Ok(())
    }
}

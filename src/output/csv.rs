//! CSV result sink

use crate::SearchItem;
use ::csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info};

use super::{OutputError, OutputResult, ResultSink};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// CSV row for one item
#[derive(Debug, Serialize)]
struct ItemRecord<'a> {
    kind: &'a str,
    id: &'a str,
    name: &'a str,
    owner: &'a str,
    url: &'a str,
    created_at: &'a str,
}

impl<'a> From<&'a SearchItem> for ItemRecord<'a> {
    fn from(item: &'a SearchItem) -> Self {
        Self {
            kind: item.kind.as_str(),
            id: &item.provider_id,
            name: &item.name,
            owner: item.owner.as_deref().unwrap_or(""),
            url: &item.url,
            created_at: item
                .metadata
                .get("created_at")
                .and_then(|v| v.as_str())
                .unwrap_or(""),
        }
    }
}

/// Writes one CSV row per item, flushed after every append.
pub struct CsvSink {
    writer: Writer<BufWriter<File>>,
    items_written: u64,
}

impl CsvSink {
    /// Create the file (and its parent directory), truncating any existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating CSV sink: path={}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {}", e)))?;
        }

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {}", e)))?;

        // Headers are written by csv::Writer on the first serialize()
        let writer = Writer::from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file));

        Ok(Self {
            writer,
            items_written: 0,
        })
    }
}

impl ResultSink for CsvSink {
    fn append(&mut self, item: &SearchItem) -> OutputResult<()> {
        self.writer
            .serialize(ItemRecord::from(item))
            .map_err(|e| OutputError::CsvError(format!("Failed to write item: {}", e)))?;
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e)))?;
        self.items_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e)))?;
        debug!(items = self.items_written, "CSV sink finalized");
        Ok(())
    }

    fn items_written(&self) -> u64 {
        self.items_written
    }
}

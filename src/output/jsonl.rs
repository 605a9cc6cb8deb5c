//! JSON lines result sink

use crate::SearchItem;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{OutputError, OutputResult, ResultSink};

/// Writes each item as one JSON object per line.
pub struct JsonLinesSink {
    writer: BufWriter<File>,
    items_written: u64,
}

impl JsonLinesSink {
    /// Create the file (and its parent directory), truncating any existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating JSON lines sink: path={}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {}", e)))?;
        }
        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {}", e)))?;

        Ok(Self {
            writer: BufWriter::new(file),
            items_written: 0,
        })
    }
}

impl ResultSink for JsonLinesSink {
    fn append(&mut self, item: &SearchItem) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, item)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .and_then(|_| self.writer.flush())
            .map_err(|e| OutputError::IoError(e.to_string()))?;
        self.items_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e)))?;
        debug!(items = self.items_written, "JSON lines sink finalized");
        Ok(())
    }

    fn items_written(&self) -> u64 {
        self.items_written
    }
}

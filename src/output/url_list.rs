//! Plain URL list sink, one URL per line, ready to feed to a secret scanner

use crate::SearchItem;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use super::{OutputError, OutputResult, ResultSink};

/// Writes each item's URL on its own line.
pub struct UrlListSink {
    writer: BufWriter<File>,
    items_written: u64,
}

impl UrlListSink {
    /// Create the file (and its parent directory), truncating any existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating URL list sink: path={}", path.display());

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

impl ResultSink for UrlListSink {
    fn append(&mut self, item: &SearchItem) -> OutputResult<()> {
        writeln!(self.writer, "{}", item.url)
            .and_then(|_| self.writer.flush())
            .map_err(|e| OutputError::IoError(e.to_string()))?;
        self.items_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e)))
    }

    fn items_written(&self) -> u64 {
        self.items_written
    }
}

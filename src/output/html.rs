//! Standalone HTML report sink
//!
//! The header goes out when the file is created and each item is appended as
//! a list entry, so a partial report is readable in a browser. `finalize`
//! closes the list and writes per-kind counts.

use crate::{SearchItem, SearchKind};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{OutputError, OutputResult, ResultSink};

const HEADER: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>slicehound results</title>
<style>
body { font-family: sans-serif; background: #0d1117; color: #c9d1d9; margin: 2em; }
a { color: #58a6ff; }
li { margin: 0.3em 0; }
.kind { display: inline-block; min-width: 7em; color: #8b949e; }
.owner { color: #8b949e; }
</style>
</head>
<body>
<h1>slicehound results</h1>
<ul>
"#;

/// Writes an HTML page listing every item.
pub struct HtmlSink {
    writer: BufWriter<File>,
    items_written: u64,
    by_kind: BTreeMap<SearchKind, u64>,
    closed: bool,
}

impl HtmlSink {
    /// Create the file (and its parent directory) and write the page header.
    pub fn create<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating HTML sink: path={}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {}", e)))?;
        }
        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {}", e)))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(HEADER.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| OutputError::IoError(e.to_string()))?;

        Ok(Self {
            writer,
            items_written: 0,
            by_kind: BTreeMap::new(),
            closed: false,
        })
    }
}

impl ResultSink for HtmlSink {
    fn append(&mut self, item: &SearchItem) -> OutputResult<()> {
        if self.closed {
            return Err(OutputError::IoError("HTML report already finalized".to_string()));
        }
        let owner = item
            .owner
            .as_deref()
            .map(|owner| format!(" <span class=\"owner\">{}</span>", escape_html(owner)))
            .unwrap_or_default();
        writeln!(
            self.writer,
            "<li><span class=\"kind\">{}</span><a href=\"{}\" target=\"_blank\">{}</a>{}</li>",
            item.kind,
            escape_html(&item.url),
            escape_html(&item.name),
            owner
        )
        .and_then(|_| self.writer.flush())
        .map_err(|e| OutputError::IoError(e.to_string()))?;

        *self.by_kind.entry(item.kind).or_default() += 1;
        self.items_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> OutputResult<()> {
        if self.closed {
            return Ok(());
        }
        let counts = self
            .by_kind
            .iter()
            .map(|(kind, count)| format!("{kind}: {count}"))
            .collect::<Vec<_>>()
            .join(" | ");
        write!(
            self.writer,
            "</ul>\n<p>{} items. {}</p>\n</body>\n</html>\n",
            self.items_written, counts
        )
        .and_then(|_| self.writer.flush())
        .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e)))?;
        self.closed = true;
        debug!(items = self.items_written, "HTML sink finalized");
        Ok(())
    }

    fn items_written(&self) -> u64 {
        self.items_written
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

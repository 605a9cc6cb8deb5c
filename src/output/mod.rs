//! Result sinks
//!
//! A [`ResultSink`] receives each newly discovered item exactly once, as soon
//! as the page carrying it arrives. Every file sink flushes after each append
//! so an interrupted run keeps everything recorded up to the last page.

use crate::SearchItem;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub mod csv;
pub mod html;
pub mod jsonl;
pub mod url_list;

pub use self::csv::CsvSink;
pub use html::HtmlSink;
pub use jsonl::JsonLinesSink;
pub use url_list::UrlListSink;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for discovered items.
pub trait ResultSink: Send {
    /// Record one new item.
    fn append(&mut self, item: &SearchItem) -> OutputResult<()>;

    /// Flush and close. Called once when the run ends, however it ends.
    fn finalize(&mut self) -> OutputResult<()>;

    /// Items appended so far.
    fn items_written(&self) -> u64;
}

/// File format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One CSV row per item
    #[default]
    Csv,
    /// One JSON object per line
    JsonLines,
    /// Plain list of URLs
    UrlList,
    /// Browsable HTML report
    Html,
    /// All of the above
    All,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "jsonl" | "json" | "ndjson" => Ok(Self::JsonLines),
            "txt" | "urls" => Ok(Self::UrlList),
            "html" => Ok(Self::Html),
            "all" => Ok(Self::All),
            _ => Err(format!(
                "Invalid output format: {s}. Valid options: csv, jsonl, txt, html, all"
            )),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::JsonLines => "jsonl",
            Self::UrlList => "txt",
            Self::Html => "html",
            Self::All => "all",
        })
    }
}

/// Open the sink(s) for `format`, deriving file names from `stem`.
///
/// `results` with `Csv` becomes `results.csv`; `All` writes the csv, jsonl,
/// txt and html files side by side.
pub fn open_sinks(stem: &Path, format: OutputFormat) -> OutputResult<Box<dyn ResultSink>> {
    let path = |ext: &str| -> PathBuf { stem.with_extension(ext) };
    let sink: Box<dyn ResultSink> = match format {
        OutputFormat::Csv => Box::new(CsvSink::create(path("csv"))?),
        OutputFormat::JsonLines => Box::new(JsonLinesSink::create(path("jsonl"))?),
        OutputFormat::UrlList => Box::new(UrlListSink::create(path("txt"))?),
        OutputFormat::Html => Box::new(HtmlSink::create(path("html"))?),
        OutputFormat::All => Box::new(MultiSink::new(vec![
            Box::new(CsvSink::create(path("csv"))?),
            Box::new(JsonLinesSink::create(path("jsonl"))?),
            Box::new(UrlListSink::create(path("txt"))?),
            Box::new(HtmlSink::create(path("html"))?),
        ])),
    };
    Ok(sink)
}

/// Fan-out to several sinks.
pub struct MultiSink {
    sinks: Vec<Box<dyn ResultSink>>,
    written: u64,
}

impl MultiSink {
    /// Wrap `sinks`; each append goes to every one in order.
    pub fn new(sinks: Vec<Box<dyn ResultSink>>) -> Self {
        Self { sinks, written: 0 }
    }
}

impl ResultSink for MultiSink {
    fn append(&mut self, item: &SearchItem) -> OutputResult<()> {
        for sink in &mut self.sinks {
            sink.append(item)?;
        }
        self.written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> OutputResult<()> {
        // Finalize every sink even if one fails, then report the first error.
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.finalize() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn items_written(&self) -> u64 {
        self.written
    }
}

/// In-memory sink whose contents stay readable through a shared handle.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    items: Arc<Mutex<Vec<SearchItem>>>,
    finalized: Arc<Mutex<bool>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Items appended so far.
    pub fn items(&self) -> Vec<SearchItem> {
        self.items.lock().map(|items| items.clone()).unwrap_or_default()
    }

    /// Whether `finalize` has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized.lock().map(|f| *f).unwrap_or(false)
    }
}

impl ResultSink for MemorySink {
    fn append(&mut self, item: &SearchItem) -> OutputResult<()> {
        self.items
            .lock()
            .map_err(|e| OutputError::IoError(e.to_string()))?
            .push(item.clone());
        Ok(())
    }

    fn finalize(&mut self) -> OutputResult<()> {
        *self
            .finalized
            .lock()
            .map_err(|e| OutputError::FlushError(e.to_string()))? = true;
        Ok(())
    }

    fn items_written(&self) -> u64 {
        self.items.lock().map(|items| items.len() as u64).unwrap_or(0)
    }
}

//! Credential source: token files and token directories

use super::credential::mask_secret;
use super::pool::CredentialError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Token prefixes the provider issues.
const KNOWN_PREFIXES: [&str; 2] = ["ghp_", "github_pat_"];

/// Load secrets from a file, or from every `*.txt` file in a directory.
///
/// Directory entries are read in file-name order. Blank lines and lines
/// starting with `#` are skipped; duplicates are dropped keeping the first
/// occurrence.
pub fn load_credentials(path: &Path) -> Result<Vec<String>, CredentialError> {
    let source_error = |message: String| CredentialError::Source {
        path: path.display().to_string(),
        message,
    };

    let files: Vec<PathBuf> = if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)
            .map_err(|e| source_error(e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut text = String::new();
    for file in &files {
        let contents = std::fs::read_to_string(file).map_err(|e| CredentialError::Source {
            path: file.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(file = %file.display(), "Reading credential file");
        text.push_str(&contents);
        text.push('\n');
    }

    let secrets = parse_credential_lines(&text);
    info!(
        source = %path.display(),
        files = files.len(),
        credentials = secrets.len(),
        "Loaded credentials"
    );
    Ok(secrets)
}

/// Extract secrets from newline-separated text.
pub fn parse_credential_lines(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut secrets = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !KNOWN_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
            warn!(credential = %mask_secret(line), "Unrecognized token format - using it anyway");
        }
        if seen.insert(line.to_string()) {
            secrets.push(line.to_string());
        }
    }
    secrets
}

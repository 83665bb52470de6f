use anyhow::{Result, Context};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub mod grobid;

pub use grobid::{ConversionError, ConversionOptions, ConversionReport, GrobidClient};

/// One TEI markup document as read from disk.
#[derive(Debug, Clone)]
pub struct TeiSource {
    pub source: String,
    pub markup: String,
    pub metadata: HashMap<String, String>,
}

/// Finds and reads TEI files produced by the conversion service.
#[derive(Debug, Default, Clone)]
pub struct TeiHandler;

impl TeiHandler {
    pub fn new() -> Self {
        Self
    }

    /// Expand directories into the `.xml` files below them, sorted by path.
    /// Plain file arguments are kept as given.
    pub fn discover<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            let input = input.as_ref();
            if input.is_file() {
                files.push(input.to_path_buf());
                continue;
            }
            if !input.is_dir() {
                anyhow::bail!("Input does not exist: {}", input.display());
            }

            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!("Skipping unreadable entry: {}", e);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| has_extension(path, "xml"))
                .collect();
            found.sort();
            debug!("Found {} TEI files in {}", found.len(), input.display());
            files.extend(found);
        }

        Ok(files)
    }

    pub async fn read(&self, path: &Path) -> Result<TeiSource> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read TEI file: {}", path.display()))?;

        let markup = decode(&bytes, path);

        let mut metadata = HashMap::new();
        metadata.insert("type".to_string(), "tei".to_string());
        metadata.insert("size".to_string(), bytes.len().to_string());

        Ok(TeiSource {
            source: path.display().to_string(),
            markup,
            metadata,
        })
    }

    pub async fn read_all(&self, paths: &[PathBuf]) -> Vec<Result<TeiSource>> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push(self.read(path).await);
        }
        results
    }
}

/// Decode honoring a byte-order mark, defaulting to UTF-8.
fn decode(bytes: &[u8], path: &Path) -> String {
    let encoding = match encoding_rs::Encoding::for_bom(bytes) {
        Some((encoding, _)) => encoding,
        None => encoding_rs::UTF_8,
    };

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!("Encoding errors detected in file: {}", path.display());
    }
    text.into_owned()
}

pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

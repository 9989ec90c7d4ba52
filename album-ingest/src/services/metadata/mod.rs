//! Per-file metadata extraction
//!
//! Sources are tried in order. Each later source only fills fields that the
//! earlier ones left empty, and audio properties come from the first source
//! able to read the container.

mod filename_source;
mod tag_source;

pub use filename_source::FilenameSource;
pub use tag_source::TagSource;

use crate::models::{AudioProperties, TagFields};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metadata extraction errors
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Container could not be parsed
    #[error("Failed to read container: {0}")]
    Unreadable(String),

    /// I/O error (file read)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What one source could read from a file
#[derive(Debug, Clone, Default)]
pub struct SourceReading {
    pub tags: TagFields,
    /// Only sources that parse the container report properties
    pub properties: Option<AudioProperties>,
}

/// A strategy for reading descriptive metadata
pub trait MetadataSource: Send + Sync {
    /// Short name recorded in the catalog (`tags`, `filename`)
    fn name(&self) -> &'static str;

    fn read(&self, path: &Path) -> Result<SourceReading, MetadataError>;
}

/// Merged result of running every source
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub tags: TagFields,
    pub properties: Option<AudioProperties>,
    /// Sources that contributed at least one field
    pub sources: Vec<String>,
    /// Source name and error for each failed source
    pub errors: Vec<(String, String)>,
}

impl Extraction {
    /// Error reported by a specific source
    pub fn error_from(&self, source: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, message)| message.as_str())
    }
}

/// Ordered list of metadata sources
pub struct MetadataChain {
    sources: Vec<Box<dyn MetadataSource>>,
}

impl MetadataChain {
    pub fn new(sources: Vec<Box<dyn MetadataSource>>) -> Self {
        Self { sources }
    }

    /// Embedded tags first, then filename patterns relative to `root`
    pub fn standard(root: impl Into<PathBuf>) -> Self {
        Self::new(vec![
            Box::new(TagSource::new()),
            Box::new(FilenameSource::new(root)),
        ])
    }

    pub fn extract(&self, path: &Path) -> Extraction {
        let mut extraction = Extraction::default();

        for source in &self.sources {
            match source.read(path) {
                Ok(reading) => {
                    let before = extraction.tags.clone();
                    extraction.tags.fill_missing(&reading.tags);
                    if extraction.tags != before {
                        extraction.sources.push(source.name().to_string());
                    }
                    if extraction.properties.is_none() {
                        extraction.properties = reading.properties;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        file = %path.display(),
                        source = source.name(),
                        error = %e,
                        "Metadata source failed"
                    );
                    extraction.errors.push((source.name().to_string(), e.to_string()));
                }
            }
        }

        extraction
    }
}

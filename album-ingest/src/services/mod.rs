//! Pipeline components
//!
//! Scanning feeds the ephemeral catalog, grouping resolves album groups in
//! it, the processor stages each group, and the staging service drives review
//! and promotion against the durable store.

pub mod code_allocator;
pub mod content_scanner;
pub mod file_scanner;
pub mod grouping;
pub mod metadata;
pub mod processor;
pub mod promotion;
pub mod staging;

pub use code_allocator::{base_code, DirectoryCodeAllocator, DEFAULT_CODE_LENGTH};
pub use content_scanner::{ContentScanner, FileAnalyzer, ScanStats};
pub use file_scanner::{Discovery, FileScanner, ScanError, AUDIO_EXTENSIONS};
pub use grouping::{GroupingEngine, GroupingOutcome, UNKNOWN_ALBUM, UNKNOWN_ARTIST};
pub use metadata::{
    Extraction, FilenameSource, MetadataChain, MetadataError, MetadataSource, SourceReading,
    TagSource,
};
pub use processor::{ProcessOptions, Processor};
pub use promotion::PromotionEngine;
pub use staging::{StagedAlbum, StagingService};

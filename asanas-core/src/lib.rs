//! Asanas Core - pictogram catalog tooling
//!
//! # Pipeline
//! 1. Filenames carry name, variant and score
//! 2. Pictograms are 100x100 and monochrome
//! 3. A defective file reaches neither the catalog nor a sheet
//! 4. Sheets are laid out in input order

pub mod catalog;
pub mod compositor;
pub mod config;
pub mod filename;
pub mod hashing;
pub mod pipeline;
pub mod print;
pub mod routine;
pub mod text;
pub mod validation;

pub use catalog::{CatalogError, CatalogStore, EntityKind, EntityRef, MemoryCatalog};
pub use compositor::{
    layout, wrap_caption, Compositor, ContactSheet, SheetEntry, SheetError, SheetPage,
};
pub use config::{Config, SheetLayout};
pub use filename::{decode, decode_key, encode, NamingMode, ParsedFilename};
pub use hashing::{canonical_json, compute_manifest_hash, sha256_hex};
pub use pipeline::{
    open_catalog, save_catalog, CatalogPipeline, CheckedPictogram, DirectoryNameTags,
    ImportManifest, ImportOptions, PipelineError, TablesOutcome, TagSource,
};
pub use print::{OutputFormat, PrintSpec, SheetWriter};
pub use text::{SheetFont, TextError};
pub use validation::{Defect, DefectKind, ValidationReport, ValidationRule, Validator};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

//! Catalog Pipeline - Single Entry Point
//!
//! Every pictogram that reaches the catalog or a contact sheet passes
//! through `check_file`, which always decodes the filename and validates the
//! image. A file with any defect goes no further.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::catalog::{CatalogError, CatalogStore, EntityRef, MemoryCatalog, Picture};
use crate::compositor::{self, ContactSheet, SheetEntry, SheetError};
use crate::config::Config;
use crate::filename::{self, NamingMode, ParsedFilename};
use crate::hashing::{compute_manifest_hash, sha256_hex};
use crate::validation::{Defect, ValidationReport, Validator};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Contact sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

/// Maps the directory holding a pictogram to the tag it is filed under
pub trait TagSource {
    fn tag_for(&self, dir: &Path) -> Option<String>;
}

/// Tags each pictogram with the name of its containing directory
pub struct DirectoryNameTags;

impl TagSource for DirectoryNameTags {
    fn tag_for(&self, dir: &Path) -> Option<String> {
        dir.file_name().map(|n| n.to_string_lossy().into_owned())
    }
}

impl TagSource for BTreeMap<PathBuf, String> {
    fn tag_for(&self, dir: &Path) -> Option<String> {
        self.get(dir).cloned()
    }
}

impl<F> TagSource for F
where
    F: Fn(&Path) -> Option<String>,
{
    fn tag_for(&self, dir: &Path) -> Option<String> {
        self(dir)
    }
}

/// One pictogram after filename decoding and validation
#[derive(Debug, Clone)]
pub struct CheckedPictogram {
    pub path: PathBuf,
    pub parsed: ParsedFilename,
    pub report: ValidationReport,
    pub image: Option<DynamicImage>,
    pub bytes: Vec<u8>,
}

impl CheckedPictogram {
    pub fn is_valid(&self) -> bool {
        self.report.is_accepted()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Report only; nothing is written to disk or to the store.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedForm {
    pub source: PathBuf,
    pub name: String,
    pub variant: u32,
    pub score: u32,
    pub tag: Option<String>,
    pub stored: PathBuf,
    pub sha256: String,
    pub form: Option<EntityRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportManifest {
    pub run_id: String,
    pub engine_version: String,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub score_name: String,
    pub imported: Vec<ImportedForm>,
    pub rejected: Vec<ValidationReport>,
    pub manifest_hash: String,
}

/// Result of the contact-sheet tool: either every file passed or nothing
/// is laid out.
#[derive(Debug)]
pub enum TablesOutcome {
    Rejected(Vec<ValidationReport>),
    Composed(ContactSheet),
}

pub struct CatalogPipeline {
    config: Config,
    validator: Validator,
}

impl CatalogPipeline {
    pub fn new(config: Config) -> Self {
        let validator = Validator::new(&config.validation);
        Self { config, validator }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validates the image only; the filename is not inspected.
    pub fn check_image(&self, path: &Path) -> ValidationReport {
        let source = path.display().to_string();
        let mut report = ValidationReport::new(source.as_str());
        match read_image(path) {
            Ok((_, image)) => report.defects.extend(self.validator.validate(&source, &image).defects),
            Err(defect) => report.push(defect),
        }
        report
    }

    /// Decodes the filename and validates the image. Never fails: problems
    /// are reported as defects.
    pub fn check_file(&self, path: &Path, mode: NamingMode) -> CheckedPictogram {
        let source = path.display().to_string();
        let parsed = filename::decode(&source, mode);

        let mut report = ValidationReport::new(source.as_str());
        report.defects.extend(parsed.defects.iter().cloned());

        let (bytes, image) = match read_image(path) {
            Ok((bytes, image)) => {
                report.defects.extend(self.validator.validate(&source, &image).defects);
                (bytes, Some(image))
            }
            Err(defect) => {
                report.push(defect);
                (vec![], None)
            }
        };

        tracing::debug!(file = %source, defects = report.defects.len(), "checked pictogram");
        CheckedPictogram { path: path.to_path_buf(), parsed, report, image, bytes }
    }

    /// Checks every visible `.png` under `dir`, in lexical order.
    pub fn scan(&self, dir: &Path, mode: NamingMode) -> Result<Vec<CheckedPictogram>, PipelineError> {
        Ok(pictogram_paths(dir)?
            .iter()
            .map(|p| self.check_file(p, mode))
            .collect())
    }

    /// Image checks for a single file or a whole directory tree
    pub fn check_path(&self, path: &Path) -> Result<Vec<ValidationReport>, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::NotFound(path.to_path_buf()));
        }
        if path.is_dir() {
            Ok(pictogram_paths(path)?.iter().map(|p| self.check_image(p)).collect())
        } else {
            Ok(vec![self.check_image(path)])
        }
    }

    /// Bulk import of a directory tree into `store`.
    ///
    /// Defective files are skipped and listed in the manifest. Store errors
    /// abort the run.
    #[tracing::instrument(skip(self, dir, store, tags), fields(dir = %dir.display()))]
    pub fn import_dir<S: CatalogStore + ?Sized>(
        &self,
        dir: &Path,
        store: &mut S,
        tags: &dyn TagSource,
        options: ImportOptions,
    ) -> Result<ImportManifest, PipelineError> {
        require_dir(dir)?;
        let settings = &self.config.import;
        let upload_dir = settings.upload_dir();

        let target = if options.dry_run {
            None
        } else {
            fs::create_dir_all(&upload_dir).map_err(|e| PipelineError::io(&upload_dir, e))?;
            let owner = store.earliest_superuser()?;
            let score = store.get_or_create_score(
                &settings.score_name,
                settings.score_min,
                settings.score_max,
                owner,
            )?;
            Some((owner, score))
        };

        let mut manifest = ImportManifest {
            run_id: Uuid::new_v4().to_string(),
            engine_version: ENGINE_VERSION.to_string(),
            started_at: Utc::now(),
            dry_run: options.dry_run,
            score_name: settings.score_name.clone(),
            imported: vec![],
            rejected: vec![],
            manifest_hash: String::new(),
        };

        for checked in self.scan(dir, NamingMode::Import)? {
            if !checked.is_valid() {
                tracing::warn!(file = %checked.path.display(), defects = checked.report.defects.len(), "rejected");
                manifest.rejected.push(checked.report);
                continue;
            }
            let (Some(variant), Some(score), Some(image)) =
                (checked.parsed.variant, checked.parsed.score, checked.image.as_ref())
            else {
                continue;
            };

            let name = checked.parsed.name.clone();
            if !(settings.score_min..=settings.score_max).contains(&score) {
                tracing::warn!(%name, score, "{} outside {}..={}", settings.score_name, settings.score_min, settings.score_max);
            }

            let stored = upload_dir.join(filename::encode(&name, variant));
            let tag = checked.path.parent().and_then(|d| tags.tag_for(d));
            let sha256 = sha256_hex(&checked.bytes);

            let form = match target {
                Some((owner, score_id)) => {
                    // Staged beside the target; dropped unless the store takes the form.
                    let staged = stage_file(&upload_dir, &checked.bytes)?;
                    let asana = store.get_or_create_asana(&name)?;
                    let form = store.add_form(asana, variant, Picture {
                        path: stored.clone(),
                        width: image.width(),
                        height: image.height(),
                        sha256: sha256.clone(),
                    })?;
                    staged
                        .persist(&stored)
                        .map_err(|e| PipelineError::io(&stored, e.error))?;
                    if let Some(tag) = &tag {
                        store.get_or_create_tag(tag, form, owner)?;
                    }
                    store.get_or_create_scored_value(score_id, form, score)?;
                    Some(form)
                }
                None => None,
            };

            tracing::debug!(%name, variant, stored = %stored.display(), "imported");
            manifest.imported.push(ImportedForm {
                source: checked.path,
                name,
                variant,
                score,
                tag,
                stored,
                sha256,
                form,
            });
        }

        manifest.manifest_hash = compute_manifest_hash(&manifest)?;
        tracing::info!(
            imported = manifest.imported.len(),
            rejected = manifest.rejected.len(),
            dry_run = options.dry_run,
            "import finished"
        );
        Ok(manifest)
    }

    /// Lays out every pictogram under `dir` on contact-sheet pages, captioned
    /// with its display name. Any defect anywhere cancels the layout.
    #[tracing::instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub fn build_tables(&self, dir: &Path) -> Result<TablesOutcome, PipelineError> {
        require_dir(dir)?;
        let checked = self.scan(dir, NamingMode::Table)?;

        let rejected: Vec<ValidationReport> = checked
            .iter()
            .filter(|c| !c.is_valid())
            .map(|c| c.report.clone())
            .collect();
        if !rejected.is_empty() {
            tracing::warn!(files = rejected.len(), "defects found, no sheet produced");
            return Ok(TablesOutcome::Rejected(rejected));
        }

        let entries = checked.into_iter().filter_map(|c| {
            let caption = c.parsed.display_name();
            c.image.map(|image| SheetEntry { image, caption })
        });
        let sheet = compositor::layout(entries, &self.config.sheet)?;
        tracing::info!(pages = sheet.pages.len(), images = sheet.image_count, "sheet composed");
        Ok(TablesOutcome::Composed(sheet))
    }
}

impl Default for CatalogPipeline {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Reads a catalog written by `save_catalog`; a missing file is an empty catalog.
pub fn open_catalog(path: &Path) -> Result<MemoryCatalog, PipelineError> {
    if !path.exists() {
        return Ok(MemoryCatalog::new());
    }
    let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Replaces `path` with the catalog as JSON in one rename.
pub fn save_catalog(catalog: &MemoryCatalog, path: &Path) -> Result<(), PipelineError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, catalog)?;
    tmp.flush().map_err(|e| PipelineError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| PipelineError::io(path, e.error))?;
    Ok(())
}

fn stage_file(dir: &Path, bytes: &[u8]) -> Result<NamedTempFile, PipelineError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| PipelineError::io(tmp.path(), e))?;
    Ok(tmp)
}

fn require_dir(dir: &Path) -> Result<(), PipelineError> {
    if !dir.exists() {
        return Err(PipelineError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(PipelineError::NotADirectory(dir.to_path_buf()));
    }
    Ok(())
}

/// Visible `.png` files under `dir`, sorted by name at every level
fn pictogram_paths(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut paths = vec![];
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || !name.ends_with(".png") {
            continue;
        }
        paths.push(entry.into_path());
    }
    Ok(paths)
}

fn read_image(path: &Path) -> Result<(Vec<u8>, DynamicImage), Defect> {
    let source = path.display().to_string();
    let bytes = fs::read(path).map_err(|e| Defect::unreadable(&source, e))?;
    let image = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| Defect::unreadable(&source, e))?
        .decode()
        .map_err(|e| Defect::unreadable(&source, e))?;
    Ok((bytes, image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::DefectKind;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, px: [u8; 3], size: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(size, size, Rgb(px)).save(&path).unwrap();
        path
    }

    #[test]
    fn check_file_collects_name_and_content_defects() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "tree__x.png", [1, 2, 3], 50);

        let checked = CatalogPipeline::default().check_file(&path, NamingMode::Import);
        let kinds: Vec<_> = checked.report.defects.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DefectKind::Filename, DefectKind::Size, DefectKind::Monochrome]);
    }

    #[test]
    fn corrupt_file_is_unreadable_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree_0__1.png");
        fs::write(&path, b"not a png").unwrap();

        let checked = CatalogPipeline::default().check_file(&path, NamingMode::Import);
        assert!(checked.report.has(DefectKind::Unreadable));
        assert!(checked.image.is_none());
    }

    #[test]
    fn scan_skips_hidden_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "b_0__1.png", [0, 0, 0], 100);
        write_png(dir.path(), "a_0__1.png", [0, 0, 0], 100);
        write_png(dir.path(), ".hidden_0__1.png", [0, 0, 0], 100);
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("c_0__1.PNG"), "x").unwrap();

        let checked = CatalogPipeline::default().scan(dir.path(), NamingMode::Import).unwrap();
        let names: Vec<_> = checked.iter().map(|c| c.parsed.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn check_path_accepts_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "no convention.png", [9, 9, 9], 100);
        let reports = CatalogPipeline::default().check_path(&path).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_accepted());

        let missing = CatalogPipeline::default().check_path(&dir.path().join("nope"));
        assert!(matches!(missing, Err(PipelineError::NotFound(_))));
    }

    #[test]
    fn closure_and_map_tag_sources() {
        let by_closure = |_: &Path| Some("fixed".to_string());
        assert_eq!(by_closure.tag_for(Path::new("/x/y")).as_deref(), Some("fixed"));

        let mut map = BTreeMap::new();
        map.insert(PathBuf::from("/pict/standing"), "Standing".to_string());
        assert_eq!(map.tag_for(Path::new("/pict/standing")).as_deref(), Some("Standing"));
        assert_eq!(map.tag_for(Path::new("/pict/seated")), None);

        assert_eq!(DirectoryNameTags.tag_for(Path::new("/pict/seated")).as_deref(), Some("seated"));
    }
}

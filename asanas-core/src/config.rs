//! Configuration - JSON file with defaults for every field

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::print::PrintSpec;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid sheet layout: {0}")]
    Layout(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub sheet: SheetLayout,
    #[serde(default)]
    pub import: ImportSettings,
    #[serde(default)]
    pub routine: RoutineSettings,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.sheet.check()?;
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSettings {
    #[serde(default = "default_pict_size")]
    pub width: u32,
    #[serde(default = "default_pict_size")]
    pub height: u32,
}

fn default_pict_size() -> u32 { 100 }

impl Default for ValidationSettings {
    fn default() -> Self {
        Self { width: default_pict_size(), height: default_pict_size() }
    }
}

/// Contact sheet geometry, colours and text placement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetLayout {
    #[serde(default = "default_grid")]
    pub cols: u32,
    #[serde(default = "default_grid")]
    pub rows: u32,
    #[serde(default = "default_pict_size")]
    pub cell_width: u32,
    #[serde(default = "default_pict_size")]
    pub image_height: u32,
    #[serde(default = "default_strip")]
    pub caption_height: u32,
    #[serde(default = "default_strip")]
    pub spine_width: u32,
    #[serde(default = "default_strip")]
    pub header_height: u32,
    #[serde(default = "default_caption_offset")]
    pub caption_offset: [u32; 2],
    #[serde(default = "default_caption_wrap")]
    pub caption_wrap: usize,
    #[serde(default = "default_caption_limit")]
    pub caption_limit: usize,
    #[serde(default = "default_border_color")]
    pub border_color: [u8; 3],
    #[serde(default = "default_background")]
    pub background: [u8; 3],
    #[serde(default = "default_ink")]
    pub ink: [u8; 3],
    /// TrueType/OpenType file for sheet text; the built-in font when unset
    #[serde(default)]
    pub font: Option<PathBuf>,
    #[serde(default = "default_small_text")]
    pub caption_font_size: f32,
    #[serde(default = "default_small_text")]
    pub index_font_size: f32,
    #[serde(default = "default_page_number_size")]
    pub page_number_font_size: f32,
    #[serde(default)]
    pub output: PrintSpec,
}

fn default_grid() -> u32 { 6 }
fn default_strip() -> u32 { 25 }
fn default_caption_offset() -> [u32; 2] { [5, 102] }
fn default_caption_wrap() -> usize { 17 }
fn default_caption_limit() -> usize { 18 }
fn default_border_color() -> [u8; 3] { [125, 125, 125] }
fn default_background() -> [u8; 3] { [255, 255, 255] }
fn default_ink() -> [u8; 3] { [0, 0, 0] }
fn default_small_text() -> f32 { 8.0 }
fn default_page_number_size() -> f32 { 16.0 }

/// Largest page side, in pixels, a layout may produce
pub const MAX_PAGE_SIDE: u32 = 16_384;

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            cols: default_grid(),
            rows: default_grid(),
            cell_width: default_pict_size(),
            image_height: default_pict_size(),
            caption_height: default_strip(),
            spine_width: default_strip(),
            header_height: default_strip(),
            caption_offset: default_caption_offset(),
            caption_wrap: default_caption_wrap(),
            caption_limit: default_caption_limit(),
            border_color: default_border_color(),
            background: default_background(),
            ink: default_ink(),
            font: None,
            caption_font_size: default_small_text(),
            index_font_size: default_small_text(),
            page_number_font_size: default_page_number_size(),
            output: PrintSpec::default(),
        }
    }
}

impl SheetLayout {
    // Geometry saturates; `check` rejects layouts where that would matter.
    pub fn cell_height(&self) -> u32 {
        self.image_height.saturating_add(self.caption_height)
    }

    pub fn cells_per_page(&self) -> usize {
        (self.cols as usize).saturating_mul(self.rows as usize)
    }

    pub fn page_width(&self) -> u32 {
        self.cell_width.saturating_mul(self.cols).saturating_add(self.spine_width)
    }

    pub fn page_height(&self) -> u32 {
        self.cell_height().saturating_mul(self.rows).saturating_add(self.header_height)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(ConfigError::Layout("cols and rows must be at least 1".into()));
        }

        let cell_height = self.image_height.checked_add(self.caption_height);
        let width = self
            .cell_width
            .checked_mul(self.cols)
            .and_then(|w| w.checked_add(self.spine_width));
        let height = cell_height
            .and_then(|h| h.checked_mul(self.rows))
            .and_then(|h| h.checked_add(self.header_height));
        match (width, height) {
            (Some(w), Some(h)) if w <= MAX_PAGE_SIDE && h <= MAX_PAGE_SIDE => {}
            _ => {
                return Err(ConfigError::Layout(format!(
                    "page exceeds {0}x{0} pixels",
                    MAX_PAGE_SIDE
                )))
            }
        }

        if self.cell_width < 2 || self.cell_height() < 2 {
            return Err(ConfigError::Layout("cells must be at least 2x2 pixels".into()));
        }
        if self.caption_wrap == 0 {
            return Err(ConfigError::Layout("captionWrap must be at least 1".into()));
        }
        for (name, size) in [
            ("captionFontSize", self.caption_font_size),
            ("indexFontSize", self.index_font_size),
            ("pageNumberFontSize", self.page_number_font_size),
        ] {
            if !size.is_finite() || size <= 0.0 {
                return Err(ConfigError::Layout(format!("{} must be a positive number", name)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    #[serde(default = "default_score_name")]
    pub score_name: String,
    #[serde(default)]
    pub score_min: u32,
    #[serde(default = "default_score_max")]
    pub score_max: u32,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_upload_to")]
    pub upload_to: PathBuf,
}

fn default_score_name() -> String { "difficulty".to_string() }
fn default_score_max() -> u32 { 40 }
fn default_owner() -> String { "admin".to_string() }
fn default_media_root() -> PathBuf { PathBuf::from("media") }
fn default_upload_to() -> PathBuf { PathBuf::from("asana/pict") }

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            score_name: default_score_name(),
            score_min: 0,
            score_max: default_score_max(),
            owner: default_owner(),
            media_root: default_media_root(),
            upload_to: default_upload_to(),
        }
    }
}

impl ImportSettings {
    pub fn upload_dir(&self) -> PathBuf {
        self.media_root.join(&self.upload_to)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Abbreviation {
    pub short: String,
    pub full: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineSettings {
    #[serde(default = "default_morning")]
    pub morning: String,
    #[serde(default = "default_evening")]
    pub evening: String,
    #[serde(default = "default_abbreviations")]
    pub abbreviations: Vec<Abbreviation>,
}

fn default_morning() -> String { "06:00".to_string() }
fn default_evening() -> String { "19:30".to_string() }

fn default_abbreviations() -> Vec<Abbreviation> {
    [
        ("СН", "Сурья Намаскар"),
        ("ИС", "Инструктор-стажер"),
        ("CTC", "Стажерская тестовая серия"),
        ("ПП", "Перевернутые позиции"),
        ("АПЖ", "Атлетик: плоский живот"),
    ]
    .into_iter()
    .map(|(short, full)| Abbreviation { short: short.to_string(), full: full.to_string() })
    .collect()
}

impl Default for RoutineSettings {
    fn default() -> Self {
        Self {
            morning: default_morning(),
            evening: default_evening(),
            abbreviations: default_abbreviations(),
        }
    }
}

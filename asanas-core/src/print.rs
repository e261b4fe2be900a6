//! Sheet Output
//!
//! Writes finished contact-sheet pages as numbered raster files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::compositor::{ContactSheet, SheetPage};
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

/// How pages are named and encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintSpec {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
}

fn default_prefix() -> String { "test".to_string() }
fn default_quality() -> u8 { 90 }

impl Default for PrintSpec {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            format: OutputFormat::default(),
            jpeg_quality: default_quality(),
        }
    }
}

impl PrintSpec {
    pub fn file_name(&self, page_number: u32) -> String {
        format!("{}_{}.{}", self.prefix, page_number, self.format.extension())
    }
}

pub struct SheetWriter {
    out_dir: PathBuf,
    spec: PrintSpec,
}

impl SheetWriter {
    pub fn new(out_dir: impl Into<PathBuf>, spec: PrintSpec) -> Self {
        Self { out_dir: out_dir.into(), spec }
    }

    pub fn page_path(&self, page_number: u32) -> PathBuf {
        self.out_dir.join(self.spec.file_name(page_number))
    }

    /// Writes every page, returning the paths in page order
    pub fn write_all(&self, sheet: &ContactSheet) -> Result<Vec<PathBuf>, PipelineError> {
        fs::create_dir_all(&self.out_dir).map_err(|e| PipelineError::io(&self.out_dir, e))?;

        let mut written = Vec::with_capacity(sheet.pages.len());
        for page in &sheet.pages {
            let path = self.page_path(page.number);
            self.write_page(page, &path)?;
            tracing::info!(page = page.number, path = %path.display(), "wrote sheet page");
            written.push(path);
        }
        Ok(written)
    }

    fn write_page(&self, page: &SheetPage, path: &Path) -> Result<(), PipelineError> {
        // Pages are opaque; JPEG has no alpha channel anyway.
        let rgb = DynamicImage::ImageRgba8(page.canvas.clone()).to_rgb8();
        match self.spec.format {
            OutputFormat::Jpg => {
                let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
                let mut out = BufWriter::new(file);
                let encoder = JpegEncoder::new_with_quality(&mut out, self.spec.jpeg_quality);
                rgb.write_with_encoder(encoder)?;
                out.flush().map_err(|e| PipelineError::io(path, e))?;
            }
            OutputFormat::Png => {
                rgb.save_with_format(path, ImageFormat::Png)?;
            }
        }
        Ok(())
    }
}

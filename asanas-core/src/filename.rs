//! Filename Codec
//!
//! Pictograms are named `<name>_<variant>__<score>.png`. The score is split
//! off at the last `__`, the variant at the last remaining `_`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::validation::{Defect, DefectKind};

/// Which tool is reading the name.
///
/// Import keeps the bare canonical name as the storage key. Table captions
/// carry the variant number when it is non-zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NamingMode {
    #[default]
    Import,
    Table,
}

impl NamingMode {
    fn score_label(self) -> &'static str {
        match self {
            NamingMode::Import => "difficulty",
            NamingMode::Table => "complexity",
        }
    }

    fn variant_label(self) -> &'static str {
        match self {
            NamingMode::Import => "variant",
            NamingMode::Table => "version",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedFilename {
    pub filename: String,
    pub mode: NamingMode,
    pub name: String,
    pub variant: Option<u32>,
    pub score: Option<u32>,
    pub defects: Vec<Defect>,
}

impl ParsedFilename {
    fn empty(filename: &str, mode: NamingMode) -> Self {
        Self {
            filename: filename.to_string(),
            mode,
            name: String::new(),
            variant: None,
            score: None,
            defects: vec![],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.defects.is_empty()
    }

    /// Caption text; table mode appends a non-zero variant.
    pub fn display_name(&self) -> String {
        match (self.mode, self.variant) {
            (NamingMode::Table, Some(v)) if v > 0 => format!("{} {}", self.name, v),
            _ => self.name.clone(),
        }
    }

    /// Storage key for a fully parsed name
    pub fn storage_key(&self) -> Option<String> {
        self.variant.filter(|_| self.is_valid()).map(|v| encode(&self.name, v))
    }
}

/// Parses a pictogram filename.
///
/// `path` may carry directories; only the final component is parsed. The
/// defect message quotes `path` as given.
pub fn decode(path: &str, mode: NamingMode) -> ParsedFilename {
    let mut info = ParsedFilename::empty(path, mode);
    let base = base_token(path);

    let Some((rest, score)) = split_number(base, "__") else {
        info.defects.push(Defect::new(
            DefectKind::Filename,
            format!("{}: {} not specified or wrong type", path, mode.score_label()),
        ));
        return info;
    };
    info.score = Some(score);

    let Some((name, variant)) = split_number(rest, "_") else {
        info.defects.push(Defect::new(
            DefectKind::Filename,
            format!("{}: {} not specified or wrong type", path, mode.variant_label()),
        ));
        return info;
    };

    info.name = canonical_name(name);
    info.variant = Some(variant);
    info
}

/// Storage key for a form: `<name>_<variant>.png`. The score is not kept.
pub fn encode(name: &str, variant: u32) -> String {
    format!("{}_{}.png", name, variant)
}

/// Parses a storage key produced by [`encode`].
pub fn decode_key(key: &str) -> Option<(String, u32)> {
    let (name, variant) = split_number(base_token(key), "_")?;
    Some((canonical_name(name), variant))
}

fn base_token(path: &str) -> &str {
    let file = Path::new(path)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(path);
    file.strip_suffix(".png").unwrap_or(file)
}

fn split_number<'a>(token: &'a str, sep: &str) -> Option<(&'a str, u32)> {
    let (left, right) = token.rsplit_once(sep)?;
    let n = right.trim().parse::<u32>().ok()?;
    Some((left, n))
}

fn canonical_name(raw: &str) -> String {
    title_case(&raw.replace('_', " "))
}

/// Title-cases like the legacy tooling: a letter is upper-cased when the
/// character before it is not a cased letter, lower-cased otherwise. Digits
/// and punctuation therefore start new words (`"2nd"` becomes `"2Nd"`).
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        let cased = c.is_uppercase() || c.is_lowercase();
        if cased && !prev_cased {
            out.extend(c.to_uppercase());
        } else if cased {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        prev_cased = cased;
    }
    out
}

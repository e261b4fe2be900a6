//! Sheet text - captions, grid indices and page numbers
//!
//! Strings are shaped with parley and rasterised with vello_cpu, then
//! alpha-blended onto the page. A `SheetFont` is loaded once per sheet and
//! reused for every string drawn on it.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops, RgbaImage};
use parley::layout::PositionedLayoutItem;
use parley::style::{FontStack, StyleProperty};
use thiserror::Error;

/// DejaVu Sans Mono, used when no font file is configured
pub const BUILTIN_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSansMono.ttf");

#[derive(Debug, Error)]
pub enum TextError {
    #[error("Failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No font family found in {0}")]
    NoFamily(String),

    #[error("Font size must be finite and > 0, got {0}")]
    InvalidSize(f32),

    #[error("Text raster {width}x{height} exceeds the renderer limit")]
    TooLarge { width: u32, height: u32 },
}

/// RGBA8 brush carried through parley layouts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ink {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl From<[u8; 3]> for Ink {
    fn from(c: [u8; 3]) -> Self {
        Self { r: c[0], g: c[1], b: c[2], a: 255 }
    }
}

pub struct SheetFont {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<Ink>,
    family: String,
    data: vello_cpu::peniko::FontData,
}

impl SheetFont {
    /// Registers `bytes` as the only font; `origin` names it in errors.
    pub fn from_bytes(bytes: Vec<u8>, origin: &str) -> Result<Self, TextError> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family = families
            .first()
            .and_then(|(id, _)| font_ctx.collection.family_name(*id))
            .map(str::to_string)
            .ok_or_else(|| TextError::NoFamily(origin.to_string()))?;

        let data = vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0);
        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family,
            data,
        })
    }

    pub fn builtin() -> Result<Self, TextError> {
        Self::from_bytes(BUILTIN_FONT.to_vec(), "built-in font")
    }

    pub fn load(path: &Path) -> Result<Self, TextError> {
        let bytes = fs::read(path).map_err(|source| TextError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(bytes, &path.display().to_string())
    }

    /// The font at `path` when given, the built-in one otherwise
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, TextError> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin(),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    fn shape(&mut self, text: &str, size: f32, ink: Ink) -> Result<parley::Layout<Ink>, TextError> {
        if !size.is_finite() || size <= 0.0 {
            return Err(TextError::InvalidSize(size));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(StyleProperty::FontStack(FontStack::Source(Cow::Owned(
            self.family.clone(),
        ))));
        builder.push_default(StyleProperty::FontSize(size));
        builder.push_default(StyleProperty::Brush(ink));

        let mut layout: parley::Layout<Ink> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }

    /// Pixel extent of a single line of `text`
    pub fn measure(&mut self, text: &str, size: f32) -> Result<(u32, u32), TextError> {
        if text.is_empty() {
            return Ok((0, 0));
        }
        let layout = self.shape(text, size, Ink::default())?;
        Ok(extent(&layout))
    }

    /// Rasterises one line of `text` into a tight, straight-alpha image.
    pub fn render(&mut self, text: &str, size: f32, ink: [u8; 3]) -> Result<RgbaImage, TextError> {
        if text.is_empty() {
            return Ok(RgbaImage::new(0, 0));
        }
        let layout = self.shape(text, size, Ink::from(ink))?;
        let (w, h) = extent(&layout);
        let too_large = || TextError::TooLarge { width: w, height: h };
        let width: u16 = w.max(1).try_into().map_err(|_| too_large())?;
        let height: u16 = h.max(1).try_into().map_err(|_| too_large())?;

        let mut ctx = vello_cpu::RenderContext::new(width, height);
        for line in layout.lines() {
            for item in line.items() {
                let PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };

                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));

                let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&self.data)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
        ctx.flush();

        let mut pixmap = vello_cpu::Pixmap::new(width, height);
        ctx.render_to_pixmap(&mut pixmap);

        let pixels: Vec<u8> = pixmap
            .data_as_u8_slice()
            .chunks_exact(4)
            .flat_map(unpremultiply)
            .collect();
        RgbaImage::from_raw(u32::from(width), u32::from(height), pixels).ok_or_else(too_large)
    }

    /// Draws `text` with its top-left corner at (x, y). Lines split on `\n`
    /// are stacked one line height apart; anything off the canvas is clipped.
    pub fn draw(
        &mut self,
        canvas: &mut RgbaImage,
        x: i64,
        y: i64,
        text: &str,
        size: f32,
        ink: [u8; 3],
    ) -> Result<(), TextError> {
        let (_, line_height) = self.measure("0", size)?;
        let mut top = y;
        for line in text.split('\n') {
            let raster = self.render(line, size, ink)?;
            imageops::overlay(canvas, &raster, x, top);
            top += i64::from(line_height);
        }
        Ok(())
    }
}

fn extent(layout: &parley::Layout<Ink>) -> (u32, u32) {
    let mut w = 0.0f32;
    let mut h = 0.0f32;
    for line in layout.lines() {
        let m = line.metrics();
        w = w.max(m.advance);
        h += m.ascent + m.descent + m.leading;
    }
    (w.ceil() as u32, h.ceil() as u32)
}

fn unpremultiply(px: &[u8]) -> [u8; 4] {
    let a = px[3];
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let alpha = u16::from(a);
    let straight = |c: u8| ((u16::from(c) * 255 + alpha / 2) / alpha).min(255) as u8;
    [straight(px[0]), straight(px[1]), straight(px[2]), a]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn inked(img: &RgbaImage) -> usize {
        img.pixels().filter(|p| p[3] > 128).count()
    }

    #[test]
    fn builtin_font_has_a_family() {
        let font = SheetFont::builtin().unwrap();
        assert!(font.family().contains("DejaVu"));
    }

    #[test]
    fn measure_scales_with_text_and_size() {
        let mut font = SheetFont::builtin().unwrap();
        assert_eq!(font.measure("", 8.0).unwrap(), (0, 0));

        let (w1, h8) = font.measure("1", 8.0).unwrap();
        let (w2, _) = font.measure("12", 8.0).unwrap();
        let (_, h16) = font.measure("1", 16.0).unwrap();
        assert!(w1 > 0 && w2 > w1);
        assert!(h16 > h8);
    }

    #[test]
    fn render_produces_coverage_in_ink_colour() {
        let mut font = SheetFont::builtin().unwrap();
        let img = font.render("Tree 2", 16.0, [0, 0, 0]).unwrap();

        assert_eq!(img.dimensions(), font.measure("Tree 2", 16.0).unwrap());
        assert!(inked(&img) > 0);
        assert!(img.pixels().filter(|p| p[3] == 255).all(|p| p[0] < 8));
    }

    #[test]
    fn draw_blends_onto_canvas_and_clips() {
        let mut font = SheetFont::builtin().unwrap();
        let mut canvas = RgbaImage::from_pixel(60, 40, Rgba([255, 255, 255, 255]));
        font.draw(&mut canvas, 2, 2, "12\n34", 8.0, [0, 0, 0]).unwrap();
        font.draw(&mut canvas, 55, 35, "clipped", 8.0, [0, 0, 0]).unwrap();

        let dark = canvas.pixels().filter(|p| p[0] < 128).count();
        assert!(dark > 0);
        assert!(canvas.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn invalid_size_is_rejected() {
        let mut font = SheetFont::builtin().unwrap();
        assert!(matches!(font.measure("1", 0.0), Err(TextError::InvalidSize(_))));
        assert!(matches!(font.render("1", f32::NAN, [0, 0, 0]), Err(TextError::InvalidSize(_))));
    }

    #[test]
    fn unusable_font_files_are_errors() {
        let err = SheetFont::load(Path::new("/nonexistent/font.ttf")).err().unwrap();
        assert!(matches!(err, TextError::Io { .. }));

        let err = SheetFont::from_bytes(b"not a font".to_vec(), "junk").err().unwrap();
        assert!(matches!(err, TextError::NoFamily(ref o) if o == "junk"));
    }
}

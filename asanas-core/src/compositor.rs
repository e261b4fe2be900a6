//! Contact-Sheet Compositor
//!
//! Lays captioned pictograms out on numbered pages: a header row of column
//! indices, a spine of row indices and the page number in the corner.
//! Cells fill left to right, top to bottom, in input order.

use image::{imageops, DynamicImage, Rgba, RgbaImage};
use thiserror::Error;

use crate::config::{ConfigError, SheetLayout};
use crate::text::{SheetFont, TextError};

#[derive(Debug, Error)]
pub enum SheetError {
    #[error(transparent)]
    Layout(#[from] ConfigError),

    #[error("Sheet text failed: {0}")]
    Text(#[from] TextError),
}

pub struct SheetEntry {
    pub image: DynamicImage,
    pub caption: String,
}

#[derive(Debug, Clone)]
pub struct SheetPage {
    pub number: u32,
    pub canvas: RgbaImage,
    pub placed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ContactSheet {
    pub pages: Vec<SheetPage>,
    pub image_count: usize,
}

impl ContactSheet {
    pub fn page(&self, number: u32) -> Option<&SheetPage> {
        self.pages.iter().find(|p| p.number == number)
    }
}

/// Hard-wraps a long caption.
///
/// Captions longer than `limit` characters are cut every `width` characters,
/// each piece followed by `-` and a line break. Doubled hyphens are collapsed
/// as the text grows, and the hyphen after the final piece is dropped.
pub fn wrap_caption(caption: &str, width: usize, limit: usize) -> String {
    let chars: Vec<char> = caption.chars().collect();
    if chars.len() <= limit || width == 0 {
        return caption.to_string();
    }

    let mut wrapped = String::new();
    for chunk in chars.chunks(width) {
        wrapped.extend(chunk);
        wrapped.push_str("-\n");
        wrapped = wrapped.replace("--", "-");
    }

    let mut out = wrapped.trim().to_string();
    if out.ends_with('-') {
        out.pop();
    }
    out
}

/// Incremental page builder; holds at most one unfinished page.
pub struct Compositor<'a> {
    layout: &'a SheetLayout,
    font: SheetFont,
    blank: Option<RgbaImage>,
    current: Option<SheetPage>,
    pages: Vec<SheetPage>,
    next_number: u32,
    image_count: usize,
}

impl<'a> Compositor<'a> {
    /// Checks `layout` and loads the font it names.
    pub fn new(layout: &'a SheetLayout) -> Result<Self, SheetError> {
        let font = SheetFont::load_or_builtin(layout.font.as_deref())?;
        Self::with_font(layout, font)
    }

    pub fn with_font(layout: &'a SheetLayout, font: SheetFont) -> Result<Self, SheetError> {
        layout.check()?;
        Ok(Self {
            layout,
            font,
            blank: None,
            current: None,
            pages: vec![],
            next_number: 1,
            image_count: 0,
        })
    }

    pub fn push(&mut self, image: &DynamicImage, caption: &str) -> Result<(), SheetError> {
        let layout = self.layout;
        let mut page = match self.current.take() {
            Some(page) => page,
            None => {
                let number = self.next_number;
                self.next_number += 1;
                self.new_page(number)?
            }
        };

        let cols = layout.cols as usize;
        let (col, row) = ((page.placed % cols) as u32, (page.placed / cols) as u32);
        let x = layout.spine_width + col * layout.cell_width;
        let y = layout.header_height + row * layout.cell_height();

        let cell = compose_cell(layout, &mut self.font, image, caption)?;
        imageops::replace(&mut page.canvas, &cell, i64::from(x), i64::from(y));
        page.placed += 1;
        self.image_count += 1;

        if page.placed == layout.cells_per_page() {
            tracing::debug!(page = page.number, "sheet page full");
            self.pages.push(page);
        } else {
            self.current = Some(page);
        }
        Ok(())
    }

    pub fn finish(mut self) -> ContactSheet {
        if let Some(page) = self.current.take() {
            self.pages.push(page);
        }
        ContactSheet {
            pages: self.pages,
            image_count: self.image_count,
        }
    }

    fn new_page(&mut self, number: u32) -> Result<SheetPage, SheetError> {
        let layout = self.layout;
        let blank = match self.blank.take() {
            Some(blank) => blank,
            None => blank_page(layout, &mut self.font)?,
        };
        let mut canvas = blank.clone();
        self.blank = Some(blank);

        let label = number.to_string();
        let size = layout.page_number_font_size;
        let (tw, th) = self.font.measure(&label, size)?;
        let x = ((i64::from(layout.spine_width) - i64::from(tw)) / 2).max(0);
        let y = ((i64::from(layout.header_height) - i64::from(th)) / 2).max(0);
        self.font.draw(&mut canvas, x, y, &label, size, layout.ink)?;

        Ok(SheetPage { number, canvas, placed: 0 })
    }
}

/// Lays out all entries; the last page may be partially filled.
pub fn layout<I>(entries: I, layout: &SheetLayout) -> Result<ContactSheet, SheetError>
where
    I: IntoIterator<Item = SheetEntry>,
{
    let mut compositor = Compositor::new(layout)?;
    for entry in entries {
        compositor.push(&entry.image, &entry.caption)?;
    }
    Ok(compositor.finish())
}

fn rgba(c: [u8; 3]) -> Rgba<u8> {
    Rgba([c[0], c[1], c[2], 255])
}

/// Background with header and spine indices; shared by every page
fn blank_page(layout: &SheetLayout, font: &mut SheetFont) -> Result<RgbaImage, TextError> {
    let mut canvas = RgbaImage::from_pixel(
        layout.page_width(),
        layout.page_height(),
        rgba(layout.background),
    );
    let size = layout.index_font_size;

    for i in 0..layout.cols {
        let label = (i + 1).to_string();
        let (tw, th) = font.measure(&label, size)?;
        let cx = layout.spine_width + i * layout.cell_width + layout.cell_width / 2;
        let x = i64::from(cx) - i64::from(tw / 2);
        let y = (i64::from(layout.header_height) - i64::from(th)) / 2;
        font.draw(&mut canvas, x, y, &label, size, layout.ink)?;
    }

    for j in 0..layout.rows {
        let label = (j + 1).to_string();
        let (tw, th) = font.measure(&label, size)?;
        let cy = layout.header_height + j * layout.cell_height() + layout.cell_height() / 2;
        let x = (i64::from(layout.spine_width) - i64::from(tw)) / 2;
        let y = i64::from(cy) - i64::from(th / 2);
        font.draw(&mut canvas, x, y, &label, size, layout.ink)?;
    }

    Ok(canvas)
}

fn compose_cell(
    layout: &SheetLayout,
    font: &mut SheetFont,
    image: &DynamicImage,
    caption: &str,
) -> Result<RgbaImage, TextError> {
    let (w, h) = (layout.cell_width, layout.cell_height());
    let mut cell = RgbaImage::from_pixel(w, h, rgba(layout.background));

    // Oversized pictograms are clipped to the image area.
    let pict = image
        .crop_imm(0, 0, image.width().min(w), image.height().min(layout.image_height))
        .to_rgba8();
    imageops::overlay(&mut cell, &pict, 0, 0);

    let text = wrap_caption(caption, layout.caption_wrap, layout.caption_limit);
    font.draw(
        &mut cell,
        i64::from(layout.caption_offset[0]),
        i64::from(layout.caption_offset[1]),
        &text,
        layout.caption_font_size,
        layout.ink,
    )?;

    let border = rgba(layout.border_color);
    for y in 0..h {
        cell.put_pixel(0, y, border);
        cell.put_pixel(w - 1, y, border);
    }
    for x in 0..w {
        cell.put_pixel(x, 0, border);
        cell.put_pixel(x, h - 1, border);
    }

    Ok(cell)
}

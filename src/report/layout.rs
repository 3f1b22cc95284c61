//! Page layout for reports.
//!
//! [`layout`] turns a flat list of [`Line`]s into positioned [`Placement`]s
//! using only the page geometry constants below. There is no renderer state,
//! so identical input always yields identical page breaks.

/// A4 in PostScript points.
pub const PAGE_WIDTH: f64 = 595.2756;
pub const PAGE_HEIGHT: f64 = 841.8898;

pub const LEFT_MARGIN: f64 = 50.0;
pub const TOP_MARGIN: f64 = 50.0;
/// A page break happens once the cursor drops below this height.
pub const BOTTOM_MARGIN: f64 = 50.0;

pub const TOP_Y: f64 = PAGE_HEIGHT - TOP_MARGIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

/// One line of content and the vertical space it consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub font: Font,
    pub size: f64,
    pub advance: f64,
}

impl Line {
    pub fn new(text: impl Into<String>, font: Font, size: f64, advance: f64) -> Self {
        Self {
            text: text.into(),
            font,
            size,
            advance,
        }
    }

    /// Vertical gap with nothing drawn.
    pub fn spacer(advance: f64) -> Self {
        Self::new("", Font::Regular, 0.0, advance)
    }

    fn is_spacer(&self) -> bool {
        self.text.is_empty()
    }
}

/// A line fixed to a page and baseline position.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub font: Font,
    pub size: f64,
    pub text: String,
}

/// Place every line top to bottom, breaking pages at [`BOTTOM_MARGIN`].
pub fn layout(lines: &[Line]) -> Vec<Placement> {
    let mut placements = Vec::with_capacity(lines.len());
    let mut page = 0;
    let mut y = TOP_Y;

    for line in lines {
        if !line.is_spacer() {
            placements.push(Placement {
                page,
                x: LEFT_MARGIN,
                y,
                font: line.font,
                size: line.size,
                text: line.text.clone(),
            });
        }

        y -= line.advance;
        if y < BOTTOM_MARGIN {
            page += 1;
            y = TOP_Y;
        }
    }

    placements
}

/// Number of pages needed for `placements`, at least one.
pub fn page_count(placements: &[Placement]) -> usize {
    placements.iter().map(|p| p.page + 1).max().unwrap_or(1)
}

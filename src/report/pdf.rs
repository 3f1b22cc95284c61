//! Minimal PDF 1.4 writer for text-only pages.
//!
//! Output uses the standard Helvetica fonts (no embedding) and carries no
//! creation date or document id, so the bytes depend only on the placements.

use std::fmt::Write as _;

use super::layout::{page_count, Font, Placement, PAGE_HEIGHT, PAGE_WIDTH};

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const FONT_REGULAR_ID: usize = 3;
const FONT_BOLD_ID: usize = 4;
const FIRST_PAGE_ID: usize = 5;

struct PdfWriter {
    buf: Vec<u8>,
    /// Byte offset of each object, indexed by object id - 1.
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    fn object(&mut self, id: usize, body: &[u8]) {
        debug_assert_eq!(id, self.offsets.len() + 1, "objects must be written in id order");
        self.offsets.push(self.buf.len());
        self.buf.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, id: usize, content: &[u8]) {
        let mut body = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(b"\nendstream");
        self.object(id, &body);
    }

    fn finish(mut self) -> Vec<u8> {
        let xref_at = self.buf.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len() + 1);
        for offset in &self.offsets {
            let _ = writeln!(xref, "{offset:010} 00000 n ");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root {CATALOG_ID} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            self.offsets.len() + 1
        );
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}

/// Serialize placed text into a complete PDF document.
pub fn render(placements: &[Placement]) -> Vec<u8> {
    let pages = page_count(placements);
    let page_id = |page: usize| FIRST_PAGE_ID + 2 * page;

    let mut pdf = PdfWriter::new();

    pdf.object(
        CATALOG_ID,
        format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>").as_bytes(),
    );

    let kids: Vec<String> = (0..pages).map(|p| format!("{} 0 R", page_id(p))).collect();
    pdf.object(
        PAGES_ID,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {pages} >>",
            kids.join(" ")
        )
        .as_bytes(),
    );

    for (id, base) in [(FONT_REGULAR_ID, "Helvetica"), (FONT_BOLD_ID, "Helvetica-Bold")] {
        pdf.object(
            id,
            format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>"
            )
            .as_bytes(),
        );
    }

    for page in 0..pages {
        let content_id = page_id(page) + 1;
        pdf.object(
            page_id(page),
            format!(
                "<< /Type /Page /Parent {PAGES_ID} 0 R \
                 /MediaBox [0 0 {PAGE_WIDTH:.2} {PAGE_HEIGHT:.2}] \
                 /Resources << /Font << /F1 {FONT_REGULAR_ID} 0 R /F2 {FONT_BOLD_ID} 0 R >> >> \
                 /Contents {content_id} 0 R >>"
            )
            .as_bytes(),
        );

        let mut content = Vec::new();
        for p in placements.iter().filter(|p| p.page == page) {
            let font = match p.font {
                Font::Regular => "F1",
                Font::Bold => "F2",
            };
            content.extend_from_slice(
                format!("BT /{font} {:.1} Tf {:.2} {:.2} Td (", p.size, p.x, p.y).as_bytes(),
            );
            content.extend_from_slice(&escape_text(&p.text));
            content.extend_from_slice(b") Tj ET\n");
        }
        pdf.stream(content_id, &content);
    }

    pdf.finish()
}

/// Encode text as a PDF literal string body in WinAnsi.
///
/// Characters outside Latin-1 become `?`.
fn escape_text(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            ' '..='~' => out.push(c as u8),
            '\t' => out.push(b' '),
            '\u{a0}'..='\u{ff}' => out.extend_from_slice(format!("\\{:03o}", c as u32).as_bytes()),
            _ => out.push(b'?'),
        }
    }
    out
}

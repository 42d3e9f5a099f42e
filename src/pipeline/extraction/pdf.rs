use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

use super::fonts::{Glyph, PageFonts, PdfFont, FALLBACK_GLYPH_WIDTH};
use super::sanitize::sanitize_fragment;
use super::types::{PageResult, PageText, TextFragment, TextSource};
use super::UnreadableDocumentError;

/// US Letter height, used when a page carries no usable MediaBox.
const DEFAULT_PAGE_HEIGHT: f64 = 792.0;

/// A show operator starting this close (in ems) after the previous one on
/// the same baseline continues its word.
const GLUE_GAP: f64 = 0.15;

/// Up to this gap (in ems) it continues the same phrase after a space;
/// anything wider is a new cell.
const WORD_GAP: f64 = 1.0;

/// Estimated widths overshoot narrow glyphs; overlaps down to this (in ems)
/// still count as adjacent.
const OVERLAP_SLACK: f64 = 0.35;

/// TJ adjustments (thousandths of an em) at or beyond this gap read as a space.
const TJ_SPACE_THRESHOLD: f64 = 200.0;

/// Parent links followed when looking for an inherited MediaBox.
const MAX_INHERITANCE_DEPTH: usize = 16;

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Positioned text source backed by lopdf.
///
/// The document structure is parsed once on open; page content streams are
/// decoded one at a time as the page iterator advances.
pub struct PdfTextSource {
    doc: Document,
    pages: Vec<(u32, ObjectId)>,
}

impl PdfTextSource {
    pub fn open(bytes: &[u8]) -> Result<Self, UnreadableDocumentError> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| UnreadableDocumentError::Corrupt(e.to_string()))?;

        if doc.is_encrypted() {
            return Err(UnreadableDocumentError::Encrypted);
        }

        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        if pages.is_empty() {
            return Err(UnreadableDocumentError::NoPages);
        }

        tracing::debug!(pages = pages.len(), "PDF opened");
        Ok(Self { doc, pages })
    }

    fn extract_page(&self, number: u32, page_id: ObjectId) -> PageResult {
        let raw = self.doc.get_page_content(page_id).map_err(|e| {
            UnreadableDocumentError::Corrupt(format!("page {number}: {e}"))
        })?;
        let content = Content::decode(&raw).map_err(|e| {
            UnreadableDocumentError::Corrupt(format!("page {number}: {e}"))
        })?;

        let height = self.page_height(page_id);
        let fonts = PageFonts::load(&self.doc, page_id);
        let mut state = TextState::new(number, height).with_fonts(fonts);
        for op in &content.operations {
            state.apply(&op.operator, &op.operands);
        }

        Ok(PageText {
            number,
            fragments: state.fragments,
        })
    }

    /// Top edge of the page's MediaBox, following `Parent` links for
    /// inherited boxes.
    fn page_height(&self, page_id: ObjectId) -> f64 {
        let mut current = Some(page_id);
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let Some(id) = current else { break };
            let Ok(dict) = self.doc.get_object(id).and_then(Object::as_dict) else {
                break;
            };
            let top = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|media_box| self.resolve_array(media_box))
                .and_then(|corners| corners.get(3))
                .and_then(number);
            if let Some(top) = top {
                return top;
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }
        DEFAULT_PAGE_HEIGHT
    }

    fn resolve_array<'a>(&'a self, obj: &'a Object) -> Option<&'a Vec<Object>> {
        match obj {
            Object::Array(items) => Some(items),
            Object::Reference(id) => self.doc.get_object(*id).and_then(Object::as_array).ok(),
            _ => None,
        }
    }
}

impl TextSource for PdfTextSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn pages(&self) -> Box<dyn Iterator<Item = PageResult> + '_> {
        Box::new(
            self.pages
                .iter()
                .map(move |&(number, id)| self.extract_page(number, id)),
        )
    }
}

// ---------------------------------------------------------------------------
// Text state machine
// ---------------------------------------------------------------------------

/// Graphics and text state needed to place show-text operators on the page.
struct TextState {
    page: u32,
    page_height: f64,
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font_size: f64,
    leading: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    fonts: PageFonts,
    font: Option<Vec<u8>>,
    fragments: Vec<TextFragment>,
    /// Where the last emitted fragment ends, for joining the next one.
    tail: Option<Tail>,
}

#[derive(Debug, Clone, Copy)]
struct Tail {
    x_start: f64,
    x_end: f64,
    y: f64,
    em: f64,
    trailing_space: bool,
}

impl TextState {
    fn new(page: u32, page_height: f64) -> Self {
        Self {
            page,
            page_height,
            ctm: IDENTITY,
            ctm_stack: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            font_size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            fonts: PageFonts::default(),
            font: None,
            fragments: Vec::new(),
            tail: None,
        }
    }

    fn with_fonts(mut self, fonts: PageFonts) -> Self {
        self.fonts = fonts;
        self
    }

    /// Apply one content-stream operator. Operators with malformed operands
    /// are ignored.
    fn apply(&mut self, operator: &str, operands: &[Object]) {
        match operator {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.ctm_stack.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operand(operands) {
                    self.ctm = multiply(&m, &self.ctm);
                }
            }
            "BT" => {
                self.tm = IDENTITY;
                self.tlm = IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.font = Some(name.clone());
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    self.font_size = size;
                }
            }
            "TL" => {
                if let Some(l) = operands.first().and_then(number) {
                    self.leading = l;
                }
            }
            "Tc" => {
                if let Some(v) = operands.first().and_then(number) {
                    self.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = operands.first().and_then(number) {
                    self.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = operands.first().and_then(number) {
                    self.horizontal_scale = v / 100.0;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    self.move_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    self.leading = -ty;
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = matrix_operand(operands) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(bytes) = operands.first().and_then(string_bytes) {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line();
                if let Some(bytes) = operands.first().and_then(string_bytes) {
                    self.show(bytes);
                }
            }
            "\"" => {
                if let Some(aw) = operands.first().and_then(number) {
                    self.word_spacing = aw;
                }
                if let Some(ac) = operands.get(1).and_then(number) {
                    self.char_spacing = ac;
                }
                self.next_line();
                if let Some(bytes) = operands.get(2).and_then(string_bytes) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    self.show_array(items);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn current_font(&self) -> Option<&PdfFont> {
        self.font.as_deref().and_then(|name| self.fonts.get(name))
    }

    /// Glyphs of a string operand under the current font. Without a known
    /// font every byte is one glyph of estimated width.
    fn glyphs(&self, bytes: &[u8]) -> Vec<Glyph> {
        match self.current_font() {
            Some(font) => font.decode(bytes),
            None => decode_pdf_string(bytes)
                .chars()
                .map(|c| Glyph {
                    text: c.to_string(),
                    width: FALLBACK_GLYPH_WIDTH,
                    word_space: c == ' ',
                })
                .collect(),
        }
    }

    fn show(&mut self, bytes: &[u8]) {
        let glyphs = self.glyphs(bytes);
        let text: String = glyphs.iter().map(|g| g.text.as_str()).collect();
        let advance = self.advance_for(&glyphs);
        self.emit(&text, advance);
        self.translate_text(advance);
    }

    /// A TJ array becomes one fragment; wide negative kerning reads as a space.
    fn show_array(&mut self, items: &[Object]) {
        let mut text = String::new();
        let mut advance = 0.0;
        for item in items {
            if let Some(bytes) = string_bytes(item) {
                let glyphs = self.glyphs(bytes);
                advance += self.advance_for(&glyphs);
                text.extend(glyphs.iter().map(|g| g.text.as_str()));
            } else if let Some(adjust) = number(item) {
                if adjust <= -TJ_SPACE_THRESHOLD && !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
                advance -= adjust / 1000.0 * self.font_size * self.horizontal_scale;
            }
        }
        self.emit(&text, advance);
        self.translate_text(advance);
    }

    /// Place `raw` at the current text position. A show that starts where
    /// the previous fragment on the same baseline ended extends it.
    fn emit(&mut self, raw: &str, advance: f64) {
        let text = sanitize_fragment(raw);
        if text.is_empty() {
            return;
        }
        let placed = multiply(&self.tm, &self.ctm);
        let x = placed[4];
        let y = self.page_height - placed[5];
        let end = multiply(&multiply(&[1.0, 0.0, 0.0, 1.0, advance, 0.0], &self.tm), &self.ctm);
        let em = (self.font_size * placed[0].hypot(placed[1])).abs().max(1.0);
        let leading_space = raw.starts_with(char::is_whitespace);
        let trailing_space = raw.ends_with(char::is_whitespace);

        let joined = match (self.tail, self.fragments.last_mut()) {
            (Some(tail), Some(last)) if continues(&tail, x, y) => {
                let gap = (x - tail.x_end) / tail.em;
                if gap > GLUE_GAP || leading_space || tail.trailing_space {
                    last.text.push(' ');
                }
                last.text.push_str(&text);
                true
            }
            _ => false,
        };
        if !joined {
            self.fragments.push(TextFragment {
                page: self.page,
                x,
                y,
                text,
            });
        }

        let x_start = match (joined, self.tail) {
            (true, Some(tail)) => tail.x_start,
            _ => x,
        };
        self.tail = Some(Tail {
            x_start,
            x_end: end[4],
            y,
            em,
            trailing_space,
        });
    }

    fn advance_for(&self, glyphs: &[Glyph]) -> f64 {
        let size = self.font_size.abs().max(1.0);
        glyphs
            .iter()
            .map(|g| {
                let mut w = g.width / 1000.0 * size + self.char_spacing;
                if g.word_space {
                    w += self.word_spacing;
                }
                w * self.horizontal_scale
            })
            .sum()
    }

    fn translate_text(&mut self, tx: f64) {
        self.tm = multiply(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.tm);
    }
}

// ---------------------------------------------------------------------------
// Operand helpers
// ---------------------------------------------------------------------------

/// `a × b` for PDF affine matrices in `[a b c d e f]` form.
fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn matrix_operand(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (slot, obj) in m.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(m)
}

/// Same baseline, starts right of the fragment's first glyph, and within a
/// word gap of its end.
fn continues(tail: &Tail, x: f64, y: f64) -> bool {
    let gap = (x - tail.x_end) / tail.em;
    (y - tail.y).abs() < 0.5 && x > tail.x_start + 1.0 && (-OVERLAP_SLACK..=WORD_GAP).contains(&gap)
}

fn string_bytes(obj: &Object) -> Option<&[u8]> {
    match obj {
        Object::String(bytes, _) => Some(bytes),
        _ => None,
    }
}

/// Decode a string operand shown without a known font: UTF-16BE when it
/// carries a byte-order mark, otherwise one byte per character.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let [0xFE, 0xFF, rest @ ..] = bytes {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::fixtures::{make_cid_pdf, make_test_pdf, PlacedText};

    fn collect(source: &PdfTextSource) -> Vec<TextFragment> {
        source.fragments().map(Result::unwrap).collect()
    }

    #[test]
    fn extracts_positioned_fragments() {
        let pdf = make_test_pdf(&[vec![
            PlacedText::new(72.0, 700.0, "Grade 10 2022-2023"),
            PlacedText::new(400.0, 680.0, "A-"),
        ]]);
        let source = PdfTextSource::open(&pdf).unwrap();
        let fragments = collect(&source);

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "Grade 10 2022-2023");
        assert_eq!(fragments[0].page, 1);
        assert!((fragments[0].x - 72.0).abs() < 1e-6);
        assert!((fragments[0].y - 92.0).abs() < 1e-6, "y is top-down");
        assert!((fragments[1].y - 112.0).abs() < 1e-6);
    }

    #[test]
    fn page_count_matches_pages() {
        let pdf = make_test_pdf(&[
            vec![PlacedText::new(72.0, 700.0, "first")],
            vec![PlacedText::new(72.0, 700.0, "second")],
        ]);
        let source = PdfTextSource::open(&pdf).unwrap();
        assert_eq!(source.page_count(), 2);
        let pages: Vec<_> = source.pages().map(Result::unwrap).collect();
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 2);
        assert_eq!(pages[1].fragments[0].text, "second");
        assert_eq!(pages[1].fragments[0].page, 2);
    }

    #[test]
    fn iteration_is_restartable() {
        let pdf = make_test_pdf(&[vec![PlacedText::new(72.0, 700.0, "EN101 English 9")]]);
        let source = PdfTextSource::open(&pdf).unwrap();
        let first = collect(&source);
        let second = collect(&source);
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_pdf_is_corrupt() {
        let result = PdfTextSource::open(b"%PDF-1.4 not really a pdf");
        assert!(matches!(result, Err(UnreadableDocumentError::Corrupt(_))));
    }

    #[test]
    fn empty_page_yields_no_fragments() {
        let pdf = make_test_pdf(&[vec![]]);
        let source = PdfTextSource::open(&pdf).unwrap();
        assert_eq!(source.fragments().count(), 0);
    }

    #[test]
    fn td_and_tstar_track_lines() {
        let mut state = TextState::new(1, 792.0);
        state.apply("BT", &[]);
        state.apply("Tf", &["F1".into(), 12.into()]);
        state.apply("TL", &[14.into()]);
        state.apply("Td", &[72.into(), 700.into()]);
        state.apply("Tj", &[Object::string_literal("one")]);
        state.apply("T*", &[]);
        state.apply("Tj", &[Object::string_literal("two")]);
        state.apply("ET", &[]);

        assert_eq!(state.fragments.len(), 2);
        assert!((state.fragments[0].x - 72.0).abs() < 1e-6);
        assert!((state.fragments[0].y - 92.0).abs() < 1e-6);
        assert!((state.fragments[1].x - 72.0).abs() < 1e-6);
        assert!((state.fragments[1].y - 106.0).abs() < 1e-6);
    }

    #[test]
    fn consecutive_tj_advance_horizontally() {
        let mut state = TextState::new(1, 792.0);
        state.apply("BT", &[]);
        state.apply("Tf", &["F1".into(), 10.into()]);
        state.apply("Td", &[100.into(), 500.into()]);
        state.apply("Tj", &[Object::string_literal("abcd")]);
        state.apply("Tj", &[Object::string_literal(" B+")]);
        state.apply("Td", &[300.into(), 0.into()]);
        state.apply("Tj", &[Object::string_literal("A")]);

        assert_eq!(state.fragments.len(), 2);
        assert_eq!(state.fragments[0].text, "abcd B+");
        assert_eq!(state.fragments[1].text, "A");
        assert!((state.fragments[1].x - 400.0).abs() < 1e-6);
        assert_eq!(state.fragments[0].y, state.fragments[1].y);
    }

    #[test]
    fn glyph_by_glyph_placement_reads_as_words() {
        let mut state = TextState::new(1, 792.0);
        state.apply("BT", &[]);
        state.apply("Tf", &["F1".into(), 10.into()]);
        // 5pt estimated advance per glyph; the skipped slot is a space.
        for (i, c) in "Grade 9".chars().enumerate() {
            if c == ' ' {
                continue;
            }
            let x = 100.0 + i as f64 * 5.0;
            state.apply(
                "Tm",
                &[1.into(), 0.into(), 0.into(), 1.into(), Object::Real(x as _), 700.into()],
            );
            state.apply("Tj", &[Object::string_literal(c.to_string())]);
        }
        state.apply("Tm", &[1.into(), 0.into(), 0.into(), 1.into(), 400.into(), 700.into()]);
        state.apply("Tj", &[Object::string_literal("B+")]);

        let texts: Vec<&str> = state.fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["Grade 9", "B+"]);
        assert!((state.fragments[0].x - 100.0).abs() < 1e-6);
    }

    #[test]
    fn redrawn_text_is_not_glued_to_itself() {
        let mut state = TextState::new(1, 792.0);
        state.apply("BT", &[]);
        state.apply("Tf", &["F1".into(), 10.into()]);
        state.apply("Td", &[100.into(), 500.into()]);
        state.apply("Tj", &[Object::string_literal("Grade")]);
        state.apply("Tm", &[1.into(), 0.into(), 0.into(), 1.into(), Object::Real(100.3), 500.into()]);
        state.apply("Tj", &[Object::string_literal("Grade")]);
        assert_eq!(state.fragments.len(), 2);
        assert_eq!(state.fragments[1].text, "Grade");
    }

    #[test]
    fn subset_font_decodes_through_to_unicode() {
        let pdf = make_cid_pdf(&[vec![
            PlacedText::new(72.0, 700.0, "Grade 10 2022-2023"),
            PlacedText::new(300.0, 700.0, "Year Average: 3.52"),
            PlacedText::new(72.0, 680.0, "MA401 Calculus"),
            PlacedText::new(460.0, 680.0, "A-"),
        ]]);
        let source = PdfTextSource::open(&pdf).unwrap();
        let fragments = collect(&source);

        let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Grade 10 2022-2023", "Year Average: 3.52", "MA401 Calculus", "A-"]
        );
        assert!((fragments[1].x - 300.0).abs() < 1e-6);
        assert!((fragments[3].x - 460.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_font_name_falls_back_to_bytes() {
        let mut state = TextState::new(1, 792.0);
        state.apply("BT", &[]);
        state.apply("Tf", &["Missing".into(), 10.into()]);
        state.apply("Tj", &[Object::string_literal("EN101")]);
        assert_eq!(state.fragments[0].text, "EN101");
    }

    #[test]
    fn cm_and_q_restore_transform() {
        let mut state = TextState::new(1, 792.0);
        state.apply("q", &[]);
        state.apply("cm", &[1.into(), 0.into(), 0.into(), 1.into(), 50.into(), 0.into()]);
        state.apply("BT", &[]);
        state.apply("Td", &[10.into(), 700.into()]);
        state.apply("Tj", &[Object::string_literal("shifted")]);
        state.apply("ET", &[]);
        state.apply("Q", &[]);
        state.apply("BT", &[]);
        state.apply("Td", &[10.into(), 700.into()]);
        state.apply("Tj", &[Object::string_literal("plain")]);

        assert!((state.fragments[0].x - 60.0).abs() < 1e-6);
        assert!((state.fragments[1].x - 10.0).abs() < 1e-6);
    }

    #[test]
    fn tj_array_kerning_inserts_space() {
        let mut state = TextState::new(1, 792.0);
        state.apply("BT", &[]);
        state.apply("Tf", &["F1".into(), 12.into()]);
        let array = Object::Array(vec![
            Object::string_literal("Term"),
            Object::Integer(-250),
            Object::string_literal("GPA:"),
            Object::Integer(-20),
            Object::string_literal(" 3.5"),
        ]);
        state.apply("TJ", &[array]);
        assert_eq!(state.fragments[0].text, "Term GPA: 3.5");
    }

    #[test]
    fn malformed_operands_are_ignored() {
        let mut state = TextState::new(1, 792.0);
        state.apply("Td", &[Object::Null]);
        state.apply("Tm", &[1.into()]);
        state.apply("Tj", &[12.into()]);
        assert!(state.fragments.is_empty());
    }

    #[test]
    fn decodes_utf16_with_bom() {
        let bytes = [0xFE, 0xFF, 0x00, 0x41, 0x00, 0x2B];
        assert_eq!(decode_pdf_string(&bytes), "A+");
        assert_eq!(decode_pdf_string(b"B-"), "B-");
        assert_eq!(decode_pdf_string(&[0xE9]), "\u{e9}");
    }

    #[test]
    fn multiply_composes_translations() {
        let a = [1.0, 0.0, 0.0, 1.0, 5.0, 7.0];
        let b = [2.0, 0.0, 0.0, 2.0, 1.0, 1.0];
        assert_eq!(multiply(&a, &b), [2.0, 0.0, 0.0, 2.0, 11.0, 15.0]);
    }
}

//! Plain-text transcript exports.
//!
//! Each line is one row. Runs of two or more spaces (or tabs) separate cells,
//! and a form feed starts a new page. Positions are synthesized from line and
//! column numbers so the segmenter treats the export like a laid-out page.

use std::sync::LazyLock;

use regex::Regex;

use super::sanitize::sanitize_fragment;
use super::types::{PageResult, PageText, TextFragment, TextSource};
use super::UnreadableDocumentError;

/// Vertical distance between consecutive lines, in points.
pub const LINE_HEIGHT: f64 = 12.0;

/// Horizontal width of one character column, in points.
pub const CHAR_WIDTH: f64 = 6.0;

static CELL_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\t+| {2,}").unwrap());

pub struct PlainTextSource {
    text: String,
}

impl PlainTextSource {
    pub fn open(bytes: &[u8]) -> Result<Self, UnreadableDocumentError> {
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let text = std::str::from_utf8(body)
            .map_err(|e| UnreadableDocumentError::Encoding(e.to_string()))?
            .replace("\r\n", "\n");
        Ok(Self { text })
    }
}

impl TextSource for PlainTextSource {
    fn page_count(&self) -> usize {
        self.text.split('\x0c').count()
    }

    fn pages(&self) -> Box<dyn Iterator<Item = PageResult> + '_> {
        Box::new(
            self.text
                .split('\x0c')
                .enumerate()
                .map(|(i, chunk)| Ok(layout_page(i as u32 + 1, chunk))),
        )
    }
}

fn layout_page(number: u32, chunk: &str) -> PageText {
    let fragments = chunk
        .lines()
        .enumerate()
        .flat_map(|(row, line)| {
            let y = (row as f64 + 1.0) * LINE_HEIGHT;
            split_cells(line)
                .into_iter()
                .map(move |(column, text)| TextFragment {
                    page: number,
                    x: column as f64 * CHAR_WIDTH,
                    y,
                    text,
                })
        })
        .collect();
    PageText { number, fragments }
}

/// Split a line into `(character column, text)` cells.
fn split_cells(line: &str) -> Vec<(usize, String)> {
    let mut bounds = Vec::new();
    let mut last = 0;
    for gap in CELL_GAP.find_iter(line) {
        bounds.push((last, gap.start()));
        last = gap.end();
    }
    bounds.push((last, line.len()));

    bounds
        .into_iter()
        .filter_map(|(start, end)| {
            let raw = &line[start..end];
            let text = sanitize_fragment(raw);
            if text.is_empty() {
                return None;
            }
            let lead = raw.len() - raw.trim_start().len();
            Some((line[..start + lead].chars().count(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_cells_on_wide_gaps() {
        let cells = split_cells("EN101 English 9      A-");
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0], (0, "EN101 English 9".to_string()));
        assert_eq!(cells[1], (21, "A-".to_string()));
    }

    #[test]
    fn tabs_separate_cells() {
        let cells = split_cells("\tMA401 Calculus\tB+");
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].1, "MA401 Calculus");
        assert_eq!(cells[1].1, "B+");
    }

    #[test]
    fn lines_become_rows() {
        let source = PlainTextSource::open(b"Grade 9 2020-2021\nEN101 English 9  A\n\nSC101 Biology  B").unwrap();
        let fragments: Vec<_> = source.fragments().map(Result::unwrap).collect();

        assert_eq!(fragments.len(), 5);
        assert_eq!(fragments[0].y, LINE_HEIGHT);
        assert_eq!(fragments[1].y, 2.0 * LINE_HEIGHT);
        assert_eq!(fragments[2].y, fragments[1].y);
        assert!(fragments[2].x > fragments[1].x);
        assert_eq!(fragments[3].y, 4.0 * LINE_HEIGHT);
    }

    #[test]
    fn form_feed_starts_new_page() {
        let source = PlainTextSource::open(b"page one\x0cpage two").unwrap();
        assert_eq!(source.page_count(), 2);
        let pages: Vec<_> = source.pages().map(Result::unwrap).collect();
        assert_eq!(pages[1].number, 2);
        assert_eq!(pages[1].fragments[0].text, "page two");
        assert_eq!(pages[1].fragments[0].page, 2);
    }

    #[test]
    fn strips_byte_order_mark_and_crlf() {
        let source = PlainTextSource::open(b"\xEF\xBB\xBFGrade 9 2020-2021\r\nnext").unwrap();
        let fragments: Vec<_> = source.fragments().map(Result::unwrap).collect();
        assert_eq!(fragments[0].text, "Grade 9 2020-2021");
        assert_eq!(fragments[1].text, "next");
    }

    #[test]
    fn invalid_utf8_is_unreadable() {
        let result = PlainTextSource::open(&[0x47, 0xFF, 0xFE, 0x00]);
        assert!(matches!(result, Err(UnreadableDocumentError::Encoding(_))));
    }
}

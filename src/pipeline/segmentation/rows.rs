use crate::pipeline::extraction::PageText;

use super::SegmentWarning;

/// Fragments whose vertical positions differ by at most this many points
/// share a row.
pub const ROW_TOLERANCE: f64 = 2.5;

/// Fragments in the same row closer than this horizontally claim the same
/// slot; only the first one is kept.
pub const COLUMN_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub x: f64,
    pub text: String,
}

/// A horizontal line of text cells on one page, ordered left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub page: u32,
    pub y: f64,
    pub cells: Vec<Cell>,
}

impl Row {
    /// Cell texts joined by single spaces.
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Drop everything at or after byte `offset` of `text()`.
    pub fn truncate_at(&mut self, offset: usize) {
        let mut kept = Vec::with_capacity(self.cells.len());
        let mut start = 0;
        for cell in self.cells.drain(..) {
            if start >= offset {
                break;
            }
            let end = start + cell.text.len();
            if end <= offset {
                start = end + 1;
                kept.push(cell);
                continue;
            }
            let head = cell.text[..offset - start].trim_end().to_string();
            if !head.is_empty() {
                kept.push(Cell {
                    x: cell.x,
                    text: head,
                });
            }
            break;
        }
        self.cells = kept;
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cell holding byte `offset` of `text()`.
    pub fn cell_at(&self, offset: usize) -> Option<&Cell> {
        let mut start = 0;
        for cell in &self.cells {
            let end = start + cell.text.len();
            if offset < end {
                return Some(cell);
            }
            start = end + 1;
        }
        None
    }
}

/// Group a page's fragments into rows, top to bottom.
///
/// Fragments are visited in content-stream order, so when two of them claim
/// the same slot the earlier one wins and the later is reported.
pub fn group_rows(page: PageText, warnings: &mut Vec<SegmentWarning>) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::new();

    for fragment in page.fragments {
        let nearest = rows
            .iter_mut()
            .filter(|row| (row.y - fragment.y).abs() <= ROW_TOLERANCE)
            .min_by(|a, b| {
                (a.y - fragment.y)
                    .abs()
                    .total_cmp(&(b.y - fragment.y).abs())
            });

        match nearest {
            Some(row) => {
                let clash = row
                    .cells
                    .iter()
                    .find(|cell| (cell.x - fragment.x).abs() <= COLUMN_TOLERANCE);
                if let Some(kept) = clash {
                    tracing::debug!(
                        page = fragment.page,
                        x = fragment.x,
                        y = fragment.y,
                        "Overlapping fragment dropped"
                    );
                    warnings.push(SegmentWarning::OverlappingFragment {
                        page: fragment.page,
                        x: fragment.x,
                        y: fragment.y,
                        kept: kept.text.clone(),
                        dropped: fragment.text,
                    });
                } else {
                    row.cells.push(Cell {
                        x: fragment.x,
                        text: fragment.text,
                    });
                }
            }
            None => rows.push(Row {
                page: fragment.page,
                y: fragment.y,
                cells: vec![Cell {
                    x: fragment.x,
                    text: fragment.text,
                }],
            }),
        }
    }

    for row in &mut rows {
        row.cells.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    rows.sort_by(|a, b| a.y.total_cmp(&b.y));
    rows
}

//! Transcript segmentation: positioned fragments → rows → year blocks →
//! course-row candidates.
//!
//! Never fails on a single row. Rows that cannot be read and fragments that
//! collide with an earlier one are reported as `SegmentWarning`s.

pub mod courses;
pub mod rows;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::pipeline::extraction::{TextSource, UnreadableDocumentError};

pub use rows::{Cell, Row, COLUMN_TOLERANCE, ROW_TOLERANCE};

/// `Grade 10 2022-2023` opens a year block. A row may hold several.
static GRADE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bGrade\s+(\d{1,2})\s+(\d{4})\s*[-\u{2013}]\s*(\d{4})\b").unwrap()
});

/// `Enrolled: 08/15/2021` closes the transcript; the enrollment history
/// printed after it is not part of the grade record.
static ENROLLMENT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Enrolled:\s*\d{2}/\d{2}/\d{4}").unwrap());

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One course line as printed, before its grade is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseRow {
    pub name: String,
    pub grade_token: Option<String>,
    pub page: u32,
    pub y: f64,
}

/// Everything printed between one grade heading and the next.
#[derive(Debug, Clone, PartialEq)]
pub struct RawYearBlock {
    pub grade_level: u8,
    pub year: String,
    pub page: u32,
    /// Raw token after the first `Year Average:` label, if the label appears.
    pub year_average: Option<String>,
    pub term_gpas: Vec<String>,
    pub rows: Vec<CourseRow>,
}

impl RawYearBlock {
    fn new(grade_level: u8, year: String, page: u32) -> Self {
        Self {
            grade_level,
            year,
            page,
            year_average: None,
            term_gpas: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn absorb_figures(&mut self, figures: courses::RowFigures, warnings: &mut Vec<SegmentWarning>) {
        for value in figures.year_averages {
            if self.year_average.is_none() {
                self.year_average = Some(value);
            } else {
                warnings.push(SegmentWarning::ExtraYearAverage {
                    grade_level: self.grade_level,
                    value,
                });
            }
        }
        self.term_gpas.extend(figures.term_gpas);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentWarning {
    OverlappingFragment {
        page: u32,
        x: f64,
        y: f64,
        kept: String,
        dropped: String,
    },
    SkippedRow {
        page: u32,
        y: f64,
        text: String,
    },
    ExtraYearAverage {
        grade_level: u8,
        value: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segmentation {
    pub blocks: Vec<RawYearBlock>,
    pub warnings: Vec<SegmentWarning>,
    /// Non-empty fragments read before segmentation stopped.
    pub fragment_count: usize,
    pub pages_read: u32,
    pub preamble_rows: usize,
    pub terminated_by_enrollment: bool,
}

// ---------------------------------------------------------------------------
// Segmenter
// ---------------------------------------------------------------------------

/// A year block receiving rows, and the x where its column starts.
#[derive(Debug)]
struct Column {
    x: f64,
    block: RawYearBlock,
}

/// Segment a document into year blocks.
///
/// Pages are pulled lazily; once the enrollment marker is seen no further
/// page is decoded. Only a page that cannot be decoded fails the document.
///
/// Headings printed side by side open one block per column; the rows below
/// are split between them by horizontal position until the next heading row.
pub fn segment(source: &dyn TextSource) -> Result<Segmentation, UnreadableDocumentError> {
    let mut out = Segmentation::default();
    let mut open: Vec<Column> = Vec::new();

    'pages: for page in source.pages() {
        let page = page?;
        out.pages_read += 1;
        out.fragment_count += page.fragments.len();

        for mut row in rows::group_rows(page, &mut out.warnings) {
            let mut text = row.text();
            let mut at_end = false;
            if let Some(marker) = ENROLLMENT_MARKER.find(&text) {
                row.truncate_at(marker.start());
                text = row.text();
                at_end = true;
            }

            if !row.is_empty() {
                read_row(&row, &text, &mut open, &mut out);
            }

            if at_end {
                out.terminated_by_enrollment = true;
                break 'pages;
            }
        }
    }

    out.blocks.extend(open.into_iter().map(|c| c.block));

    tracing::debug!(
        blocks = out.blocks.len(),
        warnings = out.warnings.len(),
        pages_read = out.pages_read,
        fragments = out.fragment_count,
        terminated_by_enrollment = out.terminated_by_enrollment,
        "Segmentation complete"
    );

    Ok(out)
}

fn read_row(row: &Row, text: &str, open: &mut Vec<Column>, out: &mut Segmentation) {
    let headings = parse_headings(row, text);
    if !headings.is_empty() {
        out.blocks.extend(open.drain(..).map(|c| c.block));
        for column in headings {
            // Two headings in one cell: the earlier one holds nothing.
            if let Some(last) = open.last() {
                if (last.x - column.x).abs() <= COLUMN_TOLERANCE {
                    if let Some(done) = open.pop() {
                        out.blocks.push(done.block);
                    }
                }
            }
            open.push(column);
        }

        let starts: Vec<f64> = open.iter().map(|c| c.x).collect();
        for (column, part) in open.iter_mut().zip(split_columns(row, &starts)) {
            let mut figures = courses::RowFigures::default();
            courses::lift_figures(&part.text(), &mut figures);
            column.block.absorb_figures(figures, &mut out.warnings);
        }
        return;
    }

    if open.is_empty() {
        out.preamble_rows += 1;
        return;
    }

    let starts: Vec<f64> = open.iter().map(|c| c.x).collect();
    for (column, part) in open.iter_mut().zip(split_columns(row, &starts)) {
        if part.is_empty() {
            continue;
        }
        let content = courses::read_row(&part);
        let recognized = !content.courses.is_empty() || !content.figures.is_empty();
        column.block.absorb_figures(content.figures, &mut out.warnings);
        column.block.rows.extend(content.courses);

        if !recognized && !content.leftover.is_empty() {
            out.warnings.push(SegmentWarning::SkippedRow {
                page: row.page,
                y: row.y,
                text: content.leftover,
            });
        }
    }
}

/// Every grade heading in the row, left to right, with the x of the cell it
/// starts in.
fn parse_headings(row: &Row, text: &str) -> Vec<Column> {
    GRADE_HEADING
        .captures_iter(text)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let grade_level = caps.get(1)?.as_str().parse().ok()?;
            let year = format!("{}-{}", caps.get(2)?.as_str(), caps.get(3)?.as_str());
            Some(Column {
                x: row.cell_at(start)?.x,
                block: RawYearBlock::new(grade_level, year, row.page),
            })
        })
        .collect()
}

/// Split a row into one sub-row per column. A cell belongs to the rightmost
/// column starting at or before it; cells left of every column go to the
/// first.
fn split_columns(row: &Row, starts: &[f64]) -> Vec<Row> {
    let mut parts: Vec<Row> = starts
        .iter()
        .map(|_| Row {
            page: row.page,
            y: row.y,
            cells: Vec::new(),
        })
        .collect();
    for cell in &row.cells {
        let index = starts
            .iter()
            .rposition(|x| *x <= cell.x + COLUMN_TOLERANCE)
            .unwrap_or(0);
        if let Some(part) = parts.get_mut(index) {
            part.cells.push(cell.clone());
        }
    }
    parts
}

use std::sync::LazyLock;

use regex::Regex;

use super::rows::Row;
use super::CourseRow;

/// `Year Average: 3.52` anywhere in a row.
static YEAR_AVERAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bYear\s+Average:\s*(\S*)").unwrap());

/// `Term GPA: 3.4` or `Term 2 GPA: 3.4`.
static TERM_GPA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bTerm(?:\s+\d)?\s+GPA:\s*(\S*)").unwrap());

/// A word that opens a course entry.
static COURSE_CODE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2,4}\d{3}[A-Z]?$").unwrap());

/// A cell of its own that looks like a mark: short letters or a number.
static GRADE_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z]{1,3}[+\-\u{2212}\u{2013}]?|\d{1,3}(?:\.\d+)?)$").unwrap()
});

/// A trailing word inside a longer run of text that reads as a letter mark.
/// Roman-numeral `I` is excluded since course titles end in it.
static GRADE_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-DFa-df][+\-\u{2212}\u{2013}]?|E|P|NP|IP|W|WD|INC|NC|CR)$").unwrap()
});

/// Figures found in one row.
#[derive(Debug, Default, PartialEq)]
pub struct RowFigures {
    pub year_averages: Vec<String>,
    pub term_gpas: Vec<String>,
}

impl RowFigures {
    pub fn is_empty(&self) -> bool {
        self.year_averages.is_empty() && self.term_gpas.is_empty()
    }
}

/// Outcome of reading one row inside a year block.
#[derive(Debug, Default, PartialEq)]
pub struct RowContent {
    pub figures: RowFigures,
    pub courses: Vec<CourseRow>,
    /// Text left over that belonged to neither a figure nor a course.
    pub leftover: String,
}

/// Pull the year-average and term-GPA figures out of `text`, returning the
/// text with the figures removed.
pub fn lift_figures(text: &str, figures: &mut RowFigures) -> String {
    for caps in YEAR_AVERAGE.captures_iter(text) {
        figures
            .year_averages
            .push(caps.get(1).map_or("", |m| m.as_str()).to_string());
    }
    for caps in TERM_GPA.captures_iter(text) {
        figures
            .term_gpas
            .push(caps.get(1).map_or("", |m| m.as_str()).to_string());
    }
    let without_average = YEAR_AVERAGE.replace_all(text, " ");
    TERM_GPA.replace_all(&without_average, " ").trim().to_string()
}

struct Word {
    text: String,
    whole_cell: bool,
}

/// Split a row into figures, course candidates and leftover text.
///
/// Words are split into runs starting at each course code. Within a run the
/// grade is the last word when it is a mark-shaped cell of its own, or a
/// letter-shaped word at the end of a longer cell.
pub fn read_row(row: &Row) -> RowContent {
    let mut content = RowContent::default();
    let mut words = Vec::new();

    for cell in &row.cells {
        let remaining = lift_figures(&cell.text, &mut content.figures);
        let parts: Vec<&str> = remaining.split_whitespace().collect();
        let whole_cell = parts.len() == 1;
        words.extend(parts.into_iter().map(|w| Word {
            text: w.to_string(),
            whole_cell,
        }));
    }

    let mut leftover = Vec::new();
    let mut runs: Vec<Vec<Word>> = Vec::new();
    for word in words {
        if COURSE_CODE_WORD.is_match(&word.text) {
            runs.push(vec![word]);
        } else if let Some(run) = runs.last_mut() {
            run.push(word);
        } else {
            leftover.push(word.text);
        }
    }

    content.courses = runs
        .into_iter()
        .map(|run| course_from_run(run, row))
        .collect();
    content.leftover = leftover.join(" ");
    content
}

fn course_from_run(mut run: Vec<Word>, row: &Row) -> CourseRow {
    let grade_token = match run.last() {
        Some(last) if run.len() > 1 => {
            let is_grade = if last.whole_cell {
                GRADE_CELL.is_match(&last.text)
            } else {
                GRADE_WORD.is_match(&last.text)
            };
            is_grade.then(|| last.text.clone())
        }
        _ => None,
    };
    if grade_token.is_some() {
        run.pop();
    }

    CourseRow {
        name: run
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        grade_token,
        page: row.page,
        y: row.y,
    }
}

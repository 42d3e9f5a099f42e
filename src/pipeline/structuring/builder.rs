use crate::models::{Course, GradeYear, LetterGrade, Student};
use crate::pipeline::segmentation::RawYearBlock;

use super::validation::{conflict_gaps, validate_grade_years, ValidationWarning};
use super::{DataGap, MissingDataWarning, UnparseableCourseError};

/// Everything the builder learned about one document.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutcome {
    pub student: Student,
    pub unparseable: Vec<UnparseableCourseError>,
    pub missing: Vec<MissingDataWarning>,
    pub validation: Vec<ValidationWarning>,
}

impl BuildOutcome {
    pub fn has_unparseable_rows(&self) -> bool {
        !self.unparseable.is_empty()
    }

    /// Unreadable rows, then courses lost to conflicting year blocks.
    pub fn data_gaps(&self) -> Vec<DataGap> {
        self.unparseable
            .iter()
            .cloned()
            .map(DataGap::UnreadableGrade)
            .chain(conflict_gaps(&self.validation))
            .collect()
    }
}

/// Build a `Student` from segmented year blocks.
///
/// A row without a grade token is in progress. A token outside the grade
/// vocabulary fails that row only.
pub fn build_student(identifier: &str, blocks: Vec<RawYearBlock>) -> BuildOutcome {
    let mut unparseable = Vec::new();
    let mut missing = Vec::new();

    let grade_years: Vec<GradeYear> = blocks
        .into_iter()
        .map(|block| build_year(block, &mut unparseable, &mut missing))
        .collect();

    let validated = validate_grade_years(grade_years);

    if !unparseable.is_empty() || !validated.warnings.is_empty() {
        tracing::warn!(
            student = %identifier,
            unparseable = unparseable.len(),
            validation_warnings = validated.warnings.len(),
            "Grade record built with problems"
        );
    }

    BuildOutcome {
        student: Student {
            identifier: identifier.to_string(),
            grade_years: validated.grade_years,
        },
        unparseable,
        missing,
        validation: validated.warnings,
    }
}

fn build_year(
    block: RawYearBlock,
    unparseable: &mut Vec<UnparseableCourseError>,
    missing: &mut Vec<MissingDataWarning>,
) -> GradeYear {
    let level = block.grade_level;

    let year_average = match block.year_average {
        None => {
            missing.push(MissingDataWarning::YearAverageAbsent { grade_level: level });
            None
        }
        Some(raw) => {
            let parsed = parse_figure(&raw);
            if parsed.is_none() {
                missing.push(MissingDataWarning::YearAverageUnreadable {
                    grade_level: level,
                    raw,
                });
            }
            parsed
        }
    };

    if block.term_gpas.is_empty() {
        missing.push(MissingDataWarning::TermGpasAbsent { grade_level: level });
    }
    let mut term_gpas = Vec::with_capacity(block.term_gpas.len());
    for raw in block.term_gpas {
        match parse_figure(&raw) {
            Some(v) => term_gpas.push(v),
            None => missing.push(MissingDataWarning::TermGpaUnreadable {
                grade_level: level,
                raw,
            }),
        }
    }

    let mut courses = Vec::with_capacity(block.rows.len());
    for row in block.rows {
        let grade = match row.grade_token.as_deref() {
            None => Ok(LetterGrade::InProgress),
            Some(token) => token.parse::<LetterGrade>(),
        };
        match grade {
            Ok(letter_grade) => courses.push(Course::new(row.name, letter_grade)),
            Err(_) => unparseable.push(UnparseableCourseError {
                grade_level: level,
                course: row.name,
                token: row.grade_token.unwrap_or_default(),
                page: row.page,
            }),
        }
    }

    GradeYear {
        grade_level: level,
        year: block.year,
        term_gpas,
        year_average,
        courses,
    }
}

/// Parse a printed GPA figure. Trailing punctuation is tolerated; anything
/// else that is not a finite non-negative number is unreadable.
pub fn parse_figure(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches([',', ';', ')']);
    let value: f64 = trimmed.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

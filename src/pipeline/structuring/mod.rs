//! Grade record building: raw year blocks → typed `GradeYear`s.
//!
//! Row-level failures never abort a document. Each problem is recorded next
//! to the parsed data so callers can tell a shortfall from missing data.

pub mod builder;
pub mod validation;

pub use builder::*;
pub use validation::*;

use serde::Serialize;
use thiserror::Error;

/// One course row whose grade token is outside the known vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("Grade {grade_level}: cannot read grade {token:?} for course {course:?}")]
pub struct UnparseableCourseError {
    pub grade_level: u8,
    pub course: String,
    pub token: String,
    pub page: u32,
}

/// Course data the document printed but the record does not carry. Any gap
/// turns an unmet requirement into "data unavailable".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataGap {
    UnreadableGrade(UnparseableCourseError),
    /// Courses of a block dropped because its grade level was already taken
    /// by a different school year.
    ConflictingYear {
        grade_level: u8,
        year: String,
        courses: Vec<String>,
    },
}

/// A numeric figure the transcript does not print, or prints unreadably.
/// The value is carried as absent, never as zero.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MissingDataWarning {
    #[error("Grade {grade_level}: year average not printed")]
    YearAverageAbsent { grade_level: u8 },

    #[error("Grade {grade_level}: year average {raw:?} is not a number")]
    YearAverageUnreadable { grade_level: u8, raw: String },

    #[error("Grade {grade_level}: no term GPAs printed")]
    TermGpasAbsent { grade_level: u8 },

    #[error("Grade {grade_level}: term GPA {raw:?} is not a number")]
    TermGpaUnreadable { grade_level: u8, raw: String },
}

// Post-build checks on the grade years of one transcript.
// Applied after every block is typed and before the Student is assembled.

use serde::Serialize;

use crate::models::GradeYear;

use super::DataGap;

/// A printed year average may differ from the mean of the printed term GPAs
/// by this much before it is flagged.
pub const YEAR_AVERAGE_TOLERANCE: f64 = 0.15;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    /// The block's grade level is not a high-school grade; the block is dropped.
    GradeLevelOutOfRange { grade_level: u8, year: String },
    /// A second block for a grade level already seen under a different
    /// school year; it is dropped.
    DuplicateGradeLevel {
        grade_level: u8,
        year: String,
        dropped_courses: Vec<String>,
    },
    /// The printed year average is kept as-is.
    InconsistentYearAverage {
        grade_level: u8,
        year_average: f64,
        term_mean: f64,
    },
}

#[derive(Debug, Clone)]
pub struct ValidatedYears {
    pub grade_years: Vec<GradeYear>,
    pub warnings: Vec<ValidationWarning>,
}

/// Enforce the record invariants: supported grade levels only, one year per
/// grade level, ordered by grade level.
///
/// A block repeating the level and school year of an earlier one (the heading
/// reprinted after a page break) is merged into it. A block with the same
/// level but another school year is dropped; the first one printed wins.
pub fn validate_grade_years(years: Vec<GradeYear>) -> ValidatedYears {
    let mut warnings = Vec::new();
    let mut kept: Vec<GradeYear> = Vec::with_capacity(years.len());

    for year in years {
        // 1. Grade level range
        if !GradeYear::is_supported_level(year.grade_level) {
            warnings.push(ValidationWarning::GradeLevelOutOfRange {
                grade_level: year.grade_level,
                year: year.year,
            });
            continue;
        }

        // 2. Uniqueness by grade level
        if let Some(earlier) = kept.iter_mut().find(|k| k.grade_level == year.grade_level) {
            if earlier.year == year.year {
                tracing::debug!(
                    grade_level = year.grade_level,
                    courses = year.courses.len(),
                    "Continuation block merged"
                );
                merge_continuation(earlier, year);
                continue;
            }
            warnings.push(ValidationWarning::DuplicateGradeLevel {
                grade_level: year.grade_level,
                year: year.year,
                dropped_courses: year.courses.into_iter().map(|c| c.name).collect(),
            });
            continue;
        }

        kept.push(year);
    }

    // 3. Year average against term GPAs, once every continuation is merged
    for year in &kept {
        if let (Some(average), Some(mean)) = (year.year_average, year.term_mean()) {
            if (average - mean).abs() > YEAR_AVERAGE_TOLERANCE {
                warnings.push(ValidationWarning::InconsistentYearAverage {
                    grade_level: year.grade_level,
                    year_average: average,
                    term_mean: mean,
                });
            }
        }
    }

    kept.sort_by_key(|y| y.grade_level);

    ValidatedYears {
        grade_years: kept,
        warnings,
    }
}

/// Courses follow the earlier block's. Figures printed only on the
/// continuation fill what the earlier block lacked.
fn merge_continuation(earlier: &mut GradeYear, continuation: GradeYear) {
    earlier.courses.extend(continuation.courses);
    if earlier.year_average.is_none() {
        earlier.year_average = continuation.year_average;
    }
    if earlier.term_gpas.is_empty() {
        earlier.term_gpas = continuation.term_gpas;
    }
}

/// Dropped courses of conflicting blocks, as data gaps.
pub fn conflict_gaps(warnings: &[ValidationWarning]) -> impl Iterator<Item = DataGap> + '_ {
    warnings.iter().filter_map(|w| match w {
        ValidationWarning::DuplicateGradeLevel {
            grade_level,
            year,
            dropped_courses,
        } if !dropped_courses.is_empty() => Some(DataGap::ConflictingYear {
            grade_level: *grade_level,
            year: year.clone(),
            courses: dropped_courses.clone(),
        }),
        _ => None,
    })
}

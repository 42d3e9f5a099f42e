use serde::Serialize;

use crate::models::{LetterGrade, Student};

use super::classify::{classify, ClassificationRule, PolicyMismatchError};
use super::policy::RequirementPolicy;

/// Credits are summed in hundredths so that fractional weights add up
/// exactly (ten 0.1-credit courses make 1 credit, not 0.9999999999999999).
pub fn to_hundredths(credits: f64) -> i64 {
    (credits * 100.0).round() as i64
}

pub fn from_hundredths(hundredths: i64) -> f64 {
    hundredths as f64 / 100.0
}

/// Earned credit in one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCredit {
    pub category: String,
    pub credits: f64,
    /// Credit of in-progress enrollments not counted in `credits`.
    pub in_progress: f64,
    /// Highest course-code number among the counted courses.
    pub highest_course_level: Option<u16>,
    #[serde(skip)]
    earned_hundredths: i64,
    #[serde(skip)]
    in_progress_hundredths: i64,
}

impl CategoryCredit {
    fn empty(category: &str) -> Self {
        Self {
            category: category.to_string(),
            credits: 0.0,
            in_progress: 0.0,
            highest_course_level: None,
            earned_hundredths: 0,
            in_progress_hundredths: 0,
        }
    }

    pub fn earned_hundredths(&self) -> i64 {
        self.earned_hundredths
    }

    pub fn in_progress_hundredths(&self) -> i64 {
        self.in_progress_hundredths
    }
}

/// What happened to one course during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum Disposition {
    Counted {
        category: String,
        credits: f64,
        rule: ClassificationRule,
    },
    /// Classified, but the course is still in progress; projected only.
    InProgress {
        category: String,
        credits: f64,
        rule: ClassificationRule,
    },
    NoCredit {
        reason: String,
    },
    Unclassified {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseDisposition {
    pub grade_level: u8,
    pub course: String,
    #[serde(flatten)]
    pub disposition: Disposition,
}

/// Per-student credit totals with one recorded disposition per course.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditLedger {
    /// One entry per policy category, in catalogue order.
    pub earned: Vec<CategoryCredit>,
    pub dispositions: Vec<CourseDisposition>,
    pub unclassified: Vec<PolicyMismatchError>,
}

impl CreditLedger {
    pub fn earned_in(&self, category: &str) -> f64 {
        self.entry(category).map_or(0.0, |c| c.credits)
    }

    pub fn earned_hundredths_in(&self, category: &str) -> i64 {
        self.entry(category).map_or(0, |c| c.earned_hundredths)
    }

    pub fn in_progress_hundredths_in(&self, category: &str) -> i64 {
        self.entry(category).map_or(0, |c| c.in_progress_hundredths)
    }

    pub fn highest_level_in(&self, category: &str) -> Option<u16> {
        self.entry(category).and_then(|c| c.highest_course_level)
    }

    pub fn total_earned(&self) -> f64 {
        from_hundredths(self.earned.iter().map(|c| c.earned_hundredths).sum())
    }

    /// Sum of the weights of every counted course.
    pub fn counted_weight(&self) -> f64 {
        from_hundredths(
            self.dispositions
                .iter()
                .filter_map(|d| match &d.disposition {
                    Disposition::Counted { credits, .. } => Some(to_hundredths(*credits)),
                    _ => None,
                })
                .sum(),
        )
    }

    fn entry(&self, category: &str) -> Option<&CategoryCredit> {
        self.earned.iter().find(|c| c.category == category)
    }
}

/// Classify and weigh every course of every grade year.
///
/// In-progress enrollments count as earned only when the policy says so;
/// otherwise they are classified and kept as projected credit.
pub fn aggregate_credits(policy: &RequirementPolicy, student: &Student) -> CreditLedger {
    let mut earned: Vec<CategoryCredit> =
        policy.category_names().map(CategoryCredit::empty).collect();
    let mut dispositions = Vec::with_capacity(student.course_count());
    let mut unclassified = Vec::new();

    for year in &student.grade_years {
        for course in &year.courses {
            let in_progress = course.letter_grade == LetterGrade::InProgress;
            let projected = in_progress && !policy.counts_in_progress();

            let disposition = match course.letter_grade.non_credit_reason() {
                Some(reason) if !in_progress => Disposition::NoCredit {
                    reason: reason.to_string(),
                },
                _ => match classify(policy, course, year.grade_level) {
                    Ok(placed) => {
                        let credits = policy.credit_weight(&course.name);
                        let hundredths = to_hundredths(credits);
                        if let Some(slot) = earned.iter_mut().find(|c| c.category == placed.category)
                        {
                            if projected {
                                slot.in_progress_hundredths += hundredths;
                                slot.in_progress = from_hundredths(slot.in_progress_hundredths);
                            } else {
                                slot.earned_hundredths += hundredths;
                                slot.credits = from_hundredths(slot.earned_hundredths);
                                if let Some(code) = course.code() {
                                    slot.highest_course_level =
                                        slot.highest_course_level.max(Some(code.number));
                                }
                            }
                        }
                        let category = placed.category.to_string();
                        if projected {
                            Disposition::InProgress {
                                category,
                                credits,
                                rule: placed.rule,
                            }
                        } else {
                            Disposition::Counted {
                                category,
                                credits,
                                rule: placed.rule,
                            }
                        }
                    }
                    // An unfinished course that fits nowhere is not yet a mismatch.
                    Err(_) if projected => Disposition::NoCredit {
                        reason: "in progress".to_string(),
                    },
                    Err(mismatch) => {
                        let reason = mismatch.reason.clone();
                        unclassified.push(mismatch);
                        Disposition::Unclassified { reason }
                    }
                },
            };

            dispositions.push(CourseDisposition {
                grade_level: year.grade_level,
                course: course.name.clone(),
                disposition,
            });
        }
    }

    tracing::debug!(
        student = %student.identifier,
        courses = dispositions.len(),
        unclassified = unclassified.len(),
        "Credits aggregated"
    );

    CreditLedger {
        earned,
        dispositions,
        unclassified,
    }
}

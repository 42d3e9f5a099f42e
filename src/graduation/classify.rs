use serde::Serialize;
use thiserror::Error;

use crate::models::Course;

use super::policy::RequirementPolicy;

/// A credit-bearing course that no category accepts.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("Grade {grade_level}: {course:?} earns credit but matches no requirement category ({reason})")]
pub struct PolicyMismatchError {
    pub grade_level: u8,
    pub course: String,
    pub reason: String,
}

/// Which classification step placed a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationRule {
    Alias,
    SubjectPrefix,
    Elective,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification<'p> {
    pub category: &'p str,
    pub rule: ClassificationRule,
}

/// Place a course in exactly one category.
///
/// Order: alias on the full name, alias on the course code, longest subject
/// prefix, then the elective catch-all unless the course is elective-exempt.
pub fn classify<'p>(
    policy: &'p RequirementPolicy,
    course: &Course,
    grade_level: u8,
) -> Result<Classification<'p>, PolicyMismatchError> {
    let by_alias = policy
        .alias_category(&course.name)
        .or_else(|| course.code().and_then(|code| policy.alias_category(&code.raw)));
    if let Some(category) = by_alias {
        return Ok(Classification {
            category,
            rule: ClassificationRule::Alias,
        });
    }

    if let Some(category) = policy.prefix_category(&course.name) {
        return Ok(Classification {
            category,
            rule: ClassificationRule::SubjectPrefix,
        });
    }

    let mismatch = |reason: String| PolicyMismatchError {
        grade_level,
        course: course.name.clone(),
        reason,
    };

    let Some(elective) = policy.elective() else {
        return Err(mismatch("no alias or subject prefix matches".into()));
    };
    if let Some(pattern) = elective.exempt_match(&course.name) {
        return Err(mismatch(format!("excluded from electives by {pattern:?}")));
    }

    Ok(Classification {
        category: elective.category.as_str(),
        rule: ClassificationRule::Elective,
    })
}

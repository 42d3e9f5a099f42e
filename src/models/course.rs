use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::grade::LetterGrade;

/// Subject code at the start of a course title, e.g. `MA401` or `HU201A`.
static COURSE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{2,4})(\d{3})[A-Z]?\b").unwrap());

/// Parsed subject code of a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseCode {
    /// Full code as printed (`HU201`).
    pub raw: String,
    /// Alphabetic subject part (`HU`).
    pub subject: String,
    /// Numeric level (`201`).
    pub number: u16,
}

impl CourseCode {
    /// Extract the code from the start of a course title, if it has one.
    pub fn parse(title: &str) -> Option<Self> {
        let caps = COURSE_CODE.captures(title.trim_start())?;
        let raw = caps.get(0)?.as_str().to_string();
        let subject = caps.get(1)?.as_str().to_string();
        let number = caps.get(2)?.as_str().parse().ok()?;
        Some(Self {
            raw,
            subject,
            number,
        })
    }
}

/// One enrollment line of a transcript. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "Course")]
    pub name: String,
    #[serde(rename = "Grade")]
    pub letter_grade: LetterGrade,
}

impl Course {
    pub fn new(name: impl Into<String>, letter_grade: LetterGrade) -> Self {
        Self {
            name: name.into(),
            letter_grade,
        }
    }

    pub fn code(&self) -> Option<CourseCode> {
        CourseCode::parse(&self.name)
    }
}

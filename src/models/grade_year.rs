use serde::{Deserialize, Serialize};

use super::course::Course;

/// Lowest and highest grade levels a high-school transcript covers.
pub const MIN_GRADE_LEVEL: u8 = 9;
pub const MAX_GRADE_LEVEL: u8 = 12;

/// One academic year of a transcript.
///
/// `year_average` is `None` when the document does not print it; a zero is a
/// real average and is never used as a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeYear {
    #[serde(rename = "Grade Level")]
    pub grade_level: u8,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Term GPAs")]
    pub term_gpas: Vec<f64>,
    #[serde(rename = "Year Average")]
    pub year_average: Option<f64>,
    #[serde(rename = "Courses")]
    pub courses: Vec<Course>,
}

impl GradeYear {
    pub fn is_supported_level(level: u8) -> bool {
        (MIN_GRADE_LEVEL..=MAX_GRADE_LEVEL).contains(&level)
    }

    /// Mean of the term GPAs, if any were printed.
    pub fn term_mean(&self) -> Option<f64> {
        if self.term_gpas.is_empty() {
            return None;
        }
        Some(self.term_gpas.iter().sum::<f64>() / self.term_gpas.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::grade::LetterGrade;

    fn year() -> GradeYear {
        GradeYear {
            grade_level: 10,
            year: "2022-2023".into(),
            term_gpas: vec![3.5, 3.7, 3.9],
            year_average: None,
            courses: vec![Course::new("SC201 Chemistry", LetterGrade::B)],
        }
    }

    #[test]
    fn supported_levels() {
        assert!(GradeYear::is_supported_level(9));
        assert!(GradeYear::is_supported_level(12));
        assert!(!GradeYear::is_supported_level(8));
        assert!(!GradeYear::is_supported_level(13));
    }

    #[test]
    fn term_mean_averages_terms() {
        let mean = year().term_mean().unwrap();
        assert!((mean - 3.7).abs() < 1e-9);
    }

    #[test]
    fn absent_average_serializes_as_null() {
        let json = serde_json::to_value(year()).unwrap();
        assert!(json["Year Average"].is_null());
        assert_eq!(json["Grade Level"], 10);
        assert_eq!(json["Year"], "2022-2023");
        assert_eq!(json["Courses"][0]["Grade"], "B");
    }
}

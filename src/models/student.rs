use std::path::Path;

use serde::{Deserialize, Serialize};

use super::grade_year::GradeYear;

/// A student's parsed transcript: one `GradeYear` per grade level attended,
/// ordered by grade level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub identifier: String,
    pub grade_years: Vec<GradeYear>,
}

impl Student {
    /// Derive the student identifier from an uploaded filename
    /// (`transcripts/jane_doe.pdf` → `jane_doe`).
    pub fn identifier_from_filename(filename: &str) -> String {
        let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        let stem = Path::new(base)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(base)
            .trim();
        if stem.is_empty() {
            "unnamed".to_string()
        } else {
            stem.to_string()
        }
    }

    /// Grade level of the first year on record (decides the requirement track).
    pub fn entry_grade(&self) -> Option<u8> {
        self.grade_years.first().map(|y| y.grade_level)
    }

    pub fn course_count(&self) -> usize {
        self.grade_years.iter().map(|y| y.courses.len()).sum()
    }

    /// The `{ "Grades": [...] }` shape returned by the single-document endpoint.
    pub fn grades_view(&self) -> GradesView<'_> {
        GradesView {
            grades: &self.grade_years,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GradesView<'a> {
    #[serde(rename = "Grades")]
    pub grades: &'a [GradeYear],
}

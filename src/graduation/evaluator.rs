//! Graduation evaluator: compares earned credits against the track selected
//! by the student's entry grade.
//!
//! Output is deterministic. Categories are emitted in catalogue order and the
//! JSON shape is written by hand, so evaluating the same `Student` twice
//! yields byte-identical output.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::models::{format_number, Student};
use crate::pipeline::structuring::DataGap;

use super::classify::PolicyMismatchError;
use super::credits::{aggregate_credits, from_hundredths, to_hundredths, CreditLedger};
use super::policy::{RequirementCategory, RequirementPolicy};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("No grade records available; graduation eligibility cannot be determined")]
    NoGradeYears,

    #[error("Entry grade {0} has no requirement track")]
    UnsupportedEntryGrade(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Met,
    NotMet,
    /// Not met, but the document had grade rows that could not be read.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryProgress {
    pub category: String,
    #[serde(serialize_with = "serialize_credits")]
    pub credits_earned: f64,
    #[serde(serialize_with = "serialize_credits")]
    pub credits_required: f64,
    /// Projected credit of in-progress enrollments, not part of `credits_earned`.
    #[serde(serialize_with = "serialize_credits")]
    pub credits_in_progress: f64,
    pub status: ProgressStatus,
    pub met: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_course_level: Option<u16>,
    /// False when a minimum course level applies and no counted course reaches it.
    pub level_satisfied: bool,
}

impl CategoryProgress {
    /// The one-line rendering shown under "Student Progress".
    pub fn summary(&self) -> String {
        let ratio = format!(
            "{}/{}",
            format_number(self.credits_earned),
            format_number(self.credits_required)
        );
        match self.status {
            ProgressStatus::Met => format!("✅ Met: {ratio}"),
            ProgressStatus::Unavailable => format!("⚠️ Data unavailable: {ratio}"),
            ProgressStatus::NotMet if !self.level_satisfied => format!(
                "❌ Not met: requires a {}+ level course ({ratio})",
                self.min_course_level.unwrap_or_default()
            ),
            ProgressStatus::NotMet => format!("❌ Not met: {ratio}"),
        }
    }
}

/// Verdict for one student.
#[derive(Debug, Clone, PartialEq)]
pub struct GraduationCheck {
    /// Requirements of the applied track, catalogue order.
    pub requirements: Vec<RequirementCategory>,
    /// One entry per requirement, then categories outside the track that
    /// earned credit (required 0).
    pub progress: Vec<CategoryProgress>,
    pub met_all_requirements: bool,
    pub policy_version: String,
    pub entry_grade: u8,
    pub unclassified: Vec<PolicyMismatchError>,
    pub data_gaps: Vec<DataGap>,
}

impl GraduationCheck {
    pub fn progress_for(&self, category: &str) -> Option<&CategoryProgress> {
        self.progress.iter().find(|p| p.category == category)
    }
}

/// Evaluate a student against the policy.
///
/// `data_gaps` are courses the source document printed but the record lost:
/// unreadable grades and blocks dropped as conflicting. When any exist, unmet categories report `Unavailable`
/// instead of `NotMet`.
pub fn evaluate(
    policy: &RequirementPolicy,
    student: &Student,
    data_gaps: &[DataGap],
) -> Result<GraduationCheck, EvaluationError> {
    let entry_grade = student.entry_grade().ok_or(EvaluationError::NoGradeYears)?;
    let requirements = policy
        .requirements_for(entry_grade)
        .ok_or(EvaluationError::UnsupportedEntryGrade(entry_grade))?;

    let ledger = aggregate_credits(policy, student);
    let has_gaps = !data_gaps.is_empty();

    let mut progress: Vec<CategoryProgress> = requirements
        .iter()
        .map(|req| {
            category_progress(
                &ledger,
                &req.name,
                req.credits_required,
                req.min_course_level,
                has_gaps,
            )
        })
        .collect();

    // Credit earned outside the track is still reported.
    for earned in &ledger.earned {
        let in_track = requirements.iter().any(|r| r.name == earned.category);
        if !in_track && earned.earned_hundredths() > 0 {
            progress.push(category_progress(&ledger, &earned.category, 0.0, None, has_gaps));
        }
    }

    let met_all_requirements = progress.iter().all(|p| p.met);

    tracing::debug!(
        student = %student.identifier,
        entry_grade,
        met_all_requirements,
        data_gaps = data_gaps.len(),
        "Graduation check evaluated"
    );

    Ok(GraduationCheck {
        requirements,
        progress,
        met_all_requirements,
        policy_version: policy.version().to_string(),
        entry_grade,
        unclassified: ledger.unclassified,
        data_gaps: data_gaps.to_vec(),
    })
}

fn category_progress(
    ledger: &CreditLedger,
    category: &str,
    required: f64,
    min_course_level: Option<u16>,
    has_gaps: bool,
) -> CategoryProgress {
    let earned = ledger.earned_hundredths_in(category);
    let level_satisfied = match min_course_level {
        Some(level) => ledger
            .highest_level_in(category)
            .is_some_and(|highest| highest >= level),
        None => true,
    };

    let status = if earned >= to_hundredths(required) && level_satisfied {
        ProgressStatus::Met
    } else if has_gaps {
        ProgressStatus::Unavailable
    } else {
        ProgressStatus::NotMet
    };

    CategoryProgress {
        category: category.to_string(),
        credits_earned: from_hundredths(earned),
        credits_required: required,
        credits_in_progress: from_hundredths(ledger.in_progress_hundredths_in(category)),
        status,
        met: status == ProgressStatus::Met,
        min_course_level,
        level_satisfied,
    }
}

// ---------------------------------------------------------------------------
// JSON shape
// ---------------------------------------------------------------------------

/// Whole credit counts serialize as integers.
fn serialize_credits<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < 1e12 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

struct Credits(f64);

impl Serialize for Credits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_credits(&self.0, serializer)
    }
}

struct RequirementTable<'a>(&'a [RequirementCategory]);

impl Serialize for RequirementTable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for req in self.0 {
            map.serialize_entry(&req.name, &Credits(req.credits_required))?;
        }
        map.end()
    }
}

struct ProgressTable<'a>(&'a [CategoryProgress]);

impl Serialize for ProgressTable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(&entry.category, &entry.summary())?;
        }
        map.end()
    }
}

/// Single-key wrapper: `{"<label>": inner}`.
struct Labelled<'a, T>(&'static str, &'a T);

impl<T: Serialize> Serialize for Labelled<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.0, self.1)?;
        map.end()
    }
}

impl Serialize for GraduationCheck {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GraduationCheck", 8)?;
        state.serialize_field(
            "requirements",
            &Labelled("Graduation Requirements", &RequirementTable(&self.requirements)),
        )?;
        state.serialize_field(
            "progress",
            &Labelled("Student Progress", &ProgressTable(&self.progress)),
        )?;
        state.serialize_field("met_all_requirements", &self.met_all_requirements)?;
        state.serialize_field("policy_version", &self.policy_version)?;
        state.serialize_field("entry_grade", &self.entry_grade)?;
        state.serialize_field("details", &self.progress)?;
        state.serialize_field("unclassified", &self.unclassified)?;
        state.serialize_field("data_gaps", &self.data_gaps)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Course, GradeYear, LetterGrade};

    fn two_category_policy() -> RequirementPolicy {
        RequirementPolicy::from_json_str(
            r#"{
                "version": "test",
                "categories": [{"name": "Mathematics"}, {"name": "English"}],
                "tracks": [{"requirements": {"Mathematics": 3, "English": 4}}],
                "subject_prefixes": {"MA": "Mathematics", "EN": "English"}
            }"#,
        )
        .unwrap()
    }

    fn student(level: u8, courses: &[(&str, LetterGrade)]) -> Student {
        Student {
            identifier: "student".into(),
            grade_years: vec![GradeYear {
                grade_level: level,
                year: "2021-2022".into(),
                term_gpas: vec![3.0],
                year_average: Some(3.0),
                courses: courses
                    .iter()
                    .map(|(name, grade)| Course::new(*name, *grade))
                    .collect(),
            }],
        }
    }

    fn three_and_three() -> Student {
        student(
            9,
            &[
                ("MA101 Algebra I", LetterGrade::A),
                ("MA201 Geometry", LetterGrade::B),
                ("MA301 Algebra II", LetterGrade::BPlus),
                ("EN101 English 9", LetterGrade::A),
                ("EN201 English 10", LetterGrade::AMinus),
                ("EN301 English 11", LetterGrade::C),
            ],
        )
    }

    #[test]
    fn math_met_english_short() {
        let check = evaluate(&two_category_policy(), &three_and_three(), &[]).unwrap();

        let math = check.progress_for("Mathematics").unwrap();
        assert!(math.met);
        assert_eq!(math.credits_earned, 3.0);
        assert_eq!(math.summary(), "✅ Met: 3/3");

        let english = check.progress_for("English").unwrap();
        assert!(!english.met);
        assert_eq!(english.status, ProgressStatus::NotMet);
        assert_eq!(english.summary(), "❌ Not met: 3/4");

        assert!(!check.met_all_requirements);
    }

    #[test]
    fn json_shape_is_ordered_and_integral() {
        let check = evaluate(&two_category_policy(), &three_and_three(), &[]).unwrap();
        let value = serde_json::to_value(&check).unwrap();

        assert_eq!(
            value["requirements"]["Graduation Requirements"]["Mathematics"],
            serde_json::json!(3)
        );
        assert_eq!(
            value["progress"]["Student Progress"]["English"],
            "❌ Not met: 3/4"
        );
        assert_eq!(value["met_all_requirements"], false);
        assert_eq!(value["entry_grade"], 9);
        assert_eq!(value["details"][0]["status"], "met");

        let text = serde_json::to_string(&check).unwrap();
        let math_at = text.find("\"Mathematics\"").unwrap();
        let english_at = text.find("\"English\"").unwrap();
        assert!(math_at < english_at);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let policy = RequirementPolicy::builtin().unwrap();
        let s = three_and_three();
        let first = serde_json::to_string(&evaluate(&policy, &s, &[]).unwrap()).unwrap();
        let second = serde_json::to_string(&evaluate(&policy, &s, &[]).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn enough_credits_meets_everything() {
        let s = student(
            10,
            &[
                ("MA101 Algebra I", LetterGrade::A),
                ("MA201 Geometry", LetterGrade::B),
                ("MA301 Algebra II", LetterGrade::BPlus),
                ("MA401 Calculus", LetterGrade::BPlus),
                ("EN101 English 9", LetterGrade::A),
                ("EN201 English 10", LetterGrade::AMinus),
                ("EN301 English 11", LetterGrade::C),
                ("EN401 English 12", LetterGrade::Pass),
            ],
        );
        let check = evaluate(&two_category_policy(), &s, &[]).unwrap();
        assert!(check.met_all_requirements);
        assert!(check.progress.iter().all(|p| p.status == ProgressStatus::Met));
    }

    #[test]
    fn progress_credit_sum_matches_counted_courses() {
        let policy = RequirementPolicy::builtin().unwrap();
        let s = student(
            9,
            &[
                ("VA101 Drawing", LetterGrade::A),
                ("EN101 English 9", LetterGrade::B),
                ("PE101 Fitness", LetterGrade::Pass),
                ("SC101 Biology", LetterGrade::F),
                ("Study Hall", LetterGrade::Pass),
            ],
        );
        let check = evaluate(&policy, &s, &[]).unwrap();
        let sum: f64 = check.progress.iter().map(|p| p.credits_earned).sum();
        assert_eq!(sum, 3.0);
        assert_eq!(check.unclassified.len(), 1);
        // Elective is outside the grade 9 track but earned credit.
        let elective = check.progress_for("Elective").unwrap();
        assert_eq!(elective.credits_required, 0.0);
        assert!(elective.met);
    }

    #[test]
    fn math_needs_a_400_level_course() {
        let policy = RequirementPolicy::builtin().unwrap();
        let s = student(12, &[("MA301 Algebra II", LetterGrade::A)]);
        let check = evaluate(&policy, &s, &[]).unwrap();
        let math = check.progress_for("Mathematics").unwrap();
        assert!(!math.met);
        assert!(!math.level_satisfied);
        assert_eq!(math.summary(), "❌ Not met: requires a 400+ level course (1/1)");

        let s = student(12, &[("MA401 Calculus", LetterGrade::A)]);
        let check = evaluate(&policy, &s, &[]).unwrap();
        assert!(check.progress_for("Mathematics").unwrap().met);
    }

    #[test]
    fn unreadable_rows_turn_shortfalls_into_unavailable() {
        let gap = DataGap::UnreadableGrade(crate::pipeline::structuring::UnparseableCourseError {
            grade_level: 9,
            course: "EN401 English 12".into(),
            token: "Z".into(),
            page: 1,
        });
        let check = evaluate(&two_category_policy(), &three_and_three(), &[gap]).unwrap();

        assert_eq!(check.progress_for("Mathematics").unwrap().status, ProgressStatus::Met);
        let english = check.progress_for("English").unwrap();
        assert_eq!(english.status, ProgressStatus::Unavailable);
        assert_eq!(english.summary(), "⚠️ Data unavailable: 3/4");
        assert!(!check.met_all_requirements);
        assert_eq!(check.data_gaps.len(), 1);
    }

    #[test]
    fn no_grade_years_is_an_error() {
        let s = Student {
            identifier: "empty".into(),
            grade_years: vec![],
        };
        assert_eq!(
            evaluate(&two_category_policy(), &s, &[]).unwrap_err(),
            EvaluationError::NoGradeYears
        );
    }

    #[test]
    fn unsupported_entry_grade() {
        let policy = RequirementPolicy::builtin().unwrap();
        let s = student(9, &[]);
        let s = Student {
            grade_years: vec![GradeYear {
                grade_level: 7,
                ..s.grade_years[0].clone()
            }],
            ..s
        };
        assert_eq!(
            evaluate(&policy, &s, &[]).unwrap_err(),
            EvaluationError::UnsupportedEntryGrade(7)
        );
    }

    #[test]
    fn half_credits_render_as_decimals() {
        let policy = RequirementPolicy::builtin().unwrap();
        let s = student(12, &[("EN401 Poetry Semester", LetterGrade::A)]);
        let check = evaluate(&policy, &s, &[]).unwrap();
        let english = check.progress_for("English").unwrap();
        assert_eq!(english.summary(), "❌ Not met: 0.5/2");
        let value = serde_json::to_value(&check).unwrap();
        let details = value["details"].as_array().unwrap();
        let entry = details.iter().find(|d| d["category"] == "English").unwrap();
        assert_eq!(entry["credits_earned"], serde_json::json!(0.5));
    }

    fn tenths_policy(count_in_progress: bool) -> RequirementPolicy {
        RequirementPolicy::from_json_str(&format!(
            r#"{{
                "version": "tenths",
                "categories": [{{"name": "Arts"}}],
                "tracks": [{{"requirements": {{"Arts": 1}}}}],
                "subject_prefixes": {{"VA": "Arts"}},
                "weight_rules": [
                    {{"pattern": "(?i)workshop", "credits": 0.1}},
                    {{"pattern": "(?i)studio", "credits": 0.7}}
                ],
                "count_in_progress": {count_in_progress}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn ten_tenth_credits_meet_one_credit() {
        let workshops = vec![("VA101 Workshop", LetterGrade::A); 10];
        let check = evaluate(&tenths_policy(false), &student(9, &workshops), &[]).unwrap();
        let arts = check.progress_for("Arts").unwrap();
        assert_eq!(arts.status, ProgressStatus::Met);
        assert_eq!(arts.summary(), "✅ Met: 1/1");
        assert!(check.met_all_requirements);

        let mixed = student(
            9,
            &[
                ("VA201 Studio", LetterGrade::B),
                ("VA101 Workshop", LetterGrade::A),
                ("VA101 Workshop", LetterGrade::A),
                ("VA101 Workshop", LetterGrade::A),
            ],
        );
        let check = evaluate(&tenths_policy(false), &mixed, &[]).unwrap();
        assert_eq!(check.progress_for("Arts").unwrap().summary(), "✅ Met: 1/1");
    }

    #[test]
    fn in_progress_is_projected_unless_policy_counts_it() {
        let s = student(
            9,
            &[
                ("VA201 Studio", LetterGrade::B),
                ("VA101 Workshop", LetterGrade::InProgress),
                ("VA102 Workshop", LetterGrade::InProgress),
                ("VA103 Workshop", LetterGrade::InProgress),
            ],
        );

        let check = evaluate(&tenths_policy(false), &s, &[]).unwrap();
        let arts = check.progress_for("Arts").unwrap();
        assert_eq!(arts.status, ProgressStatus::NotMet);
        assert_eq!(arts.credits_earned, 0.7);
        assert!((arts.credits_in_progress - 0.3).abs() < 1e-9);
        let value = serde_json::to_value(&check).unwrap();
        assert_eq!(value["details"][0]["credits_in_progress"], serde_json::json!(0.3));

        let check = evaluate(&tenths_policy(true), &s, &[]).unwrap();
        let arts = check.progress_for("Arts").unwrap();
        assert_eq!(arts.status, ProgressStatus::Met);
        assert_eq!(arts.credits_in_progress, 0.0);
    }
}

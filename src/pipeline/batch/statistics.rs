//! Collective-mode summary over every student a batch could read.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::grade::GRADE_POINT_SCALE_MAX;
use crate::models::{GradeYear, Student};

/// Which figure of a record feeds the distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpaSource {
    /// The year average of the highest grade level that prints one.
    #[default]
    LatestYearAverage,
    /// Every printed term GPA.
    TermGpas,
    /// Grade points of every lettered or numeric course mark.
    CourseGradePoints,
}

impl GpaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LatestYearAverage => "latest_year_average",
            Self::TermGpas => "term_gpas",
            Self::CourseGradePoints => "course_grade_points",
        }
    }
}

impl fmt::Display for GpaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GpaSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "latest_year_average" => Ok(Self::LatestYearAverage),
            "term_gpas" => Ok(Self::TermGpas),
            "course_grade_points" => Ok(Self::CourseGradePoints),
            other => Err(format!("unknown GPA source {other:?}")),
        }
    }
}

/// Restricts which grade years contribute.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatisticsFilter {
    /// `YYYY-YYYY`
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub min_grade_level: Option<u8>,
    #[serde(default)]
    pub max_grade_level: Option<u8>,
}

impl StatisticsFilter {
    fn accepts(&self, year: &GradeYear) -> bool {
        self.academic_year.as_deref().map_or(true, |y| y == year.year)
            && self.min_grade_level.map_or(true, |min| year.grade_level >= min)
            && self.max_grade_level.map_or(true, |max| year.grade_level <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStatistics {
    pub gpa_source: GpaSource,
    /// Data points in the distribution.
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub buckets: Vec<HistogramBucket>,
    /// Students read successfully but with no value for the chosen source.
    pub excluded_no_data: usize,
    /// Documents that failed before a record could be built.
    pub excluded_failed: usize,
}

impl AggregateStatistics {
    /// Upper bound of the histogram range.
    pub fn range_max(&self) -> f64 {
        self.buckets.last().map_or(GRADE_POINT_SCALE_MAX, |b| b.upper)
    }
}

/// Values a single student contributes under `source`.
pub fn student_values(student: &Student, source: GpaSource, filter: &StatisticsFilter) -> Vec<f64> {
    let years = student.grade_years.iter().filter(|y| filter.accepts(y));
    let values: Vec<f64> = match source {
        GpaSource::LatestYearAverage => years
            .filter_map(|y| y.year_average.map(|avg| (y.grade_level, avg)))
            .max_by_key(|(level, _)| *level)
            .map(|(_, avg)| avg)
            .into_iter()
            .collect(),
        GpaSource::TermGpas => years.flat_map(|y| y.term_gpas.iter().copied()).collect(),
        GpaSource::CourseGradePoints => years
            .flat_map(|y| y.courses.iter().filter_map(|c| c.letter_grade.grade_points()))
            .collect(),
    };
    values.into_iter().filter(|v| v.is_finite()).collect()
}

/// Build the distribution over `students`.
pub fn build_statistics<'a>(
    students: impl IntoIterator<Item = &'a Student>,
    failed_documents: usize,
    source: GpaSource,
    filter: &StatisticsFilter,
    bins: usize,
) -> AggregateStatistics {
    let mut values = Vec::new();
    let mut excluded_no_data = 0;

    for student in students {
        let contributed = student_values(student, source, filter);
        if contributed.is_empty() {
            excluded_no_data += 1;
        }
        values.extend(contributed);
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let count = values.len();
    let min = values.first().copied();
    let max = values.last().copied();
    let mean = (count > 0).then(|| values.iter().sum::<f64>() / count as f64);
    let median = match count {
        0 => None,
        n if n % 2 == 1 => Some(values[n / 2]),
        n => Some((values[n / 2 - 1] + values[n / 2]) / 2.0),
    };

    let upper = max.map_or(GRADE_POINT_SCALE_MAX, |m| m.max(GRADE_POINT_SCALE_MAX));
    let buckets = histogram(&values, upper, bins.max(1));

    tracing::debug!(
        source = source.as_str(),
        count,
        excluded_no_data,
        excluded_failed = failed_documents,
        "Statistics built"
    );

    AggregateStatistics {
        gpa_source: source,
        count,
        mean,
        median,
        min,
        max,
        buckets,
        excluded_no_data,
        excluded_failed: failed_documents,
    }
}

/// Equal-width buckets over `[0, upper]`; the top edge is inclusive.
fn histogram(values: &[f64], upper: f64, bins: usize) -> Vec<HistogramBucket> {
    let width = upper / bins as f64;
    let mut buckets: Vec<HistogramBucket> = (0..bins)
        .map(|i| HistogramBucket {
            lower: width * i as f64,
            upper: if i + 1 == bins { upper } else { width * (i + 1) as f64 },
            count: 0,
        })
        .collect();

    for value in values {
        let index = ((value.max(0.0) / width) as usize).min(bins - 1);
        buckets[index].count += 1;
    }
    buckets
}

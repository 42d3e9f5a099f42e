use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Lowest numeric-scale mark that still earns credit.
pub const NUMERIC_PASSING_MARK: f64 = 60.0;

/// Grade-point ceiling of the letter scale (A+).
pub const GRADE_POINT_SCALE_MAX: f64 = 4.3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognized grade token: {0:?}")]
pub struct GradeParseError(pub String);

/// A mark printed in the grade column of a transcript.
///
/// Covers the plus/minus letter scale, pass/no-pass, the administrative
/// marks (in progress, withdrawn, incomplete) and percentage marks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LetterGrade {
    APlus,
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    DPlus,
    D,
    DMinus,
    F,
    Pass,
    NoPass,
    InProgress,
    Withdrawn,
    Incomplete,
    Numeric(f64),
}

impl LetterGrade {
    /// Grade points on the 4.3 scale. `None` for marks that carry no points.
    pub fn grade_points(&self) -> Option<f64> {
        let points = match self {
            Self::APlus => 4.3,
            Self::A => 4.0,
            Self::AMinus => 3.7,
            Self::BPlus => 3.3,
            Self::B => 3.0,
            Self::BMinus => 2.7,
            Self::CPlus => 2.3,
            Self::C => 2.0,
            Self::CMinus => 1.7,
            Self::DPlus => 1.3,
            Self::D => 1.0,
            Self::DMinus => 0.7,
            Self::F => 0.0,
            Self::Numeric(mark) => numeric_to_points(*mark),
            Self::Pass | Self::NoPass | Self::InProgress | Self::Withdrawn | Self::Incomplete => {
                return None
            }
        };
        Some(points)
    }

    /// Whether a course with this mark contributes credit toward graduation.
    pub fn is_credit_bearing(&self) -> bool {
        match self {
            Self::F | Self::NoPass | Self::InProgress | Self::Withdrawn | Self::Incomplete => false,
            Self::Numeric(mark) => *mark >= NUMERIC_PASSING_MARK,
            _ => true,
        }
    }

    /// Human-readable reason a mark earns no credit.
    pub fn non_credit_reason(&self) -> Option<&'static str> {
        match self {
            Self::F | Self::NoPass => Some("failed"),
            Self::InProgress => Some("in progress"),
            Self::Withdrawn => Some("withdrawn"),
            Self::Incomplete => Some("incomplete"),
            Self::Numeric(mark) if *mark < NUMERIC_PASSING_MARK => Some("below passing mark"),
            _ => None,
        }
    }
}

/// Percentage → grade points, using the usual 10-point bands.
fn numeric_to_points(mark: f64) -> f64 {
    match mark {
        m if m >= 97.0 => 4.3,
        m if m >= 93.0 => 4.0,
        m if m >= 90.0 => 3.7,
        m if m >= 87.0 => 3.3,
        m if m >= 83.0 => 3.0,
        m if m >= 80.0 => 2.7,
        m if m >= 77.0 => 2.3,
        m if m >= 73.0 => 2.0,
        m if m >= 70.0 => 1.7,
        m if m >= 67.0 => 1.3,
        m if m >= 63.0 => 1.0,
        m if m >= 60.0 => 0.7,
        _ => 0.0,
    }
}

impl FromStr for LetterGrade {
    type Err = GradeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '\u{2212}' | '\u{2013}' | '\u{2010}' => '-',
                other => other.to_ascii_uppercase(),
            })
            .filter(|c| !c.is_whitespace())
            .collect();

        let grade = match normalized.as_str() {
            "A+" => Self::APlus,
            "A" => Self::A,
            "A-" => Self::AMinus,
            "B+" => Self::BPlus,
            "B" => Self::B,
            "B-" => Self::BMinus,
            "C+" => Self::CPlus,
            "C" => Self::C,
            "C-" => Self::CMinus,
            "D+" => Self::DPlus,
            "D" => Self::D,
            "D-" => Self::DMinus,
            "F" | "E" => Self::F,
            "P" | "PASS" | "CR" => Self::Pass,
            "NP" | "NC" => Self::NoPass,
            "IP" => Self::InProgress,
            "W" | "WD" => Self::Withdrawn,
            "I" | "INC" => Self::Incomplete,
            other => {
                let mark: f64 = other
                    .parse()
                    .map_err(|_| GradeParseError(s.trim().to_string()))?;
                if !(0.0..=100.0).contains(&mark) || !mark.is_finite() {
                    return Err(GradeParseError(s.trim().to_string()));
                }
                Self::Numeric(mark)
            }
        };

        Ok(grade)
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::AMinus => "A-",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::BMinus => "B-",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::CMinus => "C-",
            Self::DPlus => "D+",
            Self::D => "D",
            Self::DMinus => "D-",
            Self::F => "F",
            Self::Pass => "P",
            Self::NoPass => "NP",
            Self::InProgress => "IP",
            Self::Withdrawn => "W",
            Self::Incomplete => "INC",
            Self::Numeric(mark) => return f.write_str(&format_number(*mark)),
        };
        f.write_str(token)
    }
}

impl Serialize for LetterGrade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LetterGrade {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Render a number without a trailing `.0` for whole values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e12 {
        format!("{}", value as i64)
    } else {
        let mut text = format!("{value:.2}");
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
        text
    }
}

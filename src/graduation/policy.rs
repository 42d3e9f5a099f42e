//! Requirement policy: the category catalogue, per-entry-grade credit tracks
//! and the course classification tables.
//!
//! Loaded and validated once at startup, then shared read-only behind an
//! `Arc`. Every evaluation sees the same snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BUILTIN_POLICY_VERSION: &str = "2024.1";
pub const ELECTIVE: &str = "Elective";

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Cannot read policy file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Policy JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid policy: {0}")]
    Invalid(String),

    #[error("Invalid pattern {pattern:?} in policy: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

// ---------------------------------------------------------------------------
// Serialized form
// ---------------------------------------------------------------------------

/// Policy as written in JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyDocument {
    pub version: String,
    pub categories: Vec<CategoryDefinition>,
    pub tracks: Vec<TrackDefinition>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub subject_prefixes: BTreeMap<String, String>,
    #[serde(default)]
    pub elective: Option<ElectiveDefinition>,
    #[serde(default)]
    pub weight_rules: Vec<WeightDefinition>,
    #[serde(default = "default_credit")]
    pub default_credit: f64,
    /// Count in-progress (`IP`) enrollments toward their category as if
    /// completed. Off by default: they are reported as projected credit.
    #[serde(default)]
    pub count_in_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryDefinition {
    pub name: String,
    /// At least one counted course must have a code number at or above this.
    #[serde(default)]
    pub min_course_level: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackDefinition {
    /// Grade level of the first year on record. `None` matches any entry grade
    /// without a dedicated track.
    #[serde(default)]
    pub entry_grade: Option<u8>,
    pub requirements: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElectiveDefinition {
    pub category: String,
    /// Course names matching any of these are never electives.
    #[serde(default)]
    pub exempt_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightDefinition {
    pub pattern: String,
    pub credits: f64,
}

fn default_credit() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Validated form
// ---------------------------------------------------------------------------

/// A requirement category as it applies to one track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementCategory {
    pub name: String,
    pub credits_required: f64,
    pub min_course_level: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct WeightRule {
    pub pattern: Regex,
    pub credits: f64,
}

#[derive(Debug, Clone)]
pub struct ElectiveRule {
    pub category: String,
    pub exempt: Vec<Regex>,
}

#[derive(Debug, Clone)]
struct Track {
    entry_grade: Option<u8>,
    requirements: BTreeMap<String, f64>,
}

/// Validated, read-only requirement policy.
#[derive(Debug, Clone)]
pub struct RequirementPolicy {
    version: String,
    categories: Vec<CategoryDefinition>,
    tracks: Vec<Track>,
    /// Keys normalized with `normalize_key`.
    aliases: BTreeMap<String, String>,
    /// Uppercase prefix → category, longest first.
    prefixes: Vec<(String, String)>,
    elective: Option<ElectiveRule>,
    weight_rules: Vec<WeightRule>,
    default_credit: f64,
    count_in_progress: bool,
}

impl RequirementPolicy {
    /// Validate a policy document and compile its patterns.
    pub fn from_document(doc: PolicyDocument) -> Result<Self, PolicyError> {
        if doc.version.trim().is_empty() {
            return Err(PolicyError::Invalid("version must not be empty".into()));
        }

        // 1. Catalogue
        if doc.categories.is_empty() {
            return Err(PolicyError::Invalid("no categories defined".into()));
        }
        let mut names = BTreeSet::new();
        for category in &doc.categories {
            if category.name.trim().is_empty() {
                return Err(PolicyError::Invalid("category with empty name".into()));
            }
            if !names.insert(category.name.as_str()) {
                return Err(PolicyError::Invalid(format!(
                    "category {:?} defined twice",
                    category.name
                )));
            }
        }
        let known = |name: &str, context: &str| -> Result<(), PolicyError> {
            if names.contains(name) {
                Ok(())
            } else {
                Err(PolicyError::Invalid(format!(
                    "{context} refers to unknown category {name:?}"
                )))
            }
        };

        // 2. Tracks
        if doc.tracks.is_empty() {
            return Err(PolicyError::Invalid("no requirement tracks defined".into()));
        }
        let mut entry_grades = BTreeSet::new();
        for track in &doc.tracks {
            if !entry_grades.insert(track.entry_grade) {
                return Err(PolicyError::Invalid(format!(
                    "more than one track for entry grade {:?}",
                    track.entry_grade
                )));
            }
            for (category, credits) in &track.requirements {
                known(category.as_str(), "track requirement")?;
                if !credits.is_finite() || *credits < 0.0 {
                    return Err(PolicyError::Invalid(format!(
                        "credits for {category:?} must be a non-negative number"
                    )));
                }
            }
        }

        // 3. Classification tables
        let mut aliases = BTreeMap::new();
        for (alias, category) in &doc.aliases {
            known(category.as_str(), "alias")?;
            aliases.insert(normalize_key(alias), category.clone());
        }

        let mut prefixes = Vec::with_capacity(doc.subject_prefixes.len());
        for (prefix, category) in &doc.subject_prefixes {
            known(category.as_str(), "subject prefix")?;
            let prefix = prefix.trim().to_ascii_uppercase();
            if prefix.is_empty() {
                return Err(PolicyError::Invalid("empty subject prefix".into()));
            }
            prefixes.push((prefix, category.clone()));
        }
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let elective = match &doc.elective {
            Some(def) => {
                known(def.category.as_str(), "elective rule")?;
                Some(ElectiveRule {
                    category: def.category.clone(),
                    exempt: def
                        .exempt_patterns
                        .iter()
                        .map(|p| compile(p))
                        .collect::<Result<_, _>>()?,
                })
            }
            None => None,
        };

        // 4. Credit weights
        if !doc.default_credit.is_finite() || doc.default_credit <= 0.0 {
            return Err(PolicyError::Invalid("default_credit must be positive".into()));
        }
        let mut weight_rules = Vec::with_capacity(doc.weight_rules.len());
        for rule in &doc.weight_rules {
            if !rule.credits.is_finite() || rule.credits <= 0.0 {
                return Err(PolicyError::Invalid(format!(
                    "weight for pattern {:?} must be positive",
                    rule.pattern
                )));
            }
            weight_rules.push(WeightRule {
                pattern: compile(&rule.pattern)?,
                credits: rule.credits,
            });
        }

        let tracks = doc
            .tracks
            .iter()
            .map(|t| Track {
                entry_grade: t.entry_grade,
                requirements: t.requirements.clone(),
            })
            .collect();

        Ok(Self {
            version: doc.version,
            categories: doc.categories,
            tracks,
            aliases,
            prefixes,
            elective,
            weight_rules,
            default_credit: doc.default_credit,
            count_in_progress: doc.count_in_progress,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument = serde_json::from_str(json)?;
        Self::from_document(doc)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let json = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Load the policy file when one is configured, otherwise the built-in one.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, PolicyError> {
        let policy = match path {
            Some(path) => Self::load(path)?,
            None => Self::builtin()?,
        };
        tracing::info!(
            version = %policy.version,
            categories = policy.categories.len(),
            tracks = policy.tracks.len(),
            origin = path.map_or("builtin".to_string(), |p| p.display().to_string()),
            "Requirement policy loaded"
        );
        Ok(policy)
    }

    /// The school's published requirement tables.
    pub fn builtin() -> Result<Self, PolicyError> {
        Self::from_document(builtin_document())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Category names in catalogue order.
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn min_course_level(&self, category: &str) -> Option<u16> {
        self.categories
            .iter()
            .find(|c| c.name == category)
            .and_then(|c| c.min_course_level)
    }

    /// Requirements for a student whose record starts at `entry_grade`,
    /// in catalogue order. `None` if no track applies.
    pub fn requirements_for(&self, entry_grade: u8) -> Option<Vec<RequirementCategory>> {
        let track = self
            .tracks
            .iter()
            .find(|t| t.entry_grade == Some(entry_grade))
            .or_else(|| self.tracks.iter().find(|t| t.entry_grade.is_none()))?;

        Some(
            self.categories
                .iter()
                .filter_map(|c| {
                    track
                        .requirements
                        .get(&c.name)
                        .map(|credits| RequirementCategory {
                            name: c.name.clone(),
                            credits_required: *credits,
                            min_course_level: c.min_course_level,
                        })
                })
                .collect(),
        )
    }

    pub fn alias_category(&self, key: &str) -> Option<&str> {
        self.aliases.get(&normalize_key(key)).map(String::as_str)
    }

    /// Category of the longest subject prefix that `title` starts with.
    pub fn prefix_category(&self, title: &str) -> Option<&str> {
        let upper = title.trim().to_ascii_uppercase();
        self.prefixes
            .iter()
            .find(|(prefix, _)| upper.starts_with(prefix.as_str()))
            .map(|(_, category)| category.as_str())
    }

    pub fn elective(&self) -> Option<&ElectiveRule> {
        self.elective.as_ref()
    }

    /// Credit weight of a course: first matching weight rule, else the default.
    pub fn counts_in_progress(&self) -> bool {
        self.count_in_progress
    }

    pub fn credit_weight(&self, course_name: &str) -> f64 {
        self.weight_rules
            .iter()
            .find(|rule| rule.pattern.is_match(course_name))
            .map_or(self.default_credit, |rule| rule.credits)
    }
}

impl ElectiveRule {
    pub fn exempt_match(&self, course_name: &str) -> Option<&str> {
        self.exempt
            .iter()
            .find(|p| p.is_match(course_name))
            .map(|p| p.as_str())
    }
}

fn compile(pattern: &str) -> Result<Regex, PolicyError> {
    Regex::new(pattern).map_err(|source| PolicyError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Lowercase, trimmed, single-spaced lookup key.
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Built-in policy
// ---------------------------------------------------------------------------

const CATALOGUE: &[(&str, Option<u16>)] = &[
    ("Arts", None),
    ("English", None),
    ("Humanities-English", None),
    ("History", None),
    ("Humanities-Cultural Studies", None),
    ("Interdisciplinary", None),
    ("Language", None),
    ("Mathematics", Some(400)),
    ("Religion & Philosophy", None),
    ("Science", None),
    (ELECTIVE, None),
];

const SUBJECT_PREFIXES: &[(&str, &str)] = &[
    ("VA", "Arts"),
    ("EN", "English"),
    ("HU201", "Humanities-English"),
    ("HU204", "Humanities-Cultural Studies"),
    ("HI", "History"),
    ("IN", "Interdisciplinary"),
    ("LA", "Language"),
    ("MA", "Mathematics"),
    ("RP", "Religion & Philosophy"),
    ("SC", "Science"),
];

/// Credits required per category, keyed by entry grade.
const TRACKS: &[(u8, &[(&str, f64)])] = &[
    (
        9,
        &[
            ("Arts", 3.0),
            ("English", 9.0),
            ("Humanities-English", 3.0),
            ("History", 6.0),
            ("Humanities-Cultural Studies", 3.0),
            ("Interdisciplinary", 2.0),
            ("Language", 3.0),
            ("Mathematics", 1.0),
            ("Religion & Philosophy", 2.0),
            ("Science", 9.0),
        ],
    ),
    (
        10,
        &[
            ("Arts", 2.0),
            ("English", 9.0),
            ("History", 6.0),
            ("Interdisciplinary", 2.0),
            ("Language", 3.0),
            ("Mathematics", 1.0),
            ("Religion & Philosophy", 2.0),
            ("Science", 6.0),
        ],
    ),
    (
        11,
        &[
            ("Arts", 1.0),
            ("English", 6.0),
            ("History", 3.0),
            ("Interdisciplinary", 2.0),
            ("Language", 2.0),
            ("Mathematics", 1.0),
            ("Religion & Philosophy", 1.0),
            ("Science", 3.0),
        ],
    ),
    (
        12,
        &[
            ("Arts", 1.0),
            ("English", 2.0),
            ("History", 2.0),
            ("Interdisciplinary", 1.0),
            ("Language", 2.0),
            ("Mathematics", 1.0),
            ("Religion & Philosophy", 1.0),
        ],
    ),
];

fn builtin_document() -> PolicyDocument {
    PolicyDocument {
        version: BUILTIN_POLICY_VERSION.to_string(),
        categories: CATALOGUE
            .iter()
            .map(|(name, min_course_level)| CategoryDefinition {
                name: name.to_string(),
                min_course_level: *min_course_level,
            })
            .collect(),
        tracks: TRACKS
            .iter()
            .map(|(grade, reqs)| TrackDefinition {
                entry_grade: Some(*grade),
                requirements: reqs.iter().map(|(c, n)| (c.to_string(), *n)).collect(),
            })
            .collect(),
        aliases: BTreeMap::new(),
        subject_prefixes: SUBJECT_PREFIXES
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect(),
        elective: Some(ElectiveDefinition {
            category: ELECTIVE.to_string(),
            exempt_patterns: vec![
                r"(?i)^study\s+hall\b".to_string(),
                r"(?i)^advisory\b".to_string(),
                r"(?i)^homeroom\b".to_string(),
            ],
        }),
        weight_rules: vec![WeightDefinition {
            pattern: r"(?i)\bsemester\b".to_string(),
            credits: 0.5,
        }],
        default_credit: default_credit(),
        count_in_progress: false,
    }
}

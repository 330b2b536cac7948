//! Classroom grouping derived from a subject roster.
//!
//! The backend does not send classrooms alongside the roster, so each student's classroom is
//! inferred from whichever fields the roster entry carries, and the distinct results drive the
//! classroom filter.

use crate::api::lenient;
use crate::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Label used when a roster entry carries no classroom information at all.
pub const DEFAULT_CLASSROOM_LABEL: &str = "Default";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassroomRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectRef {
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub title: Option<String>,
}

/// Roster entry as returned by `GET /subjects/{id}/students`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub email: Option<String>,
    #[serde(default)]
    pub classroom: Option<ClassroomRef>,
    #[serde(default)]
    pub classroom_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub classroom_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub class_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub grade_level: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub section: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub homeroom: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_text")]
    pub subject_name: Option<String>,
    #[serde(default)]
    pub subject: Option<SubjectRef>,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

impl Student {
    pub fn display_name(&self) -> String {
        present(&self.full_name)
            .or_else(|| present(&self.username))
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", self.id))
    }

    /// Server-side classroom id, when the roster entry names one.
    pub fn classroom_id(&self) -> Option<i64> {
        self.classroom
            .as_ref()
            .and_then(|c| c.id)
            .or(self.classroom_id)
    }

    /// Subject name carried on the roster entry, used when subject metadata is unavailable.
    pub fn subject_name(&self) -> Option<&str> {
        present(&self.subject_name).or_else(|| {
            self.subject
                .as_ref()
                .and_then(|s| present(&s.name).or_else(|| present(&s.title)))
        })
    }
}

/// Identity of a derived classroom: the server id when known, otherwise its label text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassroomKey {
    Id(i64),
    Label(String),
}

impl fmt::Display for ClassroomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{id}"),
            Self::Label(label) => write!(f, "label:{label}"),
        }
    }
}

impl FromStr for ClassroomKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix("id:") {
            return id
                .trim()
                .parse::<i64>()
                .map(Self::Id)
                .map_err(|_| format!("bad classroom id in key '{s}'"));
        }
        if let Some(label) = s.strip_prefix("label:") {
            return Ok(Self::Label(label.to_string()));
        }
        Err(format!("classroom key must start with id: or label: (got '{s}')"))
    }
}

impl Serialize for ClassroomKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ClassroomKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub key: ClassroomKey,
    /// Server id. Starts as the roster's id and may be filled in later by name resolution.
    pub id: Option<i64>,
    pub label: String,
}

/// Derive a student's classroom.
///
/// Precedence: classroom object (name, else id), `classroom_name`, `class_name`,
/// `"{grade_level} {section}"`, `grade_level`, `homeroom`, `section`, then
/// [`DEFAULT_CLASSROOM_LABEL`].
pub fn derive_classroom(s: &Student) -> Classroom {
    if let Some(c) = &s.classroom {
        let name = present(&c.name);
        if name.is_some() || c.id.is_some() {
            let label = match (name, c.id) {
                (Some(n), _) => n.to_string(),
                (None, Some(id)) => id.to_string(),
                (None, None) => DEFAULT_CLASSROOM_LABEL.to_string(),
            };
            let key = match c.id {
                Some(id) => ClassroomKey::Id(id),
                None => ClassroomKey::Label(label.clone()),
            };
            return Classroom {
                key,
                id: c.id,
                label,
            };
        }
    }

    let label = present(&s.classroom_name)
        .or_else(|| present(&s.class_name))
        .map(str::to_string)
        .or_else(|| match (present(&s.grade_level), present(&s.section)) {
            (Some(g), Some(sec)) => Some(format!("{g} {sec}")),
            (Some(g), None) => Some(g.to_string()),
            _ => None,
        })
        .or_else(|| present(&s.homeroom).map(str::to_string))
        .or_else(|| present(&s.section).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_CLASSROOM_LABEL.to_string());

    Classroom {
        key: ClassroomKey::Label(label.clone()),
        id: None,
        label,
    }
}

fn numeric_runs(label: &str) -> Vec<u64> {
    let mut out = Vec::new();
    let mut cur: Option<u64> = None;
    for ch in label.chars() {
        match ch.to_digit(10).filter(|_| ch.is_ascii_digit()) {
            Some(d) => {
                let v = cur.unwrap_or(0);
                cur = Some(v.saturating_mul(10).saturating_add(u64::from(d)));
            }
            None => {
                if let Some(v) = cur.take() {
                    out.push(v);
                }
            }
        }
    }
    if let Some(v) = cur {
        out.push(v);
    }
    out
}

/// Natural ordering: numeric runs compared component-wise (missing runs count as 0),
/// then case-insensitive text, then code point order.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    let na = numeric_runs(a);
    let nb = numeric_runs(b);
    for i in 0..na.len().max(nb.len()) {
        let ai = na.get(i).copied().unwrap_or(0);
        let bi = nb.get(i).copied().unwrap_or(0);
        match ai.cmp(&bi) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Distinct classrooms of a roster, naturally sorted by label.
pub fn distinct_classrooms(roster: &[Student]) -> Vec<Classroom> {
    let mut out: Vec<Classroom> = Vec::new();
    for s in roster {
        let c = derive_classroom(s);
        if !out.iter().any(|existing| existing.key == c.key) {
            out.push(c);
        }
    }
    out.sort_by(|a, b| compare_labels(&a.label, &b.label));
    out
}

/// Normalised form used to match a derived label against server classroom names.
///
/// NFKD first, then combining marks and punctuation are dropped, so composed and decomposed
/// spellings of the same name compare equal.
pub fn normalize_label(s: &str) -> String {
    let kept: String = s
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Pick the server classroom whose name matches `label`: exact normalised match first,
/// then containment in either direction.
pub fn match_classroom_by_label<'a, I>(label: &str, candidates: I) -> Option<i64>
where
    I: IntoIterator<Item = (i64, &'a str)>,
{
    let target = normalize_label(label);
    if target.is_empty() {
        return None;
    }
    let normalized: Vec<(i64, String)> = candidates
        .into_iter()
        .map(|(id, name)| (id, normalize_label(name)))
        .collect();
    normalized
        .iter()
        .find(|(_, n)| *n == target)
        .or_else(|| {
            normalized
                .iter()
                .find(|(_, n)| !n.is_empty() && (n.contains(&target) || target.contains(n.as_str())))
        })
        .map(|(id, _)| *id)
}

/// Classroom filter state for one roster.
#[derive(Debug, Clone, Default)]
pub struct ClassroomFilter {
    classrooms: Vec<Classroom>,
    selected: Option<ClassroomKey>,
}

impl ClassroomFilter {
    pub fn from_roster(roster: &[Student]) -> Self {
        let classrooms = distinct_classrooms(roster);
        let selected = match classrooms.as_slice() {
            [only] => Some(only.key.clone()),
            _ => None,
        };
        Self {
            classrooms,
            selected,
        }
    }

    pub fn classrooms(&self) -> &[Classroom] {
        &self.classrooms
    }

    /// The filter control is only offered when there is more than one classroom.
    pub fn needs_filter(&self) -> bool {
        self.classrooms.len() > 1
    }

    pub fn selected(&self) -> Option<&Classroom> {
        let key = self.selected.as_ref()?;
        self.classrooms.iter().find(|c| &c.key == key)
    }

    pub fn select(&mut self, key: Option<&ClassroomKey>) -> Result<(), ValidationError> {
        match key {
            None => {
                if !self.needs_filter() {
                    return Ok(());
                }
                self.selected = None;
            }
            Some(k) => {
                if !self.classrooms.iter().any(|c| &c.key == k) {
                    return Err(ValidationError::UnknownClassroom);
                }
                self.selected = Some(k.clone());
            }
        }
        Ok(())
    }

    /// Server classroom id scoping assignment and grade queries, if one is known.
    pub fn scope_classroom_id(&self) -> Option<i64> {
        self.selected().and_then(|c| c.id)
    }

    /// Record a server id found for a label-only classroom.
    pub fn resolve_id(&mut self, key: &ClassroomKey, id: i64) {
        if let Some(c) = self.classrooms.iter_mut().find(|c| &c.key == key) {
            c.id = Some(id);
        }
    }

    pub fn is_visible(&self, student: &Student) -> bool {
        if !self.needs_filter() {
            return true;
        }
        match &self.selected {
            Some(key) => derive_classroom(student).key == *key,
            None => true,
        }
    }

    pub fn visible<'a>(&self, roster: &'a [Student]) -> Vec<&'a Student> {
        roster.iter().filter(|s| self.is_visible(s)).collect()
    }
}

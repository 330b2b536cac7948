use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved title holding a manually entered collected-score total.
pub const COLLECTED_TOTAL_TITLE: &str = "คะแนนเก็บรวม";
/// Reserved title holding a manually entered exam-score total.
pub const EXAM_TOTAL_TITLE: &str = "คะแนนสอบรวม";

const EXAM_KEYWORDS: [&str; 5] = ["กลางภาค", "ปลายภาค", "final", "midterm", "คะแนนสอบ"];

pub fn is_reserved_title(title: &str) -> bool {
    let t = title.trim();
    t == COLLECTED_TOTAL_TITLE || t == EXAM_TOTAL_TITLE
}

/// Midterms and finals count towards the exam component; everything else is collected work.
pub fn is_exam_title(title: &str) -> bool {
    let t = title.to_lowercase();
    EXAM_KEYWORDS.iter().any(|k| t.contains(k))
}

/// Whole-number percentage of `score` out of `max`.
///
/// The score is clamped to `[0, max]` first. An absent score or a non-positive max yields 0.
pub fn percentage(score: Option<f64>, max: f64) -> u8 {
    let Some(score) = score else { return 0 };
    if !(max > 0.0) || !score.is_finite() {
        return 0;
    }
    let clamped = score.clamp(0.0, max);
    (clamped / max * 100.0).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LetterGrade {
    #[serde(rename = "F")]
    F,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A")]
    A,
}

impl LetterGrade {
    /// Band lower bounds are inclusive.
    pub fn from_percentage(pct: u8) -> Self {
        match pct {
            80..=u8::MAX => Self::A,
            75..=79 => Self::BPlus,
            70..=74 => Self::B,
            65..=69 => Self::CPlus,
            60..=64 => Self::C,
            55..=59 => Self::DPlus,
            50..=54 => Self::D,
            _ => Self::F,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::BPlus => "B+",
            Self::B => "B",
            Self::CPlus => "C+",
            Self::C => "C",
            Self::DPlus => "D+",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn letter_grade(pct: u8) -> LetterGrade {
    LetterGrade::from_percentage(pct)
}

/// One assignment's contribution to a student summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDetail {
    pub title: String,
    pub classroom_id: Option<i64>,
    /// Recorded score clamped to `[0, max_score]`; `None` when ungraded.
    pub score: Option<f64>,
    pub max_score: f64,
    pub percentage: u8,
    pub is_exam: bool,
}

impl AssignmentDetail {
    pub fn new(title: &str, classroom_id: Option<i64>, raw: Option<f64>, max_score: f64) -> Self {
        let score = raw.map(|v| v.clamp(0.0, max_score.max(0.0)));
        Self {
            title: title.to_string(),
            classroom_id,
            score,
            max_score,
            percentage: percentage(score, max_score),
            is_exam: is_exam_title(title),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: i64,
    pub total_score: f64,
    pub total_max: f64,
    pub overall_percentage: u8,
    pub overall_grade: LetterGrade,
    pub details: Vec<AssignmentDetail>,
}

/// Raw-sum summary: ungraded assignments add 0 to the score but their max still counts.
pub fn student_summary(student_id: i64, details: Vec<AssignmentDetail>) -> StudentSummary {
    let total_score: f64 = details.iter().map(|d| d.score.unwrap_or(0.0)).sum();
    let total_max: f64 = details.iter().map(|d| d.max_score).sum();
    let overall_percentage = percentage(Some(total_score), total_max);
    StudentSummary {
        student_id,
        total_score,
        total_max,
        overall_percentage,
        overall_grade: letter_grade(overall_percentage),
        details,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    #[default]
    Main,
    Activity,
}

/// Per-subject maxima configured by the school administrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScoring {
    pub kind: SubjectKind,
    pub max_collected: f64,
    pub max_exam: f64,
}

impl Default for SubjectScoring {
    fn default() -> Self {
        Self {
            kind: SubjectKind::Main,
            max_collected: 100.0,
            max_exam: 100.0,
        }
    }
}

/// Totals saved under the reserved titles, used when a component has no real assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ManualTotals {
    pub collected: Option<f64>,
    pub exam: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedSummary {
    pub student_id: i64,
    pub collected_score: f64,
    pub exam_score: f64,
    pub total_score: f64,
    pub total_max: f64,
    pub overall_percentage: u8,
    pub overall_grade: LetterGrade,
    pub details: Vec<AssignmentDetail>,
}

fn scale(raw: f64, raw_max: f64, target_max: f64) -> f64 {
    if raw_max > 0.0 {
        (raw / raw_max * target_max).round()
    } else {
        raw
    }
}

fn component(
    details: &[&AssignmentDetail],
    manual: Option<f64>,
    target_max: f64,
) -> f64 {
    if details.is_empty() {
        if let Some(m) = manual {
            return m.clamp(0.0, target_max.max(0.0));
        }
    }
    let raw: f64 = details.iter().map(|d| d.score.unwrap_or(0.0)).sum();
    let raw_max: f64 = details.iter().map(|d| d.max_score).sum();
    scale(raw, raw_max, target_max)
}

/// Subject summary scaled to the administrator's collected/exam maxima.
pub fn weighted_summary(
    student_id: i64,
    details: Vec<AssignmentDetail>,
    scoring: &SubjectScoring,
    manual: ManualTotals,
) -> WeightedSummary {
    let (collected_score, exam_score, total_max) = match scoring.kind {
        SubjectKind::Activity => {
            let all: Vec<&AssignmentDetail> = details.iter().collect();
            let c = component(&all, manual.collected, scoring.max_collected);
            (c, 0.0, scoring.max_collected)
        }
        SubjectKind::Main => {
            let (exams, collected): (Vec<&AssignmentDetail>, Vec<&AssignmentDetail>) =
                details.iter().partition(|d| d.is_exam);
            let c = component(&collected, manual.collected, scoring.max_collected);
            let e = component(&exams, manual.exam, scoring.max_exam);
            (c, e, scoring.max_collected + scoring.max_exam)
        }
    };
    let total_score = collected_score + exam_score;
    let overall_percentage = percentage(Some(total_score), total_max);
    WeightedSummary {
        student_id,
        collected_score,
        exam_score,
        total_score,
        total_max,
        overall_percentage,
        overall_grade: letter_grade(overall_percentage),
        details,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStats {
    pub graded_count: usize,
    pub ungraded_count: usize,
    pub avg_raw: f64,
    pub avg_percent: f64,
}

/// Class average for one assignment. Ungraded students are counted but excluded from the mean.
pub fn assignment_stats<I>(scores: I, max_score: f64) -> AssignmentStats
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut graded_count: usize = 0;
    let mut ungraded_count: usize = 0;
    let mut sum_raw: f64 = 0.0;

    for s in scores {
        match s {
            Some(v) => {
                graded_count += 1;
                sum_raw += v.clamp(0.0, max_score.max(0.0));
            }
            None => ungraded_count += 1,
        }
    }

    let avg_raw = if graded_count > 0 {
        sum_raw / (graded_count as f64)
    } else {
        0.0
    };
    let avg_percent = if max_score > 0.0 {
        100.0 * avg_raw / max_score
    } else {
        0.0
    };

    AssignmentStats {
        graded_count,
        ungraded_count,
        avg_raw,
        avg_percent,
    }
}

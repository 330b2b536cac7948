//! Per-assignment student scores held in memory until an explicit save.

use crate::api::{GradeEntry, GradeRecord, GradesBulk};
use crate::calc::{self, AssignmentDetail, AssignmentStats, StudentSummary};
use crate::error::ValidationError;
use crate::registry::{Assignment, AssignmentId};
use std::collections::{BTreeMap, HashMap};

/// `None` means the student is tracked but ungraded.
pub type ScoreMap = BTreeMap<i64, Option<f64>>;

#[derive(Debug, Clone, Default)]
pub struct GradeLedger {
    entries: HashMap<AssignmentId, ScoreMap>,
}

/// Parse a score typed by the user. Blank clears the score.
pub fn parse_score(raw: &str) -> Result<Option<f64>, ValidationError> {
    let t = raw.trim();
    if t.is_empty() {
        return Ok(None);
    }
    t.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ValidationError::NotANumber(t.to_string()))
}

fn check_range(value: Option<f64>, max: f64) -> Result<(), ValidationError> {
    match value {
        Some(v) if !(0.0..=max).contains(&v) => Err(ValidationError::OutOfRange { value: v, max }),
        _ => Ok(()),
    }
}

impl GradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from server grade records. Records without a title are skipped.
    pub fn load(records: &[GradeRecord]) -> Self {
        let mut entries: HashMap<AssignmentId, ScoreMap> = HashMap::new();
        for rec in records {
            let Some(title) = rec.title.as_deref() else {
                continue;
            };
            entries
                .entry(AssignmentId::new(title, rec.classroom_id))
                .or_default()
                .insert(rec.student_id, rec.grade);
        }
        Self { entries }
    }

    pub fn scores(&self, id: &AssignmentId) -> Option<&ScoreMap> {
        self.entries.get(id)
    }

    pub fn score(&self, id: &AssignmentId, student_id: i64) -> Option<f64> {
        self.entries.get(id)?.get(&student_id).copied().flatten()
    }

    /// Record a score after checking `0 <= value <= max_score`. Out-of-range values leave the
    /// ledger untouched.
    pub fn set_score(
        &mut self,
        assignment: &Assignment,
        student_id: i64,
        value: Option<f64>,
    ) -> Result<(), ValidationError> {
        check_range(value, assignment.max_score)?;
        self.entries
            .entry(assignment.id.clone())
            .or_default()
            .insert(student_id, value);
        Ok(())
    }

    /// Start tracking an assignment with no scores yet.
    pub fn track(&mut self, id: &AssignmentId) {
        self.entries.entry(id.clone()).or_default();
    }

    /// Move every score from `from` to `to` after a title or classroom change.
    pub fn migrate(&mut self, from: &AssignmentId, to: &AssignmentId) {
        if from == to {
            return;
        }
        let moved = self.entries.remove(from).unwrap_or_default();
        self.entries.entry(to.clone()).or_default().extend(moved);
    }

    /// Drop every score under an assignment. Returns how many were removed.
    pub fn remove(&mut self, id: &AssignmentId) -> usize {
        self.entries.remove(id).map(|m| m.len()).unwrap_or(0)
    }

    /// Build the bulk-save body for one assignment, re-checking every tracked score against the
    /// current max. Nothing is produced if any score is out of range.
    pub fn bulk_payload(
        &self,
        subject_id: i64,
        assignment: &Assignment,
    ) -> Result<GradesBulk, ValidationError> {
        let empty = ScoreMap::new();
        let scores = self.entries.get(&assignment.id).unwrap_or(&empty);
        for v in scores.values() {
            check_range(*v, assignment.max_score)?;
        }
        Ok(GradesBulk {
            subject_id,
            title: assignment.title().to_string(),
            max_score: assignment.max_score,
            classroom_id: assignment.classroom_id(),
            grades: scores
                .iter()
                .map(|(&student_id, &grade)| GradeEntry { student_id, grade })
                .collect(),
        })
    }

    /// Per-assignment rows for one student over the given assignments.
    pub fn details(&self, student_id: i64, assignments: &[&Assignment]) -> Vec<AssignmentDetail> {
        assignments
            .iter()
            .map(|a| {
                AssignmentDetail::new(
                    a.title(),
                    a.classroom_id(),
                    self.score(&a.id, student_id),
                    a.max_score,
                )
            })
            .collect()
    }

    /// Raw-sum summary of one student across `assignments`.
    pub fn summary(&self, student_id: i64, assignments: &[&Assignment]) -> StudentSummary {
        calc::student_summary(student_id, self.details(student_id, assignments))
    }

    pub fn stats(&self, assignment: &Assignment, student_ids: &[i64]) -> AssignmentStats {
        calc::assignment_stats(
            student_ids.iter().map(|&sid| self.score(&assignment.id, sid)),
            assignment.max_score,
        )
    }
}

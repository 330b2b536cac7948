//! Gradable assignments of one subject, each global or scoped to one classroom.

use crate::api::AssignmentRecord;
use crate::calc::is_reserved_title;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Assignment identity: its title plus the classroom it is scoped to (`None` = every classroom).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentId {
    pub title: String,
    #[serde(default)]
    pub classroom_id: Option<i64>,
}

impl AssignmentId {
    pub fn new(title: impl Into<String>, classroom_id: Option<i64>) -> Self {
        Self {
            title: title.into(),
            classroom_id,
        }
    }

    pub fn global(title: impl Into<String>) -> Self {
        Self::new(title, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: AssignmentId,
    pub max_score: f64,
}

impl Assignment {
    pub fn title(&self) -> &str {
        &self.id.title
    }

    pub fn classroom_id(&self) -> Option<i64> {
        self.id.classroom_id
    }

    /// Global assignments apply to every classroom.
    pub fn applies_to(&self, classroom_id: Option<i64>) -> bool {
        match (self.id.classroom_id, classroom_id) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(a), Some(c)) => a == c,
        }
    }

    pub fn from_record(rec: &AssignmentRecord, fallback_classroom: Option<i64>) -> Self {
        Self {
            id: AssignmentId::new(rec.title.clone(), rec.classroom_id.or(fallback_classroom)),
            max_score: rec.max_score.unwrap_or(100.0),
        }
    }
}

/// Validated create/edit input.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentDraft {
    pub title: String,
    pub max_score: f64,
    pub classroom_id: Option<i64>,
}

impl AssignmentDraft {
    pub fn id(&self) -> AssignmentId {
        AssignmentId::new(self.title.clone(), self.classroom_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentRegistry {
    assignments: Vec<Assignment>,
    /// Classroom the page is currently showing; `None` shows everything.
    scope: Option<i64>,
    selected: Option<AssignmentId>,
}

impl AssignmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn get(&self, id: &AssignmentId) -> Option<&Assignment> {
        self.assignments.iter().find(|a| &a.id == id)
    }

    pub fn scope(&self) -> Option<i64> {
        self.scope
    }

    /// Assignments shown for the current classroom scope, in server order.
    pub fn visible(&self) -> Vec<&Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.applies_to(self.scope))
            .collect()
    }

    pub fn selected(&self) -> Option<&Assignment> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    pub fn selected_id(&self) -> Option<&AssignmentId> {
        self.selected.as_ref()
    }

    pub fn select(&mut self, id: &AssignmentId) -> Result<&Assignment, ValidationError> {
        let idx = self
            .assignments
            .iter()
            .position(|a| &a.id == id && a.applies_to(self.scope))
            .ok_or(ValidationError::UnknownAssignment)?;
        self.selected = Some(id.clone());
        Ok(&self.assignments[idx])
    }

    /// Keep the selection if it is still visible, else fall back to the first visible
    /// assignment, else clear it.
    fn reconcile_selection(&mut self) {
        let still_visible = self
            .selected
            .as_ref()
            .map(|id| self.visible().iter().any(|a| &a.id == id))
            .unwrap_or(false);
        if !still_visible {
            self.selected = self.visible().first().map(|a| a.id.clone());
        }
    }

    /// Replace the list with a fresh server listing. Reserved summary titles are dropped.
    pub fn replace(&mut self, list: Vec<Assignment>) {
        self.assignments = list
            .into_iter()
            .filter(|a| !is_reserved_title(a.title()))
            .collect();
        self.reconcile_selection();
    }

    pub fn set_scope(&mut self, scope: Option<i64>) {
        self.scope = scope;
        self.reconcile_selection();
    }

    fn validate(
        &self,
        title: &str,
        max_score: f64,
        classroom_id: Option<i64>,
        editing: Option<&AssignmentId>,
    ) -> Result<AssignmentDraft, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if is_reserved_title(title) {
            return Err(ValidationError::ReservedTitle(title.to_string()));
        }
        if !(max_score > 0.0) || !max_score.is_finite() {
            return Err(ValidationError::InvalidMaxScore(max_score));
        }
        let lower = title.to_lowercase();
        let duplicate = self.assignments.iter().any(|a| {
            Some(&a.id) != editing
                && a.id.classroom_id == classroom_id
                && a.title().to_lowercase() == lower
        });
        if duplicate {
            return Err(ValidationError::DuplicateTitle {
                title: title.to_string(),
                classroom_id,
            });
        }
        Ok(AssignmentDraft {
            title: title.to_string(),
            max_score,
            classroom_id,
        })
    }

    /// Check a new assignment. The title must be unique (ignoring case) within its scope.
    pub fn check_create(
        &self,
        title: &str,
        max_score: f64,
        classroom_id: Option<i64>,
    ) -> Result<AssignmentDraft, ValidationError> {
        self.validate(title, max_score, classroom_id, None)
    }

    /// Check an edit; the assignment being edited does not count as a duplicate of itself.
    pub fn check_edit(
        &self,
        id: &AssignmentId,
        title: &str,
        max_score: f64,
        classroom_id: Option<i64>,
    ) -> Result<AssignmentDraft, ValidationError> {
        if self.get(id).is_none() {
            return Err(ValidationError::UnknownAssignment);
        }
        self.validate(title, max_score, classroom_id, Some(id))
    }

    /// Add an assignment the server has accepted and select it.
    pub fn insert(&mut self, assignment: Assignment) {
        let id = assignment.id.clone();
        match self.assignments.iter_mut().find(|a| a.id == id) {
            Some(existing) => *existing = assignment,
            None => self.assignments.push(assignment),
        }
        self.selected = Some(id);
        self.reconcile_selection();
    }

    /// Apply an accepted edit. Returns the new id; the selection follows the edited assignment.
    pub fn apply_edit(&mut self, old: &AssignmentId, updated: Assignment) -> Option<AssignmentId> {
        let slot = self.assignments.iter_mut().find(|a| &a.id == old)?;
        let new_id = updated.id.clone();
        *slot = updated;
        if self.selected.as_ref() == Some(old) {
            self.selected = Some(new_id.clone());
        }
        self.reconcile_selection();
        Some(new_id)
    }

    /// Remove an assignment; a removed selection falls back per [`Self::reconcile_selection`].
    pub fn remove(&mut self, id: &AssignmentId) -> Option<Assignment> {
        let idx = self.assignments.iter().position(|a| &a.id == id)?;
        let removed = self.assignments.remove(idx);
        self.reconcile_selection();
        Some(removed)
    }
}

//! Grade entry page for one subject.
//!
//! Owns the roster, the classroom filter, the assignment registry and the grade ledger, and
//! keeps them consistent across classroom changes, assignment edits and saves.

use crate::api::{AssignmentPayload, Backend, SubjectRecord};
use crate::calc::{
    self, is_exam_title, AssignmentStats, ManualTotals, StudentSummary, SubjectKind,
    SubjectScoring, WeightedSummary, COLLECTED_TOTAL_TITLE, EXAM_TOTAL_TITLE,
};
use crate::classroom::{
    derive_classroom, match_classroom_by_label, ClassroomFilter, ClassroomKey, Student,
};
use crate::error::{Result, ValidationError};
use crate::ledger::GradeLedger;
use crate::registry::{Assignment, AssignmentId, AssignmentRegistry};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which half of a main subject a manual total belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalsKind {
    Collected,
    Exam,
}

impl TotalsKind {
    fn title(self) -> &'static str {
        match self {
            Self::Collected => COLLECTED_TOTAL_TITLE,
            Self::Exam => EXAM_TOTAL_TITLE,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Collected => "collected",
            Self::Exam => "exam",
        }
    }
}

/// Issued when a reload starts; only the newest ticket may install its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
    classroom_id: Option<i64>,
}

/// Assignments and grades fetched for one ticket.
#[derive(Debug, Clone)]
pub struct Refreshed {
    assignments: Vec<Assignment>,
    ledger: GradeLedger,
}

fn subject_display_name(rec: &SubjectRecord) -> Option<String> {
    [&rec.name, &rec.title, &rec.subject_name]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .cloned()
}

fn subject_scoring(rec: &SubjectRecord) -> SubjectScoring {
    let defaults = SubjectScoring::default();
    let kind = match rec.subject_type.as_deref().map(str::trim) {
        Some(t) if t.eq_ignore_ascii_case("activity") => SubjectKind::Activity,
        _ => SubjectKind::Main,
    };
    SubjectScoring {
        kind,
        max_collected: rec
            .max_collected_score
            .filter(|m| *m > 0.0)
            .unwrap_or(defaults.max_collected),
        max_exam: rec
            .max_exam_score
            .filter(|m| *m > 0.0)
            .unwrap_or(defaults.max_exam),
    }
}

#[derive(Debug, Clone)]
pub struct GradesPage {
    subject_id: i64,
    subject_name: Option<String>,
    scoring: SubjectScoring,
    roster: Vec<Student>,
    classrooms: ClassroomFilter,
    registry: AssignmentRegistry,
    ledger: GradeLedger,
    generation: u64,
}

impl GradesPage {
    /// Load roster and subject metadata, then assignments and grades.
    ///
    /// A roster failure aborts the open. Missing subject metadata only costs the display name
    /// and the scoring maxima, which fall back to the roster and the defaults.
    pub fn open(
        backend: &dyn Backend,
        session: Option<&Session>,
        subject_id: i64,
    ) -> Result<Self> {
        let roster = backend.subject_students(session, subject_id)?;
        let roster_name = roster
            .iter()
            .find_map(|s| s.subject_name().map(str::to_string));
        let (subject_name, scoring) = match backend.subject(session, subject_id) {
            Ok(rec) => (
                subject_display_name(&rec).or(roster_name),
                subject_scoring(&rec),
            ),
            Err(e) => {
                warn!(subject_id, error = %e, "subject metadata unavailable, using roster");
                (roster_name, SubjectScoring::default())
            }
        };
        let classrooms = ClassroomFilter::from_roster(&roster);
        let mut page = Self {
            subject_id,
            subject_name,
            scoring,
            roster,
            classrooms,
            registry: AssignmentRegistry::new(),
            ledger: GradeLedger::new(),
            generation: 0,
        };
        page.refresh(backend, session)?;
        info!(
            subject_id,
            students = page.roster.len(),
            classrooms = page.classrooms.classrooms().len(),
            assignments = page.registry.all().len(),
            "grades page opened"
        );
        Ok(page)
    }

    pub fn subject_id(&self) -> i64 {
        self.subject_id
    }

    pub fn subject_name(&self) -> Option<&str> {
        self.subject_name.as_deref()
    }

    pub fn scoring(&self) -> &SubjectScoring {
        &self.scoring
    }

    pub fn classrooms(&self) -> &ClassroomFilter {
        &self.classrooms
    }

    pub fn registry(&self) -> &AssignmentRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &GradeLedger {
        &self.ledger
    }

    pub fn visible_students(&self) -> Vec<&Student> {
        self.classrooms.visible(&self.roster)
    }

    fn student(&self, student_id: i64) -> std::result::Result<&Student, ValidationError> {
        self.roster
            .iter()
            .find(|s| s.id == student_id)
            .ok_or(ValidationError::UnknownStudent(student_id))
    }

    /// Server classroom id of the student's derived classroom, if known.
    fn student_classroom_id(&self, student: &Student) -> Option<i64> {
        let key = derive_classroom(student).key;
        self.classrooms
            .classrooms()
            .iter()
            .find(|c| c.key == key)
            .and_then(|c| c.id)
            .or_else(|| student.classroom_id())
    }

    /// Visible assignments that apply to this student's classroom.
    fn assignments_for(&self, student: &Student) -> Vec<&Assignment> {
        let classroom_id = self.student_classroom_id(student);
        self.registry
            .visible()
            .into_iter()
            .filter(|a| a.applies_to(classroom_id))
            .collect()
    }

    fn lookup_classroom_id(
        &self,
        backend: &dyn Backend,
        session: Option<&Session>,
        label: &str,
    ) -> Result<Option<i64>> {
        let Some(school_id) = session.and_then(Session::school_id) else {
            return Ok(None);
        };
        let rooms = backend.school_classrooms(session, school_id)?;
        Ok(match_classroom_by_label(
            label,
            rooms
                .iter()
                .map(|r| (r.id, r.name.as_deref().unwrap_or_default())),
        ))
    }

    /// Server id for a classroom of this roster; `None` stands for the global scope.
    ///
    /// Label-only classrooms are matched by name against the school's classroom list.
    pub fn resolve_classroom(
        &mut self,
        backend: &dyn Backend,
        session: Option<&Session>,
        key: Option<&ClassroomKey>,
    ) -> Result<Option<i64>> {
        let Some(key) = key else {
            return Ok(None);
        };
        let classroom = self
            .classrooms
            .classrooms()
            .iter()
            .find(|c| &c.key == key)
            .cloned()
            .ok_or(ValidationError::UnknownClassroom)?;
        if let Some(id) = classroom.id {
            return Ok(Some(id));
        }
        match self.lookup_classroom_id(backend, session, &classroom.label)? {
            Some(id) => {
                self.classrooms.resolve_id(key, id);
                Ok(Some(id))
            }
            None => Err(ValidationError::UnresolvedClassroom(classroom.label).into()),
        }
    }

    /// Scope for the selected classroom. Resolution failures fall back to the unscoped listing.
    fn selected_scope(&mut self, backend: &dyn Backend, session: Option<&Session>) -> Option<i64> {
        if let Some(id) = self.classrooms.scope_classroom_id() {
            return Some(id);
        }
        let selected = self.classrooms.selected()?.key.clone();
        match self.resolve_classroom(backend, session, Some(&selected)) {
            Ok(id) => id,
            Err(e) => {
                warn!(classroom = %selected, error = %e, "classroom id unresolved, listing all");
                None
            }
        }
    }

    pub fn begin_refresh(
        &mut self,
        backend: &dyn Backend,
        session: Option<&Session>,
    ) -> RefreshTicket {
        self.generation += 1;
        RefreshTicket {
            generation: self.generation,
            classroom_id: self.selected_scope(backend, session),
        }
    }

    pub fn fetch(
        &self,
        backend: &dyn Backend,
        session: Option<&Session>,
        ticket: &RefreshTicket,
    ) -> Result<Refreshed> {
        let records = backend.list_assignments(session, self.subject_id, ticket.classroom_id)?;
        let grades = backend.list_grades(session, self.subject_id, ticket.classroom_id)?;
        Ok(Refreshed {
            assignments: records
                .iter()
                .map(|r| Assignment::from_record(r, None))
                .collect(),
            ledger: GradeLedger::load(&grades),
        })
    }

    /// Install fetched data unless a newer refresh started after `ticket` was issued.
    pub fn apply_refresh(&mut self, ticket: RefreshTicket, data: Refreshed) -> bool {
        if ticket.generation != self.generation {
            warn!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale grades response"
            );
            return false;
        }
        let mut ledger = data.ledger;
        for a in &data.assignments {
            ledger.track(&a.id);
        }
        self.registry.set_scope(ticket.classroom_id);
        self.registry.replace(data.assignments);
        self.ledger = ledger;
        true
    }

    /// Refetch assignments and grades for the current classroom. Unsaved edits are dropped.
    pub fn refresh(&mut self, backend: &dyn Backend, session: Option<&Session>) -> Result<()> {
        let ticket = self.begin_refresh(backend, session);
        let data = self.fetch(backend, session, &ticket)?;
        self.apply_refresh(ticket, data);
        Ok(())
    }

    pub fn select_classroom(
        &mut self,
        backend: &dyn Backend,
        session: Option<&Session>,
        key: Option<&ClassroomKey>,
    ) -> Result<()> {
        let previous = self.classrooms.selected().map(|c| c.key.clone());
        self.classrooms.select(key)?;
        if let Err(e) = self.refresh(backend, session) {
            self.classrooms.select(previous.as_ref())?;
            return Err(e);
        }
        Ok(())
    }

    pub fn select_assignment(&mut self, id: &AssignmentId) -> Result<&Assignment> {
        Ok(self.registry.select(id)?)
    }

    pub fn create_assignment(
        &mut self,
        backend: &dyn Backend,
        session: Option<&Session>,
        title: &str,
        max_score: f64,
        classroom_id: Option<i64>,
    ) -> Result<AssignmentId> {
        let draft = self.registry.check_create(title, max_score, classroom_id)?;
        backend.create_assignment(
            session,
            self.subject_id,
            &AssignmentPayload {
                title: draft.title.clone(),
                max_score: draft.max_score,
                classroom_id: draft.classroom_id,
            },
        )?;
        let id = draft.id();
        self.ledger.track(&id);
        self.registry.insert(Assignment {
            id: id.clone(),
            max_score: draft.max_score,
        });
        info!(subject_id = self.subject_id, title = %id.title, classroom_id = ?id.classroom_id, "assignment created");
        Ok(id)
    }

    /// Edit title, max score or classroom. Grades follow the assignment to its new key.
    pub fn update_assignment(
        &mut self,
        backend: &dyn Backend,
        session: Option<&Session>,
        id: &AssignmentId,
        title: &str,
        max_score: f64,
        classroom_id: Option<i64>,
    ) -> Result<AssignmentId> {
        let draft = self.registry.check_edit(id, title, max_score, classroom_id)?;
        backend.update_assignment(
            session,
            self.subject_id,
            &id.title,
            id.classroom_id,
            &AssignmentPayload {
                title: draft.title.clone(),
                max_score: draft.max_score,
                classroom_id: draft.classroom_id,
            },
        )?;
        let updated = Assignment {
            id: draft.id(),
            max_score: draft.max_score,
        };
        self.ledger.migrate(id, &updated.id);
        let new_id = self
            .registry
            .apply_edit(id, updated)
            .ok_or(ValidationError::UnknownAssignment)?;
        info!(subject_id = self.subject_id, from = %id.title, to = %new_id.title, "assignment updated");
        Ok(new_id)
    }

    /// Delete an assignment and every grade under it. Returns how many grades were dropped.
    pub fn delete_assignment(
        &mut self,
        backend: &dyn Backend,
        session: Option<&Session>,
        id: &AssignmentId,
    ) -> Result<usize> {
        if self.registry.get(id).is_none() {
            return Err(ValidationError::UnknownAssignment.into());
        }
        backend.delete_assignment(session, self.subject_id, &id.title, id.classroom_id)?;
        let dropped = self.ledger.remove(id);
        self.registry.remove(id);
        info!(subject_id = self.subject_id, title = %id.title, dropped, "assignment deleted");
        Ok(dropped)
    }

    fn target(&self, id: Option<&AssignmentId>) -> std::result::Result<&Assignment, ValidationError> {
        match id {
            Some(id) => self.registry.get(id).ok_or(ValidationError::UnknownAssignment),
            None => self
                .registry
                .selected()
                .ok_or(ValidationError::NoAssignmentSelected),
        }
    }

    /// Record a score locally. `assignment = None` targets the selected assignment.
    pub fn set_score(
        &mut self,
        assignment: Option<&AssignmentId>,
        student_id: i64,
        value: Option<f64>,
    ) -> Result<()> {
        self.student(student_id)?;
        let target = self.target(assignment)?.clone();
        self.ledger.set_score(&target, student_id, value)?;
        Ok(())
    }

    /// Submit every tracked score of one assignment. Local edits survive a failed save.
    pub fn save(
        &self,
        backend: &dyn Backend,
        session: Option<&Session>,
        assignment: Option<&AssignmentId>,
    ) -> Result<usize> {
        let target = self.target(assignment)?;
        let payload = self.ledger.bulk_payload(self.subject_id, target)?;
        backend.submit_grades(session, &payload)?;
        info!(
            subject_id = self.subject_id,
            title = %payload.title,
            count = payload.grades.len(),
            "grades saved"
        );
        Ok(payload.grades.len())
    }

    pub fn summary(&self, student_id: i64) -> Result<StudentSummary> {
        let student = self.student(student_id)?;
        Ok(self
            .ledger
            .summary(student_id, &self.assignments_for(student)))
    }

    pub fn summaries(&self) -> Vec<StudentSummary> {
        self.visible_students()
            .into_iter()
            .map(|s| self.ledger.summary(s.id, &self.assignments_for(s)))
            .collect()
    }

    fn manual_total(&self, kind: TotalsKind, student: &Student) -> Option<f64> {
        let title = kind.title();
        self.ledger
            .score(&AssignmentId::global(title), student.id)
            .or_else(|| {
                let classroom_id = self.student_classroom_id(student)?;
                self.ledger
                    .score(&AssignmentId::new(title, Some(classroom_id)), student.id)
            })
    }

    pub fn weighted_summary(&self, student_id: i64) -> Result<WeightedSummary> {
        let student = self.student(student_id)?;
        Ok(self.weighted_for(student))
    }

    pub fn weighted_summaries(&self) -> Vec<WeightedSummary> {
        self.visible_students()
            .into_iter()
            .map(|s| self.weighted_for(s))
            .collect()
    }

    fn weighted_for(&self, student: &Student) -> WeightedSummary {
        let details = self
            .ledger
            .details(student.id, &self.assignments_for(student));
        let manual = ManualTotals {
            collected: self.manual_total(TotalsKind::Collected, student),
            exam: self.manual_total(TotalsKind::Exam, student),
        };
        calc::weighted_summary(student.id, details, &self.scoring, manual)
    }

    /// Class average over the visible students the assignment applies to.
    pub fn stats(&self, assignment: Option<&AssignmentId>) -> Result<AssignmentStats> {
        let target = self.target(assignment)?;
        let ids: Vec<i64> = self
            .visible_students()
            .into_iter()
            .filter(|s| target.applies_to(self.student_classroom_id(s)))
            .map(|s| s.id)
            .collect();
        Ok(self.ledger.stats(target, &ids))
    }

    fn counts_as(&self, kind: TotalsKind, a: &Assignment) -> bool {
        match self.scoring.kind {
            SubjectKind::Activity => kind == TotalsKind::Collected,
            SubjectKind::Main => is_exam_title(a.title()) == (kind == TotalsKind::Exam),
        }
    }

    /// Save manually entered totals under the reserved title for the current classroom scope.
    ///
    /// Only accepted while no visible assignment feeds that component. Every value must lie
    /// within the subject maximum; nothing is recorded if any fails.
    pub fn save_totals(
        &mut self,
        backend: &dyn Backend,
        session: Option<&Session>,
        kind: TotalsKind,
        scores: &[(i64, Option<f64>)],
    ) -> Result<usize> {
        if self
            .registry
            .visible()
            .into_iter()
            .any(|a| self.counts_as(kind, a))
        {
            return Err(ValidationError::TotalsNotAllowed(kind.name()).into());
        }
        let max = match kind {
            TotalsKind::Collected => self.scoring.max_collected,
            TotalsKind::Exam => self.scoring.max_exam,
        };
        for (sid, value) in scores {
            self.student(*sid)?;
            if let Some(v) = value {
                if !(0.0..=max).contains(v) {
                    return Err(ValidationError::OutOfRange { value: *v, max }.into());
                }
            }
        }
        let holder = Assignment {
            id: AssignmentId::new(kind.title(), self.registry.scope()),
            max_score: max,
        };
        let mut staged = self.ledger.clone();
        for (sid, value) in scores {
            staged.set_score(&holder, *sid, *value)?;
        }
        let payload = staged.bulk_payload(self.subject_id, &holder)?;
        backend.submit_grades(session, &payload)?;
        self.ledger = staged;
        info!(
            subject_id = self.subject_id,
            kind = kind.name(),
            count = payload.grades.len(),
            "manual totals saved"
        );
        Ok(payload.grades.len())
    }
}

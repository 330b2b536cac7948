//! Daily attendance for one subject.

use crate::api::{AttendanceMap, AttendanceMark, AttendanceRecord, Backend};
use crate::classroom::{ClassroomFilter, Student};
use crate::error::{CoreError, Result, ValidationError};
use crate::session::Session;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    SickLeave,
    Other,
}

impl AttendanceStatus {
    pub const ALL: [Self; 4] = [Self::Present, Self::Absent, Self::SickLeave, Self::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::SickLeave => "sick_leave",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidStatus(s.to_string()))
    }
}

pub fn parse_date(raw: &str) -> std::result::Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

/// Status per student for one (subject, date). Students without an entry are unset.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceLedger {
    subject_id: i64,
    date: NaiveDate,
    statuses: BTreeMap<i64, AttendanceStatus>,
}

impl AttendanceLedger {
    pub fn empty(subject_id: i64, date: NaiveDate) -> Self {
        Self {
            subject_id,
            date,
            statuses: BTreeMap::new(),
        }
    }

    /// Build from the backend's records for that date. No records means an empty sheet.
    pub fn from_records(subject_id: i64, date: NaiveDate, records: &[AttendanceRecord]) -> Self {
        let mut ledger = Self::empty(subject_id, date);
        let Some(map) = records.first().and_then(|r| r.attendance.as_ref()) else {
            return ledger;
        };
        match map {
            AttendanceMap::Statuses(raw) => {
                for (sid, status) in raw {
                    let parsed = status.as_str().and_then(|s| s.parse::<AttendanceStatus>().ok());
                    match (sid.trim().parse::<i64>(), parsed) {
                        (Ok(id), Some(st)) => {
                            ledger.statuses.insert(id, st);
                        }
                        _ => warn!(student = %sid, status = %status, "ignoring attendance entry"),
                    }
                }
            }
            AttendanceMap::PresentIds(ids) => {
                for id in ids {
                    ledger.statuses.insert(*id, AttendanceStatus::Present);
                }
            }
        }
        ledger
    }

    pub fn subject_id(&self) -> i64 {
        self.subject_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn status(&self, student_id: i64) -> Option<AttendanceStatus> {
        self.statuses.get(&student_id).copied()
    }

    pub fn statuses(&self) -> &BTreeMap<i64, AttendanceStatus> {
        &self.statuses
    }

    /// `None` returns the student to unset.
    pub fn set_status(&mut self, student_id: i64, status: Option<AttendanceStatus>) {
        match status {
            Some(st) => {
                self.statuses.insert(student_id, st);
            }
            None => {
                self.statuses.remove(&student_id);
            }
        }
    }

    pub fn counts(&self) -> BTreeMap<AttendanceStatus, usize> {
        let mut out: BTreeMap<AttendanceStatus, usize> =
            AttendanceStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for st in self.statuses.values() {
            *out.entry(*st).or_default() += 1;
        }
        out
    }

    pub fn payload(&self) -> AttendanceMark {
        AttendanceMark {
            subject_id: self.subject_id,
            date: self.date.format("%Y-%m-%d").to_string(),
            attendance: self
                .statuses
                .iter()
                .map(|(id, st)| (id.to_string(), st.as_str().to_string()))
                .collect(),
        }
    }
}

/// Attendance page: roster, classroom filter and the sheet for the chosen date.
#[derive(Debug, Clone)]
pub struct AttendanceSheet {
    roster: Vec<Student>,
    classrooms: ClassroomFilter,
    ledger: AttendanceLedger,
    generation: u64,
}

impl AttendanceSheet {
    pub fn open(
        backend: &dyn Backend,
        session: Option<&Session>,
        subject_id: i64,
        date: NaiveDate,
    ) -> Result<Self> {
        let roster = backend.subject_students(session, subject_id)?;
        let classrooms = ClassroomFilter::from_roster(&roster);
        let mut sheet = Self {
            roster,
            classrooms,
            ledger: AttendanceLedger::empty(subject_id, date),
            generation: 0,
        };
        sheet.load_for_date(backend, session, date)?;
        Ok(sheet)
    }

    /// Replace the whole sheet with the server's record for `date`.
    pub fn load_for_date(
        &mut self,
        backend: &dyn Backend,
        session: Option<&Session>,
        date: NaiveDate,
    ) -> Result<()> {
        self.generation += 1;
        let ticket = self.generation;
        let subject_id = self.ledger.subject_id();
        let day = date.format("%Y-%m-%d").to_string();
        let records = backend.list_attendance(session, subject_id, &day)?;
        self.apply_load(ticket, AttendanceLedger::from_records(subject_id, date, &records));
        Ok(())
    }

    /// Install a loaded ledger unless a newer load has started since `ticket` was issued.
    pub fn apply_load(&mut self, ticket: u64, ledger: AttendanceLedger) -> bool {
        if ticket != self.generation {
            warn!(ticket, current = self.generation, "discarding stale attendance response");
            return false;
        }
        self.ledger = ledger;
        true
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    pub fn classrooms(&self) -> &ClassroomFilter {
        &self.classrooms
    }

    pub fn classrooms_mut(&mut self) -> &mut ClassroomFilter {
        &mut self.classrooms
    }

    pub fn visible_students(&self) -> Vec<&Student> {
        self.classrooms.visible(&self.roster)
    }

    pub fn set_status(
        &mut self,
        student_id: i64,
        status: Option<AttendanceStatus>,
    ) -> std::result::Result<(), ValidationError> {
        if !self.roster.iter().any(|s| s.id == student_id) {
            return Err(ValidationError::UnknownStudent(student_id));
        }
        self.ledger.set_status(student_id, status);
        Ok(())
    }

    /// Set the same status for every visible student.
    pub fn mark_all(&mut self, status: Option<AttendanceStatus>) -> usize {
        let ids: Vec<i64> = self.visible_students().iter().map(|s| s.id).collect();
        for id in &ids {
            self.ledger.set_status(*id, status);
        }
        ids.len()
    }

    /// Submit the full map. Any failure fails the whole save; local edits are kept.
    pub fn save(&self, backend: &dyn Backend, session: Option<&Session>) -> Result<usize> {
        let payload = self.ledger.payload();
        backend
            .mark_attendance(session, &payload)
            .map_err(CoreError::from)?;
        info!(
            subject_id = payload.subject_id,
            date = %payload.date,
            count = payload.attendance.len(),
            "attendance saved"
        );
        Ok(payload.attendance.len())
    }
}

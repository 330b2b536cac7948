use crate::api::Backend;
use crate::attendance::AttendanceSheet;
use crate::config::Config;
use crate::error::CoreError;
use crate::gradebook::GradesPage;
use crate::session::Session;
use serde::Deserialize;

use super::error::HandlerErr;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub backend: Box<dyn Backend>,
    pub session: Option<Session>,
    pub grades: Option<GradesPage>,
    pub attendance: Option<AttendanceSheet>,
}

/// Borrowed view of everything a page operation needs.
pub struct PageCtx<'a, P> {
    pub backend: &'a dyn Backend,
    pub session: Option<&'a Session>,
    pub page: &'a mut P,
}

impl AppState {
    pub fn new(config: Config, backend: Box<dyn Backend>) -> Self {
        Self {
            config,
            backend,
            session: None,
            grades: None,
            attendance: None,
        }
    }

    /// Drop the session together with every page loaded under it.
    pub fn sign_out(&mut self) {
        self.session = None;
        self.grades = None;
        self.attendance = None;
    }

    pub fn grades_ctx(&mut self) -> Result<PageCtx<'_, GradesPage>, HandlerErr> {
        let page = self
            .grades
            .as_mut()
            .ok_or(CoreError::NoPage("open the grades page first"))?;
        Ok(PageCtx {
            backend: self.backend.as_ref(),
            session: self.session.as_ref(),
            page,
        })
    }

    pub fn attendance_ctx(&mut self) -> Result<PageCtx<'_, AttendanceSheet>, HandlerErr> {
        let page = self
            .attendance
            .as_mut()
            .ok_or(CoreError::NoPage("open the attendance page first"))?;
        Ok(PageCtx {
            backend: self.backend.as_ref(),
            session: self.session.as_ref(),
            page,
        })
    }
}

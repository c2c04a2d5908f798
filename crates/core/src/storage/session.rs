use crate::domain::report::Report;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Last generated report per session, in process memory only. No eviction and
/// no expiry: an entry lives until its session resets it or the process exits.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: RwLock<HashMap<SessionId, Report>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever the session held before.
    pub fn store(&self, session: SessionId, report: Report) {
        let company = report.company_name.clone();
        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session, report);
        tracing::debug!(
            %session,
            %company,
            replaced = ?previous.map(|p| p.company_name),
            "cached report for session"
        );
    }

    pub fn get(&self, session: SessionId) -> Option<Report> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session)
            .cloned()
    }

    /// Discards the session's report. Returns whether there was one.
    pub fn reset(&self, session: SessionId) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session)
            .is_some()
    }

    /// Number of sessions currently holding a report.
    pub fn active_sessions(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

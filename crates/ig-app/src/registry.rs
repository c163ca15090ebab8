use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use chrono::{DateTime, Utc};
use ig_core::{JobHandle, Mode};
use uuid::Uuid;
use crate::error::AppError;

/// Caller-side scope (a tab, a CLI invocation...) allowed one active job.
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

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveJob {
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    /// Known once submission succeeded.
    pub handle: Option<JobHandle>,
}

/// Owner of every session's "job running" flag.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    active: Arc<Mutex<HashMap<SessionId, ActiveJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, ActiveJob>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `session` as running a job. The flag is released when the guard drops.
    pub fn claim(&self, session: SessionId, mode: Mode) -> Result<JobGuard, AppError> {
        let mut active = self.lock();
        if active.contains_key(&session) {
            return Err(AppError::Busy(session));
        }

        active.insert(
            session,
            ActiveJob {
                mode,
                started_at: Utc::now(),
                handle: None,
            },
        );
        Ok(JobGuard {
            registry: self.clone(),
            session,
        })
    }

    pub fn is_running(&self, session: SessionId) -> bool {
        self.lock().contains_key(&session)
    }

    pub fn active_job(&self, session: SessionId) -> Option<ActiveJob> {
        self.lock().get(&session).cloned()
    }

}

/// Held for the lifetime of one job; dropping it clears the session's flag
/// whatever way the job ended.
#[derive(Debug)]
pub struct JobGuard {
    registry: JobRegistry,
    session: SessionId,
}

impl JobGuard {
    pub fn set_handle(&self, handle: JobHandle) {
        if let Some(job) = self.registry.lock().get_mut(&self.session) {
            job.handle = Some(handle);
        }
    }

    pub fn handle(&self) -> Option<JobHandle> {
        self.registry.active_job(self.session).and_then(|job| job.handle)
    }

    /// Seconds since the job was claimed.
    pub fn elapsed_secs(&self) -> i64 {
        self.registry
            .active_job(self.session)
            .map(|job| (Utc::now() - job.started_at).num_seconds())
            .unwrap_or_default()
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_active_job_per_session() {
        let registry = JobRegistry::new();
        let session = SessionId::new();

        let guard = registry.claim(session, Mode::Txt2img).unwrap();
        assert!(registry.is_running(session));
        assert!(matches!(
            registry.claim(session, Mode::Img2img),
            Err(AppError::Busy(s)) if s == session
        ));

        drop(guard);
        assert!(!registry.is_running(session));
        assert!(registry.claim(session, Mode::Img2img).is_ok());
    }

    #[test]
    fn test_sessions_are_independent() {
        let registry = JobRegistry::new();
        let (a, b) = (SessionId::new(), SessionId::new());
        let _a = registry.claim(a, Mode::Txt2img).unwrap();
        let guard_b = registry.claim(b, Mode::Inpaint).unwrap();
        drop(guard_b);
        assert!(registry.is_running(a));
        assert!(!registry.is_running(b));
    }

    #[test]
    fn test_handle_recorded() {
        let registry = JobRegistry::new();
        let session = SessionId::new();
        let guard = registry.claim(session, Mode::Txt2img).unwrap();
        guard.set_handle(JobHandle::new("123"));

        let job = registry.active_job(session).unwrap();
        assert_eq!(job.handle, Some(JobHandle::new("123")));
        assert_eq!(job.mode, Mode::Txt2img);
        assert!(guard.elapsed_secs() >= 0);
    }
}

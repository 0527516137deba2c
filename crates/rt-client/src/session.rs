//! Session selection shared by the unary services
//!
//! Operations that take an optional session id resolve it in this order:
//!
//! 1. the explicit id (which is then cached)
//! 2. the cached id, from `set_machine` or `set_session_id`
//! 3. the active session of the cached hostname, looked up once and cached

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rt_core::error::SessionError;
use rt_core::{SessionInfo, Transport};
use rt_protocol::{SessionId, SessionLookup};

use crate::calls;

#[derive(Debug, Default)]
struct SessionCache {
    session_id: Option<SessionId>,
    hostname: Option<String>,
    info: Option<SessionInfo>,
}

/// Caches which remote session operations target
pub struct SessionResolver {
    transport: Arc<dyn Transport>,
    cache: Mutex<SessionCache>,
}

impl SessionResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: Mutex::new(SessionCache::default()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, SessionCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Target the machine matching `hostname`
    ///
    /// An ambiguous partial match is reported with the conflicting
    /// hostnames and leaves the cache untouched.
    pub async fn set_machine(
        &self,
        hostname: &str,
        partial_match: bool,
    ) -> Result<SessionInfo, SessionError> {
        match calls::session_by_hostname(&*self.transport, hostname, partial_match).await? {
            SessionLookup::Found(record) => {
                let info = SessionInfo::from(record);
                tracing::debug!(hostname = %info.hostname, session_id = %info.session_id, "Machine selected");

                let mut cache = self.cache();
                cache.session_id = Some(info.session_id.clone());
                cache.hostname = Some(info.hostname.clone());
                cache.info = Some(info.clone());
                Ok(info)
            }
            SessionLookup::Ambiguous {
                matches_count,
                hostnames,
            } => Err(SessionError::Ambiguous {
                hostname: hostname.to_string(),
                matches_count,
                hostnames,
            }),
            SessionLookup::NotFound { error } => Err(SessionError::NotFound {
                hostname: hostname.to_string(),
                detail: error,
            }),
        }
    }

    /// Target a known session id
    pub fn set_session_id(&self, session_id: SessionId) {
        self.cache().session_id = Some(session_id);
    }

    /// Forget the cached session and hostname
    pub fn clear(&self) {
        *self.cache() = SessionCache::default();
    }

    /// Drop the cached id if it names `session_id`
    pub fn forget(&self, session_id: &SessionId) {
        let mut cache = self.cache();
        if cache.session_id.as_ref() == Some(session_id) {
            cache.session_id = None;
            cache.info = None;
        }
    }

    pub fn current_session(&self) -> Option<SessionInfo> {
        self.cache().info.clone()
    }

    pub fn current_hostname(&self) -> Option<String> {
        self.cache().hostname.clone()
    }

    /// Resolve the session an operation should target
    pub async fn resolve(&self, explicit: Option<&SessionId>) -> Result<SessionId, SessionError> {
        if let Some(session_id) = explicit {
            self.cache().session_id = Some(session_id.clone());
            return Ok(session_id.clone());
        }

        let hostname = {
            let cache = self.cache();
            if let Some(session_id) = &cache.session_id {
                return Ok(session_id.clone());
            }
            cache.hostname.clone().ok_or(SessionError::NoSession)?
        };

        let record = calls::active_session(&*self.transport, Some(&hostname))
            .await?
            .ok_or_else(|| SessionError::NotFound {
                hostname: hostname.clone(),
                detail: None,
            })?;

        let info = SessionInfo::from(record);
        let session_id = info.session_id.clone();
        let mut cache = self.cache();
        cache.session_id = Some(session_id.clone());
        cache.info = Some(info);
        Ok(session_id)
    }

    /// Most recently active session, narrowed to `hostname` or the cached one
    pub async fn active_session(
        &self,
        hostname: Option<&str>,
    ) -> Result<Option<SessionInfo>, SessionError> {
        let hostname = hostname.map(str::to_string).or_else(|| self.current_hostname());
        let record = calls::active_session(&*self.transport, hostname.as_deref()).await?;
        Ok(record.map(SessionInfo::from))
    }
}

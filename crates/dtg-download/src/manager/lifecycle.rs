//! Transport session lifecycle.
//!
//! Holds the current session handle and the one-shot background completion
//! handler. Refreshing swaps the handle; transfers already running keep the
//! session they were started on.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use dtg_core::download::{DownloaderError, DownloaderResult};
use dtg_core::ports::{BackgroundCompletionHandler, TransportPort, TransportSession};

/// Session handle plus background completion slot.
pub struct SessionLifecycle {
    identifier: String,
    transport: Arc<dyn TransportPort>,
    session: RwLock<Arc<dyn TransportSession>>,
    completion: Mutex<Option<BackgroundCompletionHandler>>,
}

impl SessionLifecycle {
    /// Open the session for `identifier`.
    pub fn open(transport: Arc<dyn TransportPort>, identifier: &str) -> DownloaderResult<Self> {
        let session = transport
            .open_session(identifier)
            .map_err(|e| DownloaderError::fatal_session(e.to_string()))?;
        Ok(Self {
            identifier: identifier.to_string(),
            transport,
            session: RwLock::new(session),
            completion: Mutex::new(None),
        })
    }

    /// The session new transfers are started on.
    pub fn current(&self) -> Arc<dyn TransportSession> {
        Arc::clone(&self.session.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the session with a freshly opened one.
    ///
    /// On failure the current session stays in place.
    pub fn refresh(&self) -> DownloaderResult<()> {
        let fresh = self
            .transport
            .open_session(&self.identifier)
            .map_err(|e| DownloaderError::fatal_session(e.to_string()))?;
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        Ok(())
    }

    /// Invalidate the current session.
    pub fn invalidate(&self) {
        self.current().invalidate();
    }

    /// Store a handler, returning the one it replaces.
    pub fn store_completion_handler(
        &self,
        handler: BackgroundCompletionHandler,
    ) -> Option<BackgroundCompletionHandler> {
        self.completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handler)
    }

    /// Take the stored handler. Each handler is handed out once.
    pub fn take_completion_handler(&self) -> Option<BackgroundCompletionHandler> {
        self.completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dtg_core::download::TransportError;
    use dtg_core::ports::{FetchOutcome, FetchRequest};
    use mockall::mock;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubSession {
        id: String,
        valid: AtomicBool,
    }

    #[async_trait]
    impl TransportSession for StubSession {
        fn identifier(&self) -> &str {
            &self.id
        }

        async fn fetch(&self, _request: FetchRequest) -> Result<FetchOutcome, TransportError> {
            Ok(FetchOutcome::Completed)
        }

        fn invalidate(&self) {
            self.valid.store(false, Ordering::SeqCst);
        }

        fn is_valid(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }
    }

    mock! {
        Transport {}
        impl TransportPort for Transport {
            fn open_session(
                &self,
                session_identifier: &str,
            ) -> Result<Arc<dyn TransportSession>, TransportError>;
        }
    }

    fn stub(id: &str) -> Arc<dyn TransportSession> {
        Arc::new(StubSession {
            id: id.to_string(),
            valid: AtomicBool::new(true),
        })
    }

    #[test]
    fn test_open_failure_is_fatal() {
        let mut transport = MockTransport::new();
        transport
            .expect_open_session()
            .returning(|_| Err(TransportError::session_invalidated("no session")));

        let result = SessionLifecycle::open(Arc::new(transport), "dtg.session.x");
        assert!(matches!(result, Err(DownloaderError::FatalSession { .. })));
    }

    #[test]
    fn test_refresh_swaps_handle() {
        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_open_session()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(stub(id)));
        transport
            .expect_open_session()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(stub("second")));

        let lifecycle = SessionLifecycle::open(Arc::new(transport), "dtg.session.x").unwrap();
        let before = lifecycle.current();
        assert_eq!(before.identifier(), "dtg.session.x");

        lifecycle.refresh().unwrap();
        assert_eq!(lifecycle.current().identifier(), "second");
        // The old handle is still usable by whoever holds it.
        assert!(before.is_valid());
    }

    #[test]
    fn test_refresh_failure_keeps_session() {
        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_open_session()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(stub(id)));
        transport
            .expect_open_session()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(TransportError::network("offline")));

        let lifecycle = SessionLifecycle::open(Arc::new(transport), "dtg.session.x").unwrap();
        assert!(lifecycle.refresh().is_err());
        assert_eq!(lifecycle.current().identifier(), "dtg.session.x");
    }

    #[test]
    fn test_completion_handler_handed_out_once() {
        let mut transport = MockTransport::new();
        transport.expect_open_session().returning(|id| Ok(stub(id)));
        let lifecycle = SessionLifecycle::open(Arc::new(transport), "s").unwrap();

        assert!(lifecycle.store_completion_handler(Box::new(|| {})).is_none());
        assert!(lifecycle.store_completion_handler(Box::new(|| {})).is_some());
        assert!(lifecycle.take_completion_handler().is_some());
        assert!(lifecycle.take_completion_handler().is_none());
    }

    #[test]
    fn test_invalidate_marks_current_session() {
        let mut transport = MockTransport::new();
        transport.expect_open_session().returning(|id| Ok(stub(id)));
        let lifecycle = SessionLifecycle::open(Arc::new(transport), "s").unwrap();

        lifecycle.invalidate();
        assert!(!lifecycle.current().is_valid());
    }
}

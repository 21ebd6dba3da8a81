//! Per-user session state.
//!
//! Sessions are in-process only: an Assistants thread id, the page-indexed
//! documents uploaded so far, and a cancellation token for in-flight coach
//! runs. `/reset` cancels the token and drops only that user's entry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::docs::Document;

/// An uploaded file tracked by a session: the retrieval API's file id plus
/// the locally-extracted page index for citation matching.
#[derive(Debug, Clone)]
pub struct SessionFile {
    pub file_id: String,
    pub document: Arc<Document>,
}

#[derive(Default)]
struct Session {
    thread_id: Option<String>,
    files: Vec<SessionFile>,
    cancel: CancellationToken,
}

/// Session store keyed by Discord user id. Shared via `Arc` and passed by
/// reference into command handlers.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_id(&self, user_id: &str) -> Option<String> {
        self.sessions.lock().get(user_id).and_then(|s| s.thread_id.clone())
    }

    pub fn set_thread_id(&self, user_id: &str, thread_id: String) {
        self.sessions.lock().entry(user_id.to_string()).or_default().thread_id =
            Some(thread_id);
    }

    pub fn add_file(&self, user_id: &str, file_id: String, document: Arc<Document>) {
        debug!(user_id, file_id, pages = document.page_count(), "indexed file in session");
        self.sessions
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .files
            .push(SessionFile { file_id, document });
    }

    /// All files uploaded in this user's session, oldest first.
    pub fn files(&self, user_id: &str) -> Vec<SessionFile> {
        self.sessions.lock().get(user_id).map(|s| s.files.clone()).unwrap_or_default()
    }

    pub fn document_for(&self, user_id: &str, file_id: &str) -> Option<Arc<Document>> {
        self.sessions.lock().get(user_id).and_then(|s| {
            s.files.iter().find(|f| f.file_id == file_id).map(|f| f.document.clone())
        })
    }

    /// Whether this user has completed at least one valid upload.
    pub fn has_file(&self, user_id: &str) -> bool {
        self.sessions.lock().get(user_id).is_some_and(|s| !s.files.is_empty())
    }

    /// Token under which this user's coach runs execute. Creating the
    /// session lazily here means a `/reset` racing a first question still
    /// has something to cancel.
    pub fn cancel_token(&self, user_id: &str) -> CancellationToken {
        self.sessions.lock().entry(user_id.to_string()).or_default().cancel.clone()
    }

    /// Drop the user's session, cancelling any in-flight run. Returns
    /// whether a session existed.
    pub fn reset(&self, user_id: &str) -> bool {
        match self.sessions.lock().remove(user_id) {
            Some(session) => {
                session.cancel.cancel();
                debug!(user_id, "session reset");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Arc<Document> {
        Arc::new(Document::new("guide.pdf", vec!["page one text".into()]))
    }

    #[test]
    fn sessions_are_isolated_per_user() {
        let store = SessionStore::new();
        store.add_file("alice", "file-1".into(), doc());
        assert!(store.has_file("alice"));
        assert!(!store.has_file("bob"));

        store.reset("alice");
        assert!(!store.has_file("alice"));
    }

    #[test]
    fn reset_cancels_the_session_token() {
        let store = SessionStore::new();
        let token = store.cancel_token("alice");
        assert!(!token.is_cancelled());
        assert!(store.reset("alice"));
        assert!(token.is_cancelled());
        // a fresh session gets a fresh token
        assert!(!store.cancel_token("alice").is_cancelled());
    }

    #[test]
    fn reset_of_unknown_user_is_a_noop() {
        let store = SessionStore::new();
        assert!(!store.reset("nobody"));
    }

    #[test]
    fn document_lookup_by_file_id() {
        let store = SessionStore::new();
        store.add_file("alice", "file-1".into(), doc());
        assert!(store.document_for("alice", "file-1").is_some());
        assert!(store.document_for("alice", "file-2").is_none());
        assert!(store.document_for("bob", "file-1").is_none());
    }

    #[test]
    fn thread_id_round_trip() {
        let store = SessionStore::new();
        assert_eq!(store.thread_id("alice"), None);
        store.set_thread_id("alice", "thread_abc".into());
        assert_eq!(store.thread_id("alice").as_deref(), Some("thread_abc"));
    }
}

//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Process-wide session table. Each session sits behind its own lock, so
//! different sessions never contend.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::state::Session;

const EVENT_CAPACITY: usize = 256;

struct Entry {
    session: Arc<Mutex<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Entry>,
}

impl SessionStore {
    pub fn new() -> SessionStore {
        SessionStore::default()
    }

    pub fn insert(&self, session: Session) {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        self.sessions.insert(
            session.id.clone(),
            Entry {
                session: Arc::new(Mutex::new(session)),
                events,
            },
        );
    }

    pub fn get(&self, id: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .get(id)
            .map(|e| e.session.clone())
            .ok_or(SessionError::NotFound)
    }

    /// Runs `f` under the session's lock
    pub fn with<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let session = self.get(id)?;
        let mut guard = session.lock();
        f(&mut guard)
    }

    pub fn snapshot(&self, id: &str) -> Result<Session> {
        self.with(id, |s| Ok(s.clone()))
    }

    pub fn subscribe(&self, id: &str) -> Result<broadcast::Receiver<SessionEvent>> {
        self.sessions
            .get(id)
            .map(|e| e.events.subscribe())
            .ok_or(SessionError::NotFound)
    }

    /// Sends to current subscribers; having none is fine
    pub fn publish(&self, id: &str, event: SessionEvent) {
        if let Some(e) = self.sessions.get(id) {
            let _ = e.events.send(event);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SessionState;

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let store = SessionStore::new();
        store.insert(Session::new("s1", "lead", 2));
        let mut rx = store.subscribe("s1").unwrap();
        store.publish(
            "s1",
            SessionEvent::StateChanged {
                state: SessionState::Uploading,
            },
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SessionEvent::StateChanged {
                state: SessionState::Uploading
            }
        );
        assert!(matches!(store.subscribe("nope"), Err(SessionError::NotFound)));
    }

    #[test]
    fn mutations_are_visible_in_snapshots() {
        let store = SessionStore::new();
        store.insert(Session::new("s1", "lead", 2));
        store.with("s1", |s| s.join("bob")).unwrap();
        assert_eq!(store.snapshot("s1").unwrap().joined_users.len(), 2);
        assert!(matches!(store.snapshot("s2"), Err(SessionError::NotFound)));
        assert_eq!(store.len(), 1);
    }
}

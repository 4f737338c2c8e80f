//! Session registry (C9): two disjoint maps under one mutex. `promote` is
//! insert-if-absent -- a uid already holding a verified session is never
//! silently replaced; same-user re-login is arbitrated upstream by the
//! gateway's single-login claim (C7), not here.

use std::collections::HashMap;
use std::sync::Mutex;

use flux::UserId;

use crate::session::{SessionHandle, SessionId};

struct Inner {
    temp: HashMap<SessionId, SessionHandle>,
    verified: HashMap<UserId, SessionHandle>,
}

pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            inner: Mutex::new(Inner {
                temp: HashMap::new(),
                verified: HashMap::new(),
            }),
        }
    }

    pub fn add_temp(&self, handle: SessionHandle) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        inner.temp.insert(handle.id, handle);
    }

    /// Atomically moves `handle` out of `temp` and into `verified[uid]`.
    /// Returns `false` (and leaves `handle` in `temp`) if `uid` is already
    /// claimed by a different session.
    pub fn promote(&self, uid: UserId, handle: SessionHandle) -> bool {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if inner.verified.contains_key(&uid) {
            return false;
        }
        inner.temp.remove(&handle.id);
        inner.verified.insert(uid, handle);
        true
    }

    pub fn remove_temp(&self, id: SessionId) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        inner.temp.remove(&id);
    }

    pub fn remove(&self, uid: UserId) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        inner.verified.remove(&uid);
    }

    pub fn get(&self, uid: UserId) -> Option<SessionHandle> {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        inner.verified.get(&uid).cloned()
    }

    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock().expect("registry mutex poisoned");
        (inner.verified.len(), inner.temp.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::test_session;

    #[test]
    fn new_registry_has_zero_counts() {
        let reg = Registry::new();
        assert_eq!(reg.counts(), (0, 0));
    }

    #[test]
    fn add_temp_then_promote_moves_session() {
        let reg = Registry::new();
        let (_sess, handle) = test_session(1);
        reg.add_temp(handle.clone());
        assert_eq!(reg.counts(), (0, 1));

        assert!(reg.promote(7, handle.clone()));
        assert_eq!(reg.counts(), (1, 0));
        assert!(reg.get(7).is_some());
    }

    #[test]
    fn promote_rejects_duplicate_uid() {
        let reg = Registry::new();
        let (_a, handle_a) = test_session(1);
        let (_b, handle_b) = test_session(2);

        assert!(reg.promote(7, handle_a));
        assert!(!reg.promote(7, handle_b));
        assert_eq!(reg.counts(), (1, 0));
    }

    #[test]
    fn remove_drops_from_verified_map() {
        let reg = Registry::new();
        let (_sess, handle) = test_session(1);
        reg.promote(7, handle);
        reg.remove(7);
        assert!(reg.get(7).is_none());
        assert_eq!(reg.counts(), (0, 0));
    }

    #[test]
    fn remove_temp_drops_from_temp_map() {
        let reg = Registry::new();
        let (_sess, handle) = test_session(1);
        reg.add_temp(handle.clone());
        reg.remove_temp(handle.id);
        assert_eq!(reg.counts(), (0, 0));
    }
}

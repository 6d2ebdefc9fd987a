// ── Window registry ───────────────────────────────────────────────────────────
//
// Maps native resource identity to the owning window state.  The registry
// never owns a window: entries are `Weak`, and an entry exists exactly while
// its window is live.  Native notifications for ids that are not registered
// belong to resources outside our own window set and are simply not found.
//
// Storage is thread-local and created lazily on first use.  All window work
// happens on the UI thread, so no locking is involved.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};

use crate::{
    error::{Error, Result},
    types::NativeId,
    window::WindowState,
};

pub(crate) type SharedState = Rc<RefCell<WindowState>>;

thread_local! {
    static ENTRIES: RefCell<HashMap<NativeId, Weak<RefCell<WindowState>>>> =
        RefCell::new(HashMap::new());
}

/// Record `window` under `id`.
///
/// Fails if `id` already resolves to a live window.  A stale entry whose
/// window has already been dropped is replaced.
pub(crate) fn register(id: NativeId, window: &SharedState) -> Result<()> {
    ENTRIES.with(|entries| {
        let mut entries = entries.borrow_mut();
        if entries.get(&id).is_some_and(|w| w.strong_count() > 0) {
            return Err(Error::DuplicateWindow(id.0));
        }
        entries.insert(id, Rc::downgrade(window));
        Ok(())
    })
}

/// Remove the entry for `id`; absent ids are ignored.
pub(crate) fn unregister(id: NativeId) {
    ENTRIES.with(|entries| {
        entries.borrow_mut().remove(&id);
    });
}

/// Resolve `id` to its live window.
pub(crate) fn lookup(id: NativeId) -> Option<SharedState> {
    ENTRIES.with(|entries| entries.borrow().get(&id).and_then(Weak::upgrade))
}

/// Snapshot of every live window.
///
/// Returned as owned handles so callers can run callbacks (which may create
/// or destroy windows) without holding the registry borrow.
pub(crate) fn live() -> Vec<SharedState> {
    ENTRIES.with(|entries| entries.borrow().values().filter_map(Weak::upgrade).collect())
}

/// Number of registered windows.
#[cfg(test)]
pub(crate) fn len() -> usize {
    ENTRIES.with(|entries| entries.borrow().len())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;

    fn state() -> SharedState {
        Rc::new(RefCell::new(WindowState::detached(Size::new(100, 100), false)))
    }

    #[test]
    fn lookup_of_unknown_id_is_not_found() {
        assert!(lookup(NativeId(0xdead)).is_none());
    }

    #[test]
    fn register_then_lookup_resolves_same_window() {
        let w = state();
        register(NativeId(1), &w).unwrap();
        let found = lookup(NativeId(1)).expect("registered");
        assert!(Rc::ptr_eq(&found, &w));
        assert_eq!(len(), 1);
    }

    #[test]
    fn duplicate_registration_fails() {
        let a = state();
        let b = state();
        register(NativeId(7), &a).unwrap();
        let err = register(NativeId(7), &b).unwrap_err();
        assert!(matches!(err, Error::DuplicateWindow(7)));
        assert!(Rc::ptr_eq(&lookup(NativeId(7)).unwrap(), &a));
    }

    #[test]
    fn unregister_is_idempotent() {
        let w = state();
        register(NativeId(3), &w).unwrap();
        unregister(NativeId(3));
        unregister(NativeId(3));
        assert!(lookup(NativeId(3)).is_none());
        assert_eq!(len(), 0);
    }

    #[test]
    fn registry_does_not_keep_windows_alive() {
        let w = state();
        register(NativeId(9), &w).unwrap();
        drop(w);
        assert!(lookup(NativeId(9)).is_none());
        assert!(live().is_empty());
        // A dead entry does not block reuse of the id.
        register(NativeId(9), &state()).unwrap();
    }
}

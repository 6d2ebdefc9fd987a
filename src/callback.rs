// ── Callback slots ────────────────────────────────────────────────────────────
//
// A slot holds at most one callback.  "Unset" (`None`) is a distinct state
// from "set to a closure that does nothing", and firing an unset slot is not
// an error.
//
// Callbacks run with no `RefCell` borrow held on the window (they may call
// back into the window or create new ones), so the dispatcher takes the
// callback out of the slot, runs it, and then puts it back.  The generation
// counter tells `restore` whether the slot was reassigned while the callback
// was running; a reassignment always wins.

/// Called when the user closes the window.
pub type OnClosed = Box<dyn FnMut()>;

/// Called with the final client size once a resize is committed.
pub type OnResized = Box<dyn FnMut(crate::Size)>;

/// Called with the live candidate size while the user drags a window edge.
pub type OnResizing = Box<dyn FnMut(crate::Size)>;

/// A single-callback holder.
pub(crate) struct Slot<F: ?Sized> {
    callback: Option<Box<F>>,
    generation: u64,
}

/// A callback temporarily removed from its slot.
pub(crate) struct Taken<F: ?Sized> {
    pub(crate) callback: Box<F>,
    generation: u64,
}

impl<F: ?Sized> Slot<F> {
    pub(crate) fn new(callback: Option<Box<F>>) -> Self {
        Self {
            callback,
            generation: 0,
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.callback.is_some()
    }

    /// Replace the slot contents.  `None` unsets the slot.
    pub(crate) fn set(&mut self, callback: Option<Box<F>>) {
        self.callback = callback;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Remove the callback for the duration of one invocation.
    pub(crate) fn take(&mut self) -> Option<Taken<F>> {
        self.callback.take().map(|callback| Taken {
            callback,
            generation: self.generation,
        })
    }

    /// Put a taken callback back unless the slot was reassigned meanwhile.
    pub(crate) fn restore(&mut self, taken: Taken<F>) {
        if self.generation == taken.generation && self.callback.is_none() {
            self.callback = Some(taken.callback);
        }
    }
}

impl<F: ?Sized> Default for Slot<F> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<F: ?Sized> std::fmt::Debug for Slot<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("set", &self.is_set())
            .field("generation", &self.generation)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_is_distinct_from_noop() {
        let unset: Slot<dyn FnMut()> = Slot::default();
        let noop: Slot<dyn FnMut()> = Slot::new(Some(Box::new(|| {})));
        assert!(!unset.is_set());
        assert!(noop.is_set());
    }

    #[test]
    fn take_and_restore_round_trips() {
        let mut slot: Slot<dyn FnMut()> = Slot::new(Some(Box::new(|| {})));
        let taken = slot.take().expect("slot was set");
        assert!(!slot.is_set());
        slot.restore(taken);
        assert!(slot.is_set());
    }

    #[test]
    fn reassignment_during_invocation_wins() {
        let mut slot: Slot<dyn FnMut() -> u32> = Slot::new(Some(Box::new(|| 1)));
        let taken = slot.take().expect("slot was set");
        slot.set(Some(Box::new(|| 2)));
        slot.restore(taken);
        let mut current = slot.take().expect("replacement kept");
        assert_eq!((current.callback)(), 2);
    }

    #[test]
    fn unset_during_invocation_stays_unset() {
        let mut slot: Slot<dyn FnMut()> = Slot::new(Some(Box::new(|| {})));
        let taken = slot.take().expect("slot was set");
        slot.set(None);
        slot.restore(taken);
        assert!(!slot.is_set());
    }

    #[test]
    fn taking_an_unset_slot_yields_nothing() {
        let mut slot: Slot<dyn FnMut()> = Slot::default();
        assert!(slot.take().is_none());
    }
}

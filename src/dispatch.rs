// ── Event dispatcher ──────────────────────────────────────────────────────────
//
// Backends translate their native messages into `Notification`s and hand them
// to `dispatch`.  The dispatcher resolves the target through the registry and
// runs the matching callback inline.
//
// Resize contract:
//   • `on_resizing` fires for every live candidate size during a gesture.
//   • `on_resized` fires once per gesture, after that gesture's
//     `on_resizing` calls, with the final size, and only if the final size
//     differs from the last committed one.
//   • A committed size change outside any gesture (maximise, window-manager
//     placement) fires `on_resized` right away.
//
// Win32 and Cocoa bracket live resizes explicitly.  X11 only reports
// unframed `ConfigureNotify` sizes, so those open an implicit gesture that
// ends `RESIZE_SETTLE` after the last report (see `settle`).

use std::time::{Duration, Instant};

use tracing::trace;

use crate::{
    registry::{self, SharedState},
    types::{NativeId, Size},
    window::{self, WindowState},
};

/// Quiet period after which an unframed resize is considered finished.
pub(crate) const RESIZE_SETTLE: Duration = Duration::from_millis(120);

/// A backend-neutral native notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notification {
    /// The user started dragging a window edge.
    ResizeStarted,
    /// Live candidate size during a drag.
    Resizing(Size),
    /// The native window now has this client size.
    Resized(Size),
    /// The drag finished.
    ResizeEnded,
    /// A size report with no gesture framing (X11 `ConfigureNotify`).
    Configured(Size),
    /// The user asked to close the window.
    CloseRequested,
    /// The native window no longer exists.
    Destroyed,
}

/// Per-window resize gesture tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gesture {
    Idle,
    /// Explicitly bracketed drag; `latest` is the newest committed size.
    Live { latest: Option<Size> },
    /// Implicit gesture from unframed reports, finished at `deadline`.
    Settling { latest: Size, deadline: Instant },
}

#[derive(Clone, Copy)]
enum SizeSlot {
    Resized,
    Resizing,
}

impl WindowState {
    fn size_slot(&mut self, which: SizeSlot) -> &mut crate::callback::Slot<dyn FnMut(Size)> {
        match which {
            SizeSlot::Resized => &mut self.on_resized,
            SizeSlot::Resizing => &mut self.on_resizing,
        }
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Route one native notification to its window.
pub(crate) fn dispatch(id: NativeId, note: Notification) {
    dispatch_at(id, note, Instant::now());
}

pub(crate) fn dispatch_at(id: NativeId, note: Notification, now: Instant) {
    let Some(state) = registry::lookup(id) else {
        // Shared native event sources carry notifications for windows that
        // are not ours, or that we already destroyed.
        trace!(id = id.0, ?note, "dropped notification for unknown window");
        return;
    };
    trace!(id = id.0, ?note, "dispatch");

    match note {
        Notification::CloseRequested => {
            fire_closed(&state);
            window::destroy_state(&state);
        }
        Notification::Destroyed => window::forget_state(&state),
        Notification::ResizeStarted => {
            state.borrow_mut().gesture = Gesture::Live { latest: None };
        }
        Notification::Resizing(size) => fire_sized(&state, SizeSlot::Resizing, size),
        Notification::Resized(size) => {
            let in_gesture = record_live_size(&state, size);
            if !in_gesture {
                commit(&state, size);
            }
        }
        Notification::ResizeEnded => {
            let finished = {
                let mut s = state.borrow_mut();
                match std::mem::replace(&mut s.gesture, Gesture::Idle) {
                    Gesture::Live { latest } => latest,
                    Gesture::Settling { latest, .. } => Some(latest),
                    Gesture::Idle => None,
                }
            };
            if let Some(size) = finished {
                commit(&state, size);
            }
        }
        Notification::Configured(size) => configured(&state, size, now),
    }
}

/// Finish every implicit gesture whose quiet period is over.
pub(crate) fn settle(now: Instant) {
    for state in registry::live() {
        let finished = {
            let mut s = state.borrow_mut();
            match s.gesture {
                Gesture::Settling { latest, deadline } if deadline <= now => {
                    s.gesture = Gesture::Idle;
                    Some(latest)
                }
                _ => None,
            }
        };
        if let Some(size) = finished {
            commit(&state, size);
        }
    }
}

/// Earliest pending settle deadline, so a blocking loop can wake for it.
pub(crate) fn next_settle_deadline() -> Option<Instant> {
    registry::live()
        .iter()
        .filter_map(|state| match state.borrow().gesture {
            Gesture::Settling { deadline, .. } => Some(deadline),
            _ => None,
        })
        .min()
}

// ── Resize handling ───────────────────────────────────────────────────────────

/// Cache a native size; inside an explicit gesture also remember it as the
/// gesture's latest size.  Returns whether a gesture is in progress.
fn record_live_size(state: &SharedState, size: Size) -> bool {
    let mut guard = state.borrow_mut();
    let s = &mut *guard;
    s.size = size;
    match &mut s.gesture {
        Gesture::Live { latest } => {
            *latest = Some(size);
            true
        }
        Gesture::Settling { latest, .. } => {
            *latest = size;
            true
        }
        Gesture::Idle => false,
    }
}

fn configured(state: &SharedState, size: Size, now: Instant) {
    let fire = {
        let mut guard = state.borrow_mut();
        let s = &mut *guard;
        match &mut s.gesture {
            Gesture::Live { latest } => {
                *latest = Some(size);
                s.size = size;
                false
            }
            // A move, or the echo of a size we set ourselves.
            Gesture::Idle if size == s.committed => false,
            Gesture::Settling { latest, .. } if *latest == size => false,
            _ => {
                s.size = size;
                s.gesture = Gesture::Settling {
                    latest: size,
                    deadline: now + RESIZE_SETTLE,
                };
                true
            }
        }
    };
    if fire {
        fire_sized(state, SizeSlot::Resizing, size);
    }
}

/// Make `size` the committed size and report it if it changed.
fn commit(state: &SharedState, size: Size) {
    let changed = {
        let mut s = state.borrow_mut();
        s.size = size;
        if s.committed == size {
            false
        } else {
            s.committed = size;
            true
        }
    };
    if changed {
        // A fixed window that the system resized anyway is re-pinned.
        window::refresh_bounds(state, false);
        fire_sized(state, SizeSlot::Resized, size);
    }
}

// ── Callback invocation ───────────────────────────────────────────────────────

fn fire_closed(state: &SharedState) {
    let taken = state.borrow_mut().on_closed.take();
    if let Some(mut taken) = taken {
        (taken.callback)();
        state.borrow_mut().on_closed.restore(taken);
    }
}

fn fire_sized(state: &SharedState, which: SizeSlot, size: Size) {
    let taken = state.borrow_mut().size_slot(which).take();
    if let Some(mut taken) = taken {
        (taken.callback)(size);
        state.borrow_mut().size_slot(which).restore(taken);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

// ── Headless display server ───────────────────────────────────────────────────
//
// An in-memory stand-in for a windowing system.  Windows are plain records;
// user and window-manager actions are simulated by the driver functions
// below, which queue notifications exactly the way a native backend would
// report them.  Nothing is delivered until the next pump (`process_messages`
// or an `app_begin` iteration).
//
// API-driven changes (`set_size`, `set_title`, …) are applied silently: the
// core already knows about them.  Tests can arm a notification that is
// dispatched from inside one such call instead, the way Win32 sends
// `WM_SIZE` from within `SetWindowPos`.
//
// State is thread-local, so every thread (every unit test) sees its own
// server.

use std::{
    cell::RefCell,
    collections::VecDeque,
    time::{Duration, Instant},
};

use crate::{
    dispatch::{self, Notification},
    error::{Error, Result},
    platform::{Backend, NativeSpec},
    types::{Icon, NativeHandle, NativeId, Position, Size, SizeBounds},
};

/// Snapshot of one simulated window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimWindow {
    /// Owner window from `WindowConfig::parent`.
    pub parent: Option<NativeHandle>,
    pub position: Position,
    pub size: Size,
    pub visible: bool,
    pub resizable: bool,
    pub bounds: SizeBounds,
    pub title: String,
    /// Size of the installed icon, if any.
    pub icon: Option<Size>,
}

struct Entry {
    id: NativeId,
    window: SimWindow,
    calls: Vec<String>,
}

struct Server {
    // A `Vec` rather than a map: a forced id collision must hold two
    // windows under one id until the core rejects the second.
    windows: Vec<Entry>,
    queue: VecDeque<(NativeId, Notification)>,
    /// Notifications dispatched synchronously by the named backend call.
    inline: Vec<(NativeId, &'static str, Notification)>,
    next_id: usize,
    reuse: Option<NativeId>,
    available: bool,
}

impl Server {
    fn new() -> Self {
        Self {
            windows: Vec::new(),
            queue: VecDeque::new(),
            inline: Vec::new(),
            next_id: 1,
            reuse: None,
            available: true,
        }
    }

    fn entry(&mut self, id: NativeId) -> Option<&mut Entry> {
        self.windows.iter_mut().find(|e| e.id == id)
    }

    fn record(&mut self, id: NativeId, call: &str, apply: impl FnOnce(&mut SimWindow)) {
        if let Some(e) = self.entry(id) {
            apply(&mut e.window);
            e.calls.push(call.to_owned());
        }
    }

    fn take_inline(&mut self, id: NativeId, call: &str) -> Option<Notification> {
        let i = self.inline.iter().position(|(i, c, _)| *i == id && *c == call)?;
        Some(self.inline.remove(i).2)
    }
}

thread_local! {
    static SERVER: RefCell<Server> = RefCell::new(Server::new());
}

fn with_server<R>(f: impl FnOnce(&mut Server) -> R) -> R {
    SERVER.with(|s| f(&mut s.borrow_mut()))
}

fn id_of(handle: impl Into<NativeHandle>) -> NativeId {
    NativeId(handle.into().as_raw())
}

/// Apply an API call, then dispatch any notification armed for it.  The
/// server borrow is released first: the core may call back in.
fn apply(id: NativeId, call: &'static str, change: impl FnOnce(&mut SimWindow)) {
    let note = with_server(|s| {
        s.record(id, call, change);
        s.take_inline(id, call)
    });
    if let Some(note) = note {
        dispatch::dispatch(id, note);
    }
}

// ── Inspection ────────────────────────────────────────────────────────────────

/// The simulated window behind `handle`, if it exists.
pub fn window(handle: impl Into<NativeHandle>) -> Option<SimWindow> {
    let id = id_of(handle);
    with_server(|s| s.windows.iter().find(|e| e.id == id).map(|e| e.window.clone()))
}

/// Names of the backend operations applied to `handle`, oldest first.
pub fn calls(handle: impl Into<NativeHandle>) -> Vec<String> {
    let id = id_of(handle);
    with_server(|s| {
        s.windows
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.calls.clone())
            .unwrap_or_default()
    })
}

/// Number of simulated windows that currently exist.
pub fn live_count() -> usize {
    with_server(|s| s.windows.len())
}

/// Number of notifications waiting for the next pump.
pub fn pending() -> usize {
    with_server(|s| s.queue.len())
}

// ── Failure injection ─────────────────────────────────────────────────────────

/// Take the display away (`false`) or bring it back.  Window creation fails
/// with `Error::Unavailable` while it is away.
pub fn set_available(available: bool) {
    with_server(|s| s.available = available);
}

/// Hand out `handle` again for the next created window.
pub fn reuse_next_id(handle: impl Into<NativeHandle>) {
    let id = id_of(handle);
    with_server(|s| s.reuse = Some(id));
}

/// Dispatch `note` from inside the next `call` made on `handle` ("size",
/// "frame", "title", "visible", …), before that call returns.
#[cfg(test)]
pub(crate) fn during_next(handle: impl Into<NativeHandle>, call: &'static str, note: Notification) {
    let id = id_of(handle);
    with_server(|s| s.inline.push((id, call, note)));
}

// ── Simulated user / window manager ───────────────────────────────────────────

/// Drag a window edge through `steps`.
///
/// Each step is clamped to the installed bounds, as a window manager would;
/// steps that leave the size unchanged produce no report.  The gesture is
/// bracketed like Win32 and Cocoa bracket live resizes.
pub fn user_drag(handle: impl Into<NativeHandle>, steps: &[Size]) {
    let id = id_of(handle);
    with_server(|s| {
        let Some(entry) = s.entry(id) else { return };
        let mut notes = vec![Notification::ResizeStarted];
        for step in steps {
            let next = entry.window.bounds.clamp(*step);
            if next == entry.window.size {
                continue;
            }
            entry.window.size = next;
            notes.push(Notification::Resizing(next));
            notes.push(Notification::Resized(next));
        }
        notes.push(Notification::ResizeEnded);
        s.queue.extend(notes.into_iter().map(|n| (id, n)));
    });
}

/// Resize outside any gesture, like maximise or a tiling window manager.
pub fn system_resize(handle: impl Into<NativeHandle>, size: Size) {
    let id = id_of(handle);
    with_server(|s| {
        let Some(entry) = s.entry(id) else { return };
        let size = entry.window.bounds.clamp(size);
        entry.window.size = size;
        s.queue.push_back((id, Notification::Resized(size)));
    });
}

/// Report a burst of unframed sizes, the way an X11 window manager streams
/// `ConfigureNotify` during a drag.
pub fn configure_storm(handle: impl Into<NativeHandle>, sizes: &[Size]) {
    let id = id_of(handle);
    with_server(|s| {
        let Some(entry) = s.entry(id) else { return };
        let mut notes = Vec::with_capacity(sizes.len());
        for size in sizes {
            let size = entry.window.bounds.clamp(*size);
            entry.window.size = size;
            notes.push((id, Notification::Configured(size)));
        }
        s.queue.extend(notes);
    });
}

/// Click the close button.
pub fn user_close(handle: impl Into<NativeHandle>) {
    let id = id_of(handle);
    with_server(|s| s.queue.push_back((id, Notification::CloseRequested)));
}

/// Destroy the window behind the core's back.
pub fn external_destroy(handle: impl Into<NativeHandle>) {
    let id = id_of(handle);
    with_server(|s| {
        s.windows.retain(|e| e.id != id);
        s.queue.push_back((id, Notification::Destroyed));
    });
}

// ── Backend ───────────────────────────────────────────────────────────────────

pub(crate) struct Headless;

impl Backend for Headless {
    fn create(spec: &NativeSpec) -> Result<NativeId> {
        with_server(|s| {
            if !s.available {
                return Err(Error::Unavailable("headless display is offline".into()));
            }
            let id = s.reuse.take().unwrap_or_else(|| {
                let id = NativeId(s.next_id);
                s.next_id += 1;
                id
            });
            s.windows.push(Entry {
                id,
                window: SimWindow {
                    parent: spec.parent,
                    position: spec.position,
                    size: spec.size,
                    visible: false,
                    resizable: spec.resizable,
                    bounds: SizeBounds::for_window(spec.size, spec.resizable),
                    title: String::new(),
                    icon: None,
                },
                calls: vec!["create".to_owned()],
            });
            Ok(id)
        })
    }

    fn destroy(id: NativeId) {
        with_server(|s| {
            if let Some(i) = s.windows.iter().rposition(|e| e.id == id) {
                s.windows.remove(i);
            }
        });
    }

    fn set_position(id: NativeId, position: Position) {
        apply(id, "position", |w| w.position = position);
    }

    fn set_size(id: NativeId, size: Size) {
        apply(id, "size", |w| w.size = size);
    }

    fn set_frame(id: NativeId, position: Position, size: Size) {
        apply(id, "frame", |w| {
            w.position = position;
            w.size = size;
        });
    }

    fn set_resizable(id: NativeId, resizable: bool) {
        apply(id, "resizable", |w| w.resizable = resizable);
    }

    fn apply_bounds(id: NativeId, bounds: SizeBounds) {
        apply(id, "bounds", |w| w.bounds = bounds);
    }

    fn set_title(id: NativeId, title: &str) {
        apply(id, "title", |w| w.title = title.to_owned());
    }

    fn set_visible(id: NativeId, visible: bool) {
        apply(id, "visible", |w| w.visible = visible);
    }

    fn set_icon(id: NativeId, icon: &Icon) -> Result<()> {
        apply(id, "icon", |w| w.icon = Some(icon.size()));
        Ok(())
    }

    fn pump() {
        // One at a time: callbacks may queue more work or touch the server.
        while let Some((id, note)) = with_server(|s| s.queue.pop_front()) {
            dispatch::dispatch(id, note);
        }
    }

    fn wait(deadline: Instant) {
        if pending() > 0 {
            return;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left > Duration::ZERO {
            std::thread::sleep(left);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{config::WindowConfig, dispatch::RESIZE_SETTLE, window::create};

    fn spec(size: Size, resizable: bool) -> NativeSpec {
        NativeSpec {
            parent: None,
            position: Position::new(3, 4),
            size,
            resizable,
        }
    }

    #[test]
    fn ids_are_unique_and_non_zero() {
        let a = Headless::create(&spec(Size::new(100, 100), true)).unwrap();
        let b = Headless::create(&spec(Size::new(100, 100), true)).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.0, 0);
        assert_eq!(live_count(), 2);
    }

    #[test]
    fn create_records_parent_and_position() {
        let owner = NativeHandle::from_raw(0x77);
        let id = Headless::create(&NativeSpec {
            parent: Some(owner),
            ..spec(Size::new(100, 100), false)
        })
        .unwrap();
        let sim = window(id).unwrap();
        assert_eq!(sim.parent, Some(owner));
        assert_eq!(sim.position, Position::new(3, 4));
        assert!(sim.bounds.is_pinned());
    }

    #[test]
    fn destroy_is_idempotent() {
        let id = Headless::create(&spec(Size::new(100, 100), true)).unwrap();
        Headless::destroy(id);
        Headless::destroy(id);
        assert_eq!(live_count(), 0);
        // Operations on a missing window are ignored.
        Headless::set_title(id, "x");
        assert!(calls(id).is_empty());
    }

    #[test]
    fn drag_is_clamped_to_installed_bounds() {
        let id = Headless::create(&spec(Size::new(100, 100), true)).unwrap();
        Headless::apply_bounds(
            id,
            SizeBounds {
                min: Size::new(50, 50),
                max: Size::new(200, 200),
            },
        );
        user_drag(id, &[Size::new(10, 500)]);
        assert_eq!(window(id).unwrap().size, Size::new(50, 200));
        // Started, Resizing, Resized, Ended.
        assert_eq!(pending(), 4);
    }

    #[test]
    fn wait_returns_early_when_work_is_queued() {
        user_close(NativeId(1));
        let started = Instant::now();
        Headless::wait(started + Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_sleeps_until_deadline_when_idle() {
        let deadline = Instant::now() + Duration::from_millis(20);
        Headless::wait(deadline);
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn configure_storm_settles_into_one_resized() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let w = create(
            WindowConfig::default()
                .resizable(true)
                .on_resized(move |s| log.borrow_mut().push(s)),
        )
        .unwrap();
        let handle = w.native_handle().unwrap();
        configure_storm(handle, &[Size::new(500, 500), Size::new(520, 510), Size::new(530, 515)]);
        crate::app::process_messages();
        assert!(seen.borrow().is_empty());

        std::thread::sleep(RESIZE_SETTLE + Duration::from_millis(20));
        crate::app::process_messages();
        assert_eq!(*seen.borrow(), [Size::new(530, 515)]);
        assert_eq!(w.size(), Size::new(530, 515));
    }
}

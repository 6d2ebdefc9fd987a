// ── Window lifecycle & property mutation ──────────────────────────────────────
//
// `Window` is the caller's move-only handle.  The state behind it is shared
// with the registry through a `Weak`, which lets the dispatcher reach the
// window when a native notification arrives without ever owning it.
//
// Re-entrancy rule: no `RefCell` borrow of the state is held across a
// backend call.  Native calls such as `SetWindowPos` or `setContentSize:`
// deliver notifications synchronously, and those go straight back into the
// dispatcher, which borrows the same state.

use std::{cell::RefCell, rc::Rc};

use tracing::{debug, warn};

use crate::{
    callback::{OnClosed, OnResized, OnResizing, Slot},
    config::WindowConfig,
    dispatch::Gesture,
    error::Result,
    platform::{Backend, NativeSpec, Platform},
    registry::{self, SharedState},
    types::{Icon, NativeHandle, NativeId, Position, Size, SizeBounds},
};

// ── State ─────────────────────────────────────────────────────────────────────

/// Everything the core knows about one native window.
pub(crate) struct WindowState {
    /// `None` once the native resource has been released.
    pub(crate) native: Option<NativeId>,
    /// Latest client size known from the API or the native side.
    pub(crate) size: Size,
    /// Last size reported through `on_resized` or set through the API.
    pub(crate) committed: Size,
    pub(crate) resizable: bool,
    /// Bounds currently installed on the native window.
    pub(crate) bounds: SizeBounds,
    pub(crate) title: String,
    pub(crate) visible: bool,
    pub(crate) on_closed: Slot<dyn FnMut()>,
    pub(crate) on_resized: Slot<dyn FnMut(Size)>,
    pub(crate) on_resizing: Slot<dyn FnMut(Size)>,
    pub(crate) gesture: Gesture,
}

impl WindowState {
    /// State for a window that has no native resource yet.
    pub(crate) fn detached(size: Size, resizable: bool) -> Self {
        Self {
            native: None,
            size,
            committed: size,
            resizable,
            bounds: SizeBounds::for_window(size, resizable),
            title: String::new(),
            visible: false,
            on_closed: Slot::default(),
            on_resized: Slot::default(),
            on_resizing: Slot::default(),
            gesture: Gesture::Idle,
        }
    }

    /// Drop every callback so captured resources are released with the
    /// native window rather than with the handle.
    fn clear_callbacks(&mut self) {
        self.on_closed.set(None);
        self.on_resized.set(None);
        self.on_resizing.set(None);
    }
}

// ── Construction ──────────────────────────────────────────────────────────────

/// Create a top-level window.
///
/// The native window is allocated hidden, registered, and then configured in
/// a fixed order: callbacks, icon, resizable, title, visibility.  Visibility
/// comes last so a half-configured window never flashes on screen.
///
/// On failure nothing native is left behind.
pub fn create(config: WindowConfig) -> Result<Window> {
    let WindowConfig {
        parent,
        position,
        size,
        resizable,
        title,
        icon,
        visible,
        on_closed,
        on_resized,
        on_resizing,
    } = config;

    let size = size.clamped();
    let id = Platform::create(&NativeSpec {
        parent,
        position,
        size,
        resizable,
    })?;

    let mut state = WindowState::detached(size, resizable);
    state.native = Some(id);
    let state = Rc::new(RefCell::new(state));

    // Registered before any property is applied so notifications raised by
    // the setters below already resolve to this window.
    if let Err(e) = registry::register(id, &state) {
        Platform::destroy(id);
        return Err(e);
    }

    let mut window = Window { state };
    window.set_on_closed(on_closed);
    window.set_on_resized(on_resized);
    window.set_on_resizing(on_resizing);
    if let Some(icon) = &icon {
        window.set_icon(icon);
    }
    window.set_resizable(resizable);
    window.set_title(&title);
    window.set_visible(visible);

    debug!(id = id.0, ?size, resizable, visible, "window created");
    Ok(window)
}

// ── Teardown ──────────────────────────────────────────────────────────────────

/// Release the native resource and the registry entry.
///
/// Idempotent: the first caller takes the native id, every later caller
/// (explicit destroy, `Drop`, close request, native destroy) finds `None`.
pub(crate) fn destroy_state(state: &SharedState) {
    let id = {
        let mut s = state.borrow_mut();
        s.gesture = Gesture::Idle;
        s.clear_callbacks();
        s.native.take()
    };
    let Some(id) = id else { return };
    registry::unregister(id);
    Platform::destroy(id);
    debug!(id = id.0, "window destroyed");
}

/// The native side destroyed the window on its own; forget it without
/// issuing another native destroy.
pub(crate) fn forget_state(state: &SharedState) {
    let id = {
        let mut s = state.borrow_mut();
        s.gesture = Gesture::Idle;
        s.clear_callbacks();
        s.native.take()
    };
    if let Some(id) = id {
        registry::unregister(id);
        debug!(id = id.0, "window destroyed by the windowing system");
    }
}

/// Recompute the size bounds from the cached size and resizable flag and
/// push them to the native window when they changed (or when `force`).
pub(crate) fn refresh_bounds(state: &SharedState, force: bool) {
    let update = {
        let mut s = state.borrow_mut();
        let bounds = SizeBounds::for_window(s.size, s.resizable);
        let changed = bounds != s.bounds;
        s.bounds = bounds;
        s.native.filter(|_| changed || force).map(|id| (id, bounds))
    };
    if let Some((id, bounds)) = update {
        Platform::apply_bounds(id, bounds);
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// A top-level native window.
///
/// Move-only.  Dropping the handle destroys the window; so does a user close
/// action, after which every setter is a silent no-op.
pub struct Window {
    state: SharedState,
}

impl Window {
    /// Native id if the window is still alive.
    fn live_id(&self, operation: &'static str) -> Option<NativeId> {
        let id = self.state.borrow().native;
        if id.is_none() {
            debug!(operation, "ignored: window already destroyed");
        }
        id
    }

    /// Destroy the window now.  Safe to call any number of times.
    pub fn destroy(&mut self) {
        destroy_state(&self.state);
    }

    /// `false` once the window has been destroyed by any path.
    pub fn is_alive(&self) -> bool {
        self.state.borrow().native.is_some()
    }

    /// Opaque native identity, for interop.  `None` after destruction.
    pub fn native_handle(&self) -> Option<NativeHandle> {
        self.state.borrow().native.map(NativeHandle::from)
    }

    /// Last known client size.
    pub fn size(&self) -> Size {
        self.state.borrow().size
    }

    pub fn is_resizable(&self) -> bool {
        self.state.borrow().resizable
    }

    pub fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    pub fn title(&self) -> String {
        self.state.borrow().title.clone()
    }

    /// Size limits currently installed on the native window.
    pub fn bounds(&self) -> SizeBounds {
        self.state.borrow().bounds
    }

    // ── Geometry ──────────────────────────────────────────────────────────────

    pub fn set_position(&mut self, position: Position) {
        if let Some(id) = self.live_id("set_position") {
            Platform::set_position(id, position);
        }
    }

    /// Resize the client area.  The size is clamped into
    /// `[MIN_SIZE, MAX_SIZE]`; a fixed window is re-pinned to the new size.
    pub fn set_size(&mut self, size: Size) {
        let Some(id) = self.live_id("set_size") else { return };
        let size = size.clamped();
        if !self.cache_size(size) {
            return;
        }
        // Bounds first: a pinned window could not otherwise grow or shrink.
        refresh_bounds(&self.state, false);
        Platform::set_size(id, size);
    }

    /// Move and resize in one native operation.
    pub fn set_frame(&mut self, position: Position, size: Size) {
        let Some(id) = self.live_id("set_frame") else { return };
        let size = size.clamped();
        self.cache_size(size);
        refresh_bounds(&self.state, false);
        Platform::set_frame(id, position, size);
    }

    /// Record an API-driven size; `false` if nothing changed.
    fn cache_size(&self, size: Size) -> bool {
        let mut s = self.state.borrow_mut();
        if s.size == size && s.committed == size {
            return false;
        }
        s.size = size;
        s.committed = size;
        true
    }

    /// Allow or refuse user resizing.
    ///
    /// Always re-installs the bounds, so stale native constraints are
    /// corrected even when the flag itself is unchanged.
    pub fn set_resizable(&mut self, resizable: bool) {
        let Some(id) = self.live_id("set_resizable") else { return };
        self.state.borrow_mut().resizable = resizable;
        Platform::set_resizable(id, resizable);
        refresh_bounds(&self.state, true);
    }

    // ── Appearance ────────────────────────────────────────────────────────────

    pub fn set_title(&mut self, title: &str) {
        let Some(id) = self.live_id("set_title") else { return };
        {
            let mut s = self.state.borrow_mut();
            if s.title == title {
                return;
            }
            s.title = title.to_owned();
        }
        Platform::set_title(id, title);
    }

    pub fn set_visible(&mut self, visible: bool) {
        let Some(id) = self.live_id("set_visible") else { return };
        {
            let mut s = self.state.borrow_mut();
            if s.visible == visible {
                return;
            }
            s.visible = visible;
        }
        Platform::set_visible(id, visible);
    }

    /// Replace the window icon.
    ///
    /// A backend that fails to convert the image keeps the previous icon.
    pub fn set_icon(&mut self, icon: &Icon) {
        let Some(id) = self.live_id("set_icon") else { return };
        if let Err(e) = Platform::set_icon(id, icon) {
            warn!(id = id.0, error = %e, "icon not applied");
        }
    }

    // ── Callbacks ─────────────────────────────────────────────────────────────

    /// Install or clear (`None`) the close callback.
    ///
    /// The window is destroyed right after this callback returns; there is
    /// no way to veto a close.
    pub fn set_on_closed(&mut self, callback: Option<OnClosed>) {
        if self.live_id("set_on_closed").is_some() {
            self.state.borrow_mut().on_closed.set(callback);
        }
    }

    /// Install or clear the callback fired once per finished resize.
    pub fn set_on_resized(&mut self, callback: Option<OnResized>) {
        if self.live_id("set_on_resized").is_some() {
            self.state.borrow_mut().on_resized.set(callback);
        }
    }

    /// Install or clear the callback fired while a resize is in progress.
    pub fn set_on_resizing(&mut self, callback: Option<OnResizing>) {
        if self.live_id("set_on_resizing").is_some() {
            self.state.borrow_mut().on_resizing.set(callback);
        }
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("Window")
            .field("native", &s.native)
            .field("size", &s.size)
            .field("resizable", &s.resizable)
            .field("visible", &s.visible)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{
        dispatch::Notification,
        error::Error,
        platform::headless,
        types::{NativeHandle, Rgba, MAX_SIZE, MIN_SIZE},
    };

    fn id_of(w: &Window) -> NativeId {
        NativeId(w.native_handle().expect("live window").as_raw())
    }

    #[test]
    fn create_returns_non_null_identity() {
        let w = create(WindowConfig::default()).unwrap();
        let handle = w.native_handle().unwrap();
        assert!(!handle.is_null());
        assert!(headless::window(id_of(&w)).is_some());
        assert_eq!(registry::len(), 1);
    }

    #[test]
    fn create_applies_config_defaults() {
        let w = create(WindowConfig::default()).unwrap();
        let sim = headless::window(id_of(&w)).unwrap();
        assert_eq!(sim.position, Position::new(0, 0));
        assert_eq!(sim.size, Size::default());
        assert!(!sim.visible);
        assert!(!sim.resizable);
        assert!(sim.bounds.is_pinned());
        assert_eq!(sim.title, "");
        assert!(sim.icon.is_none());
    }

    #[test]
    fn create_applies_properties_in_order_with_visibility_last() {
        let icon = Icon::from_rgba(Size::new(1, 1), vec![Rgba::new(1, 2, 3, 4)]).unwrap();
        let w = create(
            WindowConfig::default()
                .title("hello")
                .icon(icon)
                .resizable(true)
                .visible(true),
        )
        .unwrap();
        let calls = headless::calls(id_of(&w));
        let order: Vec<&str> = calls
            .iter()
            .map(String::as_str)
            .filter(|c| matches!(*c, "icon" | "resizable" | "title" | "visible"))
            .collect();
        assert_eq!(order, ["icon", "resizable", "title", "visible"]);
    }

    #[test]
    fn create_fails_cleanly_without_display() {
        headless::set_available(false);
        let err = create(WindowConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
        assert_eq!(headless::live_count(), 0);
        assert_eq!(registry::len(), 0);
    }

    #[test]
    fn create_releases_native_window_when_registration_fails() {
        let first = create(WindowConfig::default()).unwrap();
        headless::reuse_next_id(id_of(&first));
        let before = headless::live_count();
        let err = create(WindowConfig::default()).unwrap_err();
        assert!(matches!(err, Error::DuplicateWindow(_)));
        assert_eq!(headless::live_count(), before);
        assert!(first.is_alive());
    }

    #[test]
    fn create_clamps_requested_size() {
        let w = create(WindowConfig::default().size(Size::new(1, 50_000))).unwrap();
        assert_eq!(w.size(), Size::new(MIN_SIZE, MAX_SIZE));
        assert_eq!(headless::window(id_of(&w)).unwrap().size, Size::new(MIN_SIZE, MAX_SIZE));
    }

    #[test]
    fn destroy_is_idempotent_and_mutators_become_noops() {
        let mut w = create(WindowConfig::default()).unwrap();
        let id = id_of(&w);
        w.destroy();
        w.destroy();
        assert!(!w.is_alive());
        assert!(w.native_handle().is_none());
        assert!(headless::window(id).is_none());
        assert!(registry::lookup(id).is_none());

        w.set_position(Position::new(5, 5));
        w.set_size(Size::new(300, 300));
        w.set_frame(Position::new(1, 1), Size::new(200, 200));
        w.set_resizable(true);
        w.set_title("gone");
        w.set_visible(true);
        w.set_icon(&Icon::from_rgba(Size::new(1, 1), vec![Rgba::default()]).unwrap());
        w.set_on_closed(Some(Box::new(|| {})));
        assert_eq!(headless::live_count(), 0);
    }

    #[test]
    fn dropping_the_handle_destroys_the_window() {
        let w = create(WindowConfig::default()).unwrap();
        let id = id_of(&w);
        drop(w);
        assert!(headless::window(id).is_none());
        assert!(registry::lookup(id).is_none());
    }

    #[test]
    fn set_resizable_false_pins_bounds_to_current_size() {
        let mut w = create(WindowConfig::default().size(Size::new(800, 600)).resizable(true)).unwrap();
        w.set_resizable(false);
        let sim = headless::window(id_of(&w)).unwrap();
        assert_eq!(sim.bounds, SizeBounds::for_window(Size::new(800, 600), false));
        assert_eq!(w.bounds().min, Size::new(800, 600));
        assert_eq!(w.bounds().max, Size::new(800, 600));
    }

    #[test]
    fn set_resizable_true_widens_bounds() {
        let mut w = create(WindowConfig::default().size(Size::new(800, 600))).unwrap();
        w.set_resizable(true);
        let sim = headless::window(id_of(&w)).unwrap();
        assert_eq!(sim.bounds.min, Size::new(MIN_SIZE, MIN_SIZE));
        assert_eq!(sim.bounds.max, Size::new(MAX_SIZE, MAX_SIZE));
    }

    #[test]
    fn resizing_a_fixed_window_repins_bounds() {
        let mut w = create(WindowConfig::default().size(Size::new(800, 600))).unwrap();
        w.set_size(Size::new(1024, 768));
        let sim = headless::window(id_of(&w)).unwrap();
        assert_eq!(sim.size, Size::new(1024, 768));
        assert_eq!(sim.bounds.min, Size::new(1024, 768));
        assert_eq!(sim.bounds.max, Size::new(1024, 768));
    }

    #[test]
    fn set_frame_moves_and_resizes_together() {
        let mut w = create(WindowConfig::default().resizable(true)).unwrap();
        w.set_frame(Position::new(40, 50), Size::new(300, 200));
        let sim = headless::window(id_of(&w)).unwrap();
        assert_eq!(sim.position, Position::new(40, 50));
        assert_eq!(sim.size, Size::new(300, 200));
        assert_eq!(w.size(), Size::new(300, 200));
    }

    #[test]
    fn repeated_setters_are_idempotent() {
        let mut w = create(WindowConfig::default().title("a")).unwrap();
        let id = id_of(&w);
        let before = headless::calls(id).len();
        w.set_title("a");
        w.set_visible(false);
        w.set_size(Size::default());
        assert_eq!(headless::calls(id).len(), before);
    }

    #[test]
    fn setters_work_while_hidden() {
        let mut w = create(WindowConfig::default()).unwrap();
        w.set_title("hidden but titled");
        w.set_position(Position::new(9, 9));
        let sim = headless::window(id_of(&w)).unwrap();
        assert!(!sim.visible);
        assert_eq!(sim.title, "hidden but titled");
        assert_eq!(sim.position, Position::new(9, 9));
    }

    #[test]
    fn icon_is_forwarded_to_backend() {
        let mut w = create(WindowConfig::default()).unwrap();
        let icon = Icon::from_rgba(Size::new(2, 1), vec![Rgba::new(255, 0, 0, 255); 2]).unwrap();
        w.set_icon(&icon);
        assert_eq!(headless::window(id_of(&w)).unwrap().icon, Some(Size::new(2, 1)));
    }

    #[test]
    fn destroy_releases_callbacks() {
        let token = Rc::new(Cell::new(0));
        let held = Rc::clone(&token);
        let mut w = create(WindowConfig::default().on_closed(move || held.set(1))).unwrap();
        assert_eq!(Rc::strong_count(&token), 2);
        w.destroy();
        assert_eq!(Rc::strong_count(&token), 1);
    }

    // ── Notifications raised from inside a native call ───────────────────────

    #[test]
    fn close_requested_while_showing_fires_once_and_destroys() {
        let handle = NativeHandle::from_raw(0x5000);
        headless::reuse_next_id(handle);
        headless::during_next(handle, "visible", Notification::CloseRequested);
        let closed = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&closed);
        let w = create(
            WindowConfig::default()
                .visible(true)
                .on_closed(move || c.set(c.get() + 1)),
        )
        .unwrap();
        assert_eq!(closed.get(), 1);
        assert!(!w.is_alive());
        assert!(headless::window(handle).is_none());
        assert_eq!(registry::len(), 0);
    }

    #[test]
    fn size_echo_from_native_call_is_not_reported() {
        let resized = Rc::new(Cell::new(0u32));
        let r = Rc::clone(&resized);
        let mut w = create(
            WindowConfig::default()
                .resizable(true)
                .on_resized(move |_| r.set(r.get() + 1)),
        )
        .unwrap();
        let id = id_of(&w);
        headless::during_next(id, "size", Notification::Resized(Size::new(300, 200)));
        w.set_size(Size::new(300, 200));
        assert_eq!(resized.get(), 0);
        assert_eq!(w.size(), Size::new(300, 200));
        // Still fully usable: nothing was left borrowed.
        w.set_title("after");
        assert_eq!(headless::window(id).unwrap().title, "after");
    }

    #[test]
    fn native_adjustment_during_set_frame_is_reported_once() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let mut w = create(
            WindowConfig::default()
                .resizable(true)
                .on_resized(move |size| log.borrow_mut().push(size)),
        )
        .unwrap();
        let id = id_of(&w);
        // The system settles on a slightly different size than requested.
        headless::during_next(id, "frame", Notification::Resized(Size::new(250, 200)));
        w.set_frame(Position::new(5, 5), Size::new(260, 200));
        assert_eq!(*seen.borrow(), [Size::new(250, 200)]);
        assert_eq!(w.size(), Size::new(250, 200));
    }

    #[test]
    fn destroyed_while_setting_title_makes_later_setters_noops() {
        let mut w = create(WindowConfig::default()).unwrap();
        let id = id_of(&w);
        headless::during_next(id, "title", Notification::Destroyed);
        w.set_title("bye");
        assert!(!w.is_alive());
        assert_eq!(registry::len(), 0);

        w.set_size(Size::new(200, 200));
        w.set_visible(true);
        w.set_title("again");
        w.destroy();
        assert_eq!(w.title(), "bye");
        assert_eq!(headless::calls(id).last().map(String::as_str), Some("title"));
    }
}

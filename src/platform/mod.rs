// ── Platform abstraction layer ────────────────────────────────────────────────
//
// The rest of the crate talks to the windowing system only through the
// `Backend` trait.  Exactly one implementation is linked per build and named
// `Platform`; there is no runtime selection.
//
// No `unsafe` lives here; FFI is confined to the backend sub-modules and
// never leaks outward.
//
// Backend contract:
//   • `create` returns a hidden window, or an error with nothing left behind.
//   • Every other operation on an id that no longer exists is a no-op.
//   • Native notifications go to `crate::dispatch::dispatch`, possibly
//     synchronously from inside any of these calls.

use std::time::{Duration, Instant};

use crate::{
    error::Result,
    types::{Icon, NativeHandle, NativeId, Position, Size, SizeBounds},
};

#[cfg(any(test, feature = "headless"))]
pub mod headless;

#[cfg(target_os = "windows")]
#[cfg_attr(any(test, feature = "headless"), allow(dead_code))]
mod win32;

#[cfg(target_os = "linux")]
#[cfg_attr(any(test, feature = "headless"), allow(dead_code))]
mod x11;

#[cfg(target_os = "macos")]
#[cfg_attr(any(test, feature = "headless"), allow(dead_code))]
mod cocoa;

// ── Backend selection ─────────────────────────────────────────────────────────

#[cfg(any(test, feature = "headless"))]
pub(crate) type Platform = headless::Headless;

#[cfg(all(not(any(test, feature = "headless")), target_os = "windows"))]
pub(crate) type Platform = win32::Win32;

#[cfg(all(not(any(test, feature = "headless")), target_os = "linux"))]
pub(crate) type Platform = x11::X11;

#[cfg(all(not(any(test, feature = "headless")), target_os = "macos"))]
pub(crate) type Platform = cocoa::Cocoa;

// ── Contract ──────────────────────────────────────────────────────────────────

/// What the core asks for when it allocates a window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NativeSpec {
    pub(crate) parent: Option<NativeHandle>,
    pub(crate) position: Position,
    /// Client size, already clamped.
    pub(crate) size: Size,
    pub(crate) resizable: bool,
}

/// One windowing system.
///
/// Implementations are zero-sized; their state lives in thread-locals on
/// the UI thread.
pub(crate) trait Backend {
    /// Allocate a hidden native window.
    fn create(spec: &NativeSpec) -> Result<NativeId>;

    /// Release the native window.  Idempotent.
    fn destroy(id: NativeId);

    fn set_position(id: NativeId, position: Position);

    /// Resize the client area.
    fn set_size(id: NativeId, size: Size);

    /// Move and resize together.
    fn set_frame(id: NativeId, position: Position, size: Size) {
        Self::set_position(id, position);
        Self::set_size(id, size);
    }

    /// Show or hide the native resize affordances.
    fn set_resizable(id: NativeId, resizable: bool);

    /// Install client-size limits the OS enforces during user resizes.
    fn apply_bounds(id: NativeId, bounds: SizeBounds);

    fn set_title(id: NativeId, title: &str);

    fn set_visible(id: NativeId, visible: bool);

    fn set_icon(id: NativeId, icon: &Icon) -> Result<()>;

    /// Dispatch every queued native event without blocking.
    fn pump();

    /// Block until a native event arrives or `deadline` passes.
    fn wait(deadline: Instant);

    /// The app loop started ticking frames every `interval`.
    fn frames_started(_interval: Duration) {}

    /// The app loop stopped.
    fn frames_stopped() {}
}

/// Milliseconds until `deadline`, rounded up so a wait never wakes early.
#[cfg(any(test, target_os = "windows", target_os = "linux"))]
pub(crate) fn millis_until(deadline: Instant) -> u32 {
    let left = deadline.saturating_duration_since(Instant::now());
    let ms = left.as_micros().div_ceil(1000);
    u32::try_from(ms).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_until_rounds_up() {
        let deadline = Instant::now() + Duration::from_micros(1500);
        let ms = millis_until(deadline);
        assert!((1..=2).contains(&ms));
    }

    #[test]
    fn millis_until_past_deadline_is_zero() {
        assert_eq!(millis_until(Instant::now()), 0);
    }
}

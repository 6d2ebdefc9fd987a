// ── Win32 platform implementation ─────────────────────────────────────────────
//
// A native backend, so `unsafe` code is permitted here (see the safety
// policy in `lib.rs`).  Every `unsafe` block MUST carry a
// `// SAFETY:` comment that states:
//   • which invariant makes the operation sound, and
//   • what the caller is responsible for maintaining.
//
// Nothing in this module is visible beyond `platform`; keep the unsafe
// surface as small as possible.

#![allow(unsafe_code)]

// ── Sub-modules ───────────────────────────────────────────────────────────────

mod icon; // RGBA → HICON
mod window; // class, WndProc, message pump

use std::time::{Duration, Instant};

use crate::{
    error::Result,
    platform::{Backend, NativeSpec},
    types::{Icon, NativeId, Position, Size, SizeBounds},
};

/// The Win32 backend.
pub(crate) struct Win32;

impl Backend for Win32 {
    fn create(spec: &NativeSpec) -> Result<NativeId> {
        window::create(spec)
    }

    fn destroy(id: NativeId) {
        window::destroy(id);
    }

    fn set_position(id: NativeId, position: Position) {
        window::set_position(id, position);
    }

    fn set_size(id: NativeId, size: Size) {
        window::set_size(id, size);
    }

    fn set_frame(id: NativeId, position: Position, size: Size) {
        window::set_frame(id, position, size);
    }

    fn set_resizable(id: NativeId, resizable: bool) {
        window::set_resizable(id, resizable);
    }

    fn apply_bounds(id: NativeId, bounds: SizeBounds) {
        window::apply_bounds(id, bounds);
    }

    fn set_title(id: NativeId, title: &str) {
        window::set_title(id, title);
    }

    fn set_visible(id: NativeId, visible: bool) {
        window::set_visible(id, visible);
    }

    fn set_icon(id: NativeId, icon: &Icon) -> Result<()> {
        let hicon = icon::create_hicon(icon)?;
        window::install_icon(id, hicon);
        Ok(())
    }

    fn pump() {
        window::pump();
    }

    fn wait(deadline: Instant) {
        window::wait(deadline);
    }

    fn frames_started(interval: Duration) {
        let ms = u32::try_from(interval.as_millis()).unwrap_or(u32::MAX);
        window::frames_started(ms);
    }

    fn frames_stopped() {
        window::frames_stopped();
    }
}

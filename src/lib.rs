// ── Safety policy ────────────────────────────────────────────────────────────
// Unsafe code is forbidden everywhere except the native backends:
//   • `platform::win32` – Win32 FFI
//   • `platform::cocoa` – Objective-C runtime calls
//   • `platform::x11`   – the poll(2) wait on the connection socket
// Each unsafe block in those modules MUST carry a `// SAFETY:` comment.
#![deny(unsafe_code)]

//! Native top-level windows behind one small API.
//!
//! One window model over three windowing systems: Win32 on Windows, X11 on
//! Linux and Cocoa on macOS.  The backend is chosen at build time.
//!
//! * [`create`] a [`Window`] from a [`WindowConfig`].
//! * Mutate it through setters; every setter is a no-op once the window has
//!   been destroyed, whoever destroyed it.
//! * Receive `on_closed`, `on_resizing` and `on_resized` callbacks while
//!   either [`process_messages`] (your loop) or [`app_begin`] (our loop) pumps
//!   native events.
//!
//! Everything runs on the thread that created the windows; `Window` is not
//! `Send`.
//!
//! ```no_run
//! use std::time::Duration;
//! use casement::{Size, WindowConfig};
//!
//! let _window = casement::create(
//!     WindowConfig::default()
//!         .title("Hello")
//!         .size(Size::new(800, 600))
//!         .resizable(true)
//!         .visible(true)
//!         .on_resized(|size| println!("now {}x{}", size.width, size.height))
//!         .on_closed(casement::app_end),
//! )?;
//! casement::app_begin(|| {}, Duration::from_millis(16));
//! # Ok::<(), casement::Error>(())
//! ```

mod app;
mod callback;
mod config;
mod dispatch;
mod error;
mod platform;
mod registry;
mod types;
mod window;

pub use app::{app_begin, app_end, process_messages, DEFAULT_FRAME_INTERVAL, MAX_FRAME_INTERVAL};
pub use callback::{OnClosed, OnResized, OnResizing};
pub use config::{WindowConfig, WindowSettings};
pub use error::{Error, Result};
pub use types::{
    Icon, NativeHandle, Position, Rgba, Size, SizeBounds, DEFAULT_SIZE, MAX_SIZE, MIN_SIZE,
};
pub use window::{create, Window};

/// In-memory display server used in place of a native backend.
///
/// Drives windows the way a user or window manager would, so downstream
/// test suites can exercise their callbacks without a display.
#[cfg(feature = "headless")]
pub use platform::headless;

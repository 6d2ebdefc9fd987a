// ── Central error type ────────────────────────────────────────────────────────
//
// Fallible operations return `error::Result<T>`.  Only construction and
// configuration loading can fail from the caller's point of view; property
// mutations on a live window report native failures through `tracing` and
// otherwise behave as no-ops.

use thiserror::Error;

/// Every error that casement can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// The native windowing subsystem cannot be reached (no display, no
    /// session, not on the main thread on macOS, …).
    #[error("windowing system unavailable: {0}")]
    Unavailable(String),

    /// A native API call returned a failure code.
    #[error("{function} failed (error {code:#010x})")]
    Native {
        /// The name of the failing function, for display purposes.
        function: &'static str,
        /// The raw platform error code (`GetLastError()`, HRESULT, X11 error code).
        code: u32,
    },

    /// A native id was handed out twice while the first owner is still alive.
    #[error("native window {0:#x} is already registered")]
    DuplicateWindow(usize),

    /// The icon pixel buffer does not hold `width * height` pixels.
    #[error("icon pixel buffer holds {actual} pixels, expected {expected}")]
    InvalidIcon {
        /// `width * height` of the declared icon size.
        expected: usize,
        /// Number of pixels actually supplied.
        actual: usize,
    },

    /// Window settings could not be parsed.
    #[error("invalid window settings: {0}")]
    Config(#[from] serde_json::Error),

    /// A standard I/O error (settings file missing, unreadable, …).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_error_displays_function_and_hex_code() {
        let e = Error::Native {
            function: "CreateWindowExW",
            code: 0x8007_0005,
        };
        assert_eq!(e.to_string(), "CreateWindowExW failed (error 0x80070005)");
    }

    #[test]
    fn invalid_icon_reports_both_counts() {
        let e = Error::InvalidIcon {
            expected: 4,
            actual: 3,
        };
        assert_eq!(e.to_string(), "icon pixel buffer holds 3 pixels, expected 4");
    }

    #[test]
    fn io_error_keeps_its_source() {
        use std::error::Error as _;
        let e = Error::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(e.source().is_some());
    }
}

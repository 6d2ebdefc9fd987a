// ── Value types shared by every backend ───────────────────────────────────────
//
// Pure Rust, no platform imports.  Sizes are client-area sizes in device
// pixels on every backend; positions are the top-left corner of the window in
// screen coordinates with a top-left origin.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ── Size limits ───────────────────────────────────────────────────────────────

/// Smallest width or height a window may have.
pub const MIN_SIZE: u32 = 10;

/// Largest width or height a window may have.
pub const MAX_SIZE: u32 = 10_000;

/// Size used when a config does not name one.
pub const DEFAULT_SIZE: Size = Size {
    width: 640,
    height: 480,
};

// ── Geometry ──────────────────────────────────────────────────────────────────

/// Top-left corner of a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Client-area size of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Clamp both axes into `[MIN_SIZE, MAX_SIZE]`.
    ///
    /// Every size entering the public API goes through here, so the cached
    /// size of a window is always a size the native side can actually hold.
    pub fn clamped(self) -> Self {
        Self {
            width: self.width.clamp(MIN_SIZE, MAX_SIZE),
            height: self.height.clamp(MIN_SIZE, MAX_SIZE),
        }
    }

    /// Number of pixels covered, as used for icon buffers.
    pub fn area(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for Size {
    fn default() -> Self {
        DEFAULT_SIZE
    }
}

/// Size limits installed on a native window.
///
/// A resizable window gets elastic bounds `[MIN_SIZE, MAX_SIZE]`; a fixed
/// window is pinned to its current size so the OS refuses user resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    pub min: Size,
    pub max: Size,
}

impl SizeBounds {
    /// Bounds for a window of `size` with the given resizable flag.
    ///
    /// Must be recomputed whenever either argument changes.
    pub fn for_window(size: Size, resizable: bool) -> Self {
        if resizable {
            Self {
                min: Size::new(MIN_SIZE, MIN_SIZE),
                max: Size::new(MAX_SIZE, MAX_SIZE),
            }
        } else {
            let pinned = size.clamped();
            Self {
                min: pinned,
                max: pinned,
            }
        }
    }

    /// `true` when min and max coincide.
    pub fn is_pinned(&self) -> bool {
        self.min == self.max
    }

    /// Clamp a requested size into these bounds, the way a window manager
    /// treats a user-driven resize.
    pub fn clamp(&self, size: Size) -> Size {
        Size {
            width: size.width.clamp(self.min.width, self.max.width),
            height: size.height.clamp(self.min.height, self.max.height),
        }
    }
}

// ── Icon ──────────────────────────────────────────────────────────────────────

/// One 32-bit RGBA pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Packed `0xAARRGGBB`, the layout of `_NET_WM_ICON` cardinals.
    pub fn to_argb(self) -> u32 {
        (u32::from(self.a) << 24)
            | (u32::from(self.r) << 16)
            | (u32::from(self.g) << 8)
            | u32::from(self.b)
    }

    /// Bytes in the `B, G, R, A` order of a 32-bit Windows DIB.
    pub fn to_bgra(self) -> [u8; 4] {
        [self.b, self.g, self.r, self.a]
    }
}

/// Window icon: a row-major, top-left-origin RGBA image.
///
/// The pixel count is checked against the size when the icon is built, so
/// every backend can convert an `Icon` without re-validating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    size: Size,
    pixels: Vec<Rgba>,
}

impl Icon {
    /// Build an icon from `size.width * size.height` pixels.
    pub fn from_rgba(size: Size, pixels: Vec<Rgba>) -> Result<Self> {
        let expected = size.area();
        if expected == 0 || pixels.len() != expected {
            return Err(Error::InvalidIcon {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { size, pixels })
    }

    /// Build an icon from tightly packed `R, G, B, A` bytes.
    pub fn from_bytes(size: Size, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(Error::InvalidIcon {
                expected: size.area(),
                actual: bytes.len() / 4,
            });
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|c| Rgba::new(c[0], c[1], c[2], c[3]))
            .collect();
        Self::from_rgba(size, pixels)
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }
}

// ── Native identity ───────────────────────────────────────────────────────────

/// Registry key: the native resource id widened to `usize`.
///
/// HWND and `NSWindow*` are pointers; X11 window ids are 32-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NativeId(pub(crate) usize);

/// Opaque native identity of a window, for interop with platform code.
///
/// * Windows: `HWND`
/// * Linux: X11 `Window`
/// * macOS: `NSWindow*`
///
/// Holding a `NativeHandle` does not keep the window alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// Wrap a raw native value, e.g. to pass a foreign window as a parent.
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<NativeId> for NativeHandle {
    fn from(id: NativeId) -> Self {
        Self(id.0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_clamped_into_limits() {
        assert_eq!(Size::new(0, 20_000).clamped(), Size::new(MIN_SIZE, MAX_SIZE));
        assert_eq!(Size::new(800, 600).clamped(), Size::new(800, 600));
    }

    #[test]
    fn fixed_window_bounds_pin_to_current_size() {
        let b = SizeBounds::for_window(Size::new(800, 600), false);
        assert!(b.is_pinned());
        assert_eq!(b.min, Size::new(800, 600));
        assert_eq!(b.clamp(Size::new(400, 300)), Size::new(800, 600));
    }

    #[test]
    fn resizable_window_bounds_are_elastic() {
        let b = SizeBounds::for_window(Size::new(800, 600), true);
        assert!(!b.is_pinned());
        assert_eq!(b.min, Size::new(MIN_SIZE, MIN_SIZE));
        assert_eq!(b.max, Size::new(MAX_SIZE, MAX_SIZE));
        assert_eq!(b.clamp(Size::new(400, 300)), Size::new(400, 300));
        assert_eq!(b.clamp(Size::new(1, 99_999)), Size::new(MIN_SIZE, MAX_SIZE));
    }

    #[test]
    fn toggling_resizable_converges_to_same_pinned_bounds() {
        let size = Size::new(320, 200);
        let first = SizeBounds::for_window(size, false);
        for resizable in [true, false, true, true, false, false] {
            let b = SizeBounds::for_window(size, resizable);
            if !resizable {
                assert_eq!(b, first);
            }
        }
    }

    #[test]
    fn icon_rejects_wrong_pixel_count() {
        let err = Icon::from_rgba(Size::new(2, 2), vec![Rgba::default(); 3]).unwrap_err();
        assert!(matches!(err, Error::InvalidIcon { expected: 4, actual: 3 }));
    }

    #[test]
    fn icon_rejects_empty_image() {
        assert!(Icon::from_rgba(Size::new(0, 0), Vec::new()).is_err());
    }

    #[test]
    fn icon_from_bytes_splits_channels() {
        let icon = Icon::from_bytes(Size::new(1, 2), &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(icon.pixels()[1], Rgba::new(5, 6, 7, 8));
    }

    #[test]
    fn icon_from_bytes_rejects_ragged_buffer() {
        assert!(Icon::from_bytes(Size::new(1, 1), &[1, 2, 3]).is_err());
    }

    #[test]
    fn pixel_packing_orders() {
        let p = Rgba::new(0x11, 0x22, 0x33, 0x44);
        assert_eq!(p.to_argb(), 0x4411_2233);
        assert_eq!(p.to_bgra(), [0x33, 0x22, 0x11, 0x44]);
    }

    #[test]
    fn native_handle_null_check() {
        assert!(NativeHandle::from_raw(0).is_null());
        assert!(!NativeHandle::from(NativeId(0x42)).is_null());
    }
}

// ── Icon conversion ───────────────────────────────────────────────────────────
//
// RGBA `Icon` → HICON.  The colour plane is a 32-bit top-down DIB section in
// BGRA order with per-pixel alpha; the monochrome mask is all zeros, so the
// alpha channel alone decides transparency.

#![allow(unsafe_code)]

use std::{ffi::c_void, ptr};

use windows::Win32::{
    Foundation::HANDLE,
    Graphics::Gdi::{
        CreateBitmap, CreateDIBSection, DeleteObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
        DIB_RGB_COLORS, HBITMAP, HDC,
    },
    UI::WindowsAndMessaging::{CreateIconIndirect, HICON, ICONINFO},
};

use super::window::{last_error, win_error};
use crate::{error::Result, types::Icon};

/// Build an HICON the caller owns (release with `DestroyIcon`).
pub(super) fn create_hicon(icon: &Icon) -> Result<HICON> {
    let size = icon.size();
    let (width, height) = (size.width as i32, size.height as i32);

    let header = BITMAPINFOHEADER {
        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
        biWidth: width,
        // Negative height: top-down rows, matching `Icon`'s row order.
        biHeight: -height,
        biPlanes: 1,
        biBitCount: 32,
        biCompression: BI_RGB.0,
        ..Default::default()
    };
    let info = BITMAPINFO {
        bmiHeader: header,
        ..Default::default()
    };

    let mut bits: *mut c_void = ptr::null_mut();
    // SAFETY: info describes a 32bpp top-down DIB; `bits` receives a pointer
    // to width * height * 4 bytes owned by the returned bitmap.
    let color = unsafe {
        CreateDIBSection(HDC::default(), &info, DIB_RGB_COLORS, &mut bits, HANDLE::default(), 0)
    }
    .map_err(|e| win_error("CreateDIBSection", &e))?;
    let color = Bitmap(color);

    if bits.is_null() {
        return Err(last_error("CreateDIBSection"));
    }
    let bgra: Vec<u8> = icon.pixels().iter().flat_map(|p| p.to_bgra()).collect();
    // SAFETY: the DIB section holds exactly `pixels().len() * 4` bytes, which
    // `Icon` guarantees equals width * height * 4, and `bgra` does not
    // overlap GDI-owned memory.
    unsafe { ptr::copy_nonoverlapping(bgra.as_ptr(), bits.cast::<u8>(), bgra.len()) };

    // SAFETY: a null bits pointer asks GDI for a zero-initialised 1bpp bitmap.
    let mask = unsafe { CreateBitmap(width, height, 1, 1, None) };
    if mask.is_invalid() {
        return Err(last_error("CreateBitmap"));
    }
    let mask = Bitmap(mask);

    let icon_info = ICONINFO {
        fIcon: true.into(),
        xHotspot: 0,
        yHotspot: 0,
        hbmMask: mask.0,
        hbmColor: color.0,
    };
    // SAFETY: both bitmaps are valid; CreateIconIndirect copies them, so they
    // can be deleted once it returns.
    unsafe { CreateIconIndirect(&icon_info) }.map_err(|e| win_error("CreateIconIndirect", &e))
}

/// Deletes a GDI bitmap on every exit path.
struct Bitmap(HBITMAP);

impl Drop for Bitmap {
    fn drop(&mut self) {
        // SAFETY: the bitmap was created above and is selected into no DC.
        let _ = unsafe { DeleteObject(self.0) };
    }
}

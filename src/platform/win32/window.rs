// ── Win32 windows ─────────────────────────────────────────────────────────────
//
// Responsibilities in this file (unsafe confined here):
//   • Register the window class once per process.
//   • Create, style, move and destroy top-level windows.
//   • Translate window messages into `Notification`s.
//   • Pump and wait on the thread message queue; run the frame timer.
//
// Sizes crossing this boundary are client sizes.  Win32 positions and sizes
// windows by their outer frame, so every conversion goes through
// `AdjustWindowRectEx` with the window's current style.

#![allow(unsafe_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    ffi::c_void,
    time::Instant,
};

use tracing::warn;
use windows::{
    core::{w, HSTRING, PCWSTR},
    Win32::{
        Foundation::{GetLastError, HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM},
        System::LibraryLoader::GetModuleHandleW,
        UI::WindowsAndMessaging::{
            AdjustWindowRectEx, CreateWindowExW, DefWindowProcW, DestroyIcon, DestroyWindow,
            DispatchMessageW, GetWindowLongPtrW, IsWindow, KillTimer, LoadCursorW,
            MsgWaitForMultipleObjects, PeekMessageW, RegisterClassExW, SendMessageW,
            SetTimer, SetWindowLongPtrW, SetWindowPos, SetWindowTextW, ShowWindow,
            TranslateMessage, CS_HREDRAW, CS_VREDRAW, GWL_STYLE, HICON, HMENU, ICON_BIG,
            ICON_SMALL, IDC_ARROW, MINMAXINFO, MSG, PM_REMOVE, QS_ALLINPUT,
            SET_WINDOW_POS_FLAGS, SIZE_MINIMIZED, SWP_FRAMECHANGED, SWP_NOACTIVATE,
            SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SW_HIDE, SW_SHOWNORMAL, WINDOW_EX_STYLE,
            WINDOW_STYLE, WM_CLOSE, WM_DESTROY, WM_ENTERSIZEMOVE, WM_EXITSIZEMOVE,
            WM_GETMINMAXINFO, WM_NCDESTROY, WM_SETICON, WM_SIZE, WM_SIZING, WNDCLASSEXW,
            WS_MAXIMIZEBOX, WS_OVERLAPPEDWINDOW, WS_SIZEBOX,
        },
    },
};

use crate::{
    dispatch::{self, Notification},
    error::{Error, Result},
    platform::{millis_until, NativeSpec},
    types::{NativeId, Position, Size, SizeBounds},
};

// ── Identity ──────────────────────────────────────────────────────────────────

/// Atom name of the one window class every casement window uses.
const CLASS_NAME: PCWSTR = w!("CasementWindow");

/// Styles toggled by `set_resizable`.
const RESIZE_STYLES: WINDOW_STYLE = WINDOW_STYLE(WS_SIZEBOX.0 | WS_MAXIMIZEBOX.0);

thread_local! {
    static CLASS_REGISTERED: Cell<bool> = const { Cell::new(false) };
    static FRAME_TIMER: Cell<usize> = const { Cell::new(0) };
    /// Per-window data the window procedure needs without a registry lookup.
    static EXTRAS: RefCell<HashMap<usize, Extras>> = RefCell::new(HashMap::new());
}

#[derive(Default)]
struct Extras {
    bounds: Option<SizeBounds>,
    icon: Option<HICON>,
}

fn hwnd(id: NativeId) -> HWND {
    HWND(id.0 as *mut c_void)
}

fn native_id(hwnd: HWND) -> NativeId {
    NativeId(hwnd.0 as usize)
}

// ── Class registration ────────────────────────────────────────────────────────

fn instance() -> Result<HINSTANCE> {
    // SAFETY: GetModuleHandleW(None) returns the image's own HMODULE, which is
    // valid for the process lifetime.
    let hmodule = unsafe { GetModuleHandleW(None) }.map_err(|e| win_error("GetModuleHandleW", &e))?;
    Ok(HINSTANCE(hmodule.0))
}

fn register_class(hinstance: HINSTANCE) -> Result<()> {
    if CLASS_REGISTERED.get() {
        return Ok(());
    }

    // SAFETY: IDC_ARROW is a built-in cursor resource present on all Windows
    // versions.
    let cursor = unsafe { LoadCursorW(None, IDC_ARROW) }.map_err(|e| win_error("LoadCursorW", &e))?;

    let wndclass = WNDCLASSEXW {
        // WNDCLASSEXW is ~80 bytes; the cast to u32 is lossless.
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(wnd_proc),
        hInstance: hinstance,
        hCursor: cursor,
        lpszClassName: CLASS_NAME,
        ..Default::default()
    };

    // SAFETY: wndclass is fully initialised; CLASS_NAME is a static
    // null-terminated UTF-16 literal.
    let atom = unsafe { RegisterClassExW(&wndclass) };
    if atom == 0 {
        return Err(last_error("RegisterClassExW"));
    }
    CLASS_REGISTERED.set(true);
    Ok(())
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

fn style_for(resizable: bool) -> WINDOW_STYLE {
    if resizable {
        WS_OVERLAPPEDWINDOW
    } else {
        WINDOW_STYLE(WS_OVERLAPPEDWINDOW.0 & !RESIZE_STYLES.0)
    }
}

pub(super) fn create(spec: &NativeSpec) -> Result<NativeId> {
    let hinstance = instance()?;
    register_class(hinstance)?;

    let style = style_for(spec.resizable);
    let (width, height) = outer_size(style, spec.size)?;
    let parent = spec.parent.map_or(HWND::default(), |p| HWND(p.as_raw() as *mut c_void));

    // SAFETY: CLASS_NAME is registered for this module.  The window starts
    // hidden (no WS_VISIBLE).  `parent` is either null or a caller-supplied
    // owner HWND; Win32 validates it and fails the call if it is not a window.
    let hwnd = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE(0),
            CLASS_NAME,
            w!(""),
            style,
            spec.position.x,
            spec.position.y,
            width,
            height,
            parent,
            HMENU::default(),
            hinstance,
            None,
        )
    }
    .map_err(|e| win_error("CreateWindowExW", &e))?;

    EXTRAS.with(|x| x.borrow_mut().insert(hwnd.0 as usize, Extras::default()));
    Ok(native_id(hwnd))
}

pub(super) fn destroy(id: NativeId) {
    let hwnd = hwnd(id);
    // SAFETY: IsWindow accepts any value and reports whether it is a live
    // window handle, which makes a repeated destroy harmless.
    if !unsafe { IsWindow(hwnd) }.as_bool() {
        return;
    }
    // SAFETY: hwnd is a live window created on this thread.  WM_DESTROY and
    // WM_NCDESTROY are delivered synchronously; the core has already
    // unregistered the id, so the resulting Destroyed notification is dropped.
    if let Err(e) = unsafe { DestroyWindow(hwnd) } {
        warn!(id = id.0, error = %e, "DestroyWindow failed");
    }
}

// ── Geometry ──────────────────────────────────────────────────────────────────

fn current_style(hwnd: HWND) -> WINDOW_STYLE {
    // SAFETY: GWL_STYLE is a valid index for every window; a dead hwnd
    // returns 0, which only produces a wrong frame estimate for a no-op call.
    WINDOW_STYLE(unsafe { GetWindowLongPtrW(hwnd, GWL_STYLE) } as u32)
}

/// Outer frame size for a client size under `style`.
fn outer_size(style: WINDOW_STYLE, client: Size) -> Result<(i32, i32)> {
    let mut rect = RECT {
        left: 0,
        top: 0,
        right: client.width as i32,
        bottom: client.height as i32,
    };
    // SAFETY: rect is a valid, writable RECT on the stack.
    unsafe { AdjustWindowRectEx(&mut rect, style, false, WINDOW_EX_STYLE(0)) }
        .map_err(|e| win_error("AdjustWindowRectEx", &e))?;
    Ok((rect.right - rect.left, rect.bottom - rect.top))
}

/// Extra width and height the frame adds around the client area.
fn frame_extent(hwnd: HWND) -> (i32, i32) {
    outer_size(current_style(hwnd), Size::new(0, 0)).unwrap_or((0, 0))
}

fn set_window_pos(hwnd: HWND, x: i32, y: i32, cx: i32, cy: i32, flags: SET_WINDOW_POS_FLAGS) {
    // SAFETY: hwnd belongs to this thread; a stale handle makes the call fail,
    // which is logged and otherwise ignored.
    if let Err(e) = unsafe {
        SetWindowPos(hwnd, HWND::default(), x, y, cx, cy, flags | SWP_NOZORDER | SWP_NOACTIVATE)
    } {
        warn!(error = %e, "SetWindowPos failed");
    }
}

pub(super) fn set_position(id: NativeId, position: Position) {
    set_window_pos(hwnd(id), position.x, position.y, 0, 0, SWP_NOSIZE);
}

pub(super) fn set_size(id: NativeId, size: Size) {
    let hwnd = hwnd(id);
    match outer_size(current_style(hwnd), size) {
        Ok((cx, cy)) => set_window_pos(hwnd, 0, 0, cx, cy, SWP_NOMOVE),
        Err(e) => warn!(id = id.0, error = %e, "size not applied"),
    }
}

pub(super) fn set_frame(id: NativeId, position: Position, size: Size) {
    let hwnd = hwnd(id);
    match outer_size(current_style(hwnd), size) {
        Ok((cx, cy)) => set_window_pos(hwnd, position.x, position.y, cx, cy, Default::default()),
        Err(e) => warn!(id = id.0, error = %e, "frame not applied"),
    }
}

pub(super) fn set_resizable(id: NativeId, resizable: bool) {
    let hwnd = hwnd(id);
    let style = current_style(hwnd);
    let next = if resizable {
        WINDOW_STYLE(style.0 | RESIZE_STYLES.0)
    } else {
        WINDOW_STYLE(style.0 & !RESIZE_STYLES.0)
    };
    if next == style {
        return;
    }
    // SAFETY: GWL_STYLE is a valid index; the new style only toggles frame
    // bits, and SWP_FRAMECHANGED below makes Windows recompute the frame.
    unsafe { SetWindowLongPtrW(hwnd, GWL_STYLE, next.0 as isize) };
    set_window_pos(hwnd, 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE | SWP_FRAMECHANGED);
}

pub(super) fn apply_bounds(id: NativeId, bounds: SizeBounds) {
    // Read back by WM_GETMINMAXINFO on the next user resize.
    EXTRAS.with(|x| {
        if let Some(extras) = x.borrow_mut().get_mut(&id.0) {
            extras.bounds = Some(bounds);
        }
    });
}

// ── Appearance ────────────────────────────────────────────────────────────────

pub(super) fn set_title(id: NativeId, title: &str) {
    // SAFETY: HSTRING owns a null-terminated UTF-16 copy of `title` that
    // outlives the call.
    if let Err(e) = unsafe { SetWindowTextW(hwnd(id), &HSTRING::from(title)) } {
        warn!(id = id.0, error = %e, "SetWindowTextW failed");
    }
}

pub(super) fn set_visible(id: NativeId, visible: bool) {
    let cmd = if visible { SW_SHOWNORMAL } else { SW_HIDE };
    // SAFETY: hwnd belongs to this thread.  The return value is the previous
    // visibility, not an error indicator.
    unsafe {
        let _ = ShowWindow(hwnd(id), cmd);
    }
}

/// Install `icon` as both the big and small window icon, taking ownership of
/// it, and destroy the icon it replaces.
pub(super) fn install_icon(id: NativeId, icon: HICON) {
    let hwnd = hwnd(id);
    // SAFETY: icon is a valid HICON; WM_SETICON copies nothing and only keeps
    // the handle, which we keep alive until it is replaced or the window
    // goes away (WM_NCDESTROY).
    unsafe {
        SendMessageW(hwnd, WM_SETICON, WPARAM(ICON_BIG as usize), LPARAM(icon.0 as isize));
        SendMessageW(hwnd, WM_SETICON, WPARAM(ICON_SMALL as usize), LPARAM(icon.0 as isize));
    }
    let previous = EXTRAS.with(|x| {
        x.borrow_mut()
            .get_mut(&id.0)
            .and_then(|extras| extras.icon.replace(icon))
    });
    if let Some(old) = previous {
        // SAFETY: `old` was created by CreateIconIndirect, is owned by us and
        // is no longer referenced by the window.
        let _ = unsafe { DestroyIcon(old) };
    }
}

// ── Message loop ──────────────────────────────────────────────────────────────

pub(super) fn pump() {
    let mut msg = MSG::default();
    // SAFETY: &mut msg is a valid MSG; HWND::default() retrieves messages for
    // every window on this thread and thread messages such as WM_TIMER.
    while unsafe { PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE) }.as_bool() {
        // SAFETY: msg was populated by a successful PeekMessageW call.
        unsafe {
            let _ = TranslateMessage(&msg);
            let _ = DispatchMessageW(&msg);
        }
    }
}

pub(super) fn wait(deadline: Instant) {
    let ms = millis_until(deadline);
    if ms == 0 {
        return;
    }
    // SAFETY: no handles are passed; the call only waits on this thread's
    // input queue.
    let _ = unsafe { MsgWaitForMultipleObjects(None, false, ms, QS_ALLINPUT) };
}

pub(super) fn frames_started(interval_ms: u32) {
    // SAFETY: a thread timer (null hwnd) with a TIMERPROC is delivered by
    // DispatchMessageW on this thread, including inside the modal loops
    // DefWindowProcW runs for size/move.
    let timer = unsafe { SetTimer(HWND::default(), 0, interval_ms.max(1), Some(timer_proc)) };
    if timer == 0 {
        warn!(error = %last_error("SetTimer"), "frame timer not installed");
    }
    FRAME_TIMER.set(timer);
}

pub(super) fn frames_stopped() {
    let timer = FRAME_TIMER.replace(0);
    if timer != 0 {
        // SAFETY: `timer` was returned by SetTimer on this thread.
        let _ = unsafe { KillTimer(HWND::default(), timer) };
    }
}

// SAFETY: registered with SetTimer above; Windows calls it on this thread
// from DispatchMessageW with the arguments of the WM_TIMER message.
unsafe extern "system" fn timer_proc(_hwnd: HWND, _msg: u32, _id: usize, _time: u32) {
    crate::app::tick_if_due();
}

// ── Window procedure ──────────────────────────────────────────────────────────

// SAFETY: wnd_proc is registered as lpfnWndProc in WNDCLASSEXW.  Windows
// guarantees hwnd, msg, wparam and lparam are valid for this call; pointer
// lparams are only dereferenced for the messages that document them.
unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    let id = native_id(hwnd);
    match msg {
        // ── Lifecycle ─────────────────────────────────────────────────────────
        WM_CLOSE => {
            // The core decides; DefWindowProcW would destroy immediately.
            dispatch::dispatch(id, Notification::CloseRequested);
            LRESULT(0)
        }

        WM_DESTROY => {
            dispatch::dispatch(id, Notification::Destroyed);
            LRESULT(0)
        }

        WM_NCDESTROY => {
            let extras = EXTRAS.with(|x| x.borrow_mut().remove(&id.0));
            if let Some(icon) = extras.and_then(|e| e.icon) {
                // SAFETY: the window is gone, so nothing references the icon.
                let _ = DestroyIcon(icon);
            }
            DefWindowProcW(hwnd, msg, wparam, lparam)
        }

        // ── Resizing ──────────────────────────────────────────────────────────
        WM_ENTERSIZEMOVE => {
            dispatch::dispatch(id, Notification::ResizeStarted);
            LRESULT(0)
        }

        WM_SIZING => {
            // SAFETY: for WM_SIZING, lparam points to the proposed window RECT.
            let rect = &*(lparam.0 as *const RECT);
            let (fw, fh) = frame_extent(hwnd);
            let size = Size::new(
                (rect.right - rect.left - fw).max(0) as u32,
                (rect.bottom - rect.top - fh).max(0) as u32,
            );
            dispatch::dispatch(id, Notification::Resizing(size));
            LRESULT(1)
        }

        WM_SIZE => {
            if wparam.0 as u32 != SIZE_MINIMIZED {
                // Low word = client width, high word = client height.
                let width = (lparam.0 & 0xFFFF) as u32;
                let height = ((lparam.0 >> 16) & 0xFFFF) as u32;
                dispatch::dispatch(id, Notification::Resized(Size::new(width, height)));
            }
            LRESULT(0)
        }

        WM_EXITSIZEMOVE => {
            dispatch::dispatch(id, Notification::ResizeEnded);
            LRESULT(0)
        }

        WM_GETMINMAXINFO => {
            let bounds = EXTRAS.with(|x| x.borrow().get(&id.0).and_then(|e| e.bounds));
            if let Some(bounds) = bounds {
                let style = current_style(hwnd);
                if let (Ok(min), Ok(max)) = (outer_size(style, bounds.min), outer_size(style, bounds.max)) {
                    // SAFETY: for WM_GETMINMAXINFO, lparam points to a
                    // writable MINMAXINFO.
                    let info = &mut *(lparam.0 as *mut MINMAXINFO);
                    info.ptMinTrackSize.x = min.0;
                    info.ptMinTrackSize.y = min.1;
                    info.ptMaxTrackSize.x = max.0;
                    info.ptMaxTrackSize.y = max.1;
                }
            }
            LRESULT(0)
        }

        // SAFETY: hwnd and message parameters are valid, provided by Windows.
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

// ── Error helpers ─────────────────────────────────────────────────────────────

/// Capture the current Win32 last-error code.
///
/// Call immediately after a Win32 function that signals failure; any later
/// API call may overwrite the thread's last-error value.
pub(super) fn last_error(function: &'static str) -> Error {
    // SAFETY: GetLastError reads thread-local state and never fails.
    let code = unsafe { GetLastError() };
    Error::Native {
        function,
        code: code.0,
    }
}

/// Name the function behind a `windows::core::Error`.
pub(super) fn win_error(function: &'static str, e: &windows::core::Error) -> Error {
    Error::Native {
        function,
        code: e.code().0 as u32,
    }
}

// ── Cocoa platform implementation ─────────────────────────────────────────────
//
// A native backend, so `unsafe` code is permitted here (see the safety
// policy in `lib.rs`).  Every `unsafe` block MUST carry a `// SAFETY:`
// comment.
//
// AppKit must be driven from the main thread; `create` refuses anywhere
// else.  Every window shares one delegate object of a class registered at
// runtime, and the delegate callbacks translate AppKit's window
// notifications into `Notification`s.  Live resizes arrive bracketed by
// `windowWillStartLiveResize:` / `windowDidEndLiveResize:`.
//
// Sizes are content sizes in points.  Positions are converted from the
// crate's top-left origin to AppKit's bottom-left origin on the main screen.
//
// AppKit has no per-window icon; `set_icon` accepts and ignores it.

#![allow(unsafe_code)]

use std::{cell::RefCell, collections::HashMap, sync::OnceLock, time::Instant};

use objc2::{
    msg_send,
    rc::Retained,
    runtime::{AnyClass, AnyObject, Bool, ClassBuilder, Sel},
    sel, MainThreadMarker,
};
use objc2_app_kit::{
    NSApplication, NSApplicationActivationPolicy, NSBackingStoreType, NSEventMask, NSScreen,
    NSWindow, NSWindowStyleMask,
};
use objc2_foundation::{NSDate, NSDefaultRunLoopMode, NSPoint, NSRect, NSSize, NSString};
use tracing::{debug, warn};

use crate::{
    dispatch::{self, Notification},
    error::{Error, Result},
    platform::{Backend, NativeSpec},
    types::{Icon, NativeId, Position, Size, SizeBounds},
};

thread_local! {
    static WINDOWS: RefCell<HashMap<usize, Retained<NSWindow>>> = RefCell::new(HashMap::new());
    static DELEGATE: RefCell<Option<Retained<AnyObject>>> = const { RefCell::new(None) };
}

fn main_thread() -> Result<MainThreadMarker> {
    MainThreadMarker::new()
        .ok_or_else(|| Error::Unavailable("Cocoa windows can only be used from the main thread".into()))
}

fn lookup(id: NativeId) -> Option<Retained<NSWindow>> {
    WINDOWS.with(|w| w.borrow().get(&id.0).cloned())
}

fn style_for(resizable: bool) -> NSWindowStyleMask {
    let base = NSWindowStyleMask::Titled | NSWindowStyleMask::Closable | NSWindowStyleMask::Miniaturizable;
    if resizable {
        base | NSWindowStyleMask::Resizable
    } else {
        base
    }
}

/// Height of the main screen, for flipping the y axis.
fn screen_height(mtm: MainThreadMarker) -> f64 {
    NSScreen::mainScreen(mtm).map_or(0.0, |s| s.frame().size.height)
}

fn content_size(window: &NSWindow) -> Size {
    let content = window.contentRectForFrameRect(window.frame());
    Size::new(
        content.size.width.round().max(0.0) as u32,
        content.size.height.round().max(0.0) as u32,
    )
}

fn ns_size(size: Size) -> NSSize {
    NSSize::new(f64::from(size.width), f64::from(size.height))
}

/// Move `frame` so its top edge sits at `top` in AppKit coordinates.
fn hang_from_top(mut frame: NSRect, top: f64) -> NSRect {
    frame.origin.y = top - frame.size.height;
    frame
}

// ── Application ───────────────────────────────────────────────────────────────

/// Turn the process into a regular foreground app, once.
fn ensure_app(mtm: MainThreadMarker) {
    static LAUNCHED: OnceLock<()> = OnceLock::new();
    LAUNCHED.get_or_init(|| {
        let app = NSApplication::sharedApplication(mtm);
        let _ = app.setActivationPolicy(NSApplicationActivationPolicy::Regular);
        // SAFETY: finishLaunching takes no arguments and is called once, on
        // the main thread, before any event is pumped.
        unsafe {
            let _: () = msg_send![&*app, finishLaunching];
        }
        debug!("NSApplication launched");
    });
}

// ── Delegate class ────────────────────────────────────────────────────────────

fn delegate_class() -> Option<&'static AnyClass> {
    static CLASS: OnceLock<Option<&'static AnyClass>> = OnceLock::new();
    *CLASS.get_or_init(|| {
        let superclass = AnyClass::get(c"NSObject")?;
        let Some(mut builder) = ClassBuilder::new(c"CasementWindowDelegate", superclass) else {
            // Registered by another copy of this crate in the process.
            return AnyClass::get(c"CasementWindowDelegate");
        };
        // SAFETY: every function matches the Objective-C signature of the
        // NSWindowDelegate selector it implements: an object receiver, the
        // selector, one object argument, and a BOOL or void return.
        unsafe {
            builder.add_method(
                sel!(windowShouldClose:),
                window_should_close as extern "C-unwind" fn(_, _, _) -> _,
            );
            builder.add_method(
                sel!(windowWillStartLiveResize:),
                window_will_start_live_resize as extern "C-unwind" fn(_, _, _),
            );
            builder.add_method(sel!(windowDidResize:), window_did_resize as extern "C-unwind" fn(_, _, _));
            builder.add_method(
                sel!(windowDidEndLiveResize:),
                window_did_end_live_resize as extern "C-unwind" fn(_, _, _),
            );
            builder.add_method(sel!(windowWillClose:), window_will_close as extern "C-unwind" fn(_, _, _));
        }
        Some(builder.register())
    })
}

fn delegate() -> Result<Retained<AnyObject>> {
    if let Some(d) = DELEGATE.with(|d| d.borrow().clone()) {
        return Ok(d);
    }
    let class = delegate_class().ok_or(Error::Native {
        function: "objc_allocateClassPair",
        code: 0,
    })?;
    // SAFETY: the class derives from NSObject, so `new` returns a retained,
    // initialised instance (or nil on allocation failure).
    let object: Option<Retained<AnyObject>> = unsafe { msg_send![class, new] };
    let object = object.ok_or(Error::Native {
        function: "+[CasementWindowDelegate new]",
        code: 0,
    })?;
    DELEGATE.with(|d| *d.borrow_mut() = Some(object.clone()));
    Ok(object)
}

/// `NSNotification.object`, i.e. the window that posted it.
fn posting_window(notification: *mut AnyObject) -> NativeId {
    // SAFETY: AppKit passes a valid NSNotification to delegate methods.
    let window: *mut AnyObject = unsafe { msg_send![notification, object] };
    NativeId(window as usize)
}

extern "C-unwind" fn window_should_close(_this: &AnyObject, _cmd: Sel, sender: *mut AnyObject) -> Bool {
    dispatch::dispatch(NativeId(sender as usize), Notification::CloseRequested);
    // The core destroys the window itself once the callback has run.
    Bool::NO
}

extern "C-unwind" fn window_will_start_live_resize(_this: &AnyObject, _cmd: Sel, notification: *mut AnyObject) {
    dispatch::dispatch(posting_window(notification), Notification::ResizeStarted);
}

extern "C-unwind" fn window_did_resize(_this: &AnyObject, _cmd: Sel, notification: *mut AnyObject) {
    let id = posting_window(notification);
    let Some(window) = lookup(id) else { return };
    let size = content_size(&window);
    if window.inLiveResize() {
        dispatch::dispatch(id, Notification::Resizing(size));
    }
    dispatch::dispatch(id, Notification::Resized(size));
}

extern "C-unwind" fn window_did_end_live_resize(_this: &AnyObject, _cmd: Sel, notification: *mut AnyObject) {
    dispatch::dispatch(posting_window(notification), Notification::ResizeEnded);
}

extern "C-unwind" fn window_will_close(_this: &AnyObject, _cmd: Sel, notification: *mut AnyObject) {
    let id = posting_window(notification);
    let window = WINDOWS.with(|w| w.borrow_mut().remove(&id.0));
    dispatch::dispatch(id, Notification::Destroyed);
    drop(window);
}

// ── Backend ───────────────────────────────────────────────────────────────────

/// The Cocoa backend.
pub(crate) struct Cocoa;

impl Backend for Cocoa {
    fn create(spec: &NativeSpec) -> Result<NativeId> {
        let mtm = main_thread()?;
        ensure_app(mtm);
        let delegate = delegate()?;

        let top = screen_height(mtm) - f64::from(spec.position.y);
        let rect = NSRect::new(
            NSPoint::new(f64::from(spec.position.x), top - f64::from(spec.size.height)),
            ns_size(spec.size),
        );
        // SAFETY: a fresh allocation from the main-thread marker, initialised
        // exactly once with a valid rect and style.
        let window = unsafe {
            NSWindow::initWithContentRect_styleMask_backing_defer(
                mtm.alloc(),
                rect,
                style_for(spec.resizable),
                NSBackingStoreType::Buffered,
                false,
            )
        };
        // SAFETY: we hold the only strong reference through `WINDOWS`; AppKit
        // must not release the window a second time on close.  The delegate
        // outlives every window (thread-local, never cleared).
        unsafe {
            window.setReleasedWhenClosed(false);
            let _: () = msg_send![&*window, setDelegate: &*delegate];
        }
        window.setFrameTopLeftPoint(NSPoint::new(f64::from(spec.position.x), top));

        let id = NativeId(Retained::as_ptr(&window) as usize);
        if let Some(parent) = spec.parent.filter(|p| !p.is_null()) {
            // SAFETY: the caller vouches that `parent` is an NSWindow pointer;
            // addChildWindow:ordered: only retains it.
            unsafe {
                let parent = parent.as_raw() as *mut AnyObject;
                let _: () = msg_send![parent, addChildWindow: &*window, ordered: 1isize];
            }
        }
        WINDOWS.with(|w| w.borrow_mut().insert(id.0, window));
        Ok(id)
    }

    fn destroy(id: NativeId) {
        let Some(window) = lookup(id) else { return };
        // windowWillClose: removes the map entry and reports Destroyed, which
        // the core has already unregistered.
        window.close();
        WINDOWS.with(|w| w.borrow_mut().remove(&id.0));
        // SAFETY: clearing the delegate on a window we still retain.
        unsafe {
            let _: () = msg_send![&*window, setDelegate: std::ptr::null::<AnyObject>()];
        }
    }

    fn set_position(id: NativeId, position: Position) {
        let (Some(window), Ok(mtm)) = (lookup(id), main_thread()) else { return };
        let top = screen_height(mtm) - f64::from(position.y);
        window.setFrameTopLeftPoint(NSPoint::new(f64::from(position.x), top));
    }

    fn set_size(id: NativeId, size: Size) {
        if let Some(window) = lookup(id) {
            // Resizes upward from the bottom-left; keep the top-left fixed.
            let frame = window.frame();
            let top_left = NSPoint::new(frame.origin.x, frame.origin.y + frame.size.height);
            window.setContentSize(ns_size(size));
            window.setFrameTopLeftPoint(top_left);
        }
    }

    fn set_frame(id: NativeId, position: Position, size: Size) {
        let (Some(window), Ok(mtm)) = (lookup(id), main_thread()) else { return };
        let top = screen_height(mtm) - f64::from(position.y);
        let content = NSRect::new(NSPoint::new(f64::from(position.x), 0.0), ns_size(size));
        let frame = hang_from_top(window.frameRectForContentRect(content), top);
        window.setFrame_display(frame, true);
    }

    fn set_resizable(id: NativeId, resizable: bool) {
        if let Some(window) = lookup(id) {
            window.setStyleMask(style_for(resizable));
        }
    }

    fn apply_bounds(id: NativeId, bounds: SizeBounds) {
        if let Some(window) = lookup(id) {
            window.setContentMinSize(ns_size(bounds.min));
            window.setContentMaxSize(ns_size(bounds.max));
        }
    }

    fn set_title(id: NativeId, title: &str) {
        if let Some(window) = lookup(id) {
            window.setTitle(&NSString::from_str(title));
        }
    }

    fn set_visible(id: NativeId, visible: bool) {
        let Some(window) = lookup(id) else { return };
        if visible {
            window.makeKeyAndOrderFront(None);
        } else {
            window.orderOut(None);
        }
    }

    fn set_icon(id: NativeId, icon: &Icon) -> Result<()> {
        debug!(id = id.0, size = ?icon.size(), "window icons are not supported by AppKit; ignored");
        Ok(())
    }

    fn pump() {
        let Some(mtm) = MainThreadMarker::new() else {
            warn!("process_messages called off the main thread; nothing pumped");
            return;
        };
        let app = NSApplication::sharedApplication(mtm);
        loop {
            // SAFETY: called on the main thread; distantPast makes the call
            // return immediately when the queue is empty.
            let event = unsafe {
                app.nextEventMatchingMask_untilDate_inMode_dequeue(
                    NSEventMask::Any,
                    Some(&NSDate::distantPast()),
                    NSDefaultRunLoopMode,
                    true,
                )
            };
            let Some(event) = event else { break };
            app.sendEvent(&event);
        }
        app.updateWindows();
    }

    fn wait(deadline: Instant) {
        let Some(mtm) = MainThreadMarker::new() else { return };
        let secs = deadline.saturating_duration_since(Instant::now()).as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        let app = NSApplication::sharedApplication(mtm);
        let until = NSDate::dateWithTimeIntervalSinceNow(secs);
        // SAFETY: main thread; dequeue = false leaves the event for `pump`.
        let _ = unsafe {
            app.nextEventMatchingMask_untilDate_inMode_dequeue(
                NSEventMask::Any,
                Some(&until),
                NSDefaultRunLoopMode,
                false,
            )
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hang_from_top_keeps_width_height_and_x() {
        let frame = NSRect::new(NSPoint::new(40.0, 0.0), NSSize::new(300.0, 228.0));
        let hung = hang_from_top(frame, 900.0);
        assert_eq!(hung.origin.x, 40.0);
        assert_eq!(hung.origin.y, 672.0);
        assert_eq!(hung.size.width, 300.0);
        assert_eq!(hung.size.height, 228.0);
    }
}

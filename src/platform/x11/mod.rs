// ── X11 platform implementation ───────────────────────────────────────────────
//
// Talks to the X server through x11rb's pure-Rust connection.  The only
// `unsafe` is the `poll(2)` call that blocks on the connection socket; it
// carries a `// SAFETY:` comment like every other `unsafe` block.
//
// X11 has no live-resize bracketing: a window manager streams one
// ConfigureNotify per step of a drag (and one per move).  Those are reported
// as unframed `Configured` sizes and the dispatcher settles them into a
// single committed resize.
//
// Resizability is not a window style here.  A fixed window is one whose
// WM_NORMAL_HINTS pin min and max to the same size, so `set_resizable` has
// nothing to do beyond what `apply_bounds` already does.

#![allow(unsafe_code)]

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    os::fd::AsRawFd,
    rc::Rc,
    time::Instant,
};

use tracing::{debug, warn};
use x11rb::{
    connection::Connection,
    errors::{ConnectionError, ReplyError, ReplyOrIdError},
    properties::{WmSizeHints, WmSizeHintsSpecification},
    protocol::{
        xproto::{
            AtomEnum, ConfigureWindowAux, ConnectionExt as _, CreateWindowAux, EventMask,
            PropMode, WindowClass,
        },
        Event,
    },
    rust_connection::RustConnection,
    wrapper::ConnectionExt as _,
    COPY_DEPTH_FROM_PARENT, COPY_FROM_PARENT,
};

use crate::{
    dispatch::{self, Notification},
    error::{Error, Result},
    platform::{millis_until, Backend, NativeSpec},
    types::{Icon, NativeId, Position, Size, SizeBounds},
};

// ── Connection ────────────────────────────────────────────────────────────────

struct Atoms {
    wm_protocols: u32,
    wm_delete_window: u32,
    net_wm_name: u32,
    net_wm_icon: u32,
    utf8_string: u32,
}

struct Session {
    conn: RustConnection,
    root: u32,
    atoms: Atoms,
}

/// Client-side per-window state that the server does not hand back.
#[derive(Clone, Copy)]
struct Placement {
    position: Position,
    bounds: Option<SizeBounds>,
}

thread_local! {
    static SESSION: RefCell<Option<Rc<Session>>> = const { RefCell::new(None) };
    static PLACEMENTS: RefCell<HashMap<u32, Placement>> = RefCell::new(HashMap::new());
    /// Events read while waiting, delivered by the next pump.
    static PENDING: RefCell<VecDeque<Event>> = const { RefCell::new(VecDeque::new()) };
}

/// The display connection, opened on first use.
fn session() -> Result<Rc<Session>> {
    if let Some(s) = SESSION.with(|s| s.borrow().clone()) {
        return Ok(s);
    }
    let (conn, screen) =
        x11rb::connect(None).map_err(|e| Error::Unavailable(format!("cannot open X display: {e}")))?;
    let root = conn
        .setup()
        .roots
        .get(screen)
        .map(|s| s.root)
        .ok_or_else(|| Error::Unavailable(format!("X screen {screen} does not exist")))?;
    let atoms = Atoms {
        wm_protocols: intern(&conn, b"WM_PROTOCOLS")?,
        wm_delete_window: intern(&conn, b"WM_DELETE_WINDOW")?,
        net_wm_name: intern(&conn, b"_NET_WM_NAME")?,
        net_wm_icon: intern(&conn, b"_NET_WM_ICON")?,
        utf8_string: intern(&conn, b"UTF8_STRING")?,
    };
    debug!(screen, "X display connected");
    let session = Rc::new(Session { conn, root, atoms });
    SESSION.with(|s| *s.borrow_mut() = Some(Rc::clone(&session)));
    Ok(session)
}

fn intern(conn: &RustConnection, name: &[u8]) -> Result<u32> {
    Ok(conn
        .intern_atom(false, name)
        .or_native("InternAtom")?
        .reply()
        .or_native("InternAtom")?
        .atom)
}

// ── Error mapping ─────────────────────────────────────────────────────────────

trait OrNative<T> {
    fn or_native(self, function: &'static str) -> Result<T>;
}

impl<T> OrNative<T> for std::result::Result<T, ConnectionError> {
    fn or_native(self, function: &'static str) -> Result<T> {
        self.map_err(|e| Error::Unavailable(format!("{function}: {e}")))
    }
}

impl<T> OrNative<T> for std::result::Result<T, ReplyError> {
    fn or_native(self, function: &'static str) -> Result<T> {
        self.map_err(|e| match e {
            ReplyError::ConnectionError(e) => Error::Unavailable(format!("{function}: {e}")),
            ReplyError::X11Error(e) => Error::Native {
                function,
                code: u32::from(e.error_code),
            },
        })
    }
}

impl<T> OrNative<T> for std::result::Result<T, ReplyOrIdError> {
    fn or_native(self, function: &'static str) -> Result<T> {
        self.map_err(|e| match e {
            ReplyOrIdError::ConnectionError(e) => Error::Unavailable(format!("{function}: {e}")),
            ReplyOrIdError::X11Error(e) => Error::Native {
                function,
                code: u32::from(e.error_code),
            },
            ReplyOrIdError::IdsExhausted => Error::Native { function, code: 0 },
        })
    }
}

/// Log a failed property request; the window keeps its previous state.
fn report(id: NativeId, operation: &'static str, result: Result<()>) {
    if let Err(e) = result {
        warn!(id = id.0, operation, error = %e, "X11 request failed");
    }
}

fn window_of(id: NativeId) -> u32 {
    // X11 resource ids are 29-bit; `NativeId`s only ever come from `create`.
    id.0 as u32
}

fn coord(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn extent(v: u32) -> u16 {
    v.min(u32::from(u16::MAX)) as u16
}

// ── Requests ──────────────────────────────────────────────────────────────────

fn create(spec: &NativeSpec) -> Result<NativeId> {
    let s = session()?;
    let win = s.conn.generate_id().or_native("GenerateId")?;
    let aux = CreateWindowAux::new().event_mask(EventMask::STRUCTURE_NOTIFY);
    s.conn
        .create_window(
            COPY_DEPTH_FROM_PARENT,
            win,
            s.root,
            coord(spec.position.x),
            coord(spec.position.y),
            extent(spec.size.width),
            extent(spec.size.height),
            0,
            WindowClass::INPUT_OUTPUT,
            COPY_FROM_PARENT,
            &aux,
        )
        .or_native("CreateWindow")?
        .check()
        .or_native("CreateWindow")?;

    PLACEMENTS.with(|p| {
        p.borrow_mut().insert(
            win,
            Placement {
                position: spec.position,
                bounds: None,
            },
        )
    });

    // Anything failing from here on leaves a window behind unless we
    // destroy it ourselves.
    if let Err(e) = configure_new(&s, win, spec) {
        let _ = s.conn.destroy_window(win);
        let _ = s.conn.flush();
        PLACEMENTS.with(|p| p.borrow_mut().remove(&win));
        return Err(e);
    }
    Ok(NativeId(win as usize))
}

fn configure_new(s: &Session, win: u32, spec: &NativeSpec) -> Result<()> {
    s.conn
        .change_property32(
            PropMode::REPLACE,
            win,
            s.atoms.wm_protocols,
            AtomEnum::ATOM,
            &[s.atoms.wm_delete_window],
        )
        .or_native("ChangeProperty")?
        .check()
        .or_native("ChangeProperty")?;
    if let Some(parent) = spec.parent.filter(|p| !p.is_null()) {
        s.conn
            .change_property32(
                PropMode::REPLACE,
                win,
                AtomEnum::WM_TRANSIENT_FOR,
                AtomEnum::WINDOW,
                &[parent.as_raw() as u32],
            )
            .or_native("ChangeProperty")?;
    }
    write_hints(s, win)?;
    s.conn.flush().or_native("flush")
}

/// Rewrite WM_NORMAL_HINTS from the stored placement.
fn write_hints(s: &Session, win: u32) -> Result<()> {
    let Some(placement) = PLACEMENTS.with(|p| p.borrow().get(&win).copied()) else {
        return Ok(());
    };
    let mut hints = WmSizeHints::new();
    hints.position = Some((
        WmSizeHintsSpecification::UserSpecified,
        placement.position.x,
        placement.position.y,
    ));
    if let Some(bounds) = placement.bounds {
        hints.min_size = Some((bounds.min.width as i32, bounds.min.height as i32));
        hints.max_size = Some((bounds.max.width as i32, bounds.max.height as i32));
    }
    hints.set_normal_hints(&s.conn, win).or_native("ChangeProperty")?;
    Ok(())
}

fn destroy(id: NativeId) {
    let win = window_of(id);
    if PLACEMENTS.with(|p| p.borrow_mut().remove(&win)).is_none() {
        return;
    }
    let Ok(s) = session() else { return };
    report(
        id,
        "destroy",
        s.conn
            .destroy_window(win)
            .map(|_| ())
            .or_native("DestroyWindow")
            .and_then(|()| s.conn.flush().or_native("flush")),
    );
}

fn configure(id: NativeId, operation: &'static str, aux: &ConfigureWindowAux) {
    let result = session().and_then(|s| {
        s.conn.configure_window(window_of(id), aux).or_native("ConfigureWindow")?;
        s.conn.flush().or_native("flush")
    });
    report(id, operation, result);
}

fn remember_position(id: NativeId, position: Position) {
    PLACEMENTS.with(|p| {
        if let Some(placement) = p.borrow_mut().get_mut(&window_of(id)) {
            placement.position = position;
        }
    });
}

fn apply_bounds(id: NativeId, bounds: SizeBounds) {
    let win = window_of(id);
    PLACEMENTS.with(|p| {
        if let Some(placement) = p.borrow_mut().get_mut(&win) {
            placement.bounds = Some(bounds);
        }
    });
    let result = session().and_then(|s| {
        write_hints(&s, win)?;
        s.conn.flush().or_native("flush")
    });
    report(id, "apply_bounds", result);
}

fn set_title(id: NativeId, title: &str) {
    let win = window_of(id);
    let result = session().and_then(|s| {
        // Legacy WM_NAME for old window managers, _NET_WM_NAME for UTF-8.
        s.conn
            .change_property8(PropMode::REPLACE, win, AtomEnum::WM_NAME, AtomEnum::STRING, title.as_bytes())
            .or_native("ChangeProperty")?;
        s.conn
            .change_property8(
                PropMode::REPLACE,
                win,
                s.atoms.net_wm_name,
                s.atoms.utf8_string,
                title.as_bytes(),
            )
            .or_native("ChangeProperty")?;
        s.conn.flush().or_native("flush")
    });
    report(id, "set_title", result);
}

fn set_visible(id: NativeId, visible: bool) {
    let win = window_of(id);
    let result = session().and_then(|s| {
        if visible {
            s.conn.map_window(win).or_native("MapWindow")?;
        } else {
            s.conn.unmap_window(win).or_native("UnmapWindow")?;
        }
        s.conn.flush().or_native("flush")
    });
    report(id, "set_visible", result);
}

/// `_NET_WM_ICON` payload: width, height, then one ARGB cardinal per pixel.
fn icon_cardinals(icon: &Icon) -> Vec<u32> {
    let size = icon.size();
    let mut data = Vec::with_capacity(2 + icon.pixels().len());
    data.push(size.width);
    data.push(size.height);
    data.extend(icon.pixels().iter().map(|p| p.to_argb()));
    data
}

fn set_icon(id: NativeId, icon: &Icon) -> Result<()> {
    let s = session()?;
    s.conn
        .change_property32(
            PropMode::REPLACE,
            window_of(id),
            s.atoms.net_wm_icon,
            AtomEnum::CARDINAL,
            &icon_cardinals(icon),
        )
        .or_native("ChangeProperty")?;
    s.conn.flush().or_native("flush")
}

// ── Events ────────────────────────────────────────────────────────────────────

fn translate(s: &Session, event: &Event) -> Option<(NativeId, Notification)> {
    match event {
        Event::ConfigureNotify(e) => Some((
            NativeId(e.window as usize),
            Notification::Configured(Size::new(u32::from(e.width), u32::from(e.height))),
        )),
        Event::ClientMessage(e)
            if e.format == 32
                && e.type_ == s.atoms.wm_protocols
                && e.data.as_data32()[0] == s.atoms.wm_delete_window =>
        {
            Some((NativeId(e.window as usize), Notification::CloseRequested))
        }
        Event::DestroyNotify(e) => {
            PLACEMENTS.with(|p| p.borrow_mut().remove(&e.window));
            Some((NativeId(e.window as usize), Notification::Destroyed))
        }
        _ => None,
    }
}

/// Move everything the server has sent into `PENDING`.
fn read_events(s: &Session) {
    loop {
        match s.conn.poll_for_event() {
            Ok(Some(event)) => PENDING.with(|p| p.borrow_mut().push_back(event)),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "X connection error while reading events");
                break;
            }
        }
    }
}

fn pump() {
    // Nothing to pump until the first window opened the display.
    let Some(s) = SESSION.with(|s| s.borrow().clone()) else { return };
    read_events(&s);
    // Dispatch with no borrow held; callbacks issue requests of their own.
    while let Some(event) = PENDING.with(|p| p.borrow_mut().pop_front()) {
        if let Some((id, note)) = translate(&s, &event) {
            dispatch::dispatch(id, note);
        }
    }
}

fn wait(deadline: Instant) {
    let Some(s) = SESSION.with(|s| s.borrow().clone()) else {
        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
        return;
    };
    read_events(&s);
    if PENDING.with(|p| !p.borrow().is_empty()) {
        return;
    }
    // Requests still buffered client-side would never be answered.
    report_flush(&s);
    let mut fds = [libc::pollfd {
        fd: s.conn.stream().as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    }];
    let timeout = poll_timeout(deadline);
    // SAFETY: `fds` is a live one-element array for the duration of the call
    // and the descriptor belongs to the open connection held by `s`.
    let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, timeout) };
    if ready < 0 {
        let e = std::io::Error::last_os_error();
        if e.kind() != std::io::ErrorKind::Interrupted {
            warn!(error = %e, "poll on the X connection failed");
        }
    }
    read_events(&s);
}

/// `poll(2)` timeout for `deadline`, in whole milliseconds, never negative.
fn poll_timeout(deadline: Instant) -> libc::c_int {
    libc::c_int::try_from(millis_until(deadline)).unwrap_or(libc::c_int::MAX)
}

fn report_flush(s: &Session) {
    if let Err(e) = s.conn.flush() {
        warn!(error = %e, "X connection error while flushing requests");
    }
}

// ── Backend ───────────────────────────────────────────────────────────────────

/// The X11 backend.
pub(crate) struct X11;

impl Backend for X11 {
    fn create(spec: &NativeSpec) -> Result<NativeId> {
        create(spec)
    }

    fn destroy(id: NativeId) {
        destroy(id);
    }

    fn set_position(id: NativeId, position: Position) {
        remember_position(id, position);
        configure(id, "set_position", &ConfigureWindowAux::new().x(position.x).y(position.y));
    }

    fn set_size(id: NativeId, size: Size) {
        configure(id, "set_size", &ConfigureWindowAux::new().width(size.width).height(size.height));
    }

    fn set_frame(id: NativeId, position: Position, size: Size) {
        remember_position(id, position);
        let aux = ConfigureWindowAux::new()
            .x(position.x)
            .y(position.y)
            .width(size.width)
            .height(size.height);
        configure(id, "set_frame", &aux);
    }

    fn set_resizable(_id: NativeId, _resizable: bool) {}

    fn apply_bounds(id: NativeId, bounds: SizeBounds) {
        apply_bounds(id, bounds);
    }

    fn set_title(id: NativeId, title: &str) {
        set_title(id, title);
    }

    fn set_visible(id: NativeId, visible: bool) {
        set_visible(id, visible);
    }

    fn set_icon(id: NativeId, icon: &Icon) -> Result<()> {
        set_icon(id, icon)
    }

    fn pump() {
        pump();
    }

    fn wait(deadline: Instant) {
        wait(deadline);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::Rgba;

    #[test]
    fn icon_payload_is_size_then_argb() {
        let icon = Icon::from_rgba(Size::new(2, 1), vec![Rgba::new(1, 2, 3, 4), Rgba::new(5, 6, 7, 8)]).unwrap();
        assert_eq!(icon_cardinals(&icon), [2, 1, 0x0401_0203, 0x0805_0607]);
    }

    #[test]
    fn coordinates_saturate_to_protocol_range() {
        assert_eq!(coord(100_000), i16::MAX);
        assert_eq!(coord(-100_000), i16::MIN);
        assert_eq!(extent(70_000), u16::MAX);
        assert_eq!(extent(640), 640);
    }

    #[test]
    fn poll_timeout_saturates_and_never_goes_negative() {
        assert_eq!(poll_timeout(Instant::now()), 0);
        let far = Instant::now() + Duration::from_secs(60 * 60 * 24 * 365);
        assert_eq!(poll_timeout(far), libc::c_int::MAX);
        let soon = poll_timeout(Instant::now() + Duration::from_millis(20));
        assert!((1..=20).contains(&soon));
    }

    #[test]
    fn wait_without_a_display_returns_at_the_deadline() {
        let started = Instant::now();
        wait(started + Duration::from_millis(15));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(15));
        assert!(waited < Duration::from_secs(1));
    }
}

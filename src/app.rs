// ── Message loop controller ───────────────────────────────────────────────────
//
// Two ways to drive windows, never mixed:
//
//   • caller-driven: call `process_messages()` from your own loop; it drains
//     whatever is queued and returns immediately.
//   • library-driven: `app_begin(frame, interval)` owns the calling thread,
//     pumping notifications and calling `frame` on a fixed wall-clock cadence
//     until `app_end()` is called.
//
// The stop flag is observed once per loop iteration.  `app_end()` only sets
// it, so calling it from inside any callback on the loop thread is fine.
//
// Frame targets advance from the previous target, not from the wake-up time,
// so a slow frame does not push every later tick back.  Ticks that were
// missed entirely are skipped rather than replayed in a burst.

use std::{
    cell::{Cell, RefCell},
    time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{
    dispatch,
    platform::{Backend, Platform},
};

/// Frame interval used when the caller has no preference.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest interval the loop will honour.
const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

/// Longest interval the loop will honour.  Longer requests, up to
/// `Duration::MAX`, mean "tick once a day".
pub const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

thread_local! {
    static STOP: Cell<bool> = const { Cell::new(false) };
    static RUNNING: Cell<bool> = const { Cell::new(false) };
    static SCHEDULE: Cell<Option<Schedule>> = const { Cell::new(None) };
    static FRAME: RefCell<Option<Box<dyn FnMut()>>> = RefCell::new(None);
}

/// Fixed-cadence frame schedule.
#[derive(Debug, Clone, Copy)]
struct Schedule {
    next: Instant,
    interval: Duration,
}

// ── Caller-driven ─────────────────────────────────────────────────────────────

/// Process every pending native notification, then return.  Never blocks.
pub fn process_messages() {
    Platform::pump();
    dispatch::settle(Instant::now());
}

// ── Library-driven ────────────────────────────────────────────────────────────

/// Run the message loop on this thread until `app_end` is called.
///
/// `frame` is called every `interval`, independent of notification traffic.
/// The interval is clamped to `[1 ms, MAX_FRAME_INTERVAL]`.  A nested call
/// while a loop is already running is refused.
pub fn app_begin(frame: impl FnMut() + 'static, interval: Duration) {
    if RUNNING.get() {
        warn!("app_begin called while the loop is already running; ignored");
        return;
    }
    let interval = interval.clamp(MIN_FRAME_INTERVAL, MAX_FRAME_INTERVAL);
    RUNNING.set(true);
    STOP.set(false);
    FRAME.with(|f| *f.borrow_mut() = Some(Box::new(frame)));
    SCHEDULE.set(Some(Schedule {
        next: Instant::now() + interval,
        interval,
    }));
    Platform::frames_started(interval);
    debug!(?interval, "app loop started");

    loop {
        process_messages();
        if STOP.get() {
            break;
        }
        tick_if_due();
        if STOP.get() {
            break;
        }
        Platform::wait(wake_deadline());
    }

    Platform::frames_stopped();
    SCHEDULE.set(None);
    FRAME.with(|f| f.borrow_mut().take());
    RUNNING.set(false);
    debug!("app loop stopped");
}

/// Ask the running loop to return.  Takes effect at the next iteration.
pub fn app_end() {
    STOP.set(true);
}

/// `true` after `app_end` until the next `app_begin`.
#[cfg(test)]
pub(crate) fn stop_requested() -> bool {
    STOP.get()
}

/// Call the frame callback if its target time has passed.
///
/// Also reached from backend timers that keep ticking while the OS runs a
/// modal loop (Win32 size/move).  A tick raised while the frame callback is
/// already running is skipped.
pub(crate) fn tick_if_due() {
    let Some(schedule) = SCHEDULE.get() else { return };
    let now = Instant::now();
    if now < schedule.next {
        return;
    }
    SCHEDULE.set(Some(Schedule {
        next: next_target(schedule.next, schedule.interval, now),
        ..schedule
    }));

    let frame = FRAME.with(|f| f.borrow_mut().take());
    if let Some(mut frame) = frame {
        frame();
        FRAME.with(|f| {
            let mut slot = f.borrow_mut();
            // Cleared by a loop exit in the meantime: leave it cleared.
            if slot.is_none() && RUNNING.get() {
                *slot = Some(frame);
            }
        });
    }
}

/// When the loop should wake next: the frame target or a pending resize
/// settle deadline, whichever comes first.
fn wake_deadline() -> Instant {
    let frame = SCHEDULE
        .get()
        .map_or_else(|| Instant::now() + DEFAULT_FRAME_INTERVAL, |s| s.next);
    match dispatch::next_settle_deadline() {
        Some(settle) => frame.min(settle),
        None => frame,
    }
}

/// Next frame target after `prev`, phase-aligned to `prev`, strictly in the
/// future relative to `now`.
fn next_target(prev: Instant, interval: Duration, now: Instant) -> Instant {
    let next = prev + interval;
    if next > now {
        return next;
    }
    let behind = now.duration_since(prev).as_nanos();
    let missed = behind / interval.as_nanos();
    let steps = u32::try_from(missed + 1).unwrap_or(u32::MAX);
    prev.checked_add(interval.saturating_mul(steps)).unwrap_or(now + interval)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{config::WindowConfig, platform::headless, types::NativeId, window::create};

    #[test]
    fn next_target_advances_from_previous_target() {
        let t0 = Instant::now();
        let step = Duration::from_millis(100);
        // Woke late by 30 ms: next target is still t0 + 200 ms.
        assert_eq!(next_target(t0 + step, step, t0 + step + Duration::from_millis(30)), t0 + step * 2);
    }

    #[test]
    fn next_target_skips_missed_ticks_but_keeps_phase() {
        let t0 = Instant::now();
        let step = Duration::from_millis(100);
        // Callback overran by 3.5 intervals.
        let next = next_target(t0, step, t0 + Duration::from_millis(350));
        assert_eq!(next, t0 + Duration::from_millis(400));
    }

    #[test]
    fn next_target_on_exact_boundary_moves_forward() {
        let t0 = Instant::now();
        let step = Duration::from_millis(10);
        assert_eq!(next_target(t0, step, t0 + step), t0 + step * 2);
    }

    #[test]
    fn next_target_with_a_huge_gap_stays_in_the_future() {
        let t0 = Instant::now();
        let now = t0 + MAX_FRAME_INTERVAL * 3;
        assert!(next_target(t0, MIN_FRAME_INTERVAL, now) > now);
    }

    #[test]
    fn maximum_interval_runs_without_ticking() {
        let w = create(WindowConfig::default().on_closed(app_end)).unwrap();
        headless::user_close(w.native_handle().unwrap());
        let frames = Rc::new(Cell::new(0u32));
        let f = Rc::clone(&frames);
        app_begin(move || f.set(f.get() + 1), Duration::MAX);
        assert_eq!(frames.get(), 0);
        assert!(!w.is_alive());
        assert!(!RUNNING.get());
    }

    #[test]
    fn process_messages_returns_with_nothing_queued() {
        let started = Instant::now();
        process_messages();
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn end_on_third_frame_stops_before_a_fifth() {
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        app_begin(
            move || {
                c.set(c.get() + 1);
                if c.get() == 3 {
                    app_end();
                }
            },
            Duration::from_millis(5),
        );
        assert!(count.get() >= 3);
        assert!(count.get() < 5);
        assert!(!RUNNING.get());
    }

    #[test]
    fn frames_keep_a_steady_cadence() {
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let t = Rc::clone(&ticks);
        let started = Instant::now();
        app_begin(
            move || {
                t.borrow_mut().push(Instant::now());
                if t.borrow().len() == 4 {
                    app_end();
                }
            },
            Duration::from_millis(10),
        );
        let ticks = ticks.borrow();
        assert_eq!(ticks.len(), 4);
        // Four ticks cannot land before the fourth target.
        assert!(ticks[3].duration_since(started) >= Duration::from_millis(40));
    }

    #[test]
    fn close_callback_can_end_the_loop() {
        let w = create(WindowConfig::default().on_closed(app_end)).unwrap();
        let id = NativeId(w.native_handle().unwrap().as_raw());
        let frames = Rc::new(Cell::new(0u32));
        let f = Rc::clone(&frames);
        app_begin(
            move || {
                f.set(f.get() + 1);
                if f.get() == 2 {
                    headless::user_close(id);
                }
                // Safety net so a regression cannot hang the test run.
                if f.get() > 50 {
                    app_end();
                }
            },
            Duration::from_millis(2),
        );
        assert_eq!(frames.get(), 2);
        assert!(!w.is_alive());
    }

    #[test]
    fn nested_begin_is_refused() {
        let inner_ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&inner_ran);
        app_begin(
            move || {
                let flag = Rc::clone(&flag);
                app_begin(move || flag.set(true), Duration::from_millis(1));
                app_end();
            },
            Duration::from_millis(1),
        );
        assert!(!inner_ran.get());
    }

    #[test]
    fn loop_can_run_again_after_ending() {
        for _ in 0..2 {
            let count = Rc::new(Cell::new(0u32));
            let c = Rc::clone(&count);
            app_begin(
                move || {
                    c.set(c.get() + 1);
                    app_end();
                },
                Duration::from_millis(1),
            );
            assert_eq!(count.get(), 1);
        }
    }

    #[test]
    fn zero_interval_is_raised_to_minimum() {
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        app_begin(
            move || {
                c.set(c.get() + 1);
                if c.get() == 3 {
                    app_end();
                }
            },
            Duration::ZERO,
        );
        assert_eq!(count.get(), 3);
    }
}

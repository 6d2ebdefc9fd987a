// ── casement-demo ────────────────────────────────────────────────────────────
//
//   cargo run --features demo -- [settings.json]
//
// Opens one window (from the JSON settings file if given), runs the app loop
// and exits when the window is closed.  Set RUST_LOG=casement=debug to watch
// the lifecycle.
#![deny(unsafe_code)]

use std::{cell::Cell, process::ExitCode, rc::Rc};

use casement::{Icon, Rgba, Size, WindowConfig, WindowSettings, DEFAULT_FRAME_INTERVAL};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> casement::Result<()> {
    let settings = match std::env::args_os().nth(1) {
        Some(path) => WindowSettings::load(path)?,
        None => WindowSettings {
            title: "casement".into(),
            size: Size::new(800, 600),
            resizable: true,
            visible: true,
            ..WindowSettings::default()
        },
    };

    let config = WindowConfig::from(settings)
        .icon(checkerboard(32)?)
        .on_resizing(|size| info!(width = size.width, height = size.height, "resizing"))
        .on_resized(|size| info!(width = size.width, height = size.height, "resized"))
        .on_closed(|| {
            info!("close requested");
            casement::app_end();
        });
    let window = casement::create(config)?;
    info!(handle = ?window.native_handle(), "window open");

    let frames = Rc::new(Cell::new(0u64));
    let counter = Rc::clone(&frames);
    casement::app_begin(move || counter.set(counter.get() + 1), DEFAULT_FRAME_INTERVAL);

    info!(frames = frames.get(), "app loop finished");
    Ok(())
}

/// Two-tone square icon.
fn checkerboard(side: u32) -> casement::Result<Icon> {
    let cell = (side / 4).max(1);
    let pixels = (0..side * side)
        .map(|i| {
            let (x, y) = (i % side, i / side);
            if (x / cell + y / cell) % 2 == 0 {
                Rgba::new(0x2f, 0x6f, 0xeb, 0xff)
            } else {
                Rgba::new(0xf5, 0xf5, 0xf5, 0xff)
            }
        })
        .collect();
    Icon::from_rgba(Size::new(side, side), pixels)
}

// ── Window configuration ──────────────────────────────────────────────────────
//
// `WindowConfig` is what `create` consumes: a builder over every property a
// window starts with, callbacks included.  `WindowSettings` is the plain-data
// part of it that can live in a JSON file; missing fields fall back to the
// same defaults as the builder.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    callback::{OnClosed, OnResized, OnResizing},
    error::Result,
    types::{Icon, NativeHandle, Position, Size},
};

// ── Builder ───────────────────────────────────────────────────────────────────

/// Everything needed to create a window.
///
/// ```no_run
/// use casement::{Size, WindowConfig};
///
/// let window = casement::create(
///     WindowConfig::default()
///         .title("Scratch")
///         .size(Size::new(800, 600))
///         .resizable(true)
///         .visible(true)
///         .on_closed(casement::app_end),
/// )?;
/// # Ok::<(), casement::Error>(())
/// ```
#[derive(Default)]
pub struct WindowConfig {
    pub(crate) parent: Option<NativeHandle>,
    pub(crate) position: Position,
    pub(crate) size: Size,
    pub(crate) resizable: bool,
    pub(crate) title: String,
    pub(crate) icon: Option<Icon>,
    pub(crate) visible: bool,
    pub(crate) on_closed: Option<OnClosed>,
    pub(crate) on_resized: Option<OnResized>,
    pub(crate) on_resizing: Option<OnResizing>,
}

impl WindowConfig {
    /// Native owner window.  Backends without owned windows ignore it.
    pub fn parent(mut self, parent: NativeHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Initial client size; clamped into `[MIN_SIZE, MAX_SIZE]` by `create`.
    pub fn size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    pub fn resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn icon(mut self, icon: Icon) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn on_closed(mut self, callback: impl FnMut() + 'static) -> Self {
        self.on_closed = Some(Box::new(callback));
        self
    }

    pub fn on_resized(mut self, callback: impl FnMut(Size) + 'static) -> Self {
        self.on_resized = Some(Box::new(callback));
        self
    }

    pub fn on_resizing(mut self, callback: impl FnMut(Size) + 'static) -> Self {
        self.on_resizing = Some(Box::new(callback));
        self
    }
}

impl std::fmt::Debug for WindowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowConfig")
            .field("parent", &self.parent)
            .field("position", &self.position)
            .field("size", &self.size)
            .field("resizable", &self.resizable)
            .field("title", &self.title)
            .field("icon", &self.icon.as_ref().map(Icon::size))
            .field("visible", &self.visible)
            .field("on_closed", &self.on_closed.is_some())
            .field("on_resized", &self.on_resized.is_some())
            .field("on_resizing", &self.on_resizing.is_some())
            .finish()
    }
}

// ── Settings file ─────────────────────────────────────────────────────────────

/// Serializable window settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub position: Position,
    pub size: Size,
    pub resizable: bool,
    pub title: String,
    pub visible: bool,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            position: Position::default(),
            size: Size::default(),
            resizable: false,
            title: String::new(),
            visible: false,
        }
    }
}

impl WindowSettings {
    /// Parse settings from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl From<WindowSettings> for WindowConfig {
    fn from(s: WindowSettings) -> Self {
        Self::default()
            .position(s.position)
            .size(s.size)
            .resizable(s.resizable)
            .title(s.title)
            .visible(s.visible)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn builder_defaults() {
        let c = WindowConfig::default();
        assert!(c.parent.is_none());
        assert_eq!(c.position, Position::new(0, 0));
        assert_eq!(c.size, Size::new(640, 480));
        assert!(!c.resizable);
        assert!(c.title.is_empty());
        assert!(c.icon.is_none());
        assert!(!c.visible);
        assert!(c.on_closed.is_none() && c.on_resized.is_none() && c.on_resizing.is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let c = WindowConfig::default()
            .parent(NativeHandle::from_raw(0x10))
            .position(Position::new(-5, 7))
            .title("t")
            .on_resized(|_| {});
        assert_eq!(c.parent, Some(NativeHandle::from_raw(0x10)));
        assert_eq!(c.position, Position::new(-5, 7));
        assert_eq!(c.title, "t");
        assert!(c.on_resized.is_some());
    }

    #[test]
    fn settings_roundtrip() {
        let s = WindowSettings {
            position: Position::new(100, 50),
            size: Size::new(1024, 768),
            resizable: true,
            title: "Editor".into(),
            visible: true,
        };
        let json = s.to_json().expect("serialize");
        assert_eq!(WindowSettings::from_json(&json).expect("deserialize"), s);
    }

    /// Fields missing from the file fall back to the builder defaults.
    #[test]
    fn missing_fields_use_defaults() {
        let s = WindowSettings::from_json(r#"{"title":"only a title"}"#).unwrap();
        assert_eq!(s.title, "only a title");
        assert_eq!(s.size, Size::default());
        assert!(!s.resizable);
        assert!(!s.visible);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = WindowSettings::from_json("{ size: ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = WindowSettings::load("/definitely/not/here/settings.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn load_reads_file() {
        let path = std::env::temp_dir().join(format!("casement-settings-{}.json", std::process::id()));
        fs::write(&path, r#"{"size":{"width":300,"height":200},"resizable":true}"#).unwrap();
        let s = WindowSettings::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(s.size, Size::new(300, 200));
        assert!(s.resizable);
    }

    #[test]
    fn settings_convert_into_config() {
        let c = WindowConfig::from(WindowSettings {
            title: "x".into(),
            visible: true,
            ..WindowSettings::default()
        });
        assert_eq!(c.title, "x");
        assert!(c.visible);
        assert_eq!(c.size, Size::default());
    }
}

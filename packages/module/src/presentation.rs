//! Presentation modules.
//!
//! Presentation is where applications get their windows. Rendering is not
//! done here; a presentation only hands out opaque [`WindowId`]s and keeps
//! track of which application owns which window.
//!
//! Modes are picked by name from a [`PresentationModes`] table built at
//! compile time. The only built-in mode is [`HEADLESS_MODE`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use jump_messaging::IsolateId;
use serde::{Deserialize, Serialize};

use crate::config::ModuleConfig;
use crate::error::{ModuleError, Result};
use crate::factory::ModuleFactory;
use crate::module::{Module, ModuleKey, ModuleKind};

/// Name of the built-in mode.
pub const HEADLESS_MODE: &str = "headless";

/// Configuration key naming the default presentation mode.
pub const MODE_PROPERTY: &str = "presentation.mode";

/// Opaque window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(u64);

impl WindowId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// The application a window belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppHandle {
    pub isolate: IsolateId,
    pub app_id: u32,
}

/// A presentation mode implementation.
pub trait Presentation: Send + Sync {
    /// The mode name this presentation was created for.
    fn mode(&self) -> &str;

    /// Allocate a window for `app`.
    fn open_window(&self, app: AppHandle) -> WindowId;

    /// Release every window owned by `app`. Returns how many were released.
    fn close_windows(&self, app: AppHandle) -> usize;

    /// The windows currently owned by `app`.
    fn app_windows(&self, app: AppHandle) -> Vec<WindowId>;

    /// Give `window` the focus. Returns `false` for an unknown window.
    fn focus(&self, window: WindowId) -> bool;

    fn focused(&self) -> Option<WindowId>;
}

/// Builds a presentation for a mode.
pub type PresentationConstructor = fn(&str, &ModuleConfig) -> Result<Box<dyn Presentation>>;

/// Compile-time table of presentation modes.
#[derive(Clone)]
pub struct PresentationModes {
    modes: BTreeMap<String, PresentationConstructor>,
}

impl PresentationModes {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            modes: BTreeMap::new(),
        }
    }

    /// The table with the built-in modes.
    pub fn builtin() -> Self {
        let mut modes = Self::empty();
        modes.register(HEADLESS_MODE, HeadlessPresentation::construct);
        modes
    }

    pub fn register(&mut self, name: impl Into<String>, constructor: PresentationConstructor) {
        self.modes.insert(name.into(), constructor);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modes.keys().map(String::as_str)
    }

    /// Build the presentation for `name`.
    pub fn create(&self, name: &str, config: &ModuleConfig) -> Result<Box<dyn Presentation>> {
        let constructor = self
            .modes
            .get(name)
            .ok_or_else(|| ModuleError::UnknownMode(name.to_string()))?;
        constructor(name, config)
    }
}

impl Default for PresentationModes {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Presentation that tracks windows without drawing anything.
pub struct HeadlessPresentation {
    mode: String,
    next_window: AtomicU64,
    state: Mutex<HeadlessState>,
}

#[derive(Default)]
struct HeadlessState {
    windows: BTreeMap<WindowId, AppHandle>,
    focused: Option<WindowId>,
}

impl HeadlessPresentation {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            next_window: AtomicU64::new(1),
            state: Mutex::new(HeadlessState::default()),
        }
    }

    fn construct(name: &str, _config: &ModuleConfig) -> Result<Box<dyn Presentation>> {
        Ok(Box::new(Self::new(name)))
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Presentation for HeadlessPresentation {
    fn mode(&self) -> &str {
        &self.mode
    }

    fn open_window(&self, app: AppHandle) -> WindowId {
        let window = WindowId(self.next_window.fetch_add(1, Ordering::Relaxed));
        self.state().windows.insert(window, app);
        window
    }

    fn close_windows(&self, app: AppHandle) -> usize {
        let mut state = self.state();
        let before = state.windows.len();
        state.windows.retain(|_, owner| *owner != app);
        if let Some(focused) = state.focused {
            if !state.windows.contains_key(&focused) {
                state.focused = None;
            }
        }
        before - state.windows.len()
    }

    fn app_windows(&self, app: AppHandle) -> Vec<WindowId> {
        self.state()
            .windows
            .iter()
            .filter(|(_, owner)| **owner == app)
            .map(|(window, _)| *window)
            .collect()
    }

    fn focus(&self, window: WindowId) -> bool {
        let mut state = self.state();
        if state.windows.contains_key(&window) {
            state.focused = Some(window);
            true
        } else {
            false
        }
    }

    fn focused(&self) -> Option<WindowId> {
        self.state().focused
    }
}

/// Module wrapping the presentation for one mode.
pub struct PresentationModule {
    presentation: Box<dyn Presentation>,
    loaded: AtomicBool,
}

impl PresentationModule {
    pub fn new(presentation: Box<dyn Presentation>) -> Self {
        Self {
            presentation,
            loaded: AtomicBool::new(false),
        }
    }

    pub fn presentation(&self) -> &dyn Presentation {
        self.presentation.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

impl Module for PresentationModule {
    fn load(&self, _config: &ModuleConfig) -> Result<()> {
        self.loaded.store(true, Ordering::Release);
        tracing::debug!(mode = self.presentation.mode(), "presentation loaded");
        Ok(())
    }

    fn unload(&self) {
        self.loaded.store(false, Ordering::Release);
    }
}

/// Build the presentation factory over `modes`.
///
/// Modules are keyed by [`ModuleKey::Mode`]; [`ModuleKey::Default`] resolves
/// to the mode named by [`MODE_PROPERTY`], or [`HEADLESS_MODE`].
pub fn presentation_factory(
    modes: PresentationModes,
    config: ModuleConfig,
) -> ModuleFactory<PresentationModule> {
    ModuleFactory::new(ModuleKind::Presentation, config, move |key, config| {
        let name = match key {
            ModuleKey::Mode(name) => name.as_str(),
            _ => config.get_or(MODE_PROPERTY, HEADLESS_MODE),
        };
        Ok(PresentationModule::new(modes.create(name, config)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(isolate: u32, app_id: u32) -> AppHandle {
        AppHandle {
            isolate: IsolateId::new(isolate),
            app_id,
        }
    }

    #[test]
    fn unknown_mode_is_rejected_by_name() {
        let factory = presentation_factory(PresentationModes::builtin(), ModuleConfig::new());
        let err = factory
            .get_module(&ModuleKey::mode("holographic"))
            .err()
            .unwrap();
        match err {
            ModuleError::UnknownMode(name) => assert_eq!(name, "holographic"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_key_uses_configured_mode() {
        let factory = presentation_factory(
            PresentationModes::builtin(),
            ModuleConfig::new().with(MODE_PROPERTY, HEADLESS_MODE),
        );
        let module = factory.get_default().unwrap();
        assert_eq!(module.presentation().mode(), HEADLESS_MODE);
        assert!(module.is_loaded());
    }

    #[test]
    fn windows_are_tracked_per_app() {
        let p = HeadlessPresentation::new(HEADLESS_MODE);
        let a = p.open_window(app(1, 1));
        let b = p.open_window(app(1, 1));
        let c = p.open_window(app(2, 1));

        assert_eq!(p.app_windows(app(1, 1)), vec![a, b]);
        assert_eq!(p.app_windows(app(2, 1)), vec![c]);

        assert!(p.focus(b));
        assert_eq!(p.close_windows(app(1, 1)), 2);
        assert!(p.app_windows(app(1, 1)).is_empty());
        assert_eq!(p.focused(), None);
        assert!(!p.focus(a));
    }

    #[test]
    fn custom_modes_can_be_registered() {
        fn quiet(name: &str, _: &ModuleConfig) -> Result<Box<dyn Presentation>> {
            Ok(Box::new(HeadlessPresentation::new(format!("{name}-quiet"))))
        }

        let mut modes = PresentationModes::builtin();
        modes.register("quiet", quiet);
        assert_eq!(modes.names().collect::<Vec<_>>(), vec!["headless", "quiet"]);

        let p = modes.create("quiet", &ModuleConfig::new()).unwrap();
        assert_eq!(p.mode(), "quiet-quiet");
    }
}

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

pub const DEFAULT_RENDER_BASE_URL: &str = "https://kroki.io";
pub const DEFAULT_GENERATION_ENDPOINT: &str = "/api/nl-draw";
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// User settings shared by rendering and generation.
///
/// The editor persists these elsewhere; this crate only reads them. Field names follow the
/// camelCase keys of the persisted JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub render_base_url: String,
    /// Render every type remotely, even when a local renderer exists.
    pub force_remote: bool,
    /// Re-render on every edit (debounced).
    pub auto_render: bool,
    /// Natural-language drawing mode. While on, edits to the diagram text do not auto-render.
    pub nl_drawing_enabled: bool,
    pub api_key: String,
    pub generation_endpoint: String,
    /// Location of the prompt template document. `None` uses the built-in template.
    pub prompt_templates_url: Option<String>,
    pub debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            render_base_url: DEFAULT_RENDER_BASE_URL.to_string(),
            force_remote: false,
            auto_render: true,
            nl_drawing_enabled: true,
            api_key: String::new(),
            generation_endpoint: DEFAULT_GENERATION_ENDPOINT.to_string(),
            prompt_templates_url: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| Error::Settings {
            message: err.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| Error::Settings {
            message: format!("{}: {err}", path.display()),
        })?;
        Self::from_json_str(&text)
    }

    /// Whether an edit to the diagram text should schedule a render.
    pub fn renders_on_edit(&self) -> bool {
        self.auto_render && !self.nl_drawing_enabled
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

pub type SettingsListener = Box<dyn Fn(&Settings) + Send + Sync>;

/// Identifies a listener registered with [`SettingsStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Shared settings with a single mutation entry point.
///
/// Components hold an `Arc<SettingsStore>` and read a snapshot per operation; every
/// [`SettingsStore::update`] notifies subscribers with the new value.
#[derive(Default)]
pub struct SettingsStore {
    current: RwLock<Settings>,
    listeners: Mutex<Vec<(SubscriptionId, SettingsListener)>>,
    next_id: Mutex<u64>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("current", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(settings),
            ..Default::default()
        }
    }

    pub fn shared(settings: Settings) -> Arc<Self> {
        Arc::new(Self::new(settings))
    }

    pub fn snapshot(&self) -> Settings {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Applies `f` and notifies subscribers if anything changed.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let updated = {
            let mut guard = match self.current.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let before = guard.clone();
            f(&mut *guard);
            if *guard == before {
                return;
            }
            guard.clone()
        };

        tracing::debug!(
            force_remote = updated.force_remote,
            auto_render = updated.auto_render,
            nl_drawing_enabled = updated.nl_drawing_enabled,
            "settings updated"
        );

        let listeners = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, listener) in listeners.iter() {
            listener(&updated);
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&Settings) + Send + Sync + 'static) -> SubscriptionId {
        let id = {
            let mut next = match self.next_id.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *next += 1;
            SubscriptionId(*next)
        };
        let mut listeners = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut listeners = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.retain(|(existing, _)| *existing != id);
    }
}

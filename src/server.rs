//! Networked side: shared application state, routes and the per-connection
//! gesture loop.

pub mod admission;
pub mod connection;
pub mod dispatch;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod runtime;

use log::info;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::actions::KeySink;
use crate::classifier::GestureClassifier;
use crate::config::Profile;
use crate::deck::Presenter;
use crate::provider::LandmarkProvider;
use registry::Registry;

/// A profile and the classifier built from it. Swapped whole on reload.
pub struct Engine {
    pub profile: Profile,
    pub classifier: GestureClassifier,
    pub generation: u64,
}

impl Engine {
    pub fn build(profile: Profile, generation: u64) -> Self {
        let classifier = GestureClassifier::from_profile(&profile);
        Self {
            profile,
            classifier,
            generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brush {
    pub color: String,
    pub size: u32,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: "#00FF00".to_string(),
            size: 5,
        }
    }
}

pub struct AppState {
    engine: RwLock<Arc<Engine>>,
    pub provider: Arc<dyn LandmarkProvider>,
    pub presenter: Mutex<Presenter>,
    pub registry: Arc<Registry>,
    pub brush: Mutex<Brush>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        profile: Profile,
        provider: Arc<dyn LandmarkProvider>,
        presenter: Presenter,
    ) -> SharedState {
        Arc::new(Self {
            engine: RwLock::new(Arc::new(Engine::build(profile, 0))),
            provider,
            presenter: Mutex::new(presenter),
            registry: Registry::new(),
            brush: Mutex::new(Brush::default()),
        })
    }

    /// Current engine; connections re-read this between frames.
    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine.read())
    }

    /// Installs a freshly loaded profile for all new frames.
    pub fn install_profile(&self, profile: Profile) {
        self.install_profile_with(profile, KeySink::open);
    }

    /// As [`AppState::install_profile`]; `open_sink` builds the key sink when
    /// `[controller] keys` changed.
    pub fn install_profile_with(&self, profile: Profile, open_sink: impl FnOnce(bool) -> KeySink) {
        let keys = profile.controller.keys;
        {
            let mut presenter = self.presenter.lock();
            presenter.set_bindings(profile.bindings.clone());
            if self.engine().profile.controller.keys != keys {
                info!("key output {} by profile", if keys { "requested" } else { "turned off" });
                presenter.replace_sink(open_sink(keys));
            }
        }
        let mut slot = self.engine.write();
        let generation = slot.generation + 1;
        let name = profile.meta.name.clone().unwrap_or_default();
        *slot = Arc::new(Engine::build(profile, generation));
        info!("profile '{name}' active (generation {generation})");
    }
}

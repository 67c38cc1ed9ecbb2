// Plugin system: capability types, the backend/frontend contracts, the registry and
// the plugins that ship with the crate
pub mod backend;
pub mod backends;
pub mod frontend;
pub mod frontends;
pub mod registry;

use bitflags::bitflags;
use std::sync::Arc;

pub use backend::{
    BackendCapabilities, BackendContext, BackendEvent, BackendEventSink, NotificationBackend,
};
pub use frontend::NotificationFrontend;
pub use registry::{PluginDescriptor, PluginRegistry};

bitflags! {
    /// Capability types a plugin can have.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PluginTypes: u32 {
        /// Can be selected as the primary backend.
        const BACKEND = 1;
        /// Receives a copy of every notification when enabled.
        const SECONDARY_BACKEND = 1 << 1;
        const FRONTEND = 1 << 2;
        /// Settings forms live in the GUI layer; the type is kept so GUIs can filter by it.
        const SETTINGS_WIDGET = 1 << 3;
        const ALL = Self::BACKEND.bits()
            | Self::SECONDARY_BACKEND.bits()
            | Self::FRONTEND.bits()
            | Self::SETTINGS_WIDGET.bits();
    }
}

/// A loaded plugin instance.
#[derive(Clone)]
pub enum Plugin {
    Backend(Arc<dyn NotificationBackend>),
    Frontend(Arc<dyn NotificationFrontend>),
}

impl Plugin {
    pub fn as_backend(&self) -> Option<&Arc<dyn NotificationBackend>> {
        match self {
            Self::Backend(backend) => Some(backend),
            Self::Frontend(_) => None,
        }
    }

    pub fn default_settings(&self) -> Vec<(&'static str, crate::settings::SettingsValue)> {
        match self {
            Self::Backend(backend) => backend.default_settings(),
            Self::Frontend(frontend) => frontend.default_settings(),
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend(_) => f.write_str("Plugin::Backend"),
            Self::Frontend(_) => f.write_str("Plugin::Frontend"),
        }
    }
}

use crate::core::NotificationCore;
use crate::settings::SettingsValue;
use async_trait::async_trait;

/// A plugin that accepts notifications from outside the process (a socket, a bus)
/// and feeds them into the core.
///
/// Frontends hold a core handle for as long as they run and learn about closes and
/// actions by subscribing to it.
#[async_trait]
pub trait NotificationFrontend: Send + Sync {
    fn default_settings(&self) -> Vec<(&'static str, SettingsValue)> {
        vec![]
    }

    /// Start serving. `name` is the plugin's settings namespace.
    async fn start(&self, name: &str, core: NotificationCore) -> anyhow::Result<()>;

    async fn stop(&self);
}

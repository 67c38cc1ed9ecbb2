// Chime: applications register with a notification core, broadcast notifications
// and the core hands them to the selected backend plugin.
pub mod application;
pub mod core;
pub mod error;
pub mod icon;
pub mod logging;
pub mod notification;
pub mod plugins;
pub mod settings;

pub use application::Application;
pub use crate::core::NotificationCore;
pub use error::{BackendError, CoreError, IconError, SettingsError};
pub use icon::{Icon, IconCache};
pub use notification::{Action, CloseReason, CoreEvent, Notification, Priority};
pub use plugins::{PluginRegistry, PluginTypes};
pub use settings::{SettingsScope, SettingsStore, SettingsValue};

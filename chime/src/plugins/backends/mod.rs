//! Backends that ship with the crate.

#[cfg(feature = "desktop")]
pub mod desktop;
pub mod logger;
pub mod toast;

#[cfg(feature = "desktop")]
pub use desktop::DesktopBackend;
pub use logger::LoggerBackend;
pub use toast::{ToastBackend, VisibleToast};

use super::{Plugin, PluginDescriptor, PluginTypes};
use std::sync::Arc;

pub(crate) fn builtin() -> Vec<PluginDescriptor> {
    #[allow(unused_mut)]
    let mut descriptors = vec![
        PluginDescriptor::new(toast::NAME, PluginTypes::BACKEND, || {
            Plugin::Backend(Arc::new(ToastBackend::new()))
        }),
        PluginDescriptor::new(
            logger::NAME,
            PluginTypes::BACKEND | PluginTypes::SECONDARY_BACKEND,
            || Plugin::Backend(Arc::new(LoggerBackend::new())),
        ),
    ];

    #[cfg(feature = "desktop")]
    descriptors.push(PluginDescriptor::new(desktop::NAME, PluginTypes::BACKEND, || {
        Plugin::Backend(Arc::new(DesktopBackend::new()))
    }));

    descriptors
}

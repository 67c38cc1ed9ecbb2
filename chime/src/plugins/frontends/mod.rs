//! Frontends that ship with the crate.

pub mod socket;

pub use socket::SocketFrontend;

use super::{Plugin, PluginDescriptor, PluginTypes};
use std::sync::Arc;

pub(crate) fn builtin() -> Vec<PluginDescriptor> {
    vec![PluginDescriptor::new(socket::NAME, PluginTypes::FRONTEND, || {
        Plugin::Frontend(Arc::new(SocketFrontend::new()))
    })]
}

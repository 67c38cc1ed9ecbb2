// core.rs
//
// The notification core: application registry, primary backend selection and the
// dispatch loop that delivers notifications and turns backend reports into events.

use crate::application::Application;
use crate::error::{BackendError, CoreError};
use crate::icon::{Icon, IconCache};
use crate::notification::{Action, CloseReason, CoreEvent, Notification};
use crate::notification::events::Subscribers;
use crate::plugins::backend::TaggedBackendEvent;
use crate::plugins::{
    BackendCapabilities, BackendContext, BackendEvent, BackendEventSink, NotificationBackend,
    NotificationFrontend, Plugin, PluginRegistry, PluginTypes,
};
use crate::settings::{keys, SettingsScope, SettingsStore, SettingsValue};
use log::{debug, error as log_error, info as log_info, warn as log_warn};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Closed notifications kept for `closed_notification_by_id`.
pub const HISTORY_LIMIT: usize = 128;

pub const DEFAULT_PRIMARY_BACKEND: &str = "Toast";
pub const DEFAULT_TIMEOUT_SECS: i64 = 10;
pub const DEFAULT_APPLICATION_NAME: &str = "Chime";

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone)]
struct PrimaryBackend {
    name: String,
    backend: Arc<dyn NotificationBackend>,
    capabilities: BackendCapabilities,
}

enum Job {
    Deliver(Notification),
    Close(Notification, CloseReason),
}

struct CoreInner {
    settings: SettingsStore,
    plugins: PluginRegistry,
    icons: IconCache,
    applications: RwLock<HashMap<String, Application>>,
    default_application: RwLock<Application>,
    primary: tokio::sync::RwLock<Option<PrimaryBackend>>,
    /// Serializes backend switches, including automatic fallback.
    switch_lock: tokio::sync::Mutex<()>,
    secondaries: tokio::sync::RwLock<Vec<(String, Arc<dyn NotificationBackend>)>>,
    frontends: tokio::sync::Mutex<Vec<(String, Arc<dyn NotificationFrontend>)>>,
    active: Mutex<HashMap<u32, Notification>>,
    /// Backend each active notification was handed to.
    delivered_by: Mutex<HashMap<u32, String>>,
    history: Mutex<VecDeque<Notification>>,
    next_id: AtomicU32,
    subscribers: Subscribers,
    jobs: mpsc::UnboundedSender<Job>,
    backend_events: mpsc::UnboundedSender<TaggedBackendEvent>,
    cancel: CancellationToken,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a notification core. Clones share the same core.
///
/// Must be created inside a tokio runtime: construction spawns the dispatch loop.
/// Call [`initialize`](Self::initialize) to load plugins and pick a backend, and
/// [`shutdown`](Self::shutdown) before dropping the last handle.
#[derive(Clone)]
pub struct NotificationCore {
    inner: Arc<CoreInner>,
}

impl NotificationCore {
    pub fn new(settings: SettingsStore, plugins: PluginRegistry, icons: IconCache) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        settings.set_default_value(keys::PRIMARY_BACKEND, DEFAULT_PRIMARY_BACKEND, &SettingsScope::Global);
        settings.set_default_value(keys::TIMEOUT, DEFAULT_TIMEOUT_SECS, &SettingsScope::Global);

        let inner = Arc::new(CoreInner {
            settings,
            plugins,
            icons,
            applications: RwLock::new(HashMap::new()),
            default_application: RwLock::new(Application::new(
                DEFAULT_APPLICATION_NAME,
                Icon::default_icon(),
            )),
            primary: tokio::sync::RwLock::new(None),
            switch_lock: tokio::sync::Mutex::new(()),
            secondaries: tokio::sync::RwLock::new(vec![]),
            frontends: tokio::sync::Mutex::new(vec![]),
            active: Mutex::new(HashMap::new()),
            delivered_by: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
            next_id: AtomicU32::new(1),
            subscribers: Subscribers::default(),
            jobs: jobs_tx,
            backend_events: events_tx,
            cancel: cancel.clone(),
            dispatch_task: Mutex::new(None),
        });

        let task = tokio::spawn(dispatch_loop(Arc::downgrade(&inner), jobs_rx, events_rx, cancel));
        *inner.dispatch_task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        Self { inner }
    }

    /// Load every plugin, start frontends and select the primary backend from
    /// settings, falling back to any other backend that initializes. A fallback is
    /// not saved, so the preferred backend is tried again on the next start.
    pub async fn initialize(&self) -> Result<(), CoreError> {
        self.load_plugins(PluginTypes::ALL).await;

        let preferred = self
            .settings_value(keys::PRIMARY_BACKEND, &SettingsScope::Global)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_PRIMARY_BACKEND.to_string());

        let _guard = self.inner.switch_lock.lock().await;
        match self.switch_to(&preferred, false).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log_warn!("Preferred backend {} not usable: {}", preferred, e);
                self.activate_first_usable(&[preferred.as_str()]).await
            }
        }
    }

    /// Stop frontends, release every backend and persist settings. The dispatch loop
    /// ends; later broadcasts fail with [`CoreError::ShutDown`].
    pub async fn shutdown(&self) {
        log_info!("Shutting down notification core");

        let frontends = std::mem::take(&mut *self.inner.frontends.lock().await);
        for (name, frontend) in frontends {
            debug!("Stopping frontend {}", name);
            frontend.stop().await;
        }

        {
            let _guard = self.inner.switch_lock.lock().await;
            let primary = self.inner.primary.write().await.take();
            let secondaries = std::mem::take(&mut *self.inner.secondaries.write().await);
            if let Some(primary) = &primary {
                for application in self.applications() {
                    primary.backend.deregister_application(&application).await;
                }
                primary.backend.deinitialize().await;
            }
            for (name, backend) in secondaries {
                if primary.as_ref().map(|p| p.name == name) != Some(true) {
                    backend.deinitialize().await;
                }
            }
        }

        if let Err(e) = self.inner.settings.flush().await {
            log_error!("Failed to save settings: {}", e);
        }

        self.inner.cancel.cancel();
        let task = self
            .inner
            .dispatch_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    // ========================================================================
    // PLUGINS
    // ========================================================================

    /// Instantiate registered plugins of `types`, declare their default settings,
    /// start enabled frontends and initialize enabled secondary backends.
    pub async fn load_plugins(&self, types: PluginTypes) {
        for (name, plugin) in self.inner.plugins.load(types) {
            let scope = SettingsScope::plugin(name.clone());
            for (key, value) in plugin.default_settings() {
                self.inner.settings.set_default_value(key, value, &scope);
            }
            let plugin_types = self.inner.plugins.types_of(&name).unwrap_or(PluginTypes::empty());

            match plugin {
                Plugin::Frontend(frontend) => {
                    self.inner.settings.set_default_value(keys::ENABLED, true, &scope);
                    if !self.is_enabled(&scope) {
                        log_info!("Frontend {} is disabled", name);
                        continue;
                    }
                    match frontend.start(&name, self.clone()).await {
                        Ok(()) => {
                            log_info!("Started frontend {}", name);
                            self.inner.frontends.lock().await.push((name, frontend));
                        }
                        Err(e) => log_error!("Failed to start frontend {}: {:#}", name, e),
                    }
                }
                Plugin::Backend(backend) if plugin_types.contains(PluginTypes::SECONDARY_BACKEND) => {
                    self.inner.settings.set_default_value(keys::ENABLED, false, &scope);
                    if !self.is_enabled(&scope) {
                        continue;
                    }
                    match backend.initialize(self.backend_context(&name)).await {
                        Ok(()) => {
                            log_info!("Secondary backend {} enabled", name);
                            self.inner.secondaries.write().await.push((name, backend));
                        }
                        Err(e) => log_warn!("Secondary backend {} unusable: {}", name, e),
                    }
                }
                Plugin::Backend(_) => {}
            }
        }
    }

    /// Names of loaded plugins with any of `types`.
    pub fn plugin_names(&self, types: PluginTypes) -> Vec<String> {
        self.inner.plugins.names(types)
    }

    pub fn icons(&self) -> &IconCache {
        &self.inner.icons
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.inner.settings
    }

    fn is_enabled(&self, scope: &SettingsScope) -> bool {
        self.inner
            .settings
            .value(keys::ENABLED, scope)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn backend_context(&self, name: &str) -> BackendContext {
        BackendContext {
            name: name.to_string(),
            events: BackendEventSink::new(name, self.inner.backend_events.clone()),
            icons: self.inner.icons.clone(),
            settings: self.inner.settings.clone(),
        }
    }

    // ========================================================================
    // APPLICATIONS
    // ========================================================================

    pub async fn register_application(&self, application: Application) -> Result<(), CoreError> {
        {
            let mut applications = self
                .inner
                .applications
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if applications.contains_key(application.name()) {
                log_warn!("Application {} is already registered", application.name());
                return Err(CoreError::ApplicationAlreadyRegistered(application.name().to_string()));
            }
            applications.insert(application.name().to_string(), application.clone());
        }
        log_info!("Registered application {}", application.name());

        if let Some(primary) = self.primary().await {
            primary.backend.register_application(&application).await;
        }
        Ok(())
    }

    /// Remove `application`. Notifications already dispatched for it keep their copy.
    ///
    /// Only the registered instance is removed; another value with the same name
    /// but a different token is treated as not registered.
    pub async fn deregister_application(&self, application: &Application) -> Result<(), CoreError> {
        let removed = {
            let mut applications = self
                .inner
                .applications
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match applications.get(application.name()) {
                Some(registered) if registered == application => applications.remove(application.name()),
                _ => None,
            }
        };
        let Some(removed) = removed else {
            return Err(CoreError::ApplicationNotRegistered(application.name().to_string()));
        };
        log_info!("Deregistered application {}", removed.name());

        if let Some(primary) = self.primary().await {
            primary.backend.deregister_application(&removed).await;
        }
        Ok(())
    }

    /// Registered applications, sorted by name.
    pub fn applications(&self) -> Vec<Application> {
        let mut applications: Vec<Application> = self
            .inner
            .applications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        applications.sort_by(|a, b| a.name().cmp(b.name()));
        applications
    }

    pub fn default_application(&self) -> Application {
        self.inner
            .default_application
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Application used for notifications the core sends on its own behalf.
    pub fn set_default_application(&self, application: Application) {
        *self
            .inner
            .default_application
            .write()
            .unwrap_or_else(PoisonError::into_inner) = application;
    }

    fn registered_application(&self, name: &str) -> Option<Application> {
        self.inner
            .applications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    /// Queue `notification` for delivery and return its id.
    ///
    /// An unset timeout is filled in from the global `Timeout` setting. Delivery
    /// happens on the dispatch loop; the outcome is reported through events.
    pub async fn broadcast_notification(&self, mut notification: Notification) -> Result<u32, CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ShutDown);
        }
        let app_name = notification.application.name().to_string();
        if self.registered_application(&app_name).as_ref() != Some(&notification.application) {
            log_warn!("Dropping notification from unregistered application {}", app_name);
            return Err(CoreError::ApplicationNotRegistered(app_name));
        }
        if self.primary().await.is_none() {
            log_warn!("Dropping notification from {}: no primary backend", app_name);
            return Err(CoreError::NoPrimaryBackend);
        }

        let id = match notification.id {
            Some(id) => {
                self.inner
                    .next_id
                    .fetch_max(id.saturating_add(1), Ordering::SeqCst);
                id
            }
            None => self.inner.next_id.fetch_add(1, Ordering::SeqCst),
        };
        notification.id = Some(id);
        notification.close_reason = None;
        if notification.timeout.is_none() {
            notification.timeout = Some(self.default_timeout());
        }

        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, notification.clone());

        if self.inner.jobs.send(Job::Deliver(notification)).is_err() {
            self.inner
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return Err(CoreError::ShutDown);
        }
        debug!("Queued notification {} from {}", id, app_name);
        Ok(id)
    }

    /// Ask the primary backend to close `notification`. A no-op when the backend
    /// cannot close notifications or the notification is no longer active.
    pub async fn request_close_notification(&self, notification: &Notification, reason: CloseReason) {
        let Some(id) = notification.id else {
            debug!("Close requested for a notification that was never broadcast");
            return;
        };
        let Some(active) = self.get_active_notification_by_id(id) else {
            debug!("Close requested for inactive notification {}", id);
            return;
        };
        match self.primary().await {
            Some(primary) if primary.capabilities.can_close => {
                let _ = self.inner.jobs.send(Job::Close(active, reason));
            }
            Some(primary) => {
                log_info!("Backend {} cannot close notifications, ignoring close of {}", primary.name, id)
            }
            None => debug!("No primary backend to close notification {}", id),
        }
    }

    pub fn get_active_notification_by_id(&self, id: u32) -> Option<Notification> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// A recently closed notification, with its close reason set.
    pub fn closed_notification_by_id(&self, id: u32) -> Option<Notification> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|n| n.id == Some(id))
            .cloned()
    }

    /// Register the default application if needed and broadcast a sample
    /// notification with one action.
    pub async fn display_example_notification(&self) -> Result<u32, CoreError> {
        let default = self.default_application();
        let application = match self.registered_application(default.name()) {
            Some(registered) => registered,
            None => {
                self.register_application(default.clone()).await?;
                default
            }
        };
        let notification = Notification::new(
            &application,
            "Hello World",
            "This is a notification sent by Chime.",
        )
        .add_action(Action::new(1, "Test Action"));
        self.broadcast_notification(notification).await
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CoreEvent> {
        self.inner.subscribers.subscribe()
    }

    fn default_timeout(&self) -> Duration {
        let secs = self
            .inner
            .settings
            .value(keys::TIMEOUT, &SettingsScope::Global)
            .and_then(|v| v.as_i64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs.max(0) as u64)
    }

    // ========================================================================
    // PRIMARY BACKEND
    // ========================================================================

    pub async fn primary_notification_backend(&self) -> Option<String> {
        self.primary().await.map(|p| p.name)
    }

    /// Make `name` the primary backend.
    ///
    /// Applications move from the old backend to the new one and the choice is
    /// saved. Selecting the current backend succeeds without doing anything.
    pub async fn set_primary_notification_backend(&self, name: &str) -> Result<(), CoreError> {
        let _guard = self.inner.switch_lock.lock().await;
        self.switch_to(name, true).await
    }

    async fn primary(&self) -> Option<PrimaryBackend> {
        self.inner.primary.read().await.clone()
    }

    async fn is_secondary(&self, name: &str) -> bool {
        self.inner.secondaries.read().await.iter().any(|(n, _)| n == name)
    }

    // Callers hold `switch_lock`. Only an explicit choice is saved as the preferred backend.
    async fn switch_to(&self, name: &str, persist: bool) -> Result<(), CoreError> {
        let Some(backend) = self.inner.plugins.backend(name) else {
            log_warn!("Unknown backend {}", name);
            return Err(CoreError::UnknownBackend(name.to_string()));
        };

        let current = self.primary().await;
        if current.as_ref().map(|p| p.name == name) == Some(true) {
            return Ok(());
        }

        if let Err(e) = backend.initialize(self.backend_context(name)).await {
            log_error!("Backend {} failed to initialize: {}", name, e);
            self.inner
                .subscribers
                .emit(CoreEvent::PrimaryBackendError(format!("{}: {}", name, e)));
            return Err(CoreError::BackendUnusable {
                name: name.to_string(),
                source: e,
            });
        }

        let applications = self.applications();
        for application in &applications {
            backend.register_application(application).await;
        }
        *self.inner.primary.write().await = Some(PrimaryBackend {
            name: name.to_string(),
            capabilities: backend.capabilities(),
            backend,
        });
        log_info!("🔔 Primary notification backend is now {}", name);

        if let Some(old) = &current {
            self.close_delivered_by(&old.name);
            for application in &applications {
                old.backend.deregister_application(application).await;
            }
            if !self.is_secondary(&old.name).await {
                old.backend.deinitialize().await;
            }
        }

        if persist {
            if let Err(e) = self
                .inner
                .settings
                .set_value(keys::PRIMARY_BACKEND, name, &SettingsScope::Global)
                .await
            {
                log_warn!("Failed to persist primary backend: {}", e);
            }
        }
        self.inner
            .subscribers
            .emit(CoreEvent::PrimaryBackendChanged(name.to_string()));
        Ok(())
    }

    // Callers hold `switch_lock`.
    async fn activate_first_usable(&self, skip: &[&str]) -> Result<(), CoreError> {
        for name in self.inner.plugins.names(PluginTypes::BACKEND) {
            if skip.contains(&name.as_str()) {
                continue;
            }
            match self.switch_to(&name, false).await {
                Ok(()) => return Ok(()),
                Err(e) => log_warn!("Fallback to {} failed: {}", name, e),
            }
        }
        log_error!("No usable notification backend");
        Err(CoreError::NoPrimaryBackend)
    }

    /// Drop a primary backend that reported a fatal error and try the others.
    async fn fall_back(&self, failed: &str) {
        let _guard = self.inner.switch_lock.lock().await;
        let old = {
            let mut primary = self.inner.primary.write().await;
            match primary.as_ref() {
                Some(p) if p.name == failed => primary.take(),
                _ => return,
            }
        };
        self.close_delivered_by(failed);
        if let Some(old) = old {
            if !self.is_secondary(&old.name).await {
                old.backend.deinitialize().await;
            }
        }
        let _ = self.activate_first_usable(&[failed]).await;
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    pub fn settings_value(&self, key: &str, scope: &SettingsScope) -> Option<SettingsValue> {
        self.inner.settings.value(key, scope)
    }

    pub async fn set_settings_value(
        &self,
        key: &str,
        value: impl Into<SettingsValue>,
        scope: &SettingsScope,
    ) -> Result<(), CoreError> {
        self.inner.settings.set_value(key, value, scope).await?;
        Ok(())
    }

    pub fn set_default_settings_value(&self, key: &str, value: impl Into<SettingsValue>, scope: &SettingsScope) {
        self.inner.settings.set_default_value(key, value, scope);
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    async fn run_job(&self, job: Job) {
        match job {
            Job::Deliver(notification) => self.deliver(notification).await,
            Job::Close(notification, reason) => {
                let Some(primary) = self.primary().await else {
                    return;
                };
                if let Err(e) = primary.backend.close_notification(&notification, reason).await {
                    log_warn!("Backend {} failed to close notification: {}", primary.name, e);
                }
            }
        }
    }

    async fn deliver(&self, notification: Notification) {
        let Some(id) = notification.id else {
            return;
        };
        let Some(primary) = self.primary().await else {
            log_warn!("Primary backend went away before notification {} was delivered", id);
            self.close(id, CloseReason::BackendError);
            return;
        };

        match primary.backend.notify(&notification).await {
            Ok(()) => {
                {
                    let active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
                    if active.contains_key(&id) {
                        self.inner
                            .delivered_by
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .insert(id, primary.name.clone());
                    }
                }
                // A switch may have swept the old backend while it was delivering.
                if self.primary_notification_backend().await.as_deref() != Some(primary.name.as_str()) {
                    log_warn!("Backend {} was replaced while delivering notification {}", primary.name, id);
                    self.close(id, CloseReason::BackendError);
                }
            }
            Err(e) => {
                log_error!("Backend {} failed to deliver notification {}: {}", primary.name, id, e);
                self.inner
                    .subscribers
                    .emit(CoreEvent::PrimaryBackendError(format!("{}: {}", primary.name, e)));
                self.close(id, CloseReason::BackendError);
                if e.is_fatal() {
                    self.fall_back(&primary.name).await;
                }
            }
        }

        let secondaries = self.inner.secondaries.read().await.clone();
        for (name, backend) in secondaries {
            if name == primary.name {
                continue;
            }
            if let Err(e) = backend.notify(&notification).await {
                log_warn!("Secondary backend {} failed on notification {}: {}", name, id, e);
            }
        }
    }

    async fn handle_backend_event(&self, tagged: TaggedBackendEvent) {
        let TaggedBackendEvent { backend, event } = tagged;
        let primary = self.primary().await;
        let from_primary = primary.as_ref().map(|p| p.name == backend) == Some(true);
        let supports_actions = primary.as_ref().map(|p| p.capabilities.supports_actions) == Some(true);

        if !from_primary && self.is_secondary(&backend).await {
            debug!("Secondary backend {} reported {:?}", backend, event);
            return;
        }

        match event {
            BackendEvent::Closed { id, reason } => {
                if !self.close(id, reason) {
                    debug!("{} closed notification {} which is not active", backend, id);
                }
            }
            BackendEvent::ActionInvoked { id, action_id } => {
                let Some(notification) = self.get_active_notification_by_id(id) else {
                    debug!("{} reported an action on inactive notification {}", backend, id);
                    return;
                };
                // Without action support only a plain click is reported.
                let action_id = action_id.filter(|_| supports_actions);
                let action = action_id.and_then(|a| notification.action_by_id(a).cloned());
                if action_id.is_some() && action.is_none() {
                    log_warn!("Notification {} has no action {:?}", id, action_id);
                }
                self.inner
                    .subscribers
                    .emit(CoreEvent::ActionInvoked { notification, action });
            }
            BackendEvent::Error(e) if from_primary => self.backend_failed(&backend, e).await,
            BackendEvent::Error(e) => log_warn!("Inactive backend {} reported: {}", backend, e),
        }
    }

    async fn backend_failed(&self, name: &str, error: BackendError) {
        log_error!("Primary backend {} reported: {}", name, error);
        self.inner
            .subscribers
            .emit(CoreEvent::PrimaryBackendError(format!("{}: {}", name, error)));
        if error.is_fatal() {
            self.fall_back(name).await;
        }
    }

    /// Close every active notification `backend` was showing. Used before a
    /// backend is released, since it will not report those closes itself.
    fn close_delivered_by(&self, backend: &str) {
        let ids: Vec<u32> = self
            .inner
            .delivered_by
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, name)| name.as_str() == backend)
            .map(|(id, _)| *id)
            .collect();
        if !ids.is_empty() {
            log_info!("Closing {} notification(s) left on backend {}", ids.len(), backend);
        }
        for id in ids {
            self.close(id, CloseReason::BackendError);
        }
    }

    /// Move an active notification to the history and emit its close event.
    /// Returns `false` if it was not active.
    fn close(&self, id: u32, reason: CloseReason) -> bool {
        let removed = self
            .inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        let Some(mut notification) = removed else {
            return false;
        };
        self.inner
            .delivered_by
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        notification.close_reason = Some(reason);

        {
            let mut history = self.inner.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }

        debug!("Notification {} closed: {}", id, reason);
        self.inner
            .subscribers
            .emit(CoreEvent::NotificationClosed { notification, reason });
        true
    }
}

impl Drop for CoreInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for NotificationCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCore")
            .field("next_id", &self.inner.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

async fn dispatch_loop(
    inner: Weak<CoreInner>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    mut events: mpsc::UnboundedReceiver<TaggedBackendEvent>,
    cancel: CancellationToken,
) {
    debug!("Dispatch loop started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(job) = jobs.recv() => {
                let Some(inner) = inner.upgrade() else { break };
                NotificationCore { inner }.run_job(job).await;
            }
            Some(event) = events.recv() => {
                let Some(inner) = inner.upgrade() else { break };
                NotificationCore { inner }.handle_backend_event(event).await;
            }
            else => break,
        }
    }
    debug!("Dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PluginDescriptor;
    use async_trait::async_trait;
    use once_cell::sync::Lazy;

    #[derive(Default)]
    struct TestBackend {
        can_close: bool,
        no_actions: bool,
        fail_init: Option<BackendError>,
        fail_notify: Mutex<Option<BackendError>>,
        sink: Mutex<Option<BackendEventSink>>,
        notified: Mutex<Vec<Notification>>,
        registered: Mutex<Vec<String>>,
        close_requests: Mutex<Vec<(u32, CloseReason)>>,
        deinitialized: Mutex<bool>,
    }

    impl TestBackend {
        fn sink(&self) -> BackendEventSink {
            self.sink.lock().unwrap().clone().unwrap()
        }

        fn notified(&self) -> Vec<u32> {
            self.notified.lock().unwrap().iter().filter_map(|n| n.id).collect()
        }

        fn registered(&self) -> Vec<String> {
            self.registered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationBackend for TestBackend {
        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities {
                can_close: self.can_close,
                supports_actions: !self.no_actions,
            }
        }

        async fn initialize(&self, context: BackendContext) -> Result<(), BackendError> {
            if let Some(e) = &self.fail_init {
                return Err(e.clone());
            }
            *self.sink.lock().unwrap() = Some(context.events);
            *self.deinitialized.lock().unwrap() = false;
            Ok(())
        }

        async fn deinitialize(&self) {
            *self.deinitialized.lock().unwrap() = true;
        }

        async fn register_application(&self, application: &Application) {
            self.registered.lock().unwrap().push(application.name().to_string());
        }

        async fn deregister_application(&self, application: &Application) {
            self.registered.lock().unwrap().retain(|n| n != application.name());
        }

        async fn notify(&self, notification: &Notification) -> Result<(), BackendError> {
            if let Some(e) = self.fail_notify.lock().unwrap().take() {
                return Err(e);
            }
            self.notified.lock().unwrap().push(notification.clone());
            Ok(())
        }

        async fn close_notification(
            &self,
            notification: &Notification,
            reason: CloseReason,
        ) -> Result<(), BackendError> {
            let id = notification.id.unwrap();
            self.close_requests.lock().unwrap().push((id, reason));
            self.sink().closed(id, reason);
            Ok(())
        }
    }

    fn registry(backends: &[(&str, PluginTypes, Arc<TestBackend>)]) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        for (name, types, backend) in backends {
            let backend = Arc::clone(backend);
            registry.register(PluginDescriptor::new(*name, *types, move || {
                Plugin::Backend(backend.clone())
            }));
        }
        registry
    }

    async fn core_with(
        backends: &[(&str, PluginTypes, Arc<TestBackend>)],
    ) -> (NotificationCore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let core = NotificationCore::new(
            SettingsStore::in_memory(),
            registry(backends),
            IconCache::new(dir.path()),
        );
        (core, dir)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<CoreEvent>) -> CoreEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn eventually(check: impl Fn() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    async fn next_close(rx: &mut mpsc::UnboundedReceiver<CoreEvent>) -> (Notification, CloseReason) {
        loop {
            if let CoreEvent::NotificationClosed { notification, reason } = next_event(rx).await {
                return (notification, reason);
            }
        }
    }

    /// The same registered instance every time; a fresh `Application::new` has a new token.
    fn mail() -> Application {
        static MAIL: Lazy<Application> = Lazy::new(|| Application::new("Mail", Icon::default_icon()));
        MAIL.clone()
    }

    #[tokio::test]
    async fn test_mail_scenario_closes_exactly_once() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast.clone())]).await;
        core.initialize().await.unwrap();
        assert_eq!(core.primary_notification_backend().await.as_deref(), Some("Toast"));

        let mut events = core.subscribe();
        let app = mail();
        core.register_application(app.clone()).await.unwrap();
        let id = core
            .broadcast_notification(Notification::new(&app, "New message", "hello"))
            .await
            .unwrap();
        assert!(core.get_active_notification_by_id(id).is_some());

        eventually(|| toast.notified() == vec![id]).await;
        toast.sink().closed(id, CloseReason::TimedOut);
        toast.sink().closed(id, CloseReason::TimedOut);

        match next_event(&mut events).await {
            CoreEvent::NotificationClosed { notification, reason } => {
                assert_eq!(notification.id, Some(id));
                assert_eq!(notification.title, "New message");
                assert_eq!(reason, CloseReason::TimedOut);
            }
            other => panic!("unexpected event {:?}", other),
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());
        assert!(core.get_active_notification_by_id(id).is_none());
        assert_eq!(
            core.closed_notification_by_id(id).unwrap().close_reason,
            Some(CloseReason::TimedOut)
        );
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast.clone())]).await;
        core.initialize().await.unwrap();

        core.register_application(mail()).await.unwrap();
        let err = core.register_application(mail()).await.unwrap_err();
        assert!(matches!(err, CoreError::ApplicationAlreadyRegistered(name) if name == "Mail"));
        assert_eq!(core.applications().len(), 1);
        assert_eq!(toast.registered(), vec!["Mail"]);
    }

    #[tokio::test]
    async fn test_unregistered_application_cannot_broadcast() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast.clone())]).await;
        core.initialize().await.unwrap();

        let err = core
            .broadcast_notification(Notification::new(&mail(), "hi", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ApplicationNotRegistered(_)));
        assert!(core.get_active_notification_by_id(1).is_none());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(toast.notified().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_without_backend_fails() {
        let (core, _dir) = core_with(&[]).await;
        assert!(matches!(core.initialize().await, Err(CoreError::NoPrimaryBackend)));

        core.register_application(mail()).await.unwrap();
        let err = core
            .broadcast_notification(Notification::new(&mail(), "hi", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoPrimaryBackend));
    }

    #[tokio::test]
    async fn test_deregister_unknown_application() {
        let (core, _dir) = core_with(&[]).await;
        let err = core.deregister_application(&mail()).await.unwrap_err();
        assert!(matches!(err, CoreError::ApplicationNotRegistered(_)));

        core.register_application(mail()).await.unwrap();
        core.deregister_application(&mail()).await.unwrap();
        assert!(core.applications().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_backend_keeps_current() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast)]).await;
        core.initialize().await.unwrap();

        let err = core.set_primary_notification_backend("Nope").await.unwrap_err();
        assert!(matches!(err, CoreError::UnknownBackend(name) if name == "Nope"));
        assert_eq!(core.primary_notification_backend().await.as_deref(), Some("Toast"));
    }

    #[tokio::test]
    async fn test_switch_moves_applications_and_persists() {
        let toast = Arc::new(TestBackend::default());
        let other = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[
            ("Toast", PluginTypes::BACKEND, toast.clone()),
            ("Other", PluginTypes::BACKEND, other.clone()),
        ])
        .await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();

        let mut events = core.subscribe();
        core.set_primary_notification_backend("Other").await.unwrap();

        assert!(toast.registered().is_empty());
        assert!(*toast.deinitialized.lock().unwrap());
        assert_eq!(other.registered(), vec!["Mail"]);
        assert_eq!(
            core.settings_value(keys::PRIMARY_BACKEND, &SettingsScope::Global),
            Some(SettingsValue::from("Other"))
        );
        assert!(matches!(
            next_event(&mut events).await,
            CoreEvent::PrimaryBackendChanged(name) if name == "Other"
        ));

        // Selecting the current backend again is a no-op.
        core.set_primary_notification_backend("Other").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unusable_backend_reports_error() {
        let toast = Arc::new(TestBackend::default());
        let broken = Arc::new(TestBackend {
            fail_init: Some(BackendError::Unavailable("no display".into())),
            ..Default::default()
        });
        let (core, _dir) = core_with(&[
            ("Toast", PluginTypes::BACKEND, toast),
            ("Broken", PluginTypes::BACKEND, broken),
        ])
        .await;
        core.initialize().await.unwrap();

        let mut events = core.subscribe();
        let err = core.set_primary_notification_backend("Broken").await.unwrap_err();
        assert!(matches!(err, CoreError::BackendUnusable { .. }));
        assert!(matches!(next_event(&mut events).await, CoreEvent::PrimaryBackendError(_)));
        assert_eq!(core.primary_notification_backend().await.as_deref(), Some("Toast"));
    }

    #[tokio::test]
    async fn test_initialize_falls_back_when_preferred_is_unusable() {
        let broken = Arc::new(TestBackend {
            fail_init: Some(BackendError::Unavailable("no display".into())),
            ..Default::default()
        });
        let logger = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[
            ("Toast", PluginTypes::BACKEND, broken),
            ("Logger", PluginTypes::BACKEND, logger),
        ])
        .await;
        core.initialize().await.unwrap();
        assert_eq!(core.primary_notification_backend().await.as_deref(), Some("Logger"));
    }

    #[tokio::test]
    async fn test_fatal_error_falls_back_to_next_backend() {
        let toast = Arc::new(TestBackend::default());
        let logger = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[
            ("Toast", PluginTypes::BACKEND, toast.clone()),
            ("Logger", PluginTypes::BACKEND, logger.clone()),
        ])
        .await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();

        let mut events = core.subscribe();
        toast.sink().error(BackendError::Unavailable("connection lost".into()));

        assert!(matches!(next_event(&mut events).await, CoreEvent::PrimaryBackendError(_)));
        assert!(matches!(
            next_event(&mut events).await,
            CoreEvent::PrimaryBackendChanged(name) if name == "Logger"
        ));
        assert_eq!(core.primary_notification_backend().await.as_deref(), Some("Logger"));
        assert_eq!(logger.registered(), vec!["Mail"]);
    }

    #[tokio::test]
    async fn test_non_fatal_delivery_failure_closes_notification() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast.clone())]).await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();
        *toast.fail_notify.lock().unwrap() = Some(BackendError::Delivery("queue full".into()));

        let mut events = core.subscribe();
        let id = core
            .broadcast_notification(Notification::new(&mail(), "hi", ""))
            .await
            .unwrap();

        assert!(matches!(next_event(&mut events).await, CoreEvent::PrimaryBackendError(_)));
        match next_event(&mut events).await {
            CoreEvent::NotificationClosed { notification, reason } => {
                assert_eq!(notification.id, Some(id));
                assert_eq!(reason, CloseReason::BackendError);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(core.primary_notification_backend().await.as_deref(), Some("Toast"));
    }

    #[tokio::test]
    async fn test_close_request_is_gated_on_capability() {
        let closer = Arc::new(TestBackend {
            can_close: true,
            ..Default::default()
        });
        let plain = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[
            ("Toast", PluginTypes::BACKEND, closer.clone()),
            ("Plain", PluginTypes::BACKEND, plain.clone()),
        ])
        .await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();
        let mut events = core.subscribe();

        let id = core
            .broadcast_notification(Notification::new(&mail(), "hi", "").with_timeout(Duration::ZERO))
            .await
            .unwrap();
        let notification = core.get_active_notification_by_id(id).unwrap();
        core.request_close_notification(&notification, CloseReason::Requested).await;
        match next_event(&mut events).await {
            CoreEvent::NotificationClosed { reason, .. } => assert_eq!(reason, CloseReason::Requested),
            other => panic!("unexpected event {:?}", other),
        }

        core.set_primary_notification_backend("Plain").await.unwrap();
        let _ = next_event(&mut events).await;
        let id = core
            .broadcast_notification(Notification::new(&mail(), "hi", ""))
            .await
            .unwrap();
        let notification = core.get_active_notification_by_id(id).unwrap();
        core.request_close_notification(&notification, CloseReason::Requested).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(plain.close_requests.lock().unwrap().is_empty());
        assert!(core.get_active_notification_by_id(id).is_some());
    }

    #[tokio::test]
    async fn test_action_event_resolves_action() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast.clone())]).await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();
        let mut events = core.subscribe();

        let id = core
            .broadcast_notification(Notification::new(&mail(), "hi", "").add_action(Action::new(2, "Reply")))
            .await
            .unwrap();
        toast.sink().action_invoked(id, Some(2));
        toast.sink().action_invoked(id, None);

        match next_event(&mut events).await {
            CoreEvent::ActionInvoked { notification, action } => {
                assert_eq!(notification.id, Some(id));
                assert_eq!(action, Some(Action::new(2, "Reply")));
            }
            other => panic!("unexpected event {:?}", other),
        }
        match next_event(&mut events).await {
            CoreEvent::ActionInvoked { action, .. } => assert_eq!(action, None),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ids_and_default_timeout() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast.clone())]).await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();
        core.set_settings_value(keys::TIMEOUT, 3i64, &SettingsScope::Global)
            .await
            .unwrap();

        let first = core
            .broadcast_notification(Notification::new(&mail(), "a", ""))
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(
            core.get_active_notification_by_id(first).unwrap().timeout,
            Some(Duration::from_secs(3))
        );

        let chosen = core
            .broadcast_notification(Notification::new(&mail(), "b", "").with_id(40))
            .await
            .unwrap();
        assert_eq!(chosen, 40);

        let next = core
            .broadcast_notification(Notification::new(&mail(), "c", ""))
            .await
            .unwrap();
        assert_eq!(next, 41);
    }

    #[tokio::test]
    async fn test_secondary_backend_gets_a_copy() {
        let toast = Arc::new(TestBackend::default());
        let secondary = Arc::new(TestBackend::default());
        let settings = SettingsStore::in_memory();
        settings
            .set_value(keys::ENABLED, true, &SettingsScope::plugin("Mirror"))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let core = NotificationCore::new(
            settings,
            registry(&[
                ("Toast", PluginTypes::BACKEND, toast.clone()),
                ("Mirror", PluginTypes::SECONDARY_BACKEND, secondary.clone()),
            ]),
            IconCache::new(dir.path()),
        );
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();

        let id = core
            .broadcast_notification(Notification::new(&mail(), "hi", ""))
            .await
            .unwrap();
        eventually(|| secondary.notified() == vec![id] && toast.notified() == vec![id]).await;

        // Reports from a secondary backend never close the notification.
        secondary.sink().closed(id, CloseReason::TimedOut);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(core.get_active_notification_by_id(id).is_some());
    }

    #[tokio::test]
    async fn test_example_notification_registers_default_application() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast.clone())]).await;
        core.initialize().await.unwrap();

        let id = core.display_example_notification().await.unwrap();
        let notification = core.get_active_notification_by_id(id).unwrap();
        assert_eq!(notification.application.name(), DEFAULT_APPLICATION_NAME);
        assert_eq!(notification.title, "Hello World");
        assert_eq!(notification.actions.len(), 1);

        // A second call reuses the registration.
        core.display_example_notification().await.unwrap();
        assert_eq!(core.applications().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_releases_backends() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast.clone())]).await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();

        core.shutdown().await;
        assert!(*toast.deinitialized.lock().unwrap());
        assert!(toast.registered().is_empty());
        assert!(core.primary_notification_backend().await.is_none());
        assert!(matches!(
            core.broadcast_notification(Notification::new(&mail(), "hi", "")).await,
            Err(CoreError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_switch_closes_notifications_left_on_old_backend() {
        let toast = Arc::new(TestBackend::default());
        let other = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[
            ("Toast", PluginTypes::BACKEND, toast.clone()),
            ("Other", PluginTypes::BACKEND, other.clone()),
        ])
        .await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();
        let mut events = core.subscribe();

        let id = core
            .broadcast_notification(Notification::new(&mail(), "hi", "").with_timeout(Duration::from_millis(100)))
            .await
            .unwrap();
        eventually(|| toast.notified() == vec![id]).await;
        core.set_primary_notification_backend("Other").await.unwrap();

        let (notification, reason) = next_close(&mut events).await;
        assert_eq!(notification.id, Some(id));
        assert_eq!(reason, CloseReason::BackendError);
        assert!(core.get_active_notification_by_id(id).is_none());
        assert_eq!(
            core.closed_notification_by_id(id).unwrap().close_reason,
            Some(CloseReason::BackendError)
        );

        // Later notifications go to the new backend and stay active there.
        let next = core
            .broadcast_notification(Notification::new(&mail(), "again", ""))
            .await
            .unwrap();
        eventually(|| other.notified() == vec![next]).await;
        assert!(core.get_active_notification_by_id(next).is_some());
    }

    #[tokio::test]
    async fn test_fatal_error_closes_in_flight_notifications() {
        let toast = Arc::new(TestBackend::default());
        let logger = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[
            ("Toast", PluginTypes::BACKEND, toast.clone()),
            ("Logger", PluginTypes::BACKEND, logger.clone()),
        ])
        .await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();
        let mut events = core.subscribe();

        let id = core
            .broadcast_notification(Notification::new(&mail(), "hi", ""))
            .await
            .unwrap();
        eventually(|| toast.notified() == vec![id]).await;
        toast.sink().error(BackendError::Unavailable("connection lost".into()));

        let (notification, reason) = next_close(&mut events).await;
        assert_eq!(notification.id, Some(id));
        assert_eq!(reason, CloseReason::BackendError);
        assert!(core.get_active_notification_by_id(id).is_none());
        loop {
            if let CoreEvent::PrimaryBackendChanged(name) = next_event(&mut events).await {
                assert_eq!(name, "Logger");
                break;
            }
        }
        assert!(*toast.deinitialized.lock().unwrap());

        // The automatic fallback is not saved over the preferred backend.
        assert_eq!(core.primary_notification_backend().await.as_deref(), Some("Logger"));
        assert_eq!(
            core.settings_value(keys::PRIMARY_BACKEND, &SettingsScope::Global),
            Some(SettingsValue::from("Toast"))
        );
    }

    #[tokio::test]
    async fn test_fallback_keeps_saved_backend_choice() {
        let desktop = Arc::new(TestBackend {
            fail_init: Some(BackendError::Unavailable("no session bus".into())),
            ..Default::default()
        });
        let logger = Arc::new(TestBackend::default());
        let settings = SettingsStore::in_memory();
        settings
            .set_value(keys::PRIMARY_BACKEND, "Desktop", &SettingsScope::Global)
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let core = NotificationCore::new(
            settings,
            registry(&[
                ("Desktop", PluginTypes::BACKEND, desktop),
                ("Logger", PluginTypes::BACKEND, logger),
            ]),
            IconCache::new(dir.path()),
        );

        core.initialize().await.unwrap();
        assert_eq!(core.primary_notification_backend().await.as_deref(), Some("Logger"));
        assert_eq!(
            core.settings_value(keys::PRIMARY_BACKEND, &SettingsScope::Global),
            Some(SettingsValue::from("Desktop"))
        );
    }

    #[tokio::test]
    async fn test_deregistered_application_notifications_stay_active() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast.clone())]).await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();
        let mut events = core.subscribe();

        let id = core
            .broadcast_notification(Notification::new(&mail(), "hi", ""))
            .await
            .unwrap();
        eventually(|| toast.notified() == vec![id]).await;
        core.deregister_application(&mail()).await.unwrap();
        assert!(core.applications().is_empty());

        let active = core.get_active_notification_by_id(id).unwrap();
        assert_eq!(active.application.name(), "Mail");

        toast.sink().closed(id, CloseReason::Dismissed);
        let (notification, reason) = next_close(&mut events).await;
        assert_eq!(notification.id, Some(id));
        assert_eq!(reason, CloseReason::Dismissed);
    }

    #[tokio::test]
    async fn test_same_name_with_other_token_is_not_registered() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast)]).await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();

        let impostor = Application::new("Mail", Icon::default_icon());
        let err = core.deregister_application(&impostor).await.unwrap_err();
        assert!(matches!(err, CoreError::ApplicationNotRegistered(name) if name == "Mail"));
        assert_eq!(core.applications(), vec![mail()]);

        let err = core
            .broadcast_notification(Notification::new(&impostor, "hi", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ApplicationNotRegistered(_)));
    }

    #[tokio::test]
    async fn test_actions_dropped_when_backend_lacks_support() {
        let plain = Arc::new(TestBackend {
            no_actions: true,
            ..Default::default()
        });
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, plain.clone())]).await;
        core.initialize().await.unwrap();
        core.register_application(mail()).await.unwrap();
        let mut events = core.subscribe();

        let id = core
            .broadcast_notification(Notification::new(&mail(), "hi", "").add_action(Action::new(2, "Reply")))
            .await
            .unwrap();
        plain.sink().action_invoked(id, Some(2));

        match next_event(&mut events).await {
            CoreEvent::ActionInvoked { notification, action } => {
                assert_eq!(notification.id, Some(id));
                assert_eq!(action, None);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plugin_names_reflect_loaded_plugins() {
        let toast = Arc::new(TestBackend::default());
        let (core, _dir) = core_with(&[("Toast", PluginTypes::BACKEND, toast)]).await;
        assert!(core.plugin_names(PluginTypes::ALL).is_empty());
        core.load_plugins(PluginTypes::BACKEND).await;
        assert_eq!(core.plugin_names(PluginTypes::BACKEND), vec!["Toast"]);
    }
}

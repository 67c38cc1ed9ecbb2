// plugins/frontends/socket/mod.rs
//
// Newline-delimited JSON over TCP. Each line from a client is a `Request`; the
// daemon answers with `Response` lines and later pushes close/action events for
// the notifications that connection submitted.

pub mod protocol;

pub use protocol::{Request, Response};

use crate::application::Application;
use crate::core::NotificationCore;
use crate::error::CoreError;
use crate::icon::Icon;
use crate::notification::{CloseReason, CoreEvent, Notification};
use crate::plugins::NotificationFrontend;
use crate::settings::{SettingsScope, SettingsValue};
use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info as log_info, warn as log_warn};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

pub const NAME: &str = "Socket";

/// Plugin setting: address to listen on.
pub const ADDRESS: &str = "Address";
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:47830";

/// How long a notify request may wait for a remote icon.
pub const ICON_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

#[derive(Default)]
pub struct SocketFrontend {
    running: Mutex<Option<Running>>,
}

impl SocketFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.local_addr)
    }
}

#[async_trait]
impl NotificationFrontend for SocketFrontend {
    fn default_settings(&self) -> Vec<(&'static str, SettingsValue)> {
        vec![(ADDRESS, SettingsValue::from(DEFAULT_ADDRESS))]
    }

    async fn start(&self, name: &str, core: NotificationCore) -> anyhow::Result<()> {
        let address = core
            .settings_value(ADDRESS, &SettingsScope::plugin(name))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind {}", address))?;
        let local_addr = listener.local_addr().context("listener has no local address")?;
        log_info!("🔌 Listening for notifications on {}", local_addr);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, core, cancel.clone()));

        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Running {
                cancel,
                task,
                local_addr,
            });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        Ok(())
    }

    async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(running) = running {
            running.cancel.cancel();
            let _ = running.task.await;
            log_info!("Socket frontend on {} stopped", running.local_addr);
        }
    }
}

async fn accept_loop(listener: TcpListener, core: NotificationCore, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Client connected from {}", peer);
                    let core = core.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, core, cancel).await {
                            log_warn!("Connection from {} failed: {:#}", peer, e);
                        }
                        debug!("Client {} disconnected", peer);
                    });
                }
                Err(e) => log_warn!("Failed to accept connection: {}", e),
            },
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    core: NotificationCore,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut events = core.subscribe();
    // Notifications this client should hear about.
    let mut watched: HashSet<u32> = HashSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read request")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(response) = handle_request(&core, &line, &mut watched).await {
                    send(&mut write, &response).await?;
                }
            }
            Some(event) = events.recv() => {
                if let Some(response) = event_response(event, &mut watched) {
                    send(&mut write, &response).await?;
                }
            }
        }
    }
    Ok(())
}

async fn send(write: &mut OwnedWriteHalf, response: &Response) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    write
        .write_all(line.as_bytes())
        .await
        .context("failed to write response")?;
    Ok(())
}

async fn handle_request(
    core: &NotificationCore,
    line: &str,
    watched: &mut HashSet<u32>,
) -> Option<Response> {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) => {
            return Some(Response::Rejected {
                reason: format!("invalid request: {}", e),
            })
        }
    };

    match request {
        Request::Notify {
            application,
            title,
            text,
            icon,
            priority,
            timeout,
            actions,
        } => {
            let application = match application_for(core, &application).await {
                Ok(application) => application,
                Err(e) => return Some(Response::Rejected { reason: e.to_string() }),
            };
            let mut notification = Notification::new(&application, title, text);
            if let Some(icon) = icon {
                notification = notification.with_icon(resolve_icon(core, &icon).await);
            }
            if let Some(priority) = priority {
                notification = notification.with_priority(priority);
            }
            if let Some(timeout) = timeout {
                notification = notification.with_timeout(Duration::from_secs(timeout));
            }
            for action in actions {
                notification = notification.add_action(action);
            }

            Some(match core.broadcast_notification(notification).await {
                Ok(id) => {
                    watched.insert(id);
                    Response::Accepted { id }
                }
                Err(e) => Response::Rejected { reason: e.to_string() },
            })
        }
        Request::Close { id } => match core.get_active_notification_by_id(id) {
            Some(notification) => {
                watched.insert(id);
                core.request_close_notification(&notification, CloseReason::Requested)
                    .await;
                None
            }
            None => Some(Response::Rejected {
                reason: format!("notification {} is not active", id),
            }),
        },
    }
}

/// The registered application called `name`, registering it on first use.
async fn application_for(core: &NotificationCore, name: &str) -> Result<Application, CoreError> {
    if let Some(application) = core.applications().into_iter().find(|a| a.name() == name) {
        return Ok(application);
    }
    let application = Application::new(name, Icon::default_icon());
    match core.register_application(application.clone()).await {
        Ok(()) => Ok(application),
        // Another connection registered it first.
        Err(CoreError::ApplicationAlreadyRegistered(_)) => core
            .applications()
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| CoreError::ApplicationNotRegistered(name.to_string())),
        Err(e) => Err(e),
    }
}

async fn resolve_icon(core: &NotificationCore, icon: &str) -> Icon {
    if let Ok(url) = Url::parse(icon) {
        match url.scheme() {
            "http" | "https" => return core.icons().from_web_url(&url, ICON_FETCH_TIMEOUT).await,
            "file" => {
                if let Ok(path) = url.to_file_path() {
                    return load_icon_file(&path);
                }
            }
            _ => {}
        }
    }
    load_icon_file(Path::new(icon))
}

fn load_icon_file(path: &Path) -> Icon {
    Icon::from_file(path).unwrap_or_else(|e| {
        log_warn!("Using default icon, {:?} could not be loaded: {}", path, e);
        Icon::default_icon()
    })
}

fn event_response(event: CoreEvent, watched: &mut HashSet<u32>) -> Option<Response> {
    match event {
        CoreEvent::NotificationClosed { notification, reason } => {
            let id = notification.id?;
            watched.remove(&id).then_some(Response::Closed { id, reason })
        }
        CoreEvent::ActionInvoked { notification, action } => {
            let id = notification.id?;
            watched
                .contains(&id)
                .then_some(Response::ActionInvoked { id, action })
        }
        CoreEvent::PrimaryBackendError(_) | CoreEvent::PrimaryBackendChanged(_) => None,
    }
}

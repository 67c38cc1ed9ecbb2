use crate::error::SettingsError;
use log::{info as log_info, warn as log_warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Well known settings keys.
pub mod keys {
    /// Global: name of the preferred primary backend.
    pub const PRIMARY_BACKEND: &str = "PrimaryBackend";
    /// Global: default notification timeout in seconds.
    pub const TIMEOUT: &str = "Timeout";
    /// Plugin scope: whether a secondary backend or frontend is active.
    pub const ENABLED: &str = "Enabled";
}

const SETTINGS_VERSION: u32 = 1;

/// A dynamically typed settings scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingsValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl SettingsValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for SettingsValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingsValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SettingsValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SettingsValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SettingsValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Where a setting lives: shared by everything, or private to one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SettingsScope {
    Global,
    Plugin(String),
}

impl SettingsScope {
    pub fn plugin(name: impl Into<String>) -> Self {
        Self::Plugin(name.into())
    }
}

/// On-disk layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsData {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    global: BTreeMap<String, SettingsValue>,
    #[serde(default)]
    plugins: BTreeMap<String, BTreeMap<String, SettingsValue>>,
}

impl SettingsData {
    fn get(&self, key: &str, scope: &SettingsScope) -> Option<&SettingsValue> {
        match scope {
            SettingsScope::Global => self.global.get(key),
            SettingsScope::Plugin(name) => self.plugins.get(name)?.get(key),
        }
    }

    fn insert(&mut self, key: &str, value: SettingsValue, scope: &SettingsScope) {
        let map = match scope {
            SettingsScope::Global => &mut self.global,
            SettingsScope::Plugin(name) => self.plugins.entry(name.clone()).or_default(),
        };
        map.insert(key.to_string(), value);
    }
}

/// Key/value settings shared by the core and every plugin.
///
/// Reads are synchronous and served from memory. Every write is persisted to the
/// backing JSON file right away; an in-memory store has no file and never touches disk.
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<SettingsInner>,
}

struct SettingsInner {
    path: Option<PathBuf>,
    values: RwLock<SettingsData>,
    defaults: RwLock<HashMap<(SettingsScope, String), SettingsValue>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl SettingsStore {
    /// Settings that live only in memory.
    pub fn in_memory() -> Self {
        Self::with_data(None, SettingsData::default())
    }

    /// Open the settings file at `path`. A missing file yields empty settings; a file
    /// that cannot be parsed is logged and replaced on the next write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();

        let data = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<SettingsData>(&content) {
                Ok(data) => {
                    log_info!("Loaded settings from {:?}", path);
                    data
                }
                Err(e) => {
                    log_warn!("Settings file {:?} is corrupt, starting from defaults: {}", path, e);
                    SettingsData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log_info!("No settings file found at {:?}, using defaults", path);
                SettingsData::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self::with_data(Some(path), data))
    }

    fn with_data(path: Option<PathBuf>, data: SettingsData) -> Self {
        Self {
            inner: Arc::new(SettingsInner {
                path,
                values: RwLock::new(data),
                defaults: RwLock::new(HashMap::new()),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Platform config location:
    /// - Linux: ~/.config/chime/settings.json
    /// - macOS: ~/Library/Application Support/chime/settings.json
    /// - Windows: %APPDATA%\chime\settings.json
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("chime");
        path.push("settings.json");
        Some(path)
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// The explicit value for `key`, falling back to its declared default.
    pub fn value(&self, key: &str, scope: &SettingsScope) -> Option<SettingsValue> {
        let explicit = self
            .inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key, scope)
            .cloned();

        explicit.or_else(|| {
            self.inner
                .defaults
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&(scope.clone(), key.to_string()))
                .cloned()
        })
    }

    /// Whether an explicit (non-default) value exists.
    pub fn contains(&self, key: &str, scope: &SettingsScope) -> bool {
        self.inner
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key, scope)
            .is_some()
    }

    /// Store `value` and persist it.
    pub async fn set_value(
        &self,
        key: &str,
        value: impl Into<SettingsValue>,
        scope: &SettingsScope,
    ) -> Result<(), SettingsError> {
        self.inner
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.into(), scope);
        self.flush().await
    }

    /// Declare the fallback for `key`. Explicit values are never touched.
    pub fn set_default_value(&self, key: &str, value: impl Into<SettingsValue>, scope: &SettingsScope) {
        self.inner
            .defaults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((scope.clone(), key.to_string()), value.into());
    }

    /// Write the current values to the backing file, if any.
    pub async fn flush(&self) -> Result<(), SettingsError> {
        let Some(path) = self.inner.path.as_ref() else {
            return Ok(());
        };

        let _guard = self.inner.write_lock.lock().await;
        let content = {
            let mut data = self
                .inner
                .values
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            data.version = SETTINGS_VERSION;
            serde_json::to_string_pretty(&data)?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").field("path", &self.inner.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_used_until_explicit_value() {
        let store = SettingsStore::in_memory();
        assert_eq!(store.value(keys::TIMEOUT, &SettingsScope::Global), None);

        store.set_default_value(keys::TIMEOUT, 10i64, &SettingsScope::Global);
        assert_eq!(
            store.value(keys::TIMEOUT, &SettingsScope::Global),
            Some(SettingsValue::Int(10))
        );
        assert!(!store.contains(keys::TIMEOUT, &SettingsScope::Global));
    }

    #[tokio::test]
    async fn test_default_never_overwrites_explicit() {
        let store = SettingsStore::in_memory();
        store
            .set_value(keys::TIMEOUT, 3i64, &SettingsScope::Global)
            .await
            .unwrap();
        store.set_default_value(keys::TIMEOUT, 10i64, &SettingsScope::Global);
        assert_eq!(
            store.value(keys::TIMEOUT, &SettingsScope::Global).and_then(|v| v.as_i64()),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_scopes_are_separate() {
        let store = SettingsStore::in_memory();
        let toast = SettingsScope::plugin("Toast");
        store.set_value(keys::ENABLED, true, &toast).await.unwrap();

        assert_eq!(store.value(keys::ENABLED, &toast), Some(SettingsValue::Bool(true)));
        assert_eq!(store.value(keys::ENABLED, &SettingsScope::Global), None);
        assert_eq!(store.value(keys::ENABLED, &SettingsScope::plugin("Logger")), None);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = SettingsStore::in_memory();
        store.set_value("Host", "a.local", &SettingsScope::Global).await.unwrap();
        store.set_value("Host", "b.local", &SettingsScope::Global).await.unwrap();
        assert_eq!(
            store.value("Host", &SettingsScope::Global).as_ref().and_then(|v| v.as_str()),
            Some("b.local")
        );
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SettingsStore::open(&path).await.unwrap();
        store
            .set_value(keys::PRIMARY_BACKEND, "Logger", &SettingsScope::Global)
            .await
            .unwrap();
        store
            .set_value("Port", 9000i64, &SettingsScope::plugin("Socket"))
            .await
            .unwrap();
        store.set_default_value(keys::TIMEOUT, 10i64, &SettingsScope::Global);

        let reopened = SettingsStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.value(keys::PRIMARY_BACKEND, &SettingsScope::Global),
            Some(SettingsValue::String("Logger".into()))
        );
        assert_eq!(
            reopened.value("Port", &SettingsScope::plugin("Socket")),
            Some(SettingsValue::Int(9000))
        );
        // Defaults are declarations, not data.
        assert_eq!(reopened.value(keys::TIMEOUT, &SettingsScope::Global), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::open(&path).await.unwrap();
        assert_eq!(store.value(keys::PRIMARY_BACKEND, &SettingsScope::Global), None);

        store.set_value(keys::TIMEOUT, 5i64, &SettingsScope::Global).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"Timeout\": 5"));
        assert!(content.contains("\"version\": 1"));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(SettingsValue::Float(4.0).as_i64(), Some(4));
        assert_eq!(SettingsValue::Float(4.5).as_i64(), None);
        assert_eq!(SettingsValue::Int(2).as_f64(), Some(2.0));
        assert_eq!(SettingsValue::from("x").as_bool(), None);

        let parsed: SettingsValue = serde_json::from_str("10").unwrap();
        assert_eq!(parsed, SettingsValue::Int(10));
        let parsed: SettingsValue = serde_json::from_str("true").unwrap();
        assert_eq!(parsed, SettingsValue::Bool(true));
    }
}

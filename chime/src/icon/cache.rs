use super::fetch::{HttpIconFetcher, IconFetcher};
use super::types::{Icon, IconMode, IconSource, IconState, Size};
use dashmap::{DashMap, DashSet};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Remote and local icon caches.
///
/// Cloning is cheap and every clone shares the same caches. Entries are never
/// evicted or invalidated for the lifetime of the cache: a URL resolves at most once,
/// and a rendering is written at most once per path. A remote icon that changes
/// behind the same URL keeps serving the first download.
#[derive(Clone)]
pub struct IconCache {
    inner: Arc<IconCacheInner>,
}

struct IconCacheInner {
    remote: DashMap<Url, Icon>,
    local: DashSet<PathBuf>,
    cache_dir: PathBuf,
    fetcher: Arc<dyn IconFetcher>,
    fetches: AtomicUsize,
    renders: AtomicUsize,
}

/// Counters for debugging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconCacheStats {
    pub remote_entries: usize,
    pub local_entries: usize,
    pub fetches: usize,
    pub renders: usize,
}

impl IconCache {
    /// Cache writing renderings below `cache_dir`, downloading over HTTP.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_fetcher(cache_dir, Arc::new(HttpIconFetcher::new()))
    }

    pub fn with_fetcher(cache_dir: impl Into<PathBuf>, fetcher: Arc<dyn IconFetcher>) -> Self {
        let cache_dir = cache_dir.into();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            warn!("Could not create icon cache directory {:?}: {}", cache_dir, e);
        }

        Self {
            inner: Arc::new(IconCacheInner {
                remote: DashMap::new(),
                local: DashSet::new(),
                cache_dir,
                fetcher,
                fetches: AtomicUsize::new(0),
                renders: AtomicUsize::new(0),
            }),
        }
    }

    /// Default location: `<tmp>/chime/icons`.
    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("chime").join("icons")
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    /// Resolve an icon from a remote URL, waiting at most `max_time`.
    ///
    /// Always yields a usable icon: on a transport error, a decode error or an
    /// elapsed deadline the default icon is returned and the URL is left uncached,
    /// so a later call fetches again. Other tasks keep running while this awaits.
    pub async fn from_web_url(&self, url: &Url, max_time: Duration) -> Icon {
        if let Some(icon) = self.inner.remote.get(url) {
            debug!("{} from cache", url);
            return icon.clone();
        }

        self.inner.fetches.fetch_add(1, Ordering::Relaxed);
        let fetch = self.inner.fetcher.fetch(url);

        match tokio::time::timeout(max_time, fetch).await {
            Ok(Ok(bytes)) => match Icon::from_bytes(&bytes, IconSource::Url(url.clone())) {
                Ok(icon) => {
                    self.inner.remote.insert(url.clone(), icon.clone());
                    debug!("{} added to cache", url);
                    icon
                }
                Err(e) => {
                    warn!("Error decoding icon from {}: {}", url, e);
                    Icon::default_icon()
                }
            },
            Ok(Err(e)) => {
                warn!("Error downloading {}: {}", url, e);
                Icon::default_icon()
            }
            Err(_) => {
                info!("Download of {} timed out after {:?}", url, max_time);
                Icon::default_icon()
            }
        }
    }

    /// Whether `url` already resolved successfully.
    pub fn is_cached(&self, url: &Url) -> bool {
        self.inner.remote.contains_key(url)
    }

    /// Path of a PNG rendering of `icon` at `size`, `mode` and `state`.
    ///
    /// The file is rendered and written the first time a path is requested and
    /// reused afterwards. If writing fails the path is still returned but left
    /// untracked, so the next call tries again.
    pub fn local_url(&self, icon: &Icon, size: Size, mode: IconMode, state: IconState) -> PathBuf {
        let path = self.inner.cache_dir.join(local_file_name(icon.cache_key(), size, mode, state));

        if self.inner.local.contains(&path) {
            return path;
        }

        self.inner.renders.fetch_add(1, Ordering::Relaxed);
        let rendered = icon.render(size, mode, state);
        match rendered.save_with_format(&path, image::ImageFormat::Png) {
            Ok(()) => {
                debug!("Rendered icon to {:?}", path);
                self.inner.local.insert(path.clone());
            }
            Err(e) => {
                warn!("Failed to write icon rendering {:?}: {}", path, e);
            }
        }
        path
    }

    pub fn stats(&self) -> IconCacheStats {
        IconCacheStats {
            remote_entries: self.inner.remote.len(),
            local_entries: self.inner.local.len(),
            fetches: self.inner.fetches.load(Ordering::Relaxed),
            renders: self.inner.renders.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for IconCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IconCache").field("cache_dir", &self.cache_dir()).finish()
    }
}

impl Default for IconCache {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

/// `{key}_{w}x{h}.png` for the plain rendering, with a mode/state suffix otherwise so
/// different renderings of one icon never share a file.
fn local_file_name(key: u64, size: Size, mode: IconMode, state: IconState) -> String {
    let base = format!("{}_{}x{}", key, size.width, size.height);
    match (mode, state) {
        (IconMode::Normal, IconState::Off) => format!("{}.png", base),
        _ => format!(
            "{}_{}_{}.png",
            base,
            format!("{:?}", mode).to_lowercase(),
            format!("{:?}", state).to_lowercase()
        ),
    }
}

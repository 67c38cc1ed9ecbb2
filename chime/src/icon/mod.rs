// Icon handling: the icon value type, remote download and on-disk renderings
pub mod cache;
pub mod fetch;
pub mod types;

pub use cache::{IconCache, IconCacheStats};
pub use fetch::{HttpIconFetcher, IconFetcher};
pub use types::{Icon, IconMode, IconSource, IconState, Size};

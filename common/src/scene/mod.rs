// Scene data: handler registry, TTL cache and built-in sources

pub mod cache;
pub mod http_source;
pub mod registry;

pub use cache::SceneDataCache;
pub use http_source::HttpJsonSource;
pub use registry::{DataSource, DataSourceRegistry};

pub mod arguments;
pub mod driver;
pub mod relayer_api;
pub mod strategy;
pub mod watcher;

pub mod api;
pub mod arguments;
pub mod coordinator;
pub mod store;

pub mod actions;
pub mod api;
pub mod bridge;
pub mod catalog;
pub mod channel;
pub mod help;
pub mod host;
pub mod locale;
pub mod net;
pub mod protocol;
pub mod settings;
pub mod snapshot;
pub mod store;
pub mod waiters;

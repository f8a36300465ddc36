//! Configuration management for ai-overlay
//!
//! - **document**: typed [`Config`] with built-in defaults and clamping
//! - **merge**: structural deep-merge of the user document onto the defaults
//! - **store**: create-if-absent, load, and the [`ConfigStore`] bundle
//! - **watcher**: debounced hot reload

pub mod document;
pub mod merge;
pub mod store;
pub mod watcher;

// Re-export commonly used types
pub use document::{ColorRole, Config, Corner, MonitorSelector, Offset};
pub use store::{ConfigStore, default_config_path};
pub use watcher::WatchHandle;

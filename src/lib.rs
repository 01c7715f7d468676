//! caddy-gen - Caddy configuration generated from Docker labels
//!
//! This library keeps a Caddyfile in sync with the containers on a shared
//! Docker network:
//! - Parses each container's `virtual.bind` label into site bindings
//! - Groups bindings by hostname set and renders a deterministic Caddyfile
//! - Rewrites the file only when its content changes
//! - Signals Caddy to reload via a local command or a container exec
//! - Follows container start/stop events with debounce and reconnect

pub mod config;
pub mod docker;
pub mod label;
pub mod notify;
pub mod output;
pub mod reconcile;
pub mod render;

/// Version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Package name from Cargo.toml
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

//! Seatwatch command-line tracker: portal client, Pushbullet notifier,
//! configuration and session persistence around the `seatwatch` core.

pub mod commands;
pub mod config;
pub mod notify;
pub mod output;
pub mod portal;
pub mod session_store;

pub use config::{resolve_config_path, Config, Overrides};
pub use notify::PushbulletNotifier;
pub use portal::{ClientOptions, PortalClient, PortalUrls};
pub use session_store::{SessionStore, StoredSession};

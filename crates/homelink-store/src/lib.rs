//! Local cache store for homelink.
//!
//! This crate provides the durable, string-keyed blob storage that keeps the
//! device, room and schedule collections available offline, along with the
//! configured controller URLs.
//!
//! # Example
//!
//! ```no_run
//! use homelink_store::{KeyValueStore, Store, keys};
//!
//! # async fn example() -> homelink_store::Result<()> {
//! let store = Store::open_default()?;
//! store.set(keys::SERVER_URL, "http://192.168.1.20:8080").await?;
//! let url = store.get(keys::SERVER_URL).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod kv;
mod memory;
mod schema;
mod store;

pub use error::{Error, Result};
pub use kv::{KeyValueStore, keys, load_json, save_json};
pub use memory::MemoryStore;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/homelink/cache.db`
/// - macOS: `~/Library/Application Support/homelink/cache.db`
/// - Windows: `C:\Users\<user>\AppData\Local\homelink\cache.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("homelink")
        .join("cache.db")
}

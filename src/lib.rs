//! syncmap_rs: a read-mostly concurrent map built from a lock-free snapshot and a
//! mutex-guarded overflow, plus a handful of small synchronization helpers.
//!
//! [`SyncMap`] lets readers of a stable key set proceed without touching a lock while
//! writers still get linearizable per-key updates. It suits caches, connection
//! registries and subscriber tables.
//!
//! ```
//! use syncmap_rs::SyncMap;
//!
//! let map = SyncMap::new();
//! map.store("a", 1);
//! assert_eq!(map.load("a"), Some(1));
//! assert_eq!(map.load_or_store("a", 2), (1, true));
//! map.delete("a");
//! assert_eq!(map.load("a"), None);
//! ```

mod atomic;
mod error;
mod map;
mod once_event;
mod ontime;
mod pool;
mod slot;
mod unbounded;

pub use atomic::AtomicDuration;
pub use error::{Error, Result};
pub use map::SyncMap;
pub use once_event::OnceEvent;
pub use ontime::Ontime;
pub use pool::{Pool, Reset};
pub use unbounded::Unbounded;

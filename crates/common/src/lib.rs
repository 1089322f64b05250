/**
 * In-memory mirror of one stored object:
 *  content buffer, cursor, and dirty tracking.
 */
pub mod blob;
/**
 * Presence detection and creation of the root directory.
 */
pub mod bootstrap;
/**
 * Filesystem calls, sequenced over the session
 *  so multi-object changes happen in a safe order.
 */
pub mod dispatch;
/**
 * Stable node identities.
 */
pub mod name;
/**
 * File and directory views over a blob.
 */
pub mod node;
/**
 * Open-node table and path resolution.
 */
pub mod session;
/**
 * Name-indexed persistence over a versioned mailbox,
 *  with a cache of each name's current version.
 */
pub mod store;
/**
 * Reclaims objects nothing links to.
 */
pub mod sweep;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::bootstrap::Presence;
    pub use crate::dispatch::{Attributes, Dispatcher, FsError};
    pub use crate::name::Name;
    pub use crate::node::NodeKind;
    pub use crate::session::Session;
    pub use crate::store::{CacheConfig, Mailbox, MemoryMailbox, ObjectStore, StoreError};
    pub use crate::sweep::SweepReport;
    pub use crate::version::build_info;
}

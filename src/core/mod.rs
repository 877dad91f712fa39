pub mod checksum;
pub mod engine;
pub mod entry;
pub mod scanner;
pub mod tracker;

pub use checksum::calculate_hash;
pub use engine::{SyncReport, Synchronizer};
pub use entry::{Entry, EntryKind};
pub use scanner::{EntryVisitor, RefreshChildren, TreeWalker, WalkStats};
pub use tracker::{IdentityTracker, ObserveIdentity, TrackedRecord};

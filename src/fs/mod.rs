//! Filesystem backends for the local store.

mod localfs;

pub use localfs::GuardedFs;

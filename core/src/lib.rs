//! Canvas room snapshots and their directory-tree layout.
//!
//! A repository holds one root `room-*` directory. Each room keeps a
//! `snapshot.json` alongside an unpacked view of the same content: metadata,
//! storage, one directory per widget, and link descriptors inside the child
//! rooms it points at.
//!
//! - [`unpack_tree`] expands every reachable room and prunes the rest.
//! - [`pack_tree`] rebuilds each room's snapshot from its directory.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod classify;
pub mod collect;
pub mod config;
pub mod error;
mod fsio;
pub mod graph;
pub mod layout;
pub mod model;
pub mod pack;
pub mod provision;
pub mod sync;
pub mod unpack;
pub mod walk;

pub use config::SyncConfig;
pub use error::ErrorCategory;
pub use error::Result;
pub use error::SyncError;
pub use model::Snapshot;
pub use pack::Packer;
pub use sync::PackReport;
pub use sync::UnpackReport;
pub use sync::pack_room;
pub use sync::pack_tree;
pub use sync::unpack_tree;
pub use unpack::Unpacker;

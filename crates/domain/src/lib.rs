//! Topology of the managed database clusters.
//!
//! Every entity is owned by value by its parent: a [`Topology`] owns the
//! [`MetaShard`] and the [`Cluster`]s, a [`Cluster`] owns its [`Shard`]s and
//! computer [`Node`]s, a [`Shard`] owns its [`Node`]s. Cross references (e.g.
//! the primary of a shard) are stored as identifiers and are invalidated by
//! the owner when the referenced entity is removed.
//!
//! This crate doesn't perform any I/O.

pub use {
    cluster::Cluster,
    machine::{Machine, PortFloors},
    meta::MetaShard,
    node::{Node, NodeId, NodeKind, Session},
    reconcile::{Diff, NodeDiff},
    shard::{HaMode, Shard, ShardId},
    topology::Topology,
};

pub mod cluster;
pub mod machine;
pub mod meta;
pub mod name;
pub mod node;
pub mod reconcile;
pub mod roster;
pub mod shard;
pub mod topology;

pub type ClusterId = u64;

//! Slab pool internals: slice headers, node arenas and the pool hot path.
//!
//! Layering, leaves first: a `Slice` is the intrusive header in front of
//! every payload; a `Node` is one system allocation carved into equal
//! slices; a `Pool` is a family of nodes serving one object size, threaded
//! into the pool tree.

pub(crate) mod node;
pub(crate) mod slab;
pub(crate) mod slice;

pub use self::slab::PoolStats;

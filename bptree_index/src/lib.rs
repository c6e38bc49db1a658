//! A B+-tree index engine over `page_store`, in two on-disk variants:
//!
//! - **standard**: one bucket per page, addressed by a bare page index.
//! - **bonsai**: many small bucket regions packed into a page, addressed
//!   by `(page_index, page_offset, binary_version)` and recycled through a
//!   free list and sub-page allocator instead of the page cache's own
//!   allocation.
//!
//! Both variants share the same slotted-bucket byte layout shape,
//! binary-search semantics (`bucket::raw::lower_bound`), and durability
//! adapter (`tree::run_atomic`); they differ in pointer representation and
//! in how bucket storage is obtained, so the tree engines themselves stay
//! concrete, parallel implementations rather than one generic one (see
//! `DESIGN.md`).

pub mod allocator;
pub mod bucket;
pub mod config;
pub mod error;
pub mod iterator;
pub mod key;
pub mod pointer;
pub mod ridbag;
pub mod system_bucket;
pub mod tree;
pub mod value;

pub use bucket::{BonsaiBucket, BonsaiEntry, StandardBucket, StandardEntry};
pub use config::BTreeConfig;
pub use error::{IndexError, IndexResult};
pub use key::{IndexKey, KeyType};
pub use pointer::{BonsaiPointer, StandardPointer};
pub use ridbag::{real_bag_size, Change};
pub use tree::{BonsaiBPlusTree, StandardBPlusTree};
pub use value::{decode_standard_value, encode_standard_value, RawValue, ValueLayout};

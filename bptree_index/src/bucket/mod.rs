pub mod bonsai;
pub mod raw;
pub mod standard;

pub use bonsai::{BonsaiBucket, BonsaiEntry};
pub use standard::{StandardBucket, StandardEntry};

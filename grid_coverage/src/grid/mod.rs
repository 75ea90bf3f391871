//! Grid index ranges.

pub mod extent;
pub(crate) mod intern;

pub use extent::GridExtent;

//! On-disk formats: packed tree nodes and the metadata sidecar.

pub mod meta;
pub mod node;

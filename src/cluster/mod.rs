//! Cluster access: storage object model, the accessor contract, and its
//! API-server and in-memory implementations.

pub mod accessor;
pub mod apiserver;
pub mod memory;
pub mod types;

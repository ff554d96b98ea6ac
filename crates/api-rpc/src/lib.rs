//! JSON-RPC API Layer
//!
//! Read-only introspection of a running scheduler: registered tasks, their
//! run-state and the cluster owner of each cluster-exclusive task.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};

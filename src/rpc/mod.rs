//! gRPC контракт с воркером заказов.

pub mod client;
pub mod server;

pub mod pb {
    tonic::include_proto!("inventory");
}

pub use client::{BackoffPolicy, CommitClient, CommitClientError, ConnectionState};
pub use server::InventoryGrpc;

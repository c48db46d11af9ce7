//! Core of an SSH-backed remote file manager: session reuse, shell command
//! execution, a cached view of remote directories kept fresh by polling,
//! and uploads/downloads with progress events.

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod transfer;
pub mod transport;

pub use browser::RemoteBrowser;
pub use cache::{DirectoryCache, RemoteFile};
pub use reconcile::ReconciliationLoop;
pub use session::SessionRegistry;
pub use transfer::TransferCoordinator;

//! Session registry and persistence

pub mod registry;
pub mod store;

pub use registry::{SessionHandle, SessionRegistry};
pub use store::{JsonSessionStore, MemorySessionStore, SessionStore};

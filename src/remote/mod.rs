//! Remote command execution and output parsing

pub mod command;
pub mod executor;
pub mod path;
pub mod permissions;
pub mod stat;

pub use executor::RemoteCommandExecutor;
pub use permissions::{Accessor, EntryType, PermissionTriple, Permissions};
pub use stat::RemoteFileInfo;

pub mod command;
pub mod endpoint;
pub mod error;
pub mod listing;
pub mod manager;
pub mod operations;
pub mod path;
pub mod registry;
pub mod result;
pub mod ssh;
pub mod staging;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use command::RemoteCommand;
pub use endpoint::{Credentials, EndpointKey};
pub use error::{FailureKind, FileOpError};
pub use listing::{DirRecord, EntryKind, PermissionSummary, RemoteFileEntry};
pub use manager::{Disconnected, FileManager};
pub use operations::{Operation, PermissionRequest};
pub use registry::{Release, Session, SessionRegistry};
pub use result::OperationResult;
pub use ssh::{SshConnector, SshTransport};
pub use staging::{StagedBuffer, StagingArea};
pub use transport::{CommandOutput, Connector, RemoteTransport, TransportError};

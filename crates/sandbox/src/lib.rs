//! # agentflow sandbox
//!
//! Runs model-authored code away from the host process. A script and its
//! bindings are snapshotted into one self-contained program, wrapped so its
//! locals and exceptions can be read back, and handed to a
//! [`SandboxBackend`]. [`SandboxExecutor`] turns whatever comes back into an
//! observation string plus the new bindings the script introduced.
//!
//! [`ProcessSandbox`] denies host filesystem and network access unless its
//! [`SandboxPolicy`] grants them.

pub mod backend;
pub mod confine;
pub mod executor;
pub mod policy;
pub mod process;
pub mod snapshot;
pub mod wrapper;

pub use backend::{SandboxBackend, SandboxError, SandboxResponse};
pub use executor::{NO_OUTPUT, SandboxExecutor, SandboxFault, SandboxOutcome};
pub use policy::{SandboxCapability, SandboxPolicy};
pub use process::{DEFAULT_MAX_OUTPUT_BYTES, ProcessSandbox};
pub use snapshot::{Binding, Bindings, SnapshotError};

//! What a sandboxed program may reach on the host.
//!
//! Programs run with no host filesystem and no network by default. Each
//! capability has to be granted explicitly. Without [`SandboxCapability::Fs`]
//! the interpreter can read its own installation (the `read_paths`) and
//! read/write its scratch directory, nothing else.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Host access a program can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxCapability {
    /// Unrestricted host filesystem.
    Fs,
    /// Socket creation.
    Net,
}

impl std::fmt::Display for SandboxCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxCapability::Fs => write!(f, "fs"),
            SandboxCapability::Net => write!(f, "net"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    #[serde(default)]
    pub allowed_capabilities: Vec<SandboxCapability>,

    /// Read-only paths the interpreter needs to start. Missing paths are skipped.
    #[serde(default = "default_read_paths")]
    pub read_paths: Vec<PathBuf>,
}

/// System locations a distribution-packaged interpreter loads from.
pub fn default_read_paths() -> Vec<PathBuf> {
    [
        "/usr",
        "/lib",
        "/lib32",
        "/lib64",
        "/bin",
        "/sbin",
        "/etc/ld.so.cache",
        "/etc/localtime",
        "/dev/null",
        "/dev/urandom",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allowed_capabilities: vec![],
            read_paths: default_read_paths(),
        }
    }
}

impl SandboxPolicy {
    /// Grant every capability. The program runs unconfined.
    pub fn permissive() -> Self {
        Self {
            allowed_capabilities: vec![SandboxCapability::Fs, SandboxCapability::Net],
            ..Default::default()
        }
    }

    pub fn allow(mut self, capability: SandboxCapability) -> Self {
        if !self.allows(capability) {
            self.allowed_capabilities.push(capability);
        }
        self
    }

    pub fn with_read_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.read_paths = paths;
        self
    }

    pub fn allows(&self, capability: SandboxCapability) -> bool {
        self.allowed_capabilities.contains(&capability)
    }

    /// Nothing is withheld, so no confinement needs to be applied.
    pub fn is_unconfined(&self) -> bool {
        self.allows(SandboxCapability::Fs) && self.allows(SandboxCapability::Net)
    }
}

//! Host confinement for interpreter processes.
//!
//! On Linux the child restricts itself between fork and exec:
//!
//! - a Landlock ruleset limits the filesystem to the policy's read-only
//!   paths plus the run's scratch directory;
//! - a seccomp filter makes `socket(2)` and `io_uring_setup(2)` fail with
//!   `EPERM`.
//!
//! Both are prepared in the parent so the child only issues the final
//! syscalls. If the kernel cannot enforce what the policy withholds, the run
//! is refused rather than started unconfined. Other platforms only run
//! programs whose policy grants everything.

#[cfg(not(target_os = "linux"))]
use std::path::Path;

#[cfg(not(target_os = "linux"))]
use tokio::process::Command;

#[cfg(not(target_os = "linux"))]
use crate::{backend::SandboxError, policy::SandboxPolicy};

#[cfg(target_os = "linux")]
pub use linux::available;

#[cfg(target_os = "linux")]
pub(crate) use linux::apply;

#[cfg(not(target_os = "linux"))]
pub fn available() -> bool {
    false
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn apply(
    _cmd: &mut Command,
    policy: &SandboxPolicy,
    _workdir: &Path,
) -> Result<(), SandboxError> {
    if policy.is_unconfined() {
        return Ok(());
    }
    Err(SandboxError::Confinement(
        "host confinement requires Linux; grant fs and net to run unconfined".into(),
    ))
}

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::BTreeMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use landlock::{
        ABI, Access, AccessFs, CompatLevel, Compatible, Ruleset, RulesetAttr, RulesetCreated,
        RulesetCreatedAttr, RulesetStatus, path_beneath_rules,
    };
    use seccompiler::{BpfProgram, SeccompAction, SeccompFilter, TargetArch};
    use tokio::process::Command;
    use tracing::debug;

    use crate::backend::SandboxError;
    use crate::policy::{SandboxCapability, SandboxPolicy};

    /// Lowest Landlock ABI accepted: V3 is the first that also governs truncation.
    const LANDLOCK_ABI: ABI = ABI::V3;

    /// Whether this kernel can enforce filesystem confinement.
    pub fn available() -> bool {
        Ruleset::default()
            .set_compatibility(CompatLevel::HardRequirement)
            .handle_access(AccessFs::from_all(LANDLOCK_ABI))
            .and_then(|ruleset| ruleset.create())
            .is_ok()
    }

    pub(crate) fn apply(
        cmd: &mut Command,
        policy: &SandboxPolicy,
        workdir: &Path,
    ) -> Result<(), SandboxError> {
        if policy.is_unconfined() {
            return Ok(());
        }

        let filesystem = if policy.allows(SandboxCapability::Fs) {
            None
        } else {
            Some(filesystem_ruleset(&policy.read_paths, workdir)?)
        };
        let network = if policy.allows(SandboxCapability::Net) {
            None
        } else {
            Some(network_filter()?)
        };
        debug!(
            filesystem = filesystem.is_some(),
            network = network.is_some(),
            "Confining sandbox process"
        );

        let confine_fs = filesystem.is_some();
        let filesystem = Mutex::new(filesystem);

        // SAFETY: the closure runs in the forked child before exec. It takes
        // state prepared by the parent and only issues prctl, landlock and
        // seccomp syscalls; nothing allocates unless a step fails.
        unsafe {
            cmd.pre_exec(move || {
                let ruleset = match filesystem.lock() {
                    Ok(mut slot) => slot.take(),
                    Err(_) => return Err(io::Error::other("confinement state unavailable")),
                };
                match ruleset {
                    Some(ruleset) => {
                        let status = ruleset
                            .restrict_self()
                            .map_err(|e| io::Error::other(e.to_string()))?;
                        if status.ruleset != RulesetStatus::FullyEnforced {
                            return Err(io::Error::other("filesystem confinement not enforced"));
                        }
                    }
                    None if confine_fs => {
                        return Err(io::Error::other("filesystem confinement already consumed"));
                    }
                    None => {}
                }
                if let Some(program) = &network {
                    seccompiler::apply_filter(program)
                        .map_err(|e| io::Error::other(e.to_string()))?;
                }
                Ok(())
            });
        }
        Ok(())
    }

    fn filesystem_ruleset(
        read_paths: &[PathBuf],
        workdir: &Path,
    ) -> Result<RulesetCreated, SandboxError> {
        let readable: Vec<&PathBuf> = read_paths.iter().filter(|p| p.exists()).collect();
        Ruleset::default()
            .set_compatibility(CompatLevel::HardRequirement)
            .handle_access(AccessFs::from_all(LANDLOCK_ABI))
            .and_then(|ruleset| ruleset.create())
            .and_then(|ruleset| {
                ruleset.add_rules(path_beneath_rules(&readable, AccessFs::from_read(LANDLOCK_ABI)))
            })
            .and_then(|ruleset| {
                ruleset.add_rules(path_beneath_rules([workdir], AccessFs::from_all(LANDLOCK_ABI)))
            })
            .map_err(|e| SandboxError::Confinement(e.to_string()))
    }

    fn network_filter() -> Result<BpfProgram, SandboxError> {
        let arch = TryInto::<TargetArch>::try_into(std::env::consts::ARCH)
            .map_err(|e| SandboxError::Confinement(e.to_string()))?;

        // An empty rule list matches the syscall unconditionally.
        let denied = BTreeMap::from([
            (libc::SYS_socket, vec![]),
            (libc::SYS_io_uring_setup, vec![]),
        ]);
        let filter = SeccompFilter::new(
            denied,
            SeccompAction::Allow,
            SeccompAction::Errno(libc::EPERM as u32),
            arch,
        )
        .map_err(|e| SandboxError::Confinement(e.to_string()))?;

        TryInto::<BpfProgram>::try_into(filter)
            .map_err(|e| SandboxError::Confinement(e.to_string()))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn network_filter_compiles_for_this_arch() {
            let program = network_filter().unwrap();
            assert!(!program.is_empty());
        }

        #[test]
        fn ruleset_builds_when_kernel_supports_it() {
            if !available() {
                return;
            }
            let workdir = tempfile::tempdir().unwrap();
            let paths = vec![PathBuf::from("/usr"), PathBuf::from("/agentflow-missing")];
            assert!(filesystem_ruleset(&paths, workdir.path()).is_ok());
        }
    }
}

//! Task-root and runtime-identity checks.
//!
//! The engine must run under an unprivileged identity that owns the task
//! output root, and the root must be closed to everyone else (mode 0700).
//! Dropping privileges itself is the service manager's job.

use std::fs::DirBuilder;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::Path;

use anyhow::{bail, Context, Result};
use nix::unistd::{getgid, getuid, User};
use tracing::info;

/// Ensures the task root exists with mode 0700 and is owned by the current
/// identity; creates it when absent.
pub fn validate_task_root(task_root: &Path) -> Result<()> {
    let metadata = match std::fs::metadata(task_root) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(task_root)
                .with_context(|| {
                    format!("cannot create task directory {}", task_root.display())
                })?;
            info!(path = %task_root.display(), "created task directory");
            std::fs::metadata(task_root)
                .with_context(|| format!("failed to stat {}", task_root.display()))?
        }
        Err(error) => {
            return Err(error).with_context(|| {
                format!("cannot access task directory {}", task_root.display())
            });
        }
    };

    if !metadata.is_dir() {
        bail!(
            "task directory path {} exists but is not a directory",
            task_root.display()
        );
    }

    let current_uid = getuid().as_raw();
    let current_gid = getgid().as_raw();
    if metadata.uid() != current_uid {
        bail!(
            "task directory {} is owned by UID {}, but the process runs as UID {}",
            task_root.display(),
            metadata.uid(),
            current_uid
        );
    }
    if metadata.gid() != current_gid {
        bail!(
            "task directory {} is owned by GID {}, but the process runs as GID {}",
            task_root.display(),
            metadata.gid(),
            current_gid
        );
    }

    let mode = metadata.permissions().mode() & 0o777;
    if mode != 0o700 {
        bail!(
            "task directory {} has permissions {:o}, but must be 700",
            task_root.display(),
            mode
        );
    }

    info!(
        path = %task_root.display(),
        uid = current_uid,
        gid = current_gid,
        "task directory validated"
    );
    Ok(())
}

/// Confirms the process already runs as the configured execution identity.
pub fn ensure_exec_user(exec_user: &str) -> Result<()> {
    let current_uid = getuid();
    if current_uid.is_root() {
        bail!(
            "refusing to run as root: start the service as user '{exec_user}' \
             (privilege dropping is the service manager's responsibility)"
        );
    }

    let target = User::from_name(exec_user)
        .with_context(|| format!("user lookup failed for '{exec_user}'"))?
        .with_context(|| format!("unknown user '{exec_user}'"))?;
    if target.uid != current_uid {
        bail!(
            "process runs as UID {}, but exec user '{}' is UID {}",
            current_uid,
            exec_user,
            target.uid
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functional_validate_task_root_creates_missing_directory_with_0700() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("tasks");
        validate_task_root(&root).expect("create and validate");
        let mode = std::fs::metadata(&root)
            .expect("stat")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn unit_validate_task_root_rejects_open_permissions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("tasks");
        std::fs::create_dir(&root).expect("create");
        std::fs::set_permissions(&root, std::fs::Permissions::from_mode(0o755))
            .expect("chmod");
        let error = validate_task_root(&root).expect_err("permissive mode");
        assert!(error.to_string().contains("must be 700"));
    }

    #[test]
    fn unit_validate_task_root_rejects_plain_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("tasks");
        std::fs::write(&root, "not a directory").expect("write file");
        let error = validate_task_root(&root).expect_err("file in the way");
        assert!(error.to_string().contains("not a directory"));
    }

    #[test]
    fn functional_ensure_exec_user_accepts_current_identity() {
        if getuid().is_root() {
            return;
        }
        let current = User::from_uid(getuid())
            .expect("uid lookup")
            .expect("current user");
        ensure_exec_user(&current.name).expect("own identity accepted");
    }

    #[test]
    fn unit_ensure_exec_user_rejects_unknown_user() {
        if getuid().is_root() {
            return;
        }
        let error =
            ensure_exec_user("taskview-no-such-user-xyz").expect_err("unknown user");
        assert!(error.to_string().contains("taskview-no-such-user-xyz"));
    }

    #[test]
    fn unit_ensure_exec_user_refuses_root() {
        if !getuid().is_root() {
            return;
        }
        let error = ensure_exec_user("www-data").expect_err("root refused");
        assert!(error.to_string().contains("refusing to run as root"));
    }
}

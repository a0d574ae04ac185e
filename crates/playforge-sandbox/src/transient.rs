//! Scoped ownership of the on-disk copy of an artifact.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::SandboxResult;

const ARTIFACT_FILE: &str = "playbook.yml";

/// A private directory (0700) holding exactly one artifact file.
///
/// Removal happens in [`TransientArtifact::close`] on normal paths and in
/// `Drop` when the owning future is cancelled or unwinds.
pub(crate) struct TransientArtifact {
    dir: TempDir,
    file: PathBuf,
}

impl TransientArtifact {
    pub(crate) fn write(scratch_root: &Path, payload: &str) -> SandboxResult<Self> {
        std::fs::create_dir_all(scratch_root)?;
        let dir = tempfile::Builder::new()
            .prefix("playforge-")
            .rand_bytes(12)
            .tempdir_in(scratch_root)?;
        let file = dir.path().join(ARTIFACT_FILE);
        std::fs::write(&file, payload.as_bytes())?;

        // Container users other than root must be able to read the bind mount;
        // the 0700 parent keeps other host users out.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644))?;
        }

        Ok(Self { dir, file })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.file
    }

    /// Remove the artifact, logging (not failing) if removal goes wrong.
    pub(crate) fn close(self, checker: &str) {
        let dir = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(
                event = "sandbox.cleanup_failed",
                checker = %checker,
                path = %dir.display(),
                error = %e,
            );
        }
    }
}

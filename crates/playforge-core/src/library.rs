//! On-disk playbook library.
//!
//! Playbooks live in `<data_dir>/playbooks/` as
//! `<YYYYmmdd_HHMMSS>_<sanitized description>.yml`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{artifact_digest, LibraryError};

const PLAYBOOK_DIR: &str = "playbooks";
const PLAYBOOK_EXT: &str = "yml";
const MAX_NAME_CHARS: usize = 100;

/// Listing entry for one saved playbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookMetadata {
    pub filename: String,
    pub created_at: DateTime<Utc>,
    /// Recovered from the filename.
    pub description: String,
    pub size_bytes: u64,
    pub digest: String,
}

/// Keep word characters, whitespace and hyphens; spaces become underscores.
pub fn sanitize_filename(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .map(|c| if c == ' ' { '_' } else { c })
        .take(MAX_NAME_CHARS)
        .collect()
}

pub struct PlaybookLibrary {
    dir: PathBuf,
}

impl PlaybookLibrary {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join(PLAYBOOK_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `yaml`; returns the path written.
    pub fn save(&self, yaml: &str, description: &str) -> Result<PathBuf, LibraryError> {
        std::fs::create_dir_all(&self.dir)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let mut stem = sanitize_filename(description);
        if stem.trim_matches('_').trim().is_empty() {
            stem = "playbook".to_string();
        }

        let mut path = self.dir.join(format!("{timestamp}_{stem}.{PLAYBOOK_EXT}"));
        let mut n = 2;
        while path.exists() {
            path = self
                .dir
                .join(format!("{timestamp}_{stem}-{n}.{PLAYBOOK_EXT}"));
            n += 1;
        }

        std::fs::write(&path, yaml)?;
        info!(path = %path.display(), bytes = yaml.len(), "playbook saved");
        Ok(path)
    }

    /// Saved playbooks, newest first.
    pub fn list(&self) -> Result<Vec<PlaybookMetadata>, LibraryError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(PLAYBOOK_EXT))
            .collect();
        // Timestamp prefix makes name order creation order.
        paths.sort_unstable_by(|a, b| b.cmp(a));

        let mut playbooks = Vec::with_capacity(paths.len());
        for path in paths {
            let meta = std::fs::metadata(&path)?;
            let content = std::fs::read_to_string(&path)?;
            let filename = file_name(&path);
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();

            playbooks.push(PlaybookMetadata {
                description: description_from_stem(stem),
                created_at: meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
                size_bytes: meta.len(),
                digest: artifact_digest(&content),
                filename,
            });
        }
        Ok(playbooks)
    }

    pub fn load(&self, name: &str) -> Result<String, LibraryError> {
        let path = self.candidate(name)?;
        if !path.exists() {
            return Err(LibraryError::NotFound(name.to_string()));
        }
        self.ensure_contained(name, &path)?;
        Ok(std::fs::read_to_string(path)?)
    }

    /// Remove a playbook; `Ok(false)` when there was nothing to remove.
    pub fn delete(&self, name: &str) -> Result<bool, LibraryError> {
        let path = self.candidate(name)?;
        if !path.exists() {
            debug!(name, "delete requested for missing playbook");
            return Ok(false);
        }
        self.ensure_contained(name, &path)?;
        std::fs::remove_file(&path)?;
        info!(path = %path.display(), "playbook deleted");
        Ok(true)
    }

    fn candidate(&self, name: &str) -> Result<PathBuf, LibraryError> {
        if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(LibraryError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Symlinks may still point outside; compare resolved paths.
    fn ensure_contained(&self, name: &str, path: &Path) -> Result<(), LibraryError> {
        let root = self.dir.canonicalize()?;
        let resolved = path.canonicalize()?;
        if resolved.starts_with(&root) {
            Ok(())
        } else {
            Err(LibraryError::PathTraversal(name.to_string()))
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `20250101_120000_Deploy_Redis` -> `Deploy Redis`.
fn description_from_stem(stem: &str) -> String {
    let parts: Vec<&str> = stem.splitn(3, '_').collect();
    let description = if parts.len() == 3 { parts[2] } else { stem };
    description.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Deploy Redis"), "Deploy_Redis");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename("nginx: 3 replicas!"), "nginx_3_replicas");
        assert_eq!(sanitize_filename("my-app_v2"), "my-app_v2");
        assert_eq!(sanitize_filename(&"a".repeat(250)).len(), 100);
    }

    #[test]
    fn test_description_from_stem() {
        assert_eq!(description_from_stem("20250101_120000_Deploy_Redis"), "Deploy Redis");
        assert_eq!(description_from_stem("handwritten"), "handwritten");
    }

    #[test]
    fn test_save_list_load_delete() {
        let data = tempfile::tempdir().unwrap();
        let library = PlaybookLibrary::new(data.path());

        let path = library.save("---\n- hosts: localhost\n", "Deploy Redis").unwrap();
        let name = file_name(&path);
        assert!(name.ends_with("_Deploy_Redis.yml"));

        let listed = library.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].description, "Deploy Redis");
        assert_eq!(listed[0].size_bytes, 23);
        assert_eq!(listed[0].digest, artifact_digest("---\n- hosts: localhost\n"));

        assert_eq!(library.load(&name).unwrap(), "---\n- hosts: localhost\n");
        assert!(library.delete(&name).unwrap());
        assert!(!library.delete(&name).unwrap());
        assert!(library.list().unwrap().is_empty());
    }

    #[test]
    fn test_same_second_saves_do_not_collide() {
        let data = tempfile::tempdir().unwrap();
        let library = PlaybookLibrary::new(data.path());
        let a = library.save("a: 1", "same").unwrap();
        let b = library.save("b: 2", "same").unwrap();
        assert_ne!(a, b);
        assert_eq!(library.list().unwrap().len(), 2);
    }

    #[test]
    fn test_list_is_newest_first() {
        let data = tempfile::tempdir().unwrap();
        let library = PlaybookLibrary::new(data.path());
        std::fs::create_dir_all(library.dir()).unwrap();
        std::fs::write(library.dir().join("20240101_000000_old.yml"), "a").unwrap();
        std::fs::write(library.dir().join("20250101_000000_new.yml"), "b").unwrap();
        std::fs::write(library.dir().join("notes.txt"), "ignored").unwrap();

        let names: Vec<String> = library.list().unwrap().into_iter().map(|m| m.filename).collect();
        assert_eq!(names, ["20250101_000000_new.yml", "20240101_000000_old.yml"]);
    }

    #[test]
    fn test_missing_dir_lists_empty() {
        let data = tempfile::tempdir().unwrap();
        assert!(PlaybookLibrary::new(data.path().join("nope")).list().unwrap().is_empty());
    }

    #[test]
    fn test_traversal_names_rejected() {
        let data = tempfile::tempdir().unwrap();
        let library = PlaybookLibrary::new(data.path());
        for name in ["../secret.yml", "a/b.yml", "a\\b.yml", "..", ""] {
            assert!(
                matches!(library.load(name), Err(LibraryError::InvalidName(_))),
                "{name:?} accepted"
            );
            assert!(matches!(library.delete(name), Err(LibraryError::InvalidName(_))));
        }
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let data = tempfile::tempdir().unwrap();
        let library = PlaybookLibrary::new(data.path());
        assert!(matches!(
            library.load("20250101_000000_x.yml"),
            Err(LibraryError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let data = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let secret = outside.path().join("secret.yml");
        std::fs::write(&secret, "token: abc").unwrap();

        let library = PlaybookLibrary::new(data.path());
        std::fs::create_dir_all(library.dir()).unwrap();
        std::os::unix::fs::symlink(&secret, library.dir().join("link.yml")).unwrap();

        assert!(matches!(
            library.load("link.yml"),
            Err(LibraryError::PathTraversal(_))
        ));
        assert!(secret.exists());
    }
}

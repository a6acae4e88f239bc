//! Job workspace: one isolated directory per document.
//!
//! ```text
//! <root>/<uuid>/
//! ├── source.pdf        uploaded or copied input
//! ├── pages.json        page-text store
//! ├── artifacts/        page_<n>.png, preproc_<n>.png
//! ├── pages/            Page_<n>.png (rendered)
//! └── handwritten.pdf   output
//! ```
//!
//! Every path a job hands out lives under its own UUID directory, so two
//! jobs never read or write each other's files.

use crate::error::Pdf2HandError;
use crate::store::write_atomic;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: Uuid,
    dir: PathBuf,
}

impl Job {
    /// Create a fresh job directory under `root`.
    pub fn create(root: impl AsRef<Path>) -> Result<Self, Pdf2HandError> {
        let id = Uuid::new_v4();
        let dir = root.as_ref().join(id.to_string());
        let job = Self { id, dir };

        for d in [job.dir.clone(), job.artifacts_dir(), job.pages_dir()] {
            std::fs::create_dir_all(&d).map_err(|e| Pdf2HandError::JobWorkspace {
                path: d.clone(),
                detail: e.to_string(),
            })?;
        }
        info!("Created job {} in {}", job.id, job.dir.display());
        Ok(job)
    }

    /// Reopen an existing job.
    pub fn open(root: impl AsRef<Path>, id: &str) -> Result<Self, Pdf2HandError> {
        let id = Uuid::parse_str(id).map_err(|e| Pdf2HandError::InvalidInput {
            input: id.to_string(),
            reason: format!("not a job id: {e}"),
        })?;
        let dir = root.as_ref().join(id.to_string());
        if !dir.is_dir() {
            return Err(Pdf2HandError::JobWorkspace {
                path: dir,
                detail: "no such job".to_string(),
            });
        }
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_pdf(&self) -> PathBuf {
        self.dir.join("source.pdf")
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.join("pages.json")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.join("artifacts")
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.dir.join("pages")
    }

    pub fn output_pdf(&self) -> PathBuf {
        self.dir.join("handwritten.pdf")
    }

    /// Store the source document in the workspace, replacing any previous one.
    pub fn import_source(&self, bytes: &[u8]) -> Result<PathBuf, Pdf2HandError> {
        let path = self.source_pdf();
        write_atomic(&path, bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_lays_out_directories() {
        let root = TempDir::new().unwrap();
        let job = Job::create(root.path()).unwrap();

        assert!(job.dir().starts_with(root.path()));
        assert!(job.artifacts_dir().is_dir());
        assert!(job.pages_dir().is_dir());
        assert_eq!(job.store_path().parent(), Some(job.dir()));
    }

    #[test]
    fn jobs_never_share_paths() {
        let root = TempDir::new().unwrap();
        let a = Job::create(root.path()).unwrap();
        let b = Job::create(root.path()).unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.store_path(), b.store_path());
        assert_ne!(a.output_pdf(), b.output_pdf());
    }

    #[test]
    fn open_round_trips_and_rejects_unknown() {
        let root = TempDir::new().unwrap();
        let job = Job::create(root.path()).unwrap();
        let reopened = Job::open(root.path(), &job.id().to_string()).unwrap();
        assert_eq!(reopened, job);

        let missing = Uuid::new_v4().to_string();
        assert!(matches!(
            Job::open(root.path(), &missing),
            Err(Pdf2HandError::JobWorkspace { .. })
        ));
        assert!(matches!(
            Job::open(root.path(), "not-a-uuid"),
            Err(Pdf2HandError::InvalidInput { .. })
        ));
    }

    #[test]
    fn import_source_writes_into_job() {
        let root = TempDir::new().unwrap();
        let job = Job::create(root.path()).unwrap();
        let path = job.import_source(b"%PDF-1.7\n").unwrap();
        assert_eq!(path, job.source_pdf());
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.7\n");
    }
}

//! Local directory holding one PDF per poster.

use std::path::{Path, PathBuf};

use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

const PDF_EXTENSION: &str = "pdf";

#[derive(Debug)]
pub struct PdfArtifacts {
    root: PathBuf,
}

impl PdfArtifacts {
    /// Open the artifact directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{id}.{PDF_EXTENSION}"))
    }

    /// Poster id encoded in an artifact file name.
    pub fn id_of(path: &Path) -> Option<Uuid> {
        if path.extension().and_then(|ext| ext.to_str()) != Some(PDF_EXTENSION) {
            return None;
        }
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| Uuid::parse_str(stem).ok())
    }

    /// Replace the artifact of `id` with `contents`.
    pub async fn write(&self, id: Uuid, contents: &[u8]) -> Result<PathBuf, std::io::Error> {
        let path = self.path_for(id);
        let mut file = fs::File::create(&path).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        Ok(path)
    }

    /// Remove the local copies of `ids`. Missing files are ignored.
    pub async fn remove_files(&self, ids: &[Uuid]) {
        for id in ids {
            let path = self.path_for(*id);
            match fs::remove_file(&path).await {
                Ok(()) => debug!(
                    target = "infra::artifacts",
                    path = %path.display(),
                    "removed local artifact"
                ),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => debug!(
                    target = "infra::artifacts",
                    path = %path.display(),
                    error = %err,
                    "failed to remove local artifact"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_lands_under_poster_id() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = PdfArtifacts::new(dir.path().join("output")).unwrap();
        let id = Uuid::new_v4();

        let path = artifacts.write(id, b"%PDF-1.4").await.unwrap();

        assert_eq!(path, dir.path().join("output").join(format!("{id}.pdf")));
        assert_eq!(PdfArtifacts::id_of(&path), Some(id));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn remove_files_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = PdfArtifacts::new(dir.path().to_path_buf()).unwrap();
        let kept = Uuid::new_v4();
        let path = artifacts.write(kept, b"x").await.unwrap();

        artifacts.remove_files(&[Uuid::new_v4(), kept]).await;

        assert!(!path.exists());
    }

    #[test]
    fn id_of_rejects_foreign_names() {
        assert_eq!(PdfArtifacts::id_of(Path::new("notes.txt")), None);
        assert_eq!(PdfArtifacts::id_of(Path::new("poster.pdf")), None);
    }
}

//! Per-run working directories.
//!
//! Each run gets a fresh directory under the download root (incoming archive
//! plus its extracted contents) and one under the output root (converted
//! images plus the output archive and its parts). Both are removed when the
//! [`RunWorkspace`] is dropped, whatever happened in between.

use std::{
    fs,
    path::{Path, PathBuf},
};

use {
    tempfile::{Builder, TempDir},
    tracing::debug,
    uuid::Uuid,
};

use crate::{Error, Result};

const EXTRACTED_DIR: &str = "extracted";
const CONVERTED_DIR: &str = "converted_png";
const FALLBACK_DOWNLOAD_NAME: &str = "upload.zip";

/// Create the download and output roots if they do not exist yet.
pub fn ensure_roots(download_root: &Path, output_root: &Path) -> Result<()> {
    for root in [download_root, output_root] {
        fs::create_dir_all(root).map_err(|e| Error::io_at("create", root, e))?;
    }
    Ok(())
}

/// Scoped directories owned by a single pipeline run.
#[derive(Debug)]
pub struct RunWorkspace {
    id: Uuid,
    inbox: TempDir,
    outbox: TempDir,
}

impl RunWorkspace {
    /// Allocate fresh run directories under the two roots.
    pub fn create(download_root: &Path, output_root: &Path) -> Result<Self> {
        let id = Uuid::new_v4();
        let prefix = format!("run-{id}-");
        let inbox = Builder::new()
            .prefix(&prefix)
            .tempdir_in(download_root)
            .map_err(|e| Error::io_at("create run directory in", download_root, e))?;
        let outbox = Builder::new()
            .prefix(&prefix)
            .tempdir_in(output_root)
            .map_err(|e| Error::io_at("create run directory in", output_root, e))?;

        debug!(
            run_id = %id,
            inbox = %inbox.path().display(),
            outbox = %outbox.path().display(),
            "run workspace created"
        );
        Ok(Self { id, inbox, outbox })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Where the incoming archive is stored. Only the final path component
    /// of `file_name` is used.
    #[must_use]
    pub fn download_path(&self, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .filter(|n| !n.is_empty())
            .map_or_else(|| FALLBACK_DOWNLOAD_NAME.into(), |n| n.to_os_string());
        self.inbox.path().join(name)
    }

    #[must_use]
    pub fn extract_dir(&self) -> PathBuf {
        self.inbox.path().join(EXTRACTED_DIR)
    }

    #[must_use]
    pub fn converted_dir(&self) -> PathBuf {
        self.outbox.path().join(CONVERTED_DIR)
    }

    /// Base path (without extension) for an output archive called `name`.
    #[must_use]
    pub fn output_base(&self, name: &str) -> PathBuf {
        self.outbox.path().join(name)
    }

    /// Every directory this run owns.
    #[must_use]
    pub fn roots(&self) -> [&Path; 2] {
        [self.inbox.path(), self.outbox.path()]
    }

    /// Remove the run directories now, reporting any failure.
    pub fn close(self) -> Result<()> {
        let Self { id, inbox, outbox } = self;
        let inbox_path = inbox.path().to_path_buf();
        let outbox_path = outbox.path().to_path_buf();
        let inbox_result = inbox
            .close()
            .map_err(|e| Error::io_at("remove", &inbox_path, e));
        let outbox_result = outbox
            .close()
            .map_err(|e| Error::io_at("remove", &outbox_path, e));
        debug!(run_id = %id, "run workspace removed");
        inbox_result.and(outbox_result)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> (TempDir, PathBuf, PathBuf) {
        let base = tempfile::tempdir().unwrap();
        let downloads = base.path().join("downloads");
        let converted = base.path().join("converted");
        ensure_roots(&downloads, &converted).unwrap();
        (base, downloads, converted)
    }

    #[test]
    fn runs_get_distinct_directories() {
        let (_base, downloads, converted) = roots();
        let a = RunWorkspace::create(&downloads, &converted).unwrap();
        let b = RunWorkspace::create(&downloads, &converted).unwrap();

        assert_ne!(a.id(), b.id());
        assert_ne!(a.download_path("x.zip"), b.download_path("x.zip"));
        assert_ne!(a.converted_dir(), b.converted_dir());
        assert!(a.download_path("x.zip").starts_with(&downloads));
        assert!(a.converted_dir().starts_with(&converted));
    }

    #[test]
    fn drop_removes_everything() {
        let (_base, downloads, converted) = roots();
        let (download, extracted, png_dir) = {
            let ws = RunWorkspace::create(&downloads, &converted).unwrap();
            let download = ws.download_path("photos.zip");
            fs::write(&download, b"zip").unwrap();
            fs::create_dir_all(ws.extract_dir()).unwrap();
            fs::create_dir_all(ws.converted_dir()).unwrap();
            (download, ws.extract_dir(), ws.converted_dir())
        };

        assert!(!download.exists());
        assert!(!extracted.exists());
        assert!(!png_dir.exists());
        assert_eq!(fs::read_dir(&downloads).unwrap().count(), 0);
        assert_eq!(fs::read_dir(&converted).unwrap().count(), 0);
    }

    #[test]
    fn close_removes_everything() {
        let (_base, downloads, converted) = roots();
        let ws = RunWorkspace::create(&downloads, &converted).unwrap();
        fs::write(ws.output_base("out.zip"), b"zip").unwrap();
        let dirs: Vec<PathBuf> = ws.roots().iter().map(|p| p.to_path_buf()).collect();

        ws.close().unwrap();

        assert!(dirs.iter().all(|d| !d.exists()));
    }

    #[test]
    fn download_path_drops_directories_from_file_name() {
        let (_base, downloads, converted) = roots();
        let ws = RunWorkspace::create(&downloads, &converted).unwrap();

        assert_eq!(
            ws.download_path("../../etc/evil.zip").file_name().unwrap(),
            "evil.zip"
        );
        assert!(ws.download_path("../../etc/evil.zip").starts_with(ws.roots()[0]));
        assert_eq!(ws.download_path("").file_name().unwrap(), "upload.zip");
    }
}

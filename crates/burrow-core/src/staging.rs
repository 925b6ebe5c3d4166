use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs::File;

#[derive(Clone, Debug, Default)]
pub struct StagingArea {
    dir: Option<PathBuf>,
}

impl StagingArea {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn buffer(&self) -> io::Result<StagedBuffer> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("burrow-").suffix(".stage");
        let file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(StagedBuffer { file })
    }
}

/// A staging file that is unlinked when dropped, whatever path the caller
/// leaves through.
pub struct StagedBuffer {
    file: NamedTempFile,
}

impl StagedBuffer {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn writer(&self) -> io::Result<File> {
        Ok(File::from_std(self.file.reopen()?))
    }

    pub fn reader(&self) -> io::Result<File> {
        Ok(File::from_std(self.file.reopen()?))
    }

    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}

//! Sorted runs persisted to temporary files.
//!
//! A run file is a sequence of frames, one per page written:
//!
//! ```text
//! +-------------+-------------+------------------------------+
//! | payload u32 | tuples u32  | serialized tuples (payload)  |
//! +-------------+-------------+------------------------------+
//! ```
//!
//! Both header fields are little endian. Runs are written once, then read
//! sequentially from the start and deleted.

use std::{
    io::{self, Read, Seek, Write},
    path::{Path, PathBuf},
};

use super::{io::FileOperations, page::Page};
use crate::{
    db::{DatabaseError, Schema},
    error,
};

/// Directory under the work directory holding every run file.
pub(crate) const RUN_DIR: &str = "mergedb.temp";

/// Private file name space of a single sort instance.
///
/// Run `(pass, index)` of the namespace lives at
/// `work_dir/mergedb.temp/{token}.pass{pass}.run{index}`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunNamespace {
    work_dir: PathBuf,
    token: String,
}

#[derive(Debug)]
pub(crate) struct Run<File: FileOperations> {
    path: PathBuf,
    file: Option<File>,
    pages: usize,
    tuples: usize,
}

/// Forward-only reader over a finished [`Run`], which it owns.
#[derive(Debug)]
pub(crate) struct RunReader<File: FileOperations> {
    run: Run<File>,
    exhausted: bool,
}

impl RunNamespace {
    pub fn new(work_dir: &Path, token: String) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            token,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn path_of(&self, pass: usize, index: usize) -> PathBuf {
        self.work_dir
            .join(RUN_DIR)
            .join(format!("{}.pass{pass}.run{index}", self.token))
    }
}

impl<File: FileOperations> Run<File> {
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn tuples(&self) -> usize {
        self.tuples
    }

    /// Deletes the run file right away, reporting failures.
    pub fn discard(mut self) -> io::Result<()> {
        self.delete()
    }

    fn delete(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            drop(file);
            File::delete(&self.path)?;
        }

        Ok(())
    }
}

impl<File: FileOperations + Read + Write + Seek> Run<File> {
    pub fn create(namespace: &RunNamespace, pass: usize, index: usize) -> io::Result<Self> {
        let path = namespace.path_of(pass, index);
        let file = File::create(&path)?;

        Ok(Self {
            path,
            file: Some(file),
            pages: 0,
            tuples: 0,
        })
    }

    /// Appends `page` as the next frame. Empty pages are skipped.
    pub fn append(&mut self, page: &Page, schema: &Schema) -> Result<(), DatabaseError> {
        if page.is_empty() {
            return Ok(());
        }

        page.write_to(schema, self.file_mut()?)?;
        self.pages += 1;
        self.tuples += page.len();

        Ok(())
    }

    /// Finishes writing and rewinds the run for reading.
    pub fn reader(mut self) -> io::Result<RunReader<File>> {
        let file = self.file_mut()?;
        file.flush()?;
        file.rewind()?;
        file.advise_sequential()?;

        Ok(RunReader {
            run: self,
            exhausted: false,
        })
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("run {} was deleted", self.path.display())))
    }
}

impl<File: FileOperations + Read + Write + Seek> RunReader<File> {
    /// Loads the next page of the run into `page`, `false` once every page was read.
    pub fn fill(&mut self, page: &mut Page, schema: &Schema) -> Result<bool, DatabaseError> {
        if self.exhausted {
            page.clear();
            return Ok(false);
        }

        let more = page.read_from(schema, self.run.file_mut()?)?;
        self.exhausted = !more;

        Ok(more)
    }
}

impl<File: FileOperations> RunReader<File> {
    pub fn discard(self) -> io::Result<()> {
        self.run.discard()
    }
}

impl<File: FileOperations> Drop for Run<File> {
    fn drop(&mut self) {
        if let Err(e) = self.delete() {
            error!("failed to delete run {}: {e}", self.path.display());
        }
    }
}

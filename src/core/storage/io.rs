use std::{
    fs::{self, File},
    io::{self, Cursor},
    path::Path,
};

/// Filesystem operations run files need besides reading and writing.
///
/// Operators are generic over this trait so tests can keep every run in memory
/// through [`Cursor<Vec<u8>>`].
pub trait FileOperations {
    /// Creates (or truncates) the file at `path`, opened for reading and writing.
    fn create(path: impl AsRef<Path>) -> io::Result<Self>
    where
        Self: Sized;

    fn truncate(&mut self) -> io::Result<()>;

    fn delete(path: impl AsRef<Path>) -> io::Result<()>;

    /// Tries to store the data on disk to its respective [`Path`].
    fn save(&self) -> io::Result<()>;

    /// Hints that the file is going to be read once from start to end.
    fn advise_sequential(&self) -> io::Result<()> {
        Ok(())
    }
}

impl FileOperations for File {
    fn create(path: impl AsRef<Path>) -> io::Result<Self>
    where
        Self: Sized,
    {
        if let Some(parent_dir) = path.as_ref().parent() {
            fs::create_dir_all(parent_dir)?;
        }

        File::options()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.set_len(0)
    }

    fn delete(path: impl AsRef<Path>) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn save(&self) -> io::Result<()> {
        self.sync_all()
    }

    #[cfg(target_os = "linux")]
    fn advise_sequential(&self) -> io::Result<()> {
        use std::os::fd::AsRawFd;

        // SAFETY: the descriptor is owned by `self` and stays open for the call.
        let code = unsafe {
            libc::posix_fadvise(self.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL)
        };

        match code {
            0 => Ok(()),
            errno => Err(io::Error::from_raw_os_error(errno)),
        }
    }
}

/// In-memory files, used to test operators without touching the disk.
impl FileOperations for Cursor<Vec<u8>> {
    fn create(_path: impl AsRef<Path>) -> io::Result<Self>
    where
        Self: Sized,
    {
        Ok(Cursor::new(Vec::new()))
    }

    fn truncate(&mut self) -> io::Result<()> {
        self.set_position(0);
        self.get_mut().clear();

        Ok(())
    }

    fn delete(_path: impl AsRef<Path>) -> io::Result<()> {
        Ok(())
    }

    fn save(&self) -> io::Result<()> {
        Ok(())
    }
}

use crate::core::log::{self, Level};
use crate::core::random::Rng;
use crate::core::storage::run::RunNamespace;
use std::cell::Cell;
use std::io;
use std::path::{Path, PathBuf};

/// Size of a page in bytes when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Number of memory pages granted to the whole plan when none is configured.
pub const DEFAULT_BUFFERS: usize = 16;

/// Execution settings, fixed before the operator tree is built.
///
/// ```rust
/// use mergedb::db::Config;
///
/// let config = Config::default().with_page_size(512).with_buffers(4);
/// assert_eq!(config.page_size, 512);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Bytes per page, determines how many tuples each page holds.
    pub page_size: usize,
    /// Total memory pages available to the plan.
    pub buffers: usize,
    /// Directory where run files (and the log file) are created.
    pub work_dir: PathBuf,
    pub log_level: Level,
}

/// Hands out the resources each operator instance owns privately.
///
/// Every sort receives its own [`RunNamespace`] from here, so two sorts alive
/// at once never write to the same files.
#[derive(Debug)]
pub struct Context {
    config: Config,
    seed: u64,
    issued: Cell<u64>,
}

macro_rules! generate_methods {
    ($($name:ident: $field:ident: $type:ty),+) => {
        $(
            pub fn $name(mut self, $field: $type) -> Self {
                self.$field = $field;
                self
            }
        )+
    };
}

impl Config {
    generate_methods! {
        with_page_size: page_size: usize,
        with_buffers: buffers: usize,
        with_log_level: log_level: Level
    }

    pub fn with_work_dir(mut self, work_dir: impl AsRef<Path>) -> Self {
        self.work_dir = work_dir.as_ref().to_path_buf();
        self
    }

    /// Starts logging into `work_dir/mergedb.log`.
    pub fn init_logging(&self) -> io::Result<()> {
        log::init(self.log_level.clone(), self.work_dir.join(log::LOG_FILE_NAME))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffers: DEFAULT_BUFFERS,
            work_dir: std::env::temp_dir(),
            log_level: Level::Info,
        }
    }
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            seed: Rng::new().u64(..),
            issued: Cell::new(0),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    pub fn buffers(&self) -> usize {
        self.config.buffers
    }

    /// A namespace no other call on this context returns.
    pub fn namespace(&self) -> RunNamespace {
        let issued = self.issued.get();
        self.issued.set(issued + 1);

        RunNamespace::new(
            &self.config.work_dir,
            format!("{:016x}-{issued}", self.seed),
        )
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builder_methods() {
        let config = Config::default()
            .with_page_size(128)
            .with_buffers(3)
            .with_log_level(Level::Debug)
            .with_work_dir("/tmp/mergedb");

        assert_eq!(config.page_size, 128);
        assert_eq!(config.buffers, 3);
        assert_eq!(config.log_level, Level::Debug);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/mergedb"));
    }

    #[test]
    fn test_namespaces_are_unique() {
        let ctx = Context::default();
        let other = Context::default();

        let tokens: HashSet<String> = (0..64)
            .flat_map(|_| [ctx.namespace(), other.namespace()])
            .map(|namespace| namespace.token().to_string())
            .collect();

        assert_eq!(tokens.len(), 128);
    }
}

use db::DatabaseError;

mod core;
pub mod db;
pub mod vm;

pub use crate::core::log::Level;
pub use crate::core::random::Rng;
pub use crate::core::storage::{io::FileOperations, page::Page, run::RunNamespace, tuple::Tuple};

pub type Result<T> = std::result::Result<T, DatabaseError>;

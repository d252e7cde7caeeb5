//! Everything that ends up on disk: the tuple codec, pages and run files.

pub(crate) mod io;
pub(crate) mod page;
pub(crate) mod run;
pub(crate) mod tuple;

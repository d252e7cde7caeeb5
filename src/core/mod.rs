pub(crate) mod log;
pub(crate) mod random;
pub(crate) mod storage;

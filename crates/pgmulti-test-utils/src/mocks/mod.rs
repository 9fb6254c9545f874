//! Fakes and mocks for pgmulti collaborators.

pub mod context;
pub mod host;
pub mod pool;

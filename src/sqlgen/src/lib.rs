extern crate log;

pub use compiler::{build, build_count, build_delete, BuildOptions, OrderBy};
pub mod compiler;

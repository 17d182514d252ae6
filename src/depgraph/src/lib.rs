extern crate log;

pub use cascade::{cascade_plan, execute_cascade, CascadePlan, CascadeReport};
pub use graph::DependencyGraph;

pub mod cascade;
pub mod graph;

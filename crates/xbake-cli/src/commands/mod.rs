//! CLI command implementations

pub mod bake;
pub mod doctor;
pub mod plan;

mod reporting;

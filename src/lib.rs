pub use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use tera::Tera;

pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod import;
pub mod mesh;
pub mod paths;
pub mod plan;
pub mod post;
pub mod results;
pub mod sim;
pub mod tools;
pub mod units;

pub const BUILD_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/build");

/// Configuration format understood by this version.
pub const FORMAT_VERSION: (u32, u32) = (1, 1);

lazy_static! {
    pub static ref TEMPLATES: Tera =
        match Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/*")) {
            Ok(t) => t,
            Err(e) => panic!("Error parsing templates: {e}"),
        };
}

#[cfg(test)]
pub mod tests;

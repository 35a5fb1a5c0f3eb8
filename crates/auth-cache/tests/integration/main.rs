// See <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

pub mod configuration;
pub mod user_resolution;
pub mod utils;

pub use utils::*;

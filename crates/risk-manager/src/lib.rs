pub mod engine;
pub mod error;
pub mod models;
#[cfg(test)]
mod tests;

pub use engine::RiskEngine;
pub use error::RiskError;
pub use models::*;

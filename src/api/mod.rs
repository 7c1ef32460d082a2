pub mod analyzer;
pub mod desert;

pub use analyzer::EnvironmentAnalyzer;
pub use desert::{DesertEnvironment, SessionState};

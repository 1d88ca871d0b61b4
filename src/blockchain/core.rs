// core.rs splits ledger responsibilities into submodules.
pub mod chain;
pub mod validation;

pub use chain::*;
pub use validation::*;

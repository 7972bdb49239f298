//! Command implementations.

mod run;
mod validate;

pub use run::run_spread;
pub use validate::run_validate;

//! Repository implementations for database operations

pub mod analysis;
pub mod chains;
pub mod prices;

pub use analysis::*;
pub use chains::*;
pub use prices::*;

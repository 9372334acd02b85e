pub mod chain;
pub mod verdict;

pub use chain::*;
pub use verdict::*;

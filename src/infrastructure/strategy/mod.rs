//! Strategy graphs

mod registry;

pub use registry::{node, StrategyRegistry};

//! Strategy names and configuration

mod config;
mod name;

pub use config::StrategyConfig;
pub use name::StrategyName;

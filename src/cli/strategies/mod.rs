//! Strategies command - lists what the registry can build

use crate::domain::strategy::StrategyName;

pub fn run() -> anyhow::Result<()> {
    for strategy in StrategyName::ALL {
        println!(
            "{:<16} top_k={:<3} {}",
            strategy.as_str(),
            strategy.default_top_k(),
            strategy.description()
        );
    }
    Ok(())
}

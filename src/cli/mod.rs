//! CLI module for the RAG engine
//!
//! Subcommands:
//! - `ask`: answer a question over a passage corpus
//! - `strategies`: list the available strategies

pub mod ask;
pub mod strategies;

use clap::{Parser, Subcommand};

/// PMP RAG Engine - multi-strategy retrieval-augmented generation
#[derive(Parser)]
#[command(name = "pmp-rag-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Answer a question with a strategy
    Ask(ask::AskArgs),

    /// List available strategies
    Strategies,
}

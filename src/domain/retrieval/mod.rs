//! Retrieval port and passage types

mod passage;
mod port;

pub use passage::{content_key, normalize_ranking, Context, Passage, ScoreOrder};
pub use port::{RetrievalPort, SearchMode, SearchParams};

#[cfg(test)]
pub use port::mock;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchematicError {
    #[error("malformed input in route '{route}', segment {segment}: {reason}")]
    MalformedInput {
        route: String,
        segment: usize,
        reason: String,
    },
    #[error("malformed grid meta: {0}")]
    MalformedMeta(String),
    #[error("table row #{row} ({kind} {idx1}/{idx2}) has no matching interval pair in the live grid")]
    UnreachableCandidate {
        row: usize,
        kind: &'static str,
        idx1: i64,
        idx2: i64,
    },
    #[error("no convergence after {iterations} cycles: {reason}")]
    NonConvergence { iterations: usize, reason: String },
    #[error("I/O error accessing path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse layout: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("could not parse config: {0}")]
    Config(#[from] ron::error::SpannedError),
}

impl SchematicError {
    pub fn malformed(route: &str, segment: usize, reason: impl Into<String>) -> Self {
        SchematicError::MalformedInput {
            route: route.to_string(),
            segment,
            reason: reason.into(),
        }
    }
}

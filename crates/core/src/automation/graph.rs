//! Fan-in graph of part work items feeding one combinator.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use super::{Verb, WorkItem};

/// Outputs stored under this prefix stay inside the service and are handed
/// to the combinator of the same submission.
pub const INTERMEDIATE_PREFIX: &str = "das://intermediate/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Graph has no part work items")]
    NoParts,

    #[error("Part {index} is malformed: {reason}")]
    MalformedPart { index: usize, reason: String },

    #[error("Intermediate '{0}' is produced more than once")]
    DuplicateOutput(String),

    #[error("Intermediate '{0}' is not consumed by the combinator")]
    UnconsumedOutput(String),
}

/// N part work items plus the combinator that consumes their outputs.
///
/// Serializes to the combined submission body
/// `{"parts": [...], "combinator": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobGraph {
    parts: Vec<WorkItem>,
    combinator: WorkItem,
}

impl JobGraph {
    /// Check the graph shape: every part reads one input and stores one
    /// intermediate, and the combinator names every intermediate as a local
    /// file.
    pub fn new(parts: Vec<WorkItem>, combinator: WorkItem) -> Result<Self, GraphError> {
        if parts.is_empty() {
            return Err(GraphError::NoParts);
        }

        let consumed: HashSet<&str> = combinator
            .arguments()
            .values()
            .filter_map(|argument| argument.as_file())
            .filter_map(|binding| binding.local_name.as_deref())
            .collect();

        let mut produced = HashSet::new();
        for (index, part) in parts.iter().enumerate() {
            let key = intermediate_key(part)
                .map_err(|reason| GraphError::MalformedPart { index, reason })?;
            if !produced.insert(key) {
                return Err(GraphError::DuplicateOutput(key.to_string()));
            }
            if !consumed.contains(key) {
                return Err(GraphError::UnconsumedOutput(key.to_string()));
            }
        }

        Ok(Self { parts, combinator })
    }

    pub fn parts(&self) -> &[WorkItem] {
        &self.parts
    }

    pub fn combinator(&self) -> &WorkItem {
        &self.combinator
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Intermediate keys in part order.
    pub fn intermediate_keys(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|part| intermediate_key(part).ok())
            .collect()
    }
}

fn intermediate_key(part: &WorkItem) -> Result<&str, String> {
    let inputs = part.files(Verb::Fetch).count() + part.files(Verb::ReferenceFetch).count();
    if inputs != 1 {
        return Err(format!("expected one input, found {}", inputs));
    }

    let mut outputs = part.files(Verb::Store);
    let (name, output) = outputs
        .next()
        .ok_or_else(|| "no output binding".to_string())?;
    if outputs.next().is_some() {
        return Err("more than one output binding".to_string());
    }

    output
        .url
        .strip_prefix(INTERMEDIATE_PREFIX)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| format!("output '{}' is not an intermediate", name))
}

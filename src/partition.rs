//! Chunk Partitioner
//!
//! Splits the loaded work items into contiguous chunks, one per execution unit.
//! The chunk index becomes part of every resource name, so boundaries must be a
//! pure function of the input length and the concurrency.

use crate::error::LoadError;
use crate::source::WorkItem;

/// Contiguous, non-empty run of work items handled by one execution unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub items: Vec<WorkItem>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Number of items per chunk for a list of `len` items.
pub fn chunk_size(len: usize, concurrency: i64) -> Result<usize, LoadError> {
    if concurrency <= 0 {
        return Err(LoadError::InvalidConfiguration(format!(
            "concurrency must be positive, got {}",
            concurrency
        )));
    }
    let concurrency = usize::try_from(concurrency).map_err(|_| {
        LoadError::InvalidConfiguration(format!("concurrency {} is out of range", concurrency))
    })?;
    Ok(len.div_ceil(concurrency))
}

/// Split `items` into at most `concurrency` chunks of `ceil(len / concurrency)`
/// items; the last chunk takes the remainder.
pub fn partition(items: &[WorkItem], concurrency: i64) -> Result<Vec<Chunk>, LoadError> {
    let size = chunk_size(items.len(), concurrency)?;
    if size == 0 {
        return Ok(Vec::new());
    }

    Ok(items
        .chunks(size)
        .enumerate()
        .map(|(index, slice)| Chunk {
            index,
            items: slice.to_vec(),
        })
        .collect())
}

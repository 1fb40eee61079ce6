use anyhow::Result;

use crate::error::ValidationError;

/// Single-consumer supply of validation batches.
pub trait ValidationSource<T> {
    /// Get the next batch of data, `None` once the source ran dry.
    fn next_batch(&mut self) -> Result<Option<T>>;

    /// Reset the source to the beginning
    fn reset(&mut self);

    /// Get the total number of distinct batches (if known)
    fn num_batches(&self) -> Option<usize>;
}

/// Pull one batch, treating exhaustion as an error: validation expects an endless stream.
pub fn pull<T, S>(source: &mut S) -> crate::Result<T>
where
    S: ValidationSource<T> + ?Sized,
{
    match source.next_batch() {
        Ok(Some(batch)) => Ok(batch),
        Ok(None) => Err(ValidationError::SourceExhausted),
        Err(err) => Err(ValidationError::Source(err)),
    }
}

/// Endless source rotating through a fixed set of batches.
///
/// Draws keep advancing across epochs; nothing rewinds the cursor except [`reset`](ValidationSource::reset).
pub struct CyclicSource<T> {
    batches: Vec<T>,
    current_batch: usize,
    drawn: usize,
}

impl<T: Clone> CyclicSource<T> {
    pub fn new(batches: Vec<T>) -> Self {
        Self {
            batches,
            current_batch: 0,
            drawn: 0,
        }
    }

    /// Total batches handed out since construction or the last reset.
    pub fn drawn(&self) -> usize {
        self.drawn
    }
}

impl<T: Clone> ValidationSource<T> for CyclicSource<T> {
    fn next_batch(&mut self) -> Result<Option<T>> {
        if self.batches.is_empty() {
            return Ok(None);
        }

        let batch = self.batches[self.current_batch].clone();
        self.current_batch = (self.current_batch + 1) % self.batches.len();
        self.drawn += 1;

        Ok(Some(batch))
    }

    fn reset(&mut self) {
        self.current_batch = 0;
        self.drawn = 0;
    }

    fn num_batches(&self) -> Option<usize> {
        Some(self.batches.len())
    }
}

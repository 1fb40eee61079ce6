mod aggregate;
mod edit_distance;

pub use aggregate::{show_edit_distance, BatchScore, EpochAccumulator, EpochMetrics, ScoreAccumulator};
pub use edit_distance::{edit_distance, normalized_edit_distance};

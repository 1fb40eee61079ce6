mod batch;
mod codec;
mod source;
mod synthetic;

pub use batch::{AttentionBatch, CtcBatch, TrainBatch};
pub use codec::{AlphabetCodec, LabelCodec};
pub use source::{pull, CyclicSource, ValidationSource};
pub use synthetic::SyntheticOcr;

mod callback;
mod evaluator;
mod trainer;

pub use callback::{CallbackPhase, EpochLogs, EpochObserver, ValidationCallback};
pub use evaluator::{AttentionEvaluator, CtcEvaluator, ValidationEvaluator};
pub use trainer::{HeadObserver, OcrTrainer, TrainOutput};

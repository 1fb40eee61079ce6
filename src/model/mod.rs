mod ctc_loss;
mod head;

pub use ctc_loss::ctc_negative_log_likelihood;
pub use head::SequenceHead;

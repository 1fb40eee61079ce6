mod policy;
mod record;

pub use policy::BestLoss;
pub use record::{
    load_module_weights, meta_path, read_meta, save_module, save_module_weights, weights_path,
    CheckpointMeta, Checkpointable,
};

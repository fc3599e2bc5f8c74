mod attention_gate;
mod context;
mod conv_block;
mod localization;
mod up_sampling;

pub use attention_gate::*;
pub use context::*;
pub use conv_block::*;
pub use localization::*;
pub use up_sampling::*;

pub mod lifecycle;
pub mod pipeline;

pub use lifecycle::{Engine, EngineHandle, RoundReport};
pub use pipeline::Pipeline;

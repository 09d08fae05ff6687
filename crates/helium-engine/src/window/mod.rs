//! Window thread and the signals it shares with the render thread.

mod runtime;
mod signals;

pub use runtime::{Runtime, RuntimeConfig};
pub use signals::RenderSignals;

mod buffer;
mod scratch;

pub use buffer::BufferRef;
pub use scratch::{ScratchBuffer, ScratchPool, ScratchStats};

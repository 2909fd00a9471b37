//! msb-stream: the buffered range store and the stream controller.
//!
//! A [`SourceBufferStream`] keeps one elementary track's buffered media as a
//! sorted list of disjoint [`SourceBufferRange`]s, each indexed by keyframe.
//! It accepts decode-ordered appends, removals and seeks, hands buffers back
//! out in decode order and evicts whole GOPs under a memory limit.

pub mod buffer;
pub mod range;
pub mod stream;

#[cfg(test)]
mod testing;

pub use buffer::Buffer;
pub use range::{allow_same_timestamp, SourceBufferRange};
pub use stream::{CursorState, RangeId, SourceBufferStream, StreamStatus};

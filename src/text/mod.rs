//! Text preparation: splitting long selections into speakable segments.

pub mod segmenter;

pub use segmenter::{Segment, segment, segment_with_limit};

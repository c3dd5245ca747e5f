//! Client-side transcript production.
//!
//! The relay server only consumes [`TranscriptEvent`]s; this module provides
//! the pieces a client uses to produce them from a streaming recognizer and to
//! keep that recognizer (and its relay connection) alive.

mod restart;
mod segmenter;

pub use restart::{RecognitionErrorKind, RestartDecision, RestartPolicy, RestartTracker};
pub use segmenter::{
    RecognitionBatch, RecognitionResult, TranscriptEvent, TranscriptSegmenter, segment_stream,
};

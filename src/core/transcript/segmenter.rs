//! Transcript segmentation.
//!
//! Streaming recognizers report results in batches: each batch carries every
//! result of the current recognition run plus the index of the first result
//! that changed. The segmenter turns those batches into an ordered sequence of
//! [`TranscriptEvent`]s:
//!
//! - finalized pieces from the changed range are concatenated into one final
//!   event, which closes the current utterance;
//! - the remaining interim pieces become one partial event that supersedes
//!   any earlier partial for the open utterance.
//!
//! Blank text is never emitted and an unchanged partial is not repeated.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// A transcript segment sent from client to relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// One hypothesis reported by the recognizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub transcript: String,
    pub is_final: bool,
}

/// A batch of recognizer results.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionBatch {
    /// Index of the first result that changed since the previous batch
    pub result_index: usize,
    pub results: Vec<RecognitionResult>,
}

impl RecognitionBatch {
    /// Batch holding a single finalized utterance.
    pub fn finalized(text: impl Into<String>) -> Self {
        Self {
            result_index: 0,
            results: vec![RecognitionResult {
                transcript: text.into(),
                is_final: true,
            }],
        }
    }

    /// Batch holding a single interim hypothesis.
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            result_index: 0,
            results: vec![RecognitionResult {
                transcript: text.into(),
                is_final: false,
            }],
        }
    }
}

/// Stateful batch-to-event converter for one recognition session.
#[derive(Debug, Default)]
pub struct TranscriptSegmenter {
    last_partial: Option<String>,
    utterances: u64,
}

impl TranscriptSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of utterances closed so far.
    pub fn utterances(&self) -> u64 {
        self.utterances
    }

    /// Convert one recognizer batch into zero, one or two events.
    ///
    /// When both are present the final event comes first, since the interim
    /// text belongs to the utterance that follows it.
    pub fn ingest(&mut self, batch: &RecognitionBatch) -> Vec<TranscriptEvent> {
        let mut final_text = String::new();
        let mut interim_text = String::new();

        for result in batch.results.iter().skip(batch.result_index) {
            if result.is_final {
                final_text.push_str(&result.transcript);
            } else {
                interim_text.push_str(&result.transcript);
            }
        }

        let mut events = Vec::with_capacity(2);

        if !final_text.trim().is_empty() {
            self.utterances += 1;
            self.last_partial = None;
            events.push(TranscriptEvent::final_text(final_text));
        }

        if !interim_text.trim().is_empty()
            && self.last_partial.as_deref() != Some(interim_text.as_str())
        {
            self.last_partial = Some(interim_text.clone());
            events.push(TranscriptEvent::partial(interim_text));
        }

        events
    }
}

/// Lazily segment a recognizer stream.
///
/// The returned stream is driven by `batches` and ends when it ends; it cannot
/// be restarted.
pub fn segment_stream<S>(batches: S) -> impl Stream<Item = TranscriptEvent>
where
    S: Stream<Item = RecognitionBatch>,
{
    async_stream::stream! {
        let mut segmenter = TranscriptSegmenter::new();
        futures::pin_mut!(batches);
        while let Some(batch) = batches.next().await {
            for event in segmenter.ingest(&batch) {
                yield event;
            }
        }
    }
}

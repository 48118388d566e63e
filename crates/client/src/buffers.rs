//! Streaming accumulation buffers
//!
//! Two growing buffers fed by chunked deltas: the thinking trace (keyed by
//! message id, capped, diagnostic) and the active answer stream (single,
//! transient). Both must stay bounded under adversarial/chatty streams.

use std::collections::HashMap;

use tracing::warn;

/// Per-message cap on retained thinking text. Oldest content is evicted,
/// never newest.
pub const THINKING_BUFFER_CAP: usize = 100 * 1024;

/// A stream counts as stalled once no chunk arrived within this window.
pub const STREAM_STALL_MS: u64 = 3_000;

/// How many individual chunks the streaming log retains. The accumulated
/// content and the chunk counter are unaffected by this cap.
const CHUNK_LOG_CAP: usize = 512;

/// Accumulates "thinking" deltas per message id.
#[derive(Debug)]
pub struct ThinkingBuffers {
    buffers: HashMap<String, String>,
    cap: usize,
}

impl Default for ThinkingBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkingBuffers {
    pub fn new() -> Self {
        Self::with_cap(THINKING_BUFFER_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            cap,
        }
    }

    /// Append a chunk, evicting the oldest content if the cap is exceeded.
    /// Thinking is supplementary; overflow warns instead of failing.
    pub fn append(&mut self, message_id: &str, chunk: &str) -> &str {
        let buf = self.buffers.entry(message_id.to_string()).or_default();
        buf.push_str(chunk);

        if buf.len() > self.cap {
            let mut cut = buf.len() - self.cap;
            while cut < buf.len() && !buf.is_char_boundary(cut) {
                cut += 1;
            }
            buf.drain(..cut);
            warn!(
                component = "buffers",
                event = "thinking.buffer.truncated",
                message_id = %message_id,
                retained_bytes = buf.len(),
                "Thinking buffer exceeded cap, dropped oldest content"
            );
        }

        buf.as_str()
    }

    pub fn get(&self, message_id: &str) -> Option<&str> {
        self.buffers.get(message_id).map(String::as_str)
    }

    /// Drop the buffer for one message id.
    pub fn clear(&mut self, message_id: &str) -> Option<String> {
        self.buffers.remove(message_id)
    }

    pub fn clear_all(&mut self) {
        self.buffers.clear();
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.buffers.clone()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// One received answer chunk.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub content: String,
    pub received_at_ms: u64,
}

/// The single active answer stream for a workspace.
///
/// `is_streaming` is true iff accumulated content is non-empty; the owner
/// clears the tracker on stream-complete, error, or preemption.
#[derive(Debug, Clone, Default)]
pub struct StreamingTracker {
    message_id: Option<String>,
    content: String,
    chunks: Vec<StreamChunk>,
    total_chunks: u64,
    started_at_ms: u64,
    last_chunk_at_ms: u64,
}

impl StreamingTracker {
    pub fn is_streaming(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn chunk_count(&self) -> u64 {
        self.total_chunks
    }

    pub fn last_chunk_at_ms(&self) -> u64 {
        self.last_chunk_at_ms
    }

    /// Extend the stream with a chunk. The backend may not have assigned a
    /// message id for the first chunks; the first id seen wins.
    pub fn push(&mut self, message_id: Option<&str>, content: &str, now_ms: u64) {
        if self.total_chunks == 0 {
            self.started_at_ms = now_ms;
        }
        if self.message_id.is_none() {
            self.message_id = message_id.map(str::to_string);
        }

        self.content.push_str(content);
        self.total_chunks += 1;
        self.last_chunk_at_ms = now_ms;

        self.chunks.push(StreamChunk {
            content: content.to_string(),
            received_at_ms: now_ms,
        });
        if self.chunks.len() > CHUNK_LOG_CAP {
            let drop = self.chunks.len() - CHUNK_LOG_CAP;
            self.chunks.drain(..drop);
        }
    }

    /// True while streaming is active but no chunk arrived within the stall
    /// window. Callers use this for UI affordances, not automatic recovery.
    pub fn is_paused(&self, now_ms: u64) -> bool {
        self.is_streaming() && now_ms.saturating_sub(self.last_chunk_at_ms) > STREAM_STALL_MS
    }

    pub fn ms_since_last_chunk(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_chunk_at_ms)
    }

    /// Rough throughput over the stream's lifetime.
    pub fn words_per_minute(&self, now_ms: u64) -> f64 {
        let elapsed_ms = now_ms.saturating_sub(self.started_at_ms);
        if elapsed_ms == 0 || self.content.is_empty() {
            return 0.0;
        }
        let words = self.content.split_whitespace().count() as f64;
        words * 60_000.0 / elapsed_ms as f64
    }

    pub fn clear(&mut self) {
        *self = StreamingTracker::default();
    }

    /// Read-only view for the canonical snapshot.
    pub fn view(&self) -> StreamingView {
        StreamingView {
            is_streaming: self.is_streaming(),
            message_id: self.message_id.clone(),
            content: self.content.clone(),
            chunk_count: self.total_chunks,
            last_chunk_at_ms: self.last_chunk_at_ms,
        }
    }
}

/// Immutable streaming snapshot handed to the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingView {
    pub is_streaming: bool,
    pub message_id: Option<String>,
    pub content: String,
    pub chunk_count: u64,
    pub last_chunk_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_append_concatenates() {
        let mut buffers = ThinkingBuffers::new();
        buffers.append("m1", "analyzing");
        let combined = buffers.append("m1", "...").to_string();
        assert_eq!(combined, "analyzing...");
        assert_eq!(buffers.get("m1"), Some("analyzing..."));
        assert_eq!(buffers.get("m2"), None);
    }

    #[test]
    fn thinking_buffer_never_exceeds_cap_and_keeps_newest() {
        let mut buffers = ThinkingBuffers::with_cap(16);
        for _ in 0..10 {
            buffers.append("m1", "0123456789");
        }
        let retained = buffers.get("m1").unwrap();
        assert!(retained.len() <= 16);
        assert!(retained.ends_with("0123456789"));
    }

    #[test]
    fn thinking_truncation_respects_char_boundaries() {
        let mut buffers = ThinkingBuffers::with_cap(8);
        buffers.append("m1", "ααααααα");
        let retained = buffers.get("m1").unwrap();
        assert!(retained.len() <= 9);
        assert!(retained.chars().all(|c| c == 'α'));
    }

    #[test]
    fn thinking_clear_removes_only_that_id() {
        let mut buffers = ThinkingBuffers::new();
        buffers.append("m1", "a");
        buffers.append("m2", "b");
        assert_eq!(buffers.clear("m1"), Some("a".to_string()));
        assert_eq!(buffers.get("m1"), None);
        assert_eq!(buffers.get("m2"), Some("b"));
    }

    #[test]
    fn streaming_accumulates_in_order() {
        let mut stream = StreamingTracker::default();
        assert!(!stream.is_streaming());

        stream.push(Some("m1"), "Here is", 1_000);
        stream.push(None, " your plugin", 1_050);

        assert!(stream.is_streaming());
        assert_eq!(stream.content(), "Here is your plugin");
        assert_eq!(stream.message_id(), Some("m1"));
        assert_eq!(stream.chunk_count(), 2);
    }

    #[test]
    fn streaming_adopts_first_message_id() {
        let mut stream = StreamingTracker::default();
        stream.push(None, "a", 0);
        stream.push(Some("m9"), "b", 10);
        assert_eq!(stream.message_id(), Some("m9"));
        stream.push(Some("other"), "c", 20);
        assert_eq!(stream.message_id(), Some("m9"));
    }

    #[test]
    fn stall_detection_uses_threshold() {
        let mut stream = StreamingTracker::default();
        stream.push(Some("m1"), "text", 1_000);
        assert!(!stream.is_paused(1_000 + STREAM_STALL_MS));
        assert!(stream.is_paused(1_001 + STREAM_STALL_MS));
    }

    #[test]
    fn empty_stream_is_never_paused() {
        let stream = StreamingTracker::default();
        assert!(!stream.is_paused(u64::MAX));
    }

    #[test]
    fn chunk_log_stays_bounded() {
        let mut stream = StreamingTracker::default();
        for i in 0..2_000u64 {
            stream.push(Some("m1"), "x", i);
        }
        assert_eq!(stream.chunk_count(), 2_000);
        assert_eq!(stream.content().len(), 2_000);
        assert!(stream.chunks.len() <= CHUNK_LOG_CAP);
    }

    #[test]
    fn words_per_minute_counts_whitespace_words() {
        let mut stream = StreamingTracker::default();
        stream.push(Some("m1"), "one two three four", 0);
        // 4 words over 6 seconds -> 40 wpm
        let wpm = stream.words_per_minute(6_000);
        assert!((wpm - 40.0).abs() < 0.01);
    }
}

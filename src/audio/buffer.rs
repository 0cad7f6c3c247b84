//! # Segment Buffer
//!
//! Accumulates 16-bit PCM samples at the target rate until a decode window
//! is taken, then keeps only the trailing overlap so the next window has
//! context across the cut point. Word boundaries that fall on a window edge
//! get re-decoded inside the overlap instead of being lost.
//!
//! The buffer is owned exclusively by one connection's handling task, so it
//! needs no interior locking: ingestion appends, the decode scheduler drains,
//! both from the same actor.

/// Growable sample buffer with overlap-preserving drain.
///
/// ## Invariants:
/// - Samples are mono PCM at the target rate (the ingest path resamples
///   before appending).
/// - Immediately after `drain_window`, the buffer holds exactly the overlap
///   (or everything, when less than one overlap had accumulated).
#[derive(Debug)]
pub struct SegmentBuffer {
    /// PCM samples awaiting the next decode window
    samples: Vec<i16>,

    /// Sample rate the stored samples are at
    sample_rate: u32,

    /// Number of trailing samples retained across a drain
    overlap_samples: usize,
}

impl SegmentBuffer {
    /// Create an empty buffer.
    ///
    /// `overlap_secs` is converted to a sample count once, here; the drain
    /// path works purely in samples.
    pub fn new(sample_rate: u32, overlap_secs: f64) -> Self {
        let overlap_samples = (overlap_secs * sample_rate as f64) as usize;
        Self {
            samples: Vec::new(),
            sample_rate,
            overlap_samples,
        }
    }

    /// Append converted PCM samples to the tail of the buffer.
    pub fn append(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of buffered audio in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Take the full buffered window for decoding, retaining only the most
    /// recent overlap in the buffer.
    ///
    /// The returned window includes the overlap region, so consecutive
    /// decodes may repeat a partial word near the cut; that duplication is
    /// accepted rather than deduplicated.
    pub fn drain_window(&mut self) -> Vec<i16> {
        let window = self.samples.clone();
        let keep = self.overlap_samples.min(self.samples.len());
        let cut = self.samples.len() - keep;
        self.samples.drain(..cut);
        window
    }

    /// Drop all buffered samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// A decode window as normalized floats in [-1.0, 1.0], the format the
    /// speech model consumes.
    pub fn window_to_float(window: &[i16]) -> Vec<f32> {
        window.iter().map(|&s| s as f32 / 32768.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_retains_exactly_the_overlap() {
        // 1s overlap at 16kHz
        let mut buffer = SegmentBuffer::new(16000, 1.0);
        buffer.append(&vec![100i16; 48000]); // 3 seconds

        let window = buffer.drain_window();
        assert_eq!(window.len(), 48000);
        assert_eq!(buffer.len(), 16000);
    }

    #[test]
    fn drain_keeps_everything_when_shorter_than_overlap() {
        let mut buffer = SegmentBuffer::new(16000, 1.0);
        buffer.append(&vec![7i16; 4000]); // 0.25 seconds

        let window = buffer.drain_window();
        assert_eq!(window.len(), 4000);
        assert_eq!(buffer.len(), 4000);
    }

    #[test]
    fn retained_overlap_is_the_buffer_tail() {
        let mut buffer = SegmentBuffer::new(4, 1.0); // overlap = 4 samples
        buffer.append(&[1, 2, 3, 4, 5, 6, 7, 8]);

        buffer.drain_window();
        let second = buffer.drain_window();
        assert_eq!(second, vec![5, 6, 7, 8]);
    }

    #[test]
    fn duration_tracks_sample_count() {
        let mut buffer = SegmentBuffer::new(16000, 1.0);
        assert_eq!(buffer.duration_seconds(), 0.0);

        buffer.append(&vec![0i16; 8000]);
        assert!((buffer.duration_seconds() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn window_to_float_normalizes() {
        let floats = SegmentBuffer::window_to_float(&[0, 16384, -32768]);
        assert_eq!(floats[0], 0.0);
        assert!((floats[1] - 0.5).abs() < 1e-4);
        assert_eq!(floats[2], -1.0);
    }
}

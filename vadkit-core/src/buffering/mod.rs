//! Frame assembly and the capture ring buffer.
//!
//! Microphone capture uses `ringbuf::HeapRb<f32>`, which provides a
//! wait-free `push_slice` safe to call from the real-time audio callback.

pub mod frame;

use ringbuf::{traits::Split, HeapRb};

pub use frame::{Fill, FrameBuffer};
pub use ringbuf::traits::{Consumer, Producer};

/// Type alias for the producer half, held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half, held by the processing thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^20 = 1 048 576 f32 samples, about 21.8 s at 48 kHz.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

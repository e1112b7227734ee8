//! Fixed-capacity single-producer / single-consumer event ring on top of
//! `rtrb`.
//!
//! A full ring rejects the incoming event and bumps an overflow counter.
//! Nothing is ever overwritten and neither side blocks.

use virusmc_types::MidiEvent;

/// Events that carry a sample offset into the current processing block.
pub trait Timed {
    fn offset(&self) -> u32;
}

impl Timed for MidiEvent {
    fn offset(&self) -> u32 {
        self.offset
    }
}

/// Producer half. Owned by exactly one writer at a time; callers with several
/// writer threads put it behind a mutex.
pub struct Producer<T> {
    inner: rtrb::Producer<T>,
    overflow: u64,
}

impl<T> Producer<T> {
    /// Enqueue an event. Returns `false` and counts an overflow if the ring is full.
    pub fn push(&mut self, value: T) -> bool {
        match self.inner.push(value) {
            Ok(()) => true,
            Err(rtrb::PushError::Full(_)) => {
                self.overflow += 1;
                false
            }
        }
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow
    }

    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }
}

/// Consumer half.
pub struct Consumer<T> {
    inner: rtrb::Consumer<T>,
}

impl<T> Consumer<T> {
    /// Look at the oldest event without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.inner.peek().ok()
    }

    pub fn pop(&mut self) -> Option<T> {
        self.inner.pop().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<T: Timed> Consumer<T> {
    /// Remove and yield events whose offset is at most `max_offset`, in
    /// arrival order. Stops at the first event that is not yet due; events
    /// left unconsumed when the iterator is dropped stay queued.
    pub fn drain_up_to(&mut self, max_offset: u32) -> DrainUpTo<'_, T> {
        DrainUpTo {
            consumer: self,
            max_offset,
        }
    }
}

pub struct DrainUpTo<'a, T> {
    consumer: &'a mut Consumer<T>,
    max_offset: u32,
}

impl<T: Timed> Iterator for DrainUpTo<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.consumer.peek()?.offset() > self.max_offset {
            return None;
        }
        self.consumer.pop()
    }
}

/// Create a ring with room for `capacity` events (at least one).
pub fn event_queue<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (
        Producer {
            inner: producer,
            overflow: 0,
        },
        Consumer { inner: consumer },
    )
}

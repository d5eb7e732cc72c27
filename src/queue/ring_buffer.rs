//! Many-to-One Byte Ring Buffer
//!
//! Variable-length records are written by any number of producer threads and
//! drained by exactly one consumer. Producers never block: a write either
//! claims space with a single compare-and-swap on the tail or fails straight
//! away with [`QueueError::InsufficientCapacity`].
//!
//! ## Record Layout
//!
//! ```text
//!  0          4          8
//!  ├──────────┼──────────┼──────────────────────────┐
//!  │ length   │ type id  │ payload ...              │
//!  └──────────┴──────────┴──────────────────────────┘
//! ```
//!
//! `length` covers header plus payload and is published last with release
//! ordering, so a consumer that observes a positive length (acquire) also
//! observes the payload. Records start on 8-byte boundaries. When a record
//! does not fit before the end of the buffer, a padding record fills the gap
//! and the record is written at index 0.
//!
//! ## Consumer Side
//!
//! The consumer zeroes every byte it has read before moving the head, which
//! is what lets a length of `0` mean "not yet published". Only one
//! [`RingBufferConsumer`] can exist per buffer at a time.

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{QueueError, QueueResult};

/// Length of the record header (length + type id).
pub const HEADER_LENGTH: usize = 8;

/// Records start on multiples of this many bytes.
pub const RECORD_ALIGNMENT: usize = 8;

/// Smallest capacity accepted by [`ManyToOneRingBuffer::new`].
pub const MIN_CAPACITY: usize = 64;

/// Type id reserved for padding records at the wrap point.
pub const PADDING_MSG_TYPE_ID: i32 = -1;

const TYPE_OFFSET: usize = 4;

#[inline(always)]
const fn align(value: usize, alignment: usize) -> usize {
    (value + (alignment - 1)) & !(alignment - 1)
}

/// Padding for cache line isolation (64 bytes on x86-64)
#[repr(C, align(64))]
struct CacheLinePadded<T> {
    value: T,
}

impl<T> CacheLinePadded<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

/// A bounded, many-producer single-consumer queue of byte records.
///
/// # Example
///
/// ```
/// use flashdriver::queue::{ManyToOneRingBuffer, RingBufferConsumer};
/// use std::sync::Arc;
///
/// let ring = Arc::new(ManyToOneRingBuffer::new(1024).unwrap());
/// let mut consumer = RingBufferConsumer::claim(Arc::clone(&ring)).unwrap();
///
/// ring.write(1, b"hello").unwrap();
///
/// let mut seen = Vec::new();
/// consumer.read(|msg_type_id, payload| seen.push((msg_type_id, payload.to_vec())), 10);
/// assert_eq!(seen, vec![(1, b"hello".to_vec())]);
/// ```
pub struct ManyToOneRingBuffer {
    // Next position producers will claim
    tail: CacheLinePadded<AtomicUsize>,
    // Next position the consumer will read
    head: CacheLinePadded<AtomicUsize>,
    // Word-backed so that every record header is 8-byte aligned
    buffer: Box<[AtomicU64]>,
    capacity: usize,
    mask: usize,
    max_msg_length: usize,
    consumer_claimed: AtomicBool,
    correlation_counter: AtomicI64,
}

impl ManyToOneRingBuffer {
    /// Creates a zeroed ring buffer of `capacity` bytes.
    ///
    /// `capacity` must be a power of two and at least [`MIN_CAPACITY`].
    pub fn new(capacity: usize) -> QueueResult<Self> {
        if !capacity.is_power_of_two() || capacity < MIN_CAPACITY {
            return Err(QueueError::InvalidCapacity(capacity));
        }

        let words = (0..capacity / 8).map(|_| AtomicU64::new(0)).collect();

        Ok(Self {
            tail: CacheLinePadded::new(AtomicUsize::new(0)),
            head: CacheLinePadded::new(AtomicUsize::new(0)),
            buffer: words,
            capacity,
            mask: capacity - 1,
            max_msg_length: capacity / 8,
            consumer_claimed: AtomicBool::new(false),
            correlation_counter: AtomicI64::new(1),
        })
    }

    /// Capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest payload a single record can carry.
    #[inline]
    pub fn max_msg_length(&self) -> usize {
        self.max_msg_length
    }

    /// Bytes currently claimed by producers and not yet consumed.
    ///
    /// This is a snapshot; producers and the consumer may move it at any time.
    pub fn size(&self) -> usize {
        let head = self.head.value.load(Ordering::Acquire);
        let tail = self.tail.value.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    /// Returns `true` if no records are waiting.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Hands out ids unique among all users of this buffer, starting at 1.
    ///
    /// Clients use these as correlation ids so that 0 never names a command.
    #[inline]
    pub fn next_correlation_id(&self) -> i64 {
        self.correlation_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Writes a record. Safe to call from any number of threads.
    ///
    /// Never blocks or retries on a full buffer: back-pressure is reported as
    /// `InsufficientCapacity` and it is up to the caller what to do with it.
    pub fn write(&self, msg_type_id: i32, payload: &[u8]) -> QueueResult<()> {
        if msg_type_id < 1 {
            return Err(QueueError::InvalidMessageType(msg_type_id));
        }
        if payload.len() > self.max_msg_length {
            return Err(QueueError::MessageTooLong {
                length: payload.len(),
                max: self.max_msg_length,
            });
        }

        let record_length = HEADER_LENGTH + payload.len();
        let index = self.claim_capacity(align(record_length, RECORD_ALIGNMENT))?;

        self.type_at(index).store(msg_type_id, Ordering::Relaxed);
        // SAFETY: [index, index + record_length) was claimed by this producer
        // alone and lies inside the buffer.
        unsafe {
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.base().add(index + HEADER_LENGTH),
                payload.len(),
            );
        }
        self.length_at(index)
            .store(record_length as i32, Ordering::Release);

        Ok(())
    }

    /// Claims `required` bytes and returns the index to write the record at.
    fn claim_capacity(&self, required: usize) -> QueueResult<usize> {
        loop {
            let head = self.head.value.load(Ordering::Acquire);
            let tail = self.tail.value.load(Ordering::Acquire);

            let available = self.capacity - tail.wrapping_sub(head);
            if required > available {
                return Err(QueueError::InsufficientCapacity);
            }

            let tail_index = tail & self.mask;
            let to_buffer_end = self.capacity - tail_index;
            let mut padding = 0;

            if required > to_buffer_end {
                // Record must go at index 0, which needs the consumer to have
                // moved past `required` bytes of the current lap.
                if required > (head & self.mask) {
                    return Err(QueueError::InsufficientCapacity);
                }
                padding = to_buffer_end;
            }

            let new_tail = tail.wrapping_add(required + padding);
            if self
                .tail
                .value
                .compare_exchange_weak(tail, new_tail, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                if padding == 0 {
                    return Ok(tail_index);
                }

                self.type_at(tail_index)
                    .store(PADDING_MSG_TYPE_ID, Ordering::Relaxed);
                self.length_at(tail_index)
                    .store(padding as i32, Ordering::Release);
                return Ok(0);
            }
        }
    }

    #[inline(always)]
    fn base(&self) -> *mut u8 {
        self.buffer.as_ptr() as *mut u8
    }

    #[inline(always)]
    fn length_at(&self, index: usize) -> &AtomicI32 {
        debug_assert!(index % RECORD_ALIGNMENT == 0 && index < self.capacity);
        // SAFETY: index is 8-byte aligned and in bounds; AtomicI32 has the
        // layout of i32 and the words are only ever touched atomically or by
        // the owner of the claimed region.
        unsafe { &*(self.base().add(index) as *const AtomicI32) }
    }

    #[inline(always)]
    fn type_at(&self, index: usize) -> &AtomicI32 {
        debug_assert!(index % RECORD_ALIGNMENT == 0 && index < self.capacity);
        // SAFETY: as for `length_at`, offset by 4 keeps 4-byte alignment.
        unsafe { &*(self.base().add(index + TYPE_OFFSET) as *const AtomicI32) }
    }
}

impl std::fmt::Debug for ManyToOneRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManyToOneRingBuffer")
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .finish()
    }
}

/// The single reading end of a [`ManyToOneRingBuffer`].
///
/// Holding the consumer is what grants the right to drain the buffer; it is
/// released again when the consumer is dropped.
#[derive(Debug)]
pub struct RingBufferConsumer {
    ring: Arc<ManyToOneRingBuffer>,
}

impl RingBufferConsumer {
    /// Claims the consumer side of `ring`.
    pub fn claim(ring: Arc<ManyToOneRingBuffer>) -> QueueResult<Self> {
        ring.consumer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| QueueError::ConsumerClaimed)?;

        Ok(Self { ring })
    }

    /// The buffer this consumer drains.
    pub fn ring(&self) -> &Arc<ManyToOneRingBuffer> {
        &self.ring
    }

    /// Hands up to `limit` records to `handler` in the order they were
    /// published, and returns how many were handled.
    ///
    /// The payload slice borrows the buffer only for the duration of the
    /// handler call. Reading stops early at the end of the buffer; records
    /// after the wrap point are picked up by the next call.
    pub fn read<F>(&mut self, mut handler: F, limit: usize) -> usize
    where
        F: FnMut(i32, &[u8]),
    {
        let ring = &*self.ring;
        let head = ring.head.value.load(Ordering::Relaxed);
        let head_index = head & ring.mask;
        let contiguous = ring.capacity - head_index;

        let mut guard = ReleaseOnDrop {
            ring,
            head,
            head_index,
            bytes_read: 0,
        };
        let mut messages_read = 0;

        while guard.bytes_read < contiguous && messages_read < limit {
            let record_index = head_index + guard.bytes_read;
            let record_length = ring.length_at(record_index).load(Ordering::Acquire);
            if record_length <= 0 {
                break;
            }

            let record_length = record_length as usize;
            guard.bytes_read += align(record_length, RECORD_ALIGNMENT);

            let msg_type_id = ring.type_at(record_index).load(Ordering::Relaxed);
            if msg_type_id == PADDING_MSG_TYPE_ID {
                continue;
            }

            messages_read += 1;
            // SAFETY: the release store of the length happened after the
            // payload was written, and nobody writes this region again until
            // the guard below moves the head past it.
            let payload = unsafe {
                std::slice::from_raw_parts(
                    ring.base().add(record_index + HEADER_LENGTH),
                    record_length - HEADER_LENGTH,
                )
            };
            handler(msg_type_id, payload);
        }

        messages_read
    }
}

impl Drop for RingBufferConsumer {
    fn drop(&mut self) {
        self.ring.consumer_claimed.store(false, Ordering::Release);
    }
}

/// Zeroes consumed records and advances the head, even if a handler unwinds.
struct ReleaseOnDrop<'a> {
    ring: &'a ManyToOneRingBuffer,
    head: usize,
    head_index: usize,
    bytes_read: usize,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if self.bytes_read == 0 {
            return;
        }

        // SAFETY: the region was published and has been fully consumed; no
        // producer can claim it until the head store below.
        unsafe {
            ptr::write_bytes(
                self.ring.base().add(self.head_index),
                0,
                self.bytes_read,
            );
        }
        self.ring
            .head
            .value
            .store(self.head.wrapping_add(self.bytes_read), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(consumer: &mut RingBufferConsumer, limit: usize) -> Vec<(i32, Vec<u8>)> {
        let mut out = Vec::new();
        consumer.read(|t, p| out.push((t, p.to_vec())), limit);
        out
    }

    #[test]
    fn test_invalid_capacity() {
        assert_eq!(
            ManyToOneRingBuffer::new(100).unwrap_err(),
            QueueError::InvalidCapacity(100)
        );
        assert!(ManyToOneRingBuffer::new(32).is_err());
        assert!(ManyToOneRingBuffer::new(64).is_ok());
    }

    #[test]
    fn test_write_read() {
        let ring = Arc::new(ManyToOneRingBuffer::new(1024).unwrap());
        let mut consumer = RingBufferConsumer::claim(Arc::clone(&ring)).unwrap();

        ring.write(3, b"abc").unwrap();
        ring.write(4, b"").unwrap();
        assert!(!ring.is_empty());

        let records = drain(&mut consumer, 10);
        assert_eq!(records, vec![(3, b"abc".to_vec()), (4, Vec::new())]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_read_respects_limit() {
        let ring = Arc::new(ManyToOneRingBuffer::new(1024).unwrap());
        let mut consumer = RingBufferConsumer::claim(Arc::clone(&ring)).unwrap();

        for i in 1..=5u8 {
            ring.write(1, &[i]).unwrap();
        }

        let first = drain(&mut consumer, 3);
        assert_eq!(first.len(), 3);
        let rest = drain(&mut consumer, 10);
        assert_eq!(
            rest,
            vec![(1, vec![4]), (1, vec![5])]
        );
    }

    #[test]
    fn test_insufficient_capacity() {
        let ring = Arc::new(ManyToOneRingBuffer::new(64).unwrap());
        let mut consumer = RingBufferConsumer::claim(Arc::clone(&ring)).unwrap();

        // Each record takes 16 bytes (8 header + 8 payload)
        for _ in 0..4 {
            ring.write(1, &[0u8; 8]).unwrap();
        }
        assert_eq!(
            ring.write(1, &[0u8; 8]),
            Err(QueueError::InsufficientCapacity)
        );

        drain(&mut consumer, 1);
        assert!(ring.write(1, &[0u8; 8]).is_ok());
    }

    #[test]
    fn test_message_too_long() {
        let ring = ManyToOneRingBuffer::new(1024).unwrap();
        assert_eq!(
            ring.write(1, &[0u8; 129]),
            Err(QueueError::MessageTooLong {
                length: 129,
                max: 128
            })
        );
    }

    #[test]
    fn test_invalid_message_type() {
        let ring = ManyToOneRingBuffer::new(1024).unwrap();
        assert_eq!(
            ring.write(0, b"x"),
            Err(QueueError::InvalidMessageType(0))
        );
        assert_eq!(
            ring.write(PADDING_MSG_TYPE_ID, b"x"),
            Err(QueueError::InvalidMessageType(PADDING_MSG_TYPE_ID))
        );
    }

    #[test]
    fn test_wraparound_with_padding() {
        let ring = Arc::new(ManyToOneRingBuffer::new(128).unwrap());
        let mut consumer = RingBufferConsumer::claim(Arc::clone(&ring)).unwrap();

        // 24-byte records: five fit, leaving 8 bytes before the end
        for i in 0..5u8 {
            ring.write(1, &[i; 16]).unwrap();
        }
        assert_eq!(drain(&mut consumer, 10).len(), 5);

        // Does not fit in the last 8 bytes, so it pads and wraps to 0
        ring.write(2, &[3u8; 16]).unwrap();

        // First read only consumes the padding at the end of the buffer
        assert!(drain(&mut consumer, 10).is_empty());
        assert_eq!(drain(&mut consumer, 10), vec![(2, vec![3u8; 16])]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wraparound_many_rounds() {
        let ring = Arc::new(ManyToOneRingBuffer::new(128).unwrap());
        let mut consumer = RingBufferConsumer::claim(Arc::clone(&ring)).unwrap();

        let mut expected = 0u32;
        for round in 0..100u32 {
            for i in 0..3u32 {
                ring.write(1, &(round * 3 + i).to_le_bytes()).unwrap();
            }
            let mut got = Vec::new();
            while got.len() < 3 {
                consumer.read(
                    |_, p| got.push(u32::from_le_bytes(p.try_into().unwrap())),
                    10,
                );
            }
            for value in got {
                assert_eq!(value, expected);
                expected += 1;
            }
        }
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let ring = ManyToOneRingBuffer::new(1024).unwrap();
        assert_eq!(ring.next_correlation_id(), 1);
        assert_eq!(ring.next_correlation_id(), 2);
    }

    #[test]
    fn test_single_consumer_claim() {
        let ring = Arc::new(ManyToOneRingBuffer::new(1024).unwrap());
        let consumer = RingBufferConsumer::claim(Arc::clone(&ring)).unwrap();

        assert_eq!(
            RingBufferConsumer::claim(Arc::clone(&ring)).unwrap_err(),
            QueueError::ConsumerClaimed
        );

        drop(consumer);
        assert!(RingBufferConsumer::claim(ring).is_ok());
    }
}

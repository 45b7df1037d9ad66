//! # Overview
//!
//! `ringbuf` is the bounded queue of captured datagrams that decouples the
//! receiver's network loop from the disk writer. Exactly one producer (the
//! network thread) and one consumer (the disk thread) share it.
//!
//! # Design
//!
//! Built on [`crossbeam_channel::bounded`]: `send` blocks the producer when
//! the queue is full (the protocol's "reserve, fill, confirm" in one call)
//! and `recv` blocks the consumer when it is empty (the protocol's "peek,
//! then pop" in one call, since ownership of the received [`Slot`] transfers
//! immediately — there is no use case in this workspace for inspecting a
//! slot and leaving it queued). [`Consumer::len`] exposes the current
//! fill-depth for the receiver's EWMA retransmit-rate feedback.
//!
//! # Invariants
//!
//! - Arrival order is preserved: the consumer observes slots in exactly the
//!   order the producer sent them.
//! - A [`Slot`] with `block_index == 0` is the sentinel the disk writer uses
//!   to recognize a closed transfer; producers must only send it once, as
//!   the final item.

use wire::BlockType;

/// Default bound on the number of in-flight datagrams, matching the
/// protocol's `MAX_BLOCKS_QUEUED`.
pub const DEFAULT_CAPACITY: usize = 4096;

/// One captured datagram moving from the network thread to the disk thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    /// 1-based block index, or `0` for the sentinel.
    pub block_index: u32,
    /// The datagram's classification.
    pub block_type: BlockType,
    /// Up to `block_size` payload bytes.
    pub payload: Vec<u8>,
}

impl Slot {
    /// Builds the sentinel slot the disk writer uses to detect shutdown.
    #[must_use]
    pub const fn sentinel() -> Self {
        Self {
            block_index: 0,
            block_type: BlockType::Terminate,
            payload: Vec::new(),
        }
    }

    /// Returns `true` when this slot is the shutdown sentinel.
    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        self.block_index == 0
    }
}

/// The producer half, owned by the receiver's network thread.
#[derive(Clone)]
pub struct Producer {
    sender: crossbeam_channel::Sender<Slot>,
}

impl Producer {
    /// Reserves a slot, publishes `slot` into it, blocking while the queue
    /// is full.
    ///
    /// Returns `Err` only once the paired [`Consumer`] has been dropped.
    pub fn send(&self, slot: Slot) -> Result<(), SendError> {
        self.sender.send(slot).map_err(|_| SendError::Closed)
    }
}

/// The consumer half, owned by the disk writer thread.
pub struct Consumer {
    receiver: crossbeam_channel::Receiver<Slot>,
}

impl Consumer {
    /// Blocks until a slot is available and returns it.
    ///
    /// Returns `Err` once the queue is empty and every [`Producer`] clone has
    /// been dropped.
    pub fn recv(&self) -> Result<Slot, RecvError> {
        self.receiver.recv().map_err(|_| RecvError::Closed)
    }

    /// Returns the number of slots currently queued, for fill-depth
    /// telemetry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` when no slots are currently queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Error returned when a [`Producer::send`] cannot be delivered.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum SendError {
    /// The paired [`Consumer`] was dropped.
    #[error("ring buffer consumer has been dropped")]
    Closed,
}

/// Error returned when a [`Consumer::recv`] finds the queue permanently
/// empty.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum RecvError {
    /// Every [`Producer`] clone was dropped and the queue is drained.
    #[error("ring buffer has no producers and is empty")]
    Closed,
}

/// Creates a bounded single-producer/single-consumer datagram queue with
/// room for `capacity` slots.
#[must_use]
pub fn channel(capacity: usize) -> (Producer, Consumer) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    (Producer { sender }, Consumer { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(index: u32) -> Slot {
        Slot {
            block_index: index,
            block_type: BlockType::Original,
            payload: vec![0xAB; 4],
        }
    }

    #[test]
    fn preserves_arrival_order() {
        let (producer, consumer) = channel(4);
        for i in 1..=3 {
            producer.send(slot(i)).unwrap();
        }
        for i in 1..=3 {
            assert_eq!(consumer.recv().unwrap().block_index, i);
        }
    }

    #[test]
    fn len_reflects_fill_depth() {
        let (producer, consumer) = channel(4);
        assert_eq!(consumer.len(), 0);
        producer.send(slot(1)).unwrap();
        producer.send(slot(2)).unwrap();
        assert_eq!(consumer.len(), 2);
        consumer.recv().unwrap();
        assert_eq!(consumer.len(), 1);
    }

    #[test]
    fn sentinel_is_recognized() {
        assert!(Slot::sentinel().is_sentinel());
        assert!(!slot(1).is_sentinel());
    }

    #[test]
    fn recv_fails_once_producers_dropped_and_drained() {
        let (producer, consumer) = channel(1);
        producer.send(slot(1)).unwrap();
        drop(producer);
        assert_eq!(consumer.recv().unwrap().block_index, 1);
        assert_eq!(consumer.recv().unwrap_err(), RecvError::Closed);
    }

    #[test]
    fn send_fails_once_consumer_dropped() {
        let (producer, consumer) = channel(1);
        drop(consumer);
        assert_eq!(producer.send(slot(1)).unwrap_err(), SendError::Closed);
    }

    #[test]
    fn producer_blocks_until_consumer_drains() {
        let (producer, consumer) = channel(1);
        producer.send(slot(1)).unwrap();

        let producer2 = producer.clone();
        let handle = std::thread::spawn(move || producer2.send(slot(2)).unwrap());

        // Give the blocked sender a moment to actually block before draining.
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(consumer.recv().unwrap().block_index, 1);
        handle.join().unwrap();
        assert_eq!(consumer.recv().unwrap().block_index, 2);
    }
}

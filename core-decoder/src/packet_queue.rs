//! # Packet Queue
//!
//! Bounded FIFO between the bitstream reader and the decode loop.
//!
//! `push` and `pop` never block: a full queue rejects the packet and hands it
//! back, an empty queue returns `None`. Callers that want to wait use
//! [`PacketQueue::wait_for_packet`] / [`PacketQueue::wait_for_space`], which
//! are bounded and woken by [`PacketQueue::interrupt`].

use crate::packet::Packet;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Rejected push; carries the packet back to the producer.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueFull {
    pub packet: Packet,
    pub capacity: usize,
}

impl fmt::Display for QueueFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packet queue full ({} packets), packet {} rejected",
            self.capacity, self.packet.seq
        )
    }
}

impl std::error::Error for QueueFull {}

pub struct PacketQueue {
    packets: Mutex<VecDeque<Packet>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            packets: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.lock().is_empty()
    }

    /// Append at the tail, or reject if the queue is at capacity.
    pub fn push(&self, packet: Packet) -> Result<(), QueueFull> {
        let mut packets = self.packets.lock();
        if packets.len() >= self.capacity {
            return Err(QueueFull {
                packet,
                capacity: self.capacity,
            });
        }
        packets.push_back(packet);
        drop(packets);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head packet, if any.
    pub fn pop(&self) -> Option<Packet> {
        let packet = self.packets.lock().pop_front();
        if packet.is_some() {
            self.not_full.notify_one();
        }
        packet
    }

    /// Empty the queue, releasing every packet. Returns how many were freed.
    pub fn drain_and_free(&self) -> usize {
        let drained: Vec<Packet> = self.packets.lock().drain(..).collect();
        self.not_full.notify_all();
        drained.len()
    }

    /// Wait up to `timeout` for the queue to become non-empty.
    ///
    /// Returns `true` if a packet is available. Spurious and interrupt
    /// wake-ups return early; callers loop on their exit flag.
    pub fn wait_for_packet(&self, timeout: Duration) -> bool {
        let mut packets = self.packets.lock();
        if packets.is_empty() {
            self.not_empty.wait_for(&mut packets, timeout);
        }
        !packets.is_empty()
    }

    /// Wait up to `timeout` for a free slot.
    pub fn wait_for_space(&self, timeout: Duration) -> bool {
        let mut packets = self.packets.lock();
        if packets.len() >= self.capacity {
            self.not_full.wait_for(&mut packets, timeout);
        }
        packets.len() < self.capacity
    }

    /// Wake every waiter so it can observe an exit request.
    pub fn interrupt(&self) {
        let _packets = self.packets.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

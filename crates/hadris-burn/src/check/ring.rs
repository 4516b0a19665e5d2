//! The async chunk ring, built on `std::sync::mpsc::sync_channel` rather
//! than a hand-rolled busy-poll ring. Preserves the ≤256 MiB memory budget
//! as a construction parameter.

use super::spot::Quality;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{JoinHandle, Scope, ScopedJoinHandle};

/// One chunk handed from the producer (the verification read loop) to the
/// MD5 hashing worker.
#[derive(Debug)]
pub struct Chunk {
    pub base_lba: u64,
    pub blocks: u64,
    pub data: Vec<u8>,
    /// Quality the producer already determined from read timing (`Good` /
    /// `Slow` / `Partial`); the worker's md5 verdict overrides it.
    pub default_quality: Quality,
}

/// End-of-stream marker, sent once the producer has no more chunks.
#[derive(Debug)]
pub enum RingMessage {
    Chunk(Chunk),
    EndOfStream,
}

/// A bounded producer/consumer ring. `buffer_count` buffers of
/// `buffer_size` bytes each, capped so `buffer_count * buffer_size` does
/// not exceed the configured memory budget.
pub struct ChunkRing {
    sender: SyncSender<RingMessage>,
}

impl ChunkRing {
    /// Computes the largest buffer count (at least 2) that fits the
    /// configured memory budget for the given buffer size.
    pub fn buffer_count_for_budget(buffer_size: usize, memory_budget: usize) -> usize {
        (memory_budget / buffer_size.max(1)).max(2)
    }

    /// Spawns the worker thread and returns a ring for pushing chunks plus
    /// a join handle the caller awaits after pushing `EndOfStream`.
    pub fn spawn<F>(buffer_count: usize, worker: F) -> (Self, JoinHandle<()>)
    where
        F: FnOnce(Receiver<RingMessage>) + Send + 'static,
    {
        let bound = buffer_count.max(2);
        let (sender, receiver) = sync_channel(bound);
        let handle = std::thread::spawn(move || worker(receiver));
        (Self { sender }, handle)
    }

    /// Like [`Self::spawn`], but runs the worker on a scoped thread so it
    /// can borrow data (such as the chain it mutates) that only lives for
    /// the duration of the enclosing [`std::thread::scope`] call, rather
    /// than requiring `'static` captures.
    pub fn spawn_scoped<'scope, 'env, F>(
        scope: &'scope Scope<'scope, 'env>,
        buffer_count: usize,
        worker: F,
    ) -> (Self, ScopedJoinHandle<'scope, ()>)
    where
        F: FnOnce(Receiver<RingMessage>) + Send + 'scope,
    {
        let bound = buffer_count.max(2);
        let (sender, receiver) = sync_channel(bound);
        let handle = scope.spawn(move || worker(receiver));
        (Self { sender }, handle)
    }

    pub fn push_chunk(&self, chunk: Chunk) -> Result<(), Chunk> {
        self.sender
            .send(RingMessage::Chunk(chunk))
            .map_err(|e| match e.0 {
                RingMessage::Chunk(chunk) => chunk,
                RingMessage::EndOfStream => unreachable!(),
            })
    }

    /// Producer ends by sending end-of-stream; the caller then joins the
    /// worker thread to await completion.
    pub fn end_of_stream(self) {
        let _ = self.sender.send(RingMessage::EndOfStream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn buffer_count_respects_memory_budget() {
        let count = ChunkRing::buffer_count_for_budget(1024 * 1024, 8 * 1024 * 1024);
        assert_eq!(count, 8);
        // Never drops below the minimum of 2, even for an oversized buffer.
        let count = ChunkRing::buffer_count_for_budget(300 * 1024 * 1024, 256 * 1024 * 1024);
        assert_eq!(count, 2);
    }

    #[test]
    fn worker_consumes_chunks_in_order_and_sees_end_of_stream() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let (ring, handle) = ChunkRing::spawn(4, move |rx| {
            while let Ok(message) = rx.recv() {
                match message {
                    RingMessage::Chunk(chunk) => seen_clone.lock().unwrap().push(chunk.base_lba),
                    RingMessage::EndOfStream => break,
                }
            }
        });

        for lba in 0..5 {
            ring.push_chunk(Chunk {
                base_lba: lba,
                blocks: 1,
                data: vec![0u8; 16],
                default_quality: Quality::Good,
            })
            .unwrap();
        }
        ring.end_of_stream();
        handle.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}

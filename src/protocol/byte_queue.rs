//! Chunked inbound byte queue with exact-size reads.
//!
//! Socket reads arrive in arbitrary segment sizes while the frame decoder asks
//! for 1, 2, 4, 8 or N bytes at a time. [`ByteQueue`] keeps the chunks as they
//! arrived and only copies when a read spans a chunk boundary.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use tcp_websocket::protocol::ByteQueue;
//!
//! let mut queue = ByteQueue::new();
//! queue.put(Bytes::from_static(b"he"));
//! queue.put(Bytes::from_static(b"llo"));
//!
//! assert!(queue.read(6).is_none());
//! assert_eq!(&queue.read(3).unwrap()[..], b"hel");
//! assert_eq!(queue.len(), 2);
//! ```

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

/// Ordered queue of inbound byte chunks.
#[derive(Debug, Default)]
pub struct ByteQueue {
    /// Buffered chunks; never contains an empty chunk.
    chunks: VecDeque<Bytes>,
    /// Sum of all chunk lengths.
    size: usize,
}

impl ByteQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn put(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.size += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Append a copy of `data`.
    pub fn put_slice(&mut self, data: &[u8]) {
        self.put(Bytes::copy_from_slice(data));
    }

    /// Extract exactly `n` bytes.
    ///
    /// Returns `None` if fewer than `n` bytes are buffered; nothing is consumed
    /// in that case. Reads contained in the head chunk are zero-copy.
    pub fn read(&mut self, n: usize) -> Option<Bytes> {
        if n > self.size {
            return None;
        }
        if n == 0 {
            return Some(Bytes::new());
        }

        let head = self.chunks.front_mut()?;
        if head.len() == n {
            self.size -= n;
            return self.chunks.pop_front();
        }
        if head.len() > n {
            self.size -= n;
            return Some(head.split_to(n));
        }

        // Spans chunks: concatenate, leaving the remainder of the last one at the head.
        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let Some(mut chunk) = self.chunks.pop_front() else {
                break;
            };
            if chunk.len() <= remaining {
                remaining -= chunk.len();
                out.extend_from_slice(&chunk);
            } else {
                out.extend_from_slice(&chunk.split_to(remaining));
                remaining = 0;
                self.chunks.push_front(chunk);
            }
        }
        self.size -= n;
        Some(out.freeze())
    }

    /// Take everything buffered as one contiguous buffer.
    pub fn take_all(&mut self) -> Bytes {
        let size = self.size;
        self.read(size).unwrap_or_default()
    }

    /// Number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether nothing is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of buffered chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(chunks: &[&'static [u8]]) -> ByteQueue {
        let mut queue = ByteQueue::new();
        for chunk in chunks {
            queue.put(Bytes::from_static(chunk));
        }
        queue
    }

    #[test]
    fn test_put_ignores_empty_chunks() {
        let mut queue = ByteQueue::new();
        queue.put(Bytes::new());
        assert!(queue.is_empty());
        assert_eq!(queue.chunk_count(), 0);
    }

    #[test]
    fn test_read_zero_does_not_mutate() {
        let mut queue = queue_of(&[b"abc"]);
        let out = queue.read(0).unwrap();
        assert!(out.is_empty());
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.chunk_count(), 1);

        let mut empty = ByteQueue::new();
        assert!(empty.read(0).unwrap().is_empty());
    }

    #[test]
    fn test_read_insufficient_does_not_mutate() {
        let mut queue = queue_of(&[b"ab", b"c"]);
        assert!(queue.read(4).is_none());
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.chunk_count(), 2);
        assert_eq!(&queue.read(3).unwrap()[..], b"abc");
    }

    #[test]
    fn test_read_whole_head_chunk_is_zero_copy() {
        let original = Bytes::from_static(b"hello");
        let mut queue = ByteQueue::new();
        queue.put(original.clone());

        let out = queue.read(5).unwrap();
        assert_eq!(out.as_ptr(), original.as_ptr());
        assert!(queue.is_empty());
        assert_eq!(queue.chunk_count(), 0);
    }

    #[test]
    fn test_read_prefix_of_head_chunk() {
        let original = Bytes::from_static(b"hello");
        let mut queue = ByteQueue::new();
        queue.put(original.clone());

        let out = queue.read(2).unwrap();
        assert_eq!(&out[..], b"he");
        assert_eq!(out.as_ptr(), original.as_ptr());
        assert_eq!(queue.len(), 3);
        assert_eq!(&queue.read(3).unwrap()[..], b"llo");
    }

    #[test]
    fn test_read_across_chunks_splits_last() {
        let mut queue = queue_of(&[b"ab", b"cd", b"efg"]);
        let out = queue.read(5).unwrap();
        assert_eq!(&out[..], b"abcde");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.chunk_count(), 1);
        assert_eq!(&queue.read(2).unwrap()[..], b"fg");
    }

    #[test]
    fn test_read_across_exact_chunk_boundary() {
        let mut queue = queue_of(&[b"ab", b"cd", b"ef"]);
        assert_eq!(&queue.read(4).unwrap()[..], b"abcd");
        assert_eq!(queue.chunk_count(), 1);
        assert_eq!(&queue.read(2).unwrap()[..], b"ef");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut queue = ByteQueue::new();
        for byte in b"frame" {
            queue.put_slice(&[*byte]);
        }
        assert_eq!(queue.chunk_count(), 5);
        assert_eq!(&queue.read(5).unwrap()[..], b"frame");
    }

    #[test]
    fn test_take_all_and_clear() {
        let mut queue = queue_of(&[b"ab", b"cd"]);
        assert_eq!(&queue.take_all()[..], b"abcd");
        assert!(queue.is_empty());

        queue.put_slice(b"xyz");
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.read(1).is_none());
    }
}

//! Append-only segmented byte arena.
//!
//! The writer keeps its node buffer and tables in [`SegmentedBuffer`]s. Data is
//! appended into fixed-size segments so growth never reallocates (and copies)
//! what was already written, and so that in streaming mode full segments can
//! be handed to the compressor and dropped while the session continues.

/// Position of a byte inside a [`SegmentedBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAddr {
    pub segment: u32,
    pub offset: u32,
}

/// Append-only byte store split into same-sized segments.
#[derive(Debug)]
pub struct SegmentedBuffer {
    segment_size: usize,
    /// `None` once a segment has been taken for streaming.
    segments: Vec<Option<Vec<u8>>>,
    len: usize,
}

impl SegmentedBuffer {
    /// Create an empty buffer. `segment_size` is clamped to at least one byte.
    pub fn new(segment_size: usize) -> Self {
        Self {
            segment_size: segment_size.max(1),
            segments: Vec::new(),
            len: 0,
        }
    }

    /// Total number of bytes ever appended, including taken segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address the next appended byte will get.
    pub fn next_addr(&self) -> BufferAddr {
        BufferAddr {
            segment: (self.len / self.segment_size) as u32,
            offset: (self.len % self.segment_size) as u32,
        }
    }

    /// Convert a segment-relative address into a flat offset.
    #[inline]
    pub fn flat(&self, addr: BufferAddr) -> usize {
        addr.segment as usize * self.segment_size + addr.offset as usize
    }

    /// Append bytes, spilling into new segments as needed.
    ///
    /// Returns the address of the first appended byte.
    pub fn append(&mut self, mut bytes: &[u8]) -> BufferAddr {
        let start = self.next_addr();
        let segment_size = self.segment_size;
        while !bytes.is_empty() {
            let segment = self.current_segment();
            let room = segment_size - segment.len();
            let (now, rest) = bytes.split_at(room.min(bytes.len()));
            segment.extend_from_slice(now);
            self.len += now.len();
            bytes = rest;
        }
        start
    }

    fn current_segment(&mut self) -> &mut Vec<u8> {
        let needs_new = match self.segments.last() {
            Some(Some(last)) => last.len() == self.segment_size,
            // Taken segments are always full
            Some(None) | None => true,
        };
        if needs_new {
            self.segments.push(Some(Vec::with_capacity(self.segment_size)));
        }
        match self.segments.last_mut() {
            Some(Some(segment)) => segment,
            _ => unreachable!("a writable segment was just ensured"),
        }
    }

    /// Compare the bytes stored at `addr` with `bytes`.
    ///
    /// Returns `false` if any of the range has been taken or lies past the end.
    pub fn matches(&self, addr: BufferAddr, bytes: &[u8]) -> bool {
        let mut pos = self.flat(addr);
        if pos + bytes.len() > self.len {
            return false;
        }
        let mut rest = bytes;
        while !rest.is_empty() {
            let (index, offset) = (pos / self.segment_size, pos % self.segment_size);
            let Some(Some(segment)) = self.segments.get(index) else {
                return false;
            };
            let stored = &segment[offset..];
            let n = stored.len().min(rest.len());
            if stored[..n] != rest[..n] {
                return false;
            }
            rest = &rest[n..];
            pos += n;
        }
        true
    }

    /// Copy `len` bytes starting at `addr` out of the buffer.
    pub fn read(&self, addr: BufferAddr, len: usize) -> Option<Vec<u8>> {
        let mut pos = self.flat(addr);
        if pos + len > self.len {
            return None;
        }
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let (index, offset) = (pos / self.segment_size, pos % self.segment_size);
            let segment = self.segments.get(index)?.as_ref()?;
            let n = (segment.len() - offset).min(len - out.len());
            out.extend_from_slice(&segment[offset..offset + n]);
            pos += n;
        }
        Some(out)
    }

    /// Take every completely filled segment that has not been taken yet.
    ///
    /// Used in streaming mode; the taken memory is released from the buffer.
    pub fn take_full_segments(&mut self) -> Vec<Vec<u8>> {
        let segment_size = self.segment_size;
        self.segments
            .iter_mut()
            .filter(|slot| matches!(slot, Some(segment) if segment.len() == segment_size))
            .filter_map(Option::take)
            .collect()
    }

    /// Take every segment still held, including a partially filled last one.
    pub fn take_all_segments(&mut self) -> Vec<Vec<u8>> {
        self.segments.iter_mut().filter_map(Option::take).collect()
    }

    /// Copy all held bytes, in order, to `out`.
    pub fn copy_to(&self, out: &mut Vec<u8>) {
        for segment in self.segments.iter().flatten() {
            out.extend_from_slice(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_spans_segments() {
        let mut buffer = SegmentedBuffer::new(4);
        buffer.append(b"xy");
        let addr = buffer.append(b"hello");
        assert_eq!(buffer.read(addr, 5).as_deref(), Some(&b"hello"[..]));
        assert_eq!(buffer.read(addr, 6), None);
    }

    #[test]
    fn test_append_across_segments() {
        let mut buffer = SegmentedBuffer::new(4);
        let a = buffer.append(b"abc");
        let b = buffer.append(b"defgh");

        assert_eq!(a, BufferAddr { segment: 0, offset: 0 });
        assert_eq!(b, BufferAddr { segment: 0, offset: 3 });
        assert_eq!(buffer.flat(b), 3);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.next_addr(), BufferAddr { segment: 2, offset: 0 });

        let mut out = Vec::new();
        buffer.copy_to(&mut out);
        assert_eq!(out, b"abcdefgh");
    }

    #[test]
    fn test_matches_spanning_segments() {
        let mut buffer = SegmentedBuffer::new(4);
        buffer.append(b"xx");
        let addr = buffer.append(b"hello");

        assert!(buffer.matches(addr, b"hello"));
        assert!(buffer.matches(addr, b"hel"));
        assert!(!buffer.matches(addr, b"help"));
        assert!(!buffer.matches(addr, b"hello!"));
    }

    #[test]
    fn test_take_full_segments_streams() {
        let mut buffer = SegmentedBuffer::new(4);
        buffer.append(b"0123456789");

        let taken = buffer.take_full_segments();
        assert_eq!(taken, vec![b"0123".to_vec(), b"4567".to_vec()]);
        assert!(buffer.take_full_segments().is_empty());

        // Appending keeps counting from the flushed position
        let addr = buffer.append(b"ab");
        assert_eq!(buffer.flat(addr), 10);
        assert_eq!(buffer.take_all_segments(), vec![b"89ab".to_vec()]);
        assert_eq!(buffer.len(), 12);
    }

    #[test]
    fn test_new_segment_after_taken_full_segment() {
        let mut buffer = SegmentedBuffer::new(2);
        buffer.append(b"ab");
        buffer.take_full_segments();
        let addr = buffer.append(b"c");
        assert_eq!(addr, BufferAddr { segment: 1, offset: 0 });
        assert_eq!(buffer.take_all_segments(), vec![b"c".to_vec()]);
    }
}

use crate::buffer::ProbeBuffer;

/// Which side of an [`Intake`] is currently being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The probe buffer still holds unread lookahead.
    Buffer,
    /// The buffer is empty; the delivered chunk is read directly.
    Chunk,
}

/// One delivery's view over the probe buffer and the newly arrived chunk.
///
/// Reads come from the buffer while it has unread bytes and from the chunk
/// otherwise. `stash` moves chunk bytes into the buffer; a byte is counted
/// against exactly one of the two cursors.
pub struct Intake<'a> {
    buffer: &'a mut ProbeBuffer,
    chunk: &'a [u8],
    cursor: usize,
}

impl<'a> Intake<'a> {
    pub fn new(buffer: &'a mut ProbeBuffer, chunk: &'a [u8]) -> Self {
        Self {
            buffer,
            chunk,
            cursor: 0,
        }
    }

    /// The source `head` and `consume` currently operate on.
    pub fn source(&self) -> Source {
        if self.buffer.is_empty() {
            Source::Chunk
        } else {
            Source::Buffer
        }
    }

    /// Unread bytes of the active source.
    pub fn head(&self) -> &[u8] {
        match self.source() {
            Source::Buffer => self.buffer.unread(),
            Source::Chunk => &self.chunk[self.cursor..],
        }
    }

    /// Length of [`head`](Self::head).
    pub fn available(&self) -> usize {
        self.head().len()
    }

    /// Advance the active source by `n` bytes.
    pub fn consume(&mut self, n: usize) {
        match self.source() {
            Source::Buffer => self.buffer.consume(n),
            Source::Chunk => {
                debug_assert!(n <= self.chunk.len() - self.cursor, "consumed past chunk end");
                self.cursor = (self.cursor + n).min(self.chunk.len());
            }
        }
    }

    /// Chunk bytes not yet read or stashed.
    pub fn chunk_remaining(&self) -> &[u8] {
        &self.chunk[self.cursor..]
    }

    /// Copy as much of the chunk's remainder into the buffer as fits.
    ///
    /// Returns the number of bytes moved; the chunk cursor advances by the
    /// same amount.
    pub fn stash(&mut self) -> usize {
        let moved = self.buffer.push(&self.chunk[self.cursor..]);
        self.cursor += moved;
        moved
    }

    /// True once both the buffer and the chunk are fully read.
    pub fn is_exhausted(&self) -> bool {
        self.buffer.is_empty() && self.cursor == self.chunk.len()
    }

    /// True when waiting for more input cannot grow the probe window.
    ///
    /// That is the case when the buffer is full, or when it is unused and
    /// the chunk alone already covers its capacity.
    pub fn is_saturated(&self) -> bool {
        self.buffer.is_full()
            || (self.buffer.is_empty() && self.chunk.len() - self.cursor >= self.buffer.capacity())
    }

    pub fn buffer(&self) -> &ProbeBuffer {
        &*self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> ProbeBuffer {
        ProbeBuffer::try_with_capacity(16).unwrap()
    }

    #[test]
    fn empty_buffer_reads_chunk_directly() {
        let mut buf = buffer();
        let mut intake = Intake::new(&mut buf, b"abcdef");
        assert_eq!(intake.source(), Source::Chunk);
        assert_eq!(intake.head(), b"abcdef");

        intake.consume(2);
        assert_eq!(intake.head(), b"cdef");
        assert_eq!(intake.chunk_remaining(), b"cdef");
        assert!(!intake.is_exhausted());

        intake.consume(4);
        assert!(intake.is_exhausted());
        assert!(buf.is_empty());
    }

    #[test]
    fn buffer_takes_precedence_until_drained() {
        let mut buf = buffer();
        buf.push(b"ab");
        let mut intake = Intake::new(&mut buf, b"cd");

        assert_eq!(intake.source(), Source::Buffer);
        assert_eq!(intake.head(), b"ab");

        intake.consume(2);
        assert_eq!(intake.source(), Source::Chunk);
        assert_eq!(intake.head(), b"cd");
    }

    #[test]
    fn stash_moves_remainder_exactly_once() {
        let mut buf = buffer();
        buf.push(b"ab");
        let mut intake = Intake::new(&mut buf, b"cdef");

        assert_eq!(intake.stash(), 4);
        assert_eq!(intake.head(), b"abcdef");
        assert!(intake.chunk_remaining().is_empty());
        assert_eq!(intake.stash(), 0);

        intake.consume(6);
        assert!(intake.is_exhausted());
    }

    #[test]
    fn stash_leaves_overflow_in_chunk() {
        let mut buf = buffer();
        buf.push(&[1u8; 10]);
        let chunk = [2u8; 10];
        let mut intake = Intake::new(&mut buf, &chunk);

        assert_eq!(intake.stash(), 6);
        assert_eq!(intake.chunk_remaining(), &[2u8; 4]);
        assert!(intake.is_saturated());

        intake.consume(16);
        assert_eq!(intake.source(), Source::Chunk);
        assert_eq!(intake.head(), &[2u8; 4]);
        assert!(!intake.is_saturated());
    }

    #[test]
    fn saturation_with_unused_buffer_depends_on_chunk_size() {
        let mut buf = buffer();
        let big = [0u8; 16];
        assert!(Intake::new(&mut buf, &big).is_saturated());

        let small = [0u8; 15];
        assert!(!Intake::new(&mut buf, &small).is_saturated());
    }
}

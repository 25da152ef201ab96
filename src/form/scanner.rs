use std::io::{self, Read};

/// Default size of the scan buffer in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// How a chunk returned by [`BoundaryScanner::next_chunk`] ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    /// More bytes of the current segment follow.
    Partial,
    /// The delimiter was found and consumed.
    Delimiter,
    /// The source is exhausted without the delimiter; the scanner is terminated.
    Exhausted,
}

/// Incremental reader that splits a byte source on a delimiter.
///
/// The delimiter may straddle any number of underlying reads: the final
/// `delim.len() - 1` bytes of the unread region are always held back until
/// more input proves they are not a delimiter prefix. The buffer has a fixed
/// size and is compacted in place when full.
pub struct BoundaryScanner<R> {
    source: R,
    buf: Box<[u8]>,
    head: usize,
    tail: usize,
    eof: bool,
    terminated: bool,
}

impl<R: Read> BoundaryScanner<R> {
    #[must_use]
    pub fn new(source: R) -> Self {
        Self::with_capacity(source, DEFAULT_BUFFER_SIZE)
    }

    /// Create a scanner with a buffer of `capacity` bytes (at least 2).
    #[must_use]
    pub fn with_capacity(source: R, capacity: usize) -> Self {
        Self {
            source,
            buf: vec![0; capacity.max(2)].into_boxed_slice(),
            head: 0,
            tail: 0,
            eof: false,
            terminated: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// True once every byte of the source has been handed out.
    #[inline]
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Return the next run of bytes that precedes `delim`.
    ///
    /// `None` means the scanner is terminated. A [`SegmentEnd::Partial`]
    /// chunk may be empty when the buffer holds nothing but a possible
    /// delimiter prefix.
    pub fn next_chunk(&mut self, delim: &[u8]) -> io::Result<Option<(&[u8], SegmentEnd)>> {
        if delim.is_empty() || delim.len() >= self.buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "delimiter of {} bytes does not fit a {} byte scan buffer",
                    delim.len(),
                    self.buf.len()
                ),
            ));
        }
        if self.terminated {
            return Ok(None);
        }

        self.fill()?;

        let start = self.head;
        if let Some(pos) = find(&self.buf[start..self.tail], delim) {
            self.head = start + pos + delim.len();
            return Ok(Some((&self.buf[start..start + pos], SegmentEnd::Delimiter)));
        }

        if self.eof {
            self.terminated = true;
            self.head = self.tail;
            return Ok(Some((&self.buf[start..self.tail], SegmentEnd::Exhausted)));
        }

        let keep = (delim.len() - 1).min(self.tail - start);
        let stop = self.tail - keep;
        self.head = stop;
        Ok(Some((&self.buf[start..stop], SegmentEnd::Partial)))
    }

    /// Feed every byte up to `delim` into `sink`; returns how the segment ended.
    pub fn read_until<F>(&mut self, delim: &[u8], mut sink: F) -> io::Result<SegmentEnd>
    where
        F: FnMut(&[u8]) -> io::Result<()>,
    {
        loop {
            match self.next_chunk(delim)? {
                None => return Ok(SegmentEnd::Exhausted),
                Some((data, end)) => {
                    if !data.is_empty() {
                        sink(data)?;
                    }
                    if end != SegmentEnd::Partial {
                        return Ok(end);
                    }
                }
            }
        }
    }

    /// Collect every byte up to `delim`.
    pub fn read_vec_until(&mut self, delim: &[u8]) -> io::Result<(Vec<u8>, SegmentEnd)> {
        let mut out = Vec::new();
        let end = self.read_until(delim, |data| {
            out.extend_from_slice(data);
            Ok(())
        })?;
        Ok((out, end))
    }

    /// Look at up to `n` upcoming bytes without consuming them.
    ///
    /// Fewer than `n` bytes are returned only at the end of the source.
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        let n = n.min(self.buf.len());
        while self.tail - self.head < n && !self.eof {
            self.fill()?;
        }
        let end = (self.head + n).min(self.tail);
        Ok(&self.buf[self.head..end])
    }

    /// Drop up to `n` buffered bytes.
    pub fn consume(&mut self, n: usize) {
        self.head = (self.head + n).min(self.tail);
    }

    /// One read into the free tail of the buffer, compacting first if full.
    fn fill(&mut self) -> io::Result<()> {
        if self.eof {
            return Ok(());
        }
        if self.tail == self.buf.len() && self.head > 0 {
            self.compact();
        }
        if self.tail == self.buf.len() {
            return Ok(());
        }
        loop {
            match self.source.read(&mut self.buf[self.tail..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.tail += n;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn compact(&mut self) {
        self.buf.copy_within(self.head..self.tail, 0);
        self.tail -= self.head;
        self.head = 0;
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Hands out at most `step` bytes per read and interrupts every other call.
    struct Stuttering<'a> {
        data: &'a [u8],
        step: usize,
        interrupt: bool,
    }

    impl Read for Stuttering<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "again"));
            }
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    fn segments<R: Read>(
        scanner: &mut BoundaryScanner<R>,
        delim: &[u8],
    ) -> Vec<(Vec<u8>, SegmentEnd)> {
        let mut out = Vec::new();
        loop {
            let (data, end) = scanner.read_vec_until(delim).unwrap();
            out.push((data, end));
            if end == SegmentEnd::Exhausted {
                return out;
            }
        }
    }

    #[test]
    fn splits_on_delimiter() {
        let mut scanner = BoundaryScanner::new(Cursor::new(b"one--two--three".to_vec()));
        let got = segments(&mut scanner, b"--");
        assert_eq!(
            got,
            vec![
                (b"one".to_vec(), SegmentEnd::Delimiter),
                (b"two".to_vec(), SegmentEnd::Delimiter),
                (b"three".to_vec(), SegmentEnd::Exhausted),
            ]
        );
        assert!(scanner.is_terminated());
        assert!(scanner.next_chunk(b"--").unwrap().is_none());
    }

    #[test]
    fn delimiter_straddling_interrupted_reads() {
        let data = b"aaaa\r\n--XYZbbbb\r\n--XYZ";
        let source = Stuttering {
            data,
            step: 3,
            interrupt: false,
        };
        let mut scanner = BoundaryScanner::with_capacity(source, 8);
        let got = segments(&mut scanner, b"\r\n--XYZ");
        assert_eq!(
            got,
            vec![
                (b"aaaa".to_vec(), SegmentEnd::Delimiter),
                (b"bbbb".to_vec(), SegmentEnd::Delimiter),
                (Vec::new(), SegmentEnd::Exhausted),
            ]
        );
    }

    #[test]
    fn rejects_delimiter_not_shorter_than_buffer() {
        let mut scanner = BoundaryScanner::with_capacity(Cursor::new(Vec::new()), 4);
        let err = scanner.next_chunk(b"abcd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(scanner.next_chunk(b"").is_err());
    }

    #[test]
    fn peek_refills_across_reads() {
        let source = Stuttering {
            data: b"X--rest",
            step: 1,
            interrupt: false,
        };
        let mut scanner = BoundaryScanner::with_capacity(source, 4);
        let (data, end) = scanner.read_vec_until(b"X").unwrap();
        assert!(data.is_empty());
        assert_eq!(end, SegmentEnd::Delimiter);
        assert_eq!(scanner.peek(2).unwrap(), b"--");
        scanner.consume(2);
        assert_eq!(scanner.peek(10).unwrap(), b"rest");
    }

    #[test]
    fn read_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone"))
            }
        }
        let mut scanner = BoundaryScanner::new(Broken);
        let err = scanner.read_vec_until(b"--").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}

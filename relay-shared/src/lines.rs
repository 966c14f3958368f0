use bytes::{Bytes, BytesMut};

/// Longest line kept by default. Anything longer is discarded up to its
/// terminator.
pub const MAX_LINE_LEN: usize = 4 * 1024 * 1024;

/// Reassembles lines from a chunked byte stream.
///
/// `\n`, `\r` and `\r\n` all end a line. Empty lines are dropped, so a
/// caller only ever sees non-empty lines without their terminator. Lines
/// longer than the configured limit are dropped whole.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    // Bytes of `buf` already known to hold no terminator.
    scanned: usize,
    max_line: usize,
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_LEN)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_line,
            discarding: false,
        }
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, or `None` until more bytes arrive.
    pub fn next_line(&mut self) -> Option<Bytes> {
        loop {
            let Some(offset) = self.buf[self.scanned..]
                .iter()
                .position(|b| *b == b'\n' || *b == b'\r')
            else {
                self.scanned = self.buf.len();
                if self.scanned > self.max_line {
                    self.buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                }
                return None;
            };

            let end = self.scanned + offset;
            let mut line = self.buf.split_to(end + 1);
            line.truncate(end);
            self.scanned = 0;

            if std::mem::take(&mut self.discarding) || line.len() > self.max_line {
                continue;
            }
            if !line.is_empty() {
                return Some(line.freeze());
            }
        }
    }

    /// Whatever is left once the stream has closed without a terminator.
    pub fn finish(&mut self) -> Option<Bytes> {
        let rest = self.buf.split();
        self.scanned = 0;
        let discarding = std::mem::take(&mut self.discarding);
        if rest.is_empty() || discarding || rest.len() > self.max_line {
            None
        } else {
            Some(rest.freeze())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(buffer: &mut LineBuffer) -> Vec<Bytes> {
        std::iter::from_fn(|| buffer.next_line()).collect()
    }

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"{\"done\":");
        assert!(buffer.next_line().is_none());
        buffer.extend(b"false}\n{\"done\":true}\n");
        assert_eq!(
            drain(&mut buffer),
            vec![
                Bytes::from_static(b"{\"done\":false}"),
                Bytes::from_static(b"{\"done\":true}"),
            ]
        );
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn drops_blank_lines_and_carriage_returns() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"a\r\n\r\n\nb\rc\n");
        assert_eq!(
            drain(&mut buffer),
            vec![
                Bytes::from_static(b"a"),
                Bytes::from_static(b"b"),
                Bytes::from_static(b"c"),
            ]
        );
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"first\nlast");
        assert_eq!(buffer.next_line(), Some(Bytes::from_static(b"first")));
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.finish(), Some(Bytes::from_static(b"last")));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn long_line_arriving_in_pieces_is_reassembled() {
        let mut buffer = LineBuffer::new();
        for _ in 0..1000 {
            buffer.extend(b"ab");
            assert!(buffer.next_line().is_none());
        }
        buffer.extend(b"\n");
        assert_eq!(buffer.next_line().map(|line| line.len()), Some(2000));
    }

    #[test]
    fn overlong_line_is_dropped_whole() {
        let mut buffer = LineBuffer::with_max_line(8);
        buffer.extend(b"short\n0123456");
        assert_eq!(buffer.next_line(), Some(Bytes::from_static(b"short")));
        buffer.extend(b"789abc");
        assert!(buffer.next_line().is_none());
        buffer.extend(b"def\nnext\n");
        assert_eq!(drain(&mut buffer), vec![Bytes::from_static(b"next")]);

        buffer.extend(b"0123456789");
        assert!(buffer.next_line().is_none());
        assert!(buffer.finish().is_none());
    }
}

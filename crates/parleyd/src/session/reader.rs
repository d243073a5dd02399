//! Buffered newline framing over a blocking byte stream.

use std::io::{self, Read};

use super::protocol::MAX_LINE_BYTES;

const CHUNK_BYTES: usize = 1024;

/// One unit produced by [`LineReader::next_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A raw line including its trailing `\n`. The final fragment before end
    /// of stream is delivered without one.
    Line(Vec<u8>),
    /// A line known to exceed [`MAX_LINE_BYTES`]. Its bytes are dropped up to
    /// and including the next delimiter; `seen` counts what had arrived when
    /// the limit was crossed.
    Oversized { seen: usize },
    /// The peer closed the stream and every buffered byte has been delivered.
    EndOfStream,
}

/// Splits a byte stream into newline-terminated frames.
///
/// Bytes are buffered across reads, so partial reads and several lines per
/// read are both handled. Each line is delivered once. Errors other than
/// `Interrupted` are returned to the caller untouched and are not retried.
pub(crate) struct LineReader<R> {
    inner: R,
    buffer: Vec<u8>,
    discarding: bool,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(CHUNK_BYTES),
            discarding: false,
            eof: false,
        }
    }

    pub(crate) fn next_frame(&mut self) -> io::Result<Frame> {
        let mut chunk = [0_u8; CHUNK_BYTES];
        loop {
            if let Some(frame) = self.take_buffered() {
                return Ok(frame);
            }
            if self.eof {
                return Ok(Frame::EndOfStream);
            }

            let bytes_read = read_chunk_with_retry(&mut self.inner, &mut chunk)?;
            if bytes_read == 0 {
                self.eof = true;
                if let Some(frame) = self.take_trailing() {
                    return Ok(frame);
                }
                continue;
            }
            self.buffer.extend_from_slice(&chunk[..bytes_read]);
        }
    }

    fn take_buffered(&mut self) -> Option<Frame> {
        if self.discarding {
            let Some(pos) = delimiter_position(&self.buffer) else {
                self.buffer.clear();
                return None;
            };
            self.buffer.drain(..=pos);
            self.discarding = false;
        }

        if let Some(pos) = delimiter_position(&self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if line.len() > MAX_LINE_BYTES {
                return Some(Frame::Oversized { seen: line.len() });
            }
            return Some(Frame::Line(line));
        }

        // Without a delimiter the line can still end at EOF, so only reject
        // once the pending bytes alone are over the limit.
        if self.buffer.len() > MAX_LINE_BYTES {
            let seen = self.buffer.len();
            self.buffer.clear();
            self.discarding = true;
            return Some(Frame::Oversized { seen });
        }
        None
    }

    fn take_trailing(&mut self) -> Option<Frame> {
        if self.discarding {
            self.buffer.clear();
            self.discarding = false;
            return None;
        }
        if self.buffer.is_empty() {
            return None;
        }
        Some(Frame::Line(std::mem::take(&mut self.buffer)))
    }
}

fn delimiter_position(buffer: &[u8]) -> Option<usize> {
    buffer.iter().position(|byte| *byte == b'\n')
}

fn read_chunk_with_retry<R: Read>(stream: &mut R, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    /// Replays scripted read results, one per `read` call.
    struct Scripted {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Scripted {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Err(error)) => Err(error),
                Some(Ok(bytes)) => {
                    assert!(bytes.len() <= buf.len(), "scripted chunk too large");
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
            }
        }
    }

    fn frames(input: &[u8]) -> Vec<Frame> {
        let mut reader = LineReader::new(Cursor::new(input.to_vec()));
        let mut out = Vec::new();
        loop {
            let frame = reader.next_frame().expect("cursor reads cannot fail");
            let done = frame == Frame::EndOfStream;
            out.push(frame);
            if done {
                return out;
            }
        }
    }

    fn line(text: &str) -> Frame {
        Frame::Line(text.as_bytes().to_vec())
    }

    #[test]
    fn splits_several_lines_from_one_read() {
        assert_eq!(
            frames(b"hello\n/time\nbye\n"),
            vec![line("hello\n"), line("/time\n"), line("bye\n"), Frame::EndOfStream]
        );
    }

    #[test]
    fn joins_a_line_split_across_reads() {
        let mut reader = LineReader::new(Scripted::new(vec![
            Ok(b"hel".to_vec()),
            Ok(b"lo wor".to_vec()),
            Ok(b"ld\nnext".to_vec()),
        ]));
        assert_eq!(reader.next_frame().expect("first"), line("hello world\n"));
        assert_eq!(reader.next_frame().expect("second"), line("next"));
        assert_eq!(reader.next_frame().expect("end"), Frame::EndOfStream);
    }

    #[test]
    fn delivers_trailing_fragment_once() {
        let mut reader = LineReader::new(Cursor::new(b"tail".to_vec()));
        assert_eq!(reader.next_frame().expect("fragment"), line("tail"));
        assert_eq!(reader.next_frame().expect("end"), Frame::EndOfStream);
        assert_eq!(reader.next_frame().expect("still end"), Frame::EndOfStream);
    }

    #[test]
    fn retries_interrupted_reads() {
        let mut reader = LineReader::new(Scripted::new(vec![
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(b"ok\n".to_vec()),
        ]));
        assert_eq!(reader.next_frame().expect("line"), line("ok\n"));
    }

    #[test]
    fn surfaces_read_failures_distinctly_from_end_of_stream() {
        let mut reader = LineReader::new(Scripted::new(vec![
            Ok(b"partial".to_vec()),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
        ]));
        let error = reader.next_frame().expect_err("reset must surface");
        assert_eq!(error.kind(), io::ErrorKind::ConnectionReset);
    }

    #[rstest]
    #[case(MAX_LINE_BYTES - 1, true)]
    #[case(MAX_LINE_BYTES, false)]
    fn limit_counts_the_delimiter(#[case] body: usize, #[case] accepted: bool) {
        let mut input = vec![b'a'; body];
        input.push(b'\n');
        let first = frames(&input).remove(0);
        if accepted {
            assert_eq!(first, Frame::Line(input));
        } else {
            assert_eq!(first, Frame::Oversized { seen: body + 1 });
        }
    }

    #[test]
    fn resynchronises_after_an_oversized_line() {
        let mut input = vec![b'x'; 3 * MAX_LINE_BYTES];
        input.extend_from_slice(b"\nhello\n");
        let got = frames(&input);
        assert_eq!(got.len(), 3, "unexpected frames: {got:?}");
        assert!(matches!(got[0], Frame::Oversized { .. }));
        assert_eq!(got[1], line("hello\n"));
        assert_eq!(got[2], Frame::EndOfStream);
    }

    #[test]
    fn rejects_before_the_delimiter_arrives() {
        let mut reader = LineReader::new(Scripted::new(vec![
            Ok(vec![b'x'; CHUNK_BYTES]),
            Ok(vec![b'x'; CHUNK_BYTES]),
            Err(io::Error::from(io::ErrorKind::TimedOut)),
        ]));
        assert!(matches!(
            reader.next_frame().expect("oversized"),
            Frame::Oversized { .. }
        ));
        assert_eq!(
            reader.next_frame().expect_err("next read fails").kind(),
            io::ErrorKind::TimedOut
        );
    }

    #[test]
    fn oversized_fragment_at_end_of_stream_is_dropped() {
        let input = vec![b'x'; 2 * MAX_LINE_BYTES];
        let got = frames(&input);
        assert!(matches!(got[0], Frame::Oversized { .. }));
        assert_eq!(got[1..], [Frame::EndOfStream]);
    }

    #[test]
    fn exact_limit_fragment_at_end_of_stream_is_kept() {
        let input = vec![b'y'; MAX_LINE_BYTES];
        assert_eq!(frames(&input)[0], Frame::Line(input));
    }
}

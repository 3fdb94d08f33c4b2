//! Stream framing for syslog over TCP/TLS.
//!
//! - LF framing (non-transparent): each message ends with LF or CRLF.
//! - Octet counting (RFC 6587 §3.4.1): `MSG-LEN SP SYSLOG-MSG`. Frames that
//!   do not start with a digit fall back to LF framing.
//!
//! Oversized frames are consumed and reported as [`Frame::Oversized`] so the
//! connection keeps going. A corrupt octet-count header is skipped through
//! the next LF and reported as [`Frame::Malformed`].

use bytes::{Buf, Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Longest accepted MSG-LEN prefix (digits).
const MAX_LENGTH_DIGITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    LineDelimited,
    OctetCounting,
}

impl Framing {
    /// Strip transport framing from a UDP datagram.
    pub fn unwrap_datagram(self, datagram: &[u8]) -> &[u8] {
        let payload = match self {
            Framing::OctetCounting => strip_octet_count(datagram).unwrap_or(datagram),
            Framing::LineDelimited => datagram,
        };
        trim_trailing_newline(payload)
    }
}

fn strip_octet_count(datagram: &[u8]) -> Option<&[u8]> {
    let space = datagram.iter().position(|&b| b == b' ')?;
    let digits = &datagram[..space];
    if digits.is_empty() || digits.len() > MAX_LENGTH_DIGITS || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let len: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
    let body = &datagram[space + 1..];
    (body.len() >= len).then(|| &body[..len])
}

/// Trim trailing LF/CRLF from a message.
pub fn trim_trailing_newline(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && (data[end - 1] == b'\n' || data[end - 1] == b'\r') {
        end -= 1;
    }
    &data[..end]
}

/// One decoded unit from a syslog stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(Bytes),
    /// A frame larger than the limit was discarded.
    Oversized { size: usize },
    /// Bytes after a corrupt octet-count header were discarded up to the
    /// next LF.
    Malformed { size: usize },
}

/// Why a `DiscardLine` run is dropping bytes.
#[derive(Debug, Clone, Copy)]
enum Discard {
    Oversized,
    Malformed,
}

impl Discard {
    fn frame(self, size: usize) -> Frame {
        match self {
            Discard::Oversized => Frame::Oversized { size },
            Discard::Malformed => Frame::Malformed { size },
        }
    }
}

/// Outcome of one decoding attempt in `Scanning` state.
enum Step {
    Emit(Frame),
    NeedMore,
    /// An empty frame was consumed.
    Skipped,
}

#[derive(Debug)]
enum DecodeState {
    Scanning,
    DiscardLine { discarded: usize, reason: Discard },
    DiscardOctets { remaining: usize, size: usize },
}

#[derive(Debug)]
pub struct SyslogFrameCodec {
    framing: Framing,
    max_frame: usize,
    state: DecodeState,
}

impl SyslogFrameCodec {
    pub fn new(framing: Framing, max_frame: usize) -> Self {
        Self {
            framing,
            max_frame,
            state: DecodeState::Scanning,
        }
    }

    /// Whether the codec is in the middle of a frame.
    pub fn is_mid_frame(&self) -> bool {
        !matches!(self.state, DecodeState::Scanning)
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Step {
        loop {
            match src.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let line = src.split_to(pos + 1).freeze();
                    let message = trim_trailing_newline(&line);
                    if message.is_empty() {
                        continue;
                    }
                    if message.len() > self.max_frame {
                        return Step::Emit(Frame::Oversized { size: message.len() });
                    }
                    let len = message.len();
                    return Step::Emit(Frame::Message(line.slice(..len)));
                }
                None => {
                    if src.len() > self.max_frame {
                        let discarded = src.len();
                        src.clear();
                        self.state = DecodeState::DiscardLine {
                            discarded,
                            reason: Discard::Oversized,
                        };
                    }
                    return Step::NeedMore;
                }
            }
        }
    }

    fn decode_octets(&mut self, src: &mut BytesMut) -> Step {
        let header_len = src
            .iter()
            .take(MAX_LENGTH_DIGITS + 1)
            .position(|&b| b == b' ');
        let Some(space) = header_len else {
            if src.len() > MAX_LENGTH_DIGITS || !src.iter().all(u8::is_ascii_digit) {
                return self.resync(src);
            }
            return Step::NeedMore;
        };

        let digits = &src[..space];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return self.resync(src);
        }
        let Some(len) = std::str::from_utf8(digits)
            .ok()
            .and_then(|d| d.parse::<usize>().ok())
        else {
            return self.resync(src);
        };

        if len > self.max_frame {
            src.advance(space + 1);
            let take = len.min(src.len());
            src.advance(take);
            if take == len {
                return Step::Emit(Frame::Oversized { size: len });
            }
            self.state = DecodeState::DiscardOctets {
                remaining: len - take,
                size: len,
            };
            return Step::NeedMore;
        }

        if src.len() < space + 1 + len {
            src.reserve(space + 1 + len - src.len());
            return Step::NeedMore;
        }

        src.advance(space + 1);
        let message = src.split_to(len).freeze();
        let trimmed = trim_trailing_newline(&message).len();
        if trimmed == 0 {
            return Step::Skipped;
        }
        Step::Emit(Frame::Message(message.slice(..trimmed)))
    }

    /// Drop everything up to the next LF after a corrupt header.
    fn resync(&mut self, src: &mut BytesMut) -> Step {
        match src.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                src.advance(pos + 1);
                Step::Emit(Frame::Malformed { size: pos })
            }
            None => {
                let discarded = src.len();
                src.clear();
                self.state = DecodeState::DiscardLine {
                    discarded,
                    reason: Discard::Malformed,
                };
                Step::NeedMore
            }
        }
    }
}

impl Decoder for SyslogFrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            match self.state {
                DecodeState::DiscardLine { discarded, reason } => {
                    match src.iter().position(|&b| b == b'\n') {
                        Some(pos) => {
                            src.advance(pos + 1);
                            self.state = DecodeState::Scanning;
                            return Ok(Some(reason.frame(discarded + pos)));
                        }
                        None => {
                            let len = src.len();
                            src.clear();
                            self.state = DecodeState::DiscardLine {
                                discarded: discarded + len,
                                reason,
                            };
                            return Ok(None);
                        }
                    }
                }
                DecodeState::DiscardOctets { remaining, size } => {
                    let take = remaining.min(src.len());
                    src.advance(take);
                    if take == remaining {
                        self.state = DecodeState::Scanning;
                        return Ok(Some(Frame::Oversized { size }));
                    }
                    self.state = DecodeState::DiscardOctets {
                        remaining: remaining - take,
                        size,
                    };
                    return Ok(None);
                }
                DecodeState::Scanning => {}
            }

            if self.framing == Framing::OctetCounting {
                // Skip stray separators between octet-counted frames.
                while matches!(src.first(), Some(b'\n' | b'\r' | b' ')) {
                    src.advance(1);
                }
            }
            let Some(&first) = src.first() else {
                return Ok(None);
            };

            let step = match self.framing {
                Framing::OctetCounting if first.is_ascii_digit() => self.decode_octets(src),
                _ => self.decode_line(src),
            };
            match step {
                Step::Emit(frame) => return Ok(Some(frame)),
                Step::NeedMore => return Ok(None),
                Step::Skipped => {}
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        match self.state {
            DecodeState::DiscardLine { discarded, reason } => {
                self.state = DecodeState::Scanning;
                src.clear();
                Ok(Some(reason.frame(discarded)))
            }
            DecodeState::DiscardOctets { .. } => {
                self.state = DecodeState::Scanning;
                src.clear();
                Ok(None)
            }
            DecodeState::Scanning if src.is_empty() => Ok(None),
            DecodeState::Scanning => {
                // Trailing message without a terminator.
                let rest = src.split().freeze();
                let len = trim_trailing_newline(&rest).len();
                if len == 0 {
                    Ok(None)
                } else if len > self.max_frame {
                    Ok(Some(Frame::Oversized { size: len }))
                } else {
                    Ok(Some(Frame::Message(rest.slice(..len))))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut SyslogFrameCodec, input: &[u8]) -> Vec<Frame> {
        let mut buf = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        while let Some(frame) = codec.decode_eof(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    fn message(text: &str) -> Frame {
        Frame::Message(Bytes::copy_from_slice(text.as_bytes()))
    }

    #[test]
    fn test_line_framing_splits_and_trims() {
        let mut codec = SyslogFrameCodec::new(Framing::LineDelimited, 1024);
        let frames = decode_all(&mut codec, b"<1>one\r\n\n<2>two\n<3>three");
        assert_eq!(frames, vec![message("<1>one"), message("<2>two"), message("<3>three")]);
    }

    #[test]
    fn test_line_framing_waits_for_newline() {
        let mut codec = SyslogFrameCodec::new(Framing::LineDelimited, 1024);
        let mut buf = BytesMut::from(&b"<1>partial"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b" message\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(message("<1>partial message")));
    }

    #[test]
    fn test_line_framing_discards_oversized_and_recovers() {
        let mut codec = SyslogFrameCodec::new(Framing::LineDelimited, 8);
        let mut buf = BytesMut::from(&b"0123456789abcdef"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(codec.is_mid_frame());

        buf.extend_from_slice(b"xyz\n<1>ok\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Oversized { size: 19 }));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(message("<1>ok")));
        assert!(!codec.is_mid_frame());
    }

    #[test]
    fn test_octet_counting() {
        let mut codec = SyslogFrameCodec::new(Framing::OctetCounting, 1024);
        let frames = decode_all(&mut codec, b"10 <1>1 - - -11 <2>1 a b c\n");
        assert_eq!(frames, vec![message("<1>1 - - -"), message("<2>1 a b c")]);
    }

    #[test]
    fn test_octet_counting_waits_for_full_frame() {
        let mut codec = SyslogFrameCodec::new(Framing::OctetCounting, 1024);
        let mut buf = BytesMut::from(&b"8 <1>1"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b" - -");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(message("<1>1 - -")));
    }

    #[test]
    fn test_octet_counting_falls_back_to_lines() {
        let mut codec = SyslogFrameCodec::new(Framing::OctetCounting, 1024);
        let frames = decode_all(&mut codec, b"<1>1 - - - - - - plain\n4 <2>x");
        assert_eq!(frames, vec![message("<1>1 - - - - - - plain"), message("<2>x")]);
    }

    #[test]
    fn test_octet_counting_skips_oversized_frame() {
        let mut codec = SyslogFrameCodec::new(Framing::OctetCounting, 4);
        let frames = decode_all(&mut codec, b"6 abcdef3 <1>");
        assert_eq!(frames, vec![Frame::Oversized { size: 6 }, message("<1>")]);
    }

    #[test]
    fn test_octet_counting_skips_corrupt_header_line() {
        let mut codec = SyslogFrameCodec::new(Framing::OctetCounting, 1024);
        let frames = decode_all(&mut codec, b"4 <1>a1x garbage\n4 <2>b");
        assert_eq!(
            frames,
            vec![message("<1>a"), Frame::Malformed { size: 10 }, message("<2>b")]
        );
    }

    #[test]
    fn test_octet_counting_resyncs_across_reads() {
        let mut codec = SyslogFrameCodec::new(Framing::OctetCounting, 1024);
        let mut buf = BytesMut::from(&b"12345678901234 x"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(codec.is_mid_frame());

        buf.extend_from_slice(b"yz\n4 <1>a");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Malformed { size: 18 }));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(message("<1>a")));
        assert!(!codec.is_mid_frame());
    }

    #[test]
    fn test_corrupt_header_at_eof_is_reported() {
        let mut codec = SyslogFrameCodec::new(Framing::OctetCounting, 1024);
        let frames = decode_all(&mut codec, b"99999999999999999999 x");
        assert_eq!(frames, vec![Frame::Malformed { size: 22 }]);
    }

    #[test]
    fn test_unwrap_datagram() {
        assert_eq!(Framing::LineDelimited.unwrap_datagram(b"<1>hi\r\n"), b"<1>hi");
        assert_eq!(Framing::OctetCounting.unwrap_datagram(b"5 <1>hi"), b"<1>hi");
        assert_eq!(Framing::OctetCounting.unwrap_datagram(b"<1>hi\n"), b"<1>hi");
    }
}

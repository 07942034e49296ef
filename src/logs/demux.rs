//! Splits a log buffer into trimmed lines.
//!
//! The Engine API multiplexes stdout and stderr into one stream of framed
//! records: an 8-byte header (stream type, three zero bytes, big-endian u32
//! payload length) followed by the payload. Containers attached to a TTY send
//! plain text instead. [`demux`] accepts either and never fails; malformed
//! input only ever produces fewer lines.

use std::iter::FusedIterator;

pub const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin = 0,
    Stdout = 1,
    Stderr = 2,
}

impl StreamKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(StreamKind::Stdin),
            1 => Some(StreamKind::Stdout),
            2 => Some(StreamKind::Stderr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub stream: StreamKind,
    pub payload: &'a [u8],
}

/// Reads the frame at the start of `buf`, returning it with the number of
/// bytes it occupies. `None` when the header is incomplete, malformed, or
/// declares more payload than remains.
pub fn read_frame(buf: &[u8]) -> Option<(Frame<'_>, usize)> {
    let header = buf.get(..HEADER_LEN)?;
    let stream = StreamKind::from_byte(header[0])?;
    if header[1..4] != [0, 0, 0] {
        return None;
    }
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let end = HEADER_LEN.checked_add(len)?;
    let payload = buf.get(HEADER_LEN..end)?;
    Some((Frame { stream, payload }, end))
}

/// Appends `payload` to `out` in the framed wire format, splitting payloads
/// too large for one header.
pub fn encode_frame(stream: StreamKind, payload: &[u8], out: &mut Vec<u8>) {
    if payload.is_empty() {
        write_header(stream, 0, out);
        return;
    }
    for chunk in payload.chunks(u32::MAX as usize) {
        write_header(stream, chunk.len() as u32, out);
        out.extend_from_slice(chunk);
    }
}

fn write_header(stream: StreamKind, len: u32, out: &mut Vec<u8>) {
    out.push(stream as u8);
    out.extend_from_slice(&[0, 0, 0]);
    out.extend_from_slice(&len.to_be_bytes());
}

/// Lazily decodes `buf` into trimmed, non-empty lines in their original order.
///
/// If the buffer does not open with a valid frame header it is treated as plain
/// newline-delimited text; plain lines that start with a non-printable byte
/// lose their first [`HEADER_LEN`] bytes (a header fragment).
///
/// The returned iterator is `Clone`, so the same bytes can be walked again.
pub fn demux(buf: &[u8]) -> LogLines<'_> {
    let mode = if read_frame(buf).is_some() {
        Mode::Framed {
            rest: buf,
            payload: &[],
        }
    } else {
        Mode::Plain { rest: buf }
    };
    LogLines { mode }
}

#[derive(Debug, Clone)]
pub struct LogLines<'a> {
    mode: Mode<'a>,
}

#[derive(Debug, Clone)]
enum Mode<'a> {
    Framed { rest: &'a [u8], payload: &'a [u8] },
    Plain { rest: &'a [u8] },
}

impl<'a> Iterator for LogLines<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            match &mut self.mode {
                Mode::Framed { rest, payload } => {
                    if let Some(line) = take_line(payload) {
                        let trimmed = line.trim_ascii();
                        if !trimmed.is_empty() {
                            return Some(String::from_utf8_lossy(trimmed).into_owned());
                        }
                        continue;
                    }
                    // Decoding stops at the first header that does not validate.
                    let remaining: &'a [u8] = *rest;
                    let (frame, used) = read_frame(remaining)?;
                    *payload = frame.payload;
                    *rest = &remaining[used..];
                }
                Mode::Plain { rest } => {
                    let line = take_line(rest)?;
                    let mut trimmed = line.trim_ascii();
                    if trimmed.len() > HEADER_LEN && trimmed[0] < 0x20 {
                        trimmed = trimmed[HEADER_LEN..].trim_ascii();
                    }
                    if !trimmed.is_empty() {
                        return Some(String::from_utf8_lossy(trimmed).into_owned());
                    }
                }
            }
        }
    }
}

impl FusedIterator for LogLines<'_> {}

fn take_line<'a>(rest: &mut &'a [u8]) -> Option<&'a [u8]> {
    let bytes: &'a [u8] = *rest;
    if bytes.is_empty() {
        return None;
    }
    match bytes.iter().position(|&b| b == b'\n') {
        Some(idx) => {
            *rest = &bytes[idx + 1..];
            Some(&bytes[..idx])
        }
        None => {
            *rest = &[];
            Some(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(records: &[(StreamKind, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (stream, payload) in records {
            encode_frame(*stream, payload.as_bytes(), &mut out);
        }
        out
    }

    #[test]
    fn header_layout_is_big_endian() {
        let mut out = Vec::new();
        encode_frame(StreamKind::Stderr, b"hi", &mut out);
        assert_eq!(out, vec![2, 0, 0, 0, 0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn framed_payloads_split_into_lines() {
        let buf = framed(&[
            (StreamKind::Stdout, "first line\nsecond line\n"),
            (StreamKind::Stderr, "  third  \r\n\n"),
        ]);
        let lines: Vec<String> = demux(&buf).collect();
        assert_eq!(lines, vec!["first line", "second line", "third"]);
    }

    #[test]
    fn zero_length_frames_are_skipped() {
        let buf = framed(&[
            (StreamKind::Stdout, ""),
            (StreamKind::Stdout, "after empty"),
        ]);
        let lines: Vec<String> = demux(&buf).collect();
        assert_eq!(lines, vec!["after empty"]);
    }

    #[test]
    fn truncated_trailing_frame_is_dropped() {
        let mut buf = framed(&[(StreamKind::Stdout, "complete")]);
        buf.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 50]);
        buf.extend_from_slice(b"short");
        let lines: Vec<String> = demux(&buf).collect();
        assert_eq!(lines, vec!["complete"]);
    }

    #[test]
    fn plain_text_falls_back_to_line_split() {
        let buf = b"2024-01-01T00:00:00Z starting\n\n   \nready to serve\n";
        let lines: Vec<String> = demux(buf).collect();
        assert_eq!(lines, vec!["2024-01-01T00:00:00Z starting", "ready to serve"]);
    }

    #[test]
    fn plain_text_strips_header_fragments() {
        let mut buf = b"plain line\n".to_vec();
        buf.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 9]);
        buf.extend_from_slice(b"recovered\n");
        let lines: Vec<String> = demux(&buf).collect();
        assert_eq!(lines, vec!["plain line", "recovered"]);
    }

    #[test]
    fn unknown_stream_type_is_not_a_frame() {
        let buf = [7u8, 0, 0, 0, 0, 0, 0, 1, b'x'];
        assert!(read_frame(&buf).is_none());
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let buf = framed(&[(StreamKind::Stdout, "ok")]);
        let mut bad = buf.clone();
        encode_frame(StreamKind::Stdout, &[0xff, b'a'], &mut bad);
        let lines: Vec<String> = demux(&bad).collect();
        assert_eq!(lines, vec!["ok".to_string(), "\u{fffd}a".to_string()]);
    }

    #[test]
    fn demux_is_restartable() {
        let buf = framed(&[(StreamKind::Stdout, "a\nb"), (StreamKind::Stdout, "c")]);
        let lines = demux(&buf);
        let first: Vec<String> = lines.clone().collect();
        let second: Vec<String> = lines.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        assert_eq!(demux(&[]).count(), 0);
    }
}

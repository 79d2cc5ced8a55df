use std::collections::VecDeque;

use bytes::BytesMut;

use crate::core::{Frame, LinkId};

/// Longest `,<id>,<len>` run accepted between the marker and the colon
const MAX_HEADER_LEN: usize = 16;

/// Announcement of a frame about to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub link: LinkId,
    pub len: usize,
}

/// Parser state
#[derive(Debug)]
enum ParseState {
    /// Looking for the marker
    Idle,
    /// Marker seen, collecting header bytes up to the colon
    HeaderPending { header: Vec<u8> },
    /// Counting payload bytes
    ReadingPayload { header: FrameHeader, payload: BytesMut },
}

/// Extracts `<marker>,<id>,<len>:<payload>` frames from the byte stream.
///
/// The payload is taken by count, never by searching for a delimiter, so it
/// may contain anything including bytes that look like protocol syntax.
#[derive(Debug)]
pub struct FrameParser {
    marker: Vec<u8>,
    /// Last `marker.len()` bytes seen while idle
    recent: VecDeque<u8>,
    max_payload: usize,
    state: ParseState,
}

impl FrameParser {
    /// Creates a parser for the given marker and payload limit
    pub fn new(marker: &str, max_payload: usize) -> Self {
        let marker = marker.as_bytes().to_vec();
        FrameParser {
            recent: VecDeque::with_capacity(marker.len()),
            marker,
            max_payload,
            state: ParseState::Idle,
        }
    }

    /// Whether the next byte will be consumed as payload
    pub fn in_payload(&self) -> bool {
        matches!(self.state, ParseState::ReadingPayload { .. })
    }

    /// Drops any partial header or payload
    pub fn reset(&mut self) {
        self.recent.clear();
        self.state = ParseState::Idle;
    }

    /// Consumes one byte; returns a frame when this byte completes one
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        match std::mem::replace(&mut self.state, ParseState::Idle) {
            ParseState::Idle => {
                self.scan_marker(byte);
                None
            }
            ParseState::HeaderPending { mut header } => {
                match byte {
                    b':' => {
                        if let Some(parsed) = self.parse_header(&header) {
                            tracing::trace!(link = %parsed.link, len = parsed.len, "frame header");
                            self.state = ParseState::ReadingPayload {
                                header: parsed,
                                payload: BytesMut::with_capacity(parsed.len),
                            };
                        }
                    }
                    b'0'..=b'9' | b',' if header.len() < MAX_HEADER_LEN => {
                        header.push(byte);
                        self.state = ParseState::HeaderPending { header };
                    }
                    _ => {
                        tracing::debug!(
                            header = %String::from_utf8_lossy(&header),
                            "abandoning malformed frame header"
                        );
                        // The offending byte may start the next marker.
                        self.scan_marker(byte);
                    }
                }
                None
            }
            ParseState::ReadingPayload { header, mut payload } => {
                payload.extend_from_slice(&[byte]);
                if payload.len() == header.len {
                    Some(Frame::new(header.link, payload.freeze()))
                } else {
                    self.state = ParseState::ReadingPayload { header, payload };
                    None
                }
            }
        }
    }

    fn scan_marker(&mut self, byte: u8) {
        if self.recent.len() == self.marker.len() {
            self.recent.pop_front();
        }
        self.recent.push_back(byte);
        if self.recent.iter().eq(self.marker.iter()) {
            self.recent.clear();
            self.state = ParseState::HeaderPending { header: Vec::new() };
        }
    }

    /// Parses `,<id>,<len>`; `None` means the header is noise
    fn parse_header(&self, header: &[u8]) -> Option<FrameHeader> {
        let mut fields = header.split(|b| *b == b',');
        let leading = fields.next()?;
        let id = fields.next()?;
        let len = fields.next()?;
        if !leading.is_empty() || fields.next().is_some() {
            tracing::debug!("frame header has unexpected fields");
            return None;
        }

        let Some(link) = LinkId::from_ascii(id) else {
            tracing::debug!(id = %String::from_utf8_lossy(id), "frame header link out of range");
            return None;
        };
        let len = parse_len(len)?;
        if len == 0 || len > self.max_payload {
            tracing::debug!(len, max = self.max_payload, "frame header length rejected");
            return None;
        }
        Some(FrameHeader { link, len })
    }
}

fn parse_len(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() || digits.len() > 9 {
        return None;
    }
    digits.iter().try_fold(0usize, |acc, d| {
        d.is_ascii_digit().then(|| acc * 10 + usize::from(d - b'0'))
    })
}

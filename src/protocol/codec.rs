use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::core::{Error, LinkConfig};
use super::demux::{Demux, StreamEvent};

/// Read-only decoder of the module's output stream.
///
/// Wraps the same [`Demux`] the blocking link uses, so a hosted reader
/// (`FramedRead` over any `AsyncRead`) sees identical link events and frames.
/// Every byte is consumed from the buffer exactly once; a partial frame stays
/// inside the demux between calls.
#[derive(Debug)]
pub struct StreamCodec {
    demux: Demux,
}

impl StreamCodec {
    /// Creates a stream codec
    pub fn new(config: &LinkConfig) -> Self {
        StreamCodec {
            demux: Demux::new(config),
        }
    }

    /// The demux behind the codec
    pub fn demux(&self) -> &Demux {
        &self.demux
    }
}

impl Default for StreamCodec {
    fn default() -> Self {
        StreamCodec::new(&LinkConfig::default())
    }
}

impl Decoder for StreamCodec {
    type Item = StreamEvent;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();
            if let Some(event) = self.demux.feed(byte) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}

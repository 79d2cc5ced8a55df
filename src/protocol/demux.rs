use crate::core::{Frame, LinkConfig, LinkId};
use crate::transport::RollingWindow;

use super::frame::FrameParser;
use super::links::{LinkEvent, LinkRegistry};

/// Something the byte stream announced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    LinkOpened(LinkId),
    LinkClosed(LinkId),
    Frame(Frame),
}

impl From<LinkEvent> for StreamEvent {
    fn from(event: LinkEvent) -> Self {
        match event {
            LinkEvent::Opened(link) => StreamEvent::LinkOpened(link),
            LinkEvent::Closed(link) => StreamEvent::LinkClosed(link),
        }
    }
}

/// Fans every received byte out to the window, the link registry and the
/// frame parser, in arrival order, exactly once.
///
/// Payload bytes still enter the window but are fenced off by a scan floor,
/// so neither reply matching nor link tracking reads them as protocol text.
#[derive(Debug)]
pub struct Demux {
    window: RollingWindow,
    links: LinkRegistry,
    frames: FrameParser,
    /// Absolute position below which the window must not be scanned
    scan_floor: u64,
}

impl Demux {
    /// Creates a demux from link configuration
    pub fn new(config: &LinkConfig) -> Self {
        let tokens = &config.tokens;
        Demux {
            window: RollingWindow::new(config.window_capacity),
            links: LinkRegistry::new(&tokens.link_connect, &tokens.link_closed),
            frames: FrameParser::new(&tokens.frame_marker, config.max_payload),
            scan_floor: 0,
        }
    }

    /// Consumes one byte. At most one event can complete per byte.
    pub fn feed(&mut self, byte: u8) -> Option<StreamEvent> {
        self.window.push(byte);

        let was_payload = self.frames.in_payload();
        let frame = self.frames.feed(byte);
        if was_payload {
            self.scan_floor = self.window.position();
            return frame.map(StreamEvent::Frame);
        }

        let region = self.window.since(self.scan_floor);
        self.links.observe(region).map(StreamEvent::from)
    }

    /// Window bytes at or after `mark` that are not payload
    pub fn scan_region(&self, mark: u64) -> &[u8] {
        self.window.since(mark.max(self.scan_floor))
    }

    /// Position to pass to [`Demux::scan_region`] to see only newer bytes
    pub fn mark(&self) -> u64 {
        self.window.position()
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    /// Forgets open links and any partial frame
    pub fn reset_links(&mut self) {
        self.links.reset();
        self.frames.reset();
        self.scan_floor = self.window.position();
    }
}

use crate::core::{LinkId, MAX_LINKS};

/// Link state change observed in the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Opened(LinkId),
    Closed(LinkId),
}

/// Open/closed table of the module's peer links.
///
/// Only unsolicited `<id>,CONNECT` and `<id>,CLOSED` notifications change
/// it; both suffixes come from the token set. The registry is fed the scan region after every byte and looks for a
/// notification that has just been completed.
#[derive(Debug, Clone)]
pub struct LinkRegistry {
    open: [bool; MAX_LINKS],
    connect: Vec<u8>,
    closed: Vec<u8>,
}

impl LinkRegistry {
    /// Creates a registry with every link closed
    pub fn new(connect_suffix: &str, closed_suffix: &str) -> Self {
        LinkRegistry {
            open: [false; MAX_LINKS],
            connect: connect_suffix.as_bytes().to_vec(),
            closed: closed_suffix.as_bytes().to_vec(),
        }
    }

    /// Checks whether `region` ends with a complete notification and applies
    /// it. Returns the event only if the table actually changed.
    pub fn observe(&mut self, region: &[u8]) -> Option<LinkEvent> {
        let (head, opened) = if let Some(head) = region.strip_suffix(self.connect.as_slice()) {
            (head, true)
        } else if let Some(head) = region.strip_suffix(self.closed.as_slice()) {
            (head, false)
        } else {
            return None;
        };

        let digits = trailing_digits(head);
        let Some(link) = LinkId::from_ascii(digits) else {
            if !digits.is_empty() {
                tracing::debug!(
                    id = %String::from_utf8_lossy(digits),
                    "ignoring notification for out-of-range link"
                );
            }
            return None;
        };

        let slot = &mut self.open[link.index()];
        if *slot == opened {
            tracing::trace!(%link, opened, "repeated link notification");
            return None;
        }
        *slot = opened;

        if opened {
            tracing::info!(%link, "peer link opened");
            Some(LinkEvent::Opened(link))
        } else {
            tracing::info!(%link, "peer link closed");
            Some(LinkEvent::Closed(link))
        }
    }

    pub fn is_open(&self, link: LinkId) -> bool {
        self.open[link.index()]
    }

    /// Open links in ascending order
    pub fn open_links(&self) -> Vec<LinkId> {
        LinkId::all().filter(|l| self.is_open(*l)).collect()
    }

    /// Marks every link closed
    pub fn reset(&mut self) {
        if self.open.iter().any(|o| *o) {
            tracing::debug!("clearing open links");
        }
        self.open = [false; MAX_LINKS];
    }
}

fn trailing_digits(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);
    &bytes[start..]
}

//! Outbound send handshake.
//!
//! `AT+CIPSEND=<id>,<len>` → `>` → raw payload → `SEND OK`.
//!
//! Once the prompt has been seen and the payload written, the bytes have
//! physically left. If the confirmation then fails to arrive the outcome is
//! ambiguous: the peer may or may not have the data. That case is reported
//! as [`SendOutcome::ConfirmTimeout`] and must not be retried blindly.

use crate::core::{Error, LinkConfig, LinkId, Result, MAX_SEND_PAYLOAD};
use crate::protocol::{Exchange, ExchangeOutcome, Reply};
use crate::transport::{Clock, Transport};

use super::dispatch::Dispatcher;

/// How one send ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Module confirmed the send
    Sent,
    /// Link was not open; nothing was written
    LinkNotOpen,
    /// No ready prompt; payload not written
    PromptTimeout,
    /// Module refused the announcement; payload not written
    Rejected,
    /// Payload written but no confirmation arrived
    ConfirmTimeout,
    /// Payload written and the module reported failure
    SendFailed,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }

    /// Payload left the device but delivery is unknown
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, SendOutcome::ConfirmTimeout)
    }

    /// Nothing was written, so retrying cannot duplicate data
    pub fn is_clean_failure(&self) -> bool {
        matches!(
            self,
            SendOutcome::LinkNotOpen | SendOutcome::PromptTimeout | SendOutcome::Rejected
        )
    }
}

fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Err(Error::payload("refusing to send an empty payload"));
    }
    if payload.len() > MAX_SEND_PAYLOAD {
        return Err(Error::payload(format!(
            "payload of {} bytes exceeds the {} byte send limit",
            payload.len(),
            MAX_SEND_PAYLOAD
        )));
    }
    Ok(())
}

/// Runs the send handshake for one link
pub fn send<T: Transport, C: Clock>(
    dispatcher: &mut Dispatcher<T, C>,
    config: &LinkConfig,
    link: LinkId,
    payload: &[u8],
) -> Result<SendOutcome> {
    check_payload(payload)?;
    if !dispatcher.demux().links().is_open(link) {
        tracing::debug!(%link, "send on closed link");
        return Ok(SendOutcome::LinkNotOpen);
    }

    let tokens = &config.tokens;
    let announce = Exchange::new(
        format!("AT+CIPSEND={},{}", link, payload.len()),
        Reply::new(tokens.send_prompt.as_str(), tokens.error.as_str()),
        config.timeouts.send_prompt,
    )
    .labelled("send announce");

    match dispatcher.exchange(&announce)? {
        ExchangeOutcome::Matched(_) => {}
        ExchangeOutcome::TimedOut => return Ok(SendOutcome::PromptTimeout),
        ExchangeOutcome::ProtocolError => return Ok(SendOutcome::Rejected),
    }

    dispatcher.write_raw(payload)?;

    let confirm = Reply::new(tokens.send_ok.as_str(), tokens.send_fail.as_str());
    let outcome = match dispatcher.await_reply(&confirm, config.timeouts.send_confirm)? {
        ExchangeOutcome::Matched(_) => SendOutcome::Sent,
        ExchangeOutcome::TimedOut => SendOutcome::ConfirmTimeout,
        ExchangeOutcome::ProtocolError => SendOutcome::SendFailed,
    };

    if outcome.is_sent() {
        tracing::trace!(%link, len = payload.len(), "send confirmed");
    } else {
        tracing::warn!(%link, ?outcome, "send not confirmed");
    }
    Ok(outcome)
}

/// Sends to every open link.
///
/// A link that refuses or times out is reported in its outcome and the
/// remaining links are still tried. The payload is checked once before any
/// write, so the only error that can stop the loop part way is a transport
/// fault, after which the port is unusable for every link anyway.
pub fn broadcast<T: Transport, C: Clock>(
    dispatcher: &mut Dispatcher<T, C>,
    config: &LinkConfig,
    payload: &[u8],
) -> Result<Vec<(LinkId, SendOutcome)>> {
    check_payload(payload)?;
    // Snapshot first: sending pumps bytes that may open or close links.
    let targets = dispatcher.demux().links().open_links();
    let mut outcomes = Vec::with_capacity(targets.len());
    for link in targets {
        let outcome = send(dispatcher, config, link, payload)?;
        outcomes.push((link, outcome));
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockTransport, SimClock};
    use std::time::Duration;

    fn setup(modem: MockTransport, clock: &SimClock) -> Dispatcher<MockTransport, SimClock> {
        Dispatcher::new(modem, clock.clone(), &LinkConfig::default())
    }

    fn link(id: u8) -> LinkId {
        LinkId::new(id).unwrap()
    }

    fn open(dispatcher: &mut Dispatcher<MockTransport, SimClock>, modem: &MockTransport, ids: &str) {
        for id in ids.chars() {
            modem.inject(format!("{},CONNECT\r\n", id));
        }
        dispatcher.pump().unwrap();
    }

    #[test]
    fn test_send_success() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on("AT+CIPSEND=2,5", "\r\nOK\r\n> ")
            .on("hello", "\r\nRecv 5 bytes\r\n\r\nSEND OK\r\n");
        let mut dispatcher = setup(modem.clone(), &clock);
        open(&mut dispatcher, &modem, "2");

        let config = LinkConfig::default();
        let outcome = send(&mut dispatcher, &config, link(2), b"hello").unwrap();
        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(
            modem.writes(),
            vec![b"AT+CIPSEND=2,5\r\n".to_vec(), b"hello".to_vec()]
        );
    }

    #[test]
    fn test_closed_link_writes_nothing() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone());
        let mut dispatcher = setup(modem.clone(), &clock);

        let outcome = send(&mut dispatcher, &LinkConfig::default(), link(3), b"data").unwrap();
        assert_eq!(outcome, SendOutcome::LinkNotOpen);
        assert!(outcome.is_clean_failure());
        assert!(modem.writes().is_empty());
    }

    #[test]
    fn test_prompt_timeout_skips_payload() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone());
        let mut dispatcher = setup(modem.clone(), &clock);
        open(&mut dispatcher, &modem, "0");

        let outcome = send(&mut dispatcher, &LinkConfig::default(), link(0), b"data").unwrap();
        assert_eq!(outcome, SendOutcome::PromptTimeout);
        assert_eq!(modem.written_lines(), vec!["AT+CIPSEND=0,4"]);
    }

    #[test]
    fn test_rejected_announce() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on("AT+CIPSEND", "\r\nlink is not valid\r\n\r\nERROR\r\n");
        let mut dispatcher = setup(modem.clone(), &clock);
        open(&mut dispatcher, &modem, "1");

        let outcome = send(&mut dispatcher, &LinkConfig::default(), link(1), b"data").unwrap();
        assert_eq!(outcome, SendOutcome::Rejected);
        assert_eq!(modem.writes().len(), 1);
    }

    #[test]
    fn test_confirm_timeout_is_ambiguous() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone()).on("AT+CIPSEND", "> ");
        let mut dispatcher = setup(modem.clone(), &clock);
        open(&mut dispatcher, &modem, "4");

        let config = LinkConfig::default();
        let outcome = send(&mut dispatcher, &config, link(4), b"data").unwrap();
        assert_eq!(outcome, SendOutcome::ConfirmTimeout);
        assert!(outcome.is_ambiguous());
        assert!(!outcome.is_clean_failure());
        assert_eq!(modem.writes().last(), Some(&b"data".to_vec()));
        assert!(clock.elapsed() >= config.timeouts.send_confirm);
    }

    #[test]
    fn test_send_fail_token() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on("AT+CIPSEND", "> ")
            .on_after("data", Duration::from_millis(30), "\r\nSEND FAIL\r\n");
        let mut dispatcher = setup(modem.clone(), &clock);
        open(&mut dispatcher, &modem, "1");

        let outcome = send(&mut dispatcher, &LinkConfig::default(), link(1), b"data").unwrap();
        assert_eq!(outcome, SendOutcome::SendFailed);
    }

    #[test]
    fn test_payload_limits() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone());
        let mut dispatcher = setup(modem.clone(), &clock);
        open(&mut dispatcher, &modem, "0");
        let config = LinkConfig::default();

        assert!(matches!(
            send(&mut dispatcher, &config, link(0), b""),
            Err(Error::Payload(_))
        ));
        let big = vec![0u8; MAX_SEND_PAYLOAD + 1];
        assert!(matches!(
            send(&mut dispatcher, &config, link(0), &big),
            Err(Error::Payload(_))
        ));
        assert!(modem.writes().is_empty());
    }

    #[test]
    fn test_broadcast_continues_past_failures() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on("AT+CIPSEND=0,2", "> ")
            .on("hi", "\r\nSEND OK\r\n")
            .on("AT+CIPSEND=3,2", "\r\nERROR\r\n")
            .on("AT+CIPSEND=4,2", "> ")
            .on("hi", "\r\nSEND OK\r\n");
        let mut dispatcher = setup(modem.clone(), &clock);
        open(&mut dispatcher, &modem, "403");

        let outcomes = broadcast(&mut dispatcher, &LinkConfig::default(), b"hi").unwrap();
        assert_eq!(
            outcomes,
            vec![
                (link(0), SendOutcome::Sent),
                (link(3), SendOutcome::Rejected),
                (link(4), SendOutcome::Sent),
            ]
        );
    }

    #[test]
    fn test_broadcast_with_no_links() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone());
        let mut dispatcher = setup(modem.clone(), &clock);
        let outcomes = broadcast(&mut dispatcher, &LinkConfig::default(), b"hi").unwrap();
        assert!(outcomes.is_empty());
        assert!(modem.writes().is_empty());
    }

    #[test]
    fn test_broadcast_rejects_bad_payload_before_any_link() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone()).on("AT+CIPSEND=", "> ");
        let mut dispatcher = setup(modem.clone(), &clock);
        open(&mut dispatcher, &modem, "12");
        let config = LinkConfig::default();

        let big = vec![b'x'; MAX_SEND_PAYLOAD + 1];
        assert!(matches!(
            broadcast(&mut dispatcher, &config, &big),
            Err(Error::Payload(_))
        ));
        assert!(matches!(
            broadcast(&mut dispatcher, &config, b""),
            Err(Error::Payload(_))
        ));
        assert!(modem.writes().is_empty());
        assert_eq!(modem.unused_rules().len(), 1);
    }
}

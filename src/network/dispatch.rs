use std::collections::VecDeque;
use std::time::Duration;

use crate::core::{Frame, LinkConfig, Result};
use crate::protocol::{Demux, Exchange, ExchangeOutcome, Reply, Scan, StreamEvent, TokenMatch};
use crate::transport::{Clock, Transport};

/// Most bytes one call to [`Dispatcher::pump`] drains
const PUMP_BUDGET: usize = 4096;

/// Sole owner of the transport.
///
/// Every read goes through here and is handed to the [`Demux`], whether it
/// happens while an exchange waits for its reply or during an idle pump.
/// Frames completed during an exchange are queued for the next pump.
pub struct Dispatcher<T, C> {
    transport: T,
    clock: C,
    demux: Demux,
    frames: VecDeque<Frame>,
    line_ending: Vec<u8>,
}

impl<T: Transport, C: Clock> Dispatcher<T, C> {
    /// Creates a dispatcher
    pub fn new(transport: T, clock: C, config: &LinkConfig) -> Self {
        Dispatcher {
            transport,
            clock,
            demux: Demux::new(config),
            frames: VecDeque::new(),
            line_ending: config.tokens.line_ending.as_bytes().to_vec(),
        }
    }

    pub fn demux(&self) -> &Demux {
        &self.demux
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Reads one byte if available and routes it
    fn read_one(&mut self) -> Result<Option<u8>> {
        let Some(byte) = self.transport.try_read_byte()? else {
            return Ok(None);
        };
        match self.demux.feed(byte) {
            Some(StreamEvent::Frame(frame)) => {
                tracing::debug!(link = %frame.link, len = frame.payload.len(), "frame received");
                self.frames.push_back(frame);
            }
            Some(event) => tracing::trace!(?event, "link event"),
            None => {}
        }
        Ok(Some(byte))
    }

    fn drain_available(&mut self) -> Result<()> {
        let mut budget = PUMP_BUDGET;
        while budget > 0 && self.read_one()?.is_some() {
            budget -= 1;
        }
        Ok(())
    }

    /// Drains available bytes without blocking; returns completed frames
    pub fn pump(&mut self) -> Result<Vec<Frame>> {
        self.drain_available()?;
        Ok(self.frames.drain(..).collect())
    }

    /// Writes raw bytes
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        tracing::trace!(len = bytes.len(), "writing raw bytes");
        self.transport.write_all(bytes)
    }

    /// Writes a command line and waits for its reply
    pub fn exchange(&mut self, exchange: &Exchange) -> Result<ExchangeOutcome> {
        // Leftovers of an earlier reply must not satisfy this one.
        self.drain_available()?;

        tracing::debug!(label = exchange.label, "sending command");
        let mut line = Vec::with_capacity(exchange.command.len() + self.line_ending.len());
        line.extend_from_slice(exchange.command.as_bytes());
        line.extend_from_slice(&self.line_ending);
        self.transport.write_all(&line)?;

        let outcome = self.wait(&exchange.reply, exchange.timeout, exchange.command.as_bytes())?;
        match outcome {
            ExchangeOutcome::Matched(_) => {
                tracing::debug!(label = exchange.label, ?outcome, "command acknowledged")
            }
            _ => tracing::warn!(label = exchange.label, ?outcome, "command failed"),
        }
        Ok(outcome)
    }

    /// Waits for a reply to whatever was just written.
    ///
    /// Only bytes arriving after the call are considered. Blocks the caller
    /// for at most `timeout`, polling the transport and testing the reply
    /// tokens after every byte.
    pub fn await_reply(&mut self, reply: &Reply, timeout: Duration) -> Result<ExchangeOutcome> {
        self.wait(reply, timeout, &[])
    }

    /// Reply wait that first skips an echo of `echo` if the module sends one.
    ///
    /// Echoed bytes are never scanned, and once the whole echo has arrived
    /// scanning restarts after it, so text inside a command line cannot pass
    /// for a reply token.
    fn wait(&mut self, reply: &Reply, timeout: Duration, echo: &[u8]) -> Result<ExchangeOutcome> {
        let mut mark = self.demux.mark();
        let mut echoed = 0;
        // No representable deadline: only a token ends the wait.
        let deadline = self.clock.now().checked_add(timeout);

        loop {
            if let Some(byte) = self.read_one()? {
                if echoed < echo.len() && echo[echoed] == byte {
                    echoed += 1;
                    if echoed == echo.len() {
                        tracing::trace!("skipped command echo");
                        mark = self.demux.mark();
                    }
                } else {
                    echoed = echo.len();
                    match reply.scan(self.demux.scan_region(mark)) {
                        Scan::Primary => return Ok(ExchangeOutcome::Matched(TokenMatch::Primary)),
                        Scan::Secondary => {
                            return Ok(ExchangeOutcome::Matched(TokenMatch::Secondary))
                        }
                        Scan::Error => return Ok(ExchangeOutcome::ProtocolError),
                        Scan::Pending => {}
                    }
                }
            } else {
                self.clock.idle();
            }

            if deadline.is_some_and(|deadline| self.clock.now() >= deadline) {
                return Ok(ExchangeOutcome::TimedOut);
            }
        }
    }

    /// Forgets open links and partial frames, e.g. after a module reset
    pub fn reset_links(&mut self) {
        self.demux.reset_links();
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LinkId;
    use crate::transport::mock::{MockTransport, SimClock};

    fn dispatcher(modem: &MockTransport, clock: &SimClock) -> Dispatcher<MockTransport, SimClock> {
        Dispatcher::new(modem.clone(), clock.clone(), &LinkConfig::default())
    }

    fn probe(timeout: Duration) -> Exchange {
        Exchange::new("PROBE", Reply::new("OK", "ERROR"), timeout).labelled("probe")
    }

    #[test]
    fn test_exchange_matches_before_deadline() {
        let clock = SimClock::new();
        let timeout = Duration::from_millis(200);
        let modem = MockTransport::new(clock.clone())
            .on_after("PROBE", timeout / 2, "\r\nOK\r\n");
        let mut dispatcher = dispatcher(&modem, &clock);

        let outcome = dispatcher.exchange(&probe(timeout)).unwrap();
        assert_eq!(outcome, ExchangeOutcome::Matched(TokenMatch::Primary));
        assert!(clock.elapsed() >= timeout / 2);
        assert!(clock.elapsed() < timeout);
        assert_eq!(modem.writes(), vec![b"PROBE\r\n".to_vec()]);
    }

    #[test]
    fn test_exchange_times_out() {
        let clock = SimClock::new();
        let timeout = Duration::from_millis(200);
        let modem = MockTransport::new(clock.clone());
        let mut dispatcher = dispatcher(&modem, &clock);

        let outcome = dispatcher.exchange(&probe(timeout)).unwrap();
        assert_eq!(outcome, ExchangeOutcome::TimedOut);
        assert!(clock.elapsed() >= timeout);
        assert!(clock.elapsed() <= timeout + Duration::from_millis(1));
    }

    #[test]
    fn test_error_token_first() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone()).on("PROBE", "\r\nERROR\r\n\r\nOK\r\n");
        let mut dispatcher = dispatcher(&modem, &clock);

        let outcome = dispatcher.exchange(&probe(Duration::from_secs(1))).unwrap();
        assert_eq!(outcome, ExchangeOutcome::ProtocolError);
    }

    #[test]
    fn test_secondary_token() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone()).on("AT+CIPSERVER", "\r\nno change\r\n");
        let mut dispatcher = dispatcher(&modem, &clock);

        let exchange = Exchange::new(
            "AT+CIPSERVER=1,5000",
            Reply::new("OK", "ERROR").or("no change"),
            Duration::from_secs(1),
        );
        let outcome = dispatcher.exchange(&exchange).unwrap();
        assert_eq!(outcome, ExchangeOutcome::Matched(TokenMatch::Secondary));
    }

    #[test]
    fn test_stale_tokens_ignored() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone());
        let mut dispatcher = dispatcher(&modem, &clock);

        modem.inject("\r\nOK\r\n");
        dispatcher.pump().unwrap();

        let outcome = dispatcher.exchange(&probe(Duration::from_millis(50))).unwrap();
        assert_eq!(outcome, ExchangeOutcome::TimedOut);
    }

    #[test]
    fn test_command_echo_not_scanned() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .echoing()
            .on("AT+CWJAP=", "\r\n+CWJAP:1\r\n\r\nFAIL\r\n");
        let mut dispatcher = dispatcher(&modem, &clock);

        let join = Exchange::new(
            "AT+CWJAP=\"OKlab\",\"hunter22\"",
            Reply::new("WIFI GOT IP", "FAIL").or("OK"),
            Duration::from_secs(1),
        );
        assert_eq!(dispatcher.exchange(&join).unwrap(), ExchangeOutcome::ProtocolError);
    }

    #[test]
    fn test_echoed_error_text_not_scanned() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .echoing()
            .on("AT+CWSAP=", "\r\nOK\r\n");
        let mut dispatcher = dispatcher(&modem, &clock);

        let configure = Exchange::new(
            "AT+CWSAP=\"ERROR-net\",\"password\",5,3,5",
            Reply::new("OK", "ERROR"),
            Duration::from_secs(1),
        );
        assert!(dispatcher.exchange(&configure).unwrap().is_matched());
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on_after("PROBE", Duration::from_millis(3), "\r\nOK\r\n");
        let mut dispatcher = dispatcher(&modem, &clock);

        let outcome = dispatcher.exchange(&probe(Duration::MAX)).unwrap();
        assert_eq!(outcome, ExchangeOutcome::Matched(TokenMatch::Primary));
    }

    #[test]
    fn test_late_reply_tail_drained() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone());
        let mut dispatcher = dispatcher(&modem, &clock);

        // tail of a previous reply, already buffered when the next command goes out
        modem.inject("\r\nOK\r\n");
        let outcome = dispatcher.exchange(&probe(Duration::from_millis(20))).unwrap();
        assert_eq!(outcome, ExchangeOutcome::TimedOut);
    }

    #[test]
    fn test_link_tracking_during_exchange() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on("PROBE", "\r\n1,CONNECT\r\n+IPD,1,2:hi\r\nOK\r\n");
        let mut dispatcher = dispatcher(&modem, &clock);

        let outcome = dispatcher.exchange(&probe(Duration::from_secs(1))).unwrap();
        assert!(outcome.is_matched());

        let link = LinkId::new(1).unwrap();
        assert!(dispatcher.demux().links().is_open(link));
        let frames = dispatcher.pump().unwrap();
        assert_eq!(frames, vec![Frame::new(link, b"hi".to_vec())]);
    }

    #[test]
    fn test_token_inside_payload_ignored() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on("PROBE", "+IPD,0,6:ERROR!\r\nOK\r\n");
        let mut dispatcher = dispatcher(&modem, &clock);

        let outcome = dispatcher.exchange(&probe(Duration::from_secs(1))).unwrap();
        assert_eq!(outcome, ExchangeOutcome::Matched(TokenMatch::Primary));
    }

    #[test]
    fn test_pump_is_bounded() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone());
        let mut dispatcher = dispatcher(&modem, &clock);

        modem.inject(vec![b'x'; PUMP_BUDGET + 10]);
        dispatcher.pump().unwrap();
        assert_eq!(modem.pending_len(), 10);
        dispatcher.pump().unwrap();
        assert_eq!(modem.pending_len(), 0);
    }
}

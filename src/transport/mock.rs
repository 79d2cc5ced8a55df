//! Simulated module and clock for tests.
//!
//! [`MockTransport`] plays a scripted module: every write is matched against
//! one-shot rules, and a matching rule schedules its reply on the shared
//! [`SimClock`]. Unsolicited traffic is injected directly. Both types are
//! cheap handles, so a test keeps a clone to inspect writes and inject bytes
//! after handing the transport to the link.
//!
//! ```rust,ignore
//! let clock = SimClock::new();
//! let modem = MockTransport::new(clock.clone())
//!     .on("AT", "\r\nOK\r\n")
//!     .on_after("AT+CWJAP", Duration::from_secs(3), "\r\nFAIL\r\n");
//! let mut link = WifiLink::new(modem.clone(), clock, &LinkConfig::default());
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::{Clock, Transport};
use crate::core::Result;

/// Simulated time that only moves when told to
#[derive(Debug, Clone)]
pub struct SimClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
    tick: Duration,
}

impl SimClock {
    /// Creates a clock that advances 1 ms per idle poll
    pub fn new() -> Self {
        Self::with_tick(Duration::from_millis(1))
    }

    /// Creates a clock with a custom idle step
    pub fn with_tick(tick: Duration) -> Self {
        SimClock {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
            tick,
        }
    }

    /// Moves time forward
    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Simulated time since creation
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn idle(&self) {
        self.advance(self.tick);
    }
}

#[derive(Debug)]
struct Rule {
    trigger: Vec<u8>,
    reply: Vec<u8>,
    delay: Duration,
    used: bool,
}

#[derive(Debug, Default)]
struct Inner {
    rules: Vec<Rule>,
    /// Replies not yet due, ordered by due time
    scheduled: Vec<(Duration, Vec<u8>)>,
    /// Bytes readable now
    ready: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    /// Writes are echoed back before any reply
    echo: bool,
}

/// Scripted module behind a shared handle
#[derive(Debug, Clone)]
pub struct MockTransport {
    clock: SimClock,
    inner: Rc<RefCell<Inner>>,
}

impl MockTransport {
    /// Creates a module with no rules; unmatched writes get no reply
    pub fn new(clock: SimClock) -> Self {
        MockTransport {
            clock,
            inner: Rc::new(RefCell::new(Inner::default())),
        }
    }

    /// Echoes every write back ahead of its reply, like firmware with echo on
    pub fn echoing(self) -> Self {
        self.inner.borrow_mut().echo = true;
        self
    }

    /// Replies immediately to the next write starting with `trigger`
    pub fn on(self, trigger: impl AsRef<[u8]>, reply: impl AsRef<[u8]>) -> Self {
        self.on_after(trigger, Duration::ZERO, reply)
    }

    /// Replies after `delay` to the next write starting with `trigger`
    pub fn on_after(
        self,
        trigger: impl AsRef<[u8]>,
        delay: Duration,
        reply: impl AsRef<[u8]>,
    ) -> Self {
        self.inner.borrow_mut().rules.push(Rule {
            trigger: trigger.as_ref().to_vec(),
            reply: reply.as_ref().to_vec(),
            delay,
            used: false,
        });
        self
    }

    /// Makes bytes readable right away
    pub fn inject(&self, bytes: impl AsRef<[u8]>) {
        self.inject_after(Duration::ZERO, bytes);
    }

    /// Makes bytes readable once `delay` of simulated time has passed
    pub fn inject_after(&self, delay: Duration, bytes: impl AsRef<[u8]>) {
        let due = self.clock.elapsed() + delay;
        self.inner.borrow_mut().schedule(due, bytes.as_ref().to_vec());
    }

    /// Every write so far, one entry per `write_all`
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.borrow().writes.clone()
    }

    /// Writes rendered as text with line endings trimmed
    pub fn written_lines(&self) -> Vec<String> {
        self.inner
            .borrow()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).trim_end().to_string())
            .collect()
    }

    /// Rules that never fired
    pub fn unused_rules(&self) -> Vec<String> {
        self.inner
            .borrow()
            .rules
            .iter()
            .filter(|r| !r.used)
            .map(|r| String::from_utf8_lossy(&r.trigger).into_owned())
            .collect()
    }

    /// Bytes still queued or scheduled
    pub fn pending_len(&self) -> usize {
        let inner = self.inner.borrow();
        inner.ready.len() + inner.scheduled.iter().map(|(_, b)| b.len()).sum::<usize>()
    }
}

impl Inner {
    fn schedule(&mut self, due: Duration, bytes: Vec<u8>) {
        let at = self.scheduled.partition_point(|(t, _)| *t <= due);
        self.scheduled.insert(at, (due, bytes));
    }

    fn release(&mut self, now: Duration) {
        let due = self.scheduled.partition_point(|(t, _)| *t <= now);
        for (_, bytes) in self.scheduled.drain(..due) {
            self.ready.extend(bytes);
        }
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let now = self.clock.elapsed();
        let mut inner = self.inner.borrow_mut();
        inner.writes.push(bytes.to_vec());

        if inner.echo {
            inner.schedule(now, bytes.to_vec());
        }

        let fired = inner
            .rules
            .iter_mut()
            .find(|r| !r.used && bytes.starts_with(&r.trigger))
            .map(|r| {
                r.used = true;
                (now + r.delay, r.reply.clone())
            });
        if let Some((due, reply)) = fired {
            inner.schedule(due, reply);
        }
        Ok(())
    }

    fn try_read_byte(&mut self) -> Result<Option<u8>> {
        let now = self.clock.elapsed();
        let mut inner = self.inner.borrow_mut();
        inner.release(now);
        Ok(inner.ready.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(transport: &mut MockTransport) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(b) = transport.try_read_byte().unwrap() {
            out.push(b);
        }
        out
    }

    #[test]
    fn test_rule_fires_once() {
        let clock = SimClock::new();
        let mut modem = MockTransport::new(clock).on("AT", "OK");

        modem.write_all(b"AT\r\n").unwrap();
        assert_eq!(drain(&mut modem), b"OK");

        modem.write_all(b"AT\r\n").unwrap();
        assert!(drain(&mut modem).is_empty());
        assert_eq!(modem.written_lines(), vec!["AT", "AT"]);
        assert!(modem.unused_rules().is_empty());
    }

    #[test]
    fn test_delayed_reply() {
        let clock = SimClock::new();
        let mut modem = MockTransport::new(clock.clone())
            .on_after("AT", Duration::from_millis(50), "OK");

        modem.write_all(b"AT\r\n").unwrap();
        assert!(drain(&mut modem).is_empty());

        clock.advance(Duration::from_millis(49));
        assert!(drain(&mut modem).is_empty());

        clock.advance(Duration::from_millis(1));
        assert_eq!(drain(&mut modem), b"OK");
    }

    #[test]
    fn test_injection_order() {
        let clock = SimClock::new();
        let mut modem = MockTransport::new(clock.clone());
        modem.inject_after(Duration::from_millis(10), "late");
        modem.inject("early");
        assert_eq!(drain(&mut modem), b"early");
        assert_eq!(modem.pending_len(), 4);

        clock.advance(Duration::from_millis(10));
        assert_eq!(drain(&mut modem), b"late");
    }

    #[test]
    fn test_echo_precedes_reply() {
        let clock = SimClock::new();
        let mut modem = MockTransport::new(clock).echoing().on("AT\r\n", "\r\nOK\r\n");

        modem.write_all(b"AT\r\n").unwrap();
        assert_eq!(drain(&mut modem), b"AT\r\n\r\nOK\r\n");

        modem.write_all(b"AT+CWMODE=2\r\n").unwrap();
        assert_eq!(drain(&mut modem), b"AT+CWMODE=2\r\n");
    }

    #[test]
    fn test_sim_clock_idle_ticks() {
        let clock = SimClock::with_tick(Duration::from_millis(5));
        let start = clock.now();
        clock.idle();
        clock.idle();
        assert_eq!(clock.now() - start, Duration::from_millis(10));
        assert_eq!(clock.elapsed(), Duration::from_millis(10));
    }
}

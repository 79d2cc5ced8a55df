//! Link management and the application-facing API
//!
//! [`WifiLink`] owns the transport through a [`Dispatcher`], brings the
//! module up once, then serves peers: pumping inbound frames and pushing
//! payloads out over the send handshake.

mod bringup;
mod dispatch;
mod sender;

pub use self::bringup::{BringUp, BringUpReport, BringUpStep, Branch};
pub use self::dispatch::Dispatcher;
pub use self::sender::SendOutcome;

use crate::core::{DeviceConfig, Frame, LinkConfig, LinkId, NetworkConfig, ReachabilityState, Result};
use crate::protocol::{Exchange, ExchangeOutcome, Telemetry};
use crate::transport::{Clock, SerialTransport, SystemClock, Transport};

/// Multiplexed TCP server running on an AT-command Wi-Fi module
pub struct WifiLink<T, C = SystemClock> {
    dispatcher: Dispatcher<T, C>,
    config: LinkConfig,
    reachability: ReachabilityState,
}

impl WifiLink<SerialTransport, SystemClock> {
    /// Opens the serial port named in `config`
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;
        let transport = SerialTransport::open(&config.serial.path, config.serial.baud_rate)?;
        Ok(WifiLink::new(transport, SystemClock, &config.link))
    }
}

impl<T: Transport, C: Clock> WifiLink<T, C> {
    /// Creates an unjoined link over `transport`
    pub fn new(transport: T, clock: C, config: &LinkConfig) -> Self {
        WifiLink {
            dispatcher: Dispatcher::new(transport, clock, config),
            config: config.clone(),
            reachability: ReachabilityState::Unjoined,
        }
    }

    /// Runs bring-up and records the resulting reachability.
    ///
    /// Reachability reads `Unjoined` while bring-up runs and stays that way
    /// if it returns an error.
    pub fn bring_up(&mut self, network: &NetworkConfig) -> Result<ReachabilityState> {
        network.validate()?;
        // A bring-up that dies part way leaves the module in an unknown mode.
        self.reachability = ReachabilityState::Unjoined;
        tracing::info!(port = network.service_port, "starting bring-up");
        let report = BringUp::new(&mut self.dispatcher, &self.config, network).run()?;
        self.reachability = report.state;
        Ok(report.state)
    }

    /// Reachability established by the last bring-up
    pub fn reachability(&self) -> ReachabilityState {
        self.reachability
    }

    /// Drains available bytes; returns frames completed since the last call
    pub fn pump(&mut self) -> Result<Vec<Frame>> {
        self.dispatcher.pump()
    }

    /// Sends `payload` to one peer
    pub fn send(&mut self, link: LinkId, payload: &[u8]) -> Result<SendOutcome> {
        sender::send(&mut self.dispatcher, &self.config, link, payload)
    }

    /// Sends `payload` to every open peer
    pub fn broadcast(&mut self, payload: &[u8]) -> Result<Vec<(LinkId, SendOutcome)>> {
        sender::broadcast(&mut self.dispatcher, &self.config, payload)
    }

    /// Broadcasts one telemetry line
    pub fn publish(&mut self, reading: &Telemetry) -> Result<Vec<(LinkId, SendOutcome)>> {
        let line = reading.to_line()?;
        self.broadcast(&line)
    }

    /// Runs a raw command exchange
    pub fn exchange(&mut self, exchange: &Exchange) -> Result<ExchangeOutcome> {
        self.dispatcher.exchange(exchange)
    }

    /// Currently open links, ascending
    pub fn open_links(&self) -> Vec<LinkId> {
        self.dispatcher.demux().links().open_links()
    }

    pub fn is_open(&self, link: LinkId) -> bool {
        self.dispatcher.demux().links().is_open(link)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, StationCredentials};
    use crate::transport::mock::{MockTransport, SimClock};
    use std::cell::Cell;
    use std::io;
    use std::rc::Rc;
    use std::time::{Duration, UNIX_EPOCH};

    fn link(id: u8) -> LinkId {
        LinkId::new(id).unwrap()
    }

    /// Mock whose writes fail once the cable is pulled
    struct Unplugged {
        inner: MockTransport,
        pulled: Rc<Cell<bool>>,
    }

    impl Transport for Unplugged {
        fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
            if self.pulled.get() {
                return Err(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
            }
            self.inner.write_all(bytes)
        }

        fn try_read_byte(&mut self) -> Result<Option<u8>> {
            self.inner.try_read_byte()
        }
    }

    #[test]
    fn test_starts_unjoined() {
        let clock = SimClock::new();
        let wifi = WifiLink::new(MockTransport::new(clock.clone()), clock, &LinkConfig::default());
        assert_eq!(wifi.reachability(), ReachabilityState::Unjoined);
        assert!(wifi.open_links().is_empty());
    }

    #[test]
    fn test_bring_up_rejects_bad_config() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone());
        let mut wifi = WifiLink::new(modem.clone(), clock, &LinkConfig::default());

        let mut network = NetworkConfig::default();
        network.service_port = 0;
        assert!(wifi.bring_up(&network).is_err());
        assert!(modem.writes().is_empty());
        assert_eq!(wifi.reachability(), ReachabilityState::Unjoined);
    }

    #[test]
    fn test_bring_up_then_serve() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on("AT\r\n", "\r\nOK\r\n")
            .on("AT+CWMODE=1", "\r\nOK\r\n")
            .on("AT+CWJAP=", "\r\nWIFI GOT IP\r\n\r\nOK\r\n")
            .on("AT+CIPMUX=1", "\r\nOK\r\n")
            .on("AT+CIPSERVER=1,5000", "\r\nOK\r\n");
        let mut wifi = WifiLink::new(modem.clone(), clock.clone(), &LinkConfig::default());

        let network = NetworkConfig {
            station: Some(StationCredentials {
                ssid: "lab".to_string(),
                password: "hunter22".to_string(),
            }),
            ..NetworkConfig::default()
        };
        let state = wifi.bring_up(&network).unwrap();
        assert_eq!(state, ReachabilityState::JoinedExisting);
        assert!(wifi.reachability().is_reachable());

        modem.inject("0,CONNECT\r\n\r\n+IPD,0,4:ping\r\n");
        let frames = wifi.pump().unwrap();
        assert_eq!(frames, vec![Frame::new(link(0), b"ping".to_vec())]);
        assert!(wifi.is_open(link(0)));

        modem.inject_after(Duration::from_millis(5), "0,CLOSED\r\n");
        clock.advance(Duration::from_millis(5));
        assert!(wifi.pump().unwrap().is_empty());
        assert!(wifi.open_links().is_empty());
    }

    #[test]
    fn test_publish_broadcasts_json_line() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on("AT+CIPSEND=1,", "> ")
            .on("{", "\r\nSEND OK\r\n");
        let mut wifi = WifiLink::new(modem.clone(), clock, &LinkConfig::default());
        modem.inject("1,CONNECT\r\n");
        wifi.pump().unwrap();

        let reading = Telemetry {
            celsius: Some(21.5),
            sensor: "S1".to_string(),
            ts: UNIX_EPOCH + Duration::from_secs(2),
        };
        let outcomes = wifi.publish(&reading).unwrap();
        assert_eq!(outcomes, vec![(link(1), SendOutcome::Sent)]);

        let line = reading.to_line().unwrap();
        assert_eq!(
            modem.written_lines()[0],
            format!("AT+CIPSEND=1,{}", line.len())
        );
        assert_eq!(modem.writes()[1], line);
    }

    #[test]
    fn test_failed_bring_up_clears_reachability() {
        let clock = SimClock::new();
        let modem = MockTransport::new(clock.clone())
            .on("AT\r\n", "\r\nOK\r\n")
            .on("ATE0", "\r\nOK\r\n")
            .on("AT+CWMODE=1", "\r\nOK\r\n")
            .on("AT+CWJAP=", "\r\nWIFI GOT IP\r\n\r\nOK\r\n")
            .on("AT+CIPMUX=1", "\r\nOK\r\n")
            .on("AT+CIPSERVER=1,5000", "\r\nOK\r\n");
        let pulled = Rc::new(Cell::new(false));
        let transport = Unplugged {
            inner: modem.clone(),
            pulled: pulled.clone(),
        };
        let mut wifi = WifiLink::new(transport, clock, &LinkConfig::default());

        let network = NetworkConfig {
            station: Some(StationCredentials {
                ssid: "lab".to_string(),
                password: "hunter22".to_string(),
            }),
            ..NetworkConfig::default()
        };
        assert_eq!(wifi.bring_up(&network).unwrap(), ReachabilityState::JoinedExisting);

        pulled.set(true);
        assert!(matches!(wifi.bring_up(&network), Err(Error::Io(_))));
        assert_eq!(wifi.reachability(), ReachabilityState::Unjoined);
        assert!(!wifi.reachability().is_reachable());
    }
}

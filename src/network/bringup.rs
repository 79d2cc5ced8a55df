use crate::core::{LinkConfig, NetworkConfig, ReachabilityState, Result};
use crate::protocol::{Exchange, ExchangeOutcome, Reply};
use crate::transport::{Clock, Transport};

use super::dispatch::Dispatcher;

/// Which way bring-up is trying to become reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Joining the preferred network
    Station,
    /// Hosting an own access point
    AccessPoint,
}

/// Steps of the bring-up state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpStep {
    /// Initial state
    Init,
    /// Checking the module answers at all
    ProbeModule {
        /// 1-based attempt number
        attempt: u32,
    },
    /// Turning off command echo; needed again after a factory restore
    DisableEcho(Branch),
    /// Switching to station mode
    ConfigureStation,
    /// Joining the preferred network
    JoinExisting,
    /// Factory restore before hosting
    ResetModule,
    /// Switching to access point mode and configuring it
    ConfigureAccessPoint,
    /// Allowing several peer links
    EnableMultiLink(Branch),
    /// Listening on the service port
    StartServer(Branch),
    /// Terminal
    Done(ReachabilityState),
}

/// Outcome of a bring-up run
#[derive(Debug, Clone)]
pub struct BringUpReport {
    /// Final reachability
    pub state: ReachabilityState,
    /// Every step visited, in order
    pub trail: Vec<BringUpStep>,
}

/// Drives the module from power-on to listening for peers.
///
/// Station branch: probe, echo off, station mode, join, multi-link, server.
/// Any failure on it falls back to the access point branch: factory restore,
/// echo off, access point mode, multi-link, server. A failure there is
/// terminal. Turning echo off is best effort.
pub struct BringUp<'a, T, C> {
    dispatcher: &'a mut Dispatcher<T, C>,
    link: &'a LinkConfig,
    network: &'a NetworkConfig,
    trail: Vec<BringUpStep>,
}

impl<'a, T: Transport, C: Clock> BringUp<'a, T, C> {
    /// Creates a bring-up run
    pub fn new(
        dispatcher: &'a mut Dispatcher<T, C>,
        link: &'a LinkConfig,
        network: &'a NetworkConfig,
    ) -> Self {
        BringUp {
            dispatcher,
            link,
            network,
            trail: Vec::new(),
        }
    }

    /// Runs to a terminal state
    pub fn run(mut self) -> Result<BringUpReport> {
        let mut step = BringUpStep::Init;
        loop {
            self.trail.push(step);
            if let BringUpStep::Done(state) = step {
                tracing::info!(?state, "bring-up finished");
                return Ok(BringUpReport {
                    state,
                    trail: self.trail,
                });
            }
            let next = self.advance(step)?;
            tracing::trace!(from = ?step, to = ?next, "bring-up transition");
            step = next;
        }
    }

    fn advance(&mut self, step: BringUpStep) -> Result<BringUpStep> {
        let (link, network) = (self.link, self.network);
        let tokens = &link.tokens;
        let timeouts = &link.timeouts;

        let next = match step {
            BringUpStep::Init => {
                // Links from before the run cannot be trusted.
                self.dispatcher.reset_links();
                BringUpStep::ProbeModule { attempt: 1 }
            }

            BringUpStep::ProbeModule { attempt } => {
                let probe = Exchange::new("AT", self.ok_reply(), timeouts.probe).labelled("probe");
                if self.run_exchange(&probe)? {
                    BringUpStep::DisableEcho(Branch::Station)
                } else if attempt < link.probe_attempts {
                    BringUpStep::ProbeModule {
                        attempt: attempt + 1,
                    }
                } else {
                    tracing::warn!(attempts = attempt, "module did not answer probes");
                    BringUpStep::Done(ReachabilityState::Failed)
                }
            }

            BringUpStep::DisableEcho(branch) => {
                let echo_off =
                    Exchange::new("ATE0", self.ok_reply(), timeouts.command).labelled("echo off");
                if !self.run_exchange(&echo_off)? {
                    tracing::debug!("echo still on, replies will be read past it");
                }
                match branch {
                    Branch::Station => BringUpStep::ConfigureStation,
                    Branch::AccessPoint => BringUpStep::ConfigureAccessPoint,
                }
            }

            BringUpStep::ConfigureStation => {
                let mode = Exchange::new("AT+CWMODE=1", self.ok_reply(), timeouts.command)
                    .labelled("station mode");
                if self.run_exchange(&mode)? {
                    BringUpStep::JoinExisting
                } else {
                    fallback(Branch::Station)
                }
            }

            BringUpStep::JoinExisting => match &network.station {
                Some(station) => {
                    let join = Exchange::new(
                        format!(
                            "AT+CWJAP={},{}",
                            quote(&station.ssid),
                            quote(&station.password)
                        ),
                        Reply::new(tokens.join_done.as_str(), tokens.fail.as_str())
                            .or(tokens.ok.as_str()),
                        timeouts.join,
                    )
                    .labelled("join network");
                    if self.run_exchange(&join)? {
                        tracing::info!(ssid = %station.ssid, "joined preferred network");
                        BringUpStep::EnableMultiLink(Branch::Station)
                    } else {
                        tracing::warn!(ssid = %station.ssid, "could not join preferred network");
                        fallback(Branch::Station)
                    }
                }
                None => {
                    tracing::info!("no preferred network configured");
                    fallback(Branch::Station)
                }
            },

            BringUpStep::ResetModule => {
                self.dispatcher.reset_links();
                let restore = Exchange::new(
                    "AT+RESTORE",
                    Reply::new(tokens.restore_done.as_str(), tokens.error.as_str()),
                    timeouts.restore,
                )
                .labelled("factory restore");
                if !self.run_exchange(&restore)? {
                    tracing::debug!("factory restore unconfirmed, continuing");
                }
                BringUpStep::DisableEcho(Branch::AccessPoint)
            }

            BringUpStep::ConfigureAccessPoint => {
                let ap = &network.access_point;
                let mode = Exchange::new("AT+CWMODE=2", self.ok_reply(), timeouts.command)
                    .labelled("access point mode");
                let configure = Exchange::new(
                    format!(
                        "AT+CWSAP={},{},{},{},{}",
                        quote(&ap.ssid),
                        quote(&ap.password),
                        ap.channel,
                        ap.auth.ecn(),
                        ap.max_peers
                    ),
                    self.ok_reply(),
                    timeouts.access_point,
                )
                .labelled("configure access point");

                if self.run_exchange(&mode)? && self.run_exchange(&configure)? {
                    tracing::info!(ssid = %ap.ssid, channel = ap.channel, "hosting access point");
                    BringUpStep::EnableMultiLink(Branch::AccessPoint)
                } else {
                    fallback(Branch::AccessPoint)
                }
            }

            BringUpStep::EnableMultiLink(branch) => {
                let multi = Exchange::new("AT+CIPMUX=1", self.ok_reply(), timeouts.command)
                    .labelled("multi-link");
                if self.run_exchange(&multi)? {
                    BringUpStep::StartServer(branch)
                } else {
                    fallback(branch)
                }
            }

            BringUpStep::StartServer(branch) => {
                let server = Exchange::new(
                    format!("AT+CIPSERVER=1,{}", network.service_port),
                    self.ok_reply().or(tokens.no_change.as_str()),
                    timeouts.command,
                )
                .labelled("start server");
                if self.run_exchange(&server)? {
                    tracing::info!(port = network.service_port, "listening for peers");
                    BringUpStep::Done(match branch {
                        Branch::Station => ReachabilityState::JoinedExisting,
                        Branch::AccessPoint => ReachabilityState::HostingOwn,
                    })
                } else {
                    fallback(branch)
                }
            }

            BringUpStep::Done(state) => BringUpStep::Done(state),
        };
        Ok(next)
    }

    fn ok_reply(&self) -> Reply {
        Reply::new(self.link.tokens.ok.as_str(), self.link.tokens.error.as_str())
    }

    fn run_exchange(&mut self, exchange: &Exchange) -> Result<bool> {
        Ok(matches!(
            self.dispatcher.exchange(exchange)?,
            ExchangeOutcome::Matched(_)
        ))
    }
}

/// Where a failure on `branch` leads
fn fallback(branch: Branch) -> BringUpStep {
    match branch {
        Branch::Station => BringUpStep::ResetModule,
        Branch::AccessPoint => BringUpStep::Done(ReachabilityState::Failed),
    }
}

/// Quotes an AT string argument, escaping `"`, `,` and `\`
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | ',' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

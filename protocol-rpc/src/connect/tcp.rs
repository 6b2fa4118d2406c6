//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Full TCP mesh between the workers of one run.
//!
//! Party `i` listens on `host:base_port + i`, dials every lower index and
//! accepts every higher one. The dialer opens with a handshake frame
//! carrying its index. Every link then runs a writer task fed by an
//! unbounded queue and a reader task draining into another one, so a
//! send never waits for the peer to read.

use std::collections::HashMap;
use std::io;
use std::net::TcpStream as StdTcpStream;
use std::time::Duration;
use std::time::Instant;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use protocol::mpc::Channel;
use retry::delay::Fixed;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_BASE_PORT: u16 = 11365;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

const HANDSHAKE_MAGIC: &[u8; 4] = b"PPML";
const RETRY_DELAY_MS: u64 = 200;
const MAX_FRAME_LENGTH: usize = 1 << 30;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("could not reach party {party} at {addr}: {reason}")]
    Unreachable {
        party: usize,
        addr: String,
        reason: String,
    },
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("invalid mesh configuration: {0}")]
    Config(String),
    #[error("timed out waiting for {0} parties to connect")]
    AcceptTimeout(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshConfig {
    pub host: String,
    pub base_port: u16,
    pub party: usize,
    pub parties: usize,
    pub connect_timeout: Duration,
}

impl MeshConfig {
    pub fn new(party: usize, parties: usize) -> MeshConfig {
        MeshConfig {
            host: String::from(DEFAULT_HOST),
            base_port: DEFAULT_BASE_PORT,
            party,
            parties,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn addr(&self, party: usize) -> String {
        format!("{}:{}", self.host, self.base_port as usize + party)
    }

    fn validate(&self) -> Result<(), ConnectError> {
        if self.parties < 2 || self.party >= self.parties {
            return Err(ConnectError::Config(format!(
                "party {} of {}",
                self.party, self.parties
            )));
        }
        if self.base_port as usize + self.parties - 1 > u16::MAX as usize {
            return Err(ConnectError::Config(format!(
                "ports {}..{} out of range",
                self.base_port,
                self.base_port as usize + self.parties
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum LinkError {
    Closed(usize),
    NoSuchParty(usize),
}

type Link = Framed<TcpStream, LengthDelimitedCodec>;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

fn handshake_frame(party: usize) -> Bytes {
    let mut frame = HANDSHAKE_MAGIC.to_vec();
    frame.extend_from_slice(&(party as u32).to_be_bytes());
    Bytes::from(frame)
}

fn parse_handshake(frame: &[u8]) -> Result<usize, ConnectError> {
    match frame {
        [m0, m1, m2, m3, a, b, c, d] if [*m0, *m1, *m2, *m3] == *HANDSHAKE_MAGIC => {
            Ok(u32::from_be_bytes([*a, *b, *c, *d]) as usize)
        }
        _ => Err(ConnectError::Handshake(format!(
            "unexpected {} byte greeting",
            frame.len()
        ))),
    }
}

/// Dials `party` until it answers or the timeout runs out
async fn dial(config: &MeshConfig, party: usize) -> Result<Link, ConnectError> {
    let addr = config.addr(party);
    let attempts = (config.connect_timeout.as_millis() as u64 / RETRY_DELAY_MS).max(1) as usize;
    let target = addr.clone();
    let stream = tokio::task::spawn_blocking(move || {
        retry::retry(Fixed::from_millis(RETRY_DELAY_MS).take(attempts), || {
            StdTcpStream::connect(target.as_str())
        })
    })
    .await
    .map_err(|e| ConnectError::Unreachable {
        party,
        addr: addr.clone(),
        reason: e.to_string(),
    })?
    .map_err(|e| ConnectError::Unreachable {
        party,
        addr: addr.clone(),
        reason: format!("{:?}", e),
    })?;
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)?;
    let mut link = Framed::new(TcpStream::from_std(stream)?, codec());
    link.send(handshake_frame(config.party)).await?;
    debug!("Connected to party {} at {}", party, addr);
    Ok(link)
}

/// Accepts every higher-index party and sorts the links by the index
/// each one announced
async fn accept_all(
    config: &MeshConfig,
    listener: TcpListener,
) -> Result<HashMap<usize, Link>, ConnectError> {
    let expected = config.parties - config.party - 1;
    let deadline = Instant::now() + config.connect_timeout;
    let mut links = HashMap::with_capacity(expected);
    while links.len() < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let accepted = tokio::time::timeout(remaining, async {
            let (stream, peer) = listener.accept().await?;
            stream.set_nodelay(true)?;
            let mut link = Framed::new(stream, codec());
            let greeting = link
                .next()
                .await
                .ok_or_else(|| ConnectError::Handshake(format!("{} hung up", peer)))??;
            Ok::<_, ConnectError>((parse_handshake(&greeting)?, link))
        })
        .await
        .map_err(|_| ConnectError::AcceptTimeout(expected - links.len()))?;
        let (party, link) = accepted?;
        if party <= config.party || party >= config.parties || links.contains_key(&party) {
            return Err(ConnectError::Handshake(format!(
                "unexpected party {} connected to party {}",
                party, config.party
            )));
        }
        debug!("Accepted party {}", party);
        links.insert(party, link);
    }
    Ok(links)
}

/// One party's end of the mesh
pub struct TcpChannel {
    party: usize,
    senders: Vec<Option<UnboundedSender<Bytes>>>,
    receivers: Vec<Option<UnboundedReceiver<Vec<u8>>>>,
    writers: Vec<JoinHandle<io::Result<()>>>,
    readers: Vec<JoinHandle<()>>,
}

impl TcpChannel {
    fn new(party: usize, parties: usize) -> TcpChannel {
        TcpChannel {
            party,
            senders: (0..parties).map(|_| None).collect(),
            receivers: (0..parties).map(|_| None).collect(),
            writers: vec![],
            readers: vec![],
        }
    }

    fn attach(&mut self, peer: usize, link: Link) {
        let (mut sink, mut stream) = link.split();

        let (tx, mut rx) = unbounded_channel::<Bytes>();
        self.writers.push(tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                sink.send(frame).await?;
            }
            sink.close().await
        }));

        let (in_tx, in_rx) = unbounded_channel::<Vec<u8>>();
        let me = self.party;
        self.readers.push(tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(bytes) => {
                        if in_tx.send(bytes.to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("party {}: link to party {} failed: {}", me, peer, e);
                        break;
                    }
                }
            }
        }));

        self.senders[peer] = Some(tx);
        self.receivers[peer] = Some(in_rx);
    }

    pub fn party(&self) -> usize {
        self.party
    }

    /// Flushes and closes every outgoing link
    pub async fn close(mut self) -> Result<(), ConnectError> {
        self.senders.clear();
        for w in self.writers.drain(..) {
            match w.await {
                Ok(res) => res?,
                Err(e) => return Err(ConnectError::Io(io::Error::new(io::ErrorKind::Other, e))),
            }
        }
        for r in self.readers.drain(..) {
            r.abort();
        }
        debug!("party {}: links closed", self.party);
        Ok(())
    }
}

impl Channel for TcpChannel {
    type SendError = LinkError;
    type RecvError = LinkError;

    async fn send_bytes_to(&mut self, party: usize, msg: Vec<u8>) -> Result<(), LinkError> {
        match self.senders.get(party).and_then(Option::as_ref) {
            Some(s) => s.send(Bytes::from(msg)).map_err(|_| LinkError::Closed(party)),
            None => Err(LinkError::NoSuchParty(party)),
        }
    }

    async fn recv_bytes_from(&mut self, party: usize) -> Result<Vec<u8>, LinkError> {
        match self.receivers.get_mut(party).and_then(Option::as_mut) {
            Some(r) => r.recv().await.ok_or(LinkError::Closed(party)),
            None => Err(LinkError::NoSuchParty(party)),
        }
    }
}

/// Builds the mesh for `config.party`. Returns once a link to every
/// other party is up.
pub async fn connect(config: &MeshConfig) -> Result<TcpChannel, ConnectError> {
    config.validate()?;
    let listener = TcpListener::bind(config.addr(config.party)).await?;
    info!(
        "Party {} listening on {}, expecting {} parties",
        config.party,
        config.addr(config.party),
        config.parties
    );

    let mut channel = TcpChannel::new(config.party, config.parties);
    for peer in 0..config.party {
        let link = dial(config, peer).await?;
        channel.attach(peer, link);
    }
    for (peer, link) in accept_all(config, listener).await? {
        channel.attach(peer, link);
    }
    info!("Party {} connected to all {} parties", config.party, config.parties);
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_parsing() {
        assert_eq!(parse_handshake(&handshake_frame(7)).unwrap(), 7);
        assert!(parse_handshake(b"PPML").is_err());
        assert!(parse_handshake(b"XXXX\0\0\0\x01").is_err());
    }

    #[test]
    fn config_validation() {
        let mut c = MeshConfig::new(0, 3);
        assert!(c.validate().is_ok());
        assert_eq!(c.addr(2), "127.0.0.1:11367");
        c.party = 3;
        assert!(c.validate().is_err());
        c.party = 0;
        c.base_port = u16::MAX;
        assert!(c.validate().is_err());
    }
}

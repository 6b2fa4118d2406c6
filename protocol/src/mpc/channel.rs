//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! Point-to-point byte transport between the parties of one run.

use std::fmt;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;

use crate::shared::ProtocolError;

/// A communication channel used to send/receive messages to/from another party.
///
/// Messages between a fixed pair of parties are delivered in order.
pub trait Channel: Send {
    type SendError: fmt::Debug;
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index.
    fn send_bytes_to(
        &mut self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits the next message from the party with the given index.
    fn recv_bytes_from(
        &mut self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// Wraps a [`Channel`] with bincode (de-)serialization.
#[derive(Debug)]
pub struct MsgChannel<C: Channel>(pub C);

impl<C: Channel> MsgChannel<C> {
    pub async fn send_to(
        &mut self,
        party: usize,
        phase: &str,
        msg: &impl Serialize,
    ) -> Result<(), ProtocolError> {
        let bytes = bincode::serialize(msg).map_err(|e| {
            ProtocolError::ErrorSerialization(format!("sending {}: {}", phase, e))
        })?;
        self.0.send_bytes_to(party, bytes).await.map_err(|e| {
            ProtocolError::ErrorChannel(format!("{} to party {}: {:?}", phase, party, e))
        })
    }

    pub async fn recv_from<T: DeserializeOwned>(
        &mut self,
        party: usize,
        phase: &str,
    ) -> Result<T, ProtocolError> {
        let bytes = self.0.recv_bytes_from(party).await.map_err(|e| {
            ProtocolError::ErrorChannel(format!("{} from party {}: {:?}", phase, party, e))
        })?;
        bincode::deserialize(&bytes).map_err(|e| {
            ProtocolError::ErrorDeserialization(format!("receiving {}: {}", phase, e))
        })
    }

    /// Receives a vector and checks its length
    pub async fn recv_vec_from<T: DeserializeOwned>(
        &mut self,
        party: usize,
        phase: &str,
        len: usize,
    ) -> Result<Vec<T>, ProtocolError> {
        let v: Vec<T> = self.recv_from(party, phase).await?;
        if v.len() != len {
            return Err(ProtocolError::ErrorDeserialization(format!(
                "{}: party {} sent {} items, expected {}",
                phase,
                party,
                v.len(),
                len
            )));
        }
        Ok(v)
    }
}

/// In-process channel backed by unbounded tokio queues, for running
/// several parties as tasks of one process.
#[derive(Debug)]
pub struct LocalChannel {
    s: Vec<Option<UnboundedSender<Vec<u8>>>>,
    r: Vec<Option<UnboundedReceiver<Vec<u8>>>>,
}

#[derive(Debug)]
pub enum LocalRecvError {
    Closed,
    NoSuchParty(usize),
}

impl LocalChannel {
    /// Creates fully connected channels for `parties` parties.
    pub fn channels(parties: usize) -> Vec<LocalChannel> {
        let mut channels = (0..parties)
            .map(|_| LocalChannel {
                s: (0..parties).map(|_| None).collect(),
                r: (0..parties).map(|_| None).collect(),
            })
            .collect::<Vec<_>>();
        for a in 0..parties {
            for b in 0..parties {
                if a != b {
                    let (send_a_to_b, recv_a_to_b) = unbounded_channel();
                    channels[a].s[b] = Some(send_a_to_b);
                    channels[b].r[a] = Some(recv_a_to_b);
                }
            }
        }
        channels
    }
}

impl Channel for LocalChannel {
    type SendError = SendError<Vec<u8>>;
    type RecvError = LocalRecvError;

    async fn send_bytes_to(&mut self, party: usize, msg: Vec<u8>) -> Result<(), Self::SendError> {
        match self.s.get(party).and_then(Option::as_ref) {
            Some(s) => s.send(msg),
            None => Err(SendError(msg)),
        }
    }

    async fn recv_bytes_from(&mut self, party: usize) -> Result<Vec<u8>, Self::RecvError> {
        match self.r.get_mut(party).and_then(Option::as_mut) {
            Some(r) => r.recv().await.ok_or(LocalRecvError::Closed),
            None => Err(LocalRecvError::NoSuchParty(party)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_channels_deliver_in_order() {
        let mut chans = LocalChannel::channels(3).into_iter();
        let (a, b, c) = (
            chans.next().unwrap(),
            chans.next().unwrap(),
            chans.next().unwrap(),
        );
        let (mut a, mut b, mut c) = (MsgChannel(a), MsgChannel(b), MsgChannel(c));

        a.send_to(2, "test", &vec![1u64, 2]).await.unwrap();
        a.send_to(2, "test", &vec![3u64]).await.unwrap();
        b.send_to(2, "test", &String::from("b")).await.unwrap();

        let first: Vec<u64> = c.recv_vec_from(0, "test", 2).await.unwrap();
        let second: Vec<u64> = c.recv_from(0, "test").await.unwrap();
        let from_b: String = c.recv_from(1, "test").await.unwrap();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![3]);
        assert_eq!(from_b, "b");
    }

    #[tokio::test]
    async fn length_mismatch_is_reported() {
        let mut chans = LocalChannel::channels(2);
        let mut b = MsgChannel(chans.pop().unwrap());
        let mut a = MsgChannel(chans.pop().unwrap());
        a.send_to(1, "len", &vec![1u64]).await.unwrap();
        let r: Result<Vec<u64>, _> = b.recv_vec_from(0, "len", 2).await;
        assert!(matches!(r, Err(ProtocolError::ErrorDeserialization(_))));
    }

    #[tokio::test]
    async fn no_self_channel() {
        let mut chans = LocalChannel::channels(2);
        assert!(chans[0].send_bytes_to(0, vec![]).await.is_err());
        assert!(matches!(
            chans[1].recv_bytes_from(1).await,
            Err(LocalRecvError::NoSuchParty(1))
        ));
    }
}

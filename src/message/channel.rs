use crossbeam_channel::Sender;

use super::comm::{Communicator, Tag, TAG_HANGUP};
use super::mailbox::{Envelope, Mailbox};
use crate::error::{Error, Result};

/// A communicator for a group of threads in one process, connected by
/// unbounded crossbeam channels. Every member holds a sender to every other
/// member (itself included) and owns the receiving end of its own inbox.
///
pub struct ChannelCommunicator {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    mailbox: Mailbox,
}

impl ChannelCommunicator {
    /// Create a fully connected group of the given size. Element `n` of the
    /// returned vector has rank `n`; move each one onto its own thread.
    ///
    pub fn group(size: usize) -> Vec<Self> {
        let (sinks, sources): (Vec<_>, Vec<_>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();

        sources
            .into_iter()
            .enumerate()
            .map(|(rank, source)| Self {
                rank,
                peers: sinks.clone(),
                mailbox: Mailbox::new(source),
            })
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.mailbox.pending_len()
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, tag: Tag, message: Vec<u8>) -> Result<()> {
        let envelope = Envelope {
            source: self.rank,
            tag,
            data: message,
        };
        self.peers
            .get(rank)
            .ok_or(Error::Disconnected(rank))?
            .send(envelope)
            .map_err(|_| Error::Disconnected(rank))
    }

    fn recv(&self, rank: usize, tag: Tag) -> Result<Vec<u8>> {
        self.mailbox.take(rank, tag)
    }
}

impl Drop for ChannelCommunicator {
    fn drop(&mut self) {
        for rank in (0..self.peers.len()).filter(|&r| r != self.rank) {
            let _ = self.send(rank, TAG_HANGUP, Vec::new());
        }
    }
}

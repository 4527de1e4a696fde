use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
};

use crossbeam_channel::Receiver;
use log::debug;

use super::comm::{Tag, TAG_HANGUP};
use crate::error::{Error, Result};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    pub source: usize,
    pub tag: Tag,
    pub data: Vec<u8>,
}

/// Mailbox enforces matching on incoming messages: it makes sure that a
/// message which arrives ahead of the receive it belongs to is kept until
/// the local process asks for it. Each `(source, tag)` pair has its own FIFO
/// queue, so per-peer ordering is preserved. A peer that has hung up can
/// still be drained of what it sent before leaving; after that, waiting on
/// it is an error rather than a hang.
pub struct Mailbox {
    inbound: Receiver<Envelope>,
    pending: RefCell<HashMap<(usize, Tag), VecDeque<Vec<u8>>>>,
    departed: RefCell<HashSet<usize>>,
}

impl Mailbox {
    pub fn new(inbound: Receiver<Envelope>) -> Self {
        Self {
            inbound,
            pending: RefCell::new(HashMap::new()),
            departed: RefCell::new(HashSet::new()),
        }
    }

    /// Block until a message from `source` with `tag` is available, and
    /// return it. Anything else that arrives in the meantime is buffered.
    pub fn take(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        if let Some(data) = self
            .pending
            .borrow_mut()
            .get_mut(&(source, tag))
            .and_then(VecDeque::pop_front)
        {
            return Ok(data);
        }
        if self.departed.borrow().contains(&source) {
            return Err(Error::Disconnected(source));
        }
        loop {
            let env = self
                .inbound
                .recv()
                .map_err(|_| Error::Disconnected(source))?;

            if env.tag == TAG_HANGUP {
                debug!("Peer {} has left the group", env.source);
                self.departed.borrow_mut().insert(env.source);
                if env.source == source {
                    return Err(Error::Disconnected(source));
                }
                continue;
            }
            if env.source == source && env.tag == tag {
                return Ok(env.data);
            }
            debug!(
                "Message from {} with tag {:#x} arrived early, buffering",
                env.source, env.tag
            );
            self.pending
                .borrow_mut()
                .entry((env.source, env.tag))
                .or_insert_with(VecDeque::new)
                .push_back(env.data)
        }
    }

    /// Number of messages received but not yet taken.
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().values().map(VecDeque::len).sum()
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn envelope(source: usize, tag: Tag, byte: u8) -> Envelope {
        Envelope {
            source,
            tag,
            data: vec![byte],
        }
    }

    #[test]
    fn early_messages_are_buffered_until_taken() {
        let (sink, source) = crossbeam_channel::unbounded();
        let mailbox = Mailbox::new(source);

        sink.send(envelope(2, 1, 20)).unwrap();
        sink.send(envelope(1, 1, 10)).unwrap();
        sink.send(envelope(2, 1, 21)).unwrap();

        assert_eq!(mailbox.take(1, 1).unwrap(), vec![10]);
        assert_eq!(mailbox.pending_len(), 1);
        assert_eq!(mailbox.inbound_len(), 1);
        assert_eq!(mailbox.take(2, 1).unwrap(), vec![20]);
        assert_eq!(mailbox.take(2, 1).unwrap(), vec![21]);
        assert_eq!(mailbox.pending_len(), 0);
    }

    #[test]
    fn tags_are_matched_separately() {
        let (sink, source) = crossbeam_channel::unbounded();
        let mailbox = Mailbox::new(source);

        sink.send(envelope(0, 7, 1)).unwrap();
        sink.send(envelope(0, 8, 2)).unwrap();

        assert_eq!(mailbox.take(0, 8).unwrap(), vec![2]);
        assert_eq!(mailbox.take(0, 7).unwrap(), vec![1]);
    }

    #[test]
    fn a_departed_peer_is_drained_before_it_is_reported() {
        let (sink, source) = crossbeam_channel::unbounded();
        let mailbox = Mailbox::new(source);

        sink.send(envelope(1, 4, 40)).unwrap();
        sink.send(envelope(1, TAG_HANGUP, 0)).unwrap();
        sink.send(envelope(2, 4, 50)).unwrap();

        assert_eq!(mailbox.take(2, 4).unwrap(), vec![50]);
        assert_eq!(mailbox.take(1, 4).unwrap(), vec![40]);
        assert!(matches!(mailbox.take(1, 4), Err(Error::Disconnected(1))));
        assert_eq!(mailbox.pending_len(), 0);
    }

    #[test]
    fn closed_inbox_reports_the_awaited_peer() {
        let (sink, source) = crossbeam_channel::unbounded::<Envelope>();
        let mailbox = Mailbox::new(source);
        drop(sink);

        match mailbox.take(3, 0) {
            Err(Error::Disconnected(3)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}

use super::util;
use crate::error::Result;

/// Label carried by every message. A receive matches on both the sending
/// rank and the tag, so traffic of different kinds between the same two
/// peers cannot be confused.
pub type Tag = u32;

pub const TAG_BROADCAST: Tag = 0xB0;
pub const TAG_REDUCE: Tag = 0xB1;

/// Sent by a member as it leaves the group. It carries no data and is
/// consumed by the receiving mailbox.
pub const TAG_HANGUP: Tag = Tag::MAX;

/// Interface for a group of processes that can exchange messages over a
/// network. The underlying transport can in principle be TCP, UDP, in-process
/// channels, or a higher level abstraction like MPI.
///
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peers processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. This method must
    /// return immediately, in other words it is not allowed to block until a
    /// matching receive is posted.
    fn send(&self, rank: usize, tag: Tag, message: Vec<u8>) -> Result<()>;

    /// Must be implemented to receive the next message from the given peer
    /// with the given tag. Messages from one peer with one tag arrive in the
    /// order they were sent. This method is allowed to block until a message
    /// is ready to be received.
    fn recv(&self, rank: usize, tag: Tag) -> Result<Vec<u8>>;

    /// Send to `dest` and receive from `source` in one paired operation. A
    /// `None` peer is the null process: that half of the exchange is skipped
    /// and, for the receive half, `None` is returned.
    ///
    fn sendrecv(
        &self,
        dest: Option<usize>,
        message: Vec<u8>,
        source: Option<usize>,
        tag: Tag,
    ) -> Result<Option<Vec<u8>>> {
        if let Some(dest) = dest {
            self.send(dest, tag, message)?;
        }
        match source {
            Some(source) => self.recv(source, tag).map(Some),
            None => Ok(None),
        }
    }

    /// Implements a binomial tree broadcast from the root node. The message
    /// buffer must be `Some` if this is the root node, and it must be `None`
    /// otherwise.
    ///
    fn broadcast(&self, value: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let r = self.rank();
        let p = self.size();

        let value = match value {
            Some(value) => value,
            None => self.recv(r - (1 << r.trailing_zeros()), TAG_BROADCAST)?,
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 && r + one < p {
                self.send(r + one, TAG_BROADCAST, value.clone())?
            }
        }
        Ok(value)
    }

    /// Implements a binomial tree reduce. All ranks return `None` except for
    /// the root.
    ///
    fn reduce<F>(&self, f: F, mut value: Vec<u8>) -> Result<Option<Vec<u8>>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let r = self.rank();
        let p = self.size();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv(r + one, TAG_REDUCE)?)
                }
            } else {
                self.send(r - one, TAG_REDUCE, value)?;
                return Ok(None);
            }
        }
        Ok(Some(value))
    }

    /// Implements an all-reduce (symmetric fold) operation over a commutative
    /// binary operator.
    ///
    fn all_reduce<F>(&self, f: F, value: Vec<u8>) -> Result<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let reduced = self.reduce(f, value)?;
        self.broadcast(reduced)
    }

    /// Global maximum of one double over the whole group.
    ///
    fn all_reduce_max(&self, x: f64) -> Result<f64> {
        let max = |a: Vec<u8>, b: Vec<u8>| match (util::decode_f64(&a), util::decode_f64(&b)) {
            (Ok(a), Ok(b)) => util::encode_f64(a.max(b)),
            (Ok(_), Err(_)) => a,
            _ => b,
        };
        util::decode_f64(&self.all_reduce(max, util::encode_f64(x))?)
    }
}

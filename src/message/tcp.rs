use std::collections::{HashMap, HashSet};
use std::io::{self, prelude::*};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};

use super::backoff::{ExponentialBackoff, Retry};
use super::comm::{Communicator, Tag, TAG_HANGUP};
use super::mailbox::{Envelope, Mailbox};
use super::util;
use crate::error::{Error, Result};

const RETRY_WAIT: Duration = Duration::from_millis(250);
const RETRY_MAX_WAIT: Duration = Duration::from_millis(5000);
const CONNECT_ATTEMPTS: usize = 20;

/// An encoded envelope queued for one peer.
pub struct Outbound {
    pub rank: usize,
    pub tag: Tag,
    pub frame: Vec<u8>,
}

/// Owns the two background threads of a TCP rank: a listener that accepts
/// connections from peers and forwards every decoded envelope into the
/// inbox, and a serial sender that drains the outbound queue, connecting to
/// peers lazily. Each frame is acknowledged by the receiver echoing the
/// frame length.
///
/// A peer that cannot be delivered to is marked dead on the first failure.
/// The sender discards everything queued for it afterwards, so a lost frame
/// is never followed by a later one that the peer could mistake for it.
pub struct TcpHost {
    listen_thread: Option<thread::JoinHandle<()>>,
    send_thread: Option<thread::JoinHandle<()>>,
    dead: Arc<Mutex<HashSet<usize>>>,
}

impl TcpHost {
    /// Bind this rank's listening socket and start both threads. Returns the
    /// host, the outbound queue, and the inbox.
    ///
    pub fn new(
        rank: usize,
        peers: Vec<SocketAddr>,
    ) -> Result<(Self, Sender<Outbound>, Receiver<Envelope>)> {
        let addr = *peers.get(rank).ok_or_else(|| {
            Error::InvalidConfig(format!("rank {} has no address in a group of {}", rank, peers.len()))
        })?;
        let listener = TcpListener::bind(addr)?;
        info!("Listening to: {}", addr);

        let (send_sink, send_src) = crossbeam_channel::unbounded();
        let (recv_sink, recv_src) = crossbeam_channel::unbounded();
        let dead = Arc::new(Mutex::new(HashSet::new()));

        let host = TcpHost {
            listen_thread: Some(Self::start_listener(listener, recv_sink)),
            send_thread: Some(Self::start_serial_sender(peers, send_src, dead.clone())),
            dead,
        };
        Ok((host, send_sink, recv_src))
    }

    /// Whether delivery to `rank` has failed.
    pub fn is_dead(&self, rank: usize) -> bool {
        Self::marked_dead(&self.dead, rank)
    }

    /// Wait for the sender thread to drain its queue. The outbound sender
    /// handed out by [`TcpHost::new`] must have been dropped first.
    ///
    pub fn join(&mut self) {
        if let Some(handle) = self.send_thread.take() {
            if handle.join().is_err() {
                error!("TCP sender thread panicked");
            }
        }
    }

    fn marked_dead(dead: &Mutex<HashSet<usize>>, rank: usize) -> bool {
        dead.lock().map_or(true, |dead| dead.contains(&rank))
    }

    fn start_serial_sender(
        peers: Vec<SocketAddr>,
        send_src: Receiver<Outbound>,
        dead: Arc<Mutex<HashSet<usize>>>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut table: HashMap<usize, TcpStream> = HashMap::new();

            for Outbound { rank, tag, frame } in send_src {
                if Self::marked_dead(&dead, rank) {
                    debug!("Discarding message for dead peer {}", rank);
                    continue;
                }
                // Hangups go out only over an open connection, once.
                if tag == TAG_HANGUP {
                    if let Some(client) = table.get_mut(&rank) {
                        if let Err(e) = util::write_frame(client, &frame)
                            .and_then(|()| Self::await_ack(client, frame.len()))
                        {
                            debug!("Hangup for {} not delivered: {}", rank, e);
                        }
                    }
                    continue;
                }
                if let Err(e) = Self::deliver(&mut table, &peers, rank, &frame) {
                    error!("Peer {} is unreachable, nothing more will be sent to it: {}", rank, e);
                    table.remove(&rank);
                    if let Ok(mut dead) = dead.lock() {
                        dead.insert(rank);
                    }
                }
            }
            info!("Outbound queue closed, sender shutting down")
        })
    }

    /// Write one frame to a peer and wait for its acknowledgement. A cached
    /// connection that fails on write is replaced once. Once the whole frame
    /// has been written the peer may already have taken it, so a missing
    /// ack is final and the frame is not sent again.
    ///
    fn deliver(
        table: &mut HashMap<usize, TcpStream>,
        peers: &[SocketAddr],
        rank: usize,
        frame: &[u8],
    ) -> io::Result<()> {
        let addr = *peers
            .get(rank)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no peer {}", rank)))?;

        for attempt in 0..2 {
            if !table.contains_key(&rank) {
                table.insert(rank, Self::connect_with_retry(addr)?);
            }
            let client = table
                .get_mut(&rank)
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

            if let Err(e) = util::write_frame(client, frame) {
                warn!("Send to {} failed (attempt {}): {}", addr, attempt + 1, e);
                table.remove(&rank);
                continue;
            }
            return Self::await_ack(client, frame.len());
        }
        Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            format!("connection to {} keeps failing", addr),
        ))
    }

    fn await_ack(client: &mut TcpStream, len: usize) -> io::Result<()> {
        let ack = util::read_usize(client)?;
        if ack == len {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("sent {} bytes but receiver acked {}", len, ack),
            ))
        }
    }

    fn start_listener(listener: TcpListener, recv_sink: Sender<Envelope>) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => Self::handle_connection(stream, recv_sink.clone()),
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            }
        })
    }

    fn handle_connection(mut stream: TcpStream, recv_sink: Sender<Envelope>) {
        let remote = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".into());
        info!("Receiving connection from {}", remote);

        thread::spawn(move || loop {
            let frame = match util::read_frame(&mut stream) {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("Connection from {} closed", remote);
                    break;
                }
                Err(e) => {
                    error!("Connection from {} failed: {}", remote, e);
                    break;
                }
            };
            let num_bytes = frame.len();
            let envelope: Envelope = match rmp_serde::decode::from_slice(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!("Undecodable frame from {}: {}", remote, e);
                    break;
                }
            };
            if recv_sink.send(envelope).is_err() {
                debug!("Inbox closed, dropping connection from {}", remote);
                break;
            }
            if let Err(e) = stream
                .write_all(&num_bytes.to_le_bytes())
                .and_then(|()| stream.flush())
            {
                error!("Failed to ack {}: {}", remote, e);
                break;
            }
        });
    }

    fn connect_with_retry(addr: SocketAddr) -> io::Result<TcpStream> {
        debug!("Connecting to {}...", addr);
        ExponentialBackoff::new(RETRY_WAIT, RETRY_MAX_WAIT, 2)
            .take(CONNECT_ATTEMPTS)
            .retry(
                || TcpStream::connect(addr),
                |e, delay| {
                    warn!("Connect to {} failed: {}, retrying in {:?}", addr, e, delay);
                    thread::sleep(delay)
                },
            )
            .unwrap_or_else(|| Err(io::ErrorKind::TimedOut.into()))
            .and_then(|stream| stream.set_nodelay(true).map(|()| stream))
    }
}

/// A communicator in which each rank is a separate process reachable at a
/// socket address. The address list is the same on every rank; entry `n` is
/// rank `n`.
///
pub struct TcpCommunicator {
    rank: usize,
    num_peers: usize,
    send_sink: Option<Sender<Outbound>>,
    mailbox: Mailbox,
    host: TcpHost,
}

impl TcpCommunicator {
    pub fn new(rank: usize, peers: Vec<SocketAddr>) -> Result<Self> {
        let num_peers = peers.len();
        let (host, send_sink, recv_src) = TcpHost::new(rank, peers)?;
        Ok(Self {
            rank,
            num_peers,
            send_sink: Some(send_sink),
            mailbox: Mailbox::new(recv_src),
            host,
        })
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.num_peers
    }

    /// Queue a message for the sender thread. Fails once an earlier
    /// delivery to the same peer has failed.
    fn send(&self, rank: usize, tag: Tag, message: Vec<u8>) -> Result<()> {
        if self.host.is_dead(rank) {
            return Err(Error::Disconnected(rank));
        }
        let envelope = Envelope {
            source: self.rank,
            tag,
            data: message,
        };
        let frame = rmp_serde::encode::to_vec(&envelope)?;
        self.send_sink
            .as_ref()
            .ok_or(Error::Disconnected(rank))?
            .send(Outbound { rank, tag, frame })
            .map_err(|_| Error::Disconnected(rank))
    }

    fn recv(&self, rank: usize, tag: Tag) -> Result<Vec<u8>> {
        self.mailbox.take(rank, tag)
    }
}

impl Drop for TcpCommunicator {
    fn drop(&mut self) {
        // Peers still connected are told this rank is leaving. Closing the
        // outbound queue then lets the sender thread finish delivering what is
        // queued and exit. The listener blocks in accept and is left to die
        // with the process.
        for rank in (0..self.num_peers).filter(|&r| r != self.rank) {
            let _ = self.send(rank, TAG_HANGUP, Vec::new());
        }
        self.send_sink.take();
        self.host.join();
        self.host.listen_thread.take();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn free_addresses(n: usize) -> Vec<SocketAddr> {
        let listeners: Vec<_> = (0..n)
            .map(|_| TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).unwrap())
            .collect();
        listeners.iter().map(|l| l.local_addr().unwrap()).collect()
    }

    #[test]
    fn tcp_ring_exchanges_rows() {
        let peers = free_addresses(3);
        let procs: Vec<_> = (0..3)
            .map(|rank| {
                let peers = peers.clone();
                thread::spawn(move || {
                    let comm = TcpCommunicator::new(rank, peers).unwrap();
                    let dest = (rank + 1) % comm.size();
                    let source = (rank + comm.size() - 1) % comm.size();
                    comm.send(dest, 3, util::encode_row(&[rank as f64, 0.5])).unwrap();
                    let mut row = [0.0; 2];
                    util::decode_row_into(&comm.recv(source, 3).unwrap(), &mut row).unwrap();
                    let max = comm.all_reduce_max(rank as f64).unwrap();
                    (row, max)
                })
            })
            .collect();

        let results: Vec<_> = procs.into_iter().map(|p| p.join().unwrap()).collect();
        assert_eq!(results[0].0, [2.0, 0.5]);
        assert_eq!(results[1].0, [0.0, 0.5]);
        assert!(results.iter().all(|(_, max)| *max == 2.0));
    }

    #[test]
    fn sends_to_a_departed_rank_fail_and_its_hangup_is_seen() {
        let peers = free_addresses(2);
        let first = TcpCommunicator::new(0, peers.clone()).unwrap();
        let second = TcpCommunicator::new(1, peers).unwrap();

        first.send(1, 3, vec![1]).unwrap();
        second.send(0, 3, vec![2]).unwrap();
        assert_eq!(second.recv(0, 3).unwrap(), vec![1]);
        assert_eq!(first.recv(1, 3).unwrap(), vec![2]);
        drop(second);

        match first.recv(1, 3) {
            Err(Error::Disconnected(1)) => {}
            other => panic!("unexpected result {:?}", other),
        }

        let mut refused = None;
        for _ in 0..100 {
            if let Err(e) = first.send(1, 3, vec![3]) {
                refused = Some(e);
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(matches!(refused, Some(Error::Disconnected(1))));
    }
}

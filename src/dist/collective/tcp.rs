//! Multi-process worker group joined through a TCP hub at rank 0.
//!
//! Rank 0 listens on the rendezvous address; every other rank connects and
//! introduces itself. Once the whole group has joined, the hub tells every
//! peer the group is ready. Each collective call is one numbered round:
//! spokes send their buffer to the hub, the hub reduces and answers every
//! spoke.
//!
//! Messages are CBOR-encoded `Message` values behind a big-endian `u32`
//! length prefix. Frames above [`MESSAGE_SIZE_LIMIT`] are rejected before
//! anything is allocated for them.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_root, Collective, ReduceOp};
use crate::dist::WorkerContext;
use crate::error::{Error, Result};

/// Largest encoded message accepted from or sent to a peer (64 MiB).
pub const MESSAGE_SIZE_LIMIT: usize = 64 * 1024 * 1024;

const MAGIC: u32 = 0x504F_4452;
const RETRY_INTERVAL: Duration = Duration::from_millis(25);
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum RoundKind {
    Reduce(ReduceOp),
    Broadcast { root: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Message {
    Hello { magic: u32, rank: u32, world_size: u32 },
    Ready { world_size: u32 },
    Round { seq: u64, kind: RoundKind, values: Vec<f32> },
    Abort { seq: u64, reason: String },
}

impl Message {
    /// Short description for error messages, without the payload.
    fn summary(&self) -> String {
        match self {
            Message::Hello { rank, .. } => format!("hello from rank {rank}"),
            Message::Ready { world_size } => format!("ready for {world_size} workers"),
            Message::Round { seq, kind, values } => {
                format!("round {seq} {kind:?} with {} values", values.len())
            }
            Message::Abort { seq, .. } => format!("abort in round {seq}"),
        }
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn write_message(stream: &mut TcpStream, message: &Message) -> io::Result<()> {
    let mut payload = Vec::new();
    ciborium::into_writer(message, &mut payload).map_err(|e| invalid_data(e.to_string()))?;
    if payload.len() > MESSAGE_SIZE_LIMIT {
        return Err(invalid_data(format!(
            "message of {} bytes exceeds limit {MESSAGE_SIZE_LIMIT}",
            payload.len()
        )));
    }
    let len = u32::try_from(payload.len()).map_err(|e| invalid_data(e.to_string()))?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    stream.write_all(&frame)?;
    stream.flush()
}

fn read_message(stream: &mut TcpStream) -> io::Result<Message> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MESSAGE_SIZE_LIMIT {
        return Err(invalid_data(format!("frame of {len} bytes exceeds limit {MESSAGE_SIZE_LIMIT}")));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    ciborium::from_reader(payload.as_slice()).map_err(|e| invalid_data(e.to_string()))
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

#[derive(Debug)]
enum Role {
    /// Rank 0: one stream per peer, index `rank - 1`.
    Hub { peers: Vec<TcpStream> },
    Spoke { hub: TcpStream },
}

/// Collective over TCP with rank 0 acting as the reduction hub.
///
/// Joining the group is bounded by a join timeout; every round after that
/// is bounded by the (usually shorter) round timeout.
#[derive(Debug)]
pub struct TcpCollective {
    rank: usize,
    world_size: usize,
    round: u64,
    timeout: Duration,
    role: Role,
    aborted: Option<String>,
}

impl TcpCollective {
    /// Join the group at `addr`: rank 0 binds it, every other rank connects.
    pub fn connect(
        ctx: &WorkerContext,
        addr: &str,
        join_timeout: Duration,
        round_timeout: Duration,
    ) -> Result<Self> {
        if ctx.is_primary() {
            let listener = TcpListener::bind(addr)
                .map_err(|e| Error::io(format!("binding rendezvous address {addr}"), e))?;
            Self::hub(listener, ctx.group_size(), join_timeout, round_timeout)
        } else {
            Self::spoke(addr, ctx, join_timeout, round_timeout)
        }
    }

    /// Accept `world_size - 1` peers on `listener` and act as rank 0.
    ///
    /// # Errors
    ///
    /// [`Error::CoordinationTimeout`] if not every peer connects within
    /// `join_timeout`; [`Error::Configuration`] if a peer announces a bad
    /// rank or a different group size.
    pub fn hub(
        listener: TcpListener,
        world_size: usize,
        join_timeout: Duration,
        round_timeout: Duration,
    ) -> Result<Self> {
        let join_timeout = join_timeout.max(MIN_TIMEOUT);
        let round_timeout = round_timeout.max(MIN_TIMEOUT);
        let start = Instant::now();
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::io("configuring rendezvous listener", e))?;

        let mut slots: Vec<Option<TcpStream>> = (1..world_size).map(|_| None).collect();
        let mut joined = 0;
        while joined < slots.len() {
            match listener.accept() {
                Ok((mut stream, peer_addr)) => {
                    let rank = Self::admit(&mut stream, world_size, join_timeout)?;
                    let slot = &mut slots[rank - 1];
                    if slot.is_some() {
                        return Err(Error::Configuration(format!(
                            "rank {rank} joined twice (second time from {peer_addr})"
                        )));
                    }
                    debug!(rank, %peer_addr, "peer joined");
                    *slot = Some(stream);
                    joined += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= join_timeout {
                        return Err(Error::CoordinationTimeout {
                            rank: 0,
                            round: 0,
                            waited: start.elapsed(),
                            detail: format!("{} of {} workers joined", joined + 1, world_size),
                        });
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(Error::io("accepting peer connection", e)),
            }
        }

        let mut peers: Vec<TcpStream> = slots.into_iter().flatten().collect();
        let ready = Message::Ready { world_size: group_size_u32(world_size)? };
        for peer in &mut peers {
            peer.set_read_timeout(Some(round_timeout))
                .and_then(|()| write_message(peer, &ready))
                .map_err(|e| Error::io("starting worker group", e))?;
        }

        Ok(Self {
            rank: 0,
            world_size,
            round: 0,
            timeout: round_timeout,
            role: Role::Hub { peers },
            aborted: None,
        })
    }

    fn admit(stream: &mut TcpStream, world_size: usize, timeout: Duration) -> Result<usize> {
        stream
            .set_nonblocking(false)
            .and_then(|()| stream.set_read_timeout(Some(timeout)))
            .and_then(|()| stream.set_nodelay(true))
            .map_err(|e| Error::io("configuring peer connection", e))?;

        let hello = read_message(stream).map_err(|e| Error::io("reading peer hello", e))?;
        let Message::Hello { magic, rank, world_size: size } = &hello else {
            return Err(Error::Coordination(format!(
                "expected a hello from a new peer, got {}",
                hello.summary()
            )));
        };
        let (rank, size) = (*rank as usize, *size as usize);

        if *magic != MAGIC {
            return Err(Error::Configuration("peer is not a podar worker".to_string()));
        }
        if size != world_size {
            return Err(Error::Configuration(format!(
                "peer rank {rank} expects {size} workers, group has {world_size}"
            )));
        }
        if rank == 0 || rank >= world_size {
            return Err(Error::Configuration(format!("peer announced invalid rank {rank}")));
        }
        Ok(rank)
    }

    /// Connect to the hub at `addr` and wait until the whole group has
    /// joined, both within `join_timeout`.
    pub fn spoke(
        addr: impl ToSocketAddrs,
        ctx: &WorkerContext,
        join_timeout: Duration,
        round_timeout: Duration,
    ) -> Result<Self> {
        let join_timeout = join_timeout.max(MIN_TIMEOUT);
        let round_timeout = round_timeout.max(MIN_TIMEOUT);
        let start = Instant::now();
        let join_failed = |detail: String| Error::CoordinationTimeout {
            rank: ctx.rank(),
            round: 0,
            waited: start.elapsed(),
            detail,
        };

        let mut stream = loop {
            match TcpStream::connect(&addr) {
                Ok(stream) => break stream,
                Err(e) if start.elapsed() < join_timeout => {
                    debug!(rank = ctx.rank(), error = %e, "rendezvous not ready, retrying");
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(join_failed(format!("could not reach rank 0: {e}"))),
            }
        };

        let rank = u32::try_from(ctx.rank())
            .map_err(|_| Error::Configuration(format!("rank {} too large", ctx.rank())))?;
        let world_size = group_size_u32(ctx.group_size())?;
        let remaining = join_timeout.saturating_sub(start.elapsed()).max(MIN_TIMEOUT);
        stream
            .set_read_timeout(Some(remaining))
            .and_then(|()| stream.set_nodelay(true))
            .and_then(|()| write_message(&mut stream, &Message::Hello { magic: MAGIC, rank, world_size }))
            .map_err(|e| Error::io("joining rendezvous", e))?;

        match read_message(&mut stream) {
            Ok(Message::Ready { world_size: size }) if size == world_size => {}
            Ok(other) => {
                return Err(Error::Coordination(format!(
                    "rank {rank} expected the group to start, got {}",
                    other.summary()
                )))
            }
            Err(e) if is_timeout(&e) || is_disconnect(&e) => {
                return Err(join_failed(format!("group did not start: {e}")))
            }
            Err(e) => return Err(Error::io("joining rendezvous", e)),
        }
        stream
            .set_read_timeout(Some(round_timeout))
            .map_err(|e| Error::io("configuring hub connection", e))?;

        Ok(Self {
            rank: ctx.rank(),
            world_size: ctx.group_size(),
            round: 0,
            timeout: round_timeout,
            role: Role::Spoke { hub: stream },
            aborted: None,
        })
    }

    fn timeout_error(&self, waited: Duration, detail: String) -> Error {
        Error::CoordinationTimeout { rank: self.rank, round: self.round, waited, detail }
    }

    /// A peer that stops answering or drops its connection never arrives at
    /// the round; anything else on the wire is a protocol failure.
    fn link_error(&self, e: &io::Error, peer: usize, waited: Duration) -> Error {
        if is_timeout(e) {
            self.timeout_error(waited, format!("no message from rank {peer} within {:?}", self.timeout))
        } else if is_disconnect(e) {
            self.timeout_error(waited, format!("rank {peer} left the group: {e}"))
        } else {
            Error::Coordination(format!("bad message from rank {peer} in round {}: {e}", self.round))
        }
    }

    fn mismatch(&self, peer: usize, got: &Message, kind: RoundKind, len: usize) -> Error {
        Error::Coordination(format!(
            "rank {peer} sent {} while rank {} expected round {} {kind:?} with {len} values",
            got.summary(),
            self.rank,
            self.round
        ))
    }

    fn exchange(&mut self, buf: &mut [f32], kind: RoundKind) -> Result<()> {
        if let Some(reason) = &self.aborted {
            return Err(self.timeout_error(Duration::ZERO, reason.clone()));
        }
        let result = match self.role {
            Role::Hub { .. } => self.hub_round(buf, kind),
            Role::Spoke { .. } => self.spoke_round(buf, kind),
        };
        match &result {
            Ok(()) => self.round += 1,
            Err(e) => {
                let reason = e.to_string();
                self.abort(&reason);
            }
        }
        result
    }

    fn hub_round(&mut self, buf: &mut [f32], kind: RoundKind) -> Result<()> {
        let Role::Hub { peers } = &mut self.role else {
            return Err(Error::Coordination("hub round on a spoke".to_string()));
        };
        let mut peers = std::mem::take(peers);
        let result = self.serve_round(&mut peers, buf, kind);
        if let Role::Hub { peers: slot } = &mut self.role {
            *slot = peers;
        }
        result
    }

    /// Collect every peer's buffer in rank order, reduce, and answer all of
    /// them. Stops at the first peer that fails.
    fn serve_round(&self, peers: &mut [TcpStream], buf: &mut [f32], kind: RoundKind) -> Result<()> {
        let start = Instant::now();
        let seq = self.round;
        let mut acc = match kind {
            RoundKind::Broadcast { root } if root != 0 => vec![0.0; buf.len()],
            _ => buf.to_vec(),
        };

        for (i, peer) in peers.iter_mut().enumerate() {
            let rank = i + 1;
            let message = read_message(peer).map_err(|e| self.link_error(&e, rank, start.elapsed()))?;
            let values = match message {
                Message::Round { seq: s, kind: k, values }
                    if s == seq && k == kind && values.len() == buf.len() =>
                {
                    values
                }
                Message::Abort { reason, .. } => {
                    return Err(self.timeout_error(
                        start.elapsed(),
                        format!("rank {rank} aborted: {reason}"),
                    ))
                }
                other => return Err(self.mismatch(rank, &other, kind, buf.len())),
            };
            match kind {
                RoundKind::Reduce(op) => op.combine(&mut acc, &values),
                RoundKind::Broadcast { root } if rank == root as usize => acc = values,
                RoundKind::Broadcast { .. } => {}
            }
        }
        if let RoundKind::Reduce(op) = kind {
            op.finish(&mut acc, self.world_size);
        }

        buf.copy_from_slice(&acc);
        let reply = Message::Round { seq, kind, values: acc };
        for (i, peer) in peers.iter_mut().enumerate() {
            write_message(peer, &reply).map_err(|e| self.link_error(&e, i + 1, start.elapsed()))?;
        }
        Ok(())
    }

    fn spoke_round(&mut self, buf: &mut [f32], kind: RoundKind) -> Result<()> {
        let start = Instant::now();
        let seq = self.round;
        let Role::Spoke { hub } = &mut self.role else {
            return Err(Error::Coordination("spoke round on the hub".to_string()));
        };
        let request = Message::Round { seq, kind, values: buf.to_vec() };
        let received = write_message(hub, &request).and_then(|()| read_message(hub));

        let reply = received.map_err(|e| self.link_error(&e, 0, start.elapsed()))?;
        match reply {
            Message::Round { seq: s, kind: k, values }
                if s == seq && k == kind && values.len() == buf.len() =>
            {
                buf.copy_from_slice(&values);
                Ok(())
            }
            Message::Abort { reason, .. } => {
                Err(self.timeout_error(start.elapsed(), format!("group aborted: {reason}")))
            }
            other => Err(self.mismatch(0, &other, kind, buf.len())),
        }
    }
}

fn group_size_u32(world_size: usize) -> Result<u32> {
    u32::try_from(world_size)
        .map_err(|_| Error::Configuration(format!("group size {world_size} too large")))
}

impl Collective for TcpCollective {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn round(&self) -> u64 {
        self.round
    }

    fn all_reduce(&mut self, buf: &mut [f32], op: ReduceOp) -> Result<()> {
        self.exchange(buf, RoundKind::Reduce(op))
    }

    fn broadcast(&mut self, buf: &mut [f32], root: usize) -> Result<()> {
        check_root(root, self.world_size)?;
        let root = u32::try_from(root)
            .map_err(|_| Error::Configuration(format!("broadcast root {root} too large")))?;
        self.exchange(buf, RoundKind::Broadcast { root })
    }

    fn abort(&mut self, reason: &str) {
        if self.aborted.is_some() {
            return;
        }
        warn!(rank = self.rank, round = self.round, reason, "aborting collective");
        self.aborted = Some(reason.to_string());

        let message = Message::Abort { seq: self.round, reason: reason.to_string() };
        let streams: Vec<&mut TcpStream> = match &mut self.role {
            Role::Hub { peers } => peers.iter_mut().collect(),
            Role::Spoke { hub } => vec![hub],
        };
        for stream in streams {
            // peers may already be gone
            let _ = write_message(stream, &message);
            let _ = stream.shutdown(Shutdown::Write);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOIN: Duration = Duration::from_secs(10);

    /// Hub of two whose only peer is a raw socket driven by `peer`.
    fn hub_with_raw_peer<F>(round_timeout: Duration, peer: F) -> (TcpCollective, thread::JoinHandle<()>)
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            let hello = Message::Hello { magic: MAGIC, rank: 1, world_size: 2 };
            write_message(&mut stream, &hello).unwrap();
            assert_eq!(read_message(&mut stream).unwrap(), Message::Ready { world_size: 2 });
            peer(stream);
        });
        let hub = TcpCollective::hub(listener, 2, JOIN, round_timeout).unwrap();
        (hub, handle)
    }

    #[test]
    fn test_message_roundtrip_keeps_values_exact() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let sent = Message::Round {
            seq: 7,
            kind: RoundKind::Reduce(ReduceOp::Mean),
            values: vec![0.1, -3.5e-8, f32::MAX, 1.0 / 3.0, -0.0],
        };
        let expected = sent.clone();
        let writer = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            write_message(&mut stream, &sent).unwrap();
        });
        let (mut stream, _) = listener.accept().unwrap();
        let received = read_message(&mut stream).unwrap();
        writer.join().unwrap();

        let (Message::Round { values: got, .. }, Message::Round { values: want, .. }) =
            (&received, &expected)
        else {
            panic!("unexpected message {received:?}");
        };
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(got), bits(want));
        assert_eq!(received, expected);
    }

    #[test]
    fn test_oversized_frame_is_rejected_without_allocating() {
        let (mut hub, peer) = hub_with_raw_peer(JOIN, |mut stream| {
            stream.write_all(&u32::MAX.to_be_bytes()).unwrap();
            // hold the connection until the hub has judged the frame
            let _ = stream.read(&mut [0u8; 1]);
        });
        let mut buf = [1.0f32];
        let err = hub.all_reduce(&mut buf, ReduceOp::Sum).unwrap_err();
        assert!(matches!(err, Error::Coordination(_)), "got {err:?}");
        assert!(err.to_string().contains("exceeds limit"));
        peer.join().unwrap();
    }

    #[test]
    fn test_garbage_frame_is_coordination_error() {
        let (mut hub, peer) = hub_with_raw_peer(JOIN, |mut stream| {
            stream.write_all(&3u32.to_be_bytes()).unwrap();
            stream.write_all(&[0xff, 0xff, 0xff]).unwrap();
            let _ = stream.read(&mut [0u8; 1]);
        });
        let err = hub.all_reduce(&mut [1.0], ReduceOp::Sum).unwrap_err();
        assert!(matches!(err, Error::Coordination(_)), "got {err:?}");
        peer.join().unwrap();
    }

    #[test]
    fn test_wrong_round_is_coordination_error() {
        let (mut hub, peer) = hub_with_raw_peer(JOIN, |mut stream| {
            let stale = Message::Round {
                seq: 5,
                kind: RoundKind::Reduce(ReduceOp::Sum),
                values: vec![1.0],
            };
            write_message(&mut stream, &stale).unwrap();
            let _ = stream.read(&mut [0u8; 1]);
        });
        let err = hub.all_reduce(&mut [1.0], ReduceOp::Sum).unwrap_err();
        assert!(matches!(err, Error::Coordination(_)), "got {err:?}");
        assert!(err.to_string().contains("round 5"));
        peer.join().unwrap();
    }

    #[test]
    fn test_round_timeout_is_independent_of_join_timeout() {
        let (mut hub, peer) = hub_with_raw_peer(Duration::from_millis(200), |mut stream| {
            // joined, but never enters a round
            let _ = stream.read(&mut [0u8; 1]);
        });
        let err = hub.all_reduce(&mut [1.0], ReduceOp::Sum).unwrap_err();
        let Error::CoordinationTimeout { waited, .. } = err else {
            panic!("expected timeout, got {err:?}");
        };
        assert!(waited < Duration::from_secs(5), "waited {waited:?}");
        peer.join().unwrap();
    }
}

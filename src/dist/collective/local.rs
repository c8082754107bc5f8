//! In-process worker group backed by a mutex and condvar.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{check_root, Collective, ReduceOp};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundKind {
    Reduce(ReduceOp),
    Broadcast(usize),
}

#[derive(Debug)]
struct RoundState {
    round: u64,
    arrived: usize,
    kind: Option<RoundKind>,
    len: usize,
    acc: Vec<f32>,
    result: Arc<Vec<f32>>,
    poisoned: Option<String>,
}

#[derive(Debug)]
struct Shared {
    size: usize,
    timeout: Duration,
    state: Mutex<RoundState>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, RoundState>> {
        self.state
            .lock()
            .map_err(|_| Error::Coordination("local group state lock poisoned".to_string()))
    }
}

/// Factory for a group of worker threads that share one process.
///
/// ```
/// use std::time::Duration;
/// use podar::dist::{Collective, LocalGroup, ReduceOp};
///
/// let members = LocalGroup::new(2, Duration::from_secs(5)).unwrap();
/// let handles: Vec<_> = members
///     .into_iter()
///     .map(|mut m| {
///         std::thread::spawn(move || {
///             let mut buf = [m.rank() as f32];
///             m.all_reduce(&mut buf, ReduceOp::Sum).unwrap();
///             buf[0]
///         })
///     })
///     .collect();
/// for h in handles {
///     assert_eq!(h.join().unwrap(), 1.0);
/// }
/// ```
pub struct LocalGroup;

impl LocalGroup {
    /// Create `size` connected members, one per worker thread.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if `size` is zero.
    pub fn new(size: usize, timeout: Duration) -> Result<Vec<LocalMember>> {
        if size == 0 {
            return Err(Error::Configuration("group size must be positive".to_string()));
        }
        let shared = Arc::new(Shared {
            size,
            timeout,
            state: Mutex::new(RoundState {
                round: 0,
                arrived: 0,
                kind: None,
                len: 0,
                acc: Vec::new(),
                result: Arc::new(Vec::new()),
                poisoned: None,
            }),
            cond: Condvar::new(),
        });
        Ok((0..size)
            .map(|rank| LocalMember { rank, round: 0, shared: Arc::clone(&shared) })
            .collect())
    }
}

/// One worker's handle on a [`LocalGroup`].
///
/// Once any member times out or aborts the group is poisoned and every
/// later call on every member fails.
#[derive(Debug)]
pub struct LocalMember {
    rank: usize,
    round: u64,
    shared: Arc<Shared>,
}

impl LocalMember {
    fn timeout_error(&self, waited: Duration, detail: String) -> Error {
        Error::CoordinationTimeout { rank: self.rank, round: self.round, waited, detail }
    }

    fn exchange(&mut self, buf: &mut [f32], kind: RoundKind) -> Result<()> {
        let start = Instant::now();
        let shared = Arc::clone(&self.shared);
        let mut state = shared.lock()?;

        if let Some(reason) = &state.poisoned {
            return Err(self.timeout_error(Duration::ZERO, reason.clone()));
        }
        if state.round != self.round {
            let msg = format!(
                "rank {} entered round {} while the group is in round {}",
                self.rank, self.round, state.round
            );
            state.poisoned = Some(msg.clone());
            shared.cond.notify_all();
            return Err(Error::Coordination(msg));
        }

        self.contribute(&mut state, buf, kind)?;
        state.arrived += 1;

        if state.arrived == shared.size {
            if let RoundKind::Reduce(op) = kind {
                op.finish(&mut state.acc, shared.size);
            }
            let result = std::mem::take(&mut state.acc);
            state.result = Arc::new(result);
            state.arrived = 0;
            state.kind = None;
            state.round += 1;
            shared.cond.notify_all();
        } else {
            let deadline = start + shared.timeout;
            while state.round == self.round && state.poisoned.is_none() {
                let now = Instant::now();
                if now >= deadline {
                    let detail = format!(
                        "{} of {} workers arrived within {:?}",
                        state.arrived, shared.size, shared.timeout
                    );
                    state.poisoned = Some(detail.clone());
                    shared.cond.notify_all();
                    return Err(self.timeout_error(start.elapsed(), detail));
                }
                let (guard, _) = shared
                    .cond
                    .wait_timeout(state, deadline - now)
                    .map_err(|_| Error::Coordination("local group state lock poisoned".to_string()))?;
                state = guard;
            }
            if state.round == self.round {
                let detail = state.poisoned.clone().unwrap_or_default();
                return Err(self.timeout_error(start.elapsed(), detail));
            }
        }

        buf.copy_from_slice(&state.result);
        self.round += 1;
        Ok(())
    }

    fn contribute(&self, state: &mut RoundState, buf: &[f32], kind: RoundKind) -> Result<()> {
        if state.arrived == 0 {
            state.kind = Some(kind);
            state.len = buf.len();
            state.acc = match kind {
                RoundKind::Reduce(_) => buf.to_vec(),
                RoundKind::Broadcast(_) => vec![0.0; buf.len()],
            };
        } else if state.kind != Some(kind) || state.len != buf.len() {
            let msg = format!(
                "rank {} called {:?} with {} values in round {}, group is running {:?} with {}",
                self.rank,
                kind,
                buf.len(),
                self.round,
                state.kind,
                state.len
            );
            state.poisoned = Some(msg.clone());
            self.shared.cond.notify_all();
            return Err(Error::Coordination(msg));
        } else if let RoundKind::Reduce(op) = kind {
            op.combine(&mut state.acc, buf);
        }

        if kind == RoundKind::Broadcast(self.rank) {
            state.acc.copy_from_slice(buf);
        }
        Ok(())
    }
}

impl Collective for LocalMember {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.shared.size
    }

    fn round(&self) -> u64 {
        self.round
    }

    fn all_reduce(&mut self, buf: &mut [f32], op: ReduceOp) -> Result<()> {
        self.exchange(buf, RoundKind::Reduce(op))
    }

    fn broadcast(&mut self, buf: &mut [f32], root: usize) -> Result<()> {
        check_root(root, self.shared.size)?;
        self.exchange(buf, RoundKind::Broadcast(root))
    }

    fn abort(&mut self, reason: &str) {
        if let Ok(mut state) = self.shared.lock() {
            if state.poisoned.is_none() {
                state.poisoned = Some(format!("rank {} aborted: {reason}", self.rank));
            }
            self.shared.cond.notify_all();
        }
    }
}

//! Per-upstream bounded connection pool.
//!
//! A single controller task owns every slot, the idle list, and the waiter
//! queue for one upstream server; all mutation happens through the `Get`/
//! `Put`/`Close` messages plus an internal allocation-result channel, never
//! through a shared lock. This mirrors the actor-task-owns-its-state idiom
//! used elsewhere in this codebase for NNTP workers, generalized to the exact
//! invariants this gateway's pool has to hold: outstanding connections never
//! exceed the configured cap, waiters are served in arrival order, and idle
//! connections age out after `IdleConnExpiry`.
//!
//! The pool never judges whether a connection is healthy — that is the
//! dispatcher's job, via `Lease::release()` (return it) or letting the lease
//! drop unreleased (close it). See `Lease` below.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use crate::error::GatewayError;
use crate::nntp::connect;
use crate::nntp::types::ServerDef;

enum CtrlMsg {
    Get {
        reply: oneshot::Sender<Result<Lease, GatewayError>>,
    },
    Put {
        slot_id: u64,
        client: nntp_rs::NntpClient,
    },
    Close {
        slot_id: u64,
    },
}

struct AllocDone {
    slot_id: u64,
    result: Result<nntp_rs::NntpClient, GatewayError>,
}

/// A leased connection. Dropping it without calling `release()` closes the
/// connection rather than returning it to the pool — the safe default for a
/// lease that was cancelled mid-flight, since the pool has no way to know
/// whether in-flight NNTP I/O left the stream in a usable state.
pub struct Lease {
    slot_id: u64,
    client: Option<nntp_rs::NntpClient>,
    ctrl_tx: mpsc::UnboundedSender<CtrlMsg>,
}

impl Lease {
    fn new(
        slot_id: u64,
        client: nntp_rs::NntpClient,
        ctrl_tx: mpsc::UnboundedSender<CtrlMsg>,
    ) -> Self {
        Self {
            slot_id,
            client: Some(client),
            ctrl_tx,
        }
    }

    pub fn client_mut(&mut self) -> &mut nntp_rs::NntpClient {
        self.client.as_mut().expect("lease client taken twice")
    }

    /// The connection is known-good (a protocol-level response was read
    /// successfully, whatever that response said) — return it to the pool.
    pub fn release(mut self) {
        if let Some(client) = self.client.take() {
            let _ = self.ctrl_tx.send(CtrlMsg::Put {
                slot_id: self.slot_id,
                client,
            });
        }
    }

    /// The connection is known-bad (a transport error occurred) — discard it
    /// explicitly. Equivalent to letting the lease drop unreleased, but
    /// names the intent at the call site.
    pub fn close(mut self) {
        if let Some(client) = self.client.take() {
            drop(client);
        }
        let _ = self.ctrl_tx.send(CtrlMsg::Close {
            slot_id: self.slot_id,
        });
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            drop(client);
            let _ = self.ctrl_tx.send(CtrlMsg::Close {
                slot_id: self.slot_id,
            });
        }
    }
}

/// Handle to one upstream's pool. Cheap to clone; every clone talks to the
/// same controller task.
#[derive(Clone)]
pub struct PoolHandle {
    ctrl_tx: mpsc::UnboundedSender<CtrlMsg>,
}

impl PoolHandle {
    pub async fn get(&self) -> Result<Lease, GatewayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.ctrl_tx
            .send(CtrlMsg::Get { reply: reply_tx })
            .map_err(|_| GatewayError::Internal("pool controller is gone".to_string()))?;

        reply_rx
            .await
            .unwrap_or(Err(GatewayError::Cancelled))
    }
}

/// Start the controller task for one upstream server.
pub fn spawn_pool(server: ServerDef, idle_expiry: Duration) -> PoolHandle {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
    let (alloc_tx, alloc_rx) = mpsc::unbounded_channel();

    let handle = PoolHandle {
        ctrl_tx: ctrl_tx.clone(),
    };

    tokio::spawn(run_controller(
        server, ctrl_rx, alloc_rx, alloc_tx, ctrl_tx, idle_expiry,
    ));

    handle
}

fn spawn_dial(
    server: std::sync::Arc<ServerDef>,
    slot_id: u64,
    alloc_tx: mpsc::UnboundedSender<AllocDone>,
) {
    tokio::spawn(async move {
        let result = connect::dial(&server).await;
        let _ = alloc_tx.send(AllocDone { slot_id, result });
    });
}

/// Hand a returned/allocated connection to the longest-waiting `Get`, or
/// keep it as idle if no one is waiting. If the waiter's receiver has
/// already been dropped (the caller's future was cancelled while parked),
/// move on to the next waiter instead of losing the connection.
fn give_to_waiter_or_idle(
    waiters: &mut VecDeque<oneshot::Sender<Result<Lease, GatewayError>>>,
    idle: &mut VecDeque<(u64, nntp_rs::NntpClient, Instant)>,
    slot_id: u64,
    client: nntp_rs::NntpClient,
    ctrl_tx: &mpsc::UnboundedSender<CtrlMsg>,
) {
    let mut client = Some(client);
    while let Some(waiter) = waiters.pop_front() {
        let lease = Lease::new(slot_id, client.take().unwrap(), ctrl_tx.clone());
        match waiter.send(Ok(lease)) {
            Ok(()) => return,
            Err(Ok(lease)) => {
                client = Some(lease.client.expect("lease still holds its connection"));
            }
            Err(Err(_)) => unreachable!("we only ever send Ok to waiters"),
        }
    }
    idle.push_back((slot_id, client.unwrap(), Instant::now()));
}

async fn run_controller(
    server: ServerDef,
    mut ctrl_rx: mpsc::UnboundedReceiver<CtrlMsg>,
    mut alloc_rx: mpsc::UnboundedReceiver<AllocDone>,
    alloc_tx: mpsc::UnboundedSender<AllocDone>,
    ctrl_tx: mpsc::UnboundedSender<CtrlMsg>,
    idle_expiry: Duration,
) {
    let connections = server.connections;
    let server = std::sync::Arc::new(server);

    let mut outstanding: u32 = 0;
    let mut next_id: u64 = 0;
    let mut idle: VecDeque<(u64, nntp_rs::NntpClient, Instant)> = VecDeque::new();
    let mut waiters: VecDeque<oneshot::Sender<Result<Lease, GatewayError>>> = VecDeque::new();
    let mut pending: HashMap<u64, oneshot::Sender<Result<Lease, GatewayError>>> = HashMap::new();

    // The purge tick must run at least once a minute regardless of how long
    // `IdleConnExpiry` itself is (spec.md §4.2); the per-entry age check
    // against `idle_expiry` happens inside the tick body below, so a tick
    // period shorter than `idle_expiry` is always safe, just more frequent.
    let tick_period = idle_expiry
        .min(Duration::from_secs(60))
        .max(Duration::from_millis(100));
    let mut purge_tick = tokio::time::interval(tick_period);
    purge_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = ctrl_rx.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    CtrlMsg::Get { reply } => {
                        if let Some((slot_id, client, _since)) = idle.pop_back() {
                            let _ = reply.send(Ok(Lease::new(slot_id, client, ctrl_tx.clone())));
                        } else if outstanding < connections {
                            outstanding += 1;
                            let slot_id = next_id;
                            next_id += 1;
                            pending.insert(slot_id, reply);
                            spawn_dial(server.clone(), slot_id, alloc_tx.clone());
                        } else {
                            waiters.push_back(reply);
                        }
                    }
                    CtrlMsg::Put { slot_id, client } => {
                        give_to_waiter_or_idle(&mut waiters, &mut idle, slot_id, client, &ctrl_tx);
                    }
                    CtrlMsg::Close { slot_id: _ } => {
                        outstanding = outstanding.saturating_sub(1);
                        if let Some(waiter) = waiters.pop_front() {
                            outstanding += 1;
                            let slot_id = next_id;
                            next_id += 1;
                            pending.insert(slot_id, waiter);
                            spawn_dial(server.clone(), slot_id, alloc_tx.clone());
                        }
                    }
                }
            }
            done = alloc_rx.recv() => {
                let Some(AllocDone { slot_id, result }) = done else { break };
                let Some(reply) = pending.remove(&slot_id) else { continue };
                match result {
                    Ok(client) => {
                        match reply.send(Ok(Lease::new(slot_id, client, ctrl_tx.clone()))) {
                            Ok(()) => {}
                            Err(Ok(lease)) => {
                                // Caller went away while we were dialing; keep the connection.
                                let client = lease.client.expect("fresh lease holds its connection");
                                give_to_waiter_or_idle(&mut waiters, &mut idle, slot_id, client, &ctrl_tx);
                            }
                            Err(Err(_)) => unreachable!(),
                        }
                    }
                    Err(e) => {
                        outstanding = outstanding.saturating_sub(1);
                        let _ = reply.send(Err(e));
                    }
                }
            }
            _ = purge_tick.tick() => {
                while let Some(&(_, _, since)) = idle.front() {
                    if since.elapsed() < idle_expiry {
                        break;
                    }
                    let (_, mut client, _) = idle.pop_front().unwrap();
                    outstanding = outstanding.saturating_sub(1);
                    tokio::spawn(async move {
                        let _ = client.quit().await;
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_server() -> ServerDef {
        ServerDef {
            host: "127.0.0.1".to_string(),
            port: 1,
            user: None,
            pass: None,
            tls: false,
            posting: false,
            connections: 2,
        }
    }

    #[tokio::test]
    async fn get_fails_over_unreachable_server_without_panicking() {
        let pool = spawn_pool(test_server(), Duration::from_secs(60));
        let result = pool.get().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn outstanding_never_exceeds_connections() {
        // With an unreachable host every Get ultimately errors, but the
        // controller must still never dial more than `connections` at once;
        // the third concurrent Get should observe the same bounded behavior
        // as the first two rather than panicking or hanging.
        let pool = spawn_pool(test_server(), Duration::from_secs(60));
        let a = pool.get();
        let b = pool.get();
        let c = pool.get();
        let (ra, rb, rc) = tokio::join!(a, b, c);
        assert!(ra.is_err() && rb.is_err() && rc.is_err());
    }
}

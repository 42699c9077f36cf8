//! Trailing-edge debounce for persist requests.
//!
//! A single actor task owns the countdown, the pending payload and the
//! in-flight persist. Callers only send commands, so `schedule` and `cancel`
//! never block and never race each other.

use crate::core::{Result, StoreError};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

/// The write a scheduler triggers once the input has gone quiet.
#[async_trait]
pub trait PersistAction<T: Send + 'static>: Send + Sync {
    async fn persist(&self, payload: T);
}

enum Command<T> {
    Schedule { generation: u64, payload: T },
    Cancel { generation: Option<u64> },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Cancellable ticket for one `schedule` call.
///
/// Cancelling only has an effect while this call's payload is still the
/// pending one; a later `schedule` supersedes it.
pub struct ScheduleHandle<T> {
    tx: mpsc::UnboundedSender<Command<T>>,
    generation: u64,
}

impl<T> ScheduleHandle<T> {
    pub fn cancel(&self) {
        let _ = self.tx.send(Command::Cancel {
            generation: Some(self.generation),
        });
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub struct DebounceScheduler<T: Send + 'static> {
    tx: mpsc::UnboundedSender<Command<T>>,
    next_generation: AtomicU64,
    quiet_period: Duration,
    join_handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> DebounceScheduler<T> {
    /// Spawns the actor on the current tokio runtime.
    pub fn spawn(quiet_period: Duration, action: Arc<dyn PersistAction<T>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = Actor {
            rx,
            action,
            quiet_period,
            pending: None,
            deadline: None,
            in_flight: None,
            waiters: Vec::new(),
        };
        let join_handle = tokio::spawn(actor.run());

        Self {
            tx,
            next_generation: AtomicU64::new(1),
            quiet_period,
            join_handle: Some(join_handle),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Makes `payload` the pending write and restarts the countdown.
    pub fn schedule(&self, payload: T) -> Result<ScheduleHandle<T>> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.tx
            .send(Command::Schedule {
                generation,
                payload,
            })
            .map_err(|_| StoreError::SchedulerClosed)?;
        Ok(ScheduleHandle {
            tx: self.tx.clone(),
            generation,
        })
    }

    /// Drops any pending write without persisting it. Safe to call repeatedly.
    pub fn cancel(&self) {
        let _ = self.tx.send(Command::Cancel { generation: None });
    }

    /// Persists any pending write now and waits until nothing is pending or in flight.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(done_tx))
            .map_err(|_| StoreError::SchedulerClosed)?;
        done_rx.await.map_err(|_| StoreError::SchedulerClosed)
    }

    /// Cancels pending work, lets an in-flight persist finish, and stops the actor.
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.await.map_err(|_| StoreError::SchedulerClosed)?;
        }
        Ok(())
    }
}

impl<T: Send + 'static> Drop for DebounceScheduler<T> {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

struct Actor<T: Send + 'static> {
    rx: mpsc::UnboundedReceiver<Command<T>>,
    action: Arc<dyn PersistAction<T>>,
    quiet_period: Duration,
    pending: Option<(u64, T)>,
    deadline: Option<Instant>,
    in_flight: Option<BoxFuture<'static, ()>>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl<T: Send + 'static> Actor<T> {
    async fn run(mut self) {
        loop {
            // A countdown that closes while a persist is in flight waits for
            // it to settle, then fires straight away.
            let ready = self.in_flight.is_none() && self.deadline.is_some();
            let deadline = self.deadline.unwrap_or_else(Instant::now);

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = sleep_until(deadline), if ready => self.fire(),
                _ = settle(&mut self.in_flight), if self.in_flight.is_some() => {
                    trace!("persist settled");
                    self.in_flight = None;
                }
            }

            self.notify_if_idle();
        }

        self.pending = None;
        self.deadline = None;
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.await;
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
        debug!("debounce scheduler stopped");
    }

    /// Returns false when the actor should stop.
    fn handle(&mut self, command: Command<T>) -> bool {
        match command {
            Command::Schedule {
                generation,
                payload,
            } => {
                self.pending = Some((generation, payload));
                self.deadline = Some(Instant::now() + self.quiet_period);
            }
            Command::Cancel { generation } => {
                let matches = match (&self.pending, generation) {
                    (Some(_), None) => true,
                    (Some((pending, _)), Some(requested)) => *pending == requested,
                    (None, _) => false,
                };
                if matches {
                    trace!("pending persist cancelled");
                    self.pending = None;
                    self.deadline = None;
                }
            }
            Command::Flush(waiter) => {
                self.waiters.push(waiter);
                if self.pending.is_some() {
                    self.deadline = Some(Instant::now());
                }
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn fire(&mut self) {
        self.deadline = None;
        if let Some((generation, payload)) = self.pending.take() {
            debug!(generation, "quiet period elapsed, persisting");
            let action = self.action.clone();
            self.in_flight = Some(async move { action.persist(payload).await }.boxed());
        }
    }

    fn notify_if_idle(&mut self) {
        if self.pending.is_none() && self.in_flight.is_none() {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

async fn settle(in_flight: &mut Option<BoxFuture<'static, ()>>) {
    match in_flight.as_mut() {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

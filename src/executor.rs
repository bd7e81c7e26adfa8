//! Owner-thread executor.
//!
//! The host's document and viewport state may only be touched from one
//! designated thread. [`Executor`] marshals work items from any thread onto
//! that owner thread and blocks the caller until the result comes back.
//!
//! The owner context `C` is created on the owner thread and never leaves it:
//! it lives in a thread-local slot that the owner loop lends to each job.
//! Because of that, `C` does not need to be `Send`.
//!
//! ```text
//!  caller thread                         owner thread
//!  ─────────────                         ────────────
//!  execute_sync(op) ──► job queue ──►    OwnerLoop::run / pump
//!        │                                   │ op(&mut C)
//!        ◄──────────── reply channel ◄───────┘
//! ```
//!
//! A caller that gives up after its timeout marks the request cancelled. The
//! owner loop skips cancelled requests it has not started yet and discards
//! results of ones that finish late. Every call gets its own reply channel,
//! so a late result can never be observed by a different call.

use std::any::Any;
use std::cell::RefCell;
use std::io;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::diagnostics::Diagnostics;
use crate::error::ExecutorError;

/// Default time a caller waits for the owner thread.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_EXECUTOR_ID: AtomicU64 = AtomicU64::new(1);

type Job<C> = Box<dyn FnOnce(&mut C) + Send>;

struct Request<C> {
    job: Job<C>,
    cancelled: Arc<AtomicBool>,
}

enum Message<C> {
    Run(Request<C>),
    Shutdown,
}

struct OwnerSlot {
    executor_id: u64,
    context: Box<dyn Any>,
}

thread_local! {
    static OWNER_CONTEXT: RefCell<Option<OwnerSlot>> = const { RefCell::new(None) };
}

/// Lends the owner context of `executor_id` to `f`.
///
/// Fails with [`ExecutorError::Reentrant`] when the context is already lent
/// out, i.e. when called from inside a running job.
fn with_owner_context<C: 'static, R>(
    executor_id: u64,
    f: impl FnOnce(&mut C) -> R,
) -> Result<R, ExecutorError> {
    OWNER_CONTEXT.with(|slot| {
        let mut slot = slot.try_borrow_mut().map_err(|_| ExecutorError::Reentrant)?;
        let context = slot
            .as_mut()
            .filter(|owner| owner.executor_id == executor_id)
            .and_then(|owner| owner.context.downcast_mut::<C>())
            .ok_or(ExecutorError::OwnerGone)?;
        Ok(f(context))
    })
}

fn install_owner_context<C: 'static>(executor_id: u64, context: C) -> Result<(), ExecutorError> {
    OWNER_CONTEXT.with(|slot| {
        let mut slot = slot.try_borrow_mut().map_err(|_| ExecutorError::Reentrant)?;
        if slot.is_some() {
            return Err(ExecutorError::OwnerAlreadyBound);
        }
        *slot = Some(OwnerSlot {
            executor_id,
            context: Box::new(context),
        });
        Ok(())
    })
}

fn remove_owner_context(executor_id: u64) {
    OWNER_CONTEXT.with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            if slot.as_ref().is_some_and(|owner| owner.executor_id == executor_id) {
                *slot = None;
            }
        }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Runs `op`, converting a panic into [`ExecutorError::Panicked`].
fn run_guarded<C, R>(
    op: impl FnOnce(&mut C) -> R,
    context: &mut C,
    diagnostics: &Diagnostics,
) -> Result<R, ExecutorError> {
    panic::catch_unwind(AssertUnwindSafe(|| op(context))).map_err(|payload| {
        diagnostics.record_panic();
        let message = panic_message(payload.as_ref());
        warn!(%message, "Owner-thread operation panicked");
        ExecutorError::Panicked { message }
    })
}

/// Handle for submitting work to the owner thread.
///
/// Cheap to clone; all clones feed the same owner loop.
pub struct Executor<C> {
    id: u64,
    owner: ThreadId,
    sender: Sender<Message<C>>,
    diagnostics: Diagnostics,
}

impl<C> Clone for Executor<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            owner: self.owner,
            sender: self.sender.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Executor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl<C: 'static> Executor<C> {
    /// Spawns a dedicated owner thread.
    ///
    /// `factory` runs on the new thread and builds the owner context there.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<F>(
        thread_name: &str,
        factory: F,
        diagnostics: Diagnostics,
    ) -> io::Result<(Self, OwnerHandle)>
    where
        F: FnOnce() -> C + Send + 'static,
    {
        let id = NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = crossbeam_channel::unbounded();
        let loop_diagnostics = diagnostics.clone();

        let join = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                if let Err(e) = install_owner_context(id, factory()) {
                    warn!(error = %e, "Could not install owner context");
                    return;
                }
                let owner = OwnerLoop::<C> {
                    id,
                    receiver,
                    diagnostics: loop_diagnostics,
                    _owner_thread: PhantomData,
                };
                owner.run();
            })?;

        let executor = Self {
            id,
            owner: join.thread().id(),
            sender,
            diagnostics,
        };
        Ok((executor, OwnerHandle { join }))
    }

    /// Makes the calling thread the owner thread.
    ///
    /// The caller is responsible for servicing the returned [`OwnerLoop`],
    /// typically by calling [`OwnerLoop::pump`] from its own event loop.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::OwnerAlreadyBound`] if this thread already
    /// owns a context.
    pub fn bind_current(
        context: C,
        diagnostics: Diagnostics,
    ) -> Result<(Self, OwnerLoop<C>), ExecutorError> {
        let id = NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed);
        install_owner_context(id, context)?;
        let (sender, receiver) = crossbeam_channel::unbounded();

        let executor = Self {
            id,
            owner: thread::current().id(),
            sender,
            diagnostics: diagnostics.clone(),
        };
        let owner = OwnerLoop {
            id,
            receiver,
            diagnostics,
            _owner_thread: PhantomData,
        };
        Ok((executor, owner))
    }

    /// Returns true if the calling thread is the owner thread.
    #[must_use]
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Returns the diagnostics this executor reports into.
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Runs `op` on the owner thread and returns its result.
    ///
    /// Called from the owner thread itself, `op` runs immediately without
    /// touching the queue. From any other thread, `op` is queued and the
    /// caller blocks until it completes or `timeout` elapses. `op` runs at
    /// most once, and exactly once unless the call timed out first.
    ///
    /// Whatever `op` returns, including an `Err`, is handed back unchanged.
    ///
    /// # Errors
    ///
    /// - [`ExecutorError::Timeout`] if the owner thread did not finish in time
    /// - [`ExecutorError::Panicked`] if `op` panicked
    /// - [`ExecutorError::OwnerGone`] if the owner loop has stopped
    /// - [`ExecutorError::Reentrant`] if called from inside another operation
    pub fn execute_sync<R, F>(&self, op: F, timeout: Duration) -> Result<R, ExecutorError>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_owner_thread() {
            self.diagnostics.record_direct_run();
            return with_owner_context(self.id, |context| {
                run_guarded(op, context, &self.diagnostics)
            })?;
        }

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let job_cancelled = Arc::clone(&cancelled);
        let job_diagnostics = self.diagnostics.clone();

        let job: Job<C> = Box::new(move |context: &mut C| {
            let outcome = run_guarded(op, context, &job_diagnostics);
            if job_cancelled.load(Ordering::Acquire) || reply_tx.send(outcome).is_err() {
                job_diagnostics.record_late_result();
                debug!("Discarding result of an abandoned operation");
            }
        });

        self.sender
            .send(Message::Run(Request { job, cancelled: Arc::clone(&cancelled) }))
            .map_err(|_| ExecutorError::OwnerGone)?;
        self.diagnostics.record_queued_run();

        match reply_rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                cancelled.store(true, Ordering::Release);
                self.diagnostics.record_timeout();
                warn!(timeout_secs = timeout.as_secs_f64(), "Owner thread did not respond in time");
                Err(ExecutorError::Timeout { timeout })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ExecutorError::OwnerGone),
        }
    }

    /// Async variant of [`execute_sync`](Self::execute_sync).
    ///
    /// The blocking wait happens on Tokio's blocking pool, so the calling
    /// task's runtime keeps running while the owner thread works.
    ///
    /// # Errors
    ///
    /// Same as [`execute_sync`](Self::execute_sync).
    pub async fn execute_async<R, F>(&self, op: F, timeout: Duration) -> Result<R, ExecutorError>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.execute_sync(op, timeout))
            .await
            .map_err(|e| ExecutorError::Panicked {
                message: e.to_string(),
            })?
    }

    /// Asks the owner loop to stop after the work already queued.
    pub fn shutdown(&self) {
        // A closed queue means the loop is already gone.
        let _ = self.sender.send(Message::Shutdown);
    }
}

/// The servicing side of an executor, bound to the owner thread.
///
/// Not `Send`: it must be driven from the thread that owns the context.
pub struct OwnerLoop<C> {
    id: u64,
    receiver: Receiver<Message<C>>,
    diagnostics: Diagnostics,
    _owner_thread: PhantomData<*const C>,
}

impl<C> std::fmt::Debug for OwnerLoop<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerLoop")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<C: 'static> OwnerLoop<C> {
    /// Services requests until shutdown or until every executor handle is
    /// dropped.
    pub fn run(&self) {
        debug!(executor = self.id, "Owner loop started");
        while let Ok(message) = self.receiver.recv() {
            match message {
                Message::Run(request) => self.service(request),
                Message::Shutdown => break,
            }
        }
        debug!(executor = self.id, "Owner loop stopped");
    }

    /// Runs every request that is already queued and returns how many ran.
    ///
    /// Intended to be called from a host event loop.
    pub fn pump(&self) -> usize {
        let mut serviced = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(Message::Run(request)) => {
                    self.service(request);
                    serviced += 1;
                }
                Ok(Message::Shutdown) | Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                    return serviced;
                }
            }
        }
    }

    /// Waits up to `timeout` for a request, then drains the queue.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(Message::Run(request)) => {
                self.service(request);
                1 + self.pump()
            }
            Ok(Message::Shutdown) | Err(_) => 0,
        }
    }

    /// Gives owner-thread code direct access to the context.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Reentrant`] if called from inside a job.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut C) -> R) -> Result<R, ExecutorError> {
        with_owner_context(self.id, f)
    }

    fn service(&self, request: Request<C>) {
        if request.cancelled.load(Ordering::Acquire) {
            self.diagnostics.record_cancelled_skip();
            debug!("Skipping operation whose caller timed out");
            return;
        }
        let job = request.job;
        if let Err(e) = with_owner_context(self.id, |context: &mut C| job(context)) {
            warn!(error = %e, "Owner context unavailable, dropping operation");
        }
    }
}

impl<C> Drop for OwnerLoop<C> {
    fn drop(&mut self) {
        remove_owner_context(self.id);
    }
}

/// Join handle for a spawned owner thread.
#[derive(Debug)]
pub struct OwnerHandle {
    join: JoinHandle<()>,
}

impl OwnerHandle {
    /// Waits for the owner thread to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner thread panicked outside a job.
    pub fn join(self) -> Result<(), ExecutorError> {
        self.join.join().map_err(|payload| ExecutorError::Panicked {
            message: panic_message(payload.as_ref()),
        })
    }
}

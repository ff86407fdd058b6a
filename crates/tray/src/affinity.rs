//! Thread affinity for native calls.
//!
//! The backend lives in a thread-local slot on the affine thread. Work from
//! any other thread is boxed into a [`Command`], queued on an unbounded
//! channel, and the pump is woken to drain it. Work from the affine thread
//! itself (item callbacks, event handlers) runs in place.

use std::cell::RefCell;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::thread::{self, ThreadId};

use crossbeam_channel::{Receiver, Sender};

use crate::error::{Result, TrayError};
use crate::native::{NativeTray, Waker};
use crate::sync::{lock, read, write};

/// A unit of native work marshalled to the affine thread.
pub(crate) type Command = Box<dyn FnOnce(&mut dyn NativeTray) + Send>;

thread_local! {
    // The backend is not Send; it is only ever touched from the thread that owns it.
    static BACKEND: RefCell<Option<Box<dyn NativeTray>>> = const { RefCell::new(None) };
}

/// Borrows the affine thread's backend for the duration of `f`.
pub(crate) fn with_backend<R>(f: impl FnOnce(&mut dyn NativeTray) -> R) -> Result<R> {
    BACKEND.with(|slot| {
        let mut slot = slot.try_borrow_mut().map_err(|_| TrayError::Reentrant)?;
        let backend = slot.as_deref_mut().ok_or(TrayError::NotRunning)?;
        Ok(f(backend))
    })
}

pub(crate) struct Affinity {
    owner: OnceLock<ThreadId>,
    tx: Sender<Command>,
    rx: Mutex<Option<Receiver<Command>>>,
    waker: RwLock<Option<Arc<dyn Waker>>>,
}

impl Affinity {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            owner: OnceLock::new(),
            tx,
            rx: Mutex::new(Some(rx)),
            waker: RwLock::new(None),
        }
    }

    /// Claims the current thread as the affine thread and installs `backend`.
    pub(crate) fn bind(&self, backend: Box<dyn NativeTray>) -> Result<()> {
        let current = thread::current().id();
        if self.owner.set(current).is_err() {
            return Err(TrayError::AlreadyRunning);
        }

        BACKEND.with(|slot| {
            let mut slot = slot.try_borrow_mut().map_err(|_| TrayError::Reentrant)?;
            if slot.is_some() {
                return Err(TrayError::AlreadyRunning);
            }
            *slot = Some(backend);
            Ok(())
        })
    }

    /// Removes the backend from the affine thread and closes the queue.
    ///
    /// Queued commands are discarded; their callers observe
    /// [`TrayError::NotRunning`].
    pub(crate) fn unbind(&self) -> Option<Box<dyn NativeTray>> {
        *write(&self.waker) = None;
        drop(lock(&self.rx).take());

        if !self.is_affine() {
            return None;
        }
        BACKEND.with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
    }

    pub(crate) fn set_waker(&self, waker: Arc<dyn Waker>) {
        *write(&self.waker) = Some(waker);
    }

    pub(crate) fn waker(&self) -> Option<Arc<dyn Waker>> {
        read(&self.waker).clone()
    }

    pub(crate) fn is_affine(&self) -> bool {
        self.owner.get() == Some(&thread::current().id())
    }

    /// Runs `f` against the backend on the affine thread and returns its result.
    ///
    /// Blocks the caller until the affine thread has executed `f` when called
    /// from any other thread.
    pub(crate) fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn NativeTray) -> R + Send + 'static,
    {
        if self.is_affine() {
            return with_backend(f);
        }

        let waker = self.waker().ok_or(TrayError::NotRunning)?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let command: Command = Box::new(move |native| {
            let _ = reply_tx.send(f(native));
        });

        self.tx.send(command).map_err(|_| TrayError::NotRunning)?;
        waker.wake();
        reply_rx.recv().map_err(|_| TrayError::NotRunning)
    }

    /// Executes every queued command. Affine thread only.
    pub(crate) fn drain(&self) -> usize {
        let commands: Vec<Command> = match lock(&self.rx).as_ref() {
            Some(rx) => rx.try_iter().collect(),
            None => return 0,
        };

        let count = commands.len();
        for command in commands {
            if let Err(e) = with_backend(command) {
                tracing::warn!(error = %e, "dropped queued native command");
            }
        }
        count
    }
}

//! Event loop and dispatcher.
//!
//! Lifecycle: `Uninitialized -> Initialized -> Running -> Exiting -> Terminated`.
//! A failing event fetch goes from `Running` straight to `Terminated`.
//!
//! The loop owns the affine thread. Each iteration blocks for one native
//! event and routes it through a [`DispatchTable`] keyed by [`EventKind`];
//! kinds without a handler fall through to the backend's default handler.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::thread;

use crate::affinity::with_backend;
use crate::error::{NativeError, Result, TrayError};
use crate::id::ItemId;
use crate::native::{EventKind, NativeEvent, NativeTray, Pump};
use crate::sync::lock;
use crate::tray::Tray;

/// Where the event loop is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Uninitialized = 0,
    Initialized = 1,
    Running = 2,
    Exiting = 3,
    Terminated = 4,
}

impl LoopState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Initialized,
            2 => Self::Running,
            3 => Self::Exiting,
            _ => Self::Terminated,
        }
    }
}

/// Handler for one kind of native event. Runs on the affine thread.
pub type Handler = Box<dyn Fn(&Tray, &NativeEvent)>;

/// Maps event kinds to handlers.
pub struct DispatchTable {
    handlers: HashMap<EventKind, Handler>,
}

impl DispatchTable {
    /// A table with no handlers; every event goes to the default handler.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The stock handlers: menu display, item selection, icon re-arm after a
    /// shell restart, exit on session end or window destruction, and queue
    /// draining on wake.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.insert(EventKind::MenuRequested, show_root_menu);
        table.insert(EventKind::ItemSelected, select_item);
        table.insert(EventKind::TaskbarCreated, readd_icon);
        table.insert(EventKind::SessionEnding, request_exit);
        table.insert(EventKind::Destroyed, request_exit);
        table.insert(EventKind::Wake, drain_commands);
        table
    }

    /// Installs `handler` for `kind`, returning the handler it replaces.
    pub fn insert<F>(&mut self, kind: EventKind, handler: F) -> Option<Handler>
    where
        F: Fn(&Tray, &NativeEvent) + 'static,
    {
        self.handlers.insert(kind, Box::new(handler))
    }

    pub fn remove(&mut self, kind: EventKind) -> Option<Handler> {
        self.handlers.remove(&kind)
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    fn get(&self, kind: EventKind) -> Option<&Handler> {
        self.handlers.get(&kind)
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

fn show_root_menu(tray: &Tray, _: &NativeEvent) {
    let Some(root) = tray.root() else {
        return;
    };
    let handle = root.handle();
    native_or_log(tray, "unable to show tray menu", move |native| {
        native.show_menu(handle)
    });
}

fn select_item(tray: &Tray, event: &NativeEvent) {
    let NativeEvent::ItemSelected(raw) = *event else {
        return;
    };
    let id = ItemId::new(raw);
    let Some(item) = tray.find_item(id) else {
        tracing::trace!(%id, "ignoring selection of unknown menu item");
        return;
    };

    tracing::debug!(%id, title = %item.title(), "menu item selected");
    if panic::catch_unwind(AssertUnwindSafe(|| item.activate())).is_err() {
        tracing::error!(%id, "menu item callback panicked");
    }
}

fn readd_icon(tray: &Tray, _: &NativeEvent) {
    tracing::info!("taskbar recreated, re-adding tray icon");
    native_or_log(tray, "unable to re-add tray icon", |native| native.add_icon());
}

fn request_exit(tray: &Tray, event: &NativeEvent) {
    tracing::debug!(?event, "tray exit requested");
    tray.fire_exit_hook();
    // The session-end hook may already have run the exit hook from inside
    // the backend, so quitting is tracked on its own.
    if !tray.shared.quit_posted.swap(true, Ordering::AcqRel) {
        native_or_log(tray, "unable to post quit", |native| {
            native.post_quit();
            Ok(())
        });
    }
}

fn drain_commands(tray: &Tray, _: &NativeEvent) {
    let drained = tray.shared.model.affinity.drain();
    tracing::trace!(drained, "drained queued native commands");
}

/// Runs `f` against the backend and logs any failure under `context`.
fn native_or_log<F>(tray: &Tray, context: &'static str, f: F)
where
    F: FnOnce(&mut dyn NativeTray) -> std::result::Result<(), NativeError> + Send + 'static,
{
    match tray.shared.model.affinity.call(f) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "{context}"),
        Err(e) => tracing::warn!(error = %e, "{context}"),
    }
}

impl Tray {
    /// Binds `backend` to the calling thread, registers the window and icon,
    /// and creates the root menu. Any failure aborts startup.
    pub(crate) fn initialize(&self, backend: Box<dyn NativeTray>) -> Result<()> {
        let affinity = &self.shared.model.affinity;
        affinity.bind(backend)?;

        let started = with_backend(|native| {
            native.init()?;
            Ok::<_, NativeError>(native.waker())
        });
        let waker = match started {
            Ok(Ok(waker)) => waker,
            Ok(Err(e)) => return Err(self.abort_startup(TrayError::Startup(e))),
            Err(e) => return Err(self.abort_startup(e)),
        };
        affinity.set_waker(waker);

        let tray = self.clone();
        let hooked = with_backend(move |native| {
            native.set_session_end_hook(Box::new(move || tray.end_session()));
        });
        if let Err(e) = hooked {
            return Err(self.abort_startup(e));
        }

        let root = match self.shared.model.create_root() {
            Ok(root) => root,
            Err(TrayError::Native(e)) => return Err(self.abort_startup(TrayError::Startup(e))),
            Err(e) => return Err(self.abort_startup(e)),
        };
        let _ = self.shared.root.set(root);
        self.set_state(LoopState::Initialized);

        if let Some(tooltip) = &self.shared.config.tooltip {
            let _ = self.set_tooltip(tooltip);
        }
        Ok(())
    }

    /// Starts the ready callback and pumps events until the loop terminates.
    pub(crate) fn serve<F>(&self, table: &DispatchTable, on_ready: F) -> Result<()>
    where
        F: FnOnce(Tray) + Send + 'static,
    {
        let tray = self.clone();
        let spawned = thread::Builder::new()
            .name(self.shared.config.ready_thread_name.clone())
            .spawn(move || on_ready(tray));
        if let Err(e) = spawned {
            return Err(self.abort_startup(TrayError::ThreadSpawn(e)));
        }

        self.set_state(LoopState::Running);
        tracing::info!("tray running");

        let outcome = self.pump(table);
        match &outcome {
            Ok(()) => {
                // A bare quit never went through the exit handler.
                self.fire_exit_hook();
            }
            Err(e) => {
                tracing::error!(error = %e, "tray event loop failed");
                // Hosts blocked on the listener are released even on failure.
                self.shared.exit.fire();
            }
        }
        self.release();
        tracing::info!("tray terminated");
        outcome
    }

    fn pump(&self, table: &DispatchTable) -> Result<()> {
        loop {
            match with_backend(|native| native.next_event())? {
                Pump::Event(event) => self.dispatch(table, &event),
                Pump::Quit => return Ok(()),
                Pump::Failed(e) => return Err(TrayError::Pump(e)),
            }
        }
    }

    fn dispatch(&self, table: &DispatchTable, event: &NativeEvent) {
        match table.get(event.kind()) {
            Some(handler) => handler(self, event),
            None => {
                if let Err(e) = with_backend(|native| native.default_handler(event)) {
                    tracing::warn!(error = %e, ?event, "unable to run default event handler");
                }
            }
        }
    }

    /// Deletes the icon, runs the host exit hook and fires the exit signal.
    ///
    /// Only the first call does anything; returns whether this was it.
    pub(crate) fn fire_exit_hook(&self) -> bool {
        self.begin_exit(|tray| {
            native_or_log(tray, "unable to remove tray icon", |native| {
                native.delete_icon()
            });
        })
    }

    /// Session-end path, run by the backend while it still holds the native
    /// borrow. The backend has already removed the icon.
    fn end_session(&self) {
        if self.begin_exit(|_| {}) {
            tracing::info!("user session ending, tray exit completed");
        }
    }

    fn begin_exit(&self, remove_icon: impl FnOnce(&Tray)) -> bool {
        if self.shared.exit_fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.set_state(LoopState::Exiting);
        remove_icon(self);

        let hook = lock(&self.shared.on_exit).take();
        if let Some(hook) = hook {
            if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
                tracing::error!("tray exit hook panicked");
            }
        }

        if self.shared.exit.fire() {
            tracing::debug!("exit signal delivered");
        }
        true
    }

    fn abort_startup(&self, error: TrayError) -> TrayError {
        tracing::error!(error = %error, "tray startup failed");
        self.release();
        error
    }

    /// Tears down the backend, closes the command queue and drops the registry.
    fn release(&self) {
        if let Some(mut backend) = self.shared.model.affinity.unbind() {
            backend.teardown();
        }
        self.shared.model.clear();
        self.set_state(LoopState::Terminated);
    }
}

//! The tray context: one instance owns all process-wide tray state.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::config::TrayConfig;
use crate::error::Result;
use crate::event_loop::{DispatchTable, LoopState};
use crate::exit::{ExitListener, ExitSignal};
use crate::icon::IconController;
use crate::id::ItemId;
use crate::menu::{Menu, MenuItem, Model};
use crate::native::NativeTray;
use crate::sync::lock;

/// Host hook run once when the tray exits.
pub(crate) type ExitHook = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the tray. Cheap to clone; every clone refers to the same tray.
#[derive(Clone)]
pub struct Tray {
    pub(crate) shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) model: Arc<Model>,
    pub(crate) icons: IconController,
    pub(crate) exit: ExitSignal,
    pub(crate) state: AtomicU8,
    pub(crate) exit_fired: AtomicBool,
    pub(crate) quit_posted: AtomicBool,
    pub(crate) on_exit: Mutex<Option<ExitHook>>,
    pub(crate) root: OnceLock<Arc<Menu>>,
    pub(crate) config: TrayConfig,
}

impl Tray {
    pub fn new(config: TrayConfig) -> Self {
        let icons = IconController::new(config.icon_cache());
        Self {
            shared: Arc::new(Shared {
                model: Arc::new(Model::new()),
                icons,
                exit: ExitSignal::new(),
                state: AtomicU8::new(LoopState::Uninitialized as u8),
                exit_fired: AtomicBool::new(false),
                quit_posted: AtomicBool::new(false),
                on_exit: Mutex::new(None),
                root: OnceLock::new(),
                config,
            }),
        }
    }

    /// Runs the tray on the calling thread until it exits.
    ///
    /// The calling thread becomes the affine thread. `on_ready` is invoked
    /// once on a separate thread after the icon and the root menu exist.
    /// Returns an error without invoking `on_ready` if startup fails.
    pub fn run<B, F>(&self, backend: B, on_ready: F) -> Result<()>
    where
        B: NativeTray + 'static,
        F: FnOnce(Tray) + Send + 'static,
    {
        self.run_with(backend, DispatchTable::standard(), on_ready)
    }

    /// Like [`run`](Self::run), with a custom dispatch table.
    pub fn run_with<B, F>(&self, backend: B, table: DispatchTable, on_ready: F) -> Result<()>
    where
        B: NativeTray + 'static,
        F: FnOnce(Tray) + Send + 'static,
    {
        self.initialize(Box::new(backend))?;
        self.serve(&table, on_ready)
    }

    /// The root menu, once startup has created it.
    pub fn root(&self) -> Option<Arc<Menu>> {
        self.shared.root.get().cloned()
    }

    /// Resolves an item identifier. Unknown or stale identifiers yield `None`.
    pub fn find_item(&self, id: ItemId) -> Option<Arc<MenuItem>> {
        self.shared.model.find_item(id)
    }

    /// Number of items known to the tray, separators and submenu items included.
    pub fn item_count(&self) -> usize {
        self.shared.model.item_count()
    }

    /// Shows `data` as the notification icon.
    ///
    /// The bytes are persisted once per distinct content; failures are logged
    /// and returned.
    pub fn set_icon(&self, data: &[u8]) -> Result<()> {
        self.shared
            .icons
            .set_icon(&self.shared.model.affinity, data)
            .inspect_err(|e| tracing::warn!(error = %e, "unable to set tray icon"))
    }

    /// Sets the tooltip, truncated to the native field's capacity.
    pub fn set_tooltip(&self, text: &str) -> Result<()> {
        self.shared
            .icons
            .set_tooltip(&self.shared.model.affinity, text)
            .inspect_err(|e| tracing::warn!(error = %e, "unable to set tray tooltip"))
    }

    /// The last tooltip applied successfully.
    pub fn tooltip(&self) -> Option<String> {
        self.shared.icons.tooltip()
    }

    /// Requests shutdown. Returns immediately; the event loop exits once the
    /// coordination window has been closed.
    pub fn quit(&self) {
        match self.shared.model.affinity.waker() {
            Some(waker) => {
                tracing::debug!("tray quit requested");
                waker.close();
            }
            None => tracing::warn!("quit requested while the tray is not running"),
        }
    }

    /// A handle the host can block on until the tray exits.
    ///
    /// The signal is only delivered to a listener that is waiting when it
    /// fires.
    pub fn exit_listener(&self) -> ExitListener {
        self.shared.exit.listener()
    }

    /// Registers a hook that runs once on exit, before the exit signal fires.
    ///
    /// Replaces any previously registered hook.
    pub fn on_exit<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *lock(&self.shared.on_exit) = Some(Box::new(hook));
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn config(&self) -> &TrayConfig {
        &self.shared.config
    }

    pub(crate) fn set_state(&self, state: LoopState) {
        let previous = self.shared.state.swap(state as u8, Ordering::AcqRel);
        tracing::debug!(from = ?LoopState::from_u8(previous), to = ?state, "tray state changed");
    }
}

impl std::fmt::Debug for Tray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tray")
            .field("state", &self.state())
            .field("items", &self.item_count())
            .finish()
    }
}

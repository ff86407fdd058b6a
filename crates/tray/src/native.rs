//! Contract between the tray core and a platform backend.
//!
//! Every method of [`NativeTray`] is called on the affine thread only. The
//! backend object itself never crosses threads; the one piece that does is
//! the [`Waker`], which lets other threads nudge the blocking event fetch so
//! queued commands get drained.

use std::path::Path;
use std::sync::Arc;

use crate::error::NativeError;
use crate::id::ItemId;

/// Fixed capacity of the native tooltip field, in UTF-16 units (NUL included).
pub const TOOLTIP_CAPACITY: usize = 128;

/// Opaque handle of a native popup menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MenuHandle(usize);

impl MenuHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Opaque handle of a loaded native image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(usize);

impl ImageHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

/// What a native menu entry renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Text,
    Separator,
    SubMenu(MenuHandle),
}

/// Snapshot of one menu item, as handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEntry {
    pub id: ItemId,
    pub kind: EntryKind,
    pub title: String,
    pub checked: bool,
    pub disabled: bool,
}

/// A decoded platform event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    /// The user activated the notification icon (left or right click).
    MenuRequested,
    /// A menu entry was chosen; carries the raw native command id.
    ItemSelected(u32),
    /// The host shell restarted and dropped every notification icon.
    TaskbarCreated,
    /// The user session is ending.
    SessionEnding,
    /// The coordination window was destroyed.
    Destroyed,
    /// Commands are waiting in the affine queue.
    Wake,
    /// Anything else the backend chose to surface.
    Other(u32),
}

/// Dispatch key of a [`NativeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MenuRequested,
    ItemSelected,
    TaskbarCreated,
    SessionEnding,
    Destroyed,
    Wake,
    Other,
}

impl NativeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MenuRequested => EventKind::MenuRequested,
            Self::ItemSelected(_) => EventKind::ItemSelected,
            Self::TaskbarCreated => EventKind::TaskbarCreated,
            Self::SessionEnding => EventKind::SessionEnding,
            Self::Destroyed => EventKind::Destroyed,
            Self::Wake => EventKind::Wake,
            Self::Other(_) => EventKind::Other,
        }
    }
}

/// Result of one blocking fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pump {
    Event(NativeEvent),
    /// The normal termination event; no more events will arrive.
    Quit,
    /// The fetch primitive itself failed.
    Failed(NativeError),
}

/// Wakes a blocked [`NativeTray::next_event`] from any thread.
pub trait Waker: Send + Sync {
    /// Makes the pump yield a [`NativeEvent::Wake`] soon.
    fn wake(&self);

    /// Posts a close request for the coordination window. Does not wait.
    fn close(&self);
}

/// Run by the backend from inside its session-end notification.
pub type SessionEndHook = Box<dyn Fn() + Send>;

/// Platform backend for one notification icon and its menus.
pub trait NativeTray {
    /// Registers the coordination window and adds the notification icon.
    fn init(&mut self) -> Result<(), NativeError>;

    /// Returns the cross-thread waker. Valid after a successful [`init`](Self::init).
    fn waker(&self) -> Arc<dyn Waker>;

    fn create_menu(&mut self) -> Result<MenuHandle, NativeError>;

    fn destroy_menu(&mut self, menu: MenuHandle) -> Result<(), NativeError>;

    /// Updates an existing entry in place, addressed by identifier.
    ///
    /// Must return [`NativeError::EntryMissing`] when `menu` holds no entry
    /// with `entry.id`.
    fn modify_item(&mut self, menu: MenuHandle, entry: &NativeEntry) -> Result<(), NativeError>;

    /// Inserts a new entry before the entry currently at `position`.
    fn insert_item(
        &mut self,
        menu: MenuHandle,
        position: usize,
        entry: &NativeEntry,
    ) -> Result<(), NativeError>;

    /// Displays `menu` at the pointer location.
    fn show_menu(&mut self, menu: MenuHandle) -> Result<(), NativeError>;

    fn load_image(&mut self, path: &Path) -> Result<ImageHandle, NativeError>;

    fn set_icon(&mut self, image: ImageHandle) -> Result<(), NativeError>;

    /// `tip` is NUL-terminated and already truncated to capacity.
    fn set_tooltip(&mut self, tip: &[u16; TOOLTIP_CAPACITY]) -> Result<(), NativeError>;

    /// (Re-)adds the notification icon entry.
    fn add_icon(&mut self) -> Result<(), NativeError>;

    fn delete_icon(&mut self) -> Result<(), NativeError>;

    /// Installs the hook run when the user session ends.
    ///
    /// Backends whose platform may kill the process as soon as the
    /// session-end notification returns must remove the icon and run `hook`
    /// before returning from it, then still report
    /// [`NativeEvent::SessionEnding`]. The hook never touches the backend.
    fn set_session_end_hook(&mut self, hook: SessionEndHook) {
        drop(hook);
    }

    /// Makes the pump return [`Pump::Quit`] once pending events are consumed.
    fn post_quit(&mut self);

    /// Blocks until the next event.
    fn next_event(&mut self) -> Pump;

    /// Default processing for events without a registered handler.
    fn default_handler(&mut self, event: &NativeEvent) {
        tracing::trace!(?event, "unhandled native event");
    }

    /// Releases the coordination window and its class.
    fn teardown(&mut self);
}

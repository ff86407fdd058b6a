//! Notification-area icon with a mutable, thread-safe popup menu.
//!
//! A [`Tray`] owns the menu tree, the icon and tooltip, and the event loop.
//! The thread that calls [`Tray::run`] becomes the affine thread: it is the
//! only one that ever touches native resources. Menus may be mutated from any
//! thread; those calls are queued and executed on the affine thread.
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> systray::Result<()> {
//! use systray::{Tray, TrayConfig, win32::Win32Tray};
//!
//! let tray = Tray::new(TrayConfig::default());
//! tray.run(Win32Tray::default(), |tray| {
//!     let Some(root) = tray.root() else { return };
//!     root.add_item("Quit", move |_| tray.quit());
//! })
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
//!
//! # Platform notes
//! - Windows: Uses Win32 `Shell_NotifyIconW` and a hidden message window
//! - Other platforms provide no backend; implement [`native::NativeTray`]

mod affinity;
mod bridge;
mod config;
mod error;
mod event_loop;
mod exit;
mod icon;
mod id;
mod menu;
pub mod native;
mod sync;
mod tray;

#[cfg(windows)]
pub mod win32;

#[cfg(test)]
mod fake;

pub use config::TrayConfig;
pub use error::{NativeError, Result, TrayError};
pub use event_loop::{DispatchTable, Handler, LoopState};
pub use exit::ExitListener;
pub use icon::encode_tooltip;
pub use id::ItemId;
pub use menu::{Callback, ItemKind, Menu, MenuItem};
pub use tray::Tray;

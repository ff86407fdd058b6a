//! Scripted in-memory backend for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{Receiver, Sender};

use crate::error::NativeError;
use crate::id::ItemId;
use crate::native::{
    ImageHandle, MenuHandle, NativeEntry, NativeEvent, NativeTray, Pump, SessionEndHook,
    TOOLTIP_CAPACITY, Waker,
};

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub menus: HashMap<MenuHandle, Vec<NativeEntry>>,
    pub destroyed_menus: Vec<MenuHandle>,
    pub shown: Vec<MenuHandle>,
    pub image_loads: Vec<PathBuf>,
    pub icon: Option<ImageHandle>,
    pub tooltip: Option<String>,
    pub icon_adds: usize,
    pub icon_deletes: usize,
    pub icon_shown: bool,
    /// Set while the session-end notification is being handled inside the pump.
    pub in_session_end: bool,
    pub quit_posted: usize,
    pub default_handled: Vec<NativeEvent>,
    pub torn_down: bool,

    pub fail_init: bool,
    pub fail_create_menu: bool,
    pub fail_modify: bool,
    pub fail_insert: HashSet<ItemId>,
    pub fail_pump: bool,

    next_handle: usize,
}

impl FakeState {
    /// Entries of `menu`, in native order.
    pub fn entries(&self, menu: MenuHandle) -> &[NativeEntry] {
        self.menus.get(&menu).map(Vec::as_slice).unwrap_or_default()
    }

    /// Removing an icon that is not shown is a no-op, as in the shell.
    fn remove_icon(&mut self) {
        if self.icon_shown {
            self.icon_shown = false;
            self.icon_deletes += 1;
        }
    }

    /// Titles of `menu`, in native order.
    pub fn titles(&self, menu: MenuHandle) -> Vec<String> {
        self.entries(menu).iter().map(|e| e.title.clone()).collect()
    }
}

pub(crate) struct FakeNative {
    state: Arc<Mutex<FakeState>>,
    events_tx: Sender<Pump>,
    events_rx: Receiver<Pump>,
    wakes_tx: Sender<()>,
    session_end: Option<SessionEndHook>,
}

/// Test-side view of a [`FakeNative`] that has been handed to the tray.
#[derive(Clone)]
pub(crate) struct FakeControl {
    state: Arc<Mutex<FakeState>>,
    events: Sender<Pump>,
    pub wakes: Receiver<()>,
}

impl FakeControl {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn send(&self, event: NativeEvent) {
        self.events.send(Pump::Event(event)).unwrap();
    }

    pub fn send_quit(&self) {
        self.events.send(Pump::Quit).unwrap();
    }
}

struct FakeWaker {
    events: Sender<Pump>,
    wakes: Sender<()>,
}

impl Waker for FakeWaker {
    fn wake(&self) {
        let _ = self.events.send(Pump::Event(NativeEvent::Wake));
        let _ = self.wakes.send(());
    }

    fn close(&self) {
        // Closing the window ends in its destruction.
        let _ = self.events.send(Pump::Event(NativeEvent::Destroyed));
    }
}

impl FakeNative {
    pub fn new() -> (Self, FakeControl) {
        let state = Arc::new(Mutex::new(FakeState {
            next_handle: 1,
            ..FakeState::default()
        }));
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (wakes_tx, wakes_rx) = crossbeam_channel::unbounded();

        let control = FakeControl {
            state: Arc::clone(&state),
            events: events_tx.clone(),
            wakes: wakes_rx,
        };
        let fake = Self {
            state,
            events_tx,
            events_rx,
            wakes_tx,
            session_end: None,
        };
        (fake, control)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

impl NativeTray for FakeNative {
    fn init(&mut self) -> Result<(), NativeError> {
        let mut state = self.state();
        if state.fail_init {
            return Err(NativeError::Os {
                call: "CreateWindowExW",
                code: 5,
            });
        }
        state.icon_adds += 1;
        state.icon_shown = true;
        Ok(())
    }

    fn waker(&self) -> Arc<dyn Waker> {
        Arc::new(FakeWaker {
            events: self.events_tx.clone(),
            wakes: self.wakes_tx.clone(),
        })
    }

    fn create_menu(&mut self) -> Result<MenuHandle, NativeError> {
        let mut state = self.state();
        if state.fail_create_menu {
            return Err(NativeError::Os {
                call: "CreatePopupMenu",
                code: 8,
            });
        }
        let handle = MenuHandle::from_raw(state.next_handle);
        state.next_handle += 1;
        state.menus.insert(handle, Vec::new());
        Ok(handle)
    }

    fn destroy_menu(&mut self, menu: MenuHandle) -> Result<(), NativeError> {
        let mut state = self.state();
        state.menus.remove(&menu);
        state.destroyed_menus.push(menu);
        Ok(())
    }

    fn modify_item(&mut self, menu: MenuHandle, entry: &NativeEntry) -> Result<(), NativeError> {
        let mut state = self.state();
        if state.fail_modify {
            return Err(NativeError::Os {
                call: "SetMenuItemInfoW",
                code: 87,
            });
        }
        let entries = state.menus.get_mut(&menu).ok_or(NativeError::Os {
            call: "SetMenuItemInfoW",
            code: 1401,
        })?;
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(NativeError::EntryMissing(entry.id)),
        }
    }

    fn insert_item(
        &mut self,
        menu: MenuHandle,
        position: usize,
        entry: &NativeEntry,
    ) -> Result<(), NativeError> {
        let mut state = self.state();
        if state.fail_insert.contains(&entry.id) {
            return Err(NativeError::Os {
                call: "InsertMenuItemW",
                code: 1456,
            });
        }
        let entries = state.menus.get_mut(&menu).ok_or(NativeError::Os {
            call: "InsertMenuItemW",
            code: 1401,
        })?;
        let position = position.min(entries.len());
        entries.insert(position, entry.clone());
        Ok(())
    }

    fn show_menu(&mut self, menu: MenuHandle) -> Result<(), NativeError> {
        self.state().shown.push(menu);
        Ok(())
    }

    fn load_image(&mut self, path: &Path) -> Result<ImageHandle, NativeError> {
        let mut state = self.state();
        state.image_loads.push(path.to_path_buf());
        Ok(ImageHandle::from_raw(1000 + state.image_loads.len()))
    }

    fn set_icon(&mut self, image: ImageHandle) -> Result<(), NativeError> {
        self.state().icon = Some(image);
        Ok(())
    }

    fn set_tooltip(&mut self, tip: &[u16; TOOLTIP_CAPACITY]) -> Result<(), NativeError> {
        let len = tip.iter().position(|&u| u == 0).unwrap_or(tip.len());
        self.state().tooltip = Some(String::from_utf16_lossy(&tip[..len]));
        Ok(())
    }

    fn add_icon(&mut self) -> Result<(), NativeError> {
        let mut state = self.state();
        state.icon_adds += 1;
        state.icon_shown = true;
        Ok(())
    }

    fn delete_icon(&mut self) -> Result<(), NativeError> {
        self.state().remove_icon();
        Ok(())
    }

    fn set_session_end_hook(&mut self, hook: SessionEndHook) {
        self.session_end = Some(hook);
    }

    fn post_quit(&mut self) {
        self.state().quit_posted += 1;
        let _ = self.events_tx.send(Pump::Quit);
    }

    fn next_event(&mut self) -> Pump {
        if self.state().fail_pump {
            return Pump::Failed(NativeError::Os {
                call: "GetMessageW",
                code: 1400,
            });
        }
        let next = self.events_rx.recv().unwrap_or(Pump::Quit);
        if next == Pump::Event(NativeEvent::SessionEnding) {
            // Handled before the notification returns, like the window procedure.
            {
                let mut state = self.state();
                state.remove_icon();
                state.in_session_end = true;
            }
            if let Some(hook) = &self.session_end {
                hook();
            }
            self.state().in_session_end = false;
        }
        next
    }

    fn default_handler(&mut self, event: &NativeEvent) {
        self.state().default_handled.push(event.clone());
    }

    fn teardown(&mut self) {
        self.session_end = None;
        self.state().torn_down = true;
    }
}

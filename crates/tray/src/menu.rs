//! Logical menu model.
//!
//! The tree lives for the whole run: a [`Menu`] owns its items in display
//! order, a submenu item owns its child [`Menu`], and every item is also
//! reachable by identifier through the [`Model`] registry. Item to parent
//! menu is a weak back-reference. The registry is cleared when the event
//! loop terminates, which releases the model once the host drops its menus.
//!
//! Every mutation updates the in-memory state first and then re-synchronizes
//! the affected item with the native menu. Native failures are logged and the
//! logical state stays authoritative.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use crate::affinity::Affinity;
use crate::bridge;
use crate::error::{NativeError, Result, TrayError};
use crate::id::{IdAllocator, ItemId};
use crate::native::{EntryKind, MenuHandle, NativeEntry};
use crate::sync::{lock, read, write};

/// Selection callback of a menu item.
///
/// Runs on the affine thread, in event order. It must return promptly: the
/// next native event is not delivered until it does.
pub type Callback = Box<dyn Fn(&Arc<MenuItem>) + Send + Sync + 'static>;

/// Process-wide menu state: identifier source, identifier map, native affinity.
pub(crate) struct Model {
    ids: IdAllocator,
    items: RwLock<HashMap<ItemId, Arc<MenuItem>>>,
    pub(crate) affinity: Affinity,
}

impl Model {
    pub(crate) fn new() -> Self {
        Self {
            ids: IdAllocator::new(),
            items: RwLock::new(HashMap::new()),
            affinity: Affinity::new(),
        }
    }

    /// Resolves an identifier to its item. Unknown identifiers yield `None`.
    pub(crate) fn find_item(&self, id: ItemId) -> Option<Arc<MenuItem>> {
        read(&self.items).get(&id).cloned()
    }

    pub(crate) fn item_count(&self) -> usize {
        read(&self.items).len()
    }

    /// Drops every registry entry. Lookups afterwards find nothing.
    pub(crate) fn clear(&self) {
        write(&self.items).clear();
    }

    /// Creates the native root menu.
    pub(crate) fn create_root(self: &Arc<Self>) -> Result<Arc<Menu>> {
        let handle = self.affinity.call(|native| native.create_menu())??;
        Ok(Arc::new(Menu::new(handle, Weak::new(), Arc::clone(self))))
    }

    fn register(
        self: &Arc<Self>,
        parent: &Arc<Menu>,
        kind: ItemKind,
        title: String,
        on_click: Option<Callback>,
    ) -> Arc<MenuItem> {
        let item = Arc::new(MenuItem {
            id: self.ids.allocate(),
            kind,
            state: Mutex::new(ItemState {
                title,
                checked: false,
                disabled: false,
            }),
            parent: Arc::downgrade(parent),
            child: OnceLock::new(),
            on_click,
            model: Arc::clone(self),
        });
        write(&self.items).insert(item.id, Arc::clone(&item));
        item
    }

    fn unregister(&self, id: ItemId) {
        write(&self.items).remove(&id);
    }

    /// Reflects `item` into `parent`'s native menu.
    fn sync(&self, parent: &Arc<Menu>, item: &Arc<MenuItem>) -> Result<()> {
        let parent = Arc::clone(parent);
        let item = Arc::clone(item);
        self.affinity
            .call(move |native| bridge::sync_item(native, &parent, &item))??;
        Ok(())
    }
}

/// A popup menu: a native handle plus its items in display order.
pub struct Menu {
    handle: MenuHandle,
    items: Mutex<Vec<Arc<MenuItem>>>,
    owner: Weak<MenuItem>,
    model: Arc<Model>,
}

impl Menu {
    pub(crate) fn new(handle: MenuHandle, owner: Weak<MenuItem>, model: Arc<Model>) -> Self {
        Self {
            handle,
            items: Mutex::new(Vec::new()),
            owner,
            model,
        }
    }

    pub fn handle(&self) -> MenuHandle {
        self.handle
    }

    /// Items in display order.
    pub fn items(&self) -> Vec<Arc<MenuItem>> {
        lock(&self.items).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }

    /// Display position of the item with this identifier.
    pub fn position_of(&self, id: ItemId) -> Option<usize> {
        lock(&self.items).iter().position(|item| item.id == id)
    }

    /// The submenu item this menu hangs off, `None` for the root.
    pub fn owner(&self) -> Option<Arc<MenuItem>> {
        self.owner.upgrade()
    }

    /// Returns the item's position, appending it first if it is not tracked
    /// yet. The flag tells whether this call appended it.
    ///
    /// Idempotent, so a retried sync never tracks an item twice.
    pub(crate) fn position_or_append(&self, item: &Arc<MenuItem>) -> (usize, bool) {
        let mut items = lock(&self.items);
        if let Some(position) = items.iter().position(|i| i.id == item.id) {
            return (position, false);
        }
        items.push(Arc::clone(item));
        (items.len() - 1, true)
    }

    /// Stops tracking the item; returns whether it was tracked.
    pub(crate) fn forget(&self, id: ItemId) -> bool {
        let mut items = lock(&self.items);
        let before = items.len();
        items.retain(|item| item.id != id);
        items.len() != before
    }

    /// Appends a selectable item.
    ///
    /// The item is returned even when the native insert fails; the failure is
    /// logged and the next mutation of the item retries the sync.
    pub fn add_item<F>(self: &Arc<Self>, title: impl Into<String>, on_click: F) -> Arc<MenuItem>
    where
        F: Fn(&Arc<MenuItem>) + Send + Sync + 'static,
    {
        self.add(ItemKind::Entry, title.into(), Some(Box::new(on_click)))
    }

    /// Appends a separator line.
    pub fn add_separator(self: &Arc<Self>) -> Arc<MenuItem> {
        self.add(ItemKind::Separator, String::new(), None)
    }

    fn add(
        self: &Arc<Self>,
        kind: ItemKind,
        title: String,
        on_click: Option<Callback>,
    ) -> Arc<MenuItem> {
        let item = self.model.register(self, kind, title, on_click);
        if let Err(e) = self.model.sync(self, &item) {
            tracing::error!(id = %item.id, error = %e, "unable to add menu item");
        }
        item
    }

    /// Appends an item that opens a child menu, and returns the child.
    ///
    /// Returns `None` when the native side fails; in that case neither the
    /// item nor the child menu is retained.
    pub fn add_submenu(self: &Arc<Self>, title: impl Into<String>) -> Option<Arc<Menu>> {
        let model = &self.model;
        let item = model.register(self, ItemKind::SubMenu, title.into(), None);

        let parent = Arc::clone(self);
        let owner = Arc::clone(&item);
        let child_model = Arc::clone(model);
        let result = model
            .affinity
            .call(move |native| {
                let handle = bridge::attach_submenu(native, &parent, &owner)?;
                let child = Arc::new(Menu::new(handle, Arc::downgrade(&owner), child_model));
                let _ = owner.child.set(Arc::clone(&child));
                Ok::<_, NativeError>(child)
            })
            .and_then(|attached| attached.map_err(TrayError::from));

        match result {
            Ok(child) => Some(child),
            Err(e) => {
                tracing::error!(id = %item.id, error = %e, "unable to add submenu");
                self.forget(item.id);
                model.unregister(item.id);
                None
            }
        }
    }
}

impl fmt::Debug for Menu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Menu")
            .field("handle", &self.handle)
            .field("items", &self.len())
            .finish()
    }
}

/// What an item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Entry,
    Separator,
    SubMenu,
}

#[derive(Debug, Clone)]
struct ItemState {
    title: String,
    checked: bool,
    disabled: bool,
}

/// One entry in a [`Menu`].
pub struct MenuItem {
    id: ItemId,
    kind: ItemKind,
    state: Mutex<ItemState>,
    parent: Weak<Menu>,
    child: OnceLock<Arc<Menu>>,
    on_click: Option<Callback>,
    model: Arc<Model>,
}

impl MenuItem {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn is_separator(&self) -> bool {
        self.kind == ItemKind::Separator
    }

    pub fn title(&self) -> String {
        lock(&self.state).title.clone()
    }

    pub fn is_checked(&self) -> bool {
        lock(&self.state).checked
    }

    pub fn is_disabled(&self) -> bool {
        lock(&self.state).disabled
    }

    /// The menu this item is displayed in.
    pub fn parent(&self) -> Option<Arc<Menu>> {
        self.parent.upgrade()
    }

    /// The child menu, for submenu items.
    pub fn submenu(&self) -> Option<Arc<Menu>> {
        self.child.get().cloned()
    }

    pub fn set_title(self: &Arc<Self>, title: impl Into<String>) {
        if self.is_separator() {
            tracing::debug!(id = %self.id, "ignoring title change on separator");
            return;
        }
        lock(&self.state).title = title.into();
        self.resync();
    }

    pub fn toggle_checked(self: &Arc<Self>) {
        if self.is_separator() {
            tracing::debug!(id = %self.id, "ignoring check toggle on separator");
            return;
        }
        {
            let mut state = lock(&self.state);
            state.checked = !state.checked;
        }
        self.resync();
    }

    pub fn toggle_disabled(self: &Arc<Self>) {
        if self.is_separator() {
            tracing::debug!(id = %self.id, "ignoring disable toggle on separator");
            return;
        }
        {
            let mut state = lock(&self.state);
            state.disabled = !state.disabled;
        }
        self.resync();
    }

    fn resync(self: &Arc<Self>) {
        let Some(parent) = self.parent.upgrade() else {
            return;
        };
        if let Err(e) = self.model.sync(&parent, self) {
            tracing::error!(id = %self.id, error = %e, "unable to update menu item");
        }
    }

    /// Invokes the selection callback, if any.
    pub(crate) fn activate(self: &Arc<Self>) {
        if let Some(on_click) = &self.on_click {
            on_click(self);
        }
    }

    /// Snapshot handed to the native layer.
    pub(crate) fn native_entry(&self) -> NativeEntry {
        let state = lock(&self.state).clone();
        let kind = match self.kind {
            ItemKind::Separator => EntryKind::Separator,
            ItemKind::SubMenu => match self.child.get() {
                Some(child) => EntryKind::SubMenu(child.handle()),
                None => EntryKind::Text,
            },
            ItemKind::Entry => EntryKind::Text,
        };
        NativeEntry {
            id: self.id,
            kind,
            title: state.title,
            checked: state.checked,
            disabled: state.disabled,
        }
    }
}

impl fmt::Debug for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MenuItem")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("title", &state.title)
            .field("checked", &state.checked)
            .field("disabled", &state.disabled)
            .finish()
    }
}

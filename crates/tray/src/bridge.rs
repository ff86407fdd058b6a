//! Native sync bridge.
//!
//! Reflects logical menu items into native menus while keeping each menu's
//! tracked item order position-for-position identical to the native one.
//! Functions here run on the affine thread with the backend borrowed.

use std::sync::Arc;

use crate::error::NativeError;
use crate::menu::{Menu, MenuItem};
use crate::native::{EntryKind, MenuHandle, NativeEntry, NativeTray};

/// Brings the native entry for `item` in line with its logical state.
///
/// Modifies the entry in place when it exists, otherwise inserts it at the
/// item's tracked position. A failed insert untracks the item again so later
/// siblings keep their positions.
pub(crate) fn sync_item(
    native: &mut dyn NativeTray,
    menu: &Menu,
    item: &Arc<MenuItem>,
) -> Result<(), NativeError> {
    let entry = item.native_entry();
    upsert(native, menu, item, &entry)
}

/// Creates a child native menu and links it under `item` in `menu`.
///
/// Either both steps succeed or neither leaves a trace: on failure the child
/// handle is destroyed and the item is untracked.
pub(crate) fn attach_submenu(
    native: &mut dyn NativeTray,
    menu: &Menu,
    item: &Arc<MenuItem>,
) -> Result<MenuHandle, NativeError> {
    let child = native.create_menu()?;

    let mut entry = item.native_entry();
    entry.kind = EntryKind::SubMenu(child);

    if let Err(e) = upsert(native, menu, item, &entry) {
        if let Err(destroy) = native.destroy_menu(child) {
            tracing::warn!(error = %destroy, "unable to release orphaned submenu");
        }
        return Err(e);
    }
    Ok(child)
}

fn upsert(
    native: &mut dyn NativeTray,
    menu: &Menu,
    item: &Arc<MenuItem>,
    entry: &NativeEntry,
) -> Result<(), NativeError> {
    let (position, appended) = menu.position_or_append(item);

    match native.modify_item(menu.handle(), entry) {
        Ok(()) => Ok(()),
        Err(NativeError::EntryMissing(_)) => native
            .insert_item(menu.handle(), position, entry)
            .inspect_err(|_| {
                menu.forget(entry.id);
            }),
        Err(e) => {
            if appended {
                menu.forget(entry.id);
            }
            Err(e)
        }
    }
}

//! The demo menu.

use systray::Tray;

/// Builds the demo menu, then blocks until the tray exits.
///
/// Runs on the tray's ready thread.
pub fn populate(tray: Tray, icon: &[u8]) {
    let _ = tray.set_icon(icon);

    let Some(root) = tray.root() else {
        return;
    };

    if let Some(sub) = root.add_submenu("Sub Menu") {
        sub.add_item("Click Me", |_| {
            tracing::info!("Do you want to continue?");
        });

        sub.add_separator();

        sub.add_item("Checkable", |checkable| checkable.toggle_checked());

        let disable = sub.add_item("Click to Disable", |disable| disable.toggle_disabled());

        sub.add_item("Click to Disable", move |toggle| {
            disable.toggle_disabled();
            if disable.is_disabled() {
                toggle.set_title("Click to Enable");
            } else {
                toggle.set_title("Click to Disable");
            }
        });

        if let Some(another) = sub.add_submenu("Another SubMenu") {
            another.add_item("Click Away", |item| {
                tracing::info!(id = %item.id(), "you clicked");
            });
        }
    }

    root.add_item("Checkable", |checkable| checkable.toggle_checked());
    root.add_item("Click to Disable", |disable| disable.toggle_disabled());
    root.add_separator();

    let quitter = tray.clone();
    root.add_item("Exit", move |_| quitter.quit());

    tracing::info!(items = tray.item_count(), "menu ready");
    tray.exit_listener().wait();
    tracing::info!("app exiting");
}

//! systray demo entry point.

#[cfg(any(windows, test))]
mod config;
#[cfg(any(windows, test))]
mod icon;
#[cfg(windows)]
mod menu;

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    use systray::Tray;
    use systray::win32::Win32Tray;
    use tracing_subscriber::EnvFilter;

    // Load configuration first; it carries the fallback log filter.
    let config = config::Config::load()?;

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting systray demo");

    let icon = match &config.icon_path {
        Some(path) => std::fs::read(path)?,
        None => icon::default_icon(),
    };

    let tray = Tray::new(config.tray_config());
    tray.run(Win32Tray::default(), move |tray| menu::populate(tray, &icon))?;

    tracing::info!("demo shut down cleanly");
    Ok(())
}

#[cfg(not(windows))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("the systray demo needs the Windows notification area")
}

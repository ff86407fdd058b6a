//! Notification icon image and tooltip.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use systray_icon_cache::IconCache;

use crate::affinity::Affinity;
use crate::error::{NativeError, Result};
use crate::native::{ImageHandle, NativeTray, TOOLTIP_CAPACITY};
use crate::sync::lock;

/// Loaded native images, keyed by the file they were loaded from.
type LoadedImages = Arc<Mutex<HashMap<PathBuf, ImageHandle>>>;

pub(crate) struct IconController {
    cache: IconCache,
    loaded: LoadedImages,
    tooltip: Mutex<Option<String>>,
}

impl IconController {
    pub(crate) fn new(cache: IconCache) -> Self {
        Self {
            cache,
            loaded: Arc::new(Mutex::new(HashMap::new())),
            tooltip: Mutex::new(None),
        }
    }

    /// Persists `data` by digest and shows it as the notification icon.
    ///
    /// Identical bytes map to the same file, whose native image is loaded once.
    pub(crate) fn set_icon(&self, affinity: &Affinity, data: &[u8]) -> Result<()> {
        let stored = self.cache.store(data)?;
        let loaded = Arc::clone(&self.loaded);
        let path = stored.path;
        affinity.call(move |native| show_icon(native, &loaded, &path))??;
        Ok(())
    }

    pub(crate) fn set_tooltip(&self, affinity: &Affinity, text: &str) -> Result<()> {
        let tip = encode_tooltip(text);
        affinity.call(move |native| native.set_tooltip(&tip))??;
        *lock(&self.tooltip) = Some(text.to_owned());
        Ok(())
    }

    pub(crate) fn tooltip(&self) -> Option<String> {
        lock(&self.tooltip).clone()
    }

    #[cfg(test)]
    pub(crate) fn loaded_images(&self) -> usize {
        lock(&self.loaded).len()
    }
}

fn show_icon(
    native: &mut dyn NativeTray,
    loaded: &Mutex<HashMap<PathBuf, ImageHandle>>,
    path: &Path,
) -> std::result::Result<(), NativeError> {
    let cached = lock(loaded).get(path).copied();
    let image = match cached {
        Some(image) => image,
        None => {
            let image = native.load_image(path)?;
            lock(loaded).insert(path.to_path_buf(), image);
            image
        }
    };
    native.set_icon(image)
}

/// Encodes `text` as NUL-terminated UTF-16, truncated to the tooltip field.
///
/// Truncation never splits a surrogate pair, and text after an interior NUL
/// is dropped.
pub fn encode_tooltip(text: &str) -> [u16; TOOLTIP_CAPACITY] {
    let mut tip = [0u16; TOOLTIP_CAPACITY];
    let mut len = 0;
    for ch in text.chars().take_while(|&c| c != '\0') {
        let mut buf = [0u16; 2];
        let units = ch.encode_utf16(&mut buf);
        if len + units.len() > TOOLTIP_CAPACITY - 1 {
            break;
        }
        tip[len..len + units.len()].copy_from_slice(units);
        len += units.len();
    }
    tip
}

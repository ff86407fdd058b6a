//! Built-in tray icon.

const SIZE: u32 = 16;
const HEADER_LEN: u32 = 6 + 16;
const BITMAP_HEADER_LEN: u32 = 40;
const PIXELS_LEN: u32 = SIZE * SIZE * 4;
// One bit per pixel, rows padded to 32 bits.
const MASK_LEN: u32 = SIZE * 4;

/// A 16x16 32-bit `.ico`: a filled circle on a transparent background.
pub fn default_icon() -> Vec<u8> {
    let image_len = BITMAP_HEADER_LEN + PIXELS_LEN + MASK_LEN;
    let mut ico = Vec::with_capacity((HEADER_LEN + image_len) as usize);

    // ICONDIR
    ico.extend_from_slice(&0u16.to_le_bytes());
    ico.extend_from_slice(&1u16.to_le_bytes());
    ico.extend_from_slice(&1u16.to_le_bytes());

    // ICONDIRENTRY
    ico.extend_from_slice(&[SIZE as u8, SIZE as u8, 0, 0]);
    ico.extend_from_slice(&1u16.to_le_bytes());
    ico.extend_from_slice(&32u16.to_le_bytes());
    ico.extend_from_slice(&image_len.to_le_bytes());
    ico.extend_from_slice(&HEADER_LEN.to_le_bytes());

    // BITMAPINFOHEADER; the height covers the color and mask planes.
    ico.extend_from_slice(&BITMAP_HEADER_LEN.to_le_bytes());
    ico.extend_from_slice(&(SIZE as i32).to_le_bytes());
    ico.extend_from_slice(&(2 * SIZE as i32).to_le_bytes());
    ico.extend_from_slice(&1u16.to_le_bytes());
    ico.extend_from_slice(&32u16.to_le_bytes());
    ico.extend_from_slice(&0u32.to_le_bytes());
    ico.extend_from_slice(&(PIXELS_LEN + MASK_LEN).to_le_bytes());
    ico.extend_from_slice(&[0; 16]);

    // BGRA rows, bottom-up.
    let center = (SIZE as f32 - 1.0) / 2.0;
    for y in (0..SIZE).rev() {
        for x in 0..SIZE {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            let inside = dx * dx + dy * dy <= center * center;
            let pixel = if inside {
                [0xD0, 0x78, 0x20, 0xFF]
            } else {
                [0, 0, 0, 0]
            };
            ico.extend_from_slice(&pixel);
        }
    }

    ico.resize(ico.len() + MASK_LEN as usize, 0);
    ico
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_has_expected_layout() {
        let ico = default_icon();

        assert_eq!(ico.len(), (HEADER_LEN + BITMAP_HEADER_LEN + PIXELS_LEN + MASK_LEN) as usize);
        assert_eq!(&ico[0..6], &[0, 0, 1, 0, 1, 0]);
        assert_eq!(ico[6], 16);
        let offset = u32::from_le_bytes(ico[18..22].try_into().unwrap());
        assert_eq!(offset, HEADER_LEN);
    }

    #[test]
    fn icon_center_is_opaque_and_corner_transparent() {
        let ico = default_icon();
        let pixels = (HEADER_LEN + BITMAP_HEADER_LEN) as usize;

        let corner_alpha = ico[pixels + 3];
        let middle = pixels + ((8 * SIZE + 8) * 4) as usize;
        assert_eq!(corner_alpha, 0);
        assert_eq!(ico[middle + 3], 0xFF);
    }

    #[test]
    fn icon_is_stable() {
        assert_eq!(default_icon(), default_icon());
    }
}

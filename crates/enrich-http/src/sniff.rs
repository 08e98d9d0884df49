//! Image size detection from the first bytes of a file.
//!
//! Supports PNG, GIF, JPEG, WebP (lossy, lossless, extended) and BMP. Only
//! headers are inspected, so a truncated download is enough as long as it
//! covers the header (and, for JPEG, everything up to the frame header).

use enrich_core::Dimensions;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Pixel size encoded in the header of `data`, if it is a known format.
pub fn sniff_dimensions(data: &[u8]) -> Option<Dimensions> {
    if data.starts_with(PNG_SIGNATURE) {
        png_dimensions(data)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        gif_dimensions(data)
    } else if data.starts_with(&[0xFF, 0xD8]) {
        jpeg_dimensions(data)
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(&b"WEBP"[..]) {
        webp_dimensions(data)
    } else if data.starts_with(b"BM") {
        bmp_dimensions(data)
    } else {
        None
    }
}

fn be_u16(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 2)?;
    Some(u32::from(u16::from_be_bytes([bytes[0], bytes[1]])))
}

fn le_u16(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 2)?;
    Some(u32::from(u16::from_le_bytes([bytes[0], bytes[1]])))
}

fn le_u24(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 3)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
}

fn le_u32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// PNG: IHDR chunk with width/height at bytes 16-24 (big-endian).
fn png_dimensions(data: &[u8]) -> Option<Dimensions> {
    if data.get(12..16) != Some(&b"IHDR"[..]) {
        return None;
    }
    let bytes = data.get(16..24)?;
    let width = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let height = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Some(Dimensions::new(width, height))
}

/// GIF: logical screen size at bytes 6-10 (little-endian).
fn gif_dimensions(data: &[u8]) -> Option<Dimensions> {
    Some(Dimensions::new(le_u16(data, 6)?, le_u16(data, 8)?))
}

/// BMP: `BITMAPINFOHEADER` width/height at bytes 18-26. Height is negative
/// for top-down bitmaps.
fn bmp_dimensions(data: &[u8]) -> Option<Dimensions> {
    let width = le_u32(data, 18)?.cast_signed();
    let height = le_u32(data, 22)?.cast_signed();
    Some(Dimensions::new(width.unsigned_abs(), height.unsigned_abs()))
}

/// WebP: size location depends on the first chunk.
fn webp_dimensions(data: &[u8]) -> Option<Dimensions> {
    match data.get(12..16)? {
        // Lossy: 14-bit sizes after the frame tag and start code 9d 01 2a.
        b"VP8 " => {
            if data.get(23..26) != Some(&[0x9D, 0x01, 0x2A][..]) {
                return None;
            }
            Some(Dimensions::new(
                le_u16(data, 26)? & 0x3FFF,
                le_u16(data, 28)? & 0x3FFF,
            ))
        }
        // Lossless: signature 0x2f, then width-1 and height-1 in 14 bits each.
        b"VP8L" => {
            if data.get(20) != Some(&0x2F) {
                return None;
            }
            let bits = le_u32(data, 21)?;
            Some(Dimensions::new((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
        }
        // Extended: 24-bit canvas width-1 and height-1.
        b"VP8X" => Some(Dimensions::new(le_u24(data, 24)? + 1, le_u24(data, 27)? + 1)),
        _ => None,
    }
}

/// JPEG: walk the segments up to the first start-of-frame marker.
fn jpeg_dimensions(data: &[u8]) -> Option<Dimensions> {
    let mut pos = 2;
    loop {
        // Markers may be padded with any number of 0xFF fill bytes.
        while *data.get(pos)? != 0xFF {
            pos += 1;
        }
        while *data.get(pos)? == 0xFF {
            pos += 1;
        }
        let marker = *data.get(pos)?;
        pos += 1;

        match marker {
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD8 => {}
            // End of image or start of scan before any frame header.
            0xD9 | 0xDA => return None,
            // SOF0-SOF15, except DHT (C4), JPG (C8) and DAC (CC).
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let height = be_u16(data, pos + 3)?;
                let width = be_u16(data, pos + 5)?;
                return Some(Dimensions::new(width, height));
            }
            _ => {
                let length = usize::try_from(be_u16(data, pos)?).ok()?;
                pos += length;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = PNG_SIGNATURE.to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data
    }

    #[test]
    fn test_png() {
        assert_eq!(sniff_dimensions(&png(100, 50)), Some(Dimensions::new(100, 50)));
    }

    #[test]
    fn test_truncated_png() {
        assert_eq!(sniff_dimensions(&png(100, 50)[..20]), None);
    }

    #[test]
    fn test_gif() {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&[0x2C, 0x01, 0xC8, 0x00]);
        assert_eq!(sniff_dimensions(&data), Some(Dimensions::new(300, 200)));
    }

    #[test]
    fn test_jpeg_after_app_segment() {
        let data = [
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, 0x00, 0x04, 0x4A, 0x46, // APP0, length 4
            0xFF, 0xC0, 0x00, 0x11, 0x08, // SOF0, length, precision
            0x01, 0xE0, // height = 480
            0x02, 0x80, // width = 640
            0x03,
        ];
        assert_eq!(sniff_dimensions(&data), Some(Dimensions::new(640, 480)));
    }

    #[test]
    fn test_jpeg_scan_before_frame() {
        let data = [0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02];
        assert_eq!(sniff_dimensions(&data), None);
    }

    #[test]
    fn test_webp_lossy() {
        let mut data = b"RIFF\x00\x00\x00\x00WEBPVP8 ".to_vec();
        data.extend_from_slice(&[0; 4]); // chunk size
        data.extend_from_slice(&[0; 3]); // frame tag
        data.extend_from_slice(&[0x9D, 0x01, 0x2A]);
        data.extend_from_slice(&400u16.to_le_bytes());
        data.extend_from_slice(&300u16.to_le_bytes());
        assert_eq!(sniff_dimensions(&data), Some(Dimensions::new(400, 300)));
    }

    #[test]
    fn test_webp_lossless() {
        let mut data = b"RIFF\x00\x00\x00\x00WEBPVP8L".to_vec();
        data.extend_from_slice(&[0; 4]);
        data.push(0x2F);
        let bits: u32 = (128 - 1) | ((64 - 1) << 14);
        data.extend_from_slice(&bits.to_le_bytes());
        assert_eq!(sniff_dimensions(&data), Some(Dimensions::new(128, 64)));
    }

    #[test]
    fn test_webp_extended() {
        let mut data = b"RIFF\x00\x00\x00\x00WEBPVP8X".to_vec();
        data.extend_from_slice(&[0; 8]); // chunk size, flags, reserved
        data.extend_from_slice(&[0xFF, 0x03, 0x00]); // width - 1 = 1023
        data.extend_from_slice(&[0xFF, 0x01, 0x00]); // height - 1 = 511
        assert_eq!(sniff_dimensions(&data), Some(Dimensions::new(1024, 512)));
    }

    #[test]
    fn test_bmp_top_down() {
        let mut data = b"BM".to_vec();
        data.extend_from_slice(&[0; 16]);
        data.extend_from_slice(&640i32.to_le_bytes());
        data.extend_from_slice(&(-480i32).to_le_bytes());
        assert_eq!(sniff_dimensions(&data), Some(Dimensions::new(640, 480)));
    }

    #[test]
    fn test_unknown_format() {
        assert_eq!(sniff_dimensions(b"<html>not an image</html>"), None);
        assert_eq!(sniff_dimensions(&[]), None);
    }
}

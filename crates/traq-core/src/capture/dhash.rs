//! Difference hash (dHash) perceptual fingerprint (§4.5, GLOSSARY).
//!
//! Downscale to 9×8 grayscale, one bit per horizontally-adjacent pixel
//! pair, 64 bits total, serialized as a fixed-width hex string. Similarity
//! is hamming distance between two hashes.

use image::imageops::FilterType;

const HASH_WIDTH: u32 = 9;
const HASH_HEIGHT: u32 = 8;

pub fn dhash(image: &image::RgbaImage) -> String {
    let small = image::imageops::resize(image, HASH_WIDTH, HASH_HEIGHT, FilterType::Triangle);
    let gray = image::imageops::grayscale(&small);

    let mut bits: u64 = 0;
    let mut bit_index = 0;
    for y in 0..HASH_HEIGHT {
        for x in 0..(HASH_WIDTH - 1) {
            let left = gray.get_pixel(x, y).0[0];
            let right = gray.get_pixel(x + 1, y).0[0];
            if left > right {
                bits |= 1 << bit_index;
            }
            bit_index += 1;
        }
    }
    format!("{bits:016x}")
}

pub fn hamming_distance(a: &str, b: &str) -> Option<u32> {
    let a = u64::from_str_radix(a, 16).ok()?;
    let b = u64::from_str_radix(b, 16).ok()?;
    Some((a ^ b).count_ones())
}

pub fn are_similar(a: &str, b: &str, threshold: u32) -> bool {
    hamming_distance(a, b).is_some_and(|d| d <= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn identical_images_have_zero_distance() {
        let img = solid(64, 64, [10, 20, 30, 255]);
        let h1 = dhash(&img);
        let h2 = dhash(&img);
        assert_eq!(hamming_distance(&h1, &h2), Some(0));
        assert!(are_similar(&h1, &h2, 3));
    }

    #[test]
    fn very_different_images_exceed_threshold() {
        let black = solid(64, 64, [0, 0, 0, 255]);
        let mut noisy = RgbaImage::new(64, 64);
        for (x, y, px) in noisy.enumerate_pixels_mut() {
            let v = (((x * 37 + y * 91) % 256) as u8).wrapping_add(if (x + y) % 2 == 0 { 200 } else { 0 });
            *px = Rgba([v, 255 - v, v / 2, 255]);
        }
        let h1 = dhash(&black);
        let h2 = dhash(&noisy);
        assert!(hamming_distance(&h1, &h2).unwrap() > 3);
        assert!(!are_similar(&h1, &h2, 3));
    }

    #[test]
    fn hash_is_fixed_width_hex() {
        let img = solid(32, 32, [1, 2, 3, 255]);
        let h = dhash(&img);
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

//! Frame annotation: face boxes and name labels.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use rollcall_core::PixelRect;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const KNOWN_COLOR: Rgb<u8> = Rgb([36, 255, 12]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: u32 = 2;
const GLYPH_SIZE: u32 = 8;
const TEXT_SCALE: u32 = 2;
/// Gap between the label baseline and the top of the box.
const LABEL_GAP: u32 = 4;

/// Draw a hollow box around `rect`, `BOX_THICKNESS` pixels wide.
pub fn draw_face_box(frame: &mut RgbImage, rect: PixelRect) {
    for inset in 0..BOX_THICKNESS {
        let (w, h) = (
            rect.width.saturating_sub(2 * inset),
            rect.height.saturating_sub(2 * inset),
        );
        if w == 0 || h == 0 {
            break;
        }
        let r = Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32).of_size(w, h);
        draw_hollow_rect_mut(frame, r, BOX_COLOR);
    }
}

/// Write `text` just above `rect`, or inside its top edge when there is no
/// room above. Characters without a glyph are skipped.
pub fn draw_label(frame: &mut RgbImage, rect: PixelRect, text: &str, color: Rgb<u8>) {
    let glyph = GLYPH_SIZE * TEXT_SCALE;
    let y = rect.y.checked_sub(glyph + LABEL_GAP).unwrap_or(rect.y);
    let mut x = rect.x;

    for ch in text.chars() {
        if x >= frame.width() {
            break;
        }
        if let Some(bitmap) = BASIC_FONTS.get(ch) {
            draw_glyph(frame, x, y, &bitmap, color);
        }
        x += glyph;
    }
}

fn draw_glyph(frame: &mut RgbImage, x0: u32, y0: u32, bitmap: &[u8; 8], color: Rgb<u8>) {
    let (width, height) = frame.dimensions();
    for (row, bits) in bitmap.iter().enumerate() {
        for col in 0..GLYPH_SIZE {
            if bits & (1 << col) == 0 {
                continue;
            }
            for dy in 0..TEXT_SCALE {
                for dx in 0..TEXT_SCALE {
                    let px = x0 + col * TEXT_SCALE + dx;
                    let py = y0 + row as u32 * TEXT_SCALE + dy;
                    if px < width && py < height {
                        frame.put_pixel(px, py, color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: u32, y: u32, width: u32, height: u32) -> PixelRect {
        PixelRect { x, y, width, height }
    }

    fn count(frame: &RgbImage, color: Rgb<u8>) -> usize {
        frame.pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn test_box_outline_only() {
        let mut frame = RgbImage::new(100, 100);
        draw_face_box(&mut frame, rect(10, 10, 50, 40));

        assert_eq!(*frame.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*frame.get_pixel(11, 11), BOX_COLOR);
        assert_eq!(*frame.get_pixel(59, 49), BOX_COLOR);
        assert_eq!(*frame.get_pixel(35, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_box_at_frame_edge_is_clipped() {
        let mut frame = RgbImage::new(20, 20);
        draw_face_box(&mut frame, rect(15, 15, 30, 30));
        assert_eq!(*frame.get_pixel(15, 19), BOX_COLOR);
    }

    #[test]
    fn test_label_above_box() {
        let mut frame = RgbImage::new(200, 100);
        draw_label(&mut frame, rect(10, 50, 60, 40), "Alice", KNOWN_COLOR);

        let (mut min_y, mut max_y) = (u32::MAX, 0);
        for (_, y, p) in frame.enumerate_pixels() {
            if *p == KNOWN_COLOR {
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
        assert!(count(&frame, KNOWN_COLOR) > 0);
        assert!(max_y < 50);
        assert!(min_y >= 50 - 20);
    }

    #[test]
    fn test_label_moves_inside_box_at_top_edge() {
        let mut frame = RgbImage::new(200, 100);
        draw_label(&mut frame, rect(10, 2, 60, 40), "Unknown", UNKNOWN_COLOR);
        assert!(count(&frame, UNKNOWN_COLOR) > 0);
    }

    #[test]
    fn test_label_past_right_edge_does_not_panic() {
        let mut frame = RgbImage::new(30, 30);
        draw_label(&mut frame, rect(20, 25, 5, 5), "Bartholomew", KNOWN_COLOR);
    }
}

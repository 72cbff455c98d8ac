// THEORY:
// The `mask` module is the spatial layer underneath the `BlobDetector`. It turns
// a colour frame into a binary image ("mask") and then into a list of connected
// regions. Every function here is a stateless transform of one frame; none of
// them know about timestamps or previous frames.
//
// Pipeline steps, in the order the detector applies them:
// 1.  **Mask Building**: either an HSV band filter (colour mode) or a Gaussian
//     blur followed by a fixed luminance threshold (bright mode).
// 2.  **Morphology**: close (dilate → erode) merges the fragmented parts of one
//     drop, then open (erode → dilate) removes isolated speckle pixels that the
//     close would otherwise have preserved. The order matters.
// 3.  **Hole Filling**: background pixels that cannot reach the image border are
//     absorbed into the surrounding blob, so only the external outline counts.
// 4.  **Labeling**: 8-connected components, discovered in raster order.
//
// Masks are `GrayImage`s holding only 0 and 255.

use crate::core_modules::pixel::pixel::Pixel;
use image::{GrayImage, Luma, RgbaImage, imageops};
use std::collections::VecDeque;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// A relative pixel offset inside a structuring element.
pub type Offset = (i32, i32);

/// One connected foreground region of a mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Every pixel of the region (holes already filled), in BFS order from `pixels[0]`.
    pub pixels: Vec<(u32, u32)>,
    /// Pixels with at least one 4-neighbour outside the region or the image.
    pub boundary: Vec<(u32, u32)>,
}

impl Region {
    /// Enclosed area in pixels.
    pub fn area(&self) -> f64 {
        self.pixels.len() as f64
    }
}

/// Keeps pixels whose hue, HSV saturation and HSV value all fall inside their bands.
pub fn color_band_mask(
    frame: &RgbaImage,
    hue_range_deg: (f32, f32),
    saturation_range: (f32, f32),
    value_range: (f32, f32),
) -> GrayImage {
    let in_band = |value: f32, (low, high): (f32, f32)| value >= low && value <= high;
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let pixel = Pixel::from(frame.get_pixel(x, y));
        let keep = in_band(pixel.hue(), hue_range_deg)
            && in_band(pixel.saturation_hsv(), saturation_range)
            && in_band(pixel.value_hsv(), value_range);
        Luma([if keep { FOREGROUND } else { BACKGROUND }])
    })
}

/// Grayscale, Gaussian blur, then keep pixels strictly brighter than `threshold`.
pub fn bright_mask(frame: &RgbaImage, blur_sigma: f32, threshold: u8) -> GrayImage {
    let gray = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let luminance = Pixel::from(frame.get_pixel(x, y)).luminance();
        Luma([luminance.round().clamp(0.0, 255.0) as u8])
    });
    let blurred = if blur_sigma > 0.0 {
        imageops::blur(&gray, blur_sigma)
    } else {
        gray
    };
    let mut mask = blurred;
    for pixel in mask.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > threshold { FOREGROUND } else { BACKGROUND };
    }
    mask
}

/// Elliptical structuring element of `size × size`, as offsets from its centre.
///
/// Row half-widths follow `round(c * sqrt(1 - dy²/r²))`, so a 5×5 element is
/// a plus-shaped disc: single pixels on the top and bottom rows, full rows in
/// between.
pub fn elliptical_kernel(size: u32) -> Vec<Offset> {
    let size = size.max(1) as i32;
    let radius = size / 2;
    let center = size / 2;
    let mut offsets = Vec::new();
    for row in 0..size {
        let dy = row - radius;
        let half_width = if radius == 0 {
            0
        } else {
            let ratio = 1.0 - (dy * dy) as f64 / (radius * radius) as f64;
            (center as f64 * ratio.max(0.0).sqrt()).round() as i32
        };
        for dx in -half_width..=half_width {
            offsets.push((dx, dy));
        }
    }
    offsets
}

/// Foreground wherever any kernel neighbour is foreground. Out-of-image
/// neighbours count as background.
pub fn dilate(mask: &GrayImage, kernel: &[Offset]) -> GrayImage {
    apply_kernel(mask, kernel, |hits, _| hits > 0)
}

/// Foreground only where every in-image kernel neighbour is foreground.
/// Out-of-image neighbours are ignored, so blobs are not eaten from the border.
pub fn erode(mask: &GrayImage, kernel: &[Offset]) -> GrayImage {
    apply_kernel(mask, kernel, |hits, inside| hits == inside)
}

pub fn close(mask: &GrayImage, kernel: &[Offset]) -> GrayImage {
    erode(&dilate(mask, kernel), kernel)
}

pub fn open(mask: &GrayImage, kernel: &[Offset]) -> GrayImage {
    dilate(&erode(mask, kernel), kernel)
}

fn apply_kernel(
    mask: &GrayImage,
    kernel: &[Offset],
    keep: impl Fn(usize, usize) -> bool,
) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let mut inside = 0;
        let mut hits = 0;
        for &(dx, dy) in kernel {
            let nx = x as i64 + dx as i64;
            let ny = y as i64 + dy as i64;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            inside += 1;
            if mask.get_pixel(nx as u32, ny as u32).0[0] == FOREGROUND {
                hits += 1;
            }
        }
        Luma([if keep(hits, inside) { FOREGROUND } else { BACKGROUND }])
    })
}

/// Absorbs every background pixel that is not 4-connected to the image border.
pub fn fill_holes(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut outside = vec![false; (width * height) as usize];
    let mut queue: VecDeque<(u32, u32)> = VecDeque::new();
    let index = |x: u32, y: u32| (y * width + x) as usize;

    let seed = |x: u32, y: u32, outside: &mut [bool], queue: &mut VecDeque<(u32, u32)>| {
        if mask.get_pixel(x, y).0[0] == BACKGROUND && !outside[index(x, y)] {
            outside[index(x, y)] = true;
            queue.push_back((x, y));
        }
    };
    for x in 0..width {
        seed(x, 0, &mut outside, &mut queue);
        if height > 1 {
            seed(x, height - 1, &mut outside, &mut queue);
        }
    }
    for y in 0..height {
        seed(0, y, &mut outside, &mut queue);
        if width > 1 {
            seed(width - 1, y, &mut outside, &mut queue);
        }
    }

    while let Some((x, y)) = queue.pop_front() {
        for (nx, ny) in neighbours_4(x, y, width, height) {
            if mask.get_pixel(nx, ny).0[0] == BACKGROUND && !outside[index(nx, ny)] {
                outside[index(nx, ny)] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        if outside[index(x, y)] {
            Luma([BACKGROUND])
        } else {
            Luma([FOREGROUND])
        }
    })
}

/// Finds 8-connected foreground regions. Regions are returned in the raster
/// order of their first (top-most, then left-most) pixel.
pub fn label_regions(mask: &GrayImage) -> Vec<Region> {
    let (width, height) = mask.dimensions();
    let mut labels: Vec<Option<usize>> = vec![None; (width * height) as usize];
    let index = |x: u32, y: u32| (y * width + x) as usize;
    let mut regions = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if mask.get_pixel(x, y).0[0] != FOREGROUND || labels[index(x, y)].is_some() {
                continue;
            }

            let label = regions.len();
            let mut pixels = Vec::new();
            let mut queue = VecDeque::from([(x, y)]);
            labels[index(x, y)] = Some(label);

            while let Some((cx, cy)) = queue.pop_front() {
                pixels.push((cx, cy));
                for (nx, ny) in neighbours_8(cx, cy, width, height) {
                    if mask.get_pixel(nx, ny).0[0] == FOREGROUND && labels[index(nx, ny)].is_none()
                    {
                        labels[index(nx, ny)] = Some(label);
                        queue.push_back((nx, ny));
                    }
                }
            }

            let boundary = pixels
                .iter()
                .copied()
                .filter(|&(px, py)| {
                    px == 0
                        || py == 0
                        || px + 1 == width
                        || py + 1 == height
                        || neighbours_4(px, py, width, height)
                            .any(|(nx, ny)| labels[index(nx, ny)] != Some(label))
                })
                .collect();

            regions.push(Region { pixels, boundary });
        }
    }

    regions
}

fn neighbours_4(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    [(0i64, 1i64), (0, -1), (1, 0), (-1, 0)]
        .into_iter()
        .filter_map(move |(dx, dy)| offset_in_bounds(x, y, dx, dy, width, height))
}

fn neighbours_8(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    (-1i64..=1)
        .flat_map(|dy| (-1i64..=1).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx != 0 || dy != 0)
        .filter_map(move |(dx, dy)| offset_in_bounds(x, y, dx, dy, width, height))
}

fn offset_in_bounds(x: u32, y: u32, dx: i64, dy: i64, width: u32, height: u32) -> Option<(u32, u32)> {
    let nx = x as i64 + dx;
    let ny = y as i64 + dy;
    (nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64).then_some((nx as u32, ny as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> GrayImage {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        GrayImage::from_fn(width, height, |x, y| {
            let on = rows[y as usize].as_bytes()[x as usize] == b'#';
            Luma([if on { FOREGROUND } else { BACKGROUND }])
        })
    }

    fn count_foreground(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == FOREGROUND).count()
    }

    #[test]
    fn elliptical_kernel_5_is_plus_shaped_disc() {
        let kernel = elliptical_kernel(5);
        assert_eq!(kernel.len(), 1 + 5 + 5 + 5 + 1);
        assert!(kernel.contains(&(0, -2)));
        assert!(!kernel.contains(&(-1, -2)));
        assert!(kernel.contains(&(-2, 0)));
    }

    #[test]
    fn open_removes_isolated_speck() {
        let mask = mask_from_rows(&[
            "..........",
            "..........",
            "....#.....",
            "..........",
            "..........",
        ]);
        let kernel = elliptical_kernel(5);
        assert_eq!(count_foreground(&open(&mask, &kernel)), 0);
    }

    #[test]
    fn close_merges_split_blob() {
        let mask = mask_from_rows(&[
            "............",
            "..###.###...",
            "..###.###...",
            "..###.###...",
            "............",
        ]);
        let closed = close(&mask, &elliptical_kernel(3));
        assert_eq!(closed.get_pixel(5, 2).0[0], FOREGROUND);
        assert_eq!(label_regions(&closed).len(), 1);
    }

    #[test]
    fn fill_holes_absorbs_interior_background() {
        let mask = mask_from_rows(&[
            ".......",
            ".#####.",
            ".#...#.",
            ".#####.",
            ".......",
        ]);
        let filled = fill_holes(&mask);
        assert_eq!(filled.get_pixel(3, 2).0[0], FOREGROUND);
        assert_eq!(filled.get_pixel(0, 0).0[0], BACKGROUND);
        assert_eq!(count_foreground(&filled), 15);
    }

    #[test]
    fn labels_regions_in_raster_order_with_diagonal_connectivity() {
        let mask = mask_from_rows(&[
            "#....##",
            ".#...##",
            ".......",
            "...#...",
        ]);
        let regions = label_regions(&mask);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].pixels[0], (0, 0));
        assert_eq!(regions[0].pixels.len(), 2);
        assert_eq!(regions[1].pixels[0], (5, 0));
        assert_eq!(regions[1].area(), 4.0);
        assert_eq!(regions[2].pixels, vec![(3, 3)]);
    }

    #[test]
    fn bright_mask_thresholds_strictly() {
        let frame = RgbaImage::from_fn(4, 1, |x, _| {
            let v = [199, 200, 201, 255][x as usize];
            image::Rgba([v, v, v, 255])
        });
        let mask = bright_mask(&frame, 0.0, 200);
        let on: Vec<u8> = mask.pixels().map(|p| p.0[0]).collect();
        assert_eq!(on, vec![BACKGROUND, BACKGROUND, FOREGROUND, FOREGROUND]);
    }

    #[test]
    fn color_band_mask_keeps_only_blue() {
        let frame = RgbaImage::from_fn(3, 1, |x, _| match x {
            0 => image::Rgba([20, 60, 230, 255]),
            1 => image::Rgba([230, 40, 40, 255]),
            _ => image::Rgba([10, 10, 10, 255]),
        });
        let mask = color_band_mask(&frame, (180.0, 260.0), (0.39, 1.0), (0.39, 1.0));
        let on: Vec<u8> = mask.pixels().map(|p| p.0[0]).collect();
        assert_eq!(on, vec![FOREGROUND, BACKGROUND, BACKGROUND]);
    }
}

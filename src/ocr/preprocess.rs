use image::imageops::FilterType;
use image::{GrayImage, ImageBuffer, Luma, Rgba, RgbaImage};

/// Upscale factor applied before recognition. Nickname text is ~10px tall,
/// below what Tesseract reads reliably.
const UPSCALE: u32 = 3;

/// Mean brightness below which the region is treated as light text on a
/// dark background.
const DARK_BACKGROUND: f32 = 110.0;

/// Calculates the average brightness (luminance) of an image.
///
/// Uses the ITU-R BT.601 luma formula: Y = 0.299*R + 0.587*G + 0.114*B
/// Returns a value from 0.0 (black) to 255.0 (white).
pub fn calculate_brightness(img: &ImageBuffer<Rgba<u8>, Vec<u8>>) -> f32 {
    if img.width() == 0 || img.height() == 0 {
        return 0.0;
    }

    let mut total: f64 = 0.0;
    let pixel_count = (img.width() * img.height()) as f64;

    for pixel in img.pixels() {
        let r = pixel[0] as f64;
        let g = pixel[1] as f64;
        let b = pixel[2] as f64;
        total += 0.299 * r + 0.587 * g + 0.114 * b;
    }

    (total / pixel_count) as f32
}

/// Converts image to binary by keeping only bright pixels.
///
/// Pixels where R > threshold AND G > threshold AND B > threshold become black (text).
/// All other pixels become white (background).
pub fn threshold_bright_pixels(img: &RgbaImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if pixel[0] > threshold && pixel[1] > threshold && pixel[2] > threshold {
            0u8
        } else {
            255u8
        };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Prepares a nickname capture for Tesseract.
///
/// Upscales the region, then binarizes light-on-dark text (dark text ends up
/// on a white background either way, which is what Tesseract expects).
pub fn prepare_for_ocr(img: &RgbaImage) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return GrayImage::new(w, h);
    }

    let scaled = image::imageops::resize(img, w * UPSCALE, h * UPSCALE, FilterType::Lanczos3);
    let brightness = calculate_brightness(&scaled);

    if brightness < DARK_BACKGROUND {
        // Midpoint between the background and white
        let threshold = ((brightness + 255.0) / 2.0).clamp(60.0, 200.0) as u8;
        threshold_bright_pixels(&scaled, threshold)
    } else {
        image::imageops::grayscale(&scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_brightness() {
        let black: RgbaImage = ImageBuffer::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let white: RgbaImage = ImageBuffer::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        assert_eq!(calculate_brightness(&black), 0.0);
        assert!((calculate_brightness(&white) - 255.0).abs() < 0.01);
        assert_eq!(calculate_brightness(&RgbaImage::new(0, 0)), 0.0);
    }

    #[test]
    fn test_threshold_bright_pixels() {
        let mut img: RgbaImage = ImageBuffer::new(3, 1);
        img.put_pixel(0, 0, Rgba([100, 100, 100, 255]));
        img.put_pixel(1, 0, Rgba([250, 250, 250, 255]));
        img.put_pixel(2, 0, Rgba([250, 250, 100, 255]));

        let result = threshold_bright_pixels(&img, 190);

        assert_eq!(result.get_pixel(0, 0)[0], 255, "Dark pixel should become white");
        assert_eq!(result.get_pixel(1, 0)[0], 0, "Bright pixel should become black");
        assert_eq!(result.get_pixel(2, 0)[0], 255, "Partially dark pixel should become white");
    }

    #[test]
    fn test_prepare_for_ocr_upscales_and_inverts_dark_regions() {
        // Dark table felt with one bright text column
        let img: RgbaImage = ImageBuffer::from_fn(20, 10, |x, _| {
            if (8..12).contains(&x) {
                Rgba([240, 240, 240, 255])
            } else {
                Rgba([20, 30, 20, 255])
            }
        });

        let prepared = prepare_for_ocr(&img);
        assert_eq!(prepared.dimensions(), (60, 30));
        assert_eq!(prepared.get_pixel(0, 0)[0], 255, "Background should be white");
        assert_eq!(prepared.get_pixel(30, 15)[0], 0, "Text should be black");
    }
}

//! Screen region capture using GDI.
//!
//! Copies a rectangle of the desktop into a 32-bit DIB and converts it from
//! BGRA to RGBA. The table window must be visible on screen.

use anyhow::{anyhow, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use std::ffi::c_void;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};

/// Captures `width`x`height` pixels at screen position (`x`, `y`).
pub fn capture_screen_rect(x: i32, y: i32, width: i32, height: i32) -> Result<RgbaImage> {
    if width <= 0 || height <= 0 {
        return Err(anyhow!("Invalid capture size {}x{}", width, height));
    }

    let mut bgra: Vec<u8> = vec![0; (width * height * 4) as usize];

    unsafe {
        let screen_dc = GetDC(HWND::default());
        if screen_dc.is_invalid() {
            return Err(anyhow!("GetDC failed"));
        }
        let mem_dc = CreateCompatibleDC(screen_dc);
        let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
        let previous = SelectObject(mem_dc, bitmap);

        let blit = BitBlt(mem_dc, 0, 0, width, height, screen_dc, x, y, SRCCOPY);

        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                // Negative height = top-down rows
                biHeight: -height,
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let rows = GetDIBits(
            mem_dc,
            bitmap,
            0,
            height as u32,
            Some(bgra.as_mut_ptr() as *mut c_void),
            &mut info,
            DIB_RGB_COLORS,
        );

        SelectObject(mem_dc, previous);
        let _ = DeleteObject(bitmap);
        let _ = DeleteDC(mem_dc);
        ReleaseDC(HWND::default(), screen_dc);

        blit?;
        if rows == 0 {
            return Err(anyhow!("GetDIBits returned no rows"));
        }
    }

    // BGRA -> RGBA, forcing opaque alpha (GDI leaves it zero)
    for px in bgra.chunks_exact_mut(4) {
        px.swap(0, 2);
        px[3] = 255;
    }

    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width as u32, height as u32, bgra)
        .ok_or_else(|| anyhow!("Captured buffer has unexpected size"))
}

//! Window discovery and interaction for poker table windows.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::ffi::c_void;
use std::time::Duration;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT, TRUE, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetCursorPos, GetParent, GetWindowRect, GetWindowTextLengthW, GetWindowTextW,
    IsWindow, IsWindowVisible, PostMessageW, SetForegroundWindow, WindowFromPoint,
    WM_LBUTTONDOWN, WM_LBUTTONUP,
};

use super::{is_poker_table, CaptureRegion, SurfaceCapture, TableFinder, TableInfo, TableSurface};

/// MK_LBUTTON modifier flag for mouse messages.
const MK_LBUTTON: usize = 0x0001;

pub fn to_hwnd(surface: TableSurface) -> HWND {
    HWND(surface.0 as *mut c_void)
}

pub fn to_surface(hwnd: HWND) -> TableSurface {
    TableSurface(hwnd.0 as isize)
}

/// Returns the window title, or an empty string for untitled windows.
pub fn window_title(hwnd: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return String::new();
        }
        let mut buf: Vec<u16> = vec![0; (len + 1) as usize];
        let copied = GetWindowTextW(hwnd, &mut buf);
        String::from_utf16_lossy(&buf[..copied.max(0) as usize])
    }
}

/// Returns the window rectangle in screen coordinates.
pub fn window_rect(hwnd: HWND) -> Result<RECT> {
    let mut rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut rect)? };
    Ok(rect)
}

/// Returns true if the handle still refers to an existing window.
pub fn is_window_valid(hwnd: HWND) -> bool {
    unsafe { IsWindow(hwnd).as_bool() }
}

/// Enumerates visible top-level windows whose title matches `pattern`.
///
/// Results are sorted by title so sweeps visit tables in a stable order.
pub fn find_poker_tables(pattern: &Regex) -> Vec<TableInfo> {
    struct EnumData<'a> {
        pattern: &'a Regex,
        tables: Vec<TableInfo>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let data = &mut *(lparam.0 as *mut EnumData<'_>);

            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }

            let title = window_title(hwnd);
            if !title.is_empty() && is_poker_table(&title, data.pattern) {
                data.tables.push(TableInfo {
                    surface: to_surface(hwnd),
                    title,
                });
            }

            TRUE
        }
    }

    let mut data = EnumData {
        pattern,
        tables: Vec::new(),
    };
    unsafe {
        let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
    }

    data.tables.sort_by(|a, b| a.title.cmp(&b.title));
    log::debug!("Found {} table window(s)", data.tables.len());
    data.tables
}

/// Returns the table under the mouse cursor, checking the parent window too.
pub fn table_under_cursor(pattern: &Regex) -> Result<TableInfo> {
    let mut point = POINT::default();
    unsafe { GetCursorPos(&mut point)? };

    let hwnd = unsafe { WindowFromPoint(point) };
    if hwnd.0.is_null() {
        return Err(anyhow!("No window under cursor"));
    }

    let title = window_title(hwnd);
    if is_poker_table(&title, pattern) {
        return Ok(TableInfo {
            surface: to_surface(hwnd),
            title,
        });
    }

    if let Ok(parent) = unsafe { GetParent(hwnd) } {
        if !parent.0.is_null() {
            let parent_title = window_title(parent);
            if is_poker_table(&parent_title, pattern) {
                return Ok(TableInfo {
                    surface: to_surface(parent),
                    title: parent_title,
                });
            }
        }
    }

    Err(anyhow!("Window under cursor is not a poker table: \"{}\"", title))
}

/// Brings the window to the foreground.
pub fn focus_window(hwnd: HWND) {
    unsafe {
        let _ = SetForegroundWindow(hwnd);
    }
    std::thread::sleep(Duration::from_millis(100));
}

/// Clicks at window-relative pixel coordinates without moving the cursor.
///
/// Sends WM_LBUTTONDOWN/UP straight to the window.
pub fn post_click(hwnd: HWND, x: i32, y: i32) -> Result<()> {
    // Pack coordinates into LPARAM: low word = x, high word = y
    let lparam = LPARAM((((y as u32) << 16) | (x as u32 & 0xFFFF)) as isize);

    unsafe {
        PostMessageW(hwnd, WM_LBUTTONDOWN, WPARAM(MK_LBUTTON), lparam)?;
        std::thread::sleep(Duration::from_millis(50));
        PostMessageW(hwnd, WM_LBUTTONUP, WPARAM(0), lparam)?;
    }
    std::thread::sleep(Duration::from_millis(100));
    Ok(())
}

/// Live Windows backend: GDI region capture, posted clicks, title-based discovery.
pub struct WindowsCapture {
    title_pattern: Regex,
}

impl WindowsCapture {
    pub fn new(title_pattern: Regex) -> Self {
        Self { title_pattern }
    }
}

impl SurfaceCapture for WindowsCapture {
    fn capture(&self, surface: TableSurface, region: &CaptureRegion) -> Result<image::RgbaImage> {
        let hwnd = to_hwnd(surface);
        if !is_window_valid(hwnd) {
            return Err(anyhow!("Window {} no longer exists", surface));
        }
        let rect = window_rect(hwnd)?;
        super::region::capture_screen_rect(
            rect.left + region.x,
            rect.top + region.y,
            region.width,
            region.height,
        )
    }

    fn reveal(&self, surface: TableSurface, region: &CaptureRegion) -> Result<()> {
        let hwnd = to_hwnd(surface);
        focus_window(hwnd);
        let (x, y) = region.click_point();
        post_click(hwnd, x, y)
    }
}

impl TableFinder for WindowsCapture {
    fn find_tables(&self) -> Result<Vec<TableInfo>> {
        Ok(find_poker_tables(&self.title_pattern))
    }
}

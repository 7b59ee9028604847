//! Clipboard delivery, optionally pasted into the table chat box.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use windows::Win32::Foundation::{GlobalFree, HANDLE, HWND};
use windows::Win32::System::DataExchange::{
    CloseClipboard, EmptyClipboard, OpenClipboard, SetClipboardData,
};
use windows::Win32::System::Memory::{GlobalAlloc, GlobalLock, GlobalUnlock, GMEM_MOVEABLE};
use windows::Win32::System::Ole::CF_UNICODETEXT;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
    VIRTUAL_KEY, VK_CONTROL, VK_RETURN,
};

use super::OutputSink;
use crate::capture::window::{focus_window, is_window_valid, to_hwnd};
use crate::capture::TableSurface;

const VK_V: VIRTUAL_KEY = VIRTUAL_KEY(0x56);

/// Copies the payload to the clipboard and, when `paste` is set, pastes it
/// into the focused table with Ctrl+V followed by Enter.
pub struct ClipboardPasteSink {
    paste: bool,
}

impl ClipboardPasteSink {
    pub fn new(paste: bool) -> Self {
        Self { paste }
    }
}

impl OutputSink for ClipboardPasteSink {
    fn deliver(&self, surface: TableSurface, text: &str) -> Result<()> {
        set_clipboard_text(text)?;
        log::info!("Analysis copied to clipboard ({} chars)", text.chars().count());

        if !self.paste {
            return Ok(());
        }

        let hwnd = to_hwnd(surface);
        if !is_window_valid(hwnd) {
            return Err(anyhow!("Table {} closed before paste", surface));
        }
        focus_window(hwnd);
        send_keys(&[
            key(VK_CONTROL, false),
            key(VK_V, false),
            key(VK_V, true),
            key(VK_CONTROL, true),
        ])?;
        std::thread::sleep(Duration::from_millis(100));
        send_keys(&[key(VK_RETURN, false), key(VK_RETURN, true)])?;

        log::info!("Analysis pasted into table {}", surface);
        Ok(())
    }
}

/// Replaces the clipboard contents with `text` as CF_UNICODETEXT.
pub fn set_clipboard_text(text: &str) -> Result<()> {
    let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
    let bytes = wide.len() * std::mem::size_of::<u16>();

    unsafe {
        OpenClipboard(HWND::default()).context("OpenClipboard failed")?;

        let result = (|| -> Result<()> {
            EmptyClipboard().context("EmptyClipboard failed")?;

            let hmem = GlobalAlloc(GMEM_MOVEABLE, bytes).context("GlobalAlloc failed")?;
            let ptr = GlobalLock(hmem) as *mut u16;
            if ptr.is_null() {
                let _ = GlobalFree(hmem);
                return Err(anyhow!("GlobalLock failed"));
            }
            std::ptr::copy_nonoverlapping(wide.as_ptr(), ptr, wide.len());
            let _ = GlobalUnlock(hmem);

            // The clipboard owns the memory once SetClipboardData succeeds
            if let Err(e) = SetClipboardData(CF_UNICODETEXT.0 as u32, HANDLE(hmem.0)) {
                let _ = GlobalFree(hmem);
                return Err(anyhow!("SetClipboardData failed: {}", e));
            }
            Ok(())
        })();

        let _ = CloseClipboard();
        result
    }
}

fn key(vk: VIRTUAL_KEY, up: bool) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                dwFlags: if up { KEYEVENTF_KEYUP } else { KEYBD_EVENT_FLAGS(0) },
                ..Default::default()
            },
        },
    }
}

fn send_keys(inputs: &[INPUT]) -> Result<()> {
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(anyhow!("SendInput sent {} of {} inputs", sent, inputs.len()));
    }
    Ok(())
}

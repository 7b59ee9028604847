//! Global hotkeys.
//!
//! Hotkeys are registered on the calling thread (no window), so `WM_HOTKEY`
//! arrives in that thread's message queue.

use anyhow::{Context, Result};

use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_ALT, MOD_CONTROL, MOD_NOREPEAT,
    MOD_SHIFT,
};
use windows::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, WM_HOTKEY};

const VK_C: u32 = 0x43;
const VK_Q: u32 = 0x51;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HotkeyAction {
    /// Analyze the table under the cursor
    Analyze,
    /// Same, ignoring the nickname cache
    AnalyzeFresh,
    /// Forget every cached nickname
    ClearCache,
    /// Leave the hotkey loop
    Exit,
}

#[derive(Clone, Copy, Debug)]
pub struct Hotkey {
    pub modifiers: HOT_KEY_MODIFIERS,
    pub vk: u32,
    pub action: HotkeyAction,
    pub label: &'static str,
}

/// Alt+Q analyze, Alt+Shift+Q analyze fresh, Alt+Shift+C clear the nickname
/// cache, Ctrl+Alt+Q exit.
pub fn listen_bindings() -> Vec<Hotkey> {
    vec![
        Hotkey {
            modifiers: MOD_ALT | MOD_NOREPEAT,
            vk: VK_Q,
            action: HotkeyAction::Analyze,
            label: "Alt+Q",
        },
        Hotkey {
            modifiers: MOD_ALT | MOD_SHIFT | MOD_NOREPEAT,
            vk: VK_Q,
            action: HotkeyAction::AnalyzeFresh,
            label: "Alt+Shift+Q",
        },
        Hotkey {
            modifiers: MOD_ALT | MOD_SHIFT | MOD_NOREPEAT,
            vk: VK_C,
            action: HotkeyAction::ClearCache,
            label: "Alt+Shift+C",
        },
        Hotkey {
            modifiers: MOD_CONTROL | MOD_ALT | MOD_NOREPEAT,
            vk: VK_Q,
            action: HotkeyAction::Exit,
            label: "Ctrl+Alt+Q",
        },
    ]
}

/// Ctrl+Q stops a running sweep.
pub fn sweep_bindings() -> Vec<Hotkey> {
    vec![Hotkey {
        modifiers: MOD_CONTROL | MOD_NOREPEAT,
        vk: VK_Q,
        action: HotkeyAction::Exit,
        label: "Ctrl+Q",
    }]
}

/// Registers `bindings` and dispatches presses to `handler` until an `Exit`
/// binding is pressed or the message loop ends.
pub fn run_hotkey_loop<F>(bindings: &[Hotkey], mut handler: F) -> Result<()>
where
    F: FnMut(HotkeyAction),
{
    for (id, binding) in bindings.iter().enumerate() {
        unsafe {
            RegisterHotKey(HWND::default(), id as i32 + 1, binding.modifiers, binding.vk)
                .with_context(|| format!("Failed to register hotkey {}", binding.label))?;
        }
        log::info!("Hotkey: {} ({:?})", binding.label, binding.action);
    }

    let mut msg = MSG::default();
    unsafe {
        while GetMessageW(&mut msg, HWND::default(), 0, 0).as_bool() {
            if msg.message != WM_HOTKEY {
                continue;
            }
            let id = msg.wParam.0;
            let Some(binding) = id.checked_sub(1).and_then(|i| bindings.get(i)) else {
                continue;
            };
            if binding.action == HotkeyAction::Exit {
                log::info!("{} pressed, exiting", binding.label);
                break;
            }
            handler(binding.action);
        }

        for id in 0..bindings.len() {
            let _ = UnregisterHotKey(HWND::default(), id as i32 + 1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_bindings_are_distinct() {
        let bindings = listen_bindings();
        for (i, a) in bindings.iter().enumerate() {
            for b in &bindings[i + 1..] {
                assert!(a.modifiers != b.modifiers || a.vk != b.vk, "{} vs {}", a.label, b.label);
                assert_ne!(a.action, b.action);
            }
        }
        assert!(bindings.iter().any(|b| b.action == HotkeyAction::ClearCache));
        assert!(bindings.iter().any(|b| b.action == HotkeyAction::Exit));
    }
}

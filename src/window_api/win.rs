use std::ffi::c_void;

use anyhow::{anyhow, Result};
use tracing::error;
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{GetLastError, HWND},
        System::{
            Diagnostics::Debug::{
                FormatMessageW, FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS,
            },
            SystemServices::{LANG_ENGLISH, SUBLANG_ENGLISH_US},
        },
        UI::WindowsAndMessaging::{
            GetClassNameW, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
        },
    },
};

use super::{WindowHandle, WindowSystem};

pub(crate) fn to_hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as usize as *mut c_void)
}

pub(crate) fn from_hwnd(window: HWND) -> WindowHandle {
    WindowHandle(window.0 as usize as u64)
}

fn last_error_message() -> String {
    let err = unsafe { GetLastError() };
    let mut message_buffer = [0u16; 2048];
    let size = unsafe {
        FormatMessageW(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            None,
            err.0,
            LANG_ENGLISH | (SUBLANG_ENGLISH_US << 10),
            PWSTR::from_raw(message_buffer.as_mut_ptr()),
            2048,
            None,
        )
    };
    if size == 0 {
        format!("error code {}", err.0)
    } else {
        String::from_utf16_lossy(&message_buffer[0..size as usize])
            .trim_end()
            .to_string()
    }
}

#[tracing::instrument]
fn get_foreground() -> Option<WindowHandle> {
    let window = unsafe { GetForegroundWindow() };
    if window.is_invalid() {
        return None;
    }
    Some(from_hwnd(window))
}

fn get_window_title(window: HWND) -> String {
    let mut text = [0u16; 4096];
    let len = unsafe { GetWindowTextW(window, &mut text) };
    String::from_utf16_lossy(&text[..len.max(0) as usize])
}

fn get_window_class(window: HWND) -> Result<String> {
    let mut text = [0u16; 256];
    let len = unsafe { GetClassNameW(window, &mut text) };
    if len == 0 {
        return Err(anyhow!("Failed to get window class {}", last_error_message()));
    }
    Ok(String::from_utf16_lossy(&text[..len as usize]))
}

fn get_window_process(window: HWND) -> Result<u32> {
    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        return Err(anyhow!("Failed to get window process {}", last_error_message()));
    }
    Ok(id)
}

pub struct Win32WindowSystem {}

impl Win32WindowSystem {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for Win32WindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowSystem for Win32WindowSystem {
    fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        Ok(get_foreground())
    }

    fn title(&self, window: WindowHandle) -> Result<String> {
        Ok(get_window_title(to_hwnd(window)))
    }

    fn class_name(&self, window: WindowHandle) -> Result<String> {
        get_window_class(to_hwnd(window)).inspect_err(|e| error!("Failed to get class {e:?}"))
    }

    fn process_id(&self, window: WindowHandle) -> Result<u32> {
        get_window_process(to_hwnd(window)).inspect_err(|e| error!("Failed to get pid {e:?}"))
    }
}

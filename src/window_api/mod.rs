//! Contains logic for querying windows in different environments.
//! [GenericWindowSystem] is the main artifact of this module that abstracts
//! the operations.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::fmt::Display;

use anyhow::Result;

/// Opaque identifier of a top level window. On Windows this is the HWND value, on X11 the window
/// id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u64);

impl Display for WindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowSystem: Send + Sync {
    /// Currently focused top level window. `None` when nothing has focus, for example while the
    /// lock screen is shown.
    fn foreground_window(&self) -> Result<Option<WindowHandle>>;

    fn title(&self, window: WindowHandle) -> Result<String>;

    /// Window class name. `WM_CLASS` on X11.
    fn class_name(&self, window: WindowHandle) -> Result<String>;

    fn process_id(&self, window: WindowHandle) -> Result<u32>;
}

/// Serves as a cross-compatible WindowSystem implementation.
pub struct GenericWindowSystem {
    inner: Box<dyn WindowSystem>,
}

impl GenericWindowSystem {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::Win32WindowSystem;
                Ok(Self {
                    inner: Box::new(Win32WindowSystem::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11WindowSystem;
                Ok(Self {
                    inner: Box::new(X11WindowSystem::new()?),
                })
            }
            else {
                // Allows the project to be compiled and tested without any platform enabled.
                Err(anyhow::anyhow!(
                    "No window system was enabled. Build with the `win` or `x11` feature"
                ))
            }
        }
    }
}

impl WindowSystem for GenericWindowSystem {
    fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        self.inner.foreground_window()
    }

    fn title(&self, window: WindowHandle) -> Result<String> {
        self.inner.title(window)
    }

    fn class_name(&self, window: WindowHandle) -> Result<String> {
        self.inner.class_name(window)
    }

    fn process_id(&self, window: WindowHandle) -> Result<u32> {
        self.inner.process_id(window)
    }
}

use anyhow::{anyhow, Result};
use tracing::instrument;
use xcb::{
    x::{self, Atom, GetProperty, InternAtom, Window, ATOM_ANY},
    Connection, Xid, XidNew,
};

use super::{WindowHandle, WindowSystem};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_property(
    conn: &Connection,
    window: Window,
    property: Atom,
    long_length: u32,
) -> Result<x::GetPropertyReply> {
    Ok(conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length,
    }))?)
}

fn to_window(window: WindowHandle) -> Window {
    // X11 ids are 32 bit, handles produced by this module always fit.
    unsafe { Window::new(window.0 as u32) }
}

pub struct X11WindowSystem {
    connection: Connection,
    preferred_screen: usize,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
}

impl X11WindowSystem {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            // Currently the application only supports 1 x11 screen.
            preferred_screen: preferred_screen.max(0) as usize,
            active_window_atom,
            window_name_atom,
            pid_atom,
        })
    }

    fn root(&self) -> Result<Window> {
        self.connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen)
            .map(|screen| screen.root())
            .ok_or_else(|| anyhow!("Screen {} is not available", self.preferred_screen))
    }
}

impl WindowSystem for X11WindowSystem {
    #[instrument(skip(self))]
    fn foreground_window(&self) -> Result<Option<WindowHandle>> {
        let reply = get_property(&self.connection, self.root()?, self.active_window_atom, 1)?;
        let active = reply.value::<Window>().first().copied();
        Ok(active
            .filter(|window| !window.is_none())
            .map(|window| WindowHandle(window.resource_id() as u64)))
    }

    #[instrument(skip(self))]
    fn title(&self, window: WindowHandle) -> Result<String> {
        let reply = get_property(&self.connection, to_window(window), self.window_name_atom, 1024)?;
        Ok(String::from_utf8_lossy(reply.value::<u8>()).into_owned())
    }

    #[instrument(skip(self))]
    fn class_name(&self, window: WindowHandle) -> Result<String> {
        let reply = get_property(&self.connection, to_window(window), x::ATOM_WM_CLASS, 256)?;
        // WM_CLASS holds "instance\0class\0"; the class part identifies the application.
        let raw = String::from_utf8_lossy(reply.value::<u8>()).into_owned();
        let mut parts = raw.split('\0').filter(|v| !v.is_empty());
        let instance = parts.next().unwrap_or_default().to_string();
        Ok(parts.next().map(str::to_string).unwrap_or(instance))
    }

    #[instrument(skip(self))]
    fn process_id(&self, window: WindowHandle) -> Result<u32> {
        let reply = get_property(&self.connection, to_window(window), self.pid_atom, 1)?;
        reply
            .value::<u32>()
            .first()
            .copied()
            .ok_or_else(|| anyhow!("Window {window} has no _NET_WM_PID"))
    }
}

//! COM late binding through `IDispatch`. Only the handful of properties needed to find the
//! active document or folder are read, so no type libraries are involved.

use anyhow::{anyhow, Context, Result};
use tracing::{debug, instrument};
use windows::{
    core::{IUnknown, Interface, GUID, HSTRING, PCWSTR, VARIANT},
    Win32::System::{
        Com::{
            CLSIDFromProgID, CoCreateInstance, CoInitializeEx, IDispatch, CLSCTX_LOCAL_SERVER,
            COINIT_MULTITHREADED, CLSCTX_ALL, DISPATCH_FLAGS, DISPATCH_METHOD, DISPATCH_PROPERTYGET,
            DISPPARAMS,
        },
        Ole::GetActiveObject,
    },
};

use crate::window_api::WindowHandle;

use super::{AutomationBackend, AutomationSession};

const LOCALE_USER_DEFAULT: u32 = 0x0400;

fn ensure_com_initialized() {
    // S_FALSE and RPC_E_CHANGED_MODE both mean COM is already usable on this thread.
    let _ = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) };
}

struct Dispatch(IDispatch);

impl Dispatch {
    fn invoke(&self, name: &str, flags: DISPATCH_FLAGS, args: &mut [VARIANT]) -> Result<VARIANT> {
        let wide = HSTRING::from(name);
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0i32;
        unsafe {
            self.0.GetIDsOfNames(
                &GUID::zeroed(),
                names.as_ptr(),
                1,
                LOCALE_USER_DEFAULT,
                &mut dispid,
            )
        }
        .with_context(|| format!("Unknown member {name}"))?;

        // Arguments are passed right to left.
        args.reverse();
        let params = DISPPARAMS {
            rgvarg: args.as_mut_ptr(),
            rgdispidNamedArgs: std::ptr::null_mut(),
            cArgs: args.len() as u32,
            cNamedArgs: 0,
        };
        let mut result = VARIANT::default();
        unsafe {
            self.0.Invoke(
                dispid,
                &GUID::zeroed(),
                LOCALE_USER_DEFAULT,
                flags,
                &params,
                Some(&mut result),
                None,
                None,
            )
        }
        .with_context(|| format!("Failed to invoke {name}"))?;
        Ok(result)
    }

    fn get(&self, name: &str) -> Result<VARIANT> {
        self.invoke(name, DISPATCH_PROPERTYGET, &mut [])
    }

    fn get_object(&self, name: &str) -> Result<Dispatch> {
        to_dispatch(&self.get(name)?).with_context(|| format!("{name} is not an object"))
    }

    fn call(&self, name: &str, args: &mut [VARIANT]) -> Result<VARIANT> {
        self.invoke(name, DISPATCH_METHOD | DISPATCH_PROPERTYGET, args)
    }
}

fn to_dispatch(value: &VARIANT) -> Result<Dispatch> {
    let unknown = IUnknown::try_from(value)?;
    Ok(Dispatch(unknown.cast::<IDispatch>()?))
}

fn to_string(value: &VARIANT) -> Option<String> {
    let text = value.to_string();
    (!text.is_empty()).then_some(text)
}

/// Session attached to a running application object.
pub struct ComSession {
    application: Dispatch,
}

// The object lives in the multithreaded apartment, so its proxy may be used from any thread.
unsafe impl Send for ComSession {}

impl AutomationSession for ComSession {
    fn active_document_path(&self, property: &str) -> Result<Option<String>> {
        let document = match self.application.get_object(property) {
            Ok(v) => v,
            // No open document is reported as a null object.
            Err(e) => {
                debug!("{property} is not available {e:?}");
                return Ok(None);
            }
        };
        Ok(to_string(&document.get("FullName")?))
    }
}

pub struct ComAutomation {}

impl ComAutomation {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for ComAutomation {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomationBackend for ComAutomation {
    #[instrument(skip(self))]
    fn connect(&self, automation_id: &str) -> Result<Box<dyn AutomationSession>> {
        ensure_com_initialized();
        let clsid = unsafe { CLSIDFromProgID(&HSTRING::from(automation_id)) }
            .with_context(|| format!("Unknown automation id {automation_id}"))?;
        let mut unknown: Option<IUnknown> = None;
        unsafe { GetActiveObject(&clsid, None, &mut unknown) }
            .with_context(|| format!("{automation_id} is not running"))?;
        let unknown = unknown.ok_or_else(|| anyhow!("{automation_id} returned no object"))?;
        Ok(Box::new(ComSession {
            application: Dispatch(unknown.cast::<IDispatch>()?),
        }))
    }

    #[instrument(skip(self))]
    fn shell_folder(&self, window: WindowHandle) -> Result<Option<String>> {
        ensure_com_initialized();
        let clsid = unsafe { CLSIDFromProgID(&HSTRING::from("Shell.Application")) }?;
        let shell: IDispatch = unsafe { CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER) }
            .or_else(|_| unsafe {
                CoCreateInstance(&clsid, None, CLSCTX_ALL)
            })?;
        let shell = Dispatch(shell);
        let windows = to_dispatch(&shell.call("Windows", &mut [])?)?;
        let count = i32::try_from(&windows.get("Count")?)?;

        for index in 0..count {
            let Ok(item) = windows
                .call("Item", &mut [VARIANT::from(index)])
                .and_then(|v| to_dispatch(&v))
            else {
                continue;
            };
            let Ok(hwnd) = item.get("HWND").and_then(|v| Ok(i64::try_from(&v)?)) else {
                continue;
            };
            if hwnd as u64 != window.0 {
                continue;
            }
            let path = item
                .get_object("Document")
                .and_then(|v| v.get_object("Folder"))
                .and_then(|v| v.get_object("Self"))
                .and_then(|v| v.get("Path"))?;
            return Ok(to_string(&path));
        }
        Ok(None)
    }
}

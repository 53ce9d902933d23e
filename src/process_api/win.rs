//! Open file enumeration through the system handle table. Every handle owned by the process is
//! duplicated into this process, and disk files are resolved to their final path.

use std::{ffi::c_void, mem::size_of, path::PathBuf, ptr::addr_of};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, instrument};
use windows::{
    Wdk::System::SystemInformation::{NtQuerySystemInformation, SYSTEM_INFORMATION_CLASS},
    Win32::{
        Foundation::{
            CloseHandle, DuplicateHandle, DUPLICATE_SAME_ACCESS, HANDLE,
            STATUS_INFO_LENGTH_MISMATCH,
        },
        Storage::FileSystem::{
            GetFileType, GetFinalPathNameByHandleW, FILE_NAME_NORMALIZED, FILE_TYPE_DISK,
        },
        System::Threading::{GetCurrentProcess, OpenProcess, PROCESS_DUP_HANDLE},
    },
};

const SYSTEM_EXTENDED_HANDLE_INFORMATION: SYSTEM_INFORMATION_CLASS = SYSTEM_INFORMATION_CLASS(64);

const MAX_QUERY_ATTEMPTS: usize = 8;

/// Access masks of synchronous pipe handles. Resolving their names may block forever.
const BLOCKING_ACCESS_MASKS: [u32; 4] = [0x0012_019f, 0x001a_019f, 0x0012_0189, 0x0010_0000];

#[allow(dead_code)]
#[repr(C)]
struct HandleEntry {
    object: *mut c_void,
    unique_process_id: usize,
    handle_value: usize,
    granted_access: u32,
    creator_back_trace_index: u16,
    object_type_index: u16,
    handle_attributes: u32,
    reserved: u32,
}

#[allow(dead_code)]
#[repr(C)]
struct HandleTable {
    number_of_handles: usize,
    reserved: usize,
    handles: [HandleEntry; 1],
}

/// Closes the wrapped handle on drop.
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

/// Snapshot of the system handle table. `usize` storage keeps the table aligned.
fn query_handle_table() -> Result<Vec<usize>> {
    let mut buffer = vec![0usize; 64 * 1024];
    for _ in 0..MAX_QUERY_ATTEMPTS {
        let byte_len = u32::try_from(buffer.len() * size_of::<usize>())?;
        let mut needed = 0u32;
        let status = unsafe {
            NtQuerySystemInformation(
                SYSTEM_EXTENDED_HANDLE_INFORMATION,
                buffer.as_mut_ptr().cast(),
                byte_len,
                &mut needed,
            )
        };
        if status == STATUS_INFO_LENGTH_MISMATCH {
            // The table grows between calls, leave some headroom.
            let words = (needed as usize).div_ceil(size_of::<usize>());
            buffer.resize(words.max(buffer.len() * 2) + words / 4, 0);
            continue;
        }
        status.ok().context("Failed to query the handle table")?;
        return Ok(buffer);
    }
    Err(anyhow!("Handle table kept growing after {MAX_QUERY_ATTEMPTS} attempts"))
}

fn handle_entries(buffer: &[usize]) -> Result<&[HandleEntry]> {
    let table = buffer.as_ptr() as *const HandleTable;
    let count = unsafe { (*table).number_of_handles };
    let header = 2 * size_of::<usize>();
    let available =
        (buffer.len() * size_of::<usize>()).saturating_sub(header) / size_of::<HandleEntry>();
    if count > available {
        return Err(anyhow!("Handle table reports {count} entries but holds {available}"));
    }
    Ok(unsafe {
        std::slice::from_raw_parts(addr_of!((*table).handles) as *const HandleEntry, count)
    })
}

fn final_path(handle: HANDLE) -> Option<PathBuf> {
    if unsafe { GetFileType(handle) } != FILE_TYPE_DISK {
        return None;
    }
    let mut text = [0u16; 1024];
    let len =
        unsafe { GetFinalPathNameByHandleW(handle, &mut text, FILE_NAME_NORMALIZED) } as usize;
    if len == 0 || len >= text.len() {
        return None;
    }
    let path = String::from_utf16_lossy(&text[..len]);
    Some(PathBuf::from(path.strip_prefix(r"\\?\").unwrap_or(&path)))
}

#[instrument]
pub fn open_files(pid: u32) -> Result<Vec<PathBuf>> {
    let process = unsafe { OpenProcess(PROCESS_DUP_HANDLE, false, pid) }
        .map(OwnedHandle)
        .with_context(|| format!("Failed to open process {pid}"))?;
    let buffer = query_handle_table()?;
    let current = unsafe { GetCurrentProcess() };

    let mut files = vec![];
    for entry in handle_entries(&buffer)? {
        if entry.unique_process_id != pid as usize
            || BLOCKING_ACCESS_MASKS.contains(&entry.granted_access)
        {
            continue;
        }
        let mut duplicate = HANDLE::default();
        let duplicated = unsafe {
            DuplicateHandle(
                process.0,
                HANDLE(entry.handle_value as *mut c_void),
                current,
                &mut duplicate,
                0,
                false,
                DUPLICATE_SAME_ACCESS,
            )
        };
        if duplicated.is_err() {
            continue;
        }
        let duplicate = OwnedHandle(duplicate);
        if let Some(path) = final_path(duplicate.0) {
            files.push(path);
        }
    }
    debug!("Process {pid} holds {} files", files.len());
    Ok(files)
}

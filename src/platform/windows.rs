use std::{ffi::OsString, os::windows::prelude::*, path::Path};

use chrono::{DateTime, Utc};
use log::error;
use windows::Win32::{
    Foundation::{CloseHandle, FALSE, HINSTANCE, HWND},
    System::{
        ProcessStatus::GetModuleFileNameExW,
        Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ},
    },
    UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId},
};

use super::{UsageEvent, UsageEventKind, UsageEventSource};
use crate::error::SamplerError;

/// Reports the executable that owns the foreground window.
pub struct WindowsForegroundSource;

impl UsageEventSource for WindowsForegroundSource {
    fn query_events(
        &mut self,
        _begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, SamplerError> {
        let window = unsafe { GetForegroundWindow() };
        if window.0.is_null() {
            return Ok(Vec::new());
        }

        let path = get_process_path(window).map_err(|()| {
            SamplerError::Unavailable("unable to resolve foreground process".to_owned())
        })?;
        let app_id = Path::new(&path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Unknown")
            .to_string();

        Ok(vec![UsageEvent {
            app_id,
            kind: UsageEventKind::MoveToForeground,
            at: end,
        }])
    }
}

fn get_process_path(window: HWND) -> Result<String, ()> {
    let mut process_id = 0;
    unsafe { GetWindowThreadProcessId(window, Some(&mut process_id)) };

    let handle = unsafe {
        OpenProcess(
            PROCESS_QUERY_INFORMATION | PROCESS_VM_READ,
            FALSE,
            process_id,
        )
    }
    .map_err(|e| {
        error!("OpenProcess failed: {:?}", e);
    })?;
    let mut buffer = [0u16; 260];
    let len = unsafe { GetModuleFileNameExW(handle, HINSTANCE::default(), &mut buffer) };
    unsafe {
        if CloseHandle(handle).is_err() {
            error!("Unable to close the process handle")
        }
    };

    if len == 0 {
        error!("GetModuleFileNameExW failed");
        return Err(());
    }

    Ok(OsString::from_wide(&buffer[..len as usize])
        .to_string_lossy()
        .into_owned())
}

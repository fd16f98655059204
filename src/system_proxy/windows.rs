//! Windows backend: per-user WinINet proxy settings.
//!
//! Writes `ProxyServer`, `ProxyEnable` and `ProxyOverride` under
//! `HKCU\Software\Microsoft\Windows\CurrentVersion\Internet Settings`, then
//! tells WinINet to reload so running applications pick the change up.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr::{null, null_mut};

use windows_sys::Win32::Foundation::ERROR_SUCCESS;
use windows_sys::Win32::Networking::WinInet::InternetSetOptionW;
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegOpenKeyExW, RegSetValueExW, HKEY, HKEY_CURRENT_USER, KEY_SET_VALUE, REG_DWORD,
    REG_SZ,
};

use super::{proxy_server_string, SystemProxy, SystemProxyError};

const INTERNET_SETTINGS: &str = r"Software\Microsoft\Windows\CurrentVersion\Internet Settings";
const INTERNET_OPTION_REFRESH: u32 = 37;
const INTERNET_OPTION_SETTINGS_CHANGED: u32 = 39;

/// Registry-backed system proxy for the current user.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsProxy;

impl SystemProxy for WindowsProxy {
    fn enable(&self, host: &str, port: u16) -> Result<(), SystemProxyError> {
        let key = SettingsKey::open()?;
        key.set_string("ProxyServer", &proxy_server_string(host, port))?;
        key.set_dword("ProxyEnable", 1)?;
        key.set_string("ProxyOverride", "<local>")?;
        drop(key);
        notify_settings_changed();
        Ok(())
    }

    fn disable(&self) -> Result<(), SystemProxyError> {
        let key = SettingsKey::open()?;
        key.set_dword("ProxyEnable", 0)?;
        drop(key);
        notify_settings_changed();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "windows-registry"
    }
}

/// Open handle to the Internet Settings key, closed on drop.
struct SettingsKey(HKEY);

impl SettingsKey {
    fn open() -> Result<Self, SystemProxyError> {
        let path = wide(INTERNET_SETTINGS);
        let mut key: HKEY = null_mut();
        // SAFETY: `path` is NUL-terminated and outlives the call; `key` is a
        // valid out pointer.
        let status = unsafe { RegOpenKeyExW(HKEY_CURRENT_USER, path.as_ptr(), 0, KEY_SET_VALUE, &mut key) };
        if status != ERROR_SUCCESS {
            return Err(SystemProxyError::Os(format!(
                "RegOpenKeyExW failed with error {}",
                status
            )));
        }
        Ok(Self(key))
    }

    fn set_string(&self, name: &str, value: &str) -> Result<(), SystemProxyError> {
        let data = wide(value);
        let bytes = (data.len() * std::mem::size_of::<u16>()) as u32;
        self.set(name, REG_SZ, data.as_ptr() as *const u8, bytes)
    }

    fn set_dword(&self, name: &str, value: u32) -> Result<(), SystemProxyError> {
        let data = value.to_le_bytes();
        self.set(name, REG_DWORD, data.as_ptr(), data.len() as u32)
    }

    fn set(&self, name: &str, kind: u32, data: *const u8, len: u32) -> Result<(), SystemProxyError> {
        let name_w = wide(name);
        // SAFETY: the key is open, `name_w` is NUL-terminated and `data`
        // points at `len` readable bytes owned by the caller.
        let status = unsafe { RegSetValueExW(self.0, name_w.as_ptr(), 0, kind, data, len) };
        if status != ERROR_SUCCESS {
            return Err(SystemProxyError::Os(format!(
                "RegSetValueExW({}) failed with error {}",
                name, status
            )));
        }
        Ok(())
    }
}

impl Drop for SettingsKey {
    fn drop(&mut self) {
        // SAFETY: the handle came from a successful RegOpenKeyExW.
        unsafe {
            RegCloseKey(self.0);
        }
    }
}

fn notify_settings_changed() {
    // SAFETY: both options take no buffer.
    let ok = unsafe {
        InternetSetOptionW(null(), INTERNET_OPTION_SETTINGS_CHANGED, null(), 0) != 0
            && InternetSetOptionW(null(), INTERNET_OPTION_REFRESH, null(), 0) != 0
    };
    if !ok {
        tracing::warn!("WinINet did not acknowledge the proxy settings refresh");
    }
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

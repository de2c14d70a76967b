use std::{path::Path, time::Duration};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::{EstimateResult, UsageSampler};

/// Filesystem usage for the volume holding a path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct VolumeUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

impl VolumeUsage {
    pub fn new(total_bytes: u64, used_bytes: u64, available_bytes: u64) -> Self {
        let used_percent = if total_bytes > 0 {
            (used_bytes as f64) * 100.0 / (total_bytes as f64)
        } else {
            0.0
        };
        Self {
            total_bytes,
            used_bytes,
            available_bytes,
            used_percent,
        }
    }
}

/// Authoritative usage of the filesystem containing `path`.
#[cfg(unix)]
pub fn volume_usage(path: &Path) -> Result<VolumeUsage> {
    use std::{ffi::CString, os::unix::ffi::OsStrExt};

    let c = CString::new(path.as_os_str().as_bytes())?;
    let mut vfs = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: `c` is NUL-terminated and `vfs` points to writable storage.
    let rc = unsafe { libc::statvfs(c.as_ptr(), vfs.as_mut_ptr()) };
    if rc != 0 {
        return Err(anyhow!(
            "statvfs failed for {}: {}",
            path.display(),
            std::io::Error::last_os_error()
        ));
    }
    // SAFETY: statvfs returned 0, so the struct is populated.
    let s = unsafe { vfs.assume_init() };
    let frsize = s.f_frsize as u128;
    let total = (s.f_blocks as u128).saturating_mul(frsize) as u64;
    let free = (s.f_bfree as u128).saturating_mul(frsize) as u64;
    let avail = (s.f_bavail as u128).saturating_mul(frsize) as u64;
    Ok(VolumeUsage::new(total, total.saturating_sub(free), avail))
}

#[cfg(windows)]
pub fn volume_usage(path: &Path) -> Result<VolumeUsage> {
    use std::os::windows::ffi::OsStrExt;

    use windows::{core::PCWSTR, Win32::Storage::FileSystem::GetDiskFreeSpaceExW};
    let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    if let Some(&ch) = wide.last() {
        if ch != '\\' as u16 && ch != '/' as u16 {
            wide.push('\\' as u16);
        }
    }
    wide.push(0);
    let mut free_avail: u64 = 0;
    let mut total: u64 = 0;
    let mut total_free: u64 = 0;
    // SAFETY: `wide` is NUL-terminated and the out pointers are valid.
    unsafe {
        GetDiskFreeSpaceExW(
            PCWSTR(wide.as_ptr()),
            Some(&mut free_avail),
            Some(&mut total),
            Some(&mut total_free),
        )
    }
    .map_err(|e| anyhow!("GetDiskFreeSpaceExW failed for {}: {e}", path.display()))?;
    Ok(VolumeUsage::new(
        total,
        total.saturating_sub(total_free),
        free_avail,
    ))
}

#[cfg(not(any(unix, windows)))]
pub fn volume_usage(path: &Path) -> Result<VolumeUsage> {
    Err(anyhow!(
        "volume usage is not supported on this platform ({})",
        path.display()
    ))
}

/// Usage of a separately mounted volume with a known allocation, measured by
/// summing its contents rather than asking the filesystem.
pub fn quota_usage(
    sampler: &dyn UsageSampler,
    path: &Path,
    capacity_bytes: u64,
    timeout: Duration,
) -> EstimateResult<VolumeUsage> {
    let used = sampler.total(path, timeout)?;
    Ok(VolumeUsage::new(
        capacity_bytes,
        used,
        capacity_bytes.saturating_sub(used),
    ))
}

//! POSIX permission inspection and mutation.
//! Mode bits are applied exactly as requested; ownership changes are
//! best-effort because they normally require elevated privilege, so a
//! permission-denied chown is a soft no-op rather than a request failure.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rwx {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Rwx {
    fn from_bits(bits: u32) -> Self {
        Rwx {
            read: bits & 0o4 != 0,
            write: bits & 0o2 != 0,
            execute: bits & 0o1 != 0,
        }
    }

    fn bits(&self) -> u32 {
        (self.read as u32) << 2 | (self.write as u32) << 1 | self.execute as u32
    }
}

/// rwx flags per class, the shape used by the permissions endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub owner: Rwx,
    pub group: Rwx,
    pub others: Rwx,
}

impl PermissionSet {
    pub fn from_mode(mode: u32) -> Self {
        PermissionSet {
            owner: Rwx::from_bits(mode >> 6),
            group: Rwx::from_bits(mode >> 3),
            others: Rwx::from_bits(mode),
        }
    }

    pub fn mode(&self) -> u32 {
        self.owner.bits() << 6 | self.group.bits() << 3 | self.others.bits()
    }

    pub fn octal(&self) -> String {
        format!("{:03o}", self.mode())
    }
}

/// Snapshot of a path's permission bits and ownership.
#[derive(Debug, Serialize)]
pub struct PermissionReport {
    pub permissions: PermissionSet,
    pub octal: String,
    pub owner: String,
    pub group: String,
}

#[cfg(unix)]
pub fn read_permissions(path: &Path) -> ApiResult<PermissionReport> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path).map_err(ApiError::from)?;
    let set = PermissionSet::from_mode(meta.mode());
    Ok(PermissionReport {
        permissions: set,
        octal: set.octal(),
        owner: user_name(meta.uid()),
        group: group_name(meta.gid()),
    })
}

/// Apply mode bits, then attempt the ownership change when owner or group
/// names were supplied. Unknown names and permission-denied chown calls
/// are logged and skipped.
#[cfg(unix)]
pub fn apply_permissions(
    path: &Path,
    set: &PermissionSet,
    owner: Option<&str>,
    group: Option<&str>,
) -> ApiResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(set.mode()))
        .map_err(ApiError::from)?;

    let uid = owner.and_then(|name| {
        let found = lookup_uid(name);
        if found.is_none() {
            tracing::warn!("unknown user {name:?}, leaving owner unchanged");
        }
        found
    });
    let gid = group.and_then(|name| {
        let found = lookup_gid(name);
        if found.is_none() {
            tracing::warn!("unknown group {name:?}, leaving group unchanged");
        }
        found
    });
    if uid.is_some() || gid.is_some() {
        if let Err(err) = std::os::unix::fs::chown(path, uid, gid) {
            if err.kind() == std::io::ErrorKind::PermissionDenied {
                tracing::warn!("chown denied on {}, skipping", path.display());
            } else {
                return Err(err.into());
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn read_permissions(_path: &Path) -> ApiResult<PermissionReport> {
    Err(ApiError::bad_request(
        "permissions are not supported on this platform",
    ))
}

#[cfg(not(unix))]
pub fn apply_permissions(
    _path: &Path,
    _set: &PermissionSet,
    _owner: Option<&str>,
    _group: Option<&str>,
) -> ApiResult<()> {
    Err(ApiError::bad_request(
        "permissions are not supported on this platform",
    ))
}

#[cfg(unix)]
fn user_name(uid: u32) -> String {
    unsafe {
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut buf = [0 as libc::c_char; 2048];
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result);
        if rc == 0 && !result.is_null() {
            return std::ffi::CStr::from_ptr(pwd.pw_name)
                .to_string_lossy()
                .into_owned();
        }
    }
    uid.to_string()
}

#[cfg(unix)]
fn group_name(gid: u32) -> String {
    unsafe {
        let mut grp: libc::group = std::mem::zeroed();
        let mut buf = [0 as libc::c_char; 2048];
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result);
        if rc == 0 && !result.is_null() {
            return std::ffi::CStr::from_ptr(grp.gr_name)
                .to_string_lossy()
                .into_owned();
        }
    }
    gid.to_string()
}

#[cfg(unix)]
fn lookup_uid(name: &str) -> Option<u32> {
    let cname = std::ffi::CString::new(name).ok()?;
    unsafe {
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut buf = [0 as libc::c_char; 2048];
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let rc = libc::getpwnam_r(cname.as_ptr(), &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result);
        if rc == 0 && !result.is_null() {
            return Some(pwd.pw_uid);
        }
    }
    None
}

#[cfg(unix)]
fn lookup_gid(name: &str) -> Option<u32> {
    let cname = std::ffi::CString::new(name).ok()?;
    unsafe {
        let mut grp: libc::group = std::mem::zeroed();
        let mut buf = [0 as libc::c_char; 2048];
        let mut result: *mut libc::group = std::ptr::null_mut();
        let rc = libc::getgrnam_r(cname.as_ptr(), &mut grp, buf.as_mut_ptr(), buf.len(), &mut result);
        if rc == 0 && !result.is_null() {
            return Some(grp.gr_gid);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_roundtrip() {
        for mode in [0o000, 0o644, 0o755, 0o640, 0o777, 0o421] {
            let set = PermissionSet::from_mode(mode);
            assert_eq!(set.mode(), mode, "mode {mode:o}");
        }
    }

    #[test]
    fn octal_rendering() {
        assert_eq!(PermissionSet::from_mode(0o754).octal(), "754");
        assert_eq!(PermissionSet::from_mode(0o007).octal(), "007");
    }

    #[test]
    fn from_mode_ignores_type_bits() {
        // A regular-file mode with type bits set still yields 644.
        let set = PermissionSet::from_mode(0o100644);
        assert_eq!(set.octal(), "644");
        assert!(set.owner.read && set.owner.write && !set.owner.execute);
        assert!(set.group.read && !set.group.write);
        assert!(set.others.read && !set.others.execute);
    }

    #[cfg(unix)]
    #[test]
    fn apply_then_read_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        let set = PermissionSet::from_mode(0o640);
        apply_permissions(&file, &set, None, None).unwrap();

        let report = read_permissions(&file).unwrap();
        assert_eq!(report.octal, "640");
        assert_eq!(report.permissions, set);
        assert!(!report.owner.is_empty());
        assert!(!report.group.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unknown_owner_is_a_soft_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("f.txt");
        std::fs::write(&file, b"x").unwrap();

        let set = PermissionSet::from_mode(0o600);
        apply_permissions(&file, &set, Some("no-such-user-here"), None).unwrap();
        assert_eq!(read_permissions(&file).unwrap().octal, "600");
    }
}

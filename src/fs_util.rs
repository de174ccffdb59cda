use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;

/// Symlinks are left as they are; everything else is made owner-writable first.
pub fn force_remove_dir(root: &Path) -> Result<(), MirrorError> {
    if !root.exists() {
        return Ok(());
    }
    make_writable(root).map_err(|err| {
        MirrorError::Filesystem(format!("normalize permissions {}: {err}", root.display()))
    })?;
    fs::remove_dir_all(root)
        .map_err(|err| MirrorError::Filesystem(format!("remove {}: {err}", root.display())))
}

fn make_writable(root: &Path) -> io::Result<()> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let meta = fs::symlink_metadata(&path)?;
        if meta.file_type().is_symlink() {
            continue;
        }
        set_owner_writable(&path, &meta)?;
        if meta.is_dir() {
            for entry in fs::read_dir(&path)? {
                stack.push(entry?.path());
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_owner_writable(path: &Path, meta: &fs::Metadata) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = meta.permissions().mode();
    let wanted = if meta.is_dir() {
        mode | 0o700
    } else {
        mode | 0o600
    };
    if wanted != mode {
        fs::set_permissions(path, fs::Permissions::from_mode(wanted))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_writable(path: &Path, meta: &fs::Metadata) -> io::Result<()> {
    let mut permissions = meta.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

pub fn anat_images(dataset_root: &Path) -> Result<Vec<PathBuf>, MirrorError> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(dataset_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(out),
        Err(err) => return Err(MirrorError::Filesystem(err.to_string())),
    };

    let mut stack = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        let is_subject = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with("sub-"))
            .unwrap_or(false);
        let is_dir = entry
            .file_type()
            .map(|kind| kind.is_dir())
            .unwrap_or(false);
        if is_subject && is_dir {
            stack.push(entry.path());
        }
    }

    while let Some(dir) = stack.pop() {
        let in_anat = dir.file_name().map(|name| name == "anat").unwrap_or(false);
        let entries = fs::read_dir(&dir).map_err(|err| MirrorError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            let kind = entry
                .file_type()
                .map_err(|err| MirrorError::Filesystem(err.to_string()))?;
            if kind.is_dir() {
                stack.push(entry.path());
            } else if in_anat && is_nifti_name(&entry.file_name().to_string_lossy()) {
                out.push(entry.path());
            }
        }
    }

    out.sort();
    Ok(out)
}

fn is_nifti_name(name: &str) -> bool {
    name.contains(".nii")
}

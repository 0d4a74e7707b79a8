//! Directory walking shared by pack, unpack and garbage collection.
//!
//! [`role_dirs`] yields every room or widget directory under a root in
//! file-name order. Widget directories are leaves: the walk never descends
//! into them. Hidden directories (`.git`, ...) and symlinks are skipped.

use crate::config::SyncConfig;
use std::path::Path;
use std::path::PathBuf;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Room,
    Widget,
}

/// Role of a directory name under `config`, if it has one.
pub fn role_of(name: &str, config: &SyncConfig) -> Option<Role> {
    let has_stem = |prefix: &str| name.len() > prefix.len() && name.starts_with(prefix);
    if has_stem(&config.room_prefix) {
        Some(Role::Room)
    } else if has_stem(&config.widget_prefix) {
        Some(Role::Widget)
    } else {
        None
    }
}

pub fn is_role_dir(path: &Path, role: Role, config: &SyncConfig) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| role_of(name, config))
        == Some(role)
}

/// Lazy iterator over directories of one role.
pub struct RoleDirs {
    inner: walkdir::IntoIter,
    role: Role,
    config: SyncConfig,
}

impl Iterator for RoleDirs {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if name.starts_with('.') {
                self.inner.skip_current_dir();
                continue;
            }
            match role_of(name, &self.config) {
                Some(Role::Widget) => {
                    self.inner.skip_current_dir();
                    if self.role == Role::Widget {
                        return Some(entry.into_path());
                    }
                }
                Some(Role::Room) if self.role == Role::Room => {
                    return Some(entry.into_path());
                }
                _ => {}
            }
        }
    }
}

/// Every directory of `role` anywhere below `root` (excluding `root`).
pub fn role_dirs(root: &Path, role: Role, config: &SyncConfig) -> RoleDirs {
    walk(root, role, config, None)
}

/// Directories of `role` directly inside `dir`.
pub fn child_dirs(dir: &Path, role: Role, config: &SyncConfig) -> RoleDirs {
    walk(dir, role, config, Some(1))
}

fn walk(root: &Path, role: Role, config: &SyncConfig, max_depth: Option<usize>) -> RoleDirs {
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }
    RoleDirs {
        inner: walker.into_iter(),
        role,
        config: config.clone(),
    }
}

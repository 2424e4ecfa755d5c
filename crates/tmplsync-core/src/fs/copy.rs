//! Recursive copy between two filesystems.

use tracing::debug;

use super::{EntryKind, Filesystem, join, normalize};
use crate::error::{CoreError, Result};

/// Copies `src_path` from `src` to `dst_path` in `dst`.
///
/// A file is copied as a file, a directory is copied recursively and a
/// symbolic link is recreated with the same target, never followed. Existing
/// files in the destination are overwritten, other destination content is
/// kept.
pub fn copy_fs(
    src: &dyn Filesystem,
    src_path: &str,
    dst: &dyn Filesystem,
    dst_path: &str,
) -> Result<()> {
    let src_path = normalize(src_path)?;
    let dst_path = normalize(dst_path)?;

    debug!(
        "Copying {:?}:{:?} to {:?}:{:?}",
        src.base_path(),
        src_path,
        dst.base_path(),
        dst_path
    );

    if src.is_symlink(&src_path) {
        return dst.write_link(&dst_path, &src.read_link(&src_path)?);
    }
    if src.is_file(&src_path) {
        let content = src.read_file(&src_path)?;
        return dst.write_file(&dst_path, &content);
    }
    if !src.is_dir(&src_path) {
        return Err(CoreError::not_found(src_path));
    }

    let mut stack = vec![(src_path, dst_path)];
    while let Some((from, to)) = stack.pop() {
        dst.mkdir_all(&to)?;
        for entry in src.read_dir(&from)? {
            let child_from = join(&from, &entry.name);
            let child_to = join(&to, &entry.name);
            match entry.kind {
                EntryKind::Dir => stack.push((child_from, child_to)),
                EntryKind::File => {
                    let content = src.read_file(&child_from)?;
                    dst.write_file(&child_to, &content)?;
                },
                EntryKind::Symlink => dst.write_link(&child_to, &src.read_link(&child_from)?)?,
            }
        }
    }
    Ok(())
}

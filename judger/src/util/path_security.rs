//! Checks that keep submitted file names inside their judgement's workspace.

use std::path::{Component, Path};

/// Checks that `path` names a file strictly below the directory it will be
/// joined onto: relative, never navigating above its start, and not empty.
/// Returns `Err` with a reason if it's not.
pub fn enforce_child_path(path: &Path) -> Result<(), String> {
    let mut depth = 0i32;
    for part in path.components() {
        match part {
            Component::Prefix(_) | Component::RootDir => {
                return Err(format!(
                    "{} is an absolute path, which is not allowed",
                    path.display()
                ));
            }
            Component::CurDir => {}
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
        }
        if depth < 0 {
            return Err(format!(
                "{} navigates out of the workspace, which is not allowed",
                path.display()
            ));
        }
    }
    if depth == 0 {
        return Err(format!("{:?} does not name a file", path.display().to_string()));
    }
    Ok(())
}

//! Filesystem change notifications and the operations they expand into.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Separator between the old and new path of a rename.
pub const RENAME_SEPARATOR: &str = " -> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchOp {
    Create,
    Remove,
    Rename,
}

impl fmt::Display for WatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatchOp::Create => "CREATE",
            WatchOp::Remove => "REMOVE",
            WatchOp::Rename => "RENAME",
        };
        f.write_str(name)
    }
}

/// A change observed on a watched tree.
///
/// For renames `full_path` holds `"old -> new"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherEvent {
    pub full_path: String,
    pub op: WatchOp,
}

impl WatcherEvent {
    pub fn create(path: impl Into<String>) -> Self {
        Self {
            full_path: path.into(),
            op: WatchOp::Create,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            full_path: path.into(),
            op: WatchOp::Remove,
        }
    }

    pub fn rename(old: &str, new: &str) -> Self {
        Self {
            full_path: format!("{}{}{}", old, RENAME_SEPARATOR, new),
            op: WatchOp::Rename,
        }
    }

    /// Rename of a path onto itself, which re-synchronizes that path.
    pub fn resync(path: &str) -> Self {
        Self::rename(path, path)
    }

    /// Expand into the catalog operations to apply, in order.
    ///
    /// A rename becomes `Remove(old)` followed by `Create(new)`.
    pub fn into_ops(self) -> CatalogResult<Vec<SyncOp>> {
        match self.op {
            WatchOp::Create => Ok(vec![SyncOp::Create(self.full_path)]),
            WatchOp::Remove => Ok(vec![SyncOp::Remove(self.full_path)]),
            WatchOp::Rename => {
                let (old, new) = self
                    .full_path
                    .split_once(RENAME_SEPARATOR)
                    .ok_or_else(|| CatalogError::InvalidEvent(self.full_path.clone()))?;
                if old.is_empty() || new.is_empty() {
                    return Err(CatalogError::InvalidEvent(self.full_path.clone()));
                }
                Ok(vec![
                    SyncOp::Remove(old.to_string()),
                    SyncOp::Create(new.to_string()),
                ])
            }
        }
    }
}

/// A single catalog operation on one full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOp {
    Create(String),
    Remove(String),
}

impl SyncOp {
    pub fn full_path(&self) -> &str {
        match self {
            SyncOp::Create(p) | SyncOp::Remove(p) => p,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_splits_into_remove_then_create() {
        let ops = WatcherEvent::rename("/data/a.nc", "/data/b.nc").into_ops().unwrap();
        assert_eq!(
            ops,
            vec![
                SyncOp::Remove("/data/a.nc".to_string()),
                SyncOp::Create("/data/b.nc".to_string()),
            ]
        );
    }

    #[test]
    fn test_resync_targets_the_same_path_twice() {
        let ops = WatcherEvent::resync("/data/a.nc").into_ops().unwrap();
        assert_eq!(ops[0].full_path(), ops[1].full_path());
    }

    #[test]
    fn test_malformed_rename_is_rejected() {
        let event = WatcherEvent {
            full_path: "/data/a.nc".to_string(),
            op: WatchOp::Rename,
        };
        assert!(matches!(
            event.into_ops(),
            Err(CatalogError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_create_and_remove_pass_through() {
        assert_eq!(
            WatcherEvent::create("x").into_ops().unwrap(),
            vec![SyncOp::Create("x".to_string())]
        );
        assert_eq!(
            WatcherEvent::remove("x").into_ops().unwrap(),
            vec![SyncOp::Remove("x".to_string())]
        );
    }
}

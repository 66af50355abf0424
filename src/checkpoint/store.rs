use std::{io::Write as _, path::Path};

use serde::{Serialize, de::DeserializeOwned};

use crate::foundation::error::{ForgeError, ForgeResult};

/// A progress snapshot persisted as pretty JSON next to the batch directories.
///
/// `Default` is the "no prior progress" value. Writes go to `<file>.tmp` and are renamed over the
/// target, so a crash mid-write leaves the previous snapshot readable.
pub trait Checkpoint: Serialize + DeserializeOwned + Default {
    /// Short name used in log fields and error messages.
    const KIND: &'static str;

    /// Fold a newer snapshot into `self`.
    fn merge(&mut self, newer: Self);

    /// Read the snapshot at `path`. A missing file is `Ok(None)`.
    fn load(path: &Path) -> ForgeResult<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ForgeError::checkpoint_io(format!(
                    "read {} checkpoint '{}': {e}",
                    Self::KIND,
                    path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            ForgeError::checkpoint_io(format!(
                "parse {} checkpoint '{}': {e}",
                Self::KIND,
                path.display()
            ))
        })
    }

    /// Like [`Checkpoint::load`], but an unreadable snapshot is logged and treated as absent.
    fn load_lenient(path: &Path) -> Option<Self> {
        match Self::load(path) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(kind = Self::KIND, error = %e, "ignoring unreadable checkpoint");
                None
            }
        }
    }

    /// Atomically replace the snapshot at `path`.
    fn persist(&self, path: &Path) -> ForgeResult<()> {
        let io_err = |what: &str, e: &dyn std::fmt::Display| {
            ForgeError::checkpoint_io(format!(
                "{what} {} checkpoint '{}': {e}",
                Self::KIND,
                path.display()
            ))
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| io_err("create dir for", &e))?;
        }
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| io_err("serialize", &e))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = std::path::PathBuf::from(tmp);
        {
            let mut f = std::fs::File::create(&tmp).map_err(|e| io_err("create", &e))?;
            f.write_all(&bytes).map_err(|e| io_err("write", &e))?;
            f.sync_all().map_err(|e| io_err("sync", &e))?;
        }
        std::fs::rename(&tmp, path).map_err(|e| io_err("replace", &e))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/checkpoint/store.rs"]
mod tests;

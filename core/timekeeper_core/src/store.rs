use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::model::TimerDocument;

/// Flat-file storage for the single [`TimerDocument`].
///
/// The store does no locking of its own; callers serialize access by holding it behind one mutex
/// for a whole load/mutate/save cycle.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Creates parent directories and writes the default document if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        store.ensure_exists()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document. A file that is not JSON at all is set aside and replaced by the
    /// default document; JSON of the wrong shape is an error.
    pub fn load(&self) -> Result<TimerDocument> {
        self.ensure_exists()?;
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;

        let value: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(err) => {
                let aside = set_aside_path(&self.path);
                warn!(
                    "storage file {} is not valid JSON ({err}); moving it to {} and starting fresh",
                    self.path.display(),
                    aside.display()
                );
                fs::rename(&self.path, &aside)
                    .with_context(|| format!("moving aside {}", self.path.display()))?;
                let doc = TimerDocument::default();
                self.save(&doc)?;
                return Ok(doc);
            }
        };

        serde_json::from_value(value)
            .with_context(|| format!("decoding {}", self.path.display()))
    }

    /// Writes a sibling temp file and renames it over the document.
    pub fn save(&self, doc: &TimerDocument) -> Result<()> {
        let body = serde_json::to_vec_pretty(doc).context("encoding timer document")?;
        let tmp = sibling(&self.path, ".tmp");
        fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn ensure_exists(&self) -> Result<()> {
        match fs::metadata(&self.path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("initializing storage at {}", self.path.display());
                self.save(&TimerDocument::default())
            }
            Err(err) => {
                Err(err).with_context(|| format!("inspecting {}", self.path.display()))
            }
        }
    }
}

/// `<file>.corrupt-<unix seconds>`, with a counter appended if that name is already taken.
fn set_aside_path(path: &Path) -> PathBuf {
    let stamp = OffsetDateTime::now_utc().unix_timestamp();
    let base = format!(".corrupt-{stamp}");
    let mut candidate = sibling(path, &base);
    let mut n = 1u32;
    while candidate.exists() {
        candidate = sibling(path, &format!("{base}-{n}"));
        n += 1;
    }
    candidate
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("storage.json"));
    name.push(suffix);
    path.with_file_name(name)
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persistent key/value store backing stable object identities across
/// regenerations. Keys follow the `<name>_GUID` convention; values are the
/// 24-hex-digit ids assigned on first generation.
///
/// Stored as TOML under the build scripts directory. Written back only when
/// a new id was assigned, so repeated clean regenerations leave the file's
/// mtime alone.
pub struct IdCache {
  path:    PathBuf,
  entries: BTreeMap<String, String>,
  dirty:   bool
}

#[derive(Default, Deserialize, Serialize)]
struct CacheFile {
  #[serde(default)]
  ids: BTreeMap<String, String>
}

impl IdCache {
  pub const FILE_NAME: &'static str = "id-cache.toml";

  /// Load the cache from `dir`, starting empty if absent or unreadable.
  pub fn load(dir: &Path) -> Self {
    let path = dir.join(Self::FILE_NAME);
    let entries = std::fs::read_to_string(&path)
      .ok()
      .and_then(|s| toml::from_str::<CacheFile>(&s).ok())
      .map(|f| f.ids)
      .unwrap_or_default();

    if !entries.is_empty() {
      tracing::debug!("loaded {} cached ids from {:?}", entries.len(), path);
    }

    IdCache { path, entries, dirty: false }
  }

  pub fn get(&self, key: &str) -> Option<&'_ str> {
    self.entries.get(key).map(String::as_str)
  }

  pub fn insert(&mut self, key: &str, id: &str) {
    self.entries.insert(key.to_string(), id.to_string());
    self.dirty = true;
  }

  /// Write the cache back if anything changed since load.
  pub fn save(&mut self) -> std::io::Result<()> {
    if !self.dirty {
      return Ok(())
    }

    if let Some(dir) = self.path.parent() {
      std::fs::create_dir_all(dir)?;
    }

    let file = CacheFile { ids: self.entries.clone() };
    let text = toml::to_string(&file)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    std::fs::write(&self.path, text)?;
    self.dirty = false;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let cache = IdCache::load(dir.path());
    assert_eq!(cache.get("App_GUID"), None);
  }

  #[test]
  fn ids_survive_reload() {
    let dir = tempfile::tempdir().unwrap();

    let mut cache = IdCache::load(dir.path());
    cache.insert("App_GUID", "00000001AABBCCDDEEFF0011");
    cache.save().unwrap();

    let cache = IdCache::load(dir.path());
    assert_eq!(cache.get("App_GUID"), Some("00000001AABBCCDDEEFF0011"));
  }

  #[test]
  fn save_without_changes_does_not_write() {
    let dir = tempfile::tempdir().unwrap();

    let mut cache = IdCache::load(dir.path());
    cache.insert("Core_GUID", "00000002123456789ABCDEF0");
    cache.save().unwrap();

    let path  = dir.path().join(IdCache::FILE_NAME);
    let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();

    let mut cache = IdCache::load(dir.path());
    cache.save().unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), mtime);
  }
}

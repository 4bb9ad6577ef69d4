mod make;
mod xcode;

use crate::ctx::Generators;
use std::path::Path;

pub fn init() -> Generators {
  let mut generators = Generators::new();
  generators.insert("make",  Box::new(make::Make));
  generators.insert("xcode", Box::new(xcode::XCode));
  generators
}

/// Write `contents` to `path` only when it differs from what is already
/// there, creating parent directories as needed. Returns whether the file
/// was written, leaving mtimes alone otherwise so the generated project does
/// not trigger spurious rebuilds.
pub fn write_if_different(path: &Path, contents: &[u8]) -> std::io::Result<bool> {
  match std::fs::read(path) {
    Ok(existing) if existing == contents => return Ok(false),
    _ => ()
  }

  if let Some(dir) = path.parent() {
    std::fs::create_dir_all(dir)?;
  }
  std::fs::write(path, contents)?;
  Ok(true)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn write_if_different_skips_identical() {
    let dir  = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/project.pbxproj");

    assert!(write_if_different(&path, b"hello").unwrap());
    assert!(!write_if_different(&path, b"hello").unwrap());
    assert!(write_if_different(&path, b"world").unwrap());
    assert_eq!(std::fs::read(&path).unwrap(), b"world");
  }
}

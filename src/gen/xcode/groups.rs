//! Group tree and file references.
//!
//! Declared group paths use `\` as separator and resolve against a per-target
//! root group under the project main group. Both group creation and file
//! references are memoized so a path names one object no matter how many
//! times it is mentioned.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::ctx::{Language, SourceFile};
use crate::diag::GenError;
use super::obj::{Attr, ObjId, ObjKind, Registry, Value};

pub struct Groups {
  pub main_group: ObjId,
  pub products:   ObjId,

  roots: HashMap<String, ObjId>,
  paths: HashMap<(String, String), ObjId>,
  files: HashMap<(String, PathBuf), ObjId>
}

impl Groups {
  pub fn new(reg: &mut Registry, project_name: &str) -> Result<Self, GenError> {
    let main_group = reg.create(ObjKind::Group)?;
    {
      let tree = reg.intern("<group>");
      let obj  = reg.obj_mut(main_group);
      obj.comment = project_name.to_string();
      obj.set(Attr::Children, Value::List(Vec::new()));
      obj.set(Attr::Name, Value::Str(project_name.into()));
      obj.set(Attr::SourceTree, tree);
    }

    let products = make_group(reg, "Products")?;
    reg.obj_mut(main_group).push_to_list(Attr::Children, Value::Ref(products));

    Ok(Groups {
      main_group,
      products,
      roots: HashMap::new(),
      paths: HashMap::new(),
      files: HashMap::new()
    })
  }

  /// The root group for one target, a child of the project main group.
  pub fn target_root(&mut self, reg: &mut Registry, target: &str)
                     -> Result<ObjId, GenError> {
    if let Some(id) = self.roots.get(target) {
      return Ok(*id)
    }
    let id = make_group(reg, target)?;
    reg.obj_mut(self.main_group).push_to_list(Attr::Children, Value::Ref(id));
    self.roots.insert(target.to_string(), id);
    Ok(id)
  }

  /// Resolve a declared `\`-separated group path, creating missing segments.
  /// The empty path is the target root.
  pub fn group_for(&mut self, reg: &mut Registry, target: &str, path: &str)
                   -> Result<ObjId, GenError> {
    let mut current = self.target_root(reg, target)?;
    if path.is_empty() {
      return Ok(current)
    }

    let mut walked = String::new();
    for segment in path.split('\\').filter(|s| !s.is_empty()) {
      if !walked.is_empty() {
        walked.push('\\');
      }
      walked.push_str(segment);

      let key = (target.to_string(), walked.clone());
      current = match self.paths.get(&key) {
        Some(id) => *id,
        None => {
          let id = make_group(reg, segment)?;
          reg.obj_mut(current).push_to_list(Attr::Children, Value::Ref(id));
          self.paths.insert(key, id);
          id
        }
      };
    }
    Ok(current)
  }

  /// File reference for one source, memoized per `(target, path)`, attached
  /// to its declared group on creation.
  pub fn file_ref(&mut self, reg: &mut Registry, target: &str, file: &SourceFile)
                  -> Result<ObjId, GenError> {
    let key = (target.to_string(), file.path.clone());
    if let Some(id) = self.files.get(&key) {
      return Ok(*id)
    }

    let group = self.group_for(reg, target, &file.group)?;

    let id = reg.create(ObjKind::FileReference)?;
    {
      let file_type = reg.intern(file_type_for(file));
      let encoding  = reg.intern("4");
      let name      = reg.intern(file.name());
      let path      = reg.intern(&file.path.to_string_lossy());
      let tree      = reg.intern("SOURCE_ROOT");

      let obj = reg.obj_mut(id);
      obj.comment = file.name().to_string();
      obj.set(Attr::FileEncoding, encoding);
      obj.set(Attr::LastKnownFileType, file_type);
      obj.set(Attr::Name, name);
      obj.set(Attr::Path, path);
      obj.set(Attr::SourceTree, tree);
    }

    reg.obj_mut(group).push_to_list(Attr::Children, Value::Ref(id));
    self.files.insert(key, id);
    Ok(id)
  }

  /// Product file reference, a child of the Products group. One per target.
  pub fn product_ref(&mut self, reg: &mut Registry, product_name: &str,
                     explicit_type: &str) -> Result<ObjId, GenError> {
    let id = reg.create(ObjKind::FileReference)?;
    {
      let file_type = reg.intern(explicit_type);
      let index     = reg.intern("0");
      let path      = reg.intern(product_name);
      let tree      = reg.intern("BUILT_PRODUCTS_DIR");

      let obj = reg.obj_mut(id);
      obj.comment = product_name.to_string();
      obj.set(Attr::ExplicitFileType, file_type);
      obj.set(Attr::IncludeInIndex, index);
      obj.set(Attr::Path, path);
      obj.set(Attr::SourceTree, tree);
    }
    reg.obj_mut(self.products).push_to_list(Attr::Children, Value::Ref(id));
    Ok(id)
  }
}

fn make_group(reg: &mut Registry, name: &str) -> Result<ObjId, GenError> {
  let id = reg.create(ObjKind::Group)?;
  let tree = reg.intern("<group>");
  let name_v = reg.intern(name);
  let obj = reg.obj_mut(id);
  obj.comment = name.to_string();
  obj.set(Attr::Children, Value::List(Vec::new()));
  obj.set(Attr::Name, name_v);
  obj.set(Attr::SourceTree, tree);
  Ok(id)
}

/// Xcode file type for a source file, from its language override first and
/// its extension otherwise.
pub fn file_type_for(file: &SourceFile) -> &'static str {
  if let Some(lang) = file.language {
    return match lang {
      Language::C      => "sourcecode.c.c",
      Language::Cxx    => "sourcecode.cpp.cpp",
      Language::ObjC   => "sourcecode.c.objc",
      Language::ObjCxx => "sourcecode.cpp.objcpp",
      Language::Swift  => "sourcecode.swift",
      Language::Asm    => "sourcecode.asm"
    }
  }

  match file.extension() {
    "c"                         => "sourcecode.c.c",
    "cc" | "cpp" | "cxx"        => "sourcecode.cpp.cpp",
    "m"                         => "sourcecode.c.objc",
    "mm"                        => "sourcecode.cpp.objcpp",
    "swift"                     => "sourcecode.swift",
    "s" | "S" | "asm"           => "sourcecode.asm",
    "h"                         => "sourcecode.c.h",
    "hh" | "hpp" | "hxx" | "inl" => "sourcecode.cpp.h",
    "o"                         => "compiled.mach-o.objfile",
    "a"                         => "archive.ar",
    "dylib"                     => "compiled.mach-o.dylib",
    "framework"                 => "wrapper.framework",
    "plist"                     => "text.plist.xml",
    "storyboard"                => "file.storyboard",
    "xib"                       => "file.xib",
    "strings"                   => "text.plist.strings",
    "png"                       => "image.png",
    "metal"                     => "sourcecode.metal",
    "md" | "txt"                => "text",
    _                           => "file"
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn group_paths_are_memoized() {
    let mut reg    = Registry::new("Demo");
    let mut groups = Groups::new(&mut reg, "Demo").unwrap();

    let a = groups.group_for(&mut reg, "App", "Sources\\App").unwrap();
    let b = groups.group_for(&mut reg, "App", "Sources\\App").unwrap();
    let c = groups.group_for(&mut reg, "App", "Sources").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);

    // Same declared path under another target is a distinct group.
    let d = groups.group_for(&mut reg, "Core", "Sources\\App").unwrap();
    assert_ne!(a, d);
  }

  #[test]
  fn empty_path_is_the_target_root() {
    let mut reg    = Registry::new("Demo");
    let mut groups = Groups::new(&mut reg, "Demo").unwrap();

    let root = groups.target_root(&mut reg, "App").unwrap();
    assert_eq!(groups.group_for(&mut reg, "App", "").unwrap(), root);
  }

  #[test]
  fn file_refs_are_memoized_per_target() {
    let mut reg    = Registry::new("Demo");
    let mut groups = Groups::new(&mut reg, "Demo").unwrap();

    let file = SourceFile::new("src/main.c");
    let a = groups.file_ref(&mut reg, "App", &file).unwrap();
    let b = groups.file_ref(&mut reg, "App", &file).unwrap();
    assert_eq!(a, b);

    let before = reg.len();
    groups.file_ref(&mut reg, "App", &file).unwrap();
    assert_eq!(reg.len(), before);
  }

  #[test]
  fn file_types_from_extension() {
    assert_eq!(file_type_for(&SourceFile::new("a.cpp")), "sourcecode.cpp.cpp");
    assert_eq!(file_type_for(&SourceFile::new("a.h")),   "sourcecode.c.h");
    assert_eq!(file_type_for(&SourceFile::new("a.o")),   "compiled.mach-o.objfile");

    let forced = SourceFile {
      language: Some(Language::ObjCxx),
      ..SourceFile::new("a.cpp")
    };
    assert_eq!(file_type_for(&forced), "sourcecode.cpp.objcpp");
  }
}

//! Serialization to the NeXTSTEP property-list dialect Xcode reads.
//!
//! The file is rebuilt in one deterministic walk: a fixed header, the object
//! dictionary grouped into sections by `isa` with objects ordered by
//! identifier, then the root-object trailer. Attribute order inside an
//! object is whatever the assembler inserted, never re-sorted; Xcode keeps
//! both orderings when it rewrites the file, which keeps diffs quiet.

use std::borrow::Cow;
use std::fmt::Write;

use super::obj::{ObjId, ObjKind, Registry, Value};

/// `objectVersion` for a `compatibilityVersion` string.
pub fn object_version(compatibility: &str) -> &'static str {
  match compatibility {
    "Xcode 3.0" => "44",
    "Xcode 3.1" => "45",
    _           => "46"
  }
}

/// Strings are written bare only when every character is unambiguous to the
/// plist scanner.
pub fn quote(s: &str) -> Cow<'_, str> {
  let plain = !s.is_empty() && s.bytes().all(|b| {
    b.is_ascii_alphanumeric() || b == b'$' || b == b'.' || b == b'_' || b == b'/'
  });
  if plain {
    return Cow::Borrowed(s)
  }

  let mut out = String::with_capacity(s.len() + 2);
  out.push('"');
  for c in s.chars() {
    match c {
      '\\' => out.push_str("\\\\"),
      '"'  => out.push_str("\\\""),
      '\n' => out.push_str("\\n"),
      '\t' => out.push_str("\\t"),
      _    => out.push(c)
    }
  }
  out.push('"');
  Cow::Owned(out)
}

pub fn serialize(reg: &Registry, root: ObjId, compatibility: &str) -> String {
  let mut s = String::new();
  s.push_str("// !$*UTF8*$!\n{\n");
  s.push_str("\tarchiveVersion = 1;\n");
  s.push_str("\tclasses = {\n\t};\n");
  write!(s, "\tobjectVersion = {};\n", object_version(compatibility)).unwrap();
  s.push_str("\tobjects = {\n");

  // (isa, id) order: sections alphabetical, objects by identifier within.
  let mut ids = reg.sorted_ids();
  ids.sort_by(|a, b| {
    let (oa, ob) = (reg.obj(*a), reg.obj(*b));
    oa.kind.isa().cmp(ob.kind.isa()).then_with(|| oa.id.cmp(&ob.id))
  });

  let mut section: Option<ObjKind> = None;
  for id in &ids {
    let obj = reg.obj(*id);
    if section != Some(obj.kind) {
      if let Some(prev) = section {
        write!(s, "/* End {} section */\n", prev.isa()).unwrap();
      }
      write!(s, "\n/* Begin {} section */\n", obj.kind.isa()).unwrap();
      section = Some(obj.kind);
    }
    write_object(&mut s, reg, *id);
  }
  if let Some(prev) = section {
    write!(s, "/* End {} section */\n", prev.isa()).unwrap();
  }

  s.push_str("\t};\n");
  write!(s, "\trootObject = {} /* Project object */;\n", reg.obj(root).id).unwrap();
  s.push_str("}\n");
  s
}

fn write_object(s: &mut String, reg: &Registry, id: ObjId) {
  let obj = reg.obj(id);
  write!(s, "\t\t{}", obj.id).unwrap();
  if !obj.comment.is_empty() {
    write!(s, " /* {} */", obj.comment).unwrap();
  }

  match obj.kind.single_line() {
    true => {
      write!(s, " = {{isa = {}; ", obj.kind.isa()).unwrap();
      for (attr, value) in &obj.attrs {
        write!(s, "{} = ", attr.name()).unwrap();
        write_inline(s, reg, value);
        s.push_str("; ");
      }
      s.push_str("};\n");
    }
    false => {
      s.push_str(" = {\n");
      write!(s, "\t\t\tisa = {};\n", obj.kind.isa()).unwrap();
      for (attr, value) in &obj.attrs {
        write!(s, "\t\t\t{} = ", attr.name()).unwrap();
        write_value(s, reg, value, 3);
        s.push_str(";\n");
      }
      s.push_str("\t\t};\n");
    }
  }
}

fn write_ref(s: &mut String, reg: &Registry, id: ObjId) {
  let obj = reg.obj(id);
  s.push_str(&obj.id);
  if !obj.comment.is_empty() {
    write!(s, " /* {} */", obj.comment).unwrap();
  }
}

fn write_inline(s: &mut String, reg: &Registry, value: &Value) {
  match value {
    Value::Str(v)  => s.push_str(&quote(v)),
    Value::Ref(id) => write_ref(s, reg, *id),
    Value::List(items) => {
      s.push('(');
      for v in items {
        write_inline(s, reg, v);
        s.push_str(", ");
      }
      s.push(')');
    }
    Value::Dict(pairs) => {
      s.push('{');
      for (k, v) in pairs {
        write!(s, "{} = ", quote(k)).unwrap();
        write_inline(s, reg, v);
        s.push_str("; ");
      }
      s.push('}');
    }
  }
}

fn write_value(s: &mut String, reg: &Registry, value: &Value, depth: usize) {
  match value {
    Value::Str(v)  => s.push_str(&quote(v)),
    Value::Ref(id) => write_ref(s, reg, *id),
    Value::List(items) => {
      s.push_str("(\n");
      for v in items {
        indent(s, depth + 1);
        write_value(s, reg, v, depth + 1);
        s.push_str(",\n");
      }
      indent(s, depth);
      s.push(')');
    }
    Value::Dict(pairs) => {
      s.push_str("{\n");
      for (k, v) in pairs {
        indent(s, depth + 1);
        write!(s, "{} = ", quote(k)).unwrap();
        write_value(s, reg, v, depth + 1);
        s.push_str(";\n");
      }
      indent(s, depth);
      s.push('}');
    }
  }
}

fn indent(s: &mut String, depth: usize) {
  for _ in 0..depth {
    s.push('\t');
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use super::super::obj::Attr;

  #[test]
  fn quoting_rules() {
    assert_eq!(quote("main.c"), "main.c");
    assert_eq!(quote("src/main.c"), "src/main.c");
    assert_eq!(quote("BUILT_PRODUCTS_DIR"), "BUILT_PRODUCTS_DIR");
    assert_eq!(quote("$(CONFIGURATION)"), "\"$(CONFIGURATION)\"");
    assert_eq!(quote(""), "\"\"");
    assert_eq!(quote("<group>"), "\"<group>\"");
    assert_eq!(quote("a b"), "\"a b\"");
    assert_eq!(quote("-Wall"), "\"-Wall\"");
    assert_eq!(quote("say \"hi\""), "\"say \\\"hi\\\"\"");
    assert_eq!(quote("a\nb"), "\"a\\nb\"");
  }

  #[test]
  fn object_versions() {
    assert_eq!(object_version("Xcode 3.0"), "44");
    assert_eq!(object_version("Xcode 3.1"), "45");
    assert_eq!(object_version("Xcode 3.2"), "46");
  }

  #[test]
  fn emits_header_sections_and_trailer() {
    let mut reg = Registry::new("Demo");
    let root = reg.create(ObjKind::Project).unwrap();
    reg.obj_mut(root).comment = "Project object".to_string();
    let group = reg.create(ObjKind::Group).unwrap();
    reg.obj_mut(root).set(Attr::MainGroup, Value::Ref(group));

    let out = serialize(&reg, root, "Xcode 3.2");
    assert!(out.starts_with("// !$*UTF8*$!\n{\n"));
    assert!(out.contains("\tobjectVersion = 46;\n"));
    assert!(out.contains("/* Begin PBXGroup section */"));
    assert!(out.contains("/* End PBXGroup section */"));
    assert!(out.contains("/* Begin PBXProject section */"));
    assert!(out.ends_with(&format!(
      "\trootObject = {} /* Project object */;\n}}\n", reg.obj(root).id)));
  }

  #[test]
  fn build_files_are_single_line() {
    let mut reg = Registry::new("Demo");
    let root = reg.create(ObjKind::Project).unwrap();
    let fref = reg.create(ObjKind::FileReference).unwrap();
    reg.obj_mut(fref).comment = "main.c".to_string();
    let bf = reg.create(ObjKind::BuildFile).unwrap();
    reg.obj_mut(bf).comment = "main.c in Sources".to_string();
    reg.obj_mut(bf).set(Attr::FileRef, Value::Ref(fref));

    let out = serialize(&reg, root, "Xcode 3.2");
    let line = out.lines()
      .find(|l| l.contains("isa = PBXBuildFile"))
      .unwrap();
    assert!(line.contains(&format!(
      "/* main.c in Sources */ = {{isa = PBXBuildFile; fileRef = {} /* main.c */; }};",
      reg.obj(fref).id)));
  }

  #[test]
  fn output_is_byte_stable() {
    let build = || {
      let mut reg = Registry::new("Demo");
      let root = reg.create(ObjKind::Project).unwrap();
      let group = reg.create(ObjKind::Group).unwrap();
      let name = reg.intern("Demo");
      reg.obj_mut(group).set(Attr::Name, name);
      reg.obj_mut(root).set(Attr::MainGroup, Value::Ref(group));
      serialize(&reg, root, "Xcode 3.2")
    };
    assert_eq!(build(), build());
  }
}

//! Dependency edges and link information.
//!
//! In-project edges become container-item proxies plus target dependencies.
//! Link inputs go through the per-configuration flag attributes instead of
//! file references: the depend-helper makefile papers over Xcode not
//! re-linking a target when a library it links against changes.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::ctx::{Context, Target, TargetType, escape_path};
use crate::diag::GenError;
use super::obj::{Attr, ObjId, ObjKind, Registry, Value};
use super::phases::script_phase;

pub const DEPEND_HELPER: &str = "girder-scripts/DEPEND_HELPER.make";

/// Everything later passes need to know about an assembled target.
pub struct TargetRec {
  pub id:       ObjId,
  pub configs:  Vec<ObjId>,
  pub linkable: bool,
  pub library:  bool,

  /// Product path relative to the per-configuration build dir, for targets
  /// that produce one.
  pub product: Option<String>
}

pub fn product_file(name: &str, target: &Target) -> Option<String> {
  match target.target_type {
    TargetType::Console       => Some(name.to_string()),
    TargetType::Application   =>
      Some([name, ".app/Contents/MacOS/", name].join("")),
    TargetType::StaticLibrary |
    TargetType::ObjectLibrary => Some(["lib", name, ".a"].join("")),
    TargetType::SharedLibrary => Some(["lib", name, ".dylib"].join("")),
    TargetType::Custom        => None
  }
}

/// Wire one dependency edge: a proxy into the project container plus a
/// target dependency attached to the depending target.
pub fn connect(reg: &mut Registry, root: ObjId, from: ObjId, from_name: &str,
               to: ObjId, to_name: &str) -> Result<(), GenError> {
  let proxy = reg.create(ObjKind::ContainerItemProxy)?;
  {
    let one  = reg.intern("1");
    let info = reg.intern(to_name);
    let obj  = reg.obj_mut(proxy);
    obj.comment = "PBXContainerItemProxy".to_string();
    obj.set(Attr::ContainerPortal, Value::Ref(root));
    obj.set(Attr::ProxyType, one);
    obj.set(Attr::RemoteGlobalIDString, Value::Ref(to));
    obj.set(Attr::RemoteInfo, info);
  }

  let dep = reg.create(ObjKind::TargetDependency)?;
  {
    let obj = reg.obj_mut(dep);
    obj.comment = "PBXTargetDependency".to_string();
    obj.set(Attr::Target, Value::Ref(to));
    obj.set(Attr::TargetProxy, Value::Ref(proxy));
  }

  reg.obj_mut(from).push_to_list(Attr::Dependencies, Value::Ref(dep));
  tracing::debug!("{} -> {}", from_name, to_name);
  Ok(())
}

/// Fold external libraries, search paths and dependent library products into
/// the target's per-configuration build settings.
pub fn apply_link_inputs(reg: &mut Registry, ctx: &Context, name: &str,
                         target: &Target, rec: &TargetRec,
                         records: &BTreeMap<String, TargetRec>) {
  if !rec.linkable {
    return
  }

  let flags_key = match target.is_library()
    && target.target_type != TargetType::SharedLibrary {
    true  => "OTHER_LIBTOOLFLAGS",
    false => "OTHER_LDFLAGS"
  };

  let mut flags = String::new();
  for lib in &target.libs {
    crate::ctx::append_flags(&mut flags, &["-l", lib].join(""));
  }
  for dep in &target.depends {
    if let Some(dep_rec) = records.get(dep) {
      if dep_rec.library {
        if let Some(product) = &dep_rec.product {
          let path = format!(
            "{}/$(CONFIGURATION)$(EFFECTIVE_PLATFORM_NAME)/{}",
            ctx.build_dir.display(), product);
          crate::ctx::append_flags(&mut flags, &path);
        }
      }
    }
  }

  // Each directory twice: the configuration-qualified layout Xcode builds
  // into, and the plain one for prebuilt libraries.
  let mut search = Vec::<String>::new();
  for dir in &target.lib_dirs {
    let full = ctx.input_dir.join(dir);
    let full = full.to_string_lossy();
    let qualified = format!("{}/$(CONFIGURATION)$(EFFECTIVE_PLATFORM_NAME)", full);
    for d in &[qualified, full.into_owned()] {
      if !search.contains(d) {
        search.push(d.clone());
      }
    }
  }

  for cfg in &rec.configs {
    if !flags.is_empty() {
      append_setting(reg, *cfg, flags_key, &flags);
    }
    if !search.is_empty() {
      let list = Value::List(search.iter().map(|d| reg.intern(d)).collect());
      set_setting_value(reg, *cfg, "LIBRARY_SEARCH_PATHS", list);
    }
  }

  if !flags.is_empty() || !search.is_empty() {
    tracing::debug!("{}: {} link flags, {} search paths",
                    name, target.libs.len() + target.depends.len(), search.len());
  }
}

/// Append to a string-valued build setting on one configuration object.
fn append_setting(reg: &mut Registry, cfg: ObjId, key: &str, addition: &str) {
  let current = match reg.obj(cfg).get(&Attr::BuildSettings) {
    Some(Value::Dict(pairs)) => pairs.iter()
      .find(|(k, _)| k == key)
      .and_then(|(_, v)| match v {
        Value::Str(s) => Some(s.to_string()),
        _             => None
      }),
    _ => None
  };

  let merged = match current {
    Some(mut s) => {
      crate::ctx::append_flags(&mut s, addition);
      s
    }
    None => addition.to_string()
  };
  let value = reg.intern(&merged);
  set_setting_value(reg, cfg, key, value);
}

fn set_setting_value(reg: &mut Registry, cfg: ObjId, key: &str, value: Value) {
  if let Some(Value::Dict(pairs)) = reg.obj_mut(cfg).attrs.iter_mut()
    .find(|(a, _)| *a == Attr::BuildSettings)
    .map(|(_, v)| v)
  {
    match pairs.iter_mut().find(|(k, _)| k == key) {
      Some((_, v)) => *v = value,
      None => {
        // Keep the dictionary sorted by key.
        let at = pairs.iter().position(|(k, _)| k.as_str() > key)
          .unwrap_or_else(|| pairs.len());
        pairs.insert(at, (key.to_string(), value));
      }
    }
  }
}

/// The script phase every linkable target ends with, handing the product
/// over to the depend-helper makefile.
pub fn depend_check_phase(reg: &mut Registry, ctx: &Context, name: &str)
                          -> Result<ObjId, GenError> {
  let script = format!(
    "make -C {} -f {} PostBuild.{}.$CONFIGURATION\n",
    escape_path(&ctx.build_dir.to_string_lossy()), DEPEND_HELPER, name);
  script_phase(reg, "Depend Check", &script)
}

/// Write the depend-helper makefile: one `PostBuild.<target>.<config>` entry
/// point per linkable target, removing the product whenever a linked library
/// is newer, plus dummy rules so absent prerequisites do not fail make.
/// Regenerated unconditionally, every pass.
pub fn write_depend_helper(ctx: &Context,
                           records: &BTreeMap<String, TargetRec>)
                           -> std::io::Result<()> {
  let mut s = String::new();
  write!(s, "# Generated by {}. Do not edit.\n", env!("CARGO_PKG_NAME")).unwrap();
  write!(s, "# Keeps linkable products in sync with the libraries they link.\n\n")
    .unwrap();
  write!(s, "default:\n\t@echo \"Only meant to be invoked from the generated \
             project\"\n\n").unwrap();

  let mut prerequisites = Vec::<String>::new();

  for (name, rec) in records {
    if !rec.linkable {
      continue
    }
    let product = match &rec.product {
      Some(p) => p,
      None    => continue
    };

    for config in ctx.configurations() {
      let product_path = config_path(ctx, config, product);

      let deps: Vec<String> = ctx.project.targets[name].depends.iter()
        .filter_map(|dep| records.get(dep))
        .filter(|r| r.library)
        .filter_map(|r| r.product.as_ref())
        .map(|p| config_path(ctx, config, p))
        .collect();

      write!(s, "PostBuild.{}.{}:", name, config).unwrap();
      if deps.is_empty() {
        write!(s, "\n").unwrap();
        continue
      }
      write!(s, " {}\n", escape_path(&product_path)).unwrap();

      write!(s, "{}:", escape_path(&product_path)).unwrap();
      for dep in &deps {
        write!(s, " \\\n\t{}", escape_path(dep)).unwrap();
        if !prerequisites.contains(dep) {
          prerequisites.push(dep.clone());
        }
      }
      write!(s, "\n\trm -f {}\n\n", escape_path(&product_path)).unwrap();
    }
  }

  if !prerequisites.is_empty() {
    write!(s, "\n# Dummy rules so the prerequisites do not have to exist.\n")
      .unwrap();
    for p in &prerequisites {
      write!(s, "{}:\n", escape_path(p)).unwrap();
    }
  }

  // Always rewritten; the content depends on the full link graph and a stale
  // helper quietly skips rebuilds.
  let path = ctx.build_dir.join(DEPEND_HELPER);
  if let Some(dir) = path.parent() {
    std::fs::create_dir_all(dir)?;
  }
  std::fs::write(&path, s.as_bytes())
}

fn config_path(ctx: &Context, config: &str, product: &str) -> String {
  ctx.build_dir.join(config).join(product).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn product_files_per_type() {
    let t = |tt| Target { target_type: tt, ..Target::default() };
    assert_eq!(product_file("App", &t(TargetType::Application)),
               Some("App.app/Contents/MacOS/App".to_string()));
    assert_eq!(product_file("Core", &t(TargetType::StaticLibrary)),
               Some("libCore.a".to_string()));
    assert_eq!(product_file("Core", &t(TargetType::SharedLibrary)),
               Some("libCore.dylib".to_string()));
    assert_eq!(product_file("Tool", &t(TargetType::Console)),
               Some("Tool".to_string()));
    assert_eq!(product_file("Gen", &t(TargetType::Custom)), None);
  }

  #[test]
  fn connect_builds_proxy_and_dependency() {
    let mut reg = Registry::new("Demo");
    let root = reg.create(ObjKind::Project).unwrap();
    let a    = reg.create(ObjKind::NativeTarget).unwrap();
    let b    = reg.create(ObjKind::NativeTarget).unwrap();

    connect(&mut reg, root, a, "App", b, "Core").unwrap();

    // One proxy, one dependency, attached to the depending target.
    match reg.obj(a).get(&Attr::Dependencies) {
      Some(Value::List(deps)) => assert_eq!(deps.len(), 1),
      other                   => panic!("unexpected dependencies: {:?}",
                                        other.is_some())
    }
    assert!(reg.validate().is_ok());
  }

  #[test]
  fn settings_stay_sorted_after_insert() {
    let mut reg = Registry::new("Demo");
    let cfg = reg.create(ObjKind::BuildConfiguration).unwrap();
    let b = reg.intern("1");
    let z = reg.intern("2");
    reg.obj_mut(cfg).set(Attr::BuildSettings, Value::Dict(vec![
      ("B".to_string(), b),
      ("Z".to_string(), z)
    ]));

    let v = reg.intern("x");
    set_setting_value(&mut reg, cfg, "M", v);

    match reg.obj(cfg).get(&Attr::BuildSettings) {
      Some(Value::Dict(pairs)) => {
        let keys: Vec<_> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["B", "M", "Z"]);
      }
      _ => panic!("missing buildSettings")
    }
  }

  #[test]
  fn append_setting_concatenates() {
    let mut reg = Registry::new("Demo");
    let cfg = reg.create(ObjKind::BuildConfiguration).unwrap();
    reg.obj_mut(cfg).set(Attr::BuildSettings, Value::Dict(Vec::new()));

    append_setting(&mut reg, cfg, "OTHER_LDFLAGS", "-lz");
    append_setting(&mut reg, cfg, "OTHER_LDFLAGS", "-lcurl");

    match reg.obj(cfg).get(&Attr::BuildSettings) {
      Some(Value::Dict(pairs)) => match &pairs[0].1 {
        Value::Str(s) => assert_eq!(s.as_ref(), "-lz -lcurl"),
        _             => panic!("expected a string")
      },
      _ => panic!("missing buildSettings")
    }
  }
}

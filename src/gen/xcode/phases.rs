//! Source classification and build-phase assembly.
//!
//! Phases appear in a fixed order no matter what the project file declares:
//! prebuild scripts, custom rules, headers, resources, bundle-content copies,
//! deep-resource copies, compiled sources, prelink scripts, frameworks, then
//! postbuild scripts. Empty phases are dropped.

use std::fmt::Write;

use crate::ctx::{Context, CustomCommand, Language, SourceFile, Target,
                 escape_path};
use crate::diag::{Diagnostics, GenError};
use crate::gen::write_if_different;
use super::groups::Groups;
use super::obj::{Attr, ObjId, ObjKind, Registry, Value};

/// What a source file contributes to the build. Each file lands in exactly
/// one bucket.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Class {
  Header,
  Resource,
  Compiled(Language),
  ExternalObject,
  /// Copied into the named bundle folder.
  BundleContent(String),
  /// Copied as a resource, preserving the directory it came from.
  DeepResource(String),
  Ignored
}

const HEADER_EXTS:   &[&str] = &["h", "hh", "hpp", "hxx", "inl"];
const RESOURCE_EXTS: &[&str] = &["xib", "storyboard", "strings", "png", "jpg",
                                 "icns", "xcassets"];

pub fn classify(name: &str, file: &SourceFile, diags: &mut Diagnostics) -> Class {
  let ext = file.extension();

  let check_override = |what: &str, diags: &mut Diagnostics| {
    if file.language.is_some() {
      diags.input(GenError::BadLanguageOverride {
        file:   format!("{}: {}", name, file.path.display()),
        reason: what.to_string()
      });
    }
  };

  if let Some(dst) = &file.bundle_dir {
    check_override("file is copied into the bundle", diags);
    return Class::BundleContent(dst.clone())
  }
  if file.deep_resource {
    check_override("file is a deep resource", diags);
    let dir = file.path.parent()
      .map(|p| p.to_string_lossy().into_owned())
      .unwrap_or_default();
    return Class::DeepResource(dir)
  }
  if file.header_only || HEADER_EXTS.contains(&ext) {
    check_override("header-only file", diags);
    return Class::Header
  }
  if file.resource || RESOURCE_EXTS.contains(&ext) {
    check_override("resource file", diags);
    return Class::Resource
  }
  if ext == "o" {
    return Class::ExternalObject
  }
  if let Some(lang) = file.language.or_else(|| Language::from_extension(ext)) {
    return Class::Compiled(lang)
  }
  Class::Ignored
}

/// The languages compiled in a target, sorted and de-duplicated. Drives both
/// the settings resolver and the linker-language check. Classification
/// problems are reported later, when the phases are assembled.
pub fn languages(name: &str, sources: &[SourceFile]) -> Vec<Language> {
  let mut scratch = Diagnostics::new();
  let mut langs: Vec<Language> = sources.iter()
    .filter_map(|f| match classify(name, f, &mut scratch) {
      Class::Compiled(lang) => Some(lang),
      _                     => None
    })
    .collect();
  langs.sort();
  langs.dedup();
  langs
}

/// Assemble the build phases for one target, in their fixed order. Also
/// writes the per-configuration rules makefiles the script phases invoke.
pub fn assemble(reg: &mut Registry, ctx: &Context, groups: &mut Groups,
                name: &str, target: &Target, diags: &mut Diagnostics)
                -> Result<Vec<ObjId>, GenError> {
  let mut phases  = Vec::new();
  let mut ordinal = 0u32;

  if let Some(id) = rules_phase(reg, ctx, name, "prebuild", "Girder PreBuild Rules",
                                &target.prebuild, &mut ordinal)? {
    phases.push(id);
  }
  if let Some(id) = rules_phase(reg, ctx, name, "rules", "Girder Rules",
                                &target.rules, &mut ordinal)? {
    phases.push(id);
  }

  // Bucket the sources once.
  let mut headers   = Vec::new();
  let mut resources = Vec::new();
  let mut compiled  = Vec::new();
  let mut objects   = Vec::new();
  let mut contents  = Vec::<(String, Vec<&SourceFile>)>::new();
  let mut deep      = Vec::<(String, Vec<&SourceFile>)>::new();

  for file in ctx.target_sources(name) {
    match classify(name, file, diags) {
      Class::Header            => headers.push(file),
      Class::Resource          => resources.push(file),
      Class::Compiled(_)       => compiled.push(file),
      Class::ExternalObject    => objects.push(file),
      Class::BundleContent(d)  => push_bucket(&mut contents, d, file),
      Class::DeepResource(d)   => push_bucket(&mut deep, d, file),
      Class::Ignored           => {
        tracing::debug!("{}: ignoring {}", name, file.path.display());
        groups.file_ref(reg, name, file)?;  // Still visible in the tree.
      }
    }
  }

  if target.is_bundle() && !headers.is_empty() {
    let id = files_phase(reg, groups, ObjKind::HeadersBuildPhase, "Headers",
                         name, &headers)?;
    phases.push(id);
  } else {
    for file in &headers {
      groups.file_ref(reg, name, file)?;
    }
  }

  if target.is_bundle() && !resources.is_empty() {
    let id = files_phase(reg, groups, ObjKind::ResourcesBuildPhase, "Resources",
                         name, &resources)?;
    phases.push(id);
  } else {
    for file in &resources {
      groups.file_ref(reg, name, file)?;
    }
  }

  for (dst, files) in &contents {
    phases.push(copy_phase(reg, groups, name, dst, "6", files)?);
  }
  for (dst, files) in &deep {
    phases.push(copy_phase(reg, groups, name, dst, "7", files)?);
  }

  if !compiled.is_empty() {
    let id = files_phase(reg, groups, ObjKind::SourcesBuildPhase, "Sources",
                         name, &compiled)?;
    phases.push(id);
  }

  if let Some(id) = rules_phase(reg, ctx, name, "prelink", "Girder PreLink Rules",
                                &target.prelink, &mut ordinal)? {
    phases.push(id);
  }

  if !objects.is_empty() {
    let id = files_phase(reg, groups, ObjKind::FrameworksBuildPhase, "Frameworks",
                         name, &objects)?;
    phases.push(id);
  }

  if let Some(id) = rules_phase(reg, ctx, name, "postbuild", "Girder PostBuild Rules",
                                &target.postbuild, &mut ordinal)? {
    phases.push(id);
  }

  Ok(phases)
}

fn push_bucket<'a>(buckets: &mut Vec<(String, Vec<&'a SourceFile>)>,
                   dst: String, file: &'a SourceFile) {
  match buckets.iter_mut().find(|(d, _)| *d == dst) {
    Some((_, files)) => files.push(file),
    None             => buckets.push((dst, vec![file]))
  }
}

/// A phase holding build files: sources, headers, resources or frameworks.
fn files_phase(reg: &mut Registry, groups: &mut Groups, kind: ObjKind,
               phase_name: &str, target: &str, files: &[&SourceFile])
               -> Result<ObjId, GenError> {
  let id = reg.create(kind)?;
  {
    let mask = reg.intern("2147483647");
    let zero = reg.intern("0");
    let obj  = reg.obj_mut(id);
    obj.comment = phase_name.to_string();
    obj.set(Attr::BuildActionMask, mask);
    obj.set(Attr::Files, Value::List(Vec::new()));
    obj.set(Attr::RunOnlyForDeploymentPostprocessing, zero);
  }

  for file in files {
    let file_ref = groups.file_ref(reg, target, file)?;
    let bf = build_file(reg, file_ref, file, phase_name)?;
    reg.obj_mut(id).push_to_list(Attr::Files, Value::Ref(bf));
  }
  Ok(id)
}

fn copy_phase(reg: &mut Registry, groups: &mut Groups, target: &str, dst: &str,
              spec: &str, files: &[&SourceFile]) -> Result<ObjId, GenError> {
  let id = reg.create(ObjKind::CopyFilesBuildPhase)?;
  {
    let mask     = reg.intern("2147483647");
    let dst_path = reg.intern(dst);
    let dst_spec = reg.intern(spec);
    let zero     = reg.intern("0");
    let obj = reg.obj_mut(id);
    obj.comment = "CopyFiles".to_string();
    obj.set(Attr::BuildActionMask, mask);
    obj.set(Attr::DstPath, dst_path);
    obj.set(Attr::DstSubfolderSpec, dst_spec);
    obj.set(Attr::Files, Value::List(Vec::new()));
    obj.set(Attr::RunOnlyForDeploymentPostprocessing, zero);
  }

  for file in files {
    let file_ref = groups.file_ref(reg, target, file)?;
    let bf = build_file(reg, file_ref, file, "CopyFiles")?;
    reg.obj_mut(id).push_to_list(Attr::Files, Value::Ref(bf));
  }
  Ok(id)
}

fn build_file(reg: &mut Registry, file_ref: ObjId, file: &SourceFile,
              phase_name: &str) -> Result<ObjId, GenError> {
  let id = reg.create(ObjKind::BuildFile)?;
  let settings = match file.flags.is_empty() {
    true  => None,
    false => {
      let flags = reg.intern(&file.flags);
      Some(Value::Dict(vec![("COMPILER_FLAGS".to_string(), flags)]))
    }
  };
  let obj = reg.obj_mut(id);
  obj.comment = [file.name(), " in ", phase_name].join("");
  obj.set(Attr::FileRef, Value::Ref(file_ref));
  if let Some(settings) = settings {
    obj.set(Attr::Settings, settings);
  }
  Ok(id)
}

/// A shell-script phase running commands through a generated makefile, one
/// makefile per configuration. Returns None when there are no commands.
fn rules_phase(reg: &mut Registry, ctx: &Context, target: &str, suffix: &str,
               phase_name: &str, commands: &[CustomCommand], ordinal: &mut u32)
               -> Result<Option<ObjId>, GenError> {
  if commands.is_empty() {
    return Ok(None)
  }

  let makefile = ["girder-scripts/", target, "_", suffix, ".make"].join("");
  let base     = *ordinal;
  for config in ctx.configurations() {
    let text = rules_makefile(ctx, target, commands, config, base);
    let path = ctx.build_dir.join([&makefile, ".", config].join(""));
    write_if_different(&path, text.as_bytes())?;
  }
  *ordinal += commands.len() as u32;

  let script = format!(
    "set -e\nmake -C {} -f {}.$CONFIGURATION all\n",
    escape_path(&ctx.build_dir.to_string_lossy()),
    escape_path(&makefile));

  Ok(Some(script_phase(reg, phase_name, &script)?))
}

pub fn script_phase(reg: &mut Registry, phase_name: &str, script: &str)
                    -> Result<ObjId, GenError> {
  let id = reg.create(ObjKind::ShellScriptBuildPhase)?;
  let mask   = reg.intern("2147483647");
  let name_v = reg.intern(phase_name);
  let zero   = reg.intern("0");
  let zero2  = zero.clone();
  let shell  = reg.intern("/bin/sh");
  let text   = reg.intern(script);

  let obj = reg.obj_mut(id);
  obj.comment = phase_name.to_string();
  obj.set(Attr::BuildActionMask, mask);
  obj.set(Attr::Files, Value::List(Vec::new()));
  obj.set(Attr::InputPaths, Value::List(Vec::new()));
  obj.set(Attr::Name, name_v);
  obj.set(Attr::OutputPaths, Value::List(Vec::new()));
  obj.set(Attr::RunOnlyForDeploymentPostprocessing, zero);
  obj.set(Attr::ShellPath, shell);
  obj.set(Attr::ShellScript, text);
  obj.set(Attr::Custom("showEnvVarsInLog".to_string()), zero2);
  Ok(id)
}

/// The makefile behind one rules phase. Commands without declared outputs
/// get a force target so `make all` always re-runs them.
fn rules_makefile(ctx: &Context, target: &str, commands: &[CustomCommand],
                  config: &str, base_ordinal: u32) -> String {
  let mut s = String::new();
  write!(s, "# Generated by {} for the {} configuration. Do not edit.\n\n",
         env!("CARGO_PKG_NAME"), config).unwrap();

  write!(s, "all:").unwrap();
  for (i, cmd) in commands.iter().enumerate() {
    match cmd.outputs.first() {
      Some(out) => write!(s, " \\\n\t{}", escape_path(out)).unwrap(),
      None => write!(s, " \\\n\t{}_buildpart_{}",
                     target, base_ordinal + i as u32).unwrap()
    }
  }
  write!(s, "\n\n").unwrap();

  for (i, cmd) in commands.iter().enumerate() {
    if let Some(comment) = &cmd.comment {
      write!(s, "# {}\n", comment).unwrap();
    }
    match cmd.outputs.is_empty() {
      false => {
        let outs: Vec<_> = cmd.outputs.iter()
          .map(|o| escape_path(o).into_owned())
          .collect();
        write!(s, "{}:", outs.join(" ")).unwrap();
      }
      true => write!(s, "{}_buildpart_{}:", target, base_ordinal + i as u32).unwrap()
    }
    for dep in &cmd.depends {
      write!(s, " \\\n\t{}", escape_path(dep)).unwrap();
    }
    write!(s, "\n").unwrap();

    match &cmd.working_dir {
      Some(dir) => {
        let dir = ctx.input_dir.join(dir);
        write!(s, "\tcd {} && {}\n", escape_path(&dir.to_string_lossy()),
               cmd.command).unwrap();
      }
      None => write!(s, "\t{}\n", cmd.command).unwrap()
    }
    write!(s, "\n").unwrap();
  }
  s
}

#[cfg(test)]
mod tests {
  use super::*;

  fn diags() -> Diagnostics {
    Diagnostics::new()
  }

  #[test]
  fn classification_buckets() {
    let mut d = diags();
    assert_eq!(classify("t", &SourceFile::new("a.c"), &mut d),
               Class::Compiled(Language::C));
    assert_eq!(classify("t", &SourceFile::new("a.hpp"), &mut d), Class::Header);
    assert_eq!(classify("t", &SourceFile::new("a.xib"), &mut d), Class::Resource);
    assert_eq!(classify("t", &SourceFile::new("a.o"), &mut d),
               Class::ExternalObject);
    assert_eq!(classify("t", &SourceFile::new("README"), &mut d), Class::Ignored);
    assert!(!d.has_input_errors());
  }

  #[test]
  fn metadata_beats_extension() {
    let mut d = diags();

    let header_only = SourceFile { header_only: true, ..SourceFile::new("a.c") };
    assert_eq!(classify("t", &header_only, &mut d), Class::Header);

    let resource = SourceFile { resource: true, ..SourceFile::new("a.dat") };
    assert_eq!(classify("t", &resource, &mut d), Class::Resource);

    let content = SourceFile {
      bundle_dir: Some("PlugIns".to_string()),
      ..SourceFile::new("a.dylib")
    };
    assert_eq!(classify("t", &content, &mut d),
               Class::BundleContent("PlugIns".to_string()));

    let deep = SourceFile { deep_resource: true, ..SourceFile::new("data/maps/x.dat") };
    assert_eq!(classify("t", &deep, &mut d),
               Class::DeepResource("data/maps".to_string()));
    assert!(!d.has_input_errors());
  }

  #[test]
  fn language_override_on_header_is_an_input_error() {
    let mut d = diags();
    let bad = SourceFile {
      header_only: true,
      language:    Some(Language::Cxx),
      ..SourceFile::new("a.h")
    };
    // Classification still proceeds; the pass reports and continues.
    assert_eq!(classify("t", &bad, &mut d), Class::Header);
    assert!(d.has_input_errors());
  }

  #[test]
  fn languages_are_sorted_and_unique() {
    let sources = vec![
      SourceFile::new("b.cpp"),
      SourceFile::new("a.c"),
      SourceFile::new("c.cpp"),
      SourceFile::new("d.h")
    ];
    assert_eq!(languages("t", &sources), vec![Language::C, Language::Cxx]);
  }
}

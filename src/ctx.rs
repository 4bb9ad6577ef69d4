use clap::{App, ArgMatches};
use serde::Deserialize;
use serde_repr::Deserialize_repr;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub trait Command {
  fn init<'a, 'b>(&self, cmd: App<'a, 'b>) -> App<'a, 'b>;

  fn run(&self, ctx: &Context) -> RunResult;
}

pub trait Generator {
  fn run(&self, ctx: &Context) -> RunResult;
}

pub type DynResult<T> = Result<T, Box<dyn std::error::Error>>;
pub type RunResult    = DynResult<()>;

pub type Commands   = BTreeMap<&'static str, Box<dyn Command>>;
pub type Generators = BTreeMap<&'static str, Box<dyn Generator>>;

/// Resolved source files per target, keyed by target name. BTreeMap so every
/// pass walks targets in the same order.
pub type AllSources = BTreeMap<String, Vec<SourceFile>>;

pub struct Context<'a> {
  pub commands:   Commands,
  pub generators: Generators,

  pub input_dir: PathBuf,
  pub build_dir: PathBuf,

  pub env:     &'a Env,
  pub args:    &'a ArgMatches<'a>,
  pub project: &'a Project,
  pub sources: &'a AllSources
}

impl<'a> Context<'a> {
  pub fn configurations(&self) -> &'_ [String] {
    &self.project.info.configurations
  }

  pub fn target_sources(&self, name: &str) -> &'_ [SourceFile] {
    self.sources.get(name).map(Vec::as_slice).unwrap_or(&[])
  }

  /// The directory holding generated makefiles and the id cache.
  pub fn scripts_dir(&self) -> PathBuf {
    self.build_dir.join("girder-scripts")
  }
}

/// One resolved source file: the path relative to the input directory plus
/// the per-file metadata merged from the target's `[[source]]` entries.
#[derive(Clone, Debug, Default)]
pub struct SourceFile {
  pub path: PathBuf,

  /// Declared group path, `\`-separated. Empty means the target root group.
  pub group: String,

  pub language:      Option<Language>,
  pub flags:         String,
  pub header_only:   bool,
  pub resource:      bool,
  pub bundle_dir:    Option<String>,
  pub deep_resource: bool
}

impl SourceFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    SourceFile { path: path.into(), ..SourceFile::default() }
  }

  pub fn name(&self) -> &'_ str {
    self.path.file_name().and_then(|n| n.to_str()).unwrap_or("")
  }

  pub fn extension(&self) -> &'_ str {
    self.path.extension().and_then(|e| e.to_str()).unwrap_or("")
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Env {
  pub cflags:   String,
  pub cxxflags: String,
  pub ldflags:  String
}

#[derive(Debug, Deserialize)]
pub struct Project {
  #[serde(rename = "project")]
  pub info: ProjectInfo,

  pub targets: BTreeMap<String, Target>
}

impl std::ops::Deref for Project {
  type Target = ProjectInfo;

  fn deref(&self) -> &ProjectInfo {
    &self.info
  }
}

fn default_configurations() -> Vec<String> {
  vec!["Debug".to_string(), "Release".to_string()]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectInfo {
  pub name:    String,
  pub version: String,

  #[serde(default)]
  pub description: String,

  #[serde(default)]
  pub min_girder_version: String,

  #[serde(default = "default_configurations")]
  pub configurations: Vec<String>,

  /// Emit shared .xcscheme files alongside the project bundle.
  #[serde(default)]
  pub xcode_schemes: bool,

  #[serde(default)]
  pub settings: Settings,

  /// Project-level raw attribute overrides, applied after computed settings.
  #[serde(default)]
  pub xcode_attributes: BTreeMap<String, String>
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Target {
  #[serde(rename = "type")]
  pub target_type: TargetType,

  pub sources: Vec<String>,

  pub depends: Vec<String>,

  pub libs:     Vec<String>,
  pub lib_dirs: Vec<String>,

  /// Forces the linker language when sources alone cannot decide it.
  pub language: Option<Language>,

  #[serde(flatten)]
  pub settings: Settings,

  /// Per-configuration overrides of the target-level settings.
  pub config: BTreeMap<String, Settings>,

  /// Per-file metadata; `file` matches the path relative to the input dir.
  pub source: Vec<SourceSpec>,

  pub prebuild:  Vec<CustomCommand>,
  pub rules:     Vec<CustomCommand>,
  pub prelink:   Vec<CustomCommand>,
  pub postbuild: Vec<CustomCommand>,

  /// Raw attribute overrides, the escape hatch past the settings resolver.
  /// Names may carry a `[variant=<config>]` qualifier.
  pub xcode_attributes: BTreeMap<String, String>
}

impl Target {
  pub fn is_bundle(&self) -> bool {
    self.target_type == TargetType::Application
  }

  pub fn is_linkable(&self) -> bool {
    self.target_type != TargetType::Custom
  }

  /// Targets whose product ends up on somebody's link line.
  pub fn is_library(&self) -> bool {
    match self.target_type {
      TargetType::StaticLibrary |
      TargetType::SharedLibrary |
      TargetType::ObjectLibrary => true,
      _                         => false
    }
  }

  /// Merged settings for one configuration: defaults for the configuration
  /// name, then target-level settings, then the per-configuration block.
  pub fn settings_for(&self, config: &str) -> Settings {
    let mut s = Settings::defaults_for(config);
    s.merge(&self.settings);
    if let Some(over) = self.config.get(config) {
      s.merge(over);
    }
    s
  }

  pub fn spec_for(&self, path: &Path) -> Option<&'_ SourceSpec> {
    self.source.iter().find(|s| Path::new(&s.file) == path)
  }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SourceSpec {
  pub file: String,

  pub group: String,

  pub language: Option<Language>,

  pub flags: String,

  pub header_only: bool,
  pub resource:    bool,

  /// Copy into this bundle folder instead of any build phase.
  pub bundle_dir: Option<String>,

  /// Copy as a resource preserving its directory structure.
  pub deep_resource: bool
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CustomCommand {
  pub command: String,

  pub outputs: Vec<String>,
  pub depends: Vec<String>,

  pub comment:     Option<String>,
  pub working_dir: Option<String>
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
  /// A command-line executable.
  Console,
  /// A bundled application. Gets an Info.plist and resource phases.
  Application,
  /// A static library, generates a *.a file.
  StaticLibrary,
  /// A dynamic library, generates a *.dylib file.
  SharedLibrary,
  /// Compiles objects without producing a linked artifact of its own.
  ObjectLibrary,
  /// Custom commands only, no compile or link step.
  Custom
}

impl Default for TargetType {
  fn default() -> Self { TargetType::Console }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[serde(rename_all = "kebab-case")]
pub enum Language {
  C,
  Cxx,
  ObjC,
  ObjCxx,
  Swift,
  Asm
}

impl Language {
  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext {
      "c"                  => Some(Language::C),
      "cc" | "cpp" | "cxx" => Some(Language::Cxx),
      "m"                  => Some(Language::ObjC),
      "mm"                 => Some(Language::ObjCxx),
      "swift"              => Some(Language::Swift),
      "s" | "S" | "asm"    => Some(Language::Asm),
      _                    => None
    }
  }

}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Optimize {
  None,
  Size,
  Speed,
  Full
}

#[derive(Clone, Copy, Debug, Deserialize_repr, PartialEq)]
#[repr(u8)]
pub enum CStandard {
  C89 = 89,
  C99 = 99,
  C11 = 11
}

#[derive(Clone, Copy, Debug, Deserialize_repr, PartialEq)]
#[repr(u8)]
pub enum CXXStandard {
  CXX03 =  3,
  CXX11 = 11,
  CXX14 = 14,
  CXX17 = 17
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
  pub include_dirs: Vec<String>,

  pub warning_level:    Option<u8>,
  pub warning_as_error: Option<bool>,

  pub optimize:   Option<Optimize>,
  pub debug_info: Option<bool>,

  pub defines: Vec<String>,

  pub pic:               Option<bool>,
  pub visibility_hidden: Option<bool>,

  pub c_standard:   Option<CStandard>,
  pub cxx_standard: Option<CXXStandard>,

  /// Free-text compiler flags, appended verbatim after computed flags.
  pub flags: String,

  /// Free-text linker flags.
  pub ldflags: String
}

impl Settings {
  /// Built-in defaults for the well-known configuration names. Unknown
  /// names get warnings only.
  pub fn defaults_for(config: &str) -> Self {
    match config {
      "Release" => Settings {
        warning_level: Some(3),
        optimize:      Some(Optimize::Full),
        debug_info:    Some(false),
        ..Settings::default()
      },
      "MinSizeRel" => Settings {
        warning_level: Some(3),
        optimize:      Some(Optimize::Size),
        debug_info:    Some(false),
        ..Settings::default()
      },
      "RelWithDebInfo" => Settings {
        warning_level: Some(3),
        optimize:      Some(Optimize::Speed),
        debug_info:    Some(true),
        ..Settings::default()
      },
      _ => Settings {
        warning_level: Some(3),
        optimize:      Some(Optimize::None),
        debug_info:    Some(config == "Debug"),
        ..Settings::default()
      }
    }
  }

  pub fn merge(&mut self, o: &Settings) {
    self.include_dirs.extend(o.include_dirs.iter().cloned());

    merge_opt(&mut self.warning_level,    o.warning_level);
    merge_opt(&mut self.warning_as_error, o.warning_as_error);

    merge_opt(&mut self.optimize,   o.optimize);
    merge_opt(&mut self.debug_info, o.debug_info);

    self.defines.extend(o.defines.iter().cloned());

    merge_opt(&mut self.pic,               o.pic);
    merge_opt(&mut self.visibility_hidden, o.visibility_hidden);

    merge_opt(&mut self.c_standard,   o.c_standard);
    merge_opt(&mut self.cxx_standard, o.cxx_standard);

    append_flags(&mut self.flags,   &o.flags);
    append_flags(&mut self.ldflags, &o.ldflags);
  }
}

fn merge_opt<T: Copy>(a: &mut Option<T>, b: Option<T>) {
  if b.is_some() {
    *a = b;
  }
}

pub fn append_flags(dst: &mut String, src: &str) {
  if !src.is_empty() {
    if !dst.is_empty() {
      dst.push(' ');
    }
    dst.push_str(src);
  }
}

/// Quote a path for a make command line when it contains spaces.
pub fn escape_path(p: &str) -> Cow<'_, str> {
  match p.contains(' ') {
    true  => Cow::Owned(["\"", p, "\""].join("")),
    false => Cow::Borrowed(p)
  }
}

/// Path rendering for makefiles: relative to `base` when possible.
pub fn relative_for_make(base: &Path, p: &Path) -> String {
  let rel = pathdiff::diff_paths(p, base).unwrap_or_else(|| p.to_path_buf());
  let s   = rel.to_string_lossy();
  match s.is_empty() {
    true  => ".".to_string(),
    false => s.into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn settings_merge_prefers_override() {
    let mut s = Settings::defaults_for("Debug");
    assert_eq!(s.optimize,   Some(Optimize::None));
    assert_eq!(s.debug_info, Some(true));

    let over = Settings { optimize: Some(Optimize::Speed), ..Settings::default() };
    s.merge(&over);
    assert_eq!(s.optimize,   Some(Optimize::Speed));
    assert_eq!(s.debug_info, Some(true));
  }

  #[test]
  fn settings_for_layers_config_block() {
    let mut t = Target::default();
    t.settings.defines.push("COMMON".to_string());
    t.config.insert("Release".to_string(), Settings {
      defines: vec!["FAST".to_string()],
      ..Settings::default()
    });

    let s = t.settings_for("Release");
    assert_eq!(s.defines,  vec!["COMMON".to_string(), "FAST".to_string()]);
    assert_eq!(s.optimize, Some(Optimize::Full));

    let s = t.settings_for("Debug");
    assert_eq!(s.defines, vec!["COMMON".to_string()]);
  }

  #[test]
  fn language_from_extension() {
    assert_eq!(Language::from_extension("cpp"), Some(Language::Cxx));
    assert_eq!(Language::from_extension("m"),   Some(Language::ObjC));
    assert_eq!(Language::from_extension("h"),   None);
  }

  #[test]
  fn escape_path_quotes_spaces() {
    assert_eq!(escape_path("/a/b"),   "/a/b");
    assert_eq!(escape_path("/a b/c"), "\"/a b/c\"");
  }
}

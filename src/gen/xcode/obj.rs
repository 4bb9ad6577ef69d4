//! Arena of project objects for one generation pass.
//!
//! Objects never hold pointers to each other; every cross-reference is an
//! `ObjId` index into the registry. Identifiers are 96-bit hex strings: a
//! 32-bit creation counter (keeps Xcode from reordering objects) followed by
//! 64 bits drawn from a generator seeded with the project name, so repeated
//! passes over the same input mint the same ids in the same order.

use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::cache::IdCache;
use crate::diag::GenError;

/// Handle to an object in the registry. Only meaningful for the pass that
/// created it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ObjId(usize);

/// Closed set of object kinds. The serializer derives both the `isa` value
/// and the section name from it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjKind {
  AggregateTarget,
  BuildFile,
  ContainerItemProxy,
  CopyFilesBuildPhase,
  FileReference,
  FrameworksBuildPhase,
  Group,
  HeadersBuildPhase,
  NativeTarget,
  Project,
  ResourcesBuildPhase,
  ShellScriptBuildPhase,
  SourcesBuildPhase,
  TargetDependency,
  BuildConfiguration,
  ConfigurationList
}

impl ObjKind {
  pub fn isa(self) -> &'static str {
    match self {
      ObjKind::AggregateTarget       => "PBXAggregateTarget",
      ObjKind::BuildFile             => "PBXBuildFile",
      ObjKind::ContainerItemProxy    => "PBXContainerItemProxy",
      ObjKind::CopyFilesBuildPhase   => "PBXCopyFilesBuildPhase",
      ObjKind::FileReference         => "PBXFileReference",
      ObjKind::FrameworksBuildPhase  => "PBXFrameworksBuildPhase",
      ObjKind::Group                 => "PBXGroup",
      ObjKind::HeadersBuildPhase     => "PBXHeadersBuildPhase",
      ObjKind::NativeTarget          => "PBXNativeTarget",
      ObjKind::Project               => "PBXProject",
      ObjKind::ResourcesBuildPhase   => "PBXResourcesBuildPhase",
      ObjKind::ShellScriptBuildPhase => "PBXShellScriptBuildPhase",
      ObjKind::SourcesBuildPhase     => "PBXSourcesBuildPhase",
      ObjKind::TargetDependency      => "PBXTargetDependency",
      ObjKind::BuildConfiguration    => "XCBuildConfiguration",
      ObjKind::ConfigurationList     => "XCConfigurationList"
    }
  }

  /// Xcode writes these as one line per object.
  pub fn single_line(self) -> bool {
    match self {
      ObjKind::BuildFile | ObjKind::FileReference => true,
      _                                           => false
    }
  }
}

/// Well-known attribute names, plus an escape hatch for the long tail of
/// one-off names that do not warrant a variant of their own.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Attr {
  Attributes,
  BuildActionMask,
  BuildConfigurationList,
  BuildConfigurations,
  BuildPhases,
  BuildRules,
  BuildSettings,
  Children,
  CompatibilityVersion,
  ContainerPortal,
  DefaultConfigurationIsVisible,
  DefaultConfigurationName,
  Dependencies,
  DevelopmentRegion,
  DstPath,
  DstSubfolderSpec,
  ExplicitFileType,
  FileEncoding,
  FileRef,
  Files,
  IncludeInIndex,
  InputPaths,
  KnownRegions,
  LastKnownFileType,
  MainGroup,
  Name,
  OutputPaths,
  Path,
  ProductName,
  ProductRefGroup,
  ProductReference,
  ProductType,
  ProxyType,
  RemoteGlobalIDString,
  RemoteInfo,
  RunOnlyForDeploymentPostprocessing,
  Settings,
  ShellPath,
  ShellScript,
  SourceTree,
  Target,
  TargetProxy,
  Targets,
  Custom(String)
}

impl Attr {
  pub fn name(&self) -> &'_ str {
    match self {
      Attr::Attributes                         => "attributes",
      Attr::BuildActionMask                    => "buildActionMask",
      Attr::BuildConfigurationList             => "buildConfigurationList",
      Attr::BuildConfigurations                => "buildConfigurations",
      Attr::BuildPhases                        => "buildPhases",
      Attr::BuildRules                         => "buildRules",
      Attr::BuildSettings                      => "buildSettings",
      Attr::Children                           => "children",
      Attr::CompatibilityVersion               => "compatibilityVersion",
      Attr::ContainerPortal                    => "containerPortal",
      Attr::DefaultConfigurationIsVisible      => "defaultConfigurationIsVisible",
      Attr::DefaultConfigurationName           => "defaultConfigurationName",
      Attr::Dependencies                       => "dependencies",
      Attr::DevelopmentRegion                  => "developmentRegion",
      Attr::DstPath                            => "dstPath",
      Attr::DstSubfolderSpec                   => "dstSubfolderSpec",
      Attr::ExplicitFileType                   => "explicitFileType",
      Attr::FileEncoding                       => "fileEncoding",
      Attr::FileRef                            => "fileRef",
      Attr::Files                              => "files",
      Attr::IncludeInIndex                     => "includeInIndex",
      Attr::InputPaths                         => "inputPaths",
      Attr::KnownRegions                       => "knownRegions",
      Attr::LastKnownFileType                  => "lastKnownFileType",
      Attr::MainGroup                          => "mainGroup",
      Attr::Name                               => "name",
      Attr::OutputPaths                        => "outputPaths",
      Attr::Path                               => "path",
      Attr::ProductName                        => "productName",
      Attr::ProductRefGroup                    => "productRefGroup",
      Attr::ProductReference                   => "productReference",
      Attr::ProductType                        => "productType",
      Attr::ProxyType                          => "proxyType",
      Attr::RemoteGlobalIDString               => "remoteGlobalIDString",
      Attr::RemoteInfo                         => "remoteInfo",
      Attr::RunOnlyForDeploymentPostprocessing => "runOnlyForDeploymentPostprocessing",
      Attr::Settings                           => "settings",
      Attr::ShellPath                          => "shellPath",
      Attr::ShellScript                        => "shellScript",
      Attr::SourceTree                         => "sourceTree",
      Attr::Target                             => "target",
      Attr::TargetProxy                        => "targetProxy",
      Attr::Targets                            => "targets",
      Attr::Custom(s)                          => s
    }
  }
}

#[derive(Clone, Debug)]
pub enum Value {
  Str(Rc<str>),
  Ref(ObjId),
  List(Vec<Value>),
  Dict(Vec<(String, Value)>)
}

pub struct Object {
  pub id:      String,
  pub kind:    ObjKind,
  /// Rendered as the `/* ... */` annotation next to the id.
  pub comment: String,
  pub attrs:   Vec<(Attr, Value)>
}

impl Object {
  /// Set an attribute, replacing an earlier value in place so the attribute
  /// order stays the insertion order.
  pub fn set(&mut self, attr: Attr, value: Value) {
    match self.attrs.iter_mut().find(|(a, _)| *a == attr) {
      Some((_, v)) => *v = value,
      None         => self.attrs.push((attr, value))
    }
  }

  pub fn get(&self, attr: &Attr) -> Option<&'_ Value> {
    self.attrs.iter().find(|(a, _)| a == attr).map(|(_, v)| v)
  }

  pub fn push_to_list(&mut self, attr: Attr, value: Value) {
    match self.attrs.iter_mut().find(|(a, _)| *a == attr) {
      Some((_, Value::List(items))) => items.push(value),
      Some(_)                       => (),
      None                          => self.attrs.push((attr, Value::List(vec![value])))
    }
  }
}

pub struct Registry {
  objects: Vec<Object>,
  ids:     HashSet<String>,
  strings: HashMap<String, Rc<str>>,
  seed:    String,
  rng:     StdRng,
  counter: u32
}

impl Registry {
  /// Seeded from the project name so id minting is a pure function of the
  /// input.
  pub fn new(project_name: &str) -> Self {
    Registry {
      objects: Vec::new(),
      ids:     HashSet::new(),
      strings: HashMap::new(),
      seed:    project_name.to_string(),
      rng:     StdRng::seed_from_u64(fnv1a(project_name.as_bytes())),
      counter: 0
    }
  }

  fn mint_id(&mut self) -> String {
    let prefix = self.counter;
    self.counter += 1;
    format!("{:08X}{:016X}", prefix, self.rng.gen::<u64>())
  }

  pub fn create(&mut self, kind: ObjKind) -> Result<ObjId, GenError> {
    let id = self.mint_id();
    self.register(kind, id)
  }

  /// Create an object whose identity persists across regenerations. The id
  /// is derived from the name alone, never from creation order, so edits
  /// elsewhere in the project cannot shift it; the `<name>_GUID` cache entry
  /// pins it further, across renames of the hashing scheme itself.
  pub fn create_named(&mut self, kind: ObjKind, name: &str, cache: &mut IdCache)
                      -> Result<ObjId, GenError> {
    let key = [name, "_GUID"].join("");
    let id  = match cache.get(&key) {
      Some(cached) => cached.to_string(),
      None => {
        let salted = [self.seed.as_str(), "/", name].join("");
        // High bit set: hashed prefixes stay clear of the counter range.
        let id = format!("{:08X}{:016X}",
                         (fnv1a(salted.as_bytes()) >> 32) as u32 | 0x8000_0000,
                         fnv1a(key.as_bytes()));
        cache.insert(&key, &id);
        id
      }
    };
    self.register(kind, id)
  }

  fn register(&mut self, kind: ObjKind, id: String) -> Result<ObjId, GenError> {
    if !self.ids.insert(id.clone()) {
      return Err(GenError::DuplicateId { id, kind: kind.isa() })
    }
    self.objects.push(Object {
      id,
      kind,
      comment: String::new(),
      attrs:   Vec::new()
    });
    Ok(ObjId(self.objects.len() - 1))
  }

  pub fn obj(&self, id: ObjId) -> &'_ Object {
    &self.objects[id.0]
  }

  pub fn obj_mut(&mut self, id: ObjId) -> &'_ mut Object {
    &mut self.objects[id.0]
  }

  /// Leaf strings are shared; most attribute values repeat heavily
  /// (sourceTree, file types, phase masks).
  pub fn intern(&mut self, s: &str) -> Value {
    match self.strings.get(s) {
      Some(rc) => Value::Str(rc.clone()),
      None => {
        let rc: Rc<str> = Rc::from(s);
        self.strings.insert(s.to_string(), rc.clone());
        Value::Str(rc)
      }
    }
  }

  pub fn len(&self) -> usize {
    self.objects.len()
  }

  /// All objects in identifier order, the order they serialize in.
  pub fn sorted_ids(&self) -> Vec<ObjId> {
    let mut v: Vec<ObjId> = (0..self.objects.len()).map(ObjId).collect();
    v.sort_by(|a, b| self.objects[a.0].id.cmp(&self.objects[b.0].id));
    v
  }

  /// Walk every reference held by every object and report dangling handles.
  /// Cheap, and catches assembler bugs before they become a project file
  /// Xcode rejects with an opaque parse error.
  pub fn validate(&self) -> Result<(), Vec<GenError>> {
    let mut errors = Vec::new();
    for obj in &self.objects {
      for (attr, value) in &obj.attrs {
        self.validate_value(obj, attr.name(), value, &mut errors);
      }
    }
    match errors.is_empty() {
      true  => Ok(()),
      false => Err(errors)
    }
  }

  fn validate_value(&self, obj: &Object, attr: &str, value: &Value,
                    errors: &mut Vec<GenError>) {
    match value {
      Value::Str(_)  => (),
      Value::Ref(id) => {
        if id.0 >= self.objects.len() {
          errors.push(GenError::DanglingRef {
            id:   obj.id.clone(),
            attr: attr.to_string()
          });
        }
      }
      Value::List(items) => {
        for v in items {
          self.validate_value(obj, attr, v, errors);
        }
      }
      Value::Dict(pairs) => {
        for (k, v) in pairs {
          self.validate_value(obj, k, v, errors);
        }
      }
    }
  }
}

fn fnv1a(bytes: &[u8]) -> u64 {
  let mut h: u64 = 0xcbf2_9ce4_8422_2325;
  for b in bytes {
    h ^= u64::from(*b);
    h = h.wrapping_mul(0x0100_0000_01b3);
  }
  h
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_are_deterministic() {
    let mut a = Registry::new("Demo");
    let mut b = Registry::new("Demo");
    for _ in 0..8 {
      let x = a.create(ObjKind::Group).unwrap();
      let y = b.create(ObjKind::Group).unwrap();
      assert_eq!(a.obj(x).id, b.obj(y).id);
    }

    let mut c = Registry::new("Other");
    let z = c.create(ObjKind::Group).unwrap();
    assert_ne!(a.obj(ObjId(0)).id, c.obj(z).id);
  }

  #[test]
  fn ids_are_unique_and_counter_prefixed() {
    let mut reg = Registry::new("Demo");
    let mut seen = HashSet::new();
    for i in 0..100 {
      let id = reg.create(ObjKind::BuildFile).unwrap();
      let id = &reg.obj(id).id;
      assert_eq!(id.len(), 24);
      assert_eq!(&id[..8], format!("{:08X}", i).as_str());
      assert!(seen.insert(id.clone()));
    }
  }

  #[test]
  fn cached_names_keep_their_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = IdCache::load(dir.path());

    let mut reg = Registry::new("Demo");
    let t = reg.create_named(ObjKind::NativeTarget, "App", &mut cache).unwrap();
    let first = reg.obj(t).id.clone();

    // Second pass with the same cache: the id must not change.
    let mut reg = Registry::new("Demo");
    let t = reg.create_named(ObjKind::NativeTarget, "App", &mut cache).unwrap();
    assert_eq!(reg.obj(t).id, first);
  }

  #[test]
  fn cache_hit_does_not_shift_later_ids() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = IdCache::load(dir.path());

    let mut reg = Registry::new("Demo");
    reg.create_named(ObjKind::NativeTarget, "App", &mut cache).unwrap();
    let next = reg.create(ObjKind::Group).unwrap();
    let first = reg.obj(next).id.clone();

    let mut reg = Registry::new("Demo");
    reg.create_named(ObjKind::NativeTarget, "App", &mut cache).unwrap();
    let next = reg.create(ObjKind::Group).unwrap();
    assert_eq!(reg.obj(next).id, first);
  }

  #[test]
  fn duplicate_id_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = IdCache::load(dir.path());
    cache.insert("A_GUID", "00000000AAAAAAAAAAAAAAAA");
    cache.insert("B_GUID", "00000000AAAAAAAAAAAAAAAA");

    let mut reg = Registry::new("Demo");
    reg.create_named(ObjKind::NativeTarget, "A", &mut cache).unwrap();
    assert!(reg.create_named(ObjKind::NativeTarget, "B", &mut cache).is_err());
  }

  #[test]
  fn custom_attributes_round_trip() {
    let mut reg = Registry::new("Demo");
    let id = reg.create(ObjKind::Project).unwrap();
    let v  = reg.intern("0");
    reg.obj_mut(id).set(Attr::Custom("projectRoot".to_string()), v);

    assert_eq!(Attr::Custom("projectRoot".to_string()).name(), "projectRoot");
    match reg.obj(id).get(&Attr::Custom("projectRoot".to_string())) {
      Some(Value::Str(s)) => assert_eq!(s.as_ref(), "0"),
      other               => panic!("lost the attribute: {:?}", other)
    }
  }

  #[test]
  fn validate_accepts_live_refs() {
    let mut reg = Registry::new("Demo");
    let a = reg.create(ObjKind::Group).unwrap();
    let b = reg.create(ObjKind::Group).unwrap();
    reg.obj_mut(a).push_to_list(Attr::Children, Value::Ref(b));
    assert!(reg.validate().is_ok());
  }
}

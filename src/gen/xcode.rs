//! Project generator for Xcode.
//!
//! Xcode stores the whole project in a single NeXTSTEP-plist file named
//! "project.pbxproj" inside a folder named after the project with the
//! "xcodeproj" extension. The file holds a dictionary of objects, each
//! identified by a unique 96-bit hexadecimal string with an "isa" property
//! naming its type; comments next to identifiers are optional but keeping
//! them (and keeping objects ordered by id) limits the churn when Xcode
//! rewrites the file.
//!
//! The generation pass runs in stages: the group tree and file references,
//! per-target build phases and configurations, dependency proxies and link
//! information, then one serialization walk. Side outputs (rules makefiles,
//! the depend helper, Info.plist files, the regeneration check) land under
//! girder-scripts/ in the build directory.

mod groups;
mod link;
mod obj;
mod phases;
mod scheme;
mod serialize;
mod settings;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::cache::IdCache;
use crate::ctx::{Context, Generator, RunResult, Target, TargetType, escape_path};
use crate::diag::{Diagnostics, GenError};
use crate::gen::write_if_different;
use groups::Groups;
use link::TargetRec;
use obj::{Attr, ObjId, ObjKind, Registry, Value};

const COMPATIBILITY: &str = "Xcode 3.2";
const REGEN_TARGET:  &str = "REGEN_CHECK";
const RERUN_MAKE:    &str = "girder-scripts/rerun.make";

pub struct XCode;

impl Generator for XCode {
  fn run(&self, ctx: &Context) -> RunResult {
    let mut pass = Pass::new(ctx);
    pass.build()?;
    pass.emit()?;
    pass.finish()
  }
}

struct Pass<'a> {
  ctx:     &'a Context<'a>,
  reg:     Registry,
  cache:   IdCache,
  diags:   Diagnostics,
  root:    Option<ObjId>,
  regen:   Option<ObjId>,
  records: BTreeMap<String, TargetRec>
}

impl<'a> Pass<'a> {
  fn new(ctx: &'a Context<'a>) -> Self {
    Pass {
      ctx,
      reg:     Registry::new(&ctx.project.name),
      cache:   IdCache::load(&ctx.scripts_dir()),
      diags:   Diagnostics::new(),
      root:    None,
      regen:   None,
      records: BTreeMap::new()
    }
  }

  fn bundle_dir(&self) -> PathBuf {
    let mut path = self.ctx.build_dir.join(&self.ctx.project.name);
    path.set_extension("xcodeproj");
    path
  }

  /// Assemble the full object graph.
  fn build(&mut self) -> RunResult {
    let ctx = self.ctx;

    let root = self.reg.create_named(ObjKind::Project, &ctx.project.name,
                                     &mut self.cache)?;
    self.reg.obj_mut(root).comment = "Project object".to_string();
    self.root = Some(root);

    let mut groups = Groups::new(&mut self.reg, &ctx.project.name)?;

    self.build_regen_target()?;

    for (name, target) in &ctx.project.targets {
      let rec = self.build_target(&mut groups, name, target)?;
      self.records.insert(name.clone(), rec);
    }

    self.build_edges()?;

    for (name, target) in &ctx.project.targets {
      let rec = &self.records[name];
      link::apply_link_inputs(&mut self.reg, ctx, name, target, rec,
                              &self.records);
    }

    self.build_project_object(root, &groups)?;

    if let Err(errors) = self.reg.validate() {
      let msg: Vec<String> = errors.iter().map(ToString::to_string).collect();
      return Err(msg.join("; ").into())
    }

    // Details were already reported as they were found; stop before any
    // output is written.
    if self.diags.has_input_errors() {
      return Err(format!("{} input error(s) while generating the project",
                         self.diags.input_errors().len()).into())
    }
    Ok(())
  }

  /// The aggregate target every other target depends on; its only job is to
  /// re-run the generator when a project input changed.
  fn build_regen_target(&mut self) -> RunResult {
    let ctx = self.ctx;

    let id = self.reg.create_named(ObjKind::AggregateTarget, REGEN_TARGET,
                                   &mut self.cache)?;
    let script = format!("make -C {} -f {} all\n",
                         escape_path(&ctx.build_dir.to_string_lossy()),
                         RERUN_MAKE);
    let phase = phases::script_phase(&mut self.reg, "Generator Check", &script)?;

    let cfg_list = self.config_list(REGEN_TARGET, "PBXAggregateTarget",
                                    |_, _, _| Ok(Vec::new()))?;

    let name_v = self.reg.intern(REGEN_TARGET);
    let prod_v = self.reg.intern(REGEN_TARGET);
    let obj = self.reg.obj_mut(id);
    obj.comment = REGEN_TARGET.to_string();
    obj.set(Attr::BuildConfigurationList, Value::Ref(cfg_list));
    obj.set(Attr::BuildPhases, Value::List(vec![Value::Ref(phase)]));
    obj.set(Attr::Dependencies, Value::List(Vec::new()));
    obj.set(Attr::Name, name_v);
    obj.set(Attr::ProductName, prod_v);

    self.regen = Some(id);
    Ok(())
  }

  fn build_target(&mut self, groups: &mut Groups, name: &str, target: &Target)
                  -> Result<TargetRec, Box<dyn std::error::Error>> {
    let ctx  = self.ctx;
    let kind = match target.target_type {
      TargetType::Custom => ObjKind::AggregateTarget,
      _                  => ObjKind::NativeTarget
    };

    let id = self.reg.create_named(kind, name, &mut self.cache)?;
    self.reg.obj_mut(id).comment = name.to_string();

    let mut build_phases = phases::assemble(&mut self.reg, ctx, groups, name,
                                            target, &mut self.diags)?;
    if target.is_linkable() {
      build_phases.push(link::depend_check_phase(&mut self.reg, ctx, name)?);
    }

    let langs = phases::languages(name, ctx.target_sources(name));
    let cfg_list = self.config_list(name, kind.isa(), |reg, diags, config| {
      settings::resolve(reg, ctx, name, target, &langs, config, diags)
    })?;

    let product = match kind {
      ObjKind::NativeTarget => {
        let product_name = scheme::buildable_name(name, target);
        let explicit = match target.target_type {
          TargetType::Console       => "compiled.mach-o.executable",
          TargetType::Application   => "wrapper.application",
          TargetType::SharedLibrary => "compiled.mach-o.dylib",
          _                         => "archive.ar"
        };
        Some(groups.product_ref(&mut self.reg, &product_name, explicit)?)
      }
      _ => None
    };

    let product_type = match target.target_type {
      TargetType::Console       => "com.apple.product-type.tool",
      TargetType::Application   => "com.apple.product-type.application",
      TargetType::StaticLibrary |
      TargetType::ObjectLibrary => "com.apple.product-type.library.static",
      TargetType::SharedLibrary => "com.apple.product-type.library.dynamic",
      TargetType::Custom        => ""
    };

    {
      let name_v = self.reg.intern(name);
      let prod_v = self.reg.intern(name);
      let type_v = self.reg.intern(product_type);
      let obj = self.reg.obj_mut(id);
      obj.set(Attr::BuildConfigurationList, Value::Ref(cfg_list));
      obj.set(Attr::BuildPhases,
              Value::List(build_phases.iter().map(|p| Value::Ref(*p)).collect()));
      if kind == ObjKind::NativeTarget {
        obj.set(Attr::BuildRules, Value::List(Vec::new()));
      }
      obj.set(Attr::Dependencies, Value::List(Vec::new()));
      obj.set(Attr::Name, name_v);
      obj.set(Attr::ProductName, prod_v);
      if let Some(product) = product {
        obj.set(Attr::ProductReference, Value::Ref(product));
        obj.set(Attr::ProductType, type_v);
      }
    }

    Ok(TargetRec {
      id,
      configs:  self.configs_of(cfg_list),
      linkable: target.is_linkable(),
      library:  target.is_library(),
      product:  link::product_file(name, target)
    })
  }

  /// Dependency edges: declared ones, plus the implicit edge from every
  /// target to the regeneration check.
  fn build_edges(&mut self) -> RunResult {
    let root  = self.root.unwrap();
    let regen = self.regen.unwrap();

    for (name, target) in &self.ctx.project.targets {
      let from = self.records[name].id;
      link::connect(&mut self.reg, root, from, name, regen, REGEN_TARGET)?;

      for dep in &target.depends {
        let to = match self.records.get(dep) {
          Some(rec) => rec.id,
          None => return Err(GenError::UnknownDependency {
            from: name.clone(),
            to:   dep.clone()
          }.into())
        };
        link::connect(&mut self.reg, root, from, name, to, dep)?;
      }
    }
    Ok(())
  }

  fn build_project_object(&mut self, root: ObjId, groups: &Groups) -> RunResult {
    let ctx = self.ctx;

    let cfg_list = self.config_list(&ctx.project.name, "PBXProject",
                                    |reg, diags, config| {
      Ok(settings::resolve_project(reg, ctx, config, diags))
    })?;

    let mut targets = vec![Value::Ref(self.regen.unwrap())];
    targets.extend(self.records.values().map(|r| Value::Ref(r.id)));

    let yes    = self.reg.intern("YES");
    let compat = self.reg.intern(COMPATIBILITY);
    let region = self.reg.intern("en");
    let zero   = self.reg.intern("0");
    let en     = self.reg.intern("en");
    let base   = self.reg.intern("Base");
    let empty  = self.reg.intern("");
    let empty2 = empty.clone();

    let obj = self.reg.obj_mut(root);
    obj.set(Attr::Attributes, Value::Dict(vec![
      ("BuildIndependentTargetsInParallel".to_string(), yes)
    ]));
    obj.set(Attr::BuildConfigurationList, Value::Ref(cfg_list));
    obj.set(Attr::CompatibilityVersion, compat);
    obj.set(Attr::DevelopmentRegion, region);
    obj.set(Attr::Custom("hasScannedForEncodings".to_string()), zero);
    obj.set(Attr::KnownRegions, Value::List(vec![en, base]));
    obj.set(Attr::MainGroup, Value::Ref(groups.main_group));
    obj.set(Attr::ProductRefGroup, Value::Ref(groups.products));
    obj.set(Attr::Custom("projectDirPath".to_string()), empty);
    obj.set(Attr::Custom("projectRoot".to_string()), empty2);
    obj.set(Attr::Targets, Value::List(targets));
    Ok(())
  }

  /// One XCBuildConfiguration per configuration plus the list tying them
  /// together. `resolve` computes the buildSettings dictionary.
  fn config_list<F>(&mut self, owner: &str, owner_isa: &str, mut resolve: F)
                    -> Result<ObjId, GenError>
  where F: FnMut(&mut Registry, &mut Diagnostics, &str)
              -> Result<Vec<(String, Value)>, GenError> {
    let mut refs = Vec::new();
    for config in self.ctx.configurations() {
      let dict = resolve(&mut self.reg, &mut self.diags, config)?;
      let id = self.reg.create(ObjKind::BuildConfiguration)?;
      let name_v = self.reg.intern(config);
      let obj = self.reg.obj_mut(id);
      obj.comment = config.clone();
      obj.set(Attr::BuildSettings, Value::Dict(dict));
      obj.set(Attr::Name, name_v);
      refs.push(Value::Ref(id));
    }

    let id = self.reg.create(ObjKind::ConfigurationList)?;
    let zero    = self.reg.intern("0");
    let default = self.reg.intern(
      self.ctx.configurations().first().map(String::as_str).unwrap_or("Debug"));
    let obj = self.reg.obj_mut(id);
    obj.comment = format!("Build configuration list for {} \"{}\"",
                          owner_isa, owner);
    obj.set(Attr::BuildConfigurations, Value::List(refs));
    obj.set(Attr::DefaultConfigurationIsVisible, zero);
    obj.set(Attr::DefaultConfigurationName, default);
    Ok(id)
  }

  fn configs_of(&self, cfg_list: ObjId) -> Vec<ObjId> {
    match self.reg.obj(cfg_list).get(&Attr::BuildConfigurations) {
      Some(Value::List(items)) => items.iter()
        .filter_map(|v| match v {
          Value::Ref(id) => Some(*id),
          _              => None
        })
        .collect(),
      _ => Vec::new()
    }
  }

  /// Write the bundle and every side output.
  fn emit(&mut self) -> RunResult {
    let ctx    = self.ctx;
    let bundle = self.bundle_dir();

    let text = serialize::serialize(&self.reg, self.root.unwrap(), COMPATIBILITY);
    let path = bundle.join("project.pbxproj");
    match write_if_different(&path, text.as_bytes())? {
      true  => tracing::info!("wrote {:?} ({} objects)", path, self.reg.len()),
      false => tracing::info!("{:?} is up to date", path)
    }

    for (name, target) in &ctx.project.targets {
      if target.is_bundle() {
        self.write_info_plist(name)?;
      }
    }

    self.write_rerun_makefile()?;
    link::write_depend_helper(ctx, &self.records)?;

    if ctx.project.xcode_schemes {
      for (name, target) in &ctx.project.targets {
        let rec = &self.records[name];
        let runnable = match target.target_type {
          TargetType::Console | TargetType::Application => true,
          _                                             => false
        };
        scheme::write_scheme(&bundle, &ctx.project.name, name,
                             &self.reg.obj(rec.id).id,
                             &scheme::buildable_name(name, target), runnable)?;
      }
      scheme::write_workspace_settings(&bundle)?;
    }
    Ok(())
  }

  /// One Info.plist serves every configuration; the executable name binds
  /// late through build-setting substitution.
  fn write_info_plist(&self, name: &str) -> std::io::Result<()> {
    let plist = format!(concat!(
      "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
      "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
      "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
      "<plist version=\"1.0\">\n",
      "<dict>\n",
      "\t<key>CFBundleDevelopmentRegion</key>\n",
      "\t<string>en</string>\n",
      "\t<key>CFBundleExecutable</key>\n",
      "\t<string>${{EXECUTABLE_NAME}}</string>\n",
      "\t<key>CFBundleIdentifier</key>\n",
      "\t<string>com.girder.${{PRODUCT_NAME:rfc1034identifier}}</string>\n",
      "\t<key>CFBundleInfoDictionaryVersion</key>\n",
      "\t<string>6.0</string>\n",
      "\t<key>CFBundleName</key>\n",
      "\t<string>${{PRODUCT_NAME}}</string>\n",
      "\t<key>CFBundlePackageType</key>\n",
      "\t<string>APPL</string>\n",
      "\t<key>CFBundleShortVersionString</key>\n",
      "\t<string>{version}</string>\n",
      "\t<key>CFBundleVersion</key>\n",
      "\t<string>{version}</string>\n",
      "</dict>\n",
      "</plist>\n"),
      version = self.ctx.project.version);

    let path = self.ctx.scripts_dir().join([name, "-Info.plist"].join(""));
    write_if_different(&path, plist.as_bytes())?;
    Ok(())
  }

  /// The makefile the regeneration-check target runs: re-invokes the
  /// generator when any project input is newer than the stamp.
  fn write_rerun_makefile(&self) -> std::io::Result<()> {
    let ctx = self.ctx;
    let exe = std::env::current_exe()
      .map(|p| p.to_string_lossy().into_owned())
      .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());

    let project_file = ctx.input_dir
      .join(ctx.args.value_of("config").unwrap_or("Girder.toml"));
    let project_file = crate::ctx::relative_for_make(&ctx.build_dir, &project_file);

    let mut s = String::new();
    s.push_str(concat!("# Generated by ", env!("CARGO_PKG_NAME"),
                       ". Do not edit.\n\n"));
    s.push_str("all: girder-scripts/rerun.stamp\n\n");
    s.push_str("girder-scripts/rerun.stamp: \\\n");
    s.push_str(&format!("\t{}\n", escape_path(&project_file)));
    let mut cmd = format!("\t{} {} -b {}",
                          escape_path(&exe),
                          escape_path(&ctx.input_dir.to_string_lossy()),
                          escape_path(&ctx.build_dir.to_string_lossy()));
    if let Some(config) = ctx.args.value_of("config") {
      cmd.push_str(&format!(" -c {}", escape_path(config)));
    }
    s.push_str(&cmd);
    s.push_str(" gen\n");
    s.push_str("\ttouch girder-scripts/rerun.stamp\n");

    let path = ctx.build_dir.join(RERUN_MAKE);
    write_if_different(&path, s.as_bytes())?;
    Ok(())
  }

  /// Settle the pass: persist newly assigned ids and recap what was
  /// recorded along the way.
  fn finish(&mut self) -> RunResult {
    self.cache.save()?;

    if !self.diags.degraded_conditions().is_empty() {
      tracing::warn!("generated with {} degraded condition(s)",
                     self.diags.degraded_conditions().len());
    }
    Ok(())
  }
}

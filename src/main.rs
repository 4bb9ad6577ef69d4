#![allow(clippy::cognitive_complexity)]
#![allow(clippy::write_with_newline)]

#![cfg_attr(debug_assertions, allow(dead_code))]

mod cache;
mod cmd;
mod ctx;
mod diag;
mod gen;

use clap::{Arg, App, SubCommand};
use semver::Version;
use std::{fmt, fmt::Display};
use std::path::{Path, PathBuf};

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::try_from_env("GIRDER_LOG")
                     .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")))
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();

  // Initialize.
  let commands   = cmd::init();
  let generators = gen::init();

  // Parse the environment variables.
  let env: ctx::Env = envy::prefixed("GIRDER_").from_env()
    .check(|| "Failed to parse environment variables");

  // Parse the command line.
  let args = App::new(env!("CARGO_PKG_NAME"))
    .version(env!("CARGO_PKG_VERSION"))
    .author(env!("CARGO_PKG_AUTHORS"))
    .about(env!("CARGO_PKG_DESCRIPTION"))
    .arg(Arg::with_name("FOLDER")
         .help("Input folder containing source files")
         .required(true))
    .arg(Arg::with_name("build")
         .short("b")
         .long("build")
         .value_name("FOLDER")
         .help("Where to store the generated project files")
         .takes_value(true))
    .arg(Arg::with_name("config")
         .short("c")
         .long("config")
         .value_name("FILE")
         .help("Name of the build file")
         .takes_value(true))
    .arg(Arg::with_name("generator")
         .short("g")
         .long("generator")
         .value_name("NAME")
         .help("Project generator to use")
         .takes_value(true))
    .subcommands(commands.iter().map(|(name, cmd)| {
      cmd.init(SubCommand::with_name(name))
    }))
    .get_matches();

  let input_dir = PathBuf::from(args.value_of("FOLDER").unwrap())
    .canonicalize()
    .check(|| "Input folder does not exist");
  let build_dir = args.value_of("build")
    .map(PathBuf::from)
    .unwrap_or_else(|| std::env::current_dir().unwrap());

  std::fs::create_dir_all(&build_dir)
    .check(|| format!("Failed to create build folder ({:?})", build_dir));
  let build_dir = build_dir.canonicalize().unwrap();

  // Load the project's configuration file.
  let project: ctx::Project = {
    let path = input_dir.join(args.value_of("config").unwrap_or("Girder.toml"));

    let text = std::fs::read_to_string(&path)
      .check(|| format!("Failed to load config file ({:?})", path));

    toml::from_str(&text)
      .check(|| format!("Failed to read the project file ({:?})", path))
  };

  is_supported(&project.min_girder_version).check(|| "Min version check failed");

  (!project.targets.is_empty()).check(|| "No targets in project configuration");

  let sources = find_all_sources(&input_dir, &project)
    .check(|| "Failed to resolve source files");

  // Execute the requested command.
  let ctx = ctx::Context {
    commands,
    generators,
    input_dir,
    build_dir,
    env:     &env,
    args:    &args,
    project: &project,
    sources: &sources
  };

  let cmd_name = ctx.args.subcommand_name().unwrap_or("gen");
  ctx.commands[cmd_name].run(&ctx)
    .check(|| format!("Failed to run command ({})", cmd_name));
}

#[derive(Debug)]
struct MinVerError {
  expected: Version,
  current:  Version
}

impl Display for MinVerError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "Project does not support this version: expected {} but running {}",
           self.expected, self.current)
  }
}

impl std::error::Error for MinVerError {}

fn is_supported(min_version: &str) -> ctx::DynResult<()> {
  if !min_version.is_empty() {
    let expected = Version::parse(min_version)?;
    let current  = Version::parse(env!("CARGO_PKG_VERSION")).unwrap();
    if expected > current {
      return Err(Box::new(MinVerError { expected, current }))
    }
  }
  Ok(())
}

/// Expand every target's source globs and attach per-file metadata from its
/// `[[source]]` entries. Paths stay relative to the input directory and are
/// sorted, so downstream passes see a deterministic order.
fn find_all_sources(input_dir: &Path, project: &ctx::Project)
                    -> ctx::DynResult<ctx::AllSources> {
  let mut all = ctx::AllSources::new();
  for (name, target) in &project.targets {
    let mut files = Vec::new();
    for pattern in &target.sources {
      let full = input_dir.join(pattern);
      for m in glob::glob(full.to_str().ok_or("Invalid source pattern")?)? {
        let path = m?;
        if !path.is_file() {
          continue
        }
        let path = path.strip_prefix(input_dir)?.to_path_buf();

        let mut file = ctx::SourceFile::new(path);
        if let Some(spec) = target.spec_for(&file.path) {
          file.group         = spec.group.clone();
          file.language      = spec.language;
          file.flags         = spec.flags.clone();
          file.header_only   = spec.header_only;
          file.resource      = spec.resource;
          file.bundle_dir    = spec.bundle_dir.clone();
          file.deep_resource = spec.deep_resource;
        }
        files.push(file);
      }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|a, b| a.path == b.path);

    tracing::debug!("target {}: {} source files", name, files.len());
    all.insert(name.clone(), files);
  }
  Ok(all)
}

trait Check {
  type R;
  fn check<F, S>(self, msg: F) -> Self::R where F: FnOnce() -> S, S: Display;
}

impl Check for bool {
  type R = ();
  fn check<F, S>(self, msg: F) where F: FnOnce() -> S, S: Display {
    if !self {
      fatal(msg());
    }
  }
}

impl<T, E> Check for Result<T, E> where E: Display {
  type R = T;
  fn check<F, S>(self, msg: F) -> Self::R where F: FnOnce() -> S, S: Display {
    match self {
      Ok (v) => v,
      Err(e) => fatal(format!("{}: {}", msg(), e))
    }
  }
}

fn fatal<S: Display>(msg: S) -> ! {
  eprintln!("{}", msg);
  std::process::exit(1)
}

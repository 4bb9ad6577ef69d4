//! Plain makefile generator. Intentionally minimal next to the Xcode
//! backend; it exists to keep the `Generator` seam honest with a second
//! implementation.

use crate::ctx::{self, Context, Generator, Language, RunResult, TargetType};
use crate::gen::write_if_different;
use std::fmt::Write;

pub struct Make;

impl Generator for Make {
  fn run(&self, ctx: &Context) -> RunResult {
    let mut s = String::new();
    write!(s, "# Generated by {} {}. Do not edit.\n\n",
           env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).unwrap();

    write!(s, "all:").unwrap();
    for name in ctx.project.targets.keys() {
      write!(s, " {}", name).unwrap();
    }
    write!(s, "\n\n.PHONY: all\n\n").unwrap();

    for (name, target) in &ctx.project.targets {
      let sources: Vec<_> = ctx.target_sources(name).iter()
        .filter(|f| {
          !f.header_only && !f.resource &&
            f.language.or_else(|| Language::from_extension(f.extension())).is_some()
        })
        .collect();

      let product = match target.target_type {
        TargetType::Console       => name.clone(),
        TargetType::Application   => name.clone(),
        TargetType::StaticLibrary => ["lib", name, ".a"].join(""),
        TargetType::SharedLibrary => ["lib", name, ".dylib"].join(""),
        TargetType::ObjectLibrary |
        TargetType::Custom        => [name.as_str(), ".stamp"].join("")
      };

      write!(s, "{}: {}", name, product).unwrap();
      for dep in &target.depends {
        write!(s, " {}", dep).unwrap();
      }
      write!(s, "\n.PHONY: {}\n\n", name).unwrap();

      write!(s, "{}:", product).unwrap();
      for f in &sources {
        let path = ctx::relative_for_make(&ctx.build_dir, &ctx.input_dir.join(&f.path));
        write!(s, " {}", ctx::escape_path(&path)).unwrap();
      }
      write!(s, "\n").unwrap();

      let settings = target.settings_for("Release");
      let compiler = match sources.iter().any(|f| {
        f.language.or_else(|| Language::from_extension(f.extension()))
          == Some(Language::Cxx)
      }) {
        true  => "$(CXX)",
        false => "$(CC)"
      };

      match target.target_type {
        TargetType::StaticLibrary => {
          write!(s, "\t$(AR) rcs {} $^\n\n", product).unwrap();
        }
        TargetType::ObjectLibrary | TargetType::Custom => {
          write!(s, "\ttouch {}\n\n", product).unwrap();
        }
        _ => {
          write!(s, "\t{} {} -o {} $^", compiler, settings.flags, product).unwrap();
          for dir in &target.lib_dirs {
            write!(s, " -L{}", ctx::escape_path(dir)).unwrap();
          }
          for lib in &target.libs {
            write!(s, " -l{}", lib).unwrap();
          }
          write!(s, "\n\n").unwrap();
        }
      }
    }

    let path = ctx.build_dir.join("Makefile");
    write_if_different(&path, s.as_bytes())?;
    Ok(())
  }
}

use clap::{App};

use crate::ctx::{Command, Context, RunResult};

pub struct Show;

impl Command for Show {
  fn init<'a, 'b>(&self, cmd: App<'a, 'b>) -> App<'a, 'b> {
    cmd.about("Displays information about the project")
  }

  fn run(&self, ctx: &Context) -> RunResult {
    let p = ctx.project;
    println!("{} {}", p.name, p.version);
    if !p.description.is_empty() {
      println!("{}", p.description);
    }

    println!("configurations: {}", p.configurations.join(", "));

    for (name, target) in &p.targets {
      println!("- {} ({:?}, {} sources)",
               name, target.target_type, ctx.target_sources(name).len());
      if !target.depends.is_empty() {
        println!("  depends: {}", target.depends.join(", "));
      }
    }
    Ok(())
  }
}

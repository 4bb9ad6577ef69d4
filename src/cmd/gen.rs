use clap::{App};

use crate::ctx::{Command, Context, RunResult};

pub struct Gen;

impl Command for Gen {
  fn init<'a, 'b>(&self, cmd: App<'a, 'b>) -> App<'a, 'b> {
    cmd.about("Generates the project's build files")
  }

  fn run(&self, ctx: &Context) -> RunResult {
    let name = ctx.args.value_of("generator").unwrap_or("xcode");
    let gen  = ctx.generators.get(name)
      .ok_or_else(|| format!("Unknown generator ({})", name))?;

    tracing::info!("generating {} project in {:?}", name, ctx.build_dir);
    gen.run(ctx)
  }
}

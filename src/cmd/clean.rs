use clap::{App};

use crate::ctx::{Command, Context, RunResult};

pub struct Clean;

impl Command for Clean {
  fn init<'a, 'b>(&self, cmd: App<'a, 'b>) -> App<'a, 'b> {
    cmd.about("Removes the generated project files")
  }

  fn run(&self, ctx: &Context) -> RunResult {
    let bundle  = ctx.build_dir.join([ctx.project.name.as_str(), ".xcodeproj"].join(""));
    let scripts = ctx.scripts_dir();

    for dir in &[bundle, scripts] {
      if dir.exists() {
        tracing::info!("removing {:?}", dir);
        std::fs::remove_dir_all(dir)?;
      }
    }
    Ok(())
  }
}

mod clean;
mod gen;
mod show;

use crate::ctx::Commands;

pub fn init() -> Commands {
  let mut commands = Commands::new();
  commands.insert("clean", Box::new(clean::Clean));
  commands.insert("gen",   Box::new(gen::Gen));
  commands.insert("show",  Box::new(show::Show));
  commands
}

//! Shared scheme and workspace-settings output. Optional; only written when
//! the project opts in, since Xcode otherwise auto-creates schemes on open.

use std::path::Path;

use crate::ctx::{Target, TargetType};
use crate::gen::write_if_different;

/// What the scheme's buildable reference points at.
pub fn buildable_name(name: &str, target: &Target) -> String {
  match target.target_type {
    TargetType::Console       => name.to_string(),
    TargetType::Application   => [name, ".app"].join(""),
    TargetType::StaticLibrary |
    TargetType::ObjectLibrary => ["lib", name, ".a"].join(""),
    TargetType::SharedLibrary => ["lib", name, ".dylib"].join(""),
    TargetType::Custom        => name.to_string()
  }
}

/// One shared scheme per target, under
/// `<bundle>/xcshareddata/xcschemes/<target>.xcscheme`.
pub fn write_scheme(bundle: &Path, project_name: &str, target_name: &str,
                    target_id: &str, buildable: &str, runnable: bool)
                    -> std::io::Result<()> {
  let container = ["container:", project_name, ".xcodeproj"].join("");

  let reference = |indent: &str| format!(concat!(
    "{i}<BuildableReference\n",
    "{i}   BuildableIdentifier = \"primary\"\n",
    "{i}   BlueprintIdentifier = \"{id}\"\n",
    "{i}   BuildableName = \"{buildable}\"\n",
    "{i}   BlueprintName = \"{name}\"\n",
    "{i}   ReferencedContainer = \"{container}\">\n",
    "{i}</BuildableReference>\n"),
    i = indent, id = target_id, buildable = buildable, name = target_name,
    container = container);

  let launch = match runnable {
    false => String::new(),
    true  => format!(concat!(
      "   <LaunchAction\n",
      "      buildConfiguration = \"Debug\"\n",
      "      selectedDebuggerIdentifier = \"Xcode.DebuggerFoundation.Debugger.LLDB\"\n",
      "      selectedLauncherIdentifier = \"Xcode.DebuggerFoundation.Launcher.LLDB\"\n",
      "      launchStyle = \"0\"\n",
      "      useCustomWorkingDirectory = \"NO\"\n",
      "      ignoresPersistentStateOnLaunch = \"NO\"\n",
      "      debugDocumentVersioning = \"YES\"\n",
      "      allowLocationSimulation = \"YES\">\n",
      "      <BuildableProductRunnable\n",
      "         runnableDebuggingMode = \"0\">\n",
      "{reference}",
      "      </BuildableProductRunnable>\n",
      "   </LaunchAction>\n"),
      reference = reference("         "))
  };

  let scheme = format!(concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<Scheme\n",
    "   LastUpgradeVersion = \"0940\"\n",
    "   version = \"1.3\">\n",
    "   <BuildAction\n",
    "      parallelizeBuildables = \"YES\"\n",
    "      buildImplicitDependencies = \"YES\">\n",
    "      <BuildActionEntries>\n",
    "         <BuildActionEntry\n",
    "            buildForTesting = \"YES\"\n",
    "            buildForRunning = \"YES\"\n",
    "            buildForProfiling = \"YES\"\n",
    "            buildForArchiving = \"YES\"\n",
    "            buildForAnalyzing = \"YES\">\n",
    "{reference}",
    "         </BuildActionEntry>\n",
    "      </BuildActionEntries>\n",
    "   </BuildAction>\n",
    "{launch}",
    "   <ProfileAction\n",
    "      buildConfiguration = \"Release\"\n",
    "      shouldUseLaunchSchemeArgsEnv = \"YES\"\n",
    "      savedToolIdentifier = \"\"\n",
    "      useCustomWorkingDirectory = \"NO\"\n",
    "      debugDocumentVersioning = \"YES\">\n",
    "   </ProfileAction>\n",
    "   <AnalyzeAction\n",
    "      buildConfiguration = \"Debug\">\n",
    "   </AnalyzeAction>\n",
    "   <ArchiveAction\n",
    "      buildConfiguration = \"Release\"\n",
    "      revealArchiveInOrganizer = \"YES\">\n",
    "   </ArchiveAction>\n",
    "</Scheme>\n"),
    reference = reference("            "), launch = launch);

  let path = bundle.join("xcshareddata/xcschemes")
    .join([target_name, ".xcscheme"].join(""));
  write_if_different(&path, scheme.as_bytes())?;
  Ok(())
}

/// Tells Xcode not to auto-create schemes on top of the shared ones.
pub fn write_workspace_settings(bundle: &Path) -> std::io::Result<()> {
  let settings = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
    "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
    "<plist version=\"1.0\">\n",
    "<dict>\n",
    "\t<key>IDEWorkspaceSharedSettings_AutocreateContextsIfNeeded</key>\n",
    "\t<false/>\n",
    "</dict>\n",
    "</plist>\n");

  let path = bundle
    .join("project.xcworkspace/xcshareddata/WorkspaceSettings.xcsettings");
  write_if_different(&path, settings.as_bytes())?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn buildable_names() {
    let t = |tt| Target { target_type: tt, ..Target::default() };
    assert_eq!(buildable_name("App", &t(TargetType::Application)), "App.app");
    assert_eq!(buildable_name("Core", &t(TargetType::StaticLibrary)), "libCore.a");
    assert_eq!(buildable_name("Tool", &t(TargetType::Console)), "Tool");
  }

  #[test]
  fn scheme_file_lands_in_shared_data() {
    let dir = tempfile::tempdir().unwrap();
    write_scheme(dir.path(), "Demo", "App", "00000000AABBCCDDEEFF0011",
                 "App.app", true).unwrap();

    let path = dir.path().join("xcshareddata/xcschemes/App.xcscheme");
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("BlueprintIdentifier = \"00000000AABBCCDDEEFF0011\""));
    assert!(text.contains("BuildableName = \"App.app\""));
    assert!(text.contains("<LaunchAction"));
    assert!(text.contains("container:Demo.xcodeproj"));
  }

  #[test]
  fn workspace_settings_disable_autocreate() {
    let dir = tempfile::tempdir().unwrap();
    write_workspace_settings(dir.path()).unwrap();
    let path = dir.path()
      .join("project.xcworkspace/xcshareddata/WorkspaceSettings.xcsettings");
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("IDEWorkspaceSharedSettings_AutocreateContextsIfNeeded"));
  }
}

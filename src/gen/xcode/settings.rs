//! Build-settings resolution.
//!
//! Free-text compiler flags are parsed just enough to lift the optimization
//! and debug-info flags into their dedicated Xcode settings; everything else
//! passes through verbatim in OTHER_CFLAGS / OTHER_CPLUSPLUSFLAGS. Raw
//! attribute overrides are applied last and win unconditionally.

use regex::Regex;
use std::collections::BTreeMap;

use crate::ctx::{CStandard, CXXStandard, Context, Language, Optimize, Target,
                 TargetType, append_flags};
use crate::diag::{Diagnostics, GenError};
use super::obj::{Registry, Value};

/// Matches a whole optimization flag between separators. The scan keeps the
/// last occurrence, the one the compiler would honor.
const OPT_PATTERN: &str = r"(^| )(-Ofast|-Os|-O[0-9]*)( |$)";

/// Remove every optimization flag from `flags` and return the Xcode
/// optimization level of the last one, if any. A bare `-O` means level 1.
pub fn extract_optimization(flags: &mut String) -> Option<String> {
  let re = Regex::new(OPT_PATTERN).unwrap();
  let mut last = None;
  while let Some(caps) = re.captures(flags) {
    let m = caps.get(2).unwrap();
    last = Some(flags[m.start()..m.end()].to_string());
    flags.replace_range(m.start()..m.end(), "");
  }
  last.map(|f| match f.as_str() {
    "-O"      => "1".to_string(),
    "-Os"     => "s".to_string(),
    "-Ofast"  => "fast".to_string(),
    _         => f[2..].to_string()
  })
}

/// Remove every `-g*` flag from `flags`. Returns the resulting debug-info
/// state and the flag that decided it, if any flag was present.
/// Level-specific variants like `-gdwarf-2` are put back since
/// GCC_GENERATE_DEBUGGING_SYMBOLS cannot express them.
pub fn extract_debug(flags: &mut String) -> Option<(bool, String)> {
  let mut last = None;
  loop {
    let found = flags.split(' ')
      .find(|t| t.starts_with("-g"))
      .map(str::to_string);
    match found {
      None => break,
      Some(tok) => {
        let stripped: String = flags.split(' ')
          .filter(|t| *t != tok.as_str())
          .collect::<Vec<_>>()
          .join(" ");
        *flags = stripped;
        last = Some(tok);
      }
    }
  }

  match last {
    None => None,
    Some(tok) => match tok.as_str() {
      "-g0" => Some((false, tok)),
      "-g"  => Some((true, tok)),
      _     => {
        // Keep the exact flag, it still counts as debug info being on.
        append_flags(flags, &tok);
        Some((true, tok))
      }
    }
  }
}

/// Strip a `[variant=<config>]` qualifier from a raw attribute name.
/// Returns the effective name when the attribute applies to `config`.
pub fn filter_attribute(name: &str, config: &str) -> Option<String> {
  match name.find("[variant=") {
    None => Some(name.to_string()),
    Some(start) => {
      let rest = &name[start + 9..];
      let end  = rest.find(']')?;
      if &rest[..end] != config {
        return None
      }
      let stripped = [&name[..start], &rest[end + 1..]].join("");
      match stripped.is_empty() {
        true  => None,
        false => Some(stripped)
      }
    }
  }
}

fn optimize_level(o: Optimize) -> &'static str {
  match o {
    Optimize::None  => "0",
    Optimize::Size  => "s",
    Optimize::Speed => "2",
    Optimize::Full  => "3"
  }
}

/// Preference order when several languages could drive the link step.
pub fn linker_language(target: &Target, langs: &[Language]) -> Option<Language> {
  if target.language.is_some() {
    return target.language
  }
  const ORDER: &[Language] = &[
    Language::Swift,
    Language::ObjCxx,
    Language::Cxx,
    Language::ObjC,
    Language::C,
    Language::Asm
  ];
  ORDER.iter().copied().find(|l| langs.contains(l))
}

/// Compute the `buildSettings` dictionary for one target and configuration.
/// `langs` is the set of languages found among the target's compiled sources.
pub fn resolve(reg: &mut Registry, ctx: &Context, name: &str, target: &Target,
               langs: &[Language], config: &str, diags: &mut Diagnostics)
               -> Result<Vec<(String, Value)>, GenError> {
  let settings = target.settings_for(config);
  let mut out  = BTreeMap::<String, Value>::new();

  if target.is_linkable() && linker_language(target, langs).is_none() {
    return Err(GenError::NoLinkerLanguage { target: name.to_string() })
  }

  // Per-language free-text flags, environment appended last.
  let mut lang_flags = BTreeMap::<Language, String>::new();
  for lang in langs {
    let mut flags = settings.flags.clone();
    match lang {
      Language::C | Language::ObjC     => append_flags(&mut flags, &ctx.env.cflags),
      Language::Cxx | Language::ObjCxx => append_flags(&mut flags, &ctx.env.cxxflags),
      _                                => ()
    }
    lang_flags.insert(*lang, flags);
  }

  // Lift the optimization level out of the flags; the last flag of the last
  // language wins, matching what the compiler would have done.
  let mut level = settings.optimize.map(optimize_level).unwrap_or("0").to_string();
  for flags in lang_flags.values_mut() {
    if let Some(found) = extract_optimization(flags) {
      level = found;
    }
  }
  out.insert("GCC_OPTIMIZATION_LEVEL".to_string(), reg.intern(&level));

  // Same for the debug flag, except languages may disagree, and the project
  // format only has one switch. When they do, the flags go back verbatim and
  // the switch goes off.
  let mut debug = BTreeMap::<Language, (bool, Option<String>)>::new();
  for (lang, flags) in lang_flags.iter_mut() {
    let state = match extract_debug(flags) {
      Some((d, flag)) => (d, Some(flag)),
      None            => (settings.debug_info.unwrap_or(false), None)
    };
    debug.insert(*lang, state);
  }
  let debug_on = {
    let mut values = debug.values().map(|(d, _)| *d);
    let first = values.next().unwrap_or_else(|| {
      settings.debug_info.unwrap_or(false)
    });
    match values.all(|d| d == first) {
      true  => first,
      false => {
        diags.degraded(format!(
          "target {}: languages disagree on debug info for {}; \
           keeping per-language -g flags and disabling the global switch",
          name, config));
        for (lang, (d, flag)) in &debug {
          if !*d {
            continue
          }
          // Level-specific flags never left the string; put back the rest.
          match flag.as_deref() {
            Some("-g") | None => append_flags(lang_flags.get_mut(lang).unwrap(),
                                              "-g"),
            _                 => ()
          }
        }
        false
      }
    }
  };
  out.insert("GCC_GENERATE_DEBUGGING_SYMBOLS".to_string(),
             reg.intern(if debug_on { "YES" } else { "NO" }));

  // Preprocessor definitions, ordered and de-duplicated, always carrying the
  // configuration/platform identifier.
  let mut defines = Vec::new();
  let intdir = concat!("GIRDER_INTDIR=\"$(CONFIGURATION)",
                       "$(EFFECTIVE_PLATFORM_NAME)\"").to_string();
  for d in settings.defines.iter().chain(std::iter::once(&intdir)) {
    if !defines.iter().any(|v| v == d) {
      defines.push(d.clone());
    }
  }
  out.insert("GCC_PREPROCESSOR_DEFINITIONS".to_string(),
             Value::List(defines.iter().map(|d| reg.intern(d)).collect()));

  if !settings.include_dirs.is_empty() {
    let dirs: Vec<Value> = settings.include_dirs.iter()
      .map(|d| {
        let full = ctx.input_dir.join(d);
        reg.intern(&full.to_string_lossy())
      })
      .collect();
    out.insert("HEADER_SEARCH_PATHS".to_string(), Value::List(dirs));
  }

  if let Some(level) = settings.warning_level {
    let flags: &[&str] = match level {
      0 => &["-w"],
      1 => &["-Wall"],
      2 => &["-Wall", "-Wextra"],
      _ => &["-Wall", "-Wextra", "-Wpedantic"]
    };
    out.insert("WARNING_CFLAGS".to_string(),
               Value::List(flags.iter().map(|f| reg.intern(f)).collect()));
  }
  if settings.warning_as_error == Some(true) {
    out.insert("GCC_TREAT_WARNINGS_AS_ERRORS".to_string(), reg.intern("YES"));
  }

  if let Some(std) = settings.c_standard {
    let v = match std {
      CStandard::C89 => "c89",
      CStandard::C99 => "c99",
      CStandard::C11 => "c11"
    };
    out.insert("GCC_C_LANGUAGE_STANDARD".to_string(), reg.intern(v));
  }
  if let Some(std) = settings.cxx_standard {
    let v = match std {
      CXXStandard::CXX03 => "c++98",
      CXXStandard::CXX11 => "c++11",
      CXXStandard::CXX14 => "c++14",
      CXXStandard::CXX17 => "c++17"
    };
    out.insert("CLANG_CXX_LANGUAGE_STANDARD".to_string(), reg.intern(v));
  }

  if let Some(pic) = settings.pic {
    out.insert("GCC_DYNAMIC_NO_PIC".to_string(),
               reg.intern(if pic { "NO" } else { "YES" }));
  }
  if let Some(hidden) = settings.visibility_hidden {
    out.insert("GCC_SYMBOLS_PRIVATE_EXTERN".to_string(),
               reg.intern(if hidden { "YES" } else { "NO" }));
  }

  // What survived flag extraction.
  for (lang, flags) in &lang_flags {
    let flags = flags.trim();
    if flags.is_empty() {
      continue
    }
    let key = match lang {
      Language::C | Language::ObjC     => "OTHER_CFLAGS",
      Language::Cxx | Language::ObjCxx => "OTHER_CPLUSPLUSFLAGS",
      _                                => continue
    };
    let merged = match out.get(key) {
      Some(Value::Str(prev)) => [prev.as_ref(), flags].join(" "),
      _                      => flags.to_string()
    };
    out.insert(key.to_string(), reg.intern(&merged));
  }

  let mut ldflags = settings.ldflags.clone();
  append_flags(&mut ldflags, &ctx.env.ldflags);
  if !ldflags.is_empty() {
    let key = match target.is_library() && target.target_type != TargetType::SharedLibrary {
      true  => "OTHER_LIBTOOLFLAGS",
      false => "OTHER_LDFLAGS"
    };
    out.insert(key.to_string(), reg.intern(&ldflags));
  }

  out.insert("PRODUCT_NAME".to_string(), reg.intern(name));
  match target.target_type {
    TargetType::Console => (),
    TargetType::Application => {
      let plist = ["girder-scripts/", name, "-Info.plist"].join("");
      out.insert("INFOPLIST_FILE".to_string(), reg.intern(&plist));
      out.insert("MACOSX_BUNDLE_GUI_IDENTIFIER".to_string(),
                 reg.intern(&["com.girder.", name].join("")));
    }
    TargetType::StaticLibrary => {
      out.insert("LIBRARY_STYLE".to_string(),     reg.intern("STATIC"));
      out.insert("EXECUTABLE_PREFIX".to_string(), reg.intern("lib"));
      out.insert("EXECUTABLE_SUFFIX".to_string(), reg.intern(".a"));
    }
    TargetType::SharedLibrary => {
      out.insert("LIBRARY_STYLE".to_string(),     reg.intern("DYNAMIC"));
      out.insert("EXECUTABLE_PREFIX".to_string(), reg.intern("lib"));
      out.insert("EXECUTABLE_SUFFIX".to_string(), reg.intern(".dylib"));
      out.insert("DYLIB_COMPATIBILITY_VERSION".to_string(),
                 reg.intern(&ctx.project.version));
      out.insert("DYLIB_CURRENT_VERSION".to_string(),
                 reg.intern(&ctx.project.version));
    }
    TargetType::ObjectLibrary => {
      out.insert("MACH_O_TYPE".to_string(),       reg.intern("mh_object"));
      out.insert("EXECUTABLE_PREFIX".to_string(), reg.intern("lib"));
      out.insert("EXECUTABLE_SUFFIX".to_string(), reg.intern(".a"));
    }
    TargetType::Custom => ()
  }

  // Raw overrides win over everything computed above.
  apply_overrides(reg, &target.xcode_attributes, config, &mut out, diags);

  Ok(out.into_iter().collect())
}

/// Project-level settings shared by every target.
pub fn resolve_project(reg: &mut Registry, ctx: &Context, config: &str,
                       diags: &mut Diagnostics) -> Vec<(String, Value)> {
  let mut out = BTreeMap::<String, Value>::new();
  out.insert("SDKROOT".to_string(),               reg.intern("macosx"));
  out.insert("ALWAYS_SEARCH_USER_PATHS".to_string(), reg.intern("NO"));
  out.insert("USE_HEADERMAP".to_string(),         reg.intern("NO"));

  apply_overrides(reg, &ctx.project.xcode_attributes, config, &mut out, diags);
  out.into_iter().collect()
}

fn apply_overrides(reg: &mut Registry,
                   overrides: &std::collections::BTreeMap<String, String>,
                   config: &str, out: &mut BTreeMap<String, Value>,
                   diags: &mut Diagnostics) {
  for (raw, value) in overrides {
    match filter_attribute(raw, config) {
      Some(attr) => {
        out.insert(attr, reg.intern(value));
      }
      None => {
        if raw.contains("[variant=") && !raw.starts_with("[variant=") {
          continue  // Qualified for another configuration, a normal drop.
        }
        if raw.starts_with("[variant=") {
          diags.degraded(format!("attribute override {:?} has an empty name, dropped", raw));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn optimization_extraction_keeps_last() {
    let mut flags = "-O0 -fno-inline -O3".to_string();
    assert_eq!(extract_optimization(&mut flags), Some("3".to_string()));
    assert!(!flags.contains("-O0"));
    assert!(!flags.contains("-O3"));
    assert!(flags.contains("-fno-inline"));
  }

  #[test]
  fn bare_o_means_level_one() {
    let mut flags = "-O".to_string();
    assert_eq!(extract_optimization(&mut flags), Some("1".to_string()));

    let mut flags = "-Os".to_string();
    assert_eq!(extract_optimization(&mut flags), Some("s".to_string()));

    let mut flags = "-Ofast".to_string();
    assert_eq!(extract_optimization(&mut flags), Some("fast".to_string()));
  }

  #[test]
  fn unrelated_flags_are_untouched()  {
    let mut flags = "-Wall -fPIC".to_string();
    assert_eq!(extract_optimization(&mut flags), None);
    assert_eq!(flags, "-Wall -fPIC");
  }

  #[test]
  fn debug_extraction() {
    let mut flags = "-g -Wall".to_string();
    assert_eq!(extract_debug(&mut flags), Some((true, "-g".to_string())));
    assert!(!flags.contains("-g"));

    let mut flags = "-g0".to_string();
    assert_eq!(extract_debug(&mut flags), Some((false, "-g0".to_string())));

    // Level-specific flags stay in the flag string, exactly once.
    let mut flags = "-gdwarf-2 -Wall".to_string();
    assert_eq!(extract_debug(&mut flags), Some((true, "-gdwarf-2".to_string())));
    assert_eq!(flags.matches("-gdwarf-2").count(), 1);
  }

  #[test]
  fn variant_qualifier_filtering() {
    assert_eq!(filter_attribute("FOO", "Debug"), Some("FOO".to_string()));
    assert_eq!(filter_attribute("FOO[variant=Debug]", "Debug"),
               Some("FOO".to_string()));
    assert_eq!(filter_attribute("FOO[variant=Release]", "Debug"), None);
    assert_eq!(filter_attribute("[variant=Debug]", "Debug"), None);
  }

  #[test]
  fn linker_language_priority() {
    let target = Target::default();
    assert_eq!(linker_language(&target, &[Language::C, Language::Cxx]),
               Some(Language::Cxx));
    assert_eq!(linker_language(&target, &[Language::C]), Some(Language::C));
    assert_eq!(linker_language(&target, &[]), None);

    let forced = Target { language: Some(Language::Swift), ..Target::default() };
    assert_eq!(linker_language(&forced, &[Language::C]), Some(Language::Swift));
  }
}

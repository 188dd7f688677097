//! Syntax target and loader classification for entries.

use oxc_span::SourceType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// How far a file's syntax is from plain, directly executable JavaScript.
///
/// `Typescript` and `Jsx` still owe a mandatory transpilation step; every
/// `Es*` variant is concrete output syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Unknown,
    Typescript,
    Jsx,
    Es5,
    Es2015,
    Es2016,
    Es2017,
    Es2018,
    Es2019,
    Es2020,
    Es2021,
    Es2022,
    Esnext,
}

impl Target {
    /// Classify a file by extension: `.ts`/`.tsx`/`.mts`/`.cts` are
    /// TypeScript, `.jsx` is JSX, everything else is unknown.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ts" | "tsx" | "mts" | "cts") => Target::Typescript,
            Some("jsx") => Target::Jsx,
            _ => Target::Unknown,
        }
    }

    /// Whether a syntax-lowering pass must run before feature stages.
    pub fn requires_transpile(&self) -> bool {
        matches!(self, Target::Typescript | Target::Jsx)
    }

    /// Whether this names a concrete ECMAScript version.
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Target::Unknown | Target::Typescript | Target::Jsx)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Unknown => "unknown",
            Target::Typescript => "typescript",
            Target::Jsx => "jsx",
            Target::Es5 => "es5",
            Target::Es2015 => "es2015",
            Target::Es2016 => "es2016",
            Target::Es2017 => "es2017",
            Target::Es2018 => "es2018",
            Target::Es2019 => "es2019",
            Target::Es2020 => "es2020",
            Target::Es2021 => "es2021",
            Target::Es2022 => "es2022",
            Target::Esnext => "esnext",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "unknown" => Target::Unknown,
            "typescript" | "ts" => Target::Typescript,
            "jsx" => Target::Jsx,
            "es5" => Target::Es5,
            "es2015" | "es6" => Target::Es2015,
            "es2016" => Target::Es2016,
            "es2017" => Target::Es2017,
            "es2018" => Target::Es2018,
            "es2019" => Target::Es2019,
            "es2020" => Target::Es2020,
            "es2021" => Target::Es2021,
            "es2022" => Target::Es2022,
            "esnext" => Target::Esnext,
            other => return Err(format!("Invalid target: {}", other)),
        })
    }
}

/// Output-format tag handed to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    #[default]
    Js,
    Jsx,
    Ts,
    Tsx,
    Css,
    Json,
    Text,
}

impl Loader {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jsx") => Loader::Jsx,
            Some("ts" | "mts" | "cts") => Loader::Ts,
            Some("tsx") => Loader::Tsx,
            Some("css") => Loader::Css,
            Some("json") => Loader::Json,
            Some("txt") => Loader::Text,
            _ => Loader::Js,
        }
    }

    /// Whether code with this loader can be parsed as a script module.
    pub fn is_script(&self) -> bool {
        matches!(self, Loader::Js | Loader::Jsx | Loader::Ts | Loader::Tsx)
    }

    /// Parser source type for code with this loader at `path`.
    ///
    /// `.mjs` is a module and `.cjs` a script. Other JavaScript declares no
    /// module goal and is parsed as [`SourceType::unambiguous`].
    pub fn source_type(&self, path: &Path) -> SourceType {
        match self {
            Loader::Jsx => SourceType::jsx(),
            Loader::Ts => SourceType::ts(),
            Loader::Tsx => SourceType::tsx(),
            _ => match path.extension().and_then(|ext| ext.to_str()) {
                Some("mjs" | "mts") => SourceType::mjs(),
                Some("cjs" | "cts") => SourceType::cjs(),
                _ => SourceType::unambiguous(),
            },
        }
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Loader::Js => "js",
            Loader::Jsx => "jsx",
            Loader::Ts => "ts",
            Loader::Tsx => "tsx",
            Loader::Css => "css",
            Loader::Json => "json",
            Loader::Text => "text",
        })
    }
}

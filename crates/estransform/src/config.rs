//! Pipeline configuration.
//!
//! Sources are layered with figment, later ones winning:
//! defaults, `estransform.toml`, `estransform.json`, then `ESTRANSFORM_*`
//! environment variables (`__` separates nested keys, e.g.
//! `ESTRANSFORM_STAGES__COMMONJS=false`).

use crate::target::Target;
use crate::{Error, Result};
use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

pub const CONFIG_TOML: &str = "estransform.toml";
pub const CONFIG_JSON: &str = "estransform.json";
pub const ENV_PREFIX: &str = "ESTRANSFORM_";

/// Source map output mode: `false`, `true` or `"inline"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMapMode {
    Disabled,
    #[default]
    External,
    Inline,
}

impl SourceMapMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, SourceMapMode::Disabled)
    }
}

impl Serialize for SourceMapMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SourceMapMode::Disabled => serializer.serialize_bool(false),
            SourceMapMode::External => serializer.serialize_bool(true),
            SourceMapMode::Inline => serializer.serialize_str("inline"),
        }
    }
}

impl<'de> Deserialize<'de> for SourceMapMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Named(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(SourceMapMode::External),
            Repr::Flag(false) => Ok(SourceMapMode::Disabled),
            Repr::Named(name) => match name.as_str() {
                "inline" => Ok(SourceMapMode::Inline),
                "external" | "true" => Ok(SourceMapMode::External),
                "none" | "false" => Ok(SourceMapMode::Disabled),
                other => Err(serde::de::Error::custom(format!(
                    "invalid sourcemap mode '{}', expected true, false or \"inline\"",
                    other
                ))),
            },
        }
    }
}

/// How `require.resolve(...)` calls are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequireResolveMode {
    /// Replace the call with a synthesized import binding.
    #[default]
    Import,
    /// Replace the call with the quoted resolved path.
    Inline,
}

/// Enable flags for the built-in stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageToggles {
    pub meta_url: bool,
    pub require_resolve: bool,
    pub worker: bool,
    pub commonjs: bool,
    pub unwebpack: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            meta_url: true,
            require_resolve: true,
            worker: true,
            commonjs: true,
            unwebpack: true,
        }
    }
}

impl StageToggles {
    /// Whether the stage registered under `name` may run. Unknown names
    /// belong to caller-provided stages and are always enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        match name {
            "meta-url" => self.meta_url,
            "require-resolve" => self.require_resolve,
            "worker" => self.worker,
            "commonjs" => self.commonjs,
            "unwebpack" => self.unwebpack,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub sourcemap: SourceMapMode,
    pub sources_content: bool,
    /// Syntax TypeScript and JSX are lowered to.
    pub transpile_target: Target,
    /// Pick up a pre-existing map from a file's trailing comment on first read.
    pub load_input_source_maps: bool,
    pub stages: StageToggles,
    pub worker_constructors: Vec<String>,
    pub require_resolve: RequireResolveMode,
    /// Fail the stage on an unresolved specifier instead of skipping it.
    pub strict_resolution: bool,
    /// Extensions the default resolver tries for extensionless specifiers.
    pub extensions: Vec<String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            sourcemap: SourceMapMode::External,
            sources_content: true,
            transpile_target: Target::Es2020,
            load_input_source_maps: true,
            stages: StageToggles::default(),
            worker_constructors: vec!["Worker".to_string(), "SharedWorker".to_string()],
            require_resolve: RequireResolveMode::Import,
            strict_resolution: false,
            extensions: [".js", ".mjs", ".cjs", ".ts", ".tsx", ".jsx", ".json"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl TransformConfig {
    /// Load configuration rooted at `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(root.join(CONFIG_TOML)))
            .merge(Json::file(root.join(CONFIG_JSON)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.transpile_target.is_concrete() {
            return Err(Error::InvalidConfig(format!(
                "transpile_target must be a concrete ECMAScript version, got '{}'",
                self.transpile_target
            )));
        }
        if self.worker_constructors.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "worker_constructors must not contain empty names".to_string(),
            ));
        }
        Ok(())
    }
}

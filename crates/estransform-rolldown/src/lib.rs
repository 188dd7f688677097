//! # estransform-rolldown
//!
//! Runs the estransform [`Pipeline`] from Rolldown's `transform` hook.
//!
//! Every JavaScript or TypeScript module Rolldown loads goes through the
//! registered stages; the merged source map is handed back to Rolldown, which
//! chains it with the maps of later plugins.
//!
//! ```rust,no_run
//! use estransform::TransformConfig;
//! use estransform_rolldown::EstransformPlugin;
//! use std::sync::Arc;
//!
//! let plugin = Arc::new(EstransformPlugin::native(TransformConfig::default(), "/project"));
//! // bundler options: plugins: vec![plugin]
//! ```
//!
//! Warnings raised by stages (unresolved asset references, unsupported
//! webpack APIs) are reported through `ctx.warn` so they show up in the
//! bundler's log output.

use estransform::{
    Diagnostic, NativeRuntime, NodeResolver, Pipeline, ProcessedFile, Severity, TransformConfig,
};
use rolldown_common::ModuleType;
use rolldown_plugin::{
    HookTransformArgs, HookTransformOutput, HookTransformReturn, HookUsage, Plugin,
    SharedTransformPluginContext,
};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PLUGIN_NAME: &str = "estransform";

/// Rolldown plugin wrapping a shared [`Pipeline`].
#[derive(Debug, Clone)]
pub struct EstransformPlugin {
    pipeline: Arc<Pipeline>,
}

/// Result of [`EstransformPlugin::transform_module`].
pub struct ModuleOutcome {
    /// `None` when the module is unchanged.
    pub output: Option<HookTransformOutput>,
    pub diagnostics: Vec<Diagnostic>,
}

impl EstransformPlugin {
    pub fn new(pipeline: Pipeline) -> Self {
        Self::from_shared(Arc::new(pipeline))
    }

    pub fn from_shared(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Plugin over the native filesystem with node resolution rooted at
    /// `cwd` and every built-in stage.
    pub fn native(config: TransformConfig, cwd: impl Into<PathBuf>) -> Self {
        let runtime = Arc::new(NativeRuntime::new());
        let resolver = Arc::new(
            NodeResolver::new(runtime.clone(), cwd).with_extensions(config.extensions.clone()),
        );
        Self::new(Pipeline::new(config, runtime, resolver).with_default_stages())
    }

    /// [`EstransformPlugin::native`] rooted at the process working directory.
    pub fn native_in_current_dir(config: TransformConfig) -> anyhow::Result<Self> {
        let runtime = Arc::new(NativeRuntime::new());
        let resolver = NodeResolver::from_runtime_cwd(runtime.clone())?
            .with_extensions(config.extensions.clone());
        Ok(Self::new(
            Pipeline::new(config, runtime, Arc::new(resolver)).with_default_stages(),
        ))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Drop cached entries before a rebuild.
    pub fn reset(&self) {
        self.pipeline.reset();
    }

    /// Transform one module as the `transform` hook would.
    pub async fn transform_module(
        &self,
        id: &str,
        code: &str,
        module_type: &ModuleType,
    ) -> anyhow::Result<ModuleOutcome> {
        let unchanged = ModuleOutcome {
            output: None,
            diagnostics: Vec::new(),
        };
        if !is_script(module_type) || id.starts_with('\0') {
            return Ok(unchanged);
        }

        let path = Path::new(id);
        self.evict_stale(path, code).await;

        let processed = self.pipeline.transform_file(path, Some(code.to_string())).await?;
        let ProcessedFile {
            output,
            changed,
            transpiled,
            diagnostics,
            ..
        } = processed;
        if !changed {
            return Ok(ModuleOutcome {
                diagnostics,
                ..unchanged
            });
        }

        let map = match &output.map {
            Some(map) => Some(
                oxc_sourcemap::SourceMap::from_json_string(&map.to_json()?)
                    .map_err(|e| anyhow::anyhow!("invalid source map for {id}: {e:?}"))?,
            ),
            None => None,
        };
        tracing::debug!(id, transpiled, mapped = map.is_some(), "module transformed");

        Ok(ModuleOutcome {
            output: Some(HookTransformOutput {
                code: Some(output.code),
                map,
                side_effects: None,
                module_type: transpiled.then_some(ModuleType::Js),
            }),
            diagnostics,
        })
    }

    /// Rolldown hands the current source on every build; a cached entry for
    /// different source belongs to an earlier build.
    async fn evict_stale(&self, path: &Path, code: &str) {
        let Some(shared) = self.pipeline.cache().get(path) else {
            return;
        };
        let stale = shared.lock().await.original() != code;
        if stale {
            tracing::debug!(path = %path.display(), "source changed, dropping cached entry");
            self.pipeline.cache().remove(path);
        }
    }
}

fn is_script(module_type: &ModuleType) -> bool {
    matches!(
        module_type,
        ModuleType::Js | ModuleType::Jsx | ModuleType::Ts | ModuleType::Tsx
    )
}

impl Plugin for EstransformPlugin {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(PLUGIN_NAME)
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::Transform
    }

    fn transform(
        &self,
        ctx: SharedTransformPluginContext,
        args: &HookTransformArgs<'_>,
    ) -> impl std::future::Future<Output = HookTransformReturn> + Send {
        let plugin = self.clone();
        let id = args.id.to_string();
        let code = args.code.to_string();
        let module_type = args.module_type.clone();

        async move {
            let outcome = plugin.transform_module(&id, &code, &module_type).await?;
            for diagnostic in outcome
                .diagnostics
                .iter()
                .filter(|diagnostic| diagnostic.severity == Severity::Warning)
            {
                ctx.warn(rolldown_common::LogWithoutPlugin {
                    message: diagnostic.to_string(),
                    ..Default::default()
                });
            }
            Ok(outcome.output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estransform::test_utils::StaticResolver;

    fn plugin(resolver: StaticResolver) -> EstransformPlugin {
        EstransformPlugin::new(
            Pipeline::new(
                TransformConfig::default(),
                Arc::new(NativeRuntime::new()),
                Arc::new(resolver),
            )
            .with_default_stages(),
        )
    }

    #[test]
    fn plugin_identity() {
        let plugin = plugin(StaticResolver::new());
        assert_eq!(plugin.name(), "estransform");
        assert_eq!(plugin.register_hook_usage(), HookUsage::Transform);
    }

    #[tokio::test]
    async fn rewrites_and_returns_map() {
        let plugin = plugin(StaticResolver::new().with("./b.png", "/abs/b.png"));
        let outcome = plugin
            .transform_module(
                "/src/a.js",
                "const u = new URL('./b.png', import.meta.url).href;",
                &ModuleType::Js,
            )
            .await
            .unwrap();
        let output = outcome.output.unwrap();
        assert_eq!(
            output.code.as_deref(),
            Some("import _b_png from '/abs/b.png';\nconst u = new URL(_b_png, import.meta.url).href;")
        );
        let map = output.map.unwrap();
        assert_eq!(map.get_source(0).map(|s| s.to_string()).as_deref(), Some("/src/a.js"));
        assert!(output.module_type.is_none());
    }

    #[tokio::test]
    async fn typescript_comes_back_as_js() {
        let plugin = plugin(StaticResolver::new().with("./w.ts", "/abs/w.ts"));
        let outcome = plugin
            .transform_module(
                "/src/main.ts",
                "const w: Worker = new Worker('./w.ts');",
                &ModuleType::Ts,
            )
            .await
            .unwrap();
        let output = outcome.output.unwrap();
        assert!(matches!(output.module_type, Some(ModuleType::Js)));
        assert!(output.code.unwrap().contains("new URL(_w_ts, import.meta.url)"));
    }

    #[tokio::test]
    async fn untouched_module_returns_none() {
        let plugin = plugin(StaticResolver::new());
        let outcome = plugin
            .transform_module("/src/a.js", "export const a = 1;", &ModuleType::Js)
            .await
            .unwrap();
        assert!(outcome.output.is_none());
        assert!(outcome.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn skips_non_script_and_virtual_modules() {
        let plugin = plugin(StaticResolver::new());
        let code = "const u = new URL('./b.png', import.meta.url);";
        let skipped = [("/src/a.css", ModuleType::Css), ("\0virtual:a", ModuleType::Js)];
        for (id, module_type) in skipped {
            let outcome = plugin.transform_module(id, code, &module_type).await.unwrap();
            assert!(outcome.output.is_none());
        }
        assert!(plugin.pipeline().cache().is_empty());
    }

    #[tokio::test]
    async fn unresolved_reference_is_reported() {
        let plugin = plugin(StaticResolver::new());
        let outcome = plugin
            .transform_module(
                "/src/a.js",
                "const u = new URL('./missing.png', import.meta.url);",
                &ModuleType::Js,
            )
            .await
            .unwrap();
        assert!(outcome.output.is_none());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn new_source_replaces_cached_entry() {
        let plugin = plugin(StaticResolver::new().with("./b.png", "/abs/b.png"));
        let first = plugin
            .transform_module("/src/a.js", "export const a = 1;", &ModuleType::Js)
            .await
            .unwrap();
        assert!(first.output.is_none());

        let second = plugin
            .transform_module(
                "/src/a.js",
                "export const u = new URL('./b.png', import.meta.url);",
                &ModuleType::Js,
            )
            .await
            .unwrap();
        assert!(second.output.is_some());
        assert_eq!(plugin.pipeline().cache().len(), 1);

        plugin.reset();
        assert!(plugin.pipeline().cache().is_empty());
    }
}

//! The plugin against a real project directory.

#![allow(clippy::disallowed_methods)]

use estransform::TransformConfig;
use estransform_rolldown::EstransformPlugin;
use rolldown_common::ModuleType;
use tempfile::TempDir;

#[tokio::test]
async fn resolves_assets_next_to_the_module() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src/assets")).unwrap();
    std::fs::write(dir.path().join("src/assets/logo.svg"), "<svg/>").unwrap();
    let module = dir.path().join("src/index.js");
    let id = module.to_string_lossy().into_owned();

    let plugin = EstransformPlugin::native(TransformConfig::default(), dir.path());
    let outcome = plugin
        .transform_module(
            &id,
            "export const logo = new URL('./assets/logo.svg', import.meta.url).href;\n",
            &ModuleType::Js,
        )
        .await
        .unwrap();

    let output = outcome.output.unwrap();
    let code = output.code.unwrap();
    let logo = dir.path().join("src/assets/logo.svg");
    assert!(code.starts_with(&format!(
        "import _assets_logo_svg from '{}';\n",
        logo.to_string_lossy()
    )));
    assert!(code.contains("new URL(_assets_logo_svg, import.meta.url).href"));
    assert!(output.map.is_some());
}

#[tokio::test]
async fn disabled_maps_still_rewrite() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.js"), "").unwrap();
    let module = dir.path().join("main.js");

    let config = TransformConfig {
        sourcemap: estransform::SourceMapMode::Disabled,
        ..TransformConfig::default()
    };
    let plugin = EstransformPlugin::native(config, dir.path());
    let outcome = plugin
        .transform_module(
            &module.to_string_lossy(),
            "const a = require.resolve('./a.js');",
            &ModuleType::Js,
        )
        .await
        .unwrap();
    let output = outcome.output.unwrap();
    assert!(output.code.unwrap().ends_with("const a = _a_js;"));
    assert!(output.map.is_none());
}

#[tokio::test]
async fn current_dir_plugin_resolves_next_to_the_module() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.json"), "{}").unwrap();
    let module = dir.path().join("main.js");

    let plugin = EstransformPlugin::native_in_current_dir(TransformConfig::default()).unwrap();
    let outcome = plugin
        .transform_module(
            &module.to_string_lossy(),
            "const a = require.resolve('./a.json');",
            &ModuleType::Js,
        )
        .await
        .unwrap();
    let code = outcome.output.unwrap().code.unwrap();
    assert!(code.ends_with("const a = _a_json;"));
}

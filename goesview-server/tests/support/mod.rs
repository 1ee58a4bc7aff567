//! Shared fixtures for HTTP integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use axum_test::TestServer;
use goesview_server::{
    AppState, create_app,
    infra::{
        config::Config,
        startup::{NoopStartupHooks, StartupHooks},
    },
};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

pub const CHANNEL_MAP: &str = r#"{
  "ch13": { "shortname": "Clean IR", "description": "Clean longwave infrared window." },
  "ch02": { "shortname": "Red" }
}"#;

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub source: TempDir,
    _scratch: TempDir,
}

impl TestApp {
    pub fn source_path(&self, relative: &str) -> PathBuf {
        self.source.path().join(relative)
    }

    pub fn write_image(&self, relative: &str, width: u32, height: u32) -> PathBuf {
        let path = self.source_path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(width, height, Rgb([30, 60, 90]))
            .save(&path)
            .unwrap();
        path
    }

    pub fn write_bytes(&self, relative: &str, bytes: &[u8]) -> PathBuf {
        let path = self.source_path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

/// Source tree, cache, static assets and channel table in temp dirs, served
/// through the in-memory transport with background loops off.
pub async fn build_test_app() -> Result<TestApp> {
    let source = tempfile::tempdir()?;
    let scratch = tempfile::tempdir()?;

    let static_dir = scratch.path().join("public");
    std::fs::create_dir_all(&static_dir)?;
    std::fs::write(static_dir.join("index.html"), "<h1>GOES Viewer</h1>")?;
    let channel_map = scratch.path().join("goes16.map.json");
    std::fs::write(&channel_map, CHANNEL_MAP)?;

    let mut config = Config::with_source_root(source.path());
    config.cache_dir = scratch.path().join("thumbnails");
    config.static_dir = static_dir;
    config.channel_map = channel_map;
    config.preview.workers = 2;
    config.ensure_directories()?;
    config.normalize_paths()?;

    let state = AppState::build(config).await?;
    NoopStartupHooks.run(&state).await?;
    let server = TestServer::builder()
        .build(create_app(state.clone()))
        .map_err(|err| anyhow!(err.to_string()))?;

    Ok(TestApp {
        server,
        state,
        source,
        _scratch: scratch,
    })
}

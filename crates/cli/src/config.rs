use anyhow::{Context, Result};
use mymy_annotate::NotesConfig;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "mymy.toml";
pub const STORAGE_DIR_ENV: &str = "MYMY_STORAGE_DIR";
pub const PREVIEW_CHARS_ENV: &str = "MYMY_PREVIEW_CHARS";

/// On-disk shape of `mymy.toml`. Every key is optional.
///
/// ```toml
/// storage_dir = ".mymy"
///
/// [sync]
/// debounce_ms = 50
/// max_batch_wait_ms = 500
/// recovery_interval_ms = 2000
///
/// [render]
/// preview_chars = 60
/// marker = "📌"
/// color = "#888888"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    storage_dir: Option<String>,
    sync: SyncSection,
    render: RenderSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SyncSection {
    debounce_ms: Option<u64>,
    max_batch_wait_ms: Option<u64>,
    recovery_interval_ms: Option<u64>,
    notify_poll_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RenderSection {
    preview_chars: Option<usize>,
    marker: Option<String>,
    color: Option<String>,
}

impl FileConfig {
    fn apply(self, config: &mut NotesConfig) {
        if let Some(dir) = self.storage_dir {
            config.storage_dir_name = dir;
        }
        let sync = &mut config.sync;
        if let Some(ms) = self.sync.debounce_ms {
            sync.debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = self.sync.max_batch_wait_ms {
            sync.max_batch_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = self.sync.recovery_interval_ms {
            sync.recovery_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.sync.notify_poll_interval_ms {
            sync.notify_poll_interval = Duration::from_millis(ms);
        }
        let render = &mut config.render;
        if let Some(chars) = self.render.preview_chars {
            render.preview_chars = chars;
        }
        if let Some(marker) = self.render.marker {
            render.marker = marker;
        }
        if let Some(color) = self.render.color {
            render.color = color;
        }
    }
}

/// Defaults, then `<root>/mymy.toml`, then environment overrides.
pub fn load(root: &Path) -> Result<NotesConfig> {
    let mut config = NotesConfig::default();

    let path = root.join(CONFIG_FILE_NAME);
    if path.is_file() {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?
            .apply(&mut config);
        log::debug!("Loaded config from {}", path.display());
    }

    apply_env(&mut config)?;
    Ok(config)
}

fn parse(text: &str) -> Result<FileConfig> {
    Ok(toml::from_str(text)?)
}

fn apply_env(config: &mut NotesConfig) -> Result<()> {
    if let Some(dir) = env::var(STORAGE_DIR_ENV).ok().filter(|v| !v.trim().is_empty()) {
        config.storage_dir_name = dir;
    }
    if let Ok(raw) = env::var(PREVIEW_CHARS_ENV) {
        config.render.preview_chars = raw
            .trim()
            .parse()
            .with_context(|| format!("{PREVIEW_CHARS_ENV} must be a number, got {raw:?}"))?;
    }
    Ok(())
}

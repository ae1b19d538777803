// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use presto_render::DriverConfig;
use presto_vk::{ChainConfig, PresentModePref, WaitPolicy};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub present: PresentCfg,
    pub sync: SyncCfg,
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            title: "presto".into(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PresentCfg {
    pub mode: PresentMode,
    pub suspend_sleep_ms: u64,
}

impl Default for PresentCfg {
    fn default() -> Self {
        Self {
            mode: PresentMode::Fifo,
            suspend_sleep_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SyncCfg {
    pub wait_timeout_ms: u64,
    pub max_wait_attempts: u32,
}

impl Default for SyncCfg {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 2000,
            max_wait_attempts: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub overlay: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            clear_color: [0.02, 0.02, 0.04, 1.0],
            overlay: true,
        }
    }
}

impl AppCfg {
    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(self.sync.wait_timeout_ms),
            max_attempts: self.sync.max_wait_attempts,
        }
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            present_mode: match self.present.mode {
                PresentMode::Fifo => PresentModePref::Fifo,
                PresentMode::Mailbox => PresentModePref::Mailbox,
                PresentMode::Immediate => PresentModePref::Immediate,
            },
            wait: self.wait_policy(),
            ..ChainConfig::default()
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            suspend_sleep: Duration::from_millis(self.present.suspend_sleep_ms),
        }
    }
}

/// A missing file means defaults; a malformed one is an error.
pub fn load_cfg(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(s) => toml::from_str::<AppCfg>(&s).with_context(|| format!("parsing {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            Ok(AppCfg::default())
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file_parses() {
        let cfg: AppCfg = toml::from_str(
            r#"
            [window]
            title = "demo"
            width = 800
            height = 600

            [present]
            mode = "mailbox"
            suspend_sleep_ms = 50

            [sync]
            wait_timeout_ms = 500
            max_wait_attempts = 3

            [render]
            clear_color = [1.0, 0.0, 0.0, 1.0]
            overlay = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.title, "demo");
        assert_eq!(cfg.present.mode, PresentMode::Mailbox);
        assert!(!cfg.render.overlay);

        let chain = cfg.chain_config();
        assert_eq!(chain.present_mode, PresentModePref::Mailbox);
        assert_eq!(chain.wait.timeout, Duration::from_millis(500));
        assert_eq!(chain.wait.max_attempts, 3);
        assert_eq!(cfg.driver_config().suspend_sleep, Duration::from_millis(50));
    }

    #[test]
    fn missing_keys_fall_back() {
        let cfg: AppCfg = toml::from_str("[present]\nmode = \"immediate\"\n").unwrap();
        assert_eq!(cfg.present.mode, PresentMode::Immediate);
        assert_eq!(cfg.present.suspend_sleep_ms, 100);
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.sync.max_wait_attempts, 8);
        assert!(cfg.render.overlay);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(toml::from_str::<AppCfg>("[present]\nmode = \"relaxed\"\n").is_err());
    }

    #[test]
    fn missing_file_means_defaults() {
        let path = std::env::temp_dir().join("presto-no-such-config.toml");
        let cfg = load_cfg(&path).unwrap();
        assert_eq!(cfg.window.title, "presto");
        assert_eq!(cfg.wait_policy(), WaitPolicy::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("presto-bad-{}.toml", std::process::id()));
        fs::write(&path, "[window\nwidth = ").unwrap();
        let err = load_cfg(&path).unwrap_err();
        let _ = fs::remove_file(&path);
        assert!(format!("{err:#}").contains("parsing"));
    }
}

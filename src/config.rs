//! Configuration
//!
//! Loads configuration from TOML file at `~/.config/area-tile/config.toml`.
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::keysym;
use crate::wm::Options;
use crate::wm::focus::DragChord;
use crate::wm::session::KeyBinding;
use crate::x11::Modifiers;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub focus: FocusConfig,
    pub reactor: ReactorConfig,
    pub keybindings: Vec<KeybindingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Tracing filter used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "area_tile=debug,info".to_string(),
        }
    }
}

/// Button grab kept on the focused window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub drag_modifiers: Vec<String>,
    pub drag_button: u8,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            drag_modifiers: vec!["mod4".to_string()],
            drag_button: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactorConfig {
    /// Pump interval when no readiness wakeup arrives
    pub fallback_poll_ms: u64,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            fallback_poll_ms: 250,
        }
    }
}

/// A grabbed key, optionally running a shell command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeybindingConfig {
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Key binding resolved to protocol values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub binding: KeyBinding,
    pub command: Option<String>,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config = Self::parse(&content)?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area-tile");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default_file())
            .context("Failed to serialize default config")?;
        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    /// Defaults plus a sample binding, written on first run
    fn default_file() -> Self {
        Self {
            keybindings: vec![KeybindingConfig {
                modifiers: vec!["mod4".to_string(), "shift".to_string()],
                key: "Return".to_string(),
                command: Some("xterm".to_string()),
            }],
            ..Self::default()
        }
    }

    pub fn fallback_poll(&self) -> Duration {
        Duration::from_millis(self.reactor.fallback_poll_ms.max(1))
    }

    pub fn drag_chord(&self) -> Result<DragChord> {
        if !(1..=5).contains(&self.focus.drag_button) {
            bail!("focus.drag_button must be 1-5, got {}", self.focus.drag_button);
        }
        Ok(DragChord {
            modifiers: parse_modifiers(&self.focus.drag_modifiers)
                .context("Invalid focus.drag_modifiers")?,
            button: self.focus.drag_button,
        })
    }

    pub fn resolved_bindings(&self) -> Result<Vec<ResolvedBinding>> {
        self.keybindings
            .iter()
            .enumerate()
            .map(|(i, kb)| {
                kb.resolve()
                    .with_context(|| format!("Invalid keybinding #{} ({:?})", i + 1, kb.key))
            })
            .collect()
    }

    /// Window manager options derived from this configuration
    pub fn options(&self) -> Result<Options> {
        Ok(Options {
            drag_chord: self.drag_chord()?,
            key_bindings: self
                .resolved_bindings()?
                .into_iter()
                .map(|resolved| resolved.binding)
                .collect(),
        })
    }
}

impl KeybindingConfig {
    pub fn resolve(&self) -> Result<ResolvedBinding> {
        let modifiers = parse_modifiers(&self.modifiers)?;
        let Some(keysym) = keysym::from_name(&self.key) else {
            bail!("unknown key name {:?}", self.key);
        };
        Ok(ResolvedBinding {
            binding: KeyBinding::new(modifiers, keysym),
            command: self.command.clone(),
        })
    }
}

fn parse_modifiers(names: &[String]) -> Result<Modifiers> {
    names.iter().try_fold(Modifiers::empty(), |mods, name| {
        match Modifiers::from_config_name(name) {
            Some(flag) => Ok(mods | flag),
            None => bail!("unknown modifier {:?}", name),
        }
    })
}

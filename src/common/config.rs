use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use super::collections::{HashMap, HashSet};
use crate::decor::resolver::Padding;

/// Keys that can change at runtime. Each maps to one section of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum SettingsKey {
    BlurEnabled,
    BlurredWindowOpacity,
    BlurEffect,
    GlobalRoundedCornerSettings,
    CustomRoundedCornerSettings,
    ShadowSettings,
    BlackList,
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("corner-fx")
}

pub fn config_file() -> PathBuf { config_dir().join("config.toml") }

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// App ids that never receive shadows or blur.
    #[serde(default)]
    pub black_list: Vec<String>,
    #[serde(default)]
    pub rounded_corners: CornerSettings,
    /// Per-app overrides keyed by app id (wm-class instance).
    #[serde(default)]
    pub custom: HashMap<String, AppOverride>,
    #[serde(default)]
    pub blur: BlurSettings,
    #[serde(default)]
    pub shadow: ShadowSettings,
}

/// Global rounded corner defaults.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct CornerSettings {
    #[serde(default = "default_padding")]
    pub padding: Padding,
    #[serde(default = "default_border_radius")]
    pub border_radius: f64,
    /// Keep rounded corners on maximized and fullscreen windows.
    #[serde(default = "no")]
    pub keep_rounded_corners: bool,
}

/// Per-app replacement for [`CornerSettings`]. Only used while `enabled` is set.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct AppOverride {
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default = "default_padding")]
    pub padding: Padding,
    #[serde(default = "default_border_radius")]
    pub border_radius: f64,
    #[serde(default = "no")]
    pub keep_rounded_corners: bool,
}

impl AppOverride {
    pub fn corners(&self) -> CornerSettings {
        CornerSettings {
            padding: self.padding,
            border_radius: self.border_radius,
            keep_rounded_corners: self.keep_rounded_corners,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct BlurSettings {
    #[serde(default = "no")]
    pub enabled: bool,
    /// Opacity (0-255) applied to windows that have a blurred background.
    #[serde(default = "default_blurred_window_opacity")]
    pub window_opacity: u8,
    /// Corner radius of the blurred region.
    #[serde(default = "default_blur_radius")]
    pub radius: f64,
    #[serde(default = "default_blur_sigma")]
    pub sigma: f64,
    /// App ids whose windows get a blurred background.
    #[serde(default)]
    pub apps: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct ShadowSettings {
    #[serde(default = "default_focused_shadow_opacity")]
    pub focused_opacity: u8,
    #[serde(default = "default_unfocused_shadow_opacity")]
    pub unfocused_opacity: u8,
}

impl Default for CornerSettings {
    fn default() -> Self {
        Self {
            padding: default_padding(),
            border_radius: default_border_radius(),
            keep_rounded_corners: false,
        }
    }
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            window_opacity: default_blurred_window_opacity(),
            radius: default_blur_radius(),
            sigma: default_blur_sigma(),
            apps: Vec::new(),
        }
    }
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            focused_opacity: default_focused_shadow_opacity(),
            unfocused_opacity: default_unfocused_shadow_opacity(),
        }
    }
}

fn yes() -> bool { true }

fn no() -> bool { false }

fn default_padding() -> Padding { Padding::uniform(1.0) }

fn default_border_radius() -> f64 { 12.0 }

fn default_blurred_window_opacity() -> u8 { 200 }

fn default_blur_radius() -> f64 { 12.0 }

fn default_blur_sigma() -> f64 { 30.0 }

fn default_focused_shadow_opacity() -> u8 { 255 }

fn default_unfocused_shadow_opacity() -> u8 { 160 }

impl CornerSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = self.padding.validate();
        if !(self.border_radius >= 0.0) {
            issues.push(format!(
                "border_radius must be non-negative, got {}",
                self.border_radius
            ));
        }
        issues
    }
}

impl BlurSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !(self.radius >= 0.0) {
            issues.push(format!("blur.radius must be non-negative, got {}", self.radius));
        }
        if !(self.sigma >= 0.0) {
            issues.push(format!("blur.sigma must be non-negative, got {}", self.sigma));
        }
        if self.enabled && self.apps.is_empty() {
            issues.push("blur is enabled but blur.apps is empty; no window will be blurred".into());
        }

        let mut seen = HashSet::default();
        for app in &self.apps {
            if !seen.insert(app) {
                issues.push(format!("Duplicate app '{app}' in blur.apps"));
            }
        }

        issues
    }

    pub fn applies_to(&self, app_id: Option<&str>) -> bool {
        app_id.is_some_and(|app| self.apps.iter().any(|a| a == app))
    }
}

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        let buf = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&buf)
    }

    pub fn default() -> Config {
        Self::parse(include_str!("../../corner-fx.default.toml"))
            .expect("bundled default config must parse")
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let buf = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, buf)?;
        Ok(())
    }

    pub fn is_black_listed(&self, app_id: Option<&str>) -> bool {
        app_id.is_some_and(|app| self.black_list.iter().any(|a| a == app))
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for issue in self.rounded_corners.validate() {
            issues.push(format!("rounded_corners: {issue}"));
        }

        let mut apps: Vec<_> = self.custom.iter().collect();
        apps.sort_by(|a, b| a.0.cmp(b.0));
        for (app, custom) in apps {
            if app.is_empty() {
                issues.push("custom override with an empty app id".to_string());
            }
            for issue in custom.corners().validate() {
                issues.push(format!("custom[{app}]: {issue}"));
            }
            if self.black_list.contains(app) {
                issues.push(format!(
                    "custom[{app}] has no effect because '{app}' is in black_list"
                ));
            }
        }

        issues.extend(self.blur.validate());

        let mut seen = HashSet::default();
        for app in &self.black_list {
            if !seen.insert(app) {
                issues.push(format!("Duplicate app '{app}' in black_list"));
            }
        }

        issues
    }

    /// Keys whose values differ between `self` and `new`.
    pub fn changed_keys(&self, new: &Config) -> Vec<SettingsKey> {
        let mut keys = Vec::new();
        if self.blur.enabled != new.blur.enabled {
            keys.push(SettingsKey::BlurEnabled);
        }
        if self.blur.window_opacity != new.blur.window_opacity {
            keys.push(SettingsKey::BlurredWindowOpacity);
        }
        if self.blur.radius != new.blur.radius
            || self.blur.sigma != new.blur.sigma
            || self.blur.apps != new.blur.apps
        {
            keys.push(SettingsKey::BlurEffect);
        }
        if self.rounded_corners != new.rounded_corners {
            keys.push(SettingsKey::GlobalRoundedCornerSettings);
        }
        if self.custom != new.custom {
            keys.push(SettingsKey::CustomRoundedCornerSettings);
        }
        if self.shadow != new.shadow {
            keys.push(SettingsKey::ShadowSettings);
        }
        if self.black_list != new.black_list {
            keys.push(SettingsKey::BlackList);
        }
        keys
    }

    fn levenshtein(a: &str, b: &str) -> usize {
        let b_chars: Vec<char> = b.chars().collect();
        let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
        let mut cur = vec![0; b_chars.len() + 1];

        for (i, ca) in a.chars().enumerate() {
            cur[0] = i + 1;
            for (j, &cb) in b_chars.iter().enumerate() {
                let cost = if ca == cb { 0 } else { 1 };
                cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
            }
            std::mem::swap(&mut prev, &mut cur);
        }

        prev[b_chars.len()]
    }

    // Pulls the offending field and serde's expected alternatives out of an
    // "unknown field `x`, expected one of `a`, `b`" message.
    fn extract_unknown_field(err: &str) -> Option<(String, Vec<String>)> {
        let start = err.find("unknown field `")? + "unknown field `".len();
        let rest = &err[start..];
        let end = rest.find('`')?;
        let unknown = rest[..end].to_string();

        let candidates = rest[end + 1..]
            .split('`')
            .skip(1)
            .step_by(2)
            .map(str::to_string)
            .collect();
        Some((unknown, candidates))
    }

    fn suggest_similar_key(unknown: &str, candidates: &[String]) -> Option<String> {
        let unknown = unknown.to_lowercase();
        let (best, dist) = candidates
            .iter()
            .map(|cand| (cand, Self::levenshtein(&unknown, &cand.to_lowercase())))
            .min_by_key(|(_, dist)| *dist)?;

        // allow suggestions within half the candidate's length (or 3 edits)
        let threshold = std::cmp::max(3usize, best.len() / 2);
        (dist <= threshold).then(|| best.clone())
    }

    fn parse(buf: &str) -> anyhow::Result<Config> {
        match toml::from_str::<Config>(buf) {
            Ok(config) => Ok(config),
            Err(e) => {
                let msg = e.to_string();
                if let Some((unknown, candidates)) = Self::extract_unknown_field(&msg)
                    && let Some(suggestion) = Self::suggest_similar_key(&unknown, &candidates)
                {
                    bail!("{msg}\nDid you mean `{suggestion}`?");
                }
                bail!("{msg}");
            }
        }
    }
}

use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::actions;
use crate::classifier::Strategy;
use crate::classifier::model::{ModelOutput, PixelNorm};
use crate::gestures::Gesture;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// Extension / palm / zoom threshold, in normalized hand units.
    pub distance: f32,
    /// Results below this confidence are coerced to `no_gesture`.
    pub confidence: f32,
    pub rotation_deg: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelInputKind {
    Landmarks,
    Pixels,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSettings {
    pub strategy: Strategy,
    #[serde(default = "default_open_hand")]
    pub open_hand: String,
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default = "default_model_input")]
    pub model_input: ModelInputKind,
    #[serde(default = "default_model_output")]
    pub model_output: ModelOutput,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_pixel_norm")]
    pub pixel_norm: PixelNorm,
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

fn default_open_hand() -> String {
    "pointer".to_string()
}
fn default_model_input() -> ModelInputKind {
    ModelInputKind::Landmarks
}
fn default_model_output() -> ModelOutput {
    ModelOutput::Probabilities
}
fn default_image_size() -> u32 {
    64
}
fn default_pixel_norm() -> PixelNorm {
    PixelNorm::Imagenet
}

pub fn default_labels() -> Vec<String> {
    [
        "next_slide",
        "previous_slide",
        "pointer",
        "draw",
        "erase",
        "highlight",
        "stop",
        "zoom_in",
        "zoom_out",
        "first_slide",
        "last_slide",
        "undo",
        "redo",
        "save",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl ClassifierSettings {
    pub fn open_hand_gesture(&self) -> Gesture {
        Gesture::from_label(&self.open_hand)
    }

    pub fn label_table(&self) -> Vec<Gesture> {
        self.labels.iter().map(|l| Gesture::from_label(l)).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub max_fps: f64,
    pub heartbeat_secs: u64,
    pub stale_secs: u64,
    pub recv_timeout_ms: u64,
    pub min_frame_bytes: usize,
    #[serde(default = "yes")]
    pub viz_frames: bool,
}

fn yes() -> bool {
    true
}

impl SessionSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.max_fps)
    }
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Smoothing {
    #[serde(default = "one")]
    pub window: usize,
    #[serde(default = "one")]
    pub min_votes: usize,
    #[serde(default)]
    pub nav_cooldown_ms: u64,
}

fn one() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec!["ppt".into(), "pptx".into(), "pdf".into()]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerSettings {
    #[serde(default)]
    pub keys: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    pub thresholds: Thresholds,
    pub classifier: ClassifierSettings,
    pub session: SessionSettings,
    pub smoothing: Smoothing,
    pub server: ServerSettings,
    #[serde(default)]
    pub controller: ControllerSettings,

    // accept nested/dotted tables and flatten them into "a.b" -> "value"
    #[serde(deserialize_with = "deserialize_bindings_flat")]
    pub bindings: HashMap<String, String>,
}

impl Profile {
    pub fn parse(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt).map_err(|e| anyhow!("{e}"))?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    /// The profile shipped with the binary.
    #[cfg(test)]
    pub fn builtin() -> Result<Self> {
        Self::parse(default_profile_text())
    }
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

/// Profile directory layout plus the currently active profile.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot resolve home directory"))?;
    Ok(dirs.home_dir().join(".config").join("handctl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ConfigStore {
    pub fn load_or_install_default() -> Result<Self> {
        Self::open(config_dir()?)
    }

    /// Same as [`ConfigStore::load_or_install_default`] rooted at `cfgdir`.
    pub fn open(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile_file(&profdir.join(format!("{active_name}.toml")))?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    /// Re-reads the active pointer and the profile it names. On error the
    /// current profile stays in place.
    pub fn reload(&mut self) -> Result<()> {
        let name = fs::read_to_string(&self.active_ptr)?.trim().to_string();
        let profile = load_profile_file(&self.profile_path(&name))?;
        self.active_name = name;
        self.profile = profile;
        Ok(())
    }

    /// Loads `name` without touching the active pointer.
    pub fn peek(&self, name: &str) -> Result<Profile> {
        load_profile_file(&self.profile_path(name))
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        // validate before switching so a broken profile never becomes active
        let profile = load_profile_file(&p)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let model = self.profile.classifier.model_path.as_ref();
        serde_json::json!({
            "uinput_present": Path::new("/dev/uinput").exists(),
            "keys_enabled": self.profile.controller.keys,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "strategy": self.profile.classifier.strategy,
            "model_path": model,
            "model_present": model.map(|p| p.exists()).unwrap_or(false),
            "upload_dir": self.profile.server.upload_dir,
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "log_level": "RUST_LOG=debug handctl serve"
            }
        })
    }
}

pub fn load_profile_file(path: &Path) -> Result<Profile> {
    let txt = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::parse(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))
}

/// Admission rates a frame interval can be built from.
const MAX_FPS_RANGE: std::ops::RangeInclusive<f64> = 0.1..=1000.0;

fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if !(th.distance > 0.0 && th.distance < 1.0) {
        return Err(anyhow!(
            "thresholds.distance must be in (0,1) normalized units"
        ));
    }
    if !(0.0..=1.0).contains(&th.confidence) {
        return Err(anyhow!("thresholds.confidence must be in [0,1]"));
    }
    if !(th.rotation_deg > 0.0 && th.rotation_deg < 180.0) {
        return Err(anyhow!("thresholds.rotation_deg must be in (0,180)"));
    }

    let s = &p.session;
    if !MAX_FPS_RANGE.contains(&s.max_fps) {
        return Err(anyhow!(
            "session.max_fps must be in [{}, {}] (got {})",
            MAX_FPS_RANGE.start(),
            MAX_FPS_RANGE.end(),
            s.max_fps
        ));
    }
    if s.heartbeat_secs == 0 || s.stale_secs == 0 || s.recv_timeout_ms == 0 {
        return Err(anyhow!("session intervals must be positive durations"));
    }

    let sm = &p.smoothing;
    if sm.window == 0 || sm.min_votes == 0 || sm.min_votes > sm.window {
        return Err(anyhow!(
            "smoothing requires 1 <= min_votes <= window (got {}/{})",
            sm.min_votes,
            sm.window
        ));
    }

    let c = &p.classifier;
    if c.strategy != Strategy::Rules {
        if c.labels.is_empty() {
            return Err(anyhow!("classifier.labels must not be empty for model strategies"));
        }
        if c.model_input == ModelInputKind::Pixels && c.image_size == 0 {
            return Err(anyhow!("classifier.image_size must be positive"));
        }
    }

    if p.server.max_upload_bytes == 0 {
        return Err(anyhow!("server.max_upload_bytes must be positive"));
    }

    for (k, v) in &p.bindings {
        if k.trim().is_empty() {
            return Err(anyhow!("empty binding key"));
        }
        if v.trim().is_empty() {
            return Err(anyhow!("binding '{}' has empty action", k));
        }
        if v == "none" {
            continue;
        }
        match v.strip_prefix("key:") {
            Some(chord) => {
                actions::parse_chord(chord)
                    .map_err(|e| anyhow!("binding '{}' has invalid chord: {e}", k))?;
            }
            None => return Err(anyhow!("binding '{}' has invalid action '{}'", k, v)),
        }
    }
    Ok(())
}

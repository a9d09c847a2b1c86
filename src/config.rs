use crate::bake::bones::{AnimatedBoneEntry, BoneSource};
use anyhow::{Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TexturePrecision {
    #[default]
    Half16,
    Float32,
}

impl TexturePrecision {
    pub fn bytes_per_texel(self) -> usize {
        match self {
            TexturePrecision::Half16 => 8,
            TexturePrecision::Float32 => 16,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TexturePrecision::Half16 => "RGBA Half",
            TexturePrecision::Float32 => "RGBA Float",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakerSettings {
    #[serde(default = "BakerSettings::default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default)]
    pub bake_velocity: bool,
    #[serde(default = "BakerSettings::default_exposure")]
    pub exposure: f32,
    #[serde(default = "BakerSettings::default_blur_samples")]
    pub blur_samples: u32,
    /// Euler angles in degrees applied to every vector channel and bone frame.
    #[serde(default)]
    pub rotate: [f32; 3],
    #[serde(default = "BakerSettings::default_combine_textures")]
    pub combine_textures: bool,
    #[serde(default)]
    pub texture_precision: TexturePrecision,
    #[serde(default)]
    pub animated_bones: Vec<AnimatedBoneEntry>,
}

impl BakerSettings {
    pub const MIN_FRAME_RATE: u32 = 2;
    pub const MAX_FRAME_RATE: u32 = 60;
    pub const MAX_BLUR_SAMPLES: u32 = 16;

    const fn default_frame_rate() -> u32 {
        60
    }

    fn default_exposure() -> f32 {
        1.0 / 48.0
    }

    const fn default_blur_samples() -> u32 {
        1
    }

    const fn default_combine_textures() -> bool {
        true
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read baker settings {}", path.display()))?;
        let mut settings: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse baker settings {}", path.display()))?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("[vat::config] baker settings load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut settings: Self = serde_json::from_str(json).context("Failed to parse baker settings")?;
        settings.sanitize();
        Ok(settings)
    }

    /// Clamps values into the ranges the bake pipeline supports.
    pub fn sanitize(&mut self) {
        self.frame_rate = self.frame_rate.clamp(Self::MIN_FRAME_RATE, Self::MAX_FRAME_RATE);
        self.blur_samples = self.blur_samples.clamp(1, Self::MAX_BLUR_SAMPLES);
        if !self.exposure.is_finite() || self.exposure < 0.0 {
            self.exposure = Self::default_exposure();
        }
    }

    pub fn rotate_degrees(&self) -> Vec3 {
        Vec3::from_array(self.rotate)
    }

    pub fn sample_count(&self) -> u32 {
        self.blur_samples.max(1)
    }
}

impl Default for BakerSettings {
    fn default() -> Self {
        Self {
            frame_rate: Self::default_frame_rate(),
            bake_velocity: false,
            exposure: Self::default_exposure(),
            blur_samples: Self::default_blur_samples(),
            rotate: [0.0; 3],
            combine_textures: Self::default_combine_textures(),
            texture_precision: TexturePrecision::default(),
            animated_bones: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoneMapping {
    pub label: String,
    pub bone_a: String,
    #[serde(default)]
    pub bone_b: String,
}

/// Reusable per-character bone mapping and bake defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BakingProfile {
    #[serde(default)]
    pub mappings: Vec<BoneMapping>,
    #[serde(default = "BakingProfile::default_frame_rate")]
    pub default_frame_rate: u32,
    #[serde(default)]
    pub bake_velocity: bool,
    #[serde(default = "BakingProfile::default_combine_textures")]
    pub combine_textures: bool,
}

impl BakingProfile {
    const fn default_frame_rate() -> u32 {
        60
    }

    const fn default_combine_textures() -> bool {
        true
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read baking profile {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse baking profile {}", path.display()))
    }

    pub fn apply_to(&self, settings: &mut BakerSettings) {
        settings.frame_rate = self.default_frame_rate;
        settings.bake_velocity = self.bake_velocity;
        settings.combine_textures = self.combine_textures;
        settings.sanitize();
    }

    /// Resolves every mapping against the rig. A mapping whose primary bone cannot be found
    /// keeps its slot as an invalid entry so the per-frame bone stride is unchanged.
    pub fn resolve_bones(&self, rig: &dyn BoneSource) -> Vec<AnimatedBoneEntry> {
        self.mappings
            .iter()
            .map(|mapping| {
                let find = |name: &str| {
                    if name.is_empty() || !rig.has_bone(name) {
                        None
                    } else {
                        Some(name.to_string())
                    }
                };
                let bone_a = find(&mapping.bone_a);
                if bone_a.is_none() {
                    log::warn!("[vat::config] bone '{}' for mapping '{}' not found on rig", mapping.bone_a, mapping.label);
                }
                AnimatedBoneEntry { bone_a, bone_b: find(&mapping.bone_b) }
            })
            .collect()
    }

    /// Captures the valid entries of a bake configuration as mappings.
    pub fn from_entries(entries: &[AnimatedBoneEntry]) -> Vec<BoneMapping> {
        entries
            .iter()
            .filter_map(|entry| {
                let bone_a = entry.bone_a.as_ref()?;
                Some(BoneMapping {
                    label: bone_a.clone(),
                    bone_a: bone_a.clone(),
                    bone_b: entry.bone_b.clone().unwrap_or_default(),
                })
            })
            .collect()
    }
}

impl Default for BakingProfile {
    fn default() -> Self {
        Self {
            mappings: Vec::new(),
            default_frame_rate: Self::default_frame_rate(),
            bake_velocity: false,
            combine_textures: Self::default_combine_textures(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "RuntimeConfig::default_random_start_offset")]
    pub random_start_offset: bool,
    #[serde(default)]
    pub default_animation: usize,
    #[serde(default = "RuntimeConfig::default_play_on_start")]
    pub play_on_start: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "RuntimeConfig::default_batched_bone_updates")]
    pub batched_bone_updates: bool,
}

impl RuntimeConfig {
    const fn default_random_start_offset() -> bool {
        true
    }

    const fn default_play_on_start() -> bool {
        true
    }

    const fn default_batched_bone_updates() -> bool {
        true
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read runtime config {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse runtime config {}", path.display()))
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[vat::config] runtime config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            random_start_offset: Self::default_random_start_offset(),
            default_animation: 0,
            play_on_start: Self::default_play_on_start(),
            seed: None,
            batched_bone_updates: Self::default_batched_bone_updates(),
        }
    }
}

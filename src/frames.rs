use anyhow::{ensure, Context, Result};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Timing row for one baked clip inside a combined atlas.
///
/// `offset` is the first atlas row of the clip and includes the duplicated first row
/// appended after every earlier clip. `frame_count` is always a power of two.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameTiming {
    pub name: String,
    pub offset: u32,
    pub frame_count: u32,
    pub duration: f32,
}

/// Root-local transform of one bone slot at one baked frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneFrameData {
    pub position: Vec3,
    pub rotation: Quat,
}

impl BoneFrameData {
    pub const NEUTRAL: Self = Self { position: Vec3::ZERO, rotation: Quat::IDENTITY };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Position lerps, rotation slerps. `t = 0` yields `self`.
    pub fn blend(&self, target: &BoneFrameData, t: f32) -> BoneFrameData {
        BoneFrameData { position: self.position.lerp(target.position, t), rotation: self.rotation.slerp(target.rotation, t) }
    }
}

impl Default for BoneFrameData {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoneInfo {
    pub name: String,
    pub is_limb_pair: bool,
}

/// Metadata asset written once at the end of a combined bake.
///
/// Bone frames are flattened as `[anim0 frame0 bone0, anim0 frame0 bone1, .., anim0 frame1 bone0, ..]`.
/// The per-animation frame offset used to index them is the unpadded running sum of frame
/// counts, unlike [`FrameTiming::offset`] which counts the duplicated atlas rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedFrameData {
    pub timings: Vec<FrameTiming>,
    pub bones: Vec<BoneInfo>,
    pub bone_frames: Vec<BoneFrameData>,
    pub bone_count: usize,
    pub total_frame_count: usize,
}

impl CombinedFrameData {
    pub fn new(timings: Vec<FrameTiming>) -> Self {
        Self { timings, ..Self::default() }
    }

    pub fn with_bones(mut self, bones: Vec<BoneInfo>, bone_frames: Vec<BoneFrameData>) -> Self {
        self.bone_count = bones.len();
        self.total_frame_count = if self.bone_count == 0 { 0 } else { bone_frames.len() / self.bone_count };
        self.bones = bones;
        self.bone_frames = bone_frames;
        self
    }

    pub fn animation_count(&self) -> usize {
        self.timings.len()
    }

    pub fn has_bone_data(&self) -> bool {
        self.bone_count > 0 && !self.bone_frames.is_empty()
    }

    pub fn timing(&self, index: usize) -> Option<&FrameTiming> {
        self.timings.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.timings.iter().position(|timing| timing.name == name)
    }

    /// Sum of the frame counts of every animation before `anim_index`.
    pub fn frame_offset(&self, anim_index: usize) -> Option<usize> {
        if anim_index >= self.timings.len() {
            return None;
        }
        Some(self.timings[..anim_index].iter().map(|timing| timing.frame_count as usize).sum())
    }

    pub fn bone_frame_index(&self, anim_index: usize, frame: usize, bone_slot: usize) -> Option<usize> {
        if self.bone_count == 0 || bone_slot >= self.bone_count {
            return None;
        }
        let offset = self.frame_offset(anim_index)?;
        let index = (offset + frame) * self.bone_count + bone_slot;
        (index < self.bone_frames.len()).then_some(index)
    }

    /// Out-of-range lookups return [`BoneFrameData::NEUTRAL`].
    pub fn bone_frame(&self, anim_index: usize, frame: usize, bone_slot: usize) -> BoneFrameData {
        self.bone_frame_index(anim_index, frame, bone_slot)
            .map(|index| self.bone_frames[index])
            .unwrap_or(BoneFrameData::NEUTRAL)
    }

    /// Atlas rows needed for every clip plus its duplicated first row.
    pub fn atlas_height(&self) -> u32 {
        self.timings.iter().map(|timing| timing.frame_count + 1).sum()
    }

    pub fn validate(&self) -> Result<()> {
        let mut expected_offset = 0_u32;
        for timing in &self.timings {
            ensure!(
                timing.frame_count.is_power_of_two(),
                "clip '{}' frame count {} is not a power of two",
                timing.name,
                timing.frame_count
            );
            ensure!(
                timing.offset == expected_offset,
                "clip '{}' atlas offset {} does not match expected {}",
                timing.name,
                timing.offset,
                expected_offset
            );
            ensure!(timing.duration.is_finite() && timing.duration > 0.0, "clip '{}' has no duration", timing.name);
            expected_offset += timing.frame_count + 1;
        }
        if self.bone_count > 0 {
            ensure!(self.bones.len() == self.bone_count, "bone metadata count {} != {}", self.bones.len(), self.bone_count);
            let frames: usize = self.timings.iter().map(|timing| timing.frame_count as usize).sum();
            ensure!(
                self.bone_frames.len() == frames * self.bone_count,
                "bone frame table holds {} entries, expected {} frames x {} bones",
                self.bone_frames.len(),
                frames,
                self.bone_count
            );
            ensure!(self.total_frame_count == frames, "total frame count {} != {}", self.total_frame_count, frames);
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).context("Failed to encode frame data")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).context("Failed to decode frame data")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to export frame data as JSON")
    }

    /// Content digest of the encoded asset; identical bakes hash identically.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(blake3::hash(&self.to_bytes()?).to_hex().to_string())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).with_context(|| format!("Failed to write frame data {}", path.display()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read frame data {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("Failed to parse frame data {}", path.display()))
    }
}

/// Loaded frame data paired with the identity the runtime cache keys on.
#[derive(Clone, Debug)]
pub struct FrameAsset {
    id: Uuid,
    data: Arc<CombinedFrameData>,
}

impl FrameAsset {
    pub fn new(data: CombinedFrameData) -> Self {
        Self { id: Uuid::new_v4(), data: Arc::new(data) }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(CombinedFrameData::load(path)?))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data(&self) -> &Arc<CombinedFrameData> {
        &self.data
    }
}

impl PartialEq for FrameAsset {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

use crate::frames::{BoneFrameData, BoneInfo};
use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// World transform of a rig node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl RigidTransform {
    pub const IDENTITY: Self = Self { position: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE };

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation, scale: Vec3::ONE }
    }

    /// World point expressed in this transform's local space.
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        let local = self.rotation.inverse() * (point - self.position);
        let safe = |s: f32| if s.abs() > f32::EPSILON { s } else { 1.0 };
        local / Vec3::new(safe(self.scale.x), safe(self.scale.y), safe(self.scale.z))
    }

    /// World rotation expressed relative to this transform.
    pub fn inverse_transform_rotation(&self, rotation: Quat) -> Quat {
        self.rotation.inverse() * rotation
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One tracked attachment slot: a single bone, or a limb pair when `bone_b` is set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimatedBoneEntry {
    #[serde(default)]
    pub bone_a: Option<String>,
    #[serde(default)]
    pub bone_b: Option<String>,
}

impl AnimatedBoneEntry {
    pub fn single(bone: impl Into<String>) -> Self {
        Self { bone_a: Some(bone.into()), bone_b: None }
    }

    pub fn limb(bone_a: impl Into<String>, bone_b: impl Into<String>) -> Self {
        Self { bone_a: Some(bone_a.into()), bone_b: Some(bone_b.into()) }
    }

    pub fn is_valid(&self) -> bool {
        self.bone_a.is_some()
    }

    pub fn is_limb_pair(&self) -> bool {
        self.bone_a.is_some() && self.bone_b.is_some()
    }

    pub fn display_name(&self) -> String {
        match (&self.bone_a, &self.bone_b) {
            (Some(a), Some(b)) => format!("{a} <-> {b}"),
            (Some(a), None) => a.clone(),
            _ => String::new(),
        }
    }

    pub fn info(&self) -> BoneInfo {
        BoneInfo { name: self.display_name(), is_limb_pair: self.is_limb_pair() }
    }

    /// Metadata for what [`capture_entry`] records on `rig`: a limb whose second bone is
    /// missing is captured as bone A alone.
    pub fn resolved_info(&self, rig: &dyn BoneSource) -> BoneInfo {
        match (&self.bone_a, &self.bone_b) {
            (Some(a), Some(b)) if !rig.has_bone(b) => BoneInfo { name: a.clone(), is_limb_pair: false },
            _ => self.info(),
        }
    }
}

/// Read access to the rig's node transforms in the current pose.
pub trait BoneSource {
    fn root_transform(&self) -> RigidTransform;
    fn bone_world(&self, name: &str) -> Option<RigidTransform>;

    fn has_bone(&self, name: &str) -> bool {
        self.bone_world(name).is_some()
    }
}

/// Rotation whose local +Z points along `forward` with +Y as close to `up` as possible.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let z = forward.normalize_or_zero();
    if z == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let mut x = up.cross(z);
    if x.length_squared() < 1e-8 {
        x = z.any_orthonormal_vector();
    }
    let x = x.normalize();
    let y = z.cross(x);
    Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize()
}

const MIN_LIMB_LENGTH_SQ: f32 = 1e-4;

/// Root-local transform of a bone entry in the current pose, before the bake rotation.
pub fn capture_entry(rig: &dyn BoneSource, entry: &AnimatedBoneEntry) -> Option<BoneFrameData> {
    let root = rig.root_transform();
    let bone_a = rig.bone_world(entry.bone_a.as_deref()?)?;
    let limb_end = entry.bone_b.as_deref().and_then(|name| rig.bone_world(name));
    let frame = match limb_end {
        Some(bone_b) => {
            let midpoint = (bone_a.position + bone_b.position) * 0.5;
            let direction = bone_b.position - bone_a.position;
            let rotation = if direction.length_squared() > MIN_LIMB_LENGTH_SQ {
                // Capsule axis is +Y; the look rotation points +Z along the limb.
                let limb_world = look_rotation(direction, Vec3::Y) * Quat::from_rotation_x(90_f32.to_radians());
                root.inverse_transform_rotation(limb_world)
            } else {
                Quat::IDENTITY
            };
            BoneFrameData::new(root.inverse_transform_point(midpoint), rotation)
        }
        None => BoneFrameData::new(
            root.inverse_transform_point(bone_a.position),
            root.inverse_transform_rotation(bone_a.rotation),
        ),
    };
    Some(frame)
}

/// Records one [`BoneFrameData`] per configured slot for every baked frame.
///
/// Slots that cannot be captured emit [`BoneFrameData::NEUTRAL`] so every frame
/// holds exactly `bone_count` entries.
pub struct BoneFrameRecorder {
    entries: Vec<AnimatedBoneEntry>,
    infos: Vec<BoneInfo>,
    resolved: bool,
    bake_rotation: Quat,
    frames: Vec<BoneFrameData>,
    clip_frames: Vec<usize>,
    current_clip_frames: usize,
    missing_warned: bool,
}

impl BoneFrameRecorder {
    pub fn new(entries: Vec<AnimatedBoneEntry>, bake_rotation: Quat) -> Self {
        let infos = entries.iter().map(AnimatedBoneEntry::info).collect();
        Self {
            entries,
            infos,
            resolved: false,
            bake_rotation,
            frames: Vec::new(),
            clip_frames: Vec::new(),
            current_clip_frames: 0,
            missing_warned: false,
        }
    }

    pub fn bone_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_frame(&mut self, rig: &dyn BoneSource) {
        if self.entries.is_empty() {
            return;
        }
        if !std::mem::replace(&mut self.resolved, true) {
            self.infos = self.entries.iter().map(|entry| entry.resolved_info(rig)).collect();
        }
        for entry in &self.entries {
            let captured = if entry.is_valid() { capture_entry(rig, entry) } else { None };
            let frame = match captured {
                Some(local) => {
                    BoneFrameData::new(self.bake_rotation * local.position, self.bake_rotation * local.rotation)
                }
                None => {
                    if entry.is_valid() && !self.missing_warned {
                        self.missing_warned = true;
                        log::warn!("[vat::bake] bone '{}' missing from rig; recording neutral frames", entry.display_name());
                    }
                    BoneFrameData::NEUTRAL
                }
            };
            self.frames.push(frame);
        }
        self.current_clip_frames += 1;
    }

    /// Drops the frames recorded for a clip that failed part way through.
    pub fn abort_clip(&mut self) {
        let keep = self.frames.len() - self.current_clip_frames * self.entries.len();
        self.frames.truncate(keep);
        self.current_clip_frames = 0;
    }

    /// Closes the current clip and returns how many frames it recorded.
    pub fn finish_clip(&mut self) -> usize {
        let frames = std::mem::take(&mut self.current_clip_frames);
        self.clip_frames.push(frames);
        frames
    }

    pub fn recorded_frames(&self) -> usize {
        self.clip_frames.iter().sum::<usize>() + self.current_clip_frames
    }

    /// Slot metadata, resolved against the rig once the first frame is recorded.
    pub fn bone_infos(&self) -> &[BoneInfo] {
        &self.infos
    }

    pub fn into_parts(self) -> (Vec<BoneInfo>, Vec<BoneFrameData>) {
        (self.infos, self.frames)
    }
}

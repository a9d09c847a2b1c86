use glam::{Quat, Vec3};
use std::sync::Arc;

/// Named, timed animation source the rig knows how to evaluate.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClip {
    pub name: Arc<str>,
    pub length: f32,
}

impl AnimationClip {
    pub fn new(name: impl Into<Arc<str>>, length: f32) -> Self {
        Self { name: name.into(), length }
    }

    pub fn normalized_time(&self, time: f32) -> f32 {
        if self.length > 0.0 {
            time / self.length
        } else {
            0.0
        }
    }
}

/// Per-joint selection: `true` joints take the secondary layer's pose.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoneMask {
    enabled: Vec<bool>,
}

impl BoneMask {
    pub fn new(enabled: Vec<bool>) -> Self {
        Self { enabled }
    }

    pub fn from_joints(joint_count: usize, joints: impl IntoIterator<Item = usize>) -> Self {
        let mut enabled = vec![false; joint_count];
        for joint in joints {
            if let Some(slot) = enabled.get_mut(joint) {
                *slot = true;
            }
        }
        Self { enabled }
    }

    pub fn contains(&self, joint: usize) -> bool {
        self.enabled.get(joint).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

/// Primary clip with an optional masked secondary layer.
#[derive(Clone, Debug, Default)]
pub struct ClipEntry {
    pub primary: Option<AnimationClip>,
    pub secondary: Option<AnimationClip>,
    pub mask: Option<BoneMask>,
}

impl ClipEntry {
    pub fn single(primary: AnimationClip) -> Self {
        Self { primary: Some(primary), secondary: None, mask: None }
    }

    pub fn layered(primary: AnimationClip, secondary: AnimationClip, mask: BoneMask) -> Self {
        Self { primary: Some(primary), secondary: Some(secondary), mask: Some(mask) }
    }

    pub fn is_valid(&self) -> bool {
        self.primary.is_some()
    }

    pub fn has_masked_layer(&self) -> bool {
        self.secondary.is_some() && self.mask.is_some()
    }

    pub fn duration(&self) -> f32 {
        self.primary.as_ref().map_or(0.0, |clip| clip.length)
    }

    pub fn name(&self) -> &str {
        self.primary.as_ref().map_or("", |clip| clip.name.as_ref())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointPose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for JointPose {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }
}

/// Local joint transforms of a whole skeleton.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    pub joints: Vec<JointPose>,
}

impl Pose {
    pub fn new(joints: Vec<JointPose>) -> Self {
        Self { joints }
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

/// Overrides the masked joints of `base` with `overlay`.
///
/// Joints beyond the end of `overlay` keep the base pose.
pub fn composite_layers(base: &Pose, overlay: &Pose, mask: &BoneMask) -> Pose {
    let joints = base
        .joints
        .iter()
        .enumerate()
        .map(|(joint, base_pose)| match overlay.joints.get(joint) {
            Some(layer_pose) if mask.contains(joint) => *layer_pose,
            _ => *base_pose,
        })
        .collect();
    Pose { joints }
}

/// Drives an external rig into a sampled pose.
pub trait PoseSource {
    /// Poses the rig at `normalized_time` (`time / clip.length`) of `clip`.
    fn sample(&mut self, clip: &AnimationClip, normalized_time: f32);

    /// Driver able to evaluate poses without applying them, needed for layered bakes.
    fn layer_driver(&mut self) -> Option<&mut dyn LayeredPoseDriver> {
        None
    }
}

pub trait LayeredPoseDriver {
    fn evaluate(&mut self, clip: &AnimationClip, normalized_time: f32) -> Pose;
    fn apply_pose(&mut self, pose: &Pose);
}

/// Puts a [`PoseSource`] into the pose of a [`ClipEntry`] at a given time.
#[derive(Debug, Default)]
pub struct FrameSampler {
    fallback_warned: bool,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the one-shot fallback warning so the next entry can report again.
    pub fn begin_entry(&mut self) {
        self.fallback_warned = false;
    }

    /// Returns `false` when nothing was sampled because the entry has no primary clip.
    pub fn sample<P: PoseSource + ?Sized>(&mut self, source: &mut P, entry: &ClipEntry, time: f32) -> bool {
        let Some(primary) = entry.primary.as_ref() else {
            return false;
        };
        let primary_normalized = primary.normalized_time(time);
        let (Some(secondary), Some(mask)) = (entry.secondary.as_ref(), entry.mask.as_ref()) else {
            source.sample(primary, primary_normalized);
            return true;
        };

        let Some(driver) = source.layer_driver() else {
            if !self.fallback_warned {
                self.fallback_warned = true;
                log::warn!(
                    "[vat::bake] clip '{}' requests a masked '{}' layer but the rig has no layered pose driver; \
                     sampling the primary clip alone",
                    primary.name,
                    secondary.name
                );
            }
            source.sample(primary, primary_normalized);
            return true;
        };

        let secondary_normalized = secondary_normalized_time(primary, secondary, time);
        let base = driver.evaluate(primary, primary_normalized);
        let overlay = driver.evaluate(secondary, secondary_normalized);
        driver.apply_pose(&composite_layers(&base, &overlay, mask));
        true
    }
}

/// Secondary layer time measured against the primary clip, clamped so the layer never overruns.
pub fn secondary_normalized_time(primary: &AnimationClip, secondary: &AnimationClip, time: f32) -> f32 {
    if primary.length <= 0.0 || secondary.length <= 0.0 {
        return 0.0;
    }
    let scaled = (time / primary.length) * (primary.length / secondary.length);
    scaled.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_time_clamps_short_layers() {
        let primary = AnimationClip::new("walk", 2.0);
        let secondary = AnimationClip::new("wave", 0.5);
        assert!((secondary_normalized_time(&primary, &secondary, 0.25) - 0.5).abs() < 1e-6);
        assert_eq!(secondary_normalized_time(&primary, &secondary, 1.5), 1.0);
    }

    #[test]
    fn composite_keeps_unmasked_joints() {
        let base = Pose::new(vec![JointPose::default(); 3]);
        let moved = JointPose { translation: Vec3::X, ..JointPose::default() };
        let overlay = Pose::new(vec![moved; 2]);
        let mask = BoneMask::from_joints(3, [1, 2]);
        let out = composite_layers(&base, &overlay, &mask);
        assert_eq!(out.joints[0], JointPose::default());
        assert_eq!(out.joints[1], moved);
        assert_eq!(out.joints[2], JointPose::default(), "overlay has no joint 2");
    }
}

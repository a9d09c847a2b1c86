#![allow(dead_code)]

use glam::{Quat, Vec3, Vec4};
use kestrel_vat::bake::accumulate::{MeshSnapshot, MeshSource};
use kestrel_vat::bake::bones::{BoneSource, RigidTransform};
use kestrel_vat::bake::sampler::{AnimationClip, JointPose, LayeredPoseDriver, Pose, PoseSource};
use kestrel_vat::frames::{BoneFrameData, BoneInfo, CombinedFrameData, FrameTiming};

/// Vertex height as a function of clip time; nonlinear so averaging is observable.
pub fn height_at(time: f32) -> f32 {
    time * time * 10.0
}

/// Records layer evaluations and stores the last composited pose.
#[derive(Default)]
pub struct MockLayerDriver {
    pub joint_count: usize,
    pub evaluations: Vec<(String, f32)>,
    pub applied: Option<Pose>,
}

impl LayeredPoseDriver for MockLayerDriver {
    fn evaluate(&mut self, clip: &AnimationClip, normalized_time: f32) -> Pose {
        self.evaluations.push((clip.name.to_string(), normalized_time));
        let joint = JointPose { translation: Vec3::new(clip.length, normalized_time, 0.0), ..JointPose::default() };
        Pose::new(vec![joint; self.joint_count])
    }

    fn apply_pose(&mut self, pose: &Pose) {
        self.applied = Some(pose.clone());
    }
}

/// Skinned rig whose vertex `i` sits at `(i, height_at(t), 0)`.
///
/// Bones: `hand` rises and rolls with time, `upper`/`lower` form a limb along +Z,
/// `upper_twin` sits on top of `upper`.
pub struct MockRig {
    pub vertex_count: usize,
    pub time: f32,
    pub root: RigidTransform,
    pub samples: Vec<(String, f32)>,
    pub layer: Option<MockLayerDriver>,
}

impl MockRig {
    pub fn new(vertex_count: usize) -> Self {
        Self { vertex_count, time: 0.0, root: RigidTransform::IDENTITY, samples: Vec::new(), layer: None }
    }

    pub fn with_layer_driver(mut self, joint_count: usize) -> Self {
        self.layer = Some(MockLayerDriver { joint_count, ..MockLayerDriver::default() });
        self
    }

    /// Clip time of the pose the rig currently holds.
    pub fn current_time(&self) -> f32 {
        let layered = self.layer.as_ref().and_then(|layer| layer.applied.as_ref());
        match layered.and_then(|pose| pose.joints.first()) {
            Some(joint) => joint.translation.x * joint.translation.y,
            None => self.time,
        }
    }
}

impl PoseSource for MockRig {
    fn sample(&mut self, clip: &AnimationClip, normalized_time: f32) {
        self.time = normalized_time * clip.length;
        self.samples.push((clip.name.to_string(), normalized_time));
        if let Some(layer) = self.layer.as_mut() {
            layer.applied = None;
        }
    }

    fn layer_driver(&mut self) -> Option<&mut dyn LayeredPoseDriver> {
        self.layer.as_mut().map(|layer| layer as &mut dyn LayeredPoseDriver)
    }
}

impl MeshSource for MockRig {
    fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    fn bake_mesh(&mut self, out: &mut MeshSnapshot) {
        let time = self.current_time();
        for i in 0..self.vertex_count {
            out.positions.push(Vec3::new(i as f32, height_at(time), 0.0));
            out.normals.push(Vec3::new(time, 1.0, 0.0).normalize());
            let sign = if i % 2 == 1 { -1.0 } else { 1.0 };
            out.tangents.push(Vec4::new(1.0, 0.0, time, sign));
        }
    }
}

impl BoneSource for MockRig {
    fn root_transform(&self) -> RigidTransform {
        self.root
    }

    fn bone_world(&self, name: &str) -> Option<RigidTransform> {
        let time = self.current_time();
        let (position, rotation) = match name {
            "hand" => (Vec3::new(0.0, 1.0 + time, 0.0), Quat::from_rotation_z(time)),
            "upper" | "upper_twin" => (Vec3::ZERO, Quat::IDENTITY),
            "lower" => (Vec3::new(0.0, 0.0, 2.0), Quat::IDENTITY),
            _ => return None,
        };
        Some(RigidTransform::from_position_rotation(position, rotation))
    }
}

/// Recognizable bone frame for `(anim, frame, slot)`.
pub fn marker(anim: usize, frame: usize, slot: usize) -> BoneFrameData {
    BoneFrameData::new(
        Vec3::new(anim as f32, frame as f32, slot as f32),
        Quat::from_rotation_y(0.1 * (frame as f32 + 1.0) + 0.5 * anim as f32),
    )
}

/// Three clips (`idle` 4 frames/1s, `attack` 2 frames/0.5s, `walk` 8 frames/2s) with two bone slots.
pub fn sample_frame_data() -> CombinedFrameData {
    let timings = vec![
        FrameTiming { name: "idle".into(), offset: 0, frame_count: 4, duration: 1.0 },
        FrameTiming { name: "attack".into(), offset: 5, frame_count: 2, duration: 0.5 },
        FrameTiming { name: "walk".into(), offset: 8, frame_count: 8, duration: 2.0 },
    ];
    let bones = vec![
        BoneInfo { name: "hand".into(), is_limb_pair: false },
        BoneInfo { name: "upper <-> lower".into(), is_limb_pair: true },
    ];
    let mut frames = Vec::new();
    for (anim, timing) in timings.iter().enumerate() {
        for frame in 0..timing.frame_count as usize {
            for slot in 0..bones.len() {
                frames.push(marker(anim, frame, slot));
            }
        }
    }
    CombinedFrameData::new(timings).with_bones(bones, frames)
}

pub fn approx(actual: f32, expected: f32) {
    assert!((actual - expected).abs() < 1e-4, "expected {expected}, got {actual}");
}

pub fn approx_vec3(actual: Vec3, expected: Vec3) {
    assert!((actual - expected).length() < 1e-4, "expected {expected:?}, got {actual:?}");
}

pub fn approx_quat(actual: Quat, expected: Quat) {
    let dot = actual.normalize().dot(expected.normalize()).abs();
    assert!(dot > 1.0 - 1e-4, "expected {expected:?}, got {actual:?}");
}

mod common;

use anyhow::{Context, Result};
use common::{approx_quat, approx_vec3, marker, sample_frame_data, MockRig};
use glam::{Quat, Vec3};
use kestrel_vat::bake::bones::{capture_entry, AnimatedBoneEntry, BoneFrameRecorder, RigidTransform};
use kestrel_vat::bake::encode::bake_rotation;
use kestrel_vat::frames::{BoneFrameData, BoneInfo, CombinedFrameData, FrameTiming};

#[test]
fn single_bone_is_captured_in_root_space() -> Result<()> {
    let mut rig = MockRig::new(1);
    rig.time = 0.5;
    rig.root = RigidTransform::from_position_rotation(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY);

    let frame = capture_entry(&rig, &AnimatedBoneEntry::single("hand")).context("hand exists")?;
    approx_vec3(frame.position, Vec3::new(0.0, 0.5, 0.0));
    approx_quat(frame.rotation, Quat::from_rotation_z(0.5));
    Ok(())
}

#[test]
fn rotated_root_expresses_bones_locally() -> Result<()> {
    let mut rig = MockRig::new(1);
    let yaw = Quat::from_rotation_y(90_f32.to_radians());
    rig.root = RigidTransform::from_position_rotation(Vec3::ZERO, yaw);

    let frame = capture_entry(&rig, &AnimatedBoneEntry::single("lower")).context("lower exists")?;
    approx_vec3(frame.position, Vec3::new(-2.0, 0.0, 0.0));
    approx_quat(frame.rotation, yaw.inverse());
    Ok(())
}

#[test]
fn limb_pair_sits_at_midpoint_with_capsule_axis_along_limb() -> Result<()> {
    let rig = MockRig::new(1);
    let frame = capture_entry(&rig, &AnimatedBoneEntry::limb("upper", "lower")).context("limb exists")?;
    approx_vec3(frame.position, Vec3::new(0.0, 0.0, 1.0));
    approx_vec3(frame.rotation * Vec3::Y, Vec3::Z);
    Ok(())
}

#[test]
fn degenerate_limb_has_identity_rotation() -> Result<()> {
    let rig = MockRig::new(1);
    let frame = capture_entry(&rig, &AnimatedBoneEntry::limb("upper", "upper_twin")).context("limb exists")?;
    approx_vec3(frame.position, Vec3::ZERO);
    assert_eq!(frame.rotation, Quat::IDENTITY);
    Ok(())
}

#[test]
fn limb_with_missing_end_tracks_its_first_bone() -> Result<()> {
    let mut rig = MockRig::new(1);
    rig.time = 0.25;
    let frame = capture_entry(&rig, &AnimatedBoneEntry::limb("hand", "tail")).context("hand exists")?;
    approx_vec3(frame.position, Vec3::new(0.0, 1.25, 0.0));
    approx_quat(frame.rotation, Quat::from_rotation_z(0.25));
    Ok(())
}

#[test]
fn limb_with_missing_end_is_described_as_a_single_bone() {
    let entries = vec![AnimatedBoneEntry::limb("hand", "tail"), AnimatedBoneEntry::limb("upper", "lower")];
    let mut recorder = BoneFrameRecorder::new(entries, Quat::IDENTITY);
    assert!(recorder.bone_infos()[0].is_limb_pair, "nothing resolved before the first frame");

    recorder.record_frame(&MockRig::new(1));
    recorder.finish_clip();
    let (infos, _) = recorder.into_parts();
    assert_eq!(infos[0], BoneInfo { name: "hand".into(), is_limb_pair: false });
    assert_eq!(infos[1], BoneInfo { name: "upper <-> lower".into(), is_limb_pair: true });
}

#[test]
fn recorder_fills_missing_and_invalid_slots_with_neutral_frames() -> Result<()> {
    let entries = vec![
        AnimatedBoneEntry::single("hand"),
        AnimatedBoneEntry::single("tail"),
        AnimatedBoneEntry { bone_a: None, bone_b: Some("lower".into()) },
        AnimatedBoneEntry::limb("upper", "lower"),
    ];
    let mut recorder = BoneFrameRecorder::new(entries, Quat::IDENTITY);
    let mut rig = MockRig::new(1);

    rig.time = 0.0;
    recorder.record_frame(&rig);
    rig.time = 1.0;
    recorder.record_frame(&rig);
    assert_eq!(recorder.finish_clip(), 2);

    let (infos, frames) = recorder.into_parts();
    assert_eq!(infos.len(), 4);
    assert_eq!(infos[2].name, "");
    assert!(infos[3].is_limb_pair);
    assert_eq!(frames.len(), 8);
    assert_eq!(frames[1], BoneFrameData::NEUTRAL);
    assert_eq!(frames[2], BoneFrameData::NEUTRAL);
    approx_vec3(frames[4].position, Vec3::new(0.0, 2.0, 0.0));
    approx_vec3(frames[7].position, Vec3::new(0.0, 0.0, 1.0));
    Ok(())
}

#[test]
fn bake_rotation_applies_to_position_and_rotation() -> Result<()> {
    let rotation = bake_rotation(Vec3::new(0.0, 90.0, 0.0));
    let mut recorder = BoneFrameRecorder::new(vec![AnimatedBoneEntry::limb("upper", "lower")], rotation);
    recorder.record_frame(&MockRig::new(1));
    recorder.finish_clip();

    let (_, frames) = recorder.into_parts();
    approx_vec3(frames[0].position, Vec3::new(1.0, 0.0, 0.0));
    approx_vec3(frames[0].rotation * Vec3::Y, Vec3::X);
    Ok(())
}

#[test]
fn aborted_clip_frames_are_dropped() {
    let mut recorder = BoneFrameRecorder::new(vec![AnimatedBoneEntry::single("hand")], Quat::IDENTITY);
    let rig = MockRig::new(1);
    recorder.record_frame(&rig);
    recorder.finish_clip();
    recorder.record_frame(&rig);
    recorder.record_frame(&rig);
    assert_eq!(recorder.recorded_frames(), 3);

    recorder.abort_clip();
    assert_eq!(recorder.recorded_frames(), 1);
    let (_, frames) = recorder.into_parts();
    assert_eq!(frames.len(), 1);
}

#[test]
fn recorder_without_entries_records_nothing() {
    let mut recorder = BoneFrameRecorder::new(Vec::new(), Quat::IDENTITY);
    recorder.record_frame(&MockRig::new(1));
    assert!(recorder.is_empty());
    assert_eq!(recorder.recorded_frames(), 0);
}

#[test]
fn flattened_index_round_trips_every_entry() -> Result<()> {
    let data = sample_frame_data();
    data.validate()?;
    assert_eq!(data.total_frame_count, 14);
    assert_eq!(data.bone_frames.len(), 28);

    for (anim, timing) in data.timings.iter().enumerate() {
        for frame in 0..timing.frame_count as usize {
            for slot in 0..data.bone_count {
                assert_eq!(data.bone_frame(anim, frame, slot), marker(anim, frame, slot));
            }
        }
    }
    assert_eq!(data.bone_frame_index(1, 1, 1), Some((4 + 1) * 2 + 1));
    assert_eq!(data.index_of("walk"), Some(2));
    Ok(())
}

#[test]
fn out_of_range_lookups_are_neutral() {
    let data = sample_frame_data();
    assert_eq!(data.bone_frame(3, 0, 0), BoneFrameData::NEUTRAL);
    assert_eq!(data.bone_frame(0, 0, 2), BoneFrameData::NEUTRAL);
    assert_eq!(data.bone_frame(2, 8, 0), BoneFrameData::NEUTRAL);
    assert_eq!(data.bone_frame_index(0, 0, 5), None);

    let without_bones = CombinedFrameData::new(vec![FrameTiming {
        name: "idle".into(),
        offset: 0,
        frame_count: 4,
        duration: 1.0,
    }]);
    assert!(!without_bones.has_bone_data());
    assert_eq!(without_bones.bone_frame(0, 0, 0), BoneFrameData::NEUTRAL);
}

#[test]
fn validation_catches_inconsistent_tables() {
    let mut data = sample_frame_data();
    data.timings[1].offset = 4;
    assert!(data.validate().is_err());

    let mut data = sample_frame_data();
    data.bone_frames.pop();
    assert!(data.validate().is_err());

    let mut data = sample_frame_data();
    data.timings[0].frame_count = 3;
    assert!(data.validate().is_err());
}

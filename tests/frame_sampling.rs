mod common;

use anyhow::{Context, Result};
use common::{approx, MockRig};
use kestrel_vat::bake::sampler::{AnimationClip, BoneMask, ClipEntry, FrameSampler};

#[test]
fn unmasked_entry_drives_primary_with_normalized_time() -> Result<()> {
    let mut rig = MockRig::new(2);
    let mut sampler = FrameSampler::new();
    let entry = ClipEntry::single(AnimationClip::new("walk", 2.0));

    assert!(sampler.sample(&mut rig, &entry, 0.5));
    assert_eq!(rig.samples.len(), 1);
    assert_eq!(rig.samples[0].0, "walk");
    approx(rig.samples[0].1, 0.25);
    approx(rig.current_time(), 0.5);
    Ok(())
}

#[test]
fn masked_entry_composites_secondary_over_masked_joints() -> Result<()> {
    let mut rig = MockRig::new(2).with_layer_driver(3);
    let mut sampler = FrameSampler::new();
    let entry = ClipEntry::layered(
        AnimationClip::new("walk", 2.0),
        AnimationClip::new("wave", 0.5),
        BoneMask::from_joints(3, [1, 2]),
    );
    assert!(entry.has_masked_layer());

    assert!(sampler.sample(&mut rig, &entry, 0.25));
    assert!(rig.samples.is_empty(), "layered sampling must not drive the rig directly");

    let layer = rig.layer.as_ref().context("layer driver present")?;
    assert_eq!(layer.evaluations.len(), 2);
    assert_eq!(layer.evaluations[0].0, "walk");
    approx(layer.evaluations[0].1, 0.125);
    assert_eq!(layer.evaluations[1].0, "wave");
    approx(layer.evaluations[1].1, 0.5);

    let pose = layer.applied.as_ref().context("composited pose applied")?;
    approx(pose.joints[0].translation.x, 2.0);
    approx(pose.joints[1].translation.x, 0.5);
    approx(pose.joints[2].translation.x, 0.5);
    approx(rig.current_time(), 0.25);
    Ok(())
}

#[test]
fn secondary_layer_time_is_clamped_to_its_end() -> Result<()> {
    let mut rig = MockRig::new(1).with_layer_driver(2);
    let mut sampler = FrameSampler::new();
    let entry = ClipEntry::layered(
        AnimationClip::new("walk", 2.0),
        AnimationClip::new("wave", 0.5),
        BoneMask::from_joints(2, [1]),
    );

    sampler.sample(&mut rig, &entry, 1.5);
    let layer = rig.layer.as_ref().context("layer driver present")?;
    approx(layer.evaluations[1].1, 1.0);
    Ok(())
}

#[test]
fn masked_entry_without_driver_falls_back_to_primary() -> Result<()> {
    let mut rig = MockRig::new(1);
    let mut sampler = FrameSampler::new();
    let entry = ClipEntry::layered(
        AnimationClip::new("walk", 2.0),
        AnimationClip::new("wave", 0.5),
        BoneMask::from_joints(2, [1]),
    );

    assert!(sampler.sample(&mut rig, &entry, 0.25));
    assert!(sampler.sample(&mut rig, &entry, 0.5));
    assert_eq!(rig.samples.len(), 2);
    assert!(rig.samples.iter().all(|(name, _)| name == "walk"));
    approx(rig.samples[1].1, 0.25);
    Ok(())
}

#[test]
fn entry_without_primary_samples_nothing() -> Result<()> {
    let mut rig = MockRig::new(1);
    let mut sampler = FrameSampler::new();
    let entry = ClipEntry::default();
    assert!(!entry.is_valid());
    assert!(!sampler.sample(&mut rig, &entry, 0.1));
    assert!(rig.samples.is_empty());
    Ok(())
}

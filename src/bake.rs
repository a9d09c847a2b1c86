pub mod accumulate;
pub mod atlas;
pub mod bones;
pub mod encode;
pub mod sampler;

use crate::config::{BakerSettings, TexturePrecision};
use crate::frames::CombinedFrameData;
use accumulate::{AccumulationParams, MeshSource, VertexAccumulator};
use anyhow::{ensure, Context, Result};
use atlas::{frame_count_for, Channel, ClipPlanes, FrameAtlas, FrameAtlasBuilder, TexturePlane};
use bones::{BoneFrameRecorder, BoneSource};
use encode::{bake_rotation, CpuEncodeKernel, EncodeKernel};
use glam::Quat;
use sampler::{ClipEntry, FrameSampler, PoseSource};
use std::collections::BTreeMap;
use std::fmt;

/// Everything the baker needs from a skinned character.
pub trait BakeRig: PoseSource + MeshSource + BoneSource {}

impl<T: PoseSource + MeshSource + BoneSource + ?Sized> BakeRig for T {}

/// Planes of one clip baked on its own.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipBake {
    pub name: String,
    pub duration: f32,
    pub frame_count: u32,
    pub planes: ClipPlanes,
}

#[derive(Clone, Debug)]
pub enum BakeOutput {
    Combined { atlas: FrameAtlas, frame_data: CombinedFrameData },
    Separate(Vec<ClipBake>),
}

impl BakeOutput {
    pub fn frame_data(&self) -> Option<&CombinedFrameData> {
        match self {
            BakeOutput::Combined { frame_data, .. } => Some(frame_data),
            BakeOutput::Separate(_) => None,
        }
    }

    /// Writes the baked planes and metadata through `sink`.
    ///
    /// The velocity channel is only published when velocity baking is enabled.
    pub fn publish(&self, base_name: &str, settings: &BakerSettings, sink: &mut dyn AssetSink) -> Result<usize> {
        let channels: Vec<Channel> =
            Channel::ALL.into_iter().filter(|channel| settings.bake_velocity || *channel != Channel::Velocity).collect();
        let precision = settings.texture_precision;
        let mut written = 0;
        match self {
            BakeOutput::Combined { atlas, frame_data } => {
                for channel in &channels {
                    let name = format!("{base_name}.Combined_{}", channel.suffix());
                    sink.write_plane(&name, atlas.planes.plane(*channel), precision)?;
                    written += 1;
                }
                sink.write_frame_data(&format!("{base_name}.FrameData"), frame_data)?;
                written += 1;
            }
            BakeOutput::Separate(clips) => {
                for clip in clips {
                    for channel in &channels {
                        let name = format!("{base_name}.{}.{}.{}F", channel.suffix(), clip.name, clip.frame_count);
                        sink.write_plane(&name, clip.planes.plane(*channel), precision)?;
                        written += 1;
                    }
                }
            }
        }
        log::info!("[vat::bake] published {written} assets for '{base_name}'");
        Ok(written)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    MissingPrimary,
    ZeroLength,
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingPrimary => write!(f, "no primary clip"),
            SkipReason::ZeroLength => write!(f, "clip has no length"),
            SkipReason::Failed(err) => write!(f, "bake failed: {err}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkippedClip {
    pub index: usize,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BakeReport {
    pub baked: Vec<String>,
    pub skipped: Vec<SkippedClip>,
}

impl BakeReport {
    fn skip(&mut self, index: usize, reason: SkipReason) {
        log::debug!("[vat::bake] skipping clip {index}: {reason}");
        self.skipped.push(SkippedClip { index, reason });
    }
}

/// Storage collaborator receiving baked assets.
pub trait AssetSink {
    fn write_plane(&mut self, name: &str, plane: &TexturePlane, precision: TexturePrecision) -> Result<()>;
    fn write_frame_data(&mut self, name: &str, data: &CombinedFrameData) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredPlane {
    pub width: u32,
    pub height: u32,
    pub precision: TexturePrecision,
    pub bytes: Vec<u8>,
}

/// In-memory sink keyed by asset name.
#[derive(Debug, Default)]
pub struct MemoryAssetSink {
    pub planes: BTreeMap<String, StoredPlane>,
    pub frame_data: BTreeMap<String, Vec<u8>>,
}

impl MemoryAssetSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty() && self.frame_data.is_empty()
    }

    pub fn load_frame_data(&self, name: &str) -> Result<CombinedFrameData> {
        let bytes = self.frame_data.get(name).with_context(|| format!("no frame data named '{name}'"))?;
        CombinedFrameData::from_bytes(bytes)
    }
}

impl AssetSink for MemoryAssetSink {
    fn write_plane(&mut self, name: &str, plane: &TexturePlane, precision: TexturePrecision) -> Result<()> {
        let stored = StoredPlane { width: plane.width, height: plane.height, precision, bytes: plane.encode(precision) };
        self.planes.insert(name.to_string(), stored);
        Ok(())
    }

    fn write_frame_data(&mut self, name: &str, data: &CombinedFrameData) -> Result<()> {
        self.frame_data.insert(name.to_string(), data.to_bytes()?);
        Ok(())
    }
}

/// Drives sampling, accumulation, encoding and atlas packing for a set of clips.
pub struct Baker<K: EncodeKernel = CpuEncodeKernel> {
    settings: BakerSettings,
    kernel: K,
}

impl Baker<CpuEncodeKernel> {
    pub fn new(settings: BakerSettings) -> Self {
        Self::with_kernel(settings, CpuEncodeKernel)
    }
}

impl<K: EncodeKernel> Baker<K> {
    pub fn with_kernel(mut settings: BakerSettings, kernel: K) -> Self {
        settings.sanitize();
        Self { settings, kernel }
    }

    pub fn settings(&self) -> &BakerSettings {
        &self.settings
    }

    /// Combined output is produced when enabled and more than one clip is bakeable.
    pub fn combines(&self, clips: &[ClipEntry]) -> bool {
        self.settings.combine_textures && clips.iter().filter(|entry| entry.is_valid()).count() > 1
    }

    /// Bakes every valid clip. Invalid or failing clips are skipped and reported; a rig
    /// without vertices fails before anything is produced.
    pub fn bake<R: BakeRig>(&self, rig: &mut R, clips: &[ClipEntry]) -> Result<(BakeOutput, BakeReport)> {
        let vertex_count = rig.vertex_count();
        ensure!(vertex_count > 0, "rig has no skinned vertices to bake");
        ensure!(!clips.is_empty(), "no clips to bake");

        let combined = self.combines(clips);
        let rotation = bake_rotation(self.settings.rotate_degrees());
        let params =
            AccumulationParams::new(self.settings.sample_count(), self.settings.exposure, self.settings.bake_velocity);
        let mut recorder = if combined && !self.settings.animated_bones.is_empty() {
            Some(BoneFrameRecorder::new(self.settings.animated_bones.clone(), rotation))
        } else {
            None
        };
        let mut sampler = FrameSampler::new();
        let mut accumulator = VertexAccumulator::new(vertex_count);
        let mut report = BakeReport::default();
        let mut baked = Vec::new();

        for (index, entry) in clips.iter().enumerate() {
            let Some(primary) = entry.primary.as_ref() else {
                report.skip(index, SkipReason::MissingPrimary);
                continue;
            };
            if !(primary.length > 0.0) {
                report.skip(index, SkipReason::ZeroLength);
                continue;
            }

            #[cfg(feature = "bake_stats")]
            let started = std::time::Instant::now();

            let result = self.bake_clip(rig, entry, &mut sampler, &mut accumulator, &params, rotation, recorder.as_mut());
            match result {
                Ok(clip) => {
                    #[cfg(feature = "bake_stats")]
                    log::info!(
                        "[vat::bake] clip '{}' baked {} frames x {} vertices in {:.2} ms",
                        clip.name,
                        clip.frame_count,
                        vertex_count,
                        started.elapsed().as_secs_f64() * 1000.0
                    );
                    if let Some(recorder) = recorder.as_mut() {
                        recorder.finish_clip();
                    }
                    report.baked.push(clip.name.clone());
                    baked.push(clip);
                }
                Err(err) => {
                    log::warn!("[vat::bake] clip '{}' failed: {err:#}", primary.name);
                    if let Some(recorder) = recorder.as_mut() {
                        recorder.abort_clip();
                    }
                    report.skip(index, SkipReason::Failed(format!("{err:#}")));
                }
            }
        }
        ensure!(!baked.is_empty(), "none of the {} clips could be baked", clips.len());

        let output = if combined {
            let mut builder = FrameAtlasBuilder::new();
            for clip in baked {
                builder.push(clip.name, clip.duration, clip.planes)?;
            }
            let atlas = builder.build()?;
            let mut frame_data = CombinedFrameData::new(atlas.timings.clone());
            if let Some(recorder) = recorder {
                let (bones, frames) = recorder.into_parts();
                frame_data = frame_data.with_bones(bones, frames);
            }
            frame_data.validate().context("baked frame data is inconsistent")?;
            BakeOutput::Combined { atlas, frame_data }
        } else {
            BakeOutput::Separate(baked)
        };
        Ok((output, report))
    }

    #[allow(clippy::too_many_arguments)]
    fn bake_clip<R: BakeRig>(
        &self,
        rig: &mut R,
        entry: &ClipEntry,
        sampler: &mut FrameSampler,
        accumulator: &mut VertexAccumulator,
        params: &AccumulationParams,
        rotation: Quat,
        mut recorder: Option<&mut BoneFrameRecorder>,
    ) -> Result<ClipBake> {
        let duration = entry.duration();
        let frame_count = frame_count_for(duration, self.settings.frame_rate);
        let step = duration / frame_count as f32;
        let vertex_count = accumulator.vertex_count();
        let mut frames = Vec::with_capacity(vertex_count * frame_count as usize);
        sampler.begin_entry();

        for frame in 0..frame_count {
            let t = step * frame as f32;
            if let Some(recorder) = recorder.as_deref_mut() {
                sampler.sample(rig, entry, t);
                recorder.record_frame(&*rig);
            }
            accumulator.bake_frame(rig, sampler, entry, t, params, &mut frames)?;
        }

        let planes = self
            .kernel
            .encode(vertex_count, frame_count as usize, &frames, rotation)
            .with_context(|| format!("encoding clip '{}'", entry.name()))?;
        Ok(ClipBake { name: entry.name().to_string(), duration, frame_count, planes })
    }
}

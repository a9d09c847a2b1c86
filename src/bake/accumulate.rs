use super::encode::BakedFrame;
use super::sampler::{ClipEntry, FrameSampler, PoseSource};
use anyhow::{ensure, Result};
use glam::{Vec3, Vec4};
use rayon::prelude::*;

/// Skinned vertex state captured for the rig's current pose.
#[derive(Clone, Debug, Default)]
pub struct MeshSnapshot {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
}

impl MeshSnapshot {
    pub fn with_capacity(vertex_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count),
            normals: Vec::with_capacity(vertex_count),
            tangents: Vec::with_capacity(vertex_count),
        }
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.tangents.clear();
    }

    fn ensure_vertex_count(&self, vertex_count: usize) -> Result<()> {
        ensure!(
            self.positions.len() == vertex_count
                && self.normals.len() == vertex_count
                && self.tangents.len() == vertex_count,
            "baked mesh returned {}/{}/{} positions/normals/tangents, expected {vertex_count}",
            self.positions.len(),
            self.normals.len(),
            self.tangents.len()
        );
        Ok(())
    }
}

/// Produces skinned vertex data for whatever pose the rig currently holds.
pub trait MeshSource {
    fn vertex_count(&self) -> usize;
    fn bake_mesh(&mut self, out: &mut MeshSnapshot);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccumulationParams {
    pub samples: u32,
    pub exposure: f32,
    pub bake_velocity: bool,
}

impl AccumulationParams {
    pub fn new(blur_samples: u32, exposure: f32, bake_velocity: bool) -> Self {
        Self { samples: blur_samples.max(1), exposure, bake_velocity }
    }

    /// Sub-sample times spread over `[t, t + exposure]`; a single sample sits at `t`.
    pub fn sample_times(&self, t: f32) -> impl Iterator<Item = f32> + '_ {
        let samples = self.samples.max(1);
        (0..samples).map(move |s| {
            if samples > 1 {
                t + (s as f32 / (samples - 1) as f32) * self.exposure
            } else {
                t
            }
        })
    }
}

/// Averages sub-frame samples per vertex and derives velocity from a look-ahead pose.
///
/// The accumulation buffers are reused frame to frame, so each call to
/// [`VertexAccumulator::bake_frame`] completes all its parallel work before returning.
pub struct VertexAccumulator {
    vertex_count: usize,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    tangents: Vec<Vec4>,
    velocities: Vec<Vec3>,
    first_positions: Vec<Vec3>,
    snapshot: MeshSnapshot,
}

impl VertexAccumulator {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            vertex_count,
            positions: vec![Vec3::ZERO; vertex_count],
            normals: vec![Vec3::ZERO; vertex_count],
            tangents: vec![Vec4::ZERO; vertex_count],
            velocities: vec![Vec3::ZERO; vertex_count],
            first_positions: vec![Vec3::ZERO; vertex_count],
            snapshot: MeshSnapshot::with_capacity(vertex_count),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Samples, accumulates and resolves one baked frame at time `t`, appending one
    /// [`BakedFrame`] per vertex to `out`.
    pub fn bake_frame<R>(
        &mut self,
        rig: &mut R,
        sampler: &mut FrameSampler,
        entry: &ClipEntry,
        t: f32,
        params: &AccumulationParams,
        out: &mut Vec<BakedFrame>,
    ) -> Result<()>
    where
        R: PoseSource + MeshSource + ?Sized,
    {
        self.reset();
        for (s, sample_time) in params.sample_times(t).enumerate() {
            sampler.sample(rig, entry, sample_time);
            self.capture(rig)?;
            self.accumulate();
            if s == 0 {
                self.first_positions.copy_from_slice(&self.snapshot.positions);
            }
        }

        if params.bake_velocity {
            sampler.sample(rig, entry, t + params.exposure);
            self.capture(rig)?;
            let next = &self.snapshot.positions;
            self.velocities
                .par_iter_mut()
                .zip(next.par_iter())
                .zip(self.first_positions.par_iter())
                .for_each(|((velocity, next), current)| *velocity = *next - *current);
        }

        self.resolve(params.samples, out);
        Ok(())
    }

    fn reset(&mut self) {
        self.positions.par_iter_mut().for_each(|p| *p = Vec3::ZERO);
        self.normals.par_iter_mut().for_each(|n| *n = Vec3::ZERO);
        self.tangents.par_iter_mut().for_each(|t| *t = Vec4::ZERO);
        self.velocities.par_iter_mut().for_each(|v| *v = Vec3::ZERO);
    }

    fn capture<R: MeshSource + ?Sized>(&mut self, rig: &mut R) -> Result<()> {
        self.snapshot.clear();
        rig.bake_mesh(&mut self.snapshot);
        self.snapshot.ensure_vertex_count(self.vertex_count)
    }

    fn accumulate(&mut self) {
        let snapshot = &self.snapshot;
        self.positions
            .par_iter_mut()
            .zip(self.normals.par_iter_mut())
            .zip(self.tangents.par_iter_mut())
            .zip(snapshot.positions.par_iter())
            .zip(snapshot.normals.par_iter())
            .zip(snapshot.tangents.par_iter())
            .for_each(|(((((pos, nrm), tan), src_pos), src_nrm), src_tan)| {
                *pos += *src_pos;
                *nrm += *src_nrm;
                *tan += *src_tan;
            });
    }

    fn resolve(&self, samples: u32, out: &mut Vec<BakedFrame>) {
        let inv_samples = 1.0 / samples.max(1) as f32;
        let start = out.len();
        out.resize(start + self.vertex_count, BakedFrame::default());
        out[start..]
            .par_iter_mut()
            .zip(self.positions.par_iter())
            .zip(self.normals.par_iter())
            .zip(self.tangents.par_iter())
            .zip(self.velocities.par_iter())
            .for_each(|((((frame, pos), nrm), tan), vel)| {
                let sign = if tan.w < 0.0 { -1.0 } else { 1.0 };
                *frame = BakedFrame {
                    position: *pos * inv_samples,
                    normal: (*nrm * inv_samples).normalize_or_zero(),
                    tangent: (tan.truncate() * inv_samples).normalize_or_zero().extend(sign),
                    velocity: *vel,
                };
            });
    }
}

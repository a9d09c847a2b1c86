use super::atlas::{ClipPlanes, TexturePlane};
use anyhow::{ensure, Result};
use glam::{EulerRot, Quat, Vec3, Vec4};
use rayon::prelude::*;

/// Averaged per-vertex state of one baked frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BakedFrame {
    pub position: Vec3,
    pub normal: Vec3,
    /// `w` carries the bitangent sign.
    pub tangent: Vec4,
    pub velocity: Vec3,
}

/// Upload layout of [`BakedFrame`] read by encode kernels. The tangent keeps its
/// handedness in `w`.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuBakedFrame {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub velocity: [f32; 3],
}

impl From<&BakedFrame> for GpuBakedFrame {
    fn from(frame: &BakedFrame) -> Self {
        Self {
            position: frame.position.to_array(),
            normal: frame.normal.to_array(),
            tangent: frame.tangent.to_array(),
            velocity: frame.velocity.to_array(),
        }
    }
}

pub fn gpu_frames(frames: &[BakedFrame]) -> Vec<GpuBakedFrame> {
    frames.par_iter().map(GpuBakedFrame::from).collect()
}

/// Rotation applied to baked data, from Euler angles in degrees (Z * Y * X).
pub fn bake_rotation(euler_degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZYX,
        euler_degrees.z.to_radians(),
        euler_degrees.y.to_radians(),
        euler_degrees.x.to_radians(),
    )
}

/// Turns one clip's baked frames into four texture planes, one row per frame.
///
/// `frames` holds `frame_count` consecutive blocks of `vertex_count` entries.
pub trait EncodeKernel {
    fn encode(&self, vertex_count: usize, frame_count: usize, frames: &[BakedFrame], rotation: Quat)
        -> Result<ClipPlanes>;
}

/// Texture width for a vertex count; the GPU path requires a power of two.
pub fn plane_width(vertex_count: usize) -> u32 {
    (vertex_count.max(1) as u32).next_power_of_two()
}

/// Host-side implementation of the encode kernel, rows processed in parallel.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuEncodeKernel;

impl EncodeKernel for CpuEncodeKernel {
    fn encode(
        &self,
        vertex_count: usize,
        frame_count: usize,
        frames: &[BakedFrame],
        rotation: Quat,
    ) -> Result<ClipPlanes> {
        ensure!(vertex_count > 0, "cannot encode a mesh without vertices");
        ensure!(
            frames.len() == vertex_count * frame_count,
            "encode buffer holds {} entries, expected {vertex_count} vertices x {frame_count} frames",
            frames.len()
        );
        let width = plane_width(vertex_count);
        let height = frame_count as u32;
        let mut planes = ClipPlanes {
            position: TexturePlane::new(width, height),
            normal: TexturePlane::new(width, height),
            tangent: TexturePlane::new(width, height),
            velocity: TexturePlane::new(width, height),
        };
        let upload = gpu_frames(frames);
        let row = width as usize;
        planes
            .position
            .texels
            .par_chunks_mut(row)
            .zip(planes.normal.texels.par_chunks_mut(row))
            .zip(planes.tangent.texels.par_chunks_mut(row))
            .zip(planes.velocity.texels.par_chunks_mut(row))
            .zip(upload.par_chunks(vertex_count))
            .for_each(|((((pos_row, nrm_row), tan_row), vel_row), source)| {
                for (x, frame) in source.iter().enumerate() {
                    let tangent = Vec4::from_array(frame.tangent);
                    pos_row[x] = (rotation * Vec3::from_array(frame.position)).extend(1.0).to_array();
                    nrm_row[x] = (rotation * Vec3::from_array(frame.normal)).extend(0.0).to_array();
                    tan_row[x] = (rotation * tangent.truncate()).extend(tangent.w).to_array();
                    vel_row[x] = (rotation * Vec3::from_array(frame.velocity)).extend(0.0).to_array();
                }
            });
        Ok(planes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_layout_packs_thirteen_floats() {
        assert_eq!(std::mem::size_of::<GpuBakedFrame>(), 13 * 4);
        let frame = BakedFrame {
            tangent: Vec4::new(1.0, 0.0, 0.0, -1.0),
            velocity: Vec3::new(0.0, 0.0, 2.0),
            ..BakedFrame::default()
        };
        let gpu = gpu_frames(&[frame]);
        let floats: &[f32] = bytemuck::cast_slice(&gpu);
        assert_eq!(floats[6..10], [1.0, 0.0, 0.0, -1.0]);
        assert_eq!(floats[10..13], [0.0, 0.0, 2.0]);
    }

    #[test]
    fn rotation_applies_yaw_in_degrees() {
        let rotation = bake_rotation(Vec3::new(0.0, 90.0, 0.0));
        let rotated = rotation * Vec3::Z;
        assert!((rotated - Vec3::X).length() < 1e-5, "got {rotated:?}");
    }

    #[test]
    fn width_rounds_to_power_of_two() {
        assert_eq!(plane_width(3), 4);
        assert_eq!(plane_width(64), 64);
        assert_eq!(plane_width(65), 128);
    }
}

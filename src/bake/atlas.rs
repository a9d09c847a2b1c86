use crate::config::TexturePrecision;
use crate::frames::FrameTiming;
use anyhow::{bail, ensure, Result};
use half::f16;

/// Power-of-two frame count covering `duration` at `frame_rate`, never below one.
pub fn frame_count_for(duration: f32, frame_rate: u32) -> u32 {
    let raw = (duration.max(0.0) * frame_rate as f32).ceil();
    let raw = if raw.is_finite() { raw as u32 } else { 1 };
    raw.max(1).next_power_of_two()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Position,
    Normal,
    Tangent,
    Velocity,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Position, Channel::Normal, Channel::Tangent, Channel::Velocity];

    pub fn suffix(self) -> &'static str {
        match self {
            Channel::Position => "Pos",
            Channel::Normal => "Nml",
            Channel::Tangent => "Tan",
            Channel::Velocity => "Vel",
        }
    }
}

/// Row-major RGBA float plane, row 0 holding the first frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TexturePlane {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl TexturePlane {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, texels: vec![[0.0; 4]; width as usize * height as usize] }
    }

    pub fn row(&self, y: u32) -> Option<&[[f32; 4]]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.width as usize;
        self.texels.get(start..start + self.width as usize)
    }

    pub fn texel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        self.row(y).and_then(|row| row.get(x as usize).copied())
    }

    /// Little-endian texel bytes in the requested storage precision.
    pub fn encode(&self, precision: TexturePrecision) -> Vec<u8> {
        let floats: &[f32] = bytemuck::cast_slice(&self.texels);
        match precision {
            TexturePrecision::Float32 => floats.iter().flat_map(|value| value.to_le_bytes()).collect(),
            TexturePrecision::Half16 => {
                floats.iter().flat_map(|value| f16::from_f32(*value).to_bits().to_le_bytes()).collect()
            }
        }
    }
}

/// The four planes produced for one clip.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipPlanes {
    pub position: TexturePlane,
    pub normal: TexturePlane,
    pub tangent: TexturePlane,
    pub velocity: TexturePlane,
}

impl ClipPlanes {
    pub fn plane(&self, channel: Channel) -> &TexturePlane {
        match channel {
            Channel::Position => &self.position,
            Channel::Normal => &self.normal,
            Channel::Tangent => &self.tangent,
            Channel::Velocity => &self.velocity,
        }
    }

    pub fn width(&self) -> u32 {
        self.position.width
    }

    pub fn frame_count(&self) -> u32 {
        self.position.height
    }
}

/// Combined per-channel planes plus the padded timing table.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameAtlas {
    pub planes: ClipPlanes,
    pub timings: Vec<FrameTiming>,
}

struct PendingClip {
    name: String,
    duration: f32,
    planes: ClipPlanes,
}

/// Stacks clips vertically, duplicating each clip's first row after its block.
#[derive(Default)]
pub struct FrameAtlasBuilder {
    clips: Vec<PendingClip>,
}

impl FrameAtlasBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn push(&mut self, name: impl Into<String>, duration: f32, planes: ClipPlanes) -> Result<()> {
        let name = name.into();
        for channel in Channel::ALL {
            let plane = planes.plane(channel);
            ensure!(
                plane.width == planes.width() && plane.height == planes.frame_count(),
                "clip '{name}' {:?} plane is {}x{}, expected {}x{}",
                channel,
                plane.width,
                plane.height,
                planes.width(),
                planes.frame_count()
            );
        }
        ensure!(planes.frame_count() > 0, "clip '{name}' has no baked frames");
        if let Some(first) = self.clips.first() {
            if first.planes.width() != planes.width() {
                bail!(
                    "clip '{name}' is {} texels wide but the atlas is {} wide; clips must share one mesh",
                    planes.width(),
                    first.planes.width()
                );
            }
        }
        self.clips.push(PendingClip { name, duration, planes });
        Ok(())
    }

    pub fn build(self) -> Result<FrameAtlas> {
        let Some(first) = self.clips.first() else {
            bail!("frame atlas needs at least one clip");
        };
        let width = first.planes.width();
        let height: u32 = self.clips.iter().map(|clip| clip.planes.frame_count() + 1).sum();

        let mut timings = Vec::with_capacity(self.clips.len());
        let mut offset = 0_u32;
        for clip in &self.clips {
            let frame_count = clip.planes.frame_count();
            timings.push(FrameTiming { name: clip.name.clone(), offset, frame_count, duration: clip.duration });
            offset += frame_count + 1;
        }

        let stack = |channel: Channel| {
            let mut texels = Vec::with_capacity(width as usize * height as usize);
            for clip in &self.clips {
                let plane = clip.planes.plane(channel);
                texels.extend_from_slice(&plane.texels);
                texels.extend_from_slice(&plane.texels[..width as usize]);
            }
            TexturePlane { width, height, texels }
        };
        let planes = ClipPlanes {
            position: stack(Channel::Position),
            normal: stack(Channel::Normal),
            tangent: stack(Channel::Tangent),
            velocity: stack(Channel::Velocity),
        };
        Ok(FrameAtlas { planes, timings })
    }
}

//! Voxel cells, materials and colors
//!
//! A [`Voxel`] is the tagged, host-side form of a grid cell. The packed
//! 64-bit form only exists at the transfer boundary to a compute backend:
//!
//! | bits  | content                               |
//! |-------|---------------------------------------|
//! | 56–63 | [`VoxelKind`] tag                     |
//! | 48–55 | mirror / reflectivity coefficient     |
//! | 32–47 | zero                                  |
//! | 0–31  | color as `0xRRGGBBAA`                 |

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

const KIND_SHIFT: u32 = 56;
const MIRROR_SHIFT: u32 = 48;
const RESERVED_MASK: u64 = 0x0000_FFFF_0000_0000;

/// How a ray interacts with a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum VoxelKind {
    /// Open space, rays pass through
    #[default]
    Empty = 0,
    /// Opaque diffuse surface
    Wall = 1,
    /// Emitter whose contribution fades with distance
    LocalLight = 2,
    /// Emitter whose contribution ignores distance
    GlobalLight = 3,
    /// Specular reflector
    Mirror = 4,
}

impl VoxelKind {
    pub const ALL: [Self; 5] = [
        Self::Empty,
        Self::Wall,
        Self::LocalLight,
        Self::GlobalLight,
        Self::Mirror,
    ];

    /// The tag stored in the top byte of a packed cell
    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Empty),
            1 => Some(Self::Wall),
            2 => Some(Self::LocalLight),
            3 => Some(Self::GlobalLight),
            4 => Some(Self::Mirror),
            _ => None,
        }
    }

    /// Whether a moving camera may occupy a cell of this kind
    pub const fn is_passable(self) -> bool {
        matches!(self, Self::Empty)
    }

    pub const fn is_light(self) -> bool {
        matches!(self, Self::LocalLight | Self::GlobalLight)
    }
}

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Self = Self::from_u32(0);
    pub const RED: Self = Self::from_u32(0xFF00_0000);
    pub const GREEN: Self = Self::from_u32(0x00FF_0000);
    pub const BLUE: Self = Self::from_u32(0x0000_FF00);
    pub const DARK_RED: Self = Self::from_u32(0x7F00_0000);
    pub const DARK_GREEN: Self = Self::from_u32(0x007F_0000);
    pub const DARK_BLUE: Self = Self::from_u32(0x0000_7F00);
    pub const WHITE: Self = Self::from_u32(0xFFFF_FF00);
    pub const GREY: Self = Self::from_u32(0x7F7F_7F00);
    pub const DARK_GREY: Self = Self::from_u32(0x3F3F_3F00);
    pub const PURPLE: Self = Self::from_u32(0xFF00_FF00);
    pub const YELLOW: Self = Self::from_u32(0xFFFF_0000);
    pub const CYAN: Self = Self::from_u32(0x00FF_FF00);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0 }
    }

    /// Decode from `0xRRGGBBAA`
    pub const fn from_u32(value: u32) -> Self {
        let [r, g, b, a] = value.to_be_bytes();
        Self { r, g, b, a }
    }

    /// Encode as `0xRRGGBBAA`
    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }

    /// Channel-wise OR, mirroring how palette constants combine
    pub const fn mix(self, other: Self) -> Self {
        Self::from_u32(self.to_u32() | other.to_u32())
    }

    pub const fn to_rgb(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// RGB channels scaled to `0.0..=1.0`
    pub fn to_linear(self) -> glam::Vec3 {
        glam::Vec3::new(self.r as f32, self.g as f32, self.b as f32) / 255.0
    }
}

/// A single grid cell
///
/// Fields are private so that the empty-cell invariant holds: an
/// [`VoxelKind::Empty`] voxel always carries a zero color and coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "VoxelSpec", into = "VoxelSpec")]
pub struct Voxel {
    kind: VoxelKind,
    mirror_coeff: u8,
    color: Rgba8,
}

impl Voxel {
    pub const EMPTY: Self = Self {
        kind: VoxelKind::Empty,
        mirror_coeff: 0,
        color: Rgba8::BLACK,
    };

    /// Create a voxel; an empty kind discards the color
    pub const fn new(kind: VoxelKind, color: Rgba8) -> Self {
        match kind {
            VoxelKind::Empty => Self::EMPTY,
            _ => Self {
                kind,
                mirror_coeff: 0,
                color,
            },
        }
    }

    pub const fn wall(color: Rgba8) -> Self {
        Self::new(VoxelKind::Wall, color)
    }

    pub const fn local_light(color: Rgba8) -> Self {
        Self::new(VoxelKind::LocalLight, color)
    }

    pub const fn global_light(color: Rgba8) -> Self {
        Self::new(VoxelKind::GlobalLight, color)
    }

    /// A mirror reflecting `coeff / 255` of incoming light
    pub const fn mirror(coeff: u8) -> Self {
        Self {
            kind: VoxelKind::Mirror,
            mirror_coeff: coeff,
            color: Rgba8::BLACK,
        }
    }

    /// Set the reflectivity coefficient (ignored for empty voxels)
    pub const fn with_mirror_coeff(self, coeff: u8) -> Self {
        match self.kind {
            VoxelKind::Empty => self,
            _ => Self {
                mirror_coeff: coeff,
                ..self
            },
        }
    }

    pub const fn kind(self) -> VoxelKind {
        self.kind
    }

    pub const fn mirror_coeff(self) -> u8 {
        self.mirror_coeff
    }

    pub const fn color(self) -> Rgba8 {
        self.color
    }

    pub const fn is_empty(self) -> bool {
        matches!(self.kind, VoxelKind::Empty)
    }

    /// Encode into the packed 64-bit cell word
    pub const fn pack(self) -> u64 {
        ((self.kind.tag() as u64) << KIND_SHIFT)
            | ((self.mirror_coeff as u64) << MIRROR_SHIFT)
            | self.color.to_u32() as u64
    }

    /// Decode a packed cell word
    pub fn unpack(word: u64) -> Result<Self> {
        let tag = (word >> KIND_SHIFT) as u8;
        let kind = VoxelKind::from_tag(tag).ok_or(Error::InvalidVoxel {
            word,
            reason: "unknown kind tag",
        })?;
        if word & RESERVED_MASK != 0 {
            return Err(Error::InvalidVoxel {
                word,
                reason: "reserved bits set",
            });
        }
        if kind == VoxelKind::Empty && word != 0 {
            return Err(Error::InvalidVoxel {
                word,
                reason: "empty cell with color or coefficient",
            });
        }

        Ok(Self {
            kind,
            mirror_coeff: (word >> MIRROR_SHIFT) as u8,
            color: Rgba8::from_u32(word as u32),
        })
    }
}

/// Serialized form of a voxel in configuration files
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct VoxelSpec {
    kind: VoxelKind,
    #[serde(default)]
    mirror_coeff: u8,
    #[serde(default)]
    color: Rgba8,
}

impl From<VoxelSpec> for Voxel {
    fn from(spec: VoxelSpec) -> Self {
        Voxel::new(spec.kind, spec.color).with_mirror_coeff(spec.mirror_coeff)
    }
}

impl From<Voxel> for VoxelSpec {
    fn from(voxel: Voxel) -> Self {
        Self {
            kind: voxel.kind,
            mirror_coeff: voxel.mirror_coeff,
            color: voxel.color,
        }
    }
}

/// One of the six axis-aligned faces of a voxel, named by its outward normal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    NegX = 0,
    PosX = 1,
    NegY = 2,
    PosY = 3,
    NegZ = 4,
    PosZ = 5,
}

impl Face {
    pub const ALL: [Self; 6] = [
        Self::NegX,
        Self::PosX,
        Self::NegY,
        Self::PosY,
        Self::NegZ,
        Self::PosZ,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        if index < 6 {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// The face on `axis` (0 = x) whose normal points in the given direction
    pub const fn from_axis(axis: usize, positive: bool) -> Self {
        Self::ALL[axis * 2 + positive as usize]
    }

    pub const fn axis(self) -> usize {
        self as usize / 2
    }

    pub const fn is_positive(self) -> bool {
        self as usize % 2 == 1
    }

    pub fn normal(self) -> glam::IVec3 {
        let mut n = glam::IVec3::ZERO;
        n[self.axis()] = if self.is_positive() { 1 } else { -1 };
        n
    }
}

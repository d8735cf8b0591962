//! Procedural scene layouts
//!
//! A scene generator is a pure function from grid dimensions to a fully
//! populated [`Grid`]. The renderer does not care how a layout was produced.

use crate::grid::{Grid, Region};
use crate::voxel::{Rgba8, Voxel};
use crate::{Error, Result};
use glam::UVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signature shared by every scene generator
pub type SceneFn = fn(UVec3) -> Result<Grid>;

/// Built-in scene layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    /// Walled room with a floor, a ledge, pillars and a light column
    #[default]
    Prison,
    /// Open floor with a bright block in the middle
    Street,
    /// Red walls on every boundary cell, empty inside
    Shell,
    /// Nothing at all
    Empty,
}

impl SceneKind {
    pub const ALL: [Self; 4] = [Self::Prison, Self::Street, Self::Shell, Self::Empty];

    pub fn generator(self) -> SceneFn {
        match self {
            Self::Prison => prison,
            Self::Street => street,
            Self::Shell => |d| shell(d, Voxel::wall(Rgba8::RED)),
            Self::Empty => Grid::new,
        }
    }

    pub fn generate(self, dimensions: UVec3) -> Result<Grid> {
        let grid = (self.generator())(dimensions)?;
        tracing::debug!("generated {} scene of size {}", self, dimensions);
        Ok(grid)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Prison => "prison",
            Self::Street => "street",
            Self::Shell => "shell",
            Self::Empty => "empty",
        }
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SceneKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "unknown scene '{s}', expected one of: prison, street, shell, empty"
                ))
            })
    }
}

/// Enclosed room open to the sky
///
/// Outer walls are red/dark-blue, the floor and a partial ledge at a third
/// of the height are grey, the two x walls are red, a white light column
/// stands in one corner and yellow pillars sit on a 4-cell lattice.
pub fn prison(d: UVec3) -> Result<Grid> {
    let mut grid = Grid::filled(d, Voxel::wall(Rgba8::DARK_BLUE.mix(Rgba8::RED)))?;
    let inner_x = d.x.saturating_sub(1);
    let inner_y = d.y.saturating_sub(1);

    grid.fill(
        Region::new(UVec3::new(1, 1, 1), UVec3::new(inner_x, inner_y, d.z)),
        Voxel::EMPTY,
    );
    grid.fill(
        Region::layer([1, 1], [inner_x, inner_y], 0),
        Voxel::wall(Rgba8::GREY),
    );
    grid.fill(
        Region::layer([1, 1], [inner_x, 10.min(d.y)], d.z / 3),
        Voxel::wall(Rgba8::GREY),
    );
    grid.fill(
        Region::new(UVec3::new(0, 1, 1), UVec3::new(1, inner_y, d.z)),
        Voxel::wall(Rgba8::RED),
    );
    if d.x > 1 {
        grid.fill(
            Region::new(UVec3::new(d.x - 1, 1, 1), UVec3::new(d.x, inner_y, d.z)),
            Voxel::wall(Rgba8::RED),
        );
    }
    if d.x > 2 && d.y > 2 {
        grid.fill(
            Region::new(
                UVec3::new(d.x - 2, d.y - 2, 1),
                UVec3::new(d.x - 1, d.y - 1, d.z),
            ),
            Voxel::local_light(Rgba8::WHITE),
        );
    }
    grid.fill(
        Region::new(UVec3::splat(3), d.saturating_sub(UVec3::splat(3))).with_step(UVec3::splat(4)),
        Voxel::wall(Rgba8::YELLOW),
    );

    Ok(grid)
}

/// Grey floor with a 10-cell white light block at the center
pub fn street(d: UVec3) -> Result<Grid> {
    let mut grid = Grid::new(d)?;
    grid.fill(
        Region::layer([1, 1], [d.x.saturating_sub(1), d.y.saturating_sub(1)], 0),
        Voxel::wall(Rgba8::GREY),
    );
    let center = d / 2;
    grid.fill(
        Region::new(center.saturating_sub(UVec3::splat(5)), center + 5),
        Voxel::local_light(Rgba8::RED.mix(Rgba8::GREEN).mix(Rgba8::BLUE)),
    );
    Ok(grid)
}

/// Every boundary cell set to `wall`, interior empty
pub fn shell(d: UVec3, wall: Voxel) -> Result<Grid> {
    Grid::from_fn(d, |index| {
        let on_boundary = index.cmpeq(UVec3::ZERO).any() || (index + 1).cmpeq(d).any();
        if on_boundary { wall } else { Voxel::EMPTY }
    })
}

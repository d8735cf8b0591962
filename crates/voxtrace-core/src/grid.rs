//! Dense voxel grid
//!
//! The grid owns the scene. Its shape is fixed at construction and every
//! mutation bumps [`Grid::revision`], which consumers holding derived copies
//! (device buffers, baked lighting) compare against to detect staleness.

use crate::voxel::{Rgba8, Voxel};
use crate::{Error, Result};
use glam::{UVec3, Vec3};

/// A box of cells with a per-axis step, used for bulk fills
///
/// Bounds are half-open and clamped to the grid when applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub min: UVec3,
    pub max: UVec3,
    pub step: UVec3,
}

impl Region {
    pub fn new(min: UVec3, max: UVec3) -> Self {
        Self {
            min,
            max,
            step: UVec3::ONE,
        }
    }

    /// Region covering only the `z` layer of `[min, max)` in x and y
    pub fn layer(min: [u32; 2], max: [u32; 2], z: u32) -> Self {
        Self::new(
            UVec3::new(min[0], min[1], z),
            UVec3::new(max[0], max[1], z + 1),
        )
    }

    pub fn with_step(mut self, step: UVec3) -> Self {
        self.step = step.max(UVec3::ONE);
        self
    }
}

/// Dense 3D array of voxels
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    dimensions: UVec3,
    cells: Vec<Voxel>,
    edit_voxel: Voxel,
    revision: u64,
}

impl Grid {
    /// Voxel written by [`Grid::build`] unless configured otherwise
    pub const DEFAULT_EDIT_VOXEL: Voxel = Voxel::wall(Rgba8::DARK_GREY);

    /// Create a grid filled with empty space
    pub fn new(dimensions: UVec3) -> Result<Self> {
        Self::filled(dimensions, Voxel::EMPTY)
    }

    /// Create a grid with every cell set to `voxel`
    pub fn filled(dimensions: UVec3, voxel: Voxel) -> Result<Self> {
        if dimensions.cmpeq(UVec3::ZERO).any() {
            return Err(Error::InvalidParameter(format!(
                "grid dimensions must be non-zero, got {dimensions}"
            )));
        }
        let len = dimensions.as_u64vec3().element_product();
        let len = usize::try_from(len)
            .map_err(|_| Error::InvalidParameter(format!("grid {dimensions} is too large")))?;

        Ok(Self {
            dimensions,
            cells: vec![voxel; len],
            edit_voxel: Self::DEFAULT_EDIT_VOXEL,
            revision: 0,
        })
    }

    /// Create a grid by evaluating `f` for every cell
    pub fn from_fn(dimensions: UVec3, mut f: impl FnMut(UVec3) -> Voxel) -> Result<Self> {
        let mut grid = Self::new(dimensions)?;
        for z in 0..dimensions.z {
            for y in 0..dimensions.y {
                for x in 0..dimensions.x {
                    let index = grid.linear_index(UVec3::new(x, y, z));
                    grid.cells[index] = f(UVec3::new(x, y, z));
                }
            }
        }
        Ok(grid)
    }

    pub fn dimensions(&self) -> UVec3 {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of mutations applied since construction
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn contains(&self, index: UVec3) -> bool {
        index.cmplt(self.dimensions).all()
    }

    /// Cell index containing a continuous position, if it is inside the grid
    pub fn cell_at(&self, position: Vec3) -> Option<UVec3> {
        if !position.is_finite() || position.cmplt(Vec3::ZERO).any() {
            return None;
        }
        let index = position.floor().as_uvec3();
        // Guard against positions that round up onto the far boundary
        (position.cmplt(self.dimensions.as_vec3()).all() && self.contains(index)).then_some(index)
    }

    /// `x + X * (y + Y * z)`
    fn linear_index(&self, index: UVec3) -> usize {
        let (dx, dy) = (self.dimensions.x as usize, self.dimensions.y as usize);
        index.x as usize + dx * (index.y as usize + dy * index.z as usize)
    }

    pub fn get(&self, index: UVec3) -> Result<Voxel> {
        if !self.contains(index) {
            return Err(Error::out_of_bounds(index.as_vec3(), self.dimensions));
        }
        Ok(self.cells[self.linear_index(index)])
    }

    pub fn set(&mut self, index: UVec3, voxel: Voxel) -> Result<()> {
        if !self.contains(index) {
            return Err(Error::out_of_bounds(index.as_vec3(), self.dimensions));
        }
        let linear = self.linear_index(index);
        self.cells[linear] = voxel;
        self.revision += 1;
        Ok(())
    }

    /// Voxel containing a continuous position, `None` outside the grid
    pub fn voxel_at(&self, position: Vec3) -> Option<Voxel> {
        self.cell_at(position)
            .map(|index| self.cells[self.linear_index(index)])
    }

    /// Fill every cell of `region` (clamped to the grid) with `voxel`
    ///
    /// Returns the number of cells written.
    pub fn fill(&mut self, region: Region, voxel: Voxel) -> usize {
        let max = region.max.min(self.dimensions);
        let step = region.step.max(UVec3::ONE);
        let mut written = 0;

        for z in (region.min.z..max.z).step_by(step.z as usize) {
            for y in (region.min.y..max.y).step_by(step.y as usize) {
                for x in (region.min.x..max.x).step_by(step.x as usize) {
                    let index = self.linear_index(UVec3::new(x, y, z));
                    self.cells[index] = voxel;
                    written += 1;
                }
            }
        }

        if written > 0 {
            self.revision += 1;
        }
        written
    }

    /// The voxel written by [`Grid::build`]
    pub fn edit_voxel(&self) -> Voxel {
        self.edit_voxel
    }

    pub fn set_edit_voxel(&mut self, voxel: Voxel) {
        self.edit_voxel = voxel;
    }

    /// Write the current edit voxel at the cell containing `position`
    ///
    /// Returns the index of the edited cell.
    pub fn build(&mut self, position: Vec3) -> Result<UVec3> {
        let index = self
            .cell_at(position)
            .ok_or_else(|| Error::out_of_bounds(position, self.dimensions))?;
        self.set(index, self.edit_voxel)?;
        tracing::info!("building at {}, {}, {}", index.x, index.y, index.z);
        Ok(index)
    }

    /// Cells in linear order
    pub fn cells(&self) -> &[Voxel] {
        &self.cells
    }

    /// Cells encoded for transfer to a compute backend
    pub fn packed(&self) -> Vec<u64> {
        self.cells.iter().map(|voxel| voxel.pack()).collect()
    }
}

//! Test volume creation helpers
//!
//! Volumes here are axis aligned box grids. Every box face is split along the
//! same diagonal from both sides, so neighboring cells share their faces
//! exactly and portal detection sees them.

use glam::Vec3;
use volnav_common::Result;

use crate::{NavWorld, RegionData, VolumeData, VolumeId};

/// Corner offsets of a unit box; bit 0 is x, bit 1 is y, bit 2 is z
const BOX_CORNERS: [[u32; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Box faces as triangle pairs over local corner indices
const BOX_TRIANGLES: [[usize; 3]; 12] = [
    // x min
    [0, 2, 6],
    [0, 6, 4],
    // x max
    [1, 3, 7],
    [1, 7, 5],
    // y min
    [0, 1, 5],
    [0, 5, 4],
    // y max
    [2, 3, 7],
    [2, 7, 6],
    // z min
    [0, 1, 3],
    [0, 3, 2],
    // z max
    [4, 5, 7],
    [4, 7, 6],
];

/// Single box volume spanning `min..max`
pub fn box_volume_data(min: Vec3, max: Vec3) -> VolumeData {
    let vertices = BOX_CORNERS
        .iter()
        .map(|c| {
            Vec3::new(
                if c[0] == 0 { min.x } else { max.x },
                if c[1] == 0 { min.y } else { max.y },
                if c[2] == 0 { min.z } else { max.z },
            )
        })
        .collect();
    let triangles = BOX_TRIANGLES
        .iter()
        .map(|t| t.map(|i| i as u32))
        .collect();

    VolumeData {
        name: "box".to_string(),
        vertices,
        regions: vec![RegionData { triangles }],
    }
}

/// `nx * ny * nz` grid of unit boxes with its minimum corner at the origin
///
/// Region `x + nx * (y + ny * z)` is the cell at `(x, y, z)`.
pub fn box_grid_volume_data(nx: u32, ny: u32, nz: u32) -> VolumeData {
    let vertex_index = |x: u32, y: u32, z: u32| x + (nx + 1) * (y + (ny + 1) * z);

    let mut vertices = Vec::new();
    for z in 0..=nz {
        for y in 0..=ny {
            for x in 0..=nx {
                vertices.push(Vec3::new(x as f32, y as f32, z as f32));
            }
        }
    }

    let mut regions = Vec::new();
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let corners =
                    BOX_CORNERS.map(|c| vertex_index(x + c[0], y + c[1], z + c[2]));
                regions.push(RegionData {
                    triangles: BOX_TRIANGLES.iter().map(|t| t.map(|i| corners[i])).collect(),
                });
            }
        }
    }

    VolumeData {
        name: format!("grid {}x{}x{}", nx, ny, nz),
        vertices,
        regions,
    }
}

/// Two unit boxes side by side along x, sharing the face at `x = 1`
pub fn two_box_volume_data() -> VolumeData {
    let mut data = box_grid_volume_data(2, 1, 1);
    data.name = "two boxes".to_string();
    data
}

/// Two unit boxes that touch nothing, the second starting at `x = 5`
pub fn disjoint_boxes_volume_data() -> VolumeData {
    let first = box_volume_data(Vec3::ZERO, Vec3::ONE);
    let second = box_volume_data(Vec3::new(5.0, 0.0, 0.0), Vec3::new(6.0, 1.0, 1.0));

    let offset = first.vertices.len() as u32;
    let mut data = first;
    data.name = "disjoint boxes".to_string();
    data.vertices.extend(second.vertices);
    data.regions.extend(second.regions.into_iter().map(|r| RegionData {
        triangles: r.triangles.iter().map(|t| t.map(|i| i + offset)).collect(),
    }));
    data
}

/// World holding only the two-box volume
pub fn two_box_world() -> Result<(NavWorld, VolumeId)> {
    let mut world = NavWorld::new();
    let volume = world.add_volume(&two_box_volume_data())?;
    Ok((world, volume))
}

/// World with two single-box volumes touching at `x = 1`, already connected
pub fn two_touching_volumes_world() -> Result<(NavWorld, VolumeId, VolumeId)> {
    let mut world = NavWorld::new();
    let a = world.add_volume(&box_volume_data(Vec3::ZERO, Vec3::ONE))?;
    let b = world.add_volume(&box_volume_data(
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(2.0, 1.0, 1.0),
    ))?;
    world.connect_volumes(a, b, 1e-3)?;
    Ok((world, a, b))
}

/// World with two unconnected boxes in one volume
pub fn disjoint_world() -> Result<(NavWorld, VolumeId)> {
    let mut world = NavWorld::new();
    let volume = world.add_volume(&disjoint_boxes_volume_data())?;
    Ok((world, volume))
}

//! Command line tool for baked navigation volumes

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use glam::Vec3;
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use volnav::{NavWorld, PathPlanner, PathRequest, PlannerConfig, VolumeData, VolumeId};

/// Distance under which faces of two loaded volumes count as shared
const CONNECT_TOLERANCE: f32 = 1e-3;

/// A CLI utility for volumetric navigation volumes
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the regions, portals and bounds of baked volumes
    Inspect {
        /// Baked volume files (JSON); repeat to load several
        #[clap(long = "volume", value_parser, required = true)]
        volumes: Vec<PathBuf>,
    },

    /// Find the nearest navigable point to a position
    Nearest {
        /// Baked volume files (JSON); repeat to load several
        #[clap(long = "volume", value_parser, required = true)]
        volumes: Vec<PathBuf>,

        /// Query position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        point: Vec3,

        /// Largest accepted distance to a region
        #[clap(long, default_value = "10.0")]
        max_distance: f32,
    },

    /// Find a path through baked volumes
    FindPath {
        /// Baked volume files (JSON); repeat to load several
        #[clap(long = "volume", value_parser, required = true)]
        volumes: Vec<PathBuf>,

        /// Start position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        start: Vec3,

        /// End position (x,y,z)
        #[clap(long, value_parser = parse_vector)]
        end: Vec3,

        /// Farthest the start or end may be snapped onto a region
        #[clap(long, default_value = "10.0")]
        max_snap_distance: f32,

        /// Largest number of regions the search may expand
        #[clap(long, default_value = "4096")]
        max_search_nodes: usize,

        /// Output path file
        #[clap(long, value_parser)]
        output: Option<PathBuf>,
    },
}

/// Parse a comma-separated vector
fn parse_vector(s: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = s.split(',').collect();

    if parts.len() != 3 {
        return Err(format!(
            "Vector must have 3 components, got {}",
            parts.len()
        ));
    }

    let x = parts[0].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let y = parts[1].trim().parse::<f32>().map_err(|e| e.to_string())?;
    let z = parts[2].trim().parse::<f32>().map_err(|e| e.to_string())?;

    Ok(Vec3::new(x, y, z))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Commands::Inspect { volumes } => {
            let (world, ids) = load_world(&volumes)?;
            inspect(&world, &ids)
        }
        Commands::Nearest {
            volumes,
            point,
            max_distance,
        } => {
            let (world, _) = load_world(&volumes)?;
            nearest(&world, point, max_distance)
        }
        Commands::FindPath {
            volumes,
            start,
            end,
            max_snap_distance,
            max_search_nodes,
            output,
        } => {
            let (world, _) = load_world(&volumes)?;
            let config = PlannerConfig::new(max_search_nodes, max_snap_distance);
            config
                .validate()
                .map_err(|e| anyhow!("Invalid planner settings: {}", e))?;
            find_path(&world, config, start, end, output.as_deref())
        }
    }
}

/// Load a baked volume description from a JSON file
fn load_volume_data(path: &Path) -> Result<VolumeData> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open volume file: {}", path.display()))?;
    let mut data: VolumeData = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse volume file: {}", path.display()))?;

    if data.name.is_empty() {
        data.name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("volume")
            .to_string();
    }
    Ok(data)
}

/// Load every volume into one world and join volumes whose boundaries touch
fn load_world(paths: &[PathBuf]) -> Result<(NavWorld, Vec<VolumeId>)> {
    let mut world = NavWorld::new();
    let mut ids = Vec::with_capacity(paths.len());

    for path in paths {
        let data = load_volume_data(path)?;
        let id = world
            .add_volume(&data)
            .map_err(|e| anyhow!("Failed to build volume {}: {}", path.display(), e))?;
        info!("Loaded volume '{}' from {}", data.name, path.display());
        ids.push(id);
    }

    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            let added = world
                .connect_volumes(*a, *b, CONNECT_TOLERANCE)
                .map_err(|e| anyhow!("Failed to connect volumes: {}", e))?;
            if added > 0 {
                debug!("Connected volumes {:?} and {:?} with {} portals", a, b, added);
            }
        }
    }

    Ok((world, ids))
}

fn inspect(world: &NavWorld, ids: &[VolumeId]) -> Result<()> {
    for id in ids {
        let volume = world
            .volume(*id)
            .ok_or_else(|| anyhow!("Volume {:?} disappeared from the world", id))?;
        let bounds = volume.bounds();

        println!("Volume '{}'", volume.name());
        println!("  vertices: {}", volume.vertices().len());
        println!("  regions:  {}", volume.regions().len());
        println!("  portals:  {}", volume.portals().len());
        println!(
            "  bounds:   {},{},{} .. {},{},{}",
            bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
        );

        let graph = volume.region_adjacency();
        for region in volume.regions() {
            let centroid = region.centroid();
            let neighbors: Vec<String> = graph
                .neighbors(region.index())
                .iter()
                .map(|link| link.neighbor.to_string())
                .collect();
            println!(
                "  region {}: {} faces, centroid {},{},{}, neighbors [{}]",
                region.index(),
                region.triangles().len(),
                centroid.x,
                centroid.y,
                centroid.z,
                neighbors.join(", ")
            );
        }
    }

    println!("External portals: {}", world.external_portal_count());
    Ok(())
}

fn nearest(world: &NavWorld, point: Vec3, max_distance: f32) -> Result<()> {
    let hit = world.nearest_point(point, max_distance);
    if !hit.is_valid() {
        bail!(
            "No navigable point within {} of {},{},{}",
            max_distance,
            point.x,
            point.y,
            point.z
        );
    }

    let name = hit
        .volume
        .and_then(|id| world.volume(id))
        .map(|volume| volume.name().to_string())
        .unwrap_or_default();
    println!(
        "{},{},{} (volume '{}', region {}, {})",
        hit.position.x,
        hit.position.y,
        hit.position.z,
        name,
        hit.region,
        if hit.on_edge { "on boundary" } else { "inside" }
    );
    Ok(())
}

/// Find a path through the loaded volumes
fn find_path(
    world: &NavWorld,
    config: PlannerConfig,
    start: Vec3,
    end: Vec3,
    output: Option<&Path>,
) -> Result<()> {
    info!("Finding path from {:?} to {:?}", start, end);

    let mut planner = PathPlanner::new(world, config);
    let path = planner
        .find_path(&PathRequest::new(start, end))
        .map_err(|e| anyhow!("Failed to find path: {}", e))?;

    info!(
        "Found path through {} regions ({} expanded), length {:.3}",
        path.regions().len(),
        planner.last_expanded(),
        path.length()
    );

    if let Some(output_path) = output {
        info!("Saving path to {}", output_path.display());

        let mut file = File::create(output_path)
            .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;

        writeln!(file, "# Path from {:?} to {:?}", start, end)?;
        writeln!(file, "# {} waypoints", path.waypoints().len())?;

        for waypoint in path.waypoints() {
            writeln!(file, "{},{},{}", waypoint.x, waypoint.y, waypoint.z)?;
        }
    } else {
        println!("Path:");
        for (i, waypoint) in path.waypoints().iter().enumerate() {
            println!("{}: {},{},{}", i, waypoint.x, waypoint.y, waypoint.z);
        }
    }

    Ok(())
}

//! Concurrency safety tests
//!
//! Queries only read the world, so a world shared through an `Arc` can serve
//! planners on several threads at once and every thread sees the same answers.

use std::sync::Arc;
use std::thread;

use glam::Vec3;
use volnav_common::Result;

use crate::test_volume_helpers::*;
use crate::{NavWorld, PathPlanner, PathRequest, PlannerConfig};

fn shared_grid_world() -> Result<Arc<NavWorld>> {
    let mut world = NavWorld::new();
    world.add_volume(&box_grid_volume_data(5, 5, 2))?;
    Ok(Arc::new(world))
}

fn request_for(i: usize) -> PathRequest {
    let t = i as f32 * 0.37;
    PathRequest::new(
        Vec3::new(0.5 + t % 4.0, 0.5, 0.5),
        Vec3::new(4.5, 0.5 + (t * 1.7) % 4.0, 1.5),
    )
}

#[test]
fn test_concurrent_find_path() -> Result<()> {
    let world = shared_grid_world()?;
    let num_threads = 4;
    let requests_per_thread = 25;

    let mut reference = Vec::new();
    let mut planner = PathPlanner::new(&world, PlannerConfig::default());
    for i in 0..requests_per_thread {
        reference.push(planner.find_path(&request_for(i))?);
    }
    let reference = Arc::new(reference);

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let world = Arc::clone(&world);
            let reference = Arc::clone(&reference);
            thread::spawn(move || -> Result<()> {
                let mut planner = PathPlanner::new(&world, PlannerConfig::default());
                for i in 0..requests_per_thread {
                    let path = planner.find_path(&request_for(i))?;
                    assert_eq!(path, reference[i], "request {} differs across threads", i);
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .expect("Thread panicked")
            .expect("Thread operation failed");
    }
    Ok(())
}

#[test]
fn test_concurrent_nearest_point() -> Result<()> {
    let world = shared_grid_world()?;

    let handles: Vec<_> = (0..8)
        .map(|thread_id| {
            let world = Arc::clone(&world);
            thread::spawn(move || {
                for i in 0..100 {
                    let p = Vec3::new(
                        -1.0 + (thread_id as f32 * 0.9 + i as f32 * 0.13) % 7.0,
                        2.5,
                        3.0,
                    );
                    let hit = world.nearest_point(p, 5.0);
                    assert!(hit.is_valid());
                    assert!(hit.on_edge);
                    // Always lands on the top of the grid
                    assert!((hit.position.z - 2.0).abs() < 1e-5);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    Ok(())
}

use super::world::{Building, PixelRect, TileGrid, Vec2};

/// Decides whether an agent body centered at `position` with the given square
/// half-extent may occupy that spot. Pure function of its inputs; callers
/// gate every proposed move through it before committing.
///
/// A probe point passes when it falls inside any walkable override rect, or
/// inside a building footprint (buildings are walkable plazas, not
/// obstacles), or on a non-wall tile. Positions outside the grid fail closed.
pub fn is_walkable(
    position: Vec2,
    half_extent: f32,
    grid: &TileGrid,
    overrides: &[PixelRect],
    buildings: &[Building],
) -> bool {
    let half = half_extent.max(0.0);
    let corners = [
        Vec2 {
            x: position.x - half,
            y: position.y - half,
        },
        Vec2 {
            x: position.x + half,
            y: position.y - half,
        },
        Vec2 {
            x: position.x - half,
            y: position.y + half,
        },
        Vec2 {
            x: position.x + half,
            y: position.y + half,
        },
    ];

    corners
        .iter()
        .all(|corner| point_walkable(*corner, grid, overrides, buildings))
}

fn point_walkable(
    point: Vec2,
    grid: &TileGrid,
    overrides: &[PixelRect],
    buildings: &[Building],
) -> bool {
    if overrides.iter().any(|rect| rect.contains_point(point)) {
        return true;
    }
    if buildings
        .iter()
        .filter_map(Building::footprint_px)
        .any(|footprint| footprint.contains_point(point))
    {
        return true;
    }

    match grid.cell_at_point(point) {
        Some(cell) => grid
            .tile_at(cell.x, cell.y)
            .is_some_and(|tile| !tile.is_wall()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::world::{TileCoord, TileKind, TILE_SIZE_PX};

    fn walled_grid(width: u32, height: u32, walls: &[(u32, u32)]) -> TileGrid {
        let mut tiles = vec![TileKind::Empty; (width * height) as usize];
        for (x, y) in walls {
            tiles[(y * width + x) as usize] = TileKind::Wall;
        }
        TileGrid::new(width, height, tiles).expect("grid")
    }

    fn tile_center(x: u32, y: u32) -> Vec2 {
        Vec2 {
            x: (x as f32 + 0.5) * TILE_SIZE_PX,
            y: (y as f32 + 0.5) * TILE_SIZE_PX,
        }
    }

    fn plaza_building(cells: Vec<TileCoord>) -> Building {
        Building {
            id: "plaza".to_string(),
            label: "Plaza".to_string(),
            route: "/plaza".to_string(),
            cells,
            fill: [90, 90, 90, 255],
            fill_dark: None,
            image_key: None,
            auto_navigate: false,
            banner: None,
        }
    }

    #[test]
    fn open_tile_is_walkable() {
        let grid = walled_grid(4, 4, &[]);
        assert!(is_walkable(tile_center(1, 1), 4.0, &grid, &[], &[]));
    }

    #[test]
    fn wall_tile_blocks() {
        let grid = walled_grid(4, 4, &[(1, 1)]);
        assert!(!is_walkable(tile_center(1, 1), 4.0, &grid, &[], &[]));
    }

    #[test]
    fn probe_corner_touching_wall_blocks() {
        let grid = walled_grid(4, 4, &[(2, 1)]);
        // Center sits on an open tile but the probe's right edge crosses in.
        let near_edge = Vec2 {
            x: 2.0 * TILE_SIZE_PX - 2.0,
            y: 1.5 * TILE_SIZE_PX,
        };
        assert!(!is_walkable(near_edge, 4.0, &grid, &[], &[]));
        assert!(is_walkable(near_edge, 1.0, &grid, &[], &[]));
    }

    #[test]
    fn out_of_bounds_fails_closed() {
        let grid = walled_grid(4, 4, &[]);
        let outside = Vec2 { x: -1.0, y: 16.0 };
        assert!(!is_walkable(outside, 0.0, &grid, &[], &[]));
        // A probe straddling the boundary fails too.
        assert!(!is_walkable(Vec2 { x: 1.0, y: 16.0 }, 4.0, &grid, &[], &[]));
    }

    #[test]
    fn override_rect_punches_hole_in_wall_rule() {
        let grid = walled_grid(4, 4, &[(1, 1)]);
        let hole = PixelRect {
            x1: TILE_SIZE_PX,
            y1: TILE_SIZE_PX,
            x2: 2.0 * TILE_SIZE_PX,
            y2: 2.0 * TILE_SIZE_PX,
        };
        assert!(is_walkable(tile_center(1, 1), 4.0, &grid, &[hole], &[]));
    }

    #[test]
    fn override_rect_works_with_reversed_corners() {
        let grid = walled_grid(4, 4, &[(1, 1)]);
        let hole = PixelRect {
            x1: 2.0 * TILE_SIZE_PX,
            y1: 2.0 * TILE_SIZE_PX,
            x2: TILE_SIZE_PX,
            y2: TILE_SIZE_PX,
        };
        assert!(is_walkable(tile_center(1, 1), 4.0, &grid, &[hole], &[]));
    }

    #[test]
    fn building_footprint_is_walkable_ground() {
        let grid = walled_grid(6, 6, &[(2, 2), (3, 2)]);
        let building = plaza_building(vec![TileCoord { x: 2, y: 2 }, TileCoord { x: 3, y: 2 }]);
        assert!(is_walkable(
            tile_center(2, 2),
            4.0,
            &grid,
            &[],
            std::slice::from_ref(&building)
        ));
    }

    #[test]
    fn empty_building_footprint_never_helps() {
        let grid = walled_grid(4, 4, &[(1, 1)]);
        let building = plaza_building(Vec::new());
        assert!(!is_walkable(
            tile_center(1, 1),
            4.0,
            &grid,
            &[],
            std::slice::from_ref(&building)
        ));
    }

    #[test]
    fn oracle_has_no_side_effects_on_inputs() {
        let grid = walled_grid(4, 4, &[(0, 0)]);
        let before = grid.clone();
        let _ = is_walkable(tile_center(0, 0), 4.0, &grid, &[], &[]);
        assert_eq!(grid, before);
    }
}

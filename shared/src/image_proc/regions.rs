//! Connected-region extraction from binary masks.
//!
//! Labels 8-connected foreground regions and traces each region's outer
//! boundary with Moore-neighbor tracing, accumulating a chain-code perimeter
//! (1 per axial step, sqrt(2) per diagonal step). The chain length tracks the
//! smooth outline of a digitized disk closely, which is what makes the
//! isoperimetric circularity filter downstream meaningful.

use ndarray::{Array2, ArrayView2};

/// One 8-connected foreground region.
#[derive(Debug, Clone)]
pub struct Region {
    /// Pixel count.
    pub area: usize,
    /// Chain-code length of the outer boundary; 0.0 for regions too small to
    /// trace (a single pixel has no boundary chain).
    pub perimeter: f64,
    /// Inclusive bounding box (min_x, min_y, max_x, max_y).
    pub bbox: (usize, usize, usize, usize),
    /// Member pixels as (x, y).
    pub pixels: Vec<(usize, usize)>,
}

/// Moore neighborhood in clockwise order starting from west: W, NW, N, NE, E,
/// SE, S, SW. Offsets are (dx, dy) with y growing downward.
const MOORE: [(i64, i64); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

fn is_set(mask: ArrayView2<'_, bool>, x: i64, y: i64) -> bool {
    let (rows, cols) = mask.dim();
    x >= 0 && y >= 0 && (x as usize) < cols && (y as usize) < rows && mask[[y as usize, x as usize]]
}

/// Trace the outer boundary of the region containing `start` and return the
/// chain length. `start` must be the region's first pixel in row-major scan
/// order, so its west and north neighbors are background.
fn trace_perimeter(mask: ArrayView2<'_, bool>, start: (usize, usize)) -> f64 {
    let start = (start.0 as i64, start.1 as i64);

    // Clockwise scan of the start neighborhood beginning from the west
    // backtrack pixel.
    let first_move = (0..8).find(|&i| {
        let (dx, dy) = MOORE[i];
        is_set(mask, start.0 + dx, start.1 + dy)
    });
    let Some(first_move) = first_move else {
        return 0.0; // isolated pixel
    };

    let step_len = |dir: usize| -> f64 {
        let (dx, dy) = MOORE[dir];
        if dx != 0 && dy != 0 {
            std::f64::consts::SQRT_2
        } else {
            1.0
        }
    };

    let mut perimeter = step_len(first_move);
    let mut current = (
        start.0 + MOORE[first_move].0,
        start.1 + MOORE[first_move].1,
    );
    // Next search begins just past the direction we came from.
    let mut backtrack_dir = (first_move + 5) % 8;

    // The trace closes when it steps back onto the start pixel. Regions that
    // pinch through their own scan-order first pixel get a truncated chain,
    // inflating the circularity error exactly for shapes the blob filter is
    // meant to reject. The bound guards against pathological masks.
    let max_steps = 4 * mask.len() + 8;
    for _ in 0..max_steps {
        let mut moved = false;
        for offset in 0..8 {
            let dir = (backtrack_dir + offset) % 8;
            let (dx, dy) = MOORE[dir];
            let next = (current.0 + dx, current.1 + dy);
            if is_set(mask, next.0, next.1) {
                perimeter += step_len(dir);
                current = next;
                backtrack_dir = (dir + 5) % 8;
                moved = true;
                break;
            }
        }
        if !moved || current == start {
            break;
        }
    }
    perimeter
}

/// Extract all 8-connected foreground regions of `mask`.
pub fn find_regions(mask: ArrayView2<'_, bool>) -> Vec<Region> {
    let (rows, cols) = mask.dim();
    let mut visited = Array2::<bool>::from_elem((rows, cols), false);
    let mut regions = Vec::new();

    for row in 0..rows {
        for col in 0..cols {
            if !mask[[row, col]] || visited[[row, col]] {
                continue;
            }

            // Flood fill from the scan-order first pixel of this region.
            let start = (col, row);
            let mut pixels = Vec::new();
            let mut stack = vec![start];
            visited[[row, col]] = true;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (col, row, col, row);

            while let Some((x, y)) = stack.pop() {
                pixels.push((x, y));
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                for (dx, dy) in MOORE {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if is_set(mask, nx, ny) && !visited[[ny as usize, nx as usize]] {
                        visited[[ny as usize, nx as usize]] = true;
                        stack.push((nx as usize, ny as usize));
                    }
                }
            }

            let perimeter = trace_perimeter(mask, start);
            regions.push(Region {
                area: pixels.len(),
                perimeter,
                bbox: (min_x, min_y, max_x, max_y),
                pixels,
            });
        }
    }
    regions
}

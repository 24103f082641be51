//! Cell-by-cell raster algebra.
//!
//! Results take the placement of the first operand; the second operand is
//! sampled at its cell centers.

use crate::Grid;

/// `a - b`, no data where either operand has none.
pub fn minus(a: &Grid, b: &Grid) -> Grid {
    let mut out = a.like(f32::NAN).with_no_data(None);
    let (width, height) = a.dimensions();
    for row in 0..height {
        for col in 0..width {
            let (x, y) = a.cell_center(col, row);
            let value = match (a.get(col, row), b.sample(x, y)) {
                (Some(va), Some(vb)) => Some(va - vb),
                _ => None,
            };
            out.set(col, row, value);
        }
    }
    out
}

/// Copy of `grid` with every cell `<= threshold` set to no data.
pub fn set_null_at_or_below(grid: &Grid, threshold: f32) -> Grid {
    let mut out = grid.like(f32::NAN).with_no_data(None);
    let (width, height) = grid.dimensions();
    for row in 0..height {
        for col in 0..width {
            let value = grid.get(col, row).filter(|v| *v > threshold);
            out.set(col, row, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GridTransform;

    #[test]
    fn test_minus_then_null() {
        let t = GridTransform::new(0.0, 1.0, 1.0);
        let surface = Grid::from_vec(vec![5.0, 5.0, 5.0, f32::NAN], 4, 1, t).unwrap();
        let dem = Grid::from_vec(vec![2.0, 5.0, 7.0, 1.0], 4, 1, t).unwrap();

        let diff = minus(&surface, &dem);
        assert_eq!(diff.get(0, 0), Some(3.0));
        assert_eq!(diff.get(1, 0), Some(0.0));
        assert_eq!(diff.get(2, 0), Some(-2.0));
        assert_eq!(diff.get(3, 0), None);

        let depth = set_null_at_or_below(&diff, 0.0);
        assert_eq!(depth.get(0, 0), Some(3.0));
        assert_eq!(depth.get(1, 0), None);
        assert_eq!(depth.get(2, 0), None);
        assert_eq!(depth.minimum(), Some(3.0));
    }
}

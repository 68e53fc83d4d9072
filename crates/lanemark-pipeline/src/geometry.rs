//! Geometry utilities: polynomial fitting and evaluation, mirroring,
//! polygon normalisation and bounds filtering.
//!
//! Lane boundaries are closer to vertical than horizontal in image space,
//! so curves are modelled as `x = f(y)` with `y` as the independent
//! variable throughout.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::types::Point;

/// Singular values below this (relative) threshold are treated as zero
/// when solving a least-squares fit.
const FIT_EPSILON: f64 = 1e-12;

/// A polynomial with coefficients stored in ascending powers:
/// `c[0] + c[1]·y + c[2]·y² + …`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    /// Create a polynomial from ascending-power coefficients.
    #[must_use]
    pub const fn new(coefficients: Vec<f64>) -> Self {
        Self { coefficients }
    }

    /// Coefficients in ascending powers.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Evaluate at `y` (Horner's scheme).
    #[must_use]
    pub fn eval(&self, y: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc.mul_add(y, c))
    }

    /// Least-squares fit of `x = f(y)` of the given degree.
    ///
    /// Rank-deficient inputs (fewer distinct `y` values than
    /// coefficients) produce the minimum-norm solution rather than an
    /// error. Returns `None` for empty input or when the solver fails.
    #[must_use]
    pub fn fit(points: &[Point], degree: usize) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let terms = degree + 1;
        let design = DMatrix::from_fn(points.len(), terms, |row, col| {
            let y = f64::from(points[row].y);
            (0..col).fold(1.0, |acc, _| acc * y)
        });
        let target = DVector::from_iterator(points.len(), points.iter().map(|p| f64::from(p.x)));

        let svd = design.svd(true, true);
        let max_singular = svd.singular_values.max();
        let solution = svd.solve(&target, max_singular * FIT_EPSILON).ok()?;

        let coefficients: Vec<f64> = solution.iter().copied().collect();
        coefficients
            .iter()
            .all(|c| c.is_finite())
            .then_some(Self::new(coefficients))
    }

    /// Pointwise mean of two polynomials (coefficient-wise average).
    #[must_use]
    pub fn average(a: &Self, b: &Self) -> Self {
        let len = a.coefficients.len().max(b.coefficients.len());
        let coefficients = (0..len)
            .map(|i| {
                let ca = a.coefficients.get(i).copied().unwrap_or(0.0);
                let cb = b.coefficients.get(i).copied().unwrap_or(0.0);
                f64::midpoint(ca, cb)
            })
            .collect();
        Self::new(coefficients)
    }

    /// Mirror the curve about the vertical line `x = k`.
    ///
    /// Produces `g(y) = 2k - f(y)`: every coefficient is negated and the
    /// constant term is shifted by `2k`. Available for estimating a
    /// centerline from a single lane boundary.
    #[must_use]
    pub fn mirror_around(&self, k: f64) -> Self {
        let mut coefficients: Vec<f64> = self.coefficients.iter().map(|c| -c).collect();
        match coefficients.first_mut() {
            Some(constant) => *constant += 2.0 * k,
            None => coefficients.push(2.0 * k),
        }
        Self::new(coefficients)
    }
}

/// Returns `true` if `x` lies in `[0, width]` and `y` in `[min_y, max_y]`.
#[must_use]
pub fn within_bounds(x: f64, y: f64, width: f64, min_y: f64, max_y: f64) -> bool {
    (0.0..=width).contains(&x) && (min_y..=max_y).contains(&y)
}

/// Normalise polygon vertices for rasterisation.
///
/// Drops consecutive duplicates and a closing vertex that repeats the
/// first one. The result has either zero or at least three vertices;
/// anything with fewer than three distinct vertices encloses no area.
#[must_use]
pub fn polygon_vertices(points: &[Point]) -> Vec<Point> {
    let mut vertices: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if vertices.last() != Some(&p) {
            vertices.push(p);
        }
    }
    while vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    if vertices.len() < 3 {
        vertices.clear();
    }
    vertices
}

/// Area enclosed by a closed polygon (shoelace, via `geo`).
#[must_use]
pub fn polygon_area(points: &[Point]) -> f64 {
    use geo::Area;

    if points.len() < 3 {
        return 0.0;
    }
    let ring: Vec<geo::Coord<f64>> = points
        .iter()
        .map(|p| geo::Coord {
            x: f64::from(p.x),
            y: f64::from(p.y),
        })
        .collect();
    geo::Polygon::new(geo::LineString::from(ring), Vec::new()).unsigned_area()
}

/// Clip a polygon to the window `[-1, width] × [-1, height]`.
///
/// Sutherland-Hodgman in `f64`, so vertices anywhere in the `i32` range
/// intersect exactly and the result is safe to rasterise. The window
/// sits one pixel outside the frame: edges introduced by the clip never
/// cover a pixel the original polygon did not. Empty when nothing of the
/// polygon reaches the window.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn clip_polygon(points: &[Point], width: u32, height: u32) -> Vec<Point> {
    let mut ring: Vec<[f64; 2]> = points
        .iter()
        .map(|p| [f64::from(p.x), f64::from(p.y)])
        .collect();
    let half_planes = [
        (0, -1.0, true),
        (0, f64::from(width), false),
        (1, -1.0, true),
        (1, f64::from(height), false),
    ];
    for (axis, bound, lower) in half_planes {
        ring = clip_half_plane(&ring, axis, bound, lower);
    }
    ring.into_iter()
        .map(|[x, y]| Point::new(x.round() as i32, y.round() as i32))
        .collect()
}

/// Keep the part of `ring` with `p[axis] >= bound` (`lower`) or
/// `p[axis] <= bound`.
fn clip_half_plane(ring: &[[f64; 2]], axis: usize, bound: f64, lower: bool) -> Vec<[f64; 2]> {
    let inside = |p: &[f64; 2]| if lower { p[axis] >= bound } else { p[axis] <= bound };
    let mut out = Vec::with_capacity(ring.len() + 1);
    let Some(&last) = ring.last() else {
        return out;
    };
    let mut prev = last;
    for &curr in ring {
        match (inside(&prev), inside(&curr)) {
            (true, true) => out.push(curr),
            (true, false) => out.push(crossing(prev, curr, axis, bound)),
            (false, true) => {
                out.push(crossing(prev, curr, axis, bound));
                out.push(curr);
            }
            (false, false) => {}
        }
        prev = curr;
    }
    out
}

/// Point where segment `a`-`b` meets the line `p[axis] == bound`.
fn crossing(a: [f64; 2], b: [f64; 2], axis: usize, bound: f64) -> [f64; 2] {
    let t = (bound - a[axis]) / (b[axis] - a[axis]);
    let mut p = [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1])];
    p[axis] = bound;
    p
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn eval_ascending_coefficients() {
        // 1 + 2y + 3y^2 at y = 2 -> 1 + 4 + 12
        let p = Polynomial::new(vec![1.0, 2.0, 3.0]);
        assert!(approx(p.eval(2.0), 17.0));
    }

    #[test]
    fn empty_polynomial_evaluates_to_zero() {
        assert!(approx(Polynomial::new(vec![]).eval(5.0), 0.0));
    }

    #[test]
    fn fit_recovers_exact_quadratic() {
        // x = 10 + 0.5y + 0.01y^2
        let points: Vec<Point> = (0..50)
            .map(|y| {
                let yf = f64::from(y);
                #[allow(clippy::cast_possible_truncation)]
                let x = 0.01f64.mul_add(yf * yf, 0.5f64.mul_add(yf, 10.0)).round() as i32;
                Point::new(x, y)
            })
            .collect();
        let p = Polynomial::fit(&points, 2).unwrap();
        for y in [0.0, 10.0, 25.0, 49.0] {
            let expected = 0.01f64.mul_add(y * y, 0.5f64.mul_add(y, 10.0));
            assert!((p.eval(y) - expected).abs() < 0.6, "y={y}");
        }
    }

    #[test]
    fn fit_vertical_line() {
        let points: Vec<Point> = (0..20).map(|y| Point::new(42, y)).collect();
        let p = Polynomial::fit(&points, 2).unwrap();
        for y in 0..20 {
            assert!((p.eval(f64::from(y)) - 42.0).abs() < 1e-6);
        }
    }

    #[test]
    fn fit_rank_deficient_input_still_fits_points() {
        // Only one distinct y: any solution must still pass through x = 7.
        let points = vec![Point::new(7, 3), Point::new(7, 3), Point::new(7, 3)];
        let p = Polynomial::fit(&points, 2).unwrap();
        assert!((p.eval(3.0) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn fit_empty_is_none() {
        assert!(Polynomial::fit(&[], 2).is_none());
    }

    #[test]
    fn average_is_pointwise_mean() {
        let a = Polynomial::new(vec![0.0, 1.0, 0.002]);
        let b = Polynomial::new(vec![100.0, -1.0]);
        let avg = Polynomial::average(&a, &b);
        for y in [0.0, 3.0, 100.0] {
            assert!(approx(avg.eval(y), f64::midpoint(a.eval(y), b.eval(y))));
        }
    }

    #[test]
    fn mirror_reflects_about_vertical_line() {
        let f = Polynomial::new(vec![30.0, 0.2, 0.001]);
        let k = 50.0;
        let g = f.mirror_around(k);
        for y in [0.0, 10.0, 200.0] {
            assert!(approx(g.eval(y), 2.0f64.mul_add(k, -f.eval(y))));
        }
        // Mirroring twice is the identity.
        assert_eq!(g.mirror_around(k), f);
    }

    #[test]
    fn bounds_are_closed() {
        assert!(within_bounds(0.0, 5.0, 10.0, 5.0, 20.0));
        assert!(within_bounds(10.0, 20.0, 10.0, 5.0, 20.0));
        assert!(!within_bounds(-0.1, 6.0, 10.0, 5.0, 20.0));
        assert!(!within_bounds(3.0, 4.0, 10.0, 5.0, 20.0));
    }

    #[test]
    fn polygon_vertices_drops_closing_and_repeated_points() {
        let pts = vec![
            Point::new(0, 0),
            Point::new(4, 0),
            Point::new(4, 0),
            Point::new(4, 4),
            Point::new(0, 0),
        ];
        assert_eq!(
            polygon_vertices(&pts),
            vec![Point::new(0, 0), Point::new(4, 0), Point::new(4, 4)]
        );
    }

    #[test]
    fn polygon_vertices_rejects_degenerate() {
        assert!(polygon_vertices(&[Point::new(1, 1), Point::new(1, 1)]).is_empty());
        assert!(polygon_vertices(&[Point::new(1, 1), Point::new(5, 5)]).is_empty());
    }

    #[test]
    fn square_area() {
        let square = [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert!(approx(polygon_area(&square), 100.0));
    }

    #[test]
    fn clip_keeps_polygon_inside_window() {
        let square = vec![
            Point::new(10, 10),
            Point::new(20, 10),
            Point::new(20, 20),
            Point::new(10, 20),
        ];
        let clipped = clip_polygon(&square, 100, 80);
        assert_eq!(clipped.len(), 4);
        for p in &square {
            assert!(clipped.contains(p));
        }
    }

    #[test]
    fn clip_cuts_at_one_pixel_outside_frame() {
        let square = vec![
            Point::new(-50, -50),
            Point::new(50, -50),
            Point::new(50, 50),
            Point::new(-50, 50),
        ];
        let clipped = clip_polygon(&square, 30, 20);
        assert!(approx(polygon_area(&clipped), 31.0 * 21.0));
        assert!(clipped.iter().all(|p| (-1..=30).contains(&p.x) && (-1..=20).contains(&p.y)));
    }

    #[test]
    fn clip_handles_extreme_coordinates() {
        let triangle = vec![
            Point::new(i32::MIN, 0),
            Point::new(i32::MAX, 0),
            Point::new(0, 50),
        ];
        let clipped = clip_polygon(&triangle, 100, 80);
        assert!(clipped.iter().all(|p| (-1..=100).contains(&p.x) && (-1..=80).contains(&p.y)));
        assert!(clipped.contains(&Point::new(0, 50)));
        assert!(polygon_area(&clipped) > 100.0 * 49.0);
    }

    #[test]
    fn clip_outside_window_is_empty() {
        let square = vec![
            Point::new(200, 200),
            Point::new(220, 200),
            Point::new(220, 220),
        ];
        assert!(clip_polygon(&square, 100, 80).is_empty());
        assert!(clip_polygon(&[], 100, 80).is_empty());
    }
}

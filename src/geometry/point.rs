//! Points, polygon area, convex hulls, and minimum-area rectangles.

use imageproc::point::Point as ImageProcPoint;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use std::f32::consts::PI;

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X-coordinate of the point.
    pub x: f32,
    /// Y-coordinate of the point.
    pub y: f32,
}

impl Point {
    /// Creates a new point with the given coordinates.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Creates a point from an imageproc point with integer coordinates.
    pub fn from_imageproc_point(p: ImageProcPoint<i32>) -> Self {
        Self {
            x: p.x as f32,
            y: p.y as f32,
        }
    }
}

/// Calculates the area enclosed by a polygon using the shoelace formula.
///
/// Returns 0.0 for polygons with fewer than 3 vertices.
pub fn polygon_area(points: &[Point]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }

    let mut area = 0.0;
    let n = points.len();
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y;
        area -= points[j].x * points[i].y;
    }
    area.abs() / 2.0
}

/// Computes the cross product of three points.
///
/// Positive for a counter-clockwise turn, negative for clockwise, zero for
/// collinear points.
fn cross_product(p1: &Point, p2: &Point, p3: &Point) -> f32 {
    (p2.x - p1.x) * (p3.y - p1.y) - (p2.y - p1.y) * (p3.x - p1.x)
}

/// Computes the convex hull of a point set using Graham's scan.
///
/// Point sets with fewer than 3 points are returned unchanged.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut points = points.to_vec();

    // Start from the lowest point (leftmost on ties).
    let mut start_idx = 0;
    for i in 1..points.len() {
        if points[i].y < points[start_idx].y
            || (points[i].y == points[start_idx].y && points[i].x < points[start_idx].x)
        {
            start_idx = i;
        }
    }
    points.swap(0, start_idx);
    let start_point = points[0];

    // Sort the remainder by polar angle around the start point.
    points[1..].sort_by(|a, b| {
        let cross = cross_product(&start_point, a, b);
        if cross == 0.0 {
            let dist_a = (a.x - start_point.x).powi(2) + (a.y - start_point.y).powi(2);
            let dist_b = (b.x - start_point.x).powi(2) + (b.y - start_point.y).powi(2);
            dist_a
                .partial_cmp(&dist_b)
                .unwrap_or(std::cmp::Ordering::Equal)
        } else if cross > 0.0 {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Greater
        }
    });

    let mut hull: Vec<Point> = Vec::new();
    for point in points {
        while hull.len() > 1
            && cross_product(&hull[hull.len() - 2], &hull[hull.len() - 1], &point) <= 0.0
        {
            hull.pop();
        }
        hull.push(point);
    }

    hull
}

/// A rectangle of minimum area enclosing a point set.
#[derive(Debug, Clone, Copy)]
pub struct MinAreaRect {
    /// The center point of the rectangle.
    pub center: Point,
    /// The width of the rectangle.
    pub width: f32,
    /// The height of the rectangle.
    pub height: f32,
    /// The rotation angle of the rectangle in degrees.
    pub angle: f32,
}

impl MinAreaRect {
    /// Length of the longer side of the rectangle.
    pub fn long_side(&self) -> f32 {
        self.width.max(self.height)
    }

    /// Length of the shorter side of the rectangle.
    pub fn short_side(&self) -> f32 {
        self.width.min(self.height)
    }
}

/// Computes the minimum-area rectangle enclosing a point set.
///
/// Uses the rotating calipers algorithm over the convex hull. Degenerate
/// inputs (collinear or fewer than 3 hull points) fall back to the
/// axis-aligned bounding rectangle.
pub fn min_area_rect(points: &[Point]) -> MinAreaRect {
    let zero = MinAreaRect {
        center: Point::new(0.0, 0.0),
        width: 0.0,
        height: 0.0,
        angle: 0.0,
    };
    if points.is_empty() {
        return zero;
    }

    let hull = convex_hull(points);
    if hull.len() < 3 {
        return axis_aligned_rect(points);
    }

    let mut min_area = f32::MAX;
    let mut min_rect = zero;

    let n = hull.len();
    for i in 0..n {
        let j = (i + 1) % n;

        let edge_x = hull[j].x - hull[i].x;
        let edge_y = hull[j].y - hull[i].y;
        let edge_length = (edge_x * edge_x + edge_y * edge_y).sqrt();
        if edge_length < f32::EPSILON {
            continue;
        }

        // Project every hull point onto the edge direction and its normal.
        let nx = edge_x / edge_length;
        let ny = edge_y / edge_length;
        let px = -ny;
        let py = nx;

        let mut min_n = f32::MAX;
        let mut max_n = f32::MIN;
        let mut min_p = f32::MAX;
        let mut max_p = f32::MIN;

        for point in &hull {
            let proj_n = nx * (point.x - hull[i].x) + ny * (point.y - hull[i].y);
            min_n = min_n.min(proj_n);
            max_n = max_n.max(proj_n);

            let proj_p = px * (point.x - hull[i].x) + py * (point.y - hull[i].y);
            min_p = min_p.min(proj_p);
            max_p = max_p.max(proj_p);
        }

        let width = max_n - min_n;
        let height = max_p - min_p;
        let area = width * height;

        if area < min_area {
            min_area = area;

            let center_n = (min_n + max_n) / 2.0;
            let center_p = (min_p + max_p) / 2.0;

            min_rect = MinAreaRect {
                center: Point::new(
                    hull[i].x + center_n * nx + center_p * px,
                    hull[i].y + center_n * ny + center_p * py,
                ),
                width,
                height,
                angle: f32::atan2(ny, nx) * 180.0 / PI,
            };
        }
    }

    min_rect
}

/// Axis-aligned bounding rectangle, used for degenerate hulls.
fn axis_aligned_rect(points: &[Point]) -> MinAreaRect {
    let (min_x, max_x) = points
        .iter()
        .map(|p| p.x)
        .minmax_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .into_option()
        .unwrap_or((0.0, 0.0));
    let (min_y, max_y) = points
        .iter()
        .map(|p| p.y)
        .minmax_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .into_option()
        .unwrap_or((0.0, 0.0));
    MinAreaRect {
        center: Point::new((min_x + max_x) / 2.0, (min_y + max_y) / 2.0),
        width: max_x - min_x,
        height: max_y - min_y,
        angle: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_area_rectangle() {
        let rect = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 4.0),
            Point::new(0.0, 4.0),
        ];
        assert_eq!(polygon_area(&rect), 40.0);
    }

    #[test]
    fn test_polygon_area_degenerate() {
        assert_eq!(polygon_area(&[]), 0.0);
        assert_eq!(polygon_area(&[Point::new(1.0, 1.0), Point::new(2.0, 2.0)]), 0.0);
    }

    #[test]
    fn test_convex_hull_drops_interior_points() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
            Point::new(0.0, 4.0),
            Point::new(2.0, 2.0), // interior
        ];
        let hull = convex_hull(&points);
        assert_eq!(hull.len(), 4);
        assert!(!hull.iter().any(|p| p.x == 2.0 && p.y == 2.0));
    }

    #[test]
    fn test_min_area_rect_axis_aligned() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 50.0),
            Point::new(0.0, 50.0),
        ];
        let rect = min_area_rect(&points);
        assert!((rect.long_side() - 100.0).abs() < 1e-3);
        assert!((rect.short_side() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_min_area_rect_rotated() {
        // A unit square rotated 45 degrees; sides stay length ~sqrt(2) for
        // the diamond's bounding rect aligned to its edges.
        let points = vec![
            Point::new(0.0, 1.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 1.0),
            Point::new(1.0, 2.0),
        ];
        let rect = min_area_rect(&points);
        let side = (2.0f32).sqrt();
        assert!((rect.long_side() - side).abs() < 1e-3);
        assert!((rect.short_side() - side).abs() < 1e-3);
    }

    #[test]
    fn test_min_area_rect_collinear_falls_back() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
        ];
        let rect = min_area_rect(&points);
        assert_eq!(rect.long_side(), 10.0);
        assert_eq!(rect.short_side(), 0.0);
    }
}

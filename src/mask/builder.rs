//! Polygon rasterization into binary masks.
//!
//! Each polygon detection belonging to a region is rasterized into its own
//! single-channel raster sized to the region's native plane: polygon
//! interior 255, background 0. When the same target class is detected more
//! than once in a region, every instance gets a separate raster so two
//! physically distinct objects are never merged into one mask.

use crate::geometry::{ImagePlane, Point};
use image::{GrayImage, Luma};

/// Foreground value of mask pixels.
pub const FOREGROUND: u8 = 255;

/// One rasterized class instance within a region.
#[derive(Debug)]
pub struct InstanceMask {
    /// Class label of the source detection.
    pub label: String,
    /// 1-based instance number within the region, in input order.
    pub instance: u32,
    /// The binary raster.
    pub image: GrayImage,
}

/// Rasterizes a closed polygon into a binary mask sized to `plane`.
///
/// Scanline fill: for every pixel row the polygon edges are intersected at
/// the row center, intersections are paired, and the spans between pairs are
/// filled. Pixels are covered when their center lies inside the polygon.
/// Polygons with fewer than 3 vertices yield an empty mask.
pub fn rasterize_polygon(points: &[Point], plane: ImagePlane) -> GrayImage {
    let mut mask = GrayImage::new(plane.width, plane.height);
    if points.len() < 3 {
        return mask;
    }

    let n = points.len();
    let mut intersections: Vec<f32> = Vec::with_capacity(n);

    for row in 0..plane.height {
        let y = row as f32 + 0.5;
        intersections.clear();

        for i in 0..n {
            let j = (i + 1) % n;
            let p1 = &points[i];
            let p2 = &points[j];

            // Half-open rule so shared vertices count once.
            if ((p1.y <= y && y < p2.y) || (p2.y <= y && y < p1.y))
                && (p2.y - p1.y).abs() > f32::EPSILON
            {
                let x = p1.x + (y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y);
                intersections.push(x);
            }
        }

        intersections.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        for span in intersections.chunks(2) {
            if span.len() != 2 {
                continue;
            }
            let start = (span[0] - 0.5).ceil().max(0.0) as u32;
            let end = ((span[1] - 0.5).floor() as i64).min(plane.width as i64 - 1);
            if end < start as i64 {
                continue;
            }
            for x in start..=end as u32 {
                mask.put_pixel(x, row, Luma([FOREGROUND]));
            }
        }
    }

    mask
}

/// Rasterizes a region's polygon detections into per-instance masks.
///
/// `polygons` pairs each detection's class label with its native-plane
/// vertices. Instances are numbered 1-based per label in input order.
pub fn build_class_masks(polygons: &[(String, Vec<Point>)], plane: ImagePlane) -> Vec<InstanceMask> {
    let mut counts: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    polygons
        .iter()
        .map(|(label, points)| {
            let instance = counts.entry(label.as_str()).or_insert(0);
            *instance += 1;
            InstanceMask {
                label: label.clone(),
                instance: *instance,
                image: rasterize_polygon(points, plane),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foreground_count(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == FOREGROUND).count()
    }

    #[test]
    fn rectangle_interior_is_filled() {
        let poly = vec![
            Point::new(10.0, 10.0),
            Point::new(50.0, 10.0),
            Point::new(50.0, 30.0),
            Point::new(10.0, 30.0),
        ];
        let mask = rasterize_polygon(&poly, ImagePlane::new(60, 40));

        assert_eq!(mask.get_pixel(20, 15).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(49, 29).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(5, 5).0[0], 0);
        assert_eq!(mask.get_pixel(55, 35).0[0], 0);
        // 40x20 pixel centers fall inside the rectangle.
        assert_eq!(foreground_count(&mask), 40 * 20);
    }

    #[test]
    fn triangle_fills_partially() {
        let poly = vec![
            Point::new(0.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(0.0, 20.0),
        ];
        let mask = rasterize_polygon(&poly, ImagePlane::new(20, 20));

        assert_eq!(mask.get_pixel(2, 2).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(18, 18).0[0], 0);
        // Roughly half the bounding square.
        let count = foreground_count(&mask) as f32;
        assert!(count > 150.0 && count < 250.0, "count = {count}");
    }

    #[test]
    fn degenerate_polygon_yields_empty_mask() {
        let mask = rasterize_polygon(
            &[Point::new(1.0, 1.0), Point::new(5.0, 5.0)],
            ImagePlane::new(10, 10),
        );
        assert_eq!(foreground_count(&mask), 0);
    }

    #[test]
    fn polygon_outside_plane_is_clipped() {
        let poly = vec![
            Point::new(-10.0, -10.0),
            Point::new(5.0, -10.0),
            Point::new(5.0, 5.0),
            Point::new(-10.0, 5.0),
        ];
        let mask = rasterize_polygon(&poly, ImagePlane::new(10, 10));
        assert_eq!(mask.get_pixel(2, 2).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(8, 8).0[0], 0);
    }

    #[test]
    fn repeated_classes_get_separate_instances() {
        let square =
            |ox: f32| vec![
                Point::new(ox, 0.0),
                Point::new(ox + 4.0, 0.0),
                Point::new(ox + 4.0, 4.0),
                Point::new(ox, 4.0),
            ];
        let masks = build_class_masks(
            &[
                ("specimen".to_string(), square(0.0)),
                ("pin".to_string(), square(10.0)),
                ("specimen".to_string(), square(20.0)),
            ],
            ImagePlane::new(30, 10),
        );

        assert_eq!(masks.len(), 3);
        assert_eq!((masks[0].label.as_str(), masks[0].instance), ("specimen", 1));
        assert_eq!((masks[1].label.as_str(), masks[1].instance), ("pin", 1));
        assert_eq!((masks[2].label.as_str(), masks[2].instance), ("specimen", 2));
        // Instances are distinct rasters, not merged.
        assert!(foreground_count(&masks[0].image) > 0);
        assert!(foreground_count(&masks[2].image) > 0);
        assert_eq!(masks[0].image.get_pixel(21, 2).0[0], 0);
    }
}

//! Geometric primitives and algorithms for the digitization pipeline.
//!
//! This module provides the point and polygon math shared by coordinate
//! re-projection, mask rasterization, and measurement: 2D points, polygon
//! area, convex hulls, minimum-area rectangles, image planes, per-axis scale
//! factors, and the preview-to-native coordinate mapper.

pub mod mapper;
pub mod plane;
pub mod point;

pub use mapper::{CoordinateMapper, PixelRect};
pub use plane::{aspect_ratio_agrees, ImagePlane, ScaleFactor};
pub use point::{convex_hull, min_area_rect, polygon_area, MinAreaRect, Point};

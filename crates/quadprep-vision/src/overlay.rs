// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Debug overlay: detected lines, their intersections and the chosen quad
// drawn over the working-resolution colour image.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use quadprep_core::geometry::{Line, Point};

/// Colours and sizes used when drawing the overlay.
#[derive(Debug, Clone, Copy)]
pub struct OverlayStyle {
    pub line_color: Rgb<u8>,
    pub intersection_color: Rgb<u8>,
    pub quad_color: Rgb<u8>,
    pub intersection_radius: i32,
    pub corner_radius: i32,
    /// Quad edges are drawn this many pixels thick.
    pub thickness: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            line_color: Rgb([255, 0, 0]),
            intersection_color: Rgb([0, 128, 255]),
            quad_color: Rgb([0, 255, 0]),
            intersection_radius: 4,
            corner_radius: 5,
            thickness: 2,
        }
    }
}

/// Render the overlay on a copy of `base`. All coordinates are in `base`
/// pixels.
pub fn draw_overlay(
    base: &DynamicImage,
    lines: &[Line],
    intersections: &[Point],
    quad: Option<&[Point; 4]>,
    style: &OverlayStyle,
) -> RgbImage {
    let mut canvas = base.to_rgb8();
    let reach = (canvas.width() + canvas.height()) as f64;

    for line in lines {
        let (a, b) = line.endpoints(reach);
        draw_line_segment_mut(&mut canvas, a.into(), b.into(), style.line_color);
    }

    for p in intersections {
        draw_hollow_circle_mut(
            &mut canvas,
            (p.x.round() as i32, p.y.round() as i32),
            style.intersection_radius,
            style.intersection_color,
        );
    }

    if let Some(quad) = quad {
        for i in 0..4 {
            let (a, b) = (quad[i], quad[(i + 1) % 4]);
            for t in 0..style.thickness.max(1) {
                let offset = t as f32;
                let (ax, ay): (f32, f32) = a.into();
                let (bx, by): (f32, f32) = b.into();
                draw_line_segment_mut(&mut canvas, (ax + offset, ay), (bx + offset, by), style.quad_color);
                draw_line_segment_mut(&mut canvas, (ax, ay + offset), (bx, by + offset), style.quad_color);
            }
        }
        for p in quad {
            draw_filled_circle_mut(
                &mut canvas,
                (p.x.round() as i32, p.y.round() as i32),
                style.corner_radius,
                style.quad_color,
            );
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::f64::consts::FRAC_PI_2;

    fn blank() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::new(100, 100))
    }

    #[test]
    fn nothing_to_draw_keeps_the_image() {
        let out = draw_overlay(&blank(), &[], &[], None, &OverlayStyle::default());
        assert_eq!(out.dimensions(), (100, 100));
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn lines_span_the_image() {
        let style = OverlayStyle::default();
        let out = draw_overlay(&blank(), &[Line::new(40.0, FRAC_PI_2)], &[], None, &style);
        assert_eq!(*out.get_pixel(0, 40), style.line_color);
        assert_eq!(*out.get_pixel(99, 40), style.line_color);
    }

    #[test]
    fn quad_corners_are_marked() {
        let style = OverlayStyle::default();
        let quad = [
            Point::new(10.0, 10.0),
            Point::new(90.0, 10.0),
            Point::new(90.0, 90.0),
            Point::new(10.0, 90.0),
        ];
        let out = draw_overlay(&blank(), &[], &[Point::new(50.0, 50.0)], Some(&quad), &style);
        assert_eq!(*out.get_pixel(10, 10), style.quad_color);
        assert_eq!(*out.get_pixel(50, 10), style.quad_color);
        assert_eq!(*out.get_pixel(54, 50), style.intersection_color);
        assert_eq!(*out.get_pixel(50, 50), Rgb([0, 0, 0]));
    }
}

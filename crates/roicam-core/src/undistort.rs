//! Precomputed fisheye undistortion remap.
//!
//! The map is built once per session: for every output pixel we cast a
//! pinhole ray through the intrinsics, distort it with the equidistant
//! fisheye model, and record where that ray lands on the raw sensor.
//! Applying the map is then a per-pixel bilinear lookup, with constant
//! zero fill for samples that fall outside the source frame.

use crate::calibration::CalibrationParams;

/// Two lookup tables mapping each output pixel to fractional source
/// coordinates. Immutable after construction.
pub struct UndistortionMap {
    width: usize,
    height: usize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

/// Apply the fisheye distortion polynomial to an incidence angle:
/// θ_d = θ(1 + k1·θ² + k2·θ⁴ + k3·θ⁶ + k4·θ⁸ + k5·θ¹⁰ + k6·θ¹²).
fn distort_angle(theta: f64, k: &[f64; 6]) -> f64 {
    let t2 = theta * theta;
    let poly = 1.0
        + t2 * (k[0] + t2 * (k[1] + t2 * (k[2] + t2 * (k[3] + t2 * (k[4] + t2 * k[5])))));
    theta * poly
}

impl UndistortionMap {
    /// Build the remap tables for a sensor of the given dimensions.
    pub fn build(params: &CalibrationParams, width: u32, height: u32) -> Self {
        let w = width as usize;
        let h = height as usize;
        let k = params.coefficients();

        let mut map_x = vec![0f32; w * h];
        let mut map_y = vec![0f32; w * h];

        for v in 0..h {
            for u in 0..w {
                // Undistorted pixel → normalized pinhole ray.
                let x = (u as f64 - params.cx) / params.fx;
                let y = (v as f64 - params.cy) / params.fy;
                let r = (x * x + y * y).sqrt();

                // On the optical axis the ray maps to itself.
                let scale = if r > 1e-8 {
                    let theta = r.atan();
                    distort_angle(theta, &k) / r
                } else {
                    1.0
                };

                let idx = v * w + u;
                map_x[idx] = (params.fx * x * scale + params.cx) as f32;
                map_y[idx] = (params.fy * y * scale + params.cy) as f32;
            }
        }

        tracing::debug!(width, height, "built undistortion map");

        Self {
            width: w,
            height: h,
            map_x,
            map_y,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Remap a grayscale frame through the lookup tables.
    ///
    /// Uses bilinear interpolation; samples outside the source frame are
    /// filled with 0 (black). The input must be `width * height` bytes.
    pub fn remap(&self, data: &[u8]) -> Vec<u8> {
        assert_eq!(
            data.len(),
            self.width * self.height,
            "frame size does not match remap table"
        );

        let w = self.width;
        let h = self.height;
        let mut output = vec![0u8; w * h];

        let sample = |x: i64, y: i64| -> f32 {
            if x >= 0 && x < w as i64 && y >= 0 && y < h as i64 {
                data[y as usize * w + x as usize] as f32
            } else {
                0.0
            }
        };

        for idx in 0..w * h {
            let sx = self.map_x[idx];
            let sy = self.map_y[idx];

            let x0 = sx.floor() as i64;
            let y0 = sy.floor() as i64;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            output[idx] = val.round().clamp(0.0, 255.0) as u8;
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centered_params(k1: f64) -> CalibrationParams {
        CalibrationParams {
            fx: 20.0,
            fy: 20.0,
            cx: 16.0,
            cy: 12.0,
            k1,
            k2: 0.0,
            k3: 0.0,
            k4: 0.0,
            k5: None,
            k6: None,
        }
    }

    /// Map with handcrafted tables, for exercising remap alone.
    fn raw_map(width: usize, height: usize, map_x: Vec<f32>, map_y: Vec<f32>) -> UndistortionMap {
        UndistortionMap {
            width,
            height,
            map_x,
            map_y,
        }
    }

    #[test]
    fn test_distort_angle_zero_coefficients_is_identity() {
        let k = [0.0; 6];
        for theta in [0.0, 0.1, 0.5, 1.0] {
            assert!((distort_angle(theta, &k) - theta).abs() < 1e-12);
        }
    }

    #[test]
    fn test_distort_angle_polynomial_terms() {
        let k = [0.5, 0.0, 0.0, 0.0, 0.0, 0.0];
        let theta = 0.2f64;
        let expected = theta * (1.0 + 0.5 * theta * theta);
        assert!((distort_angle(theta, &k) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_build_principal_point_is_fixed() {
        let map = UndistortionMap::build(&centered_params(0.1), 32, 24);
        let idx = 12 * 32 + 16;
        assert!((map.map_x[idx] - 16.0).abs() < 1e-4);
        assert!((map.map_y[idx] - 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_build_is_symmetric_about_center() {
        let map = UndistortionMap::build(&centered_params(0.05), 33, 25);
        // cx=16, cy=12 is the exact grid center of a 33x25 frame.
        let left = map.map_x[12 * 33 + 6];
        let right = map.map_x[12 * 33 + 26];
        assert!((left - 16.0 + (right - 16.0)).abs() < 1e-3);
    }

    #[test]
    fn test_build_pulls_off_axis_pixels_inward() {
        // Pure equidistant projection (zero k): theta < tan(theta), so
        // source samples sit closer to the center than the output pixel.
        let map = UndistortionMap::build(&centered_params(0.0), 32, 24);
        let idx = 12 * 32 + 31; // far right of the center row
        assert!(map.map_x[idx] < 31.0);
        assert!(map.map_x[idx] > 16.0);
    }

    #[test]
    fn test_remap_identity_tables() {
        let w = 4usize;
        let h = 3usize;
        let mut map_x = vec![0f32; w * h];
        let mut map_y = vec![0f32; w * h];
        for y in 0..h {
            for x in 0..w {
                map_x[y * w + x] = x as f32;
                map_y[y * w + x] = y as f32;
            }
        }
        let map = raw_map(w, h, map_x, map_y);

        let data: Vec<u8> = (0..(w * h) as u8).collect();
        assert_eq!(map.remap(&data), data);
    }

    #[test]
    fn test_remap_half_pixel_shift_interpolates() {
        // One row: sampling at x+0.5 averages adjacent pixels.
        let map = raw_map(3, 1, vec![0.5, 1.5, 2.5], vec![0.0, 0.0, 0.0]);
        let out = map.remap(&[0, 100, 200]);
        assert_eq!(out[0], 50);
        assert_eq!(out[1], 150);
        // x=2.5 samples half out of bounds: (200 + 0) / 2.
        assert_eq!(out[2], 100);
    }

    #[test]
    fn test_remap_out_of_bounds_fills_zero() {
        let map = raw_map(2, 2, vec![-5.0, 10.0, 0.0, 1.0], vec![0.0, 0.0, 5.0, -3.0]);
        let out = map.remap(&[255, 255, 255, 255]);
        assert_eq!(out, vec![0, 0, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "frame size does not match")]
    fn test_remap_wrong_size_panics() {
        let map = UndistortionMap::build(&centered_params(0.0), 8, 8);
        map.remap(&[0u8; 10]);
    }
}

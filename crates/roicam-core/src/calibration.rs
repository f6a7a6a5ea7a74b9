//! Fisheye camera intrinsics and distortion coefficients.

use serde::Deserialize;
use thiserror::Error;

/// Calibrated fisheye intrinsics for one sensor.
///
/// Focal lengths and principal point are in pixels; `k1..k4` are the
/// equidistant-model distortion coefficients, with optional `k5`/`k6`
/// higher-order terms for lenses calibrated with a six-term polynomial.
/// Immutable once loaded.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CalibrationParams {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    #[serde(default)]
    pub k5: Option<f64>,
    #[serde(default)]
    pub k6: Option<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("focal length {name} must be positive, got {value}")]
    NonPositiveFocal { name: &'static str, value: f64 },
    #[error("calibration field {name} is not finite")]
    NotFinite { name: &'static str },
}

impl CalibrationParams {
    /// Check the parameters are usable for building a remap table.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        for (name, value) in [
            ("fx", self.fx),
            ("fy", self.fy),
            ("cx", self.cx),
            ("cy", self.cy),
            ("k1", self.k1),
            ("k2", self.k2),
            ("k3", self.k3),
            ("k4", self.k4),
            ("k5", self.k5.unwrap_or(0.0)),
            ("k6", self.k6.unwrap_or(0.0)),
        ] {
            if !value.is_finite() {
                return Err(CalibrationError::NotFinite { name });
            }
        }
        for (name, value) in [("fx", self.fx), ("fy", self.fy)] {
            if value <= 0.0 {
                return Err(CalibrationError::NonPositiveFocal { name, value });
            }
        }
        Ok(())
    }

    /// All six distortion coefficients, absent terms as zero.
    pub fn coefficients(&self) -> [f64; 6] {
        [
            self.k1,
            self.k2,
            self.k3,
            self.k4,
            self.k5.unwrap_or(0.0),
            self.k6.unwrap_or(0.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_params() -> CalibrationParams {
        CalibrationParams {
            fx: 600.0,
            fy: 600.0,
            cx: 960.0,
            cy: 540.0,
            k1: 0.08,
            k2: -0.02,
            k3: 0.001,
            k4: 0.0,
            k5: None,
            k6: None,
        }
    }

    #[test]
    fn test_validate_accepts_sane_params() {
        assert_eq!(valid_params().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_zero_focal() {
        let mut params = valid_params();
        params.fy = 0.0;
        assert_eq!(
            params.validate(),
            Err(CalibrationError::NonPositiveFocal {
                name: "fy",
                value: 0.0
            })
        );
    }

    #[test]
    fn test_validate_rejects_nan() {
        let mut params = valid_params();
        params.k2 = f64::NAN;
        assert!(matches!(
            params.validate(),
            Err(CalibrationError::NotFinite { name: "k2" })
        ));
    }

    #[test]
    fn test_coefficients_pad_missing_terms() {
        let params = valid_params();
        assert_eq!(params.coefficients(), [0.08, -0.02, 0.001, 0.0, 0.0, 0.0]);

        let mut six_term = valid_params();
        six_term.k5 = Some(0.5);
        six_term.k6 = Some(-0.5);
        assert_eq!(six_term.coefficients()[4], 0.5);
        assert_eq!(six_term.coefficients()[5], -0.5);
    }
}

//! Deskew ("unsweep") geometry.
//!
//! The forward transform first translates X by `width / 2 + offset_x`, then
//! shears X by `cot(angle) * z`. A voxel at input `(x, y, z)` lands at
//! `(x + tx + s * z, y, z)` in the output.

use std::f64::consts::FRAC_1_SQRT_2;

use glam::{DAffine3, DMat3, DVec3};

use crate::error::{Error, Result};

/// Sine and cosine of an angle in degrees.
///
/// The angle is reduced to the nearest multiple of 90 degrees first, so
/// multiples of 45 degrees produce exact values (0, +-1, +-1/sqrt(2)).
pub fn sin_cos_degrees(degrees: f64) -> (f64, f64) {
    let quadrant = (degrees / 90.0).round();
    let rem = degrees - quadrant * 90.0;

    let (s, c) = if rem == 0.0 {
        (0.0, 1.0)
    } else if rem.abs() == 45.0 {
        (FRAC_1_SQRT_2.copysign(rem), FRAC_1_SQRT_2)
    } else {
        rem.to_radians().sin_cos()
    };

    match quadrant.rem_euclid(4.0) as u8 {
        0 => (s, c),
        1 => (c, -s),
        2 => (-s, -c),
        _ => (-c, s),
    }
}

/// Cotangent of an angle in degrees. Exact at multiples of 45 degrees.
pub fn cot_degrees(degrees: f64) -> Result<f64> {
    if !degrees.is_finite() {
        return Err(Error::InvalidConfig(format!(
            "deskew angle must be finite, got {}",
            degrees
        )));
    }

    let (s, c) = sin_cos_degrees(degrees);
    if s == 0.0 {
        return Err(Error::InvalidConfig(format!(
            "deskew angle {} degrees gives an infinite shear",
            degrees
        )));
    }
    if c == 0.0 {
        return Ok(0.0);
    }
    Ok(c / s)
}

/// Shear factor applied along Z->X.
pub fn shear_factor(angle_degrees: f64) -> Result<f64> {
    cot_degrees(angle_degrees)
}

/// Builds the forward deskew transform for a volume `width` voxels wide.
pub fn deskew_transform(width: u32, angle_degrees: f64, offset_x: f64) -> Result<DAffine3> {
    let shear = shear_factor(angle_degrees)?;
    let tx = width as f64 / 2.0 + offset_x;

    let shear_xz = DAffine3::from_mat3(DMat3::from_cols(
        DVec3::X,
        DVec3::Y,
        DVec3::new(shear, 0.0, 1.0),
    ));
    let translate = DAffine3::from_translation(DVec3::new(tx, 0.0, 0.0));

    Ok(shear_xz * translate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shear_factor_exact_at_45_and_90() {
        assert_eq!(shear_factor(45.0).unwrap(), 1.0);
        assert_eq!(shear_factor(90.0).unwrap(), 0.0);
        assert_eq!(shear_factor(135.0).unwrap(), -1.0);
        assert_eq!(shear_factor(-45.0).unwrap(), -1.0);
    }

    #[test]
    fn test_shear_factor_default_angle() {
        let expected = 1.0 / 35f64.to_radians().tan();
        assert!((shear_factor(35.0).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_sin_cos_quadrants() {
        assert_eq!(sin_cos_degrees(0.0), (0.0, 1.0));
        assert_eq!(sin_cos_degrees(90.0), (1.0, -0.0));
        assert_eq!(sin_cos_degrees(180.0).1, -1.0);
        assert_eq!(sin_cos_degrees(270.0).0, -1.0);
        assert_eq!(sin_cos_degrees(360.0), (0.0, 1.0));
    }

    #[test]
    fn test_zero_angle_is_rejected() {
        assert!(matches!(shear_factor(0.0), Err(Error::InvalidConfig(_))));
        assert!(matches!(shear_factor(180.0), Err(Error::InvalidConfig(_))));
        assert!(matches!(shear_factor(f64::NAN), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_transform_maps_input_voxels() {
        let transform = deskew_transform(10, 45.0, -2.0).unwrap();

        // tx = 10 / 2 - 2 = 3, shear = 1
        let p = transform.transform_point3(DVec3::new(1.0, 4.0, 2.0));
        assert_eq!(p, DVec3::new(6.0, 4.0, 2.0));

        let back = transform.inverse().transform_point3(p);
        assert_eq!(back, DVec3::new(1.0, 4.0, 2.0));
    }

    #[test]
    fn test_centering_offset_at_90_is_identity() {
        let transform = deskew_transform(8, 90.0, -4.0).unwrap();
        assert_eq!(transform, DAffine3::IDENTITY);
    }
}

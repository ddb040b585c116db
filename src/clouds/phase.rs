//! Phase functions and the powder term.

use std::f32::consts::PI;

use super::config::ScatteringCoefficients;

/// Isotropic phase function value
pub const ISOTROPIC_PHASE: f32 = 1.0 / (4.0 * PI);

/// Henyey-Greenstein phase for anisotropy `g` and scattering cosine `cos_theta`.
#[inline]
pub fn henyey_greenstein(cos_theta: f32, g: f32) -> f32 {
    let g2 = g * g;
    let denom = (1.0 + g2 - 2.0 * g * cos_theta).max(1e-6);
    ISOTROPIC_PHASE * (1.0 - g2) / (denom * denom.sqrt())
}

/// Two Henyey-Greenstein lobes blended by `anisotropy_mix`.
#[inline]
pub fn dual_lobe(cos_theta: f32, coefficients: &ScatteringCoefficients) -> f32 {
    let a = henyey_greenstein(cos_theta, coefficients.anisotropy_1);
    let b = henyey_greenstein(cos_theta, coefficients.anisotropy_2);
    a + (b - a) * coefficients.anisotropy_mix
}

/// Darkening of thin cloud edges facing away from the light.
#[inline]
pub fn powder(extinction: f32, coefficients: &ScatteringCoefficients) -> f32 {
    1.0 - coefficients.powder_scale * (-extinction * coefficients.powder_exponent).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hg_zero_is_isotropic() {
        for c in [-1.0, -0.3, 0.0, 0.5, 1.0] {
            assert!((henyey_greenstein(c, 0.0) - ISOTROPIC_PHASE).abs() < 1e-6);
        }
    }

    #[test]
    fn test_hg_integrates_to_one() {
        // Integrate over the sphere: 2π ∫ p(cosθ) d(cosθ)
        let n = 20_000;
        let mut sum = 0.0;
        for i in 0..n {
            let c = -1.0 + 2.0 * (i as f32 + 0.5) / n as f32;
            sum += henyey_greenstein(c, 0.7) * 2.0 / n as f32;
        }
        let total = sum * 2.0 * PI;
        assert!((total - 1.0).abs() < 1e-2, "integral = {total}");
    }

    #[test]
    fn test_forward_lobe_peaks_forward() {
        let c = ScatteringCoefficients::default();
        assert!(dual_lobe(1.0, &c) > dual_lobe(-1.0, &c));
    }

    #[test]
    fn test_powder_range() {
        let c = ScatteringCoefficients::default();
        assert!((powder(0.0, &c) - (1.0 - c.powder_scale)).abs() < 1e-6);
        assert!(powder(1.0, &c) > 0.999);
    }
}

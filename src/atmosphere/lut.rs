//! Precomputed atmosphere backed by a transmittance look-up table.
//!
//! The table stores transmittance from a point at altitude `h` to the top
//! of the atmosphere along a ray with zenith cosine `mu`. Every query after
//! construction is a handful of table lookups; nothing is marched per pixel.

use std::f32::consts::PI;

use glam::{DVec3, UVec2, Vec2, Vec3};

use crate::atmosphere::config::AtmosphereConfig;
use crate::atmosphere::{AtmosphereModel, ScatteringSample, SunSkyIrradiance};
use crate::clouds::phase::henyey_greenstein;
use crate::core::ConfigError;
use crate::render::texture::Texture2D;

/// Fraction of the zenith-scattered sunlight returned as sky irradiance.
const SKY_IRRADIANCE_FACTOR: f32 = 0.5;

pub struct PrecomputedAtmosphere {
    config: AtmosphereConfig,
    center: Vec3,
    rayleigh: Vec3,
    solar: Vec3,
    transmittance: Texture2D<Vec3>,
}

impl PrecomputedAtmosphere {
    /// Validate the configuration and build the transmittance table.
    pub fn new(config: AtmosphereConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let size = UVec2::new(config.lut_size[0], config.lut_size[1]);
        let transmittance = Texture2D::from_fn(size, |x, y| {
            let mu = from_unit_range((x as f32 + 0.5) / size.x as f32, size.x) * 2.0 - 1.0;
            let h = from_unit_range((y as f32 + 0.5) / size.y as f32, size.y)
                * (config.top_radius - config.bottom_radius);
            integrate_transmittance(&config, config.bottom_radius + h, mu)
        });
        log::info!(
            "Precomputed atmosphere transmittance table {}x{} ({} steps)",
            size.x,
            size.y,
            config.lut_steps
        );
        Ok(Self {
            center: Vec3::from(config.planet_center),
            rayleigh: Vec3::from(config.rayleigh_scattering),
            solar: Vec3::from(config.solar_irradiance),
            config,
            transmittance,
        })
    }

    pub fn config(&self) -> &AtmosphereConfig {
        &self.config
    }

    /// Transmittance from radius `r` to the top of the atmosphere.
    pub fn transmittance_to_top(&self, r: f32, mu: f32) -> Vec3 {
        let size = self.transmittance.size();
        let h = (r - self.config.bottom_radius) / (self.config.top_radius - self.config.bottom_radius);
        let uv = Vec2::new(
            to_unit_range((mu.clamp(-1.0, 1.0) + 1.0) * 0.5, size.x),
            to_unit_range(h.clamp(0.0, 1.0), size.y),
        );
        self.transmittance.sample(uv)
    }

    /// Transmittance along the straight segment between two world points.
    pub fn transmittance(&self, start: Vec3, end: Vec3) -> Vec3 {
        let delta = end - start;
        let length = delta.length();
        if length <= 0.0 {
            return Vec3::ONE;
        }
        let dir = delta / length;
        let (r0, mu0) = self.radius_and_mu(start, dir);
        let (r1, mu1) = self.radius_and_mu(end, dir);

        let ratio = if self.intersects_ground(r0, mu0) {
            // Look back from the lower end so neither ray crosses the planet
            safe_div(self.transmittance_to_top(r1, -mu1), self.transmittance_to_top(r0, -mu0))
        } else {
            safe_div(self.transmittance_to_top(r0, mu0), self.transmittance_to_top(r1, mu1))
        };
        ratio.min(Vec3::ONE)
    }

    /// Sunlight reaching `position`, zero when the sun is below its horizon.
    fn sun_at(&self, position: Vec3, sun_direction: Vec3) -> Vec3 {
        let (r, mu_s) = self.radius_and_mu(position, sun_direction);
        if self.intersects_ground(r, mu_s) {
            return Vec3::ZERO;
        }
        self.solar * self.transmittance_to_top(r, mu_s)
    }

    fn radius_and_mu(&self, position: Vec3, dir: Vec3) -> (f32, f32) {
        let rel = position - self.center;
        let r = rel.length().max(1.0);
        (r.min(self.config.top_radius), rel.dot(dir) / r)
    }

    fn intersects_ground(&self, r: f32, mu: f32) -> bool {
        let bottom = self.config.bottom_radius;
        mu < 0.0 && r * r * (mu * mu - 1.0) + bottom * bottom >= 0.0
    }
}

impl AtmosphereModel for PrecomputedAtmosphere {
    fn sun_sky_irradiance(&self, _camera: Vec3, surface: Vec3, sun_direction: Vec3) -> SunSkyIrradiance {
        let (r, mu_s) = self.radius_and_mu(surface, sun_direction);
        let zenith_loss = Vec3::ONE - self.transmittance_to_top(r, 1.0);
        SunSkyIrradiance {
            sun: self.sun_at(surface, sun_direction),
            sky: self.solar * zenith_loss * (SKY_IRRADIANCE_FACTOR * mu_s.max(0.0)),
        }
    }

    fn transmittance_and_inscatter(&self, start: Vec3, end: Vec3, sun_direction: Vec3) -> ScatteringSample {
        let transmittance = self.transmittance(start, end);
        let delta = end - start;
        if delta.length_squared() <= 0.0 {
            return ScatteringSample { transmittance, inscatter: Vec3::ZERO };
        }

        let mid = (start + end) * 0.5;
        let h = ((mid - self.center).length() - self.config.bottom_radius).max(0.0);
        let rayleigh = self.rayleigh * (-h / self.config.rayleigh_scale_height).exp();
        let mie_density = (-h / self.config.mie_scale_height).exp();
        let mie_scattering = self.config.mie_scattering * mie_density;
        let extinction = rayleigh + Vec3::splat(self.config.mie_extinction * mie_density);

        let nu = delta.normalize().dot(sun_direction);
        let rayleigh_phase = 3.0 / (16.0 * PI) * (1.0 + nu * nu);
        let mie_phase = henyey_greenstein(nu, self.config.mie_g);
        let scattering = rayleigh * rayleigh_phase + Vec3::splat(mie_scattering * mie_phase);

        // Single scattering over a segment with the midpoint's albedo
        let inscatter = self.sun_at(mid, sun_direction)
            * safe_div(scattering, extinction)
            * (Vec3::ONE - transmittance);
        ScatteringSample { transmittance, inscatter }
    }
}

fn integrate_transmittance(config: &AtmosphereConfig, r: f32, mu: f32) -> Vec3 {
    let r = r as f64;
    let mu = mu as f64;
    let top = config.top_radius as f64;
    let distance = (-r * mu + (r * r * (mu * mu - 1.0) + top * top).max(0.0).sqrt()).max(0.0);
    let steps = config.lut_steps.max(1);
    let dt = distance / steps as f64;

    let rayleigh = Vec3::from(config.rayleigh_scattering).as_dvec3();
    let mut optical_depth = DVec3::ZERO;
    for i in 0..steps {
        let t = (i as f64 + 0.5) * dt;
        let radius = (r * r + t * t + 2.0 * r * mu * t).sqrt();
        let h = (radius - config.bottom_radius as f64).max(0.0);
        let rayleigh_density = (-h / config.rayleigh_scale_height as f64).exp();
        let mie_density = (-h / config.mie_scale_height as f64).exp();
        optical_depth += (rayleigh * rayleigh_density
            + DVec3::splat(config.mie_extinction as f64 * mie_density))
            * dt;
    }
    DVec3::new(
        (-optical_depth.x).exp(),
        (-optical_depth.y).exp(),
        (-optical_depth.z).exp(),
    )
    .as_vec3()
}

/// Map `[0, 1]` onto texel centers so both ends are sampled exactly.
fn to_unit_range(x: f32, size: u32) -> f32 {
    0.5 / size as f32 + x * (1.0 - 1.0 / size as f32)
}

fn from_unit_range(u: f32, size: u32) -> f32 {
    ((u - 0.5 / size as f32) / (1.0 - 1.0 / size as f32)).clamp(0.0, 1.0)
}

fn safe_div(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::select(b.cmpgt(Vec3::splat(1e-20)), a / b.max(Vec3::splat(1e-20)), Vec3::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> AtmosphereConfig {
        AtmosphereConfig {
            lut_size: [128, 32],
            lut_steps: 32,
            ..Default::default()
        }
    }

    #[test]
    fn test_vacuum_is_transparent() {
        let atmo = PrecomputedAtmosphere::new(AtmosphereConfig {
            lut_size: [16, 8],
            ..AtmosphereConfig::vacuum()
        })
        .unwrap();
        let s = atmo.transmittance_and_inscatter(Vec3::new(0.0, 10_000.0, 0.0), Vec3::ZERO, Vec3::Y);
        assert_eq!(s.transmittance, Vec3::ONE);
        assert_eq!(s.inscatter, Vec3::ZERO);
        let irr = atmo.sun_sky_irradiance(Vec3::new(0.0, 10_000.0, 0.0), Vec3::ZERO, Vec3::Y);
        assert!((irr.sun - Vec3::from(AtmosphereConfig::default().solar_irradiance)).length() < 1e-5);
        assert_eq!(irr.sky, Vec3::ZERO);
    }

    #[test]
    fn test_transmittance_decreases_with_distance() {
        let atmo = PrecomputedAtmosphere::new(small_config()).unwrap();
        let start = Vec3::new(0.0, 100.0, 0.0);
        let dir = Vec3::new(1.0, 0.3, 0.0).normalize();
        let near = atmo.transmittance(start, start + dir * 5_000.0);
        let far = atmo.transmittance(start, start + dir * 50_000.0);
        assert!(far.z < near.z, "near {near:?} far {far:?}");
        assert!(near.z < 1.0 && far.z > 0.0);
        // Blue is scattered most
        assert!(far.z < far.x);
    }

    #[test]
    fn test_transmittance_is_symmetric() {
        let atmo = PrecomputedAtmosphere::new(small_config()).unwrap();
        let a = Vec3::new(0.0, 10_000.0, 0.0);
        let b = Vec3::new(3_000.0, 0.0, 0.0);
        let ab = atmo.transmittance(a, b);
        let ba = atmo.transmittance(b, a);
        assert!((ab - ba).abs().max_element() < 0.02, "{ab:?} vs {ba:?}");
    }

    #[test]
    fn test_sun_below_horizon_gives_no_direct_light() {
        let atmo = PrecomputedAtmosphere::new(small_config()).unwrap();
        let irr = atmo.sun_sky_irradiance(Vec3::ZERO, Vec3::ZERO, -Vec3::Y);
        assert_eq!(irr.sun, Vec3::ZERO);
        assert_eq!(irr.sky, Vec3::ZERO);
    }

    #[test]
    fn test_inscatter_grows_with_path_length() {
        let atmo = PrecomputedAtmosphere::new(small_config()).unwrap();
        let camera = Vec3::new(0.0, 500.0, 0.0);
        let dir = Vec3::new(0.0, -0.3, -1.0).normalize();
        let sun = Vec3::new(0.0, 1.0, 1.0).normalize();
        let short = atmo.transmittance_and_inscatter(camera, camera + dir * 300.0, sun);
        let long = atmo.transmittance_and_inscatter(camera, camera + dir * 1_500.0, sun);
        assert!(long.inscatter.z > short.inscatter.z, "{:?} vs {:?}", long.inscatter, short.inscatter);
        assert!(short.inscatter.min_element() >= 0.0);
        assert!(long.transmittance.z < short.transmittance.z);
    }

    #[test]
    fn test_unit_range_round_trip() {
        for i in 0..=10 {
            let x = i as f32 / 10.0;
            assert!((from_unit_range(to_unit_range(x, 64), 64) - x).abs() < 1e-5);
        }
    }
}

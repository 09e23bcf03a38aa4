//! Per-frame light aggregation
//!
//! [`LightManager::update_info`] packs every collected light into flat
//! arrays in the camera's view space. Semantic accessors read those arrays
//! directly; nothing is recomputed per draw. Within each light type the
//! shadow-casting lights come first, so shadow array index `i` and light
//! index `i` refer to the same light.

use super::{Light, LightKind, ShadowOptions};
use crate::foundation::math::{transform_point, transform_vector, translation_of, Mat4, Vec3};
use crate::render::camera::Camera;
use crate::render::gpu::GpuTexture;
use crate::scene::NodeId;

/// Light counts that select a shader variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LightCounts {
    /// Any ambient light present
    pub ambient: bool,
    /// Directional lights
    pub directional: usize,
    /// Directional lights with a shadow map
    pub directional_shadows: usize,
    /// Point lights
    pub point: usize,
    /// Spot lights
    pub spot: usize,
    /// Spot lights with a shadow map
    pub spot_shadows: usize,
}

impl LightCounts {
    /// Whether there is any light at all
    pub fn any(&self) -> bool {
        self.ambient || self.directional > 0 || self.point > 0 || self.spot > 0
    }
}

/// A light that renders a shadow map this frame
#[derive(Debug, Clone)]
pub struct ShadowCaster {
    /// Node carrying the light
    pub node: NodeId,
    /// Camera used for the depth pass
    pub camera: Camera,
    /// Shadow settings
    pub options: ShadowOptions,
    /// Resolved map size
    pub map_size: u32,
    /// Depth texture written by the shadow pass
    pub map: Option<GpuTexture>,
}

#[derive(Debug, Clone)]
struct LightEntry {
    node: NodeId,
    light: Light,
    world: Mat4,
}

/// Packed directional light uniforms
#[derive(Debug, Clone, Default)]
pub struct DirectionalLightArrays {
    /// RGB per light
    pub colors: Vec<f32>,
    /// View-space direction per light
    pub infos: Vec<f32>,
    /// Shadow map per shadowed light
    pub shadow_maps: Vec<Option<GpuTexture>>,
    /// Map width and height per shadowed light
    pub shadow_map_sizes: Vec<f32>,
    /// Depth bias per shadowed light
    pub shadow_bias: Vec<f32>,
    /// World-to-light-clip matrix per shadowed light, column-major
    pub space_matrices: Vec<f32>,
}

/// Packed point light uniforms
#[derive(Debug, Clone, Default)]
pub struct PointLightArrays {
    /// View-space position per light
    pub positions: Vec<f32>,
    /// RGB per light
    pub colors: Vec<f32>,
    /// Constant, linear and quadratic attenuation per light
    pub infos: Vec<f32>,
}

/// Packed spot light uniforms
#[derive(Debug, Clone, Default)]
pub struct SpotLightArrays {
    /// View-space position per light
    pub positions: Vec<f32>,
    /// View-space direction per light
    pub directions: Vec<f32>,
    /// RGB per light
    pub colors: Vec<f32>,
    /// Cosines of inner and outer cutoff per light
    pub cutoffs: Vec<f32>,
    /// Constant, linear and quadratic attenuation per light
    pub infos: Vec<f32>,
    /// Shadow map per shadowed light
    pub shadow_maps: Vec<Option<GpuTexture>>,
    /// Map width and height per shadowed light
    pub shadow_map_sizes: Vec<f32>,
    /// Depth bias per shadowed light
    pub shadow_bias: Vec<f32>,
    /// World-to-light-clip matrix per shadowed light, column-major
    pub space_matrices: Vec<f32>,
}

/// Collects lights and exposes them as shader-ready arrays
#[derive(Debug, Default)]
pub struct LightManager {
    entries: Vec<LightEntry>,
    casters: Vec<ShadowCaster>,
    counts: LightCounts,
    /// Sum of ambient light colors
    pub ambient_color: [f32; 3],
    /// Directional light arrays
    pub directional: DirectionalLightArrays,
    /// Point light arrays
    pub point: PointLightArrays,
    /// Spot light arrays
    pub spot: SpotLightArrays,
}

fn attenuation(range: f32) -> [f32; 3] {
    let range = range.max(f32::EPSILON);
    [1.0, 4.5 / range, 75.0 / (range * range)]
}

/// World matrix of an observer at `eye` looking along `direction`
fn look_along(eye: Vec3, direction: Vec3) -> Mat4 {
    let up = if direction.cross(&Vec3::y()).norm_squared() < 1e-6 { Vec3::z() } else { Vec3::y() };
    let back = -direction;
    nalgebra::Isometry3::face_towards(&eye.into(), &(eye + back).into(), &up).to_homogeneous()
}

impl LightManager {
    /// Empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the lights of the previous frame
    pub fn reset(&mut self) {
        self.entries.clear();
        self.casters.clear();
        self.counts = LightCounts::default();
    }

    /// Register a light with its node's world matrix
    pub fn add(&mut self, node: NodeId, light: Light, world: Mat4) {
        self.entries.push(LightEntry { node, light, world });
    }

    /// Number of collected lights
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no light was collected
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Light counts as of the last `update_info`
    pub fn counts(&self) -> LightCounts {
        self.counts
    }

    /// Shadow casters as of the last `update_shadow_cameras`
    pub fn shadow_casters(&self) -> &[ShadowCaster] {
        &self.casters
    }

    /// Attach the rendered depth texture to a caster
    pub fn set_shadow_map(&mut self, caster: usize, map: GpuTexture) {
        if let Some(caster) = self.casters.get_mut(caster) {
            caster.map = Some(map);
        }
    }

    /// Sort shadowed lights first and build their shadow cameras
    pub fn update_shadow_cameras(&mut self, default_map_size: u32) {
        self.entries.sort_by_key(|entry| entry.light.shadow.is_none());
        self.casters.clear();

        for entry in &self.entries {
            let Some(options) = entry.light.shadow else { continue };
            let eye = translation_of(&entry.world);
            let camera = match entry.light.kind {
                LightKind::Directional { direction } => {
                    let e = options.extent;
                    let mut camera = Camera::orthographic(-e, e, -e, e, 0.1, options.far);
                    let direction = transform_vector(&entry.world, &direction).normalize();
                    camera.update_view_projection_matrix(&look_along(eye, direction));
                    camera
                }
                LightKind::Spot { direction, outer_cutoff, .. } => {
                    let mut camera = Camera::perspective((outer_cutoff * 2.0).min(170.0), 1.0, 0.1, options.far);
                    let direction = transform_vector(&entry.world, &direction).normalize();
                    camera.update_view_projection_matrix(&look_along(eye, direction));
                    camera
                }
                LightKind::Ambient | LightKind::Point { .. } => continue,
            };
            let map_size = if options.map_size == 0 { default_map_size } else { options.map_size };
            self.casters.push(ShadowCaster { node: entry.node, camera, options, map_size, map: None });
        }
        log::trace!("{} shadow caster(s) this frame", self.casters.len());
    }

    /// Pack all lights into view-space arrays for `camera`
    pub fn update_info(&mut self, camera: &Camera) {
        let view = camera.view_matrix();
        let mut counts = LightCounts::default();
        let mut ambient = [0.0; 3];
        let mut directional = DirectionalLightArrays::default();
        let mut point = PointLightArrays::default();
        let mut spot = SpotLightArrays::default();

        for entry in &self.entries {
            let radiance = entry.light.radiance();
            let rgb = [radiance.r, radiance.g, radiance.b];
            let caster = self.casters.iter().find(|caster| caster.node == entry.node);
            match entry.light.kind {
                LightKind::Ambient => {
                    counts.ambient = true;
                    for (sum, c) in ambient.iter_mut().zip(rgb) {
                        *sum += c;
                    }
                }
                LightKind::Directional { direction } => {
                    counts.directional += 1;
                    let world_dir = transform_vector(&entry.world, &direction);
                    let view_dir = transform_vector(view, &world_dir).normalize();
                    directional.colors.extend(rgb);
                    directional.infos.extend(view_dir.iter());
                    if let Some(caster) = caster {
                        counts.directional_shadows += 1;
                        push_shadow(
                            caster,
                            &mut directional.shadow_maps,
                            &mut directional.shadow_map_sizes,
                            &mut directional.shadow_bias,
                            &mut directional.space_matrices,
                        );
                    }
                }
                LightKind::Point { range } => {
                    counts.point += 1;
                    let position = transform_point(view, &translation_of(&entry.world));
                    point.positions.extend(position.iter());
                    point.colors.extend(rgb);
                    point.infos.extend(attenuation(range));
                }
                LightKind::Spot { direction, range, cutoff, outer_cutoff } => {
                    counts.spot += 1;
                    let position = transform_point(view, &translation_of(&entry.world));
                    let world_dir = transform_vector(&entry.world, &direction);
                    let view_dir = transform_vector(view, &world_dir).normalize();
                    spot.positions.extend(position.iter());
                    spot.directions.extend(view_dir.iter());
                    spot.colors.extend(rgb);
                    spot.cutoffs.extend([cutoff.to_radians().cos(), outer_cutoff.to_radians().cos()]);
                    spot.infos.extend(attenuation(range));
                    if let Some(caster) = caster {
                        counts.spot_shadows += 1;
                        push_shadow(
                            caster,
                            &mut spot.shadow_maps,
                            &mut spot.shadow_map_sizes,
                            &mut spot.shadow_bias,
                            &mut spot.space_matrices,
                        );
                    }
                }
            }
        }

        self.counts = counts;
        self.ambient_color = ambient;
        self.directional = directional;
        self.point = point;
        self.spot = spot;
    }
}

#[allow(clippy::cast_precision_loss)]
fn push_shadow(
    caster: &ShadowCaster,
    maps: &mut Vec<Option<GpuTexture>>,
    sizes: &mut Vec<f32>,
    bias: &mut Vec<f32>,
    matrices: &mut Vec<f32>,
) {
    maps.push(caster.map);
    sizes.extend([caster.map_size as f32, caster.map_size as f32]);
    bias.push(caster.options.bias);
    matrices.extend(caster.camera.view_projection_matrix().iter());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::texture::Color;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut map = SlotMap::<NodeId, ()>::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn camera_at_origin() -> Camera {
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        camera.update_view_projection_matrix(&Mat4::identity());
        camera
    }

    #[test]
    fn test_counts_and_ambient_sum() {
        let nodes = ids(4);
        let mut lights = LightManager::new();
        lights.add(nodes[0], Light::ambient(Color::rgb(0.1, 0.1, 0.1), 1.0), Mat4::identity());
        lights.add(nodes[1], Light::ambient(Color::rgb(0.2, 0.0, 0.0), 1.0), Mat4::identity());
        lights.add(nodes[2], Light::directional(-Vec3::y(), Color::WHITE, 1.0), Mat4::identity());
        lights.add(nodes[3], Light::point(Color::WHITE, 2.0, 10.0), Mat4::identity());
        lights.update_info(&camera_at_origin());

        let counts = lights.counts();
        assert!(counts.ambient);
        assert_eq!(counts.directional, 1);
        assert_eq!(counts.point, 1);
        assert_eq!(counts.spot, 0);
        assert_relative_eq!(lights.ambient_color[0], 0.3, epsilon = 1e-6);
        assert_eq!(lights.point.colors, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_directions_in_view_space() {
        let nodes = ids(1);
        let mut lights = LightManager::new();
        lights.add(nodes[0], Light::directional(Vec3::new(0.0, 0.0, -1.0), Color::WHITE, 1.0), Mat4::identity());

        // camera rotated to look down +X
        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        camera.update_view_projection_matrix(&Mat4::from_euler_angles(0.0, -std::f32::consts::FRAC_PI_2, 0.0));
        lights.update_info(&camera);

        let d = &lights.directional.infos;
        assert_relative_eq!(Vec3::new(d[0], d[1], d[2]), Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_point_position_in_view_space() {
        let nodes = ids(1);
        let mut lights = LightManager::new();
        let world = Mat4::new_translation(&Vec3::new(0.0, 0.0, -3.0));
        lights.add(nodes[0], Light::point(Color::WHITE, 1.0, 10.0), world);

        let mut camera = Camera::perspective(60.0, 1.0, 0.1, 100.0);
        camera.update_view_projection_matrix(&Mat4::new_translation(&Vec3::new(0.0, 0.0, 2.0)));
        lights.update_info(&camera);
        assert_relative_eq!(lights.point.positions[2], -5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_shadowed_lights_packed_first() {
        let nodes = ids(2);
        let mut lights = LightManager::new();
        lights.add(nodes[0], Light::directional(-Vec3::y(), Color::rgb(1.0, 0.0, 0.0), 1.0), Mat4::identity());
        lights.add(
            nodes[1],
            Light::directional(-Vec3::y(), Color::rgb(0.0, 1.0, 0.0), 1.0).with_shadow(ShadowOptions::default()),
            Mat4::identity(),
        );
        lights.update_shadow_cameras(512);
        assert_eq!(lights.shadow_casters().len(), 1);
        assert_eq!(lights.shadow_casters()[0].map_size, 512);

        lights.update_info(&camera_at_origin());
        assert_eq!(lights.counts().directional_shadows, 1);
        // green (shadowed) light first
        assert_eq!(&lights.directional.colors[..3], &[0.0, 1.0, 0.0]);
        assert_eq!(lights.directional.space_matrices.len(), 16);
        assert_eq!(lights.directional.shadow_map_sizes, vec![512.0, 512.0]);
    }

    #[test]
    fn test_shadow_camera_looks_along_light() {
        let nodes = ids(1);
        let mut lights = LightManager::new();
        let light = Light::directional(Vec3::new(0.0, 0.0, -1.0), Color::WHITE, 1.0)
            .with_shadow(ShadowOptions { extent: 5.0, ..Default::default() });
        lights.add(nodes[0], light, Mat4::new_translation(&Vec3::new(0.0, 0.0, 10.0)));
        lights.update_shadow_cameras(1024);

        let camera = &lights.shadow_casters()[0].camera;
        let in_view = transform_point(camera.view_matrix(), &Vec3::zeros());
        assert_relative_eq!(in_view, Vec3::new(0.0, 0.0, -10.0), epsilon = 1e-4);
    }

    #[test]
    fn test_reset_clears_frame() {
        let nodes = ids(1);
        let mut lights = LightManager::new();
        lights.add(nodes[0], Light::ambient(Color::WHITE, 1.0), Mat4::identity());
        lights.reset();
        lights.update_info(&camera_at_origin());
        assert!(lights.is_empty());
        assert!(!lights.counts().any());
    }
}

//! Frame renderer
//!
//! [`Renderer::render`] walks one frame through a fixed sequence of phases:
//!
//! 1. `BeginRender` clears the default framebuffer and resets the counters.
//! 2. `CollectRenderList` refreshes world matrices, gathers lights and
//!    visible meshes, uploads changed vertex data and sorts the list.
//! 3. `ShadowPasses` draws shadow-casting meshes into one depth map per
//!    shadowed light, with the light's camera swapped in.
//! 4. `MainPass` draws opaque items, then transparent ones.
//! 5. `EndRender` closes the frame; the next `render` starts over.
//!
//! Draw and face counters cover the main pass only.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::config::RendererConfig;
use crate::foundation::logging;
use crate::foundation::math::{transform_point, translation_of};
use crate::render::buffer::{BufferCache, BufferSlot};
use crate::render::camera::Camera;
use crate::render::error::{RenderError, RenderResult};
use crate::render::geometry::{AttributeKind, Geometry, GeometryId};
use crate::render::gpu::{
    BufferTarget, Capability, ClearMask, Gpu, GpuFramebuffer, GpuState, GpuTexture,
};
use crate::render::lighting::LightManager;
use crate::render::material::{LightModel, Material, MaterialKind, RenderFlags, RenderOptions};
use crate::render::render_list::{RenderItem, RenderList};
use crate::render::semantic::{DrawItem, RenderContext, SemanticRegistry, SemanticValue};
use crate::render::shader::{Program, ShaderCache};
use crate::render::texture::{TextureFormat, TextureId, TextureTarget};
use crate::render::texture_cache::TextureCache;
use crate::scene::{FogMode, NodeContent, NodeId, Scene, SceneNode, TraverseFlow};
use crate::warn_once;

const CONTEXT_LOST_WARNING: &str = "renderer_context_lost";

/// Where the renderer is within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderPhase {
    /// No frame rendered yet, or the context was just restored
    #[default]
    Idle,
    /// Clearing the framebuffer
    BeginRender,
    /// Gathering and sorting meshes and lights
    CollectRenderList,
    /// Rendering shadow maps
    ShadowPasses,
    /// Drawing the scene
    MainPass,
    /// Frame finished
    EndRender,
}

/// Counters of the last frame's main pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderInfo {
    /// Draw calls issued
    pub draw_count: usize,
    /// Primitives submitted
    pub face_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Pass {
    Shadow,
    Main,
}

#[derive(Debug, Clone, Copy)]
struct ShadowTarget {
    framebuffer: GpuFramebuffer,
    texture: GpuTexture,
    size: u32,
}

/// Retained-mode scene renderer
pub struct Renderer {
    config: RendererConfig,
    state: GpuState,
    shaders: ShaderCache,
    semantics: SemanticRegistry,
    buffers: BufferCache,
    textures: TextureCache,
    lights: LightManager,
    render_list: RenderList,
    depth_material: Material,
    shadow_targets: HashMap<NodeId, ShadowTarget>,
    programs_in_use: HashMap<(NodeId, Pass), Rc<Program>>,
    viewport: [u32; 2],
    info: RenderInfo,
    phase: RenderPhase,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("phase", &self.phase)
            .field("info", &self.info)
            .field("viewport", &self.viewport)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Renderer drawing through `gpu`
    ///
    /// An invalid configuration is replaced by the defaults.
    pub fn new(gpu: Box<dyn Gpu>, config: RendererConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                log::warn!("Invalid renderer config, using defaults: {}", err);
                RendererConfig::default()
            }
        };
        log::info!(
            "Renderer created (frustum culling: {}, texture units: {}, shadow map size: {})",
            config.frustum_culling,
            config.max_texture_units,
            config.default_shadow_map_size
        );

        Self {
            config,
            state: GpuState::new(gpu),
            shaders: ShaderCache::new(),
            semantics: SemanticRegistry::standard(),
            buffers: BufferCache::new(),
            textures: TextureCache::new(),
            lights: LightManager::new(),
            render_list: RenderList::new(),
            depth_material: Material::depth(),
            shadow_targets: HashMap::new(),
            programs_in_use: HashMap::new(),
            viewport: [1, 1],
            info: RenderInfo::default(),
            phase: RenderPhase::Idle,
        }
    }

    /// Active settings
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// GPU state cache
    pub fn state(&self) -> &GpuState {
        &self.state
    }

    /// Shader variants built so far
    pub fn shaders(&self) -> &ShaderCache {
        &self.shaders
    }

    /// Semantic table, for registering custom semantics
    pub fn semantics_mut(&mut self) -> &mut SemanticRegistry {
        &mut self.semantics
    }

    /// Sorted items of the last frame
    pub fn render_list(&self) -> &RenderList {
        &self.render_list
    }

    /// Counters of the last frame
    pub fn info(&self) -> RenderInfo {
        self.info
    }

    /// Current phase
    pub fn phase(&self) -> RenderPhase {
        self.phase
    }

    /// Size of the default framebuffer
    pub fn viewport(&self) -> [u32; 2] {
        self.viewport
    }

    /// Resize the main pass viewport
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = [width.max(1), height.max(1)];
    }

    /// Render `scene` as seen from the camera at `camera`
    ///
    /// Fails with [`RenderError::ContextLost`] until
    /// [`Renderer::on_context_restored`] is called once the GPU reports a
    /// lost context.
    pub fn render(&mut self, scene: &mut Scene, camera: NodeId) -> RenderResult<()> {
        if self.state.gpu().is_context_lost() {
            warn_once!(CONTEXT_LOST_WARNING, "GPU context lost, skipping frames until it is restored");
            return Err(RenderError::ContextLost);
        }

        let result = self.render_frame(scene, camera);
        enter(&mut self.phase, RenderPhase::EndRender);
        if let Err(err) = &result {
            log::error!("Frame aborted: {}", err);
        }
        result
    }

    fn render_frame(&mut self, scene: &mut Scene, camera_node: NodeId) -> RenderResult<()> {
        enter(&mut self.phase, RenderPhase::BeginRender);
        self.begin_render();

        enter(&mut self.phase, RenderPhase::CollectRenderList);
        let camera = update_camera(scene, camera_node)?;
        self.collect(scene, &camera);
        self.release_orphans(scene);
        self.prepare_shadow_maps();
        self.lights.update_info(&camera);
        for item in self.render_list.iter() {
            if let Some(geometry) = scene.geometries.get_mut(item.geometry) {
                self.buffers.sync(&mut self.state, item.geometry, geometry);
            }
        }

        let scene: &Scene = scene;
        let Self {
            config,
            state,
            shaders,
            semantics,
            buffers,
            textures,
            lights,
            render_list,
            depth_material,
            shadow_targets,
            programs_in_use,
            viewport,
            info,
            phase,
        } = self;
        let lights: &LightManager = lights;
        let mut context = RenderContext::new(camera, lights, state, textures, &scene.textures, config)
            .with_fog(scene.fog)
            .with_viewport(viewport[0], viewport[1]);
        let mut drawer = Drawer { shaders, semantics, buffers, programs_in_use };

        enter(phase, RenderPhase::ShadowPasses);
        for caster in lights.shadow_casters() {
            let Some(target) = shadow_targets.get(&caster.node).copied() else { continue };
            let mut scope = context.scoped_camera(caster.camera.clone());
            let state = scope.state();
            state.bind_framebuffer(Some(target.framebuffer));
            state.viewport(0, 0, target.size, target.size);
            state.depth_mask(true);
            state.gpu_mut().clear(ClearMask::DEPTH);
            for item in render_list.shadow_casters() {
                drawer.draw(&mut *scope, scene, item, depth_material, Pass::Shadow)?;
            }
            scope.state().restore_framebuffer();
        }

        enter(phase, RenderPhase::MainPass);
        context.state().bind_system_framebuffer();
        context.state().viewport(0, 0, viewport[0], viewport[1]);
        for item in render_list.opaque().iter().chain(render_list.transparent()) {
            let Some(material) = scene.material(item.material) else { continue };
            if let Some(faces) = drawer.draw(&mut context, scene, item, material, Pass::Main)? {
                info.draw_count += 1;
                info.face_count += faces;
            }
        }
        log::trace!("Frame drew {} mesh(es), {} face(s)", info.draw_count, info.face_count);
        Ok(())
    }

    fn begin_render(&mut self) {
        self.info = RenderInfo::default();
        let [width, height] = self.viewport;
        let state = &mut self.state;
        state.bind_system_framebuffer();
        state.viewport(0, 0, width, height);
        state.color_mask([true; 4]);
        state.depth_mask(true);
        state.clear_color(self.config.clear_color);
        state.gpu_mut().clear(ClearMask::COLOR | ClearMask::DEPTH);
    }

    fn collect(&mut self, scene: &Scene, camera: &Camera) {
        self.lights.reset();
        self.render_list.clear();

        let frustum = camera.frustum();
        let view = *camera.view_matrix();
        let culling = self.config.frustum_culling;
        let lights = &mut self.lights;
        let list = &mut self.render_list;
        let mut culled = 0_usize;

        scene.graph.traverse(scene.graph.root(), |id, node| {
            if !node.visible {
                return TraverseFlow::SkipChildren;
            }
            let world = node.cached_world_matrix();
            match &node.content {
                NodeContent::Light(light) => lights.add(id, *light, world),
                NodeContent::Mesh(mesh) => {
                    let (Some(geometry), Some(material)) = (scene.geometry(mesh.geometry), scene.material(mesh.material))
                    else {
                        warn_once!(
                            format!("dangling_mesh_{id:?}"),
                            "Mesh {:?} references a removed geometry or material",
                            node.name
                        );
                        return TraverseFlow::Continue;
                    };
                    let bounds = geometry.bounds().map(|aabb| aabb.transformed(&world));
                    if culling && node.frustum_test {
                        if let Some(bounds) = &bounds {
                            if !frustum.intersects_aabb(bounds) {
                                culled += 1;
                                return TraverseFlow::Continue;
                            }
                        }
                    }
                    let center = bounds.map_or_else(|| translation_of(&world), |aabb| aabb.center());
                    list.push(RenderItem {
                        node: id,
                        geometry: mesh.geometry,
                        material: mesh.material,
                        world,
                        local: node.transform.local_matrix(),
                        render_order: node.render_order + material.render_order,
                        material_key: material.render_key(),
                        depth: -transform_point(&view, &center).z,
                        transparent: material.transparent(),
                        cast_shadows: material.cast_shadows,
                    });
                }
                NodeContent::Group | NodeContent::Camera(_) => {}
            }
            TraverseFlow::Continue
        });

        list.sort(self.config.sort_transparent);
        log::trace!(
            "Collected {} mesh(es), {} light(s), culled {}",
            list.len(),
            lights.len(),
            culled
        );
    }

    /// Build shadow cameras and make sure every caster has a depth map
    fn prepare_shadow_maps(&mut self) {
        self.lights.update_shadow_cameras(self.config.default_shadow_map_size);
        let wanted: Vec<(NodeId, u32)> =
            self.lights.shadow_casters().iter().map(|caster| (caster.node, caster.map_size)).collect();

        let stale: Vec<NodeId> = self
            .shadow_targets
            .iter()
            .filter(|(node, target)| !wanted.contains(&(**node, target.size)))
            .map(|(node, _)| *node)
            .collect();
        for node in stale {
            if let Some(target) = self.shadow_targets.remove(&node) {
                self.state.delete_framebuffer(target.framebuffer);
                self.state.delete_texture(target.texture);
            }
        }

        for (index, (node, size)) in wanted.into_iter().enumerate() {
            let target = match self.shadow_targets.get(&node) {
                Some(target) => *target,
                None => {
                    let target = self.create_shadow_target(size);
                    self.shadow_targets.insert(node, target);
                    target
                }
            };
            self.lights.set_shadow_map(index, target.texture);
        }
    }

    fn create_shadow_target(&mut self, size: u32) -> ShadowTarget {
        let state = &mut self.state;
        let texture = state.gpu_mut().create_texture();
        state.bind_texture(TextureTarget::Texture2D, Some(texture));
        state.gpu_mut().tex_image(TextureTarget::Texture2D, TextureFormat::Depth32F, size, size, None);

        let framebuffer = state.gpu_mut().create_framebuffer();
        state.bind_framebuffer(Some(framebuffer));
        state.gpu_mut().framebuffer_depth_texture(texture);
        state.restore_framebuffer();

        log::debug!("Created {}x{} shadow map", size, size);
        ShadowTarget { framebuffer, texture, size }
    }

    /// Let go of GPU objects whose scene counterpart is gone
    ///
    /// Programs held for removed mesh nodes become reclaimable; textures of
    /// removed assets are deleted.
    fn release_orphans(&mut self, scene: &Scene) {
        let before = self.programs_in_use.len();
        self.programs_in_use.retain(|(owner, _), program| {
            let alive = scene.graph.node(*owner).is_some_and(|node| matches!(node.content, NodeContent::Mesh(_)));
            if !alive {
                program.release();
            }
            alive
        });
        let released = before - self.programs_in_use.len();
        if released > 0 {
            log::debug!("Released {} program reference(s) of removed meshes", released);
        }
        self.textures.prune(&mut self.state, &scene.textures);
    }

    /// Drop the programs held for a mesh node
    ///
    /// They are deleted by the next [`Renderer::reclaim`] if nothing else
    /// uses them.
    pub fn release_mesh(&mut self, node: NodeId) {
        self.programs_in_use.retain(|(owner, _), program| {
            if *owner == node {
                program.release();
                false
            } else {
                true
            }
        });
    }

    /// Delete the GPU buffers of a geometry
    pub fn release_geometry(&mut self, id: GeometryId) {
        self.buffers.release(&mut self.state, id);
    }

    /// Delete the GPU copy of a texture
    pub fn release_texture(&mut self, id: TextureId) {
        self.textures.release(&mut self.state, id);
    }

    /// Delete programs no mesh holds; returns how many were deleted
    pub fn reclaim(&mut self) -> usize {
        self.shaders.reclaim(&mut self.state)
    }

    /// Resume on a fresh context
    ///
    /// Every GPU object died with the old context; shaders, buffers and
    /// textures are rebuilt on demand by the next frame.
    pub fn on_context_restored(&mut self, gpu: Box<dyn Gpu>) {
        log::info!("GPU context restored, rebuilding GPU resources on demand");
        self.state.replace_gpu(gpu);
        self.shaders.reset();
        self.buffers.reset();
        self.textures.reset();
        self.shadow_targets.clear();
        self.programs_in_use.clear();
        logging::forget_once(CONTEXT_LOST_WARNING);
        self.phase = RenderPhase::Idle;
    }
}

fn enter(phase: &mut RenderPhase, next: RenderPhase) {
    log::trace!("Render phase {:?} -> {:?}", phase, next);
    *phase = next;
}

/// Refresh world matrices and the camera's view-projection
fn update_camera(scene: &mut Scene, node: NodeId) -> RenderResult<Camera> {
    scene.graph.update_all(false);
    scene.graph.resolve_stale();
    let world = scene.graph.world_matrix(node)?;
    let camera = scene
        .graph
        .node_mut(node)
        .and_then(SceneNode::camera_mut)
        .ok_or(RenderError::NotACamera(node))?;
    camera.update_view_projection_matrix(&world);
    Ok(camera.clone())
}

/// Options selecting the shader variant of one draw
fn mesh_render_options(context: &RenderContext<'_>, geometry: &Geometry, material: &Material) -> RenderOptions {
    let mut options = RenderOptions::new();
    material.render_options(&mut options, context.assets());
    if options.has(RenderFlags::DEPTH_ONLY) {
        return options;
    }

    let has = |kind| geometry.attribute(kind).is_some();
    options.set(RenderFlags::NORMAL, has(AttributeKind::Normal));
    options.set(RenderFlags::TANGENT, has(AttributeKind::Tangent));
    options.set(RenderFlags::TEXCOORD0, has(AttributeKind::Uv0));
    options.set(RenderFlags::TEXCOORD1, has(AttributeKind::Uv1));
    options.set(RenderFlags::VERTEX_COLOR, has(AttributeKind::Color));

    if let MaterialKind::Basic { light_model } = material.kind {
        let counts = context.lights().counts();
        if light_model != LightModel::None && counts.any() {
            options.flags.insert(RenderFlags::LIGHT);
            options.lights = counts;
        }
        match context.fog().map(|fog| fog.mode) {
            Some(FogMode::Linear { .. }) => options.flags.insert(RenderFlags::FOG_LINEAR),
            Some(FogMode::Exp { .. }) => options.flags.insert(RenderFlags::FOG_EXP),
            None => {}
        }
    }

    let config = context.config();
    options.set(RenderFlags::HDR, material.use_hdr && config.use_hdr);
    options.set(RenderFlags::GAMMA_CORRECTION, material.gamma_correction || config.gamma_correction);
    options
}

fn apply_material_state(state: &mut GpuState, material: &Material) {
    state.set_capability(Capability::DepthTest, material.depth_test);
    if material.depth_test {
        state.depth_func(material.depth_func);
    }
    state.depth_mask(material.depth_mask());
    state.depth_range(material.depth_range[0], material.depth_range[1]);

    state.set_capability(Capability::CullFace, material.cull_face());
    if material.cull_face() {
        state.cull_face(material.cull_face_type());
    }

    state.set_capability(Capability::Blend, material.blend);
    if material.blend {
        state.blend_func_separate(
            material.blend_src,
            material.blend_dst,
            material.blend_src_alpha,
            material.blend_dst_alpha,
        );
        state.blend_equation_separate(material.blend_equation, material.blend_equation_alpha);
    }
}

/// Caches a pass needs besides the render context
struct Drawer<'r> {
    shaders: &'r mut ShaderCache,
    semantics: &'r SemanticRegistry,
    buffers: &'r BufferCache,
    programs_in_use: &'r mut HashMap<(NodeId, Pass), Rc<Program>>,
}

impl Drawer<'_> {
    /// Draw one item with `material`; returns the faces drawn, `None` if skipped
    fn draw(
        &mut self,
        context: &mut RenderContext<'_>,
        scene: &Scene,
        item: &RenderItem,
        material: &Material,
        pass: Pass,
    ) -> RenderResult<Option<usize>> {
        let Some(geometry) = scene.geometry(item.geometry) else {
            warn_once!(
                format!("missing_geometry_{:?}", item.geometry),
                "Mesh {:?} references a removed geometry",
                item.node
            );
            return Ok(None);
        };

        let options = mesh_render_options(context, geometry, material);
        let shader = match &material.shader {
            Some(custom) => self.shaders.get_custom_shader(
                context.state(),
                &custom.vertex,
                &custom.fragment,
                &options.header(),
                custom.cache_key.as_deref(),
                custom.use_header_cache,
            )?,
            None => self.shaders.get_shader(context.state(), &options)?,
        };
        let program = Rc::clone(shader.program());
        self.hold_program(item.node, pass, &program);

        let state = context.state();
        apply_material_state(state, material);
        state.use_program(Some(program.id()));

        context.begin_draw();
        let draw_item = DrawItem { world: item.world, local: item.local, geometry, material };
        self.bind_attributes(context, &program, item.geometry, &draw_item);
        self.upload_uniforms(context, &program, &draw_item);
        self.submit(context.state(), item.geometry, geometry);
        Ok(Some(geometry.face_count()))
    }

    fn hold_program(&mut self, node: NodeId, pass: Pass, program: &Rc<Program>) {
        if let Some(current) = self.programs_in_use.get(&(node, pass)) {
            if Rc::ptr_eq(current, program) {
                return;
            }
        }
        program.retain();
        if let Some(previous) = self.programs_in_use.insert((node, pass), Rc::clone(program)) {
            previous.release();
        }
    }

    fn bind_attributes(
        &self,
        context: &mut RenderContext<'_>,
        program: &Program,
        id: GeometryId,
        item: &DrawItem<'_>,
    ) {
        let mut variables: Vec<_> = program.attributes().collect();
        variables.sort_by_key(|variable| variable.location);

        let mut used = HashSet::new();
        for variable in variables {
            let Some(semantic) = item.material.attributes.get(&variable.name) else {
                warn_once!(
                    format!("unmapped_attribute_{}", variable.name),
                    "Attribute {} has no semantic in material {:?}",
                    variable.name,
                    item.material.name
                );
                continue;
            };
            let kind = match self.semantics.resolve(semantic, context, item, variable) {
                Some(SemanticValue::Attribute(kind)) => kind,
                Some(SemanticValue::Uniform(_)) => {
                    warn_once!(
                        format!("uniform_semantic_on_attribute_{semantic}"),
                        "Semantic {} yields a uniform but is mapped to attribute {}",
                        semantic,
                        variable.name
                    );
                    continue;
                }
                None => continue,
            };
            let (Some(attribute), Some(buffer)) =
                (item.geometry.attribute(kind), self.buffers.buffer(id, BufferSlot::Attribute(kind)))
            else {
                warn_once!(
                    format!("missing_attribute_{id:?}_{}", variable.name),
                    "Geometry has no {:?} data for attribute {}",
                    kind,
                    variable.name
                );
                continue;
            };

            let state = context.state();
            state.bind_buffer(BufferTarget::Array, Some(buffer));
            state.enable_vertex_attrib_array(variable.location);
            state.gpu_mut().vertex_attrib_pointer(
                variable.location,
                attribute.size,
                attribute.data_type(),
                attribute.normalized,
                attribute.stride,
                attribute.offset,
            );
            used.insert(variable.location);
        }
        context.state().disable_unused_attributes(&used);
    }

    fn upload_uniforms(&self, context: &mut RenderContext<'_>, program: &Program, item: &DrawItem<'_>) {
        let mut variables: Vec<_> = program.uniforms().collect();
        variables.sort_by_key(|variable| variable.location);

        for variable in variables {
            let Some(semantic) = item.material.uniforms.get(&variable.name) else {
                warn_once!(
                    format!("unmapped_uniform_{}", variable.name),
                    "Uniform {} has no semantic in material {:?}",
                    variable.name,
                    item.material.name
                );
                continue;
            };
            match self.semantics.resolve(semantic, context, item, variable) {
                Some(SemanticValue::Uniform(value)) => context.state().gpu_mut().set_uniform(variable.location, &value),
                Some(SemanticValue::Attribute(_)) => {
                    warn_once!(
                        format!("attribute_semantic_on_uniform_{semantic}"),
                        "Semantic {} yields an attribute but is mapped to uniform {}",
                        semantic,
                        variable.name
                    );
                }
                None => {}
            }
        }
    }

    fn submit(&self, state: &mut GpuState, id: GeometryId, geometry: &Geometry) {
        match (geometry.indices(), self.buffers.buffer(id, BufferSlot::Indices)) {
            (Some(indices), Some(buffer)) => {
                state.bind_buffer(BufferTarget::ElementArray, Some(buffer));
                state.gpu_mut().draw_elements(geometry.mode, indices.real_length(), indices.data_type(), 0);
            }
            _ => state.gpu_mut().draw_arrays(geometry.mode, 0, geometry.vertex_count()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::gpu::{CallLog, GpuCall, HeadlessGpu};
    use crate::render::lighting::{Light, ShadowOptions};
    use crate::render::texture::{Color, Image, MaterialValue, Texture};
    use crate::scene::Fog;
    use approx::assert_relative_eq;

    struct Fixture {
        renderer: Renderer,
        scene: Scene,
        camera: NodeId,
        log: CallLog,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_config(RendererConfig::default())
        }

        fn with_config(config: RendererConfig) -> Self {
            let gpu = HeadlessGpu::new();
            let log = gpu.call_log();
            let mut renderer = Renderer::new(Box::new(gpu), config);
            renderer.set_viewport(800, 600);

            let mut scene = Scene::new();
            let camera = scene.add_camera("camera", Camera::perspective(60.0, 800.0 / 600.0, 0.1, 100.0));
            scene.add_light("sun", Light::directional(Vec3::new(0.0, -1.0, -1.0), Color::rgb(1.0, 1.0, 1.0), 1.0));
            Self { renderer, scene, camera, log }
        }

        fn add_cube(&mut self, material: Material, position: Vec3) -> NodeId {
            let geometry = self.scene.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
            let material = self.scene.add_material(material);
            let node = self.scene.add_mesh("cube", geometry, material);
            self.scene.graph.node_mut(node).unwrap().transform.set_position(position);
            node
        }

        fn render(&mut self) -> RenderResult<()> {
            self.renderer.render(&mut self.scene, self.camera)
        }

        fn count(&self, predicate: impl Fn(&GpuCall) -> bool) -> usize {
            self.log.count(predicate)
        }
    }

    fn draws(call: &GpuCall) -> bool {
        matches!(call, GpuCall::DrawElements { .. } | GpuCall::DrawArrays { .. })
    }

    #[test]
    fn test_lit_cube_draws_once() {
        let mut fixture = Fixture::new();
        fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));

        fixture.render().unwrap();

        let info = fixture.renderer.info();
        assert_eq!(info.draw_count, 1);
        assert_eq!(info.face_count, 12);
        assert_eq!(fixture.renderer.phase(), RenderPhase::EndRender);
        assert_eq!(
            fixture.count(|call| matches!(call, GpuCall::DrawElements { count: 36, .. })),
            1
        );
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::Clear(_))), 1);
    }

    #[test]
    fn test_counters_reset_every_frame() {
        let mut fixture = Fixture::new();
        fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));

        fixture.render().unwrap();
        fixture.render().unwrap();

        assert_eq!(fixture.renderer.info().draw_count, 1);
        assert_eq!(fixture.count(draws), 2);
        // Second frame reuses program and buffers
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::LinkProgram(_))), 1);
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::BufferData { .. })), 4);
    }

    #[test]
    fn test_frustum_culling_skips_offscreen_mesh() {
        let mut fixture = Fixture::new();
        fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));
        fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, 50.0));

        fixture.render().unwrap();
        assert_eq!(fixture.renderer.info().draw_count, 1);

        let mut config = RendererConfig::default();
        config.frustum_culling = false;
        let mut fixture = Fixture::with_config(config);
        fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));
        fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, 50.0));

        fixture.render().unwrap();
        assert_eq!(fixture.renderer.info().draw_count, 2);
    }

    #[test]
    fn test_frustum_test_flag_opts_out_of_culling() {
        let mut fixture = Fixture::new();
        let behind = fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, 50.0));
        fixture.scene.graph.node_mut(behind).unwrap().frustum_test = false;

        fixture.render().unwrap();
        assert_eq!(fixture.renderer.info().draw_count, 1);
    }

    #[test]
    fn test_invisible_subtree_is_skipped() {
        let mut fixture = Fixture::new();
        let group = fixture.scene.add_group("hidden");
        let cube = fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));
        fixture.scene.graph.set_parent(cube, group).unwrap();
        fixture.scene.graph.node_mut(group).unwrap().visible = false;

        fixture.render().unwrap();
        assert_eq!(fixture.renderer.info().draw_count, 0);
        assert_eq!(fixture.count(draws), 0);
    }

    #[test]
    fn test_transparent_drawn_back_to_front_after_opaque() {
        let mut fixture = Fixture::new();
        let mut glass = Material::basic();
        glass.set_transparent(true);
        let near = fixture.add_cube(glass.clone(), Vec3::new(0.0, 0.0, -3.0));
        let far = fixture.add_cube(glass, Vec3::new(0.0, 0.0, -8.0));
        let solid = fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));

        fixture.render().unwrap();

        let list = fixture.renderer.render_list();
        assert_eq!(list.opaque().len(), 1);
        assert_eq!(list.opaque()[0].node, solid);
        let order: Vec<NodeId> = list.transparent().iter().map(|item| item.node).collect();
        assert_eq!(order, vec![far, near]);
        assert_eq!(fixture.renderer.info().draw_count, 3);
        assert!(fixture.count(|call| matches!(call, GpuCall::Enable(Capability::Blend))) >= 1);
    }

    #[test]
    fn test_same_material_shares_program() {
        let mut fixture = Fixture::new();
        fixture.add_cube(Material::basic(), Vec3::new(-1.0, 0.0, -5.0));
        fixture.add_cube(Material::basic(), Vec3::new(1.0, 0.0, -5.0));

        fixture.render().unwrap();

        assert_eq!(fixture.renderer.info().draw_count, 2);
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::LinkProgram(_))), 1);
        assert_eq!(fixture.renderer.shaders().shader_count(), 1);
        // Both cubes use the same program, bound once
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::UseProgram(Some(_)))), 1);
    }

    #[test]
    fn test_different_light_models_build_separate_variants() {
        let mut fixture = Fixture::new();
        fixture.add_cube(Material::basic(), Vec3::new(-1.0, 0.0, -5.0));
        fixture.add_cube(Material::with_light_model(LightModel::Lambert), Vec3::new(1.0, 0.0, -5.0));

        fixture.render().unwrap();
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::LinkProgram(_))), 2);
    }

    #[test]
    fn test_fog_selects_variant() {
        let mut fixture = Fixture::new();
        fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));
        fixture.render().unwrap();

        fixture.scene.fog = Some(Fog {
            color: Color::rgb(0.5, 0.5, 0.5),
            mode: FogMode::Linear { start: 1.0, end: 20.0 },
        });
        fixture.render().unwrap();

        assert_eq!(fixture.renderer.shaders().shader_count(), 2);
    }

    #[test]
    fn test_shadow_pass_binds_and_restores_framebuffer() {
        let mut fixture = Fixture::new();
        let light = Light::directional(Vec3::new(0.0, -1.0, 0.0), Color::rgb(1.0, 1.0, 1.0), 1.0)
            .with_shadow(ShadowOptions { map_size: 256, ..ShadowOptions::default() });
        fixture.scene.add_light("shadowed", light);
        fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));

        fixture.render().unwrap();

        let calls = fixture.log.calls();
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::FramebufferDepthTexture(_))), 1);
        assert!(calls.contains(&GpuCall::Viewport(0, 0, 256, 256)));

        // The shadow draw happens inside the framebuffer, the main draw after restoring
        let positions: Vec<usize> = calls.iter().enumerate().filter(|(_, call)| draws(call)).map(|(i, _)| i).collect();
        assert_eq!(positions.len(), 2);
        let unbind = calls
            .iter()
            .rposition(|call| matches!(call, GpuCall::BindFramebuffer(None)))
            .unwrap();
        assert!(positions[0] < unbind && unbind < positions[1]);

        // Only the main pass is counted
        assert_eq!(fixture.renderer.info().draw_count, 1);

        fixture.render().unwrap();
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::CreateFramebuffer(_))), 1);
    }

    #[test]
    fn test_non_casting_material_skips_shadow_pass() {
        let mut fixture = Fixture::new();
        let light = Light::directional(Vec3::new(0.0, -1.0, 0.0), Color::rgb(1.0, 1.0, 1.0), 1.0)
            .with_shadow(ShadowOptions::default());
        fixture.scene.add_light("shadowed", light);
        let mut material = Material::basic();
        material.cast_shadows = false;
        fixture.add_cube(material, Vec3::new(0.0, 0.0, -5.0));

        fixture.render().unwrap();
        assert_eq!(fixture.count(draws), 1);
    }

    #[test]
    fn test_context_loss_and_restore() {
        let mut gpu = HeadlessGpu::new();
        gpu.lose_context();
        let mut renderer = Renderer::new(Box::new(gpu), RendererConfig::default());
        let mut scene = Scene::new();
        let camera = scene.add_camera("camera", Camera::perspective(60.0, 1.0, 0.1, 100.0));
        let geometry = scene.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
        let material = scene.add_material(Material::basic());
        let cube = scene.add_mesh("cube", geometry, material);
        scene.graph.node_mut(cube).unwrap().transform.set_position(Vec3::new(0.0, 0.0, -5.0));

        assert_eq!(renderer.render(&mut scene, camera), Err(RenderError::ContextLost));

        let fresh = HeadlessGpu::new();
        let log = fresh.call_log();
        renderer.on_context_restored(Box::new(fresh));
        assert_eq!(renderer.phase(), RenderPhase::Idle);

        renderer.render(&mut scene, camera).unwrap();
        assert_eq!(renderer.info().draw_count, 1);
        assert_eq!(log.count(|call| matches!(call, GpuCall::LinkProgram(_))), 1);
        assert_eq!(log.count(|call| matches!(call, GpuCall::BufferData { .. })), 4);
    }

    #[test]
    fn test_non_camera_node_is_rejected() {
        let mut fixture = Fixture::new();
        let cube = fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));

        let result = fixture.renderer.render(&mut fixture.scene, cube);
        assert_eq!(result, Err(RenderError::NotACamera(cube)));
        assert_eq!(fixture.renderer.phase(), RenderPhase::EndRender);
    }

    #[test]
    fn test_link_failure_aborts_frame() {
        let mut gpu = HeadlessGpu::new();
        gpu.fail_next_link("bad varying");
        let mut renderer = Renderer::new(Box::new(gpu), RendererConfig::default());
        let mut scene = Scene::new();
        let camera = scene.add_camera("camera", Camera::perspective(60.0, 1.0, 0.1, 100.0));
        let geometry = scene.add_geometry(Geometry::cuboid(1.0, 1.0, 1.0));
        let material = scene.add_material(Material::basic());
        let cube = scene.add_mesh("cube", geometry, material);
        scene.graph.node_mut(cube).unwrap().transform.set_position(Vec3::new(0.0, 0.0, -5.0));

        let result = renderer.render(&mut scene, camera);
        assert!(matches!(result, Err(RenderError::ProgramLink { ref log }) if log.contains("bad varying")));

        renderer.render(&mut scene, camera).unwrap();
        assert_eq!(renderer.info().draw_count, 1);
    }

    #[test]
    fn test_mesh_below_stopped_cascade_is_drawn_where_it_is() {
        let mut fixture = Fixture::new();
        let a = fixture.scene.add_group("a");
        let b = fixture.scene.graph.add_child(a, SceneNode::new("b")).unwrap();
        fixture.scene.graph.node_mut(b).unwrap().auto_update_child_world_matrix = false;
        let cube = fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));
        fixture.scene.graph.set_parent(cube, b).unwrap();
        fixture.render().unwrap();

        fixture.scene.graph.node_mut(a).unwrap().transform.set_position(Vec3::new(1.0, 0.0, 0.0));
        fixture.render().unwrap();

        let drawn = fixture.renderer.render_list().opaque()[0].world;
        assert_relative_eq!(translation_of(&drawn).x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(translation_of(&drawn).z, -5.0, epsilon = 1e-5);
        assert_eq!(fixture.renderer.info().draw_count, 1);
    }

    #[test]
    fn test_removed_mesh_node_program_is_reclaimed() {
        let mut fixture = Fixture::new();
        let cube = fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));
        fixture.render().unwrap();
        assert_eq!(fixture.renderer.reclaim(), 0);

        fixture.scene.graph.remove(cube).unwrap();
        fixture.render().unwrap();
        assert_eq!(fixture.renderer.info().draw_count, 0);
        assert_eq!(fixture.renderer.reclaim(), 1);
        assert_eq!(fixture.renderer.shaders().shader_count(), 0);
    }

    #[test]
    fn test_removed_texture_is_deleted() {
        let mut fixture = Fixture::new();
        let texture = fixture.scene.add_texture(Texture::from_image(Image { width: 2, height: 2, data: vec![255; 16] }));
        let mut material = Material::basic();
        material.diffuse = MaterialValue::Texture(texture);
        fixture.add_cube(material, Vec3::new(0.0, 0.0, -5.0));
        fixture.render().unwrap();
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::TexImage { .. })), 1);

        fixture.scene.remove_texture(texture);
        fixture.render().unwrap();
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::DeleteTexture(_))), 1);
    }

    #[test]
    fn test_swapped_normals_reach_the_gpu() {
        let mut fixture = Fixture::new();
        let cube = fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));
        fixture.render().unwrap();
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::BufferData { .. })), 4);

        let geometry = match &fixture.scene.graph.node(cube).unwrap().content {
            NodeContent::Mesh(mesh) => mesh.geometry,
            other => panic!("expected a mesh, got {other:?}"),
        };
        fixture
            .scene
            .geometry_mut(geometry)
            .unwrap()
            .set_attribute(AttributeKind::Normal, crate::render::geometry::VertexAttribute::floats(vec![0.0; 72], 3));
        fixture.render().unwrap();
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::BufferData { .. })), 5);
    }

    #[test]
    fn test_released_mesh_program_is_reclaimed() {
        let mut fixture = Fixture::new();
        let cube = fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));
        fixture.render().unwrap();

        assert_eq!(fixture.renderer.reclaim(), 0);

        fixture.renderer.release_mesh(cube);
        assert_eq!(fixture.renderer.reclaim(), 1);
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::DeleteProgram(_))), 1);
        assert_eq!(fixture.renderer.shaders().shader_count(), 0);
    }

    #[test]
    fn test_released_geometry_is_reuploaded() {
        let mut fixture = Fixture::new();
        let cube = fixture.add_cube(Material::basic(), Vec3::new(0.0, 0.0, -5.0));
        fixture.render().unwrap();

        let geometry = fixture.scene.graph.node(cube).unwrap().mesh().unwrap().geometry;
        fixture.renderer.release_geometry(geometry);
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::DeleteBuffer(_))), 4);

        fixture.render().unwrap();
        assert_eq!(fixture.count(|call| matches!(call, GpuCall::BufferData { .. })), 8);
    }

    #[test]
    fn test_invalid_config_falls_back_to_defaults() {
        let mut config = RendererConfig::default();
        config.max_texture_units = 0;
        let renderer = Renderer::new(Box::new(HeadlessGpu::new()), config);
        assert_eq!(renderer.config(), &RendererConfig::default());
    }
}

//! Recording GPU without a graphics context
//!
//! [`HeadlessGpu`] hands out sequential object handles, appends every call
//! to a shared [`CallLog`] and "compiles" shader text with a small
//! preprocessor: `#define`, `#undef`, `#ifdef`, `#ifndef`, `#if`, `#elif`,
//! `#else`, `#endif` and `#error` are honored, then `attribute` and
//! `uniform` declarations of the active text become the program's active
//! variables. Array sizes may name a `#define`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{
    ActiveVariable, BlendEquation, BlendFactor, BufferTarget, Capability, ClearMask, CullFace, DepthFunc, FrontFace,
    Gpu, GpuBuffer, GpuFramebuffer, GpuProgram, GpuShader, GpuTexture, ShaderStage, UniformValue, VariableType,
};
use crate::render::geometry::{DataType, DrawMode};
use crate::render::texture::{TextureFormat, TextureTarget};

/// One recorded GPU call
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum GpuCall {
    CreateBuffer(GpuBuffer),
    DeleteBuffer(GpuBuffer),
    BindBuffer(BufferTarget, Option<GpuBuffer>),
    BufferData { target: BufferTarget, len: usize },
    BufferSubData { target: BufferTarget, byte_offset: usize, len: usize },
    CompileShader(ShaderStage),
    DeleteShader(GpuShader),
    LinkProgram(GpuProgram),
    DeleteProgram(GpuProgram),
    UseProgram(Option<GpuProgram>),
    SetUniform { location: u32, value: UniformValue },
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
    VertexAttribPointer { location: u32, size: u8, data_type: DataType, normalized: bool, stride: usize, offset: usize },
    CreateTexture(GpuTexture),
    DeleteTexture(GpuTexture),
    ActiveTexture(u32),
    BindTexture(TextureTarget, Option<GpuTexture>),
    TexImage { target: TextureTarget, format: TextureFormat, width: u32, height: u32 },
    GenerateMipmap(TextureTarget),
    CreateFramebuffer(GpuFramebuffer),
    DeleteFramebuffer(GpuFramebuffer),
    BindFramebuffer(Option<GpuFramebuffer>),
    FramebufferDepthTexture(GpuTexture),
    Enable(Capability),
    Disable(Capability),
    DepthFunc(DepthFunc),
    DepthMask(bool),
    DepthRange(f32, f32),
    BlendFuncSeparate(BlendFactor, BlendFactor, BlendFactor, BlendFactor),
    BlendEquationSeparate(BlendEquation, BlendEquation),
    CullFace(CullFace),
    FrontFace(FrontFace),
    Viewport(i32, i32, u32, u32),
    ClearColor([f32; 4]),
    ColorMask([bool; 4]),
    Clear(ClearMask),
    DrawElements { mode: DrawMode, count: usize, index_type: DataType, byte_offset: usize },
    DrawArrays { mode: DrawMode, first: usize, count: usize },
}

/// Shared, clonable view of the recorded calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<GpuCall>>>);

impl CallLog {
    fn push(&self, call: GpuCall) {
        self.0.borrow_mut().push(call);
    }

    /// Snapshot of every call so far
    pub fn calls(&self) -> Vec<GpuCall> {
        self.0.borrow().clone()
    }

    /// Number of recorded calls
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Number of calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&GpuCall) -> bool) -> usize {
        self.0.borrow().iter().filter(|call| predicate(call)).count()
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

#[derive(Debug, Clone)]
struct Declaration {
    name: String,
    kind: VariableType,
    size: u32,
}

#[derive(Debug, Clone)]
struct CompiledShader {
    stage: ShaderStage,
    attributes: Vec<Declaration>,
    uniforms: Vec<Declaration>,
}

#[derive(Debug, Clone)]
struct LinkedProgram {
    attributes: Vec<ActiveVariable>,
    uniforms: Vec<ActiveVariable>,
}

/// GPU that records calls instead of rendering
#[derive(Debug, Default)]
pub struct HeadlessGpu {
    log: CallLog,
    next_handle: u32,
    shaders: HashMap<GpuShader, CompiledShader>,
    programs: HashMap<GpuProgram, LinkedProgram>,
    textures: usize,
    pending_link_failure: Option<String>,
    context_lost: bool,
}

impl HeadlessGpu {
    /// New headless GPU with an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on the call log, shared with this GPU
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    /// Make the next `link_program` fail with this info log
    pub fn fail_next_link(&mut self, info_log: &str) {
        self.pending_link_failure = Some(info_log.to_string());
    }

    /// Simulate a lost context
    pub fn lose_context(&mut self) {
        self.context_lost = true;
    }

    /// Number of live programs
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures
    }

    fn next(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    parent: bool,
    active: bool,
    taken: bool,
}

/// Run the preprocessor; returns the active lines and the final defines
fn preprocess(source: &str) -> Result<(Vec<String>, HashMap<String, String>), String> {
    let mut defines = HashMap::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut output = Vec::new();

    for (number, line) in source.lines().enumerate() {
        let active = stack.last().map_or(true, |frame| frame.active);
        let trimmed = line.trim();
        let Some(directive) = trimmed.strip_prefix('#') else {
            if active {
                output.push(trimmed.to_string());
            }
            continue;
        };

        let directive = directive.trim_start();
        let (word, rest) = directive.split_once(char::is_whitespace).unwrap_or((directive, ""));
        let rest = rest.trim();
        match word {
            "ifdef" | "ifndef" | "if" => {
                let condition = match word {
                    "ifdef" => defines.contains_key(rest),
                    "ifndef" => !defines.contains_key(rest),
                    _ => eval_condition(rest, &defines),
                };
                stack.push(Frame { parent: active, active: active && condition, taken: condition });
            }
            "elif" => {
                let frame = stack.last_mut().ok_or_else(|| format!("ERROR: 0:{}: '#elif' without #if", number + 1))?;
                if frame.taken {
                    frame.active = false;
                } else {
                    let condition = eval_condition(rest, &defines);
                    frame.active = frame.parent && condition;
                    frame.taken = condition;
                }
            }
            "else" => {
                let frame = stack.last_mut().ok_or_else(|| format!("ERROR: 0:{}: '#else' without #if", number + 1))?;
                frame.active = frame.parent && !frame.taken;
                frame.taken = true;
            }
            "endif" => {
                stack.pop().ok_or_else(|| format!("ERROR: 0:{}: '#endif' without #if", number + 1))?;
            }
            "define" if active => {
                let (name, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                defines.insert(name.to_string(), value.trim().to_string());
            }
            "undef" if active => {
                defines.remove(rest);
            }
            "error" if active => {
                return Err(format!("ERROR: 0:{}: '#error' : {}", number + 1, rest));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err("ERROR: unterminated conditional directive".to_string());
    }
    Ok((output, defines))
}

fn eval_condition(expression: &str, defines: &HashMap<String, String>) -> bool {
    expression
        .split("||")
        .any(|clause| clause.split("&&").all(|term| eval_term(term.trim(), defines)))
}

fn eval_term(term: &str, defines: &HashMap<String, String>) -> bool {
    let term = term.trim();
    if let Some(inner) = term.strip_prefix('!') {
        return !eval_term(inner, defines);
    }
    if let Some(name) = term.strip_prefix("defined") {
        let name = name.trim().trim_start_matches('(').trim_end_matches(')').trim();
        return defines.contains_key(name);
    }
    let term = term.trim_start_matches('(').trim_end_matches(')').trim();
    for op in [">=", "<=", "==", "!=", ">", "<"] {
        if let Some((lhs, rhs)) = term.split_once(op) {
            let (lhs, rhs) = (value_of(lhs.trim(), defines), value_of(rhs.trim(), defines));
            return match op {
                ">=" => lhs >= rhs,
                "<=" => lhs <= rhs,
                "==" => lhs == rhs,
                "!=" => lhs != rhs,
                ">" => lhs > rhs,
                _ => lhs < rhs,
            };
        }
    }
    value_of(term, defines) != 0
}

fn value_of(token: &str, defines: &HashMap<String, String>) -> i64 {
    token
        .parse()
        .ok()
        .or_else(|| defines.get(token).and_then(|value| value.trim().parse().ok()))
        .unwrap_or(0)
}

/// `attribute`/`uniform` declarations of the active text
fn reflect(lines: &[String], defines: &HashMap<String, String>) -> (Vec<Declaration>, Vec<Declaration>) {
    let mut attributes = Vec::new();
    let mut uniforms = Vec::new();
    for line in lines {
        let Some(statement) = line.split(';').next() else { continue };
        let mut tokens = statement
            .split_whitespace()
            .filter(|token| !matches!(*token, "lowp" | "mediump" | "highp"));
        let target = match tokens.next() {
            Some("attribute") => &mut attributes,
            Some("uniform") => &mut uniforms,
            _ => continue,
        };
        let (Some(kind), Some(declarator)) = (tokens.next().and_then(VariableType::from_glsl), tokens.next()) else {
            continue;
        };
        let (name, size) = match declarator.split_once('[') {
            Some((name, size)) => {
                let size = size.trim_end_matches(']').trim();
                (name, u32::try_from(value_of(size, defines)).unwrap_or(0))
            }
            None => (declarator, 1),
        };
        if size == 0 {
            continue;
        }
        target.push(Declaration { name: name.to_string(), kind, size });
    }
    (attributes, uniforms)
}

fn assign_locations(declarations: impl Iterator<Item = Declaration>) -> Vec<ActiveVariable> {
    let mut variables: Vec<ActiveVariable> = Vec::new();
    for declaration in declarations {
        if variables.iter().any(|variable| variable.name == declaration.name) {
            continue;
        }
        let location = u32::try_from(variables.len()).unwrap_or(u32::MAX);
        variables.push(ActiveVariable {
            name: declaration.name,
            location,
            size: declaration.size,
            kind: declaration.kind,
        });
    }
    variables
}

impl Gpu for HeadlessGpu {
    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn create_buffer(&mut self) -> GpuBuffer {
        let buffer = GpuBuffer(self.next());
        self.log.push(GpuCall::CreateBuffer(buffer));
        buffer
    }

    fn delete_buffer(&mut self, buffer: GpuBuffer) {
        self.log.push(GpuCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<GpuBuffer>) {
        self.log.push(GpuCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8]) {
        self.log.push(GpuCall::BufferData { target, len: data.len() });
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, byte_offset: usize, data: &[u8]) {
        self.log.push(GpuCall::BufferSubData { target, byte_offset, len: data.len() });
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<GpuShader, String> {
        self.log.push(GpuCall::CompileShader(stage));
        let (lines, defines) = preprocess(source)?;
        if !lines.iter().any(|line| line.contains("void main")) {
            return Err("ERROR: 0:0: 'main' : function not defined".to_string());
        }
        let (attributes, uniforms) = reflect(&lines, &defines);
        let shader = GpuShader(self.next());
        self.shaders.insert(shader, CompiledShader { stage, attributes, uniforms });
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: GpuShader) {
        self.shaders.remove(&shader);
        self.log.push(GpuCall::DeleteShader(shader));
    }

    fn link_program(&mut self, vertex: GpuShader, fragment: GpuShader) -> Result<GpuProgram, String> {
        if let Some(info_log) = self.pending_link_failure.take() {
            return Err(info_log);
        }
        let (Some(vs), Some(fs)) = (self.shaders.get(&vertex), self.shaders.get(&fragment)) else {
            return Err("ERROR: attached shader was deleted".to_string());
        };
        if vs.stage != ShaderStage::Vertex || fs.stage != ShaderStage::Fragment {
            return Err("ERROR: shader stages do not match their attachment points".to_string());
        }
        let linked = LinkedProgram {
            attributes: assign_locations(vs.attributes.iter().cloned()),
            uniforms: assign_locations(vs.uniforms.iter().chain(fs.uniforms.iter()).cloned()),
        };
        let program = GpuProgram(self.next());
        self.programs.insert(program, linked);
        self.log.push(GpuCall::LinkProgram(program));
        Ok(program)
    }

    fn delete_program(&mut self, program: GpuProgram) {
        self.programs.remove(&program);
        self.log.push(GpuCall::DeleteProgram(program));
    }

    fn active_attributes(&self, program: GpuProgram) -> Vec<ActiveVariable> {
        self.programs.get(&program).map(|p| p.attributes.clone()).unwrap_or_default()
    }

    fn active_uniforms(&self, program: GpuProgram) -> Vec<ActiveVariable> {
        self.programs.get(&program).map(|p| p.uniforms.clone()).unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<GpuProgram>) {
        self.log.push(GpuCall::UseProgram(program));
    }

    fn set_uniform(&mut self, location: u32, value: &UniformValue) {
        self.log.push(GpuCall::SetUniform { location, value: value.clone() });
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        self.log.push(GpuCall::EnableVertexAttribArray(location));
    }

    fn disable_vertex_attrib_array(&mut self, location: u32) {
        self.log.push(GpuCall::DisableVertexAttribArray(location));
    }

    fn vertex_attrib_pointer(
        &mut self,
        location: u32,
        size: u8,
        data_type: DataType,
        normalized: bool,
        stride: usize,
        offset: usize,
    ) {
        self.log.push(GpuCall::VertexAttribPointer { location, size, data_type, normalized, stride, offset });
    }

    fn create_texture(&mut self) -> GpuTexture {
        let texture = GpuTexture(self.next());
        self.textures += 1;
        self.log.push(GpuCall::CreateTexture(texture));
        texture
    }

    fn delete_texture(&mut self, texture: GpuTexture) {
        self.textures = self.textures.saturating_sub(1);
        self.log.push(GpuCall::DeleteTexture(texture));
    }

    fn active_texture(&mut self, unit: u32) {
        self.log.push(GpuCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<GpuTexture>) {
        self.log.push(GpuCall::BindTexture(target, texture));
    }

    fn tex_image(&mut self, target: TextureTarget, format: TextureFormat, width: u32, height: u32, _data: Option<&[u8]>) {
        self.log.push(GpuCall::TexImage { target, format, width, height });
    }

    fn generate_mipmap(&mut self, target: TextureTarget) {
        self.log.push(GpuCall::GenerateMipmap(target));
    }

    fn create_framebuffer(&mut self) -> GpuFramebuffer {
        let framebuffer = GpuFramebuffer(self.next());
        self.log.push(GpuCall::CreateFramebuffer(framebuffer));
        framebuffer
    }

    fn delete_framebuffer(&mut self, framebuffer: GpuFramebuffer) {
        self.log.push(GpuCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<GpuFramebuffer>) {
        self.log.push(GpuCall::BindFramebuffer(framebuffer));
    }

    fn framebuffer_depth_texture(&mut self, texture: GpuTexture) {
        self.log.push(GpuCall::FramebufferDepthTexture(texture));
    }

    fn enable(&mut self, capability: Capability) {
        self.log.push(GpuCall::Enable(capability));
    }

    fn disable(&mut self, capability: Capability) {
        self.log.push(GpuCall::Disable(capability));
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.log.push(GpuCall::DepthFunc(func));
    }

    fn depth_mask(&mut self, enabled: bool) {
        self.log.push(GpuCall::DepthMask(enabled));
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        self.log.push(GpuCall::DepthRange(near, far));
    }

    fn blend_func_separate(&mut self, src: BlendFactor, dst: BlendFactor, src_alpha: BlendFactor, dst_alpha: BlendFactor) {
        self.log.push(GpuCall::BlendFuncSeparate(src, dst, src_alpha, dst_alpha));
    }

    fn blend_equation_separate(&mut self, rgb: BlendEquation, alpha: BlendEquation) {
        self.log.push(GpuCall::BlendEquationSeparate(rgb, alpha));
    }

    fn cull_face(&mut self, face: CullFace) {
        self.log.push(GpuCall::CullFace(face));
    }

    fn front_face(&mut self, face: FrontFace) {
        self.log.push(GpuCall::FrontFace(face));
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.log.push(GpuCall::Viewport(x, y, width, height));
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.log.push(GpuCall::ClearColor(color));
    }

    fn color_mask(&mut self, mask: [bool; 4]) {
        self.log.push(GpuCall::ColorMask(mask));
    }

    fn clear(&mut self, mask: ClearMask) {
        self.log.push(GpuCall::Clear(mask));
    }

    fn draw_elements(&mut self, mode: DrawMode, count: usize, index_type: DataType, byte_offset: usize) {
        self.log.push(GpuCall::DrawElements { mode, count, index_type, byte_offset });
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: usize, count: usize) {
        self.log.push(GpuCall::DrawArrays { mode, first, count });
    }
}

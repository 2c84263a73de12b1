use std::{
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use smallvec::SmallVec;

use crate::graphics::{backend::Backend, types::Format};

use super::PipelineLayout;

pub const MAX_RENDER_TARGETS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderBytecode(Arc<[u8]>);

impl ShaderBytecode {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub semantic: Cow<'static, str>,
    pub semantic_index: u32,
    pub format: Format,
    pub slot: u32,
    pub offset: u32,
}

impl InputElement {
    pub fn new(semantic: impl Into<Cow<'static, str>>, format: Format, offset: u32) -> Self {
        Self {
            semantic: semantic.into(),
            semantic_index: 0,
            format,
            slot: 0,
            offset,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    Point,
    Line,
    #[default]
    Triangle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RasterizerDesc {
    pub fill: FillMode,
    pub cull: CullMode,
    pub front_counter_clockwise: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
    Additive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthDesc {
    pub write: bool,
    pub func: ComparisonFunc,
}

impl Default for DepthDesc {
    fn default() -> Self {
        Self {
            write: true,
            func: ComparisonFunc::Less,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct FixedState {
    vertex_shader: ShaderBytecode,
    pixel_shader: Option<ShaderBytecode>,
    input_layout: SmallVec<[InputElement; 8]>,
    topology: PrimitiveTopology,
    rasterizer: RasterizerDesc,
    blend: BlendMode,
    depth: Option<DepthDesc>,
    render_targets: SmallVec<[Format; MAX_RENDER_TARGETS]>,
    depth_format: Format,
    sample_count: u32,
}

/// Graphics pipeline description. Defaults follow the `CD3DX12_*_DESC(D3D12_DEFAULT)`
/// helpers: solid fill, back-face culling, opaque blending, depth test `Less`.
pub struct GraphicsPipelineDesc<B: Backend> {
    layout: Option<PipelineLayout<B>>,
    state: FixedState,
}

impl<B: Backend> GraphicsPipelineDesc<B> {
    pub fn new(vertex_shader: ShaderBytecode) -> Self {
        Self {
            layout: None,
            state: FixedState {
                vertex_shader,
                pixel_shader: None,
                input_layout: Default::default(),
                topology: Default::default(),
                rasterizer: Default::default(),
                blend: Default::default(),
                depth: Some(Default::default()),
                render_targets: Default::default(),
                depth_format: Format::Unknown,
                sample_count: 1,
            },
        }
    }

    pub fn with_layout(mut self, layout: &PipelineLayout<B>) -> Self {
        self.layout = Some(layout.clone());
        self
    }

    pub fn with_pixel_shader(mut self, shader: ShaderBytecode) -> Self {
        self.state.pixel_shader = Some(shader);
        self
    }

    pub fn with_input_layout(mut self, elements: impl IntoIterator<Item = InputElement>) -> Self {
        self.state.input_layout = elements.into_iter().collect();
        self
    }

    pub fn with_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.state.topology = topology;
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: RasterizerDesc) -> Self {
        self.state.rasterizer = rasterizer;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.state.blend = blend;
        self
    }

    pub fn with_depth(mut self, depth: Option<DepthDesc>) -> Self {
        self.state.depth = depth;
        self
    }

    pub fn with_render_targets(mut self, formats: &[Format]) -> Self {
        self.state.render_targets = formats.iter().copied().take(MAX_RENDER_TARGETS).collect();
        self
    }

    pub fn with_depth_format(mut self, format: Format) -> Self {
        self.state.depth_format = format;
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.state.sample_count = count;
        self
    }

    /// Form used as the cache key: unused trailing render targets are dropped
    /// and the sample count is at least one.
    pub fn canonical(&self) -> Self {
        let mut desc = self.clone();
        while desc.state.render_targets.last() == Some(&Format::Unknown) {
            desc.state.render_targets.pop();
        }
        desc.state.sample_count = desc.state.sample_count.max(1);
        desc
    }

    pub fn layout(&self) -> Option<&PipelineLayout<B>> {
        self.layout.as_ref()
    }

    pub fn vertex_shader(&self) -> &ShaderBytecode {
        &self.state.vertex_shader
    }

    pub fn pixel_shader(&self) -> Option<&ShaderBytecode> {
        self.state.pixel_shader.as_ref()
    }

    pub fn input_layout(&self) -> &[InputElement] {
        &self.state.input_layout
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.state.topology
    }

    pub fn rasterizer(&self) -> RasterizerDesc {
        self.state.rasterizer
    }

    pub fn blend(&self) -> BlendMode {
        self.state.blend
    }

    pub fn depth(&self) -> Option<DepthDesc> {
        self.state.depth
    }

    pub fn render_target_formats(&self) -> &[Format] {
        &self.state.render_targets
    }

    pub fn depth_format(&self) -> Format {
        self.state.depth_format
    }

    pub fn sample_count(&self) -> u32 {
        self.state.sample_count
    }
}

impl<B: Backend> Clone for GraphicsPipelineDesc<B> {
    fn clone(&self) -> Self {
        Self {
            layout: self.layout.clone(),
            state: self.state.clone(),
        }
    }
}

impl<B: Backend> PartialEq for GraphicsPipelineDesc<B> {
    fn eq(&self, other: &Self) -> bool {
        self.layout == other.layout && self.state == other.state
    }
}

impl<B: Backend> Eq for GraphicsPipelineDesc<B> {}

impl<B: Backend> Hash for GraphicsPipelineDesc<B> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.layout.hash(state);
        self.state.hash(state);
    }
}

impl<B: Backend> fmt::Debug for GraphicsPipelineDesc<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsPipelineDesc")
            .field("layout", &self.layout)
            .field("state", &self.state)
            .finish()
    }
}

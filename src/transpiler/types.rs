//! Core type definitions for the transpiler.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::syntax::Expr;

/// Which programmable stage a function is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Compute,
    Vertex,
    Fragment,
}

impl StageKind {
    pub fn label(self) -> &'static str {
        match self {
            StageKind::Compute => "compute",
            StageKind::Vertex => "vertex",
            StageKind::Fragment => "fragment",
        }
    }

    /// Name of the generated entry point.
    pub fn entry_point(self) -> &'static str {
        match self {
            StageKind::Compute => "compute_main",
            StageKind::Vertex => "vtx_main",
            StageKind::Fragment => "frag_main",
        }
    }

    pub fn is_render(self) -> bool {
        matches!(self, StageKind::Vertex | StageKind::Fragment)
    }
}

/// WGSL scalar element type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scalar {
    Bool,
    I32,
    U32,
    F32,
    F16,
}

impl Scalar {
    pub fn wgsl(self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::I32 => "i32",
            Scalar::U32 => "u32",
            Scalar::F32 => "f32",
            Scalar::F16 => "f16",
        }
    }

    /// Short-form suffix used by the predeclared aliases (`vec3f`, `mat4x4h`).
    pub fn suffix(self) -> Option<char> {
        match self {
            Scalar::Bool => None,
            Scalar::I32 => Some('i'),
            Scalar::U32 => Some('u'),
            Scalar::F32 => Some('f'),
            Scalar::F16 => Some('h'),
        }
    }

    pub fn from_suffix(c: char) -> Option<Scalar> {
        match c {
            'i' => Some(Scalar::I32),
            'u' => Some(Scalar::U32),
            'f' => Some(Scalar::F32),
            'h' => Some(Scalar::F16),
            _ => None,
        }
    }

    pub fn from_wgsl(s: &str) -> Option<Scalar> {
        match s {
            "bool" | "boolean" => Some(Scalar::Bool),
            "i32" | "int" => Some(Scalar::I32),
            "u32" | "uint" => Some(Scalar::U32),
            "f32" | "float" => Some(Scalar::F32),
            "f16" | "half" => Some(Scalar::F16),
            _ => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Scalar::F32 | Scalar::F16)
    }

    pub const fn byte_size(self) -> u32 {
        match self {
            Scalar::F16 => 2,
            _ => 4,
        }
    }
}

/// A WGSL type as far as the transpiler needs to reason about it.
///
/// `Named` carries caller-provided type text (textures, samplers, anything the
/// catalog does not model) and is emitted verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WgslType {
    Scalar(Scalar),
    Vector { size: u8, scalar: Scalar },
    Matrix { columns: u8, rows: u8, scalar: Scalar },
    Array { element: Box<WgslType>, length: Option<u32> },
    Named(String),
}

impl WgslType {
    pub const F32: WgslType = WgslType::Scalar(Scalar::F32);
    pub const I32: WgslType = WgslType::Scalar(Scalar::I32);
    pub const U32: WgslType = WgslType::Scalar(Scalar::U32);
    pub const BOOL: WgslType = WgslType::Scalar(Scalar::Bool);

    pub fn vector(size: u8, scalar: Scalar) -> WgslType {
        WgslType::Vector { size, scalar }
    }

    pub fn array(element: WgslType, length: Option<u32>) -> WgslType {
        WgslType::Array {
            element: Box::new(element),
            length,
        }
    }

    /// Parse a WGSL (or loosely JS-flavoured) type spelling.
    ///
    /// Never fails: anything unrecognised becomes `Named`.
    pub fn parse(text: &str) -> WgslType {
        let s: String = text.trim().chars().filter(|c| !c.is_whitespace()).collect();
        if s.is_empty() {
            return WgslType::F32;
        }
        if let Some(scalar) = Scalar::from_wgsl(&s) {
            return WgslType::Scalar(scalar);
        }
        if let Some(inner) = s.strip_prefix("array<").and_then(|r| r.strip_suffix('>')) {
            let (elem, len) = match split_generic_args(inner).as_slice() {
                [elem] => (elem.clone(), None),
                [elem, len] => (elem.clone(), len.parse::<u32>().ok()),
                _ => return WgslType::Named(s),
            };
            return WgslType::array(WgslType::parse(&elem), len);
        }
        if let Some(ty) = parse_vector_or_matrix(&s) {
            return ty;
        }
        WgslType::Named(s)
    }

    pub fn scalar(&self) -> Option<Scalar> {
        match self {
            WgslType::Scalar(s) => Some(*s),
            WgslType::Vector { scalar, .. } | WgslType::Matrix { scalar, .. } => Some(*scalar),
            WgslType::Array { element, .. } => element.scalar(),
            WgslType::Named(_) => None,
        }
    }

    pub fn is_float(&self) -> bool {
        self.scalar().is_some_and(Scalar::is_float)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, WgslType::Array { .. })
    }

    pub fn is_vector_or_matrix(&self) -> bool {
        matches!(self, WgslType::Vector { .. } | WgslType::Matrix { .. })
    }

    pub fn element(&self) -> Option<&WgslType> {
        match self {
            WgslType::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Same shape with a different scalar (vectors and scalars only).
    pub fn with_scalar(&self, scalar: Scalar) -> WgslType {
        match self {
            WgslType::Scalar(_) => WgslType::Scalar(scalar),
            WgslType::Vector { size, .. } => WgslType::Vector {
                size: *size,
                scalar,
            },
            other => other.clone(),
        }
    }
}

fn split_generic_args(inner: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '<' => {
                depth += 1;
                current.push(ch);
            }
            '>' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_vector_or_matrix(s: &str) -> Option<WgslType> {
    // vec3f / vec3<f32> / vec3
    if let Some(rest) = s.strip_prefix("vec") {
        let mut chars = rest.chars();
        let size = chars.next()?.to_digit(10)? as u8;
        if !(2..=4).contains(&size) {
            return None;
        }
        let tail: String = chars.collect();
        let scalar = scalar_from_tail(&tail)?;
        return Some(WgslType::Vector { size, scalar });
    }
    // mat4x4f / mat4x4<f32> / mat4 (square shorthand)
    if let Some(rest) = s.strip_prefix("mat") {
        let mut chars = rest.chars().peekable();
        let columns = chars.next()?.to_digit(10)? as u8;
        let rows = if chars.peek() == Some(&'x') {
            chars.next();
            chars.next()?.to_digit(10)? as u8
        } else {
            columns
        };
        if !(2..=4).contains(&columns) || !(2..=4).contains(&rows) {
            return None;
        }
        let tail: String = chars.collect();
        let scalar = scalar_from_tail(&tail)?;
        if !scalar.is_float() {
            return None;
        }
        return Some(WgslType::Matrix {
            columns,
            rows,
            scalar,
        });
    }
    None
}

fn scalar_from_tail(tail: &str) -> Option<Scalar> {
    if tail.is_empty() {
        return Some(Scalar::F32);
    }
    if let Some(inner) = tail.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        return Scalar::from_wgsl(inner);
    }
    let mut chars = tail.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    Scalar::from_suffix(c)
}

impl fmt::Display for WgslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WgslType::Scalar(s) => f.write_str(s.wgsl()),
            WgslType::Vector { size, scalar } => match scalar.suffix() {
                Some(c) => write!(f, "vec{size}{c}"),
                None => write!(f, "vec{size}<{}>", scalar.wgsl()),
            },
            WgslType::Matrix {
                columns,
                rows,
                scalar,
            } => write!(
                f,
                "mat{columns}x{rows}{}",
                scalar.suffix().unwrap_or('f')
            ),
            WgslType::Array {
                element,
                length: Some(n),
            } => write!(f, "array<{element}, {n}>"),
            WgslType::Array {
                element,
                length: None,
            } => write!(f, "array<{element}>"),
            WgslType::Named(s) => f.write_str(s),
        }
    }
}

/// Role a token plays in the authored function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenRole {
    Input,
    Declared,
    BuiltinUniform,
    ResourceCallArg,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub text: String,
    pub role: TokenRole,
    /// Parameter default or declaration initialiser, when present.
    pub value: Option<Expr>,
}

/// Coarse shape of a declared value, before WGSL typing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclaredType {
    Array,
    Vector(u8),
    Matrix(u8, u8),
    Variable,
}

impl DeclaredType {
    pub fn of(ty: &WgslType) -> DeclaredType {
        match ty {
            WgslType::Array { .. } => DeclaredType::Array,
            WgslType::Vector { size, .. } => DeclaredType::Vector(*size),
            WgslType::Matrix { columns, rows, .. } => DeclaredType::Matrix(*columns, *rows),
            _ => DeclaredType::Variable,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextureDim {
    D1,
    D2,
    D2Array,
    Cube,
    CubeArray,
    D3,
}

impl TextureDim {
    /// Texture dimensionality signalled through identifier naming.
    ///
    /// `cubearr` wins over `cube`, which wins over `3d`, `1d` and `arr`.
    pub fn from_name(name: &str) -> TextureDim {
        let lower = name.to_ascii_lowercase();
        if lower.contains("cubearr") {
            TextureDim::CubeArray
        } else if lower.contains("cube") {
            TextureDim::Cube
        } else if lower.contains("3d") {
            TextureDim::D3
        } else if lower.contains("1d") {
            TextureDim::D1
        } else if lower.contains("arr") {
            TextureDim::D2Array
        } else {
            TextureDim::D2
        }
    }

    /// Depth textures only come in 2d, 2d array, cube and cube array.
    pub fn for_depth(self) -> TextureDim {
        match self {
            TextureDim::D1 | TextureDim::D3 => TextureDim::D2,
            other => other,
        }
    }

    pub fn wgsl_suffix(self) -> &'static str {
        match self {
            TextureDim::D1 => "1d",
            TextureDim::D2 => "2d",
            TextureDim::D2Array => "2d_array",
            TextureDim::Cube => "cube",
            TextureDim::CubeArray => "cube_array",
            TextureDim::D3 => "3d",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageAccess {
    Read,
    Write,
    ReadWrite,
}

impl StorageAccess {
    pub fn wgsl(self) -> &'static str {
        match self {
            StorageAccess::Read => "read",
            StorageAccess::Write => "write",
            StorageAccess::ReadWrite => "read_write",
        }
    }
}

/// Sampled texture description derived from usage and naming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureKind {
    pub dim: TextureDim,
    pub depth: bool,
    pub multisampled: bool,
}

impl TextureKind {
    pub fn from_name(name: &str, force_depth: bool) -> TextureKind {
        let lower = name.to_ascii_lowercase();
        let depth = force_depth || lower.contains("depth");
        let dim = TextureDim::from_name(name);
        TextureKind {
            dim: if depth { dim.for_depth() } else { dim },
            depth,
            multisampled: lower.contains("multisampled"),
        }
    }

    pub fn wgsl(self) -> String {
        match (self.depth, self.multisampled) {
            (true, true) => "texture_depth_multisampled_2d".to_string(),
            (true, false) => format!("texture_depth_{}", self.dim.for_depth().wgsl_suffix()),
            (false, true) => "texture_multisampled_2d<f32>".to_string(),
            (false, false) => format!("texture_{}<f32>", self.dim.wgsl_suffix()),
        }
    }
}

/// Mutually exclusive resource classification of an identifier.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceClass {
    /// Plain local or unclassified identifier.
    Local,
    StorageArray { access: StorageAccess },
    Uniform,
    DefaultUniform,
    Texture(TextureKind),
    StorageTexture {
        dim: TextureDim,
        format: String,
        access: StorageAccess,
    },
    Sampler { comparison: bool },
    /// Declaration supplied verbatim by the caller.
    Override { decl: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
}

impl BindingSlot {
    pub fn new(group: u32, binding: u32) -> Self {
        Self { group, binding }
    }
}

/// One entry of the attributed model: the first occurrence of a distinct identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributedNode {
    pub name: String,
    pub declared_type: DeclaredType,
    pub ty: WgslType,
    pub raw_value: Option<Expr>,
    pub is_input: bool,
    pub is_returned: bool,
    pub is_modified: bool,
    pub class: ResourceClass,
    pub binding: Option<BindingSlot>,
    pub length: Option<u32>,
}

impl AttributedNode {
    pub fn local(name: impl Into<String>, ty: WgslType, raw_value: Option<Expr>) -> Self {
        let length = match &ty {
            WgslType::Array { length, .. } => *length,
            _ => None,
        };
        Self {
            name: name.into(),
            declared_type: DeclaredType::of(&ty),
            ty,
            raw_value,
            is_input: false,
            is_returned: false,
            is_modified: false,
            class: ResourceClass::Local,
            binding: None,
            length,
        }
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self.class, ResourceClass::Uniform)
    }

    pub fn is_default_uniform(&self) -> bool {
        matches!(self.class, ResourceClass::DefaultUniform)
    }

    pub fn is_storage_array(&self) -> bool {
        matches!(self.class, ResourceClass::StorageArray { .. })
    }

    pub fn is_texture(&self) -> bool {
        matches!(self.class, ResourceClass::Texture(_))
    }

    pub fn is_storage_texture(&self) -> bool {
        matches!(self.class, ResourceClass::StorageTexture { .. })
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self.class, ResourceClass::Sampler { .. })
    }

    pub fn is_comparison_sampler(&self) -> bool {
        matches!(self.class, ResourceClass::Sampler { comparison: true })
    }

    pub fn is_depth_texture(&self) -> bool {
        matches!(self.class, ResourceClass::Texture(k) if k.depth)
    }

    pub fn is_multisampled(&self) -> bool {
        matches!(self.class, ResourceClass::Texture(k) if k.multisampled)
    }

    fn texture_dim(&self) -> Option<TextureDim> {
        match &self.class {
            ResourceClass::Texture(k) => Some(k.dim),
            ResourceClass::StorageTexture { dim, .. } => Some(*dim),
            _ => None,
        }
    }

    pub fn is_cube(&self) -> bool {
        matches!(
            self.texture_dim(),
            Some(TextureDim::Cube | TextureDim::CubeArray)
        )
    }

    pub fn is_array_texture(&self) -> bool {
        matches!(
            self.texture_dim(),
            Some(TextureDim::D2Array | TextureDim::CubeArray)
        )
    }

    pub fn is_3d(&self) -> bool {
        self.texture_dim() == Some(TextureDim::D3)
    }

    pub fn is_1d(&self) -> bool {
        self.texture_dim() == Some(TextureDim::D1)
    }

    /// True for anything that occupies a bind-group slot of its own.
    pub fn is_resource(&self) -> bool {
        !matches!(
            self.class,
            ResourceClass::Local | ResourceClass::Uniform | ResourceClass::DefaultUniform
        )
    }
}

/// Bind-group layout kind of a declaration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BindingKind {
    Uniform,
    Storage {
        read_only: bool,
    },
    Texture {
        depth: bool,
        dim: TextureDim,
        multisampled: bool,
    },
    StorageTexture {
        format: String,
        access: StorageAccess,
        dim: TextureDim,
    },
    Sampler {
        comparison: bool,
    },
}

impl BindingKind {
    /// Best-effort kind for a caller-written declaration (`prefix` + `type`).
    pub fn from_declaration(prefix: &str, ty: &str) -> BindingKind {
        let ty = ty.trim();
        if let Some(rest) = ty.strip_prefix("texture_storage_") {
            let dim = if rest.starts_with("2d_array") {
                TextureDim::D2Array
            } else if rest.starts_with("3d") {
                TextureDim::D3
            } else if rest.starts_with("1d") {
                TextureDim::D1
            } else {
                TextureDim::D2
            };
            let args = rest
                .split_once('<')
                .map(|(_, a)| a.trim_end_matches('>'))
                .unwrap_or("rgba8unorm,write");
            let mut parts = args.split(',').map(str::trim);
            let format = parts.next().unwrap_or("rgba8unorm").to_string();
            let access = match parts.next() {
                Some("read") => StorageAccess::Read,
                Some("read_write") => StorageAccess::ReadWrite,
                _ => StorageAccess::Write,
            };
            return BindingKind::StorageTexture {
                format,
                access,
                dim,
            };
        }
        if ty.starts_with("texture") {
            let depth = ty.starts_with("texture_depth");
            let multisampled = ty.contains("multisampled");
            let dim_part = ty
                .trim_start_matches("texture_depth_")
                .trim_start_matches("texture_multisampled_")
                .trim_start_matches("texture_");
            let dim = if dim_part.starts_with("cube_array") {
                TextureDim::CubeArray
            } else if dim_part.starts_with("cube") {
                TextureDim::Cube
            } else if dim_part.starts_with("2d_array") {
                TextureDim::D2Array
            } else if dim_part.starts_with("3d") {
                TextureDim::D3
            } else if dim_part.starts_with("1d") {
                TextureDim::D1
            } else {
                TextureDim::D2
            };
            return BindingKind::Texture {
                depth,
                dim,
                multisampled,
            };
        }
        if ty.starts_with("sampler_comparison") {
            return BindingKind::Sampler { comparison: true };
        }
        if ty.starts_with("sampler") {
            return BindingKind::Sampler { comparison: false };
        }
        if prefix.contains("storage") {
            return BindingKind::Storage {
                read_only: !prefix.contains("read_write"),
            };
        }
        BindingKind::Uniform
    }
}

/// A field of a generated struct (`UniformsStruct`, `DefaultUniforms`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub ty: WgslType,
}

/// A module-scope resource declaration with its slot.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceDecl {
    pub name: String,
    pub slot: BindingSlot,
    pub kind: BindingKind,
    /// Everything after the `@group(..) @binding(..)` attributes, including `;`.
    pub decl: String,
    /// Struct that must precede this declaration, if any.
    pub struct_def: Option<String>,
}

/// Compiled helper function.
#[derive(Clone, Debug, PartialEq)]
pub struct HelperFn {
    pub name: String,
    pub code: String,
}

/// Pieces a [`StageProgram`] is assembled from; kept so the reconciler can re-emit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgramParts {
    pub decls: Vec<ResourceDecl>,
    pub uniform_fields: Vec<StructField>,
    pub default_fields: Vec<StructField>,
    pub interstage: Option<String>,
    pub consts: Vec<String>,
    pub helpers: Vec<HelperFn>,
    pub entry: String,
}

/// One compiled program stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageProgram {
    pub stage: StageKind,
    /// Full WGSL module for this stage.
    pub code: String,
    /// Struct and resource declarations only.
    pub header: String,
    /// Inputs and resources, in planning order.
    pub params: Vec<AttributedNode>,
    pub default_uniforms: Option<Vec<String>>,
    pub workgroup_size: Option<u32>,
    pub bind_group_number: u32,
    pub alt_bindings: BTreeMap<String, BindingSlot>,
    /// Names whose type came from the inference fallback.
    pub inference_fallbacks: Vec<String>,
    /// Names the authored `return` declared as outputs.
    pub returned: Vec<String>,
    pub(crate) parts: ProgramParts,
}

impl StageProgram {
    pub fn parts(&self) -> &ProgramParts {
        &self.parts
    }

    /// Input parameters in positional order.
    pub fn inputs(&self) -> impl Iterator<Item = &AttributedNode> {
        self.params.iter().filter(|n| n.is_input)
    }

    pub fn decl(&self, name: &str) -> Option<&ResourceDecl> {
        self.parts.decls.iter().find(|d| d.name == name)
    }

    /// Re-render `header` and `code` from `parts`.
    pub fn assemble(&mut self) {
        self.header = super::stage::render_header(&self.parts);
        self.code = super::stage::render_module(&self.parts, &self.header);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_short_and_generic_spellings() {
        assert_eq!(WgslType::parse("vec3f"), WgslType::vector(3, Scalar::F32));
        assert_eq!(
            WgslType::parse("vec3<f32>"),
            WgslType::vector(3, Scalar::F32)
        );
        assert_eq!(WgslType::parse("vec2u"), WgslType::vector(2, Scalar::U32));
        assert_eq!(WgslType::parse("float"), WgslType::F32);
        assert_eq!(
            WgslType::parse("mat4x4<f32>"),
            WgslType::Matrix {
                columns: 4,
                rows: 4,
                scalar: Scalar::F32
            }
        );
        assert_eq!(
            WgslType::parse("array<vec4f, 8>"),
            WgslType::array(WgslType::vector(4, Scalar::F32), Some(8))
        );
        assert_eq!(
            WgslType::parse("texture_2d<f32>"),
            WgslType::Named("texture_2d<f32>".to_string())
        );
    }

    #[test]
    fn display_uses_predeclared_aliases() {
        assert_eq!(WgslType::vector(4, Scalar::F16).to_string(), "vec4h");
        assert_eq!(WgslType::vector(2, Scalar::Bool).to_string(), "vec2<bool>");
        assert_eq!(
            WgslType::array(WgslType::F32, None).to_string(),
            "array<f32>"
        );
    }

    #[test]
    fn texture_dim_follows_naming_convention() {
        assert_eq!(TextureDim::from_name("envCubeArr"), TextureDim::CubeArray);
        assert_eq!(TextureDim::from_name("skyCube"), TextureDim::Cube);
        assert_eq!(TextureDim::from_name("volume3d"), TextureDim::D3);
        assert_eq!(TextureDim::from_name("layersArr"), TextureDim::D2Array);
        assert_eq!(TextureDim::from_name("albedo"), TextureDim::D2);
        assert_eq!(
            TextureKind::from_name("shadowDepth", false).wgsl(),
            "texture_depth_2d"
        );
    }

    #[test]
    fn test_depth_textures_clamp_to_legal_dims() {
        let kind = TextureKind::from_name("depth3dTex", false);
        assert_eq!(kind.dim, TextureDim::D2);
        assert_eq!(kind.wgsl(), "texture_depth_2d");
        assert_eq!(TextureKind::from_name("shadow1d", true).wgsl(), "texture_depth_2d");
        assert_eq!(
            TextureKind::from_name("depthCubeArr", false).wgsl(),
            "texture_depth_cube_array"
        );
        assert_eq!(TextureKind::from_name("volume3d", false).wgsl(), "texture_3d<f32>");
        let direct = TextureKind {
            dim: TextureDim::D3,
            depth: true,
            multisampled: false,
        };
        assert_eq!(direct.wgsl(), "texture_depth_2d");
    }

    #[test]
    fn binding_kind_from_override_text() {
        assert_eq!(
            BindingKind::from_declaration("var", "texture_storage_2d<rgba16float, write>"),
            BindingKind::StorageTexture {
                format: "rgba16float".to_string(),
                access: StorageAccess::Write,
                dim: TextureDim::D2
            }
        );
        assert_eq!(
            BindingKind::from_declaration("var<storage, read_write>", "array<f32>"),
            BindingKind::Storage { read_only: false }
        );
        assert_eq!(
            BindingKind::from_declaration("var", "sampler_comparison"),
            BindingKind::Sampler { comparison: true }
        );
    }
}

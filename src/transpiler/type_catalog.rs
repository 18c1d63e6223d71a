//! Host-shareable layout data for every WGSL scalar, vector and matrix type.
//!
//! Sizes and alignments follow the WGSL memory layout rules: a vector of three
//! 32-bit scalars aligns to 16 bytes, and matrix columns are strided by the
//! alignment of the column vector.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::types::{Scalar, WgslType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub ty: WgslType,
    pub align: u32,
    pub size: u32,
    /// Scalar components per column (1 for scalars).
    pub components: u32,
    pub columns: u32,
    pub rows: u32,
    pub scalar: Scalar,
    /// Byte distance between matrix columns; equals `size` for non-matrices.
    pub column_stride: u32,
    /// Vertex attribute formats this type can be fed from.
    pub vertex_formats: &'static [&'static str],
}

impl TypeInfo {
    pub fn scalar_size(&self) -> u32 {
        // Booleans are not host-shareable; they travel as 32-bit integers.
        match self.scalar {
            Scalar::Bool => 4,
            s => s.byte_size(),
        }
    }

    /// Bytes actually written for the value (matrix padding excluded).
    pub fn written_size(&self) -> u32 {
        if self.columns > 1 {
            (self.columns - 1) * self.column_stride + self.rows * self.scalar_size()
        } else {
            self.components * self.scalar_size()
        }
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

fn vector_align(size: u8, scalar_size: u32) -> u32 {
    match size {
        2 => 2 * scalar_size,
        _ => 4 * scalar_size,
    }
}

fn vertex_formats(ty: &WgslType) -> &'static [&'static str] {
    use Scalar::*;
    match ty {
        WgslType::Scalar(F32) => &["float32"],
        WgslType::Scalar(I32) => &["sint32"],
        WgslType::Scalar(U32) => &["uint32"],
        WgslType::Scalar(F16) => &["float16"],
        WgslType::Vector { size: 2, scalar: F32 } => {
            &["float32x2", "unorm16x2", "snorm16x2", "float16x2"]
        }
        WgslType::Vector { size: 3, scalar: F32 } => &["float32x3"],
        WgslType::Vector { size: 4, scalar: F32 } => &[
            "float32x4",
            "unorm8x4",
            "snorm8x4",
            "unorm16x4",
            "snorm16x4",
            "float16x4",
        ],
        WgslType::Vector { size: 2, scalar: I32 } => &["sint32x2", "sint16x2"],
        WgslType::Vector { size: 3, scalar: I32 } => &["sint32x3"],
        WgslType::Vector { size: 4, scalar: I32 } => &["sint32x4", "sint8x4", "sint16x4"],
        WgslType::Vector { size: 2, scalar: U32 } => &["uint32x2", "uint16x2"],
        WgslType::Vector { size: 3, scalar: U32 } => &["uint32x3"],
        WgslType::Vector { size: 4, scalar: U32 } => &["uint32x4", "uint8x4", "uint16x4"],
        WgslType::Vector { size: 2, scalar: F16 } => &["float16x2"],
        WgslType::Vector { size: 4, scalar: F16 } => &["float16x4"],
        _ => &[],
    }
}

fn describe(ty: WgslType) -> Option<TypeInfo> {
    let info = match &ty {
        WgslType::Scalar(s) => {
            let width = if *s == Scalar::Bool { 4 } else { s.byte_size() };
            TypeInfo {
                ty: ty.clone(),
                align: width,
                size: width,
                components: 1,
                columns: 1,
                rows: 1,
                scalar: *s,
                column_stride: width,
                vertex_formats: vertex_formats(&ty),
            }
        }
        WgslType::Vector { size, scalar } => {
            let width = if *scalar == Scalar::Bool {
                4
            } else {
                scalar.byte_size()
            };
            TypeInfo {
                ty: ty.clone(),
                align: vector_align(*size, width),
                size: u32::from(*size) * width,
                components: u32::from(*size),
                columns: 1,
                rows: u32::from(*size),
                scalar: *scalar,
                column_stride: u32::from(*size) * width,
                vertex_formats: vertex_formats(&ty),
            }
        }
        WgslType::Matrix {
            columns,
            rows,
            scalar,
        } => {
            let width = scalar.byte_size();
            let align = vector_align(*rows, width);
            let stride = round_up(u32::from(*rows) * width, align);
            TypeInfo {
                ty: ty.clone(),
                align,
                size: u32::from(*columns) * stride,
                components: u32::from(*rows),
                columns: u32::from(*columns),
                rows: u32::from(*rows),
                scalar: *scalar,
                column_stride: stride,
                vertex_formats: &[],
            }
        }
        _ => return None,
    };
    Some(info)
}

/// Lookup table keyed by canonical type spelling.
#[derive(Debug)]
pub struct TypeCatalog {
    entries: BTreeMap<String, TypeInfo>,
}

static STANDARD: LazyLock<TypeCatalog> = LazyLock::new(TypeCatalog::build);

impl TypeCatalog {
    pub fn standard() -> &'static TypeCatalog {
        &STANDARD
    }

    fn build() -> TypeCatalog {
        let mut entries = BTreeMap::new();
        let scalars = [Scalar::Bool, Scalar::I32, Scalar::U32, Scalar::F32, Scalar::F16];
        let mut insert = |ty: WgslType| {
            if let Some(info) = describe(ty) {
                entries.insert(info.ty.to_string(), info);
            }
        };
        for s in scalars {
            insert(WgslType::Scalar(s));
            for n in 2..=4 {
                insert(WgslType::vector(n, s));
            }
        }
        for scalar in [Scalar::F32, Scalar::F16] {
            for columns in 2..=4 {
                for rows in 2..=4 {
                    insert(WgslType::Matrix {
                        columns,
                        rows,
                        scalar,
                    });
                }
            }
        }
        TypeCatalog { entries }
    }

    /// Accepts `vec3f`, `vec3<f32>`, `float` and friends.
    pub fn lookup(&self, name: &str) -> Option<&TypeInfo> {
        self.get(&WgslType::parse(name))
    }

    pub fn get(&self, ty: &WgslType) -> Option<&TypeInfo> {
        self.entries.get(&ty.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Host-side values: uniform values, storage array data, and evaluation of
//! literal parameter defaults.

use std::borrow::Cow;

use half::f16;
use serde::{Deserialize, Serialize};

use crate::transpiler::syntax::Expr;
use crate::transpiler::type_catalog::TypeCatalog;
use crate::transpiler::types::{Scalar, WgslType};

/// A value for a uniform field. Vectors and matrices are flat component lists,
/// matrices in column-major order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniformValue {
    Bool(bool),
    Scalar(f64),
    List(Vec<f64>),
}

impl UniformValue {
    pub fn components(&self) -> Cow<'_, [f64]> {
        match self {
            UniformValue::Bool(b) => Cow::Owned(vec![if *b { 1.0 } else { 0.0 }]),
            UniformValue::Scalar(v) => Cow::Owned(vec![*v]),
            UniformValue::List(values) => Cow::Borrowed(values),
        }
    }

    /// Evaluate a literal default (`1.5`, `true`, `vec3(1, 2, 3)`, `[0, 1]`).
    pub fn from_expr(expr: &Expr) -> Option<UniformValue> {
        match expr.unparen() {
            Expr::Bool(b) => Some(UniformValue::Bool(*b)),
            e if e.is_numeric_literal() => e.number_value().map(UniformValue::Scalar),
            e => literal_components(e).map(UniformValue::List),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Scalar(f64::from(v))
    }
}

impl From<f64> for UniformValue {
    fn from(v: f64) -> Self {
        UniformValue::Scalar(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Scalar(f64::from(v))
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl<const N: usize> From<[f32; N]> for UniformValue {
    fn from(v: [f32; N]) -> Self {
        UniformValue::List(v.iter().map(|x| f64::from(*x)).collect())
    }
}

/// Typed contents of a storage buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F16(Vec<f16>),
    Bytes(Vec<u8>),
}

impl ArrayData {
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            ArrayData::F32(v) => Cow::Borrowed(bytemuck::cast_slice(v)),
            ArrayData::I32(v) => Cow::Borrowed(bytemuck::cast_slice(v)),
            ArrayData::U32(v) => Cow::Borrowed(bytemuck::cast_slice(v)),
            ArrayData::F16(v) => Cow::Borrowed(bytemuck::cast_slice(v)),
            ArrayData::Bytes(v) => Cow::Borrowed(v),
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            ArrayData::F32(v) => v.len() * 4,
            ArrayData::I32(v) => v.len() * 4,
            ArrayData::U32(v) => v.len() * 4,
            ArrayData::F16(v) => v.len() * 2,
            ArrayData::Bytes(v) => v.len(),
        }
    }

    /// Number of scalar elements.
    pub fn len(&self) -> usize {
        match self {
            ArrayData::F32(v) => v.len(),
            ArrayData::I32(v) => v.len(),
            ArrayData::U32(v) => v.len(),
            ArrayData::F16(v) => v.len(),
            ArrayData::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build array contents for `element`, inserting the padding that WGSL
    /// array strides require (e.g. `vec3f` elements occupy 16 bytes).
    pub fn from_components(values: &[f64], element: &WgslType) -> ArrayData {
        let scalar = element.scalar().unwrap_or(Scalar::F32);
        let padded = pad_to_stride(values, element);
        match scalar {
            Scalar::F32 => ArrayData::F32(padded.iter().map(|v| *v as f32).collect()),
            Scalar::I32 | Scalar::Bool => ArrayData::I32(padded.iter().map(|v| *v as i32).collect()),
            Scalar::U32 => ArrayData::U32(padded.iter().map(|v| *v as u32).collect()),
            Scalar::F16 => ArrayData::F16(padded.iter().map(|v| f16::from_f64(*v)).collect()),
        }
    }

    /// Evaluate a literal array default (`[1, 2]`, `new Float32Array(8)`,
    /// `new Array(4).fill(0)`).
    pub fn from_expr(expr: &Expr, element: &WgslType) -> Option<ArrayData> {
        literal_components(expr).map(|values| ArrayData::from_components(&values, element))
    }

    /// Reinterpret read-back bytes as `element`'s scalar type. Trailing bytes
    /// that do not fill a scalar are dropped.
    pub fn from_bytes(bytes: &[u8], element: &WgslType) -> ArrayData {
        let width = match element.scalar() {
            Some(Scalar::F16) => 2,
            Some(_) => 4,
            None => return ArrayData::Bytes(bytes.to_vec()),
        };
        let bytes = &bytes[..bytes.len() - bytes.len() % width];
        match element.scalar() {
            Some(Scalar::F32) => ArrayData::F32(bytemuck::pod_collect_to_vec(bytes)),
            Some(Scalar::I32 | Scalar::Bool) => ArrayData::I32(bytemuck::pod_collect_to_vec(bytes)),
            Some(Scalar::U32) => ArrayData::U32(bytemuck::pod_collect_to_vec(bytes)),
            Some(Scalar::F16) => ArrayData::F16(bytemuck::pod_collect_to_vec(bytes)),
            None => ArrayData::Bytes(bytes.to_vec()),
        }
    }
}

/// Byte distance between consecutive elements of `array<element>`.
pub fn element_stride(element: &WgslType) -> u32 {
    match TypeCatalog::standard().get(element) {
        Some(info) => info.size.div_ceil(info.align) * info.align,
        None => 4,
    }
}

impl From<Vec<f32>> for ArrayData {
    fn from(v: Vec<f32>) -> Self {
        ArrayData::F32(v)
    }
}

impl From<Vec<i32>> for ArrayData {
    fn from(v: Vec<i32>) -> Self {
        ArrayData::I32(v)
    }
}

impl From<Vec<u32>> for ArrayData {
    fn from(v: Vec<u32>) -> Self {
        ArrayData::U32(v)
    }
}

fn pad_to_stride(values: &[f64], element: &WgslType) -> Vec<f64> {
    let Some(info) = TypeCatalog::standard().get(element) else {
        return values.to_vec();
    };
    let per_element = (info.components * info.columns) as usize;
    let scalar_size = info.scalar_size();
    let stride = info.size.div_ceil(info.align) * info.align;
    let slots = (stride / scalar_size) as usize;
    let column_slots = (info.column_stride / scalar_size) as usize;
    if per_element <= 1 || slots == per_element {
        return values.to_vec();
    }
    let mut out = Vec::with_capacity(values.len() / per_element * slots + slots);
    for chunk in values.chunks(per_element) {
        let start = out.len();
        for (i, v) in chunk.iter().enumerate() {
            let column = i / info.components as usize;
            let row = i % info.components as usize;
            let at = start + column * column_slots + row;
            out.resize(out.len().max(at + 1), 0.0);
            out[at] = *v;
        }
        out.resize(start + slots, 0.0);
    }
    out
}

/// Flatten a literal expression into numeric components.
pub fn literal_components(expr: &Expr) -> Option<Vec<f64>> {
    match expr.unparen() {
        Expr::Bool(b) => Some(vec![if *b { 1.0 } else { 0.0 }]),
        e if e.is_numeric_literal() => e.number_value().map(|v| vec![v]),
        Expr::Array(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(literal_components(item)?);
            }
            Some(out)
        }
        Expr::Call { callee, args } => match callee.as_ref() {
            // new Array(n).fill(v)
            Expr::Member { object, property } if property == "fill" => {
                let len = new_array_length(object)?;
                let fill = match args.first() {
                    Some(v) => literal_components(v)?,
                    None => vec![0.0],
                };
                Some(fill.iter().copied().cycle().take(len * fill.len()).collect())
            }
            other => constructor_components(other.as_ident()?, args),
        },
        Expr::New { callee, args } => {
            let name = callee.as_ident()?;
            match args.as_slice() {
                [] => Some(Vec::new()),
                [len] if len.is_numeric_literal() => {
                    Some(vec![0.0; len.number_value()?.max(0.0) as usize])
                }
                [source] if name != "Array" => literal_components(source),
                _ => {
                    let mut out = Vec::new();
                    for a in args {
                        out.extend(literal_components(a)?);
                    }
                    Some(out)
                }
            }
        }
        _ => None,
    }
}

fn new_array_length(expr: &Expr) -> Option<usize> {
    match expr.unparen() {
        Expr::New { callee, args } if callee.as_ident() == Some("Array") => {
            args.first()?.number_value().map(|n| n.max(0.0) as usize)
        }
        _ => None,
    }
}

/// `vec3(1)` splats, `vec4(v3, 1)` concatenates, `mat2x2(...)` flattens.
fn constructor_components(name: &str, args: &[Expr]) -> Option<Vec<f64>> {
    let ty = WgslType::parse(name);
    let want = match ty {
        WgslType::Vector { size, .. } => usize::from(size),
        WgslType::Matrix { columns, rows, .. } => usize::from(columns) * usize::from(rows),
        WgslType::Scalar(_) => 1,
        _ => return None,
    };
    let mut out = Vec::new();
    for a in args {
        out.extend(literal_components(a)?);
    }
    match out.len() {
        0 => Some(vec![0.0; want]),
        1 => Some(vec![out[0]; want]),
        _ => Some(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::syntax::parse_expression;

    fn eval(src: &str) -> Option<Vec<f64>> {
        literal_components(&parse_expression(src).unwrap())
    }

    #[test]
    fn test_literal_components() {
        assert_eq!(eval("[1.0, 2.0, 3.0, 4.0]"), Some(vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(eval("vec3(1)"), Some(vec![1.0, 1.0, 1.0]));
        assert_eq!(eval("new Float32Array(3)"), Some(vec![0.0; 3]));
        assert_eq!(eval("new Float32Array([1, 2])"), Some(vec![1.0, 2.0]));
        assert_eq!(eval("new Array(3).fill(-0.5)"), Some(vec![-0.5; 3]));
        assert_eq!(
            eval("new Array(2).fill(vec2(1, 2))"),
            Some(vec![1.0, 2.0, 1.0, 2.0])
        );
        assert_eq!(eval("someCall(1)"), None);
        assert_eq!(eval("x"), None);
    }

    #[test]
    fn test_uniform_value_from_expr() {
        let v = |s: &str| UniformValue::from_expr(&parse_expression(s).unwrap());
        assert_eq!(v("true"), Some(UniformValue::Bool(true)));
        assert_eq!(v("-2"), Some(UniformValue::Scalar(-2.0)));
        assert_eq!(v("vec2(0.5, 1)"), Some(UniformValue::List(vec![0.5, 1.0])));
    }

    #[test]
    fn test_vec3_arrays_are_padded_to_16_bytes() {
        let data = ArrayData::from_components(
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            &WgslType::vector(3, Scalar::F32),
        );
        assert_eq!(data, ArrayData::F32(vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0]));
        assert_eq!(data.byte_len(), 32);
    }

    #[test]
    fn test_array_bytes_by_element_width() {
        let data = ArrayData::from_components(&[1.0, 2.0], &WgslType::Scalar(Scalar::F16));
        assert_eq!(data.as_bytes().len(), 4);
        let data = ArrayData::from_components(&[1.0, 2.0], &WgslType::U32);
        assert_eq!(data.as_bytes().as_ref(), bytemuck::cast_slice::<u32, u8>(&[1, 2]));
    }

    #[test]
    fn test_read_back_bytes_decode_by_element() {
        let bytes = bytemuck::cast_slice::<f32, u8>(&[1.5, -2.0]).to_vec();
        assert_eq!(
            ArrayData::from_bytes(&bytes, &WgslType::F32),
            ArrayData::F32(vec![1.5, -2.0])
        );
        assert_eq!(ArrayData::from_bytes(&bytes[..6], &WgslType::F32).len(), 1);
        assert_eq!(element_stride(&WgslType::vector(3, Scalar::F32)), 16);
        assert_eq!(element_stride(&WgslType::vector(2, Scalar::F16)), 4);
    }

    #[test]
    fn test_uniform_value_deserializes_untagged() {
        let v: Vec<UniformValue> = serde_json::from_str("[true, 1.5, [1, 2]]").unwrap();
        assert_eq!(
            v,
            vec![
                UniformValue::Bool(true),
                UniformValue::Scalar(1.5),
                UniformValue::List(vec![1.0, 2.0])
            ]
        );
    }
}

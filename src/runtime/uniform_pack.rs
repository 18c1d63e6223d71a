//! Uniform struct packing.
//!
//! Fields are laid out in declaration order, each at the next offset that is a
//! multiple of its alignment. Matrices are written one column at a time at the
//! column stride, so the padding rows of `mat3x3f` stay zero.

use half::f16;

use crate::transpiler::type_catalog::{TypeCatalog, TypeInfo};
use crate::transpiler::types::{Scalar, StructField};
use crate::values::UniformValue;

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align.max(1)) * align.max(1)
}

/// Byte offsets of a uniform struct's fields and the buffer size to allocate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformLayout {
    pub offsets: Vec<u32>,
    pub size: u32,
}

impl UniformLayout {
    pub fn new(fields: &[&TypeInfo]) -> Self {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut end = 0;
        for info in fields {
            let offset = round_up(end, info.align);
            offsets.push(offset);
            end = offset + info.size;
        }
        let size = if end <= 8 { 8 } else { round_up(end, 16) };
        Self { offsets, size }
    }

    /// Layout of a generated struct; fields the catalog cannot describe are skipped.
    pub fn for_fields(fields: &[StructField]) -> (Self, Vec<&'static TypeInfo>) {
        let infos: Vec<&'static TypeInfo> = fields
            .iter()
            .filter_map(|f| {
                let info = TypeCatalog::standard().get(&f.ty);
                if info.is_none() {
                    log::warn!("uniform field `{}: {}` has no host layout", f.name, f.ty);
                }
                info
            })
            .collect();
        (Self::new(&infos), infos)
    }
}

fn write_scalar(dst: &mut [u8], at: usize, scalar: Scalar, value: f64) {
    match scalar {
        Scalar::F32 => dst[at..at + 4].copy_from_slice(bytemuck::bytes_of(&(value as f32))),
        Scalar::I32 | Scalar::Bool => {
            dst[at..at + 4].copy_from_slice(bytemuck::bytes_of(&(value as i32)))
        }
        Scalar::U32 => dst[at..at + 4].copy_from_slice(bytemuck::bytes_of(&(value as u32))),
        Scalar::F16 => dst[at..at + 2].copy_from_slice(bytemuck::bytes_of(&f16::from_f64(value))),
    }
}

fn write_value(dst: &mut [u8], offset: u32, info: &TypeInfo, value: &UniformValue) {
    let components = value.components();
    let per_column = info.components.max(1) as usize;
    let count = per_column * info.columns.max(1) as usize;
    let scalar_size = info.scalar_size() as usize;
    for (i, v) in components.iter().take(count).enumerate() {
        let column = i / per_column;
        let row = i % per_column;
        let at = offset as usize + column * info.column_stride as usize + row * scalar_size;
        write_scalar(dst, at, info.scalar, *v);
    }
}

/// Pack values into a buffer sized by [`UniformLayout`].
pub fn pack(fields: &[(&TypeInfo, &UniformValue)]) -> Vec<u8> {
    let infos: Vec<&TypeInfo> = fields.iter().map(|(info, _)| *info).collect();
    let layout = UniformLayout::new(&infos);
    let mut out = vec![0u8; layout.size as usize];
    for ((info, value), offset) in fields.iter().zip(&layout.offsets) {
        write_value(&mut out, *offset, info, value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str) -> &'static TypeInfo {
        TypeCatalog::standard().lookup(name).unwrap()
    }

    fn f32_at(bytes: &[u8], at: usize) -> f32 {
        bytemuck::pod_read_unaligned(&bytes[at..at + 4])
    }

    #[test]
    fn test_small_struct_is_eight_bytes() {
        let layout = UniformLayout::new(&[info("f32")]);
        assert_eq!(layout.size, 8);
        let layout = UniformLayout::new(&[info("f32"), info("i32")]);
        assert_eq!(layout.offsets, vec![0, 4]);
        assert_eq!(layout.size, 8);
    }

    #[test]
    fn test_vec3_aligns_to_sixteen() {
        let layout = UniformLayout::new(&[info("f32"), info("vec3f"), info("f32")]);
        assert_eq!(layout.offsets, vec![0, 16, 28]);
        assert_eq!(layout.size, 32);
    }

    #[test]
    fn test_pack_writes_components_at_offsets() {
        let time = UniformValue::Scalar(2.5);
        let tint = UniformValue::List(vec![0.1, 0.2, 0.3]);
        let bytes = pack(&[(info("f32"), &time), (info("vec3f"), &tint)]);
        assert_eq!(bytes.len(), 32);
        assert_eq!(f32_at(&bytes, 0), 2.5);
        assert_eq!(f32_at(&bytes, 16), 0.1);
        assert_eq!(f32_at(&bytes, 24), 0.3);
    }

    #[test]
    fn test_mat3_columns_use_stride() {
        let m = UniformValue::List((1..=9).map(f64::from).collect());
        let bytes = pack(&[(info("mat3x3f"), &m)]);
        assert_eq!(bytes.len(), 48);
        assert_eq!(f32_at(&bytes, 0), 1.0);
        assert_eq!(f32_at(&bytes, 12), 0.0);
        assert_eq!(f32_at(&bytes, 16), 4.0);
        assert_eq!(f32_at(&bytes, 32), 7.0);
    }

    #[test]
    fn test_f16_and_bool_widths() {
        let flag = UniformValue::Bool(true);
        let h = UniformValue::Scalar(1.0);
        let bytes = pack(&[(info("i32"), &flag), (info("f16"), &h)]);
        assert_eq!(bytemuck::pod_read_unaligned::<i32>(&bytes[0..4]), 1);
        assert_eq!(
            bytemuck::pod_read_unaligned::<f16>(&bytes[4..6]),
            f16::from_f32(1.0)
        );
    }
}

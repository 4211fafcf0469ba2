//! Structured Uniform Blocks
//!
//! [`BlockRef`] is an [`ArrayRef`] whose bytes are produced from a declared
//! list of typed fields laid out with WGSL uniform address-space rules:
//!
//! | Type | Size | Align |
//! |------|------|-------|
//! | `f32` / `i32` / `u32` | 4 | 4 |
//! | `vec2<f32>` | 8 | 8 |
//! | `vec3<f32>` | 12 | 16 |
//! | `vec4<f32>` | 16 | 16 |
//! | `mat3x3<f32>` | 48 | 16 |
//! | `mat4x4<f32>` | 64 | 16 |
//!
//! The struct size is rounded up to 16. Field sources are either fixed
//! values or closures evaluated on every [`BlockRef::update`]; there is no
//! automatic dependency tracking, so callers invoke `update` after mutating
//! anything a field reads.

use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use super::reference::ArrayRef;
use crate::errors::{Error, Result};

// ============================================================================
// Value types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    F32,
    I32,
    U32,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl UniformType {
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat3 => 48,
            Self::Mat4 => 64,
        }
    }

    #[must_use]
    pub const fn align(self) -> u32 {
        match self {
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 | Self::Mat3 | Self::Mat4 => 16,
        }
    }

    #[must_use]
    pub const fn wgsl_name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Vec4 => "vec4<f32>",
            Self::Mat3 => "mat3x3<f32>",
            Self::Mat4 => "mat4x4<f32>",
        }
    }
}

/// Explicitly tagged uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    F32(f32),
    I32(i32),
    U32(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    #[must_use]
    pub fn ty(&self) -> UniformType {
        match self {
            Self::F32(_) => UniformType::F32,
            Self::I32(_) => UniformType::I32,
            Self::U32(_) => UniformType::U32,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Mat3(_) => UniformType::Mat3,
            Self::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Serializes into `out`, which must be exactly `ty().size()` bytes.
    fn write_to(&self, out: &mut [u8]) {
        match self {
            Self::F32(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::I32(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::U32(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec2(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec3(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec4(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Mat3(m) => {
                // Each column occupies a vec4 slot.
                for (i, col) in [m.x_axis, m.y_axis, m.z_axis].iter().enumerate() {
                    out[i * 16..i * 16 + 12].copy_from_slice(bytemuck::bytes_of(col));
                    out[i * 16 + 12..i * 16 + 16].fill(0);
                }
            }
            Self::Mat4(m) => out.copy_from_slice(bytemuck::bytes_of(m)),
        }
    }
}

macro_rules! impl_from_uniform {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }

            impl From<$ty> for FieldSource {
                fn from(v: $ty) -> Self {
                    Self::Value(UniformValue::$variant(v))
                }
            }
        )*
    };
}

impl_from_uniform! {
    f32 => F32,
    i32 => I32,
    u32 => U32,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat3 => Mat3,
    Mat4 => Mat4,
}

/// Producer of a field's value.
#[derive(Clone)]
pub enum FieldSource {
    Value(UniformValue),
    /// Re-evaluated on every update.
    Dynamic(Arc<dyn Fn() -> UniformValue + Send + Sync>),
}

impl FieldSource {
    pub fn dynamic(f: impl Fn() -> UniformValue + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    #[must_use]
    pub fn evaluate(&self) -> UniformValue {
        match self {
            Self::Value(v) => *v,
            Self::Dynamic(f) => f(),
        }
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }
}

impl std::fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<UniformValue> for FieldSource {
    fn from(v: UniformValue) -> Self {
        Self::Value(v)
    }
}

// ============================================================================
// Layout
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockField {
    pub name: String,
    pub ty: UniformType,
    pub offset: u32,
}

/// Byte layout of a uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    fields: Vec<BlockField>,
    size: u32,
}

impl BlockLayout {
    /// Lays out `fields` in declaration order.
    pub fn compute<'a>(fields: impl IntoIterator<Item = (&'a str, UniformType)>) -> Result<Self> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        let mut cursor = 0u32;
        for (name, ty) in fields {
            if !seen.insert(name) {
                return Err(Error::InvalidField(name.to_string()));
            }
            let offset = cursor.next_multiple_of(ty.align());
            cursor = offset + ty.size();
            out.push(BlockField {
                name: name.to_string(),
                ty,
                offset,
            });
        }
        Ok(Self {
            fields: out,
            size: cursor.next_multiple_of(16),
        })
    }

    #[must_use]
    pub fn fields(&self) -> &[BlockField] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&BlockField> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// WGSL struct declaration matching this layout.
    #[must_use]
    pub fn wgsl_struct(&self, struct_name: &str) -> String {
        let mut code = format!("struct {struct_name} {{\n");
        for field in &self.fields {
            code.push_str(&format!("    {}: {},\n", field.name, field.ty.wgsl_name()));
        }
        code.push_str("};\n");
        code
    }
}

// ============================================================================
// BlockRef
// ============================================================================

/// Observable uniform block backed by an [`ArrayRef`].
#[derive(Clone)]
pub struct BlockRef {
    array: ArrayRef,
    layout: Arc<BlockLayout>,
    sources: Arc<RwLock<Vec<FieldSource>>>,
}

impl std::fmt::Debug for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRef")
            .field("name", &self.array.name())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl BlockRef {
    /// Declares a block. Field types come from the initial value of each
    /// source; dynamic sources are evaluated once to learn theirs.
    pub fn new(name: &str, fields: Vec<(&str, FieldSource)>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::MissingField {
                context: format!("block `{name}`"),
                field: "fields",
            });
        }
        let layout = BlockLayout::compute(fields.iter().map(|(n, s)| (*n, s.evaluate().ty())))?;
        let sources: Vec<FieldSource> = fields.into_iter().map(|(_, s)| s).collect();
        let bytes = serialize(&layout, &sources);
        let array = ArrayRef::from_bytes(name, &bytes, layout.size() as usize)?;
        Ok(Self {
            array,
            layout: Arc::new(layout),
            sources: Arc::new(RwLock::new(sources)),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.array.name()
    }

    #[must_use]
    pub fn array(&self) -> &ArrayRef {
        &self.array
    }

    #[must_use]
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Replaces the source of one field. Takes effect on the next
    /// [`update`](Self::update).
    pub fn set_field(&self, name: &str, source: impl Into<FieldSource>) -> Result<()> {
        let source = source.into();
        let index = self
            .layout
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| Error::InvalidField(name.to_string()))?;
        let expected = self.layout.fields[index].ty;
        let actual = source.evaluate().ty();
        if expected != actual {
            return Err(Error::FieldType {
                field: name.to_string(),
                expected: expected.wgsl_name(),
                actual: actual.wgsl_name(),
            });
        }
        self.sources.write()[index] = source;
        Ok(())
    }

    /// Current value of a field, evaluating dynamic sources.
    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<UniformValue> {
        let index = self.layout.fields.iter().position(|f| f.name == name)?;
        Some(self.sources.read()[index].evaluate())
    }

    #[must_use]
    pub fn has_dynamic_fields(&self) -> bool {
        self.sources.read().iter().any(FieldSource::is_dynamic)
    }

    /// Reserializes every field and fires the reference callbacks.
    pub fn update(&self) -> Result<()> {
        let bytes = {
            let sources = self.sources.read();
            serialize(&self.layout, &sources)
        };
        self.array.set_value(&bytes)
    }
}

fn serialize(layout: &BlockLayout, sources: &[FieldSource]) -> Vec<u8> {
    let mut bytes = vec![0u8; layout.size() as usize];
    for (field, source) in layout.fields.iter().zip(sources) {
        let value = source.evaluate();
        if value.ty() != field.ty {
            log::warn!(
                "Dynamic field `{}` produced {}, expected {}; keeping zeros",
                field.name,
                value.ty().wgsl_name(),
                field.ty.wgsl_name()
            );
            continue;
        }
        let start = field.offset as usize;
        value.write_to(&mut bytes[start..start + field.ty.size() as usize]);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_is_aligned_to_sixteen() {
        let layout = BlockLayout::compute([
            ("time", UniformType::F32),
            ("position", UniformType::Vec3),
            ("scale", UniformType::F32),
        ])
        .unwrap();
        let offsets: Vec<u32> = layout.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 16, 28]);
        assert_eq!(layout.size(), 32);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let block = BlockRef::new("m", vec![("m", Mat3::IDENTITY.into())]).unwrap();
        let bytes = block.array().value().unwrap();
        assert_eq!(bytes.len(), 48);
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[0..4], &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&floats[4..8], &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(&floats[8..12], &[0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn duplicate_field_rejected() {
        let err = BlockLayout::compute([("a", UniformType::F32), ("a", UniformType::U32)]).unwrap_err();
        assert_eq!(err, Error::InvalidField("a".into()));
    }

    #[test]
    fn wgsl_struct_lists_fields_in_order() {
        let layout = BlockLayout::compute([("color", UniformType::Vec4), ("mvp", UniformType::Mat4)]).unwrap();
        let code = layout.wgsl_struct("Globals");
        assert_eq!(
            code,
            "struct Globals {\n    color: vec4<f32>,\n    mvp: mat4x4<f32>,\n};\n"
        );
    }
}

//! Caller configuration for compiling and binding stages.
//!
//! Everything deserialises from camelCase JSON so the CLI can read an options
//! file directly.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::transpiler::type_catalog::TypeCatalog;
use crate::transpiler::types::WgslType;

/// Explicit declaration for one identifier, bypassing inference.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum VariableOverride {
    Type(String),
    Full {
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        group: Option<u32>,
        #[serde(default)]
        binding: Option<u32>,
    },
}

impl VariableOverride {
    pub fn ty(&self) -> &str {
        match self {
            VariableOverride::Type(ty) | VariableOverride::Full { ty, .. } => ty,
        }
    }

    /// Storage prefix, defaulting from the type when absent.
    pub fn prefix(&self) -> String {
        if let VariableOverride::Full {
            prefix: Some(p), ..
        } = self
        {
            return p.clone();
        }
        let ty = self.ty().trim();
        if ty.starts_with("texture") || ty.starts_with("sampler") {
            "var".to_string()
        } else if ty.starts_with("array") {
            "var<storage, read_write>".to_string()
        } else {
            "var<uniform>".to_string()
        }
    }

    pub fn group(&self) -> Option<u32> {
        match self {
            VariableOverride::Full { group, .. } => *group,
            VariableOverride::Type(_) => None,
        }
    }

    pub fn binding(&self) -> Option<u32> {
        match self {
            VariableOverride::Full { binding, .. } => *binding,
            VariableOverride::Type(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepMode {
    #[default]
    Vertex,
    Instance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexField {
    pub name: String,
    pub ty: WgslType,
}

/// One vertex buffer: an ordered `name -> type` map plus an optional `stepMode` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBufferLayout {
    pub fields: Vec<VertexField>,
    pub step_mode: StepMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VertexAttributeDesc {
    pub location: u32,
    pub offset: u32,
    pub format: &'static str,
}

impl VertexBufferLayout {
    /// `vertex: vec4f, color: vec4f, uv: vec2f, normal: vec3f`.
    pub fn standard() -> Self {
        let field = |name: &str, ty: &str| VertexField {
            name: name.to_string(),
            ty: WgslType::parse(ty),
        };
        Self {
            fields: vec![
                field("vertex", "vec4f"),
                field("color", "vec4f"),
                field("uv", "vec2f"),
                field("normal", "vec3f"),
            ],
            step_mode: StepMode::Vertex,
        }
    }

    /// Tightly packed attributes starting at `first_location`.
    pub fn attributes(&self, first_location: u32) -> Vec<VertexAttributeDesc> {
        let catalog = TypeCatalog::standard();
        let mut offset = 0;
        let mut out = Vec::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            let (format, size) = catalog
                .get(&field.ty)
                .and_then(|info| info.vertex_formats.first().map(|f| (*f, info.size)))
                .unwrap_or(("float32", 4));
            out.push(VertexAttributeDesc {
                location: first_location + i as u32,
                offset,
                format,
            });
            offset += size;
        }
        out
    }

    pub fn array_stride(&self) -> u32 {
        let catalog = TypeCatalog::standard();
        self.fields
            .iter()
            .map(|f| catalog.get(&f.ty).map_or(4, |info| info.size))
            .sum()
    }
}

impl<'de> Deserialize<'de> for VertexBufferLayout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LayoutVisitor;

        impl<'de> Visitor<'de> for LayoutVisitor {
            type Value = VertexBufferLayout;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of vertex field names to WGSL types")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut fields = Vec::new();
                let mut step_mode = StepMode::Vertex;
                while let Some(key) = map.next_key::<String>()? {
                    if key == "stepMode" {
                        step_mode = map.next_value()?;
                        continue;
                    }
                    let ty: String = map.next_value()?;
                    if fields.iter().any(|f: &VertexField| f.name == key) {
                        return Err(de::Error::custom(format!("duplicate vertex field `{key}`")));
                    }
                    fields.push(VertexField {
                        name: key,
                        ty: WgslType::parse(&ty),
                    });
                }
                Ok(VertexBufferLayout { fields, step_mode })
            }
        }

        deserializer.deserialize_map(LayoutVisitor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextureSettings {
    pub format: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplerSettings {
    pub mag_filter: Option<String>,
    pub min_filter: Option<String>,
    pub mipmap_filter: Option<String>,
    pub address_mode_u: Option<String>,
    pub address_mode_v: Option<String>,
    pub address_mode_w: Option<String>,
    /// Comparison function for comparison samplers (`less`, `greater-equal`, ...).
    pub compare: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileOptions {
    #[serde(default)]
    pub variable_types: BTreeMap<String, VariableOverride>,
    #[serde(default)]
    pub workgroup_size: Option<u32>,
    #[serde(default)]
    pub vbos: Vec<VertexBufferLayout>,
    #[serde(default)]
    pub textures: BTreeMap<String, TextureSettings>,
    #[serde(default)]
    pub samplers: BTreeMap<String, SamplerSettings>,
    #[serde(default)]
    pub bind_group_number: u32,
    #[serde(default)]
    pub starting_binding: Option<u32>,
    #[serde(default = "default_true")]
    pub hoist_consts: bool,
    /// Extra helper function sources compiled into every stage.
    #[serde(default)]
    pub functions: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            variable_types: BTreeMap::new(),
            workgroup_size: None,
            vbos: Vec::new(),
            textures: BTreeMap::new(),
            samplers: BTreeMap::new(),
            bind_group_number: 0,
            starting_binding: None,
            hoist_consts: true,
            functions: Vec::new(),
        }
    }
}

impl CompileOptions {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Configured vertex buffers, or the standard single buffer.
    pub fn vertex_buffers(&self) -> Vec<VertexBufferLayout> {
        if self.vbos.is_empty() {
            vec![VertexBufferLayout::standard()]
        } else {
            self.vbos.clone()
        }
    }

    /// All interstage fields across vertex buffers, in location order.
    pub fn vertex_fields(&self) -> Vec<VertexField> {
        self.vertex_buffers()
            .into_iter()
            .flat_map(|b| b.fields)
            .collect()
    }

    pub fn texture_format(&self, name: &str) -> Option<&str> {
        self.textures.get(name).and_then(|t| t.format.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let o = CompileOptions::from_json("{}").unwrap();
        assert!(o.hoist_consts);
        assert_eq!(o.bind_group_number, 0);
        assert_eq!(o, CompileOptions::default());
        assert_eq!(o.vertex_fields().len(), 4);
    }

    #[test]
    fn test_vbo_field_order_is_document_order() {
        let o = CompileOptions::from_json(
            r#"{"vbos": [{"zeta": "vec2f", "alpha": "f32", "stepMode": "instance", "id": "u32"}]}"#,
        )
        .unwrap();
        let names: Vec<&str> = o.vbos[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "id"]);
        assert_eq!(o.vbos[0].step_mode, StepMode::Instance);
        let attrs = o.vbos[0].attributes(0);
        assert_eq!(attrs[1].offset, 8);
        assert_eq!(attrs[2].format, "uint32");
        assert_eq!(o.vbos[0].array_stride(), 16);
    }

    #[test]
    fn test_variable_override_shapes() {
        let o = CompileOptions::from_json(
            r#"{"variableTypes": {
                "tex": "texture_2d<f32>",
                "buf": {"type": "array<u32>", "prefix": "var<storage, read>", "binding": 5},
                "scale": "f32"
            }, "hoistConsts": false, "workgroupSize": 128}"#,
        )
        .unwrap();
        assert_eq!(o.variable_types["tex"].prefix(), "var");
        assert_eq!(o.variable_types["buf"].prefix(), "var<storage, read>");
        assert_eq!(o.variable_types["buf"].binding(), Some(5));
        assert_eq!(o.variable_types["scale"].prefix(), "var<uniform>");
        assert!(!o.hoist_consts);
        assert_eq!(o.workgroup_size, Some(128));
    }
}

//! YAML model definitions
//!
//! A definition document carries two sections: `models` describes register
//! layouts, `data` holds values for device images. Layout problems that do
//! not prevent the rest of the document from loading are collected, not
//! raised.
//!
//! ```yaml
//! models:
//!   - id: 1
//!     name: common
//!     blocks:
//!       - points:
//!           - { name: Mn, type: string, len: 32 }
//!           - { name: DA, type: uint16 }
//! data:
//!   - name: common
//!     model: 1
//!     values:
//!       Mn: Acme
//!       DA: 1
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SunsError};
use crate::model::{DataPoint, DataPointBlock, Define, Model, ModelRegistry, ModelRegistryBuilder};
use crate::register_map::{encode_data_block, DataBlock, PointValue, RegisterTable};
use crate::types::{tag_from_name, TypeSpec, TypeTag};
use crate::value::Value;
use crate::wire::wire_bytes_to_registers;

// ============================================================================
// Document shape
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    #[serde(default)]
    models: Vec<ModelSource>,
    #[serde(default)]
    data: Vec<DataSource>,
}

/// A model as written in a definition document
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSource {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<BlockSource>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BlockSource {
    #[serde(default)]
    pub repeating: bool,
    #[serde(default)]
    pub points: Vec<PointSource>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PointSource {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defines: Vec<DefineSource>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DefineSource {
    pub name: String,
    pub value: u32,
}

/// Values for one model instance of a device image
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DataSource {
    pub name: String,
    pub model: u16,
    #[serde(default)]
    pub repeats: usize,
    /// Hex image of header and payload, used verbatim instead of `values`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Point name to value; a list gives one value per repeat instance
    #[serde(default)]
    pub values: BTreeMap<String, serde_yaml::Value>,
}

impl ModelSource {
    /// Build the unresolved model, recording points that could not be typed
    fn to_model(&self, errors: &mut Vec<SunsError>) -> Model {
        let blocks = self
            .blocks
            .iter()
            .map(|block| {
                let points = block
                    .points
                    .iter()
                    .map(|point| point.to_data_point(&self.name, errors))
                    .collect();
                if block.repeating {
                    DataPointBlock::repeating(points)
                } else {
                    DataPointBlock::new(points)
                }
            })
            .collect();
        Model::new(blocks)
    }

    /// Description of a resolved model entry
    pub fn from_model(id: u16, name: &str, model: &Model) -> Self {
        Self {
            id,
            name: name.to_string(),
            blocks: model
                .blocks
                .iter()
                .map(|block| BlockSource {
                    repeating: block.repeating,
                    points: block
                        .points
                        .iter()
                        .map(|p| PointSource {
                            name: p.name.clone(),
                            type_name: p.spec.tag.name().to_string(),
                            len: p.spec.len,
                            offset: p.offset,
                            defines: p
                                .defines
                                .iter()
                                .map(|d| DefineSource {
                                    name: d.name.clone(),
                                    value: d.value,
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl PointSource {
    fn to_data_point(&self, model: &str, errors: &mut Vec<SunsError>) -> DataPoint {
        let tag = tag_from_name(&self.type_name);
        let spec = match tag {
            TypeTag::Undefined if self.type_name != TypeTag::Undefined.name() => {
                let e = SunsError::definition(format!(
                    "{}.{}: unknown type '{}'",
                    model, self.name, self.type_name
                ));
                warn!("{}", e);
                errors.push(e);
                TypeSpec::new(TypeTag::Undefined)
            },
            TypeTag::String => {
                let len = self.len.unwrap_or_else(|| {
                    let e = SunsError::definition(format!(
                        "{}.{}: string without a length",
                        model, self.name
                    ));
                    warn!("{}", e);
                    errors.push(e);
                    0
                });
                TypeSpec::string(len)
            },
            tag => TypeSpec::new(tag),
        };

        let mut point = DataPoint::new(self.name.clone(), spec);
        point.offset = self.offset;
        point.defines = self
            .defines
            .iter()
            .map(|d| Define::new(d.name.clone(), d.value))
            .collect();
        point
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Parsed content of one or more definition documents
#[derive(Debug, Default)]
pub struct Definitions {
    pub models: ModelRegistryBuilder,
    pub data: Vec<DataSource>,
    /// Recoverable problems found while loading
    pub errors: Vec<SunsError>,
}

impl Definitions {
    /// Fold another document in; duplicate model ids keep the first definition
    pub fn merge(&mut self, other: Definitions) {
        let duplicates = self.models.merge(other.models);
        self.errors.extend(other.errors);
        self.errors.extend(duplicates);
        self.data.extend(other.data);
    }
}

/// Parse a YAML definition document.
///
/// Malformed YAML is an error; unknown type names and duplicate model ids are
/// returned in [`Definitions::errors`].
pub fn parse_definitions(source: &str) -> Result<Definitions> {
    let file: DefinitionFile = serde_yaml::from_str(source)?;
    let mut definitions = Definitions::default();

    for model in &file.models {
        let built = model.to_model(&mut definitions.errors);
        if let Err(e) = definitions.models.insert(model.id, model.name.clone(), built) {
            warn!("{}", e);
            definitions.errors.push(e);
        }
    }
    definitions.data = file.data;

    debug!(
        "Parsed {} models and {} data blocks ({} problems)",
        definitions.models.len(),
        definitions.data.len(),
        definitions.errors.len()
    );
    Ok(definitions)
}

/// Read and parse a definition file
pub fn load_definitions(path: impl AsRef<Path>) -> Result<Definitions> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .map_err(|e| SunsError::io(format!("{}: {}", path.display(), e)))?;
    let definitions = parse_definitions(&source)?;
    info!(
        "Loaded {} models from {}",
        definitions.models.len(),
        path.display()
    );
    Ok(definitions)
}

// ============================================================================
// Data binding
// ============================================================================

impl DataSource {
    /// Typed values for this block against a resolved registry
    pub fn bind(&self, registry: &ModelRegistry) -> Result<DataBlock> {
        let entry = registry
            .get(self.model)
            .ok_or(SunsError::UnknownModel(self.model))?;
        let mut block = DataBlock::new(self.name.clone(), self.model).with_repeats(self.repeats);

        for (name, literal) in &self.values {
            let point = entry.model.point(name).ok_or_else(|| {
                SunsError::definition(format!(
                    "data block {}: model {} has no point {}",
                    self.name, entry.name, name
                ))
            })?;
            match literal {
                serde_yaml::Value::Sequence(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let value = literal_value(point, item)?;
                        block.values.push(PointValue::new(name.clone(), value).at(i));
                    }
                },
                single => {
                    let value = literal_value(point, single)?;
                    block.values.push(PointValue::new(name.clone(), value));
                },
            }
        }
        Ok(block)
    }

    /// Header and payload registers for this block
    pub fn registers(&self, registry: &ModelRegistry) -> Result<Vec<u16>> {
        match &self.raw {
            Some(raw) => {
                let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = hex::decode(&compact).map_err(|e| {
                    SunsError::definition(format!("data block {}: bad hex image: {}", self.name, e))
                })?;
                Ok(wire_bytes_to_registers(&bytes))
            },
            None => {
                let entry = registry
                    .get(self.model)
                    .ok_or(SunsError::UnknownModel(self.model))?;
                encode_data_block(entry, &self.bind(registry)?)
            },
        }
    }
}

/// Register image at `base` holding every data block in order
pub fn build_register_table(
    registry: &ModelRegistry,
    base: u16,
    sources: &[DataSource],
) -> Result<RegisterTable> {
    let mut builder = RegisterTable::builder(base);
    for source in sources {
        builder.push_registers(&source.registers(registry)?);
    }
    builder.finish()
}

/// Typed value of a YAML scalar for `point`. Enum and bitfield points also
/// accept a define name.
fn literal_value(point: &DataPoint, literal: &serde_yaml::Value) -> Result<Value> {
    let invalid = || {
        SunsError::definition(format!(
            "point {}: {:?} is not a valid {}",
            point.name, literal, point.spec
        ))
    };
    let define = || {
        literal
            .as_str()
            .and_then(|name| point.defines.iter().find(|d| d.name == name))
            .map(|d| d.value)
    };

    let value = match point.spec.tag {
        TypeTag::Int16 => Value::from_int16(integer(literal).ok_or_else(invalid)?),
        TypeTag::ScaleFactor => Value::from_scale_factor(integer(literal).ok_or_else(invalid)?),
        TypeTag::UInt16 => Value::from_uint16(integer(literal).ok_or_else(invalid)?),
        TypeTag::Acc16 => Value::from_acc16(integer(literal).ok_or_else(invalid)?),
        TypeTag::Enum16 => Value::from_enum16(
            integer(literal)
                .or_else(|| define().and_then(|v| u16::try_from(v).ok()))
                .ok_or_else(invalid)?,
        ),
        TypeTag::Bitfield16 => Value::from_bitfield16(
            integer(literal)
                .or_else(|| define().and_then(|v| u16::try_from(v).ok()))
                .ok_or_else(invalid)?,
        ),
        TypeTag::Int32 => Value::from_int32(integer(literal).ok_or_else(invalid)?),
        TypeTag::UInt32 => Value::from_uint32(integer(literal).ok_or_else(invalid)?),
        TypeTag::Acc32 => Value::from_acc32(integer(literal).ok_or_else(invalid)?),
        TypeTag::Bitfield32 => Value::from_bitfield32(
            integer(literal).or_else(define).ok_or_else(invalid)?,
        ),
        TypeTag::Float32 => Value::from_float32(literal.as_f64().ok_or_else(invalid)? as f32),
        TypeTag::Int64 => Value::from_int64(literal.as_i64().ok_or_else(invalid)?),
        TypeTag::UInt64 => Value::from_uint64(literal.as_u64().ok_or_else(invalid)?),
        TypeTag::Float64 => Value::from_float64(literal.as_f64().ok_or_else(invalid)?),
        TypeTag::String => Value::from_string(
            literal.as_str().ok_or_else(invalid)?,
            point.spec.len.unwrap_or(0),
        ),
        TypeTag::Null | TypeTag::Undefined => return Err(SunsError::UnsupportedType(point.spec.tag)),
    };
    Ok(value)
}

fn integer<T: TryFrom<i64>>(literal: &serde_yaml::Value) -> Option<T> {
    literal.as_i64().and_then(|v| T::try_from(v).ok())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is fine in tests
mod tests {
    use super::*;
    use crate::discovery::Scanner;
    use crate::error::ErrorKind;

    const INVERTER: &str = r#"
models:
  - id: 1
    name: common
    blocks:
      - points:
          - { name: Mn, type: string, len: 8 }
          - { name: DA, type: uint16 }
  - id: 160
    name: mppt
    blocks:
      - points:
          - { name: DCA_SF, type: sunssf }
          - name: Evt
            type: bitfield32
            defines:
              - { name: GROUND_FAULT, value: 1 }
              - { name: OVER_TEMP, value: 128 }
      - repeating: true
        points:
          - { name: ID, type: uint16 }
          - name: St
            type: enum16
            defines:
              - { name: OFF, value: 1 }
              - { name: MPPT, value: 4 }
data:
  - name: common
    model: 1
    values:
      Mn: Acme
      DA: 1
  - name: mppt
    model: 160
    repeats: 2
    values:
      DCA_SF: -2
      Evt: OVER_TEMP
      ID: [1, 2]
      St: [MPPT, 1]
"#;

    fn registry(source: &str) -> (ModelRegistry, Vec<DataSource>) {
        let definitions = parse_definitions(source).unwrap();
        assert!(definitions.errors.is_empty(), "{:?}", definitions.errors);
        (definitions.models.build().unwrap(), definitions.data)
    }

    #[test]
    fn test_parse_and_resolve() {
        let (registry, data) = registry(INVERTER);
        assert_eq!(registry.len(), 2);
        assert_eq!(data.len(), 2);

        let mppt = &registry.get(160).unwrap().model;
        assert_eq!(mppt.base_len(), 3);
        assert_eq!(mppt.repeat_len(), 2);
        assert_eq!(mppt.point("St").unwrap().offset, Some(7));
        assert_eq!(mppt.point("Evt").unwrap().defines.len(), 2);
    }

    #[test]
    fn test_unknown_type_is_recorded() {
        let source = r#"
models:
  - id: 7
    name: odd
    blocks:
      - points:
          - { name: A, type: float128 }
          - { name: B, type: uint16 }
"#;
        let definitions = parse_definitions(source).unwrap();
        assert_eq!(definitions.errors.len(), 1);
        assert_eq!(definitions.errors[0].kind(), ErrorKind::Definition);

        let registry = definitions.models.build().unwrap();
        let model = &registry.get(7).unwrap().model;
        assert_eq!(model.point("A").unwrap().spec.tag, TypeTag::Undefined);
        assert_eq!(model.point("B").unwrap().offset, Some(3));
    }

    #[test]
    fn test_merge_keeps_first_definition() {
        let mut first = parse_definitions(INVERTER).unwrap();
        let second = parse_definitions(
            "models:\n  - id: 1\n    name: other\n    blocks: []\n",
        )
        .unwrap();
        first.merge(second);
        assert_eq!(first.errors.len(), 1);
        let registry = first.models.build().unwrap();
        assert_eq!(registry.get(1).unwrap().name, "common");
    }

    #[test]
    fn test_malformed_yaml_fails() {
        assert!(parse_definitions("models: [").is_err());
        assert!(parse_definitions("modles: []").is_err());
    }

    #[test]
    fn test_bind_literals() {
        let (registry, data) = registry(INVERTER);
        let block = data[1].bind(&registry).unwrap();
        assert_eq!(block.repeats, 2);
        assert!(block
            .values
            .contains(&PointValue::new("Evt", Value::from_bitfield32(128))));
        assert!(block
            .values
            .contains(&PointValue::new("St", Value::from_enum16(4)).at(0)));
        assert!(block
            .values
            .contains(&PointValue::new("DCA_SF", Value::from_scale_factor(-2))));
    }

    #[test]
    fn test_bind_rejects_bad_literal() {
        let (registry, _) = registry(INVERTER);
        let source: DataSource = serde_yaml::from_str(
            "name: bad\nmodel: 1\nvalues:\n  DA: seventy\n",
        )
        .unwrap();
        assert_eq!(source.bind(&registry).unwrap_err().kind(), ErrorKind::Definition);

        let missing: DataSource =
            serde_yaml::from_str("name: bad\nmodel: 1\nvalues:\n  XX: 1\n").unwrap();
        assert!(missing.bind(&registry).is_err());
    }

    #[test]
    fn test_raw_hex_block() {
        let (registry, _) = registry(INVERTER);
        let source: DataSource =
            serde_yaml::from_str("name: raw\nmodel: 900\nraw: \"0384 0001 abcd\"\n").unwrap();
        assert_eq!(source.registers(&registry).unwrap(), vec![900, 1, 0xabcd]);
    }

    #[test]
    fn test_image_scans_back() {
        let (registry, data) = registry(INVERTER);
        let table = build_register_table(&registry, 40001, &data).unwrap();
        let report = Scanner::new(&registry, table).scan().unwrap();

        let datasets: Vec<_> = report.datasets().collect();
        assert_eq!(datasets[0].get("Mn").unwrap().string(), Ok("Acme"));
        let mppt = datasets[1];
        assert_eq!(mppt.repeat_count(), 2);
        let states: Vec<_> = mppt.all("St").flat_map(|v| v.labels()).collect();
        assert_eq!(states, vec!["MPPT", "OFF"]);
        assert_eq!(mppt.values[1].labels(), vec!["OVER_TEMP"]);
    }

    #[test]
    fn test_description_round_trip() {
        let (registry, _) = registry(INVERTER);
        let entry = registry.get(160).unwrap();
        let source = ModelSource::from_model(entry.id, &entry.name, &entry.model);
        let yaml = serde_yaml::to_string(&source).unwrap();
        assert!(yaml.contains("sunssf"));

        let mut errors = Vec::new();
        let mut rebuilt = serde_yaml::from_str::<ModelSource>(&yaml)
            .unwrap()
            .to_model(&mut errors);
        crate::resolver::resolve_model("mppt", &mut rebuilt).unwrap();
        assert!(errors.is_empty());
        assert_eq!(rebuilt, entry.model);
    }
}

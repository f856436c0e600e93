//! Model definitions and the model id registry
//!
//! Models are assembled by a definition source, resolved once by
//! [`ModelRegistryBuilder::build`], and read-only afterwards. Decoders borrow
//! the registry; nothing in here is global.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{Result, SunsError};
use crate::resolver::{self, Resolution};
use crate::types::{TypeSpec, TypeTag};

/// Number of header registers (model id + length) in front of every model
pub const MODEL_HEADER_REGISTERS: u16 = 2;

/// 1-based offset of the first data register of a model
pub const FIRST_DATA_OFFSET: u16 = MODEL_HEADER_REGISTERS + 1;

/// Header size in wire bytes
pub const MODEL_HEADER_BYTES: usize = MODEL_HEADER_REGISTERS as usize * 2;

/// Symbolic label for an enum value or bitfield flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    pub name: String,
    pub value: u32,
}

impl Define {
    pub fn new(name: impl Into<String>, value: u32) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One named field of a data block
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub name: String,
    pub spec: TypeSpec,
    /// 1-based register offset within the model; filled in by the resolver
    /// when not given explicitly
    pub offset: Option<u16>,
    pub defines: Vec<Define>,
}

impl DataPoint {
    pub fn new(name: impl Into<String>, spec: impl Into<TypeSpec>) -> Self {
        Self {
            name: name.into(),
            spec: spec.into(),
            offset: None,
            defines: Vec::new(),
        }
    }

    pub fn with_offset(mut self, offset: u16) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_define(mut self, define: Define) -> Self {
        self.defines.push(define);
        self
    }

    pub fn size(&self) -> usize {
        self.spec.size()
    }

    /// Define whose value equals an enum reading
    pub fn enum_label(&self, value: u32) -> Option<&Define> {
        let found = self.defines.iter().find(|d| d.value == value);
        if found.is_none() {
            debug!("{}: value {} not found in defines", self.name, value);
        }
        found
    }

    /// Every define whose flag bits are set in a bitfield reading
    pub fn bitfield_labels(&self, value: u32) -> Vec<&Define> {
        self.defines
            .iter()
            .filter(|d| d.value & value != 0)
            .collect()
    }
}

/// Ordered group of data points, optionally repeating
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataPointBlock {
    pub points: Vec<DataPoint>,
    pub repeating: bool,
    /// Length in registers, computed by the resolver
    pub(crate) len: u16,
    /// Model-relative register offset where the block begins
    pub(crate) start: u16,
}

impl DataPointBlock {
    pub fn new(points: Vec<DataPoint>) -> Self {
        Self {
            points,
            repeating: false,
            len: 0,
            start: 0,
        }
    }

    pub fn repeating(points: Vec<DataPoint>) -> Self {
        Self {
            points,
            repeating: true,
            len: 0,
            start: 0,
        }
    }

    /// Length of one instance in registers
    pub fn len(&self) -> u16 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Byte position of `point` inside one instance of this block.
    ///
    /// Unresolved points fall back to `cursor`, the end of the previous field.
    /// The resolver rejects explicit offsets before `start`.
    pub(crate) fn position_of(&self, point: &DataPoint, cursor: usize) -> usize {
        match point.offset {
            Some(offset) => usize::from(offset.saturating_sub(self.start)) * 2,
            None => cursor,
        }
    }
}

/// A device data block definition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub blocks: Vec<DataPointBlock>,
    /// Registers up to the optional repeating block
    pub(crate) base_len: u16,
    /// `base_len` plus one repeat unit
    pub(crate) len: u16,
}

impl Model {
    pub fn new(blocks: Vec<DataPointBlock>) -> Self {
        Self {
            blocks,
            base_len: 0,
            len: 0,
        }
    }

    pub fn base_len(&self) -> u16 {
        self.base_len
    }

    pub fn len(&self) -> u16 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn has_repeating_block(&self) -> bool {
        self.base_len != self.len
    }

    /// Registers in one instance of the repeating block, 0 if there is none
    pub fn repeat_len(&self) -> u16 {
        self.len - self.base_len
    }

    pub fn points(&self) -> impl Iterator<Item = &DataPoint> {
        self.blocks.iter().flat_map(|b| b.points.iter())
    }

    pub fn point(&self, name: &str) -> Option<&DataPoint> {
        self.points().find(|p| p.name == name)
    }

    /// Check a declared on-wire length against this model's geometry.
    ///
    /// Returns the mismatch as an error value; callers log it and carry on.
    pub fn check_length(&self, model_id: u16, declared: u16) -> Option<SunsError> {
        if self.has_repeating_block() {
            let repeat = self.repeat_len();
            let fits = declared
                .checked_sub(self.base_len)
                .is_some_and(|extra| extra % repeat == 0);
            if !fits {
                return Some(SunsError::LengthMismatch {
                    model_id,
                    declared,
                    expected: format!(
                        "expected {} plus a multiple of {}",
                        self.base_len, repeat
                    ),
                });
            }
        } else if declared != self.len {
            return Some(SunsError::LengthMismatch {
                model_id,
                declared,
                expected: format!("model defines {}", self.len),
            });
        }
        None
    }
}

/// Registry entry: a model id bound to its definition
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEntry {
    pub id: u16,
    pub name: String,
    pub model: Model,
}

/// Collects model definitions before resolution
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    entries: BTreeMap<u16, ModelEntry>,
}

impl ModelRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model. A duplicate id is rejected and the first definition kept.
    pub fn insert(&mut self, id: u16, name: impl Into<String>, model: Model) -> Result<()> {
        let name = name.into();
        if let Some(existing) = self.entries.get(&id) {
            return Err(SunsError::definition(format!(
                "model id {} ({}) already defined as {}",
                id, name, existing.name
            )));
        }
        self.entries.insert(id, ModelEntry { id, name, model });
        Ok(())
    }

    /// Take every model of `other`, reporting duplicate ids
    pub fn merge(&mut self, other: ModelRegistryBuilder) -> Vec<SunsError> {
        let mut errors = Vec::new();
        for (id, entry) in other.entries {
            if let Err(e) = self.insert(id, entry.name, entry.model) {
                warn!("{}", e);
                errors.push(e);
            }
        }
        errors
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every model and freeze the registry
    pub fn build(self) -> Result<ModelRegistry> {
        let mut entries = self.entries;
        for entry in entries.values_mut() {
            let Resolution { warnings } = resolver::resolve_model(&entry.name, &mut entry.model)?;
            for warning in warnings {
                warn!("model {} ({}): {}", entry.id, entry.name, warning.message);
            }
            debug!(
                "Resolved model {} ({}): base_len={}, len={}",
                entry.id, entry.name, entry.model.base_len, entry.model.len
            );
        }
        Ok(ModelRegistry { entries })
    }
}

/// Read-only map from model id to resolved model
#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<u16, ModelEntry>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::new()
    }

    pub fn get(&self, id: u16) -> Option<&ModelEntry> {
        let entry = self.entries.get(&id);
        if entry.is_none() {
            debug!("no model registered for id {}", id);
        }
        entry
    }

    pub fn contains(&self, id: u16) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ModelEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Points of a block whose type cannot be decoded
pub(crate) fn is_skipped(spec: TypeSpec) -> bool {
    matches!(spec.tag, TypeTag::Null | TypeTag::Undefined)
}

//! Block and dataset decoding
//!
//! Turns one model instance read from a device (header plus payload, already
//! in wire byte order) into decoded values. Soft problems are collected as
//! diagnostics on the [`Dataset`]; decoding never reads past the buffer.

use bytes::Buf;
use tracing::{error, trace, warn};

use crate::codec;
use crate::error::{Diagnostic, ErrorKind, Result, SunsError};
use crate::model::{
    is_skipped, DataPoint, DataPointBlock, ModelEntry, ModelRegistry, MODEL_HEADER_BYTES,
};
use crate::types::TypeTag;
use crate::value::Value;

/// One decoded field, tied to the definition it came from
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue<'r> {
    pub point: &'r DataPoint,
    /// Instance index within a repeating block, `None` for fixed blocks
    pub repeat: Option<usize>,
    pub value: Value,
}

impl DecodedValue<'_> {
    pub fn name(&self) -> &str {
        &self.point.name
    }

    /// Symbolic labels for enum and bitfield readings
    pub fn labels(&self) -> Vec<&str> {
        let Some(raw) = self.value.as_u32().filter(|_| self.value.is_ok()) else {
            return Vec::new();
        };
        match self.value.tag() {
            TypeTag::Enum16 => self
                .point
                .enum_label(raw)
                .map(|d| vec![d.name.as_str()])
                .unwrap_or_default(),
            TypeTag::Bitfield16 | TypeTag::Bitfield32 => self
                .point
                .bitfield_labels(raw)
                .into_iter()
                .map(|d| d.name.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Result of decoding a single block
#[derive(Debug, Default)]
pub struct BlockDecode<'b> {
    pub values: Vec<DecodedValue<'b>>,
    pub consumed: usize,
    /// Set when the block stopped early
    pub diagnostic: Option<Diagnostic>,
}

/// Decoded instance of one model
#[derive(Debug, Clone)]
pub struct Dataset<'r> {
    pub entry: &'r ModelEntry,
    /// Length in registers as declared by the device
    pub declared_len: u16,
    pub values: Vec<DecodedValue<'r>>,
    pub diagnostics: Vec<Diagnostic>,
    /// Decoding stopped before the model geometry was exhausted
    pub partial: bool,
}

impl<'r> Dataset<'r> {
    fn new(entry: &'r ModelEntry, declared_len: u16) -> Self {
        Self {
            entry,
            declared_len,
            values: Vec::new(),
            diagnostics: Vec::new(),
            partial: false,
        }
    }

    pub fn model_id(&self) -> u16 {
        self.entry.id
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// First value decoded for the named point
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|v| v.point.name == name)
            .map(|v| &v.value)
    }

    /// Every instance of the named point, in repeat order
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a DecodedValue<'r>> + 'a {
        self.values.iter().filter(move |v| v.point.name == name)
    }

    /// Number of repeating block instances that were decoded
    pub fn repeat_count(&self) -> usize {
        self.values
            .iter()
            .filter_map(|v| v.repeat)
            .max()
            .map_or(0, |last| last + 1)
    }

    fn note(&mut self, diagnostic: Diagnostic) {
        warn!("model {} ({}): {}", self.entry.id, self.entry.name, diagnostic.message);
        self.diagnostics.push(diagnostic);
    }
}

/// Decode one block against `bytes`.
///
/// A repeating block is decoded as many whole times as fit in `bytes`, and
/// trailing bytes too short for another instance give an overrun diagnostic.
/// A field that does not fit ends the block with a truncation diagnostic.
pub fn decode_block<'b>(block: &'b DataPointBlock, bytes: &[u8]) -> BlockDecode<'b> {
    let available = bytes.len();
    let unit = usize::from(block.len()) * 2;
    let mut decoded = BlockDecode::default();

    let repeats = if !block.repeating {
        1
    } else if unit == 0 {
        decoded.diagnostic = Some(Diagnostic::warning(
            ErrorKind::Truncation,
            "repeating block has zero length; no instances decoded",
        ));
        0
    } else {
        available / unit
    };

    for repeat in 0..repeats {
        let origin = repeat * unit;
        let index = block.repeating.then_some(repeat);
        let mut cursor = 0;

        for point in &block.points {
            if is_skipped(point.spec) {
                trace!("{}: {} is not decodable, skipped", point.name, point.spec);
                decoded.values.push(DecodedValue {
                    point,
                    repeat: index,
                    value: Value::undefined(point.spec),
                });
                continue;
            }

            let position = block.position_of(point, cursor);
            let start = origin + position;
            let end = start + point.size();
            if end > available {
                decoded.diagnostic = Some(Diagnostic::from(&SunsError::Truncated {
                    needed: end,
                    available,
                }));
                decoded.consumed = decoded.consumed.max(origin + cursor).min(available);
                return decoded;
            }

            let value = codec::decode(&bytes[start..end], point.spec)
                .unwrap_or_else(|_| Value::undefined(point.spec));
            decoded.values.push(DecodedValue {
                point,
                repeat: index,
                value,
            });
            cursor = position + usize::from(point.spec.registers()) * 2;
        }

        decoded.consumed = (origin + unit.max(cursor)).min(available);
    }

    if block.repeating && unit > 0 && available % unit != 0 {
        decoded.diagnostic = Some(Diagnostic::warning(
            ErrorKind::Overrun,
            format!(
                "{} trailing bytes do not fill a {} byte repeat instance",
                available % unit,
                unit
            ),
        ));
    }

    decoded
}

/// Decode a model instance: 2 bytes id, 2 bytes length, then the payload.
///
/// An unregistered id is [`SunsError::UnknownModel`] and a buffer shorter
/// than the header is [`SunsError::Truncated`]. Everything else is reported
/// on the returned dataset.
pub fn decode_dataset<'r>(registry: &'r ModelRegistry, buffer: &[u8]) -> Result<Dataset<'r>> {
    if buffer.len() < MODEL_HEADER_BYTES {
        return Err(SunsError::Truncated {
            needed: MODEL_HEADER_BYTES,
            available: buffer.len(),
        });
    }

    let mut header = &buffer[..MODEL_HEADER_BYTES];
    let model_id = header.get_u16();
    let declared = header.get_u16();

    let entry = registry.get(model_id).ok_or(SunsError::UnknownModel(model_id))?;
    let model = &entry.model;
    let mut dataset = Dataset::new(entry, declared);

    if let Some(mismatch) = model.check_length(model_id, declared) {
        dataset.note(Diagnostic::from(&mismatch));
    }

    // Fixed models decode with their own geometry, repeating ones with the
    // declared length so every instance the device reports is visited
    let payload = &buffer[MODEL_HEADER_BYTES..];
    let wanted = if model.has_repeating_block() {
        usize::from(declared) * 2
    } else {
        usize::from(model.len()) * 2
    };
    if wanted > payload.len() {
        error!(
            "model {} ({}): payload needs {} bytes but buffer holds {}",
            model_id,
            entry.name,
            wanted,
            payload.len()
        );
        dataset.partial = true;
        dataset.diagnostics.push(Diagnostic::warning(
            ErrorKind::Overrun,
            format!(
                "payload needs {} bytes but buffer holds {}",
                wanted,
                payload.len()
            ),
        ));
    }
    let limit = wanted.min(payload.len());

    let mut cursor = 0;
    for block in &model.blocks {
        let decoded = decode_block(block, &payload[cursor..limit]);
        cursor += decoded.consumed;
        dataset.values.extend(decoded.values);
        if let Some(diagnostic) = decoded.diagnostic {
            match diagnostic.kind {
                ErrorKind::Overrun => {
                    error!(
                        "model {} ({}): {}",
                        model_id, entry.name, diagnostic.message
                    );
                    dataset.partial = true;
                    dataset.diagnostics.push(diagnostic);
                },
                ErrorKind::Truncation if !block.is_empty() => {
                    dataset.partial = true;
                    dataset.note(diagnostic);
                },
                _ => dataset.note(diagnostic),
            }
            break;
        }
    }

    trace!(
        "Decoded model {} ({}): {} values from {} payload bytes",
        model_id,
        entry.name,
        dataset.values.len(),
        cursor
    );
    Ok(dataset)
}

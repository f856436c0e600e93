//! Device register image
//!
//! Builds the register space a SunSpec device would expose: signature at the
//! base register, model instances encoded from data blocks, then the end
//! marker. The finished [`RegisterTable`] answers reads like a device does.

use tracing::{debug, trace, warn};

use crate::codec;
use crate::discovery::{RegisterTransport, END_MARKER, SUNS_SIGNATURE};
use crate::error::{Result, SunsError};
use crate::model::{is_skipped, DataPoint, ModelEntry, ModelRegistry};
use crate::types::TypeTag;
use crate::value::Value;
use crate::wire::wire_bytes_to_registers;

/// Value for one point of a data block
#[derive(Debug, Clone, PartialEq)]
pub struct PointValue {
    pub point: String,
    /// Repeat instance; `None` applies to every instance
    pub repeat: Option<usize>,
    pub value: Value,
}

impl PointValue {
    pub fn new(point: impl Into<String>, value: Value) -> Self {
        Self {
            point: point.into(),
            repeat: None,
            value,
        }
    }

    pub fn at(mut self, repeat: usize) -> Self {
        self.repeat = Some(repeat);
        self
    }
}

/// Values of one model instance to place in a register table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBlock {
    pub name: String,
    pub model_id: u16,
    /// Instances of the repeating block, ignored for fixed models
    pub repeats: usize,
    pub values: Vec<PointValue>,
}

impl DataBlock {
    pub fn new(name: impl Into<String>, model_id: u16) -> Self {
        Self {
            name: name.into(),
            model_id,
            ..Default::default()
        }
    }

    pub fn with_repeats(mut self, repeats: usize) -> Self {
        self.repeats = repeats;
        self
    }

    pub fn with_value(mut self, value: PointValue) -> Self {
        self.values.push(value);
        self
    }

    fn value_for(&self, point: &str, repeat: Option<usize>) -> Option<&Value> {
        self.values
            .iter()
            .rev()
            .find(|v| v.point == point && (v.repeat.is_none() || v.repeat == repeat))
            .map(|v| &v.value)
    }
}

/// Match a supplied value to its point's declared type
fn coerce(point: &DataPoint, value: &Value) -> Result<Value> {
    if value.tag() != point.spec.tag {
        return Err(SunsError::TypeMismatch {
            expected: point.spec.tag,
            actual: value.tag(),
        });
    }
    if point.spec.tag == TypeTag::String && value.spec() != point.spec {
        let len = point.spec.len.unwrap_or(0);
        let bytes = value.string_bytes()?;
        return Ok(match std::str::from_utf8(bytes) {
            Ok(s) => Value::from_string(s, len),
            Err(_) => Value::from_string_bytes(bytes, len),
        });
    }
    Ok(value.clone())
}

/// Encode `block` as a model instance: header registers then payload.
///
/// Points without a supplied value carry their type's not-implemented
/// pattern. 64-bit points cannot be encoded and stay zero.
pub fn encode_data_block(entry: &ModelEntry, block: &DataBlock) -> Result<Vec<u16>> {
    let model = &entry.model;
    let repeats = if model.has_repeating_block() {
        block.repeats
    } else {
        0
    };
    let payload_registers = repeats
        .checked_mul(usize::from(model.repeat_len()))
        .and_then(|r| r.checked_add(usize::from(model.base_len())))
        .ok_or_else(|| {
            SunsError::definition(format!(
                "data block {} repeats {} times, beyond the register space",
                block.name, block.repeats
            ))
        })?;
    let declared = u16::try_from(payload_registers).map_err(|_| {
        SunsError::definition(format!(
            "data block {} needs {} registers",
            block.name, payload_registers
        ))
    })?;

    let mut bytes = vec![0u8; payload_registers * 2];
    let available = bytes.len();
    let mut origin = 0;

    for def in &model.blocks {
        let instances = if def.repeating { repeats } else { 1 };
        let unit = usize::from(def.len()) * 2;

        for repeat in 0..instances {
            let index = def.repeating.then_some(repeat);
            let mut cursor = 0;

            for point in &def.points {
                if is_skipped(point.spec) {
                    continue;
                }
                let position = def.position_of(point, cursor);
                if matches!(
                    point.spec.tag,
                    TypeTag::Int64 | TypeTag::UInt64 | TypeTag::Float64
                ) {
                    if block.value_for(&point.name, index).is_some() {
                        warn!(
                            "{}.{}: {} values cannot be encoded, left as zero",
                            block.name, point.name, point.spec
                        );
                    }
                    cursor = position + usize::from(point.spec.registers()) * 2;
                    continue;
                }
                let value = match block.value_for(&point.name, index) {
                    Some(v) => coerce(point, v)?,
                    None => Value::sentinel(point.spec),
                };

                let start = origin + repeat * unit + position;
                let end = start + point.size();
                let mut slot = bytes
                    .get_mut(start..end)
                    .ok_or(SunsError::InsufficientSpace {
                        needed: end,
                        available,
                    })?;
                codec::encode(&value, &mut slot)?;
                trace!("{}.{} = {} at byte {}", block.name, point.name, value, start);
                cursor = position + usize::from(point.spec.registers()) * 2;
            }
        }
        origin += instances * unit;
    }

    let mut registers = Vec::with_capacity(payload_registers + 2);
    registers.push(entry.id);
    registers.push(declared);
    registers.extend(wire_bytes_to_registers(&bytes));
    Ok(registers)
}

/// Assembles a [`RegisterTable`] one model instance at a time
#[derive(Debug)]
pub struct RegisterTableBuilder {
    base: u16,
    image: Vec<u16>,
}

impl RegisterTableBuilder {
    /// Start an image with the signature at the 1-based `base` register
    pub fn new(base: u16) -> Self {
        Self {
            base,
            image: SUNS_SIGNATURE.to_vec(),
        }
    }

    /// Append registers verbatim
    pub fn push_registers(&mut self, registers: &[u16]) -> &mut Self {
        self.image.extend_from_slice(registers);
        self
    }

    /// Encode and append a data block for a registered model
    pub fn push_block(&mut self, registry: &ModelRegistry, block: &DataBlock) -> Result<&mut Self> {
        let entry = registry
            .get(block.model_id)
            .ok_or(SunsError::UnknownModel(block.model_id))?;
        let registers = encode_data_block(entry, block)?;
        debug!(
            "Copying data block {} (model {}) to register {}",
            block.name,
            block.model_id,
            u32::from(self.base) + self.image.len() as u32
        );
        self.image.extend(registers);
        Ok(self)
    }

    /// Terminate with the end marker and check the image fits the address space
    pub fn finish(mut self) -> Result<RegisterTable> {
        self.image.extend([END_MARKER, 0]);
        let last = u32::from(self.base) + self.image.len() as u32 - 1;
        if self.base == 0 || last > 65536 {
            return Err(SunsError::protocol(format!(
                "register image at base {} with {} registers does not fit the address space",
                self.base,
                self.image.len()
            )));
        }
        Ok(RegisterTable {
            base: self.base,
            image: self.image,
        })
    }
}

/// A complete device register image rooted at a base register. Holding and
/// input reads see the same registers.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterTable {
    base: u16,
    image: Vec<u16>,
}

impl RegisterTable {
    pub fn builder(base: u16) -> RegisterTableBuilder {
        RegisterTableBuilder::new(base)
    }

    /// Image of `blocks` in order, common model first by convention
    pub fn from_blocks(registry: &ModelRegistry, base: u16, blocks: &[DataBlock]) -> Result<Self> {
        let mut builder = Self::builder(base);
        for block in blocks {
            builder.push_block(registry, block)?;
        }
        builder.finish()
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    /// Register count including signature and end marker
    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    pub fn registers(&self) -> &[u16] {
        &self.image
    }

    /// `(1-based register, value)` pairs in address order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        let base = u32::from(self.base);
        self.image
            .iter()
            .enumerate()
            .map(move |(i, &v)| (base + i as u32, v))
    }

    /// Registers at the 0-based protocol `address`; reads outside the image
    /// are rejected like an illegal data address
    pub fn read(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        let start = usize::from(self.base) - 1;
        let from = usize::from(address);
        let to = from + usize::from(count);
        if from < start || to > start + self.image.len() {
            return Err(SunsError::protocol(format!(
                "illegal data address {} (count {})",
                address, count
            )));
        }
        Ok(self.image[from - start..to - start].to_vec())
    }
}

impl RegisterTransport for RegisterTable {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.read(address, count)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is fine in tests
mod tests {
    use super::*;
    use crate::discovery::{ScanEvent, Scanner};
    use crate::model::{DataPointBlock, Model};
    use crate::types::TypeSpec;
    use crate::value::ValueStatus;

    fn registry() -> ModelRegistry {
        let mut builder = ModelRegistry::builder();
        builder
            .insert(
                1,
                "common",
                Model::new(vec![DataPointBlock::new(vec![
                    DataPoint::new("Mn", TypeSpec::string(8)),
                    DataPoint::new("DA", TypeTag::UInt16),
                ])]),
            )
            .unwrap();
        builder
            .insert(
                160,
                "mppt",
                Model::new(vec![
                    DataPointBlock::new(vec![DataPoint::new("N", TypeTag::UInt16)]),
                    DataPointBlock::repeating(vec![
                        DataPoint::new("ID", TypeTag::UInt16),
                        DataPoint::new("DCW", TypeTag::UInt32),
                    ]),
                ]),
            )
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_encode_fills_missing_values_with_sentinels() {
        let registry = registry();
        let block = DataBlock::new("common", 1)
            .with_value(PointValue::new("Mn", Value::from_string("Acme", 8)));
        let registers = encode_data_block(registry.get(1).unwrap(), &block).unwrap();
        assert_eq!(
            registers,
            vec![1, 5, 0x4163, 0x6d65, 0, 0, 0xFFFF]
        );
    }

    #[test]
    fn test_encode_repeating_block() {
        let registry = registry();
        let block = DataBlock::new("mppt", 160)
            .with_repeats(2)
            .with_value(PointValue::new("N", Value::from_uint16(2)))
            .with_value(PointValue::new("ID", Value::from_uint16(1)).at(0))
            .with_value(PointValue::new("ID", Value::from_uint16(2)).at(1))
            .with_value(PointValue::new("DCW", Value::from_uint32(0x0001_0002)));
        let registers = encode_data_block(registry.get(160).unwrap(), &block).unwrap();
        assert_eq!(registers, vec![160, 7, 2, 1, 1, 2, 2, 1, 2]);
    }

    #[test]
    fn test_encode_rejects_wrong_type() {
        let registry = registry();
        let block = DataBlock::new("common", 1)
            .with_value(PointValue::new("DA", Value::from_int32(1)));
        assert_eq!(
            encode_data_block(registry.get(1).unwrap(), &block).unwrap_err(),
            SunsError::TypeMismatch {
                expected: TypeTag::UInt16,
                actual: TypeTag::Int32
            }
        );
    }

    #[test]
    fn test_encode_rejects_overflowing_repeats() {
        let registry = registry();
        let block = DataBlock::new("mppt", 160).with_repeats(usize::MAX);
        let err = encode_data_block(registry.get(160).unwrap(), &block).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Definition);

        let block = DataBlock::new("mppt", 160).with_repeats(30_000);
        assert!(encode_data_block(registry.get(160).unwrap(), &block).is_err());
    }

    #[test]
    fn test_64bit_points_stay_zero() {
        let mut builder = ModelRegistry::builder();
        builder
            .insert(
                2,
                "energy",
                Model::new(vec![DataPointBlock::new(vec![
                    DataPoint::new("WH", TypeTag::UInt64),
                    DataPoint::new("DA", TypeTag::UInt16),
                ])]),
            )
            .unwrap();
        let registry = builder.build().unwrap();
        let entry = registry.get(2).unwrap();

        let registers = encode_data_block(entry, &DataBlock::new("energy", 2)).unwrap();
        assert_eq!(registers, vec![2, 5, 0, 0, 0, 0, 0xFFFF]);

        let block = DataBlock::new("energy", 2)
            .with_value(PointValue::new("WH", Value::from_uint64(9)))
            .with_value(PointValue::new("DA", Value::from_uint16(3)));
        let registers = encode_data_block(entry, &block).unwrap();
        assert_eq!(registers, vec![2, 5, 0, 0, 0, 0, 3]);

        let table = RegisterTable::from_blocks(&registry, 1, &[block]).unwrap();
        let report = Scanner::new(&registry, table).scan().unwrap();
        let dataset = report.datasets().next().unwrap();
        assert_eq!(dataset.get("WH").unwrap().uint64(), Ok(0));
        assert_eq!(dataset.get("DA").unwrap().uint16(), Ok(3));
    }

    #[test]
    fn test_string_values_keep_wire_bytes() {
        let registry = registry();
        let block = DataBlock::new("common", 1)
            .with_value(PointValue::new("Mn", Value::from_string_bytes(&[0xE9, b'A'], 2)));
        let registers = encode_data_block(registry.get(1).unwrap(), &block).unwrap();
        assert_eq!(&registers[2..6], &[0xE941, 0, 0, 0]);
    }

    #[test]
    fn test_table_layout() {
        let registry = registry();
        let table = RegisterTable::from_blocks(
            &registry,
            40001,
            &[DataBlock::new("common", 1)],
        )
        .unwrap();

        assert_eq!(&table.registers()[..4], &[0x5375, 0x6e53, 1, 5]);
        assert_eq!(&table.registers()[table.len() - 2..], &[END_MARKER, 0]);
        assert_eq!(table.iter().next(), Some((40001, 0x5375)));
        assert_eq!(table.read(40000, 2).unwrap(), SUNS_SIGNATURE.to_vec());
        assert!(table.read(0, 2).is_err());
        assert!(table.read(40000, 100).is_err());
    }

    #[test]
    fn test_table_base_must_fit() {
        assert!(RegisterTable::builder(0).finish().is_err());
        assert!(RegisterTable::builder(65534).finish().is_err());
        assert!(RegisterTable::builder(65533).finish().is_ok());
    }

    #[test]
    fn test_scan_of_table_round_trips() {
        let registry = registry();
        let blocks = [
            DataBlock::new("common", 1)
                .with_value(PointValue::new("Mn", Value::from_string("Acme", 8)))
                .with_value(PointValue::new("DA", Value::from_uint16(7))),
            DataBlock::new("mppt", 160)
                .with_repeats(3)
                .with_value(PointValue::new("DCW", Value::from_uint32(500)).at(2)),
        ];
        let table = RegisterTable::from_blocks(&registry, 50001, &blocks).unwrap();

        let report = Scanner::new(&registry, table).scan().unwrap();
        assert_eq!(report.base, 50001);
        let datasets: Vec<_> = report.datasets().collect();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].get("Mn").unwrap().string(), Ok("Acme"));
        assert_eq!(datasets[0].get("DA").unwrap().uint16(), Ok(7));

        let power: Vec<_> = datasets[1].all("DCW").map(|v| v.value.status()).collect();
        assert_eq!(
            power,
            vec![
                ValueStatus::NotImplemented,
                ValueStatus::NotImplemented,
                ValueStatus::Ok
            ]
        );
        assert!(matches!(report.events[1], ScanEvent::Model { register: 50010, .. }));
    }
}

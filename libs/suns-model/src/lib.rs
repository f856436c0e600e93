//! SunSpec model engine
//!
//! Decodes and validates devices that expose a SunSpec register map: a
//! signature followed by a chain of self-describing model instances.
//!
//! # Modules
//!
//! - `types`: type catalogue (tags, wire sizes, names)
//! - `value`: typed values with "not implemented" detection
//! - `codec`: value to big-endian wire bytes and back
//! - `model`: model definitions and the id registry
//! - `resolver`: implied offsets and block lengths
//! - `dataset`: block and model instance decoding
//! - `discovery`: signature probe and model chain traversal
//! - `register_map`: device register images built from data blocks
//! - `definition`: YAML model and data definitions
//!
//! # Example
//!
//! ```
//! use suns_model::{parse_definitions, build_register_table, Scanner};
//!
//! let definitions = parse_definitions(r#"
//! models:
//!   - id: 1
//!     name: common
//!     blocks:
//!       - points:
//!           - { name: Mn, type: string, len: 8 }
//! data:
//!   - { name: common, model: 1, values: { Mn: Acme } }
//! "#).unwrap();
//! let registry = definitions.models.build().unwrap();
//! let table = build_register_table(&registry, 40001, &definitions.data).unwrap();
//!
//! let report = Scanner::new(&registry, table).scan().unwrap();
//! let common = report.datasets().next().unwrap();
//! assert_eq!(common.get("Mn").unwrap().string(), Ok("Acme"));
//! ```

pub mod codec;
pub mod dataset;
pub mod definition;
pub mod discovery;
pub mod error;
pub mod model;
pub mod register_map;
pub mod resolver;
pub mod types;
pub mod value;
pub mod wire;

// Re-exports for convenience
pub use dataset::{decode_block, decode_dataset, BlockDecode, Dataset, DecodedValue};
pub use definition::{build_register_table, load_definitions, parse_definitions, DataSource, Definitions, ModelSource};
pub use discovery::{
    discover, RegisterTransport, ScanEvent, ScanReport, Scanner, DEFAULT_BASE_CANDIDATES,
    END_MARKER, MAX_READ_REGISTERS, SUNS_SIGNATURE,
};
pub use error::{Diagnostic, ErrorKind, Result, Severity, SunsError};
pub use model::{
    DataPoint, DataPointBlock, Define, Model, ModelEntry, ModelRegistry, ModelRegistryBuilder,
    FIRST_DATA_OFFSET, MODEL_HEADER_BYTES, MODEL_HEADER_REGISTERS,
};
pub use register_map::{encode_data_block, DataBlock, PointValue, RegisterTable, RegisterTableBuilder};
pub use types::{name_of, size_of, tag_from_name, TypeSpec, TypeTag};
pub use value::{Payload, Value, ValueStatus};
pub use wire::{registers_to_wire_bytes, wire_bytes_to_registers};

//! Discovery traversal
//!
//! Locates the SunSpec signature on a device and walks the chain of model
//! instances behind it until the end marker. All device access goes through
//! [`RegisterTransport`]; the traversal itself is synchronous and does one
//! read at a time.

use tracing::{debug, error, info, warn};

use crate::dataset::{decode_dataset, Dataset};
use crate::error::{Result, SunsError};
use crate::model::{ModelRegistry, MODEL_HEADER_REGISTERS};
use crate::wire::registers_to_wire_bytes;

/// "SunS" as two big-endian registers
pub const SUNS_SIGNATURE: [u16; 2] = [0x5375, 0x6e53];

/// 1-based registers probed for the signature, in order
pub const DEFAULT_BASE_CANDIDATES: [u16; 3] = [1, 40001, 50001];

/// Model id terminating the chain
pub const END_MARKER: u16 = 0xFFFF;

/// Largest register count a single Modbus read may request
pub const MAX_READ_REGISTERS: u16 = 125;

/// Blocking register read capability
pub trait RegisterTransport {
    /// Read `count` registers starting at the 0-based protocol `address`.
    ///
    /// Implementations return exactly `count` registers or an error.
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for &mut T {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        (**self).read_registers(address, count)
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for Box<T> {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        (**self).read_registers(address, count)
    }
}

/// Something found while walking the model chain
#[derive(Debug, Clone)]
pub enum ScanEvent<'r> {
    /// A registered model, decoded
    Model { register: u32, dataset: Dataset<'r> },
    /// An id missing from the registry; header and payload kept raw
    Unknown {
        register: u32,
        model_id: u16,
        length: u16,
        bytes: Vec<u8>,
    },
}

impl ScanEvent<'_> {
    /// 1-based register of the model header
    pub fn register(&self) -> u32 {
        match self {
            Self::Model { register, .. } | Self::Unknown { register, .. } => *register,
        }
    }
}

/// Everything a completed traversal found
#[derive(Debug, Clone)]
pub struct ScanReport<'r> {
    pub base: u16,
    pub events: Vec<ScanEvent<'r>>,
}

impl<'r> ScanReport<'r> {
    pub fn datasets(&self) -> impl Iterator<Item = &Dataset<'r>> {
        self.events.iter().filter_map(|event| match event {
            ScanEvent::Model { dataset, .. } => Some(dataset),
            ScanEvent::Unknown { .. } => None,
        })
    }

    pub fn unknown_ids(&self) -> Vec<u16> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ScanEvent::Unknown { model_id, .. } => Some(*model_id),
                ScanEvent::Model { .. } => None,
            })
            .collect()
    }
}

/// Walks a device's model chain against a resolved registry
pub struct Scanner<'r, T> {
    registry: &'r ModelRegistry,
    transport: T,
    candidates: Vec<u16>,
    max_read: u16,
}

impl<'r, T: RegisterTransport> Scanner<'r, T> {
    pub fn new(registry: &'r ModelRegistry, transport: T) -> Self {
        Self {
            registry,
            transport,
            candidates: DEFAULT_BASE_CANDIDATES.to_vec(),
            max_read: MAX_READ_REGISTERS,
        }
    }

    /// Probe these 1-based registers instead of the defaults
    pub fn with_candidates(mut self, candidates: Vec<u16>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Cap registers per read, clamped to the protocol limit
    pub fn with_max_read(mut self, max_read: u16) -> Self {
        self.max_read = max_read.clamp(1, MAX_READ_REGISTERS);
        self
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Probe the candidates and return the first register holding the
    /// signature. A failed probe moves on to the next candidate.
    pub fn find_base(&mut self) -> Result<u16> {
        let candidates = self.candidates.clone();
        for &candidate in &candidates {
            match self.read(u32::from(candidate), 2) {
                Ok(registers) if registers == SUNS_SIGNATURE => {
                    info!("Found SunSpec signature at register {}", candidate);
                    return Ok(candidate);
                },
                Ok(registers) => {
                    debug!("No signature at register {}: {:04X?}", candidate, registers);
                },
                Err(e) => {
                    warn!("Probe of register {} failed: {}", candidate, e);
                },
            }
        }

        error!("SunSpec signature not found on device");
        Err(SunsError::SignatureNotFound { candidates })
    }

    /// Walk the model chain, handing each model to `on_event` as soon as it
    /// is decoded. Returns the base register on reaching the end marker.
    ///
    /// Events already delivered stay valid when a later step fails.
    pub fn scan_with<F>(&mut self, mut on_event: F) -> Result<u16>
    where
        F: FnMut(ScanEvent<'r>),
    {
        let base = self.find_base()?;
        let mut register = u32::from(base) + u32::from(MODEL_HEADER_REGISTERS);

        loop {
            debug!("Looking for model at register {}", register);
            let header = self.read(register, MODEL_HEADER_REGISTERS)?;
            let (model_id, length) = (header[0], header[1]);

            if model_id == END_MARKER {
                info!("Found end marker at register {}", register);
                return Ok(base);
            }
            if model_id == 0 {
                error!(
                    "Found 0x0000 at register {} where a model id or end marker was expected",
                    register
                );
                return Err(SunsError::MissingEndMarker { register });
            }
            debug!("Found model {} with length {} at register {}", model_id, length, register);

            let total = u32::from(length) + u32::from(MODEL_HEADER_REGISTERS);
            let count = u16::try_from(total).map_err(|_| {
                SunsError::protocol(format!(
                    "model {} at register {} declares length {} past the address space",
                    model_id, register, length
                ))
            })?;
            let bytes = registers_to_wire_bytes(&self.read(register, count)?);

            if self.registry.contains(model_id) {
                let dataset = decode_dataset(self.registry, &bytes)?;
                on_event(ScanEvent::Model { register, dataset });
            } else {
                warn!("Unknown model id {} at register {}", model_id, register);
                debug!("Model {} raw bytes: {}", model_id, hex::encode(&bytes));
                on_event(ScanEvent::Unknown {
                    register,
                    model_id,
                    length,
                    bytes,
                });
            }

            register += total;
        }
    }

    /// Walk the whole chain and collect what was found
    pub fn scan(&mut self) -> Result<ScanReport<'r>> {
        let mut events = Vec::new();
        let base = self.scan_with(|event| events.push(event))?;
        Ok(ScanReport { base, events })
    }

    /// Read `count` registers from the 1-based `register`, split into reads
    /// no larger than the configured maximum
    fn read(&mut self, register: u32, count: u16) -> Result<Vec<u16>> {
        let mut registers = Vec::with_capacity(usize::from(count));
        let mut next = register;
        let mut remaining = count;

        while remaining > 0 {
            let chunk = remaining.min(self.max_read);
            let address = protocol_address(next)?;
            protocol_address(next + u32::from(chunk) - 1)?;

            let read = self.transport.read_registers(address, chunk)?;
            if read.len() != usize::from(chunk) {
                return Err(SunsError::io(format!(
                    "short read at register {}: wanted {}, got {}",
                    next,
                    chunk,
                    read.len()
                )));
            }
            registers.extend(read);
            next += u32::from(chunk);
            remaining -= chunk;
        }

        Ok(registers)
    }
}

/// 0-based protocol address of a 1-based register
fn protocol_address(register: u32) -> Result<u16> {
    register
        .checked_sub(1)
        .and_then(|address| u16::try_from(address).ok())
        .ok_or_else(|| {
            SunsError::protocol(format!(
                "register {} is outside the Modbus address space",
                register
            ))
        })
}

/// Scan a device with default options
pub fn discover<'r, T: RegisterTransport>(
    registry: &'r ModelRegistry,
    transport: T,
) -> Result<ScanReport<'r>> {
    Scanner::new(registry, transport).scan()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is fine in tests
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tracing_test::traced_test;

    /// Sparse register space recording every read
    #[derive(Default)]
    struct FakeDevice {
        registers: HashMap<u16, u16>,
        reads: Vec<(u16, u16)>,
        fail_at: Option<u16>,
    }

    impl FakeDevice {
        fn load(&mut self, register: u16, values: &[u16]) {
            for (i, &v) in values.iter().enumerate() {
                self.registers.insert(register - 1 + i as u16, v);
            }
        }
    }

    impl RegisterTransport for FakeDevice {
        fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
            self.reads.push((address, count));
            if self.fail_at == Some(address) {
                return Err(SunsError::io("timed out"));
            }
            Ok((0..count)
                .map(|i| self.registers.get(&(address + i)).copied().unwrap_or(0))
                .collect())
        }
    }

    #[test]
    fn test_find_base_uses_zero_based_addresses() {
        let registry = ModelRegistry::default();
        let mut device = FakeDevice::default();
        device.load(40001, &SUNS_SIGNATURE);

        let mut scanner = Scanner::new(&registry, &mut device);
        assert_eq!(scanner.find_base().unwrap(), 40001);
        assert_eq!(device.reads, vec![(0, 2), (40000, 2)]);
    }

    #[test]
    fn test_failed_probe_falls_through() {
        let registry = ModelRegistry::default();
        let mut device = FakeDevice {
            fail_at: Some(0),
            ..Default::default()
        };
        device.load(50001, &SUNS_SIGNATURE);

        let mut scanner = Scanner::new(&registry, &mut device);
        assert_eq!(scanner.find_base().unwrap(), 50001);
    }

    #[test]
    fn test_signature_not_found() {
        let registry = ModelRegistry::default();
        let mut scanner = Scanner::new(&registry, FakeDevice::default());
        assert_eq!(
            scanner.find_base().unwrap_err(),
            SunsError::SignatureNotFound {
                candidates: vec![1, 40001, 50001]
            }
        );
    }

    #[test]
    fn test_reads_are_chunked() {
        let registry = ModelRegistry::default();
        let mut device = FakeDevice::default();
        device.load(1, &SUNS_SIGNATURE);
        device.load(3, &[900, 300]);
        device.load(305, &[END_MARKER, 0]);

        let report = Scanner::new(&registry, &mut device).scan().unwrap();
        assert_eq!(report.unknown_ids(), vec![900]);
        let model_reads: Vec<_> = device.reads.iter().filter(|(a, _)| *a == 2).collect();
        assert_eq!(model_reads, vec![&(2, 2), &(2, 125)]);
        assert!(device.reads.contains(&(127, 125)));
        assert!(device.reads.contains(&(252, 52)));
    }

    #[test]
    #[traced_test]
    fn test_unknown_model_is_logged() {
        let registry = ModelRegistry::default();
        let mut device = FakeDevice::default();
        device.load(1, &SUNS_SIGNATURE);
        device.load(3, &[900, 1, 0xABCD]);
        device.load(6, &[END_MARKER, 0]);

        let report = Scanner::new(&registry, &mut device).scan().unwrap();
        assert_eq!(report.unknown_ids(), vec![900]);
        assert!(logs_contain("Unknown model id 900 at register 3"));
        assert!(logs_contain("0384000"));
    }

    #[test]
    fn test_read_failure_aborts() {
        let registry = ModelRegistry::default();
        let mut device = FakeDevice {
            fail_at: Some(2),
            ..Default::default()
        };
        device.load(1, &SUNS_SIGNATURE);

        let err = Scanner::new(&registry, &mut device).scan().unwrap_err();
        assert_eq!(err, SunsError::Io("timed out".to_string()));
    }

    #[test]
    fn test_protocol_address() {
        assert_eq!(protocol_address(1), Ok(0));
        assert_eq!(protocol_address(65536), Ok(65535));
        assert!(protocol_address(0).is_err());
        assert!(protocol_address(65537).is_err());
    }
}

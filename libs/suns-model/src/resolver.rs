//! Offset resolution
//!
//! One pass over a model that fills implied data point offsets and computes
//! block and model lengths. Offsets are 1-based register numbers relative to
//! the model start, so the first data register is [`FIRST_DATA_OFFSET`].

use tracing::{debug, warn};

use crate::error::{Diagnostic, ErrorKind, Result, SunsError};
use crate::model::{Model, FIRST_DATA_OFFSET};
use crate::types::TypeTag;

/// Non-fatal findings of a resolution pass
#[derive(Debug, Default)]
pub struct Resolution {
    pub warnings: Vec<Diagnostic>,
}

/// Fill implied offsets and lengths of `model`.
///
/// A repeating block anywhere but last is an [`SunsError::Ordering`] error
/// and an explicit offset before its block's start is a definition error.
/// Odd-length strings are rounded up to a whole register with a warning.
pub fn resolve_model(name: &str, model: &mut Model) -> Result<Resolution> {
    let blocks = model.blocks.len();
    if let Some(block) = model
        .blocks
        .iter()
        .take(blocks.saturating_sub(1))
        .position(|b| b.repeating)
    {
        return Err(SunsError::Ordering {
            model: name.to_string(),
            block,
            blocks,
        });
    }

    let mut resolution = Resolution::default();
    let mut counter = u32::from(FIRST_DATA_OFFSET);
    let mut base_len = 0u32;
    let mut len = 0u32;

    for block in &mut model.blocks {
        let block_start = counter;
        block.start = to_register(name, block_start)?;

        for point in &mut block.points {
            match point.offset {
                Some(explicit) => {
                    if u32::from(explicit) < block_start {
                        return Err(SunsError::definition(format!(
                            "{}.{}: explicit offset {} precedes block start {}",
                            name, point.name, explicit, block_start
                        )));
                    }
                    if u32::from(explicit) != counter {
                        debug!(
                            "{}.{}: explicit offset {} overrides running offset {}",
                            name, point.name, explicit, counter
                        );
                    }
                    counter = u32::from(explicit);
                },
                None => point.offset = Some(to_register(name, counter)?),
            }

            if point.spec.tag == TypeTag::String && point.size() % 2 != 0 {
                let message = format!(
                    "datapoint {} is a string of odd length {}; rounding up to whole register",
                    point.name,
                    point.size()
                );
                warn!("{}: {}", name, message);
                resolution
                    .warnings
                    .push(Diagnostic::warning(ErrorKind::Definition, message));
            }

            counter += u32::from(point.spec.registers());
        }

        let block_len = counter.saturating_sub(block_start);
        block.len = to_register(name, block_len)?;

        if !block.repeating {
            base_len += block_len;
        }
        len += block_len;
    }

    if len == 0 {
        len = counter.saturating_sub(u32::from(FIRST_DATA_OFFSET));
        base_len = len;
    }

    model.base_len = to_register(name, base_len)?;
    model.len = to_register(name, len)?;
    Ok(resolution)
}

fn to_register(name: &str, value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| {
        SunsError::definition(format!(
            "model {} exceeds the 16-bit register space ({})",
            name, value
        ))
    })
}

//! Structural checks applied to a driver's pin table at the readiness transition.
//!
//! Pins are checked in ascending index order and fields in the order
//! `supported_modes`, `mode`, `report`, `analog_channel`. The first failure is
//! reported; errors are never aggregated.

use crate::constants::Mode;
use crate::pins::{Pin, PinDescriptor, PinField};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("pin table is empty; populate the board's pins before signalling ready")]
    EmptyPinTable,
    #[error("pins[{pin}].{field} is missing")]
    MissingField { pin: usize, field: PinField },
    #[error("pins[{pin}].{field} is invalid: {reason}")]
    InvalidField {
        pin: usize,
        field: PinField,
        reason: String,
    },
}

/// Validated pin table together with its derived analog index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinTable {
    pub pins: Vec<Pin>,
    pub analog_pins: Vec<usize>,
}

pub fn validate(pins: &[PinDescriptor]) -> Result<PinTable, StructuralError> {
    if pins.is_empty() {
        return Err(StructuralError::EmptyPinTable);
    }

    let mut validated = Vec::with_capacity(pins.len());
    let mut analog_pins = Vec::new();

    for (index, descriptor) in pins.iter().enumerate() {
        let pin = validate_pin(index, descriptor)?;
        if pin.is_analog() {
            analog_pins.push(index);
        }
        validated.push(pin);
    }

    Ok(PinTable {
        pins: validated,
        analog_pins,
    })
}

fn validate_pin(index: usize, descriptor: &PinDescriptor) -> Result<Pin, StructuralError> {
    let supported_modes = descriptor
        .supported_modes
        .as_ref()
        .ok_or(StructuralError::MissingField {
            pin: index,
            field: PinField::SupportedModes,
        })?;
    if supported_modes.is_empty() {
        return Err(StructuralError::InvalidField {
            pin: index,
            field: PinField::SupportedModes,
            reason: "a pin must support at least one mode".to_string(),
        });
    }

    let mode = descriptor.mode.ok_or(StructuralError::MissingField {
        pin: index,
        field: PinField::Mode,
    })?;
    // UNKNOWN and IGNORE are sentinels a driver may report before any mode is set.
    if !matches!(mode, Mode::Unknown | Mode::Ignore) && !supported_modes.contains(&mode) {
        return Err(StructuralError::InvalidField {
            pin: index,
            field: PinField::Mode,
            reason: format!("{} is not one of the supported modes", mode),
        });
    }

    let report = descriptor.report.ok_or(StructuralError::MissingField {
        pin: index,
        field: PinField::Report,
    })?;
    if report > 1 {
        return Err(StructuralError::InvalidField {
            pin: index,
            field: PinField::Report,
            reason: format!("expected 0 or 1, got {}", report),
        });
    }

    let analog_channel = descriptor.analog_channel.ok_or(StructuralError::MissingField {
        pin: index,
        field: PinField::AnalogChannel,
    })?;

    let mut modes = Vec::with_capacity(supported_modes.len());
    for mode in supported_modes {
        if !modes.contains(mode) {
            modes.push(*mode);
        }
    }

    Ok(Pin {
        supported_modes: modes,
        mode,
        report: report == 1,
        analog_channel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NO_ANALOG_CHANNEL;

    fn digital() -> PinDescriptor {
        PinDescriptor::new(vec![Mode::Input, Mode::Output], Mode::Output, 0, NO_ANALOG_CHANNEL)
    }

    fn analog(channel: u8) -> PinDescriptor {
        PinDescriptor::new(vec![Mode::Input, Mode::Analog], Mode::Analog, 1, channel)
    }

    #[test]
    fn test_analog_index_is_ascending() {
        let pins = vec![digital(), analog(0), digital(), analog(1), analog(2)];
        let table = validate(&pins).unwrap();
        assert_eq!(table.analog_pins, vec![1, 3, 4]);
        assert_eq!(table.pins.len(), 5);
        assert!(table.pins[1].report);
        assert!(!table.pins[0].report);
    }

    #[test]
    fn test_no_analog_pins_yields_empty_index() {
        let table = validate(&[digital(), digital()]).unwrap();
        assert!(table.analog_pins.is_empty());
    }

    #[test]
    fn test_empty_table_rejected() {
        assert_eq!(validate(&[]), Err(StructuralError::EmptyPinTable));
    }

    #[test]
    fn test_missing_fields_named() {
        let mut broken = digital();
        broken.report = None;
        let err = validate(&[digital(), broken]).unwrap_err();
        assert_eq!(
            err,
            StructuralError::MissingField {
                pin: 1,
                field: PinField::Report
            }
        );
        assert_eq!(err.to_string(), "pins[1].report is missing");
    }

    #[test]
    fn test_first_failure_wins() {
        let mut first = digital();
        first.analog_channel = None;
        let mut second = digital();
        second.supported_modes = None;
        let mut both = digital();
        both.mode = None;
        both.report = None;

        let err = validate(&[first, second]).unwrap_err();
        assert_eq!(
            err,
            StructuralError::MissingField {
                pin: 0,
                field: PinField::AnalogChannel
            }
        );
        let err = validate(&[both]).unwrap_err();
        assert_eq!(
            err,
            StructuralError::MissingField {
                pin: 0,
                field: PinField::Mode
            }
        );
    }

    #[test]
    fn test_semantic_checks() {
        let mut empty_modes = digital();
        empty_modes.supported_modes = Some(Vec::new());
        assert!(matches!(
            validate(&[empty_modes]),
            Err(StructuralError::InvalidField { field: PinField::SupportedModes, .. })
        ));

        let mut bad_report = digital();
        bad_report.report = Some(2);
        assert!(matches!(
            validate(&[bad_report]),
            Err(StructuralError::InvalidField { field: PinField::Report, .. })
        ));

        let mut unsupported = digital();
        unsupported.mode = Some(Mode::Servo);
        assert!(matches!(
            validate(&[unsupported]),
            Err(StructuralError::InvalidField { field: PinField::Mode, .. })
        ));

        let mut sentinel = digital();
        sentinel.mode = Some(Mode::Unknown);
        assert!(validate(&[sentinel]).is_ok());
    }

    #[test]
    fn test_duplicate_modes_collapse() {
        let pin = PinDescriptor::new(
            vec![Mode::Analog, Mode::Input, Mode::Analog, Mode::Input],
            Mode::Analog,
            0,
            3,
        );
        let table = validate(&[pin]).unwrap();
        assert_eq!(table.pins[0].supported_modes, vec![Mode::Analog, Mode::Input]);
        assert_eq!(table.analog_pins, vec![0]);
    }
}

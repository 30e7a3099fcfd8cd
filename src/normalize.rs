//! Arity/type-inspecting factories for the variable-shape operations.
//!
//! Callers pass a list of [`Arg`]s (see the [`args!`](crate::args) macro) and
//! get back a single canonical request, or an [`InvalidArgumentShape`] naming
//! the operation and the arity received.

use crate::constants::StepperDirection;
use crate::events::{Handler, Reading};
use crate::operation::{I2cWriteRequest, Ramp, StepperStep};
use crate::transport::TransportError;
use std::fmt;
use thiserror::Error;

/// One positional argument of a variable-shape call.
pub enum Arg {
    Int(i64),
    Bytes(Vec<u8>),
    Handler(Handler),
}

impl Arg {
    pub fn handler<F>(f: F) -> Self
    where
        F: FnMut(Result<Reading, TransportError>) + Send + 'static,
    {
        Arg::Handler(Box::new(f))
    }

    fn kind(&self) -> &'static str {
        match self {
            Arg::Int(_) => "integer",
            Arg::Bytes(_) => "bytes",
            Arg::Handler(_) => "handler",
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(value) => write!(f, "Int({})", value),
            Arg::Bytes(bytes) => write!(f, "Bytes({:?})", bytes),
            Arg::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

macro_rules! int_arg {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Arg {
            fn from(value: $ty) -> Self {
                Arg::Int(value as i64)
            }
        })*
    };
}

int_arg!(u8, u16, u32, i32, i64);

impl From<Vec<u8>> for Arg {
    fn from(bytes: Vec<u8>) -> Self {
        Arg::Bytes(bytes)
    }
}

impl From<&[u8]> for Arg {
    fn from(bytes: &[u8]) -> Self {
        Arg::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Arg {
    fn from(bytes: [u8; N]) -> Self {
        Arg::Bytes(bytes.to_vec())
    }
}

impl From<Handler> for Arg {
    fn from(handler: Handler) -> Self {
        Arg::Handler(handler)
    }
}

/// Builds a `Vec<Arg>` from heterogeneous values.
///
/// ```
/// use boardio_rs::args;
/// let call = args![0x20, 0x05, [1u8, 2, 3]];
/// assert_eq!(call.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        vec![$($crate::normalize::Arg::from($arg)),*]
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} called with {arity} argument(s): {detail}")]
pub struct InvalidArgumentShape {
    pub operation: &'static str,
    pub arity: usize,
    pub detail: String,
}

/// Address and optional register of an I2C read, before the read mode is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cReadTarget {
    pub address: u8,
    pub register: Option<u8>,
    pub byte_count: u16,
}

struct Shape {
    operation: &'static str,
    arity: usize,
}

impl Shape {
    fn new(operation: &'static str, args: &[Arg]) -> Self {
        Self {
            operation,
            arity: args.len(),
        }
    }

    fn error(&self, detail: impl Into<String>) -> InvalidArgumentShape {
        InvalidArgumentShape {
            operation: self.operation,
            arity: self.arity,
            detail: detail.into(),
        }
    }

    fn int<T: TryFrom<i64>>(&self, position: usize, arg: Arg) -> Result<T, InvalidArgumentShape> {
        match arg {
            Arg::Int(value) => T::try_from(value).map_err(|_| {
                self.error(format!("argument {} ({}) is out of range", position, value))
            }),
            other => Err(self.error(format!(
                "argument {} must be an integer, got {}",
                position,
                other.kind()
            ))),
        }
    }

    fn bytes(&self, position: usize, arg: Arg) -> Result<Vec<u8>, InvalidArgumentShape> {
        match arg {
            Arg::Bytes(bytes) => Ok(bytes),
            other => Err(self.error(format!(
                "argument {} must be bytes, got {}",
                position,
                other.kind()
            ))),
        }
    }

    fn handler(&self, position: usize, arg: Arg) -> Result<Handler, InvalidArgumentShape> {
        match arg {
            Arg::Handler(handler) => Ok(handler),
            other => Err(self.error(format!(
                "argument {} must be a handler, got {}",
                position,
                other.kind()
            ))),
        }
    }
}

/// `(address, payload)` or `(address, register, payload)`.
pub fn i2c_write(args: Vec<Arg>) -> Result<I2cWriteRequest, InvalidArgumentShape> {
    let shape = Shape::new("i2c_write", &args);
    let mut args = args.into_iter();
    match shape.arity {
        2 => Ok(I2cWriteRequest {
            address: shape.int(0, next(&mut args))?,
            register: None,
            payload: shape.bytes(1, next(&mut args))?,
        }),
        3 => Ok(I2cWriteRequest {
            address: shape.int(0, next(&mut args))?,
            register: Some(shape.int(1, next(&mut args))?),
            payload: shape.bytes(2, next(&mut args))?,
        }),
        _ => Err(shape.error("expected (address, payload) or (address, register, payload)")),
    }
}

/// `(address, byte_count, handler)` or `(address, register, byte_count, handler)`.
///
/// Shared by the continuous and one-shot reads; `operation` names the caller
/// in errors.
pub fn i2c_read(
    operation: &'static str,
    args: Vec<Arg>,
) -> Result<(I2cReadTarget, Handler), InvalidArgumentShape> {
    let shape = Shape::new(operation, &args);
    let mut args = args.into_iter();
    match shape.arity {
        3 => {
            let address = shape.int(0, next(&mut args))?;
            let byte_count = shape.int(1, next(&mut args))?;
            let handler = shape.handler(2, next(&mut args))?;
            Ok((
                I2cReadTarget {
                    address,
                    register: None,
                    byte_count,
                },
                handler,
            ))
        }
        4 => {
            let address = shape.int(0, next(&mut args))?;
            let register = shape.int(1, next(&mut args))?;
            let byte_count = shape.int(2, next(&mut args))?;
            let handler = shape.handler(3, next(&mut args))?;
            Ok((
                I2cReadTarget {
                    address,
                    register: Some(register),
                    byte_count,
                },
                handler,
            ))
        }
        _ => Err(shape.error(
            "expected (address, byte_count, handler) or (address, register, byte_count, handler)",
        )),
    }
}

/// `(device, direction, steps, speed, handler)` or
/// `(device, direction, steps, speed, accel, decel, handler)`.
///
/// The fifth argument decides the shape: a handler means no ramp, an integer
/// means accel followed by decel and the handler.
pub fn stepper_step(args: Vec<Arg>) -> Result<(StepperStep, Handler), InvalidArgumentShape> {
    let shape = Shape::new("stepper_step", &args);
    let fifth_is_handler = matches!(args.get(4), Some(Arg::Handler(_)));
    match (shape.arity, fifth_is_handler) {
        (5, true) | (7, false) => {}
        (5, false) => {
            return Err(shape.error("argument 4 must be a handler when accel/decel are omitted"));
        }
        (7, true) => return Err(shape.error("argument 4 must be an integer acceleration")),
        _ => {
            return Err(shape.error(
                "expected (device, direction, steps, speed, handler) or \
                 (device, direction, steps, speed, accel, decel, handler)",
            ))
        }
    }

    let mut args = args.into_iter();
    let device = shape.int(0, next(&mut args))?;
    let direction_value: u8 = shape.int(1, next(&mut args))?;
    let direction = StepperDirection::from_value(direction_value)
        .ok_or_else(|| shape.error(format!("unknown stepper direction {}", direction_value)))?;
    let steps = shape.int(2, next(&mut args))?;
    let speed = shape.int(3, next(&mut args))?;

    let (ramp, handler) = if fifth_is_handler {
        (None, shape.handler(4, next(&mut args))?)
    } else {
        let accel = shape.int(4, next(&mut args))?;
        let decel = shape.int(5, next(&mut args))?;
        (Some(Ramp { accel, decel }), shape.handler(6, next(&mut args))?)
    };

    Ok((
        StepperStep {
            device,
            direction,
            steps,
            speed,
            ramp,
        },
        handler,
    ))
}

// Only called after the arity has been checked.
fn next(args: &mut std::vec::IntoIter<Arg>) -> Arg {
    args.next().unwrap_or(Arg::Int(i64::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arg {
        Arg::handler(|_| {})
    }

    // Handlers are not `Debug`, so `unwrap_err` is unavailable on these results.
    fn shape_error<T>(result: Result<T, InvalidArgumentShape>) -> InvalidArgumentShape {
        match result {
            Ok(_) => panic!("expected an argument shape error"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_i2c_write_without_register() {
        let request = i2c_write(args![0x20, [1u8, 2, 3]]).unwrap();
        assert_eq!(
            request,
            I2cWriteRequest {
                address: 0x20,
                register: None,
                payload: vec![1, 2, 3]
            }
        );
    }

    #[test]
    fn test_i2c_write_with_register() {
        let request = i2c_write(args![0x20, 0x05, vec![1u8, 2, 3]]).unwrap();
        assert_eq!(request.register, Some(0x05));
        assert_eq!(request.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_i2c_write_bad_arity() {
        let err = i2c_write(args![0x20]).unwrap_err();
        assert_eq!(err.operation, "i2c_write");
        assert_eq!(err.arity, 1);
        assert_eq!(i2c_write(args![1, 2, 3, 4]).unwrap_err().arity, 4);
    }

    #[test]
    fn test_i2c_write_type_and_range_errors() {
        let err = i2c_write(args![0x20, 0x05]).unwrap_err();
        assert!(err.detail.contains("must be bytes"));
        let err = i2c_write(args![0x1FF, [1u8]]).unwrap_err();
        assert!(err.detail.contains("out of range"));
    }

    #[test]
    fn test_i2c_read_shapes() {
        let (target, _) = i2c_read("i2c_read", args![0x48, 2, noop()]).unwrap();
        assert_eq!(
            target,
            I2cReadTarget {
                address: 0x48,
                register: None,
                byte_count: 2
            }
        );

        let (target, _) = i2c_read("i2c_read", args![0x48, 0x0C, 6, noop()]).unwrap();
        assert_eq!(target.register, Some(0x0C));
        assert_eq!(target.byte_count, 6);

        let err = shape_error(i2c_read("i2c_read_once", args![0x48, 2]));
        assert_eq!((err.operation, err.arity), ("i2c_read_once", 2));

        let err = shape_error(i2c_read("i2c_read", args![0x48, 0x0C, 6]));
        assert!(err.detail.contains("must be a handler"));
    }

    #[test]
    fn test_stepper_step_without_ramp() {
        let mut call = args![0, 1, 200, 1000];
        call.push(noop());
        let (step, _) = stepper_step(call).unwrap();
        assert_eq!(step.direction, StepperDirection::Cw);
        assert_eq!(step.steps, 200);
        assert_eq!(step.ramp, None);
    }

    #[test]
    fn test_stepper_step_with_ramp() {
        let mut call = args![2, 0, 400, 1500, 30, 40];
        call.push(noop());
        let (step, _) = stepper_step(call).unwrap();
        assert_eq!(step.device, 2);
        assert_eq!(step.direction, StepperDirection::Ccw);
        assert_eq!(step.ramp, Some(Ramp { accel: 30, decel: 40 }));
    }

    #[test]
    fn test_stepper_step_rejects_mixed_shapes() {
        assert!(stepper_step(args![0, 1, 200, 1000, 50]).is_err());
        let mut seven = args![0, 1, 200, 1000];
        seven.push(noop());
        seven.push(Arg::from(10));
        seven.push(noop());
        assert!(stepper_step(seven).is_err());
        assert_eq!(shape_error(stepper_step(args![0, 1, 200])).arity, 3);

        let mut bad_direction = args![0, 7, 200, 1000];
        bad_direction.push(noop());
        assert!(shape_error(stepper_step(bad_direction)).detail.contains("direction"));
    }
}

use std::cmp::Ordering;
use std::fmt;

use anyhow::anyhow;

use crate::error::ExecError;
use crate::il::{Instruction, OpCode, TokenRef};
use crate::meta::{Decimal, TypeKind};
use crate::rewrite::{RoutineOp, SynthesizedRoutine};

use super::host::{Host, Resolve};
use super::value::Value;

/// Executes synthesized routines against a host object model.
pub struct Interpreter<'a> {
    host: &'a dyn Host,
    resolver: &'a dyn Resolve,
}

struct Frame {
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    fn pop(&mut self, at: impl fmt::Display) -> Result<Value, ExecError> {
        self.stack.pop().ok_or_else(|| ExecError::StackUnderflow {
            at: at.to_string().trim().to_string(),
        })
    }

    /// Pop `n` values, returned in push order.
    fn pop_n(&mut self, n: usize, at: impl fmt::Display) -> Result<Vec<Value>, ExecError> {
        if self.stack.len() < n {
            return Err(ExecError::StackUnderflow {
                at: at.to_string().trim().to_string(),
            });
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn arg(&mut self, index: u16) -> Result<&mut Value, ExecError> {
        self.args
            .get_mut(index as usize)
            .ok_or(ExecError::SlotOutOfRange { kind: "argument", index })
    }

    fn local(&mut self, index: u16) -> Result<&mut Value, ExecError> {
        self.locals
            .get_mut(index as usize)
            .ok_or(ExecError::SlotOutOfRange { kind: "local", index })
    }

    /// Write through a managed pointer.
    fn store_indirect(&mut self, opcode: OpCode, addr: &Value, value: Value) -> Result<(), ExecError> {
        match addr {
            Value::LocalAddr(i) => *self.local(*i)? = value,
            Value::ArgAddr(i) => *self.arg(*i)? = value,
            other => {
                return Err(ExecError::TypeMismatch {
                    opcode,
                    found: other.kind_name().to_string(),
                });
            }
        }
        Ok(())
    }
}

impl<'a> Interpreter<'a> {
    pub fn new(host: &'a dyn Host, resolver: &'a dyn Resolve) -> Self {
        Self { host, resolver }
    }

    /// Run `routine` with a complete argument list (target, context and the
    /// factory's own parameters, per its layout).
    pub fn run(&self, routine: &SynthesizedRoutine, args: Vec<Value>) -> Result<Value, ExecError> {
        let layout = routine.layout();
        if args.len() != layout.arg_count() {
            return Err(ExecError::Arity {
                expected: layout.arg_count(),
                found: args.len(),
            });
        }
        let locals = routine
            .locals()
            .iter()
            .map(|ty| self.host.default_value(ty))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let mut frame = Frame {
            args,
            locals,
            stack: Vec::new(),
        };

        for op in routine.ops() {
            match op {
                RoutineOp::LoadArg(n) => {
                    let v = frame.arg(*n)?.clone();
                    frame.stack.push(v);
                }
                RoutineOp::LoadArgAddr(n) => frame.stack.push(Value::ArgAddr(*n)),
                RoutineOp::StoreArg(n) => {
                    let v = frame.pop(op)?;
                    *frame.arg(*n)? = v;
                }
                RoutineOp::LoadContext => {
                    let ctx = frame.arg(layout.context_index())?.clone();
                    frame.stack.push(ctx);
                }
                RoutineOp::Resolve(ty) => {
                    let ctx = frame.pop(op)?;
                    match self.resolver.resolve(ty, &ctx) {
                        Ok(Some(v)) => frame.stack.push(v),
                        Ok(None) => return Err(ExecError::NotResolvable { ty: ty.to_string() }),
                        Err(source) => {
                            return Err(ExecError::Resolution {
                                ty: ty.to_string(),
                                source,
                            });
                        }
                    }
                }
                RoutineOp::Unbox(ty) => {
                    let v = frame.pop(op)?;
                    frame.stack.push(self.host.unbox(ty, v)?);
                }
                RoutineOp::Replay(instr) => {
                    if let Some(ret) = self.step(&mut frame, instr, routine)? {
                        return Ok(ret);
                    }
                }
            }
        }
        Err(ExecError::NoReturn)
    }

    /// Execute one replayed instruction; `Some` once the routine returns.
    fn step(&self, frame: &mut Frame, instr: &Instruction, routine: &SynthesizedRoutine) -> Result<Option<Value>, ExecError> {
        use OpCode::*;

        let opcode = instr.opcode();
        match opcode {
            Nop => {}
            Ldnull => frame.stack.push(Value::Null),
            LdcI8 => frame.stack.push(Value::I8(instr.int_literal().unwrap_or_default())),
            LdcI4M1 | LdcI4_0 | LdcI4_1 | LdcI4_2 | LdcI4_3 | LdcI4_4 | LdcI4_5 | LdcI4_6 | LdcI4_7 | LdcI4_8 | LdcI4S | LdcI4 => {
                frame.stack.push(Value::I4(instr.int_literal().unwrap_or_default() as i32))
            }
            LdcR4 => frame.stack.push(Value::R4(instr.float_literal().unwrap_or_default() as f32)),
            LdcR8 => frame.stack.push(Value::R8(instr.float_literal().unwrap_or_default())),
            Ldstr => frame.stack.push(Value::Str(token(instr)?.string()?.clone())),

            Ldarg0 | Ldarg1 | Ldarg2 | Ldarg3 | LdargS | Ldarg => {
                let v = frame.arg(slot(instr, instr.arg_index())?)?.clone();
                frame.stack.push(v);
            }
            LdargaS | Ldarga => frame.stack.push(Value::ArgAddr(slot(instr, instr.arg_index())?)),
            StargS | Starg => {
                let v = frame.pop(instr)?;
                *frame.arg(slot(instr, instr.arg_index())?)? = v;
            }
            Ldloc0 | Ldloc1 | Ldloc2 | Ldloc3 | LdlocS | Ldloc => {
                let v = frame.local(slot(instr, instr.local_index())?)?.clone();
                frame.stack.push(v);
            }
            LdlocaS | Ldloca => frame.stack.push(Value::LocalAddr(slot(instr, instr.local_index())?)),
            Stloc0 | Stloc1 | Stloc2 | Stloc3 | StlocS | Stloc => {
                let v = frame.pop(instr)?;
                *frame.local(slot(instr, instr.local_index())?)? = v;
            }

            Dup => {
                let v = frame.stack.last().cloned().ok_or_else(|| ExecError::StackUnderflow {
                    at: instr.to_string(),
                })?;
                frame.stack.push(v);
            }
            Pop => {
                frame.pop(instr)?;
            }
            Initobj => {
                let ty = token(instr)?.type_ref()?;
                let addr = frame.pop(instr)?;
                let zero = self.host.default_value(ty)?;
                frame.store_indirect(opcode, &addr, zero)?;
            }

            Newobj => {
                let ctor = token(instr)?.method()?;
                let args = frame.pop_n(ctor.params.len(), instr)?;
                let value = match decimal_composite(ctor.declaring.kind(), &args) {
                    Some(d) => Value::Decimal(d),
                    None => self.host.construct(ctor, args)?,
                };
                frame.stack.push(value);
            }
            Call | Callvirt => {
                let method = token(instr)?.method()?;
                let args = frame.pop_n(method.call_pops() as usize, instr)?;
                let result = self.host.call(method, args)?;
                if method.returns_value() {
                    frame.stack.push(result.unwrap_or_default());
                }
            }

            Ldfld => {
                let field = token(instr)?.field()?;
                let target = frame.pop(instr)?;
                frame.stack.push(self.host.load_field(field, Some(&target))?);
            }
            Ldsfld => {
                let field = token(instr)?.field()?;
                frame.stack.push(self.host.load_field(field, None)?);
            }
            Stfld => {
                let field = token(instr)?.field()?;
                let value = frame.pop(instr)?;
                let target = frame.pop(instr)?;
                self.host.store_field(field, Some(&target), value)?;
            }
            Stsfld => {
                let field = token(instr)?.field()?;
                let value = frame.pop(instr)?;
                self.host.store_field(field, None, value)?;
            }

            Box => {
                let ty = token(instr)?.type_ref()?;
                let v = frame.pop(instr)?;
                frame.stack.push(self.host.box_value(ty, v)?);
            }
            UnboxAny => {
                let ty = token(instr)?.type_ref()?;
                let v = frame.pop(instr)?;
                frame.stack.push(self.host.unbox(ty, v)?);
            }
            Castclass | Isinst => {
                let ty = token(instr)?.type_ref()?;
                let v = frame.pop(instr)?;
                if v.is_null() {
                    frame.stack.push(v);
                } else {
                    match self.host.cast(ty, v)? {
                        Some(cast) => frame.stack.push(cast),
                        None if opcode == Isinst => frame.stack.push(Value::Null),
                        None => return Err(anyhow!("invalid cast to {ty}").into()),
                    }
                }
            }

            Add | Sub | Mul | Div | Rem | And | Or | Xor | Shl | Shr | ShrUn => {
                let b = frame.pop(instr)?;
                let a = frame.pop(instr)?;
                frame.stack.push(binary(opcode, a, b)?);
            }
            Neg | Not => {
                let v = frame.pop(instr)?;
                frame.stack.push(unary(opcode, v)?);
            }
            Ceq | Cgt | CgtUn | Clt | CltUn => {
                let b = frame.pop(instr)?;
                let a = frame.pop(instr)?;
                frame.stack.push(Value::from(compare(opcode, &a, &b)?));
            }
            ConvI1 | ConvI2 | ConvI4 | ConvI8 | ConvU1 | ConvU2 | ConvU4 | ConvU8 | ConvI | ConvU | ConvR4 | ConvR8 => {
                let v = frame.pop(instr)?;
                frame.stack.push(convert(opcode, v)?);
            }

            Ret => {
                let value = if routine.returns().is_void() {
                    Value::Null
                } else {
                    frame.pop(instr)?
                };
                return Ok(Some(value));
            }
            _ => return Err(ExecError::Unsupported { opcode }),
        }
        Ok(None)
    }
}

fn token(instr: &Instruction) -> Result<&TokenRef, ExecError> {
    instr.token().ok_or(ExecError::Unsupported { opcode: instr.opcode() })
}

fn slot(instr: &Instruction, index: Option<u16>) -> Result<u16, ExecError> {
    index.ok_or(ExecError::Unsupported { opcode: instr.opcode() })
}

/// `System.Decimal(int lo, int mid, int hi, bool negative, byte scale)`.
fn decimal_composite(kind: &TypeKind, args: &[Value]) -> Option<Decimal> {
    if !matches!(kind, TypeKind::Decimal) {
        return None;
    }
    match args {
        [Value::I4(lo), Value::I4(mid), Value::I4(hi), Value::I4(sign), Value::I4(scale)]
            if (0..=Decimal::MAX_SCALE as i32).contains(scale) =>
        {
            Some(Decimal::from_parts(*lo as u32, *mid as u32, *hi as u32, *sign != 0, *scale as u8))
        }
        _ => None,
    }
}

fn mismatch(opcode: OpCode, a: &Value, b: &Value) -> ExecError {
    ExecError::TypeMismatch {
        opcode,
        found: format!("{} and {}", a.kind_name(), b.kind_name()),
    }
}

fn divide_by_zero() -> ExecError {
    ExecError::Host(anyhow!("attempted to divide by zero"))
}

macro_rules! int_binary {
    ($opcode:expr, $a:expr, $b:expr, $signed:ty, $unsigned:ty) => {{
        let (a, b) = ($a, $b);
        match $opcode {
            OpCode::Add => a.wrapping_add(b),
            OpCode::Sub => a.wrapping_sub(b),
            OpCode::Mul => a.wrapping_mul(b),
            OpCode::Div => {
                if b == 0 {
                    return Err(divide_by_zero());
                }
                a.wrapping_div(b)
            }
            OpCode::Rem => {
                if b == 0 {
                    return Err(divide_by_zero());
                }
                a.wrapping_rem(b)
            }
            OpCode::And => a & b,
            OpCode::Or => a | b,
            OpCode::Xor => a ^ b,
            OpCode::Shl => a.wrapping_shl(b as u32),
            OpCode::Shr => a.wrapping_shr(b as u32),
            _ => ((a as $unsigned).wrapping_shr(b as u32)) as $signed,
        }
    }};
}

fn binary(opcode: OpCode, a: Value, b: Value) -> Result<Value, ExecError> {
    Ok(match (&a, &b) {
        (Value::I4(x), Value::I4(y)) => Value::I4(int_binary!(opcode, *x, *y, i32, u32)),
        (Value::I8(x), Value::I8(y)) => Value::I8(int_binary!(opcode, *x, *y, i64, u64)),
        // Shift counts are always int32.
        (Value::I8(x), Value::I4(y)) if matches!(opcode, OpCode::Shl | OpCode::Shr | OpCode::ShrUn) => {
            Value::I8(int_binary!(opcode, *x, *y as i64, i64, u64))
        }
        (Value::R4(x), Value::R4(y)) => Value::R4(float_binary(opcode, *x as f64, *y as f64).ok_or_else(|| mismatch(opcode, &a, &b))? as f32),
        (Value::R8(x), Value::R8(y)) => Value::R8(float_binary(opcode, *x, *y).ok_or_else(|| mismatch(opcode, &a, &b))?),
        _ => return Err(mismatch(opcode, &a, &b)),
    })
}

fn float_binary(opcode: OpCode, x: f64, y: f64) -> Option<f64> {
    Some(match opcode {
        OpCode::Add => x + y,
        OpCode::Sub => x - y,
        OpCode::Mul => x * y,
        OpCode::Div => x / y,
        OpCode::Rem => x % y,
        _ => return None,
    })
}

fn unary(opcode: OpCode, v: Value) -> Result<Value, ExecError> {
    Ok(match (opcode, &v) {
        (OpCode::Neg, Value::I4(x)) => Value::I4(x.wrapping_neg()),
        (OpCode::Neg, Value::I8(x)) => Value::I8(x.wrapping_neg()),
        (OpCode::Neg, Value::R4(x)) => Value::R4(-x),
        (OpCode::Neg, Value::R8(x)) => Value::R8(-x),
        (OpCode::Not, Value::I4(x)) => Value::I4(!x),
        (OpCode::Not, Value::I8(x)) => Value::I8(!x),
        _ => {
            return Err(ExecError::TypeMismatch {
                opcode,
                found: v.kind_name().to_string(),
            });
        }
    })
}

fn compare(opcode: OpCode, a: &Value, b: &Value) -> Result<bool, ExecError> {
    let unsigned = matches!(opcode, OpCode::CgtUn | OpCode::CltUn);
    let ordering = match (a, b) {
        (Value::I4(x), Value::I4(y)) if unsigned => Some((*x as u32).cmp(&(*y as u32))),
        (Value::I4(x), Value::I4(y)) => Some(x.cmp(y)),
        (Value::I8(x), Value::I8(y)) if unsigned => Some((*x as u64).cmp(&(*y as u64))),
        (Value::I8(x), Value::I8(y)) => Some(x.cmp(y)),
        (Value::R4(x), Value::R4(y)) => (*x as f64).partial_cmp(&(*y as f64)),
        (Value::R8(x), Value::R8(y)) => x.partial_cmp(y),
        _ if opcode == OpCode::Ceq => return Ok(a == b),
        // Any reference compares greater than null, which is all `cgt.un` is used for on objects.
        (Value::Object(_) | Value::Str(_), Value::Null) if opcode == OpCode::CgtUn => return Ok(true),
        (Value::Null, Value::Null) if opcode == OpCode::CgtUn => return Ok(false),
        _ => return Err(mismatch(opcode, a, b)),
    };
    Ok(match (opcode, ordering) {
        (OpCode::Ceq, o) => o == Some(Ordering::Equal),
        (OpCode::Cgt, o) => o == Some(Ordering::Greater),
        (OpCode::Clt, o) => o == Some(Ordering::Less),
        // Unordered floats satisfy the `.un` forms.
        (OpCode::CgtUn, o) => matches!(o, Some(Ordering::Greater) | None),
        (_, o) => matches!(o, Some(Ordering::Less) | None),
    })
}

fn convert(opcode: OpCode, v: Value) -> Result<Value, ExecError> {
    let (int, float) = match &v {
        Value::I4(x) => (*x as i64, *x as f64),
        Value::I8(x) => (*x, *x as f64),
        Value::R4(x) => (*x as i64, *x as f64),
        Value::R8(x) => (*x as i64, *x),
        other => {
            return Err(ExecError::TypeMismatch {
                opcode,
                found: other.kind_name().to_string(),
            });
        }
    };
    Ok(match opcode {
        OpCode::ConvI1 => Value::I4(int as i8 as i32),
        OpCode::ConvI2 => Value::I4(int as i16 as i32),
        OpCode::ConvI4 => Value::I4(int as i32),
        OpCode::ConvU1 => Value::I4(int as u8 as i32),
        OpCode::ConvU2 => Value::I4(int as u16 as i32),
        OpCode::ConvU4 => Value::I4(int as u32 as i32),
        OpCode::ConvR4 => Value::R4(float as f32),
        OpCode::ConvR8 => Value::R8(float),
        OpCode::ConvU8 | OpCode::ConvU => Value::I8(match v {
            Value::I4(x) => x as u32 as i64,
            _ => int,
        }),
        _ => Value::I8(int),
    })
}

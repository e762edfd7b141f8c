use super::{CallHandler, CallOutcome, ExecError, ExecResult, Receiver, Value};
use crate::{ir::call::CallDetails, typed::std_types};

/// Operator methods of the builtin Integer, Boolean and String types, and
/// the List and Iterator methods `for ... in` is lowered to.
///
/// Types without builtins support equality, `_isSet`, `_string` and
/// construction; anything else is [ExecError::UnknownMethod].
#[derive(Default)]
pub struct BuiltinCalls {
    calls: usize,
}

impl BuiltinCalls {
    pub fn new() -> Self { Self::default() }

    /// The number of calls performed.
    pub fn calls(&self) -> usize { self.calls }
}

fn unknown(ty: &str, method: &str) -> ExecError {
    ExecError::UnknownMethod {
        ty: ty.to_string(),
        method: method.to_string(),
    }
}

fn integer_arg(call: &CallDetails, args: &[Option<Value>]) -> ExecResult<i64> {
    match args.first() {
        Some(Some(Value::Integer(i))) => Ok(*i),
        _ => Err(ExecError::CallFailed(format!(
            "`{}` expects an Integer argument",
            call.operand()
        ))),
    }
}

fn integer_call(call: &CallDetails, lhs: i64, args: &[Option<Value>]) -> ExecResult<CallOutcome> {
    let overflow = || ExecError::CallFailed(format!("`{}` overflowed", call.operand()));
    let method = call.method_name.as_str();

    let value = match method {
        "_add" => Value::Integer(lhs.checked_add(integer_arg(call, args)?).ok_or_else(overflow)?),
        "_sub" => Value::Integer(lhs.checked_sub(integer_arg(call, args)?).ok_or_else(overflow)?),
        "_mul" => Value::Integer(lhs.checked_mul(integer_arg(call, args)?).ok_or_else(overflow)?),
        "_div" | "_mod" | "_rem" => {
            let rhs = integer_arg(call, args)?;
            if rhs == 0 {
                return Err(ExecError::CallFailed(format!(
                    "`{}` divides by zero",
                    call.operand()
                )));
            }
            let result = match method {
                "_div" => lhs.checked_div(rhs),
                "_mod" => lhs.checked_rem_euclid(rhs),
                _ => lhs.checked_rem(rhs),
            };
            Value::Integer(result.ok_or_else(overflow)?)
        }
        "_lt" => Value::Boolean(lhs < integer_arg(call, args)?),
        "_lteq" => Value::Boolean(lhs <= integer_arg(call, args)?),
        "_gt" => Value::Boolean(lhs > integer_arg(call, args)?),
        "_gteq" => Value::Boolean(lhs >= integer_arg(call, args)?),
        "_eq" => Value::Boolean(lhs == integer_arg(call, args)?),
        "_neq" => Value::Boolean(lhs != integer_arg(call, args)?),
        "_cmp" => Value::Integer(match lhs.cmp(&integer_arg(call, args)?) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }),
        "_negate" => Value::Integer(lhs.checked_neg().ok_or_else(overflow)?),
        "_inc" => Value::Integer(lhs.checked_add(1).ok_or_else(overflow)?),
        "_dec" => Value::Integer(lhs.checked_sub(1).ok_or_else(overflow)?),
        "_abs" => Value::Integer(lhs.checked_abs().ok_or_else(overflow)?),
        "_string" => Value::String(lhs.to_string()),
        "_hashcode" => Value::Integer(lhs),
        _ => return Err(unknown(std_types::INTEGER, method)),
    };
    Ok(CallOutcome::Object(value))
}

fn boolean_call(call: &CallDetails, lhs: bool, args: &[Option<Value>]) -> ExecResult<CallOutcome> {
    let rhs = || match args.first() {
        Some(Some(Value::Boolean(b))) => Ok(*b),
        _ => Err(ExecError::CallFailed(format!(
            "`{}` expects a Boolean argument",
            call.operand()
        ))),
    };
    let method = call.method_name.as_str();

    let value = match method {
        "_true" => return Ok(CallOutcome::Primitive(lhs)),
        "_false" => return Ok(CallOutcome::Primitive(!lhs)),
        "_not" => Value::Boolean(!lhs),
        "_and" => Value::Boolean(lhs && rhs()?),
        "_or" => Value::Boolean(lhs || rhs()?),
        "_xor" => Value::Boolean(lhs ^ rhs()?),
        "_eq" => Value::Boolean(lhs == rhs()?),
        "_neq" => Value::Boolean(lhs != rhs()?),
        "_string" => Value::String(lhs.to_string()),
        "_hashcode" => Value::Integer(i64::from(lhs)),
        _ => return Err(unknown(std_types::BOOLEAN, method)),
    };
    Ok(CallOutcome::Object(value))
}

fn string_call(call: &CallDetails, lhs: &str, args: &[Option<Value>]) -> ExecResult<CallOutcome> {
    let rhs = || match args.first() {
        Some(Some(Value::String(s))) => Ok(s.as_str()),
        _ => Err(ExecError::CallFailed(format!(
            "`{}` expects a String argument",
            call.operand()
        ))),
    };
    let method = call.method_name.as_str();

    let value = match method {
        "_add" => Value::String(format!("{}{}", lhs, rhs()?)),
        "_eq" => Value::Boolean(lhs == rhs()?),
        "_neq" => Value::Boolean(lhs != rhs()?),
        "_lt" => Value::Boolean(lhs < rhs()?),
        "_gt" => Value::Boolean(lhs > rhs()?),
        "_len" => Value::Integer(lhs.chars().count() as i64),
        "_empty" => Value::Boolean(lhs.is_empty()),
        "_string" => Value::String(lhs.to_string()),
        _ => return Err(unknown(std_types::STRING, method)),
    };
    Ok(CallOutcome::Object(value))
}

fn list_call(call: &CallDetails, items: &mut Vec<Value>, args: &[Option<Value>]) -> ExecResult<CallOutcome> {
    let method = call.method_name.as_str();
    let value = match method {
        "_addAss" => {
            let Some(Some(item)) = args.first() else {
                return Err(ExecError::CallFailed(format!("`{}` needs an item", call.operand())));
            };
            items.push(item.clone());
            return Ok(CallOutcome::Void);
        }
        "_len" => Value::Integer(items.len() as i64),
        "_empty" => Value::Boolean(items.is_empty()),
        "iterator" => Value::Iterator {
            items: items.clone(),
            next: 0,
        },
        "_string" => Value::String(Value::List(items.clone()).to_string()),
        _ => return Err(unknown(std_types::LIST, method)),
    };
    Ok(CallOutcome::Object(value))
}

fn iterator_call(call: &CallDetails, items: &[Value], next: &mut usize) -> ExecResult<CallOutcome> {
    match call.method_name.as_str() {
        "hasNext" => Ok(CallOutcome::Object(Value::Boolean(*next < items.len()))),
        "next" => {
            let item = items
                .get(*next)
                .cloned()
                .ok_or_else(|| ExecError::CallFailed(format!("`{}` past the end", call.operand())))?;
            *next += 1;
            Ok(CallOutcome::Object(item))
        }
        method => Err(unknown(std_types::ITERATOR, method)),
    }
}

impl CallHandler for BuiltinCalls {
    fn call(
        &mut self,
        call: &CallDetails,
        receiver: Receiver<'_>,
        args: &[Option<Value>],
    ) -> ExecResult<CallOutcome> {
        self.calls += 1;
        let method = call.method_name.as_str();

        let receiver = match receiver {
            Receiver::Static => {
                return match method {
                    "<init>" => Ok(CallOutcome::Object(Value::Other {
                        ty: call.target_type.clone(),
                        text: call.target_type.clone(),
                    })),
                    "_of" if call.target_type == std_types::BOOLEAN => match args.first() {
                        Some(Some(value @ Value::Boolean(_))) => Ok(CallOutcome::Object(value.clone())),
                        _ => Err(ExecError::CallFailed(call.operand())),
                    },
                    _ => Err(unknown(&call.target_type, method)),
                };
            }
            Receiver::Null if method == "_isSet" => {
                return Ok(CallOutcome::Object(Value::Boolean(false)));
            }
            Receiver::Null => {
                return Err(ExecError::NullReceiver {
                    method: method.to_string(),
                })
            }
            Receiver::Object(value) => value,
        };

        if method == "_isSet" {
            return Ok(CallOutcome::Object(Value::Boolean(true)));
        }
        // the object was allocated already, construction only sets it up
        if method == "<init>" {
            if receiver.type_name() == std_types::LIST {
                *receiver = Value::List(Vec::new());
            }
            return Ok(CallOutcome::Void);
        }

        match receiver {
            Value::List(items) => return list_call(call, items, args),
            Value::Iterator { items, next } => return iterator_call(call, items, next),
            _ => {}
        }

        match &*receiver {
            Value::Integer(i) => integer_call(call, *i, args),
            Value::Boolean(b) => boolean_call(call, *b, args),
            Value::String(s) => string_call(call, s, args),
            Value::List(_) | Value::Iterator { .. } => Err(unknown(receiver.type_name(), method)),
            Value::Other { ty, text } => match method {
                "_eq" | "_neq" => {
                    let equal = matches!(args.first(), Some(Some(Value::Other { text: other, .. })) if other == text);
                    Ok(CallOutcome::Object(Value::Boolean(equal == (method == "_eq"))))
                }
                "_string" => Ok(CallOutcome::Object(Value::String(text.clone()))),
                _ => Err(unknown(ty, method)),
            },
        }
    }
}

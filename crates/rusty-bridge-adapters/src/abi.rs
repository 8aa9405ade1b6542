use std::str::FromStr;

use alloy::dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{hex, Address, Bytes, FixedBytes, I256, U256};
use serde_json::Value;

use rusty_bridge_core::{AbiPort, ContractCall, PortError};

/// JSON-ABI codec for the contract calls the bridge makes.
///
/// Arguments arrive as JSON values (numbers as decimal or hex strings); outputs
/// come back as JSON with integers as decimal strings, addresses checksummed,
/// and byte values as `0x` hex.
#[derive(Debug, Clone, Default)]
pub struct AbiAdapter;

impl AbiAdapter {
    fn function(call: &ContractCall) -> Result<Function, PortError> {
        let abi: JsonAbi = serde_json::from_str(call.abi)
            .map_err(|e| PortError::Validation(format!("invalid abi json: {e}")))?;
        select_function(&abi, &call.method).cloned()
    }
}

impl AbiPort for AbiAdapter {
    fn encode_call(&self, call: &ContractCall) -> Result<Bytes, PortError> {
        let function = Self::function(call)?;
        if function.inputs.len() != call.args.len() {
            return Err(PortError::Validation(format!(
                "argument count mismatch for {}: expected {}, got {}",
                call.method,
                function.inputs.len(),
                call.args.len()
            )));
        }

        let mut dyn_args = Vec::with_capacity(call.args.len());
        for (input, arg) in function.inputs.iter().zip(call.args.iter()) {
            let ty: DynSolType = input.ty.parse().map_err(|e| {
                PortError::Validation(format!("unsupported type '{}': {e}", input.ty))
            })?;
            let value = parse_dyn_value(arg, &ty).map_err(|e| {
                PortError::Validation(format!("arg '{}' parse failed: {e}", input.name))
            })?;
            dyn_args.push(value);
        }

        let encoded = function
            .abi_encode_input(&dyn_args)
            .map_err(|e| PortError::Validation(format!("abi encoding failed: {e}")))?;
        Ok(Bytes::from(encoded))
    }

    fn decode_output(&self, call: &ContractCall, data: &[u8]) -> Result<Vec<Value>, PortError> {
        let function = Self::function(call)?;
        let decoded = function
            .abi_decode_output(data, true)
            .map_err(|e| PortError::Validation(format!("abi decoding failed: {e}")))?;
        Ok(decoded.iter().map(dyn_to_json).collect())
    }
}

fn select_function<'a>(abi: &'a JsonAbi, method: &str) -> Result<&'a Function, PortError> {
    let (name, full_signature) = match method.split_once('(') {
        Some((name, _)) => (name, Some(method)),
        None => (method, None),
    };

    let candidates = abi
        .function(name)
        .ok_or_else(|| PortError::Validation(format!("method not found: {name}")))?;

    match full_signature {
        Some(signature) => candidates
            .iter()
            .find(|f| f.signature() == signature)
            .ok_or_else(|| {
                PortError::Validation(format!("method signature not found: {signature}"))
            }),
        None => candidates
            .first()
            .ok_or_else(|| PortError::Validation(format!("method has no overloads: {name}"))),
    }
}

fn parse_uint(raw: &str) -> Result<U256, String> {
    match raw.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
        None => U256::from_str(raw),
    }
    .map_err(|e| format!("invalid uint: {e}"))
}

fn parse_items(value: &Value, inner: &DynSolType) -> Result<Vec<DynSolValue>, String> {
    value
        .as_array()
        .ok_or_else(|| "expected array".to_owned())?
        .iter()
        .map(|v| parse_dyn_value(v, inner))
        .collect()
}

fn parse_dyn_value(value: &Value, ty: &DynSolType) -> Result<DynSolValue, String> {
    match ty {
        DynSolType::Bool => match value {
            Value::Bool(b) => Ok(DynSolValue::Bool(*b)),
            Value::String(s) if s == "true" || s == "false" => Ok(DynSolValue::Bool(s == "true")),
            _ => Err("expected bool".to_owned()),
        },
        DynSolType::Uint(bits) => match value {
            Value::String(s) => parse_uint(s).map(|x| DynSolValue::Uint(x, *bits)),
            Value::Number(n) => parse_uint(&n.to_string()).map(|x| DynSolValue::Uint(x, *bits)),
            _ => Err("expected uint string/number".to_owned()),
        },
        DynSolType::Int(bits) => {
            let raw = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return Err("expected int string/number".to_owned()),
            };
            I256::from_str(&raw)
                .map(|x| DynSolValue::Int(x, *bits))
                .map_err(|e| format!("invalid int: {e}"))
        }
        DynSolType::Address => value
            .as_str()
            .ok_or_else(|| "expected address string".to_owned())
            .and_then(|s| {
                Address::from_str(s)
                    .map(DynSolValue::Address)
                    .map_err(|e| format!("invalid address: {e}"))
            }),
        DynSolType::FixedBytes(size) => value
            .as_str()
            .ok_or_else(|| "expected fixed bytes string".to_owned())
            .and_then(|s| {
                FixedBytes::<32>::from_str(s)
                    .map(|x| DynSolValue::FixedBytes(x, *size))
                    .map_err(|e| format!("invalid fixed bytes: {e}"))
            }),
        DynSolType::Bytes => value
            .as_str()
            .ok_or_else(|| "expected bytes string".to_owned())
            .and_then(|s| {
                Bytes::from_str(s)
                    .map(|x| DynSolValue::Bytes(x.into()))
                    .map_err(|e| format!("invalid bytes: {e}"))
            }),
        DynSolType::String => value
            .as_str()
            .map(|s| DynSolValue::String(s.to_owned()))
            .ok_or_else(|| "expected string".to_owned()),
        DynSolType::Array(inner) => parse_items(value, inner).map(DynSolValue::Array),
        DynSolType::FixedArray(inner, size) => {
            let items = parse_items(value, inner)?;
            if items.len() != *size {
                return Err(format!(
                    "fixed array length mismatch: expected {size}, got {}",
                    items.len()
                ));
            }
            Ok(DynSolValue::FixedArray(items))
        }
        DynSolType::Tuple(inner) => {
            let arr = value
                .as_array()
                .ok_or_else(|| "expected tuple array".to_owned())?;
            if arr.len() != inner.len() {
                return Err(format!(
                    "tuple length mismatch: expected {}, got {}",
                    inner.len(),
                    arr.len()
                ));
            }
            arr.iter()
                .zip(inner.iter())
                .map(|(v, t)| parse_dyn_value(v, t))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::Tuple)
        }
        _ => Err(format!("type not supported: {ty}")),
    }
}

fn dyn_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        // bytesN is right-padded inside the word
        DynSolValue::FixedBytes(word, size) => {
            Value::String(hex::encode_prefixed(&word.as_slice()[..*size]))
        }
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::Function(f) => Value::String(hex::encode_prefixed(f.as_slice())),
        DynSolValue::Bytes(b) => Value::String(hex::encode_prefixed(b)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(dyn_to_json).collect())
        }
    }
}

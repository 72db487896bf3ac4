use std::collections::BTreeMap;

use sharr_template::{FIND_IN_MAP, GET_ATT, IF, JOIN, Value};

use crate::FailureReason;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Mismatch {
    pub reason: FailureReason,
    pub detail: String,
}

impl Mismatch {
    pub(crate) fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    fn value(path: &str, want: impl std::fmt::Display, got: impl std::fmt::Display) -> Self {
        Self::new(
            FailureReason::ValueMismatch,
            format!("at `{path}`: expected {want}, found {got}"),
        )
    }
}

/// Every expected property must be present and match exactly. Properties
/// that are not expected are ignored.
pub(crate) fn match_properties(
    expected: &BTreeMap<String, Value>,
    actual: &BTreeMap<String, Value>,
) -> Result<(), Mismatch> {
    for (name, want) in expected {
        let got = actual.get(name).ok_or_else(|| {
            Mismatch::new(
                FailureReason::PropertyMissing,
                format!("property `{name}` is absent"),
            )
        })?;
        match_exact(name, want, got)?;
    }
    Ok(())
}

/// Deep equality with a path to the first difference.
pub(crate) fn match_exact(path: &str, want: &Value, got: &Value) -> Result<(), Mismatch> {
    let (want, got) = (want.normalized(), got.normalized());
    let (want, got) = (want.as_ref(), got.as_ref());
    if want.kind() != got.kind() {
        return Err(Mismatch::new(
            FailureReason::PropertyMismatch,
            format!(
                "at `{path}`: expected {}, found {}",
                want.kind(),
                got.kind()
            ),
        ));
    }

    match (want, got) {
        (Value::Array(want), Value::Array(got)) => match_items(path, want, got),
        (Value::Object(want), Value::Object(got)) => {
            for (key, want) in want {
                let child = format!("{path}.{key}");
                let got = got.get(key).ok_or_else(|| {
                    Mismatch::new(
                        FailureReason::PropertyMissing,
                        format!("`{child}` is absent"),
                    )
                })?;
                match_exact(&child, want, got)?;
            }
            if let Some(extra) = got.keys().find(|key| !want.contains_key(*key)) {
                return Err(Mismatch::new(
                    FailureReason::ValueMismatch,
                    format!("at `{path}`: unexpected key `{extra}`"),
                ));
            }
            Ok(())
        }
        (
            Value::Join {
                delimiter: want_delimiter,
                parts: want_parts,
            },
            Value::Join {
                delimiter: got_delimiter,
                parts: got_parts,
            },
        ) => {
            if want_delimiter != got_delimiter {
                return Err(Mismatch::value(
                    &format!("{path}.{JOIN}"),
                    format_args!("delimiter {want_delimiter:?}"),
                    format_args!("{got_delimiter:?}"),
                ));
            }
            match_items(&format!("{path}.{JOIN}"), want_parts, got_parts)
        }
        (
            Value::If {
                condition: want_condition,
                then: want_then,
                otherwise: want_otherwise,
            },
            Value::If {
                condition: got_condition,
                then: got_then,
                otherwise: got_otherwise,
            },
        ) => {
            let path = format!("{path}.{IF}");
            if want_condition != got_condition {
                return Err(Mismatch::value(
                    &path,
                    format_args!("condition `{want_condition}`"),
                    format_args!("`{got_condition}`"),
                ));
            }
            match_exact(&format!("{path}[1]"), want_then, got_then)?;
            match_exact(&format!("{path}[2]"), want_otherwise, got_otherwise)
        }
        (Value::GetAtt { .. }, _) if want != got => Err(Mismatch::value(
            &format!("{path}.{GET_ATT}"),
            want.to_json(),
            got.to_json(),
        )),
        (Value::FindInMap { .. }, _) if want != got => Err(Mismatch::value(
            &format!("{path}.{FIND_IN_MAP}"),
            want.to_json(),
            got.to_json(),
        )),
        _ if want != got => Err(Mismatch::value(path, want.to_json(), got.to_json())),
        _ => Ok(()),
    }
}

fn match_items(path: &str, want: &[Value], got: &[Value]) -> Result<(), Mismatch> {
    if want.len() != got.len() {
        return Err(Mismatch::value(
            path,
            format_args!("{} items", want.len()),
            got.len(),
        ));
    }
    for (index, (want, got)) in want.iter().zip(got).enumerate() {
        match_exact(&format!("{path}[{index}]"), want, got)?;
    }
    Ok(())
}

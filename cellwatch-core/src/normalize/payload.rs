//! Path lookup and value coercion over a decoded JSON object.

use serde_json::{Map, Value};

/// Read-only accessor for dot-separated paths into a payload object.
///
/// JSON `null` is indistinguishable from an absent key.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Payload<'a> {
    root: &'a Map<String, Value>,
}

impl<'a> Payload<'a> {
    pub(crate) fn new(root: &'a Map<String, Value>) -> Self {
        Self { root }
    }

    pub(crate) fn get(&self, path: &str) -> Option<&'a Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        (!current.is_null()).then_some(current)
    }

    /// First path whose value survives `coerce`.
    pub(crate) fn first<T>(
        &self,
        paths: &[&str],
        coerce: impl Fn(&'a Value) -> Option<T>,
    ) -> Option<T> {
        paths
            .iter()
            .find_map(|path| self.get(path).and_then(&coerce))
    }

    pub(crate) fn number(&self, paths: &[&str]) -> Option<f64> {
        self.first(paths, as_finite)
    }

    pub(crate) fn text(&self, paths: &[&str]) -> Option<String> {
        self.first(paths, as_text)
    }
}

/// Finite number, or a string that parses to one.
pub(crate) fn as_finite(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Integral finite number within `i64`.
pub(crate) fn as_integer(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let number = as_finite(value)?;
    (number.fract() == 0.0 && number >= i64::MIN as f64 && number < i64::MAX as f64)
        .then_some(number as i64)
}

/// Non-negative integer.
pub(crate) fn as_count(value: &Value) -> Option<u64> {
    as_integer(value).and_then(|n| u64::try_from(n).ok())
}

/// Boolean, or the numbers 0 and 1.
pub(crate) fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(_) => match as_integer(value)? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Non-empty trimmed string, or a number rendered as text.
pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Three finite components from an object with the given keys or from the
/// first three elements of an array.
pub(crate) fn as_triple(value: &Value, keys: [&str; 3]) -> Option<[f64; 3]> {
    match value {
        Value::Object(map) => {
            let x = as_finite(map.get(keys[0])?)?;
            let y = as_finite(map.get(keys[1])?)?;
            let z = as_finite(map.get(keys[2])?)?;
            Some([x, y, z])
        }
        Value::Array(items) => {
            let x = as_finite(items.first()?)?;
            let y = as_finite(items.get(1)?)?;
            let z = as_finite(items.get(2)?)?;
            Some([x, y, z])
        }
        _ => None,
    }
}

/// An array of exactly `N` slots: extra elements are dropped, missing ones
/// padded with `None`, elements that fail `elem` become `None`.
pub(crate) fn fixed_array<T, const N: usize>(
    value: &Value,
    elem: impl Fn(&Value) -> Option<T>,
) -> Option<[Option<T>; N]> {
    let items = value.as_array()?;
    Some(std::array::from_fn(|i| items.get(i).and_then(&elem)))
}

/// A raw enum-valued input before translation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RawState<'a> {
    Code(i64),
    /// A finite number that is not an integer. Never in a code table.
    Number(f64),
    Label(&'a str),
}

pub(crate) fn as_state(value: &Value) -> Option<RawState<'_>> {
    match value {
        Value::Number(_) => match as_integer(value) {
            Some(code) => Some(RawState::Code(code)),
            None => as_finite(value).map(RawState::Number),
        },
        Value::String(s) if !s.trim().is_empty() => Some(RawState::Label(s)),
        _ => None,
    }
}

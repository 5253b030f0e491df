//! Global functions available to values templates

use minijinja::{Error, ErrorKind, Value};
use rand::RngCore;

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

/// Read an environment variable; unset variables yield the default or `""`
///
/// Usage: {{ env("IMAGE_TAG", "latest") }}
pub fn env(name: String, default: Option<String>) -> String {
    match std::env::var(&name) {
        Ok(value) => value,
        Err(_) => default.unwrap_or_default(),
    }
}

/// Fail with a custom error message
///
/// Usage: {{ fail("Something went wrong") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(invalid(message))
}

/// Create a dict from key-value pairs
///
/// Usage: {{ dict("key1", value1, "key2", value2) }}
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(invalid(
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = serde_json::Map::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| invalid("dict keys must be strings"))?;
        let value = serde_json::to_value(&pair[1]).map_err(|e| invalid(e.to_string()))?;
        map.insert(key.to_string(), value);
    }

    Ok(Value::from_serialize(serde_json::Value::Object(map)))
}

/// Usage: {{ list("a", "b", "c") }}
pub fn list(args: Vec<Value>) -> Value {
    Value::from(args)
}

/// Attribute lookup with a fallback
///
/// Usage: {{ get(dict("a", 1), "b", 2) }}
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

fn is_blank(value: &Value) -> bool {
    value.is_undefined() || value.is_none() || value.as_str().is_some_and(str::is_empty)
}

/// First argument that is neither undefined, null nor an empty string
///
/// Usage: {{ coalesce(env("TAG"), "latest") }}
pub fn coalesce(args: Vec<Value>) -> Value {
    args.into_iter()
        .find(|arg| !is_blank(arg))
        .unwrap_or(Value::UNDEFINED)
}

/// Usage: {{ ternary("yes", "no", env("CI") == "true") }}
pub fn ternary(true_val: Value, false_val: Value, condition: Value) -> Value {
    if condition.is_true() {
        true_val
    } else {
        false_val
    }
}

/// Random RFC 4122 version 4 UUID
pub fn uuidv4() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

pub fn tostring(value: Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

pub fn toint(value: Value) -> Result<i64, Error> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    match value.as_str() {
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(format!("cannot convert '{}' to int", s))),
        None => Err(invalid(format!("cannot convert {} to int", value))),
    }
}

pub fn tofloat(value: Value) -> Result<f64, Error> {
    if let Some(n) = value.as_i64() {
        return Ok(n as f64);
    }
    if let Ok(n) = f64::try_from(value.clone()) {
        return Ok(n);
    }
    match value.as_str() {
        Some(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("cannot convert '{}' to float", s))),
        None => Err(invalid(format!("cannot convert {} to float", value))),
    }
}

/// Current UTC time, RFC 3339
///
/// Usage: {{ now() }}
pub fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Printf-style formatting with `%s`, `%d`, `%f`, `%v` and `%%`
///
/// Usage: {{ printf("%s-%d", "build", 42) }}
pub fn printf(format: String, args: Vec<Value>) -> Result<String, Error> {
    let mut result = String::with_capacity(format.len() + args.len() * 8);
    let mut chars = format.chars();
    let mut args = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        let Some(spec) = chars.next() else {
            result.push('%');
            break;
        };
        if spec == '%' {
            result.push('%');
            continue;
        }

        let arg = args
            .next()
            .ok_or_else(|| invalid("not enough arguments for format string"))?;
        match (spec, arg.as_i64()) {
            ('d', Some(n)) => result.push_str(&n.to_string()),
            ('f', Some(n)) => result.push_str(&format!("{:.6}", n as f64)),
            _ => result.push_str(&tostring(arg.clone())),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_default() {
        assert_eq!(
            env("APP2KUBE_TEST_SURELY_UNSET".to_string(), Some("fallback".to_string())),
            "fallback"
        );
        assert_eq!(env("APP2KUBE_TEST_SURELY_UNSET".to_string(), None), "");
        assert!(!env("PATH".to_string(), None).is_empty());
    }

    #[test]
    fn test_dict() {
        let value = dict(vec![Value::from("a"), Value::from(1)]).unwrap();
        assert_eq!(value.get_attr("a").unwrap(), Value::from(1));
        assert!(dict(vec![Value::from("odd")]).is_err());
        assert!(dict(vec![Value::from(1), Value::from(2)]).is_err());
    }

    #[test]
    fn test_get() {
        let obj = dict(vec![Value::from("a"), Value::from("x")]).unwrap();
        assert_eq!(get(obj.clone(), "a".to_string(), None), Value::from("x"));
        assert_eq!(get(obj, "b".to_string(), Some(Value::from("y"))), Value::from("y"));
    }

    #[test]
    fn test_coalesce() {
        let result = coalesce(vec![Value::UNDEFINED, Value::from(""), Value::from("x")]);
        assert_eq!(result, Value::from("x"));
        assert!(coalesce(vec![Value::from("")]).is_undefined());
    }

    #[test]
    fn test_ternary() {
        assert_eq!(
            ternary(Value::from("y"), Value::from("n"), Value::from(true)),
            Value::from("y")
        );
        assert_eq!(
            ternary(Value::from("y"), Value::from("n"), Value::from(false)),
            Value::from("n")
        );
    }

    #[test]
    fn test_uuidv4_format() {
        let id = uuidv4();
        assert_eq!(id.len(), 36);
        assert_eq!(&id[14..15], "4");
        assert!(matches!(&id[19..20], "8" | "9" | "a" | "b"));
        assert_ne!(id, uuidv4());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(toint(Value::from("42")).unwrap(), 42);
        assert!(toint(Value::from("x")).is_err());
        assert_eq!(tofloat(Value::from("1.5")).unwrap(), 1.5);
        assert_eq!(tostring(Value::from(7)), "7");
    }

    #[test]
    fn test_printf() {
        assert_eq!(
            printf("%s-%d %%".to_string(), vec![Value::from("build"), Value::from(42)]).unwrap(),
            "build-42 %"
        );
        assert!(printf("%s %s".to_string(), vec![Value::from("a")]).is_err());
    }
}

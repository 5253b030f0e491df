//! Parser for `--set` style expressions
//!
//! Grammar (Helm compatible):
//! - `a=b,c=d` sets several keys
//! - `a.b.c=d` creates nested mappings
//! - `list[0]=x`, `list[1].name=y` index into sequences (padded with nulls)
//! - `list={a,b,c}` sets a sequence literal
//! - a backslash escapes the next character (`a=b\,c` sets `"b,c"`)

use serde_json::{Map, Value as JsonValue};

/// Largest list index accepted, to stop `a[99999999]=x` from allocating
const MAX_INDEX: usize = 65_536;

/// How raw values are turned into JSON values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetMode {
    /// `true`/`false`/`null`/integers are inferred, the rest stays a string
    Typed,
    /// Every value is a string
    String,
    /// Every value is a path read through the caller's reader
    File,
}

type Reader<'r> = dyn FnMut(&str) -> Result<JsonValue, String> + 'r;

/// Parse `input` and apply every assignment to `dest`
pub(crate) fn parse_into(
    input: &str,
    dest: &mut JsonValue,
    mode: SetMode,
    reader: &mut Reader<'_>,
) -> Result<(), String> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
        mode,
        reader,
    };
    let root = object_slot(dest);
    while !parser.at_end() {
        parser.parse_key(root)?;
    }
    Ok(())
}

/// Coerce `slot` into a mapping (replacing any scalar) and return it
pub(crate) fn object_slot(slot: &mut JsonValue) -> &mut Map<String, JsonValue> {
    if !slot.is_object() {
        *slot = JsonValue::Object(Map::new());
    }
    match slot {
        JsonValue::Object(map) => map,
        _ => unreachable!("slot was just replaced with a mapping"),
    }
}

fn array_slot(slot: &mut JsonValue) -> &mut Vec<JsonValue> {
    if !slot.is_array() {
        *slot = JsonValue::Array(Vec::new());
    }
    match slot {
        JsonValue::Array(items) => items,
        _ => unreachable!("slot was just replaced with a sequence"),
    }
}

/// Infer a scalar type from its textual form
pub(crate) fn typed_value(raw: &str) -> JsonValue {
    if raw.eq_ignore_ascii_case("true") {
        return JsonValue::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return JsonValue::Bool(false);
    }
    if raw.eq_ignore_ascii_case("null") {
        return JsonValue::Null;
    }
    if raw == "0" {
        return JsonValue::Number(0.into());
    }
    // Leading zeros keep the value a string (e.g. "0123" stays "0123")
    if !raw.starts_with('0')
        && let Ok(n) = raw.parse::<i64>()
    {
        return JsonValue::Number(n.into());
    }
    JsonValue::String(raw.to_string())
}

struct Parser<'a, 'r> {
    chars: Vec<char>,
    pos: usize,
    mode: SetMode,
    reader: &'a mut Reader<'r>,
}

impl Parser<'_, '_> {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    /// Read until one of `stops` (consumed and returned) or the end of input
    fn read_until(&mut self, stops: &[char]) -> (String, Option<char>) {
        let mut out = String::new();
        while let Some(c) = self.next() {
            if c == '\\' {
                if let Some(escaped) = self.next() {
                    out.push(escaped);
                }
                continue;
            }
            if stops.contains(&c) {
                return (out, Some(c));
            }
            out.push(c);
        }
        (out, None)
    }

    /// Parse one `path=value` assignment relative to `dest`
    fn parse_key(&mut self, dest: &mut Map<String, JsonValue>) -> Result<(), String> {
        let (key, stop) = self.read_until(&['=', '[', ',', '.']);
        match stop {
            None if key.is_empty() => Ok(()),
            None => Err(format!("key \"{key}\" has no value")),
            Some(',') => Err(format!("key \"{key}\" has no value (cannot end with ,)")),
            Some('=') => {
                let value = self.parse_value()?;
                dest.insert(key, value);
                Ok(())
            }
            Some('.') => {
                if key.is_empty() {
                    return Err("key cannot start with '.'".to_string());
                }
                let child = dest
                    .entry(key)
                    .or_insert_with(|| JsonValue::Object(Map::new()));
                self.parse_key(object_slot(child))
            }
            Some('[') => {
                let index = self.parse_index()?;
                let slot = dest.entry(key).or_insert_with(|| JsonValue::Array(Vec::new()));
                self.parse_list_item(array_slot(slot), index)
            }
            Some(other) => Err(format!("unexpected character '{other}'")),
        }
    }

    fn parse_index(&mut self) -> Result<usize, String> {
        let (raw, stop) = self.read_until(&[']']);
        if stop.is_none() {
            return Err(format!("unterminated index \"[{raw}\""));
        }
        let index: usize = raw
            .trim()
            .parse()
            .map_err(|_| format!("invalid list index \"{raw}\""))?;
        if index > MAX_INDEX {
            return Err(format!("list index {index} exceeds the maximum of {MAX_INDEX}"));
        }
        Ok(index)
    }

    fn parse_list_item(&mut self, list: &mut Vec<JsonValue>, index: usize) -> Result<(), String> {
        if list.len() <= index {
            list.resize(index + 1, JsonValue::Null);
        }
        match self.next() {
            Some('=') => {
                list[index] = self.parse_value()?;
                Ok(())
            }
            Some('.') => self.parse_key(object_slot(&mut list[index])),
            Some('[') => {
                let inner = self.parse_index()?;
                self.parse_list_item(array_slot(&mut list[index]), inner)
            }
            Some(other) => Err(format!("unexpected character '{other}' after list index")),
            None => Err(format!("list item [{index}] has no value")),
        }
    }

    /// Parse the right-hand side of `=`, consuming the trailing `,`
    fn parse_value(&mut self) -> Result<JsonValue, String> {
        if self.peek() == Some('{') {
            self.pos += 1;
            return self.parse_list_literal();
        }
        let (raw, _) = self.read_until(&[',']);
        self.convert(&raw)
    }

    fn parse_list_literal(&mut self) -> Result<JsonValue, String> {
        let mut items = Vec::new();
        if self.peek() == Some('}') {
            self.pos += 1;
        } else {
            loop {
                let (raw, stop) = self.read_until(&[',', '}']);
                items.push(self.convert(&raw)?);
                match stop {
                    Some(',') => continue,
                    Some(_) => break,
                    None => return Err("list must terminate with '}'".to_string()),
                }
            }
        }
        match self.next() {
            None | Some(',') => Ok(JsonValue::Array(items)),
            Some(other) => Err(format!("unexpected data '{other}' at end of list")),
        }
    }

    fn convert(&mut self, raw: &str) -> Result<JsonValue, String> {
        match self.mode {
            SetMode::Typed => Ok(typed_value(raw)),
            SetMode::String => Ok(JsonValue::String(raw.to_string())),
            SetMode::File => (self.reader)(raw),
        }
    }
}

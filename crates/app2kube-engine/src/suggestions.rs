//! "Did you mean" hints for values template errors
//!
//! Values templates have no data context, so most mistakes are a typo in a
//! filter or function name, or a bare environment variable name.

/// Largest edit distance still offered as a suggestion
const MAX_DISTANCE: usize = 3;

/// How many candidates a hint lists
const MAX_CANDIDATES: usize = 3;

/// Filters registered on the values engine, custom ones first
pub const AVAILABLE_FILTERS: &[&str] = &[
    "toyaml", "tojson", "b64encode", "b64decode", "quote", "squote", "indent", "nindent",
    "required", "empty", "sha256", "trunc", "trimprefix", "trimsuffix", "snakecase", "kebabcase",
    "default", "upper", "lower", "title", "capitalize", "replace", "trim", "join", "split",
    "first", "last", "length", "reverse", "sort", "unique", "map", "select", "reject", "dictsort",
    "items", "int", "float", "abs", "round", "string", "list", "bool", "urlencode",
];

/// Functions callable from values templates
pub const AVAILABLE_FUNCTIONS: &[&str] = &[
    "env", "fail", "dict", "list", "get", "coalesce", "ternary", "uuidv4", "tostring", "toint",
    "tofloat", "now", "printf", "range", "namespace",
];

/// Candidates within [`MAX_DISTANCE`] edits of `input`, nearest first
pub fn closest<'a>(input: &str, candidates: &[&'a str]) -> Vec<&'a str> {
    let mut scored: Vec<(usize, &str)> = candidates
        .iter()
        .map(|candidate| (strsim::levenshtein(input, candidate), *candidate))
        .filter(|(distance, _)| (1..=MAX_DISTANCE).contains(distance))
        .collect();
    scored.sort();
    scored
        .into_iter()
        .take(MAX_CANDIDATES)
        .map(|(_, candidate)| candidate)
        .collect()
}

fn backticked(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("`{name}`"))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Hint for an undefined name used as a variable
pub fn for_undefined(name: &str) -> String {
    let root = name.split(['.', '[']).next().unwrap_or(name);

    if AVAILABLE_FUNCTIONS.contains(&root) {
        return format!("`{root}` is a function, call it as `{root}()`");
    }

    let looks_like_env = !root.is_empty()
        && root
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if looks_like_env {
        return format!("values templates have no variables; did you mean `env(\"{root}\")`?");
    }

    match closest(root, AVAILABLE_FUNCTIONS).as_slice() {
        [] => format!(
            "values templates have no variables; read the environment with `env(\"{}\")`",
            root.to_uppercase()
        ),
        found => format!("did you mean {}()?", backticked(found)),
    }
}

/// Hint for an unknown filter
pub fn for_filter(name: &str) -> String {
    match closest(name, AVAILABLE_FILTERS).as_slice() {
        [] => format!("no filter named `{name}`; custom filters are {}", AVAILABLE_FILTERS[..16].join(", ")),
        found => format!("did you mean {}?", backticked(found)),
    }
}

/// Hint for an unknown function
pub fn for_function(name: &str) -> String {
    match closest(name, AVAILABLE_FUNCTIONS).as_slice() {
        [] => format!("no function named `{name}`; available: {}", AVAILABLE_FUNCTIONS.join(", ")),
        found => format!("did you mean {}?", backticked(found)),
    }
}

/// Name following `keyword` in an error message, or the first quoted word
///
/// Handles both `filter toyml is unknown` and ``unknown function `evn` ``.
pub fn name_in_message(message: &str, keyword: &str) -> Option<String> {
    let words: Vec<&str> = message.split_whitespace().collect();
    let after_keyword = words
        .windows(2)
        .find(|pair| pair[0] == keyword)
        .map(|pair| pair[1].trim_matches(|c: char| !(c.is_alphanumeric() || c == '_')));
    if let Some(name) = after_keyword.filter(|name| !name.is_empty()) {
        return Some(name.to_string());
    }

    ['`', '\'', '"'].into_iter().find_map(|quote| {
        let start = message.find(quote)? + 1;
        let len = message[start..].find(quote)?;
        Some(message[start..start + len].to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest() {
        assert_eq!(closest("toyml", AVAILABLE_FILTERS)[0], "toyaml");
        assert!(!closest("env", AVAILABLE_FUNCTIONS).contains(&"env"));
        assert!(closest("completelydifferent", AVAILABLE_FILTERS).is_empty());
    }

    #[test]
    fn test_undefined_env_name() {
        assert!(for_undefined("IMAGE_TAG").contains("env(\"IMAGE_TAG\")"));
        assert!(for_undefined("now").contains("now()"));
        assert!(for_undefined("evn").contains("`env`"));
    }

    #[test]
    fn test_filter_and_function_hints() {
        assert!(for_filter("toyml").contains("`toyaml`"));
        assert!(for_filter("zzzzzzzz").starts_with("no filter named"));
        assert!(for_function("uuid4").contains("`uuidv4`"));
    }

    #[test]
    fn test_name_in_message() {
        assert_eq!(
            name_in_message("unknown filter: filter toyml is unknown", "filter"),
            Some("toyml".to_string())
        );
        assert_eq!(
            name_in_message("unknown function `evn`", "nothing"),
            Some("evn".to_string())
        );
        assert_eq!(name_in_message("broken", "filter"), None);
    }
}

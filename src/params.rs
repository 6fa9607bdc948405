//! Route parameters and query string codec
//!
//! [`RouteParams`] holds values captured by a route pattern (like `:id`).
//! [`Query`] is the parsed form of a query string. Repeated keys collapse into
//! lists and bracket keys (`tag[]=a`, `filter[kind]=b`) build nested values.

use std::collections::{BTreeMap, HashMap};

/// Route parameters extracted from path segments
///
/// # Example
///
/// ```
/// use route_pilot::RouteParams;
///
/// // Route pattern: /users/:id
/// // Matched path: /users/123
/// let mut params = RouteParams::new();
/// params.insert("id", "123");
///
/// assert_eq!(params.get("id"), Some("123"));
/// assert_eq!(params.get_as::<i32>("id"), Some(123));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    params: HashMap<String, String>,
}

impl RouteParams {
    /// Create new empty route params
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from hashmap
    pub fn from_map(params: HashMap<String, String>) -> Self {
        Self { params }
    }

    /// Get a parameter value as a string
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Get a parameter and parse it as a specific type
    ///
    /// Returns `None` if the parameter doesn't exist or cannot be parsed.
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: std::str::FromStr,
    {
        self.params.get(key)?.parse().ok()
    }

    /// Insert a parameter, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Remove a parameter
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.params.remove(key)
    }

    /// Check if parameter exists
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Get all parameters as a reference to the HashMap
    pub fn all(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Iterate over all parameters
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.params.iter()
    }

    /// Check if parameters are empty
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Get number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }
}

impl<K, V> FromIterator<(K, V)> for RouteParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ============================================================================
// Query Parameters
// ============================================================================

/// A single query value: a string, a list, or a nested map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Str(String),
    List(Vec<QueryValue>),
    Map(BTreeMap<String, QueryValue>),
}

impl QueryValue {
    /// String value, or the first string of a list
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::Str(s) => Some(s),
            QueryValue::List(items) => items.first().and_then(QueryValue::as_str),
            QueryValue::Map(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[QueryValue]> {
        match self {
            QueryValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, QueryValue>> {
        match self {
            QueryValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// All string leaves in order
    pub fn strings(&self) -> Vec<&str> {
        match self {
            QueryValue::Str(s) => vec![s.as_str()],
            QueryValue::List(items) => items.iter().flat_map(QueryValue::strings).collect(),
            QueryValue::Map(map) => map.values().flat_map(QueryValue::strings).collect(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Str(value)
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        QueryValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Query parameters parsed from a URL query string
///
/// Keys are kept sorted so serialization is deterministic.
///
/// # Example
///
/// ```
/// use route_pilot::Query;
///
/// let query = Query::parse("id[]=1&id[]=2&page=3");
///
/// assert_eq!(query.get_all("id"), vec!["1", "2"]);
/// assert_eq!(query.get_as::<i32>("page"), Some(3));
/// assert_eq!(Query::parse("id[]=1&id[]=2").to_query_string(), "id[]=1&id[]=2");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: BTreeMap<String, QueryValue>,
}

impl Query {
    /// Create new empty query params
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from query string, with or without the leading `?`
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut params = BTreeMap::new();

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_form_component(raw_key);
            let value = decode_form_component(raw_value);

            let (base, path) = split_key(&key);
            if base.is_empty() {
                continue;
            }

            let previous = params.remove(base);
            params.insert(base.to_string(), assign(previous, &path, value));
        }

        Self { params }
    }

    /// Get the value for a key
    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.params.get(key)
    }

    /// Get the first string value for a key
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key)?.as_str()
    }

    /// Get every string value for a key
    ///
    /// Useful for parameters that can appear multiple times like `?tag=a&tag=b`
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.params
            .get(key)
            .map(QueryValue::strings)
            .unwrap_or_default()
    }

    /// Get parameter as a specific type
    ///
    /// Returns the first value parsed as type T.
    pub fn get_as<T>(&self, key: &str) -> Option<T>
    where
        T: std::str::FromStr,
    {
        self.get_str(key)?.parse().ok()
    }

    /// Set a value, replacing the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.params.insert(key.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Add a string value; a repeated key collapses into a list
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let previous = self.params.remove(&key);
        self.params.insert(key, assign(previous, &[], value.into()));
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        self.params.remove(key)
    }

    /// Check if parameter exists
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    /// Iterate over keys and values in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &QueryValue)> {
        self.params.iter()
    }

    /// Convert to query string (without the leading `?`)
    pub fn to_query_string(&self) -> String {
        let mut pairs = Vec::new();
        for (key, value) in &self.params {
            serialize(key, value, &mut pairs);
        }
        pairs.join("&")
    }

    /// Check if parameters are empty
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Get number of unique parameter keys
    pub fn len(&self) -> usize {
        self.params.len()
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

/// Split `a[b][]` into `a` and `["b", ""]`
fn split_key(key: &str) -> (&str, Vec<String>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };

    let base = &key[..open];
    let mut path = Vec::new();
    let mut rest = &key[open..];

    while let Some(inner) = rest.strip_prefix('[') {
        match inner.find(']') {
            Some(close) => {
                path.push(inner[..close].to_string());
                rest = &inner[close + 1..];
            }
            // Unbalanced bracket: treat the whole key as a plain name
            None => return (key, Vec::new()),
        }
    }

    if rest.is_empty() {
        (base, path)
    } else {
        (key, Vec::new())
    }
}

/// Merge `value` at `path` into an existing slot
fn assign(target: Option<QueryValue>, path: &[String], value: String) -> QueryValue {
    match path.split_first() {
        None => match target {
            None => QueryValue::Str(value),
            Some(QueryValue::Str(previous)) => {
                QueryValue::List(vec![QueryValue::Str(previous), QueryValue::Str(value)])
            }
            Some(QueryValue::List(mut items)) => {
                items.push(QueryValue::Str(value));
                QueryValue::List(items)
            }
            Some(map @ QueryValue::Map(_)) => map,
        },
        Some((segment, rest)) if segment.is_empty() => {
            let mut items = match target {
                None => Vec::new(),
                Some(QueryValue::List(items)) => items,
                Some(other) => vec![other],
            };
            items.push(assign(None, rest, value));
            QueryValue::List(items)
        }
        Some((segment, rest)) => {
            let mut map = match target {
                Some(QueryValue::Map(map)) => map,
                _ => BTreeMap::new(),
            };
            let child = map.remove(segment);
            map.insert(segment.clone(), assign(child, rest, value));
            QueryValue::Map(map)
        }
    }
}

fn serialize(prefix: &str, value: &QueryValue, out: &mut Vec<String>) {
    match value {
        QueryValue::Str(s) => out.push(format!(
            "{}={}",
            encode_query_key(prefix),
            encode_uri_component(s)
        )),
        QueryValue::List(items) => {
            let key = format!("{prefix}[]");
            for item in items {
                serialize(&key, item, out);
            }
        }
        QueryValue::Map(map) => {
            for (name, item) in map {
                serialize(&format!("{prefix}[{name}]"), item, out);
            }
        }
    }
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}

/// URI component encoding (percent-encodes everything outside the unreserved set)
pub(crate) fn encode_uri_component(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for byte in s.bytes() {
        if is_unreserved(byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// Same as [`encode_uri_component`] but keeps brackets readable
fn encode_query_key(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for byte in s.bytes() {
        if is_unreserved(byte) || byte == b'[' || byte == b']' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

/// URI component decoding for path segments; `+` stays literal
pub(crate) fn decode_uri_component(s: &str) -> String {
    percent_decode(s, false)
}

/// Query string decoding; `+` is a space
pub(crate) fn decode_form_component(s: &str) -> String {
    percent_decode(s, true)
}

/// Bad escapes are kept verbatim
fn percent_decode(s: &str, plus_as_space: bool) -> String {
    let bytes = s.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                if let Some(byte) = hex {
                    decoded.push(byte);
                    i += 3;
                } else {
                    decoded.push(b'%');
                    i += 1;
                }
            }
            b'+' if plus_as_space => {
                decoded.push(b' ');
                i += 1;
            }
            byte => {
                decoded.push(byte);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_params_basic() {
        let mut params = RouteParams::new();
        params.insert("id", "123");

        assert_eq!(params.get("id"), Some("123"));
        assert!(params.contains("id"));
        assert!(!params.contains("missing"));
    }

    #[test]
    fn test_route_params_get_as() {
        let params: RouteParams = [("id", "123"), ("active", "true")].into_iter().collect();

        assert_eq!(params.get_as::<i32>("id"), Some(123));
        assert_eq!(params.get_as::<u32>("id"), Some(123));
        assert_eq!(params.get_as::<bool>("active"), Some(true));
        assert_eq!(params.get_as::<i32>("missing"), None);
    }

    #[test]
    fn test_route_params_equality_ignores_order() {
        let a = RouteParams::new().with("x", "1").with("y", "2");
        let b = RouteParams::new().with("y", "2").with("x", "1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_query_basic() {
        let query = Query::parse("page=1&sort=name&filter=active");

        assert_eq!(query.get_str("page"), Some("1"));
        assert_eq!(query.get_str("sort"), Some("name"));
        assert_eq!(query.get_str("filter"), Some("active"));
        assert_eq!(query.get_str("missing"), None);
    }

    #[test]
    fn test_query_leading_question_mark() {
        let query = Query::parse("?a=1");
        assert_eq!(query.get_str("a"), Some("1"));
    }

    #[test]
    fn test_query_repeated_keys_collapse_in_order() {
        let query = Query::parse("tag=rust&tag=router&tag=ui");

        assert_eq!(query.get_all("tag"), vec!["rust", "router", "ui"]);
        // get_str() returns first value
        assert_eq!(query.get_str("tag"), Some("rust"));
    }

    #[test]
    fn test_query_bracket_list_round_trip() {
        let query = Query::parse("id[]=1&id[]=2");
        assert_eq!(
            query.get("id"),
            Some(&QueryValue::List(vec!["1".into(), "2".into()]))
        );
        assert_eq!(query.to_query_string(), "id[]=1&id[]=2");
    }

    #[test]
    fn test_query_nested_map() {
        let query = Query::parse("filter[kind]=mail&filter[tags][]=a&filter[tags][]=b");
        let filter = query.get("filter").and_then(QueryValue::as_map).unwrap();

        assert_eq!(filter.get("kind"), Some(&QueryValue::from("mail")));
        assert_eq!(filter.get("tags"), Some(&QueryValue::from(vec!["a", "b"])));
        assert_eq!(
            query.to_query_string(),
            "filter[kind]=mail&filter[tags][]=a&filter[tags][]=b"
        );
    }

    #[test]
    fn test_query_append() {
        let mut query = Query::new();
        query.append("key", "value1");
        query.append("key", "value2");

        assert_eq!(query.get_all("key"), vec!["value1", "value2"]);
        assert_eq!(query.to_query_string(), "key[]=value1&key[]=value2");
    }

    #[test]
    fn test_query_key_without_value() {
        let query = Query::parse("flag&x=1");
        assert_eq!(query.get_str("flag"), Some(""));
        assert_eq!(query.get_str("x"), Some("1"));
    }

    #[test]
    fn test_uri_encoding() {
        assert_eq!(encode_uri_component("hello world"), "hello%20world");
        assert_eq!(encode_uri_component("test@example.com"), "test%40example.com");
        assert_eq!(encode_uri_component("é"), "%C3%A9");
    }

    #[test]
    fn test_uri_decoding() {
        assert_eq!(decode_uri_component("hello%20world"), "hello world");
        assert_eq!(decode_uri_component("c++"), "c++");
        assert_eq!(decode_uri_component("%C3%A9"), "é");
        assert_eq!(decode_uri_component("100%"), "100%");
        assert_eq!(decode_uri_component("%zz"), "%zz");
    }

    #[test]
    fn test_form_decoding_maps_plus_to_space() {
        assert_eq!(decode_form_component("hello+world"), "hello world");
        assert_eq!(decode_form_component("c%2B%2B"), "c++");

        let query = Query::parse("q=rust+lang&tag=c%2B%2B");
        assert_eq!(query.get_str("q"), Some("rust lang"));
        assert_eq!(query.get_str("tag"), Some("c++"));
    }

    #[test]
    fn test_query_encoding_round_trip() {
        let query = Query::new().with("q", "a b&c");
        let encoded = query.to_query_string();
        assert_eq!(encoded, "q=a%20b%26c");
        assert_eq!(Query::parse(&encoded), query);
    }

    #[test]
    fn test_empty_query_string() {
        let query = Query::parse("");
        assert!(query.is_empty());
        assert_eq!(query.to_query_string(), "");
    }
}

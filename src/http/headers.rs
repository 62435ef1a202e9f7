use std::str::FromStr;

/// Ordered header list with case-insensitive name lookup.
///
/// Request headers are stored through [`Headers::insert`] (one value per
/// name, last one wins). Responses use [`Headers::append`] so that a name may
/// repeat and everything goes out in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Looks up `name` and parses it, e.g. `headers.get_as::<u64>("content-length")`.
    ///
    /// `None` when the header is missing or does not parse.
    pub fn get_as<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every value stored under `name` with a single new one,
    /// keeping the position of the first.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(pos) => {
                self.entries[pos].1 = value;
                let mut index = 0;
                self.entries.retain(|(k, _)| {
                    let keep = index <= pos || !k.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Drops every value stored under `name`; returns how many went.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` only for an explicit `Connection: Keep-Alive` (any case).
    pub fn keep_alive(&self) -> bool {
        self.get("connection")
            .map(|v| v.trim().eq_ignore_ascii_case("keep-alive"))
            .unwrap_or(false)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

/// Decoded `key=value&key2=value2` pairs, as found in a query string or a
/// form-encoded body.
///
/// Keys are unique and compared case-insensitively; a repeated key keeps its
/// last value. A key written without `=` has no value at all, which is
/// different from an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Option<String>)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percent-decodes each pair with `+` read as a space.
    ///
    /// ```
    /// # use vigil::http::headers::Params;
    /// let params = Params::parse("x=1&y=hello+world&flag");
    /// assert_eq!(params.get("y"), Some("hello world"));
    /// assert!(params.contains("flag"));
    /// assert_eq!(params.get("flag"), None);
    /// ```
    pub fn parse(input: &str) -> Self {
        let mut params = Params::new();

        for pair in input.split('&').filter(|p| !p.is_empty()) {
            let Some((key, value)) = url::form_urlencoded::parse(pair.as_bytes()).next() else {
                continue;
            };
            let value = pair.contains('=').then(|| value.into_owned());
            params.set(key.into_owned(), value);
        }

        params
    }

    pub fn set(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value for `key`; `None` both when missing and when valueless.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lookup(key).flatten()
    }

    /// Distinguishes a missing key (`None`) from a valueless one (`Some(None)`).
    pub fn lookup(&self, key: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes back to `k=v&k2=v2`, percent-encoded. Valueless keys are
    /// written with an empty value.
    pub fn to_uri_data(&self) -> String {
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in self.iter() {
            out.append_pair(k, v.unwrap_or(""));
        }
        out.finish()
    }
}

/// Looks a key up in several parameter sets in turn; the first set that has
/// the key answers.
#[derive(Debug, Clone, Default)]
pub struct ParamsChain<'a> {
    sources: Vec<&'a Params>,
}

impl<'a> ParamsChain<'a> {
    pub fn new(sources: impl IntoIterator<Item = &'a Params>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.sources
            .iter()
            .find_map(|params| params.lookup(key))
            .flatten()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sources.iter().any(|params| params.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "text/plain");

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn insert_collapses_duplicates() {
        let mut headers = Headers::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("X-Other", "x");
        headers.append("set-cookie", "b=2");

        headers.insert("SET-COOKIE", "c=3");

        let all: Vec<_> = headers.iter().collect();
        assert_eq!(all, vec![("Set-Cookie", "c=3"), ("X-Other", "x")]);
    }

    #[test]
    fn typed_lookup() {
        let headers: Headers = [("Content-Length", " 42 "), ("X-Bad", "nope")]
            .into_iter()
            .collect();

        assert_eq!(headers.get_as::<u64>("content-length"), Some(42));
        assert_eq!(headers.get_as::<u64>("x-bad"), None);
    }

    #[test]
    fn keep_alive_needs_explicit_header() {
        let mut headers = Headers::new();
        assert!(!headers.keep_alive());

        headers.insert("Connection", "close");
        assert!(!headers.keep_alive());

        headers.insert("connection", "KEEP-ALIVE");
        assert!(headers.keep_alive());
    }

    #[test]
    fn repeated_param_keeps_last() {
        let params = Params::parse("a=1&A=2&b=%20x");

        assert_eq!(params.len(), 2);
        assert_eq!(params.get("a"), Some("2"));
        assert_eq!(params.get("b"), Some(" x"));
    }

    #[test]
    fn uri_data_encodes() {
        let mut params = Params::new();
        params.set("q", Some("a b&c".to_string()));
        params.set("flag", None);

        assert_eq!(params.to_uri_data(), "q=a+b%26c&flag=");
    }

    #[test]
    fn chain_takes_first_source_with_the_key() {
        let query = Params::parse("id=1");
        let form = Params::parse("id=2&name=x");
        let chain = ParamsChain::new([&query, &form]);

        assert_eq!(chain.get("id"), Some("1"));
        assert_eq!(chain.get("name"), Some("x"));
        assert!(!chain.contains("missing"));
    }
}

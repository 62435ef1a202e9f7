/// Cookies sent by the client in its `Cookie` header.
///
/// Any change through [`CookieStore::upsert`] or [`CookieStore::remove`]
/// marks the store as touched, and a touched store is written back in full as
/// `Set-Cookie` lines on the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieStore {
    entries: Vec<(String, String)>,
    touched: bool,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `k1=v1; k2=v2`. Pieces without `=` are skipped; a repeated
    /// name keeps its last value.
    pub fn parse(header: &str) -> Self {
        let mut store = CookieStore::new();

        for piece in header.split(';') {
            if let Some((name, value)) = piece.trim().split_once('=') {
                store.set(name.trim(), value.trim());
            }
        }

        store
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn upsert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set(name, value);
        self.touched = true;
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));

        let removed = self.entries.len() != before;
        self.touched |= removed;
        removed
    }

    pub fn touched(&self) -> bool {
        self.touched
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

    /// One `Set-Cookie: name=value` line per stored cookie, CR LF terminated.
    pub fn to_cookie_data(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("Set-Cookie: {k}={v}\r\n"))
            .collect()
    }

    fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }
}

use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;

use crate::error::Error;

/// HTTP request methods understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::Connect,
        Method::Delete,
        Method::Get,
        Method::Head,
        Method::Options,
        Method::Patch,
        Method::Post,
        Method::Put,
        Method::Trace,
    ];

    /// Canonical upper-case token as it appears on the request line.
    ///
    /// ```
    /// # use vigil::http::method::Method;
    /// assert_eq!(Method::Get.as_str(), "GET");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Connect => "CONNECT",
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive: `get`, `Get` and `GET` all parse to [`Method::Get`].
impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownMethod(s.to_string()))
    }
}

/// Memoized verb-name lookup.
///
/// Safe to share between connections; concurrent callers asking for the
/// same name all get the same answer and no insert is lost. Unknown names
/// are never cached.
#[derive(Debug, Default)]
pub struct MethodCache {
    entries: DashMap<String, Method>,
}

impl MethodCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide(&self, name: &str) -> crate::Result<Method> {
        if let Some(method) = self.entries.get(name) {
            return Ok(*method);
        }

        let method = name.parse::<Method>()?;
        Ok(*self.entries.entry(name.to_string()).or_insert(method))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_case() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("Options".parse::<Method>().unwrap(), Method::Options);
        assert_eq!("TRACE".parse::<Method>().unwrap(), Method::Trace);
    }

    #[test]
    fn unknown_verb_is_an_error() {
        let err = "BREW".parse::<Method>().unwrap_err();
        assert!(matches!(err, Error::UnknownMethod(name) if name == "BREW"));
    }

    #[test]
    fn cache_memoizes_hits_only() {
        let cache = MethodCache::new();

        assert_eq!(cache.provide("post").unwrap(), Method::Post);
        assert_eq!(cache.provide("post").unwrap(), Method::Post);
        assert!(cache.provide("BREW").is_err());

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_is_consistent_across_threads() {
        let cache = std::sync::Arc::new(MethodCache::new());

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.provide("Delete").unwrap())
            })
            .collect();

        for worker in workers {
            assert_eq!(worker.join().unwrap(), Method::Delete);
        }
        assert_eq!(cache.len(), 1);
    }
}

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use crate::http::cookies::CookieStore;
use crate::http::request::Request;
use crate::http::response::Response;

/// Everything a handler sees for one request.
///
/// The connection builds a fresh context per parsed request and writes
/// whatever response is left in it once the pipeline has finished.
#[derive(Debug)]
pub struct Context {
    request: Request,
    response: Option<Response>,
    remote_addr: SocketAddr,
    cookies: Option<CookieStore>,
    state: Extensions,
}

impl Context {
    pub fn new(request: Request, remote_addr: SocketAddr) -> Self {
        Self {
            request,
            response: None,
            remote_addr,
            cookies: None,
            state: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    /// Stores the response, handing back any previous one.
    pub fn set_response(&mut self, response: Response) -> Option<Response> {
        self.response.replace(response)
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    /// Cookie store, parsed from the request's `Cookie` header on first use.
    pub fn cookies(&mut self) -> &mut CookieStore {
        let request = &self.request;
        self.cookies.get_or_insert_with(|| {
            request
                .header("cookie")
                .map(CookieStore::parse)
                .unwrap_or_default()
        })
    }

    /// The cookie store if anything has asked for it yet.
    pub fn parsed_cookies(&self) -> Option<&CookieStore> {
        self.cookies.as_ref()
    }

    /// Per-request data shared between handlers. The engine never reads it.
    pub fn state(&self) -> &Extensions {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Extensions {
        &mut self.state
    }
}

/// Type-keyed map holding at most one value per type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok().map(|boxed| *boxed))
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok().map(|boxed| *boxed))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

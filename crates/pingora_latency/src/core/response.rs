use bytes::Bytes;
use futures::stream::BoxStream;
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::core::completion::CompletionHooks;

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    pub(crate) completion: CompletionHooks,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: Body::Bytes(Bytes::new()),
            completion: CompletionHooks::new(),
        }
    }

    pub fn text<S: Into<String>>(status: u16, body: S) -> Self {
        let mut res = Self::new(status);
        res.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res.body = Body::Bytes(Bytes::from(body.into().into_bytes()));
        res
    }

    /// Construct an empty response with given status. Does not set content-type.
    pub fn empty(status: u16) -> Self {
        Self::new(status)
    }

    /// Construct a streaming response from a boxed stream of Bytes chunks
    pub fn stream(status: u16, stream: BoxStream<'static, Bytes>) -> Self {
        let mut res = Self::new(status);
        res.body = Body::Stream(stream);
        res
    }

    pub fn set_header<K, V>(&mut self, k: K, v: V)
    where
        K: TryInto<http::HeaderName>,
        V: TryInto<HeaderValue>,
    {
        if let (Ok(key), Ok(value)) = (k.try_into(), v.try_into()) {
            self.headers.insert(key, value);
        }
    }

    pub fn header<K, V>(mut self, k: K, v: V) -> Self
    where
        K: TryInto<http::HeaderName>,
        V: TryInto<HeaderValue>,
    {
        self.set_header(k, v);
        self
    }

    /// Register an observer that runs once this response has been fully sent.
    ///
    /// The server fires observers after the final body chunk is written. If the
    /// response is dropped before that, observers are discarded without running.
    pub fn on_complete<F>(&mut self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.completion.push(hook);
    }

    /// Fire the completion observers. Later calls are no-ops.
    pub fn complete(&mut self) {
        self.completion.fire();
    }

    /// Detach the completion observers so the body can be consumed separately.
    pub(crate) fn take_completion(&mut self) -> CompletionHooks {
        std::mem::take(&mut self.completion)
    }
}

pub enum Body {
    Bytes(Bytes),
    Stream(BoxStream<'static, Bytes>),
}

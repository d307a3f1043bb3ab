// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request metadata and bearer token extraction.
//!
//! The authenticator only needs the method, the path and the headers of a
//! request, so any host framework can plug in by implementing
//! [`AuthRequest`]. Implementations for `http::Request<B>` and
//! `http::request::Parts` are provided.
//!
//! ```rust,ignore
//! let outcome = authenticator.authenticate(&request).await;
//! ```

use http::header::AUTHORIZATION;
use http::request::Parts;
use http::{HeaderMap, Method, Request};

/// What the authenticator reads from an incoming request.
pub trait AuthRequest {
    fn method(&self) -> &Method;
    fn path(&self) -> &str;
    fn headers(&self) -> &HeaderMap;
}

impl<B> AuthRequest for Request<B> {
    fn method(&self) -> &Method {
        Request::method(self)
    }

    fn path(&self) -> &str {
        self.uri().path()
    }

    fn headers(&self) -> &HeaderMap {
        Request::headers(self)
    }
}

impl AuthRequest for Parts {
    fn method(&self) -> &Method {
        &self.method
    }

    fn path(&self) -> &str {
        self.uri.path()
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Token from `Authorization: Bearer <token>`.
///
/// The scheme is case-insensitive and must be followed by whitespace and a
/// non-empty token. Anything else reads as no token.
pub fn read_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, rest) = value.split_at_checked("bearer".len())?;

    if !scheme.eq_ignore_ascii_case("bearer") || !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(authorization).unwrap());
        headers
    }

    #[test]
    fn reads_bearer_token() {
        assert_eq!(read_token(&headers("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(read_token(&headers("bearer abc")), Some("abc"));
        assert_eq!(read_token(&headers("BEARER   abc  ")), Some("abc"));
    }

    #[test]
    fn rejects_other_shapes() {
        assert_eq!(read_token(&HeaderMap::new()), None);
        assert_eq!(read_token(&headers("Bearer")), None);
        assert_eq!(read_token(&headers("Bearer ")), None);
        assert_eq!(read_token(&headers("Bearerabc")), None);
        assert_eq!(read_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(read_token(&headers("Token abc")), None);
        assert_eq!(read_token(&headers("abc")), None);
    }

    #[test]
    fn non_ascii_header_reads_as_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_bytes(b"Bearer \xfftoken").unwrap(),
        );
        assert_eq!(read_token(&headers), None);
    }

    #[test]
    fn request_and_parts_expose_metadata() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("https://api.example.com/widgets/7?expand=true")
            .header(AUTHORIZATION, "Bearer t")
            .body(())
            .unwrap();

        assert_eq!(AuthRequest::method(&request), Method::POST);
        assert_eq!(AuthRequest::path(&request), "/widgets/7");
        assert_eq!(read_token(AuthRequest::headers(&request)), Some("t"));

        let (parts, ()) = request.into_parts();
        assert_eq!(AuthRequest::method(&parts), Method::POST);
        assert_eq!(AuthRequest::path(&parts), "/widgets/7");
        assert_eq!(read_token(AuthRequest::headers(&parts)), Some("t"));
    }
}

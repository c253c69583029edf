//! Allow / deny classification of the auth backend's answer.

use axum::http::{HeaderName, HeaderValue, Request, Response, StatusCode};

/// Header through which the backend hands an identity to the downstream
/// handler.
pub const X_AUTH_REQUEST: HeaderName = HeaderName::from_static("x-auth-request");

/// Verdict of the auth backend.
#[derive(Debug)]
pub enum Decision<B> {
    /// Continue to the downstream handler, optionally with an identity.
    Allow { identity: Option<HeaderValue> },
    /// Relay this response to the client as is.
    Deny(Response<B>),
}

/// Classify `response`: only 200 and 202 allow.
///
/// On allow the response, body included, is dropped before returning.
pub fn decide<B>(response: Response<B>) -> Decision<B> {
    match response.status() {
        StatusCode::OK | StatusCode::ACCEPTED => {
            let identity = response
                .headers()
                .get(&X_AUTH_REQUEST)
                .filter(|value| !value.is_empty())
                .cloned();
            drop(response);
            Decision::Allow { identity }
        }
        _ => Decision::Deny(response),
    }
}

/// Append the backend-supplied identity to the inbound request.
pub fn inject_identity<B>(request: &mut Request<B>, identity: Option<HeaderValue>) {
    if let Some(identity) = identity {
        request.headers_mut().append(X_AUTH_REQUEST, identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, identity: Option<&'static str>) -> Response<()> {
        let mut builder = Response::builder().status(status);
        if let Some(identity) = identity {
            builder = builder.header("x-auth-request", identity);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn ok_and_accepted_allow() {
        for status in [200, 202] {
            match decide(response(status, Some("alice"))) {
                Decision::Allow { identity } => assert_eq!(identity.unwrap(), "alice"),
                Decision::Deny(_) => panic!("{status} denied"),
            }
        }
    }

    #[test]
    fn everything_else_denies() {
        for status in [201, 204, 302, 303, 401, 403, 404, 500, 503] {
            match decide(response(status, Some("alice"))) {
                Decision::Deny(res) => assert_eq!(res.status(), status),
                Decision::Allow { .. } => panic!("{status} allowed"),
            }
        }
    }

    #[test]
    fn missing_or_empty_identity_is_none() {
        assert!(matches!(
            decide(response(200, None)),
            Decision::Allow { identity: None }
        ));
        assert!(matches!(
            decide(response(200, Some(""))),
            Decision::Allow { identity: None }
        ));
    }

    #[test]
    fn identity_is_appended_not_replaced() {
        let mut request = Request::builder()
            .header("x-auth-request", "spoofed")
            .body(())
            .unwrap();
        inject_identity(&mut request, Some(HeaderValue::from_static("alice")));

        let values: Vec<_> = request.headers().get_all(X_AUTH_REQUEST).iter().collect();
        assert_eq!(values, ["spoofed", "alice"]);
    }

    #[test]
    fn no_identity_leaves_request_alone() {
        let mut request = Request::builder().body(()).unwrap();
        inject_identity(&mut request, None);
        assert!(request.headers().is_empty());
    }
}

use anyhow::Result;
use base64::Engine;
use futures::future::BoxFuture;
use hyper::{Request, Response};

use crate::codec::{text_body, HttpResponse};
use crate::config::Credentials;

const REALM: &str = "Basic realm=\"dirdav\"";

fn unauthorized(reason: &'static str) -> Result<HttpResponse> {
    Ok(Response::builder()
        .status(401)
        .header("WWW-Authenticate", REALM)
        .body(text_body(reason))?)
}

fn bad_request(reason: &'static str) -> Result<HttpResponse> {
    Ok(Response::builder().status(400).body(text_body(reason))?)
}

/// Split a Basic Authorization value into its username/password pair
fn basic_credentials(auth_val: &str) -> Option<(String, String)> {
    let b64_creds_maybe_padded = match auth_val.split_once(' ') {
        Some((scheme, b64)) if scheme.eq_ignore_ascii_case("basic") => b64.trim(),
        _ => return None,
    };

    // clients disagree on padding, accept both forms
    let b64_creds_clean = b64_creds_maybe_padded.trim_end_matches('=');
    let creds = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(b64_creds_clean)
        .ok()?;
    let str_creds = String::from_utf8(creds).ok()?;
    let (username, password) = str_creds.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Guard the whole tree with Basic Auth when credentials are configured
pub(crate) async fn auth<'a, B>(
    expected: Option<&'a Credentials>,
    req: Request<B>,
    next: impl FnOnce(Request<B>) -> BoxFuture<'a, Result<HttpResponse>>,
) -> Result<HttpResponse> {
    let expected = match expected {
        Some(c) => c,
        None => return next(req).await,
    };

    let auth_val = match req.headers().get(hyper::header::AUTHORIZATION) {
        Some(hv) => match hv.to_str() {
            Ok(v) => v,
            Err(_) => return bad_request("Malformed Authorization field"),
        },
        None => {
            tracing::info!("Missing authorization field");
            return unauthorized("Missing Authorization field");
        }
    };

    let (username, password) = match basic_credentials(auth_val) {
        Some(pair) => pair,
        None => {
            tracing::info!("Unsupported authorization field");
            return bad_request("Unsupported Authorization field");
        }
    };

    if username != expected.user || password != expected.password {
        tracing::info!(user = %username, "Wrong credentials");
        return unauthorized("Wrong credentials");
    }

    next(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::FutureExt;
    use hyper::StatusCode;

    fn creds() -> Credentials {
        Credentials {
            user: "alice".into(),
            password: "hunter2".into(),
        }
    }

    async fn call(expected: Option<&Credentials>, header: Option<&str>) -> HttpResponse {
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header("Authorization", h);
        }
        let req = builder.body(()).unwrap();
        auth(expected, req, |_| {
            async { Ok::<_, anyhow::Error>(Response::builder().status(200).body(text_body("ok"))?) }
                .boxed()
        })
        .await
        .unwrap()
    }

    fn basic(raw: &str) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }

    #[tokio::test]
    async fn open_when_unconfigured() {
        assert_eq!(call(None, None).await.status(), StatusCode::OK);
        assert_eq!(call(None, Some("Bearer x")).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_wrong_credentials() {
        let c = creds();
        let resp = call(Some(&c), None).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()["WWW-Authenticate"], REALM);

        let resp = call(Some(&c), Some(&basic("alice:wrong"))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let resp = call(Some(&c), Some(&basic("bob:hunter2"))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_headers() {
        let c = creds();
        let no_colon = basic("no-colon");
        for h in ["Bearer abc", "Basic !!!", "Basic", no_colon.as_str()] {
            assert_eq!(
                call(Some(&c), Some(h)).await.status(),
                StatusCode::BAD_REQUEST,
                "{}",
                h
            );
        }
    }

    #[tokio::test]
    async fn good_credentials_with_or_without_padding() {
        let c = creds();
        let padded = basic("alice:hunter2");
        assert_eq!(call(Some(&c), Some(&padded)).await.status(), StatusCode::OK);
        let unpadded = padded.trim_end_matches('=').to_string();
        assert_eq!(call(Some(&c), Some(&unpadded)).await.status(), StatusCode::OK);
        assert_eq!(call(Some(&c), Some("Basic YWxpY2U6aHVudGVyMg==")).await.status(), StatusCode::OK);
    }
}

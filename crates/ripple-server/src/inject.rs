//! Live reload script injection.
//!
//! Inserts the client script into HTML responses right before the closing
//! `</body>` tag (or `</head>` when the document has no body tag) and
//! rewrites `Content-Length` to match the bytes actually sent.

use std::sync::LazyLock;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use regex::bytes::Regex;

use crate::error::ServerError;
use crate::live_reload::LIVE_RELOAD_PATH;

/// Client script.
///
/// Reloads the page when a `reload` marker arrives and reconnects one
/// second after the stream errors, aborts or ends.
pub const CLIENT_SCRIPT: &str = r#"<script>
  (function connect() {
    var xhr = new XMLHttpRequest();
    var seen = 0;

    xhr.open("GET", "/_live_reload", true);

    xhr.onprogress = function() {
      var text = xhr.responseText;
      var chunk = text.slice(seen);
      seen = text.length;
      if (chunk.indexOf("reload") !== -1) {
        window.location.reload();
      }
    };

    xhr.onload = function() {
      console.log("Reconnecting after server closed the stream");
      setTimeout(connect, 1000);
    };

    xhr.onerror = function() {
      console.log("Reconnecting after error");
      setTimeout(connect, 1000);
    };

    xhr.onabort = function() {
      console.log("Reconnecting after abort");
      setTimeout(connect, 1000);
    };

    xhr.send();
  })();
</script>
"#;

/// Anchor tags in order of preference.
static ANCHORS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)</body\s*>").expect("valid body anchor pattern"),
        Regex::new(r"(?i)</head\s*>").expect("valid head anchor pattern"),
    ]
});

/// Upper bound on buffered HTML bodies.
const MAX_HTML_BODY: usize = 64 * 1024 * 1024;

/// Whether a response is HTML that can be rewritten as plain bytes.
pub fn is_injectable(headers: &HeaderMap) -> bool {
    if headers.contains_key(CONTENT_ENCODING) {
        return false;
    }
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .trim_start()
                .get(..9)
                .is_some_and(|mime| mime.eq_ignore_ascii_case("text/html"))
        })
}

/// Insert the client script before the first anchor tag.
///
/// `</body>` wins over `</head>`; only the first match of the chosen anchor
/// is used. A tag split across two chunks is not found, and chunks without
/// an anchor are returned unchanged.
pub fn inject_script(mut chunks: Vec<Bytes>) -> Vec<Bytes> {
    for anchor in ANCHORS.iter() {
        let found = chunks
            .iter()
            .enumerate()
            .find_map(|(index, chunk)| anchor.find(chunk).map(|m| (index, m.start())));

        if let Some((index, start)) = found {
            let chunk = &chunks[index];
            let mut injected = Vec::with_capacity(chunk.len() + CLIENT_SCRIPT.len());
            injected.extend_from_slice(&chunk[..start]);
            injected.extend_from_slice(CLIENT_SCRIPT.as_bytes());
            injected.extend_from_slice(&chunk[start..]);
            chunks[index] = Bytes::from(injected);
            return chunks;
        }
    }
    chunks
}

/// Total byte length of the chunks as transmitted.
pub fn content_length(chunks: &[Bytes]) -> usize {
    chunks.iter().map(Bytes::len).sum()
}

/// Post-process a response: inject the script into HTML and recompute
/// `Content-Length` from the outgoing chunks.
pub fn inject_response(
    status: StatusCode,
    mut headers: HeaderMap,
    chunks: Vec<Bytes>,
) -> (StatusCode, HeaderMap, Vec<Bytes>) {
    let chunks = if is_injectable(&headers) {
        inject_script(chunks)
    } else {
        chunks
    };
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length(&chunks)));
    (status, headers, chunks)
}

/// Middleware running every successful HTML response through
/// [`inject_response`].
///
/// Non-200 responses and the live reload stream itself are passed through
/// untouched. `HEAD` requests are served as `GET` and stripped of their body,
/// so both report the same `Content-Length` for the same resource.
pub(crate) async fn inject_live_reload(
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    if request.uri().path() == LIVE_RELOAD_PATH {
        return Ok(next.run(request).await);
    }

    let head = request.method() == Method::HEAD;
    if head {
        *request.method_mut() = Method::GET;
    }
    let response = next.run(request).await;

    if response.status() != StatusCode::OK || !is_injectable(response.headers()) {
        return Ok(if head { without_body(response) } else { response });
    }

    let (mut parts, body) = response.into_parts();
    let body = axum::body::to_bytes(body, MAX_HTML_BODY).await?;

    let headers = std::mem::take(&mut parts.headers);
    let (status, headers, chunks) = inject_response(parts.status, headers, vec![body]);
    parts.status = status;
    parts.headers = headers;

    let body = if head {
        Body::empty()
    } else {
        Body::from(chunks.concat())
    };
    Ok(Response::from_parts(parts, body))
}

/// Drop a response body, keeping its headers as sent for `GET`.
fn without_body(response: Response) -> Response {
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Body::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn html_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1"));
        headers
    }

    fn joined(chunks: &[Bytes]) -> String {
        String::from_utf8(chunks.concat()).unwrap()
    }

    #[test]
    fn test_injects_before_body_close() {
        let chunks = vec![Bytes::from_static(
            b"<html><head></head><body><p>Hi</p></body></html>",
        )];

        let (status, headers, chunks) = inject_response(StatusCode::OK, html_headers(), chunks);

        let body = joined(&chunks);
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(&format!("{CLIENT_SCRIPT}</body>")));
        assert_eq!(body.matches("<script>").count(), 1);
        assert_eq!(headers[CONTENT_LENGTH], HeaderValue::from(body.len()));
    }

    #[test]
    fn test_falls_back_to_head_close() {
        let chunks = vec![Bytes::from_static(b"<html><head><title>t</title></head></html>")];

        let chunks = inject_script(chunks);

        assert!(joined(&chunks).contains(&format!("{CLIENT_SCRIPT}</head>")));
    }

    #[test]
    fn test_body_anchor_preferred_over_head() {
        let chunks = vec![
            Bytes::from_static(b"<html><head></head>"),
            Bytes::from_static(b"<body>x</body></html>"),
        ];

        let chunks = inject_script(chunks);

        assert_eq!(&chunks[0][..], b"<html><head></head>");
        assert!(joined(&chunks).ends_with(&format!("x{CLIENT_SCRIPT}</body></html>")));
    }

    #[test]
    fn test_anchor_match_is_case_insensitive() {
        let chunks = vec![Bytes::from_static(b"<BODY>x</BODY >")];

        let chunks = inject_script(chunks);

        assert_eq!(joined(&chunks), format!("<BODY>x{CLIENT_SCRIPT}</BODY >"));
    }

    #[test]
    fn test_length_counts_all_chunks() {
        let chunks = vec![
            Bytes::from_static(b"<html><body>"),
            Bytes::from_static(b"<p>caf\xc3\xa9</p>"),
            Bytes::from_static(b"</body></html>"),
        ];

        let (_, headers, chunks) = inject_response(StatusCode::OK, html_headers(), chunks);

        let expected = chunks.iter().map(Bytes::len).sum::<usize>();
        assert_eq!(headers[CONTENT_LENGTH], HeaderValue::from(expected));
        assert_eq!(content_length(&chunks), expected);
        assert_eq!(&chunks[1][..], b"<p>caf\xc3\xa9</p>");
    }

    #[test]
    fn test_no_anchor_leaves_body_unchanged() {
        let original = Bytes::from_static(b"<p>fragment</p>");

        let (_, headers, chunks) =
            inject_response(StatusCode::OK, html_headers(), vec![original.clone()]);

        assert_eq!(chunks, vec![original]);
        assert_eq!(headers[CONTENT_LENGTH], HeaderValue::from(15usize));
    }

    #[test]
    fn test_non_html_is_not_injected() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let original = Bytes::from_static(b"literally </body>");

        let (_, headers, chunks) = inject_response(StatusCode::OK, headers, vec![original.clone()]);

        assert_eq!(chunks, vec![original]);
        assert_eq!(headers[CONTENT_LENGTH], HeaderValue::from(17usize));
    }

    #[test]
    fn test_is_injectable() {
        assert!(is_injectable(&html_headers()));

        let mut upper = HeaderMap::new();
        upper.insert(CONTENT_TYPE, HeaderValue::from_static("TEXT/HTML"));
        assert!(is_injectable(&upper));

        let mut encoded = html_headers();
        encoded.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert!(!is_injectable(&encoded));

        let mut css = HeaderMap::new();
        css.insert(CONTENT_TYPE, HeaderValue::from_static("text/css"));
        assert!(!is_injectable(&css));

        assert!(!is_injectable(&HeaderMap::new()));
    }

    #[test]
    fn test_script_targets_live_reload_path() {
        assert!(CLIENT_SCRIPT.contains(LIVE_RELOAD_PATH));
        assert!(CLIENT_SCRIPT.contains("setTimeout(connect, 1000)"));
    }
}

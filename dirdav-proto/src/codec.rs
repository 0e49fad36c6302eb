use std::io::{Error, ErrorKind};

use anyhow::Result;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Body, Bytes, Frame};
use hyper::header::HeaderValue;
use hyper::{HeaderMap, Response, StatusCode};
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while1};
use nom::character::complete::{digit1, space0};
use nom::combinator::{map, map_res, opt};
use nom::multi::separated_list1;
use nom::sequence::{delimited, preceded};
use nom::IResult;
use tokio_util::io::{CopyToBytes, SinkWriter};
use tokio_util::sync::PollSender;

use dirdav_dav::realization::Core;
use dirdav_dav::types as dav;
use dirdav_dav::xml as dxml;
use dirdav_store::{DavError, DavPath};

pub type HttpBody = BoxBody<Bytes, std::io::Error>;
pub type HttpResponse = Response<HttpBody>;
pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// `None` when the header is absent, an error when it is not understood
pub(crate) fn depth(headers: &HeaderMap) -> Result<Option<dav::Depth>, DavError> {
    match headers.get("Depth").map(HeaderValue::to_str) {
        None => Ok(None),
        Some(Ok("0")) => Ok(Some(dav::Depth::Zero)),
        Some(Ok("1")) => Ok(Some(dav::Depth::One)),
        Some(Ok(v)) if v.eq_ignore_ascii_case("infinity") => Ok(Some(dav::Depth::Infinity)),
        _ => Err(DavError::BadRequest("invalid Depth header".into())),
    }
}

fn time_type(input: &str) -> IResult<&str, Option<dav::Timeout>> {
    alt((
        map(tag_no_case("Infinite"), |_| Some(dav::Timeout::Infinite)),
        map(
            preceded(tag_no_case("Second-"), digit1),
            |secs: &str| match secs.parse::<u32>() {
                Ok(v) => Some(dav::Timeout::Seconds(v)),
                // larger than what RFC 4918 allows
                Err(_) => Some(dav::Timeout::Seconds(u32::MAX)),
            },
        ),
        // extension we don't know about
        map(take_while1(|c| c != ','), |_| None),
    ))(input)
}

/// The first understood entry of a Timeout header
pub(crate) fn timeout(headers: &HeaderMap) -> Option<dav::Timeout> {
    let raw = headers.get("Timeout")?.to_str().ok()?;
    let (_, entries) =
        separated_list1(tag(","), delimited(space0, time_type, space0))(raw).ok()?;
    entries.into_iter().flatten().next()
}

/// Lock-Token header, a single Coded-URL
pub(crate) fn lock_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("Lock-Token")?.to_str().ok()?.trim();
    let coded_url: IResult<&str, &str> = delimited(tag("<"), take_while1(|c| c != '>'), tag(">"))(raw);
    match coded_url {
        Ok(("", token)) => Some(token.to_string()),
        _ => None,
    }
}

/// Overwrite header, `T` when absent
pub(crate) fn overwrite(headers: &HeaderMap) -> Result<bool, DavError> {
    match headers.get("Overwrite").map(HeaderValue::to_str) {
        None => Ok(true),
        Some(Ok(v)) if v.eq_ignore_ascii_case("T") => Ok(true),
        Some(Ok(v)) if v.eq_ignore_ascii_case("F") => Ok(false),
        _ => Err(DavError::BadRequest("invalid Overwrite header".into())),
    }
}

/// A single `bytes=` range, resolved against the length of the content.
/// Several ranges are not supported, the whole content is sent instead.
pub(crate) fn range(headers: &HeaderMap, len: u64) -> Result<Option<(u64, u64)>, DavError> {
    let raw = match headers.get(hyper::header::RANGE).map(HeaderValue::to_str) {
        Some(Ok(v)) => v.trim(),
        _ => return Ok(None),
    };

    fn number(input: &str) -> IResult<&str, u64> {
        map_res(digit1, str::parse::<u64>)(input)
    }
    fn bounds(input: &str) -> IResult<&str, (Option<u64>, Option<u64>)> {
        let (input, _) = tag("bytes=")(input)?;
        let (input, first) = opt(number)(input)?;
        let (input, _) = tag("-")(input)?;
        let (input, last) = opt(number)(input)?;
        Ok((input, (first, last)))
    }

    let (first, last) = match bounds(raw) {
        Ok(("", v)) => v,
        _ => return Ok(None),
    };
    let resolved = match (first, last) {
        (Some(start), _) if start >= len => None,
        (Some(start), None) => Some((start, len - 1)),
        (Some(start), Some(end)) if end >= start => Some((start, end.min(len - 1))),
        (None, Some(suffix)) if suffix > 0 && len > 0 => Some((len - suffix.min(len), len - 1)),
        _ => None,
    };
    resolved.map(Some).ok_or(DavError::RangeNotSatisfiable(len))
}

pub(crate) fn text_body(txt: &'static str) -> HttpBody {
    BoxBody::new(Full::new(Bytes::from(txt)).map_err(|e| match e {}))
}

pub(crate) fn empty_body() -> HttpBody {
    text_body("")
}

pub(crate) fn serialize<T: dxml::QWrite + Send + 'static>(
    status_ok: StatusCode,
    elem: T,
) -> Result<HttpResponse> {
    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(1);

    // Build the writer
    tokio::task::spawn(async move {
        let sink = PollSender::new(tx).sink_map_err(|_| Error::from(ErrorKind::BrokenPipe));
        let mut writer = SinkWriter::new(CopyToBytes::new(sink));
        let q = quick_xml::writer::Writer::new_with_indent(&mut writer, b' ', 4);
        let ns_to_apply = vec![("xmlns:D".into(), "DAV:".into())];
        let mut qwriter = dxml::Writer { q, ns_to_apply };
        let decl = quick_xml::events::BytesDecl::new("1.0", Some("utf-8"), None);
        match qwriter
            .q
            .write_event_async(quick_xml::events::Event::Decl(decl))
            .await
        {
            Ok(_) => (),
            Err(e) => tracing::error!(err=?e, "unable to write XML declaration <?xml ... >"),
        }
        match elem.qwrite(&mut qwriter).await {
            Ok(_) => tracing::trace!("fully serialized object"),
            Err(e) => tracing::error!(err=?e, "failed to serialize object"),
        }
    });

    // Build the reader
    let recv = tokio_stream::wrappers::ReceiverStream::new(rx);
    let stream = StreamBody::new(recv.map(|v| Ok(Frame::data(v))));
    let boxed_body = BoxBody::new(stream);

    let response = Response::builder()
        .status(status_ok)
        .header("content-type", "application/xml; charset=\"utf-8\"")
        .body(boxed_body)?;

    Ok(response)
}

pub(crate) fn body_error(err: impl Into<BoxError>) -> DavError {
    DavError::BadRequest(format!("unable to read the request body: {}", err.into()))
}

/// Buffer a request body that is expected to be small, like an XML document
pub(crate) async fn read_body<B>(body: B, max: u64) -> Result<Bytes, DavError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let limit = usize::try_from(max).unwrap_or(usize::MAX);
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(DavError::PayloadTooLarge(max))
        }
        Err(e) => Err(body_error(e)),
    }
}

/// Deserialize a request body to an XML request, `None` when the body is empty
pub(crate) async fn deserialize<T: dxml::Node<T>>(body: &[u8]) -> Result<Option<T>, DavError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let parse = async {
        let mut rdr = dxml::Reader::new(quick_xml::reader::NsReader::from_reader(body)).await?;
        rdr.find::<T>().await
    };
    match parse.await {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            tracing::debug!(err=?e, "malformed XML body");
            Err(DavError::BadRequest(format!("malformed XML body: {}", e)))
        }
    }
}

fn violation(status: StatusCode, violation: dav::Violation<Core>) -> Result<HttpResponse> {
    serialize(status, dav::Error::<Core>(vec![violation]))
}

pub(crate) fn lock_conflict(root: &DavPath) -> dav::Violation<Core> {
    dav::Violation::LockTokenSubmitted(vec![dav::Href(root.href(false))])
}

/// Status code of an error, as reported inside a multistatus
pub(crate) fn status_of(err: &DavError) -> StatusCode {
    match err {
        DavError::NotFound(_) | DavError::ConditionFailedOnMissingResource => {
            StatusCode::NOT_FOUND
        }
        DavError::Conflict(_) | DavError::NoSuchLock => StatusCode::CONFLICT,
        DavError::LockConflict(_) => StatusCode::LOCKED,
        DavError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        DavError::NotModified => StatusCode::NOT_MODIFIED,
        DavError::Forbidden(_) | DavError::ProtectedProperty(_) => StatusCode::FORBIDDEN,
        DavError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        DavError::InternalStorageError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        DavError::InsufficientStorage(_) => StatusCode::INSUFFICIENT_STORAGE,
        DavError::BadRequest(_) => StatusCode::BAD_REQUEST,
        DavError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        DavError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        DavError::BadGateway => StatusCode::BAD_GATEWAY,
        DavError::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
    }
}

/// The HTTP response reporting an error to the client
pub(crate) fn error_response(err: DavError) -> Result<HttpResponse> {
    let status = status_of(&err);
    match err {
        DavError::LockConflict(root) => violation(status, lock_conflict(&root)),
        DavError::NoSuchLock => violation(status, dav::Violation::LockTokenMatchesRequestUri),
        DavError::ProtectedProperty(_) => {
            violation(status, dav::Violation::CannotModifyProtectedProperty)
        }
        DavError::NotModified => Ok(Response::builder().status(status).body(empty_body())?),
        DavError::MethodNotAllowed(_) => Ok(Response::builder()
            .status(status)
            .header("Allow", crate::controller::ALLOW)
            .body(text_body("Method not allowed on this resource"))?),
        DavError::RangeNotSatisfiable(len) => Ok(Response::builder()
            .status(status)
            .header("Content-Range", format!("bytes */{}", len))
            .body(empty_body())?),
        DavError::InternalStorageError { .. } | DavError::InsufficientStorage(_) => {
            tracing::error!(err=?err, "storage failure");
            Ok(Response::builder()
                .status(status)
                .body(text_body("Storage error"))?)
        }
        other => {
            let reason = status.canonical_reason().unwrap_or("Error");
            tracing::debug!(err=%other, "request refused");
            Ok(Response::builder()
                .status(status)
                .body(BoxBody::new(
                    Full::new(Bytes::from(format!("{}: {}", reason, other))).map_err(|e| match e {}),
                ))?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn depth_header() {
        assert!(depth(&headers(&[])).unwrap().is_none());
        assert_eq!(
            depth(&headers(&[("Depth", "infinity")])).unwrap(),
            Some(dav::Depth::Infinity)
        );
        assert_eq!(
            depth(&headers(&[("Depth", "1")])).unwrap(),
            Some(dav::Depth::One)
        );
        assert!(depth(&headers(&[("Depth", "2")])).is_err());
    }

    #[test]
    fn timeout_header() {
        assert_eq!(
            timeout(&headers(&[("Timeout", "Second-600")])),
            Some(dav::Timeout::Seconds(600))
        );
        assert_eq!(
            timeout(&headers(&[("Timeout", "Extension-Foo, Infinite, Second-4100000000")])),
            Some(dav::Timeout::Infinite)
        );
        assert_eq!(
            timeout(&headers(&[("Timeout", "Second-99999999999")])),
            Some(dav::Timeout::Seconds(u32::MAX))
        );
        assert_eq!(timeout(&headers(&[("Timeout", "Whatever")])), None);
        assert_eq!(timeout(&headers(&[])), None);
    }

    #[test]
    fn lock_token_header() {
        assert_eq!(
            lock_token(&headers(&[("Lock-Token", "<opaquelocktoken:abc>")])).as_deref(),
            Some("opaquelocktoken:abc")
        );
        assert_eq!(lock_token(&headers(&[("Lock-Token", "opaquelocktoken:abc")])), None);
    }

    #[test]
    fn range_header() {
        let h = |v: &'static str| headers(&[("Range", v)]);
        assert_eq!(range(&h("bytes=0-3"), 10).unwrap(), Some((0, 3)));
        assert_eq!(range(&h("bytes=4-"), 10).unwrap(), Some((4, 9)));
        assert_eq!(range(&h("bytes=-3"), 10).unwrap(), Some((7, 9)));
        assert_eq!(range(&h("bytes=5-100"), 10).unwrap(), Some((5, 9)));
        assert_eq!(range(&h("bytes=0-1,4-5"), 10).unwrap(), None);
        assert!(matches!(
            range(&h("bytes=10-"), 10),
            Err(DavError::RangeNotSatisfiable(10))
        ));
        assert!(range(&h("bytes=0-"), 0).is_err());
        assert_eq!(range(&headers(&[]), 10).unwrap(), None);
    }

    #[tokio::test]
    async fn empty_and_malformed_bodies() {
        let none = deserialize::<dav::PropFind<dirdav_dav::realization::Dead>>(b" \n").await;
        assert!(matches!(none, Ok(None)));

        let bad = deserialize::<dav::PropFind<dirdav_dav::realization::Dead>>(b"<D:propfind").await;
        assert!(matches!(bad, Err(DavError::BadRequest(_))));

        let ok = deserialize::<dav::PropFind<dirdav_dav::realization::Dead>>(
            br#"<?xml version="1.0"?><propfind xmlns="DAV:"><propname/></propfind>"#,
        )
        .await;
        assert!(matches!(ok, Ok(Some(dav::PropFind::PropName))));
    }

    #[tokio::test]
    async fn body_size_is_capped() {
        let small = Full::new(Bytes::from_static(b"0123456789"));
        assert_eq!(read_body(small, 10).await.unwrap().len(), 10);

        let large = Full::new(Bytes::from_static(b"0123456789"));
        assert!(matches!(
            read_body(large, 9).await,
            Err(DavError::PayloadTooLarge(9))
        ));
    }
}

use hyper::header::HeaderValue;
use hyper::HeaderMap;
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while1};
use nom::character::complete::multispace0;
use nom::combinator::{all_consuming, map, opt};
use nom::multi::many1;
use nom::sequence::{delimited, pair};
use nom::IResult;

use dirdav_store::fs::{LocalFs, Metadata};
use dirdav_store::lock::LockManager;
use dirdav_store::{DavError, DavPath};

/// State token that no lock ever carries, so that `Not <DAV:no-lock>`
/// is always true
pub const NO_LOCK: &str = "DAV:no-lock";

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    StateToken(String),
    ETag(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub not: bool,
    pub cond: Condition,
}

/// One parenthesized list of the If header. Its terms are ANDed,
/// the lists of a header are ORed.
#[derive(Debug, Clone, PartialEq)]
pub struct IfList {
    /// Resource tag, the request target when absent
    pub resource: Option<String>,
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfHeader(pub Vec<IfList>);

// --- If header grammar, RFC 4918 section 10.4

fn lws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(multispace0, inner, multispace0)
}

fn coded_url(input: &str) -> IResult<&str, String> {
    map(
        delimited(tag("<"), take_while1(|c| c != '>'), tag(">")),
        String::from,
    )(input)
}

fn entity_tag(input: &str) -> IResult<&str, String> {
    map(
        delimited(tag("["), take_while1(|c| c != ']'), tag("]")),
        String::from,
    )(input)
}

fn term(input: &str) -> IResult<&str, Term> {
    map(
        pair(
            opt(lws(tag_no_case("Not"))),
            lws(alt((
                map(coded_url, Condition::StateToken),
                map(entity_tag, Condition::ETag),
            ))),
        ),
        |(not, cond)| Term {
            not: not.is_some(),
            cond,
        },
    )(input)
}

fn list(input: &str) -> IResult<&str, Vec<Term>> {
    delimited(lws(tag("(")), many1(term), lws(tag(")")))(input)
}

fn tagged_list(input: &str) -> IResult<&str, Vec<IfList>> {
    map(pair(lws(coded_url), many1(list)), |(resource, lists)| {
        lists
            .into_iter()
            .map(|terms| IfList {
                resource: Some(resource.clone()),
                terms,
            })
            .collect()
    })(input)
}

fn no_tag_list(input: &str) -> IResult<&str, IfList> {
    map(list, |terms| IfList {
        resource: None,
        terms,
    })(input)
}

fn if_header(input: &str) -> IResult<&str, IfHeader> {
    map(
        all_consuming(alt((
            map(many1(tagged_list), |lists| lists.concat()),
            many1(no_tag_list),
        ))),
        IfHeader,
    )(input)
}

impl IfHeader {
    pub fn parse(raw: &str) -> Option<Self> {
        if_header(raw).ok().map(|(_, h)| h)
    }
}

/// Path named by a resource tag, an absolute URI or an absolute path
fn tag_path(resource: &str) -> Option<DavPath> {
    let uri = resource.parse::<hyper::Uri>().ok()?;
    DavPath::parse(uri.path()).ok()
}

/// Weak comparison, a `W/` prefix is ignored on both sides
fn etag_matches(current: &str, candidate: &str) -> bool {
    let strip = |t: &str| t.trim().trim_start_matches("W/").to_string();
    strip(current) == strip(candidate)
}

/// Parse an If-Match or If-None-Match header: `*` or a list of entity tags
fn etag_list(headers: &HeaderMap, name: &str) -> Result<Option<Vec<String>>, DavError> {
    let raw = match headers.get(name).map(HeaderValue::to_str) {
        None => return Ok(None),
        Some(Ok(v)) => v,
        Some(Err(_)) => return Err(DavError::BadRequest(format!("invalid {} header", name))),
    };
    Ok(Some(
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
    ))
}

/// Conditions attached to a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preconditions {
    pub if_header: Option<IfHeader>,
    pub if_match: Option<Vec<String>>,
    pub if_none_match: Option<Vec<String>>,
}

impl Preconditions {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, DavError> {
        let if_header = match headers.get("If").map(HeaderValue::to_str) {
            None => None,
            Some(Ok(raw)) => Some(
                IfHeader::parse(raw)
                    .ok_or_else(|| DavError::BadRequest("malformed If header".into()))?,
            ),
            Some(Err(_)) => return Err(DavError::BadRequest("malformed If header".into())),
        };

        Ok(Self {
            if_header,
            if_match: etag_list(headers, "If-Match")?,
            if_none_match: etag_list(headers, "If-None-Match")?,
        })
    }

    /// Every lock token found in the If header, they prove the client
    /// knows about the locks it wants to go through
    pub fn submitted_tokens(&self) -> Vec<String> {
        self.if_header
            .iter()
            .flat_map(|h| h.0.iter())
            .flat_map(|l| l.terms.iter())
            .filter(|t| !t.not)
            .filter_map(|t| match &t.cond {
                Condition::StateToken(tok) if tok != NO_LOCK => Some(tok.clone()),
                _ => None,
            })
            .collect()
    }

    /// Check every condition against the target, `current` being its state.
    /// `safe` requests (GET, HEAD) get a 304 instead of a 412 when an
    /// If-None-Match matches.
    pub async fn evaluate(
        &self,
        target: &DavPath,
        current: Option<&Metadata>,
        safe: bool,
        fs: &LocalFs,
        locks: &LockManager,
    ) -> Result<(), DavError> {
        if let Some(tags) = &self.if_match {
            let holds = match current {
                None => false,
                Some(_) if tags.iter().any(|t| t == "*") => true,
                Some(meta) => tags.iter().any(|t| etag_matches(&meta.etag, t)),
            };
            if !holds {
                return Err(DavError::PreconditionFailed);
            }
        }

        if let Some(tags) = &self.if_none_match {
            let matches = match current {
                None => false,
                Some(_) if tags.iter().any(|t| t == "*") => true,
                Some(meta) => tags.iter().any(|t| etag_matches(&meta.etag, t)),
            };
            if matches {
                return Err(match safe {
                    true => DavError::NotModified,
                    false => DavError::PreconditionFailed,
                });
            }
        }

        if let Some(header) = &self.if_header {
            for list in header.0.iter() {
                if list_holds(list, target, current, fs, locks).await? {
                    return Ok(());
                }
            }
            tracing::debug!(path=%target, "If header evaluated to false");
            return Err(match current {
                None => DavError::ConditionFailedOnMissingResource,
                Some(_) => DavError::PreconditionFailed,
            });
        }

        Ok(())
    }
}

async fn list_holds(
    list: &IfList,
    target: &DavPath,
    current: Option<&Metadata>,
    fs: &LocalFs,
    locks: &LockManager,
) -> Result<bool, DavError> {
    let (path, state) = match &list.resource {
        None => (target.clone(), current.cloned()),
        Some(resource) => match tag_path(resource) {
            Some(path) => {
                let state = match fs.try_stat(&path).await {
                    Ok(state) => state,
                    Err(DavError::Forbidden(_)) => None,
                    Err(e) => return Err(e),
                };
                (path, state)
            }
            None => return Ok(false),
        },
    };

    for term in list.terms.iter() {
        let holds = match &term.cond {
            Condition::StateToken(token) if token == NO_LOCK => false,
            Condition::StateToken(token) => locks
                .get(token)
                .map(|lock| lock.covers(&path))
                .unwrap_or(false),
            Condition::ETag(etag) => state
                .as_ref()
                .map(|meta| etag_matches(&meta.etag, etag))
                .unwrap_or(false),
        };
        if holds == term.not {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dirdav_dav::types::LockScope;
    use dirdav_store::clock::SystemClock;
    use dirdav_store::lock::LockDepth;

    fn p(raw: &str) -> DavPath {
        DavPath::parse(raw).unwrap()
    }

    fn token(t: &str) -> Term {
        Term {
            not: false,
            cond: Condition::StateToken(t.into()),
        }
    }

    #[test]
    fn untagged_lists() {
        let h = IfHeader::parse(
            "(<opaquelocktoken:a> [\"etag\"]) (Not <DAV:no-lock>)",
        )
        .unwrap();
        assert_eq!(
            h,
            IfHeader(vec![
                IfList {
                    resource: None,
                    terms: vec![
                        token("opaquelocktoken:a"),
                        Term {
                            not: false,
                            cond: Condition::ETag("\"etag\"".into())
                        }
                    ],
                },
                IfList {
                    resource: None,
                    terms: vec![Term {
                        not: true,
                        cond: Condition::StateToken(NO_LOCK.into())
                    }],
                },
            ])
        );
    }

    #[test]
    fn tagged_lists() {
        let h = IfHeader::parse(
            "<http://example.com/a> (<opaquelocktoken:a>) (<opaquelocktoken:b>)\r\n <http://example.com/b> (<opaquelocktoken:c>)",
        )
        .unwrap();
        assert_eq!(h.0.len(), 3);
        assert_eq!(h.0[1].resource.as_deref(), Some("http://example.com/a"));
        assert_eq!(h.0[2].resource.as_deref(), Some("http://example.com/b"));
        assert_eq!(h.0[2].terms, vec![token("opaquelocktoken:c")]);
    }

    #[test]
    fn malformed() {
        assert!(IfHeader::parse("").is_none());
        assert!(IfHeader::parse("(<a>").is_none());
        assert!(IfHeader::parse("()").is_none());
        // tagged and untagged lists don't mix
        assert!(IfHeader::parse("(<a>) <http://x/> (<b>)").is_none());
    }

    #[test]
    fn submitted_tokens_skip_negations() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "If",
            HeaderValue::from_static("(<opaquelocktoken:a>) (Not <opaquelocktoken:b>) (<DAV:no-lock>)"),
        );
        let cond = Preconditions::from_headers(&headers).unwrap();
        assert_eq!(cond.submitted_tokens(), vec!["opaquelocktoken:a".to_string()]);

        headers.insert("If", HeaderValue::from_static("garbage"));
        assert!(matches!(
            Preconditions::from_headers(&headers),
            Err(DavError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn evaluation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc"), "content").unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();
        let locks = LockManager::new(Arc::new(SystemClock::default()));
        let lock = locks
            .acquire(&p("/doc"), LockScope::Exclusive, LockDepth::Zero, None, None)
            .unwrap();
        let meta = fs.stat(&p("/doc")).await.unwrap();

        let check = |raw: String| {
            let mut headers = HeaderMap::new();
            headers.insert("If", HeaderValue::from_str(&raw).unwrap());
            Preconditions::from_headers(&headers).unwrap()
        };

        let ok = check(format!("(<{}>)", lock.token));
        assert!(ok
            .evaluate(&p("/doc"), Some(&meta), false, &fs, &locks)
            .await
            .is_ok());

        let both = check(format!("(<{}> [{}])", lock.token, meta.etag));
        assert!(both
            .evaluate(&p("/doc"), Some(&meta), false, &fs, &locks)
            .await
            .is_ok());

        let stale = check(format!("(<{}> [\"stale\"])", lock.token));
        assert!(matches!(
            stale.evaluate(&p("/doc"), Some(&meta), false, &fs, &locks).await,
            Err(DavError::PreconditionFailed)
        ));

        let never = check(format!("(<{}>)", NO_LOCK));
        assert!(matches!(
            never.evaluate(&p("/missing"), None, false, &fs, &locks).await,
            Err(DavError::ConditionFailedOnMissingResource)
        ));

        let always = check(format!("(Not <{}>)", NO_LOCK));
        assert!(always
            .evaluate(&p("/missing"), None, false, &fs, &locks)
            .await
            .is_ok());

        let tagged = check(format!("<http://localhost/doc> (<{}>)", lock.token));
        assert!(tagged
            .evaluate(&p("/other"), None, false, &fs, &locks)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn etag_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc"), "content").unwrap();
        let fs = LocalFs::new(dir.path()).unwrap();
        let locks = LockManager::new(Arc::new(SystemClock::default()));
        let meta = fs.stat(&p("/doc")).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("If-None-Match", HeaderValue::from_str(&meta.etag).unwrap());
        let cond = Preconditions::from_headers(&headers).unwrap();
        assert!(matches!(
            cond.evaluate(&p("/doc"), Some(&meta), true, &fs, &locks).await,
            Err(DavError::NotModified)
        ));
        assert!(matches!(
            cond.evaluate(&p("/doc"), Some(&meta), false, &fs, &locks).await,
            Err(DavError::PreconditionFailed)
        ));

        let mut headers = HeaderMap::new();
        headers.insert("If-Match", HeaderValue::from_static("*"));
        let cond = Preconditions::from_headers(&headers).unwrap();
        assert!(cond
            .evaluate(&p("/doc"), Some(&meta), false, &fs, &locks)
            .await
            .is_ok());
        assert!(matches!(
            cond.evaluate(&p("/new"), None, false, &fs, &locks).await,
            Err(DavError::PreconditionFailed)
        ));
    }
}

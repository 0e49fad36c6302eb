use std::collections::{HashSet, VecDeque};
use std::io::SeekFrom;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyStream, StreamBody};
use hyper::body::{Body, Bytes, Frame};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Request, Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::MutexGuard;
use tokio_util::io::ReaderStream;

use dirdav_dav::realization::{Core, Dead};
use dirdav_dav::types as dav;
use dirdav_store::clock::{Clock, SystemClock};
use dirdav_store::fs::{LocalFs, Metadata};
use dirdav_store::lock::{Lock, LockDepth, LockManager};
use dirdav_store::property::{PatchOp, PatchOutcome, PropertyStore};
use dirdav_store::{DavError, DavPath};

use crate::codec::{self, BoxError, HttpResponse};
use crate::condition::Preconditions;
use crate::config::DavConfig;
use crate::node::{self, DavNode};

pub(crate) const ALLOW: &str =
    "OPTIONS, GET, HEAD, PUT, DELETE, MKCOL, COPY, MOVE, PROPFIND, PROPPATCH, LOCK, UNLOCK";

/// Resources that could not be processed, with the reason
type Failures = Vec<(String, DavError)>;

/// What every request of a server shares
pub struct DavState {
    pub fs: LocalFs,
    pub props: PropertyStore,
    pub locks: LockManager,
    /// Lock lifetime when the client sends no Timeout header
    pub lock_timeout_secs: u64,
    pub max_body_size: u64,
    /// Held by mutating requests from their checks to their effects
    mutation: tokio::sync::Mutex<()>,
}

impl DavState {
    pub fn new(
        fs: LocalFs,
        clock: Arc<dyn Clock>,
        lock_timeout_secs: u64,
        max_body_size: u64,
    ) -> Self {
        Self {
            fs,
            props: PropertyStore::default(),
            locks: LockManager::new(clock),
            lock_timeout_secs,
            max_body_size,
            mutation: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &DavConfig) -> Result<Self> {
        let fs = LocalFs::new(&config.root)
            .with_context(|| format!("unable to serve {}", config.root.display()))?;
        Ok(Self::new(
            fs,
            Arc::new(SystemClock::default()),
            config.lock_timeout_secs,
            config.max_body_size,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Method {
    Options,
    Get,
    Head,
    Put,
    Delete,
    Mkcol,
    Copy,
    Move,
    PropFind,
    PropPatch,
    Lock,
    Unlock,
}

impl Method {
    fn parse(method: &hyper::Method) -> Option<Self> {
        Some(match method.as_str() {
            "OPTIONS" => Self::Options,
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "MKCOL" => Self::Mkcol,
            "COPY" => Self::Copy,
            "MOVE" => Self::Move,
            "PROPFIND" => Self::PropFind,
            "PROPPATCH" => Self::PropPatch,
            "LOCK" => Self::Lock,
            "UNLOCK" => Self::Unlock,
            _ => return None,
        })
    }
}

pub(crate) struct Controller {
    state: Arc<DavState>,
    parts: http::request::Parts,
    path: DavPath,
    cond: Preconditions,
}

impl Controller {
    pub(crate) async fn route<B>(state: Arc<DavState>, req: Request<B>) -> Result<HttpResponse>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let path = match DavPath::parse(parts.uri.path()) {
            Ok(p) => p,
            Err(e) => return codec::error_response(e),
        };
        let cond = match Preconditions::from_headers(&parts.headers) {
            Ok(c) => c,
            Err(e) => return codec::error_response(e),
        };

        let method = match Method::parse(&parts.method) {
            Some(m) => m,
            None => {
                tracing::info!(method=%parts.method, "unsupported method");
                return Ok(Response::builder()
                    .status(501)
                    .header("Allow", ALLOW)
                    .body(codec::text_body("HTTP Method not implemented"))?);
            }
        };
        let ctrl = Self {
            state,
            parts,
            path,
            cond,
        };

        let res = match method {
            Method::Options => ctrl.options(),
            Method::Get => ctrl.get(true).await,
            Method::Head => ctrl.get(false).await,
            Method::Put => ctrl.put(body).await,
            Method::Delete => ctrl.delete().await,
            Method::Mkcol => ctrl.mkcol(body).await,
            Method::Copy => ctrl.copy_or_move(false).await,
            Method::Move => ctrl.copy_or_move(true).await,
            Method::PropFind => ctrl.propfind(body).await,
            Method::PropPatch => ctrl.proppatch(body).await,
            Method::Lock => ctrl.lock(body).await,
            Method::Unlock => ctrl.unlock().await,
        };

        match res {
            Ok(v) => Ok(v),
            Err(e) => match e.downcast::<DavError>() {
                Ok(dav_err) => codec::error_response(dav_err),
                Err(other) => Err(other),
            },
        }
    }

    fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    async fn guard(&self) -> MutexGuard<'_, ()> {
        self.state.mutation.lock().await
    }

    /// Adding or removing a member changes its parent collection
    fn confirm_membership(&self, path: &DavPath, tokens: &[String]) -> Result<(), DavError> {
        match path.parent() {
            Some(parent) => self.state.locks.confirm(&parent, tokens),
            None => Ok(()),
        }
    }

    // --- Per-method functions ---

    fn options(self) -> Result<HttpResponse> {
        Ok(Response::builder()
            .status(200)
            .header("DAV", "1, 2")
            .header("MS-Author-Via", "DAV")
            .header("Allow", ALLOW)
            .body(codec::empty_body())?)
    }

    async fn get(self, with_body: bool) -> Result<HttpResponse> {
        let state = &self.state;
        let meta = state.fs.stat(&self.path).await?;
        self.cond
            .evaluate(&self.path, Some(&meta), true, &state.fs, &state.locks)
            .await?;
        if meta.is_collection {
            return Err(DavError::MethodNotAllowed(self.path.clone()).into());
        }

        let range = codec::range(self.headers(), meta.len)?;
        let (status, start, len) = match range {
            Some((first, last)) => (StatusCode::PARTIAL_CONTENT, first, last - first + 1),
            None => (StatusCode::OK, 0, meta.len),
        };

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, node::content_type(meta.path.name()))
            .header(header::CONTENT_LENGTH, len)
            .header(header::ETAG, &meta.etag)
            .header(
                header::LAST_MODIFIED,
                meta.modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            )
            .header(header::ACCEPT_RANGES, "bytes");
        if let Some((first, last)) = range {
            builder = builder.header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", first, last, meta.len),
            );
        }
        if !with_body {
            return Ok(builder.body(codec::empty_body())?);
        }

        let mut file = state.fs.open(&self.path).await?;
        if start > 0 {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| DavError::from_io(&self.path, e))?;
        }
        let stream = ReaderStream::new(file.take(len)).map(|chunk| chunk.map(Frame::data));
        Ok(builder.body(BoxBody::new(StreamBody::new(stream)))?)
    }

    async fn check_put(&self, existing: Option<&Metadata>, tokens: &[String]) -> Result<(), DavError> {
        if matches!(existing, Some(meta) if meta.is_collection) {
            return Err(DavError::MethodNotAllowed(self.path.clone()));
        }
        self.cond
            .evaluate(&self.path, existing, false, &self.state.fs, &self.state.locks)
            .await?;
        self.state.locks.confirm(&self.path, tokens)?;
        if existing.is_none() {
            self.confirm_membership(&self.path, tokens)?;
        }
        Ok(())
    }

    async fn put<B>(self, body: B) -> Result<HttpResponse>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let state = &self.state;
        let declared = self
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if matches!(declared, Some(len) if len > state.max_body_size) {
            return Err(DavError::PayloadTooLarge(state.max_body_size).into());
        }
        let tokens = self.cond.submitted_tokens();

        // Refuse early, before receiving the content
        let existing = state.fs.try_stat(&self.path).await?;
        self.check_put(existing.as_ref(), &tokens).await?;

        let mut upload = state.fs.create(&self.path).await?;
        let mut frames = std::pin::pin!(BodyStream::new(body));
        while let Some(frame) = frames.next().await {
            let frame = frame.map_err(codec::body_error)?;
            if let Ok(data) = frame.into_data() {
                if upload.written() + data.len() as u64 > state.max_body_size {
                    tracing::info!(path=%self.path, "upload exceeds the size limit");
                    return Err(DavError::PayloadTooLarge(state.max_body_size).into());
                }
                upload.write_all(&data).await?;
            }
        }

        // The resource may have changed while we were receiving the content
        let _guard = self.guard().await;
        let existing = state.fs.try_stat(&self.path).await?;
        self.check_put(existing.as_ref(), &tokens).await?;
        upload.commit().await?;

        let meta = state.fs.stat(&self.path).await?;
        tracing::debug!(path=%self.path, size=meta.len, "content stored");
        let status = match existing {
            Some(_) => StatusCode::NO_CONTENT,
            None => StatusCode::CREATED,
        };
        Ok(Response::builder()
            .status(status)
            .header(header::ETAG, &meta.etag)
            .body(codec::empty_body())?)
    }

    async fn mkcol<B>(self, body: B) -> Result<HttpResponse>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let state = &self.state;
        let content = codec::read_body(body, state.max_body_size).await?;
        if !content.is_empty() {
            return Err(DavError::UnsupportedMediaType.into());
        }
        let tokens = self.cond.submitted_tokens();

        let _guard = self.guard().await;
        if state.fs.try_stat(&self.path).await?.is_some() {
            return Err(DavError::Conflict(self.path.clone()).into());
        }
        self.cond
            .evaluate(&self.path, None, false, &state.fs, &state.locks)
            .await?;
        state.locks.confirm(&self.path, &tokens)?;
        self.confirm_membership(&self.path, &tokens)?;

        state.fs.mkdir(&self.path).await?;
        tracing::debug!(path=%self.path, "collection created");
        Ok(Response::builder()
            .status(StatusCode::CREATED)
            .body(codec::empty_body())?)
    }

    async fn delete(self) -> Result<HttpResponse> {
        let state = &self.state;
        let tokens = self.cond.submitted_tokens();

        let _guard = self.guard().await;
        let meta = state.fs.stat(&self.path).await?;
        if self.path.is_root() {
            return Err(DavError::Forbidden("the root can't be deleted".into()).into());
        }
        self.cond
            .evaluate(&self.path, Some(&meta), false, &state.fs, &state.locks)
            .await?;
        state.locks.confirm(&self.path, &tokens)?;
        self.confirm_membership(&self.path, &tokens)?;

        let target = meta.href();
        let mut failures = remove_tree(state, meta, &tokens).await?;
        if failures.len() == 1 && failures[0].0 == target {
            if let Some((_, err)) = failures.pop() {
                return codec::error_response(err);
            }
        }
        if !failures.is_empty() {
            return failures_response(failures);
        }
        tracing::debug!(path=%self.path, "resource deleted");
        Ok(Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(codec::empty_body())?)
    }

    /// Target of a COPY or a MOVE, it must be served by this server
    fn destination(&self) -> Result<DavPath, DavError> {
        let raw = self
            .headers()
            .get("Destination")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DavError::BadRequest("missing Destination header".into()))?;
        let uri = raw
            .parse::<hyper::Uri>()
            .map_err(|_| DavError::BadRequest("invalid Destination header".into()))?;

        if let Some(authority) = uri.authority() {
            let host = self
                .headers()
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .or_else(|| self.parts.uri.authority().map(|a| a.as_str()));
            match host {
                Some(host) if !host.eq_ignore_ascii_case(authority.as_str()) => {
                    tracing::info!(destination=%raw, "destination on another server");
                    return Err(DavError::BadGateway);
                }
                _ => (),
            }
        }
        DavPath::parse(uri.path())
    }

    async fn copy_or_move(self, is_move: bool) -> Result<HttpResponse> {
        let state = &self.state;
        let dest = self.destination()?;
        let overwrite = codec::overwrite(self.headers())?;
        let depth = codec::depth(self.headers())?;
        let tokens = self.cond.submitted_tokens();

        if dest == self.path {
            return Err(DavError::Forbidden("source and destination are the same".into()).into());
        }
        if self.path.is_ancestor_of(&dest) || dest.is_ancestor_of(&self.path) {
            return Err(DavError::Forbidden("source and destination overlap".into()).into());
        }

        let _guard = self.guard().await;
        let src_meta = state.fs.stat(&self.path).await?;
        if src_meta.is_collection {
            match depth {
                Some(dav::Depth::Zero) => {
                    return Err(DavError::Forbidden("depth 0 on a collection".into()).into())
                }
                Some(dav::Depth::One) => {
                    return Err(DavError::BadRequest("depth 1 is not allowed here".into()).into())
                }
                _ => (),
            }
        }
        self.cond
            .evaluate(&self.path, Some(&src_meta), false, &state.fs, &state.locks)
            .await?;

        let parent_is_collection = match dest.parent() {
            Some(parent) => matches!(state.fs.try_stat(&parent).await?, Some(m) if m.is_collection),
            None => false,
        };
        if !parent_is_collection {
            return Err(DavError::Conflict(dest).into());
        }
        let dest_meta = state.fs.try_stat(&dest).await?;
        if dest_meta.is_some() && !overwrite {
            return Err(DavError::PreconditionFailed.into());
        }

        if is_move {
            state.locks.confirm_tree(&self.path, &tokens)?;
            self.confirm_membership(&self.path, &tokens)?;
        }
        state.locks.confirm_tree(&dest, &tokens)?;
        self.confirm_membership(&dest, &tokens)?;

        if let Some(existing) = dest_meta.clone() {
            let failures = remove_tree(state, existing, &tokens).await?;
            if !failures.is_empty() {
                return failures_response(failures);
            }
        }

        let failures = match is_move && state.fs.rename(&self.path, &dest).await? {
            true => {
                state.props.move_tree(&self.path, &dest);
                state.locks.forget_tree(&self.path);
                vec![]
            }
            false => {
                let mut failures = copy_tree(state, &src_meta, &dest).await?;
                state.props.copy_tree(&self.path, &dest);
                if is_move && failures.is_empty() {
                    failures = remove_tree(state, src_meta, &tokens).await?;
                }
                failures
            }
        };
        if !failures.is_empty() {
            return failures_response(failures);
        }

        tracing::debug!(from=%self.path, to=%dest, is_move, "resource duplicated");
        let status = match dest_meta {
            Some(_) => StatusCode::NO_CONTENT,
            None => StatusCode::CREATED,
        };
        Ok(Response::builder()
            .status(status)
            .body(codec::empty_body())?)
    }

    async fn propfind<B>(self, body: B) -> Result<HttpResponse>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let state = &self.state;
        let depth = codec::depth(self.headers())?.unwrap_or(dav::Depth::Infinity);
        let content = codec::read_body(body, state.max_body_size).await?;
        let propfind = codec::deserialize::<dav::PropFind<Dead>>(&content)
            .await?
            .unwrap_or(dav::PropFind::AllProp(None));

        let root = state.fs.stat(&self.path).await?;
        let mut responses = vec![];
        let mut queue = VecDeque::from([(root, 0usize)]);
        while let Some((meta, level)) = queue.pop_front() {
            let descend = meta.is_collection
                && (!meta.is_symlink || level == 0)
                && match depth {
                    dav::Depth::Zero => false,
                    dav::Depth::One => level == 0,
                    dav::Depth::Infinity => true,
                };
            if descend {
                match state.fs.read_dir(&meta.path).await {
                    Ok(members) => queue.extend(members.into_iter().map(|m| (m, level + 1))),
                    Err(e) => tracing::warn!(path=%meta.path, err=%e, "unable to list a collection"),
                }
            }

            let node = DavNode {
                meta,
                props: &state.props,
                locks: &state.locks,
            };
            responses.push(match &propfind {
                dav::PropFind::PropName => node.response_propname(),
                dav::PropFind::AllProp(include) => node.response_allprop(include.as_ref()),
                dav::PropFind::Prop(names) => node.response_props(names),
            });
        }

        codec::serialize(
            StatusCode::MULTI_STATUS,
            dav::Multistatus::<Dead> {
                responses,
                responsedescription: None,
            },
        )
    }

    async fn proppatch<B>(self, body: B) -> Result<HttpResponse>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let state = &self.state;
        let content = codec::read_body(body, state.max_body_size).await?;
        let update = codec::deserialize::<dav::PropertyUpdate<Dead>>(&content)
            .await?
            .ok_or_else(|| DavError::BadRequest("missing propertyupdate".into()))?;
        let ops = patch_ops(update);
        let tokens = self.cond.submitted_tokens();

        let _guard = self.guard().await;
        let meta = state.fs.stat(&self.path).await?;
        self.cond
            .evaluate(&self.path, Some(&meta), false, &state.fs, &state.locks)
            .await?;
        state.locks.confirm(&self.path, &tokens)?;

        let outcomes = state.props.patch(&self.path, &ops);
        let groups = [
            (PatchOutcome::Applied, StatusCode::OK, None),
            (
                PatchOutcome::Protected,
                StatusCode::FORBIDDEN,
                Some(dav::Error::<Dead>(vec![
                    dav::Violation::CannotModifyProtectedProperty,
                ])),
            ),
            (PatchOutcome::FailedDependency, StatusCode::FAILED_DEPENDENCY, None),
        ];
        let mut propstats = vec![];
        for (outcome, status, error) in groups {
            let names: Vec<dav::AnyProperty<Dead>> = outcomes
                .iter()
                .filter(|(_, o)| *o == outcome)
                .map(|(name, _)| dav::AnyProperty::Request(node::property_request(name)))
                .collect();
            if !names.is_empty() {
                propstats.push(dav::PropStat {
                    prop: dav::AnyProp(names),
                    status: dav::Status(status),
                    error,
                    responsedescription: None,
                });
            }
        }

        codec::serialize(
            StatusCode::MULTI_STATUS,
            dav::Multistatus::<Dead> {
                responses: vec![dav::Response {
                    status_or_propstat: dav::StatusOrPropstat::PropStat(
                        dav::Href(meta.href()),
                        propstats,
                    ),
                    error: None,
                    location: None,
                    responsedescription: None,
                }],
                responsedescription: None,
            },
        )
    }

    async fn lock<B>(self, body: B) -> Result<HttpResponse>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let state = &self.state;
        let depth = match codec::depth(self.headers())? {
            None | Some(dav::Depth::Infinity) => LockDepth::Infinity,
            Some(dav::Depth::Zero) => LockDepth::Zero,
            Some(dav::Depth::One) => {
                return Err(DavError::BadRequest("a lock has depth 0 or infinity".into()).into())
            }
        };
        let timeout = match codec::timeout(self.headers()) {
            None => Some(state.lock_timeout_secs),
            Some(dav::Timeout::Infinite) => None,
            Some(dav::Timeout::Seconds(secs)) => Some(u64::from(secs)),
        };
        let content = codec::read_body(body, state.max_body_size).await?;
        let info = codec::deserialize::<dav::LockInfo>(&content).await?;
        let tokens = self.cond.submitted_tokens();

        let _guard = self.guard().await;
        let info = match info {
            Some(info) => info,
            None => return self.refresh_lock(&tokens, timeout),
        };

        let existing = state.fs.try_stat(&self.path).await?;
        self.cond
            .evaluate(&self.path, existing.as_ref(), false, &state.fs, &state.locks)
            .await?;
        if existing.is_none() {
            self.confirm_membership(&self.path, &tokens)?;
        }

        let lock = match state
            .locks
            .acquire(&self.path, info.lockscope, depth, info.owner, timeout)
        {
            Ok(lock) => lock,
            Err(DavError::LockConflict(root)) => {
                return codec::serialize(
                    StatusCode::LOCKED,
                    dav::Error::<Core>(vec![dav::Violation::NoConflictingLock(vec![dav::Href(
                        root.href(false),
                    )])]),
                )
            }
            Err(e) => return Err(e.into()),
        };

        let status = match existing {
            Some(_) => StatusCode::OK,
            None => {
                // Locking an unmapped URL creates an empty resource
                let created: Result<(), DavError> = async {
                    state.fs.create(&self.path).await?.commit().await
                }
                .await;
                if let Err(e) = created {
                    if let Err(release) = state.locks.release(&lock.token) {
                        tracing::warn!(token=%lock.token, err=%release, "unable to drop a lock");
                    }
                    return Err(e.into());
                }
                StatusCode::CREATED
            }
        };

        tracing::debug!(path=%self.path, token=%lock.token, "lock granted");
        let mut response = self.lock_response(status, &lock)?;
        response.headers_mut().insert(
            "Lock-Token",
            HeaderValue::from_str(&format!("<{}>", lock.token))?,
        );
        Ok(response)
    }

    /// A LOCK without a body refreshes a lock named in the If header
    fn refresh_lock(&self, tokens: &[String], timeout: Option<u64>) -> Result<HttpResponse> {
        let locks = &self.state.locks;
        if tokens.is_empty() {
            return Err(DavError::BadRequest("a lock refresh needs an If header".into()).into());
        }
        let held = tokens
            .iter()
            .filter_map(|t| locks.get(t))
            .find(|l| l.covers(&self.path))
            .ok_or(DavError::PreconditionFailed)?;
        let lock = locks
            .refresh(&held.token, timeout)
            .map_err(|_| DavError::PreconditionFailed)?;
        tracing::debug!(path=%self.path, token=%lock.token, "lock refreshed");
        self.lock_response(StatusCode::OK, &lock)
    }

    fn lock_response(&self, status: StatusCode, lock: &Lock) -> Result<HttpResponse> {
        let active = node::active_lock(lock, self.state.locks.now_msec());
        codec::serialize(
            status,
            dav::PropValue::<Core>(vec![dav::Property::LockDiscovery(vec![active])]),
        )
    }

    async fn unlock(self) -> Result<HttpResponse> {
        let token = codec::lock_token(self.headers())
            .ok_or_else(|| DavError::BadRequest("missing or malformed Lock-Token".into()))?;

        let _guard = self.guard().await;
        self.state.locks.unlock(&self.path, &token)?;
        tracing::debug!(path=%self.path, token=%token, "lock released");
        Ok(Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(codec::empty_body())?)
    }
}

/// Translate a PROPPATCH body into store operations, in document order
fn patch_ops(update: dav::PropertyUpdate<Dead>) -> Vec<PatchOp> {
    update
        .0
        .into_iter()
        .flat_map(|item| match item {
            dav::PropertyUpdateItem::Set(dav::Set(dav::PropValue(props))) => props
                .into_iter()
                .map(|prop| {
                    let name = node::property_name(&prop.request());
                    match prop {
                        dav::Property::Extension(dead) => PatchOp::Set(name, dead.value),
                        dav::Property::DisplayName(v) | dav::Property::GetContentLanguage(v) => {
                            PatchOp::Set(name, v)
                        }
                        // protected, the store refuses it
                        _ => PatchOp::Set(name, String::new()),
                    }
                })
                .collect::<Vec<_>>(),
            dav::PropertyUpdateItem::Remove(dav::Remove(dav::PropName(names))) => names
                .iter()
                .map(|req| PatchOp::Remove(node::property_name(req)))
                .collect(),
        })
        .collect()
}

/// Remove a resource and everything below it, members first. A member that
/// can't be removed is reported, and its ancestors are kept. Symlinks are
/// unlinked, what they point to is left alone.
async fn remove_tree(
    state: &DavState,
    root: Metadata,
    tokens: &[String],
) -> Result<Failures, DavError> {
    // Breadth first, so that reversed, members come before their collection
    let mut nodes = vec![];
    let mut queue = VecDeque::from([root]);
    while let Some(meta) = queue.pop_front() {
        if meta.is_collection && !meta.is_symlink {
            queue.extend(state.fs.read_dir(&meta.path).await?);
        }
        nodes.push(meta);
    }

    let mut failures = vec![];
    let mut kept: HashSet<DavPath> = HashSet::new();
    for meta in nodes.into_iter().rev() {
        if kept.contains(&meta.path) {
            continue;
        }
        // removing a member alters the membership of its collection
        let confirmed = state.locks.confirm(&meta.path, tokens).and_then(|()| {
            match meta.path.parent() {
                Some(parent) => state.locks.confirm(&parent, tokens),
                None => Ok(()),
            }
        });
        let res = match confirmed {
            Ok(()) => state.fs.remove(&meta.path).await,
            Err(e) => Err(e),
        };
        match res {
            Ok(()) => {
                state.props.clear(&meta.path);
                state.locks.forget(&meta.path);
            }
            Err(e) => {
                tracing::debug!(path=%meta.path, err=%e, "member kept");
                kept.extend(meta.path.ancestors());
                failures.push((meta.href(), e));
            }
        }
    }
    Ok(failures)
}

/// Duplicate a resource and everything below it under `dest`. A linked
/// collection below the source becomes an empty collection.
async fn copy_tree(state: &DavState, root: &Metadata, dest: &DavPath) -> Result<Failures, DavError> {
    let mut failures = vec![];
    let mut queue = VecDeque::from([root.clone()]);
    while let Some(meta) = queue.pop_front() {
        let target = match meta.path.rebase(&root.path, dest) {
            Some(target) => target,
            None => continue,
        };
        let res = match meta.is_collection {
            true => state.fs.mkdir(&target).await,
            false => state.fs.copy_file(&meta.path, &target).await,
        };
        match res {
            Ok(()) if meta.is_collection && (!meta.is_symlink || meta.path == root.path) => {
                queue.extend(state.fs.read_dir(&meta.path).await?)
            }
            Ok(()) => (),
            Err(e) => failures.push((target.href(meta.is_collection), e)),
        }
    }
    Ok(failures)
}

fn failures_response(failures: Failures) -> Result<HttpResponse> {
    let responses = failures
        .into_iter()
        .map(|(href, err)| dav::Response::<Core> {
            status_or_propstat: dav::StatusOrPropstat::Status(
                vec![dav::Href(href)],
                dav::Status(codec::status_of(&err)),
            ),
            error: match &err {
                DavError::LockConflict(root) => Some(dav::Error(vec![codec::lock_conflict(root)])),
                _ => None,
            },
            responsedescription: None,
            location: None,
        })
        .collect();

    codec::serialize(
        StatusCode::MULTI_STATUS,
        dav::Multistatus::<Core> {
            responses,
            responsedescription: None,
        },
    )
}

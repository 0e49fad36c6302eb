use std::fmt::Debug;

use chrono::{DateTime, FixedOffset};

use super::xml;

/// A set of properties, resource types and error codes living outside of the
/// core RFC 4918 vocabulary. Each realization plugs its own element types.
pub trait Extension: std::fmt::Debug + PartialEq + Clone {
    type Error: xml::Node<Self::Error>;
    type Property: xml::Node<Self::Property>;
    type PropertyRequest: xml::Node<Self::PropertyRequest>;
    type ResourceType: xml::Node<Self::ResourceType>;
}

/// 14.1 activelock
///
/// <!ELEMENT activelock (lockscope, locktype, depth, owner?, timeout?,
///           locktoken?, lockroot)>
#[derive(Debug, PartialEq, Clone)]
pub struct ActiveLock {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub depth: Depth,
    pub owner: Option<Owner>,
    pub timeout: Option<Timeout>,
    pub locktoken: Option<LockToken>,
    pub lockroot: LockRoot,
}

/// 14.4 depth, also used for the `Depth` HTTP header
///
/// Value:   "0" | "1" | "infinity"
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

/// 14.5 error
///
/// Any child of the 'error' element is a precondition or postcondition
/// code. Unrecognized elements are ignored.
#[derive(Debug, PartialEq, Clone)]
pub struct Error<E: Extension>(pub Vec<Violation<E>>);

#[derive(Debug, PartialEq, Clone)]
pub enum Violation<E: Extension> {
    /// 409, the Lock-Token of an UNLOCK does not cover the Request-URI
    LockTokenMatchesRequestUri,

    /// 423, a lock token should have been submitted for these resources
    LockTokenSubmitted(Vec<Href>),

    /// 423, a LOCK request collides with the lock rooted at these resources
    NoConflictingLock(Vec<Href>),

    /// 403
    NoExternalEntities,

    /// 409
    PreservedLiveProperties,

    /// 403
    PropfindFiniteDepth,

    /// 403, PROPPATCH on a property computed by the server
    CannotModifyProtectedProperty,

    Extension(E::Error),
}

/// 14.7 href
#[derive(Debug, PartialEq, Clone)]
pub struct Href(pub String);

/// 14.8 include, extra properties requested on top of an allprop
#[derive(Debug, PartialEq, Clone)]
pub struct Include<E: Extension>(pub Vec<PropertyRequest<E>>);

/// 14.9 location
#[derive(Debug, PartialEq, Clone)]
pub struct Location(pub Href);

/// 14.10 lockentry
#[derive(Debug, PartialEq, Clone)]
pub struct LockEntry {
    pub lockscope: LockScope,
    pub locktype: LockType,
}

/// 14.11 lockinfo, body of a LOCK request
///
/// <!ELEMENT lockinfo (lockscope, locktype, owner?)  >
#[derive(Debug, PartialEq, Clone)]
pub struct LockInfo {
    pub lockscope: LockScope,
    pub locktype: LockType,
    pub owner: Option<Owner>,
}

/// 14.12 lockroot
#[derive(Debug, PartialEq, Clone)]
pub struct LockRoot(pub Href);

/// 14.13 lockscope
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// 14.14 locktoken
#[derive(Debug, PartialEq, Clone)]
pub struct LockToken(pub Href);

/// 14.15 locktype, write is the only access type RFC 4918 defines
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum LockType {
    Write,
}

/// 14.16 multistatus
///
/// <!ELEMENT multistatus (response*, responsedescription?)  >
#[derive(Debug, PartialEq, Clone)]
pub struct Multistatus<E: Extension> {
    pub responses: Vec<Response<E>>,
    pub responsedescription: Option<ResponseDescription>,
}

/// 14.17 owner
///
/// The server does not interpret the owner: the content is kept as a
/// self-contained XML fragment and sent back verbatim in lock discovery.
#[derive(Debug, PartialEq, Clone)]
pub struct Owner(pub String);

/// 14.18 prop, when used to name properties (PROPFIND, remove)
#[derive(Debug, PartialEq, Clone)]
pub struct PropName<E: Extension>(pub Vec<PropertyRequest<E>>);

/// 14.18 prop, when used to carry property values (set, LOCK response)
#[derive(Debug, PartialEq, Clone)]
pub struct PropValue<E: Extension>(pub Vec<Property<E>>);

/// 14.18 prop, inside a propstat, where names and values can be mixed
#[derive(Debug, PartialEq, Clone)]
pub struct AnyProp<E: Extension>(pub Vec<AnyProperty<E>>);

/// 14.19 propertyupdate, body of a PROPPATCH request
///
/// <!ELEMENT propertyupdate (remove | set)+ >
#[derive(Debug, PartialEq, Clone)]
pub struct PropertyUpdate<E: Extension>(pub Vec<PropertyUpdateItem<E>>);

#[derive(Debug, PartialEq, Clone)]
pub enum PropertyUpdateItem<E: Extension> {
    Remove(Remove<E>),
    Set(Set<E>),
}

/// 14.20 propfind, body of a PROPFIND request
///
/// <!ELEMENT propfind ( propname | (allprop, include?) | prop ) >
#[derive(Debug, PartialEq, Clone)]
pub enum PropFind<E: Extension> {
    PropName,
    AllProp(Option<Include<E>>),
    Prop(PropName<E>),
}

/// 14.22 propstat, properties sharing the same status in a response
#[derive(Debug, PartialEq, Clone)]
pub struct PropStat<E: Extension> {
    pub prop: AnyProp<E>,
    pub status: Status,
    pub error: Option<Error<E>>,
    pub responsedescription: Option<ResponseDescription>,
}

/// 14.23 remove
#[derive(Debug, PartialEq, Clone)]
pub struct Remove<E: Extension>(pub PropName<E>);

/// 14.24 response
///
/// <!ELEMENT response (href, ((href*, status)|(propstat+)),
///                     error?, responsedescription? , location?) >
#[derive(Debug, PartialEq, Clone)]
pub enum StatusOrPropstat<E: Extension> {
    Status(Vec<Href>, Status),
    PropStat(Href, Vec<PropStat<E>>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Response<E: Extension> {
    pub status_or_propstat: StatusOrPropstat<E>,
    pub error: Option<Error<E>>,
    pub responsedescription: Option<ResponseDescription>,
    pub location: Option<Location>,
}

/// 14.25 responsedescription
#[derive(Debug, PartialEq, Clone)]
pub struct ResponseDescription(pub String);

/// 14.26 set
#[derive(Debug, PartialEq, Clone)]
pub struct Set<E: Extension>(pub PropValue<E>);

/// 14.28 status, serialized as an HTTP status line
#[derive(Debug, PartialEq, Clone)]
pub struct Status(pub http::status::StatusCode);

/// 14.29 timeout
///
/// TimeType = ("Second-" DAVTimeOutVal | "Infinite")
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Timeout {
    Seconds(u32),
    Infinite,
}

#[derive(Debug, PartialEq, Clone)]
pub enum AnyProperty<E: Extension> {
    Request(PropertyRequest<E>),
    Value(Property<E>),
}

/// 15. DAV properties, by name
#[derive(Debug, PartialEq, Clone)]
pub enum PropertyRequest<E: Extension> {
    CreationDate,
    DisplayName,
    GetContentLanguage,
    GetContentLength,
    GetContentType,
    GetEtag,
    GetLastModified,
    LockDiscovery,
    ResourceType,
    SupportedLock,
    Extension(E::PropertyRequest),
}

/// 15. DAV properties, with their value
#[derive(Debug, PartialEq, Clone)]
pub enum Property<E: Extension> {
    /// 15.1, RFC 3339 date
    CreationDate(DateTime<FixedOffset>),
    /// 15.2
    DisplayName(String),
    /// 15.3
    GetContentLanguage(String),
    /// 15.4
    GetContentLength(u64),
    /// 15.5
    GetContentType(String),
    /// 15.6, a quoted entity tag
    GetEtag(String),
    /// 15.7, RFC 1123 date
    GetLastModified(DateTime<FixedOffset>),
    /// 15.8
    LockDiscovery(Vec<ActiveLock>),
    /// 15.9
    ResourceType(Vec<ResourceType<E>>),
    /// 15.10
    SupportedLock(Vec<LockEntry>),
    Extension(E::Property),
}

#[derive(Debug, PartialEq, Clone)]
pub enum ResourceType<E: Extension> {
    Collection,
    Extension(E::ResourceType),
}

impl<E: Extension> Property<E> {
    /// The name of this property, as requested in a PROPFIND or a remove
    pub fn request(&self) -> PropertyRequest<E>
    where
        E::Property: Named<E::PropertyRequest>,
    {
        match self {
            Self::CreationDate(_) => PropertyRequest::CreationDate,
            Self::DisplayName(_) => PropertyRequest::DisplayName,
            Self::GetContentLanguage(_) => PropertyRequest::GetContentLanguage,
            Self::GetContentLength(_) => PropertyRequest::GetContentLength,
            Self::GetContentType(_) => PropertyRequest::GetContentType,
            Self::GetEtag(_) => PropertyRequest::GetEtag,
            Self::GetLastModified(_) => PropertyRequest::GetLastModified,
            Self::LockDiscovery(_) => PropertyRequest::LockDiscovery,
            Self::ResourceType(_) => PropertyRequest::ResourceType,
            Self::SupportedLock(_) => PropertyRequest::SupportedLock,
            Self::Extension(ext) => PropertyRequest::Extension(ext.name()),
        }
    }
}

/// Extension properties able to tell their own name
pub trait Named<R> {
    fn name(&self) -> R;
}

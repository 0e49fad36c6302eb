use chrono::DateTime;
use quick_xml::events::Event;

use super::error::ParsingError;
use super::types::*;
use super::xml::{IRead, QRead, Reader, DAV_NS, DAV_URN};

/// Local name of the DAV: element under the cursor, if any
fn dav_element<T: IRead>(xml: &Reader<T>) -> Option<String> {
    if !matches!(xml.peek(), Event::Start(_) | Event::Empty(_)) {
        return None;
    }
    match xml.current_qname() {
        Some((Some(ns), local)) if ns == DAV_NS => Some(local),
        _ => None,
    }
}

// ---- ROOT ----

/// Propfind request
impl<E: Extension> QRead<PropFind<E>> for PropFind<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "propfind").await?;
        let propfind: PropFind<E> = loop {
            // allprop
            if xml.maybe_open(DAV_URN, "allprop").await?.is_some() {
                xml.close().await?;
                let includ = xml.maybe_find::<Include<E>>().await?;
                break PropFind::AllProp(includ);
            }

            // propname
            if xml.maybe_open(DAV_URN, "propname").await?.is_some() {
                xml.close().await?;
                break PropFind::PropName;
            }

            // prop
            let (mut maybe_prop, mut dirty) = (None, false);
            xml.maybe_read::<PropName<E>>(&mut maybe_prop, &mut dirty)
                .await?;
            if let Some(prop) = maybe_prop {
                break PropFind::Prop(prop);
            }

            // an empty propfind element is an allprop
            if matches!(xml.peek(), Event::End(_)) || !xml.parent_has_child() {
                break PropFind::AllProp(None);
            }

            tracing::debug!(event = ?xml.peek(), "unknown propfind child, skipping");
            xml.skip().await?;
        };
        xml.close().await?;

        Ok(propfind)
    }
}

/// PROPPATCH request
impl<E: Extension> QRead<PropertyUpdate<E>> for PropertyUpdate<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "propertyupdate").await?;
        let collected_items = xml.collect::<PropertyUpdateItem<E>>().await?;
        xml.close().await?;
        Ok(PropertyUpdate(collected_items))
    }
}

/// Generic response
impl<E: Extension> QRead<Multistatus<E>> for Multistatus<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "multistatus").await?;
        let mut responses = Vec::new();
        let mut responsedescription = None;

        loop {
            let mut dirty = false;
            xml.maybe_push(&mut responses, &mut dirty).await?;
            xml.maybe_read(&mut responsedescription, &mut dirty).await?;
            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip().await?,
                };
            }
        }

        xml.close().await?;
        Ok(Multistatus {
            responses,
            responsedescription,
        })
    }
}

// LOCK REQUEST
impl QRead<LockInfo> for LockInfo {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockinfo").await?;
        let (mut m_scope, mut m_type, mut owner) = (None, None, None);
        loop {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut m_scope, &mut dirty)
                .await?;
            xml.maybe_read::<LockType>(&mut m_type, &mut dirty).await?;
            xml.maybe_read::<Owner>(&mut owner, &mut dirty).await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip().await?,
                };
            }
        }
        xml.close().await?;
        match (m_scope, m_type) {
            (Some(lockscope), Some(locktype)) => Ok(LockInfo {
                lockscope,
                locktype,
                owner,
            }),
            _ => Err(ParsingError::MissingChild),
        }
    }
}

// LOCK RESPONSE
impl<E: Extension> QRead<PropValue<E>> for PropValue<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "prop").await?;
        let acc = xml.collect::<Property<E>>().await?;
        xml.close().await?;
        Ok(PropValue(acc))
    }
}

/// Error response
impl<E: Extension> QRead<Error<E>> for Error<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "error").await?;
        let violations = xml.collect::<Violation<E>>().await?;
        xml.close().await?;
        Ok(Error(violations))
    }
}

// ---- INNER XML
impl<E: Extension> QRead<Response<E>> for Response<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "response").await?;
        let (mut status, mut error, mut responsedescription, mut location) =
            (None, None, None, None);
        let mut href = Vec::new();
        let mut propstat = Vec::new();

        loop {
            let mut dirty = false;
            xml.maybe_read::<Status>(&mut status, &mut dirty).await?;
            xml.maybe_push::<Href>(&mut href, &mut dirty).await?;
            xml.maybe_push::<PropStat<E>>(&mut propstat, &mut dirty)
                .await?;
            xml.maybe_read::<Error<E>>(&mut error, &mut dirty).await?;
            xml.maybe_read::<ResponseDescription>(&mut responsedescription, &mut dirty)
                .await?;
            xml.maybe_read::<Location>(&mut location, &mut dirty)
                .await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip().await?,
                };
            }
        }

        xml.close().await?;
        let status_or_propstat = match (status, propstat.is_empty(), href.len()) {
            (Some(status), true, 1..) => StatusOrPropstat::Status(href, status),
            (None, false, 1..) => {
                let first = href.into_iter().next().ok_or(ParsingError::MissingChild)?;
                StatusOrPropstat::PropStat(first, propstat)
            }
            (Some(_), false, _) => return Err(ParsingError::InvalidValue),
            _ => return Err(ParsingError::MissingChild),
        };

        Ok(Response {
            status_or_propstat,
            error,
            responsedescription,
            location,
        })
    }
}

impl<E: Extension> QRead<PropStat<E>> for PropStat<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "propstat").await?;

        let (mut m_any_prop, mut m_status, mut error, mut responsedescription) =
            (None, None, None, None);

        loop {
            let mut dirty = false;
            xml.maybe_read::<AnyProp<E>>(&mut m_any_prop, &mut dirty)
                .await?;
            xml.maybe_read::<Status>(&mut m_status, &mut dirty).await?;
            xml.maybe_read::<Error<E>>(&mut error, &mut dirty).await?;
            xml.maybe_read::<ResponseDescription>(&mut responsedescription, &mut dirty)
                .await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip().await?,
                };
            }
        }

        xml.close().await?;
        match (m_any_prop, m_status) {
            (Some(prop), Some(status)) => Ok(PropStat {
                prop,
                status,
                error,
                responsedescription,
            }),
            _ => Err(ParsingError::MissingChild),
        }
    }
}

impl QRead<Status> for Status {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "status").await?;
        let fullcode = xml.tag_string().await?;
        let txtcode = fullcode
            .trim()
            .splitn(3, ' ')
            .nth(1)
            .ok_or(ParsingError::InvalidValue)?;
        let code = http::status::StatusCode::from_bytes(txtcode.as_bytes())
            .or(Err(ParsingError::InvalidValue))?;
        xml.close().await?;
        Ok(Status(code))
    }
}

impl QRead<ResponseDescription> for ResponseDescription {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "responsedescription").await?;
        let cnt = xml.tag_string().await?;
        xml.close().await?;
        Ok(ResponseDescription(cnt))
    }
}

impl QRead<Location> for Location {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "location").await?;
        let href = xml.find::<Href>().await?;
        xml.close().await?;
        Ok(Location(href))
    }
}

impl<E: Extension> QRead<PropertyUpdateItem<E>> for PropertyUpdateItem<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        match Remove::qread(xml).await {
            Err(ParsingError::Recoverable) => (),
            otherwise => return otherwise.map(PropertyUpdateItem::Remove),
        }
        Set::qread(xml).await.map(PropertyUpdateItem::Set)
    }
}

impl<E: Extension> QRead<Remove<E>> for Remove<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "remove").await?;
        let propname = xml.find::<PropName<E>>().await?;
        xml.close().await?;
        Ok(Remove(propname))
    }
}

impl<E: Extension> QRead<Set<E>> for Set<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "set").await?;
        let propvalue = xml.find::<PropValue<E>>().await?;
        xml.close().await?;
        Ok(Set(propvalue))
    }
}

impl<E: Extension> QRead<Violation<E>> for Violation<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        let violation = match dav_element(xml).as_deref() {
            Some("lock-token-matches-request-uri") => {
                xml.open_any().await?;
                Violation::LockTokenMatchesRequestUri
            }
            Some("lock-token-submitted") => {
                xml.open_any().await?;
                Violation::LockTokenSubmitted(xml.collect::<Href>().await?)
            }
            Some("no-conflicting-lock") => {
                xml.open_any().await?;
                Violation::NoConflictingLock(xml.collect::<Href>().await?)
            }
            Some("no-external-entities") => {
                xml.open_any().await?;
                Violation::NoExternalEntities
            }
            Some("preserved-live-properties") => {
                xml.open_any().await?;
                Violation::PreservedLiveProperties
            }
            Some("propfind-finite-depth") => {
                xml.open_any().await?;
                Violation::PropfindFiniteDepth
            }
            Some("cannot-modify-protected-property") => {
                xml.open_any().await?;
                Violation::CannotModifyProtectedProperty
            }
            _ => return E::Error::qread(xml).await.map(Violation::Extension),
        };
        xml.close().await?;
        Ok(violation)
    }
}

impl<E: Extension> QRead<Include<E>> for Include<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "include").await?;
        let acc = xml.collect::<PropertyRequest<E>>().await?;
        xml.close().await?;
        Ok(Include(acc))
    }
}

impl<E: Extension> QRead<PropName<E>> for PropName<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "prop").await?;
        let acc = xml.collect::<PropertyRequest<E>>().await?;
        xml.close().await?;
        Ok(PropName(acc))
    }
}

impl<E: Extension> QRead<AnyProp<E>> for AnyProp<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "prop").await?;
        let acc = xml.collect::<AnyProperty<E>>().await?;
        xml.close().await?;
        Ok(AnyProp(acc))
    }
}

impl<E: Extension> QRead<AnyProperty<E>> for AnyProperty<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        match Property::qread(xml).await {
            Err(ParsingError::Recoverable) => (),
            otherwise => return otherwise.map(Self::Value),
        }
        PropertyRequest::qread(xml).await.map(Self::Request)
    }
}

impl<E: Extension> QRead<PropertyRequest<E>> for PropertyRequest<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        let maybe = match dav_element(xml).as_deref() {
            Some("creationdate") => Some(PropertyRequest::CreationDate),
            Some("displayname") => Some(PropertyRequest::DisplayName),
            Some("getcontentlanguage") => Some(PropertyRequest::GetContentLanguage),
            Some("getcontentlength") => Some(PropertyRequest::GetContentLength),
            Some("getcontenttype") => Some(PropertyRequest::GetContentType),
            Some("getetag") => Some(PropertyRequest::GetEtag),
            Some("getlastmodified") => Some(PropertyRequest::GetLastModified),
            Some("lockdiscovery") => Some(PropertyRequest::LockDiscovery),
            Some("resourcetype") => Some(PropertyRequest::ResourceType),
            Some("supportedlock") => Some(PropertyRequest::SupportedLock),
            _ => None,
        };

        match maybe {
            Some(pr) => {
                xml.open_any().await?;
                xml.close().await?;
                Ok(pr)
            }
            None => E::PropertyRequest::qread(xml)
                .await
                .map(PropertyRequest::Extension),
        }
    }
}

impl<E: Extension> QRead<Property<E>> for Property<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        // Core WebDAV properties only carry a value when they have content,
        // an empty element is a property name.
        let is_start = matches!(xml.peek(), Event::Start(_));
        let name = match dav_element(xml) {
            Some(name) if is_start => name,
            _ => return E::Property::qread(xml).await.map(Property::Extension),
        };

        let prop = match name.as_str() {
            "creationdate" => {
                xml.open_any().await?;
                let datestr = xml.tag_string().await?;
                Property::CreationDate(DateTime::parse_from_rfc3339(datestr.trim())?)
            }
            "displayname" => {
                xml.open_any().await?;
                Property::DisplayName(xml.tag_string().await?)
            }
            "getcontentlanguage" => {
                xml.open_any().await?;
                Property::GetContentLanguage(xml.tag_string().await?)
            }
            "getcontentlength" => {
                xml.open_any().await?;
                Property::GetContentLength(xml.tag_string().await?.trim().parse::<u64>()?)
            }
            "getcontenttype" => {
                xml.open_any().await?;
                Property::GetContentType(xml.tag_string().await?)
            }
            "getetag" => {
                xml.open_any().await?;
                Property::GetEtag(xml.tag_string().await?)
            }
            "getlastmodified" => {
                xml.open_any().await?;
                let datestr = xml.tag_string().await?;
                Property::GetLastModified(DateTime::parse_from_rfc2822(datestr.trim())?)
            }
            "lockdiscovery" => {
                xml.open_any().await?;
                Property::LockDiscovery(xml.collect::<ActiveLock>().await?)
            }
            "resourcetype" => {
                xml.open_any().await?;
                Property::ResourceType(xml.collect::<ResourceType<E>>().await?)
            }
            "supportedlock" => {
                xml.open_any().await?;
                Property::SupportedLock(xml.collect::<LockEntry>().await?)
            }
            // An unknown DAV: property, delegating
            _ => return E::Property::qread(xml).await.map(Property::Extension),
        };
        xml.close().await?;
        Ok(prop)
    }
}

impl QRead<ActiveLock> for ActiveLock {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "activelock").await?;
        let (
            mut m_scope,
            mut m_type,
            mut m_depth,
            mut owner,
            mut timeout,
            mut locktoken,
            mut m_root,
        ) = (None, None, None, None, None, None, None);

        loop {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut m_scope, &mut dirty)
                .await?;
            xml.maybe_read::<LockType>(&mut m_type, &mut dirty).await?;
            xml.maybe_read::<Depth>(&mut m_depth, &mut dirty).await?;
            xml.maybe_read::<Owner>(&mut owner, &mut dirty).await?;
            xml.maybe_read::<Timeout>(&mut timeout, &mut dirty).await?;
            xml.maybe_read::<LockToken>(&mut locktoken, &mut dirty)
                .await?;
            xml.maybe_read::<LockRoot>(&mut m_root, &mut dirty).await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                }
            }
        }

        xml.close().await?;
        match (m_scope, m_type, m_depth, m_root) {
            (Some(lockscope), Some(locktype), Some(depth), Some(lockroot)) => Ok(ActiveLock {
                lockscope,
                locktype,
                depth,
                owner,
                timeout,
                locktoken,
                lockroot,
            }),
            _ => Err(ParsingError::MissingChild),
        }
    }
}

impl QRead<Depth> for Depth {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "depth").await?;
        let depth_str = xml.tag_string().await?;
        xml.close().await?;
        match depth_str.trim() {
            "0" => Ok(Depth::Zero),
            "1" => Ok(Depth::One),
            "infinity" | "Infinity" => Ok(Depth::Infinity),
            _ => Err(ParsingError::WrongToken),
        }
    }
}

impl QRead<Owner> for Owner {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "owner").await?;
        let fragment = xml.tag_fragment().await?;
        xml.close().await?;
        Ok(Owner(fragment))
    }
}

impl QRead<Timeout> for Timeout {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        const SEC_PFX: &str = "Second-";
        xml.open(DAV_URN, "timeout").await?;

        let timeout = match xml.tag_string().await?.trim() {
            "Infinite" => Timeout::Infinite,
            seconds => match seconds.strip_prefix(SEC_PFX) {
                Some(secs) => Timeout::Seconds(secs.parse::<u32>()?),
                None => return Err(ParsingError::InvalidValue),
            },
        };

        xml.close().await?;
        Ok(timeout)
    }
}

impl QRead<LockToken> for LockToken {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "locktoken").await?;
        let href = xml.find::<Href>().await?;
        xml.close().await?;
        Ok(LockToken(href))
    }
}

impl QRead<LockRoot> for LockRoot {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockroot").await?;
        let href = xml.find::<Href>().await?;
        xml.close().await?;
        Ok(LockRoot(href))
    }
}

impl<E: Extension> QRead<ResourceType<E>> for ResourceType<E> {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        if xml.maybe_open(DAV_URN, "collection").await?.is_some() {
            xml.close().await?;
            return Ok(ResourceType::Collection);
        }

        E::ResourceType::qread(xml)
            .await
            .map(ResourceType::Extension)
    }
}

impl QRead<LockEntry> for LockEntry {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockentry").await?;
        let (mut maybe_scope, mut maybe_type) = (None, None);

        loop {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut maybe_scope, &mut dirty)
                .await?;
            xml.maybe_read::<LockType>(&mut maybe_type, &mut dirty)
                .await?;
            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => xml.skip().await?,
                };
            }
        }

        xml.close().await?;
        match (maybe_scope, maybe_type) {
            (Some(lockscope), Some(locktype)) => Ok(LockEntry {
                lockscope,
                locktype,
            }),
            _ => Err(ParsingError::MissingChild),
        }
    }
}

impl QRead<LockScope> for LockScope {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockscope").await?;

        let lockscope = loop {
            if xml.maybe_open(DAV_URN, "exclusive").await?.is_some() {
                xml.close().await?;
                break LockScope::Exclusive;
            }

            if xml.maybe_open(DAV_URN, "shared").await?.is_some() {
                xml.close().await?;
                break LockScope::Shared;
            }

            if matches!(xml.peek(), Event::End(_)) || !xml.parent_has_child() {
                return Err(ParsingError::MissingChild);
            }
            xml.skip().await?;
        };

        xml.close().await?;
        Ok(lockscope)
    }
}

impl QRead<LockType> for LockType {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "locktype").await?;

        let locktype = loop {
            if xml.maybe_open(DAV_URN, "write").await?.is_some() {
                xml.close().await?;
                break LockType::Write;
            }

            if matches!(xml.peek(), Event::End(_)) || !xml.parent_has_child() {
                return Err(ParsingError::MissingChild);
            }
            xml.skip().await?;
        };

        xml.close().await?;
        Ok(locktype)
    }
}

impl QRead<Href> for Href {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "href").await?;
        let url = xml.tag_string().await?;
        xml.close().await?;
        Ok(Href(url.trim().to_string()))
    }
}

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesText, Event};
use quick_xml::Error as QError;

use super::types::*;
use super::xml::{IWrite, QWrite, Writer};

/// Text content, only markup characters are escaped so entity tags
/// keep their quotes readable.
fn text(raw: &str) -> BytesText<'_> {
    BytesText::from_escaped(partial_escape(raw))
}

async fn atom(xml: &mut Writer<impl IWrite>, name: &str) -> Result<(), QError> {
    let empty_tag = xml.create_dav_element(name);
    xml.q.write_event_async(Event::Empty(empty_tag)).await
}

async fn text_element(
    xml: &mut Writer<impl IWrite>,
    name: &str,
    content: &str,
) -> Result<(), QError> {
    let start = xml.create_dav_element(name);
    let end = start.to_end().into_owned();

    xml.q.write_event_async(Event::Start(start)).await?;
    xml.q.write_event_async(Event::Text(text(content))).await?;
    xml.q.write_event_async(Event::End(end)).await
}

// --- XML ROOTS

/// PROPFIND request
impl<E: Extension> QWrite for PropFind<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("propfind");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        match self {
            Self::PropName => atom(xml, "propname").await?,
            Self::AllProp(maybe_include) => {
                atom(xml, "allprop").await?;
                if let Some(include) = maybe_include {
                    include.qwrite(xml).await?;
                }
            }
            Self::Prop(propname) => propname.qwrite(xml).await?,
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

/// PROPPATCH request
impl<E: Extension> QWrite for PropertyUpdate<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("propertyupdate");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        for update in self.0.iter() {
            update.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

/// PROPFIND, PROPPATCH, DELETE, COPY and MOVE responses
impl<E: Extension> QWrite for Multistatus<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("multistatus");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        for response in self.responses.iter() {
            response.qwrite(xml).await?;
        }
        if let Some(description) = &self.responsedescription {
            description.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

/// LOCK request
impl QWrite for LockInfo {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("lockinfo");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.lockscope.qwrite(xml).await?;
        self.locktype.qwrite(xml).await?;
        if let Some(owner) = &self.owner {
            owner.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

/// LOCK response
impl<E: Extension> QWrite for PropValue<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("prop");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        for propval in self.0.iter() {
            propval.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

/// Error response
impl<E: Extension> QWrite for Error<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("error");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        for violation in self.0.iter() {
            violation.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

// --- XML inner elements

impl<E: Extension> QWrite for PropertyUpdateItem<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        match self {
            Self::Set(set) => set.qwrite(xml).await,
            Self::Remove(rm) => rm.qwrite(xml).await,
        }
    }
}

impl<E: Extension> QWrite for Set<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("set");
        let end = start.to_end();
        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.0.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl<E: Extension> QWrite for Remove<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("remove");
        let end = start.to_end();
        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.0.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl<E: Extension> QWrite for AnyProp<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("prop");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        for propval in self.0.iter() {
            propval.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl<E: Extension> QWrite for AnyProperty<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        match self {
            Self::Request(v) => v.qwrite(xml).await,
            Self::Value(v) => v.qwrite(xml).await,
        }
    }
}

impl<E: Extension> QWrite for PropName<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("prop");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        for propname in self.0.iter() {
            propname.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl<E: Extension> QWrite for Include<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("include");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        for prop in self.0.iter() {
            prop.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for Href {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        text_element(xml, "href", &self.0).await
    }
}

impl<E: Extension> QWrite for Response<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("response");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.status_or_propstat.qwrite(xml).await?;
        if let Some(error) = &self.error {
            error.qwrite(xml).await?;
        }
        if let Some(responsedescription) = &self.responsedescription {
            responsedescription.qwrite(xml).await?;
        }
        if let Some(location) = &self.location {
            location.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl<E: Extension> QWrite for StatusOrPropstat<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        match self {
            Self::Status(many_href, status) => {
                for href in many_href.iter() {
                    href.qwrite(xml).await?;
                }
                status.qwrite(xml).await
            }
            Self::PropStat(href, propstat_list) => {
                href.qwrite(xml).await?;
                for propstat in propstat_list.iter() {
                    propstat.qwrite(xml).await?;
                }
                Ok(())
            }
        }
    }
}

impl QWrite for Status {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let txt = format!(
            "HTTP/1.1 {} {}",
            self.0.as_str(),
            self.0.canonical_reason().unwrap_or("No reason")
        );
        text_element(xml, "status", &txt).await
    }
}

impl QWrite for ResponseDescription {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        text_element(xml, "responsedescription", &self.0).await
    }
}

impl QWrite for Location {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("location");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.0.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl<E: Extension> QWrite for PropStat<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("propstat");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.prop.qwrite(xml).await?;
        self.status.qwrite(xml).await?;
        if let Some(error) = &self.error {
            error.qwrite(xml).await?;
        }
        if let Some(description) = &self.responsedescription {
            description.qwrite(xml).await?;
        }
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl<E: Extension> QWrite for Property<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        use Property::*;
        match self {
            CreationDate(date) => text_element(xml, "creationdate", &date.to_rfc3339()).await,
            DisplayName(name) => text_element(xml, "displayname", name).await,
            GetContentLanguage(lang) => text_element(xml, "getcontentlanguage", lang).await,
            GetContentLength(len) => {
                text_element(xml, "getcontentlength", &len.to_string()).await
            }
            GetContentType(ct) => text_element(xml, "getcontenttype", ct).await,
            GetEtag(etag) => text_element(xml, "getetag", etag).await,
            GetLastModified(date) => {
                let http_date = date
                    .with_timezone(&chrono::Utc)
                    .format("%a, %d %b %Y %H:%M:%S GMT")
                    .to_string();
                text_element(xml, "getlastmodified", &http_date).await
            }
            LockDiscovery(many_locks) => {
                if many_locks.is_empty() {
                    return atom(xml, "lockdiscovery").await;
                }

                let start = xml.create_dav_element("lockdiscovery");
                let end = start.to_end();

                xml.q.write_event_async(Event::Start(start.clone())).await?;
                for lock in many_locks.iter() {
                    lock.qwrite(xml).await?;
                }
                xml.q.write_event_async(Event::End(end)).await
            }
            ResourceType(many_types) => {
                if many_types.is_empty() {
                    return atom(xml, "resourcetype").await;
                }

                let start = xml.create_dav_element("resourcetype");
                let end = start.to_end();

                xml.q.write_event_async(Event::Start(start.clone())).await?;
                for restype in many_types.iter() {
                    restype.qwrite(xml).await?;
                }
                xml.q.write_event_async(Event::End(end)).await
            }
            SupportedLock(many_entries) => {
                if many_entries.is_empty() {
                    return atom(xml, "supportedlock").await;
                }

                let start = xml.create_dav_element("supportedlock");
                let end = start.to_end();

                xml.q.write_event_async(Event::Start(start.clone())).await?;
                for entry in many_entries.iter() {
                    entry.qwrite(xml).await?;
                }
                xml.q.write_event_async(Event::End(end)).await
            }
            Extension(inner) => inner.qwrite(xml).await,
        }
    }
}

impl<E: Extension> QWrite for ResourceType<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        match self {
            Self::Collection => atom(xml, "collection").await,
            Self::Extension(inner) => inner.qwrite(xml).await,
        }
    }
}

impl<E: Extension> QWrite for PropertyRequest<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        use PropertyRequest::*;
        match self {
            CreationDate => atom(xml, "creationdate").await,
            DisplayName => atom(xml, "displayname").await,
            GetContentLanguage => atom(xml, "getcontentlanguage").await,
            GetContentLength => atom(xml, "getcontentlength").await,
            GetContentType => atom(xml, "getcontenttype").await,
            GetEtag => atom(xml, "getetag").await,
            GetLastModified => atom(xml, "getlastmodified").await,
            LockDiscovery => atom(xml, "lockdiscovery").await,
            ResourceType => atom(xml, "resourcetype").await,
            SupportedLock => atom(xml, "supportedlock").await,
            Extension(inner) => inner.qwrite(xml).await,
        }
    }
}

impl QWrite for ActiveLock {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("activelock");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.locktype.qwrite(xml).await?;
        self.lockscope.qwrite(xml).await?;
        self.depth.qwrite(xml).await?;
        if let Some(owner) = &self.owner {
            owner.qwrite(xml).await?;
        }
        if let Some(timeout) = &self.timeout {
            timeout.qwrite(xml).await?;
        }
        if let Some(locktoken) = &self.locktoken {
            locktoken.qwrite(xml).await?;
        }
        self.lockroot.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockType {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("locktype");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        match self {
            Self::Write => atom(xml, "write").await?,
        };
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockScope {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("lockscope");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        match self {
            Self::Exclusive => atom(xml, "exclusive").await?,
            Self::Shared => atom(xml, "shared").await?,
        };
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for Owner {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        if self.0.is_empty() {
            return atom(xml, "owner").await;
        }

        let start = xml.create_dav_element("owner");
        let end = start.to_end().into_owned();

        xml.q.write_event_async(Event::Start(start)).await?;
        xml.q
            .write_event_async(Event::Text(BytesText::from_escaped(self.0.as_str())))
            .await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for Depth {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let value = match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        };
        text_element(xml, "depth", value).await
    }
}

impl QWrite for Timeout {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let value = match self {
            Self::Seconds(count) => format!("Second-{}", count),
            Self::Infinite => "Infinite".into(),
        };
        text_element(xml, "timeout", &value).await
    }
}

impl QWrite for LockToken {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("locktoken");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.0.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockRoot {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("lockroot");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.0.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockEntry {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("lockentry");
        let end = start.to_end();

        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.lockscope.qwrite(xml).await?;
        self.locktype.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl<E: Extension> QWrite for Violation<E> {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        match self {
            Violation::LockTokenMatchesRequestUri => {
                atom(xml, "lock-token-matches-request-uri").await
            }
            Violation::LockTokenSubmitted(hrefs) | Violation::NoConflictingLock(hrefs) => {
                let name = match self {
                    Violation::LockTokenSubmitted(_) => "lock-token-submitted",
                    _ => "no-conflicting-lock",
                };
                if hrefs.is_empty() {
                    return atom(xml, name).await;
                }

                let start = xml.create_dav_element(name);
                let end = start.to_end();

                xml.q.write_event_async(Event::Start(start.clone())).await?;
                for href in hrefs.iter() {
                    href.qwrite(xml).await?;
                }
                xml.q.write_event_async(Event::End(end)).await
            }
            Violation::NoExternalEntities => atom(xml, "no-external-entities").await,
            Violation::PreservedLiveProperties => atom(xml, "preserved-live-properties").await,
            Violation::PropfindFiniteDepth => atom(xml, "propfind-finite-depth").await,
            Violation::CannotModifyProtectedProperty => {
                atom(xml, "cannot-modify-protected-property").await
            }
            Violation::Extension(inner) => inner.qwrite(xml).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realization::{Core, Dead, DeadProperty, PropertyName};
    use crate::xml::Reader;
    use chrono::{FixedOffset, TimeZone};
    use quick_xml::reader::NsReader;
    use tokio::io::AsyncWriteExt;

    async fn serialize(elem: &impl QWrite) -> String {
        let mut buffer = Vec::new();
        let mut tokio_buffer = tokio::io::BufWriter::new(&mut buffer);
        let q = quick_xml::writer::Writer::new_with_indent(&mut tokio_buffer, b' ', 4);
        let ns_to_apply = vec![("xmlns:D".into(), "DAV:".into())];
        let mut writer = Writer { q, ns_to_apply };

        elem.qwrite(&mut writer).await.expect("xml serialization");
        tokio_buffer.flush().await.expect("tokio buffer flush");
        let got = std::str::from_utf8(buffer.as_slice()).unwrap();

        got.into()
    }

    async fn deserialize<T: crate::xml::Node<T>>(src: &str) -> T {
        let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes()))
            .await
            .unwrap();
        rdr.find().await.unwrap()
    }

    #[tokio::test]
    async fn basic_href() {
        let orig = Href("/SOMETHING".into());

        let got = serialize(&orig).await;
        let expected = r#"<D:href xmlns:D="DAV:">/SOMETHING</D:href>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(deserialize::<Href>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn basic_multistatus() {
        let orig = Multistatus::<Core> {
            responses: vec![],
            responsedescription: Some(ResponseDescription("Hello world".into())),
        };
        let got = serialize(&orig).await;

        let expected = r#"<D:multistatus xmlns:D="DAV:">
    <D:responsedescription>Hello world</D:responsedescription>
</D:multistatus>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(deserialize::<Multistatus<Core>>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn rfc_error_delete_locked() {
        let orig = Error::<Core>(vec![Violation::LockTokenSubmitted(vec![Href(
            "/locked/".into(),
        )])]);
        let got = serialize(&orig).await;

        let expected = r#"<D:error xmlns:D="DAV:">
    <D:lock-token-submitted>
        <D:href>/locked/</D:href>
    </D:lock-token-submitted>
</D:error>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(deserialize::<Error<Core>>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn rfc_delete_locked_member() {
        let orig = Multistatus::<Core> {
            responses: vec![Response {
                status_or_propstat: StatusOrPropstat::Status(
                    vec![Href("http://www.example.com/container/resource3".into())],
                    Status(http::status::StatusCode::from_u16(423).unwrap()),
                ),
                error: Some(Error(vec![Violation::LockTokenSubmitted(vec![])])),
                responsedescription: None,
                location: None,
            }],
            responsedescription: None,
        };

        let got = serialize(&orig).await;

        let expected = r#"<D:multistatus xmlns:D="DAV:">
    <D:response>
        <D:href>http://www.example.com/container/resource3</D:href>
        <D:status>HTTP/1.1 423 Locked</D:status>
        <D:error>
            <D:lock-token-submitted/>
        </D:error>
    </D:response>
</D:multistatus>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(deserialize::<Multistatus<Core>>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn rfc_propname_res() {
        let orig = Multistatus::<Dead> {
            responses: vec![Response {
                status_or_propstat: StatusOrPropstat::PropStat(
                    Href("http://www.example.com/container/".into()),
                    vec![PropStat {
                        prop: AnyProp(vec![
                            AnyProperty::Request(PropertyRequest::Extension(PropertyName::new(
                                "http://ns.example.com/boxschema/",
                                "bigbox",
                            ))),
                            AnyProperty::Request(PropertyRequest::CreationDate),
                            AnyProperty::Request(PropertyRequest::DisplayName),
                            AnyProperty::Request(PropertyRequest::ResourceType),
                            AnyProperty::Request(PropertyRequest::SupportedLock),
                        ]),
                        status: Status(http::status::StatusCode::OK),
                        error: None,
                        responsedescription: None,
                    }],
                ),
                error: None,
                responsedescription: None,
                location: None,
            }],
            responsedescription: None,
        };

        let got = serialize(&orig).await;

        let expected = r#"<D:multistatus xmlns:D="DAV:">
    <D:response>
        <D:href>http://www.example.com/container/</D:href>
        <D:propstat>
            <D:prop>
                <bigbox xmlns="http://ns.example.com/boxschema/"/>
                <D:creationdate/>
                <D:displayname/>
                <D:resourcetype/>
                <D:supportedlock/>
            </D:prop>
            <D:status>HTTP/1.1 200 OK</D:status>
        </D:propstat>
    </D:response>
</D:multistatus>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
    }

    #[tokio::test]
    async fn rfc_allprop_res() {
        let orig = Multistatus::<Dead> {
            responses: vec![Response {
                status_or_propstat: StatusOrPropstat::PropStat(
                    Href("/container/front.html".into()),
                    vec![PropStat {
                        prop: AnyProp(vec![
                            AnyProperty::Value(Property::Extension(DeadProperty {
                                name: PropertyName::new(
                                    "http://ns.example.com/boxschema/",
                                    "bigbox",
                                ),
                                value: r#"<BoxType xmlns="http://ns.example.com/boxschema/">Box type B</BoxType>"#.into(),
                            })),
                            AnyProperty::Value(Property::CreationDate(
                                FixedOffset::west_opt(8 * 3600)
                                    .unwrap()
                                    .with_ymd_and_hms(1997, 12, 1, 18, 27, 21)
                                    .unwrap(),
                            )),
                            AnyProperty::Value(Property::GetContentLength(4525)),
                            AnyProperty::Value(Property::GetEtag("\"zzyzx\"".into())),
                            AnyProperty::Value(Property::GetLastModified(
                                FixedOffset::east_opt(0)
                                    .unwrap()
                                    .with_ymd_and_hms(1998, 1, 12, 9, 25, 56)
                                    .unwrap(),
                            )),
                            AnyProperty::Value(Property::ResourceType(vec![])),
                            AnyProperty::Value(Property::SupportedLock(vec![LockEntry {
                                lockscope: LockScope::Exclusive,
                                locktype: LockType::Write,
                            }])),
                        ]),
                        status: Status(http::status::StatusCode::OK),
                        error: None,
                        responsedescription: None,
                    }],
                ),
                error: None,
                responsedescription: None,
                location: None,
            }],
            responsedescription: None,
        };

        let got = serialize(&orig).await;

        let expected = r#"<D:multistatus xmlns:D="DAV:">
    <D:response>
        <D:href>/container/front.html</D:href>
        <D:propstat>
            <D:prop>
                <bigbox xmlns="http://ns.example.com/boxschema/"><BoxType xmlns="http://ns.example.com/boxschema/">Box type B</BoxType></bigbox>
                <D:creationdate>1997-12-01T18:27:21-08:00</D:creationdate>
                <D:getcontentlength>4525</D:getcontentlength>
                <D:getetag>"zzyzx"</D:getetag>
                <D:getlastmodified>Mon, 12 Jan 1998 09:25:56 GMT</D:getlastmodified>
                <D:resourcetype/>
                <D:supportedlock>
                    <D:lockentry>
                        <D:lockscope>
                            <D:exclusive/>
                        </D:lockscope>
                        <D:locktype>
                            <D:write/>
                        </D:locktype>
                    </D:lockentry>
                </D:supportedlock>
            </D:prop>
            <D:status>HTTP/1.1 200 OK</D:status>
        </D:propstat>
    </D:response>
</D:multistatus>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
    }

    #[tokio::test]
    async fn rfc_lock_response() {
        let orig = PropValue::<Core>(vec![Property::LockDiscovery(vec![ActiveLock {
            locktype: LockType::Write,
            lockscope: LockScope::Exclusive,
            depth: Depth::Infinity,
            owner: Some(Owner(
                r#"<href xmlns="DAV:">http://example.org/~ejw/contact.html</href>"#.into(),
            )),
            timeout: Some(Timeout::Seconds(604800)),
            locktoken: Some(LockToken(Href(
                "urn:uuid:e71d4fae-5dec-22d6-fea5-00a0c91e6be4".into(),
            ))),
            lockroot: LockRoot(Href(
                "http://example.com/workspace/webdav/proposal.doc".into(),
            )),
        }])]);

        let got = serialize(&orig).await;

        let expected = r#"<D:prop xmlns:D="DAV:">
    <D:lockdiscovery>
        <D:activelock>
            <D:locktype>
                <D:write/>
            </D:locktype>
            <D:lockscope>
                <D:exclusive/>
            </D:lockscope>
            <D:depth>infinity</D:depth>
            <D:owner><href xmlns="DAV:">http://example.org/~ejw/contact.html</href></D:owner>
            <D:timeout>Second-604800</D:timeout>
            <D:locktoken>
                <D:href>urn:uuid:e71d4fae-5dec-22d6-fea5-00a0c91e6be4</D:href>
            </D:locktoken>
            <D:lockroot>
                <D:href>http://example.com/workspace/webdav/proposal.doc</D:href>
            </D:lockroot>
        </D:activelock>
    </D:lockdiscovery>
</D:prop>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(deserialize::<PropValue<Core>>(got.as_str()).await, orig)
    }

    #[tokio::test]
    async fn propertyupdate_request() {
        let orig = PropertyUpdate::<Dead>(vec![
            PropertyUpdateItem::Set(Set(PropValue(vec![Property::Extension(DeadProperty {
                name: PropertyName::new("urn:x", "custom"),
                value: "v1".into(),
            })]))),
            PropertyUpdateItem::Remove(Remove(PropName(vec![PropertyRequest::Extension(
                PropertyName::new("urn:x", "other"),
            )]))),
        ]);

        let got = serialize(&orig).await;
        let expected = r#"<D:propertyupdate xmlns:D="DAV:">
    <D:set>
        <D:prop>
            <custom xmlns="urn:x">v1</custom>
        </D:prop>
    </D:set>
    <D:remove>
        <D:prop>
            <other xmlns="urn:x"/>
        </D:prop>
    </D:remove>
</D:propertyupdate>"#;

        assert_eq!(&got, expected, "\n---GOT---\n{got}\n---EXP---\n{expected}\n");
        assert_eq!(deserialize::<PropertyUpdate<Dead>>(got.as_str()).await, orig)
    }
}

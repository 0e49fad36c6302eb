use quick_xml::events::{BytesText, Event};

use super::error;
use super::types as dav;
use super::xml;

#[derive(Debug, PartialEq, Clone)]
pub struct Disabled(());
impl xml::QRead<Disabled> for Disabled {
    async fn qread(_xml: &mut xml::Reader<impl xml::IRead>) -> Result<Self, error::ParsingError> {
        Err(error::ParsingError::Recoverable)
    }
}
impl xml::QWrite for Disabled {
    async fn qwrite(&self, _xml: &mut xml::Writer<impl xml::IWrite>) -> Result<(), quick_xml::Error> {
        // A Disabled value can't be built, there is nothing to write
        Ok(())
    }
}
impl dav::Named<Disabled> for Disabled {
    fn name(&self) -> Disabled {
        self.clone()
    }
}

/// The base WebDAV
///
/// Any extension is disabled through an object we can't build
/// due to a private inner element.
#[derive(Debug, PartialEq, Clone)]
pub struct Core {}
impl dav::Extension for Core {
    type Error = Disabled;
    type Property = Disabled;
    type PropertyRequest = Disabled;
    type ResourceType = Disabled;
}

/// WebDAV with dead properties: any property the server does not compute
/// itself is stored and returned as the client sent it.
#[derive(Debug, PartialEq, Clone)]
pub struct Dead {}
impl dav::Extension for Dead {
    type Error = Disabled;
    type Property = DeadProperty;
    type PropertyRequest = PropertyName;
    type ResourceType = Disabled;
}

/// Expanded name of a property: its namespace URI and its local name.
/// An element declared in no namespace has an empty namespace.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct PropertyName {
    pub ns: String,
    pub local: String,
}
impl PropertyName {
    pub fn new(ns: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            ns: ns.into(),
            local: local.into(),
        }
    }

    pub fn dav(local: impl Into<String>) -> Self {
        Self::new(xml::DAV_NS, local)
    }
}

/// A property and its raw value, a self-contained XML fragment
#[derive(Debug, PartialEq, Clone)]
pub struct DeadProperty {
    pub name: PropertyName,
    pub value: String,
}
impl dav::Named<PropertyName> for DeadProperty {
    fn name(&self) -> PropertyName {
        self.name.clone()
    }
}

impl xml::QRead<PropertyName> for PropertyName {
    async fn qread(xml: &mut xml::Reader<impl xml::IRead>) -> Result<Self, error::ParsingError> {
        if !matches!(xml.peek(), Event::Start(_) | Event::Empty(_)) {
            return Err(error::ParsingError::Recoverable);
        }
        let (ns, local) = xml
            .current_qname()
            .ok_or(error::ParsingError::Recoverable)?;
        xml.open_any().await?;
        xml.close().await?;
        Ok(PropertyName::new(ns.unwrap_or_default(), local))
    }
}
impl xml::QWrite for PropertyName {
    async fn qwrite(&self, xml: &mut xml::Writer<impl xml::IWrite>) -> Result<(), quick_xml::Error> {
        let empty_tag = xml.create_foreign_element(&self.ns, &self.local);
        xml.q.write_event_async(Event::Empty(empty_tag)).await
    }
}

impl xml::QRead<DeadProperty> for DeadProperty {
    async fn qread(xml: &mut xml::Reader<impl xml::IRead>) -> Result<Self, error::ParsingError> {
        let is_empty = match xml.peek() {
            Event::Start(_) => false,
            Event::Empty(_) => true,
            _ => return Err(error::ParsingError::Recoverable),
        };
        let (ns, local) = xml
            .current_qname()
            .ok_or(error::ParsingError::Recoverable)?;
        let ns = ns.unwrap_or_default();

        // An empty DAV: element is a property name, not a value
        if is_empty && ns == xml::DAV_NS {
            return Err(error::ParsingError::Recoverable);
        }

        xml.open_any().await?;
        let value = xml.tag_fragment().await?;
        xml.close().await?;
        Ok(DeadProperty {
            name: PropertyName::new(ns, local),
            value,
        })
    }
}
impl xml::QWrite for DeadProperty {
    async fn qwrite(&self, xml: &mut xml::Writer<impl xml::IWrite>) -> Result<(), quick_xml::Error> {
        let start = xml.create_foreign_element(&self.name.ns, &self.name.local);
        if self.value.is_empty() {
            return xml.q.write_event_async(Event::Empty(start)).await;
        }

        let end = start.to_end().into_owned();
        xml.q.write_event_async(Event::Start(start)).await?;
        xml.q
            .write_event_async(Event::Text(BytesText::from_escaped(self.value.as_str())))
            .await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{QRead, QWrite, Reader, Writer};
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
        std::str::from_utf8(buffer.as_slice()).unwrap().into()
    }

    #[tokio::test]
    async fn dead_property_replays_fragment() {
        let src = r#"<Z:Authors xmlns:Z="urn:z" xmlns:Y="urn:y"><Z:Author role="lead">Jim &amp; co</Z:Author><Y:note><![CDATA[a<b]]></Y:note></Z:Authors>"#;
        let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes()))
            .await
            .unwrap();
        let got = DeadProperty::qread(&mut rdr).await.unwrap();

        assert_eq!(got.name, PropertyName::new("urn:z", "Authors"));
        assert_eq!(
            got.value,
            r#"<Author xmlns="urn:z" role="lead">Jim &amp; co</Author><note xmlns="urn:y">a&lt;b</note>"#
        );

        let out = serialize(&got).await;
        let expected = r#"<Authors xmlns="urn:z" xmlns:D="DAV:"><Author xmlns="urn:z" role="lead">Jim &amp; co</Author><note xmlns="urn:y">a&lt;b</note></Authors>"#;
        assert_eq!(&out, expected, "\n---GOT---\n{out}\n---EXP---\n{expected}\n");
    }

    #[tokio::test]
    async fn empty_dead_property() {
        let src = r#"<color xmlns=""/>"#;
        let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes()))
            .await
            .unwrap();
        let got = DeadProperty::qread(&mut rdr).await.unwrap();
        assert_eq!(
            got,
            DeadProperty {
                name: PropertyName::new("", "color"),
                value: String::new(),
            }
        );
    }

    #[tokio::test]
    async fn dav_empty_element_is_not_a_value() {
        let src = r#"<D:displayname xmlns:D="DAV:"/>"#;
        let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes()))
            .await
            .unwrap();
        assert!(matches!(
            DeadProperty::qread(&mut rdr).await,
            Err(error::ParsingError::Recoverable)
        ));
    }
}

use libfuzzer_sys::arbitrary;
use libfuzzer_sys::arbitrary::Arbitrary;

use dirdav_dav::xml;
use tokio::io::AsyncWriteExt;

const TOKENS: [&str; 52] = [
    "0",
    "1",
    "activelock",
    "allprop",
    "http://ns.example.com/boxschema/",
    "HTTP/1.1 200 OK",
    "HTTP/1.1 423 Locked",
    "1997-12-01T18:27:21-08:00",
    "Mon, 12 Jan 1998 09:25:56 GMT",
    "\"abcdef\"",
    "cannot-modify-protected-property",
    "collection",
    "creationdate",
    "depth",
    "displayname",
    "error",
    "exclusive",
    "getcontentlanguage",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "href",
    "include",
    "Infinite",
    "infinity",
    "location",
    "lockdiscovery",
    "lockentry",
    "lockinfo",
    "lockroot",
    "lockscope",
    "locktoken",
    "lock-token-matches-request-uri",
    "lock-token-submitted",
    "locktype",
    "multistatus",
    "no-conflicting-lock",
    "owner",
    "prop",
    "propertyupdate",
    "propfind",
    "propname",
    "propstat",
    "remove",
    "resourcetype",
    "response",
    "set",
    "shared",
    "status",
    "supportedlock",
    "write",
];

#[derive(Arbitrary)]
pub struct Token(usize);
impl Token {
    fn serialize(&self) -> &'static str {
        TOKENS[self.0 % TOKENS.len()]
    }
}

#[derive(Arbitrary)]
pub struct Tag {
    name: Token,
    attr: Option<(Token, Token)>,
}
impl Tag {
    fn start(&self) -> String {
        match &self.attr {
            Some((k, v)) => format!("D:{} {}=\"{}\"", self.name.serialize(), k.serialize(), v.serialize()),
            None => format!("D:{}", self.name.serialize()),
        }
    }
    fn end(&self) -> String {
        format!("D:{}", self.name.serialize())
    }
}

#[derive(Arbitrary)]
pub enum XmlNode {
    Node(Tag, Vec<Self>),
    Number(u64),
    Text(Token),
}
impl std::fmt::Debug for XmlNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.serialize())
    }
}
impl XmlNode {
    pub fn serialize(&self) -> String {
        match self {
            Self::Node(tag, children) if children.is_empty() => format!("<{}/>", tag.start()),
            Self::Node(tag, children) => format!(
                "<{}>{}</{}>",
                tag.start(),
                children.iter().map(|v| v.serialize()).collect::<String>(),
                tag.end()
            ),
            Self::Number(v) => format!("{}", v),
            Self::Text(v) => v.serialize().to_string(),
        }
    }
}

pub async fn serialize(elem: &impl xml::QWrite) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut tokio_buffer = tokio::io::BufWriter::new(&mut buffer);
    let q = quick_xml::writer::Writer::new_with_indent(&mut tokio_buffer, b' ', 4);
    let ns_to_apply = vec![("xmlns:D".into(), "DAV:".into())];
    let mut writer = xml::Writer { q, ns_to_apply };

    elem.qwrite(&mut writer).await.expect("xml serialization");
    tokio_buffer.flush().await.expect("tokio buffer flush");
    buffer
}

use chrono::{DateTime, FixedOffset, Utc};
use hyper::StatusCode;

use dirdav_dav::realization::{Dead, DeadProperty, PropertyName};
use dirdav_dav::types as dav;
use dirdav_dav::xml::DAV_NS;
use dirdav_store::fs::Metadata;
use dirdav_store::lock::{Lock, LockDepth, LockManager};
use dirdav_store::property::PropertyStore;

/// Live properties returned by an allprop PROPFIND
const ALLPROP: [dav::PropertyRequest<Dead>; 10] = [
    dav::PropertyRequest::CreationDate,
    dav::PropertyRequest::DisplayName,
    dav::PropertyRequest::GetContentLanguage,
    dav::PropertyRequest::GetContentLength,
    dav::PropertyRequest::GetContentType,
    dav::PropertyRequest::GetEtag,
    dav::PropertyRequest::GetLastModified,
    dav::PropertyRequest::LockDiscovery,
    dav::PropertyRequest::ResourceType,
    dav::PropertyRequest::SupportedLock,
];

const DISPLAY_NAME: &str = "displayname";
const CONTENT_LANGUAGE: &str = "getcontentlanguage";

/// Expanded name of any requested property
pub(crate) fn property_name(req: &dav::PropertyRequest<Dead>) -> PropertyName {
    let local = match req {
        dav::PropertyRequest::CreationDate => "creationdate",
        dav::PropertyRequest::DisplayName => DISPLAY_NAME,
        dav::PropertyRequest::GetContentLanguage => CONTENT_LANGUAGE,
        dav::PropertyRequest::GetContentLength => "getcontentlength",
        dav::PropertyRequest::GetContentType => "getcontenttype",
        dav::PropertyRequest::GetEtag => "getetag",
        dav::PropertyRequest::GetLastModified => "getlastmodified",
        dav::PropertyRequest::LockDiscovery => "lockdiscovery",
        dav::PropertyRequest::ResourceType => "resourcetype",
        dav::PropertyRequest::SupportedLock => "supportedlock",
        dav::PropertyRequest::Extension(name) => return name.clone(),
    };
    PropertyName::dav(local)
}

/// The request naming a property, the inverse of `property_name`
pub(crate) fn property_request(name: &PropertyName) -> dav::PropertyRequest<Dead> {
    ALLPROP
        .iter()
        .find(|req| &property_name(req) == name)
        .cloned()
        .unwrap_or_else(|| dav::PropertyRequest::Extension(name.clone()))
}

/// DAV: properties the client may write, they are stored like dead properties
fn is_writable_live(name: &PropertyName) -> bool {
    name.ns == DAV_NS && (name.local == DISPLAY_NAME || name.local == CONTENT_LANGUAGE)
}

pub(crate) fn content_type(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "application/octet-stream",
    };
    match ext.as_str() {
        "txt" | "text" => "text/plain; charset=utf-8",
        "htm" | "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "ics" => "text/calendar; charset=utf-8",
        "vcf" => "text/vcard; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "wasm" => "application/wasm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/vnd.microsoft.icon",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

fn fixed(date: DateTime<Utc>) -> DateTime<FixedOffset> {
    date.fixed_offset()
}

pub(crate) fn active_lock(lock: &Lock, now_msec: u64) -> dav::ActiveLock {
    dav::ActiveLock {
        lockscope: lock.scope,
        locktype: dav::LockType::Write,
        depth: match lock.depth {
            LockDepth::Zero => dav::Depth::Zero,
            LockDepth::Infinity => dav::Depth::Infinity,
        },
        owner: lock.owner.clone(),
        timeout: Some(match lock.remaining_secs(now_msec) {
            None => dav::Timeout::Infinite,
            Some(secs) => dav::Timeout::Seconds(u32::try_from(secs).unwrap_or(u32::MAX)),
        }),
        locktoken: Some(dav::LockToken(dav::Href(lock.token.clone()))),
        lockroot: dav::LockRoot(dav::Href(lock.root.href(false))),
    }
}

fn supported_lock() -> Vec<dav::LockEntry> {
    vec![
        dav::LockEntry {
            lockscope: dav::LockScope::Exclusive,
            locktype: dav::LockType::Write,
        },
        dav::LockEntry {
            lockscope: dav::LockScope::Shared,
            locktype: dav::LockType::Write,
        },
    ]
}

/// A filesystem resource seen through its WebDAV properties
pub(crate) struct DavNode<'a> {
    pub meta: Metadata,
    pub props: &'a PropertyStore,
    pub locks: &'a LockManager,
}

impl<'a> DavNode<'a> {
    /// Live properties this resource has a value for
    fn supported_properties(&self) -> Vec<dav::PropertyRequest<Dead>> {
        ALLPROP
            .iter()
            .filter(|req| self.property(req).is_some())
            .cloned()
            .collect()
    }

    fn dead_properties(&self) -> Vec<(PropertyName, String)> {
        self.props
            .all(&self.meta.path)
            .into_iter()
            .filter(|(name, _)| !is_writable_live(name))
            .collect()
    }

    /// Value of a property, `None` when the resource does not have it
    pub fn property(&self, req: &dav::PropertyRequest<Dead>) -> Option<dav::Property<Dead>> {
        let meta = &self.meta;
        let stored = |local: &str| self.props.get(&meta.path, &PropertyName::dav(local));
        match req {
            dav::PropertyRequest::CreationDate => Some(dav::Property::CreationDate(fixed(meta.created))),
            dav::PropertyRequest::DisplayName => Some(dav::Property::DisplayName(
                stored(DISPLAY_NAME).unwrap_or_else(|| match meta.path.is_root() {
                    true => "/".into(),
                    false => meta.path.name().to_string(),
                }),
            )),
            dav::PropertyRequest::GetContentLanguage => {
                stored(CONTENT_LANGUAGE).map(dav::Property::GetContentLanguage)
            }
            dav::PropertyRequest::GetContentLength if !meta.is_collection => {
                Some(dav::Property::GetContentLength(meta.len))
            }
            dav::PropertyRequest::GetContentType if !meta.is_collection => Some(
                dav::Property::GetContentType(content_type(meta.path.name()).into()),
            ),
            dav::PropertyRequest::GetContentLength | dav::PropertyRequest::GetContentType => None,
            dav::PropertyRequest::GetEtag => Some(dav::Property::GetEtag(meta.etag.clone())),
            dav::PropertyRequest::GetLastModified => {
                Some(dav::Property::GetLastModified(fixed(meta.modified)))
            }
            dav::PropertyRequest::LockDiscovery => {
                let now = self.locks.now_msec();
                Some(dav::Property::LockDiscovery(
                    self.locks
                        .query(&meta.path)
                        .iter()
                        .map(|l| active_lock(l, now))
                        .collect(),
                ))
            }
            dav::PropertyRequest::ResourceType => Some(dav::Property::ResourceType(
                match meta.is_collection {
                    true => vec![dav::ResourceType::Collection],
                    false => vec![],
                },
            )),
            dav::PropertyRequest::SupportedLock => Some(dav::Property::SupportedLock(supported_lock())),
            dav::PropertyRequest::Extension(name) if is_writable_live(name) => None,
            dav::PropertyRequest::Extension(name) => {
                self.props.get(&meta.path, name).map(|value| {
                    dav::Property::Extension(DeadProperty {
                        name: name.clone(),
                        value,
                    })
                })
            }
        }
    }

    fn properties(&self, reqs: &[dav::PropertyRequest<Dead>]) -> Vec<dav::AnyProperty<Dead>> {
        reqs.iter()
            .map(|req| match self.property(req) {
                Some(value) => dav::AnyProperty::Value(value),
                None => dav::AnyProperty::Request(req.clone()),
            })
            .collect()
    }

    fn wrap(&self, propstats: Vec<dav::PropStat<Dead>>) -> dav::Response<Dead> {
        dav::Response {
            status_or_propstat: dav::StatusOrPropstat::PropStat(
                dav::Href(self.meta.href()),
                propstats,
            ),
            error: None,
            location: None,
            responsedescription: None,
        }
    }

    /// Utility function to get a propname response from a node
    pub fn response_propname(&self) -> dav::Response<Dead> {
        let mut names: Vec<dav::AnyProperty<Dead>> = self
            .supported_properties()
            .into_iter()
            .map(dav::AnyProperty::Request)
            .collect();
        names.extend(
            self.dead_properties()
                .into_iter()
                .map(|(name, _)| dav::AnyProperty::Request(dav::PropertyRequest::Extension(name))),
        );

        self.wrap(vec![dav::PropStat {
            status: dav::Status(StatusCode::OK),
            prop: dav::AnyProp(names),
            error: None,
            responsedescription: None,
        }])
    }

    /// Every live property with a value, every dead property, plus the
    /// properties named in an `include`
    pub fn response_allprop(&self, include: Option<&dav::Include<Dead>>) -> dav::Response<Dead> {
        let mut reqs = self.supported_properties();
        for extra in include.iter().flat_map(|i| i.0.iter()) {
            let is_dead = matches!(extra, dav::PropertyRequest::Extension(name) if !is_writable_live(name));
            if !reqs.contains(extra) && !is_dead {
                reqs.push(extra.clone());
            }
        }
        let mut found = self.properties(&reqs);
        found.extend(self.dead_properties().into_iter().map(|(name, value)| {
            dav::AnyProperty::Value(dav::Property::Extension(DeadProperty { name, value }))
        }));
        self.split(found)
    }

    /// Utility function to get a prop response from a node & a list of propname
    pub fn response_props(&self, props: &dav::PropName<Dead>) -> dav::Response<Dead> {
        self.split(self.properties(&props.0))
    }

    fn split(&self, values: Vec<dav::AnyProperty<Dead>>) -> dav::Response<Dead> {
        let mut prop_desc = vec![];
        let (found, not_found): (Vec<_>, Vec<_>) = values
            .into_iter()
            .partition(|v| matches!(v, dav::AnyProperty::Value(_)));

        // If at least one property has been found on this object, adding a HTTP 200 propstat to
        // the response
        if !found.is_empty() {
            prop_desc.push(dav::PropStat {
                status: dav::Status(StatusCode::OK),
                prop: dav::AnyProp(found),
                error: None,
                responsedescription: None,
            });
        }

        // If at least one property can't be found on this object, adding a HTTP 404 propstat to
        // the response
        if !not_found.is_empty() {
            prop_desc.push(dav::PropStat {
                status: dav::Status(StatusCode::NOT_FOUND),
                prop: dav::AnyProp(not_found),
                error: None,
                responsedescription: None,
            });
        }

        self.wrap(prop_desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dirdav_store::clock::ManualClock;
    use dirdav_store::DavPath;

    fn meta(path: &str, is_collection: bool) -> Metadata {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Metadata {
            path: DavPath::parse(path).unwrap(),
            is_collection,
            is_symlink: false,
            len: 42,
            modified: at,
            created: at,
            etag: "\"1-2a-3\"".into(),
        }
    }

    fn statuses(resp: &dav::Response<Dead>) -> Vec<(StatusCode, usize)> {
        match &resp.status_or_propstat {
            dav::StatusOrPropstat::PropStat(_, ps) => {
                ps.iter().map(|p| (p.status.0, p.prop.0.len())).collect()
            }
            _ => vec![],
        }
    }

    #[test]
    fn names_round_trip() {
        for req in ALLPROP.iter() {
            assert_eq!(&property_request(&property_name(req)), req);
        }
        let custom = PropertyName::new("urn:x", "color");
        assert_eq!(
            property_request(&custom),
            dav::PropertyRequest::Extension(custom)
        );
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type("notes.TXT"), "text/plain; charset=utf-8");
        assert_eq!(content_type("archive.tar.gz"), "application/gzip");
        assert_eq!(content_type("README"), "application/octet-stream");
    }

    #[test]
    fn collection_and_file_properties() {
        let props = PropertyStore::default();
        let locks = LockManager::new(Arc::new(ManualClock::new(0)));

        let dir = DavNode {
            meta: meta("/docs", true),
            props: &props,
            locks: &locks,
        };
        assert!(dir.property(&dav::PropertyRequest::GetContentLength).is_none());
        assert_eq!(
            dir.property(&dav::PropertyRequest::ResourceType),
            Some(dav::Property::ResourceType(vec![dav::ResourceType::Collection]))
        );
        assert_eq!(
            dir.property(&dav::PropertyRequest::DisplayName),
            Some(dav::Property::DisplayName("docs".into()))
        );

        let file = DavNode {
            meta: meta("/docs/a.txt", false),
            props: &props,
            locks: &locks,
        };
        assert_eq!(
            file.property(&dav::PropertyRequest::GetContentLength),
            Some(dav::Property::GetContentLength(42))
        );
        assert_eq!(
            file.property(&dav::PropertyRequest::GetContentType),
            Some(dav::Property::GetContentType("text/plain; charset=utf-8".into()))
        );
    }

    #[test]
    fn stored_properties_show_up() {
        let props = PropertyStore::default();
        let locks = LockManager::new(Arc::new(ManualClock::new(0)));
        let path = DavPath::parse("/a.txt").unwrap();
        props.set(&path, PropertyName::dav(DISPLAY_NAME), "Alpha".into());
        props.set(&path, PropertyName::new("urn:x", "color"), "red".into());

        let node = DavNode {
            meta: meta("/a.txt", false),
            props: &props,
            locks: &locks,
        };
        assert_eq!(
            node.property(&dav::PropertyRequest::DisplayName),
            Some(dav::Property::DisplayName("Alpha".into()))
        );

        // 9 live properties (no content language) and one dead property
        assert_eq!(statuses(&node.response_allprop(None)), vec![(StatusCode::OK, 10)]);
        assert_eq!(statuses(&node.response_propname()), vec![(StatusCode::OK, 10)]);

        let wanted = dav::PropName(vec![
            dav::PropertyRequest::GetEtag,
            dav::PropertyRequest::GetContentLanguage,
            dav::PropertyRequest::Extension(PropertyName::new("urn:x", "color")),
            dav::PropertyRequest::Extension(PropertyName::new("urn:x", "size")),
        ]);
        assert_eq!(
            statuses(&node.response_props(&wanted)),
            vec![(StatusCode::OK, 2), (StatusCode::NOT_FOUND, 2)]
        );
    }
}

#![no_main]

use libfuzzer_sys::fuzz_target;
use quick_xml::reader::NsReader;
use tokio::runtime::Runtime;

use dirdav_dav::realization::Dead;
use dirdav_dav::{types, xml};

mod common;
use common::XmlNode;

/// Decoders may refuse a client body, never panic on it
async fn decode<T: xml::Node<T>>(doc: String) {
    let mut rdr = match xml::Reader::new(NsReader::from_reader(doc.as_bytes())).await {
        Err(_) => return,
        Ok(r) => r,
    };
    let _ = rdr.find::<T>().await;
}

fuzz_target!(|nodes: XmlNode| {
    let body = nodes.serialize();

    let rt = Runtime::new().expect("tokio runtime initialization");
    rt.block_on(async {
        decode::<types::PropFind<Dead>>(format!(
            "<D:propfind xmlns:D=\"DAV:\">{}</D:propfind>",
            body
        ))
        .await;
        decode::<types::PropertyUpdate<Dead>>(format!(
            "<D:propertyupdate xmlns:D=\"DAV:\">{}</D:propertyupdate>",
            body
        ))
        .await;
        decode::<types::LockInfo>(format!(
            "<D:lockinfo xmlns:D=\"DAV:\">{}</D:lockinfo>",
            body
        ))
        .await;
    })
});

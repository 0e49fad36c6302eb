#![no_main]

use libfuzzer_sys::fuzz_target;
use quick_xml::reader::NsReader;
use tokio::runtime::Runtime;

use dirdav_dav::{realization, types, xml};

mod common;
use common::{serialize, XmlNode};

type Object = types::Multistatus<realization::Core>;

fuzz_target!(|nodes: XmlNode| {
    let gen = format!(
        "<D:multistatus xmlns:D=\"DAV:\">{}</D:multistatus>",
        nodes.serialize()
    );
    let data = gen.as_bytes();

    let rt = Runtime::new().expect("tokio runtime initialization");
    rt.block_on(async {
        // Only inputs the decoder accepts are interesting
        let mut rdr = match xml::Reader::new(NsReader::from_reader(data)).await {
            Err(_) => return,
            Ok(r) => r,
        };
        let reference = match rdr.find::<Object>().await {
            Err(_) => return,
            Ok(m) => m,
        };

        // Our own output must decode to the same value
        let my_serialization = serialize(&reference).await;
        let mut rdr2 = xml::Reader::new(NsReader::from_reader(my_serialization.as_slice()))
            .await
            .expect("XML Reader init");
        let comparison = rdr2.find::<Object>().await.expect("Deserialize again");

        assert_eq!(reference, comparison);
    })
});

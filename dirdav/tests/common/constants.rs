use std::time;

pub static SMALL_DELAY: time::Duration = time::Duration::from_millis(200);

pub static LOCKINFO: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>http://example.org/~ejw/contact.html</D:href></D:owner>
</D:lockinfo>"#;

pub static PROPPATCH_SET: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propertyupdate xmlns:D="DAV:" xmlns:Z="http://ns.example.com/z/">
  <D:set>
    <D:prop><Z:color>blue</Z:color></D:prop>
  </D:set>
</D:propertyupdate>"#;

pub static PROPPATCH_REMOVE: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propertyupdate xmlns:D="DAV:" xmlns:Z="http://ns.example.com/z/">
  <D:remove>
    <D:prop><Z:color/></D:prop>
  </D:remove>
</D:propertyupdate>"#;

pub static PROPFIND_COLOR: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:" xmlns:Z="http://ns.example.com/z/">
  <D:prop><Z:color/><D:displayname/></D:prop>
</D:propfind>"#;

pub static PROPNAME: &str = r#"<?xml version="1.0" encoding="utf-8" ?><propfind xmlns="DAV:"><propname/></propfind>"#;

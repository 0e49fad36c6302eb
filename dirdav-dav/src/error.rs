use quick_xml::events::attributes::AttrError;

#[derive(Debug, thiserror::Error)]
pub enum ParsingError {
    /// The element under the cursor is not the one we are looking for,
    /// the caller may try another decoder on it.
    #[error("Recoverable")]
    Recoverable,
    #[error("Missing child")]
    MissingChild,
    #[error("Missing attribute")]
    MissingAttribute,
    #[error("Wrong token")]
    WrongToken,
    #[error("Tag not found")]
    TagNotFound,
    #[error("Invalid value")]
    InvalidValue,
    #[error("Utf8 Error")]
    Utf8Error(#[from] std::str::Utf8Error),
    #[error("Quick XML error")]
    QuickXml(#[from] quick_xml::Error),
    #[error("Chrono error")]
    Chrono(#[from] chrono::format::ParseError),
    #[error("Number parsing error")]
    Int(#[from] std::num::ParseIntError),
    #[error("Found EOF while expecting data")]
    Eof,
}
impl From<AttrError> for ParsingError {
    fn from(value: AttrError) -> Self {
        Self::QuickXml(value.into())
    }
}

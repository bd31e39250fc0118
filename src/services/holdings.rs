//! Holdings file decoding.
//!
//! Holdings files are XML documents with a sequence of `holding` elements:
//!
//! ```text
//! <holding ezb_id="1">
//!   <title>..</title>
//!   <publishers>..</publishers>
//!   <EZBIssns><p-issn>..</p-issn><e-issn>..</e-issn></EZBIssns>
//!   <entitlements>
//!     <entitlement status="subscribed">
//!       <url>..</url><anchor>..</anchor>
//!       <begin><year/><volume/><issue/><delay/></begin>
//!       <end><year/><volume/><issue/><delay/></end>
//!     </entitlement>
//!   </entitlements>
//! </holding>
//! ```
//!
//! The document is streamed; each `holding` is decoded on its own.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::HoldingsError;
use crate::models::{Entitlement, Holding, IssnHolding, License, Licenses};

/// Streaming decoder yielding one `Holding` at a time.
///
/// Stops after the first malformed element; everything before it is kept.
pub struct HoldingsReader<R: BufRead> {
    reader: Reader<R>,
    done: bool,
}

impl<R: BufRead> HoldingsReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            done: false,
        }
    }

    /// Advance to the next `holding` element and decode it.
    fn next_holding(&mut self) -> Result<Option<Holding>, HoldingsError> {
        let mut buf = Vec::new();
        loop {
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"holding" => {
                    let ezb_id = attribute(&e, b"ezb_id").and_then(|v| v.parse().ok());
                    return self.decode_holding(ezb_id).map(Some);
                }
                Ok(Event::Eof) => return Ok(None),
                Err(e) => return Err(self.xml_error(e)),
                _ => {}
            }
            buf.clear();
        }
    }

    /// Decode the body of a `holding`, up to and including its end tag.
    fn decode_holding(&mut self, ezb_id: Option<u64>) -> Result<Holding, HoldingsError> {
        let mut holding = Holding {
            ezb_id,
            ..Holding::default()
        };
        let mut buf = Vec::new();
        // Element names below <holding>
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut text = String::new();
        let mut entitlement: Option<Entitlement> = None;

        loop {
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let name = e.local_name().as_ref().to_vec();
                    if name == b"entitlement" {
                        entitlement = Some(new_entitlement(&e));
                    }
                    path.push(name);
                    text.clear();
                }
                Ok(Event::Empty(e)) => {
                    if e.local_name().as_ref() == b"entitlement" {
                        holding.entitlements.push(new_entitlement(&e));
                    }
                }
                Ok(Event::Text(e)) => text.push_str(&String::from_utf8_lossy(&e)),
                Ok(Event::CData(e)) => text.push_str(&String::from_utf8_lossy(&e)),
                Ok(Event::GeneralRef(e)) => {
                    let name = String::from_utf8_lossy(&e);
                    match resolve_entity(&name) {
                        Some(c) => text.push(c),
                        None => text.push_str(&format!("&{name};")),
                    }
                }
                Ok(Event::End(_)) => {
                    let Some(name) = path.pop() else {
                        return Ok(holding);
                    };
                    let value = text.trim().to_string();
                    text.clear();
                    let parent = path.last().map(Vec::as_slice);

                    match (parent, name.as_slice()) {
                        (None, b"title") => holding.title = value,
                        (None, b"publishers") => holding.publishers = value,
                        (Some(b"EZBIssns"), b"p-issn") => holding.print_issns.push(value),
                        (Some(b"EZBIssns"), b"e-issn") => holding.electronic_issns.push(value),
                        (_, b"entitlement") => {
                            if let Some(done) = entitlement.take() {
                                holding.entitlements.push(done);
                            }
                        }
                        (Some(parent), field) => {
                            if let Some(current) = entitlement.as_mut() {
                                assign_field(current, parent, field, value);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => {
                    return Err(HoldingsError::Xml(format!(
                        "document ends inside holding {:?}",
                        holding.title
                    )));
                }
                Err(e) => return Err(self.xml_error(e)),
                _ => {}
            }
            buf.clear();
        }
    }

    fn xml_error(&self, e: quick_xml::Error) -> HoldingsError {
        HoldingsError::Xml(format!(
            "at byte {}: {}",
            self.reader.buffer_position(),
            e
        ))
    }
}

impl<R: BufRead> Iterator for HoldingsReader<R> {
    type Item = Result<Holding, HoldingsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_holding() {
            Ok(Some(holding)) => Some(Ok(holding)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).trim().to_string())
}

fn new_entitlement(e: &BytesStart<'_>) -> Entitlement {
    Entitlement {
        status: attribute(e, b"status").unwrap_or_default(),
        ..Entitlement::default()
    }
}

fn assign_field(entitlement: &mut Entitlement, parent: &[u8], field: &[u8], value: String) {
    let slot = match (parent, field) {
        (b"entitlement", b"url") => &mut entitlement.url,
        (b"entitlement", b"anchor") => &mut entitlement.anchor,
        (b"begin", b"year") => &mut entitlement.from_year,
        (b"begin", b"volume") => &mut entitlement.from_volume,
        (b"begin", b"issue") => &mut entitlement.from_issue,
        (b"begin", b"delay") => &mut entitlement.from_delay,
        (b"end", b"year") => &mut entitlement.to_year,
        (b"end", b"volume") => &mut entitlement.to_volume,
        (b"end", b"issue") => &mut entitlement.to_issue,
        (b"end", b"delay") => &mut entitlement.to_delay,
        _ => return,
    };
    *slot = value;
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Index holdings by ISSN.
///
/// Each holding is registered under every e-ISSN and print ISSN it lists,
/// trimmed. Values that are not canonical ISSNs are dropped silently; a
/// later holding for the same ISSN replaces an earlier one. Decoding stops
/// at the first malformed element.
pub fn holdings_map(reader: impl BufRead) -> IssnHolding {
    let mut map = IssnHolding::new();
    for item in HoldingsReader::new(reader) {
        let holding = match item {
            Ok(holding) => holding,
            Err(e) => {
                log::warn!("Stopped reading holdings: {}", e);
                break;
            }
        };
        let issns: Vec<String> = holding.valid_issns().map(str::to_string).collect();
        for issn in issns {
            map.insert(issn, holding.clone());
        }
    }
    map
}

/// Collect licenses per ISSN.
///
/// Broken entitlements are reported and skipped; parsing goes on with the
/// next one. Malformed ISSNs are dropped silently, as in `holdings_map`.
pub fn parse_holdings(reader: impl BufRead) -> (Licenses, Vec<HoldingsError>) {
    let mut licenses = Licenses::new();
    let mut errors = Vec::new();

    for item in HoldingsReader::new(reader) {
        let holding = match item {
            Ok(holding) => holding,
            Err(e) => {
                errors.push(e);
                break;
            }
        };
        for entitlement in &holding.entitlements {
            for issn in holding.valid_issns() {
                match License::new(issn, entitlement.clone(), &holding.title) {
                    Ok(license) => {
                        licenses.add(license);
                    }
                    Err(e) => {
                        errors.push(e);
                        // Same entitlement fails the same way for every ISSN
                        break;
                    }
                }
            }
        }
    }

    (licenses, errors)
}

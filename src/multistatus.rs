//! Merging of PROPFIND `multistatus` documents.
//!
//! A [`Multistatus`] collects `<D:response>` elements from any number of
//! multistatus documents. Each response is keyed by the text of its
//! `<D:href>` child, trimmed of surrounding whitespace and otherwise used
//! as-is: no percent-decoding, no trailing-slash or case folding. The first
//! response seen for an href is kept, later ones are dropped.
//!
//! Documents are read with a streaming parser. Elements are matched on
//! namespace and local name, so the prefix the backend happens to use does
//! not matter. Every kept response is re-serialized as a standalone
//! fragment that carries its own namespace declarations.

use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::io::{self, Write};

use bytes::Bytes;
use xml::name::OwnedName;
use xml::reader::{EventReader, ParserConfig, XmlEvent};
use xml::writer::{EmitterConfig, EventWriter};

use crate::util::MemBuffer;

const DAV_NS: &str = "DAV:";

/// Failure to read a multistatus document, or to re-serialize one of its
/// responses.
#[derive(Debug)]
pub enum MultistatusError {
    Read(xml::reader::Error),
    Write(xml::writer::Error),
}

impl Error for MultistatusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MultistatusError::Read(e) => Some(e),
            MultistatusError::Write(e) => Some(e),
        }
    }
}

impl fmt::Display for MultistatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultistatusError::Read(e) => write!(f, "XML parse error: {e}"),
            MultistatusError::Write(e) => write!(f, "XML write error: {e}"),
        }
    }
}

impl From<xml::reader::Error> for MultistatusError {
    fn from(e: xml::reader::Error) -> Self {
        MultistatusError::Read(e)
    }
}

impl From<xml::writer::Error> for MultistatusError {
    fn from(e: xml::writer::Error) -> Self {
        MultistatusError::Write(e)
    }
}

/// Ordered, deduplicated set of `response` fragments.
#[derive(Debug, Default)]
pub struct Multistatus {
    seen: HashSet<String>,
    items: Vec<(String, Bytes)>,
}

// One <D:response> being copied out of the source document.
struct Fragment {
    writer: EventWriter<MemBuffer>,
    href: Option<String>,
    // Some while inside the first <D:href> child.
    href_text: Option<String>,
}

impl Fragment {
    fn new() -> Fragment {
        let writer = EmitterConfig::new()
            .write_document_declaration(false)
            .perform_indent(false)
            .normalize_empty_elements(false)
            .create_writer(MemBuffer::new());
        Fragment {
            writer,
            href: None,
            href_text: None,
        }
    }

    fn finish(self) -> Option<(String, Bytes)> {
        let href = self.href?;
        let mut buf = self.writer.into_inner();
        Some((href, buf.take()))
    }
}

fn is_dav(name: &OwnedName, local_name: &str) -> bool {
    name.namespace.as_deref() == Some(DAV_NS) && name.local_name == local_name
}

impl Multistatus {
    pub fn new() -> Multistatus {
        Multistatus::default()
    }

    /// Add the responses of one multistatus document.
    ///
    /// Responses without an href are skipped. If the document cannot be
    /// parsed nothing is added at all. Returns the number of responses that
    /// were new.
    pub fn append(&mut self, data: &[u8]) -> Result<usize, MultistatusError> {
        let parsed = parse(data)?;
        let mut added = 0;
        for (href, fragment) in parsed {
            if self.seen.insert(href.clone()) {
                self.items.push((href, fragment));
                added += 1;
            }
        }
        Ok(added)
    }

    /// The hrefs collected so far, in insertion order.
    pub fn hrefs(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(href, _)| href.as_str())
    }

    /// Number of responses.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Write the merged document.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
        w.write_all(b"<D:multistatus xmlns:D=\"DAV:\">")?;
        for (_, fragment) in &self.items {
            w.write_all(fragment)?;
        }
        w.write_all(b"</D:multistatus>")
    }

    /// The merged document as a single buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = MemBuffer::new();
        // writing to memory does not fail.
        let _ = self.write_to(&mut buf);
        buf.take()
    }
}

// Collect (href, fragment) for every response that is a direct child
// of a DAV: multistatus root element.
fn parse(data: &[u8]) -> Result<Vec<(String, Bytes)>, MultistatusError> {
    let reader = EventReader::new_with_config(
        data,
        ParserConfig::new()
            .trim_whitespace(false)
            .cdata_to_characters(true)
            .ignore_comments(true),
    );

    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_multistatus = false;
    let mut fragment: Option<Fragment> = None;

    for event in reader {
        let event = event?;
        match &event {
            XmlEvent::StartElement { name, .. } => {
                depth += 1;
                if depth == 1 {
                    in_multistatus = is_dav(name, "multistatus");
                } else if depth == 2 && in_multistatus && is_dav(name, "response") {
                    fragment = Some(Fragment::new());
                }
                if let Some(frag) = fragment.as_mut() {
                    if depth == 3 && frag.href.is_none() && is_dav(name, "href") {
                        frag.href_text = Some(String::new());
                    }
                }
            }
            XmlEvent::Characters(text) | XmlEvent::Whitespace(text) => {
                if let Some(acc) = fragment.as_mut().and_then(|f| f.href_text.as_mut()) {
                    acc.push_str(text);
                }
            }
            _ => {}
        }

        if let Some(frag) = fragment.as_mut() {
            if let Some(ev) = event.as_writer_event() {
                frag.writer.write(ev)?;
            }
        }

        if let XmlEvent::EndElement { .. } = &event {
            if depth == 3 {
                if let Some(frag) = fragment.as_mut() {
                    if let Some(text) = frag.href_text.take() {
                        frag.href = Some(text.trim().to_string());
                    }
                }
            }
            if depth == 2 {
                if let Some((href, bytes)) = fragment.take().and_then(Fragment::finish) {
                    out.push((href, bytes));
                }
            }
            depth = depth.saturating_sub(1);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(responses: &[(&str, &str)]) -> String {
        let mut s = String::from(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:multistatus xmlns:D=\"DAV:\">\n",
        );
        for (href, len) in responses {
            s.push_str(&format!(
                "  <D:response>\n    <D:href>{href}</D:href>\n    <D:propstat><D:prop>\
                 <D:getcontentlength>{len}</D:getcontentlength></D:prop>\
                 <D:status>HTTP/1.1 200 OK</D:status></D:propstat>\n  </D:response>\n"
            ));
        }
        s.push_str("</D:multistatus>\n");
        s
    }

    fn output(ms: &Multistatus) -> String {
        String::from_utf8(ms.to_bytes().to_vec()).unwrap()
    }

    #[test]
    fn append_twice_is_idempotent() {
        let d = doc(&[("/", "0"), ("/a", "1"), ("/b", "2")]);

        let mut once = Multistatus::new();
        assert_eq!(once.append(d.as_bytes()).unwrap(), 3);

        let mut twice = Multistatus::new();
        twice.append(d.as_bytes()).unwrap();
        assert_eq!(twice.append(d.as_bytes()).unwrap(), 0);

        assert_eq!(output(&once), output(&twice));
    }

    #[test]
    fn first_seen_wins() {
        let local = doc(&[("/a", "111")]);
        let next = doc(&[("/a", "222"), ("/b", "333")]);

        let mut ms = Multistatus::new();
        ms.append(local.as_bytes()).unwrap();
        ms.append(next.as_bytes()).unwrap();

        assert_eq!(ms.hrefs().collect::<Vec<_>>(), vec!["/a", "/b"]);
        let out = output(&ms);
        assert!(out.contains(">111<"));
        assert!(!out.contains(">222<"));
        assert!(out.contains(">333<"));
        assert_eq!(out.matches("getcontentlength>").count(), 4);
    }

    #[test]
    fn href_union_does_not_depend_on_order() {
        let one = doc(&[("/a", "1"), ("/c", "3")]);
        let two = doc(&[("/b", "2"), ("/c", "4")]);

        let mut ab = Multistatus::new();
        ab.append(one.as_bytes()).unwrap();
        ab.append(two.as_bytes()).unwrap();
        let mut ba = Multistatus::new();
        ba.append(two.as_bytes()).unwrap();
        ba.append(one.as_bytes()).unwrap();

        let mut x: Vec<_> = ab.hrefs().collect();
        let mut y: Vec<_> = ba.hrefs().collect();
        x.sort();
        y.sort();
        assert_eq!(x, vec!["/a", "/b", "/c"]);
        assert_eq!(x, y);
        assert!(output(&ab).contains(">3<"));
        assert!(output(&ba).contains(">4<"));
    }

    #[test]
    fn href_is_trimmed_but_not_normalized() {
        let d = "<D:multistatus xmlns:D=\"DAV:\">\
            <D:response><D:href>\n   /dir/\n</D:href></D:response>\
            <D:response><D:href>/dir</D:href></D:response>\
            <D:response><D:href>/DIR/</D:href></D:response>\
            <D:response><D:href>/dir/</D:href></D:response>\
            </D:multistatus>";
        let mut ms = Multistatus::new();
        assert_eq!(ms.append(d.as_bytes()).unwrap(), 3);
        assert_eq!(ms.hrefs().collect::<Vec<_>>(), vec!["/dir/", "/dir", "/DIR/"]);
    }

    #[test]
    fn prefix_does_not_matter() {
        let d = "<m:multistatus xmlns:m=\"DAV:\">\
            <m:response><m:href>/x</m:href></m:response>\
            </m:multistatus>";
        let other = "<multistatus xmlns=\"DAV:\">\
            <response><href>/x</href></response>\
            <response><href>/y</href></response>\
            </multistatus>";
        let mut ms = Multistatus::new();
        ms.append(d.as_bytes()).unwrap();
        ms.append(other.as_bytes()).unwrap();
        assert_eq!(ms.hrefs().collect::<Vec<_>>(), vec!["/x", "/y"]);
    }

    #[test]
    fn response_without_href_is_dropped() {
        let d = "<D:multistatus xmlns:D=\"DAV:\">\
            <D:response><D:status>HTTP/1.1 404 Not Found</D:status></D:response>\
            <D:response><D:href>/ok</D:href></D:response>\
            </D:multistatus>";
        let mut ms = Multistatus::new();
        assert_eq!(ms.append(d.as_bytes()).unwrap(), 1);
        assert_eq!(ms.hrefs().collect::<Vec<_>>(), vec!["/ok"]);
    }

    #[test]
    fn nested_href_is_not_the_key() {
        let d = "<D:multistatus xmlns:D=\"DAV:\">\
            <D:response><D:href>/locked</D:href><D:propstat><D:prop><D:lockdiscovery>\
            <D:activelock><D:lockroot><D:href>/other</D:href></D:lockroot></D:activelock>\
            </D:lockdiscovery></D:prop></D:propstat></D:response>\
            <D:response><D:propstat><D:prop><D:lockdiscovery><D:activelock><D:lockroot>\
            <D:href>/deep</D:href></D:lockroot></D:activelock></D:lockdiscovery></D:prop>\
            </D:propstat></D:response>\
            </D:multistatus>";
        let mut ms = Multistatus::new();
        ms.append(d.as_bytes()).unwrap();
        assert_eq!(ms.hrefs().collect::<Vec<_>>(), vec!["/locked"]);
    }

    #[test]
    fn malformed_document_adds_nothing() {
        let d = "<D:multistatus xmlns:D=\"DAV:\">\
            <D:response><D:href>/good</D:href></D:response>\
            <D:response><D:href>/broken</D:href>\
            </D:multistatus>";
        let mut ms = Multistatus::new();
        assert!(ms.append(d.as_bytes()).is_err());
        assert!(ms.is_empty());

        assert!(ms.append(b"not xml at all").is_err());
        assert!(ms.is_empty());
    }

    #[test]
    fn other_root_yields_nothing() {
        let d = "<D:error xmlns:D=\"DAV:\"><D:response><D:href>/a</D:href></D:response></D:error>";
        let mut ms = Multistatus::new();
        assert_eq!(ms.append(d.as_bytes()).unwrap(), 0);
    }

    #[test]
    fn output_is_a_multistatus_document() {
        let mut ms = Multistatus::new();
        ms.append(doc(&[("/a&amp;b", "7")]).as_bytes()).unwrap();
        assert_eq!(ms.hrefs().collect::<Vec<_>>(), vec!["/a&b"]);

        let out = ms.to_bytes();
        let mut again = Multistatus::new();
        assert_eq!(again.append(&out).unwrap(), 1);
        assert_eq!(again.hrefs().collect::<Vec<_>>(), vec!["/a&b"]);

        let out = String::from_utf8(out.to_vec()).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><D:multistatus"));
        assert!(out.ends_with("</D:multistatus>"));
        assert!(out.contains("/a&amp;b"));
    }

    #[test]
    fn empty_merge() {
        let ms = Multistatus::new();
        assert_eq!(
            output(&ms),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><D:multistatus xmlns:D=\"DAV:\"></D:multistatus>"
        );
    }
}

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::Result;

/// A local XMLTV document that can be opened more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedInput {
    path: PathBuf,
    gzip: bool,
}

impl FeedInput {
    /// Treats paths ending in `.gz` as gzip framed.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let gzip = path.to_string_lossy().to_lowercase().ends_with(".gz");
        Self { path, gzip }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a fresh stream positioned at the start of the document.
    pub fn open(&self) -> Result<Box<dyn BufRead>> {
        let file = File::open(&self.path)?;
        if self.gzip {
            Ok(Box::new(BufReader::new(GzDecoder::new(file))))
        } else {
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

/// An opened element together with the document's declared encoding.
pub(crate) struct Element<'a, 'b> {
    start: &'a BytesStart<'b>,
    decoder: Decoder,
}

impl Element<'_, '_> {
    pub fn name(&self) -> &[u8] {
        self.start.name().into_inner()
    }

    /// Decoded and unescaped attribute value, empty when the attribute is absent.
    pub fn attribute(&self, name: &str) -> Result<String> {
        match self.start.try_get_attribute(name)? {
            Some(attr) => Ok(attr.decode_and_unescape_value(self.decoder)?.into_owned()),
            None => Ok(String::new()),
        }
    }
}

/// Callbacks for the element-open / element-close stream.
pub(crate) trait ElementHandler {
    fn open(&mut self, element: &Element<'_, '_>) -> Result<()>;

    /// `text` holds the character data read since the most recent element open.
    fn close(&mut self, name: &[u8], text: &str) -> Result<()>;
}

/// Streams `input` through `handler` without building a tree. Text and
/// attributes are decoded with the encoding named in the XML declaration.
pub(crate) fn stream_elements<R: BufRead, H: ElementHandler>(input: R, handler: &mut H) -> Result<()> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().expand_empty_elements = true;

    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                text.clear();
                handler.open(&Element {
                    start: &start,
                    decoder: reader.decoder(),
                })?;
            }
            Event::Text(content) => text.push_str(&content.unescape()?),
            Event::CData(content) => text.push_str(
                &reader
                    .decoder()
                    .decode(&content)
                    .map_err(quick_xml::Error::from)?,
            ),
            Event::End(end) => handler.close(end.name().into_inner(), &text)?,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    /// Writes `xml` to a file in `dir`, gzip framed when `gzip` is set.
    pub(crate) fn write_feed(dir: &tempfile::TempDir, name: &str, xml: &str, gzip: bool) -> FeedInput {
        let path = dir.path().join(name);
        let file = File::create(&path).unwrap();
        if gzip {
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(xml.as_bytes()).unwrap();
            encoder.finish().unwrap();
        } else {
            let mut file = file;
            file.write_all(xml.as_bytes()).unwrap();
        }
        FeedInput::from_path(path)
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ElementHandler for Recorder {
        fn open(&mut self, element: &Element<'_, '_>) -> Result<()> {
            let name = String::from_utf8_lossy(element.name()).to_string();
            let id = element.attribute("id")?;
            self.events.push(format!("open {} [{}]", name, id));
            Ok(())
        }

        fn close(&mut self, name: &[u8], text: &str) -> Result<()> {
            self.events
                .push(format!("close {} '{}'", String::from_utf8_lossy(name), text.trim()));
            Ok(())
        }
    }

    #[test]
    fn gzip_is_inferred_from_extension() {
        assert!(FeedInput::from_path("/tmp/guide.xml.GZ").gzip);
        assert!(!FeedInput::from_path("/tmp/guide.xml").gzip);
    }

    #[test]
    fn streams_open_text_and_close_events() {
        let xml = r#"<tv><channel id="a&amp;b"><display-name>One &lt;HD&gt;</display-name><icon src="x.png"/></channel><![CDATA[ignored]]></tv>"#;
        let mut recorder = Recorder::default();
        stream_elements(xml.as_bytes(), &mut recorder).unwrap();

        assert_eq!(
            recorder.events,
            vec![
                "open tv []",
                "open channel [a&b]",
                "open display-name []",
                "close display-name 'One <HD>'",
                "open icon []",
                "close icon ''",
                "close channel ''",
                "close tv 'ignored'",
            ]
        );
    }

    #[test]
    fn latin1_declaration_decodes_text_and_attributes() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<tv><channel id=\"espa\xf1a\"><display-name>Canal Espa\xf1a</display-name></channel></tv>";
        let mut recorder = Recorder::default();
        stream_elements(&xml[..], &mut recorder).unwrap();

        assert!(recorder.events.contains(&"open channel [espa\u{f1}a]".to_string()));
        assert!(recorder
            .events
            .contains(&"close display-name 'Canal Espa\u{f1}a'".to_string()));
    }

    #[test]
    fn mismatched_close_is_an_error() {
        let xml = "<tv><channel id=\"a\"></programme></tv>";
        let mut recorder = Recorder::default();
        assert!(stream_elements(xml.as_bytes(), &mut recorder).is_err());
    }

    #[test]
    fn gzip_feed_can_be_opened_twice() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_feed(&dir, "guide.xml.gz", "<tv><channel id=\"a\"/></tv>", true);

        for _ in 0..2 {
            let mut recorder = Recorder::default();
            stream_elements(input.open().unwrap(), &mut recorder).unwrap();
            assert_eq!(recorder.events.len(), 4);
        }
    }
}

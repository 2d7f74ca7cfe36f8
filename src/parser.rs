// XBRL instance parser: contexts and flat facts into an owned Document
use crate::{model::*, Error, Result};
use compact_str::CompactString;
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;
use std::path::Path;

pub struct Parser {
    skip_nil: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self { skip_nil: false }
    }

    /// Drop facts marked `xsi:nil="true"` instead of keeping them with empty text.
    pub fn with_skip_nil(mut self, skip: bool) -> Self {
        self.skip_nil = skip;
        self
    }

    #[cfg(not(feature = "mmap"))]
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Document> {
        let content = std::fs::read(path)?;
        self.parse_bytes(&content)
    }

    #[cfg(feature = "mmap")]
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Document> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        self.parse_bytes(&mmap)
    }

    /// Reads the stream to its end before parsing; the stream must hold a
    /// complete instance.
    pub fn parse_reader<R: Read>(&self, mut reader: R) -> Result<Document> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        self.parse_bytes(&content)
    }

    pub fn parse_bytes(&self, data: &[u8]) -> Result<Document> {
        // Skip BOM if present
        let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

        let text = std::str::from_utf8(data)
            .map_err(|e| Error::Parse(format!("instance is not valid UTF-8: {}", e)))?;
        self.parse_str(text)
    }

    pub fn parse_str(&self, text: &str) -> Result<Document> {
        let mut parser = InstanceParser::new(text);
        parser.skip_nil = self.skip_nil;
        parser.parse()
    }
}

struct InstanceParser<'a> {
    reader: Reader<&'a [u8]>,
    contexts: Vec<Context>,
    facts: Vec<Fact>,
    skip_nil: bool,
}

impl<'a> InstanceParser<'a> {
    fn new(text: &'a str) -> Self {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            contexts: Vec::with_capacity(64),
            facts: Vec::with_capacity(1024),
            skip_nil: false,
        }
    }

    fn parse(mut self) -> Result<Document> {
        loop {
            match self.reader.read_event()? {
                Event::Start(e) => self.parse_element(&e, false)?,
                Event::Empty(e) => self.parse_element(&e, true)?,
                Event::Eof => break,
                _ => {}
            }
        }

        debug!(
            "parsed instance: {} contexts, {} facts",
            self.contexts.len(),
            self.facts.len()
        );
        Ok(Document::from_parts(self.contexts, self.facts))
    }

    fn parse_element(&mut self, start: &BytesStart<'a>, empty: bool) -> Result<()> {
        if start.local_name().as_ref() == b"context" {
            if empty {
                return Ok(());
            }
            if let Some(context) = self.parse_context(start)? {
                self.contexts.push(context);
            }
            return Ok(());
        }

        // Anything carrying a contextRef is a fact; everything else is
        // descended into so facts nested under wrappers are still found.
        let Some(context_ref) = attribute(start, b"contextRef")? else {
            return Ok(());
        };

        let concept = std::str::from_utf8(start.name().as_ref())
            .map(CompactString::from)
            .map_err(|e| Error::Parse(format!("fact name is not UTF-8: {}", e)))?;
        let nil = attribute_local(start, b"nil")?.is_some_and(|v| v == "true");
        let value = if empty {
            String::new()
        } else {
            self.read_text(false)?
        };

        if nil && self.skip_nil {
            return Ok(());
        }

        self.facts.push(Fact {
            concept,
            context_ref,
            unit_ref: attribute(start, b"unitRef")?,
            decimals: attribute(start, b"decimals")?,
            value,
            nil,
        });
        Ok(())
    }

    fn parse_context(&mut self, start: &BytesStart<'a>) -> Result<Option<Context>> {
        let id = attribute(start, b"id")?;

        let mut entity = None;
        let mut period = None;
        let mut scenario = None;

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"entity" => entity = Some(self.parse_entity()?),
                    b"period" => period = self.parse_period()?,
                    b"scenario" => scenario = Some(self.parse_qualifier()?),
                    _ => self.skip_element()?,
                },
                Event::Empty(e) if e.local_name().as_ref() == b"scenario" => {
                    scenario = Some(Qualifier::default());
                }
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("context")),
                _ => {}
            }
        }

        match (id, entity, period) {
            (Some(id), Some(entity), Some(period)) => Ok(Some(Context {
                id,
                entity,
                period,
                scenario,
            })),
            (None, ..) => {
                debug!("skipping context without id");
                Ok(None)
            }
            (Some(id), ..) => {
                debug!("skipping context {} without entity or period", id);
                Ok(None)
            }
        }
    }

    fn parse_entity(&mut self) -> Result<Entity> {
        let mut identifier = CompactString::default();
        let mut scheme = CompactString::default();
        let mut segment = None;

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"identifier" => {
                        scheme = attribute(&e, b"scheme")?.unwrap_or_default();
                        identifier = CompactString::from(self.read_text(false)?.trim());
                    }
                    b"segment" => segment = Some(self.parse_qualifier()?),
                    _ => self.skip_element()?,
                },
                Event::Empty(e) if e.local_name().as_ref() == b"segment" => {
                    segment = Some(Qualifier::default());
                }
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("entity")),
                _ => {}
            }
        }

        Ok(Entity {
            identifier,
            scheme,
            segment,
        })
    }

    fn parse_qualifier(&mut self) -> Result<Qualifier> {
        let mut qualifier = Qualifier::default();

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    let dimension = attribute(&e, b"dimension")?.unwrap_or_default();
                    match e.local_name().as_ref() {
                        b"explicitMember" => {
                            let member = CompactString::from(self.read_text(false)?.trim());
                            qualifier
                                .explicit_members
                                .push(DimensionMember { dimension, member });
                        }
                        b"typedMember" => {
                            let value = self.read_text(true)?.trim().to_string();
                            qualifier.typed_members.push(TypedMember { dimension, value });
                        }
                        _ => self.skip_element()?,
                    }
                }
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("segment")),
                _ => {}
            }
        }

        Ok(qualifier)
    }

    fn parse_period(&mut self) -> Result<Option<Period>> {
        let mut instant = None;
        let mut start_date = None;
        let mut end_date = None;
        let mut forever = false;

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    let slot = match e.local_name().as_ref() {
                        b"instant" => &mut instant,
                        b"startDate" => &mut start_date,
                        b"endDate" => &mut end_date,
                        b"forever" => {
                            forever = true;
                            self.skip_element()?;
                            continue;
                        }
                        _ => {
                            self.skip_element()?;
                            continue;
                        }
                    };
                    *slot = Some(CompactString::from(self.read_text(false)?.trim()));
                }
                Event::Empty(e) if e.local_name().as_ref() == b"forever" => forever = true,
                Event::End(_) => break,
                Event::Eof => return Err(unexpected_eof("period")),
                _ => {}
            }
        }

        Ok(match (instant, start_date, end_date) {
            (Some(date), _, _) => Some(Period::Instant { date }),
            (None, Some(start), Some(end)) => Some(Period::Duration { start, end }),
            _ if forever => Some(Period::Forever),
            _ => None,
        })
    }

    /// Text of the current element up to its end tag. With `deep`, text of
    /// nested elements is included; otherwise only direct text.
    fn read_text(&mut self, deep: bool) -> Result<String> {
        let mut text = String::new();
        let mut depth = 0usize;

        loop {
            match self.reader.read_event()? {
                Event::Start(_) => depth += 1,
                Event::End(_) if depth == 0 => return Ok(text),
                Event::End(_) => depth -= 1,
                Event::Text(t) if depth == 0 || deep => text.push_str(&t.unescape()?),
                Event::CData(c) if depth == 0 || deep => {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
                Event::Eof => return Err(unexpected_eof("element text")),
                _ => {}
            }
        }
    }

    fn skip_element(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.reader.read_event()? {
                Event::Start(_) => depth += 1,
                Event::End(_) if depth == 0 => return Ok(()),
                Event::End(_) => depth -= 1,
                Event::Eof => return Err(unexpected_eof("element")),
                _ => {}
            }
        }
    }
}

fn attribute(start: &BytesStart<'_>, key: &[u8]) -> Result<Option<CompactString>> {
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            return Ok(Some(CompactString::from(attr.unescape_value()?.as_ref())));
        }
    }
    Ok(None)
}

/// Attribute lookup ignoring the namespace prefix (`xsi:nil`, `nil`).
fn attribute_local(start: &BytesStart<'_>, local: &[u8]) -> Result<Option<CompactString>> {
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == local {
            return Ok(Some(CompactString::from(attr.unescape_value()?.as_ref())));
        }
    }
    Ok(None)
}

fn unexpected_eof(within: &str) -> Error {
    Error::Parse(format!("unexpected end of document in {}", within))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:dei="http://xbrl.sec.gov/dei/2023"
            xmlns:us-gaap="http://fasb.org/us-gaap/2023"
            xmlns:xbrldi="http://xbrl.org/2006/xbrldi"
            xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <xbrli:context id="c-1">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier>
    </xbrli:entity>
    <xbrli:period>
      <xbrli:startDate>2022-09-25</xbrli:startDate>
      <xbrli:endDate>2023-09-30</xbrli:endDate>
    </xbrli:period>
  </xbrli:context>
  <xbrli:context id="c-seg">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier>
      <xbrli:segment>
        <xbrldi:explicitMember dimension="us-gaap:StatementClassOfStockAxis">us-gaap:CommonStockMember</xbrldi:explicitMember>
      </xbrli:segment>
    </xbrli:entity>
    <xbrli:period>
      <xbrli:instant>2023-09-30</xbrli:instant>
    </xbrli:period>
  </xbrli:context>
  <xbrli:context id="c-20">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier>
    </xbrli:entity>
    <xbrli:period>
      <xbrli:instant>2023-09-30</xbrli:instant>
    </xbrli:period>
  </xbrli:context>
  <xbrli:context id="c-scn">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier>
    </xbrli:entity>
    <xbrli:period>
      <xbrli:instant>2022-09-24</xbrli:instant>
    </xbrli:period>
    <xbrli:scenario>
      <xbrldi:typedMember dimension="us-gaap:ScenarioAxis"><us-gaap:Forecast>Q1</us-gaap:Forecast></xbrldi:typedMember>
    </xbrli:scenario>
  </xbrli:context>
  <xbrli:unit id="usd">
    <xbrli:measure>iso4217:USD</xbrli:measure>
  </xbrli:unit>
  <dei:EntityCentralIndexKey contextRef="c-1">0000320193</dei:EntityCentralIndexKey>
  <dei:EntityRegistrantName contextRef="c-1">Apple Inc.</dei:EntityRegistrantName>
  <dei:EntityCommonStockSharesOutstanding contextRef="c-seg" unitRef="shares" decimals="INF">15552752000</dei:EntityCommonStockSharesOutstanding>
  <us-gaap:Assets contextRef="c-20" unitRef="usd" decimals="-6">352583000000</us-gaap:Assets>
  <us-gaap:Assets contextRef="c-seg" unitRef="usd" decimals="-6">1</us-gaap:Assets>
  <us-gaap:Liabilities contextRef="c-20" unitRef="usd" decimals="-6">290437000000</us-gaap:Liabilities>
  <us-gaap:Goodwill contextRef="c-20" unitRef="usd" xsi:nil="true"/>
  <us-gaap:CommitmentsAndContingencies contextRef="c-20" unitRef="usd"></us-gaap:CommitmentsAndContingencies>
  <us-gaap:AccountsPayableCurrent contextRef="c-20" unitRef="usd" decimals="-6">62,611</us-gaap:AccountsPayableCurrent>
  <us-gaap:EmployeeCount contextRef="c-20">161000</us-gaap:EmployeeCount>
  <dei:DocumentFiscalYearFocus contextRef="c-1">2023</dei:DocumentFiscalYearFocus>
  <dei:SecurityExchangeName contextRef="c-1">Nasdaq &amp; Co</dei:SecurityExchangeName>
</xbrli:xbrl>
"#;

    #[test]
    fn test_parse_contexts() {
        let doc = Parser::new().parse_str(SAMPLE).unwrap();
        assert_eq!(doc.contexts().len(), 4);

        let duration = doc.context("c-1").unwrap();
        assert!(duration.is_plain());
        assert_eq!(duration.entity.identifier, "0000320193");
        assert_eq!(duration.entity.scheme, "http://www.sec.gov/CIK");
        assert_eq!(
            duration.period,
            Period::Duration {
                start: "2022-09-25".into(),
                end: "2023-09-30".into()
            }
        );

        let seg = doc.context("c-seg").unwrap();
        assert!(!seg.is_plain());
        let segment = seg.entity.segment.as_ref().unwrap();
        assert_eq!(segment.explicit_members[0].member, "us-gaap:CommonStockMember");

        let scn = doc.context("c-scn").unwrap();
        assert!(!scn.is_plain());
        let scenario = scn.scenario.as_ref().unwrap();
        assert_eq!(scenario.typed_members[0].value, "Q1");

        assert_eq!(doc.context("c-20").unwrap().instant(), Some("2023-09-30"));
    }

    #[test]
    fn test_parse_facts() {
        let doc = Parser::new().parse_str(SAMPLE).unwrap();

        let assets = doc.fact("us-gaap:Assets", "c-20").unwrap();
        assert_eq!(assets.value, "352583000000");
        assert_eq!(assets.unit_ref.as_deref(), Some("usd"));
        assert_eq!(assets.decimals.as_deref(), Some("-6"));
        assert_eq!(doc.facts_named("us-gaap:Assets").count(), 2);

        let goodwill = doc.fact("us-gaap:Goodwill", "c-20").unwrap();
        assert!(goodwill.nil);
        assert_eq!(goodwill.value, "");

        let exchange = doc.fact("dei:SecurityExchangeName", "c-1").unwrap();
        assert_eq!(exchange.value, "Nasdaq & Co");

        assert!(doc.fact("us-gaap:Assets", "c-1").is_none());
    }

    #[test]
    fn test_skip_nil() {
        let doc = Parser::new().with_skip_nil(true).parse_str(SAMPLE).unwrap();
        assert!(doc.fact("us-gaap:Goodwill", "c-20").is_none());
    }

    #[test]
    fn test_parse_bytes_with_bom() {
        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice(SAMPLE.as_bytes());
        let doc = Parser::new().parse_bytes(&data).unwrap();
        assert_eq!(doc.contexts().len(), 4);
    }

    #[test]
    fn test_parse_reader() {
        let doc = Parser::new().parse_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.facts().len(), 12);
    }

    #[test]
    fn test_cdata_fact() {
        let xml = r#"<xbrl><context id="c"><entity><identifier scheme="s">1</identifier></entity><period><forever/></period></context>
<dei:Note contextRef="c"><![CDATA[a < b]]></dei:Note></xbrl>"#;
        let doc = Parser::new().parse_str(xml).unwrap();
        assert_eq!(doc.context("c").unwrap().period, Period::Forever);
        assert_eq!(doc.fact("dei:Note", "c").unwrap().value, "a < b");
    }

    #[test]
    fn test_incomplete_contexts_are_skipped() {
        let xml = r#"<xbrl>
<context><entity><identifier scheme="s">1</identifier></entity><period><instant>2023-09-30</instant></period></context>
<context id="no-period"><entity><identifier scheme="s">1</identifier></entity></context>
<context id="ok"><entity><identifier scheme="s">1</identifier></entity><period><instant>2023-09-30</instant></period></context>
<a:X contextRef="ok">7</a:X>
</xbrl>"#;
        let doc = Parser::new().parse_str(xml).unwrap();
        assert_eq!(doc.contexts().len(), 1);
        assert_eq!(doc.contexts()[0].id, "ok");
        assert_eq!(doc.fact("a:X", "ok").unwrap().value, "7");
    }

    #[test]
    fn test_rejects_malformed_xml() {
        let err = Parser::new()
            .parse_str("<xbrl><a contextRef=\"c\">1</b></xbrl>")
            .unwrap_err();
        assert!(matches!(err, Error::Xml(_)), "{err}");
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let err = Parser::new().parse_bytes(&[b'<', 0xFF, b'>']).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}

// SEC EDGAR endpoints: index downloads, XBRL APIs and instance discovery
use crate::{AccessionNumber, Cik, Client, Error, Result};
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::fmt;
use std::io::Write;

pub const ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar";
pub const DATA_URL: &str = "https://data.sec.gov";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Quarter::Q1),
            2 => Some(Quarter::Q2),
            3 => Some(Quarter::Q3),
            4 => Some(Quarter::Q4),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        self as u8 + 1
    }
}

/// Archive directory name, `QTR1`..`QTR4`.
impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QTR{}", self.number())
    }
}

/// Which full-text index to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    /// The index for the quarter in progress.
    Current,
    Quarter { year: i32, quarter: Quarter },
}

impl IndexSource {
    pub fn url(&self) -> String {
        match self {
            IndexSource::Current => format!("{}/full-index/form.idx", ARCHIVES_URL),
            IndexSource::Quarter { year, quarter } => {
                format!("{}/full-index/{}/{}/form.idx", ARCHIVES_URL, year, quarter)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Taxonomy {
    UsGaap,
    Dei,
    IfrsFull,
    Srt,
}

impl Taxonomy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::UsGaap => "us-gaap",
            Taxonomy::Dei => "dei",
            Taxonomy::IfrsFull => "ifrs-full",
            Taxonomy::Srt => "srt",
        }
    }
}

impl fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar period accepted by the frames API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePeriod {
    Annual(i32),
    Quarterly(i32, Quarter),
    /// Balance at the end of the quarter.
    Instant(i32, Quarter),
}

impl fmt::Display for FramePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramePeriod::Annual(year) => write!(f, "CY{}", year),
            FramePeriod::Quarterly(year, q) => write!(f, "CY{}Q{}", year, q.number()),
            FramePeriod::Instant(year, q) => write!(f, "CY{}Q{}I", year, q.number()),
        }
    }
}

pub fn company_concept_url(cik: Cik, taxonomy: Taxonomy, concept: &str) -> String {
    format!(
        "{}/api/xbrl/companyconcept/CIK{}/{}/{}.json",
        DATA_URL, cik, taxonomy, concept
    )
}

pub fn company_facts_url(cik: Cik) -> String {
    format!("{}/api/xbrl/companyfacts/CIK{}.json", DATA_URL, cik)
}

pub fn frame_url(taxonomy: Taxonomy, concept: &str, units: &str, period: FramePeriod) -> String {
    format!(
        "{}/api/xbrl/frames/{}/{}/{}/{}.json",
        DATA_URL, taxonomy, concept, units, period
    )
}

/// Directory holding every document of one filing, with trailing slash.
pub fn filing_base_url(cik: Cik, accession: &AccessionNumber) -> String {
    format!("{}/data/{}/{}/", ARCHIVES_URL, cik, accession.digits())
}

/// Picks the instance document out of a `FilingSummary.xml`.
///
/// The `instance` attribute of the first `MyReports/Report` wins when it
/// names an `.htm` file (inline XBRL, whose extracted instance is
/// `<stem>_htm.xml`). Otherwise the last `.xml` input file that is not a
/// calculation, definition, label or presentation linkbase is used.
pub fn find_instance(summary: &[u8]) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(summary);
    let mut buf = Vec::new();

    let mut in_reports = false;
    let mut in_inputs = false;
    let mut in_file = false;
    let mut first_report_seen = false;
    let mut inline_instance = None;
    let mut input_instance = None;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let is_start = matches!(event, Event::Start(_));
                match e.local_name().as_ref() {
                    b"MyReports" => in_reports = is_start,
                    b"InputFiles" => in_inputs = is_start,
                    b"Report" if in_reports && !first_report_seen => {
                        first_report_seen = true;
                        for attr in e.attributes() {
                            let attr = attr.map_err(quick_xml::Error::from)?;
                            if attr.key.as_ref() == b"instance" {
                                let name = attr.unescape_value()?;
                                if let Some(stem) = name.strip_suffix(".htm") {
                                    inline_instance = Some(format!("{}_htm.xml", stem));
                                }
                            }
                        }
                    }
                    b"File" if in_inputs => in_file = is_start,
                    _ => {}
                }
            }
            Event::Text(t) if in_file => {
                let name = t.unescape()?;
                let name = name.trim();
                if is_instance_file(name) {
                    input_instance = Some(name.to_string());
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"MyReports" => in_reports = false,
                b"InputFiles" => in_inputs = false,
                b"File" => in_file = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(inline_instance.or(input_instance))
}

fn is_instance_file(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".xml") else {
        return false;
    };
    !["_cal", "_def", "_lab", "_pre"]
        .iter()
        .any(|linkbase| stem.ends_with(linkbase))
}

impl Client {
    /// Downloads a full-text index into `writer`.
    pub fn download_index<W: Write + ?Sized>(&self, source: IndexSource, writer: &mut W) -> Result<u64> {
        self.copy_to(&source.url(), writer)
    }

    /// Company Concept API: every fact one filer reported for one concept.
    pub fn company_concept<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        cik: Cik,
        taxonomy: Taxonomy,
        concept: &str,
    ) -> Result<u64> {
        self.copy_to(&company_concept_url(cik, taxonomy, concept), writer)
    }

    /// Company Facts API: every fact one filer reported.
    pub fn company_facts<W: Write + ?Sized>(&self, writer: &mut W, cik: Cik) -> Result<u64> {
        self.copy_to(&company_facts_url(cik), writer)
    }

    /// Frames API: one fact per filer for a concept, unit and period.
    pub fn frame<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        taxonomy: Taxonomy,
        concept: &str,
        units: &str,
        period: FramePeriod,
    ) -> Result<u64> {
        self.copy_to(&frame_url(taxonomy, concept, units, period), writer)
    }

    /// Locates the XBRL instance of a filing through its filing summary.
    /// A 404 here usually means the filing carries no XBRL.
    pub fn instance_url(&self, cik: Cik, accession: &AccessionNumber) -> Result<String> {
        let base = filing_base_url(cik, accession);
        let summary_url = format!("{}FilingSummary.xml", base);

        let mut summary = Vec::new();
        self.copy_to(&summary_url, &mut summary)?;

        let instance = find_instance(&summary)?.ok_or(Error::InstanceNotFound(summary_url))?;
        debug!("instance for {} is {}", accession, instance);
        Ok(base + &instance)
    }

    /// Downloads the XBRL instance of a filing into `writer`, ready for
    /// [`crate::Parser::parse_reader`].
    pub fn download_report<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        cik: Cik,
        accession: &AccessionNumber,
    ) -> Result<u64> {
        let url = self.instance_url(cik, accession)?;
        self.copy_to(&url, writer)
    }
}

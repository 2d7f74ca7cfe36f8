use ahash::AHashMap;
use chrono::NaiveDate;
use compact_str::CompactString;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ============================================================================
// Filing index
// ============================================================================

/// Central Index Key. Rendered with the regulator's 10-digit zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cik(u64);

impl Cik {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Cik {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Cik {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}", self.0)
    }
}

impl FromStr for Cik {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl Serialize for Cik {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

/// Filing kinds kept by the index parser. Everything else is filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FormType {
    #[serde(rename = "10-K")]
    TenK,
    #[serde(rename = "10-Q")]
    TenQ,
}

impl FormType {
    pub const RETAINED: [FormType; 2] = [FormType::TenK, FormType::TenQ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormType::TenK => "10-K",
            FormType::TenQ => "10-Q",
        }
    }

    /// Matches a trimmed form-type column exactly; amendments such as
    /// `10-K/A` are not retained.
    pub fn from_index_field(field: &str) -> Option<Self> {
        Self::RETAINED.into_iter().find(|kind| kind.as_str() == field)
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Regulator-assigned filing identifier, `nnnnnnnnnn-nn-nnnnnn`.
///
/// Stored as its 18 digits; `Display` restores the hyphenated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessionNumber(CompactString);

impl AccessionNumber {
    /// Length of the hyphenated form.
    pub const HYPHENATED_LEN: usize = 20;
    pub const DIGITS_LEN: usize = 18;

    /// Derives the accession number from a filing path such as
    /// `edgar/data/320193/0000320193-23-000106.txt` or
    /// `.../0000320193-23-000106-index.htm`.
    pub fn from_path(path: &str) -> Result<Self, Error> {
        let file = path.rsplit('/').next().unwrap_or(path);
        let stem = match file.rfind('.') {
            Some(dot) => &file[..dot],
            None => file,
        };
        let stem = stem.strip_suffix("-index").unwrap_or(stem);

        if stem.len() < Self::HYPHENATED_LEN || !stem.is_char_boundary(stem.len() - Self::HYPHENATED_LEN) {
            return Err(Error::Accession(path.to_string()));
        }
        stem[stem.len() - Self::HYPHENATED_LEN..]
            .parse()
            .map_err(|_| Error::Accession(path.to_string()))
    }

    pub fn digits(&self) -> &str {
        &self.0
    }

    /// The leading ten digits: the CIK of the submitting agent.
    pub fn filer_prefix(&self) -> &str {
        &self.0[..10]
    }
}

impl FromStr for AccessionNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let valid = match bytes.len() {
            Self::HYPHENATED_LEN => bytes.iter().enumerate().all(|(i, b)| match i {
                10 | 13 => *b == b'-',
                _ => b.is_ascii_digit(),
            }),
            Self::DIGITS_LEN => bytes.iter().all(u8::is_ascii_digit),
            _ => false,
        };
        if !valid {
            return Err(Error::Accession(s.to_string()));
        }

        let digits: CompactString = s.chars().filter(|c| *c != '-').collect();
        Ok(Self(digits))
    }
}

impl fmt::Display for AccessionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", &self.0[..10], &self.0[10..12], &self.0[12..])
    }
}

impl Serialize for AccessionNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One retained line of a full-text index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub form_type: FormType,
    /// Raw fixed-width column, trailing padding included. Columns that are
    /// not valid UTF-8 are read as Latin-1, one character per byte.
    pub company_name: String,
    pub cik: Cik,
    pub date_filed: NaiveDate,
    pub accession_number: AccessionNumber,
}

// ============================================================================
// XBRL instance
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Context {
    pub id: CompactString,
    pub entity: Entity,
    pub period: Period,
    pub scenario: Option<Qualifier>,
}

impl Context {
    /// A context without segment or scenario qualifiers carries the
    /// headline value for its entity and period.
    pub fn is_plain(&self) -> bool {
        self.entity.segment.is_none() && self.scenario.is_none()
    }

    pub fn instant(&self) -> Option<&str> {
        match &self.period {
            Period::Instant { date } => Some(date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub identifier: CompactString,
    pub scheme: CompactString,
    pub segment: Option<Qualifier>,
}

/// Dimensional breakdown carried by a `segment` or `scenario`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Qualifier {
    pub explicit_members: Vec<DimensionMember>,
    pub typed_members: Vec<TypedMember>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionMember {
    pub dimension: CompactString,
    pub member: CompactString,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypedMember {
    pub dimension: CompactString,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Period {
    Instant { date: CompactString },
    Duration { start: CompactString, end: CompactString },
    Forever,
}

#[derive(Debug, Clone, Serialize)]
pub struct Fact {
    /// Qualified name as written in the instance, e.g. `us-gaap:Assets`.
    pub concept: CompactString,
    pub context_ref: CompactString,
    pub unit_ref: Option<CompactString>,
    pub decimals: Option<CompactString>,
    pub value: String,
    pub nil: bool,
}

impl Fact {
    pub fn prefix(&self) -> Option<&str> {
        self.concept.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.concept
            .split_once(':')
            .map_or(self.concept.as_str(), |(_, name)| name)
    }
}

/// Parsed XBRL instance. Built once by [`crate::Parser`]; read-only after.
#[derive(Debug, Clone, Default)]
pub struct Document {
    contexts: Vec<Context>,
    facts: Vec<Fact>,
    context_ids: AHashMap<CompactString, usize>,
    // concept -> contextRef -> first fact in document order
    fact_ids: AHashMap<CompactString, AHashMap<CompactString, usize>>,
}

impl Document {
    pub(crate) fn from_parts(contexts: Vec<Context>, facts: Vec<Fact>) -> Self {
        let mut context_ids = AHashMap::with_capacity(contexts.len());
        for (i, ctx) in contexts.iter().enumerate() {
            context_ids.entry(ctx.id.clone()).or_insert(i);
        }

        let mut fact_ids: AHashMap<CompactString, AHashMap<CompactString, usize>> =
            AHashMap::new();
        for (i, fact) in facts.iter().enumerate() {
            fact_ids
                .entry(fact.concept.clone())
                .or_default()
                .entry(fact.context_ref.clone())
                .or_insert(i);
        }

        Self {
            contexts,
            facts,
            context_ids,
            fact_ids,
        }
    }

    pub fn contexts(&self) -> &[Context] {
        &self.contexts
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn context(&self, id: &str) -> Option<&Context> {
        self.context_ids.get(id).map(|&i| &self.contexts[i])
    }

    /// First fact for `concept` reported against `context_ref`.
    pub fn fact(&self, concept: &str, context_ref: &str) -> Option<&Fact> {
        self.fact_ids
            .get(concept)
            .and_then(|by_context| by_context.get(context_ref))
            .map(|&i| &self.facts[i])
    }

    /// All facts for `concept`, in document order.
    pub fn facts_named<'a>(&'a self, concept: &'a str) -> impl Iterator<Item = &'a Fact> + 'a {
        self.facts.iter().filter(move |f| f.concept == concept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cik_zero_padding() {
        assert_eq!(Cik::new(320193).to_string(), "0000320193");
        assert_eq!("  0000320193 ".parse::<Cik>().unwrap(), Cik::new(320193));
    }

    #[test]
    fn test_accession_from_index_path() {
        let acc = AccessionNumber::from_path("edgar/data/320193/0000320193-23-000106-index.htm")
            .unwrap();
        assert_eq!(acc.digits(), "000032019323000106");
        assert_eq!(acc.to_string(), "0000320193-23-000106");
        assert_eq!(acc.filer_prefix(), "0000320193");
    }

    #[test]
    fn test_accession_from_txt_path() {
        let acc = AccessionNumber::from_path("edgar/data/1000045/0000950170-23-027948.txt").unwrap();
        assert_eq!(acc.digits().len(), AccessionNumber::DIGITS_LEN);
        assert_eq!(acc.to_string(), "0000950170-23-027948");
    }

    #[test]
    fn test_accession_rejects_garbage() {
        assert!(AccessionNumber::from_path("edgar/data/1/short.txt").is_err());
        assert!(AccessionNumber::from_path("edgar/data/1/0000950170x23x027948.txt").is_err());
        assert!("00009501702302794".parse::<AccessionNumber>().is_err());
    }

    #[test]
    fn test_form_type_filter() {
        assert_eq!(FormType::from_index_field("10-K"), Some(FormType::TenK));
        assert_eq!(FormType::from_index_field("10-Q"), Some(FormType::TenQ));
        assert_eq!(FormType::from_index_field("10-K/A"), None);
        assert_eq!(FormType::from_index_field("8-K"), None);
    }

    #[test]
    fn test_fact_name_parts() {
        let fact = Fact {
            concept: "us-gaap:Assets".into(),
            context_ref: "c1".into(),
            unit_ref: None,
            decimals: None,
            value: String::new(),
            nil: false,
        };
        assert_eq!(fact.prefix(), Some("us-gaap"));
        assert_eq!(fact.local_name(), "Assets");
    }
}

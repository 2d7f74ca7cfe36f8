//! edgarx - EDGAR full-text index parser and XBRL fact decoder
//!
//! Licensed under AGPL-3.0

pub mod client;
pub mod decoder;
pub mod index;
pub mod model;
pub mod parser;
pub mod resolver;
pub mod sec;

pub use client::{CancelToken, Client, ClientBuilder, HttpTransport, Response, TokenBucket, Transport};
pub use decoder::{Decoder, DynamicRecord, FactField, FieldKind, FieldMap, FieldValue, Record};
pub use index::{parse_index, IndexEntries, IndexLayout, HEADER_LINES};
pub use model::{
    AccessionNumber, Cik, Context, Document, Entity, Fact, FormType, IndexEntry, Period, Qualifier,
};
pub use parser::Parser;
pub use resolver::ContextResolver;
pub use sec::{FramePeriod, IndexSource, Quarter, Taxonomy};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("index line {line}: {reason}")]
    Index { line: usize, reason: String },

    #[error("invalid accession number in {0:?}")]
    Accession(String),

    #[error("cannot convert {value:?} for {concept} to {kind}")]
    Conversion {
        concept: String,
        kind: FieldKind,
        value: String,
    },

    #[error("no context found for cik {cik}{}", at_instant(.instant))]
    ContextNotFound { cik: Cik, instant: Option<String> },

    #[error("no conversion for field {concept} of type {type_name}")]
    UnsupportedField { concept: String, type_name: String },

    #[error("http request error: {status} for {url}")]
    Request { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request cancelled while waiting for rate limit")]
    Cancelled,

    #[error("no XBRL instance listed in filing summary at {0}")]
    InstanceNotFound(String),
}

fn at_instant(instant: &Option<String>) -> String {
    instant
        .as_ref()
        .map(|date| format!(" at instant {date}"))
        .unwrap_or_default()
}

impl Error {
    /// True when the document simply has no data for the requested entity or
    /// period, as opposed to being malformed.
    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, Error::ContextNotFound { .. })
    }
}

//! Finds the reporting context that facts for one entity are filed under.

use crate::{Cik, Document, Error, Result};
use log::debug;

/// Concept whose facts name the filer's main context.
pub const ENTITY_CIK_CONCEPT: &str = "dei:EntityCentralIndexKey";

pub struct ContextResolver<'d> {
    doc: &'d Document,
}

impl<'d> ContextResolver<'d> {
    pub fn new(doc: &'d Document) -> Self {
        Self { doc }
    }

    /// Entity-only lookup: the `contextRef` of the first
    /// `dei:EntityCentralIndexKey` fact whose text is the zero-padded CIK.
    ///
    /// Dimensional qualifiers are not checked here, so a document whose first
    /// CIK fact sits in a segmented context resolves to that context.
    pub fn by_entity(&self, cik: Cik) -> Result<&'d str> {
        let target = cik.to_string();
        self.doc
            .facts_named(ENTITY_CIK_CONCEPT)
            .find(|fact| fact.value.trim() == target)
            .map(|fact| {
                debug!("cik {} resolved to context {}", target, fact.context_ref);
                fact.context_ref.as_str()
            })
            .ok_or(Error::ContextNotFound { cik, instant: None })
    }

    /// Entity and instant lookup: the first context in document order whose
    /// identifier is the zero-padded CIK, which has neither segment nor
    /// scenario, and whose period is the instant `date` (`yyyy-mm-dd`).
    ///
    /// Duration contexts never match.
    pub fn by_entity_at(&self, cik: Cik, date: &str) -> Result<&'d str> {
        let target = cik.to_string();
        self.doc
            .contexts()
            .iter()
            .find(|ctx| ctx.entity.identifier == target && ctx.is_plain() && ctx.instant() == Some(date))
            .map(|ctx| {
                debug!("cik {} at {} resolved to context {}", target, date, ctx.id);
                ctx.id.as_str()
            })
            .ok_or_else(|| Error::ContextNotFound {
                cik,
                instant: Some(date.to_string()),
            })
    }
}

//! Span constructors for session operations.

use tracing::{info_span, Span};

pub(crate) fn flush_span(pending: usize) -> Span {
    info_span!("keystone.flush", pending)
}

pub(crate) fn find_span(entity: &str) -> Span {
    info_span!("keystone.find", entity)
}

pub(crate) fn populate_span(entity: &str, relation: &str) -> Span {
    info_span!("keystone.populate", entity, relation)
}

pub(crate) fn execute_span(kind: &'static str, table: &str) -> Span {
    info_span!("keystone.execute", kind, table)
}

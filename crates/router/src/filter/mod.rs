//! Static filters: synchronous, I/O-free record predicates evaluated
//! before formatting.
//!
//! A [`FilterChain`] ANDs its filters in configured order and stops at the
//! first rejection.

mod level;
mod message_body;
mod source_ip;

use std::fmt;

use critical_core::Record;

pub use level::LevelFilter;
pub use message_body::{MessageBodyAnyFilter, MessageBodyFilter};
pub use source_ip::{IpPrefix, SourceIpFilter};

/// Record inclusion predicate.
pub trait StaticFilter: Send + Sync {
    /// Registry kind, used in logs and metrics.
    fn kind(&self) -> &'static str;

    /// `true` lets the record through.
    fn evaluate(&self, record: &Record) -> bool;
}

/// Ordered conjunction of static filters.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn StaticFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Box<dyn StaticFilter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Kind of the first filter that rejects `record`, or `None` if every
    /// filter passes. An empty chain passes everything.
    pub fn first_rejection(&self, record: &Record) -> Option<&'static str> {
        self.filters
            .iter()
            .find(|filter| !filter.evaluate(record))
            .map(|filter| filter.kind())
    }

    pub fn evaluate(&self, record: &Record) -> bool {
        self.first_rejection(record).is_none()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.kind()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record_from;
    use proptest::prelude::*;

    struct Fixed(bool, &'static str);

    impl StaticFilter for Fixed {
        fn kind(&self) -> &'static str {
            self.1
        }
        fn evaluate(&self, _record: &Record) -> bool {
            self.0
        }
    }

    fn chain(verdicts: &[bool]) -> FilterChain {
        let mut chain = FilterChain::new();
        for (i, verdict) in verdicts.iter().enumerate() {
            let kind: &'static str = ["first", "second", "third", "fourth", "fifth"][i % 5];
            chain.push(Box::new(Fixed(*verdict, kind)));
        }
        chain
    }

    #[test]
    fn empty_chain_passes() {
        assert!(FilterChain::new().evaluate(&record_from("127.0.0.1")));
    }

    #[test]
    fn reports_first_rejecting_filter() {
        let chain = chain(&[true, false, false]);
        assert_eq!(chain.first_rejection(&record_from("127.0.0.1")), Some("second"));
    }

    #[test]
    fn debug_lists_kinds() {
        let chain = chain(&[true, true]);
        assert_eq!(format!("{chain:?}"), r#"["first", "second"]"#);
    }

    proptest! {
        #[test]
        fn chain_is_order_independent_conjunction(mut verdicts in prop::collection::vec(any::<bool>(), 0..5)) {
            let record = record_from("127.0.0.1");
            let expected = verdicts.iter().all(|v| *v);
            prop_assert_eq!(chain(&verdicts).evaluate(&record), expected);
            verdicts.reverse();
            prop_assert_eq!(chain(&verdicts).evaluate(&record), expected);
        }
    }
}

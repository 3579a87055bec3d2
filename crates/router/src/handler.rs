//! Handler: the per-record pipeline.
//!
//! ```text
//! Record -> FilterChain -> Formatter -> [Sender + dynamic filters]* (concurrent)
//! ```
//!
//! A handler is built once from a [`HandlerSpec`] and then shared immutably
//! by every partition worker. Only `start`/`stop` take `&mut self`.

use futures::future::join_all;

use critical_core::config::consumer_group_id;
use critical_core::metrics::{LABEL_FILTER, RECORDS_DISPATCHED_TOTAL, RECORDS_FILTERED_TOTAL};
use critical_core::{ComponentSpec, HandlerSpec, Record};

use crate::error::RouterError;
use crate::filter::{FilterChain, StaticFilter};
use crate::formatter::Formatter;
use crate::registry::Registry;
use crate::sender::{DispatchReport, DynSender, dispatch};
use crate::suppression::DynDynamicFilter;

/// Parameter of a sender specification listing its own dynamic filters.
pub const SENDER_FILTERS_PARAM: &str = "dynamic_filters";

/// One sender plus the dynamic filters that apply only to it.
struct SenderSlot {
    sender: Box<dyn DynSender>,
    filters: Vec<Box<dyn DynDynamicFilter>>,
}

/// Per-sender result of one [`Handler::handle`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderOutcome {
    pub sender: &'static str,
    pub report: DispatchReport,
}

/// Result of handling one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A static filter rejected the record; nothing was sent.
    Filtered { filter: &'static str },
    /// The record was formatted and offered to every sender.
    Dispatched(Vec<SenderOutcome>),
}

impl HandleOutcome {
    pub fn is_filtered(&self) -> bool {
        matches!(self, HandleOutcome::Filtered { .. })
    }

    /// Failed deliveries summed over all senders.
    pub fn failed_deliveries(&self) -> usize {
        match self {
            HandleOutcome::Filtered { .. } => 0,
            HandleOutcome::Dispatched(outcomes) => outcomes.iter().map(|o| o.report.failed).sum(),
        }
    }
}

/// What a record would turn into, without sending anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    Filtered { filter: &'static str },
    Rendered(String),
}

/// Static filters, formatter, dynamic filters and senders of one
/// configured route.
pub struct Handler {
    name: String,
    consumer_specification: String,
    static_filters: FilterChain,
    formatter: Box<dyn Formatter>,
    dynamic_filters: Vec<Box<dyn DynDynamicFilter>>,
    senders: Vec<SenderSlot>,
}

impl Handler {
    /// Builds every component of `spec` through `registry`.
    ///
    /// Each sender spec may carry a `dynamic_filters` list; those filters
    /// apply to that sender only, after the handler-wide ones.
    pub fn from_spec(spec: &HandlerSpec, registry: &Registry) -> Result<Self, RouterError> {
        let mut builder = HandlerBuilder::new(&spec.name, &spec.consumer_specification)
            .formatter(registry.formatter(&spec.formatter)?);

        for filter in &spec.static_filters {
            builder = builder.static_filter(registry.static_filter(filter)?);
        }
        for filter in &spec.dynamic_filters {
            builder = builder.dynamic_filter(registry.dynamic_filter(filter)?);
        }
        for sender_spec in &spec.senders {
            let mut sender_spec = sender_spec.clone();
            let own_filters: Vec<ComponentSpec> = match sender_spec.take_param(SENDER_FILTERS_PARAM) {
                Some(value) => serde_yaml::from_value(value).map_err(|e| {
                    RouterError::invalid(
                        &format!("{}.{SENDER_FILTERS_PARAM}", sender_spec.kind),
                        e,
                    )
                })?,
                None => Vec::new(),
            };
            let filters = own_filters
                .iter()
                .map(|filter| registry.dynamic_filter(filter))
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.sender(registry.sender(&sender_spec)?, filters);
        }

        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topic this handler consumes.
    pub fn consumer_specification(&self) -> &str {
        &self.consumer_specification
    }

    pub fn group_id(&self) -> String {
        consumer_group_id(&self.consumer_specification, &self.name)
    }

    pub fn static_filters(&self) -> &FilterChain {
        &self.static_filters
    }

    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }

    /// Starts every sender, then every dynamic filter. Returns the first
    /// failure; call [`Handler::stop`] afterwards to release whatever did
    /// start.
    pub async fn start(&mut self) -> Result<(), RouterError> {
        for slot in &mut self.senders {
            slot.sender.start().await?;
            tracing::info!(handler = %self.name, sender = slot.sender.kind(), "sender started");
        }
        for slot in &mut self.senders {
            for filter in &mut slot.filters {
                filter.start().await?;
            }
        }
        for filter in &mut self.dynamic_filters {
            filter.start().await?;
        }
        tracing::info!(
            handler = %self.name,
            senders = self.senders.len(),
            dynamic_filters = self.dynamic_filters.len(),
            "handler started"
        );
        Ok(())
    }

    /// Stops every component, continuing past failures.
    ///
    /// All failures are reported together in one `Lifecycle` error.
    pub async fn stop(&mut self) -> Result<(), RouterError> {
        let mut failures = Vec::new();

        for slot in &mut self.senders {
            if let Err(e) = slot.sender.stop().await {
                tracing::warn!(handler = %self.name, sender = slot.sender.kind(), error = %e, "sender stop failed");
                failures.push(e.to_string());
            }
            for filter in &mut slot.filters {
                if let Err(e) = filter.stop().await {
                    tracing::warn!(handler = %self.name, filter = filter.name(), error = %e, "filter stop failed");
                    failures.push(e.to_string());
                }
            }
        }
        for filter in &mut self.dynamic_filters {
            if let Err(e) = filter.stop().await {
                tracing::warn!(handler = %self.name, filter = filter.name(), error = %e, "filter stop failed");
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            tracing::info!(handler = %self.name, "handler stopped");
            Ok(())
        } else {
            Err(RouterError::Lifecycle {
                component: format!("handler '{}'", self.name),
                reason: failures.join("; "),
            })
        }
    }

    /// Runs one record through the pipeline.
    ///
    /// Static filters short-circuit; an accepted record is formatted once
    /// and dispatched to all senders concurrently.
    pub async fn handle(&self, record: &Record) -> HandleOutcome {
        if let Some(filter) = self.static_filters.first_rejection(record) {
            metrics::counter!(RECORDS_FILTERED_TOTAL, LABEL_FILTER => filter).increment(1);
            tracing::trace!(handler = %self.name, filter, host = %record.host, "record filtered");
            return HandleOutcome::Filtered { filter };
        }

        let text = self.formatter.format(record);
        metrics::counter!(RECORDS_DISPATCHED_TOTAL).increment(1);

        let dispatches = self.senders.iter().map(|slot| {
            let filters: Vec<&dyn DynDynamicFilter> = self
                .dynamic_filters
                .iter()
                .chain(slot.filters.iter())
                .map(|filter| filter.as_ref())
                .collect();
            let text = text.as_str();
            async move {
                let report = dispatch(slot.sender.as_ref(), text, &filters).await;
                SenderOutcome {
                    sender: slot.sender.kind(),
                    report,
                }
            }
        });

        let outcomes = join_all(dispatches).await;
        tracing::debug!(handler = %self.name, host = %record.host, senders = outcomes.len(), "record dispatched");
        HandleOutcome::Dispatched(outcomes)
    }

    /// Static filters and formatter only.
    pub fn preview(&self, record: &Record) -> Preview {
        match self.static_filters.first_rejection(record) {
            Some(filter) => Preview::Filtered { filter },
            None => Preview::Rendered(self.formatter.format(record)),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let senders: Vec<&str> = self.senders.iter().map(|slot| slot.sender.kind()).collect();
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("consumer_specification", &self.consumer_specification)
            .field("static_filters", &self.static_filters)
            .field("formatter", &self.formatter.kind())
            .field("dynamic_filters", &self.dynamic_filters.len())
            .field("senders", &senders)
            .finish()
    }
}

/// Assembles a [`Handler`] from already-built components.
///
/// # Example
/// ```ignore
/// let handler = HandlerBuilder::new("syslog-critical", "syslog")
///     .static_filter(Box::new(LevelFilter::new(3, false)))
///     .formatter(Box::new(CopyFieldFormatter::new("short_message")))
///     .sender(Box::new(TerminalSender::new(vec!["ops".into()])), Vec::new())
///     .build()?;
/// ```
pub struct HandlerBuilder {
    name: String,
    consumer_specification: String,
    static_filters: FilterChain,
    formatter: Option<Box<dyn Formatter>>,
    dynamic_filters: Vec<Box<dyn DynDynamicFilter>>,
    senders: Vec<SenderSlot>,
}

impl HandlerBuilder {
    pub fn new(name: impl Into<String>, consumer_specification: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            consumer_specification: consumer_specification.into(),
            static_filters: FilterChain::new(),
            formatter: None,
            dynamic_filters: Vec::new(),
            senders: Vec::new(),
        }
    }

    pub fn static_filter(mut self, filter: Box<dyn StaticFilter>) -> Self {
        self.static_filters.push(filter);
        self
    }

    pub fn formatter(mut self, formatter: Box<dyn Formatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Adds a dynamic filter consulted for every sender.
    pub fn dynamic_filter(mut self, filter: Box<dyn DynDynamicFilter>) -> Self {
        self.dynamic_filters.push(filter);
        self
    }

    /// Adds a sender with its own dynamic filters.
    pub fn sender(
        mut self,
        sender: Box<dyn DynSender>,
        filters: Vec<Box<dyn DynDynamicFilter>>,
    ) -> Self {
        self.senders.push(SenderSlot { sender, filters });
        self
    }

    pub fn build(self) -> Result<Handler, RouterError> {
        if self.consumer_specification.trim().is_empty() {
            return Err(RouterError::invalid("consumer_specification", "must not be empty"));
        }
        let formatter = self
            .formatter
            .ok_or_else(|| RouterError::invalid("formatter", "a formatter is required"))?;
        if self.senders.is_empty() {
            return Err(RouterError::invalid("senders", "at least one sender is required"));
        }

        Ok(Handler {
            name: self.name,
            consumer_specification: self.consumer_specification,
            static_filters: self.static_filters,
            formatter,
            dynamic_filters: self.dynamic_filters,
            senders: self.senders,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SourceIpFilter;
    use crate::formatter::CopyFieldFormatter;
    use crate::suppression::{MatchMode, PatternFilter};
    use crate::test_support::{MemoryStore, RecordingSender, record_from};

    fn localhost_only() -> Box<dyn StaticFilter> {
        Box::new(SourceIpFilter::new(
            vec!["127.0.0.1".parse().unwrap()],
            Vec::new(),
            false,
        ))
    }

    fn short_message() -> Box<dyn Formatter> {
        Box::new(CopyFieldFormatter::new("short_message"))
    }

    #[tokio::test]
    async fn accepted_record_reaches_every_sender() {
        let first = RecordingSender::new(&["a"]);
        let second = RecordingSender::new(&["b", "c"]);
        let handler = HandlerBuilder::new("test", "syslog")
            .static_filter(localhost_only())
            .formatter(short_message())
            .sender(Box::new(first.clone()), Vec::new())
            .sender(Box::new(second.clone()), Vec::new())
            .build()
            .unwrap();

        let outcome = handler.handle(&record_from("127.0.0.1")).await;

        let HandleOutcome::Dispatched(outcomes) = outcome else {
            panic!("record should be dispatched");
        };
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].report.delivered, 1);
        assert_eq!(outcomes[1].report.delivered, 2);
        assert_eq!(first.calls(), vec![("a".to_owned(), "test message".to_owned())]);
        assert_eq!(second.calls().len(), 2);
    }

    #[tokio::test]
    async fn rejected_record_is_not_formatted_or_sent() {
        let sender = RecordingSender::new(&["a"]);
        let handler = HandlerBuilder::new("test", "syslog")
            .static_filter(localhost_only())
            .formatter(short_message())
            .sender(Box::new(sender.clone()), Vec::new())
            .build()
            .unwrap();

        let outcome = handler.handle(&record_from("10.0.0.1")).await;

        assert_eq!(outcome, HandleOutcome::Filtered { filter: "source_ip" });
        assert!(outcome.is_filtered());
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn shared_and_own_filters_both_apply() {
        let shared = MemoryStore::default();
        shared.insert("rec_a", "test");
        let own = MemoryStore::default();
        own.insert("rec_b", "message");

        let sender = RecordingSender::new(&["a", "b", "c"]);
        let handler = HandlerBuilder::new("test", "syslog")
            .formatter(short_message())
            .dynamic_filter(Box::new(PatternFilter::new("shared", shared, MatchMode::Substring)))
            .sender(
                Box::new(sender.clone()),
                vec![Box::new(PatternFilter::new("own", own, MatchMode::Substring))],
            )
            .build()
            .unwrap();

        let outcome = handler.handle(&record_from("127.0.0.1")).await;

        let HandleOutcome::Dispatched(outcomes) = outcome else {
            panic!("record should be dispatched");
        };
        assert_eq!(
            outcomes[0].report,
            DispatchReport { delivered: 1, suppressed: 2, failed: 0 }
        );
        assert_eq!(sender.calls(), vec![("c".to_owned(), "test message".to_owned())]);
    }

    #[tokio::test]
    async fn failed_deliveries_are_counted() {
        let sender = RecordingSender::new(&["a", "bad"]).failing_for("bad");
        let handler = HandlerBuilder::new("test", "syslog")
            .formatter(short_message())
            .sender(Box::new(sender), Vec::new())
            .build()
            .unwrap();

        let outcome = handler.handle(&record_from("127.0.0.1")).await;
        assert_eq!(outcome.failed_deliveries(), 1);
    }

    #[tokio::test]
    async fn stop_after_failed_start_reports_nothing_fatal() {
        let mut handler = HandlerBuilder::new("test", "syslog")
            .formatter(short_message())
            .dynamic_filter(Box::new(PatternFilter::new(
                "down",
                MemoryStore::default().failing(),
                MatchMode::Substring,
            )))
            .sender(Box::new(RecordingSender::new(&["a"])), Vec::new())
            .build()
            .unwrap();

        assert!(handler.start().await.is_err());
        handler.stop().await.unwrap();
    }

    #[test]
    fn preview_renders_without_sending() {
        let sender = RecordingSender::new(&["a"]);
        let handler = HandlerBuilder::new("test", "syslog")
            .static_filter(localhost_only())
            .formatter(short_message())
            .sender(Box::new(sender.clone()), Vec::new())
            .build()
            .unwrap();

        assert_eq!(
            handler.preview(&record_from("127.0.0.1")),
            Preview::Rendered("test message".to_owned())
        );
        assert_eq!(
            handler.preview(&record_from("10.1.1.1")),
            Preview::Filtered { filter: "source_ip" }
        );
        assert!(sender.calls().is_empty());
    }

    #[test]
    fn builder_requires_formatter_and_sender() {
        let missing_formatter = HandlerBuilder::new("test", "syslog")
            .sender(Box::new(RecordingSender::new(&["a"])), Vec::new())
            .build();
        assert!(missing_formatter.is_err());

        let missing_sender = HandlerBuilder::new("test", "syslog")
            .formatter(short_message())
            .build();
        assert!(missing_sender.is_err());
    }

    #[test]
    fn from_spec_resolves_per_sender_filters() {
        let spec = HandlerSpec::parse(
            r#"
name: Core Network
consumer_specification: syslog
formatter: {kind: copy_field, field: short_message}
senders:
  - kind: terminal
    receivers: [ops]
    dynamic_filters:
      - kind: redis_exclude_regexp
        host: 127.0.0.1
        port: 6380
"#,
        )
        .unwrap();
        let handler = Handler::from_spec(&spec, &Registry::with_defaults()).unwrap();

        assert_eq!(handler.group_id(), "syslog:corenetwork");
        assert_eq!(handler.sender_count(), 1);
        assert_eq!(handler.senders[0].filters.len(), 1);
        assert_eq!(
            handler.senders[0].filters[0].name(),
            "redis_exclude_regexp@127.0.0.1:6380/0"
        );
    }

    #[test]
    fn from_spec_rejects_unknown_kinds() {
        let spec = HandlerSpec::parse(
            r#"
consumer_specification: syslog
formatter: {kind: shouting}
senders: [{kind: terminal, receivers: [ops]}]
"#,
        )
        .unwrap();
        let err = Handler::from_spec(&spec, &Registry::with_defaults()).unwrap_err();
        assert_eq!(err.to_string(), "unknown formatter kind 'shouting'");
    }
}

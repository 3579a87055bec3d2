//! Component registry: maps configuration `kind` strings to factories.
//!
//! Every component of a handler document is built through a [`Registry`].
//! [`Registry::with_defaults`] knows all built-in kinds; tests and embedders
//! can register extra kinds or start from [`Registry::empty`].

use std::collections::HashMap;
use std::fmt;

use critical_core::ComponentSpec;
use critical_core::error::ConfigError;

use crate::error::RouterError;
use crate::filter::{
    LevelFilter, MessageBodyAnyFilter, MessageBodyFilter, SourceIpFilter, StaticFilter,
};
use crate::formatter::{CopyFieldFormatter, Formatter, TemplateFormatter};
use crate::sender::{self, DynSender, MailSender, TelegramSender, TerminalSender};
use crate::suppression::{
    DynDynamicFilter, PatternFilter, REDIS_EXCLUDE_PATTERN, REDIS_EXCLUDE_REGEXP, RedisStore,
};

/// Builds one component from its specification.
pub type Factory<T> = Box<dyn Fn(&ComponentSpec) -> Result<T, RouterError> + Send + Sync>;

const STATIC_FILTER: &str = "static filter";
const FORMATTER: &str = "formatter";
const DYNAMIC_FILTER: &str = "dynamic filter";
const SENDER: &str = "sender";

/// Kind-to-factory tables, one per component type.
#[derive(Default)]
pub struct Registry {
    static_filters: HashMap<String, Factory<Box<dyn StaticFilter>>>,
    formatters: HashMap<String, Factory<Box<dyn Formatter>>>,
    dynamic_filters: HashMap<String, Factory<Box<dyn DynDynamicFilter>>>,
    senders: HashMap<String, Factory<Box<dyn DynSender>>>,
}

impl Registry {
    /// Registry without any kinds.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        registry.register_static_filter(SourceIpFilter::KIND, |spec| {
            Ok(Box::new(SourceIpFilter::from_spec(spec)?))
        });
        registry.register_static_filter(MessageBodyFilter::KIND, |spec| {
            Ok(Box::new(MessageBodyFilter::from_spec(spec)?))
        });
        registry.register_static_filter(MessageBodyAnyFilter::KIND, |spec| {
            Ok(Box::new(MessageBodyAnyFilter::from_spec(spec)?))
        });
        registry.register_static_filter(LevelFilter::KIND, |spec| {
            Ok(Box::new(LevelFilter::from_spec(spec)?))
        });

        registry.register_formatter(CopyFieldFormatter::KIND, |spec| {
            Ok(Box::new(CopyFieldFormatter::from_spec(spec)?))
        });
        registry.register_formatter(TemplateFormatter::KIND, |spec| {
            Ok(Box::new(TemplateFormatter::from_spec(spec)?))
        });

        for kind in [REDIS_EXCLUDE_PATTERN, REDIS_EXCLUDE_REGEXP] {
            registry.register_dynamic_filter(kind, |spec| {
                Ok(Box::new(PatternFilter::<RedisStore>::from_spec(spec)?))
            });
        }

        registry.register_sender(sender::telegram::KIND, |spec| {
            Ok(Box::new(TelegramSender::from_spec(spec)?))
        });
        registry.register_sender(sender::mail::KIND, |spec| {
            Ok(Box::new(MailSender::from_spec(spec)?))
        });
        registry.register_sender(sender::terminal::KIND, |spec| {
            Ok(Box::new(TerminalSender::from_spec(spec)?))
        });

        registry
    }

    pub fn register_static_filter<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ComponentSpec) -> Result<Box<dyn StaticFilter>, RouterError> + Send + Sync + 'static,
    {
        self.static_filters.insert(kind.to_owned(), Box::new(factory));
    }

    pub fn register_formatter<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ComponentSpec) -> Result<Box<dyn Formatter>, RouterError> + Send + Sync + 'static,
    {
        self.formatters.insert(kind.to_owned(), Box::new(factory));
    }

    pub fn register_dynamic_filter<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ComponentSpec) -> Result<Box<dyn DynDynamicFilter>, RouterError>
            + Send
            + Sync
            + 'static,
    {
        self.dynamic_filters.insert(kind.to_owned(), Box::new(factory));
    }

    pub fn register_sender<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ComponentSpec) -> Result<Box<dyn DynSender>, RouterError> + Send + Sync + 'static,
    {
        self.senders.insert(kind.to_owned(), Box::new(factory));
    }

    pub fn static_filter(&self, spec: &ComponentSpec) -> Result<Box<dyn StaticFilter>, RouterError> {
        build(&self.static_filters, STATIC_FILTER, spec)
    }

    pub fn formatter(&self, spec: &ComponentSpec) -> Result<Box<dyn Formatter>, RouterError> {
        build(&self.formatters, FORMATTER, spec)
    }

    pub fn dynamic_filter(
        &self,
        spec: &ComponentSpec,
    ) -> Result<Box<dyn DynDynamicFilter>, RouterError> {
        build(&self.dynamic_filters, DYNAMIC_FILTER, spec)
    }

    pub fn sender(&self, spec: &ComponentSpec) -> Result<Box<dyn DynSender>, RouterError> {
        build(&self.senders, SENDER, spec)
    }
}

fn build<T>(
    table: &HashMap<String, Factory<T>>,
    component: &'static str,
    spec: &ComponentSpec,
) -> Result<T, RouterError> {
    let factory = table
        .get(&spec.kind)
        .ok_or_else(|| ConfigError::UnknownKind {
            component,
            kind: spec.kind.clone(),
        })?;
    factory(spec)
}

fn sorted_kinds<T>(table: &HashMap<String, T>) -> Vec<&str> {
    let mut kinds: Vec<&str> = table.keys().map(String::as_str).collect();
    kinds.sort_unstable();
    kinds
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("static_filters", &sorted_kinds(&self.static_filters))
            .field("formatters", &sorted_kinds(&self.formatters))
            .field("dynamic_filters", &sorted_kinds(&self.dynamic_filters))
            .field("senders", &sorted_kinds(&self.senders))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record_from;

    #[test]
    fn defaults_know_builtin_kinds() {
        let registry = Registry::with_defaults();
        let debug = format!("{registry:?}");
        for kind in [
            "source_ip",
            "message_body",
            "message_body_any",
            "level",
            "copy_field",
            "template",
            "redis_exclude_pattern",
            "redis_exclude_regexp",
            "telegram",
            "mail",
            "terminal",
        ] {
            assert!(debug.contains(kind), "missing {kind} in {debug}");
        }
    }

    #[test]
    fn unknown_kind_names_component_and_kind() {
        let registry = Registry::with_defaults();
        let err = registry
            .sender(&ComponentSpec::new("pigeon"))
            .err()
            .expect("unknown kind must fail");
        assert!(matches!(
            err,
            RouterError::Config(ConfigError::UnknownKind { component: "sender", ref kind }) if kind == "pigeon"
        ));
        assert_eq!(err.to_string(), "unknown sender kind 'pigeon'");
    }

    #[test]
    fn builds_static_filter_from_spec() {
        let registry = Registry::with_defaults();
        let spec = ComponentSpec::new("source_ip").with_param(
            "ips",
            serde_yaml::Value::Sequence(vec!["127.0.0.1".into()]),
        );
        let filter = registry.static_filter(&spec).unwrap();
        assert_eq!(filter.kind(), "source_ip");
        assert!(filter.evaluate(&record_from("127.0.0.1")));
        assert!(!filter.evaluate(&record_from("10.0.0.1")));
    }

    #[test]
    fn factory_errors_propagate() {
        let registry = Registry::with_defaults();
        let spec = ComponentSpec::new("copy_field").with_param("colour", "red");
        assert!(matches!(
            registry.formatter(&spec),
            Err(RouterError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn custom_kinds_can_be_registered() {
        let mut registry = Registry::empty();
        assert!(registry.formatter(&ComponentSpec::new("copy_field")).is_err());

        registry.register_formatter("host_only", |_| Ok(Box::new(CopyFieldFormatter::new("host"))));
        assert!(registry.formatter(&ComponentSpec::new("host_only")).is_ok());
    }
}

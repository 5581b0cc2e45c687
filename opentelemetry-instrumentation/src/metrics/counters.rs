use super::{InstrumentRegistry, MetricOptions, MetricResult};
use once_cell::sync::OnceCell;
use opentelemetry::metrics::Counter;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Scope prepended to every counter name produced by this module.
pub const METRIC_PREFIX: &str = "app";

/// `app_<TypeName>_instances_total`
pub fn instance_counter_name(type_name: &str) -> String {
    format!("{METRIC_PREFIX}_{type_name}_instances_total")
}

/// `app_<TypeName> object instances total`
pub fn instance_counter_description(type_name: &str) -> String {
    format!("{METRIC_PREFIX}_{type_name} object instances total")
}

/// `app_<TypeName>_<methodName>_calls_total`
pub fn method_counter_name(type_name: &str, method_name: &str) -> String {
    format!("{METRIC_PREFIX}_{type_name}_{method_name}_calls_total")
}

/// `app_<TypeName>#<methodName> called total`
pub fn method_counter_description(type_name: &str, method_name: &str) -> String {
    format!("{METRIC_PREFIX}_{type_name}#{method_name} called total")
}

/// Counts constructions of one type.
///
/// The counter is resolved through the registry on the first construction and
/// cached afterwards, so a type that is never constructed never creates a
/// counter.
///
/// ```
/// use std::sync::Arc;
/// use opentelemetry::global;
/// use opentelemetry_instrumentation::metrics::{InstanceCounter, InstrumentRegistry};
///
/// struct Widget {
///     id: u32,
/// }
///
/// let registry = Arc::new(InstrumentRegistry::new(global::meter("my-app")));
/// let new_widget = InstanceCounter::new(registry, "Widget").wrap(|id| Widget { id });
///
/// let widget = new_widget(7).unwrap();
/// assert_eq!(widget.id, 7);
/// ```
#[derive(Clone)]
pub struct InstanceCounter {
    registry: Arc<InstrumentRegistry>,
    type_name: Cow<'static, str>,
    options: MetricOptions,
    counter: OnceCell<Counter<u64>>,
}

impl fmt::Debug for InstanceCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCounter")
            .field("type_name", &self.type_name)
            .field("options", &self.options)
            .field("resolved", &self.counter.get().is_some())
            .finish()
    }
}

impl InstanceCounter {
    /// Count constructions of the type called `type_name`.
    pub fn new<S>(registry: Arc<InstrumentRegistry>, type_name: S) -> Self
    where
        S: Into<Cow<'static, str>>,
    {
        InstanceCounter {
            registry,
            type_name: type_name.into(),
            options: MetricOptions::default(),
            counter: OnceCell::new(),
        }
    }

    /// Options applied over the default description when the counter is created.
    pub fn with_options(mut self, options: MetricOptions) -> Self {
        self.options = options;
        self
    }

    /// Name of the underlying counter.
    pub fn counter_name(&self) -> String {
        instance_counter_name(&self.type_name)
    }

    /// Count one construction.
    pub fn record(&self) -> MetricResult<()> {
        self.counter()?.add(1, &[]);
        Ok(())
    }

    /// Count one construction, then run `ctor`.
    pub fn construct<T, F>(&self, ctor: F) -> MetricResult<T>
    where
        F: FnOnce() -> T,
    {
        self.record()?;
        Ok(ctor())
    }

    /// Turn `ctor` into a constructor that counts every call.
    pub fn wrap<A, T, F>(self, ctor: F) -> impl Fn(A) -> MetricResult<T>
    where
        F: Fn(A) -> T,
    {
        move |args| self.construct(|| ctor(args))
    }

    fn counter(&self) -> MetricResult<&Counter<u64>> {
        self.counter.get_or_try_init(|| {
            let options =
                MetricOptions::with_description(instance_counter_description(&self.type_name))
                    .merged_with(&self.options);
            self.registry
                .get_or_create_counter(&self.counter_name(), &options)
        })
    }
}

/// Counts invocations of one method.
///
/// The count is added before the body runs, so calls that fail are counted too.
/// A body returning a future is counted when it is called, not when it completes.
#[derive(Clone)]
pub struct MethodCounter {
    registry: Arc<InstrumentRegistry>,
    type_name: Cow<'static, str>,
    method_name: Cow<'static, str>,
    options: MetricOptions,
    counter: OnceCell<Counter<u64>>,
}

impl fmt::Debug for MethodCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodCounter")
            .field("type_name", &self.type_name)
            .field("method_name", &self.method_name)
            .field("options", &self.options)
            .field("resolved", &self.counter.get().is_some())
            .finish()
    }
}

impl MethodCounter {
    /// Count calls of `method_name` on the type called `type_name`.
    pub fn new<T, M>(registry: Arc<InstrumentRegistry>, type_name: T, method_name: M) -> Self
    where
        T: Into<Cow<'static, str>>,
        M: Into<Cow<'static, str>>,
    {
        MethodCounter {
            registry,
            type_name: type_name.into(),
            method_name: method_name.into(),
            options: MetricOptions::default(),
            counter: OnceCell::new(),
        }
    }

    /// Options applied over the default description when the counter is created.
    pub fn with_options(mut self, options: MetricOptions) -> Self {
        self.options = options;
        self
    }

    /// Name of the underlying counter.
    pub fn counter_name(&self) -> String {
        method_counter_name(&self.type_name, &self.method_name)
    }

    /// Count one call.
    pub fn record(&self) -> MetricResult<()> {
        self.counter()?.add(1, &[]);
        Ok(())
    }

    /// Count one call, then run `body` and hand back whatever it returns.
    pub fn call<R, F>(&self, body: F) -> MetricResult<R>
    where
        F: FnOnce() -> R,
    {
        self.record()?;
        Ok(body())
    }

    /// Turn `f` into a function that counts every call.
    pub fn wrap<A, R, F>(self, f: F) -> impl Fn(A) -> MetricResult<R>
    where
        F: Fn(A) -> R,
    {
        move |args| self.call(|| f(args))
    }

    fn counter(&self) -> MetricResult<&Counter<u64>> {
        self.counter.get_or_try_init(|| {
            let options = MetricOptions::with_description(method_counter_description(
                &self.type_name,
                &self.method_name,
            ))
            .merged_with(&self.options);
            self.registry
                .get_or_create_counter(&self.counter_name(), &options)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{InstrumentKind, MetricError};
    use crate::testing::metrics::RecordingFactory;
    use rstest::rstest;

    fn registry() -> (RecordingFactory, Arc<InstrumentRegistry>) {
        let factory = RecordingFactory::new();
        let registry = Arc::new(InstrumentRegistry::new(factory.clone()));
        (factory, registry)
    }

    #[rstest]
    #[case("Widget", "app_Widget_instances_total", "app_Widget object instances total")]
    #[case("HttpClient", "app_HttpClient_instances_total", "app_HttpClient object instances total")]
    fn instance_naming(#[case] type_name: &str, #[case] name: &str, #[case] description: &str) {
        assert_eq!(instance_counter_name(type_name), name);
        assert_eq!(instance_counter_description(type_name), description);
    }

    #[rstest]
    #[case("Widget", "render", "app_Widget_render_calls_total", "app_Widget#render called total")]
    #[case("Repo", "findAll", "app_Repo_findAll_calls_total", "app_Repo#findAll called total")]
    fn method_naming(
        #[case] type_name: &str,
        #[case] method_name: &str,
        #[case] name: &str,
        #[case] description: &str,
    ) {
        assert_eq!(method_counter_name(type_name, method_name), name);
        assert_eq!(method_counter_description(type_name, method_name), description);
    }

    #[derive(Debug, PartialEq)]
    struct Widget {
        id: u32,
    }

    #[test]
    fn counts_every_construction_with_one_counter() {
        let (factory, registry) = registry();
        let new_widget = InstanceCounter::new(registry, "Widget").wrap(|id| Widget { id });

        for id in 0..5 {
            assert_eq!(new_widget(id).unwrap(), Widget { id });
        }

        let creations = factory.creations();
        assert_eq!(creations.len(), 1);
        assert_eq!(creations[0].kind, InstrumentKind::Counter);
        assert_eq!(creations[0].name, "app_Widget_instances_total");
        assert_eq!(
            creations[0].options.description.as_deref(),
            Some("app_Widget object instances total")
        );
        assert_eq!(factory.total("app_Widget_instances_total"), 5.0);
    }

    #[test]
    fn unused_type_creates_nothing() {
        let (factory, registry) = registry();
        let counter = InstanceCounter::new(Arc::clone(&registry), "Idle");

        assert_eq!(counter.counter_name(), "app_Idle_instances_total");
        assert!(factory.creations().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn caller_options_override_defaults() {
        let (factory, registry) = registry();
        let counter = InstanceCounter::new(registry, "Widget")
            .with_options(MetricOptions::with_description("custom").unit("{instance}"));

        counter.record().unwrap();

        let options = &factory.creations()[0].options;
        assert_eq!(options.description.as_deref(), Some("custom"));
        assert_eq!(options.unit.as_deref(), Some("{instance}"));
    }

    #[test]
    fn distinct_types_and_methods_do_not_share_counters() {
        let (factory, registry) = registry();
        let widgets = InstanceCounter::new(Arc::clone(&registry), "Widget");
        let gadgets = InstanceCounter::new(Arc::clone(&registry), "Gadget");
        let render = MethodCounter::new(Arc::clone(&registry), "Widget", "render");
        let resize = MethodCounter::new(Arc::clone(&registry), "Widget", "resize");

        widgets.record().unwrap();
        gadgets.record().unwrap();
        gadgets.record().unwrap();
        render.record().unwrap();
        resize.call(|| ()).unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(factory.total("app_Widget_instances_total"), 1.0);
        assert_eq!(factory.total("app_Gadget_instances_total"), 2.0);
        assert_eq!(factory.total("app_Widget_render_calls_total"), 1.0);
        assert_eq!(factory.total("app_Widget_resize_calls_total"), 1.0);
    }

    #[test]
    fn failed_calls_are_counted_and_result_is_untouched() {
        let (factory, registry) = registry();
        let parse = MethodCounter::new(registry, "Parser", "parse")
            .wrap(|input: &str| input.parse::<u32>());

        assert_eq!(parse("12").unwrap(), Ok(12));
        assert!(parse("twelve").unwrap().is_err());
        assert_eq!(factory.total("app_Parser_parse_calls_total"), 2.0);
        assert_eq!(factory.creation_count("app_Parser_parse_calls_total"), 1);
    }

    #[test]
    fn counters_on_separate_attachments_share_the_registry_entry() {
        let (factory, registry) = registry();
        let first = MethodCounter::new(Arc::clone(&registry), "Widget", "render");
        let second = MethodCounter::new(Arc::clone(&registry), "Widget", "render");

        first.record().unwrap();
        second.record().unwrap();

        assert_eq!(factory.creation_count("app_Widget_render_calls_total"), 1);
        assert_eq!(factory.total("app_Widget_render_calls_total"), 2.0);
    }

    #[test]
    fn backend_failure_fails_the_call_without_running_the_body() {
        let factory = RecordingFactory::new().fail_on("app_Widget_render_calls_total");
        let registry = Arc::new(InstrumentRegistry::new(factory));
        let render = MethodCounter::new(registry, "Widget", "render");
        let mut ran = false;

        let err = render.call(|| ran = true).unwrap_err();

        assert!(matches!(err, MetricError::Creation { .. }));
        assert!(!ran);
    }
}

use opentelemetry::{
    metrics::{
        Counter, Histogram, ObservableCounter, ObservableGauge, ObservableUpDownCounter,
        SyncInstrument, UpDownCounter,
    },
    trace::{TraceContextExt, TracerProvider as _},
    Context, KeyValue,
};
use opentelemetry_instrumentation::{
    metrics::{
        InstanceCounter, InstrumentFactory, InstrumentRegistry, MethodCounter, MetricOptions,
        MetricResult, ObservableCallback,
    },
    trace::SpanAttachment,
};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Counts backend calls per name and sums what is added to counters.
#[derive(Clone, Default)]
struct CountingBackend {
    created: Arc<Mutex<HashMap<String, usize>>>,
    totals: Arc<Mutex<HashMap<String, Arc<Total>>>>,
}

#[derive(Default)]
struct Total(AtomicU64);

impl SyncInstrument<u64> for Total {
    fn measure(&self, measurement: u64, _attributes: &[KeyValue]) {
        self.0.fetch_add(measurement, Ordering::SeqCst);
    }
}

impl CountingBackend {
    fn created(&self, name: &str) -> usize {
        self.created.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    fn total(&self, name: &str) -> u64 {
        self.totals
            .lock()
            .unwrap()
            .get(name)
            .map(|total| total.0.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn note(&self, name: &str) {
        *self.created.lock().unwrap().entry(name.to_owned()).or_default() += 1;
    }
}

impl InstrumentFactory for CountingBackend {
    fn create_counter(&self, name: &str, _options: &MetricOptions) -> MetricResult<Counter<u64>> {
        self.note(name);
        let total = Arc::new(Total::default());
        self.totals
            .lock()
            .unwrap()
            .insert(name.to_owned(), Arc::clone(&total));
        Ok(Counter::new(total))
    }

    fn create_up_down_counter(
        &self,
        _name: &str,
        _options: &MetricOptions,
    ) -> MetricResult<UpDownCounter<i64>> {
        unimplemented!("not used by these tests")
    }

    fn create_histogram(
        &self,
        _name: &str,
        _options: &MetricOptions,
    ) -> MetricResult<Histogram<f64>> {
        unimplemented!("not used by these tests")
    }

    fn create_observable_gauge(
        &self,
        _name: &str,
        _options: &MetricOptions,
        _callback: ObservableCallback<f64>,
    ) -> MetricResult<ObservableGauge<f64>> {
        unimplemented!("not used by these tests")
    }

    fn create_observable_counter(
        &self,
        _name: &str,
        _options: &MetricOptions,
        _callback: ObservableCallback<u64>,
    ) -> MetricResult<ObservableCounter<u64>> {
        unimplemented!("not used by these tests")
    }

    fn create_observable_up_down_counter(
        &self,
        _name: &str,
        _options: &MetricOptions,
        _callback: ObservableCallback<i64>,
    ) -> MetricResult<ObservableUpDownCounter<i64>> {
        unimplemented!("not used by these tests")
    }
}

#[derive(Debug)]
struct Order {
    id: u64,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_constructions_share_one_counter() {
    let backend = CountingBackend::default();
    let registry = Arc::new(InstrumentRegistry::new(backend.clone()));
    let new_order = Arc::new(InstanceCounter::new(registry, "Order").wrap(|id| Order { id }));

    let tasks: Vec<_> = (0..32)
        .map(|id| {
            let new_order = Arc::clone(&new_order);
            tokio::spawn(async move { new_order(id).unwrap().id })
        })
        .collect();
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.sort_unstable();

    assert_eq!(ids, (0..32).collect::<Vec<_>>());
    assert_eq!(backend.created("app_Order_instances_total"), 1);
    assert_eq!(backend.total("app_Order_instances_total"), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_method_counters_from_many_attachments() {
    let backend = CountingBackend::default();
    let registry = Arc::new(InstrumentRegistry::new(backend.clone()));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let ship = MethodCounter::new(registry, "Order", "ship");
                ship.call(|| ()).unwrap();
                ship.call(|| ()).unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(backend.created("app_Order_ship_calls_total"), 1);
    assert_eq!(backend.total("app_Order_ship_calls_total"), 32);
}

struct Repository {
    find_calls: MethodCounter,
    find_span: SpanAttachment<opentelemetry_sdk::trace::SdkTracer>,
}

impl Repository {
    async fn find(&self, id: u64) -> Result<Order, String> {
        self.find_calls
            .call(|| {
                self.find_span.in_span_async(|| async move {
                    assert!(Context::current().has_active_span());
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    if id == 0 {
                        Err("not found".to_owned())
                    } else {
                        Ok(Order { id })
                    }
                })
            })
            .map_err(|err| err.to_string())?
            .await
    }
}

#[tokio::test]
async fn counted_and_traced_async_method() {
    let backend = CountingBackend::default();
    let registry = Arc::new(InstrumentRegistry::new(backend.clone()));
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let repository = Repository {
        find_calls: MethodCounter::new(registry, "Repository", "find"),
        find_span: SpanAttachment::for_method("Repository", "find")
            .with_tracer(provider.tracer("repository")),
    };

    let pending = repository.find(7);
    assert_eq!(backend.total("app_Repository_find_calls_total"), 0);
    assert_eq!(pending.await.unwrap().id, 7);
    assert!(repository.find(0).await.is_err());

    assert_eq!(backend.created("app_Repository_find_calls_total"), 1);
    assert_eq!(backend.total("app_Repository_find_calls_total"), 2);

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 2);
    assert!(spans.iter().all(|span| span.name == "Repository.find"));
    assert!(spans.iter().all(|span| span.end_time >= span.start_time));
}

#[test]
fn sdk_meter_backs_the_registry() {
    let provider = opentelemetry_sdk::metrics::SdkMeterProvider::default();
    let registry = InstrumentRegistry::from_meter_provider(&provider);

    let counter = registry
        .get_or_create_counter("jobs_total", &MetricOptions::with_description("Jobs"))
        .unwrap();
    counter.add(1, &[KeyValue::new("queue", "default")]);
    registry
        .get_or_create_observable_gauge("queue_depth", &MetricOptions::default(), |observer| {
            observer.observe(3.0, &[])
        })
        .unwrap();
    registry
        .get_or_create_up_down_counter("in_flight", &MetricOptions::default().unit("{request}"))
        .unwrap()
        .add(-1, &[]);

    assert_eq!(registry.len(), 3);
    assert!(registry.contains("queue_depth"));
    assert!(!registry.contains("missing"));
}

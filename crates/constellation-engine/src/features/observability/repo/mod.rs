use prometheus::{opts, CounterVec, Encoder, GaugeVec, Registry, TextEncoder};

pub struct ObservabilityRepository {
    registry: Registry,
    active_workers: GaugeVec,
    providers: GaugeVec,
    restart_total: CounterVec,
    provider_failures_total: CounterVec,
}

impl ObservabilityRepository {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();

        let active_workers = GaugeVec::new(
            opts!("constellation_active_workers", "Started workers per service"),
            &["service"],
        )
        .map_err(|e| e.to_string())?;
        let providers = GaugeVec::new(
            opts!("constellation_providers", "Registered providers per kind"),
            &["kind"],
        )
        .map_err(|e| e.to_string())?;
        let restart_total = CounterVec::new(
            opts!("constellation_restart_total", "Instance restarts by outcome"),
            &["service", "outcome"],
        )
        .map_err(|e| e.to_string())?;
        let provider_failures_total = CounterVec::new(
            opts!(
                "constellation_provider_failures_total",
                "Failed provider operations"
            ),
            &["kind", "operation"],
        )
        .map_err(|e| e.to_string())?;

        registry
            .register(Box::new(active_workers.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(providers.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(restart_total.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(provider_failures_total.clone()))
            .map_err(|e| e.to_string())?;

        Ok(Self {
            registry,
            active_workers,
            providers,
            restart_total,
            provider_failures_total,
        })
    }

    pub fn set_active_workers(&self, service: &str, count: f64) {
        self.active_workers.with_label_values(&[service]).set(count);
    }

    pub fn set_providers(&self, kind: &str, count: f64) {
        self.providers.with_label_values(&[kind]).set(count);
    }

    pub fn inc_restart_total(&self, service: &str, outcome: &str) {
        self.restart_total
            .with_label_values(&[service, outcome])
            .inc();
    }

    pub fn inc_provider_failures_total(&self, kind: &str, operation: &str) {
        self.provider_failures_total
            .with_label_values(&[kind, operation])
            .inc();
    }

    pub fn render_metrics(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}

use prometheus::{CounterVec, HistogramOpts, HistogramVec, IntGauge, Opts, Registry};

/// Prometheus metrics for the broker
pub struct BrokerMetrics {
    pub registry: Registry,

    // Invocation counters by outcome
    pub invocations_total: CounterVec,

    pub invocations_queued: IntGauge,
    pub invocations_running: IntGauge,

    pub execution_duration: HistogramVec,

    pub workers_connected: IntGauge,
}

impl BrokerMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let invocations_total = CounterVec::new(
            Opts::new(
                "taskq_invocations_total",
                "Invocations by outcome and task name",
            ),
            &["outcome", "task_name"],
        )?;
        registry.register(Box::new(invocations_total.clone()))?;

        let invocations_queued =
            IntGauge::new("taskq_invocations_queued", "Number of queued invocations")?;
        registry.register(Box::new(invocations_queued.clone()))?;

        let invocations_running =
            IntGauge::new("taskq_invocations_running", "Number of running invocations")?;
        registry.register(Box::new(invocations_running.clone()))?;

        let execution_duration = HistogramVec::new(
            HistogramOpts::new(
                "taskq_execution_duration_seconds",
                "Time from claim to result in seconds",
            ),
            &["task_name"],
        )?;
        registry.register(Box::new(execution_duration.clone()))?;

        let workers_connected =
            IntGauge::new("taskq_workers_connected", "Number of live workers")?;
        registry.register(Box::new(workers_connected.clone()))?;

        Ok(BrokerMetrics {
            registry,
            invocations_total,
            invocations_queued,
            invocations_running,
            execution_duration,
            workers_connected,
        })
    }

    pub fn inc_invocations(&self, outcome: &str, task_name: &str) {
        self.invocations_total
            .with_label_values(&[outcome, task_name])
            .inc();
    }

    pub fn observe_duration(&self, task_name: &str, duration_secs: f64) {
        self.execution_duration
            .with_label_values(&[task_name])
            .observe(duration_secs);
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        use prometheus::{Encoder, TextEncoder};

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = BrokerMetrics::new().unwrap();
        metrics.inc_invocations("succeeded", "add");
        metrics.invocations_queued.set(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("taskq_invocations_total{outcome=\"succeeded\",task_name=\"add\"} 1"));
        assert!(text.contains("taskq_invocations_queued 3"));
    }
}

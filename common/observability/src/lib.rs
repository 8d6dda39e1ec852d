use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Metrics bundle for the order service. Every collector is registered in `registry`,
/// which the `/metrics` route encodes.
#[derive(Clone)]
pub struct OrderMetrics {
    pub registry: Registry,
    pub orders_created_total: IntCounterVec,
    pub gateway_callbacks_total: IntCounterVec,
    pub tracking_transitions_total: IntCounterVec,
    pub return_transitions_total: IntCounterVec,
    pub refund_obligations_total: IntCounter,
    pub notification_failures_total: IntCounter,
    pub gateway_order_latency_seconds: Histogram,
    pub http_errors_total: IntCounterVec,
}

impl OrderMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let orders_created_total = IntCounterVec::new(
            Opts::new("orders_created_total", "Orders created, by payment method"),
            &["method"],
        )?;
        let gateway_callbacks_total = IntCounterVec::new(
            Opts::new("gateway_callbacks_total", "Payment gateway callbacks, by outcome"),
            &["outcome"],
        )?;
        let tracking_transitions_total = IntCounterVec::new(
            Opts::new("order_tracking_transitions_total", "Fulfillment tracking transitions, by target status"),
            &["status"],
        )?;
        let return_transitions_total = IntCounterVec::new(
            Opts::new("order_return_transitions_total", "Return request transitions, by target status"),
            &["status"],
        )?;
        let refund_obligations_total = IntCounter::new(
            "order_refund_obligations_total",
            "Gateway payments marked refunded and owed back to the customer",
        )?;
        let notification_failures_total = IntCounter::new(
            "order_notification_failures_total",
            "Best-effort customer notifications that failed to send",
        )?;
        let gateway_order_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "gateway_order_create_seconds",
                "Latency of creating an order at the payment gateway",
            ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        )?;
        let http_errors_total = IntCounterVec::new(
            Opts::new("http_errors_total", "Count of HTTP error responses emitted (status >= 400)"),
            &["service", "code", "status"],
        )?;
        registry.register(Box::new(orders_created_total.clone()))?;
        registry.register(Box::new(gateway_callbacks_total.clone()))?;
        registry.register(Box::new(tracking_transitions_total.clone()))?;
        registry.register(Box::new(return_transitions_total.clone()))?;
        registry.register(Box::new(refund_obligations_total.clone()))?;
        registry.register(Box::new(notification_failures_total.clone()))?;
        registry.register(Box::new(gateway_order_latency_seconds.clone()))?;
        registry.register(Box::new(http_errors_total.clone()))?;
        Ok(OrderMetrics {
            registry,
            orders_created_total,
            gateway_callbacks_total,
            tracking_transitions_total,
            return_transitions_total,
            refund_obligations_total,
            notification_failures_total,
            gateway_order_latency_seconds,
            http_errors_total,
        })
    }

    /// Text exposition of every registered collector.
    pub fn encode(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;
        let mut buf = Vec::new();
        prometheus::TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        let m = OrderMetrics::new().unwrap();
        m.orders_created_total.with_label_values(&["cod"]).inc();
        m.refund_obligations_total.inc();
        let text = m.encode().unwrap();
        assert!(text.contains("orders_created_total{method=\"cod\"} 1"));
        assert!(text.contains("order_refund_obligations_total 1"));
    }

    #[test]
    fn bundles_are_independent() {
        let a = OrderMetrics::new().unwrap();
        let b = OrderMetrics::new().unwrap();
        a.refund_obligations_total.inc();
        assert_eq!(b.refund_obligations_total.get(), 0);
    }
}

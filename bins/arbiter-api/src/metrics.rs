// Prometheus metrics exposed on GET /metrics

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref SUBMISSIONS_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("arbiter_submissions_received_total", "Submissions accepted and queued for judging"),
        &["language"]
    )
    .expect("static metric definition");

    pub static ref SUBMISSIONS_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("arbiter_submissions_rejected_total", "Submissions refused at intake"),
        &["reason"]
    )
    .expect("static metric definition");

    pub static ref SCOREBOARD_SECONDS: Histogram = Histogram::with_opts(HistogramOpts::new(
        "arbiter_scoreboard_compute_seconds",
        "Time spent computing a contest scoreboard"
    ))
    .expect("static metric definition");
}

/// Register every metric with the registry. Safe to call more than once.
pub fn register() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SUBMISSIONS_RECEIVED.clone()),
        Box::new(SUBMISSIONS_REJECTED.clone()),
        Box::new(SCOREBOARD_SECONDS.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_twice_and_render() {
        register().unwrap();
        register().unwrap();
        SUBMISSIONS_REJECTED.with_label_values(&["queue_full"]).inc();

        let text = render().unwrap();
        assert!(text.contains("arbiter_submissions_rejected_total"));
        assert!(text.contains("reason=\"queue_full\""));
    }
}

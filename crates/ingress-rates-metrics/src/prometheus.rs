//! Prometheus text exposition of the current rates.

use std::time::UNIX_EPOCH;

use ingress_rates_core::RateSnapshot;

/// Render the current snapshot (if any) into Prometheus text format.
pub fn render_prometheus(snapshot: Option<&RateSnapshot>) -> String {
    let mut out = String::new();

    out.push_str("# HELP ingress_requests_per_second Smoothed requests per second per service.\n");
    out.push_str("# TYPE ingress_requests_per_second gauge\n");
    if let Some(snap) = snapshot {
        for (key, rate) in snap.sorted() {
            out.push_str(&format!(
                "ingress_requests_per_second{{namespace=\"{}\",service=\"{}\"}} {:.3}\n",
                escape_label(&key.namespace),
                escape_label(&key.service),
                rate
            ));
        }
    }

    out.push_str("# HELP ingress_rates_last_cycle_timestamp_seconds Unix time of the last completed poll cycle.\n");
    out.push_str("# TYPE ingress_rates_last_cycle_timestamp_seconds gauge\n");
    if let Some(snap) = snapshot {
        let secs = snap
            .captured_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        out.push_str(&format!(
            "ingress_rates_last_cycle_timestamp_seconds {secs:.3}\n"
        ));
    }

    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

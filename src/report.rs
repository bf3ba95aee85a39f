use crate::http_probe::prelude::*;

/// Banner printed by `tallyprobe test`.
pub fn render(result: &ProbeResult) -> String {
    match result {
        ProbeResult::Success(success) => {
            let mut lines = vec![format!("✅ Connected to Tally at {}", success.url)];
            if let Some(name) = &success.company_name {
                lines.push(format!("   Company Name: {name}"));
            }
            if let Some(timings) = &success.timings {
                lines.push(format!(
                    "   Elapsed: {:.2}ms (dns: {}, liveness: {:.2}ms, company query: {:.2}ms)",
                    timings.total() * 1000.0,
                    timings
                        .dns_time
                        .map(|d| format!("{:.2}ms", d * 1000.0))
                        .unwrap_or_else(|| "N/A".to_string()),
                    timings.liveness_time * 1000.0,
                    timings.query_time * 1000.0,
                ));
            }
            lines.push(format!(
                "   Checked at: {}",
                success.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            lines.join("\n")
        }
        ProbeResult::Failure(failure) => {
            format!("❌ Connection Failed [{}]: {}", failure.cause, failure.message)
        }
    }
}

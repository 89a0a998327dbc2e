//! Human-readable run summary.

use std::fmt::Write;
use std::time::Duration;
use xorcheck_runtime::RunReport;
use xorcheck_runtime::dispatch::LoopTimings;

fn format_duration(d: Option<Duration>) -> String {
    match d {
        Some(d) => format!("{:.3}ms", d.as_secs_f64() * 1e3),
        None => "-".to_string(),
    }
}

fn format_loop(name: &str, timings: &LoopTimings, bandwidth: Option<f64>) -> String {
    let mut line = format!(
        "{name}: {} iterations, mean {}, min {}, total {}",
        timings.iterations(),
        format_duration(timings.mean()),
        format_duration(timings.min()),
        format_duration(Some(timings.total())),
    );
    if let Some(gbps) = bandwidth {
        let _ = write!(line, ", {gbps:.2} GB/s");
    }
    line
}

/// Formats the report as the lines the binary prints.
pub fn format_report(report: &RunReport) -> String {
    let plan = &report.plan;
    [
        format!(
            "Device: {} ({}) via {}",
            report.device_name, report.device_class, report.backend
        ),
        format!(
            "Grid: {} elements, global {}, local {} ({} padding)",
            plan.elements,
            plan.global_size,
            plan.local_size,
            plan.padding()
        ),
        format_loop("Dispatch", &report.dispatch, report.dispatch_bandwidth_gbps()),
        format_loop("Readback", &report.readback, report.readback_bandwidth_gbps()),
        format!("Results verified: {} elements match", plan.elements),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Some(Duration::from_micros(1500))), "1.500ms");
        assert_eq!(format_duration(None), "-");
    }

    #[test]
    fn test_format_loop_without_samples() {
        let line = format_loop("Dispatch", &LoopTimings::default(), None);
        assert_eq!(line, "Dispatch: 0 iterations, mean -, min -, total 0.000ms");
    }
}

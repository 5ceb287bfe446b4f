//! InfluxDB line protocol encoding
//!
//! One metric becomes one line:
//!
//! ```text
//! <metric_name>,uuid=...,hostname=... value=87.5 1736935800000000000
//! ```
//!
//! The metric name is the measurement; identifying fields become tags;
//! the numeric value is the single field; timestamps are nanoseconds.

use gpufleet_model::GpuMetric;

/// Append the line-protocol encoding of `metric` to `out`
pub fn encode_metric(metric: &GpuMetric, out: &mut String) {
    escape_measurement(&metric.metric_name, out);

    push_tag(out, "uuid", &metric.uuid);
    push_tag(out, "hostname", &metric.hostname);
    push_tag(out, "gpu_id", &metric.gpu_id.to_string());
    push_tag(out, "device", &metric.device);
    push_tag(out, "model", &metric.model_name);
    push_tag(out, "container", &metric.container);
    push_tag(out, "pod", &metric.pod);
    push_tag(out, "namespace", &metric.namespace);

    out.push_str(" value=");
    out.push_str(&format_float(metric.value));

    out.push(' ');
    out.push_str(
        &metric
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .to_string(),
    );
    out.push('\n');
}

/// Tags with empty values are omitted; the line protocol forbids them
fn push_tag(out: &mut String, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    out.push(',');
    out.push_str(key);
    out.push('=');
    escape_tag_value(value, out);
}

fn escape_measurement(name: &str, out: &mut String) {
    for c in name.chars() {
        match c {
            ',' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}

fn escape_tag_value(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            ',' | '=' | ' ' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}

/// Floats that happen to be integral still need a fractional part so the
/// field type stays consistent across writes.
fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn metric() -> GpuMetric {
        let mut metric = GpuMetric::new("DCGM_FI_DEV_GPU_UTIL", "GPU-aaa", 87.5);
        metric.timestamp = chrono::Utc.with_ymd_and_hms(2026, 1, 15, 10, 30, 0).unwrap();
        metric.gpu_id = 3;
        metric.hostname = "dgx-07".into();
        metric.device = "nvidia3".into();
        metric.model_name = "NVIDIA H100 80GB HBM3".into();
        metric
    }

    #[test]
    fn encodes_measurement_tags_field_and_timestamp() {
        let mut out = String::new();
        encode_metric(&metric(), &mut out);
        assert_eq!(
            out,
            "DCGM_FI_DEV_GPU_UTIL,uuid=GPU-aaa,hostname=dgx-07,gpu_id=3,device=nvidia3,\
             model=NVIDIA\\ H100\\ 80GB\\ HBM3 value=87.5 1768473000000000000\n"
        );
    }

    #[test]
    fn empty_tags_are_dropped() {
        let mut out = String::new();
        encode_metric(&GpuMetric::new("M", "GPU-x", 1.5), &mut out);
        assert!(!out.contains("hostname"));
        assert!(!out.contains("container"));
        assert!(out.contains(",uuid=GPU-x,"));
    }

    #[test]
    fn special_characters_are_escaped() {
        let mut m = metric();
        m.metric_name = "util, raw".into();
        m.hostname = "host=1 west".into();
        let mut out = String::new();
        encode_metric(&m, &mut out);
        assert!(out.starts_with("util\\,\\ raw,"));
        assert!(out.contains("hostname=host\\=1\\ west"));
    }

    #[test]
    fn integral_values_keep_a_fractional_part() {
        let mut out = String::new();
        encode_metric(&GpuMetric::new("M", "GPU-x", 63.0), &mut out);
        assert!(out.contains(" value=63.0 "));
    }
}

use super::*;

fn sample_metric() -> GpuMetric {
    let mut metric = GpuMetric::new(METRIC_GPU_UTIL, "GPU-8f2a4b1c", 87.5);
    metric.gpu_id = 3;
    metric.device = "nvidia3".into();
    metric.model_name = "NVIDIA H100 80GB HBM3".into();
    metric.hostname = "dgx-07".into();
    metric
}

#[test]
fn validate_accepts_complete_metric() {
    assert!(sample_metric().validate().is_ok());
}

#[test]
fn validate_rejects_missing_metric_name() {
    let mut metric = sample_metric();
    metric.metric_name.clear();
    assert_eq!(
        metric.validate(),
        Err(ModelError::MissingField("metric_name"))
    );
}

#[test]
fn validate_rejects_missing_uuid() {
    let mut metric = sample_metric();
    metric.uuid.clear();
    assert_eq!(metric.validate(), Err(ModelError::MissingField("uuid")));
}

#[test]
fn json_round_trip_is_identity() {
    let mut metric = sample_metric();
    metric.container = "trainer".into();
    metric.pod = "trainer-0".into();
    metric.namespace = "ml".into();
    metric.labels.insert("driver".into(), "550.54".into());

    let json = serde_json::to_string(&metric).unwrap();
    let decoded: GpuMetric = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, metric);
}

#[test]
fn empty_kubernetes_fields_are_omitted() {
    let json = serde_json::to_string(&sample_metric()).unwrap();
    assert!(!json.contains("container"));
    assert!(!json.contains("\"pod\""));
    assert!(!json.contains("namespace"));
    assert!(!json.contains("labels"));
}

#[test]
fn unknown_fields_are_ignored_on_decode() {
    let json = r#"{
        "timestamp": "2026-01-15T10:30:00Z",
        "metric_name": "DCGM_FI_DEV_GPU_UTIL",
        "uuid": "GPU-abc",
        "value": 12.0,
        "future_field": {"nested": true}
    }"#;
    let metric: GpuMetric = serde_json::from_str(json).unwrap();
    assert_eq!(metric.metric_name, METRIC_GPU_UTIL);
    assert_eq!(metric.value, 12.0);
    assert_eq!(metric.gpu_id, 0);
}

#[test]
fn gpu_info_widens_seen_window() {
    let metric = sample_metric();
    let mut info = GpuInfo::from_metric(&metric);

    let earlier = metric.timestamp - chrono::Duration::seconds(60);
    let later = metric.timestamp + chrono::Duration::seconds(60);
    info.observe(later);
    info.observe(earlier);

    assert_eq!(info.first_seen, earlier);
    assert_eq!(info.last_seen, later);
}

#[test]
fn metric_units_for_known_names() {
    assert_eq!(metric_unit(METRIC_GPU_UTIL), "%");
    assert_eq!(metric_unit(METRIC_SM_CLOCK), "MHz");
    assert_eq!(metric_unit(METRIC_POWER_USAGE), "W");
    assert_eq!(metric_unit("DCGM_FI_DEV_SOMETHING_ELSE"), "");
}

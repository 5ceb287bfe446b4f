use std::io::Write;

use tempfile::NamedTempFile;

use super::*;

const SAMPLE: &str = "\
timestamp,metric_name,gpu_id,device,uuid,modelname,hostname,container,pod,namespace,value,labels_raw
2026-01-15T10:00:00Z,DCGM_FI_DEV_GPU_UTIL,0,nvidia0,GPU-aaa,NVIDIA H100,dgx-01,trainer,trainer-0,ml,95.5,\"driver=\"\"550.54\"\"\"
2026-01-15T10:00:00Z,DCGM_FI_DEV_GPU_TEMP,1,nvidia1,GPU-bbb,NVIDIA H100,dgx-01,,,,63,
";

fn write_csv(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn reads_rows_into_metrics() {
    let file = write_csv(SAMPLE);
    let mut source = CsvSource::open(file.path()).unwrap();

    let first = source.read_next().unwrap().unwrap();
    assert_eq!(first.metric_name, "DCGM_FI_DEV_GPU_UTIL");
    assert_eq!(first.uuid, "GPU-aaa");
    assert_eq!(first.gpu_id, 0);
    assert_eq!(first.hostname, "dgx-01");
    assert_eq!(first.container, "trainer");
    assert_eq!(first.value, 95.5);
    assert_eq!(first.labels["driver"], "550.54");

    let second = source.read_next().unwrap().unwrap();
    assert_eq!(second.metric_name, "DCGM_FI_DEV_GPU_TEMP");
    assert_eq!(second.gpu_id, 1);
    assert!(second.container.is_empty());
    assert!(second.labels.is_empty());

    assert!(source.read_next().unwrap().is_none());
}

#[test]
fn headers_match_case_insensitively() {
    let file = write_csv(
        "UUID,Metric_Name,VALUE\nGPU-x,DCGM_FI_DEV_GPU_UTIL,50\n",
    );
    let mut source = CsvSource::open(file.path()).unwrap();
    let metric = source.read_next().unwrap().unwrap();
    assert_eq!(metric.uuid, "GPU-x");
    assert_eq!(metric.value, 50.0);
}

#[test]
fn row_without_uuid_is_rejected() {
    let file = write_csv("uuid,metric_name,value\n,DCGM_FI_DEV_GPU_UTIL,50\n");
    let mut source = CsvSource::open(file.path()).unwrap();
    let err = source.read_next().unwrap_err();
    assert!(matches!(err, ParserError::InvalidRecord(_)));
}

#[test]
fn unparseable_numbers_default_to_zero() {
    let file = write_csv("uuid,metric_name,gpu_id,value\nGPU-x,M,not-a-number,nan?\n");
    let mut source = CsvSource::open(file.path()).unwrap();
    let metric = source.read_next().unwrap().unwrap();
    assert_eq!(metric.gpu_id, 0);
    assert_eq!(metric.value, 0.0);
}

#[test]
fn reset_rewinds_to_the_first_row() {
    let file = write_csv(SAMPLE);
    let mut source = CsvSource::open(file.path()).unwrap();

    let batch = source.read_batch(10).unwrap();
    assert_eq!(batch.len(), 2);

    source.reset().unwrap();
    let again = source.read_next().unwrap().unwrap();
    assert_eq!(again.uuid, "GPU-aaa");
}

#[test]
fn validate_requires_columns_and_a_record() {
    let good = write_csv(SAMPLE);
    validate_file(good.path()).unwrap();

    let missing = write_csv("uuid,value\nGPU-x,1\n");
    assert!(matches!(
        validate_file(missing.path()),
        Err(ParserError::MissingColumn("metric_name"))
    ));

    let empty = write_csv("uuid,metric_name,value\n");
    assert!(matches!(validate_file(empty.path()), Err(ParserError::Empty)));
}

#[test]
fn count_ignores_the_header_row() {
    let file = write_csv(SAMPLE);
    assert_eq!(count_records(file.path()).unwrap(), 2);
}

use prometheus_exporter::prometheus::{
    default_registry, register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    HistogramTimer, HistogramVec, IntCounterVec,
};

pub fn create_histogram_vec(name: &str, help: &str, label_names: &[&str]) -> HistogramVec {
    let registry = default_registry();
    register_histogram_vec_with_registry!(name, help, label_names, registry)
        .expect("failed to create histogram")
}

pub fn create_int_counter_vec(name: &str, help: &str, label_names: &[&str]) -> IntCounterVec {
    let registry = default_registry();
    register_int_counter_vec_with_registry!(name, help, label_names, registry)
        .expect("failed to create int counter")
}

pub fn start_timer_vec(histogram_vec: &HistogramVec, label_values: &[&str]) -> HistogramTimer {
    histogram_vec.with_label_values(label_values).start_timer()
}

pub fn stop_timer(timer: HistogramTimer) {
    timer.observe_duration()
}

pub fn inc_counter_vec(counter_vec: &IntCounterVec, label_values: &[&str]) {
    counter_vec.with_label_values(label_values).inc()
}

lazy_static::lazy_static! {
    pub static ref BLOCK_HARNESS_TIMES: HistogramVec = create_histogram_vec(
        "trin_block_harness_times",
        "Duration of the sections it takes to build, mine and import a test block",
        &["section"]
    );
    pub static ref BLOCK_IMPORTS: IntCounterVec = create_int_counter_vec(
        "trin_block_harness_imports",
        "Outcome of block imports into a test chain",
        &["outcome"]
    );
}

//! 路面分析指标收集模块
//!
//! 基于 AnalysisResult 收集和统计分析引擎的运行指标。

use std::collections::HashMap;

use contracts::{AnalysisResult, AnomalyKind, QualityLabel, RoughnessIndex, SensorKind};
use metrics::{counter, gauge, histogram};

/// 从 AnalysisResult 记录指标
///
/// 每个 tick 产生结果时调用。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_analysis_metrics;
///
/// let result = engine.tick(t)?;
/// record_analysis_metrics(&result);
/// ```
pub fn record_analysis_metrics(result: &AnalysisResult) {
    // 帧计数器
    counter!("road_frames_total").increment(1);

    // 帧 ID (用于检测跳帧)
    gauge!("road_last_frame_id").set(result.frame_id as f64);

    // 粗糙度指数
    match result.roughness_index {
        RoughnessIndex::Determined(value) => {
            histogram!("road_roughness_index").record(value);
            gauge!("road_roughness_index_current").set(value);
        }
        RoughnessIndex::Undetermined => {
            counter!("road_roughness_undetermined_total").increment(1);
        }
    }

    // 质量标签
    counter!(
        "road_quality_label_total",
        "label" => result.quality_label.as_str()
    )
    .increment(1);
    if let Some(score) = result.quality_label.score() {
        gauge!("road_quality_score").set(score as f64);
    }

    // 车速
    if let Some(speed) = result.speed_mps {
        gauge!("road_speed_mps").set(speed);
    }

    // 异常事件
    for event in &result.anomalies {
        counter!("road_anomalies_total", "kind" => event.kind.as_str()).increment(1);
        histogram!("road_anomaly_severity").record(event.severity);
    }

    // 缺失传感器
    let missing_count = result.health.missing_sensors.len();
    gauge!("road_sensors_missing").set(missing_count as f64);
    for kind in &result.health.missing_sensors {
        counter!("road_sensor_missing_total", "sensor" => kind.as_str()).increment(1);
    }

    // 降级处理
    if !result.health.stage_faults.is_empty() {
        counter!("road_stage_faults_total").increment(result.health.stage_faults.len() as u64);
    }
}

/// 记录传感器采样提交
pub fn record_sample_submitted(sensor: &str) {
    counter!(
        "road_samples_submitted_total",
        "sensor" => sensor.to_string()
    )
    .increment(1);
}

/// 记录缓冲区溢出 (最旧样本被丢弃)
pub fn record_buffer_overflow(sensor: &str) {
    counter!(
        "road_buffer_overflow_total",
        "sensor" => sensor.to_string()
    )
    .increment(1);
}

/// 记录 tick 节拍丢失
pub fn record_timing_fault() {
    counter!("road_timing_faults_total").increment(1);
}

/// 记录结果分发
pub fn record_result_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "road_results_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录缓冲区深度
pub fn record_buffer_depth(sensor: &str, depth: usize) {
    gauge!(
        "road_buffer_depth",
        "sensor" => sensor.to_string()
    )
    .set(depth as f64);
}

/// 分析指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct AnalysisMetricsAggregator {
    /// 总帧数
    pub total_frames: u64,

    /// 粗糙度未确定的帧数
    pub undetermined_frames: u64,

    /// 有缺失传感器的帧数
    pub frames_with_missing: u64,

    /// 降级处理次数
    pub stage_faults: u64,

    /// 粗糙度统计
    pub roughness_stats: RunningStats,

    /// 车速统计
    pub speed_stats: RunningStats,

    /// 各质量标签帧数
    pub label_counts: HashMap<QualityLabel, u64>,

    /// 各类型异常数
    pub anomaly_counts: HashMap<AnomalyKind, u64>,

    /// 各传感器缺失次数
    pub missing_counts: HashMap<SensorKind, u64>,
}

impl AnalysisMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, result: &AnalysisResult) {
        self.total_frames += 1;
        self.stage_faults += result.health.stage_faults.len() as u64;

        match result.roughness_index {
            RoughnessIndex::Determined(value) => self.roughness_stats.push(value),
            RoughnessIndex::Undetermined => self.undetermined_frames += 1,
        }

        if let Some(speed) = result.speed_mps {
            self.speed_stats.push(speed);
        }

        *self.label_counts.entry(result.quality_label).or_insert(0) += 1;

        for event in &result.anomalies {
            *self.anomaly_counts.entry(event.kind).or_insert(0) += 1;
        }

        if !result.health.missing_sensors.is_empty() {
            self.frames_with_missing += 1;
            for kind in &result.health.missing_sensors {
                *self.missing_counts.entry(*kind).or_insert(0) += 1;
            }
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let rate = |n: u64| {
            if self.total_frames > 0 {
                n as f64 / self.total_frames as f64 * 100.0
            } else {
                0.0
            }
        };

        let mut labels: Vec<(QualityLabel, u64)> = QualityLabel::BANDS
            .iter()
            .chain(std::iter::once(&QualityLabel::Unknown))
            .filter_map(|label| self.label_counts.get(label).map(|n| (*label, *n)))
            .collect();
        labels.retain(|(_, n)| *n > 0);

        let mut anomalies: Vec<(AnomalyKind, u64)> =
            self.anomaly_counts.iter().map(|(k, n)| (*k, *n)).collect();
        anomalies.sort_by_key(|(k, _)| k.as_str());

        let mut missing: Vec<(SensorKind, u64)> =
            self.missing_counts.iter().map(|(k, n)| (*k, *n)).collect();
        missing.sort_by_key(|(k, _)| k.as_str());

        MetricsSummary {
            total_frames: self.total_frames,
            undetermined_frames: self.undetermined_frames,
            frames_with_missing: self.frames_with_missing,
            stage_faults: self.stage_faults,
            undetermined_rate: rate(self.undetermined_frames),
            missing_rate: rate(self.frames_with_missing),
            roughness: StatsSummary::from(&self.roughness_stats),
            speed_mps: StatsSummary::from(&self.speed_stats),
            label_counts: labels,
            anomaly_counts: anomalies,
            sensor_missing_counts: missing,
        }
    }

    /// 异常总数
    pub fn total_anomalies(&self) -> u64 {
        self.anomaly_counts.values().sum()
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub undetermined_frames: u64,
    pub frames_with_missing: u64,
    pub stage_faults: u64,
    pub undetermined_rate: f64,
    pub missing_rate: f64,
    pub roughness: StatsSummary,
    pub speed_mps: StatsSummary,
    pub label_counts: Vec<(QualityLabel, u64)>,
    pub anomaly_counts: Vec<(AnomalyKind, u64)>,
    pub sensor_missing_counts: Vec<(SensorKind, u64)>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Road Analysis Summary ===")?;
        writeln!(f, "Total frames: {}", self.total_frames)?;
        writeln!(
            f,
            "Undetermined roughness: {} ({:.2}%)",
            self.undetermined_frames, self.undetermined_rate
        )?;
        writeln!(
            f,
            "Frames with missing sensors: {} ({:.2}%)",
            self.frames_with_missing, self.missing_rate
        )?;
        writeln!(f, "Stage faults: {}", self.stage_faults)?;
        writeln!(f, "Roughness index: {}", self.roughness)?;
        writeln!(f, "Speed (m/s): {}", self.speed_mps)?;

        if !self.label_counts.is_empty() {
            writeln!(f, "Quality labels:")?;
            for (label, count) in &self.label_counts {
                writeln!(f, "  {}: {}", label, count)?;
            }
        }

        if !self.anomaly_counts.is_empty() {
            writeln!(f, "Anomalies:")?;
            for (kind, count) in &self.anomaly_counts {
                writeln!(f, "  {}: {}", kind, count)?;
            }
        }

        if !self.sensor_missing_counts.is_empty() {
            writeln!(f, "Missing sensor counts:")?;
            for (sensor, count) in &self.sensor_missing_counts {
                writeln!(f, "  {}: {}", sensor, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

//! Mock 传感器源
//!
//! 按路面脚本生成加速度计 / GPS / LiDAR 数据，写入 ingest 接口。
//! 同一 seed 产生完全相同的样本序列。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use contracts::{AccelReading, GpsFix, LidarPoint, LidarScan, SamplePayload, SensorKind};
use fusion_engine::{IngestHandle, TickClock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::decoder::LidarFrameDecoder;
use crate::error::Result;
use crate::metrics::{IngestionMetrics, MetricsSnapshot};
use crate::road::RoadScript;

const GRAVITY: f64 = 9.81;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Mock 驱动配置
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// 随机种子
    pub seed: u64,

    /// 脚本零点对应的时钟时刻 (秒)
    pub start_s: f64,

    /// 车速 (m/s)
    pub speed_mps: f64,

    /// 起点纬度 / 经度 (度)
    pub origin: (f64, f64),

    /// 行驶方向 (度, 正北为 0)
    pub heading_deg: f64,

    /// 采样率 (Hz)
    pub accel_hz: f64,
    pub gps_hz: f64,
    pub lidar_hz: f64,

    /// 加速度计采样相位 (秒)，避免样本正好落在窗口边界
    pub accel_phase_s: f64,

    /// 加速度计均匀噪声幅值 (m/s²)
    pub accel_noise: f64,

    /// 测距均匀噪声幅值 (mm)
    pub range_noise_mm: f64,

    /// 每帧点数
    pub lidar_points: usize,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            start_s: 0.0,
            speed_mps: 10.0,
            origin: (31.2304, 121.4737),
            heading_deg: 90.0,
            accel_hz: 100.0,
            gps_hz: 1.0,
            lidar_hz: 10.0,
            accel_phase_s: 0.005,
            accel_noise: 0.02,
            range_noise_mm: 1.5,
            lidar_points: 120,
        }
    }
}

/// 确定性的合成行驶
///
/// 每种传感器按各自频率生成样本；`emit_until` 按时间戳顺序写入所有不晚于给定时刻的样本。
pub struct SyntheticDrive {
    script: RoadScript,
    config: DriveConfig,
    rng: StdRng,
    decoder: LidarFrameDecoder,
    metrics: Arc<IngestionMetrics>,
    /// 每种传感器已生成的样本数 (Accel, Gps, Lidar)
    emitted: [u64; 3],
}

impl SyntheticDrive {
    /// 创建合成行驶
    ///
    /// # Errors
    /// 脚本非法 (`InvalidScript`)
    pub fn new(script: RoadScript, config: DriveConfig) -> Result<Self> {
        script.validate()?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            script,
            config,
            decoder: LidarFrameDecoder::default(),
            metrics: Arc::new(IngestionMetrics::new()),
            emitted: [0; 3],
        })
    }

    pub fn script(&self) -> &RoadScript {
        &self.script
    }

    pub fn metrics(&self) -> &Arc<IngestionMetrics> {
        &self.metrics
    }

    /// 脚本结束的时钟时刻
    pub fn end_s(&self) -> f64 {
        self.config.start_s + self.script.duration_s()
    }

    pub fn is_finished(&self) -> bool {
        self.next_sample().is_none()
    }

    /// 写入所有时间戳 <= `t` 的样本，返回写入数
    pub fn emit_until(&mut self, handle: &IngestHandle, t: f64) -> usize {
        let mut count = 0;
        while let Some((kind, timestamp)) = self.next_sample() {
            if timestamp > t {
                break;
            }
            self.emitted[slot(kind)] += 1;
            if let Some(payload) = self.generate(kind, timestamp) {
                let outcome = handle.submit(kind, timestamp, payload);
                self.metrics.record_submit(outcome);
                count += 1;
            }
        }
        if count > 0 {
            trace!(t, count, "synthetic samples emitted");
        }
        count
    }

    /// 下一个待生成样本 (时间戳最早者)
    fn next_sample(&self) -> Option<(SensorKind, f64)> {
        let end = self.end_s();
        [SensorKind::Accel, SensorKind::Gps, SensorKind::Lidar]
            .into_iter()
            .map(|kind| (kind, self.timestamp_of(kind, self.emitted[slot(kind)])))
            .filter(|&(_, ts)| ts < end)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn timestamp_of(&self, kind: SensorKind, index: u64) -> f64 {
        let (hz, phase) = match kind {
            SensorKind::Accel => (self.config.accel_hz, self.config.accel_phase_s),
            SensorKind::Gps => (self.config.gps_hz, 0.0),
            SensorKind::Lidar => (self.config.lidar_hz, 0.0),
        };
        self.config.start_s + phase + index as f64 / hz
    }

    fn generate(&mut self, kind: SensorKind, timestamp: f64) -> Option<SamplePayload> {
        let s = timestamp - self.config.start_s;
        match kind {
            SensorKind::Accel => Some(SamplePayload::Accel(self.accel_at(s))),
            SensorKind::Gps => Some(SamplePayload::Gps(self.fix_at(s))),
            SensorKind::Lidar => self.lidar_at(s).map(SamplePayload::Lidar),
        }
    }

    fn accel_at(&mut self, s: f64) -> AccelReading {
        let noise = self.config.accel_noise;
        AccelReading {
            x: self.uniform(noise),
            y: self.uniform(noise),
            z: GRAVITY + self.script.vertical_excitation(s) + self.uniform(noise),
        }
    }

    fn fix_at(&self, s: f64) -> GpsFix {
        let distance = self.config.speed_mps * s;
        let heading = self.config.heading_deg.to_radians();
        let (lat0, lon0) = self.config.origin;

        let dlat = (distance * heading.cos() / EARTH_RADIUS_M).to_degrees();
        let dlon =
            (distance * heading.sin() / (EARTH_RADIUS_M * lat0.to_radians().cos())).to_degrees();

        GpsFix {
            latitude: lat0 + dlat,
            longitude: lon0 + dlon,
            altitude: 4.0,
            satellites: Some(9),
        }
    }

    /// 生成一帧扫描，经原始帧编码/解码后返回
    fn lidar_at(&mut self, s: f64) -> Option<LidarScan> {
        let n = self.config.lidar_points.max(1);
        let mut points = Vec::with_capacity(n);
        for i in 0..n {
            let angle_deg = i as f64 * 360.0 / n as f64;
            let ground = angle_deg <= 45.0 || angle_deg >= 315.0;
            let base = if ground { 300.0 } else { 2500.0 };
            let distance_mm = base
                + self.script.range_offset_mm(s, angle_deg)
                + self.uniform(self.config.range_noise_mm);
            points.push(LidarPoint {
                angle_deg,
                distance_mm,
            });
        }

        let frame = LidarFrameDecoder::encode(&LidarScan { points });
        match self.decoder.decode(&frame) {
            Ok(scan) => {
                self.metrics.record_frame_decoded();
                Some(scan)
            }
            Err(e) => {
                self.metrics.record_decode_error();
                warn!(error = %e, "lidar frame dropped");
                None
            }
        }
    }

    fn uniform(&mut self, amplitude: f64) -> f64 {
        if amplitude > 0.0 {
            self.rng.random_range(-amplitude..amplitude)
        } else {
            0.0
        }
    }
}

fn slot(kind: SensorKind) -> usize {
    match kind {
        SensorKind::Accel => 0,
        SensorKind::Gps => 1,
        SensorKind::Lidar => 2,
    }
}

/// Mock 传感器源
///
/// 在后台任务中按时钟推进合成行驶，模拟实时驱动。
pub struct MockSensorSource {
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl MockSensorSource {
    /// 创建新的 Mock 传感器源
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 启动 Mock 源
    ///
    /// 任务在脚本结束或 `stop()` 后退出，返回 ingestion 计数。
    pub fn start<C>(
        &self,
        mut drive: SyntheticDrive,
        handle: IngestHandle,
        clock: C,
    ) -> JoinHandle<MetricsSnapshot>
    where
        C: TickClock + 'static,
    {
        let running = self.running.clone();
        let poll_interval = self.poll_interval;
        running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            debug!(
                duration_s = drive.script().duration_s(),
                "mock sensor source started"
            );

            let mut ticker = tokio::time::interval(poll_interval);
            while running.load(Ordering::Relaxed) && !drive.is_finished() {
                ticker.tick().await;
                drive.emit_until(&handle, clock.now());
            }

            running.store(false, Ordering::SeqCst);
            debug!("mock sensor source stopped");
            drive.metrics().snapshot()
        })
    }

    /// 停止 Mock 源
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::AnalysisConfig;
    use fusion_engine::{ConfigStore, FusionEngine, MonotonicClock};

    fn engine() -> FusionEngine {
        FusionEngine::new(ConfigStore::new(AnalysisConfig::default()).unwrap())
    }

    #[test]
    fn test_emit_rates() {
        let engine = engine();
        let handle = engine.ingest_handle();
        let mut drive =
            SyntheticDrive::new(RoadScript::new().smooth(10.0), DriveConfig::default()).unwrap();

        drive.emit_until(&handle, 1.999);

        let snap = drive.metrics().snapshot();
        // 200 accel + 2 gps + 20 lidar
        assert_eq!(snap.samples_submitted, 222);
        assert_eq!(snap.frames_decoded, 20);
        assert_eq!(snap.samples_rejected, 0);
    }

    #[test]
    fn test_same_seed_same_samples() {
        let script = RoadScript::new().rough(2.0, 1.0, 15.0);
        let mut a = SyntheticDrive::new(script.clone(), DriveConfig::default()).unwrap();
        let mut b = SyntheticDrive::new(script, DriveConfig::default()).unwrap();

        for s in [0.005, 0.515, 1.205] {
            assert_eq!(a.accel_at(s), b.accel_at(s));
        }
    }

    #[test]
    fn test_gps_moves_along_heading() {
        let drive = SyntheticDrive::new(RoadScript::new().smooth(10.0), DriveConfig::default())
            .unwrap();
        let a = drive.fix_at(0.0);
        let b = drive.fix_at(1.0);
        let moved = fusion_engine::haversine_m(&a, &b);
        assert!((moved - 10.0).abs() < 0.01, "moved {moved}");
        assert!((a.latitude - b.latitude).abs() < 1e-9);
    }

    #[test]
    fn test_drive_finishes_at_script_end() {
        let engine = engine();
        let handle = engine.ingest_handle();
        let mut drive =
            SyntheticDrive::new(RoadScript::new().smooth(1.0), DriveConfig::default()).unwrap();

        assert!(!drive.is_finished());
        drive.emit_until(&handle, 5.0);
        assert!(drive.is_finished());
        assert_eq!(drive.emit_until(&handle, 10.0), 0);
    }

    #[tokio::test]
    async fn test_mock_source_runs_to_completion() {
        let engine = engine();
        let drive =
            SyntheticDrive::new(RoadScript::new().smooth(0.2), DriveConfig::default()).unwrap();
        let source = MockSensorSource::new(Duration::from_millis(5));

        let task = source.start(drive, engine.ingest_handle(), MonotonicClock::new());
        let snap = task.await.unwrap();

        assert!(!source.is_running());
        assert_eq!(snap.samples_submitted, 20 + 1 + 2);
    }
}

//! RawSample - Ingest 输入
//!
//! 原始传感器采样结构。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::RoadError;

/// 传感器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// 测距 LiDAR
    Lidar,
    /// GPS 定位
    Gps,
    /// 三轴加速度计
    Accel,
}

impl SensorKind {
    /// 全部传感器类型（固定顺序）
    pub const ALL: [SensorKind; 3] = [SensorKind::Lidar, SensorKind::Gps, SensorKind::Accel];

    /// 名称 (用于日志/指标标签)
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Lidar => "lidar",
            SensorKind::Gps => "gps",
            SensorKind::Accel => "accel",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 原始采样
///
/// 由外部传感器驱动创建，写入后不可变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// 传感器类型
    pub kind: SensorKind,

    /// 采集时间戳 (seconds, f64) - 主时钟
    pub timestamp: f64,

    /// 数据载荷
    pub payload: SamplePayload,
}

impl RawSample {
    /// 创建并校验采样
    ///
    /// # Errors
    /// 载荷与类型不匹配、时间戳或数值非有限时返回 `MalformedSample`
    pub fn new(kind: SensorKind, timestamp: f64, payload: SamplePayload) -> Result<Self, RoadError> {
        if !timestamp.is_finite() {
            return Err(RoadError::malformed(kind, "non-finite timestamp"));
        }
        if payload.kind() != kind {
            return Err(RoadError::malformed(
                kind,
                format!("payload is a {} reading", payload.kind()),
            ));
        }
        payload.check_finite().map_err(|m| RoadError::malformed(kind, m))?;

        Ok(Self {
            kind,
            timestamp,
            payload,
        })
    }

    /// 加速度载荷
    pub fn as_accel(&self) -> Option<&AccelReading> {
        match &self.payload {
            SamplePayload::Accel(reading) => Some(reading),
            _ => None,
        }
    }

    /// GPS 载荷
    pub fn as_gps(&self) -> Option<&GpsFix> {
        match &self.payload {
            SamplePayload::Gps(fix) => Some(fix),
            _ => None,
        }
    }

    /// LiDAR 载荷
    pub fn as_lidar(&self) -> Option<&LidarScan> {
        match &self.payload {
            SamplePayload::Lidar(scan) => Some(scan),
            _ => None,
        }
    }
}

/// 传感器数据载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SamplePayload {
    /// LiDAR 扫描 (距离数组)
    Lidar(LidarScan),

    /// GPS 定位
    Gps(GpsFix),

    /// 三轴加速度
    Accel(AccelReading),
}

impl SamplePayload {
    /// 载荷对应的传感器类型
    pub fn kind(&self) -> SensorKind {
        match self {
            SamplePayload::Lidar(_) => SensorKind::Lidar,
            SamplePayload::Gps(_) => SensorKind::Gps,
            SamplePayload::Accel(_) => SensorKind::Accel,
        }
    }

    fn check_finite(&self) -> Result<(), String> {
        match self {
            SamplePayload::Accel(a) => {
                if a.x.is_finite() && a.y.is_finite() && a.z.is_finite() {
                    Ok(())
                } else {
                    Err("non-finite acceleration".to_string())
                }
            }
            SamplePayload::Gps(fix) => {
                if !(fix.latitude.is_finite()
                    && fix.longitude.is_finite()
                    && fix.altitude.is_finite())
                {
                    return Err("non-finite coordinates".to_string());
                }
                if fix.latitude.abs() > 90.0 || fix.longitude.abs() > 180.0 {
                    return Err(format!(
                        "coordinates out of range: ({}, {})",
                        fix.latitude, fix.longitude
                    ));
                }
                Ok(())
            }
            SamplePayload::Lidar(scan) => {
                match scan
                    .points
                    .iter()
                    .position(|p| !(p.angle_deg.is_finite() && p.distance_mm.is_finite()))
                {
                    Some(idx) => Err(format!("non-finite point at index {idx}")),
                    None => Ok(()),
                }
            }
        }
    }
}

/// LiDAR 扫描
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LidarScan {
    /// 测距点 (角度, 距离)
    pub points: Vec<LidarPoint>,
}

/// LiDAR 测距点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LidarPoint {
    /// 角度 (度, 0-360)
    pub angle_deg: f64,

    /// 距离 (毫米)
    pub distance_mm: f64,
}

/// GPS 定位
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    /// 纬度 (度)
    pub latitude: f64,

    /// 经度 (度)
    pub longitude: f64,

    /// 高度 (米)
    pub altitude: f64,

    /// 可见卫星数
    #[serde(default)]
    pub satellites: Option<u8>,
}

/// 三轴加速度 (m/s²)，z 为竖直轴
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

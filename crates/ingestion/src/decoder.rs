//! LiDAR 原始帧解码
//!
//! 帧格式: 连续的 8 字节记录 `(angle_deg: f32 LE, distance_mm: f32 LE)`。

use bytemuck::{Pod, Zeroable};
use bytes::{BufMut, Bytes, BytesMut};
use contracts::{LidarPoint, LidarScan, RoadError, SensorKind};

use crate::error::{IngestionError, Result};

/// 单条记录 (按字节存放，无对齐要求)
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PackedPoint {
    angle_le: [u8; 4],
    distance_le: [u8; 4],
}

/// 单条记录字节数
pub const RECORD_SIZE: usize = std::mem::size_of::<PackedPoint>();

/// 默认点数上限 (一圈扫描)
const DEFAULT_MAX_POINTS: usize = 8192;

/// LiDAR 帧解码器
#[derive(Debug, Clone, Copy)]
pub struct LidarFrameDecoder {
    max_points: usize,
}

impl Default for LidarFrameDecoder {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

impl LidarFrameDecoder {
    pub fn with_max_points(max_points: usize) -> Self {
        Self { max_points }
    }

    /// 解码一帧
    ///
    /// # Errors
    /// - 帧被截断 (`TruncatedFrame`)
    /// - 点数超限 (`OversizedFrame`)
    /// - 含非有限值 (`MalformedSample`)
    pub fn decode(&self, frame: &[u8]) -> Result<LidarScan> {
        let records: &[PackedPoint] =
            bytemuck::try_cast_slice(frame).map_err(|_| IngestionError::TruncatedFrame {
                len: frame.len(),
                record_size: RECORD_SIZE,
            })?;

        if records.len() > self.max_points {
            return Err(IngestionError::OversizedFrame {
                points: records.len(),
                max_points: self.max_points,
            });
        }

        let mut points = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let angle = f32::from_le_bytes(record.angle_le);
            let distance = f32::from_le_bytes(record.distance_le);
            if !angle.is_finite() || !distance.is_finite() {
                return Err(RoadError::malformed(
                    SensorKind::Lidar,
                    format!("non-finite value in record {idx}"),
                )
                .into());
            }
            points.push(LidarPoint {
                angle_deg: f64::from(angle),
                distance_mm: f64::from(distance),
            });
        }

        Ok(LidarScan { points })
    }

    /// 编码一帧 (mock 驱动使用)
    pub fn encode(scan: &LidarScan) -> Bytes {
        let mut buf = BytesMut::with_capacity(scan.points.len() * RECORD_SIZE);
        for point in &scan.points {
            buf.put_f32_le(point.angle_deg as f32);
            buf.put_f32_le(point.distance_mm as f32);
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan() -> LidarScan {
        LidarScan {
            points: vec![
                LidarPoint {
                    angle_deg: 0.0,
                    distance_mm: 300.0,
                },
                LidarPoint {
                    angle_deg: 350.5,
                    distance_mm: 412.25,
                },
            ],
        }
    }

    #[test]
    fn test_decode_encoded_frame() {
        let frame = LidarFrameDecoder::encode(&scan());
        assert_eq!(frame.len(), 2 * RECORD_SIZE);

        let decoded = LidarFrameDecoder::default().decode(&frame).unwrap();
        assert_eq!(decoded, scan());
    }

    #[test]
    fn test_little_endian_layout() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&45.0f32.to_le_bytes());
        frame.extend_from_slice(&120.0f32.to_le_bytes());

        let decoded = LidarFrameDecoder::default().decode(&frame).unwrap();
        assert_eq!(decoded.points[0].angle_deg, 45.0);
        assert_eq!(decoded.points[0].distance_mm, 120.0);
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let frame = LidarFrameDecoder::encode(&scan());
        let err = LidarFrameDecoder::default()
            .decode(&frame[..frame.len() - 3])
            .unwrap_err();
        assert!(matches!(
            err,
            IngestionError::TruncatedFrame {
                len: 13,
                record_size: 8
            }
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let frame = LidarFrameDecoder::encode(&scan());
        let err = LidarFrameDecoder::with_max_points(1)
            .decode(&frame)
            .unwrap_err();
        assert!(matches!(err, IngestionError::OversizedFrame { points: 2, .. }));
    }

    #[test]
    fn test_nan_rejected() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&f32::NAN.to_le_bytes());
        frame.extend_from_slice(&100.0f32.to_le_bytes());

        let err = LidarFrameDecoder::default().decode(&frame).unwrap_err();
        assert!(matches!(
            err,
            IngestionError::Road(RoadError::MalformedSample { .. })
        ));
    }

    #[test]
    fn test_empty_frame_is_empty_scan() {
        let decoded = LidarFrameDecoder::default().decode(&[]).unwrap();
        assert!(decoded.points.is_empty());
    }
}

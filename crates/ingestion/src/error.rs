//! Ingestion 错误类型

use contracts::RoadError;
use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 帧长度不是记录长度的整数倍
    #[error("truncated lidar frame: {len} bytes is not a multiple of {record_size}")]
    TruncatedFrame {
        /// 帧字节数
        len: usize,
        /// 单条记录字节数
        record_size: usize,
    },

    /// 帧内点数超过上限
    #[error("lidar frame holds {points} points, limit is {max_points}")]
    OversizedFrame {
        /// 帧内点数
        points: usize,
        /// 上限
        max_points: usize,
    },

    /// 路面脚本非法
    #[error("invalid road script: {message}")]
    InvalidScript {
        /// 错误消息
        message: String,
    },

    /// 样本校验失败
    #[error(transparent)]
    Road(#[from] RoadError),
}

impl IngestionError {
    pub fn invalid_script(message: impl Into<String>) -> Self {
        Self::InvalidScript {
            message: message.into(),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;

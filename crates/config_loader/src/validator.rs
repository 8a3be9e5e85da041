//! 配置校验模块
//!
//! 校验规则：
//! - 分析参数满足各节约束 (阈值单调、容量 >= 1 ...)
//! - sink 名称非空且唯一
//! - sink 队列容量 >= 1

use std::collections::HashSet;

use contracts::{EngineSettings, RoadError};

/// 校验 EngineSettings 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(settings: &EngineSettings) -> Result<(), RoadError> {
    settings.analysis.validate_all()?;
    validate_sinks(settings)?;
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(settings: &EngineSettings) -> Result<(), RoadError> {
    let mut seen = HashSet::new();
    for (idx, sink) in settings.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(RoadError::configuration(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(RoadError::configuration(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(RoadError::configuration(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be >= 1",
            ));
        }
    }
    Ok(())
}

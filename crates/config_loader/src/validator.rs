//! 配置校验模块
//!
//! 校验规则：
//! - 派生规则 (chunk_size >= 1, flush_timeout_ms >= 1, name 非空)
//! - destination name 唯一
//! - file 类型必须提供 path 参数

use std::collections::HashSet;

use contracts::{ContractError, DestinationKind, SpreaderConfig};
use validator::Validate;

/// 校验 SpreaderConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &SpreaderConfig) -> Result<(), ContractError> {
    validate_derived(config)?;
    validate_destination_names(config)?;
    validate_destination_params(config)?;
    Ok(())
}

/// 派生校验 (validator)
fn validate_derived(config: &SpreaderConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "config".to_string());
        ContractError::config_validation(field, errors.to_string())
    })
}

/// 校验 destination name 唯一性
fn validate_destination_names(config: &SpreaderConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, destination) in config.destinations.iter().enumerate() {
        if destination.name.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("destinations[{}].name", idx),
                "destination name cannot be empty",
            ));
        }
        if !seen.insert(&destination.name) {
            return Err(ContractError::config_validation(
                format!("destinations[name={}]", destination.name),
                "duplicate destination name",
            ));
        }
    }
    Ok(())
}

/// 校验各类型必填参数
fn validate_destination_params(config: &SpreaderConfig) -> Result<(), ContractError> {
    for destination in &config.destinations {
        if destination.kind == DestinationKind::File {
            let has_path = destination
                .params
                .get("path")
                .is_some_and(|p| !p.trim().is_empty());
            if !has_path {
                return Err(ContractError::config_validation(
                    format!("destinations[{}].params.path", destination.name),
                    "file destination requires a 'path' parameter",
                ));
            }
        }
    }
    Ok(())
}

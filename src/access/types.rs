// 访问控制类型定义

use serde::{Deserialize, Serialize};

/// 用户访问记录
///
/// 每个请求者一条，首次引用时懒创建；只更新，从不删除
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccessRecord {
    /// 用户ID
    pub id: i64,
    /// 剩余配额（永不为负）
    pub credits: i64,
    /// 会员到期时间（Unix 秒，0 表示无会员）
    pub expiry_date: i64,
    /// 是否被封禁
    pub is_banned: bool,
}

/// 访问等级
///
/// 评估时用户恰好处于其中一个等级，优先级从上到下，先命中者生效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    /// 管理员，永远放行
    Admin,
    /// 已封禁，拒绝
    Banned,
    /// 会员期内，放行
    Premium,
    /// 免费配额，放行（每次任务消耗一点）
    Free,
    /// 配额耗尽且无会员，拒绝
    Expired,
}

impl AccessTier {
    /// 该等级是否放行
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessTier::Admin | AccessTier::Premium | AccessTier::Free)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccessTier::Admin => "ADMIN",
            AccessTier::Banned => "BANNED",
            AccessTier::Premium => "PREMIUM",
            AccessTier::Free => "FREE",
            AccessTier::Expired => "EXPIRED",
        }
    }
}

/// 时长描述解析错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationSpecError {
    #[error("时长描述为空")]
    Empty,
    #[error("无效的时长数值: {0}")]
    InvalidMagnitude(String),
    #[error("无效的时长单位: {0}（支持 m/h/d）")]
    InvalidUnit(char),
}

/// 解析时长描述，如 "30d" / "12h" / "45m"，返回秒数
///
/// 格式错误属于用户输入问题，返回 Err 而非 panic
pub fn parse_duration_spec(spec: &str) -> Result<i64, DurationSpecError> {
    let spec = spec.trim().to_lowercase();
    if spec.is_empty() {
        return Err(DurationSpecError::Empty);
    }

    let unit = spec.chars().last().unwrap();
    let magnitude = &spec[..spec.len() - unit.len_utf8()];
    let value: i64 = magnitude
        .parse()
        .map_err(|_| DurationSpecError::InvalidMagnitude(magnitude.to_string()))?;
    if value < 0 {
        return Err(DurationSpecError::InvalidMagnitude(magnitude.to_string()));
    }

    let seconds = match unit {
        'm' => value * 60,
        'h' => value * 3600,
        'd' => value * 86400,
        other => return Err(DurationSpecError::InvalidUnit(other)),
    };

    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_duration_spec_units() {
        assert_eq!(parse_duration_spec("45m").unwrap(), 45 * 60);
        assert_eq!(parse_duration_spec("12h").unwrap(), 12 * 3600);
        assert_eq!(parse_duration_spec("30d").unwrap(), 30 * 86400);
    }

    #[test]
    fn test_parse_duration_spec_invalid() {
        assert_eq!(parse_duration_spec(""), Err(DurationSpecError::Empty));
        assert_eq!(
            parse_duration_spec("30x"),
            Err(DurationSpecError::InvalidUnit('x'))
        );
        assert!(matches!(
            parse_duration_spec("d"),
            Err(DurationSpecError::InvalidMagnitude(_))
        ));
        assert!(matches!(
            parse_duration_spec("abcd"),
            Err(DurationSpecError::InvalidMagnitude(_))
        ));
    }

    #[test]
    fn test_tier_allowed() {
        assert!(AccessTier::Admin.is_allowed());
        assert!(AccessTier::Premium.is_allowed());
        assert!(AccessTier::Free.is_allowed());
        assert!(!AccessTier::Banned.is_allowed());
        assert!(!AccessTier::Expired.is_allowed());
    }

    proptest! {
        #[test]
        fn prop_duration_conversion(value in 0i64..100_000) {
            // 单位换算对任意非负数值成立
            prop_assert_eq!(parse_duration_spec(&format!("{}m", value)).unwrap(), value * 60);
            prop_assert_eq!(parse_duration_spec(&format!("{}h", value)).unwrap(), value * 3600);
            prop_assert_eq!(parse_duration_spec(&format!("{}d", value)).unwrap(), value * 86400);
        }
    }
}

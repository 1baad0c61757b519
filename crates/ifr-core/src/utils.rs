//! 通用工具函数

use crate::error::{IfrError, Result};
use chrono::NaiveDate;

/// 解析旧系统导出的日期字符串
///
/// 格式为日/月/年，"."作为备用分隔符（如 `24.08.1980`）。
pub fn parse_feed_date(raw: &str) -> Result<NaiveDate> {
    let normalized = raw.trim().replace('.', "/");
    NaiveDate::parse_from_str(&normalized, "%d/%m/%Y")
        .map_err(|_| IfrError::Validation(format!("Could not parse date '{}'", raw)))
}

/// 规范化归档受试者编号：纯数字补零到三位，否则原样保留
pub fn normalize_subject_id(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<u32>() {
        Ok(n) => format!("{:03}", n),
        Err(_) => trimmed.to_string(),
    }
}

/// 规范化归档访视编号：数字部分补零到两位并加上模态前缀
///
/// 前缀为 `MR`，PET兼容项目为 `MRPT`。编号可以带非数字后缀
/// （如 `1a` -> `MR01A`，大写由标签组装统一处理）。
pub fn normalize_visit_id(raw: &str, visit_prefix: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let suffix = &trimmed[digits.len()..];
    let numeral: u32 = digits.parse().ok()?;
    Some(format!("{}{:02}{}", visit_prefix, numeral, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_date() {
        let expected = NaiveDate::from_ymd_opt(1980, 8, 24).unwrap();
        assert_eq!(parse_feed_date("24/08/1980").unwrap(), expected);
        assert_eq!(parse_feed_date("24.08.1980").unwrap(), expected);
        assert!(parse_feed_date("1980-08-24").is_err());
        assert!(parse_feed_date("").is_err());
    }

    #[test]
    fn test_normalize_subject_id() {
        assert_eq!(normalize_subject_id("7"), "007");
        assert_eq!(normalize_subject_id("100"), "100");
        assert_eq!(normalize_subject_id(" 42 "), "042");
        // 非数字编号保持不变
        assert_eq!(normalize_subject_id("A12"), "A12");
    }

    #[test]
    fn test_normalize_visit_id() {
        assert_eq!(normalize_visit_id("1", "MR").unwrap(), "MR01");
        assert_eq!(normalize_visit_id("12", "MR").unwrap(), "MR12");
        assert_eq!(normalize_visit_id("1a", "MRPT").unwrap(), "MRPT01a");
        assert!(normalize_visit_id("", "MR").is_none());
        assert!(normalize_visit_id("abc", "MR").is_none());
    }
}

//! 模型输出的 JSON 解析：先严格解析，失败后截取第一个括号平衡的 {…} / […] 片段再解析
//!
//! 结果以 Parsed 标记成功或失败，调用方据此降级（空计划 / 未通过），解析错误不会越过阶段边界。

use serde::de::DeserializeOwned;
use serde_json::Value;

/// 解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Ok(T),
    Err { reason: String, raw: String },
}

impl<T> Parsed<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Parsed::Ok(v) => Some(v),
            Parsed::Err { .. } => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Parsed::Ok(_))
    }
}

/// 找到第一个括号平衡的 JSON 片段（识别字符串与转义，忽略字符串内部的括号）
pub fn first_balanced_span(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '{' || c == '[')?;
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 两段式解析为 serde_json::Value
pub fn parse_json_value(text: &str) -> Parsed<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Parsed::Ok(v);
    }
    let Some(span) = first_balanced_span(trimmed) else {
        return Parsed::Err {
            reason: "no JSON object or array found".to_string(),
            raw: text.to_string(),
        };
    };
    match serde_json::from_str::<Value>(span) {
        Ok(v) => Parsed::Ok(v),
        Err(e) => Parsed::Err {
            reason: e.to_string(),
            raw: text.to_string(),
        },
    }
}

/// 两段式解析为具体类型
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Parsed<T> {
    match parse_json_value(text) {
        Parsed::Ok(v) => match serde_json::from_value::<T>(v) {
            Ok(t) => Parsed::Ok(t),
            Err(e) => Parsed::Err {
                reason: e.to_string(),
                raw: text.to_string(),
            },
        },
        Parsed::Err { reason, raw } => Parsed::Err { reason, raw },
    }
}

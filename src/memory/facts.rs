//! 事实抽取：从用户输入中识别命名类陈述，生成 {entity, attribute, value} 记录
//!
//! 规则按顺序匹配（小写化后的子串匹配），更具体的规则在前；已被前序规则占用的前缀区间不再参与后续匹配。
//! 同一句话可产出多条事实（例如同时包含 "my name is" 与 "your name is"）。

use serde::{Deserialize, Serialize};

/// 结构化事实
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub entity: String,
    pub attribute: String,
    pub value: String,
}

impl Fact {
    pub fn new(entity: impl Into<String>, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// 落库用的 JSON 文本
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "entity": self.entity,
            "attribute": self.attribute,
            "value": self.value,
        })
        .to_string()
    }
}

/// 取值方式
#[derive(Clone, Copy, Debug)]
enum ValueFrom {
    /// 模式之后的全部文本
    AfterPattern,
    /// 从模式起始处到结尾的片段中，最后一个 " is " 之后的文本
    AfterLastIs,
}

struct Rule {
    pattern: &'static str,
    entity: &'static str,
    value_from: ValueFrom,
}

const RULES: &[Rule] = &[
    Rule {
        pattern: "my brother name is",
        entity: "user's brother",
        value_from: ValueFrom::AfterPattern,
    },
    Rule {
        pattern: "my name is",
        entity: "user",
        value_from: ValueFrom::AfterPattern,
    },
    // 同时覆盖 "your name is"
    Rule {
        pattern: "ur name is",
        entity: "agent",
        value_from: ValueFrom::AfterLastIs,
    },
];

fn clean_value(raw: &str) -> Option<String> {
    let v = raw
        .trim()
        .trim_matches(|c: char| c == '.' || c == '?' || c == '!' || c.is_whitespace());
    if v.is_empty() {
        None
    } else {
        Some(v.to_string())
    }
}

fn overlaps(claimed: &[(usize, usize)], start: usize, end: usize) -> bool {
    claimed.iter().any(|&(s, e)| start < e && s < end)
}

/// 从一句用户输入中抽取事实；无匹配或取值为空时返回空 Vec
pub fn extract_facts(input: &str) -> Vec<Fact> {
    let low = input.to_lowercase();
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut facts = Vec::new();

    for rule in RULES {
        let hit = low
            .match_indices(rule.pattern)
            .map(|(idx, _)| (idx, idx + rule.pattern.len()))
            .find(|&(s, e)| !overlaps(&claimed, s, e));
        let Some((start, end)) = hit else {
            continue;
        };
        claimed.push((start, end));

        let raw = match rule.value_from {
            ValueFrom::AfterPattern => Some(&low[end..]),
            ValueFrom::AfterLastIs => low[start..].rsplit_once(" is ").map(|(_, v)| v),
        };
        if let Some(value) = raw.and_then(clean_value) {
            facts.push(Fact::new(rule.entity, "name", value));
        }
    }

    facts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name() {
        let facts = extract_facts("my name is Dana.");
        assert_eq!(facts, vec![Fact::new("user", "name", "dana")]);
    }

    #[test]
    fn test_brother_does_not_double_fire() {
        let facts = extract_facts("My brother name is Sam");
        assert_eq!(facts, vec![Fact::new("user's brother", "name", "sam")]);
    }

    #[test]
    fn test_agent_name_variants() {
        assert_eq!(
            extract_facts("From now on your name is Nova!"),
            vec![Fact::new("agent", "name", "nova")]
        );
        assert_eq!(
            extract_facts("ur name is max"),
            vec![Fact::new("agent", "name", "max")]
        );
    }

    #[test]
    fn test_agent_value_uses_last_is() {
        let facts = extract_facts("your name is what it is nova");
        assert_eq!(facts, vec![Fact::new("agent", "name", "nova")]);
    }

    #[test]
    fn test_empty_trailing_text_yields_nothing() {
        assert!(extract_facts("my name is ?").is_empty());
        assert!(extract_facts("your name is").is_empty());
        assert!(extract_facts("what is the weather").is_empty());
    }

    #[test]
    fn test_user_and_agent_in_one_message() {
        let facts = extract_facts("your name is nova and my name is dana");
        assert_eq!(facts.len(), 2);
        assert!(facts.contains(&Fact::new("user", "name", "dana")));
        // agent 取最后一个 " is " 之后的文本，保留原有的子串语义
        assert!(facts.contains(&Fact::new("agent", "name", "dana")));
    }

    #[test]
    fn test_fact_json_shape() {
        let json = Fact::new("user", "name", "dana").to_json();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["entity"], "user");
        assert_eq!(v["attribute"], "name");
        assert_eq!(v["value"], "dana");
    }
}

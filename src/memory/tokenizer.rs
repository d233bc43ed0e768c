//! 分词与关键词相似度
//!
//! 记忆库与文档库共用：中英文混合分词（CJK 走 jieba，其余按非字母数字切分），按词重叠打分。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 分词：小写化；丢弃单字符的非 CJK 词
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| s.chars().count() > 1 || s.chars().next().map(is_cjk).unwrap_or(false))
            .collect()
    } else {
        // 英文按非字母数字切分，使 `fact:`、`{"entity":` 之类的片段也能命中
        text.split(|c: char| !c.is_alphanumeric())
            .map(|s| s.to_lowercase())
            .filter(|s| s.chars().count() > 1)
            .collect()
    }
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 相似度：查询词与文档词的交集大小
pub fn overlap(query: &HashSet<String>, doc: &HashSet<String>) -> usize {
    query.intersection(doc).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize(r#"fact: {"entity": "user", "value": "dana"}"#);
        assert!(tokens.contains(&"fact".to_string()));
        assert!(tokens.contains(&"entity".to_string()));
        assert!(tokens.contains(&"dana".to_string()));
    }

    #[test]
    fn test_fact_lookup_matches_fact_record() {
        let lookup = token_set("fact:");
        let record = token_set(r#"fact: {"entity": "agent", "attribute": "name", "value": "nova"}"#);
        assert_eq!(overlap(&lookup, &record), 1);
    }

    #[test]
    fn test_tokenize_cjk() {
        let tokens = tokenize("我的名字是小明");
        assert!(!tokens.is_empty());
    }
}

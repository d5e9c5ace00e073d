//! 聊天内容过滤
//!
//! 原始输入先做一次 HTML 转义，然后依次经过：
//! 1. 违禁词替换为等长 `*`
//! 2. 非白名单链接替换为占位符
//! 3. 连续 5 个及以上相同字符折叠为 "首字符..."
//! 4. 连续 10 个及以上大写字母转小写
//!
//! 每一步都作用在上一步的输出上；违规标记是各步结果的或。
//! 第 1 步产生的 5 个及以上 `*` 会被第 3 步继续折叠成 `*...`。
//! 链接在转义后的引号/尖括号处结束，末尾的句子标点不算链接的一部分。

use regex::{Regex, RegexBuilder};

use crate::config::ModerationConfig;
use crate::error::{Result, ServerError};

const REPEAT_RUN: usize = 5;
const REPEAT_SUFFIX: &str = "...";

/// 转义后的引号和尖括号，链接在此处结束
const LINK_TERMINATORS: [&str; 4] = ["&quot;", "&#39;", "&lt;", "&gt;"];
/// 链接末尾视为句子标点、不属于链接的字符
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')'];

/// 过滤结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub content: String,
    pub violation: bool,
}

/// 内容过滤器（构造时编译全部正则）
#[derive(Debug, Clone)]
pub struct ContentFilter {
    banned_words: Option<Regex>,
    url_pattern: Regex,
    caps_pattern: Regex,
    url_whitelist: Vec<String>,
    link_placeholder: String,
}

impl ContentFilter {
    pub fn new(config: &ModerationConfig) -> Result<Self> {
        let mut words: Vec<&str> = config
            .banned_words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .collect();
        // 长词优先，避免短词先吃掉长词的前缀
        words.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

        let banned_words = if words.is_empty() {
            None
        } else {
            let alternation = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                RegexBuilder::new(&alternation)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ServerError::Configuration(format!("invalid banned word list: {}", e))
                    })?,
            )
        };

        let url_pattern = Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#)
            .map_err(|e| ServerError::Internal(format!("url pattern: {}", e)))?;
        let caps_pattern = Regex::new(r"\p{Lu}{10,}")
            .map_err(|e| ServerError::Internal(format!("caps pattern: {}", e)))?;

        Ok(Self {
            banned_words,
            url_pattern,
            caps_pattern,
            url_whitelist: config
                .url_whitelist
                .iter()
                .map(|h| h.trim().trim_start_matches("*.").to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            link_placeholder: config.link_placeholder.clone(),
        })
    }

    /// 过滤一条消息
    pub fn filter(&self, content: &str) -> FilterOutcome {
        let escaped = escape_html(content);

        let (masked, words_hit) = self.mask_banned_words(&escaped);
        let (delinked, links_hit) = self.strip_links(&masked);
        let (collapsed, repeats_hit) = collapse_repeats(&delinked);
        let (lowered, caps_hit) = self.lower_caps(&collapsed);

        FilterOutcome {
            content: lowered,
            violation: words_hit || links_hit || repeats_hit || caps_hit,
        }
    }

    fn mask_banned_words(&self, input: &str) -> (String, bool) {
        let Some(pattern) = &self.banned_words else {
            return (input.to_string(), false);
        };
        let mut hit = false;
        let output = pattern.replace_all(input, |caps: &regex::Captures<'_>| {
            hit = true;
            "*".repeat(caps[0].chars().count())
        });
        (output.into_owned(), hit)
    }

    fn strip_links(&self, input: &str) -> (String, bool) {
        let mut hit = false;
        let output = self.url_pattern.replace_all(input, |caps: &regex::Captures<'_>| {
            let matched = &caps[0];
            let end = LINK_TERMINATORS
                .iter()
                .filter_map(|t| matched.find(t))
                .min()
                .unwrap_or(matched.len());
            let link = matched[..end].trim_end_matches(TRAILING_PUNCTUATION);

            let mut out = if self.is_whitelisted(link) {
                link.to_string()
            } else {
                hit = true;
                self.link_placeholder.clone()
            };
            // 截掉的尾部可能还带着别的链接
            let (tail, tail_hit) = self.strip_links(&matched[link.len()..]);
            hit |= tail_hit;
            out.push_str(&tail);
            out
        });
        (output.into_owned(), hit)
    }

    fn is_whitelisted(&self, link: &str) -> bool {
        let candidate = if link.to_ascii_lowercase().starts_with("www.") {
            format!("http://{}", link)
        } else {
            link.to_string()
        };
        let Ok(parsed) = url::Url::parse(&candidate) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        self.url_whitelist
            .iter()
            .any(|allowed| host == *allowed || host.ends_with(&format!(".{}", allowed)))
    }

    fn lower_caps(&self, input: &str) -> (String, bool) {
        let mut hit = false;
        let output = self.caps_pattern.replace_all(input, |caps: &regex::Captures<'_>| {
            hit = true;
            caps[0].to_lowercase()
        });
        (output.into_owned(), hit)
    }
}

/// 转义 HTML 特殊字符
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// 连续相同字符折叠
fn collapse_repeats(input: &str) -> (String, bool) {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut hit = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        if run >= REPEAT_RUN {
            hit = true;
            out.push(c);
            out.push_str(REPEAT_SUFFIX);
        } else {
            out.extend(std::iter::repeat(c).take(run));
        }
        i += run;
    }

    (out, hit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_with(words: &[&str], whitelist: &[&str]) -> ContentFilter {
        let config = ModerationConfig {
            banned_words: words.iter().map(|w| w.to_string()).collect(),
            url_whitelist: whitelist.iter().map(|w| w.to_string()).collect(),
            ..ModerationConfig::default()
        };
        ContentFilter::new(&config).unwrap()
    }

    #[test]
    fn test_banned_word_is_masked_case_insensitive() {
        let filter = filter_with(&["spam"], &[]);
        let outcome = filter.filter("SPAM is bad");
        assert!(outcome.violation);
        assert_eq!(outcome.content, "**** is bad");
    }

    #[test]
    fn test_partial_match_is_masked() {
        let filter = filter_with(&["spam"], &[]);
        assert_eq!(filter.filter("spammer").content, "****mer");
    }

    #[test]
    fn test_clean_message_passes_through() {
        let filter = filter_with(&["spam"], &["example.com"]);
        let outcome = filter.filter("hello there");
        assert!(!outcome.violation);
        assert_eq!(outcome.content, "hello there");
    }

    #[test]
    fn test_html_is_escaped_without_violation() {
        let filter = filter_with(&[], &[]);
        let outcome = filter.filter("<b>hi</b>");
        assert!(!outcome.violation);
        assert_eq!(outcome.content, "&lt;b&gt;hi&lt;/b&gt;");
    }

    #[test]
    fn test_non_whitelisted_link_is_replaced() {
        let filter = filter_with(&[], &["example.com"]);

        let outcome = filter.filter("see https://evil.test/x now");
        assert!(outcome.violation);
        assert_eq!(outcome.content, "see [link removed] now");

        let outcome = filter.filter("docs at https://wiki.example.com/page");
        assert!(!outcome.violation);
        assert_eq!(outcome.content, "docs at https://wiki.example.com/page");

        let outcome = filter.filter("www.example.com is fine");
        assert!(!outcome.violation);
    }

    #[test]
    fn test_quoted_whitelisted_link_is_kept() {
        let filter = filter_with(&[], &["example.com"]);

        let outcome = filter.filter("see \"https://example.com\"");
        assert!(!outcome.violation);
        assert_eq!(outcome.content, "see &quot;https://example.com&quot;");

        let outcome = filter.filter("<https://example.com/a>");
        assert!(!outcome.violation);
        assert_eq!(outcome.content, "&lt;https://example.com/a&gt;");
    }

    #[test]
    fn test_trailing_punctuation_is_not_part_of_link() {
        let filter = filter_with(&[], &["example.com"]);

        let outcome = filter.filter("go to https://example.com.");
        assert!(!outcome.violation);
        assert_eq!(outcome.content, "go to https://example.com.");

        let outcome = filter.filter("try https://example.com, ok");
        assert!(!outcome.violation);
        assert_eq!(outcome.content, "try https://example.com, ok");

        let outcome = filter.filter("(see www.example.com/faq)!");
        assert!(!outcome.violation);
        assert_eq!(outcome.content, "(see www.example.com/faq)!");
    }

    #[test]
    fn test_link_hidden_after_quote_is_still_removed() {
        let filter = filter_with(&[], &["example.com"]);

        let outcome = filter.filter("\"https://evil.test\".");
        assert!(outcome.violation);
        assert_eq!(outcome.content, "&quot;[link removed]&quot;.");

        let outcome = filter.filter("\"https://example.com\"https://evil.test");
        assert!(outcome.violation);
        assert_eq!(outcome.content, "&quot;https://example.com&quot;[link removed]");
    }

    #[test]
    fn test_lookalike_host_is_not_whitelisted() {
        let filter = filter_with(&[], &["example.com"]);
        let outcome = filter.filter("http://badexample.com");
        assert!(outcome.violation);
    }

    #[test]
    fn test_repeats_collapse() {
        let filter = filter_with(&[], &[]);
        let outcome = filter.filter("nooooooo way");
        assert!(outcome.violation);
        assert_eq!(outcome.content, "no... way");

        assert!(!filter.filter("oooo").violation);
    }

    #[test]
    fn test_long_caps_run_is_lowered() {
        let filter = filter_with(&[], &[]);
        let outcome = filter.filter("STOPSHOUTING please");
        assert!(outcome.violation);
        assert_eq!(outcome.content, "stopshouting please");

        assert!(!filter.filter("NASA rocks").violation);
    }

    #[test]
    fn test_long_masked_word_is_collapsed() {
        let filter = filter_with(&["cheater"], &[]);
        assert_eq!(filter.filter("cheater!").content, "*...!");
    }

    #[test]
    fn test_mask_and_caps_are_idempotent() {
        let filter = filter_with(&["spam"], &[]);
        let first = filter.filter("SPAM and LOUDLOUDLOUD");
        assert!(first.violation);

        let second = filter.filter(&first.content);
        assert!(!second.violation);
        assert_eq!(second.content, first.content);
    }
}

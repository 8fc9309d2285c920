//! Position recovery for package.json `dependencies` entries
//!
//! serde discards source spans, so the text is walked a second time by a
//! small tokenizer that tracks line and UTF-16 column. Only keys that are
//! direct members of the top-level `dependencies` object are reported.
//! Without such an object nothing is reported.

use std::iter::Peekable;
use std::str::CharIndices;

use super::DependencyEntry;

const DEPENDENCIES_KEY: &str = "dependencies";

/// Recover the positioned entries of the top-level `dependencies` object,
/// in source order.
pub fn scan_dependencies(content: &str) -> Vec<DependencyEntry> {
    Scanner::new(content).run()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameKind {
    Object,
    Array,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    /// Key under which this container sits in its parent object
    key: Option<String>,
    expecting_key: bool,
    /// Key of the member currently being read (objects only)
    member_key: Option<String>,
}

impl Frame {
    fn new(kind: FrameKind, key: Option<String>) -> Self {
        Self {
            kind,
            key,
            expecting_key: kind == FrameKind::Object,
            member_key: None,
        }
    }
}

struct StringToken<'a> {
    raw: &'a str,
    line: u32,
    start: u32,
    end: u32,
    single_line: bool,
}

impl StringToken<'_> {
    fn decode(&self) -> String {
        if !self.raw.contains('\\') {
            return self.raw.to_string();
        }
        serde_json::from_str::<String>(&format!("\"{}\"", self.raw))
            .unwrap_or_else(|_| self.raw.to_string())
    }
}

struct Scanner<'a> {
    content: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Scanner<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            content,
            chars: content.char_indices().peekable(),
            line: 0,
            column: 0,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let (idx, ch) = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += ch.len_utf16() as u32;
        }
        Some((idx, ch))
    }

    /// Read a string body; the opening quote has been consumed.
    fn read_string(&mut self) -> Option<StringToken<'a>> {
        let start_byte = self.chars.peek().map_or(self.content.len(), |(idx, _)| *idx);
        let line = self.line;
        let start = self.column;

        loop {
            let end = self.column;
            let end_line = self.line;
            let (idx, ch) = self.bump()?;
            match ch {
                '\\' => {
                    self.bump()?;
                }
                '"' => {
                    return Some(StringToken {
                        raw: &self.content[start_byte..idx],
                        line,
                        start,
                        end,
                        single_line: end_line == line,
                    });
                }
                _ => {}
            }
        }
    }

    fn run(mut self) -> Vec<DependencyEntry> {
        let mut entries = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();

        while let Some((_, ch)) = self.bump() {
            match ch {
                '"' => {
                    let Some(token) = self.read_string() else {
                        break;
                    };
                    let in_dependencies = is_dependencies_block(&stack);
                    if let Some(frame) = stack.last_mut()
                        && frame.kind == FrameKind::Object
                        && frame.expecting_key
                    {
                        let name = token.decode();
                        if in_dependencies && token.single_line {
                            entries.push(DependencyEntry {
                                name: name.clone(),
                                line: token.line,
                                name_start: token.start,
                                name_end: token.end,
                            });
                        }
                        frame.member_key = Some(name);
                    }
                }
                '{' | '[' => {
                    let kind = if ch == '{' {
                        FrameKind::Object
                    } else {
                        FrameKind::Array
                    };
                    let key = stack.last().and_then(|frame| frame.member_key.clone());
                    stack.push(Frame::new(kind, key));
                }
                '}' | ']' => {
                    stack.pop();
                }
                ':' => {
                    if let Some(frame) = stack.last_mut() {
                        frame.expecting_key = false;
                    }
                }
                ',' => {
                    if let Some(frame) = stack.last_mut()
                        && frame.kind == FrameKind::Object
                    {
                        frame.expecting_key = true;
                        frame.member_key = None;
                    }
                }
                _ => {}
            }
        }

        entries
    }
}

fn is_dependencies_block(stack: &[Frame]) -> bool {
    matches!(
        stack,
        [root, block]
            if root.kind == FrameKind::Object
                && block.kind == FrameKind::Object
                && block.key.as_deref() == Some(DEPENDENCIES_KEY)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(entries: &'a [DependencyEntry], name: &str) -> &'a DependencyEntry {
        entries.iter().find(|e| e.name == name).unwrap()
    }

    #[test]
    fn test_simple_dependencies() {
        let content = r#"{
  "name": "my-app",
  "dependencies": {
    "react": "^18.2.0",
    "lodash": "4.17.21"
  }
}"#;
        let entries = scan_dependencies(content);
        assert_eq!(entries.len(), 2);

        let react = find(&entries, "react");
        assert_eq!(react.line, 3);
        assert_eq!(react.name_start, 5);
        assert_eq!(react.name_end, 10);

        let lodash = find(&entries, "lodash");
        assert_eq!(lodash.line, 4);
        assert_eq!(lodash.name_start, 5);
        assert_eq!(lodash.name_end, 11);
    }

    #[test]
    fn test_preserves_source_order() {
        let content = r#"{"dependencies": {"zod": "3", "axios": "1", "chalk": "5"}}"#;
        let names: Vec<_> = scan_dependencies(content)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["zod", "axios", "chalk"]);
    }

    #[test]
    fn test_other_sections_ignored() {
        let content = r#"{
  "name": "test",
  "scripts": {
    "build": "tsc"
  },
  "dependencies": {
    "express": "^4.18.0"
  },
  "devDependencies": {
    "nodemon": "^3.0.0"
  },
  "peerDependencies": {
    "react": "^18.0.0"
  }
}"#;
        let entries = scan_dependencies(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "express");
        assert_eq!(entries[0].line, 6);
    }

    #[test]
    fn test_scoped_packages() {
        let content = r#"{
  "dependencies": {
    "@types/node": "^20.0.0",
    "@babel/core": "^7.22.0"
  }
}"#;
        let entries = scan_dependencies(content);
        assert_eq!(entries.len(), 2);
        let babel = find(&entries, "@babel/core");
        assert_eq!(babel.name_start, 5);
        assert_eq!(babel.name_end, 16);
    }

    #[test]
    fn test_inline_format() {
        let content = r#"{"dependencies":{"lodash":"^4.0.0"}}"#;
        let entries = scan_dependencies(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, 0);
        assert_eq!(&content[entries[0].name_start as usize..entries[0].name_end as usize], "lodash");
    }

    #[test]
    fn test_name_repeated_in_version_uses_key_span() {
        // An alias whose version string repeats the package name.
        let content = "{\n  \"dependencies\": {\n    \"ms\": \"npm:ms@2\"\n  }\n}";
        let entries = scan_dependencies(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name_start, 5);
        assert_eq!(entries[0].name_end, 7);
    }

    #[test]
    fn test_no_dependencies_key() {
        let content = r#"{
  "name": "no-deps",
  "version": "1.0.0",
  "scripts": {
    "test": "jest"
  }
}"#;
        assert!(scan_dependencies(content).is_empty());
    }

    #[test]
    fn test_nested_dependencies_key_ignored() {
        let content = r#"{
  "overrides": {
    "dependencies": {
      "foo": "1.0.0"
    }
  },
  "workspaces": [{"dependencies": {"bar": "1"}}]
}"#;
        assert!(scan_dependencies(content).is_empty());
    }

    #[test]
    fn test_dependencies_not_an_object() {
        assert!(scan_dependencies(r#"{"dependencies": ["a", "b"]}"#).is_empty());
        assert!(scan_dependencies(r#"{"dependencies": "lodash"}"#).is_empty());
    }

    #[test]
    fn test_non_string_values_do_not_confuse_keys() {
        let content = r#"{"dependencies": {"a": {"version": "1", "x": [1, {"y": 2}]}, "b": "2"}}"#;
        let names: Vec<_> = scan_dependencies(content)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let content = "{\r\n  \"dependencies\": {\r\n    \"react\": \"^18.0.0\"\r\n  }\r\n}\r\n";
        let entries = scan_dependencies(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, 2);
        assert_eq!(entries[0].name_start, 5);
        assert_eq!(entries[0].name_end, 10);
    }

    #[test]
    fn test_escaped_key_is_decoded() {
        let content = r#"{"dependencies": {"\u006codash": "4"}}"#;
        let entries = scan_dependencies(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "lodash");
        // The span covers the raw token.
        assert_eq!(entries[0].name_end - entries[0].name_start, 11);
    }

    #[test]
    fn test_utf16_columns() {
        let content = "{\"description\": \"日本\", \"dependencies\": {\"zod\": \"3\"}}";
        let entries = scan_dependencies(content);
        assert_eq!(entries.len(), 1);

        let key_byte = content.find("\"zod\"").unwrap() + 1;
        let key_col = content[..key_byte].encode_utf16().count() as u32;
        assert!((key_col as usize) < key_byte);
        assert_eq!(entries[0].name_start, key_col);
        assert_eq!(entries[0].name_end, key_col + 3);
    }

    #[test]
    fn test_empty_dependencies() {
        assert!(scan_dependencies(r#"{"dependencies": {}}"#).is_empty());
    }

    #[test]
    fn test_unterminated_input_does_not_panic() {
        let entries = scan_dependencies("{\"dependencies\": {\"abc\": \"1");
        assert_eq!(entries.len(), 1);
        assert!(scan_dependencies("{\"dependencies\": {\"ab").is_empty());
        assert!(scan_dependencies("\"").is_empty());
        assert!(scan_dependencies("}}]]{").is_empty());
    }
}

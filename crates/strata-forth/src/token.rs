//! Whitespace tokenization
//!
//! Source text is split on ASCII whitespace into word tokens. Newlines are
//! emitted as their own tokens because they terminate `\ ...` line comments;
//! they have no meaning after parsing. Every token carries the line, column,
//! and byte offset of its first character for diagnostics.

/// One source token: a maximal run of non-whitespace bytes, or `"\n"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// The token text, borrowed from the source.
    pub text: &'a str,
    /// Line of the first character (1-based).
    pub line: usize,
    /// Column of the first character (0-based).
    pub column: usize,
    /// Byte offset of the first character in the source.
    pub offset: usize,
}

/// Split source text into word tokens.
///
/// Space, carriage return, tab, vertical tab, and form feed separate tokens
/// and are discarded; `\n` separates tokens and is also kept as a token of
/// its own. The tokenizer has no notion of comments or keywords.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut start = 0usize;
    let mut full = false;
    let mut line = 1usize;
    let mut column = 0usize;
    let mut start_line = 1usize;
    let mut start_column = 0usize;

    for (pos, &byte) in bytes.iter().enumerate() {
        match byte {
            b' ' | b'\r' | b'\t' | b'\x0b' | b'\x0c' => {
                if full {
                    tokens.push(Token {
                        text: &source[start..pos],
                        line: start_line,
                        column: start_column,
                        offset: start,
                    });
                }
                full = false;
                column += 1;
            }
            b'\n' => {
                if full {
                    tokens.push(Token {
                        text: &source[start..pos],
                        line: start_line,
                        column: start_column,
                        offset: start,
                    });
                }
                tokens.push(Token {
                    text: &source[pos..pos + 1],
                    line,
                    column,
                    offset: pos,
                });
                full = false;
                line += 1;
                column = 0;
            }
            _ => {
                if !full {
                    start = pos;
                    start_line = line;
                    start_column = column;
                    full = true;
                }
                column += 1;
            }
        }
    }
    // The source might end on non-whitespace.
    if full {
        tokens.push(Token {
            text: &source[start..],
            line: start_line,
            column: start_column,
            offset: start,
        });
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<&str> {
        tokenize(source).iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_splits_on_whitespace() {
        assert_eq!(texts("1 2  dup\t+"), vec!["1", "2", "dup", "+"]);
    }

    #[test]
    fn test_newline_is_a_token() {
        assert_eq!(texts("1\n2"), vec!["1", "\n", "2"]);
        assert_eq!(texts("\\ comment\n3"), vec!["\\", "comment", "\n", "3"]);
    }

    #[test]
    fn test_line_and_column() {
        let tokens = tokenize("ab cd\n  ef");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].column, 0);
        assert_eq!(tokens[1].line, 1);
        assert_eq!(tokens[1].column, 3);
        // tokens[2] is the newline
        assert_eq!(tokens[3].text, "ef");
        assert_eq!(tokens[3].line, 2);
        assert_eq!(tokens[3].column, 2);
    }

    #[test]
    fn test_offsets_index_into_source() {
        let source = "x  y\nzz";
        for token in tokenize(source) {
            assert_eq!(&source[token.offset..token.offset + token.text.len()], token.text);
        }
    }

    #[test]
    fn test_empty_and_trailing() {
        assert!(tokenize("").is_empty());
        assert_eq!(texts("  \t "), Vec::<&str>::new());
        assert_eq!(texts("end"), vec!["end"]);
    }
}

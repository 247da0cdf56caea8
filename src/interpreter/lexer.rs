//! Hand-rolled tokenizer for the restricted grammar.
//!
//! Indentation-sensitive, like the source grammar it mirrors: blocks are
//! delimited by INDENT/DEDENT tokens derived from leading whitespace rather
//! than braces, so the lexer tracks a stack of indentation widths.

use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    FStringStart,
    Name(String),
    Keyword(&'static str),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

const KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "def", "async", "await", "return", "break", "continue",
    "pass", "raise", "assert", "import", "from", "as", "and", "or", "not", "in", "is", "True",
    "False", "None", "class", "try", "except", "finally", "with", "lambda",
];

pub struct Lexed {
    pub tokens: Vec<Token>,
    pub lines: Vec<usize>,
}

pub fn tokenize(source: &str) -> crate::Result<Lexed> {
    let mut tokens = Vec::new();
    let mut lines = Vec::new();
    let mut indents = vec![0usize];
    let mut line_no = 0usize;

    for raw_line in source.lines() {
        line_no += 1;
        let line = strip_comment(raw_line);
        if line.trim().is_empty() {
            continue;
        }

        let indent_width = line.chars().take_while(|c| *c == ' ').count();
        if line[indent_width..].trim().is_empty() {
            continue;
        }

        if indent_width > *indents.last().unwrap() {
            indents.push(indent_width);
            tokens.push(Token::Indent);
            lines.push(line_no);
        } else {
            while indent_width < *indents.last().unwrap() {
                indents.pop();
                tokens.push(Token::Dedent);
                lines.push(line_no);
            }
            if indent_width != *indents.last().unwrap() {
                return Err(Error::interpreter(
                    format!("inconsistent indentation (got {indent_width} spaces)"),
                    line_no,
                ));
            }
        }

        let body = &line[indent_width..];
        tokenize_line(body, line_no, &mut tokens, &mut lines)?;
        tokens.push(Token::Newline);
        lines.push(line_no);
    }

    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token::Dedent);
        lines.push(line_no);
    }
    tokens.push(Token::Eof);
    lines.push(line_no);

    Ok(Lexed { tokens, lines })
}

fn strip_comment(line: &str) -> &str {
    let mut in_string = None;
    let mut chars = line.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        match in_string {
            Some(q) if c == q => in_string = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => in_string = Some(c),
            None if c == '#' => return &line[..idx],
            None => {}
        }
    }
    line
}

fn tokenize_line(
    body: &str,
    line_no: usize,
    tokens: &mut Vec<Token>,
    lines: &mut Vec<usize>,
) -> crate::Result<()> {
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '#' {
            break;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            let start = i;
            let mut is_float = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                if chars[i] == '.' {
                    is_float = true;
                }
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if is_float {
                let v: f64 = text
                    .parse()
                    .map_err(|_| Error::interpreter(format!("bad float literal '{text}'"), line_no))?;
                tokens.push(Token::Float(v));
            } else {
                let v: i64 = text
                    .parse()
                    .map_err(|_| Error::interpreter(format!("bad int literal '{text}'"), line_no))?;
                tokens.push(Token::Int(v));
            }
            lines.push(line_no);
            continue;
        }
        if c == '"' || c == '\'' {
            let is_fstring = false;
            let (text, consumed) = read_string(&chars[i..], c, line_no)?;
            i += consumed;
            if is_fstring {
                tokens.push(Token::FStringStart);
            }
            tokens.push(Token::Str(text));
            lines.push(line_no);
            continue;
        }
        if (c == 'f' || c == 'F')
            && matches!(chars.get(i + 1), Some('"') | Some('\''))
        {
            let quote = chars[i + 1];
            let (text, consumed) = read_string(&chars[i + 1..], quote, line_no)?;
            i += 1 + consumed;
            tokens.push(Token::FStringStart);
            tokens.push(Token::Str(text));
            lines.push(line_no);
            lines.push(line_no);
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            if let Some(kw) = KEYWORDS.iter().find(|k| **k == text) {
                tokens.push(Token::Keyword(kw));
            } else {
                tokens.push(Token::Name(text));
            }
            lines.push(line_no);
            continue;
        }

        // Multi-char operators, longest first.
        let rest: String = chars[i..].iter().collect();
        const OPS: &[&str] = &[
            "**=", "//=", "**", "//", "==", "!=", "<=", ">=", "->", "+=", "-=", "*=", "/=", "%=",
            "(", ")", "[", "]", "{", "}", ",", ":", ".", "+", "-", "*", "/", "%", "=", "<", ">",
        ];
        if let Some(op) = OPS.iter().find(|op| rest.starts_with(**op)) {
            tokens.push(Token::Op(op));
            lines.push(line_no);
            i += op.chars().count();
            continue;
        }

        return Err(Error::interpreter(format!("unexpected character '{c}'"), line_no));
    }
    Ok(())
}

fn read_string(chars: &[char], quote: char, line_no: usize) -> crate::Result<(String, usize)> {
    let mut out = String::new();
    let mut i = 1; // skip opening quote
    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' && i + 1 < chars.len() {
            let escaped = match chars[i + 1] {
                'n' => '\n',
                't' => '\t',
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                other => other,
            };
            out.push(escaped);
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Err(Error::interpreter("unterminated string literal", line_no))
}

//! Lexer: source text to a token stream with explicit layout tokens.
//!
//! Indentation is turned into [`TokenKind::Indent`] / [`TokenKind::Dedent`]
//! pairs. Inside brackets, and after a trailing backslash, line breaks are
//! ignored. Blank and comment-only lines never produce tokens.

use crate::error::{ScriptError, ScriptResult};
use crate::token::{FStringPart, Token, TokenKind};

const TAB_WIDTH: usize = 8;

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    depth: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            indents: vec![0],
            depth: 0,
        }
    }

    /// Number lines from `line` instead of 1 (used for f-string fields).
    pub fn starting_at(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    /// Tokenize the whole input.
    pub fn tokenize(mut self) -> ScriptResult<Vec<Token>> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if self.handle_indentation()? {
                    at_line_start = true;
                    continue;
                }
            }
            let c = self.chars[self.pos];
            match c {
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.push_newline();
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '#' => self.skip_comment(),
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '\\' if self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n') => {
                    self.pos += 3;
                    self.line += 1;
                }
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.lex_number()?,
                c if c == '_' || c.is_alphabetic() => self.lex_word()?,
                '"' | '\'' => self.lex_string(false, false)?,
                _ => self.lex_operator()?,
            }
        }

        self.push_newline();
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::Eof);
        Ok(self.tokens)
    }

    // ── Cursor helpers ─────────────────────────────────────────

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token::new(kind, self.line));
    }

    fn push_newline(&mut self) {
        match self.tokens.last() {
            None => {}
            Some(t) if matches!(t.kind, TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent) => {}
            Some(_) => self.push(TokenKind::Newline),
        }
    }

    fn syntax(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax(message.into()).at(self.line)
    }

    fn skip_comment(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos] != '\n' {
            self.pos += 1;
        }
    }

    // ── Indentation ────────────────────────────────────────────

    /// Measure the indentation of the line at the cursor. Returns `true` when
    /// the line is blank or a comment and has been consumed entirely.
    fn handle_indentation(&mut self) -> ScriptResult<bool> {
        let mut width = 0;
        while let Some(c) = self.peek_at(0) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek_at(0) {
            None => return Ok(true),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(true);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek_at(0) == Some('\n') {
                    self.pos += 1;
                    self.line += 1;
                }
                return Ok(true);
            }
            Some(_) => {}
        }

        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(TokenKind::Indent);
        } else if width < current {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent);
            }
            if self.indents.last().copied() != Some(width) {
                return Err(self.syntax("unindent does not match any outer indentation level"));
            }
        }
        Ok(false)
    }

    // ── Words, numbers and operators ───────────────────────────

    fn lex_word(&mut self) -> ScriptResult<()> {
        let start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|c| c == '_' || c.is_alphanumeric())
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek_at(0), Some('"') | Some('\'')) {
            let lower = word.to_ascii_lowercase();
            let (raw, fmt) = match lower.as_str() {
                "r" => (true, false),
                "f" => (false, true),
                "rf" | "fr" => (true, true),
                "b" | "rb" | "br" => {
                    return Err(self.syntax("bytes literals are not supported"));
                }
                "u" => (false, false),
                _ => {
                    self.push_word(word);
                    return Ok(());
                }
            };
            return self.lex_string(raw, fmt);
        }

        self.push_word(word);
        Ok(())
    }

    fn push_word(&mut self, word: String) {
        match TokenKind::keyword(&word) {
            Some(kind) => self.push(kind),
            None => self.push(TokenKind::Name(word)),
        }
    }

    fn lex_number(&mut self) -> ScriptResult<()> {
        let start = self.pos;

        if self.peek_at(0) == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let digits_start = self.pos;
                while self
                    .peek_at(0)
                    .is_some_and(|c| c == '_' || c.is_digit(radix))
                {
                    self.pos += 1;
                }
                let digits: String = self.chars[digits_start..self.pos]
                    .iter()
                    .filter(|c| **c != '_')
                    .collect();
                let value = i64::from_str_radix(&digits, radix)
                    .map_err(|_| self.syntax("invalid integer literal"))?;
                self.push(TokenKind::Int(value));
                return Ok(());
            }
        }

        let mut is_float = false;
        while let Some(c) = self.peek_at(0) {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else if (c == 'e' || c == 'E')
                && (self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+') | Some('-'))
                        && self.peek_at(2).is_some_and(|d| d.is_ascii_digit())))
            {
                is_float = true;
                self.pos += 2;
            } else {
                break;
            }
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.syntax(format!("invalid number literal '{text}'")))?;
            self.push(TokenKind::Float(value));
        } else {
            let value: i64 = text.parse().map_err(|_| {
                self.syntax(format!("integer literal '{text}' does not fit in 64 bits"))
            })?;
            self.push(TokenKind::Int(value));
        }
        Ok(())
    }

    fn lex_operator(&mut self) -> ScriptResult<()> {
        let c = self.chars[self.pos];
        let next = self.peek_at(1);
        let third = self.peek_at(2);

        let (kind, len) = match (c, next, third) {
            ('*', Some('*'), Some('=')) => (TokenKind::DoubleStarAssign, 3),
            ('/', Some('/'), Some('=')) => (TokenKind::DoubleSlashAssign, 3),
            ('*', Some('*'), _) => (TokenKind::DoubleStar, 2),
            ('/', Some('/'), _) => (TokenKind::DoubleSlash, 2),
            ('<', Some('<'), _) => (TokenKind::Shl, 2),
            ('>', Some('>'), _) => (TokenKind::Shr, 2),
            ('<', Some('='), _) => (TokenKind::Le, 2),
            ('>', Some('='), _) => (TokenKind::Ge, 2),
            ('=', Some('='), _) => (TokenKind::EqEq, 2),
            ('!', Some('='), _) => (TokenKind::NotEq, 2),
            ('+', Some('='), _) => (TokenKind::PlusAssign, 2),
            ('-', Some('='), _) => (TokenKind::MinusAssign, 2),
            ('*', Some('='), _) => (TokenKind::StarAssign, 2),
            ('/', Some('='), _) => (TokenKind::SlashAssign, 2),
            ('%', Some('='), _) => (TokenKind::PercentAssign, 2),
            ('&', Some('='), _) => (TokenKind::AmpAssign, 2),
            ('|', Some('='), _) => (TokenKind::PipeAssign, 2),
            ('^', Some('='), _) => (TokenKind::CaretAssign, 2),
            ('-', Some('>'), _) => (TokenKind::Arrow, 2),
            ('+', ..) => (TokenKind::Plus, 1),
            ('-', ..) => (TokenKind::Minus, 1),
            ('*', ..) => (TokenKind::Star, 1),
            ('/', ..) => (TokenKind::Slash, 1),
            ('%', ..) => (TokenKind::Percent, 1),
            ('&', ..) => (TokenKind::Amp, 1),
            ('|', ..) => (TokenKind::Pipe, 1),
            ('^', ..) => (TokenKind::Caret, 1),
            ('~', ..) => (TokenKind::Tilde, 1),
            ('<', ..) => (TokenKind::Lt, 1),
            ('>', ..) => (TokenKind::Gt, 1),
            ('=', ..) => (TokenKind::Assign, 1),
            ('(', ..) => (TokenKind::LParen, 1),
            (')', ..) => (TokenKind::RParen, 1),
            ('[', ..) => (TokenKind::LBracket, 1),
            (']', ..) => (TokenKind::RBracket, 1),
            ('{', ..) => (TokenKind::LBrace, 1),
            ('}', ..) => (TokenKind::RBrace, 1),
            (',', ..) => (TokenKind::Comma, 1),
            (':', ..) => (TokenKind::Colon, 1),
            ('.', ..) => (TokenKind::Dot, 1),
            (';', ..) => (TokenKind::Semicolon, 1),
            (other, ..) => {
                return Err(self.syntax(format!("invalid character '{other}'")));
            }
        };

        match kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => self.depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                if self.depth == 0 {
                    return Err(self.syntax(format!("unmatched '{c}'")));
                }
                self.depth -= 1;
            }
            _ => {}
        }

        self.pos += len;
        self.push(kind);
        Ok(())
    }

    // ── Strings ────────────────────────────────────────────────

    fn lex_string(&mut self, raw: bool, fmt: bool) -> ScriptResult<()> {
        let start_line = self.line;
        let quote = self.chars[self.pos];
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut body = String::new();
        loop {
            let Some(c) = self.peek_at(0) else {
                return Err(ScriptError::Syntax("unterminated string literal".into()).at(start_line));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    return Err(
                        ScriptError::Syntax("unterminated string literal".into()).at(start_line)
                    );
                }
                self.line += 1;
            }
            if c == '\\' {
                if let Some(escaped) = self.peek_at(1) {
                    body.push(c);
                    body.push(escaped);
                    if escaped == '\n' {
                        self.line += 1;
                    }
                    self.pos += 2;
                    continue;
                }
            }
            body.push(c);
            self.pos += 1;
        }

        let kind = if fmt {
            TokenKind::FString(split_fstring(&body, raw).map_err(|e| e.at(start_line))?)
        } else if raw {
            TokenKind::Str(body)
        } else {
            TokenKind::Str(unescape(&body).map_err(|e| e.at(start_line))?)
        };
        self.tokens.push(Token::new(kind, start_line));
        Ok(())
    }
}

/// Resolve backslash escapes in a non-raw string body.
pub fn unescape(body: &str) -> ScriptResult<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(e) = chars.next() else {
            out.push('\\');
            break;
        };
        match e {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            '\n' => {}
            'x' | 'u' => {
                let len = if e == 'x' { 2 } else { 4 };
                let hex: String = (0..len).filter_map(|_| chars.next()).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == len)
                    .and_then(char::from_u32)
                    .ok_or_else(|| ScriptError::Syntax(format!("invalid \\{e} escape")))?;
                out.push(code);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

/// Split an f-string body into literal text and embedded expressions.
fn split_fstring(body: &str, raw: bool) -> ScriptResult<Vec<FStringPart>> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    let flush = |text: &mut String, parts: &mut Vec<FStringPart>| -> ScriptResult<()> {
        if !text.is_empty() {
            let literal = if raw { text.clone() } else { unescape(text)? };
            parts.push(FStringPart::Text(literal));
            text.clear();
        }
        Ok(())
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                text.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                text.push('}');
                i += 2;
            }
            '}' => return Err(ScriptError::Syntax("f-string: single '}' is not allowed".into())),
            '{' => {
                flush(&mut text, &mut parts)?;
                i += 1;
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                let mut source = String::new();
                let mut spec: Option<String> = None;
                let mut repr = false;
                loop {
                    let Some(&c) = chars.get(i) else {
                        return Err(ScriptError::Syntax("f-string: expecting '}'".into()));
                    };
                    if let Some(q) = quote {
                        source.push(c);
                        if c == q {
                            quote = None;
                        }
                        i += 1;
                        continue;
                    }
                    match c {
                        '\'' | '"' => {
                            quote = Some(c);
                            source.push(c);
                        }
                        '(' | '[' | '{' => {
                            depth += 1;
                            source.push(c);
                        }
                        ')' | ']' | '}' if depth > 0 => {
                            depth -= 1;
                            source.push(c);
                        }
                        '}' => {
                            i += 1;
                            break;
                        }
                        '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => {
                            match chars.get(i + 1) {
                                Some('r') => repr = true,
                                Some('s') => {}
                                _ => {
                                    return Err(ScriptError::Syntax(
                                        "f-string: invalid conversion character".into(),
                                    ))
                                }
                            }
                            i += 1;
                        }
                        ':' if depth == 0 => {
                            let mut s = String::new();
                            i += 1;
                            while let Some(&c) = chars.get(i) {
                                if c == '}' {
                                    break;
                                }
                                s.push(c);
                                i += 1;
                            }
                            spec = Some(s);
                            continue;
                        }
                        _ => source.push(c),
                    }
                    i += 1;
                }
                if source.trim().is_empty() {
                    return Err(ScriptError::Syntax("f-string: empty expression not allowed".into()));
                }
                parts.push(FStringPart::Expr { source, spec, repr });
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }
    flush(&mut text, &mut parts)?;
    Ok(parts)
}

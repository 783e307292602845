use std::iter::FusedIterator;
use std::ops::Range;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug)]
pub struct File {
    name: String,
    contents: String,
    lines: Vec<usize>,
}

impl File {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let name = name.into();
        let contents = contents.into();
        let mut lines = vec![0];
        for (idx, ch) in contents.char_indices() {
            if ch == '\n' {
                lines.push(idx + ch.len_utf8());
            }
        }
        Self {
            name,
            contents,
            lines,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn line_column_at(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.contents.len());
        let line_index = match self.lines.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let line_start = self.lines[line_index];
        let column = self.contents[line_start..offset].chars().count() + 1;
        (line_index + 1, column)
    }

    pub fn line(&self, line: usize) -> &str {
        if line == 0 || line > self.lines.len() {
            return "";
        }
        let start = self.lines[line - 1];
        let end = if let Some(next_start) = self.lines.get(line) {
            let mut end = *next_start;
            if end > start && self.contents.as_bytes()[end - 1] == b'\n' {
                end -= 1;
            }
            end
        } else {
            self.contents.len()
        };
        &self.contents[start..end]
    }
}

#[derive(Debug, Clone)]
pub struct Span {
    pub file: Arc<File>,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(file: Arc<File>, start: usize, end: usize) -> Self {
        Self { file, start, end }
    }

    /// Whether `other` lies within `self`, ends included.
    pub fn contains(&self, other: &Span) -> bool {
        Arc::ptr_eq(&self.file, &other.file) && self.start <= other.start && other.end <= self.end
    }

    pub fn line_column(&self) -> (usize, usize) {
        self.file.line_column_at(self.start)
    }

    pub fn to_source_info(&self) -> SourceInfo {
        SourceInfo {
            range: self.start..self.end,
            file: Arc::clone(&self.file),
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_source_info())
    }
}

impl PartialEq for Span {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.file, &other.file) && self.start == other.start && self.end == other.end
    }
}

impl Eq for Span {}

#[derive(Debug, Clone)]
pub struct SourceInfo {
    range: Range<usize>,
    file: Arc<File>,
}

impl SourceInfo {
    pub fn new(file: Arc<File>, range: Range<usize>) -> Self {
        Self { range, file }
    }

    pub fn eof(file: &Arc<File>) -> Self {
        let len = file.len();
        let start = len.saturating_sub(1);
        Self::new(Arc::clone(file), start..len)
    }

    fn as_str(&self) -> &str {
        self.file
            .contents()
            .get(self.range.clone())
            .expect("invalid token position")
    }

    pub fn line_column(&self) -> (usize, usize) {
        self.file.line_column_at(self.range.start)
    }

    pub fn span(&self) -> Span {
        Span::new(Arc::clone(&self.file), self.range.start, self.range.end)
    }
}

impl std::fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (line, column) = self.line_column();
        writeln!(f, "{}:{}:{}\n", self.file.name(), line, column)?;
        let line_text = self.file.line(line);
        writeln!(f, "{}", line_text)?;
        writeln!(
            f,
            "{}{}",
            " ".repeat(column - 1),
            "^".repeat(std::cmp::max(1, self.as_str().chars().count()))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,   // e.g. "foo", "List", "_", "_goal"
    Symbol,  // e.g. "=", "->", "(", "++"
    NumLit,  // e.g. "0", "42"
    Keyword, // e.g. "data", "class"
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub source_info: SourceInfo,
}

impl Token {
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_symbol(&self) -> bool {
        self.kind == TokenKind::Symbol
    }

    pub fn is_num_lit(&self) -> bool {
        self.kind == TokenKind::NumLit
    }

    pub fn is_keyword(&self) -> bool {
        self.kind == TokenKind::Keyword
    }

    pub fn as_str(&self) -> &str {
        self.source_info.as_str()
    }

    /// Tokens in the first column start a new declaration.
    pub fn is_line_head(&self) -> bool {
        self.source_info.line_column().1 == 1
    }
}

#[derive(Debug, Clone)]
pub struct Lex {
    file: Arc<File>,
    position: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct LexState {
    position: usize,
}

#[derive(Debug, Clone, Error)]
#[error("unrecognizable character at {source_info}")]
pub struct LexError {
    source_info: SourceInfo,
}

/// Points at the character the lexer stopped on.
impl From<Lex> for LexError {
    fn from(lex: Lex) -> Self {
        let at = lex.position;
        let width = lex.file.contents()[at..]
            .chars()
            .next()
            .map_or(0, char::len_utf8);
        Self {
            source_info: SourceInfo::new(lex.file, at..at + width),
        }
    }
}

const KEYWORDS: &[&str] = &["data", "class", "instance", "extension", "type"];

impl Lex {
    pub fn new(file: Arc<File>) -> Self {
        Self { file, position: 0 }
    }

    pub fn input(&self) -> &Arc<File> {
        &self.file
    }

    pub fn save(&self) -> LexState {
        LexState {
            position: self.position,
        }
    }

    /// The state just before the next token, past any whitespace.
    pub fn token_start(&self) -> LexState {
        match self.clone().next() {
            Some(Ok(token)) => LexState {
                position: token.source_info.range.start,
            },
            _ => self.save(),
        }
    }

    pub fn restore(&mut self, state: LexState) {
        self.position = state.position;
    }

    fn advance(&mut self, bytes: usize) -> SourceInfo {
        let source_info =
            SourceInfo::new(Arc::clone(&self.file), self.position..self.position + bytes);
        self.position += bytes;
        source_info
    }

    pub fn is_eof(&self) -> bool {
        self.clone().next().is_none()
    }

    /// The span from `start` to the end of the last consumed token.
    pub fn span_since(&self, start: LexState, last_end: usize) -> Span {
        Span::new(Arc::clone(&self.file), start.position, last_end.max(start.position))
    }
}

impl Iterator for Lex {
    type Item = std::result::Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        #[derive(PartialEq, Eq, Debug)]
        enum Kind {
            Space,
            Ident,
            Symbol,
            NumLit,
        }

        static RE: Lazy<Regex> = Lazy::new(|| {
            let s = &[
                (Kind::Space, r"\s+|--.*"),
                (
                    Kind::Ident,
                    r"[\p{Cased_Letter}_][\p{Cased_Letter}\p{Number}_']*",
                ),
                (
                    Kind::Symbol,
                    r"[(){},]|[\p{Symbol}\p{Punctuation}&&[^(){}\[\],_'\x22]]+",
                ),
                (Kind::NumLit, r"0|[1-9][0-9]*"),
            ]
            .iter()
            .map(|(kind, re)| format!("(?P<{:?}>{})", kind, re))
            .collect::<Vec<_>>()
            .join("|");
            regex::Regex::new(&format!("^(?:{})", s)).unwrap()
        });

        loop {
            if self.file.len() == self.position {
                return None;
            }
            let input = Arc::clone(&self.file);
            let cap = match RE.captures(&input.contents()[self.position..]) {
                None => return Some(Err(LexError::from(self.clone()))),
                Some(cap) => cap,
            };

            if let Some(m) = cap.name(&format!("{:?}", Kind::Space)) {
                self.advance(m.range().count());
                continue;
            }

            let width = cap.get(0).map_or(0, |m| m.range().count());
            let source_info = self.advance(width);
            let kind = if cap.name(&format!("{:?}", Kind::Ident)).is_some() {
                match source_info.as_str() {
                    "λ" => TokenKind::Symbol,
                    text if KEYWORDS.contains(&text) => TokenKind::Keyword,
                    _ => TokenKind::Ident,
                }
            } else if cap.name(&format!("{:?}", Kind::NumLit)).is_some() {
                TokenKind::NumLit
            } else {
                TokenKind::Symbol
            };
            return Some(Ok(Token { kind, source_info }));
        }
    }
}

impl FusedIterator for Lex {}

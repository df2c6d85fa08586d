/// Lexer for tokenizing SQL queries
///
/// Converts raw SQL text into a stream of tokens for parsing.
use std::fmt;

/// Token types produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    Distinct,
    From,
    Where,
    Group,
    By,
    Having,
    Order,
    Limit,
    Offset,
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    On,
    As,
    And,
    Or,
    Not,
    Like,
    In,
    Between,
    Is,
    Cast,

    // Operators
    Eq,      // =
    Ne,      // != or <>
    Lt,      // <
    Le,      // <=
    Gt,      // >
    Ge,      // >=
    Plus,    // +
    Minus,   // -
    Slash,   // /
    Percent, // %

    // Literals
    /// Unsigned magnitude; a leading `-` is folded in by the parser
    Integer(u64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,

    // Identifiers
    Identifier(String),
    QuotedIdentifier(String),

    // Punctuation
    Asterisk,   // *
    Comma,      // ,
    Dot,        // .
    LeftParen,  // (
    RightParen, // )
    Semicolon,  // ;

    // Special
    Asc,
    Desc,

    // End of input
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Select => write!(f, "SELECT"),
            Token::Distinct => write!(f, "DISTINCT"),
            Token::From => write!(f, "FROM"),
            Token::Where => write!(f, "WHERE"),
            Token::Group => write!(f, "GROUP"),
            Token::By => write!(f, "BY"),
            Token::Having => write!(f, "HAVING"),
            Token::Order => write!(f, "ORDER"),
            Token::Limit => write!(f, "LIMIT"),
            Token::Offset => write!(f, "OFFSET"),
            Token::Join => write!(f, "JOIN"),
            Token::Inner => write!(f, "INNER"),
            Token::Left => write!(f, "LEFT"),
            Token::Right => write!(f, "RIGHT"),
            Token::Full => write!(f, "FULL"),
            Token::Outer => write!(f, "OUTER"),
            Token::On => write!(f, "ON"),
            Token::As => write!(f, "AS"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Not => write!(f, "NOT"),
            Token::Like => write!(f, "LIKE"),
            Token::In => write!(f, "IN"),
            Token::Between => write!(f, "BETWEEN"),
            Token::Is => write!(f, "IS"),
            Token::Cast => write!(f, "CAST"),
            Token::Eq => write!(f, "="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Integer(i) => write!(f, "{}", i),
            Token::Float(fl) => write!(f, "{}", fl),
            Token::String(s) => write!(f, "'{}'", s),
            Token::Boolean(b) => write!(f, "{}", b),
            Token::Null => write!(f, "NULL"),
            Token::Identifier(id) => write!(f, "{}", id),
            Token::QuotedIdentifier(id) => write!(f, "\"{}\"", id),
            Token::Asterisk => write!(f, "*"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::Semicolon => write!(f, ";"),
            Token::Asc => write!(f, "ASC"),
            Token::Desc => write!(f, "DESC"),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// Lexer state
pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    /// Create a new lexer from input string
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments();

        if self.position >= self.input.len() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();

        // Single-character tokens
        let single = match ch {
            '*' => Some(Token::Asterisk),
            ',' => Some(Token::Comma),
            '.' => Some(Token::Dot),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            ';' => Some(Token::Semicolon),
            '=' => Some(Token::Eq),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        match ch {
            '<' => {
                self.advance();
                if self.consume_if('=') {
                    return Ok(Token::Le);
                }
                if self.consume_if('>') {
                    return Ok(Token::Ne);
                }
                return Ok(Token::Lt);
            }
            '>' => {
                self.advance();
                if self.consume_if('=') {
                    return Ok(Token::Ge);
                }
                return Ok(Token::Gt);
            }
            '!' => {
                let position = self.position;
                self.advance();
                if self.consume_if('=') {
                    return Ok(Token::Ne);
                }
                return Err(LexerError::UnexpectedCharacter { ch, position });
            }
            '\'' => return self.read_string(),
            '"' => return self.read_quoted_identifier(),
            _ => {}
        }

        // Numbers
        if ch.is_ascii_digit() {
            return self.read_number();
        }

        // Identifiers and keywords
        if ch.is_alphabetic() || ch == '_' {
            return Ok(self.read_identifier_or_keyword());
        }

        Err(LexerError::UnexpectedCharacter {
            ch,
            position: self.position,
        })
    }

    /// Tokenize entire input into vector of tokens
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn consume_if(&mut self, expected: char) -> bool {
        if self.position < self.input.len() && self.current_char() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.position < self.input.len() && self.current_char().is_whitespace() {
                self.advance();
            }
            // `--` line comment
            if self.position < self.input.len()
                && self.current_char() == '-'
                && self.peek_char() == Some('-')
            {
                while self.position < self.input.len() && self.current_char() != '\n' {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let start = self.position;
        let mut has_dot = false;

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !has_dot && self.peek_char().is_some_and(|c| c.is_ascii_digit())
            {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let num_str: String = self.input[start..self.position].iter().collect();

        if has_dot {
            num_str
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| LexerError::InvalidNumber(num_str))
        } else {
            num_str
                .parse::<u64>()
                .map(Token::Integer)
                .map_err(|_| LexerError::InvalidNumber(num_str))
        }
    }

    /// Reads a `'...'` literal; `''` inside it is an escaped quote.
    fn read_string(&mut self) -> Result<Token, LexerError> {
        let start = self.position;
        self.advance(); // skip opening quote
        let mut string = String::new();

        loop {
            if self.position >= self.input.len() {
                return Err(LexerError::UnterminatedString { position: start });
            }
            let ch = self.current_char();
            self.advance();
            if ch == '\'' {
                if self.consume_if('\'') {
                    string.push('\'');
                    continue;
                }
                break;
            }
            string.push(ch);
        }

        Ok(Token::String(string))
    }

    fn read_quoted_identifier(&mut self) -> Result<Token, LexerError> {
        let start = self.position;
        self.advance(); // skip opening quote
        let mut ident = String::new();

        loop {
            if self.position >= self.input.len() {
                return Err(LexerError::UnterminatedIdentifier { position: start });
            }
            let ch = self.current_char();
            self.advance();
            if ch == '"' {
                if self.consume_if('"') {
                    ident.push('"');
                    continue;
                }
                break;
            }
            ident.push(ch);
        }

        Ok(Token::QuotedIdentifier(ident))
    }

    fn read_identifier_or_keyword(&mut self) -> Token {
        let start = self.position;

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.position].iter().collect();
        let uppercase = text.to_uppercase();

        // Match keywords
        match uppercase.as_str() {
            "SELECT" => Token::Select,
            "DISTINCT" => Token::Distinct,
            "FROM" => Token::From,
            "WHERE" => Token::Where,
            "GROUP" => Token::Group,
            "BY" => Token::By,
            "HAVING" => Token::Having,
            "ORDER" => Token::Order,
            "LIMIT" => Token::Limit,
            "OFFSET" => Token::Offset,
            "JOIN" => Token::Join,
            "INNER" => Token::Inner,
            "LEFT" => Token::Left,
            "RIGHT" => Token::Right,
            "FULL" => Token::Full,
            "OUTER" => Token::Outer,
            "ON" => Token::On,
            "AS" => Token::As,
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "LIKE" => Token::Like,
            "IN" => Token::In,
            "BETWEEN" => Token::Between,
            "IS" => Token::Is,
            "CAST" => Token::Cast,
            "ASC" => Token::Asc,
            "DESC" => Token::Desc,
            "TRUE" => Token::Boolean(true),
            "FALSE" => Token::Boolean(false),
            "NULL" => Token::Null,
            _ => Token::Identifier(text),
        }
    }
}

/// Lexer errors
#[derive(Debug, Clone, PartialEq)]
pub enum LexerError {
    UnexpectedCharacter { ch: char, position: usize },
    InvalidNumber(String),
    UnterminatedString { position: usize },
    UnterminatedIdentifier { position: usize },
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter { ch, position } => {
                write!(f, "Unexpected character '{}' at position {}", ch, position)
            }
            LexerError::InvalidNumber(s) => write!(f, "Invalid number: '{}'", s),
            LexerError::UnterminatedString { position } => {
                write!(f, "Unterminated string literal starting at position {}", position)
            }
            LexerError::UnterminatedIdentifier { position } => write!(
                f,
                "Unterminated quoted identifier starting at position {}",
                position
            ),
        }
    }
}

impl std::error::Error for LexerError {}

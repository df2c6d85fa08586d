/// Parser for SQL queries
///
/// Converts a stream of tokens into an Abstract Syntax Tree (AST).
use super::ast::*;
use super::lexer::{Lexer, LexerError, Token};
use arrow::datatypes::DataType;
use std::fmt;

/// Parser for SQL queries
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// Create a new parser from SQL text
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize().map_err(ParseError::LexerError)?;
        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse the query into an AST
    pub fn parse(&mut self) -> Result<Query, ParseError> {
        let select = self.parse_select()?;
        let from = self.parse_from()?;
        let where_clause = self.parse_where()?;
        let group_by = self.parse_group_by()?;
        let having = self.parse_having()?;
        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;

        if self.current_token() == &Token::Semicolon {
            self.advance();
        }
        self.expect_token(Token::Eof)?;

        Ok(Query {
            select,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
        })
    }

    fn parse_select(&mut self) -> Result<SelectClause, ParseError> {
        self.expect_token(Token::Select)?;

        let distinct = if self.current_token() == &Token::Distinct {
            self.advance();
            true
        } else {
            false
        };

        let mut items = Vec::new();
        loop {
            items.push(self.parse_select_item()?);

            if self.current_token() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        Ok(SelectClause { distinct, items })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, ParseError> {
        if self.current_token() == &Token::Asterisk {
            self.advance();
            return Ok(SelectItem::Wildcard);
        }

        // t.*
        if let Some(name) = self.identifier_at(self.position) {
            if self.token_at(self.position + 1) == &Token::Dot
                && self.token_at(self.position + 2) == &Token::Asterisk
            {
                self.position += 3;
                return Ok(SelectItem::QualifiedWildcard(name));
            }
        }

        let expr = self.parse_expression()?;
        let alias = self.parse_alias()?;
        Ok(SelectItem::Expr { expr, alias })
    }

    /// `[AS] alias`
    fn parse_alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.current_token() == &Token::As {
            self.advance();
            return self.expect_identifier("alias").map(Some);
        }
        if let Some(alias) = self.identifier_at(self.position) {
            self.advance();
            return Ok(Some(alias));
        }
        Ok(None)
    }

    fn parse_from(&mut self) -> Result<Option<FromClause>, ParseError> {
        if self.current_token() != &Token::From {
            return Ok(None);
        }
        self.advance();

        let relation = self.parse_table_factor()?;
        let mut joins = Vec::new();

        // Parse JOINs
        while matches!(
            self.current_token(),
            Token::Inner | Token::Left | Token::Right | Token::Full | Token::Join
        ) {
            let join_type = match self.current_token() {
                Token::Inner => {
                    self.advance();
                    JoinType::Inner
                }
                Token::Left => {
                    self.advance();
                    self.skip_outer();
                    JoinType::Left
                }
                Token::Right => {
                    self.advance();
                    self.skip_outer();
                    JoinType::Right
                }
                Token::Full => {
                    self.advance();
                    self.skip_outer();
                    JoinType::Full
                }
                _ => JoinType::Inner, // bare JOIN
            };
            self.expect_token(Token::Join)?;

            let relation = self.parse_table_factor()?;
            self.expect_token(Token::On)?;
            let condition = self.parse_expression()?;

            joins.push(Join {
                join_type,
                relation,
                condition,
            });
        }

        Ok(Some(FromClause { relation, joins }))
    }

    fn skip_outer(&mut self) {
        if self.current_token() == &Token::Outer {
            self.advance();
        }
    }

    fn parse_table_factor(&mut self) -> Result<TableFactor, ParseError> {
        let mut name = vec![self.expect_identifier("table name")?];
        while self.current_token() == &Token::Dot {
            self.advance();
            name.push(self.expect_identifier("table name")?);
        }
        let alias = self.parse_alias()?;
        Ok(TableFactor { name, alias })
    }

    fn parse_where(&mut self) -> Result<Option<WhereClause>, ParseError> {
        if self.current_token() != &Token::Where {
            return Ok(None);
        }

        self.advance();
        let condition = self.parse_expression()?;

        Ok(Some(WhereClause { condition }))
    }

    fn parse_group_by(&mut self) -> Result<Option<GroupByClause>, ParseError> {
        if self.current_token() != &Token::Group {
            return Ok(None);
        }

        self.advance();
        self.expect_token(Token::By)?;

        let mut expressions = Vec::new();
        loop {
            expressions.push(self.parse_expression()?);
            if self.current_token() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        Ok(Some(GroupByClause { expressions }))
    }

    fn parse_having(&mut self) -> Result<Option<HavingClause>, ParseError> {
        if self.current_token() != &Token::Having {
            return Ok(None);
        }

        self.advance();
        let condition = self.parse_expression()?;

        Ok(Some(HavingClause { condition }))
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_logical_and()?;

        while self.current_token() == &Token::Or {
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expression::LogicalOp {
                left: Box::new(left),
                op: LogicalOperator::Or,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_not()?;

        while self.current_token() == &Token::And {
            self.advance();
            let right = self.parse_not()?;
            left = Expression::LogicalOp {
                left: Box::new(left),
                op: LogicalOperator::And,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, ParseError> {
        if self.current_token() == &Token::Not {
            self.advance();
            let expr = self.parse_not()?;
            return Ok(Expression::Not(Box::new(expr)));
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_additive()?;

        // IS [NOT] NULL
        if self.current_token() == &Token::Is {
            self.advance();
            let negated = self.consume_not();
            self.expect_token(Token::Null)?;
            return Ok(Expression::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        // [NOT] LIKE / IN / BETWEEN
        let negated = if self.current_token() == &Token::Not
            && matches!(
                self.token_at(self.position + 1),
                Token::Like | Token::In | Token::Between
            ) {
            self.advance();
            true
        } else {
            false
        };

        match self.current_token() {
            Token::Like => {
                self.advance();
                if let Token::String(pattern) = self.current_token().clone() {
                    self.advance();
                    return Ok(Expression::Like {
                        expr: Box::new(left),
                        pattern,
                        negated,
                    });
                }
                return Err(self.unexpected("string pattern"));
            }
            Token::In => {
                self.advance();
                self.expect_token(Token::LeftParen)?;

                let mut list = Vec::new();
                loop {
                    list.push(self.parse_expression()?);
                    if self.current_token() == &Token::Comma {
                        self.advance();
                    } else {
                        break;
                    }
                }

                self.expect_token(Token::RightParen)?;
                return Ok(Expression::In {
                    expr: Box::new(left),
                    list,
                    negated,
                });
            }
            Token::Between => {
                self.advance();
                let low = self.parse_additive()?;
                self.expect_token(Token::And)?;
                let high = self.parse_additive()?;
                return Ok(Expression::Between {
                    expr: Box::new(left),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                });
            }
            _ => {}
        }

        // Handle comparison operators
        let op = match self.current_token() {
            Token::Eq => BinaryOperator::Eq,
            Token::Ne => BinaryOperator::Ne,
            Token::Lt => BinaryOperator::Lt,
            Token::Le => BinaryOperator::Le,
            Token::Gt => BinaryOperator::Gt,
            Token::Ge => BinaryOperator::Ge,
            _ => return Ok(left),
        };

        self.advance();
        let right = self.parse_additive()?;

        Ok(Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn consume_not(&mut self) -> bool {
        if self.current_token() == &Token::Not {
            self.advance();
            true
        } else {
            false
        }
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOperator::Plus,
                Token::Minus => BinaryOperator::Minus,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current_token() {
                Token::Asterisk => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                Token::Percent => BinaryOperator::Modulo,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        match self.current_token() {
            Token::Minus => {
                self.advance();
                // -9223372036854775808 only fits once the sign is applied
                if let Token::Integer(magnitude) = *self.current_token() {
                    if let Some(i) = 0i64.checked_sub_unsigned(magnitude) {
                        self.advance();
                        return Ok(Expression::Literal(Literal::Integer(i)));
                    }
                }
                let expr = self.parse_unary()?;
                Ok(match expr {
                    Expression::Literal(Literal::Integer(i)) if i != i64::MIN => {
                        Expression::Literal(Literal::Integer(-i))
                    }
                    Expression::Literal(Literal::Float(f)) => {
                        Expression::Literal(Literal::Float(-f))
                    }
                    other => Expression::Negative(Box::new(other)),
                })
            }
            Token::Plus => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match self.current_token().clone() {
            Token::Identifier(name) => {
                self.advance();
                if self.current_token() == &Token::LeftParen {
                    return self.parse_function(name);
                }
                self.parse_column_reference(name)
            }
            Token::QuotedIdentifier(name) => {
                self.advance();
                self.parse_column_reference(name)
            }
            Token::Cast => {
                self.advance();
                self.expect_token(Token::LeftParen)?;
                let expr = self.parse_expression()?;
                self.expect_token(Token::As)?;
                let data_type = self.parse_data_type()?;
                self.expect_token(Token::RightParen)?;
                Ok(Expression::Cast {
                    expr: Box::new(expr),
                    data_type,
                })
            }
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_token(Token::RightParen)?;
                Ok(expr)
            }
            Token::Integer(_)
            | Token::Float(_)
            | Token::String(_)
            | Token::Boolean(_)
            | Token::Null => self.parse_literal().map(Expression::Literal),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_column_reference(&mut self, first: String) -> Result<Expression, ParseError> {
        if self.current_token() == &Token::Dot {
            self.advance();
            let name = self.expect_identifier("column name")?;
            return Ok(Expression::Column {
                relation: Some(first),
                name,
            });
        }
        Ok(Expression::Column {
            relation: None,
            name: first,
        })
    }

    fn parse_function(&mut self, name: String) -> Result<Expression, ParseError> {
        self.expect_token(Token::LeftParen)?;
        let name = name.to_uppercase();

        if self.current_token() == &Token::Asterisk {
            self.advance();
            self.expect_token(Token::RightParen)?;
            return Ok(Expression::Function {
                name,
                args: FunctionArgs::Wildcard,
                distinct: false,
            });
        }

        let distinct = if self.current_token() == &Token::Distinct {
            self.advance();
            true
        } else {
            false
        };

        let mut args = Vec::new();
        if self.current_token() != &Token::RightParen {
            loop {
                args.push(self.parse_expression()?);
                if self.current_token() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_token(Token::RightParen)?;

        Ok(Expression::Function {
            name,
            args: FunctionArgs::List(args),
            distinct,
        })
    }

    fn parse_data_type(&mut self) -> Result<DataType, ParseError> {
        let name = match self.current_token().clone() {
            Token::Identifier(name) => name,
            _ => return Err(self.unexpected("a data type")),
        };
        self.advance();

        let upper = name.to_uppercase();
        let data_type = match upper.as_str() {
            "BOOLEAN" | "BOOL" => DataType::Boolean,
            "TINYINT" => DataType::Int8,
            "SMALLINT" => DataType::Int16,
            "INT" | "INTEGER" => DataType::Int32,
            "BIGINT" => DataType::Int64,
            "REAL" | "FLOAT" => DataType::Float32,
            "DOUBLE" => {
                if matches!(self.current_token(), Token::Identifier(p) if p.eq_ignore_ascii_case("PRECISION"))
                {
                    self.advance();
                }
                DataType::Float64
            }
            "VARCHAR" | "CHAR" | "TEXT" | "STRING" => DataType::Utf8,
            // Arrow spellings: Int8, UInt32, Float64, Utf8, ...
            _ => match arrow_type_name(&name) {
                Some(data_type) => data_type,
                None => return Err(ParseError::UnsupportedDataType(name)),
            },
        };

        // UNSIGNED suffix
        let data_type = match self.current_token() {
            Token::Identifier(s) if s.eq_ignore_ascii_case("UNSIGNED") => {
                let unsigned = match data_type {
                    DataType::Int8 => DataType::UInt8,
                    DataType::Int16 => DataType::UInt16,
                    DataType::Int32 => DataType::UInt32,
                    DataType::Int64 => DataType::UInt64,
                    _ => return Err(ParseError::UnsupportedDataType(format!("{} UNSIGNED", name))),
                };
                self.advance();
                unsigned
            }
            _ => data_type,
        };

        // VARCHAR(n): length is accepted and ignored
        if data_type == DataType::Utf8 && self.current_token() == &Token::LeftParen {
            self.advance();
            match self.current_token() {
                Token::Integer(_) => self.advance(),
                _ => return Err(self.unexpected("a length")),
            }
            self.expect_token(Token::RightParen)?;
        }

        Ok(data_type)
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let literal = match self.current_token().clone() {
            Token::Integer(n) => match i64::try_from(n) {
                Ok(i) => Literal::Integer(i),
                Err(_) => {
                    return Err(ParseError::LexerError(LexerError::InvalidNumber(
                        n.to_string(),
                    )))
                }
            },
            Token::Float(f) => Literal::Float(f),
            Token::String(s) => Literal::String(s),
            Token::Boolean(b) => Literal::Boolean(b),
            Token::Null => Literal::Null,
            _ => return Err(self.unexpected("literal value")),
        };
        self.advance();
        Ok(literal)
    }

    fn parse_order_by(&mut self) -> Result<Option<OrderByClause>, ParseError> {
        if self.current_token() != &Token::Order {
            return Ok(None);
        }

        self.advance();
        self.expect_token(Token::By)?;

        let mut items = Vec::new();

        loop {
            let expr = self.parse_expression()?;

            let direction = if self.current_token() == &Token::Desc {
                self.advance();
                OrderDirection::Desc
            } else {
                if self.current_token() == &Token::Asc {
                    self.advance();
                }
                OrderDirection::Asc
            };

            items.push(OrderByItem { expr, direction });

            if self.current_token() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        Ok(Some(OrderByClause { items }))
    }

    fn parse_limit(&mut self) -> Result<Option<LimitClause>, ParseError> {
        if self.current_token() != &Token::Limit {
            return Ok(None);
        }

        self.advance();
        let count = self.expect_count()?;

        let offset = if self.current_token() == &Token::Offset {
            self.advance();
            Some(self.expect_count()?)
        } else {
            None
        };

        Ok(Some(LimitClause { count, offset }))
    }

    fn expect_count(&mut self) -> Result<usize, ParseError> {
        if let Token::Integer(n) = self.current_token() {
            let n = *n as usize;
            self.advance();
            Ok(n)
        } else {
            Err(self.unexpected("a non-negative integer"))
        }
    }

    fn current_token(&self) -> &Token {
        self.token_at(self.position)
    }

    fn token_at(&self, position: usize) -> &Token {
        // The stream always ends with Eof.
        self.tokens
            .get(position)
            .unwrap_or(&self.tokens[self.tokens.len() - 1])
    }

    /// Plain or quoted identifier at `position`.
    fn identifier_at(&self, position: usize) -> Option<String> {
        match self.token_at(position) {
            Token::Identifier(name) | Token::QuotedIdentifier(name) => Some(name.clone()),
            _ => None,
        }
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current_token().clone(),
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        match self.identifier_at(self.position) {
            Some(name) => {
                self.advance();
                Ok(name)
            }
            None => Err(self.unexpected(what)),
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<(), ParseError> {
        if self.current_token() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("{}", expected),
                found: self.current_token().clone(),
            })
        }
    }
}

fn arrow_type_name(name: &str) -> Option<DataType> {
    let data_type = match name {
        "Int8" => DataType::Int8,
        "Int16" => DataType::Int16,
        "Int32" => DataType::Int32,
        "Int64" => DataType::Int64,
        "UInt8" => DataType::UInt8,
        "UInt16" => DataType::UInt16,
        "UInt32" => DataType::UInt32,
        "UInt64" => DataType::UInt64,
        "Float32" => DataType::Float32,
        "Float64" => DataType::Float64,
        "Utf8" => DataType::Utf8,
        "LargeUtf8" => DataType::LargeUtf8,
        "Boolean" => DataType::Boolean,
        _ => return None,
    };
    Some(data_type)
}

/// Parse a full SQL statement
pub fn parse_sql(sql: &str) -> Result<Query, ParseError> {
    Parser::new(sql)?.parse()
}

/// Parser errors
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    LexerError(LexerError),
    UnexpectedToken { expected: String, found: Token },
    UnsupportedDataType(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::LexerError(e) => write!(f, "Lexer error: {}", e),
            ParseError::UnexpectedToken { expected, found } => {
                write!(f, "Expected {}, found {}", expected, found)
            }
            ParseError::UnsupportedDataType(name) => {
                write!(f, "Unsupported data type: {}", name)
            }
        }
    }
}

impl std::error::Error for ParseError {}

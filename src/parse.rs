//! Análisis sintáctico.
//!
//! Parser descendente recursivo sobre una secuencia de tokens ya
//! escaneada. Las expresiones se analizan por "precedence climbing":
//! cada nivel recibe un umbral de prioridad del nivel padre y solo
//! absorbe operadores binarios de prioridad estrictamente mayor, lo
//! cual produce asociatividad izquierda para cadenas de igual prioridad.
//!
//! No hay recuperación de errores. El primer error aborta el análisis
//! y no se construye ningún árbol parcial.

use thiserror::Error;
use tracing::debug;

use crate::{
    scan::{Keyword, Operator, Punctuation, Token, TokenKind},
    source::{Located, Location},
    syntax::*,
};

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Falta un token requerido, o el presente no es del tipo esperado.
    #[error("{message}, found {found}")]
    InvalidToken { message: &'static str, found: Token },

    /// Ninguna regla de la gramática admite este token aquí.
    #[error("Expected {expected}, found {found}")]
    UnknownToken { expected: &'static str, found: Token },
}

type Parse<T> = Result<T, Located<ParseError>>;

/// Construye el árbol sintáctico de un archivo.
///
/// Se espera que `tokens` comience con el marcador de archivo, tal
/// como lo emite [`crate::scan::scan()`].
pub fn parse(tokens: &[Located<Token>]) -> Result<File, Located<ParseError>> {
    let end = match tokens.last() {
        Some(last) if last.kind() == TokenKind::EndOfInput => last.clone(),
        Some(last) => Located::at(Token::end_of_input(), last.location().clone()),
        None => Located::at(Token::end_of_input(), Location::default()),
    };

    let mut parser = Parser {
        tokens,
        position: 0,
        end,
    };

    let file = parser.file()?;
    debug!(
        path = file.path(),
        statements = file.statements.len(),
        "parsed file"
    );

    Ok(file)
}

struct Parser<'a> {
    tokens: &'a [Located<Token>],
    position: usize,
    end: Located<Token>,
}

impl Parser<'_> {
    fn file(&mut self) -> Parse<File> {
        let marker = self.expect(TokenKind::File, "Missing file marker")?;

        let mut statements = Vec::new();
        while !self.at(TokenKind::EndOfInput) {
            statements.push(self.statement()?);
        }

        let end = self.advance();
        Ok(File {
            marker,
            statements,
            end,
        })
    }

    fn statement(&mut self) -> Parse<Statement> {
        let statement = match self.current().kind() {
            TokenKind::Keyword(Keyword::Import) => Statement::Import(self.import()?),

            TokenKind::Keyword(Keyword::External | Keyword::Function) => {
                // Solo las declaraciones sin cuerpo terminan en `;`
                return self.function().map(Statement::FunctionDeclaration);
            }

            TokenKind::Keyword(Keyword::If) => return self.if_statement().map(Statement::If),
            TokenKind::Keyword(Keyword::While) => {
                return self.while_statement().map(Statement::While)
            }

            TokenKind::Punctuation(Punctuation::OpenCurly) => {
                return self.section().map(Statement::Section)
            }

            TokenKind::Keyword(Keyword::Var) => {
                Statement::VariableDeclaration(self.variable_declaration()?)
            }

            TokenKind::Keyword(Keyword::Return) => Statement::Return(self.return_statement()?),

            _ if self.is_assignment() => Statement::Assignment(self.assignment()?),
            _ => Statement::Expression(self.expression(0)?),
        };

        self.expect(
            TokenKind::Punctuation(Punctuation::Semicolon),
            "Missing semicolon after statement",
        )?;

        Ok(statement)
    }

    fn import(&mut self) -> Parse<Import> {
        let keyword = self.advance();
        let path = self.expect(TokenKind::StringLiteral, "Expected import path")?;

        Ok(Import { keyword, path })
    }

    fn function(&mut self) -> Parse<FunctionDeclaration> {
        let external = match self.current().kind() {
            TokenKind::Keyword(Keyword::External) => Some(self.advance()),
            _ => None,
        };

        let keyword = self.expect(TokenKind::Keyword(Keyword::Function), "Expected `function`")?;
        let identifier = self.identifier("Expected function name")?;

        let opening = self.expect(
            TokenKind::Punctuation(Punctuation::OpenParen),
            "Expected `(` after function name",
        )?;

        let mut parameters = Vec::new();
        while self.current().as_ref().is_identifier() {
            let identifier = self.advance();
            let type_clause = self.type_clause()?;
            parameters.push(FunctionParameter {
                identifier,
                type_clause,
            });

            if self.at(TokenKind::Punctuation(Punctuation::Comma)) {
                self.advance();
            } else {
                break;
            }
        }

        let closing = self.closing_paren()?;
        let return_type = match self.current().kind() {
            TokenKind::Punctuation(Punctuation::Colon) => Some(self.type_clause()?),
            _ => None,
        };

        let section = match self.current().kind() {
            TokenKind::Punctuation(Punctuation::OpenCurly) => Some(self.section()?),
            TokenKind::Punctuation(Punctuation::Semicolon) => {
                self.advance();
                None
            }

            _ => return self.invalid("Expected function body or `;`"),
        };

        Ok(FunctionDeclaration {
            external,
            keyword,
            identifier,
            opening,
            parameters,
            closing,
            return_type,
            section,
        })
    }

    fn type_clause(&mut self) -> Parse<TypeClause> {
        let colon = self.expect(
            TokenKind::Punctuation(Punctuation::Colon),
            "Expected `:` before type",
        )?;

        let identifier = self.identifier("Expected type name")?;
        Ok(TypeClause { colon, identifier })
    }

    fn section(&mut self) -> Parse<Section> {
        let opening = self.expect(TokenKind::Punctuation(Punctuation::OpenCurly), "Expected `{`")?;

        let close = TokenKind::Punctuation(Punctuation::CloseCurly);
        let mut statements = Vec::new();
        while !self.at(close) && !self.at(TokenKind::EndOfInput) {
            statements.push(self.statement()?);
        }

        let closing = self.expect(close, "Missing `}` at end of section")?;
        Ok(Section {
            opening,
            statements,
            closing,
        })
    }

    fn variable_declaration(&mut self) -> Parse<VariableDeclaration> {
        let keyword = self.advance();

        // Única producción donde declaración e inicialización coinciden
        if self.follower().kind() == TokenKind::Operator(Operator::Assign) {
            if !self.current().as_ref().is_identifier() {
                return self.invalid("Expected variable name");
            }

            let identifier = self.current().clone();
            let assignment = self.assignment()?;

            return Ok(VariableDeclaration {
                keyword,
                identifier,
                type_clause: None,
                assignment: Some(assignment),
            });
        }

        let identifier = self.identifier("Expected variable name")?;
        let type_clause = match self.current().kind() {
            TokenKind::Punctuation(Punctuation::Colon) => Some(self.type_clause()?),
            _ => None,
        };

        let assignment = match self.current().kind() {
            TokenKind::Operator(Operator::Assign) => {
                let operator = self.advance();
                let expression = self.expression(0)?;

                Some(Assignment {
                    identifier: identifier.clone(),
                    operator,
                    expression,
                })
            }

            _ => None,
        };

        Ok(VariableDeclaration {
            keyword,
            identifier,
            type_clause,
            assignment,
        })
    }

    fn is_assignment(&self) -> bool {
        self.current().as_ref().is_identifier()
            && self.follower().kind() == TokenKind::Operator(Operator::Assign)
    }

    fn assignment(&mut self) -> Parse<Assignment> {
        let identifier = self.advance();
        let operator = self.advance();
        let expression = self.expression(0)?;

        Ok(Assignment {
            identifier,
            operator,
            expression,
        })
    }

    fn if_statement(&mut self) -> Parse<IfStatement> {
        let keyword = self.advance();
        let condition = self.expression(0)?;
        let section = self.section()?;

        let else_clause = match self.current().kind() {
            TokenKind::Keyword(Keyword::Else) => {
                let keyword = self.advance();
                let follow_up = match self.current().kind() {
                    TokenKind::Keyword(Keyword::If) => Statement::If(self.if_statement()?),
                    _ => Statement::Section(self.section()?),
                };

                Some(ElseClause {
                    keyword,
                    follow_up: Box::new(follow_up),
                })
            }

            _ => None,
        };

        Ok(IfStatement {
            keyword,
            condition,
            section,
            else_clause,
        })
    }

    fn while_statement(&mut self) -> Parse<WhileStatement> {
        let keyword = self.advance();
        let condition = self.expression(0)?;
        let section = self.section()?;

        Ok(WhileStatement {
            keyword,
            condition,
            section,
        })
    }

    fn return_statement(&mut self) -> Parse<ReturnStatement> {
        let keyword = self.advance();
        let expression = match self.current().kind() {
            TokenKind::Punctuation(Punctuation::Semicolon) => None,
            _ => Some(self.expression(0)?),
        };

        Ok(ReturnStatement {
            keyword,
            expression,
        })
    }

    fn expression(&mut self, parent_priority: u8) -> Parse<Expression> {
        let unary_priority = unary_priority(self.current());
        let mut left = if unary_priority != 0 && unary_priority >= parent_priority {
            let operator = self.advance();
            let operand = self.expression(unary_priority)?;

            Expression::Unary {
                operator,
                operand: Box::new(operand),
            }
        } else {
            self.primary_expression()?
        };

        loop {
            let priority = binary_priority(self.current());
            if priority == 0 || priority <= parent_priority {
                break Ok(left);
            }

            let operator = self.advance();
            let right = self.expression(priority)?;

            left = Expression::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
    }

    fn primary_expression(&mut self) -> Parse<Expression> {
        match self.current().kind() {
            TokenKind::Punctuation(Punctuation::OpenParen) => {
                let opening = self.advance();
                let inner = self.expression(0)?;
                let closing = self.closing_paren()?;

                Ok(Expression::Parenthesized {
                    opening,
                    inner: Box::new(inner),
                    closing,
                })
            }

            TokenKind::IntegerLiteral
            | TokenKind::StringLiteral
            | TokenKind::Keyword(Keyword::True | Keyword::False) => {
                Ok(Expression::Literal(self.advance()))
            }

            TokenKind::Identifier | TokenKind::VariableIdentifier => {
                if self.follower().kind() == TokenKind::Punctuation(Punctuation::OpenParen) {
                    self.call_expression()
                } else {
                    Ok(Expression::Name(self.advance()))
                }
            }

            _ => self.unknown("expression"),
        }
    }

    fn call_expression(&mut self) -> Parse<Expression> {
        let identifier = self.advance();
        let opening = self.advance();

        let mut arguments = Vec::new();
        let mut separators = Vec::new();
        while !self.at(TokenKind::Punctuation(Punctuation::CloseParen))
            && !self.at(TokenKind::EndOfInput)
        {
            arguments.push(self.expression(0)?);

            if self.at(TokenKind::Punctuation(Punctuation::Comma)) {
                separators.push(self.advance());
            } else {
                break;
            }
        }

        let closing = self.closing_paren()?;
        Ok(Expression::Call {
            identifier,
            opening,
            arguments,
            separators,
            closing,
        })
    }

    fn closing_paren(&mut self) -> Parse<Located<Token>> {
        self.expect(TokenKind::Punctuation(Punctuation::CloseParen), "Expected `)`")
    }

    fn identifier(&mut self, message: &'static str) -> Parse<Located<Token>> {
        if self.current().as_ref().is_identifier() {
            Ok(self.advance())
        } else {
            self.invalid(message)
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &'static str) -> Parse<Located<Token>> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            self.invalid(message)
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current().kind() == kind
    }

    fn token(&self, offset: usize) -> &Located<Token> {
        self.tokens.get(self.position + offset).unwrap_or(&self.end)
    }

    fn current(&self) -> &Located<Token> {
        self.token(0)
    }

    fn follower(&self) -> &Located<Token> {
        self.token(1)
    }

    fn advance(&mut self) -> Located<Token> {
        let token = self.current().clone();
        self.position += 1;

        token
    }

    fn invalid<T>(&self, message: &'static str) -> Parse<T> {
        let (location, found) = self.current().clone().split();
        Err(Located::at(ParseError::InvalidToken { message, found }, location))
    }

    fn unknown<T>(&self, expected: &'static str) -> Parse<T> {
        let (location, found) = self.current().clone().split();
        Err(Located::at(ParseError::UnknownToken { expected, found }, location))
    }
}

fn binary_priority(token: &Located<Token>) -> u8 {
    match token.kind() {
        TokenKind::Operator(operator) => operator.binary_priority(),
        _ => 0,
    }
}

fn unary_priority(token: &Located<Token>) -> u8 {
    match token.kind() {
        TokenKind::Operator(operator) => operator.unary_priority(),
        _ => 0,
    }
}

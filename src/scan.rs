//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto de un
//! archivo en unidades léxicas denominadas tokens. La entrada se segmenta
//! en coincidencias maximales de alguna de las siguientes formas, en orden
//! de prioridad:
//!
//! 1. Una cadena literal entre comillas simples, en una misma línea.
//! 2. Una secuencia de dígitos.
//! 3. Una secuencia de letras ASCII.
//! 4. Un operador o signo de puntuación conocido (el más largo posible).
//!
//! Los espacios en blanco y los comentarios de línea (`//`) se descartan.
//! Cualquier otro carácter es un error.
//!
//! # Contenido de un token
//! A diferencia de otras fases, todo token conserva su lexema original,
//! con excepción de las cadenas literales, para las cuales se conserva
//! únicamente el contenido entre comillas. La secuencia emitida siempre
//! comienza con un token [`TokenKind::File`] que porta el nombre del
//! archivo y termina con un centinela [`TokenKind::EndOfInput`].
//!
//! # Errores
//! El primer carácter desconocido aborta el análisis. No se emiten
//! secuencias parciales.

use crate::source::{Located, Location, Position, Source};
use std::{
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;
use tracing::debug;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Carácter que no inicia ninguna forma léxica conocida.
    #[error("Unknown symbol {0:?}")]
    UnknownSymbol(char),
}

/// Clasificación de un token.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Marcador de inicio de archivo, su texto es la ruta.
    File,

    /// Centinela de fin de entrada.
    EndOfInput,

    /// Identificador.
    Identifier,

    /// Identificador en posición de declaración o destino de asignación.
    VariableIdentifier,

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntegerLiteral,

    /// Literal de cadena.
    StringLiteral,

    /// Operador.
    Operator(Operator),

    /// Signo de puntuación.
    Punctuation(Punctuation),
}

impl Display for TokenKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;

        match self {
            File => fmt.write_str("file marker"),
            EndOfInput => fmt.write_str("end of input"),
            Identifier | VariableIdentifier => fmt.write_str("identifier"),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntegerLiteral => fmt.write_str("integer literal"),
            StringLiteral => fmt.write_str("string literal"),
            Operator(operator) => write!(fmt, "`{}`", operator),
            Punctuation(punctuation) => write!(fmt, "`{}`", punctuation),
        }
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token es inmutable una vez construido. Su ubicación se
/// almacena por fuera, en [`Located`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    text: String,
}

impl Token {
    /// Construye un token.
    pub fn new<S: Into<String>>(kind: TokenKind, text: S) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }

    /// Construye un centinela de fin de entrada.
    pub fn end_of_input() -> Self {
        Token::new(TokenKind::EndOfInput, "")
    }

    /// Obtiene la clasificación.
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Obtiene el lexema (o el contenido, para cadenas).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Determina si el token es un identificador de cualquier tipo.
    pub fn is_identifier(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Identifier | TokenKind::VariableIdentifier
        )
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Identifier | TokenKind::VariableIdentifier => {
                write!(fmt, "identifier `{}`", self.text)
            }

            TokenKind::IntegerLiteral => write!(fmt, "literal `{}`", self.text),
            TokenKind::StringLiteral => write!(fmt, "literal `'{}'`", self.text),
            kind => Display::fmt(&kind, fmt),
        }
    }
}

impl Located<Token> {
    /// Línea (base 1) del primer carácter del token.
    pub fn line(&self) -> u32 {
        self.location().start().line()
    }

    /// Columna (base 1) del primer carácter del token.
    pub fn column(&self) -> u32 {
        self.location().start().column()
    }

    /// Clasificación del token.
    pub fn kind(&self) -> TokenKind {
        self.as_ref().kind()
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Var,
    Function,
    External,
    Return,
    If,
    Else,
    While,
    Import,
    True,
    False,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;
        let string = match self {
            Var      => "var",
            Function => "function",
            External => "external",
            Return   => "return",
            If       => "if",
            Else     => "else",
            While    => "while",
            Import   => "import",
            True     => "true",
            False    => "false",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        const KEYWORDS: &[(&str, Keyword)] = &[
            ("var",      Var),
            ("function", Function),
            ("external", External),
            ("return",   Return),
            ("if",       If),
            ("else",     Else),
            ("while",    While),
            ("import",   Import),
            ("true",     True),
            ("false",    False),
        ];

        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Un operador.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `:=`
    Assign,
    /// `|`
    Or,
    /// `&`
    And,
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Times,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `!`
    Not,
}

impl Operator {
    /// Prioridad como operador binario, o cero si no lo es.
    ///
    /// Mayor prioridad implica mayor precedencia.
    pub fn binary_priority(self) -> u8 {
        use Operator::*;

        match self {
            Or => 1,
            And => 2,
            Equal | NotEqual => 3,
            Less | LessOrEqual | Greater | GreaterOrEqual => 4,
            Plus | Minus => 5,
            Times | Divide | Modulo => 6,
            Assign | Not => 0,
        }
    }

    /// Prioridad como operador unario, o cero si no lo es.
    pub fn unary_priority(self) -> u8 {
        use Operator::*;

        match self {
            Plus | Minus | Not => 7,
            _ => 0,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = SYMBOLS
            .iter()
            .find(|(_, kind)| *kind == TokenKind::Operator(*self))
            .map(|(symbol, _)| *symbol)
            .unwrap_or("?");

        fmt.write_str(symbol)
    }
}

/// Un signo de puntuación.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Punctuation {
    /// `(`
    OpenParen,
    /// `)`
    CloseParen,
    /// `{`
    OpenCurly,
    /// `}`
    CloseCurly,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
}

impl Display for Punctuation {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = SYMBOLS
            .iter()
            .find(|(_, kind)| *kind == TokenKind::Punctuation(*self))
            .map(|(symbol, _)| *symbol)
            .unwrap_or("?");

        fmt.write_str(symbol)
    }
}

/// Conjunto fijo de operadores y signos de puntuación.
///
/// Los símbolos de dos caracteres preceden a sus prefijos, de modo que
/// una búsqueda lineal encuentra siempre la coincidencia más larga.
const SYMBOLS: &[(&str, TokenKind)] = {
    use {Operator::*, Punctuation::*, TokenKind::Operator as Op, TokenKind::Punctuation as Punct};

    &[
        (":=", Op(Assign)),
        ("!=", Op(NotEqual)),
        ("<=", Op(LessOrEqual)),
        (">=", Op(GreaterOrEqual)),
        ("|", Op(Or)),
        ("&", Op(And)),
        ("=", Op(Equal)),
        ("<", Op(Less)),
        (">", Op(Greater)),
        ("+", Op(Plus)),
        ("-", Op(Minus)),
        ("*", Op(Times)),
        ("/", Op(Divide)),
        ("%", Op(Modulo)),
        ("!", Op(Not)),
        ("(", Punct(OpenParen)),
        (")", Punct(CloseParen)),
        ("{", Punct(OpenCurly)),
        ("}", Punct(CloseCurly)),
        (",", Punct(Comma)),
        (":", Punct(Colon)),
        (";", Punct(Semicolon)),
    ]
};

/// Escanea un archivo completo.
///
/// El resultado comienza con el marcador de archivo y termina con el
/// centinela de fin de entrada. Ante el primer error se descarta todo
/// lo demás.
pub fn scan(text: &str, path: &str) -> Result<Vec<Located<Token>>, Located<ScanError>> {
    let mut scanner = Scanner::new(Source::new(path, text), text);
    let start = Location::single(Rc::clone(&scanner.source), Position::default());

    let mut tokens = vec![Located::at(Token::new(TokenKind::File, path), start)];
    for token in &mut scanner {
        tokens.push(token?);
    }

    let end = Location::single(Rc::clone(&scanner.source), scanner.position);
    tokens.push(Located::at(Token::end_of_input(), end));

    mark_variable_identifiers(&mut tokens);
    debug!(path, tokens = tokens.len(), "scanned source");

    Ok(tokens)
}

/// Escáner carácter por carácter.
///
/// Cada invocación de [`Iterator::next()`] consume una coincidencia
/// maximal y emite a lo sumo un token.
pub struct Scanner {
    source: Rc<Source>,
    chars: Vec<char>,
    index: usize,
    position: Position,
}

impl Scanner {
    /// Crea un escáner al inicio de un texto.
    pub fn new(source: Rc<Source>, text: &str) -> Self {
        Scanner {
            source,
            chars: text.chars().collect(),
            index: 0,
            position: Position::default(),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.index += 1;
        self.position = match c {
            '\n' => self.position.newline(),
            _ => self.position.advance(),
        };

        Some(c)
    }

    /// Consume caracteres mientras se cumpla un predicado.
    fn take_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> String {
        let mut taken = String::new();
        while let Some(c) = self.peek(0).filter(|&c| predicate(c)) {
            taken.push(c);
            self.bump();
        }

        taken
    }

    /// Descarta espacios en blanco y comentarios.
    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }

                (Some('/'), Some('/')) => {
                    self.take_while(|c| c != '\n');
                }

                _ => break,
            }
        }
    }

    /// Longitud, en caracteres, de una cadena literal que inicia aquí.
    ///
    /// Una comilla sin cierre en la misma línea no forma una cadena.
    fn string_length(&self) -> Option<usize> {
        self.chars[self.index + 1..]
            .iter()
            .take_while(|&&c| c != '\n')
            .position(|&c| c == '\'')
            .map(|inner| inner + 2)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Token>, ScanError> {
        let c = match self.peek(0) {
            None => return Ok(None),
            Some(c) => c,
        };

        let token = if c == '\'' && self.string_length().is_some() {
            self.bump();
            let content = self.take_while(|c| c != '\'');
            self.bump();

            Token::new(TokenKind::StringLiteral, content)
        } else if c.is_ascii_digit() {
            let digits = self.take_while(|c| c.is_ascii_digit());
            Token::new(TokenKind::IntegerLiteral, digits)
        } else if c.is_ascii_alphabetic() {
            let word = self.take_while(|c| c.is_ascii_alphabetic());
            match Keyword::from_str(&word) {
                Ok(keyword) => Token::new(TokenKind::Keyword(keyword), word),
                Err(()) => Token::new(TokenKind::Identifier, word),
            }
        } else {
            let rest = &self.chars[self.index..];
            let (symbol, kind) = SYMBOLS
                .iter()
                .find(|(symbol, _)| {
                    let length = symbol.chars().count();
                    rest.len() >= length && symbol.chars().eq(rest[..length].iter().copied())
                })
                .ok_or(ScanError::UnknownSymbol(c))?;

            for _ in symbol.chars() {
                self.bump();
            }

            Token::new(*kind, *symbol)
        };

        Ok(Some(token))
    }
}

impl Iterator for Scanner {
    type Item = Result<Located<Token>, Located<ScanError>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_trivia();

        let start = self.position;
        match self.lex() {
            Ok(None) => None,
            Ok(Some(token)) => {
                let location = Location::new(Rc::clone(&self.source), start, self.position);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                let location = Location::single(Rc::clone(&self.source), start);

                // Tras un error no se emite nada más
                self.index = self.chars.len();
                Some(Err(Located::at(error, location)))
            }
        }
    }
}

/// Reclasifica identificadores que se declaran o se asignan.
///
/// Un identificador que sigue a `var` o que precede a `:=` se convierte
/// en [`TokenKind::VariableIdentifier`].
fn mark_variable_identifiers(tokens: &mut [Located<Token>]) {
    for index in 0..tokens.len() {
        if tokens[index].kind() != TokenKind::Identifier {
            continue;
        }

        let after_var = index > 0
            && tokens[index - 1].kind() == TokenKind::Keyword(Keyword::Var);

        let before_assign = tokens
            .get(index + 1)
            .map_or(false, |next| next.kind() == TokenKind::Operator(Operator::Assign));

        if after_var || before_assign {
            let (location, token) = tokens[index].clone().split();
            let token = Token::new(TokenKind::VariableIdentifier, token.text);
            tokens[index] = Located::at(token, location);
        }
    }
}

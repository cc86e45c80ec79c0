//! Árbol sintáctico.
//!
//! Reflejo directo de la gramática, previo a resolución de nombres.
//! Cada nodo es dueño de sus hijos y de los tokens que lo delimitan.
//! Estos tokens no se vuelven a procesar; existen para que los
//! diagnósticos puedan reproducir posiciones y texto original.

use crate::{
    scan::Token,
    source::{Located, Location},
};

/// Un token con su ubicación.
pub type SyntaxToken = Located<Token>;

/// Raíz de un archivo.
#[derive(Debug, Clone)]
pub struct File {
    pub marker: SyntaxToken,
    pub statements: Vec<Statement>,
    pub end: SyntaxToken,
}

impl File {
    /// Ruta del archivo, según su marcador.
    pub fn path(&self) -> &str {
        self.marker.as_ref().text()
    }

    /// Rutas que este archivo importa, en orden de aparición.
    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.statements.iter().filter_map(|statement| match statement {
            Statement::Import(import) => Some(import),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Statement {
    Import(Import),
    FunctionDeclaration(FunctionDeclaration),
    VariableDeclaration(VariableDeclaration),
    Assignment(Assignment),
    If(IfStatement),
    While(WhileStatement),
    Return(ReturnStatement),
    Section(Section),
    Expression(Expression),
}

impl Statement {
    /// Ubicación aproximada, para diagnósticos.
    pub fn location(&self) -> Location {
        match self {
            Statement::Import(import) => import.keyword.location().clone(),
            Statement::FunctionDeclaration(function) => function.keyword.location().clone(),
            Statement::VariableDeclaration(declaration) => declaration.keyword.location().clone(),
            Statement::Assignment(assignment) => assignment.identifier.location().clone(),
            Statement::If(statement) => statement.keyword.location().clone(),
            Statement::While(statement) => statement.keyword.location().clone(),
            Statement::Return(statement) => statement.keyword.location().clone(),
            Statement::Section(section) => section.opening.location().clone(),
            Statement::Expression(expression) => expression.location(),
        }
    }
}

/// `import 'ruta';`
#[derive(Debug, Clone)]
pub struct Import {
    pub keyword: SyntaxToken,
    pub path: SyntaxToken,
}

/// `{ ... }`
#[derive(Debug, Clone)]
pub struct Section {
    pub opening: SyntaxToken,
    pub statements: Vec<Statement>,
    pub closing: SyntaxToken,
}

/// `: Tipo`
#[derive(Debug, Clone)]
pub struct TypeClause {
    pub colon: SyntaxToken,
    pub identifier: SyntaxToken,
}

/// Declaración de función.
///
/// Las funciones externas carecen de cuerpo y terminan en `;`.
#[derive(Debug, Clone)]
pub struct FunctionDeclaration {
    pub external: Option<SyntaxToken>,
    pub keyword: SyntaxToken,
    pub identifier: SyntaxToken,
    pub opening: SyntaxToken,
    pub parameters: Vec<FunctionParameter>,
    pub closing: SyntaxToken,
    pub return_type: Option<TypeClause>,
    pub section: Option<Section>,
}

#[derive(Debug, Clone)]
pub struct FunctionParameter {
    pub identifier: SyntaxToken,
    pub type_clause: TypeClause,
}

/// `var nombre [: Tipo] [:= expr]`
///
/// La inicialización, si existe, es un nodo de asignación completo.
#[derive(Debug, Clone)]
pub struct VariableDeclaration {
    pub keyword: SyntaxToken,
    pub identifier: SyntaxToken,
    pub type_clause: Option<TypeClause>,
    pub assignment: Option<Assignment>,
}

/// `nombre := expr`
#[derive(Debug, Clone)]
pub struct Assignment {
    pub identifier: SyntaxToken,
    pub operator: SyntaxToken,
    pub expression: Expression,
}

#[derive(Debug, Clone)]
pub struct IfStatement {
    pub keyword: SyntaxToken,
    pub condition: Expression,
    pub section: Section,
    pub else_clause: Option<ElseClause>,
}

/// `else` seguido de otro `if` o de una sección.
#[derive(Debug, Clone)]
pub struct ElseClause {
    pub keyword: SyntaxToken,
    pub follow_up: Box<Statement>,
}

#[derive(Debug, Clone)]
pub struct WhileStatement {
    pub keyword: SyntaxToken,
    pub condition: Expression,
    pub section: Section,
}

#[derive(Debug, Clone)]
pub struct ReturnStatement {
    pub keyword: SyntaxToken,
    pub expression: Option<Expression>,
}

#[derive(Debug, Clone)]
pub enum Expression {
    /// Entero, cadena, `true` o `false`.
    Literal(SyntaxToken),

    /// Referencia a un nombre, aún sin resolver.
    Name(SyntaxToken),

    Parenthesized {
        opening: SyntaxToken,
        inner: Box<Expression>,
        closing: SyntaxToken,
    },

    Unary {
        operator: SyntaxToken,
        operand: Box<Expression>,
    },

    Binary {
        left: Box<Expression>,
        operator: SyntaxToken,
        right: Box<Expression>,
    },

    Call {
        identifier: SyntaxToken,
        opening: SyntaxToken,
        arguments: Vec<Expression>,
        separators: Vec<SyntaxToken>,
        closing: SyntaxToken,
    },
}

impl Expression {
    /// Ubicación que abarca a toda la expresión.
    pub fn location(&self) -> Location {
        use Expression::*;

        match self {
            Literal(token) | Name(token) => token.location().clone(),

            Parenthesized {
                opening, closing, ..
            } => Location::span(opening.location().clone(), closing.location()),

            Unary { operator, operand } => {
                Location::span(operator.location().clone(), &operand.location())
            }

            Binary { left, right, .. } => Location::span(left.location(), &right.location()),

            Call {
                identifier,
                closing,
                ..
            } => Location::span(identifier.location().clone(), closing.location()),
        }
    }
}

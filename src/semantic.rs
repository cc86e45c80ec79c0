//! Árbol semántico.
//!
//! Misma forma que el árbol sintáctico, pero con nombres ya resueltos a
//! símbolos y operadores ya resueltos a operadores integrados con tipos
//! concretos. Los paréntesis desaparecen en esta representación. Este
//! árbol es la entrada de [`crate::lower`].

use std::{
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use crate::source::Location;

/// Tipo de un valor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    String,
    Bool,
    Void,
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => fmt.write_str("Int"),
            Type::String => fmt.write_str("String"),
            Type::Bool => fmt.write_str("Bool"),
            Type::Void => fmt.write_str("Void"),
        }
    }
}

impl FromStr for Type {
    type Err = ();

    /// Solo los tipos que pueden almacenarse tienen nombre.
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "Int" => Ok(Type::Int),
            "String" => Ok(Type::String),
            "Bool" => Ok(Type::Bool),
            _ => Err(()),
        }
    }
}

/// Una variable local o un parámetro.
#[derive(Debug, PartialEq)]
pub struct VariableSymbol {
    pub name: String,
    pub typ: Type,
}

/// Una función, generada o externa.
#[derive(Debug, PartialEq)]
pub struct FunctionSymbol {
    pub name: String,
    pub parameters: Vec<Rc<VariableSymbol>>,
    pub return_type: Type,
    pub is_external: bool,
}

/// Destino de saltos, siempre generado por el compilador.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct LabelSymbol {
    pub name: String,
}

impl Display for LabelSymbol {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOperatorKind {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
}

impl Display for BinaryOperatorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinaryOperatorKind::*;

        let symbol = match self {
            Or => "|",
            And => "&",
            Equal => "=",
            NotEqual => "!=",
            Less => "<",
            LessOrEqual => "<=",
            Greater => ">",
            GreaterOrEqual => ">=",
            Addition => "+",
            Subtraction => "-",
            Multiplication => "*",
            Division => "/",
            Modulo => "%",
        };

        fmt.write_str(symbol)
    }
}

/// Operador binario integrado, para una combinación fija de tipos.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BinaryOperator {
    pub kind: BinaryOperatorKind,
    pub left: Type,
    pub right: Type,
    pub result: Type,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOperatorKind {
    Identity,
    Negation,
    Not,
}

impl Display for UnaryOperatorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperatorKind::Identity => fmt.write_str("+"),
            UnaryOperatorKind::Negation => fmt.write_str("-"),
            UnaryOperatorKind::Not => fmt.write_str("!"),
        }
    }
}

/// Operador unario integrado.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnaryOperator {
    pub kind: UnaryOperatorKind,
    pub operand: Type,
    pub result: Type,
}

/// Operadores y funciones conocidos por el compilador.
pub mod builtins {
    use super::*;

    const fn binary(kind: BinaryOperatorKind, operands: Type, result: Type) -> BinaryOperator {
        BinaryOperator {
            kind,
            left: operands,
            right: operands,
            result,
        }
    }

    /// Igualdad de cadenas.
    ///
    /// La comparación nativa de la arquitectura objetivo compara
    /// direcciones, no contenido. Por tanto, este operador nunca llega
    /// al generador de código: [`crate::lower`] lo reemplaza por una
    /// llamada a [`strings_are_equal()`].
    pub const STRING_EQUAL: BinaryOperator =
        binary(BinaryOperatorKind::Equal, Type::String, Type::Bool);

    /// Desigualdad de cadenas, reemplazada por la negación de
    /// [`strings_are_equal()`].
    pub const STRING_NOT_EQUAL: BinaryOperator =
        binary(BinaryOperatorKind::NotEqual, Type::String, Type::Bool);

    /// Nombre de la función de comparación de cadenas por valor.
    pub const STRINGS_ARE_EQUAL: &str = "stringsAreEqual";

    pub const BINARY_OPERATORS: &[BinaryOperator] = {
        use {BinaryOperatorKind::*, Type::*};

        &[
            binary(Addition, Int, Int),
            binary(Subtraction, Int, Int),
            binary(Multiplication, Int, Int),
            binary(Division, Int, Int),
            binary(Modulo, Int, Int),
            binary(Less, Int, Bool),
            binary(LessOrEqual, Int, Bool),
            binary(Greater, Int, Bool),
            binary(GreaterOrEqual, Int, Bool),
            binary(Equal, Int, Bool),
            binary(NotEqual, Int, Bool),
            binary(Equal, Bool, Bool),
            binary(NotEqual, Bool, Bool),
            binary(Or, Bool, Bool),
            binary(And, Bool, Bool),
            STRING_EQUAL,
            STRING_NOT_EQUAL,
        ]
    };

    /// Negación lógica.
    pub const NOT: UnaryOperator = UnaryOperator {
        kind: UnaryOperatorKind::Not,
        operand: Type::Bool,
        result: Type::Bool,
    };

    pub const UNARY_OPERATORS: &[UnaryOperator] = &[
        UnaryOperator {
            kind: UnaryOperatorKind::Identity,
            operand: Type::Int,
            result: Type::Int,
        },
        UnaryOperator {
            kind: UnaryOperatorKind::Negation,
            operand: Type::Int,
            result: Type::Int,
        },
        NOT,
    ];

    /// Busca el operador binario para una combinación de operandos.
    pub fn binary_operator(kind: BinaryOperatorKind, left: Type, right: Type) -> Option<BinaryOperator> {
        BINARY_OPERATORS
            .iter()
            .copied()
            .find(|operator| operator.kind == kind && operator.left == left && operator.right == right)
    }

    /// Busca el operador unario para un tipo de operando.
    pub fn unary_operator(kind: UnaryOperatorKind, operand: Type) -> Option<UnaryOperator> {
        UNARY_OPERATORS
            .iter()
            .copied()
            .find(|operator| operator.kind == kind && operator.operand == operand)
    }

    thread_local! {
        static STRINGS_ARE_EQUAL_SYMBOL: Rc<FunctionSymbol> = {
            let parameter = |name: &str| {
                Rc::new(VariableSymbol {
                    name: name.into(),
                    typ: Type::String,
                })
            };

            Rc::new(FunctionSymbol {
                name: STRINGS_ARE_EQUAL.into(),
                parameters: vec![parameter("a"), parameter("b")],
                return_type: Type::Bool,
                is_external: true,
            })
        };
    }

    /// `stringsAreEqual(a: String, b: String): Bool`, provista por el runtime.
    ///
    /// Siempre es el mismo símbolo, tanto en el ámbito global del binder
    /// como en las llamadas que introduce la reducción.
    pub fn strings_are_equal() -> Rc<FunctionSymbol> {
        STRINGS_ARE_EQUAL_SYMBOL.with(Rc::clone)
    }

    /// Funciones visibles en el ámbito global de todo archivo.
    pub fn functions() -> Vec<Rc<FunctionSymbol>> {
        vec![strings_are_equal()]
    }
}

/// Raíz de un archivo ya resuelto.
#[derive(Debug)]
pub struct File {
    pub path: String,
    pub imports: Vec<Import>,
    pub functions: Vec<FunctionDeclaration>,
}

/// Un archivo importado, resuelto a su vez.
#[derive(Debug)]
pub struct Import {
    pub path: String,
    pub file: File,
}

/// Declaración de función.
///
/// Toda función no externa tiene cuerpo; una función externa nunca
/// lo tiene.
#[derive(Debug)]
pub struct FunctionDeclaration {
    pub symbol: Rc<FunctionSymbol>,
    pub section: Option<Section>,
    pub location: Location,
}

#[derive(Debug, Default)]
pub struct Section {
    pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub enum Statement {
    Section(Section),

    VariableDeclaration {
        variable: Rc<VariableSymbol>,
        initialiser: Option<Expression>,
    },

    Assignment {
        variable: Rc<VariableSymbol>,
        expression: Expression,
    },

    If(IfStatement),

    While {
        condition: Expression,
        section: Section,
    },

    Return(Option<Expression>),

    Expression(Expression),
}

#[derive(Debug)]
pub struct IfStatement {
    pub condition: Expression,
    pub section: Section,

    /// Otro `if` o una sección.
    pub else_clause: Option<Box<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i32),
    String(String),
    Bool(bool),
}

impl Literal {
    pub fn typ(&self) -> Type {
        match self {
            Literal::Integer(_) => Type::Int,
            Literal::String(_) => Type::String,
            Literal::Bool(_) => Type::Bool,
        }
    }
}

impl Display for Literal {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(integer) => write!(fmt, "{}", integer),
            Literal::String(string) => write!(fmt, "'{}'", string),
            Literal::Bool(boolean) => write!(fmt, "{}", boolean),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),

    Variable(Rc<VariableSymbol>),

    Call {
        function: Rc<FunctionSymbol>,
        arguments: Vec<Expression>,
    },

    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },

    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    /// Tipo del valor que produce la expresión.
    pub fn typ(&self) -> Type {
        match self {
            Expression::Literal(literal) => literal.typ(),
            Expression::Variable(variable) => variable.typ,
            Expression::Call { function, .. } => function.return_type,
            Expression::Unary { operator, .. } => operator.result,
            Expression::Binary { operator, .. } => operator.result,
        }
    }
}

impl Display for Expression {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(literal) => literal.fmt(fmt),
            Expression::Variable(variable) => fmt.write_str(&variable.name),
            Expression::Call {
                function,
                arguments,
            } => {
                write!(fmt, "{}(", function.name)?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(", ")?;
                    }

                    write!(fmt, "{}", argument)?;
                }

                fmt.write_str(")")
            }

            Expression::Unary { operator, operand } => write!(fmt, "{}{}", operator.kind, operand),
            Expression::Binary {
                operator,
                left,
                right,
            } => write!(fmt, "({} {} {})", left, operator.kind, right),
        }
    }
}

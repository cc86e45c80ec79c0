//! Resolución de nombres y tipos.
//!
//! Convierte el árbol sintáctico en el árbol semántico de
//! [`crate::semantic`]. Cada nombre se resuelve a un símbolo y cada
//! operador a un operador integrado, según los tipos de sus operandos.
//! No se infiere nada más allá del tipo declarado o del tipo del
//! valor inicial de una variable.
//!
//! Los archivos importados deben haberse analizado de antemano y
//! registrado en [`Modules`]. Cada ruta se resuelve una única vez por
//! ejecución, aunque varios archivos la importen.

use std::{
    collections::{hash_map::Entry, HashMap},
    rc::Rc,
};

use thiserror::Error;
use tracing::debug;

use crate::{
    scan::{Keyword, Operator, TokenKind},
    semantic::{
        self, builtins, BinaryOperatorKind, Expression, FunctionSymbol, Literal, Statement, Type,
        UnaryOperatorKind, VariableSymbol,
    },
    source::{Located, Location},
    syntax::{self, SyntaxToken},
};

pub type Bind<T> = Result<T, Located<BindError>>;

/// Error de resolución.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("Symbol `{0}` is undefined")]
    Undefined(String),

    #[error("Expected variable, found function `{0}`")]
    ExpectedVariable(String),

    #[error("Expected function, found variable `{0}`")]
    ExpectedFunction(String),

    #[error("Redefinition of `{0}` in the same scope")]
    Redefinition(String),

    #[error("Unknown type `{0}`")]
    UnknownType(String),

    #[error("Variable `{0}` needs a type or an initial value")]
    UntypedVariable(String),

    #[error("Variable `{0}` cannot hold a `Void` value")]
    VoidVariable(String),

    #[error("Type mismatch: expected `{0}`, found `{1}`")]
    ExpectedType(Type, Type),

    #[error("Function `{name}` takes {expected} argument(s), {found} given")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("No operator `{operator}` for operands of type `{left}` and `{right}`")]
    NoBinaryOperator {
        operator: String,
        left: Type,
        right: Type,
    },

    #[error("No operator `{operator}` for an operand of type `{operand}`")]
    NoUnaryOperator { operator: String, operand: Type },

    #[error("Integer literal `{0}` is out of range")]
    IntegerOverflow(String),

    #[error("Only imports and function declarations are allowed at file level")]
    NotAllowedAtFileLevel,

    #[error("Function declarations cannot be nested")]
    NestedFunction,

    #[error("Imports are only allowed at file level")]
    NestedImport,

    #[error("Import `{0}` could not be resolved")]
    UnresolvedImport(String),

    #[error("Import cycle through `{0}`")]
    CyclicImport(String),

    #[error("Function `{0}` is not external and has no body")]
    MissingBody(String),

    #[error("External function `{0}` cannot have a body")]
    ExternalBody(String),
}

/// Archivos disponibles para importación, por ruta.
#[derive(Debug, Default)]
pub struct Modules {
    files: HashMap<String, syntax::File>,
}

impl Modules {
    pub fn new() -> Self {
        Modules::default()
    }

    /// Registra un archivo analizado bajo la ruta con que se importa.
    pub fn insert<S: Into<String>>(&mut self, path: S, file: syntax::File) -> Option<syntax::File> {
        self.files.insert(path.into(), file)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn take(&mut self, path: &str) -> Option<syntax::File> {
        self.files.remove(path)
    }
}

/// Resuelve un archivo y, recursivamente, todo lo que importa.
pub fn bind(file: syntax::File, modules: &mut Modules) -> Bind<semantic::File> {
    let mut binder = Binder {
        modules,
        exports: HashMap::new(),
        pending: Vec::new(),
    };

    binder.file(file)
}

#[derive(Clone)]
enum Named {
    Variable(Rc<VariableSymbol>),
    Function(Rc<FunctionSymbol>),
}

/// Ámbito global más una pila de ámbitos locales.
struct SymbolTable {
    globals: HashMap<String, Named>,
    locals: Vec<HashMap<String, Named>>,
}

impl SymbolTable {
    /// Tabla global, con las funciones integradas ya declaradas.
    fn global() -> Self {
        let globals = builtins::functions()
            .into_iter()
            .map(|function| (function.name.clone(), Named::Function(function)))
            .collect();

        SymbolTable {
            globals,
            locals: Vec::new(),
        }
    }

    fn enter(&mut self) {
        self.locals.push(HashMap::new());
    }

    fn leave(&mut self) {
        self.locals.pop();
    }

    fn lookup(&self, id: &SyntaxToken) -> Bind<&Named> {
        let name = id.as_ref().text();
        self.locals
            .iter()
            .rev()
            .chain(std::iter::once(&self.globals))
            .find_map(|scope| scope.get(name))
            .ok_or_else(|| Located::at(BindError::Undefined(name.to_owned()), id.location().clone()))
    }

    fn declare(&mut self, name: &str, location: &Location, named: Named) -> Bind<()> {
        let scope = match self.locals.last_mut() {
            Some(scope) => scope,
            None => &mut self.globals,
        };

        match scope.entry(name.to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(named);
                Ok(())
            }

            // Importar dos veces la misma ruta no redefine nada
            Entry::Occupied(entry) => match (entry.get(), &named) {
                (Named::Function(old), Named::Function(new)) if Rc::ptr_eq(old, new) => Ok(()),
                _ => Err(Located::at(
                    BindError::Redefinition(name.to_owned()),
                    location.clone(),
                )),
            },
        }
    }
}

struct Binder<'m> {
    modules: &'m mut Modules,
    exports: HashMap<String, Vec<Rc<FunctionSymbol>>>,

    /// Rutas de importación cuya resolución está en curso.
    pending: Vec<String>,
}

impl Binder<'_> {
    fn file(&mut self, file: syntax::File) -> Bind<semantic::File> {
        let path = file.path().to_owned();
        let mut globals = SymbolTable::global();
        let mut imports = Vec::new();
        let mut declarations = Vec::new();

        for statement in file.statements {
            match statement {
                syntax::Statement::Import(import) => {
                    if let Some(import) = self.import(&import, &mut globals)? {
                        imports.push(import);
                    }
                }

                syntax::Statement::FunctionDeclaration(function) => {
                    let symbol = declare_function(&function, &mut globals)?;
                    declarations.push((symbol, function));
                }

                other => {
                    return Err(Located::at(
                        BindError::NotAllowedAtFileLevel,
                        other.location(),
                    ))
                }
            }
        }

        // Todas las funciones se declaran antes de resolver cualquier cuerpo
        let functions = declarations
            .into_iter()
            .map(|(symbol, function)| Context::function(&mut globals, symbol, &function))
            .collect::<Bind<Vec<_>>>()?;

        debug!(
            path = %path,
            imports = imports.len(),
            functions = functions.len(),
            "bound file"
        );

        Ok(semantic::File {
            path,
            imports,
            functions,
        })
    }

    fn import(
        &mut self,
        import: &syntax::Import,
        globals: &mut SymbolTable,
    ) -> Bind<Option<semantic::Import>> {
        let path = import.path.as_ref().text();
        let location = import.path.location();

        let (bound, exported) = match self.exports.get(path) {
            Some(exported) => (None, exported.clone()),

            None if self.pending.iter().any(|pending| pending == path) => {
                return Err(Located::at(
                    BindError::CyclicImport(path.to_owned()),
                    location.clone(),
                ))
            }

            None => {
                let file = self.modules.take(path).ok_or_else(|| {
                    Located::at(BindError::UnresolvedImport(path.to_owned()), location.clone())
                })?;

                self.pending.push(path.to_owned());
                let file = self.file(file)?;
                self.pending.pop();

                let exported: Vec<_> = file
                    .functions
                    .iter()
                    .map(|function| Rc::clone(&function.symbol))
                    .collect();

                self.exports.insert(path.to_owned(), exported.clone());

                let import = semantic::Import {
                    path: path.to_owned(),
                    file,
                };

                (Some(import), exported)
            }
        };

        for function in exported {
            let name = function.name.clone();
            globals.declare(&name, location, Named::Function(function))?;
        }

        Ok(bound)
    }
}

fn declare_function(
    function: &syntax::FunctionDeclaration,
    globals: &mut SymbolTable,
) -> Bind<Rc<FunctionSymbol>> {
    let name = function.identifier.as_ref().text();

    let parameters = function
        .parameters
        .iter()
        .map(|parameter| {
            Ok(Rc::new(VariableSymbol {
                name: parameter.identifier.as_ref().text().to_owned(),
                typ: resolve_type(&parameter.type_clause)?,
            }))
        })
        .collect::<Bind<Vec<_>>>()?;

    let return_type = function
        .return_type
        .as_ref()
        .map(resolve_type)
        .transpose()?
        .unwrap_or(Type::Void);

    let is_external = function.external.is_some();
    let location = function.identifier.location();

    match (is_external, &function.section) {
        (true, Some(_)) => {
            return Err(Located::at(
                BindError::ExternalBody(name.to_owned()),
                location.clone(),
            ))
        }

        (false, None) => {
            return Err(Located::at(
                BindError::MissingBody(name.to_owned()),
                location.clone(),
            ))
        }

        _ => (),
    }

    let symbol = Rc::new(FunctionSymbol {
        name: name.to_owned(),
        parameters,
        return_type,
        is_external,
    });

    globals.declare(name, location, Named::Function(Rc::clone(&symbol)))?;
    Ok(symbol)
}

fn resolve_type(clause: &syntax::TypeClause) -> Bind<Type> {
    let name = clause.identifier.as_ref().text();
    name.parse().map_err(|()| {
        Located::at(
            BindError::UnknownType(name.to_owned()),
            clause.identifier.location().clone(),
        )
    })
}

fn expect_type(expected: Type, found: Type, location: &Location) -> Bind<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Located::at(
            BindError::ExpectedType(expected, found),
            location.clone(),
        ))
    }
}

/// Estado de resolución dentro del cuerpo de una función.
struct Context<'a> {
    scope: &'a mut SymbolTable,
    function: &'a FunctionSymbol,
}

impl Context<'_> {
    fn function(
        globals: &mut SymbolTable,
        symbol: Rc<FunctionSymbol>,
        function: &syntax::FunctionDeclaration,
    ) -> Bind<semantic::FunctionDeclaration> {
        let section = match &function.section {
            None => None,

            Some(section) => {
                globals.enter();
                for (parameter, variable) in function.parameters.iter().zip(&symbol.parameters) {
                    globals.declare(
                        &variable.name,
                        parameter.identifier.location(),
                        Named::Variable(Rc::clone(variable)),
                    )?;
                }

                let mut context = Context {
                    scope: globals,
                    function: &symbol,
                };

                let section = context.section(section)?;
                context.scope.leave();

                Some(section)
            }
        };

        Ok(semantic::FunctionDeclaration {
            symbol,
            section,
            location: function.identifier.location().clone(),
        })
    }

    fn section(&mut self, section: &syntax::Section) -> Bind<semantic::Section> {
        self.scope.enter();
        let statements = section
            .statements
            .iter()
            .map(|statement| self.statement(statement))
            .collect::<Bind<Vec<_>>>()?;

        self.scope.leave();
        Ok(semantic::Section { statements })
    }

    fn statement(&mut self, statement: &syntax::Statement) -> Bind<Statement> {
        use syntax::Statement as S;

        match statement {
            S::Import(import) => Err(Located::at(
                BindError::NestedImport,
                import.keyword.location().clone(),
            )),

            S::FunctionDeclaration(function) => Err(Located::at(
                BindError::NestedFunction,
                function.keyword.location().clone(),
            )),

            S::VariableDeclaration(declaration) => self.variable_declaration(declaration),
            S::Assignment(assignment) => self.assignment(assignment),
            S::If(statement) => self.if_statement(statement).map(Statement::If),

            S::While(statement) => {
                let condition = self.condition(&statement.condition)?;
                let section = self.section(&statement.section)?;

                Ok(Statement::While { condition, section })
            }

            S::Return(statement) => self.return_statement(statement),
            S::Section(section) => self.section(section).map(Statement::Section),
            S::Expression(expression) => self.expression(expression).map(Statement::Expression),
        }
    }

    fn variable_declaration(&mut self, declaration: &syntax::VariableDeclaration) -> Bind<Statement> {
        let name = declaration.identifier.as_ref().text();
        let declared = declaration
            .type_clause
            .as_ref()
            .map(resolve_type)
            .transpose()?;

        // El valor inicial se resuelve antes de declarar la variable
        let initialiser = match &declaration.assignment {
            Some(assignment) => Some((
                self.expression(&assignment.expression)?,
                assignment.expression.location(),
            )),

            None => None,
        };

        let typ = match (declared, &initialiser) {
            (Some(typ), Some((value, location))) => {
                expect_type(typ, value.typ(), location)?;
                typ
            }

            (Some(typ), None) => typ,

            (None, Some((value, location))) if value.typ() == Type::Void => {
                return Err(Located::at(
                    BindError::VoidVariable(name.to_owned()),
                    location.clone(),
                ))
            }

            (None, Some((value, _))) => value.typ(),

            (None, None) => {
                return Err(Located::at(
                    BindError::UntypedVariable(name.to_owned()),
                    declaration.identifier.location().clone(),
                ))
            }
        };

        let variable = Rc::new(VariableSymbol {
            name: name.to_owned(),
            typ,
        });

        self.scope.declare(
            name,
            declaration.identifier.location(),
            Named::Variable(Rc::clone(&variable)),
        )?;

        Ok(Statement::VariableDeclaration {
            variable,
            initialiser: initialiser.map(|(value, _)| value),
        })
    }

    fn assignment(&mut self, assignment: &syntax::Assignment) -> Bind<Statement> {
        let variable = self.variable(&assignment.identifier)?;
        let expression = self.expression(&assignment.expression)?;
        expect_type(
            variable.typ,
            expression.typ(),
            &assignment.expression.location(),
        )?;

        Ok(Statement::Assignment {
            variable,
            expression,
        })
    }

    fn if_statement(&mut self, statement: &syntax::IfStatement) -> Bind<semantic::IfStatement> {
        let condition = self.condition(&statement.condition)?;
        let section = self.section(&statement.section)?;
        let else_clause = match &statement.else_clause {
            Some(else_clause) => Some(Box::new(self.statement(&else_clause.follow_up)?)),
            None => None,
        };

        Ok(semantic::IfStatement {
            condition,
            section,
            else_clause,
        })
    }

    fn return_statement(&mut self, statement: &syntax::ReturnStatement) -> Bind<Statement> {
        let expected = self.function.return_type;

        match &statement.expression {
            None if expected == Type::Void => Ok(Statement::Return(None)),

            None => Err(Located::at(
                BindError::ExpectedType(expected, Type::Void),
                statement.keyword.location().clone(),
            )),

            Some(expression) => {
                let value = self.expression(expression)?;
                expect_type(expected, value.typ(), &expression.location())?;

                Ok(Statement::Return(Some(value)))
            }
        }
    }

    fn condition(&self, condition: &syntax::Expression) -> Bind<Expression> {
        let value = self.expression(condition)?;
        expect_type(Type::Bool, value.typ(), &condition.location())?;

        Ok(value)
    }

    fn expression(&self, expression: &syntax::Expression) -> Bind<Expression> {
        use syntax::Expression as E;

        match expression {
            E::Literal(token) => literal(token).map(Expression::Literal),
            E::Name(token) => self.variable(token).map(Expression::Variable),
            E::Parenthesized { inner, .. } => self.expression(inner),

            E::Unary { operator, operand } => {
                let operand = self.expression(operand)?;
                let found = operand.typ();

                let operator = unary_kind(operator)
                    .and_then(|kind| builtins::unary_operator(kind, found))
                    .ok_or_else(|| {
                        Located::at(
                            BindError::NoUnaryOperator {
                                operator: operator.as_ref().text().to_owned(),
                                operand: found,
                            },
                            expression.location(),
                        )
                    })?;

                Ok(Expression::Unary {
                    operator,
                    operand: Box::new(operand),
                })
            }

            E::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.expression(left)?;
                let right = self.expression(right)?;
                let (left_type, right_type) = (left.typ(), right.typ());

                let operator = binary_kind(operator)
                    .and_then(|kind| builtins::binary_operator(kind, left_type, right_type))
                    .ok_or_else(|| {
                        Located::at(
                            BindError::NoBinaryOperator {
                                operator: operator.as_ref().text().to_owned(),
                                left: left_type,
                                right: right_type,
                            },
                            expression.location(),
                        )
                    })?;

                Ok(Expression::Binary {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }

            E::Call {
                identifier,
                arguments,
                ..
            } => {
                let function = self.function_symbol(identifier)?;
                if arguments.len() != function.parameters.len() {
                    return Err(Located::at(
                        BindError::ArgumentCount {
                            name: function.name.clone(),
                            expected: function.parameters.len(),
                            found: arguments.len(),
                        },
                        expression.location(),
                    ));
                }

                let arguments = arguments
                    .iter()
                    .zip(&function.parameters)
                    .map(|(argument, parameter)| {
                        let value = self.expression(argument)?;
                        expect_type(parameter.typ, value.typ(), &argument.location())?;

                        Ok(value)
                    })
                    .collect::<Bind<Vec<_>>>()?;

                Ok(Expression::Call {
                    function,
                    arguments,
                })
            }
        }
    }

    fn variable(&self, id: &SyntaxToken) -> Bind<Rc<VariableSymbol>> {
        match self.scope.lookup(id)? {
            Named::Variable(variable) => Ok(Rc::clone(variable)),
            Named::Function(function) => Err(Located::at(
                BindError::ExpectedVariable(function.name.clone()),
                id.location().clone(),
            )),
        }
    }

    fn function_symbol(&self, id: &SyntaxToken) -> Bind<Rc<FunctionSymbol>> {
        match self.scope.lookup(id)? {
            Named::Function(function) => Ok(Rc::clone(function)),
            Named::Variable(variable) => Err(Located::at(
                BindError::ExpectedFunction(variable.name.clone()),
                id.location().clone(),
            )),
        }
    }
}

fn literal(token: &SyntaxToken) -> Bind<Literal> {
    let text = token.as_ref().text();

    match token.kind() {
        TokenKind::IntegerLiteral => text.parse().map(Literal::Integer).map_err(|_| {
            Located::at(
                BindError::IntegerOverflow(text.to_owned()),
                token.location().clone(),
            )
        }),

        TokenKind::StringLiteral => Ok(Literal::String(text.to_owned())),
        TokenKind::Keyword(Keyword::True) => Ok(Literal::Bool(true)),
        TokenKind::Keyword(Keyword::False) => Ok(Literal::Bool(false)),

        _ => Err(Located::at(
            BindError::Undefined(text.to_owned()),
            token.location().clone(),
        )),
    }
}

fn unary_kind(operator: &SyntaxToken) -> Option<UnaryOperatorKind> {
    match operator.kind() {
        TokenKind::Operator(Operator::Plus) => Some(UnaryOperatorKind::Identity),
        TokenKind::Operator(Operator::Minus) => Some(UnaryOperatorKind::Negation),
        TokenKind::Operator(Operator::Not) => Some(UnaryOperatorKind::Not),
        _ => None,
    }
}

fn binary_kind(operator: &SyntaxToken) -> Option<BinaryOperatorKind> {
    use BinaryOperatorKind::*;

    let kind = match operator.kind() {
        TokenKind::Operator(operator) => match operator {
            Operator::Or => Or,
            Operator::And => And,
            Operator::Equal => Equal,
            Operator::NotEqual => NotEqual,
            Operator::Less => Less,
            Operator::LessOrEqual => LessOrEqual,
            Operator::Greater => Greater,
            Operator::GreaterOrEqual => GreaterOrEqual,
            Operator::Plus => Addition,
            Operator::Minus => Subtraction,
            Operator::Times => Multiplication,
            Operator::Divide => Division,
            Operator::Modulo => Modulo,
            Operator::Assign | Operator::Not => return None,
        },

        _ => return None,
    };

    Some(kind)
}

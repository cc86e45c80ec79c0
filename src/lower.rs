//! Reducción del árbol semántico.
//!
//! Descompone estructuras de control en saltos, de forma que el
//! generador de código trate con menos clases de nodos:
//!
//! ```text
//! if c { s }                  goto l#0 unless c
//!                             { s }
//!                           l#0:
//!
//! if c { s } else e           goto l#1 unless c
//!                             { s }
//!                             goto l#0
//!                           l#1:
//!                             e
//!                           l#0:
//!
//! while c { s }             l#0:
//!                             goto l#1 unless c
//!                             { s }
//!                             goto l#0
//!                           l#1:
//! ```
//!
//! Además, toda igualdad entre cadenas se reemplaza por una llamada a
//! `stringsAreEqual`, ya que la comparación nativa solo compara
//! direcciones. El árbol resultante no tiene variantes para `if` ni
//! `while`.
//!
//! Las etiquetas son únicas en toda una ejecución de [`lower()`],
//! incluyendo archivos importados.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    semantic::{
        self, builtins, Expression, FunctionSymbol, LabelSymbol, VariableSymbol,
    },
    source::Located,
    target::Instruction,
};

pub type Lower<T> = Result<T, Located<LowerError>>;

/// Violación de contrato en el árbol de entrada.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LowerError {
    #[error("Function `{0}` is not external and has no body")]
    MissingBody(String),
}

/// Raíz de un archivo reducido.
#[derive(Debug)]
pub struct File {
    pub path: String,
    pub imports: Vec<Import>,
    pub functions: Vec<FunctionDeclaration>,
}

#[derive(Debug)]
pub struct Import {
    pub path: String,
    pub file: File,
}

#[derive(Debug)]
pub struct FunctionDeclaration {
    pub symbol: Rc<FunctionSymbol>,
    pub section: Option<Section>,
    labels: Vec<Rc<LabelSymbol>>,
}

impl FunctionDeclaration {
    /// Etiquetas definidas en el cuerpo, en orden de generación.
    ///
    /// Ningún salto dentro de esta función apunta a una etiqueta
    /// fuera de esta lista.
    pub fn labels(&self) -> &[Rc<LabelSymbol>] {
        &self.labels
    }
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

    Return(Option<Expression>),

    Expression(Expression),

    /// Definición de etiqueta.
    Label(Rc<LabelSymbol>),

    /// Salto incondicional.
    Goto(Rc<LabelSymbol>),

    /// Salto si `condition` evalúa a `jump_if`.
    ConditionalGoto {
        target: Rc<LabelSymbol>,
        condition: Expression,
        jump_if: bool,
    },
}

/// Reduce un archivo y todo lo que importa.
pub fn lower(file: semantic::File) -> Lower<File> {
    let mut lowerer = Lowerer::default();
    let file = lowerer.file(file)?;

    debug!(path = %file.path, labels = lowerer.label_counter, "lowered file");
    Ok(file)
}

#[derive(Default)]
struct Lowerer {
    label_counter: usize,
    labels: Vec<Rc<LabelSymbol>>,
}

impl Lowerer {
    fn generate_label(&mut self) -> Rc<LabelSymbol> {
        let label = Rc::new(LabelSymbol {
            name: format!("l#{}", self.label_counter),
        });

        self.label_counter += 1;
        self.labels.push(Rc::clone(&label));

        label
    }

    fn file(&mut self, file: semantic::File) -> Lower<File> {
        let imports = file
            .imports
            .into_iter()
            .map(|import| {
                Ok(Import {
                    path: import.path,
                    file: self.file(import.file)?,
                })
            })
            .collect::<Lower<Vec<_>>>()?;

        let functions = file
            .functions
            .into_iter()
            .map(|function| self.function(function))
            .collect::<Lower<Vec<_>>>()?;

        Ok(File {
            path: file.path,
            imports,
            functions,
        })
    }

    fn function(&mut self, function: semantic::FunctionDeclaration) -> Lower<FunctionDeclaration> {
        let semantic::FunctionDeclaration {
            symbol,
            section,
            location,
        } = function;

        if symbol.is_external {
            return Ok(FunctionDeclaration {
                symbol,
                section: None,
                labels: Vec::new(),
            });
        }

        let section = match section {
            Some(section) => section,
            None => {
                return Err(Located::at(
                    LowerError::MissingBody(symbol.name.clone()),
                    location,
                ))
            }
        };

        let section = self.section(section);
        let labels = std::mem::take(&mut self.labels);

        Ok(FunctionDeclaration {
            symbol,
            section: Some(section),
            labels,
        })
    }

    fn section(&mut self, section: semantic::Section) -> Section {
        let statements = section
            .statements
            .into_iter()
            .flat_map(|statement| self.statement(statement))
            .collect();

        Section { statements }
    }

    fn statement(&mut self, statement: semantic::Statement) -> Vec<Statement> {
        use semantic::Statement as S;

        match statement {
            S::Section(section) => vec![Statement::Section(self.section(section))],

            S::VariableDeclaration {
                variable,
                initialiser,
            } => vec![Statement::VariableDeclaration {
                variable,
                initialiser: initialiser.map(lower_expression),
            }],

            S::Assignment {
                variable,
                expression,
            } => vec![Statement::Assignment {
                variable,
                expression: lower_expression(expression),
            }],

            S::Return(expression) => vec![Statement::Return(expression.map(lower_expression))],
            S::Expression(expression) => vec![Statement::Expression(lower_expression(expression))],
            S::If(statement) => self.if_statement(statement),
            S::While { condition, section } => self.while_statement(condition, section),
        }
    }

    fn if_statement(&mut self, statement: semantic::IfStatement) -> Vec<Statement> {
        let condition = lower_expression(statement.condition);
        let section = Statement::Section(self.section(statement.section));
        let end = self.generate_label();

        match statement.else_clause {
            None => {
                trace!(end = %end, "lowered if");

                vec![
                    Statement::ConditionalGoto {
                        target: Rc::clone(&end),
                        condition,
                        jump_if: false,
                    },
                    section,
                    Statement::Label(end),
                ]
            }

            Some(follow_up) => {
                let follow_up = self.statement(*follow_up);
                let otherwise = self.generate_label();
                trace!(end = %end, otherwise = %otherwise, "lowered if-else");

                let mut statements = vec![
                    Statement::ConditionalGoto {
                        target: Rc::clone(&otherwise),
                        condition,
                        jump_if: false,
                    },
                    section,
                    Statement::Goto(Rc::clone(&end)),
                    Statement::Label(otherwise),
                ];

                statements.extend(follow_up);
                statements.push(Statement::Label(end));
                statements
            }
        }
    }

    fn while_statement(
        &mut self,
        condition: semantic::Expression,
        section: semantic::Section,
    ) -> Vec<Statement> {
        let condition = lower_expression(condition);
        let section = Statement::Section(self.section(section));

        let start = self.generate_label();
        let end = self.generate_label();
        trace!(start = %start, end = %end, "lowered while");

        vec![
            Statement::Label(Rc::clone(&start)),
            Statement::ConditionalGoto {
                target: Rc::clone(&end),
                condition,
                jump_if: false,
            },
            section,
            Statement::Goto(start),
            Statement::Label(end),
        ]
    }
}

fn lower_expression(expression: Expression) -> Expression {
    match expression {
        Expression::Literal(_) | Expression::Variable(_) => expression,

        Expression::Call {
            function,
            arguments,
        } => Expression::Call {
            function,
            arguments: arguments.into_iter().map(lower_expression).collect(),
        },

        Expression::Unary { operator, operand } => Expression::Unary {
            operator,
            operand: Box::new(lower_expression(*operand)),
        },

        Expression::Binary {
            operator,
            left,
            right,
        } => {
            let left = lower_expression(*left);
            let right = lower_expression(*right);

            if operator == builtins::STRING_EQUAL {
                trace!("lowered string equality");
                strings_are_equal(left, right)
            } else if operator == builtins::STRING_NOT_EQUAL {
                trace!("lowered string inequality");
                Expression::Unary {
                    operator: builtins::NOT,
                    operand: Box::new(strings_are_equal(left, right)),
                }
            } else {
                Expression::Binary {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
        }
    }
}

fn strings_are_equal(left: Expression, right: Expression) -> Expression {
    Expression::Call {
        function: builtins::strings_are_equal(),
        arguments: vec![left, right],
    }
}

impl Display for File {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for import in &self.imports {
            writeln!(fmt, "{}", import.file)?;
        }

        writeln!(fmt, "// {}", self.path)?;
        for function in &self.functions {
            writeln!(fmt, "{}", function)?;
        }

        Ok(())
    }
}

impl Display for FunctionDeclaration {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = &self.symbol;
        if symbol.is_external {
            fmt.write_str("external ")?;
        }

        write!(fmt, "function {}(", symbol.name)?;
        for (i, parameter) in symbol.parameters.iter().enumerate() {
            if i > 0 {
                fmt.write_str(", ")?;
            }

            write!(fmt, "{}: {}", parameter.name, parameter.typ)?;
        }

        fmt.write_str(")")?;
        if symbol.return_type != semantic::Type::Void {
            write!(fmt, ": {}", symbol.return_type)?;
        }

        match &self.section {
            None => writeln!(fmt, ";"),
            Some(section) => {
                fmt.write_str(" ")?;
                write_section(fmt, section, 0)
            }
        }
    }
}

fn write_section(fmt: &mut fmt::Formatter<'_>, section: &Section, depth: usize) -> fmt::Result {
    writeln!(fmt, "{{")?;
    for statement in &section.statements {
        write_statement(fmt, statement, depth + 1)?;
    }

    writeln!(fmt, "{:indent$}}}", "", indent = depth * 4)
}

fn write_statement(fmt: &mut fmt::Formatter<'_>, statement: &Statement, depth: usize) -> fmt::Result {
    // Las etiquetas no se indentan, igual que en ensamblador
    if let Statement::Label(label) = statement {
        return writeln!(fmt, "{}", Instruction::label(label.name.as_str()));
    }

    write!(fmt, "{:indent$}", "", indent = depth * 4)?;

    match statement {
        Statement::Section(section) => write_section(fmt, section, depth),

        Statement::VariableDeclaration {
            variable,
            initialiser,
        } => {
            write!(fmt, "var {}: {}", variable.name, variable.typ)?;
            match initialiser {
                Some(initialiser) => writeln!(fmt, " := {};", initialiser),
                None => writeln!(fmt, ";"),
            }
        }

        Statement::Assignment {
            variable,
            expression,
        } => writeln!(fmt, "{} := {};", variable.name, expression),

        Statement::Return(None) => writeln!(fmt, "return;"),
        Statement::Return(Some(expression)) => writeln!(fmt, "return {};", expression),
        Statement::Expression(expression) => writeln!(fmt, "{};", expression),
        Statement::Goto(target) => writeln!(fmt, "goto {};", target),

        Statement::ConditionalGoto {
            target,
            condition,
            jump_if,
        } => {
            let guard = if *jump_if { "if" } else { "unless" };
            writeln!(fmt, "goto {} {} {};", target, guard, condition)
        }

        Statement::Label(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bind::{bind, Modules},
        parse::parse,
        scan::scan,
        semantic::{Literal, Type},
        source::Location,
    };

    fn syntax_of(text: &str, path: &str) -> crate::syntax::File {
        parse(&scan(text, path).unwrap()).unwrap()
    }

    fn lower_str(text: &str) -> File {
        let file = bind(syntax_of(text, "main.av"), &mut Modules::new()).unwrap();
        lower(file).unwrap()
    }

    /// Cuerpo de la única función de `text`.
    fn lower_body(text: &str) -> Vec<Statement> {
        let mut file = lower_str(text);
        let function = file.functions.pop().unwrap();
        function.section.unwrap().statements
    }

    /// Forma abreviada de una secuencia de sentencias.
    fn shape(statements: &[Statement]) -> Vec<String> {
        statements
            .iter()
            .map(|statement| match statement {
                Statement::Section(section) => format!("{{{}}}", section.statements.len()),
                Statement::VariableDeclaration { variable, .. } => format!("var {}", variable.name),
                Statement::Assignment { variable, .. } => format!("{} :=", variable.name),
                Statement::Return(_) => "return".to_string(),
                Statement::Expression(_) => "expr".to_string(),
                Statement::Label(label) => format!("{}:", label),
                Statement::Goto(target) => format!("goto {}", target),
                Statement::ConditionalGoto {
                    target, jump_if, ..
                } => format!("goto {} if {}", target, jump_if),
            })
            .collect()
    }

    #[test]
    fn if_without_else() {
        let body = lower_body("function f(b: Bool) { if b { f(b); } }");
        assert_eq!(shape(&body), ["goto l#0 if false", "{1}", "l#0:"]);
    }

    #[test]
    fn if_with_else() {
        let body = lower_body("function f(b: Bool) { if b { f(b); } else { f(!b); f(b); } }");
        assert_eq!(
            shape(&body),
            ["goto l#1 if false", "{1}", "goto l#0", "l#1:", "{2}", "l#0:"]
        );
    }

    #[test]
    fn else_if_chain() {
        let mut file = lower_str(
            "function f(i: Int) {
                 if i = 0 { f(1); } else if i = 1 { f(2); }
             }",
        );

        let function = file.functions.pop().unwrap();
        let labels: Vec<_> = function.labels().iter().map(|label| label.name.clone()).collect();
        assert_eq!(labels, ["l#0", "l#1", "l#2"]);

        let body = &function.section.as_ref().unwrap().statements;
        assert_eq!(
            shape(body),
            [
                "goto l#2 if false",
                "{1}",
                "goto l#0",
                "l#2:",
                "goto l#1 if false",
                "{1}",
                "l#1:",
                "l#0:",
            ]
        );
    }

    #[test]
    fn while_loop() {
        let body = lower_body("function f(i: Int) { while i < 10 { i := i + 1; } }");
        assert_eq!(
            shape(&body),
            ["l#0:", "goto l#1 if false", "{1}", "goto l#0", "l#1:"]
        );

        match &body[1] {
            Statement::ConditionalGoto { condition, .. } => {
                assert_eq!(condition.to_string(), "(i < 10)")
            }

            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn nested_bodies_are_lowered_first() {
        let body = lower_body("function f(i: Int) { while i < 10 { if i = 5 { return; } } }");
        assert_eq!(
            shape(&body),
            ["l#1:", "goto l#2 if false", "{3}", "goto l#1", "l#2:"]
        );

        match &body[2] {
            Statement::Section(section) => assert_eq!(
                shape(&section.statements),
                ["goto l#0 if false", "{1}", "l#0:"]
            ),

            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn string_equality_becomes_call() {
        let body = lower_body(
            "function same(a: String, b: String): Bool { return a = b; }",
        );

        match &body[0] {
            Statement::Return(Some(expression)) => {
                assert_eq!(expression.to_string(), "stringsAreEqual(a, b)");
                assert_eq!(expression.typ(), Type::Bool);
            }

            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn string_inequality_becomes_negated_call() {
        let body = lower_body(
            "function differ(a: String): Bool { return a != 'x'; }",
        );

        match &body[0] {
            Statement::Return(Some(expression)) => {
                assert_eq!(expression.to_string(), "!stringsAreEqual(a, 'x')")
            }

            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn rewritten_call_targets_the_global_symbol() {
        let body = lower_body(
            "function same(a: String, b: String): Bool { return stringsAreEqual(a, b) & a = b; }",
        );

        match &body[0] {
            Statement::Return(Some(Expression::Binary { left, right, .. })) => {
                match (left.as_ref(), right.as_ref()) {
                    (
                        Expression::Call { function: explicit, .. },
                        Expression::Call { function: rewritten, .. },
                    ) => {
                        assert!(Rc::ptr_eq(explicit, rewritten));
                        assert!(Rc::ptr_eq(rewritten, &builtins::strings_are_equal()));
                    }

                    other => panic!("expected two calls, got {:?}", other),
                }
            }

            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn other_comparisons_are_kept() {
        let body = lower_body("function f(a: Int): Bool { return a = 1; }");

        match &body[0] {
            Statement::Return(Some(Expression::Binary { operator, .. })) => {
                assert_eq!(operator.left, Type::Int)
            }

            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn string_equality_in_conditions() {
        let body = lower_body("function f(a: String) { if a = 'x' { } }");

        match &body[0] {
            Statement::ConditionalGoto { condition, .. } => {
                assert_eq!(condition.to_string(), "stringsAreEqual(a, 'x')")
            }

            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn labels_are_scoped_to_functions() {
        let file = lower_str(
            "function f(b: Bool) { if b { } }
             function g(b: Bool) { while b { } }
             external function h();",
        );

        let names = |function: &FunctionDeclaration| -> Vec<String> {
            function.labels().iter().map(|label| label.name.clone()).collect()
        };

        assert_eq!(names(&file.functions[0]), ["l#0"]);
        assert_eq!(names(&file.functions[1]), ["l#1", "l#2"]);
        assert!(file.functions[2].labels().is_empty());
        assert!(file.functions[2].section.is_none());
    }

    #[test]
    fn counter_spans_imports_and_resets_per_run() {
        let build = || {
            let mut modules = Modules::new();
            modules.insert("lib.av", syntax_of("function g(b: Bool) { if b { } }", "lib.av"));

            let root = syntax_of("import 'lib.av'; function f(b: Bool) { if b { } }", "main.av");
            lower(bind(root, &mut modules).unwrap()).unwrap()
        };

        for _ in 0..2 {
            let file = build();
            assert_eq!(file.imports[0].file.functions[0].labels()[0].name, "l#0");
            assert_eq!(file.functions[0].labels()[0].name, "l#1");
        }
    }

    #[test]
    fn missing_body_is_an_error() {
        let file = semantic::File {
            path: "main.av".into(),
            imports: Vec::new(),
            functions: vec![semantic::FunctionDeclaration {
                symbol: Rc::new(FunctionSymbol {
                    name: "f".into(),
                    parameters: Vec::new(),
                    return_type: Type::Void,
                    is_external: false,
                }),
                section: None,
                location: Location::default(),
            }],
        };

        let error = lower(file).unwrap_err();
        assert_eq!(error.into_inner(), LowerError::MissingBody("f".into()));
    }

    #[test]
    fn literals_pass_through() {
        let body = lower_body("function f() { var s := 'hi'; var n: Int; }");

        match &body[0] {
            Statement::VariableDeclaration {
                initialiser: Some(Expression::Literal(literal)),
                ..
            } => assert_eq!(*literal, Literal::String("hi".into())),

            other => panic!("unexpected statement {:?}", other),
        }

        assert!(matches!(
            &body[1],
            Statement::VariableDeclaration {
                initialiser: None,
                ..
            }
        ));
    }

    #[test]
    fn display() {
        let file = lower_str(
            "external function print(text: String);
             function main(): Int {
                 var i := 0;
                 while i < 3 { print('tick'); i := i + 1; }
                 return i;
             }",
        );

        let expected = "\
// main.av
external function print(text: String);

function main(): Int {
    var i: Int := 0;
l#0:
    goto l#1 unless (i < 3);
    {
        print('tick');
        i := (i + 1);
    }
    goto l#0;
l#1:
    return i;
}

";

        assert_eq!(file.to_string(), expected);
    }
}

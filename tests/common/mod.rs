//! Utilidades compartidas por las pruebas de integración.

#![allow(dead_code)]

use avrc::{
    bind::{bind, Modules},
    lower::{self, lower, Statement},
    parse::parse,
    scan::scan,
    semantic::{self, Expression, Type},
    syntax,
};

pub fn syntax_of(text: &str, path: &str) -> syntax::File {
    let tokens = scan(text, path).unwrap();
    parse(&tokens).unwrap()
}

pub fn bind_str(text: &str) -> semantic::File {
    bind(syntax_of(text, "main.av"), &mut Modules::new()).unwrap()
}

pub fn lower_str(text: &str) -> lower::File {
    lower(bind_str(text)).unwrap()
}

/// Etiquetas definidas y destinos de salto en una sección, recursivamente.
#[derive(Default, Debug)]
pub struct Jumps {
    pub defined: Vec<String>,
    pub targets: Vec<String>,
    pub conditions: Vec<Expression>,
}

impl Jumps {
    pub fn of(section: &lower::Section) -> Self {
        let mut jumps = Jumps::default();
        jumps.walk(section);
        jumps
    }

    fn walk(&mut self, section: &lower::Section) {
        for statement in &section.statements {
            match statement {
                Statement::Section(inner) => self.walk(inner),
                Statement::Label(label) => self.defined.push(label.name.clone()),
                Statement::Goto(target) => self.targets.push(target.name.clone()),
                Statement::ConditionalGoto {
                    target, condition, ..
                } => {
                    self.targets.push(target.name.clone());
                    self.conditions.push(condition.clone());
                }

                _ => (),
            }
        }
    }
}

/// Determina si alguna comparación entre cadenas sobrevive en la expresión.
pub fn has_string_comparison(expression: &Expression) -> bool {
    match expression {
        Expression::Literal(_) | Expression::Variable(_) => false,
        Expression::Call { arguments, .. } => arguments.iter().any(has_string_comparison),
        Expression::Unary { operand, .. } => has_string_comparison(operand),
        Expression::Binary {
            operator,
            left,
            right,
        } => {
            operator.left == Type::String
                || has_string_comparison(left)
                || has_string_comparison(right)
        }
    }
}

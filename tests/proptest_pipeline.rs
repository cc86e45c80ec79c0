//! Pruebas basadas en propiedades de la pipeline.
//!
//! Propiedades verificadas:
//! - Los espacios en blanco entre tokens no producen tokens
//! - Cadenas de operadores de igual prioridad asocian a la izquierda
//! - Las etiquetas generadas son únicas y todo salto tiene destino
//! - Ninguna igualdad entre cadenas sobrevive a la reducción

mod common;

use std::collections::HashSet;

use avrc::{
    parse::parse,
    scan::{scan, TokenKind},
    syntax::{Expression, Statement},
};
use common::{has_string_comparison, lower_str, Jumps};
use proptest::prelude::*;

// =============================================================================
// Estrategias
// =============================================================================

/// Fragmentos que forman, cada uno, exactamente un token.
fn arb_piece() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "x", "count", "var", "while", "42", "7", "'hi'", "'a b'", "+", "-", "*", ":=", "!=", "<=",
        "<", "=", "(", ")", "{", "}", ";", ",", ":",
    ])
}

fn arb_gap() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![" ", "  ", "\t", "\n", " \n\t ", "\r\n", " // nota\n"])
}

fn arb_operand() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..1000).prop_map(|n| n.to_string()),
        "[a-z]{1,4}".prop_filter("not a keyword", |name| {
            !matches!(
                name.as_str(),
                "var" | "if" | "else" | "true" | "false" | "while"
            )
        }),
    ]
}

/// Cuerpo de función con estructuras de control anidadas.
fn arb_block() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("n := n + 1;".to_string()),
        Just("s := 'b';".to_string()),
    ];

    leaf.prop_recursive(4, 24, 3, |inner| {
        let body = prop::collection::vec(inner, 0..3).prop_map(|statements| statements.join(" "));

        prop_oneof![
            body.clone()
                .prop_map(|body| format!("if n < 3 {{ {} }}", body)),
            (body.clone(), body.clone())
                .prop_map(|(then, otherwise)| format!("if s = 'a' {{ {} }} else {{ {} }}", then, otherwise)),
            body.prop_map(|body| format!("while n > 0 & s != '' {{ {} }}", body)),
        ]
    })
}

fn function_names() -> impl Iterator<Item = String> {
    ('a'..='z').map(|c| format!("run{}", c))
}

// =============================================================================
// Escaneo y parsing
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Separar fragmentos con cualquier espacio no altera los tokens
    #[test]
    fn whitespace_contributes_no_tokens(
        pieces in prop::collection::vec((arb_piece(), arb_gap()), 1..20)
    ) {
        let mut text = String::new();
        for (piece, gap) in &pieces {
            text.push_str(piece);
            text.push_str(gap);
        }

        let tokens = scan(&text, "gaps.av").unwrap();
        prop_assert_eq!(tokens.len(), pieces.len() + 2);
        prop_assert_eq!(tokens[0].kind(), TokenKind::File);
        prop_assert_eq!(tokens.last().unwrap().kind(), TokenKind::EndOfInput);

        for (token, (piece, _)) in tokens[1..].iter().zip(&pieces) {
            prop_assert_eq!(token.as_ref().text(), piece.trim_matches('\''));
        }
    }

    /// `a op b op c ...` forma `((a op b) op c) ...`
    #[test]
    fn equal_priority_folds_left(
        first in arb_operand(),
        rest in prop::collection::vec(
            (prop::sample::select(vec!["+", "-"]), arb_operand()),
            1..8,
        ),
    ) {
        let mut text = format!("result := {}", first);
        for (operator, operand) in &rest {
            text.push_str(&format!(" {} {}", operator, operand));
        }

        text.push(';');

        let tokens = scan(&text, "fold.av").unwrap();
        let file = parse(&tokens).unwrap();

        let mut expression = match &file.statements[0] {
            Statement::Assignment(assignment) => &assignment.expression,
            other => panic!("unexpected statement {:?}", other),
        };

        // Se desciende por la izquierda, de derecha a izquierda
        for (operator, operand) in rest.iter().rev() {
            match expression {
                Expression::Binary { left, operator: token, right } => {
                    prop_assert_eq!(token.as_ref().text(), *operator);
                    match right.as_ref() {
                        Expression::Literal(token) | Expression::Name(token) => {
                            prop_assert_eq!(token.as_ref().text(), operand.as_str())
                        }

                        other => panic!("expected operand, got {:?}", other),
                    }

                    expression = left;
                }

                other => panic!("expected binary expression, got {:?}", other),
            }
        }

        match expression {
            Expression::Literal(token) | Expression::Name(token) => {
                prop_assert_eq!(token.as_ref().text(), first.as_str())
            }

            other => panic!("expected operand, got {:?}", other),
        }
    }
}

// =============================================================================
// Reducción
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Etiquetas únicas en toda la ejecución, una definición por etiqueta,
    /// todo salto dentro de su función y sin igualdades de cadenas
    #[test]
    fn lowering_produces_consistent_labels(
        bodies in prop::collection::vec(prop::collection::vec(arb_block(), 0..4), 1..4)
    ) {
        let mut text = String::new();
        let mut expected = 0;

        for (name, body) in function_names().zip(&bodies) {
            let body = body.join(" ");
            expected += body.matches("if ").count()
                + body.matches(" else ").count()
                + 2 * body.matches("while ").count();

            text.push_str(&format!(
                "function {}(n: Int, s: String) {{ {} }}\n",
                name, body
            ));
        }

        let file = lower_str(&text);
        let mut seen = HashSet::new();

        for function in &file.functions {
            let jumps = Jumps::of(function.section.as_ref().unwrap());
            let labels: Vec<_> = function
                .labels()
                .iter()
                .map(|label| label.name.clone())
                .collect();

            prop_assert_eq!(jumps.defined.len(), labels.len());
            for label in &labels {
                prop_assert!(jumps.defined.contains(label));
                prop_assert!(seen.insert(label.clone()), "duplicate label {}", label);
            }

            for target in &jumps.targets {
                prop_assert!(labels.contains(target), "dangling jump to {}", target);
            }

            for condition in &jumps.conditions {
                prop_assert!(!has_string_comparison(condition));
            }
        }

        prop_assert_eq!(seen.len(), expected);
    }
}

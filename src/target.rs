//! Contrato de registros e instrucciones para AVR.
//!
//! # Manual de ISA
//! <https://ww1.microchip.com/downloads/en/devicedoc/atmel-0856-avr-instruction-set-manual.pdf>
//!
//! La familia AVR expone 32 registros de propósito general de 8 bits,
//! `r0` hasta `r31`. Los últimos seis forman además tres pares de 16
//! bits que sirven como punteros (`X`, `Y`, `Z`). La convención de
//! llamadas es la de avr-gcc.

use std::fmt::{self, Display};

use bitflags::bitflags;

/// Registro de 8 bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Register8 {
    name: &'static str,
    number: Option<u8>,
}

impl Register8 {
    /// Registro de propósito general `r<number>`.
    const fn general(number: u8, name: &'static str) -> Self {
        Register8 {
            name,
            number: Some(number),
        }
    }

    /// Registro de E/S o de estado, fuera del archivo general.
    const fn special(name: &'static str) -> Self {
        Register8 { name, number: None }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Número dentro del archivo general, si pertenece a él.
    pub fn number(&self) -> Option<u8> {
        self.number
    }
}

impl Display for Register8 {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name)
    }
}

/// Par de registros que forma un valor de 16 bits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Register16 {
    name: &'static str,
    low: Register8,
}

impl Register16 {
    const fn new(name: &'static str, low: Register8) -> Self {
        Register16 { name, low }
    }

    /// Nombre combinado, de la parte alta a la baja.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registro de 8 bits con la parte baja.
    pub fn low(&self) -> Register8 {
        self.low
    }
}

impl Display for Register16 {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name)
    }
}

/// Archivo de registros.
pub mod avr {
    use super::{Register16, Register8};

    pub const GENERAL: [Register8; 32] = [
        Register8::general(0, "r0"),
        Register8::general(1, "r1"),
        Register8::general(2, "r2"),
        Register8::general(3, "r3"),
        Register8::general(4, "r4"),
        Register8::general(5, "r5"),
        Register8::general(6, "r6"),
        Register8::general(7, "r7"),
        Register8::general(8, "r8"),
        Register8::general(9, "r9"),
        Register8::general(10, "r10"),
        Register8::general(11, "r11"),
        Register8::general(12, "r12"),
        Register8::general(13, "r13"),
        Register8::general(14, "r14"),
        Register8::general(15, "r15"),
        Register8::general(16, "r16"),
        Register8::general(17, "r17"),
        Register8::general(18, "r18"),
        Register8::general(19, "r19"),
        Register8::general(20, "r20"),
        Register8::general(21, "r21"),
        Register8::general(22, "r22"),
        Register8::general(23, "r23"),
        Register8::general(24, "r24"),
        Register8::general(25, "r25"),
        Register8::general(26, "r26"),
        Register8::general(27, "r27"),
        Register8::general(28, "r28"),
        Register8::general(29, "r29"),
        Register8::general(30, "r30"),
        Register8::general(31, "r31"),
    ];

    /// Puntero `X`.
    pub const X: Register16 = Register16::new("r27:r26", GENERAL[26]);

    /// Puntero `Y`, usado como frame pointer por avr-gcc.
    pub const Y: Register16 = Register16::new("r29:r28", GENERAL[28]);

    /// Puntero `Z`, el único capaz de direccionar memoria de programa.
    pub const Z: Register16 = Register16::new("r31:r30", GENERAL[30]);

    /// Registro de estado.
    pub const SREG: Register8 = Register8::special("sreg");

    /// Puntero de stack.
    pub const SP: Register16 = Register16::new("sph:spl", Register8::special("spl"));

    /// Registro general por número.
    pub fn general(number: u8) -> Option<Register8> {
        GENERAL.get(number as usize).copied()
    }
}

bitflags! {
    /// Conjunto de registros de propósito general.
    pub struct RegisterSet: u32 {
        const R0 = 1 << 0;
        const R1 = 1 << 1;
        const R2 = 1 << 2;
        const R3 = 1 << 3;
        const R4 = 1 << 4;
        const R5 = 1 << 5;
        const R6 = 1 << 6;
        const R7 = 1 << 7;
        const R8 = 1 << 8;
        const R9 = 1 << 9;
        const R10 = 1 << 10;
        const R11 = 1 << 11;
        const R12 = 1 << 12;
        const R13 = 1 << 13;
        const R14 = 1 << 14;
        const R15 = 1 << 15;
        const R16 = 1 << 16;
        const R17 = 1 << 17;
        const R18 = 1 << 18;
        const R19 = 1 << 19;
        const R20 = 1 << 20;
        const R21 = 1 << 21;
        const R22 = 1 << 22;
        const R23 = 1 << 23;
        const R24 = 1 << 24;
        const R25 = 1 << 25;
        const R26 = 1 << 26;
        const R27 = 1 << 27;
        const R28 = 1 << 28;
        const R29 = 1 << 29;
        const R30 = 1 << 30;
        const R31 = 1 << 31;

        /// `r16`-`r31`, los únicos que aceptan `ldi`, `subi`, `andi`, etc.
        const IMMEDIATE = 0xffff_0000;

        const X = Self::R26.bits | Self::R27.bits;
        const Y = Self::R28.bits | Self::R29.bits;
        const Z = Self::R30.bits | Self::R31.bits;
        const POINTERS = Self::X.bits | Self::Y.bits | Self::Z.bits;

        /// Registros que una función llamada puede destruir.
        ///
        /// `r0` es temporal. `r1` se asume siempre en cero y no
        /// pertenece a ningún conjunto.
        const CALL_CLOBBERED = Self::R0.bits
            | Self::R18.bits | Self::R19.bits | Self::R20.bits | Self::R21.bits
            | Self::R22.bits | Self::R23.bits | Self::R24.bits | Self::R25.bits
            | Self::X.bits | Self::Z.bits;

        /// Registros que una función llamada debe preservar.
        const CALL_SAVED = 0x0003_fffc | Self::Y.bits;
    }
}

impl RegisterSet {
    /// Conjunto unitario. Registros especiales producen un conjunto vacío.
    pub fn of(register: Register8) -> Self {
        match register.number() {
            Some(number) => RegisterSet::from_bits_truncate(1 << number),
            None => RegisterSet::empty(),
        }
    }

    /// Ambas mitades de un par.
    pub fn of_pair(pair: Register16) -> Self {
        RegisterSet::of(pair.low())
            | pair
                .low()
                .number()
                .and_then(|low| avr::general(low + 1))
                .map_or_else(RegisterSet::empty, RegisterSet::of)
    }

    /// Registros del conjunto, en orden ascendente.
    pub fn registers(self) -> impl Iterator<Item = Register8> {
        avr::GENERAL
            .into_iter()
            .filter(move |&register| self.contains(RegisterSet::of(register)))
    }
}

/// Operando de instrucción.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(Register8),
    Pair(Register16),
    Immediate(i32),
    Symbol(String),
}

impl Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(register) => register.fmt(fmt),
            Operand::Pair(pair) => pair.fmt(fmt),
            Operand::Immediate(value) => write!(fmt, "{}", value),
            Operand::Symbol(symbol) => fmt.write_str(symbol),
        }
    }
}

impl From<Register8> for Operand {
    fn from(register: Register8) -> Self {
        Operand::Register(register)
    }
}

impl From<Register16> for Operand {
    fn from(pair: Register16) -> Self {
        Operand::Pair(pair)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Immediate(value)
    }
}

/// Una línea de ensamblador.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Operación de máquina, `mnemonic a, b`.
    Operation {
        mnemonic: &'static str,
        operands: Vec<Operand>,
    },

    /// Pseudo-instrucción que define una etiqueta, `name:`.
    Label(String),
}

impl Instruction {
    pub fn op(mnemonic: &'static str, operands: Vec<Operand>) -> Self {
        Instruction::Operation { mnemonic, operands }
    }

    pub fn label<S: Into<String>>(name: S) -> Self {
        Instruction::Label(name.into())
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(name) => write!(fmt, "{}:", name),

            Instruction::Operation { mnemonic, operands } => {
                write!(fmt, "\t{}", mnemonic)?;
                for (i, operand) in operands.iter().enumerate() {
                    let separator = if i == 0 { " " } else { ", " };
                    write!(fmt, "{}{}", separator, operand)?;
                }

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{avr::*, *};

    #[test]
    fn register_names() {
        assert_eq!(GENERAL[0].to_string(), "r0");
        assert_eq!(GENERAL[31].name(), "r31");
        assert_eq!(general(17), Some(GENERAL[17]));
        assert_eq!(general(32), None);
        assert_eq!(SREG.name(), "sreg");
        assert_eq!(SREG.number(), None);
    }

    #[test]
    fn pointer_pairs() {
        assert_eq!(X.name(), "r27:r26");
        assert_eq!(X.low(), GENERAL[26]);
        assert_eq!(Y.name(), "r29:r28");
        assert_eq!(Y.low().name(), "r28");
        assert_eq!(Z.name(), "r31:r30");
        assert_eq!(Z.low().name(), "r30");
        assert_eq!(SP.name(), "sph:spl");
        assert_eq!(SP.low().name(), "spl");
    }

    #[test]
    fn register_sets() {
        assert_eq!(RegisterSet::of_pair(X), RegisterSet::X);
        assert_eq!(RegisterSet::of_pair(SP), RegisterSet::empty());
        assert!(RegisterSet::IMMEDIATE.contains(RegisterSet::of(GENERAL[16])));
        assert!(!RegisterSet::IMMEDIATE.contains(RegisterSet::of(GENERAL[15])));
        assert!(RegisterSet::IMMEDIATE.contains(RegisterSet::POINTERS));

        assert!(RegisterSet::CALL_CLOBBERED.intersection(RegisterSet::CALL_SAVED).is_empty());
        assert!(!(RegisterSet::CALL_CLOBBERED | RegisterSet::CALL_SAVED).contains(RegisterSet::R1));
        assert_eq!(
            (RegisterSet::CALL_CLOBBERED | RegisterSet::CALL_SAVED | RegisterSet::R1),
            RegisterSet::all()
        );

        let pointers: Vec<_> = RegisterSet::Z.registers().map(|register| register.name()).collect();
        assert_eq!(pointers, ["r30", "r31"]);
    }

    #[test]
    fn instruction_rendering() {
        let ldi = Instruction::op("ldi", vec![GENERAL[24].into(), 42.into()]);
        assert_eq!(ldi.to_string(), "\tldi r24, 42");

        let ret = Instruction::op("ret", vec![]);
        assert_eq!(ret.to_string(), "\tret");

        let jump = Instruction::op("rjmp", vec![Operand::Symbol("l#0".into())]);
        assert_eq!(jump.to_string(), "\trjmp l#0");

        assert_eq!(Instruction::label("l#0").to_string(), "l#0:");
    }
}

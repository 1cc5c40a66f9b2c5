use std::fmt::{self, Display, Formatter, Write};

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Opcode {
    Push,
    Pop,
    Load,
    Store,
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Neq,
    Lt,
    Gt,
    Jmp,
    Jz,
    Call,
    Ret,
    Print,
    Halt,
}

impl Opcode {
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Eq => "EQ",
            Opcode::Neq => "NEQ",
            Opcode::Lt => "LT",
            Opcode::Gt => "GT",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::Print => "PRINT",
            Opcode::Halt => "HALT",
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Number(f64),
    Text(String),
}

impl Operand {
    /// Jump targets must be non-negative whole numbers.
    pub fn as_address(&self) -> Option<usize> {
        match self {
            Operand::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Operand::Text(s) => Some(s),
            Operand::Number(_) => None,
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(n) => write!(f, "{}", Number(*n)),
            Operand::Text(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand: None,
        }
    }

    pub fn with(opcode: Opcode, operand: Operand) -> Self {
        Self {
            opcode,
            operand: Some(operand),
        }
    }

    pub fn push(value: f64) -> Self {
        Self::with(Opcode::Push, Operand::Number(value))
    }

    pub fn load(name: &str) -> Self {
        Self::with(Opcode::Load, Operand::Text(name.to_owned()))
    }

    pub fn store(name: &str) -> Self {
        Self::with(Opcode::Store, Operand::Text(name.to_owned()))
    }

    pub fn jump(opcode: Opcode, target: usize) -> Self {
        Self::with(opcode, Operand::Number(target as f64))
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Some(operand) => write!(f, "{} {}", self.opcode, operand),
            None => write!(f, "{}", self.opcode),
        }
    }
}

/// A value living on the VM stack or in a local.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Str(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", Number(*n)),
            Value::Str(s) => f.write_str(s),
        }
    }
}

// Numbers print without a trailing ".0", the way the demo language shows them.
// Magnitudes from 1e21 up or below 1e-6 switch to exponent form (`1e+21`).
struct Number(f64);

impl Display for Number {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let n = self.0;
        if n.is_nan() {
            f.write_str("NaN")
        } else if n.is_infinite() {
            f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
        } else if n == 0.0 {
            f.write_str("0")
        } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
            let exp = format!("{:e}", n);
            match exp.split_once('e') {
                Some((mantissa, power)) if !power.starts_with('-') => {
                    write!(f, "{}e+{}", mantissa, power)
                }
                _ => f.write_str(&exp),
            }
        } else {
            write!(f, "{}", n)
        }
    }
}

/// Address-numbered listing of a program, one instruction per line.
pub fn disassemble(code: &[Instruction]) -> String {
    let mut out = String::new();
    for (addr, inst) in code.iter().enumerate() {
        // writing into a String cannot fail
        let _ = writeln!(out, "{:04}\t{}", addr, inst);
    }
    out
}

/// Load a program listing such as `[{"opcode": "PUSH", "operand": 1}]`.
pub fn from_json(listing: &str) -> Result<Vec<Instruction>, Error> {
    serde_json::from_str(listing).map_err(|e| Error::Bytecode {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble() {
        let code = vec![
            Instruction::push(1.0),
            Instruction::push(2.5),
            Instruction::new(Opcode::Add),
            Instruction::store("x"),
            Instruction::jump(Opcode::Jmp, 0),
            Instruction::new(Opcode::Halt),
        ];
        let listing = disassemble(&code);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "0000\tPUSH 1");
        assert_eq!(lines[1], "0001\tPUSH 2.5");
        assert_eq!(lines[2], "0002\tADD");
        assert_eq!(lines[3], "0003\tSTORE \"x\"");
        assert_eq!(lines[4], "0004\tJMP 0");
        assert_eq!(lines[5], "0005\tHALT");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Number(2.0).to_string(), "2");
        assert_eq!(Value::Number(-0.0).to_string(), "0");
        assert_eq!(Value::Number(0.25).to_string(), "0.25");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(Value::Number(1e21).to_string(), "1e+21");
        assert_eq!(Value::Number(-2.5e30).to_string(), "-2.5e+30");
        assert_eq!(Value::Number(1e-7).to_string(), "1e-7");
        assert_eq!(Value::Number(1e20).to_string(), "100000000000000000000");
        assert_eq!(Value::Number(0.000001).to_string(), "0.000001");
        assert_eq!(Value::Str("hi there".into()).to_string(), "hi there");
    }

    #[test]
    fn test_addresses() {
        assert_eq!(Operand::Number(3.0).as_address(), Some(3));
        assert_eq!(Operand::Number(-1.0).as_address(), None);
        assert_eq!(Operand::Number(1.5).as_address(), None);
        assert_eq!(Operand::Text("3".into()).as_address(), None);
    }

    #[test]
    fn test_from_json() {
        let code = from_json(
            r#"[
                {"opcode": "PUSH", "operand": 4},
                {"opcode": "LOAD", "operand": "x"},
                {"opcode": "HALT"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            code,
            vec![
                Instruction::push(4.0),
                Instruction::load("x"),
                Instruction::new(Opcode::Halt),
            ]
        );
    }

    #[test]
    fn test_from_json_rejects_unknown_opcode() {
        let err = from_json(r#"[{"opcode": "JUMP_FAR", "operand": 1}]"#).unwrap_err();
        match err {
            Error::Bytecode { message } => assert!(message.contains("unknown variant")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}

//! A toy imperative language taken from source text to a stack machine:
//! text → tokens → AST → bytecode → execution. Every stage is exposed so the
//! intermediate results can be inspected one at a time.
pub mod ast;
pub mod bytecode;
mod compiler;
mod error;
mod lexer;
mod parser;
mod vm;

use log::trace;

pub use bytecode::{disassemble, Instruction, Opcode, Operand, Value};
pub use compiler::compile;
pub use error::{Error, Fault};
pub use lexer::{tokenize, SourceSpan, Token, TokenKind, KEYWORDS};
pub use parser::{parse, parse_recovering, Parser};
pub use vm::{Tick, Vm, VmConfig, VmState};

/// Run `source` through every stage and return the finished VM for
/// inspection.
pub fn run_source(source: &str, config: VmConfig) -> Result<Vm, Error> {
    trace!("Lexing {source}");
    let tokens = tokenize(source)?;
    trace!("Parsing {tokens:#?}");
    let ast = parse(&tokens)?;
    trace!("Generating bytecode for {ast:#?}");
    let code = compile(&ast)?;
    trace!("Executing\n{}", disassemble(&code));
    let mut vm = Vm::with_config(config);
    vm.load(code);
    vm.run()?;
    Ok(vm)
}

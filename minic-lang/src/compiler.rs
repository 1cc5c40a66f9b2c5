use log::debug;

use crate::ast;
use crate::bytecode::{Instruction, Opcode, Operand};
use crate::error::Error;

struct Compiler {
    code: Vec<Instruction>,
}

fn compile_error(span: ast::SourceSpan, message: impl Into<String>) -> Error {
    Error::Compile {
        start: span.start,
        end: span.end,
        message: message.into(),
    }
}

impl Compiler {
    fn new() -> Self {
        Self { code: Vec::new() }
    }

    fn push_op(&mut self, op: Opcode) {
        self.code.push(Instruction::new(op));
    }

    fn push_inst(&mut self, inst: Instruction) {
        self.code.push(inst);
    }

    /// Emit a jump with a placeholder target, returning its address for
    /// [`Compiler::patch_jump`].
    fn push_jump(&mut self, op: Opcode) -> usize {
        let at = self.code.len();
        self.code.push(Instruction::jump(op, usize::MAX));
        at
    }

    // Point the jump at `at` to the next instruction to be emitted.
    fn patch_jump(&mut self, at: usize) {
        let target = self.code.len();
        self.code[at].operand = Some(Operand::Number(target as f64));
    }

    // Walk the AST and compile to bytecode
    fn compile(mut self, input: &ast::Src<ast::Program>) -> Result<Vec<Instruction>, Error> {
        for stmt in &input.node {
            self.statement(stmt)?;
        }
        self.push_op(Opcode::Halt);
        Ok(self.code)
    }

    fn statement(&mut self, stmt: &ast::Src<ast::Stmt>) -> Result<(), Error> {
        match &stmt.node {
            ast::Stmt::VariableDecl {
                name, initializer, ..
            } => {
                // declaring without a value emits nothing
                if let Some(expr) = initializer {
                    self.expression(expr)?;
                    self.push_inst(Instruction::store(name));
                }
            }
            ast::Stmt::Expression(expr) => {
                self.expression(expr)?;
                self.push_op(Opcode::Pop);
            }
            ast::Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expression(condition)?;
                let to_else = self.push_jump(Opcode::Jz);
                self.statement(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let to_end = self.push_jump(Opcode::Jmp);
                        self.patch_jump(to_else);
                        self.statement(else_branch)?;
                        self.patch_jump(to_end);
                    }
                    None => self.patch_jump(to_else),
                }
            }
            ast::Stmt::While { condition, body } => {
                let top = self.code.len();
                self.expression(condition)?;
                let to_end = self.push_jump(Opcode::Jz);
                self.statement(body)?;
                self.push_inst(Instruction::jump(Opcode::Jmp, top));
                self.patch_jump(to_end);
            }
            ast::Stmt::Return { value } => {
                if let Some(value) = value {
                    self.expression(value)?;
                }
                self.push_op(Opcode::Ret);
            }
        }
        Ok(())
    }

    fn expression(&mut self, expr: &ast::Src<ast::Expr>) -> Result<(), Error> {
        match &expr.node {
            ast::Expr::Literal(ast::Literal::Number(text)) => {
                let value = text.parse::<f64>().map_err(|_| {
                    compile_error(expr.span, format!("invalid number literal '{}'", text))
                })?;
                self.push_inst(Instruction::push(value));
            }
            ast::Expr::Literal(ast::Literal::Str(s)) => {
                self.push_inst(Instruction::with(Opcode::Push, Operand::Text(s.clone())));
            }
            ast::Expr::Identifier(name) => self.push_inst(Instruction::load(name)),
            ast::Expr::Binary(op, lhs, rhs) => {
                self.expression(lhs)?;
                self.expression(rhs)?;
                match op {
                    ast::BinaryOp::Add => self.push_op(Opcode::Add),
                    ast::BinaryOp::Sub => self.push_op(Opcode::Sub),
                    ast::BinaryOp::Mul => self.push_op(Opcode::Mul),
                    ast::BinaryOp::Div => self.push_op(Opcode::Div),
                    ast::BinaryOp::Eq => self.push_op(Opcode::Eq),
                    ast::BinaryOp::Neq => self.push_op(Opcode::Neq),
                    ast::BinaryOp::Lt => self.push_op(Opcode::Lt),
                    ast::BinaryOp::Gt => self.push_op(Opcode::Gt),
                    // a <= b is !(a > b). With a NaN operand both forms
                    // come out true, since every NaN comparison is false.
                    ast::BinaryOp::Lte => {
                        self.push_op(Opcode::Gt);
                        self.negate();
                    }
                    ast::BinaryOp::Gte => {
                        self.push_op(Opcode::Lt);
                        self.negate();
                    }
                }
            }
            ast::Expr::Unary(op, arg) => match op {
                ast::UnaryOp::Neg => {
                    self.push_inst(Instruction::push(0.0));
                    self.expression(arg)?;
                    self.push_op(Opcode::Sub);
                }
                ast::UnaryOp::Not => {
                    self.expression(arg)?;
                    self.negate();
                }
            },
            ast::Expr::Error { message } => {
                return Err(compile_error(expr.span, message.clone()));
            }
        }
        Ok(())
    }

    // Replace the number on top of the stack with 1 if it was 0, else 0.
    fn negate(&mut self) {
        self.push_inst(Instruction::push(0.0));
        self.push_op(Opcode::Eq);
    }
}

/// Lower a parsed program to a flat instruction list ending in `HALT`.
pub fn compile(program: &ast::Src<ast::Program>) -> Result<Vec<Instruction>, Error> {
    let code = Compiler::new().compile(program)?;
    debug!("compiled {} statements to {} instructions", program.node.len(), code.len());
    Ok(code)
}

use std::collections::{BTreeMap, HashMap};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use string_interner::{symbol::SymbolU32, StringInterner};

use crate::bytecode::{Instruction, Opcode, Operand, Value};
use crate::error::{Error, Fault};

/// Number of instructions executed since the last load or reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tick(u64);

impl Tick {
    pub fn new() -> Self {
        Self(0)
    }
    pub fn count(&self) -> u64 {
        self.0
    }
    fn tick(&mut self) {
        self.0 += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Upper bound on instructions executed by a single `run` call.
    /// `None` runs until the program finishes.
    #[serde(default)]
    pub max_steps: Option<u64>,
}

/// Owned copy of the machine state. Changing it never affects the VM.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmState {
    pub pc: usize,
    pub stack: Vec<Value>,
    pub locals: BTreeMap<String, Value>,
    /// Reserved, nothing writes to the heap yet.
    pub heap: BTreeMap<u32, Value>,
    pub call_stack: Vec<usize>,
    pub output: Vec<String>,
    pub finished: bool,
    pub tick: Tick,
}

pub struct Vm {
    config: VmConfig,
    code: Vec<Instruction>,
    pc: usize,
    stack: Vec<Value>,
    names: StringInterner,
    locals: HashMap<SymbolU32, Value>,
    heap: BTreeMap<u32, Value>,
    call_stack: Vec<usize>,
    output: Vec<String>,
    finished: bool,
    tick: Tick,
    // Set when an instruction faults; cleared by reset or load.
    fault: Option<Error>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::with_config(VmConfig::default())
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            config,
            code: Vec::new(),
            pc: 0,
            stack: Vec::new(),
            names: StringInterner::default(),
            locals: HashMap::new(),
            heap: BTreeMap::new(),
            call_stack: Vec::new(),
            output: Vec::new(),
            finished: false,
            tick: Tick::new(),
            fault: None,
        }
    }

    /// Install a program and reset all execution state.
    pub fn load(&mut self, code: Vec<Instruction>) {
        debug!("loading {} instructions", code.len());
        self.code = code;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.pc = 0;
        self.stack.clear();
        self.names = StringInterner::default();
        self.locals.clear();
        self.heap.clear();
        self.call_stack.clear();
        self.output.clear();
        self.finished = false;
        self.tick = Tick::new();
        self.fault = None;
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Execute one instruction. Returns whether execution may continue.
    ///
    /// Once an instruction has faulted, every further call returns that
    /// error until the VM is reset or reloaded.
    pub fn step(&mut self) -> Result<bool, Error> {
        if let Some(err) = &self.fault {
            return Err(err.clone());
        }
        if self.finished || self.pc >= self.code.len() {
            if !self.finished {
                debug!("finished at pc {} after {} steps", self.pc, self.tick.count());
            }
            self.finished = true;
            return Ok(false);
        }

        let inst = self.code[self.pc].clone();
        trace!("{:04}\t{}\tstack={:?}", self.pc, inst, self.stack);
        if let Err(fault) = self.execute(&inst) {
            let err = Error::Runtime { pc: self.pc, fault };
            debug!("{}", err);
            self.fault = Some(err.clone());
            return Err(err);
        }
        self.tick.tick();
        if self.finished {
            debug!("finished at pc {} after {} steps", self.pc, self.tick.count());
        }
        Ok(!self.finished)
    }

    /// Step until the program finishes, an instruction faults, or the
    /// configured step budget for this call runs out.
    pub fn run(&mut self) -> Result<(), Error> {
        let mut steps: u64 = 0;
        loop {
            if let Some(limit) = self.config.max_steps {
                if steps >= limit && !self.finished && self.pc < self.code.len() {
                    return Err(Error::Runtime {
                        pc: self.pc,
                        fault: Fault::StepBudgetExhausted { limit },
                    });
                }
            }
            if !self.step()? {
                return Ok(());
            }
            steps += 1;
        }
    }

    pub fn state(&self) -> VmState {
        let locals = self
            .locals
            .iter()
            .filter_map(|(sym, value)| {
                self.names
                    .resolve(*sym)
                    .map(|name| (name.to_owned(), value.clone()))
            })
            .collect();
        VmState {
            pc: self.pc,
            stack: self.stack.clone(),
            locals,
            heap: self.heap.clone(),
            call_stack: self.call_stack.clone(),
            output: self.output.clone(),
            finished: self.finished,
            tick: self.tick,
        }
    }

    /// Everything printed so far, one line per `PRINT`.
    pub fn output(&self) -> String {
        self.output.join("\n")
    }

    fn peek(&self, depth: usize, opcode: Opcode) -> Result<&Value, Fault> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or(Fault::StackUnderflow { opcode })
    }

    fn pop(&mut self, opcode: Opcode) -> Result<Value, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow { opcode })
    }

    fn number(value: &Value, opcode: Opcode) -> Result<f64, Fault> {
        match value {
            Value::Number(n) => Ok(*n),
            other => Err(Fault::TypeMismatch {
                opcode,
                found: other.type_name().to_string(),
            }),
        }
    }

    fn text_operand<'i>(inst: &'i Instruction) -> Result<&'i str, Fault> {
        inst.operand
            .as_ref()
            .and_then(Operand::as_text)
            .ok_or(Fault::BadOperand {
                opcode: inst.opcode,
            })
    }

    fn address_operand(inst: &Instruction) -> Result<usize, Fault> {
        inst.operand
            .as_ref()
            .and_then(Operand::as_address)
            .ok_or(Fault::BadOperand {
                opcode: inst.opcode,
            })
    }

    // Operands are checked before anything is popped, so a faulting
    // instruction leaves the stack untouched.
    fn equality(&mut self, opcode: Opcode, expect_equal: bool) -> Result<(), Fault> {
        let b = self.peek(0, opcode)?;
        let a = self.peek(1, opcode)?;
        let result = (a == b) == expect_equal;
        self.replace_top_two(Value::Number(result as u8 as f64));
        Ok(())
    }

    fn arithmetic(
        &mut self,
        opcode: Opcode,
        f: impl FnOnce(f64, f64) -> Result<f64, Fault>,
    ) -> Result<(), Fault> {
        let b = Self::number(self.peek(0, opcode)?, opcode)?;
        let a = Self::number(self.peek(1, opcode)?, opcode)?;
        let result = f(a, b)?;
        self.replace_top_two(Value::Number(result));
        Ok(())
    }

    fn replace_top_two(&mut self, value: Value) {
        self.stack.truncate(self.stack.len().saturating_sub(2));
        self.stack.push(value);
    }

    fn execute(&mut self, inst: &Instruction) -> Result<(), Fault> {
        match inst.opcode {
            Opcode::Push => {
                let value = match &inst.operand {
                    Some(Operand::Number(n)) => Value::Number(*n),
                    Some(Operand::Text(s)) => Value::Str(s.clone()),
                    None => return Err(Fault::BadOperand { opcode: inst.opcode }),
                };
                self.stack.push(value);
                self.pc += 1;
            }
            Opcode::Pop => {
                self.pop(inst.opcode)?;
                self.pc += 1;
            }
            Opcode::Load => {
                let name = Self::text_operand(inst)?;
                let value = self
                    .names
                    .get(name)
                    .and_then(|sym| self.locals.get(&sym))
                    .cloned()
                    .ok_or_else(|| Fault::UndefinedVariable {
                        name: name.to_owned(),
                    })?;
                self.stack.push(value);
                self.pc += 1;
            }
            Opcode::Store => {
                let name = Self::text_operand(inst)?;
                let value = self.pop(inst.opcode)?;
                let sym = self.names.get_or_intern(name);
                self.locals.insert(sym, value);
                self.pc += 1;
            }
            Opcode::Add => {
                self.arithmetic(inst.opcode, |a, b| Ok(a + b))?;
                self.pc += 1;
            }
            Opcode::Sub => {
                self.arithmetic(inst.opcode, |a, b| Ok(a - b))?;
                self.pc += 1;
            }
            Opcode::Mul => {
                self.arithmetic(inst.opcode, |a, b| Ok(a * b))?;
                self.pc += 1;
            }
            Opcode::Div => {
                self.arithmetic(inst.opcode, |a, b| {
                    if b == 0.0 {
                        return Err(Fault::DivisionByZero);
                    }
                    Ok((a / b).floor())
                })?;
                self.pc += 1;
            }
            Opcode::Lt => {
                self.arithmetic(inst.opcode, |a, b| Ok((a < b) as u8 as f64))?;
                self.pc += 1;
            }
            Opcode::Gt => {
                self.arithmetic(inst.opcode, |a, b| Ok((a > b) as u8 as f64))?;
                self.pc += 1;
            }
            Opcode::Eq => {
                self.equality(inst.opcode, true)?;
                self.pc += 1;
            }
            Opcode::Neq => {
                self.equality(inst.opcode, false)?;
                self.pc += 1;
            }
            Opcode::Jmp => {
                self.pc = Self::address_operand(inst)?;
            }
            Opcode::Jz => {
                let target = Self::address_operand(inst)?;
                // only the number 0 jumps; strings always fall through
                let jump = matches!(self.peek(0, inst.opcode)?, Value::Number(n) if *n == 0.0);
                self.stack.pop();
                if jump {
                    self.pc = target;
                } else {
                    self.pc += 1;
                }
            }
            Opcode::Call => {
                let target = Self::address_operand(inst)?;
                self.call_stack.push(self.pc + 1);
                self.pc = target;
            }
            Opcode::Ret => match self.call_stack.pop() {
                Some(addr) => self.pc = addr,
                // returning from the top level ends the program
                None => self.finished = true,
            },
            Opcode::Print => {
                let value = self.pop(inst.opcode)?;
                self.output.push(value.to_string());
                self.pc += 1;
            }
            Opcode::Halt => {
                self.finished = true;
            }
        }
        Ok(())
    }
}

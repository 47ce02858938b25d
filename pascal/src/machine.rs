//! The p-machine.
//!
//! A stack interpreter over a word-addressed data store. The stack
//! grows upward from address 0, the heap downward from the top; every
//! load or store through a computed address is checked against the gap
//! between them. Execution is cooperative: [`Machine::step`] runs a
//! bounded batch of instructions and hands control back so the host can
//! pump events, honour delays, or stop the machine.
use std::mem;
use std::thread;
use std::time::{Duration, Instant};

use crate::bytecode::{decode, Bytecode, Op};
use crate::compiler::types::SimpleType;
use crate::constants::*;
use crate::disasm::Disassembler;
use crate::error::{PascalError, PascalResult};
use crate::native::Host;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Running,
}

/// What a `step` batch ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Budget exhausted; more instructions are waiting.
    Running,
    /// A native asked for a pause of this many milliseconds before the
    /// next batch.
    NeedsDelay(u64),
    /// The machine stopped (`STP`, `Halt`, or a host `stop`).
    Halted,
}

type OutputFn = Box<dyn FnMut(&str)>;
type FinishFn = Box<dyn FnMut(Duration)>;
type DebugFn = Box<dyn FnMut(&str)>;

pub struct Machine {
    code: Bytecode,
    dstore: Vec<Value>,
    pc: usize,
    sp: usize,
    mp: usize,
    np: usize,
    ep: usize,
    state: State,
    pending_delay: Option<u64>,
    host: Box<dyn Host>,
    output: Option<OutputFn>,
    finish: Option<FinishFn>,
    debug: Option<DebugFn>,
    /// Partial `Write` output waiting for its `WriteLn`.
    line_buf: String,
    started: Option<Instant>,
}

impl Machine {
    /// Load a program: zero the data store, copy the typed-constant
    /// blob to the bottom, point `sp` just past it and `np` at the top.
    pub fn new(code: Bytecode, host: Box<dyn Host>) -> Self {
        let mut dstore = vec![Value::zero(); DSTORE_SIZE];
        for (i, value) in code.typed_constants.iter().enumerate() {
            dstore[i] = value.clone();
        }
        let sp = code.typed_constants.len();
        let pc = code.start_address;
        Self {
            code,
            dstore,
            pc,
            sp,
            mp: 0,
            np: DSTORE_SIZE,
            ep: sp,
            state: State::Running,
            pending_delay: None,
            host,
            output: None,
            finish: None,
            debug: None,
            line_buf: String::new(),
            started: None,
        }
    }

    pub fn set_output_callback(&mut self, callback: impl FnMut(&str) + 'static) {
        self.output = Some(Box::new(callback));
    }

    pub fn set_finish_callback(&mut self, callback: impl FnMut(Duration) + 'static) {
        self.finish = Some(Box::new(callback));
    }

    /// Receives one disassembly line per instruction stepped.
    pub fn set_debug_callback(&mut self, callback: impl FnMut(&str) + 'static) {
        self.debug = Some(Box::new(callback));
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn mp(&self) -> usize {
        self.mp
    }

    pub fn np(&self) -> usize {
        self.np
    }

    pub fn ep(&self) -> usize {
        self.ep
    }

    /// Direct read of a data-store word, unchecked against the gap.
    /// Meant for hosts and tests inspecting final state.
    pub fn dstore(&self, addr: usize) -> Option<&Value> {
        self.dstore.get(addr)
    }

    /// Execute up to `budget` instructions. Returns early when a native
    /// requested a delay or the machine halted. A runtime error stops
    /// the machine (firing the finish callback) and is passed up.
    pub fn step(&mut self, budget: u32) -> PascalResult<StepOutcome> {
        if self.state == State::Stopped {
            return Ok(StepOutcome::Halted);
        }
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
        for _ in 0..budget {
            if let Some(ms) = self.pending_delay.take() {
                return Ok(StepOutcome::NeedsDelay(ms));
            }
            match self.exec_one() {
                // A native Halt can stop the machine mid-batch.
                Ok(true) if self.state == State::Stopped => return Ok(StepOutcome::Halted),
                Ok(true) => {}
                Ok(false) => return Ok(StepOutcome::Halted),
                Err(err) => {
                    self.halt();
                    return Err(err);
                }
            }
        }
        Ok(StepOutcome::Running)
    }

    /// Blocking convenience loop: step, sleep through delays, repeat
    /// until the program halts. Hosts with an event loop drive
    /// [`step`](Self::step) themselves instead.
    pub fn run(&mut self) -> PascalResult<()> {
        loop {
            match self.step(STEP_BATCH)? {
                StepOutcome::Running => {}
                StepOutcome::NeedsDelay(ms) => thread::sleep(Duration::from_millis(ms)),
                StepOutcome::Halted => return Ok(()),
            }
        }
    }

    /// Stop the machine. Idempotent; the finish callback fires only on
    /// the transition out of `Running`.
    pub fn stop(&mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if self.state == State::Stopped {
            return;
        }
        self.state = State::Stopped;
        if !self.line_buf.is_empty() {
            let rest = mem::take(&mut self.line_buf);
            self.emit_line(&rest);
        }
        let elapsed = self.started.map(|t| t.elapsed()).unwrap_or_default();
        if let Some(finish) = &mut self.finish {
            finish(elapsed);
        }
    }

    fn emit_line(&mut self, line: &str) {
        match &mut self.output {
            Some(output) => output(line),
            None => println!("{line}"),
        }
    }

    // --------------------------------------------------------------------
    // Data store access

    fn push(&mut self, value: Value) -> PascalResult<()> {
        if self.sp >= self.np {
            return Err(PascalError::new("stack overflow"));
        }
        self.dstore[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> PascalResult<Value> {
        if self.sp == 0 {
            return Err(PascalError::new("stack underflow"));
        }
        self.sp -= 1;
        Ok(mem::replace(&mut self.dstore[self.sp], Value::zero()))
    }

    /// Addresses inside the gap between stack top and heap bottom are
    /// neither live stack nor live heap.
    fn check_addr(&self, addr: usize) -> PascalResult<()> {
        if addr >= DSTORE_SIZE || (addr >= self.sp && addr < self.np) {
            Err(PascalError::new(format!("invalid data address {addr}")))
        } else {
            Ok(())
        }
    }

    fn load(&self, addr: usize) -> PascalResult<Value> {
        self.check_addr(addr)?;
        Ok(self.dstore[addr].clone())
    }

    fn store(&mut self, addr: usize, value: Value) -> PascalResult<()> {
        self.check_addr(addr)?;
        self.dstore[addr] = value;
        Ok(())
    }

    /// Follow the static-link chain `level` frames up from `mp`.
    fn frame_base(&self, level: usize) -> PascalResult<usize> {
        let mut base = self.mp;
        for _ in 0..level {
            base = self.dstore[base + MARK_SL].as_addr()?;
        }
        Ok(base)
    }

    // --------------------------------------------------------------------
    // Heap

    /// Carve `words` off the heap. The block size lives one word below
    /// the returned address; the block itself is zero-filled.
    pub(crate) fn malloc(&mut self, words: usize) -> PascalResult<usize> {
        if self.np < self.sp + words + 1 {
            return Err(PascalError::new("heap exhausted"));
        }
        self.np -= words + 1;
        self.dstore[self.np] = Value::Int(words as i32);
        for slot in &mut self.dstore[self.np + 1..self.np + 1 + words] {
            *slot = Value::zero();
        }
        Ok(self.np + 1)
    }

    /// Release a heap block. Only a block sitting at the current heap
    /// bottom actually shrinks the heap; anything else is a no-op, the
    /// machine does no coalescing.
    pub(crate) fn free(&mut self, addr: usize) -> PascalResult<()> {
        if addr == 0 || addr - 1 < self.np || addr - 1 >= DSTORE_SIZE {
            return Err(PascalError::new(format!("invalid heap address {addr}")));
        }
        let size = self.dstore[addr - 1].as_int()? as usize;
        if addr == self.np + 1 {
            self.np += size + 1;
        }
        Ok(())
    }

    // --------------------------------------------------------------------
    // Dispatch

    /// Execute one instruction. `Ok(false)` means the machine halted.
    fn exec_one(&mut self) -> PascalResult<bool> {
        let word = *self
            .code
            .istore
            .get(self.pc)
            .ok_or_else(|| PascalError::new(format!("invalid pc address {}", self.pc)))?;

        if self.debug.is_some() {
            let line = Disassembler::new(&self.code).line(self.pc);
            if let Some(debug) = &mut self.debug {
                debug(&line);
            }
        }

        let (raw, a, b) = decode(word);
        let op = Op::from_byte(raw).ok_or_else(|| {
            PascalError::new(format!("unknown opcode 0x{raw:02X} at {}", self.pc))
        })?;
        self.pc += 1;
        let a = a as usize;
        let b = b as usize;

        match op {
            Op::Mst => {
                let static_link = self.frame_base(a)?;
                self.push(Value::zero())?; // return value
                self.push(Value::Int(static_link as i32))?;
                self.push(Value::Int(self.mp as i32))?;
                self.push(Value::Int(self.ep as i32))?;
                self.push(Value::zero())?; // return address, set by CUP
            }
            Op::Cup => {
                let new_mp = self
                    .sp
                    .checked_sub(a + MARK_SIZE)
                    .ok_or_else(|| PascalError::new("malformed call frame"))?;
                self.dstore[new_mp + MARK_RA] = Value::Int(self.pc as i32);
                self.mp = new_mp;
                self.pc = b;
            }
            Op::Ent => match a {
                0 => {
                    let new_sp = self.mp + b;
                    if new_sp > self.np {
                        return Err(PascalError::new("stack overflow"));
                    }
                    for slot in &mut self.dstore[self.sp..new_sp] {
                        *slot = Value::zero();
                    }
                    self.sp = new_sp;
                }
                1 => self.ep = self.mp + b,
                _ => return Err(PascalError::new("invalid ENT register")),
            },
            Op::Rtn => {
                let frame = self.mp;
                self.pc = self.dstore[frame + MARK_RA].as_addr()?;
                self.ep = self.dstore[frame + MARK_EP].as_addr()?;
                self.mp = self.dstore[frame + MARK_DL].as_addr()?;
                let returns_value = a != SimpleType::Void.code() as usize;
                self.sp = if returns_value { frame + 1 } else { frame };
            }
            Op::Stp => {
                self.halt();
                return Ok(false);
            }
            Op::Csp => {
                let mut args = Vec::with_capacity(a);
                for _ in 0..a {
                    args.push(self.pop()?);
                }
                args.reverse();
                let proc = self
                    .code
                    .natives
                    .get(b as u32)
                    .ok_or_else(|| PascalError::new(format!("unknown native index {b}")))?;
                let result = (proc.fun)(&mut Ctl { machine: self }, &args)?;
                if let Some(value) = result {
                    self.push(value)?;
                }
            }

            Op::Ldc => {
                let code = SimpleType::from_code(a as u32)
                    .ok_or_else(|| PascalError::new("invalid constant type code"))?;
                let value = match code {
                    SimpleType::Boolean => Value::Bool(b != 0),
                    SimpleType::Char => {
                        let c = char::from_u32(b as u32)
                            .ok_or_else(|| PascalError::new("invalid char constant"))?;
                        Value::string(c.to_string())
                    }
                    _ => self
                        .code
                        .constants
                        .get(b)
                        .cloned()
                        .ok_or_else(|| PascalError::new(format!("invalid constant index {b}")))?,
                };
                self.push(value)?;
            }
            Op::Lda => {
                let addr = self.frame_base(a)? + b;
                self.push(Value::Int(addr as i32))?;
            }
            Op::Lva | Op::Lvb | Op::Lvc | Op::Lvi | Op::Lvr => {
                // The type code in the opcode only matters for tracing;
                // words are tagged.
                let addr = self.frame_base(a)? + b;
                let value = self.load(addr)?;
                self.push(value)?;
            }
            Op::Ldi => {
                let addr = self.pop()?.as_addr()?;
                let value = self.load(addr)?;
                self.push(value)?;
            }
            Op::Sti => {
                let value = self.pop()?;
                let addr = self.pop()?.as_addr()?;
                self.store(addr, value)?;
            }
            Op::Ixa => {
                let index = self.pop()?.as_int()?;
                let addr = self.pop()?.as_int()?;
                self.push(Value::Int(addr.wrapping_add(index.wrapping_mul(b as i32))))?;
            }

            Op::Ujp => self.pc = b,
            Op::Fjp => {
                if !self.pop()?.as_bool()? {
                    self.pc = b;
                }
            }
            Op::Tjp => {
                if self.pop()?.as_bool()? {
                    self.pc = b;
                }
            }
            Op::Xjp => self.pc = self.pop()?.as_addr()?,

            Op::Adi | Op::Sbi | Op::Mpi | Op::Dvi | Op::Mod => {
                let r = self.pop()?.as_int()?;
                let l = self.pop()?.as_int()?;
                let result = match op {
                    Op::Adi => l.wrapping_add(r),
                    Op::Sbi => l.wrapping_sub(r),
                    Op::Mpi => l.wrapping_mul(r),
                    Op::Dvi => {
                        if r == 0 {
                            return Err(PascalError::new("division by zero"));
                        }
                        l.wrapping_div(r)
                    }
                    Op::Mod => {
                        if r == 0 {
                            return Err(PascalError::new("modulo by zero"));
                        }
                        l.wrapping_rem(r)
                    }
                    _ => unreachable!(),
                };
                self.push(Value::Int(result))?;
            }
            Op::Ngi => {
                let v = self.pop()?.as_int()?;
                self.push(Value::Int(v.wrapping_neg()))?;
            }

            Op::Adr | Op::Sbr | Op::Mpr | Op::Dvr => {
                let r = self.pop()?.as_real()?;
                let l = self.pop()?.as_real()?;
                let result = match op {
                    Op::Adr => l + r,
                    Op::Sbr => l - r,
                    Op::Mpr => l * r,
                    Op::Dvr => l / r,
                    _ => unreachable!(),
                };
                self.push(Value::Real(result))?;
            }
            Op::Ngr => {
                let v = self.pop()?.as_real()?;
                self.push(Value::Real(-v))?;
            }

            Op::And | Op::Ior => {
                let r = self.pop()?.as_bool()?;
                let l = self.pop()?.as_bool()?;
                let result = match op {
                    Op::And => l && r,
                    Op::Ior => l || r,
                    _ => unreachable!(),
                };
                self.push(Value::Bool(result))?;
            }
            Op::Not => {
                let v = self.pop()?.as_bool()?;
                self.push(Value::Bool(!v))?;
            }

            Op::Equ | Op::Neq | Op::Grt | Op::Geq | Op::Les | Op::Leq => {
                use std::cmp::Ordering;
                let r = self.pop()?;
                let l = self.pop()?;
                let ord = l.compare(&r)?;
                let result = match op {
                    Op::Equ => ord == Ordering::Equal,
                    Op::Neq => ord != Ordering::Equal,
                    Op::Grt => ord == Ordering::Greater,
                    Op::Geq => ord != Ordering::Less,
                    Op::Les => ord == Ordering::Less,
                    Op::Leq => ord != Ordering::Greater,
                    _ => unreachable!(),
                };
                self.push(Value::Bool(result))?;
            }

            Op::Inc => {
                let v = self.pop()?.as_int()?;
                self.push(Value::Int(v.wrapping_add(1)))?;
            }
            Op::Dec => {
                let v = self.pop()?.as_int()?;
                self.push(Value::Int(v.wrapping_sub(1)))?;
            }
            Op::Flt => {
                let v = self.pop()?.as_real()?;
                self.push(Value::Real(v))?;
            }
        }

        Ok(true)
    }
}

/// Control handle passed as the implicit first argument of every native
/// call. All reads and writes of machine state from host code go
/// through here.
pub struct Ctl<'m> {
    machine: &'m mut Machine,
}

impl Ctl<'_> {
    /// Halt the machine after the current instruction.
    pub fn stop(&mut self) {
        self.machine.halt();
    }

    /// Pause before the next batch.
    pub fn delay(&mut self, ms: u64) {
        self.machine.pending_delay = Some(ms);
    }

    /// Buffer output without ending the line.
    pub fn write(&mut self, text: &str) {
        self.machine.line_buf.push_str(text);
    }

    /// Emit the buffered output plus `text` as one line.
    pub fn writeln(&mut self, text: &str) {
        let mut line = mem::take(&mut self.machine.line_buf);
        line.push_str(text);
        self.machine.emit_line(&line);
    }

    pub fn read_dstore(&self, addr: usize) -> PascalResult<Value> {
        self.machine.load(addr)
    }

    pub fn write_dstore(&mut self, addr: usize, value: Value) -> PascalResult<()> {
        self.machine.store(addr, value)
    }

    pub fn malloc(&mut self, words: usize) -> PascalResult<usize> {
        self.machine.malloc(words)
    }

    pub fn free(&mut self, addr: usize) -> PascalResult<()> {
        self.machine.free(addr)
    }

    pub fn key_pressed(&mut self) -> bool {
        self.machine.host.key_pressed()
    }

    pub fn read_key(&mut self) -> Option<char> {
        self.machine.host.read_key()
    }
}

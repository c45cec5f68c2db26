//! A miniature emulator for the generated assembly, used by the scenario
//! tests to observe what a compiled program actually does.

// Each integration test binary compiles its own copy and uses a subset.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};

/// Test input/output device: feeds `IN` from a prepared list and captures
/// everything sent to `OUT`.
pub struct TestIo {
    input: VecDeque<i64>,
    output: Vec<i64>,
}

impl TestIo {
    pub fn with_input(input: Vec<i64>) -> TestIo {
        TestIo {
            input: input.into(),
            output: Vec::new(),
        }
    }

    pub fn into_output(self) -> Vec<i64> {
        self.output
    }
}

/// Sources in the tests are written in scan order; the on-disk format is
/// the mirror image.
pub fn mirror(logical: &str) -> String {
    logical.chars().rev().collect()
}

#[derive(Clone, Debug)]
enum Target {
    Immediate(i64),
    Rax,
    Rcx,
    Rdx,
    /// `[n]`
    Absolute(i64),
    /// `[rdx+n]`
    Frame(i64),
}

#[derive(Clone, Copy, Debug)]
enum Condition {
    Equal,
    NotEqual,
    Below,
    BelowOrEqual,
    Above,
    AboveOrEqual,
}

#[derive(Clone, Debug)]
enum Instruction {
    Push(Target),
    Pop(Target),
    Add,
    Sub,
    Mul,
    Div,
    Sqrt,
    Jump(String),
    JumpIf(Condition, String),
    Call(String),
    Return,
    In,
    Out,
    Halt,
}

fn parse_target(text: &str) -> Result<Target, String> {
    let target = match text {
        "rax" => Target::Rax,
        "rcx" => Target::Rcx,
        "rdx" => Target::Rdx,
        _ => {
            if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                if let Some(offset) = inner.strip_prefix("rdx+") {
                    Target::Frame(offset.parse().map_err(|_| format!("bad offset: {}", text))?)
                } else {
                    Target::Absolute(inner.parse().map_err(|_| format!("bad address: {}", text))?)
                }
            } else {
                Target::Immediate(text.parse().map_err(|_| format!("bad operand: {}", text))?)
            }
        }
    };

    Ok(target)
}

fn parse(assembly: &str) -> Result<(Vec<Instruction>, HashMap<String, usize>), String> {
    let mut instructions = Vec::new();
    let mut labels = HashMap::new();

    for line in assembly.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(label) = line.strip_suffix(':') {
            labels.insert(label.to_string(), instructions.len());
            continue;
        }

        let mut parts = line.split_whitespace();
        let mnemonic = parts.next().unwrap();
        let operand = parts.next();

        let operand_target = || -> Result<Target, String> {
            parse_target(operand.ok_or_else(|| format!("missing operand: {}", line))?)
        };
        let operand_label = || -> Result<String, String> {
            operand
                .map(str::to_string)
                .ok_or_else(|| format!("missing label: {}", line))
        };

        let instruction = match mnemonic {
            "PUSH" => Instruction::Push(operand_target()?),
            "POP" => Instruction::Pop(operand_target()?),
            "ADD" => Instruction::Add,
            "SUB" => Instruction::Sub,
            "MUL" => Instruction::Mul,
            "DIV" => Instruction::Div,
            "SQRT" => Instruction::Sqrt,
            "JMP" => Instruction::Jump(operand_label()?),
            "JE" => Instruction::JumpIf(Condition::Equal, operand_label()?),
            "JNE" => Instruction::JumpIf(Condition::NotEqual, operand_label()?),
            "JB" => Instruction::JumpIf(Condition::Below, operand_label()?),
            "JBE" => Instruction::JumpIf(Condition::BelowOrEqual, operand_label()?),
            "JA" => Instruction::JumpIf(Condition::Above, operand_label()?),
            "JAE" => Instruction::JumpIf(Condition::AboveOrEqual, operand_label()?),
            "CALL" => Instruction::Call(operand_label()?),
            "RET" => Instruction::Return,
            "IN" => Instruction::In,
            "OUT" => Instruction::Out,
            "HLT" => Instruction::Halt,
            other => return Err(format!("unknown mnemonic: {}", other)),
        };

        instructions.push(instruction);
    }

    Ok((instructions, labels))
}

/// Execute the assembly until `HLT`. Fails on stack underflow, unknown
/// labels, exhausted input or a blown step budget.
pub fn execute(assembly: &str, io: &mut TestIo) -> Result<(), String> {
    let (instructions, labels) = parse(assembly)?;

    let mut stack: Vec<i64> = Vec::new();
    let mut calls: Vec<usize> = Vec::new();
    let mut memory: HashMap<i64, i64> = HashMap::new();
    let (mut rax, mut rcx, mut rdx): (i64, i64, i64) = (0, 0, 0);
    let mut pc = 0usize;

    let resolve = |label: &str| -> Result<usize, String> {
        labels
            .get(label)
            .copied()
            .ok_or_else(|| format!("unknown label: {}", label))
    };

    for _step in 0..1_000_000 {
        let instruction = instructions
            .get(pc)
            .ok_or_else(|| "ran past the end of the program".to_string())?;
        pc += 1;

        match instruction {
            Instruction::Push(target) => {
                let value = match target {
                    Target::Immediate(value) => *value,
                    Target::Rax => rax,
                    Target::Rcx => rcx,
                    Target::Rdx => rdx,
                    Target::Absolute(address) => *memory.get(address).unwrap_or(&0),
                    Target::Frame(offset) => *memory.get(&(rdx + offset)).unwrap_or(&0),
                };
                stack.push(value);
            }
            Instruction::Pop(target) => {
                let value = stack.pop().ok_or("stack underflow")?;
                match target {
                    Target::Immediate(_) => return Err("POP into an immediate".to_string()),
                    Target::Rax => rax = value,
                    Target::Rcx => rcx = value,
                    Target::Rdx => rdx = value,
                    Target::Absolute(address) => {
                        memory.insert(*address, value);
                    }
                    Target::Frame(offset) => {
                        memory.insert(rdx + offset, value);
                    }
                }
            }
            Instruction::Add | Instruction::Sub | Instruction::Mul | Instruction::Div => {
                let b = stack.pop().ok_or("stack underflow")?;
                let a = stack.pop().ok_or("stack underflow")?;
                let value = match instruction {
                    Instruction::Add => a + b,
                    Instruction::Sub => a - b,
                    Instruction::Mul => a * b,
                    Instruction::Div => {
                        if b == 0 {
                            return Err("division by zero".to_string());
                        }
                        a / b
                    }
                    _ => unreachable!(),
                };
                stack.push(value);
            }
            Instruction::Sqrt => {
                let a = stack.pop().ok_or("stack underflow")?;
                stack.push((a as f64).sqrt() as i64);
            }
            Instruction::Jump(label) => pc = resolve(label)?,
            Instruction::JumpIf(condition, label) => {
                let b = stack.pop().ok_or("stack underflow")?;
                let a = stack.pop().ok_or("stack underflow")?;
                let taken = match condition {
                    Condition::Equal => a == b,
                    Condition::NotEqual => a != b,
                    Condition::Below => a < b,
                    Condition::BelowOrEqual => a <= b,
                    Condition::Above => a > b,
                    Condition::AboveOrEqual => a >= b,
                };
                if taken {
                    pc = resolve(label)?;
                }
            }
            Instruction::Call(label) => {
                calls.push(pc);
                pc = resolve(label)?;
            }
            Instruction::Return => {
                pc = calls.pop().ok_or("return with an empty call stack")?;
            }
            Instruction::In => {
                let value = io.input.pop_front().ok_or("input exhausted")?;
                stack.push(value);
            }
            Instruction::Out => {
                let value = stack.pop().ok_or("stack underflow")?;
                io.output.push(value);
            }
            Instruction::Halt => return Ok(()),
        }
    }

    Err("step budget exhausted".to_string())
}

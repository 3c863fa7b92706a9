//! Assembly language parser and word encoder.
//!
//! Converts assembly source into machine words in four stages:
//!
//! 1. **Preprocess**: strip comments and blank lines, remember source lines
//! 2. **Labels & macros**: record `name:` labels, expand `la`, skip
//!    unsupported directives
//! 3. **Offset normalization**: resolve label operands and check every
//!    immediate against the 5-bit field
//! 4. **Encode**: emit literals and hand instructions to [`Isa::encode`]
//!
//! # Syntax
//!
//! ```text
//! label: mnemonic operand1, operand2, ...  # optional comment
//! ```
//!
//! - Mnemonics are case-insensitive (`add`, `BEQ`)
//! - Registers are `r0`..`r7`, optionally written `$r3`
//! - Numbers are signed decimal or `0x` hexadecimal
//! - Memory operands may be written `disp(base)`: `lw r1, -1(r2)`
//! - Commas between operands are optional
//! - `.word value` emits a literal word; `value` may be a label
//! - `la rX, label` loads the address of `label` (expands to four words)

use crate::machine::errors::{AsmError, Error, VMError};
use crate::machine::isa::{IMM_MAX, IMM_MIN, Isa, Operand, OperandKind, REGISTER_COUNT, Word};
use crate::{debug, error, warn};
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const WORD_DIRECTIVE: &str = ".word";
const LOAD_ADDRESS: &str = "la";
/// Directives that are recognized but produce no output.
const UNSUPPORTED_DIRECTIVES: [&str; 4] = [".org", ".orig", ".block", ".blkw"];
/// Accepted range of a `.word` literal (signed or unsigned 16-bit).
const WORD_MIN: i32 = -32768;
const WORD_MAX: i32 = 65535;

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(file: &str, source: &str, err: &AsmError) -> String {
    let line = err.line();
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {err}");
    let _ = writeln!(diag, " --> {file}:{line}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let indent = line_text.len() - line_text.trim_start().len();
        let width = line_text.trim().len().max(1);
        let _ = writeln!(diag, "     |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = write!(diag, "     | {}{}", " ".repeat(indent), "^".repeat(width));
    }

    diag
}

/// Line that survived preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceLine<'a> {
    /// 1-based line number in the original source.
    line: usize,
    text: &'a str,
}

/// A single statement after label extraction and macro expansion. Its index
/// in the statement list is its word address.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Statement {
    line: usize,
    mnemonic: String,
    operands: Vec<String>,
}

impl Statement {
    fn new(line: usize, mnemonic: &str, operands: &[&str]) -> Self {
        Self {
            line,
            mnemonic: mnemonic.to_string(),
            operands: operands.iter().map(|op| op.to_string()).collect(),
        }
    }
}

/// Statement whose operands are fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lowered {
    /// Word emitted as-is (`.word`, pseudo-ops).
    Literal(Word),
    Instruction {
        mnemonic: String,
        operands: Vec<Operand>,
    },
}

/// Label table built by the label pass.
#[derive(Debug, Default)]
struct AsmContext {
    labels: HashMap<String, usize>,
}

impl AsmContext {
    /// Registers a label at the given word address.
    fn define_label(&mut self, name: &str, address: usize, line: usize) -> Result<(), AsmError> {
        if self.labels.contains_key(name) {
            return Err(AsmError::DuplicateLabel {
                label: name.to_string(),
                line,
            });
        }
        self.labels.insert(name.to_string(), address);
        Ok(())
    }

    /// Resolves a label to its word address.
    fn resolve_label(&self, name: &str, line: usize) -> Result<usize, AsmError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| AsmError::UndefinedLabel {
                label: name.to_string(),
                line,
            })
    }
}

/// Two-pass assembler bound to an instruction set.
///
/// Holds no state between calls: assembling the same source twice yields the
/// same words.
#[derive(Debug, Clone, Copy)]
pub struct Assembler<'isa> {
    isa: &'isa Isa,
}

impl<'isa> Assembler<'isa> {
    pub fn new(isa: &'isa Isa) -> Self {
        Self { isa }
    }

    /// Assembles `source` into machine words.
    ///
    /// Fails on the first error; no partial output is produced.
    pub fn assemble(&self, source: &str) -> Result<Vec<Word>, AsmError> {
        let lines = preprocess(source);
        let (statements, ctx) = label_and_macro_pass(&lines)?;
        let lowered = self.normalize_offsets(&statements, &ctx)?;
        self.encode(&lowered)
    }

    /// Assembles `source`, logging a diagnostic that points at `name` on failure.
    pub fn assemble_named(&self, source: &str, name: &str) -> Result<Vec<Word>, AsmError> {
        match self.assemble(source) {
            Ok(words) => {
                debug!("assembled {} word(s) from {}", words.len(), name);
                Ok(words)
            }
            Err(err) => {
                error!("{}", render_assembly_diagnostic(name, source, &err));
                Err(err)
            }
        }
    }

    /// Stage 3: resolves label operands, rewrites `disp(base)` operands and
    /// range-checks every immediate.
    fn normalize_offsets(
        &self,
        statements: &[Statement],
        ctx: &AsmContext,
    ) -> Result<Vec<(usize, Lowered)>, AsmError> {
        let mut out = Vec::with_capacity(statements.len());

        for (index, stmt) in statements.iter().enumerate() {
            let line = stmt.line;

            if stmt.mnemonic == WORD_DIRECTIVE {
                let [token] = stmt.operands.as_slice() else {
                    return Err(AsmError::ArityMismatch {
                        mnemonic: WORD_DIRECTIVE.to_string(),
                        expected: 1,
                        actual: stmt.operands.len(),
                        line,
                    });
                };
                out.push((line, Lowered::Literal(resolve_word(token, ctx, line)?)));
                continue;
            }

            if stmt.operands.is_empty()
                && let Some(literal) = self.isa.pseudo_op(&stmt.mnemonic)
            {
                out.push((line, Lowered::Literal(literal)));
                continue;
            }

            let opcode =
                self.isa
                    .opcode(&stmt.mnemonic)
                    .ok_or_else(|| AsmError::UnrecognizedInstruction {
                        mnemonic: stmt.mnemonic.clone(),
                        line,
                    })?;
            let kinds = opcode.operand_kinds();
            let tokens = expand_displacement(kinds, &stmt.operands);

            if tokens.len() != kinds.len() {
                return Err(AsmError::ArityMismatch {
                    mnemonic: stmt.mnemonic.clone(),
                    expected: kinds.len(),
                    actual: tokens.len(),
                    line,
                });
            }

            let mut operands = Vec::with_capacity(kinds.len());
            for (token, kind) in tokens.iter().zip(kinds) {
                let operand = match kind {
                    OperandKind::Reg => Operand::Reg(parse_reg(token).ok_or_else(|| {
                        AsmError::ExpectedRegister {
                            token: token.to_string(),
                            line,
                        }
                    })?),
                    OperandKind::PcRel => {
                        let offset = match parse_number(token) {
                            Some(value) => value,
                            None => {
                                let target = resolve_symbol(token, ctx, line)?;
                                target as i32 - index as i32 - 1
                            }
                        };
                        Operand::Imm(check_immediate(offset, line)?)
                    }
                    OperandKind::Imm | OperandKind::Disp => {
                        let value = match parse_number(token) {
                            Some(value) => value,
                            None => resolve_symbol(token, ctx, line)? as i32,
                        };
                        Operand::Imm(check_immediate(value, line)?)
                    }
                };
                operands.push(operand);
            }

            out.push((
                line,
                Lowered::Instruction {
                    mnemonic: stmt.mnemonic.clone(),
                    operands,
                },
            ));
        }

        Ok(out)
    }

    /// Stage 4: emits one word per lowered statement.
    fn encode(&self, lowered: &[(usize, Lowered)]) -> Result<Vec<Word>, AsmError> {
        lowered
            .iter()
            .map(|(line, item)| match item {
                Lowered::Literal(word) => Ok(*word),
                Lowered::Instruction { mnemonic, operands } => self
                    .isa
                    .encode(mnemonic, operands)
                    .map_err(|err| err.at(*line)),
            })
            .collect()
    }
}

/// Stage 1: strips comments and surrounding whitespace, drops empty lines.
fn preprocess(source: &str) -> Vec<SourceLine<'_>> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let code = match raw.split_once(COMMENT_CHAR) {
                Some((code, _)) => code,
                None => raw,
            };
            let text = code.trim();
            (!text.is_empty()).then_some(SourceLine { line: i + 1, text })
        })
        .collect()
}

/// Stage 2: records labels, expands `la` and drops unsupported directives.
///
/// A label binds to the address of the next emitted statement, so labels on
/// their own line or on a skipped directive point at whatever follows.
fn label_and_macro_pass(lines: &[SourceLine<'_>]) -> Result<(Vec<Statement>, AsmContext), AsmError> {
    let mut ctx = AsmContext::default();
    let mut statements = Vec::with_capacity(lines.len());

    for source_line in lines {
        let line = source_line.line;
        let mut rest = source_line.text;

        if let Some((label, after)) = split_label(rest) {
            if let Some((second, _)) = split_label(after) {
                return Err(AsmError::DuplicateLabel {
                    label: second.to_string(),
                    line,
                });
            }
            ctx.define_label(label, statements.len(), line)?;
            rest = after;
        }

        if rest.is_empty() {
            continue;
        }

        let (mnemonic, tail) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        let mnemonic = mnemonic.to_ascii_lowercase();
        let operands = tokenize_operands(tail);

        if UNSUPPORTED_DIRECTIVES.contains(&mnemonic.as_str()) {
            warn!("line {line}: directive `{mnemonic}` is not supported, skipping");
            continue;
        }

        if mnemonic == LOAD_ADDRESS {
            let [reg, symbol] = operands.as_slice() else {
                return Err(AsmError::ArityMismatch {
                    mnemonic,
                    expected: 2,
                    actual: operands.len(),
                    line,
                });
            };
            statements.extend(expand_load_address(line, reg, symbol));
            continue;
        }

        statements.push(Statement::new(line, &mnemonic, &operands));
    }

    Ok((statements, ctx))
}

/// Expands `la reg, symbol` into a skip branch, a literal-pool word holding
/// the address and a `lea`/`lw` pair that loads it.
fn expand_load_address(line: usize, reg: &str, symbol: &str) -> [Statement; 4] {
    [
        Statement::new(line, "beq", &["r0", "r0", "1"]),
        Statement::new(line, WORD_DIRECTIVE, &[symbol]),
        Statement::new(line, "lea", &[reg, "-2"]),
        Statement::new(line, "lw", &[reg, reg, "0"]),
    ]
}

/// Splits a leading `name:` label off a line.
fn split_label(text: &str) -> Option<(&str, &str)> {
    let (name, rest) = text.split_once(LABEL_SUFFIX)?;
    is_label_name(name).then(|| (name, rest.trim()))
}

/// Label names start with a letter, `_` or `.` and continue with
/// alphanumerics, `_` or `.`.
fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Splits an operand list on commas and whitespace.
fn tokenize_operands(tail: &str) -> Vec<&str> {
    tail.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .collect()
}

/// Rewrites `ra, disp(base)` into `ra, base, disp` for memory instructions.
fn expand_displacement<'a>(kinds: &[OperandKind], operands: &'a [String]) -> Vec<&'a str> {
    let mut tokens: Vec<&str> = operands.iter().map(String::as_str).collect();
    if kinds.last() == Some(&OperandKind::Disp)
        && tokens.len() + 1 == kinds.len()
        && let Some(last) = tokens.pop()
    {
        match split_displacement(last) {
            Some((disp, base)) => {
                tokens.push(base);
                tokens.push(disp);
            }
            None => tokens.push(last),
        }
    }
    tokens
}

/// Parses `disp(base)`; an empty displacement means zero.
fn split_displacement(token: &str) -> Option<(&str, &str)> {
    let (disp, rest) = token.split_once('(')?;
    let base = rest.strip_suffix(')')?.trim();
    let disp = disp.trim();
    Some((if disp.is_empty() { "0" } else { disp }, base))
}

/// Parses a register token like `r3`, `R3` or `$r3`.
pub(crate) fn parse_reg(token: &str) -> Option<u8> {
    let token = token.strip_prefix('$').unwrap_or(token);
    let index = token
        .strip_prefix('r')
        .or_else(|| token.strip_prefix('R'))?
        .parse::<u8>()
        .ok()?;
    ((index as usize) < REGISTER_COUNT).then_some(index)
}

/// Parses a signed decimal or `0x` hexadecimal literal.
pub(crate) fn parse_number(token: &str) -> Option<i32> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            i32::from_str_radix(hex, 16).ok()?
        }
        None if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse::<i32>().ok()?
        }
        _ => return None,
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Resolves a non-numeric operand as a label reference.
fn resolve_symbol(token: &str, ctx: &AsmContext, line: usize) -> Result<usize, AsmError> {
    if is_label_name(token) && parse_reg(token).is_none() {
        ctx.resolve_label(token, line)
    } else {
        Err(AsmError::NotANumber {
            token: token.to_string(),
            line,
        })
    }
}

fn check_immediate(value: i32, line: usize) -> Result<i32, AsmError> {
    if (IMM_MIN..=IMM_MAX).contains(&value) {
        Ok(value)
    } else {
        Err(AsmError::OffsetTooLarge {
            offset: value,
            line,
        })
    }
}

/// Resolves the operand of a `.word` directive.
fn resolve_word(token: &str, ctx: &AsmContext, line: usize) -> Result<Word, AsmError> {
    match parse_number(token) {
        Some(value) if (WORD_MIN..=WORD_MAX).contains(&value) => Ok(value as Word),
        Some(_) => Err(AsmError::NotANumber {
            token: token.to_string(),
            line,
        }),
        None => Ok(resolve_symbol(token, ctx, line)? as Word),
    }
}

/// Assembles a source string with a fresh standard instruction set.
pub fn assemble_source(source: &str) -> Result<Vec<Word>, AsmError> {
    Assembler::new(&Isa::new()).assemble(source)
}

/// Convenience: assemble directly from a file path.
///
/// Logs a compiler-style diagnostic pointing at the failing line.
pub fn assemble_file<P: AsRef<Path>>(isa: &Isa, path: P) -> Result<Vec<Word>, Error> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: path_ref.display().to_string(),
        source: e.to_string(),
    })?;
    let words = Assembler::new(isa).assemble_named(&source, &path_ref.display().to_string())?;
    Ok(words)
}

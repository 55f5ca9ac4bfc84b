use std::io::Write;

use itertools::Itertools;

use crate::parser::ParseResult;
use crate::trace;
use crate::vm::cell::{Cell, CELL_SIZE};
use crate::vm::error::{Panic, PanicKind};
use crate::vm::opcode::Opcode;

pub mod cell;
pub mod error;
pub mod opcode;

mod operator;

/// Fixed slots at the head of every environment frame. The stack occupies the
/// tail of the frame, starting at `FRAME_HEADER`, and grows by extending the
/// frame's length.
const FRAME_PARENT: u32 = 0;
const FRAME_NODE: u32 = 1;
const FRAME_ARGS: u32 = 2;
const FRAME_STACK: u32 = 3;
const FRAME_TRAP: u32 = 4;
const FRAME_HEADER: u32 = 5;

/// Cells reserved past the code image for frame storage.
pub const STACK_HEADROOM: usize = 1024;

/// Lists deeper than this render as `(<len>:0x<ptr>)` in the debug format.
const RENDER_DEPTH: usize = 3;
/// Lists longer than this render their first elements followed by `...`.
const RENDER_WIDTH: u32 = 11;


/// The interpreter's single contiguous memory buffer, addressed in 9-byte
/// cells. Cell `i` occupies bytes `[9i, 9i + 9)`; there is no other structure.
pub struct Arena {
    mem: Vec<u8>,
}

impl Arena {

    fn new(cells: usize) -> Arena {
        Arena { mem: vec![0; cells * CELL_SIZE] }
    }

    pub fn capacity(&self) -> u32 {
        (self.mem.len() / CELL_SIZE) as u32
    }

    pub fn read(&self, index: u32) -> Cell {
        let at: usize = index as usize * CELL_SIZE;
        Cell::decode(self.mem[at..at + CELL_SIZE].try_into().unwrap())
    }

    pub fn write(&mut self, index: u32, cell: Cell) {
        let at: usize = index as usize * CELL_SIZE;
        self.mem[at..at + CELL_SIZE].copy_from_slice(&cell.encode());
    }
}


/// How a run ended: a clean halt (the root frame returned), or a panic.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ExitType {
    Halt,
    Panic(Panic),
}


/// The step evaluator. All state lives in the arena: the code image at the
/// front, and a chain of environment frames in the headroom past it. Each
/// frame is a list of length `5 + stack` whose fixed slots are
/// `[parent, node, args, stack, trap]`; recursion into a child expression is
/// reified as a new frame at the current frame's top, so no native call stack
/// is consumed no matter how deep the program nests.
///
/// `W` receives the output of the `debug` opcode and the frame dumps.
pub struct VirtualMachine<W> {
    arena: Arena,
    env_ptr: u32,
    env_len: u32,

    halted: bool,
    panic: Option<Panic>,
    result: Option<Cell>,

    write: W,
}

impl<W> VirtualMachine<W> where W : Write {

    /// Deposits the code image at the front of a fresh arena and seeds the
    /// root frame just past it. The root frame's args are the entire arena,
    /// and its parent is the null list, which marks it as terminal.
    pub fn new(image: ParseResult, write: W) -> VirtualMachine<W> {
        let code_cells: usize = image.cells.len();
        let mut arena: Arena = Arena::new(code_cells + STACK_HEADROOM);
        for (i, cell) in image.cells.iter().enumerate() {
            arena.write(i as u32, *cell);
        }

        let mut vm: VirtualMachine<W> = VirtualMachine {
            arena,
            env_ptr: code_cells as u32,
            env_len: 0,
            halted: false,
            panic: None,
            result: None,
            write,
        };

        let args: Cell = Cell::List { ptr: 0, len: vm.arena.capacity() };
        vm.begin(image.root, args, Cell::NULL).expect("the headroom always fits the root frame");
        vm.arena.write(vm.env_ptr + FRAME_PARENT, Cell::NULL);
        vm
    }

    pub fn run_until_completion(&mut self) -> ExitType {
        while !self.halted {
            self.step();
        }
        match self.panic {
            Some(panic) => ExitType::Panic(panic),
            None => ExitType::Halt,
        }
    }

    /// Performs exactly one evaluation event: a literal push, the launch of
    /// one child frame, or one opcode reduction ending in a return. On error
    /// the panic register is set and the machine halts.
    pub fn step(&mut self) {
        if self.halted {
            return;
        }
        if let Err(kind) = self.step_inner() {
            self.panic = Some(Panic { kind, node: self.slot(FRAME_NODE) });
            self.halted = true;
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn panic(&self) -> Option<Panic> {
        self.panic
    }

    /// The value returned by the top-level expression, once halted cleanly.
    pub fn result(&self) -> Option<Cell> {
        self.result
    }

    /// The current frame as a list cell.
    pub fn frame(&self) -> Cell {
        Cell::List { ptr: self.env_ptr, len: self.env_len }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    // ===== Environment Frames ===== //

    fn slot(&self, slot: u32) -> Cell {
        self.arena.read(self.env_ptr + slot)
    }

    fn stack_len(&self) -> u32 {
        self.env_len - FRAME_HEADER
    }

    fn stack_get(&self, i: u32) -> Cell {
        self.arena.read(self.env_ptr + FRAME_HEADER + i)
    }

    /// The current frame's stack as a list cell, aliasing the frame tail.
    fn stack_alias(&self) -> Cell {
        Cell::List { ptr: self.env_ptr + FRAME_HEADER, len: self.stack_len() }
    }

    /// Extends the current frame by one cell and writes `value` at the new
    /// tail, keeping the stack slot in sync.
    fn push(&mut self, value: Cell) -> Result<(), PanicKind> {
        trace::trace_interpreter!("push {:?}", value);
        let top: u32 = self.env_ptr + self.env_len;
        if top as u64 + 1 > self.arena.capacity() as u64 {
            return Err(PanicKind::OutOfMemory);
        }
        self.arena.write(top, value);
        self.env_len += 1;
        self.arena.write(self.env_ptr + FRAME_STACK, self.stack_alias());
        Ok(())
    }

    fn pop(&mut self, n: u32) {
        trace::trace_interpreter!("pop {}", n);
        self.env_len -= n;
        self.arena.write(self.env_ptr + FRAME_STACK, self.stack_alias());
    }

    /// Publishes a new frame at the current frame's top and makes it current.
    /// Frame storage is never reclaimed; a deep chain of live frames is the
    /// only way the arena fills up.
    fn begin(&mut self, node: Cell, args: Cell, trap: Cell) -> Result<(), PanicKind> {
        let top: u32 = self.env_ptr + self.env_len;
        if top as u64 + FRAME_HEADER as u64 > self.arena.capacity() as u64 {
            return Err(PanicKind::OutOfMemory);
        }
        trace::trace_interpreter!("begin frame at {} node {:?}", top, node);
        self.arena.write(top + FRAME_PARENT, self.frame());
        self.arena.write(top + FRAME_NODE, node);
        self.arena.write(top + FRAME_ARGS, args);
        self.arena.write(top + FRAME_STACK, Cell::List { ptr: top + FRAME_HEADER, len: 0 });
        self.arena.write(top + FRAME_TRAP, trap);
        self.env_ptr = top;
        self.env_len = FRAME_HEADER;
        Ok(())
    }

    /// Pops the current frame and pushes `value` onto the parent's stack. A
    /// zero-length parent is the terminal marker: the value is recorded as
    /// the run's result and the machine halts.
    fn ret(&mut self, value: Cell) -> Result<(), PanicKind> {
        trace::trace_interpreter!("return {:?}", value);
        let (ptr, len) = match self.slot(FRAME_PARENT) {
            Cell::List { ptr, len } => (ptr, len),
            Cell::Num(_) => return Err(PanicKind::BadNode),
        };
        // A frame parent is a list over the parent's region; anything else
        // means the program clobbered frame storage through its args view.
        if ptr as u64 + len as u64 > self.arena.capacity() as u64 || (len != 0 && len < FRAME_HEADER) {
            return Err(PanicKind::BadNode);
        }
        self.env_ptr = ptr;
        self.env_len = len;
        if len == 0 {
            self.result = Some(value);
            self.halted = true;
            return Ok(());
        }
        self.push(value)
    }

    /// One evaluation event for a single cell: lists recurse into a child
    /// frame inheriting the current args and trap, numbers push directly.
    fn eval(&mut self, cell: Cell) -> Result<(), PanicKind> {
        match cell {
            Cell::List { .. } => {
                let args: Cell = self.slot(FRAME_ARGS);
                let trap: Cell = self.slot(FRAME_TRAP);
                self.begin(cell, args, trap)
            },
            Cell::Num(_) => self.push(cell),
        }
    }

    /// Left-to-right eager evaluation of operands: while the stack holds
    /// fewer results than there are parameters, launch the next one and
    /// report that this step's event is spent.
    fn eval_operands(&mut self, params_ptr: u32, params_len: u32) -> Result<bool, PanicKind> {
        let n: u32 = self.stack_len();
        if n < params_len {
            let param: Cell = self.arena.read(params_ptr + n);
            self.eval(param)?;
            return Ok(true);
        }
        Ok(false)
    }

    // ===== Dispatch ===== //

    fn step_inner(&mut self) -> Result<(), PanicKind> {
        let (node_ptr, node_len) = match self.slot(FRAME_NODE) {
            Cell::List { ptr, len } if len >= 1 => (ptr, len),
            _ => return Err(PanicKind::BadNode),
        };
        let opc: i64 = match self.arena.read(node_ptr) {
            Cell::Num(opc) => opc,
            Cell::List { .. } => return Err(PanicKind::InvalidOpc),
        };
        let op: Opcode = Opcode::from_num(opc).ok_or(PanicKind::InvalidOpc)?;

        let params: u32 = node_ptr + 1;
        let nparams: u32 = node_len - 1;

        trace::trace_interpreter!("step {:?} stack {}", op, self.stack_len());

        if op.is_numeric_binary() {
            check_arity(nparams, 2)?;
            if self.eval_operands(params, nparams)? {
                return Ok(());
            }
            let a: i64 = expect_num(self.stack_get(0))?;
            let b: i64 = expect_num(self.stack_get(1))?;
            return self.ret(Cell::Num(operator::binary(op, a, b)?));
        }

        match op {
            Opcode::Quote => {
                check_arity(nparams, 1)?;
                let ret: Cell = self.arena.read(params);
                self.ret(ret)
            },

            Opcode::Do => {
                if nparams == 0 {
                    return Err(PanicKind::BadNodeParams);
                }
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let ret: Cell = self.stack_get(self.stack_len() - 1);
                self.ret(ret)
            },

            // The first n params are binds, evaluated eagerly; the last is
            // the body, begun as a fresh frame whose args are the bind
            // results (the current stack, aliased in place). The body's
            // return lands on this stack and is returned in turn.
            Opcode::Let => {
                if nparams == 0 {
                    return Err(PanicKind::BadNodeParams);
                }
                let nbinds: u32 = nparams - 1;
                if self.eval_operands(params, nbinds)? {
                    return Ok(());
                }
                if self.stack_len() == nbinds {
                    let body: Cell = self.arena.read(params + nbinds);
                    let args: Cell = self.stack_alias();
                    self.begin(body, args, Cell::NULL)
                } else {
                    let ret: Cell = self.stack_get(self.stack_len() - 1);
                    self.ret(ret)
                }
            },

            Opcode::Get => {
                check_arity(nparams, 1)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let index: i64 = expect_num(self.stack_get(0))?;
                let ret: Cell = self.list_get(self.slot(FRAME_ARGS), index)?;
                self.ret(ret)
            },

            Opcode::Set => {
                check_arity(nparams, 2)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let index: i64 = expect_num(self.stack_get(0))?;
                let value: Cell = self.stack_get(1);
                self.list_set(self.slot(FRAME_ARGS), index, value)?;
                self.ret(value)
            },

            Opcode::Not => {
                check_arity(nparams, 1)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let a: i64 = expect_num(self.stack_get(0))?;
                self.ret(Cell::Num(operator::unary_not(a)))
            },

            Opcode::Eq | Opcode::NotEq => {
                check_arity(nparams, 2)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let equal: bool = match (self.stack_get(0), self.stack_get(1)) {
                    (Cell::Num(a), Cell::Num(b)) => a == b,
                    // List equality is identity over the arena view, not structure
                    (Cell::List { ptr: a_ptr, len: a_len }, Cell::List { ptr: b_ptr, len: b_len }) => a_ptr == b_ptr && a_len == b_len,
                    _ => return Err(PanicKind::TypeError),
                };
                self.ret(Cell::Num((equal == (op == Opcode::Eq)) as i64))
            },

            Opcode::Eval => {
                check_arity(nparams, 1)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                if self.stack_len() == 1 {
                    let value: Cell = self.stack_get(0);
                    self.eval(value)
                } else {
                    let ret: Cell = self.stack_get(1);
                    self.ret(ret)
                }
            },

            // Stage machine, discriminated by how far the stack has grown
            // past the eagerly evaluated params: 0 = evaluate the condition
            // expression, 1 = pick a branch by its truthiness, 2 = return the
            // branch's result.
            Opcode::Cond => {
                check_arity(nparams, 3)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                match self.stack_len() - nparams {
                    0 => {
                        let condition: Cell = self.arena.read(params);
                        self.eval(condition)
                    },
                    1 => {
                        let branch: u32 = if self.stack_get(nparams).as_bool() { 1 } else { 2 };
                        let body: Cell = self.arena.read(params + branch);
                        self.eval(body)
                    },
                    _ => {
                        let ret: Cell = self.stack_get(nparams + 1);
                        self.ret(ret)
                    },
                }
            },

            // Same shape as `cond`, but stage 2 discards the condition and
            // body results and falls back to stage 0, re-evaluating the
            // condition expression each iteration. A false condition returns
            // the null list.
            Opcode::Loop => {
                check_arity(nparams, 2)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                match self.stack_len() - nparams {
                    0 => {
                        let condition: Cell = self.arena.read(params);
                        self.eval(condition)
                    },
                    1 => {
                        if self.stack_get(nparams).as_bool() {
                            let body: Cell = self.arena.read(params + 1);
                            self.eval(body)
                        } else {
                            self.ret(Cell::NULL)
                        }
                    },
                    _ => {
                        self.pop(2);
                        Ok(())
                    },
                }
            },

            Opcode::Debug => {
                check_arity(nparams, 1)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let value: Cell = self.stack_get(0);
                let text: String = self.render(value);
                self.println(text);
                self.ret(value)
            },

            Opcode::Len => {
                check_arity(nparams, 1)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let (_, len) = expect_list(self.stack_get(0))?;
                self.ret(Cell::Num(len as i64))
            },

            Opcode::GetList => {
                check_arity(nparams, 2)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let list: Cell = self.stack_get(0);
                let index: i64 = expect_num(self.stack_get(1))?;
                let ret: Cell = self.list_get(list, index)?;
                self.ret(ret)
            },

            Opcode::SetList => {
                check_arity(nparams, 3)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let list: Cell = self.stack_get(0);
                let index: i64 = expect_num(self.stack_get(1))?;
                let value: Cell = self.stack_get(2);
                self.list_set(list, index, value)?;
                self.ret(value)
            },

            Opcode::Sublist => {
                check_arity(nparams, 3)?;
                if self.eval_operands(params, nparams)? {
                    return Ok(());
                }
                let (ptr, len) = expect_list(self.stack_get(0))?;
                let a: i64 = expect_num(self.stack_get(1))?;
                let b: i64 = expect_num(self.stack_get(2))?;
                if a < 0 || a > b || b > len as i64 {
                    return Err(PanicKind::OutOfBounds);
                }
                self.ret(Cell::List { ptr: ptr + a as u32, len: (b - a) as u32 })
            },

            // Reserved in the keyword table, never implemented
            Opcode::Intersect => Err(PanicKind::InvalidOpc),

            op => panic!("Opcode {:?} must be handled by the numeric binary group", op),
        }
    }

    // ===== List Access ===== //

    fn list_get(&self, list: Cell, index: i64) -> Result<Cell, PanicKind> {
        let (ptr, len) = expect_list(list)?;
        if index < 0 || index >= len as i64 {
            return Err(PanicKind::OutOfBounds);
        }
        Ok(self.arena.read(ptr + index as u32))
    }

    fn list_set(&mut self, list: Cell, index: i64, value: Cell) -> Result<(), PanicKind> {
        let (ptr, len) = expect_list(list)?;
        if index < 0 || index >= len as i64 {
            return Err(PanicKind::OutOfBounds);
        }
        self.arena.write(ptr + index as u32, value);
        Ok(())
    }

    // ===== Output ===== //

    /// The debug print format: numbers in decimal, lists parenthesized and
    /// space-separated, collapsing to `(<len>:0x<ptr>)` at depth 3 and
    /// truncating with `...` past 11 elements.
    pub fn render(&self, cell: Cell) -> String {
        self.render_depth(cell, 1)
    }

    fn render_depth(&self, cell: Cell, depth: usize) -> String {
        match cell {
            Cell::Num(value) => format!("{}", value),
            Cell::List { ptr, len } if depth >= RENDER_DEPTH => format!("({}:0x{:x})", len, ptr),
            Cell::List { ptr, len } => {
                let mut parts: Vec<String> = (0..len.min(RENDER_WIDTH))
                    .map(|i| self.render_depth(self.arena.read(ptr + i), depth + 1))
                    .collect();
                if len > RENDER_WIDTH {
                    parts.push(String::from("..."));
                }
                format!("({})", parts.iter().join(" "))
            },
        }
    }

    /// Prints the current frame's node, args and stack, one per line.
    pub fn dump_frame(&mut self) {
        let text: String = format!(
            "NODE: {}\nARGS: {}\nSTACK: {}",
            self.render(self.slot(FRAME_NODE)),
            self.render(self.slot(FRAME_ARGS)),
            self.render(self.stack_alias()),
        );
        self.println(text);
    }

    pub fn println(&mut self, text: String) {
        writeln!(&mut self.write, "{}", text).unwrap();
    }

    pub fn print(&mut self, text: String) {
        write!(&mut self.write, "{}", text).unwrap();
        self.write.flush().unwrap();
    }
}


fn check_arity(nparams: u32, expected: u32) -> Result<(), PanicKind> {
    if nparams == expected {
        Ok(())
    } else {
        Err(PanicKind::BadNodeParams)
    }
}

fn expect_num(cell: Cell) -> Result<i64, PanicKind> {
    match cell {
        Cell::Num(value) => Ok(value),
        Cell::List { .. } => Err(PanicKind::TypeError),
    }
}

fn expect_list(cell: Cell) -> Result<(u32, u32), PanicKind> {
    match cell {
        Cell::List { ptr, len } => Ok((ptr, len)),
        Cell::Num(_) => Err(PanicKind::TypeError),
    }
}


#[cfg(test)]
mod test {
    use crate::parser;
    use crate::vm::{ExitType, VirtualMachine, FRAME_HEADER, FRAME_PARENT};
    use crate::vm::cell::Cell;
    use crate::vm::error::PanicKind;

    #[test] fn test_add() { run_str("(debug (+ 1 2))", "3\n"); }
    #[test] fn test_sub() { run_str("(debug (- 1 2))", "-1\n"); }
    #[test] fn test_mul() { run_str("(debug (* 6 7))", "42\n"); }
    #[test] fn test_div_truncates() { run_str("(debug (/ -7 2))", "-3\n"); }
    #[test] fn test_rem_keeps_sign() { run_str("(debug (remainder -7 3))", "-1\n"); }
    #[test] fn test_mod_euclidean() { run_str("(debug (% -7 3))", "2\n"); }
    #[test] fn test_bitwise() { run_str("(debug (xor (and 12 10) (or 1 2)))", "11\n"); }
    #[test] fn test_not() { run_str("(debug (not 0))", "-1\n"); }
    #[test] fn test_comparisons() { run_str("(debug (+ (<= 3 3) (< 3 3)))", "1\n"); }
    #[test] fn test_nested_operands() { run_str("(debug (+ (* 2 3) (- 10 4)))", "12\n"); }

    #[test] fn test_eq_num() { run_str("(debug (= 2 2))", "1\n"); }
    #[test] fn test_neq_num() { run_str("(debug (!= 1 2))", "1\n"); }
    #[test] fn test_neq_num_equal() { run_str("(debug (!= 2 2))", "0\n"); }

    #[test] fn test_quote_number() { run_str("(debug (quote 42))", "42\n"); }
    #[test] fn test_quote_list() { run_str("(debug (quote (1 2 3)))", "(1 2 3)\n"); }
    #[test] fn test_quote_empty_list() { run_str("(debug (quote ()))", "()\n"); }

    #[test] fn test_do_returns_last() { run_str("(debug (do 1 2 3))", "3\n"); }
    #[test] fn test_do_evaluates_in_order() { run_str("(do (debug 1) (debug 2))", "1\n2\n"); }

    #[test] fn test_let_binds() { run_str("(debug (let 10 20 (+ (get 0) (get 1))))", "30\n"); }
    #[test] fn test_let_no_binds() { run_str("(debug (let (+ 1 2)))", "3\n"); }
    #[test] fn test_let_set_get() { run_str("(debug (let 1 2 (do (set 0 42) (get 0))))", "42\n"); }
    #[test] fn test_set_returns_value() { run_str("(debug (let 0 (set 0 9)))", "9\n"); }
    #[test] fn test_left_to_right() { run_str("(debug (let 0 (+ (set 0 5) (get 0))))", "10\n"); }

    #[test] fn test_eval_list() { run_str("(debug (eval (quote (+ 1 2))))", "3\n"); }
    #[test] fn test_eval_number() { run_str("(debug (eval 7))", "7\n"); }

    #[test] fn test_cond_true() { run_str("(debug (cond (< 3 5) (quote 1) (quote 2)))", "1\n"); }
    #[test] fn test_cond_false() { run_str("(debug (cond (< 5 3) (quote 1) (quote 2)))", "2\n"); }
    // Both branches are evaluated eagerly before the condition picks one
    #[test] fn test_cond_evaluates_both_branches() { run_str("(debug (let 0 (do (cond 0 (set 0 7) 3) (get 0))))", "7\n"); }

    #[test] fn test_loop_counts() { run_str("(debug (let 0 (do (loop (< (get 0) 5) (set 0 (+ (get 0) 1))) (get 0))))", "5\n"); }
    #[test] fn test_loop_false_returns_null() { run_str("(debug (loop 0 1))", "()\n"); }

    #[test] fn test_llen() { run_str("(debug (# (quote (1 2 3 4))))", "4\n"); }
    #[test] fn test_getl() { run_str("(debug (getl (quote (10 20 30)) 1))", "20\n"); }
    #[test] fn test_setl_returns_value() { run_str("(debug (setl (quote (1 2 3)) 0 9))", "9\n"); }
    #[test] fn test_setl_mutates_in_place() { run_str("(let (quote (1 2 3)) (do (setl (get 0) 1 42) (debug (get 0))))", "(1 42 3)\n"); }
    #[test] fn test_sublist() { run_str("(debug (sublist (quote (10 20 30 40)) 1 3))", "(20 30)\n"); }
    #[test] fn test_sublist_empty() { run_str("(debug (sublist (quote (10 20)) 2 2))", "()\n"); }

    // The root frame's args are the whole arena, so a top-level get reads the
    // first emitted code cell (the head of the innermost list, opcode 12)
    #[test] fn test_root_args_are_the_arena() { run_str("(debug (get 0))", "12\n"); }

    #[test] fn test_debug_depth_shorthand() { run_str("(debug (quote (1 (2 (3 4)))))", "(1 (2 (2:0x0)))\n"); }
    #[test] fn test_debug_truncation() { run_str("(debug (quote (1 2 3 4 5 6 7 8 9 10 11 12 13)))", "(1 2 3 4 5 6 7 8 9 10 11 ...)\n"); }

    #[test] fn test_list_equality_is_identity() { run_result("(= (quote (1 2)) (quote (1 2)))", Cell::Num(0)); }
    #[test] fn test_list_equality_same_slice() { run_result("(let (quote (1 2)) (= (get 0) (get 0)))", Cell::Num(1)); }
    #[test] fn test_result_without_debug() { run_result("(+ 20 22)", Cell::Num(42)); }

    #[test] fn test_panic_type_error_add() { run_panic("(+ 1 (quote (1)))", PanicKind::TypeError); }
    #[test] fn test_panic_type_error_llen() { run_panic("(# 5)", PanicKind::TypeError); }
    #[test] fn test_panic_type_error_mixed_eq() { run_panic("(= 1 (quote (1)))", PanicKind::TypeError); }
    #[test] fn test_panic_div_by_zero() { run_panic("(/ 1 0)", PanicKind::TypeError); }
    #[test] fn test_panic_rem_by_zero() { run_panic("(remainder 1 0)", PanicKind::TypeError); }
    #[test] fn test_panic_getl_out_of_bounds() { run_panic("(getl (quote (1 2)) 5)", PanicKind::OutOfBounds); }
    #[test] fn test_panic_getl_negative_index() { run_panic("(getl (quote (1 2)) (- 0 1))", PanicKind::OutOfBounds); }
    #[test] fn test_panic_sublist_out_of_bounds() { run_panic("(sublist (quote (1 2)) 1 3)", PanicKind::OutOfBounds); }
    #[test] fn test_panic_sublist_reversed() { run_panic("(sublist (quote (1 2)) 2 1)", PanicKind::OutOfBounds); }
    #[test] fn test_panic_get_out_of_bounds() { run_panic("(let 1 (get 5))", PanicKind::OutOfBounds); }
    #[test] fn test_panic_unknown_keyword() { run_panic("(frobnicate 1 2)", PanicKind::InvalidOpc); }
    #[test] fn test_panic_intersect_reserved() { run_panic("(intersect (quote (1)) (quote (1)))", PanicKind::InvalidOpc); }
    #[test] fn test_panic_list_head() { run_panic("((quote 1) 2)", PanicKind::InvalidOpc); }
    #[test] fn test_panic_number_root() { run_panic("42", PanicKind::BadNode); }
    #[test] fn test_panic_empty_root() { run_panic("()", PanicKind::BadNode); }
    #[test] fn test_panic_eval_arity() { run_panic("(eval 1 2)", PanicKind::BadNodeParams); }
    #[test] fn test_panic_eval_no_params() { run_panic("(eval)", PanicKind::BadNodeParams); }
    #[test] fn test_panic_quote_no_params() { run_panic("(quote)", PanicKind::BadNodeParams); }
    #[test] fn test_panic_do_no_params() { run_panic("(do)", PanicKind::BadNodeParams); }
    #[test] fn test_panic_binary_arity() { run_panic("(+ 1 2 3)", PanicKind::BadNodeParams); }

    #[test]
    fn test_panic_out_of_memory() {
        // Each nesting level holds a live frame, so this overruns the frame
        // headroom long before it finishes
        let depth: usize = 400;
        let source: String = format!("{}1{}", "(do ".repeat(depth), ")".repeat(depth));
        run_panic(&source, PanicKind::OutOfMemory);
    }

    #[test]
    fn test_deterministic() {
        let source: &str = "(debug (let 0 (do (loop (< (get 0) 3) (set 0 (+ (get 0) 1))) (get 0))))";
        assert_eq!(run(source), run(source));
    }

    #[test]
    fn test_frame_discipline() {
        let image = parser::parse("(+ (+ 1 2) (+ 3 4))").unwrap();
        let mut vm = VirtualMachine::new(image, Vec::new());
        while !vm.is_halted() {
            // Walking parent links always reaches the null list, and every
            // frame sits past its parent's header
            let mut frame: Cell = vm.frame();
            for _ in 0..100 {
                let (ptr, len) = match frame {
                    Cell::List { ptr, len } => (ptr, len),
                    cell => panic!("frame is not a list: {:?}", cell),
                };
                if len == 0 {
                    break;
                }
                assert!(len >= FRAME_HEADER);
                let parent: Cell = vm.arena().read(ptr + FRAME_PARENT);
                if let Cell::List { ptr: parent_ptr, len: parent_len } = parent {
                    if parent_len != 0 {
                        assert!(ptr >= parent_ptr + FRAME_HEADER);
                    }
                }
                frame = parent;
            }
            vm.step();
        }
        assert_eq!(Some(Cell::Num(10)), vm.result());
    }

    fn run(source: &str) -> (String, ExitType) {
        let image = parser::parse(source).unwrap();
        let mut buf: Vec<u8> = Vec::new();
        let exit: ExitType = {
            let mut vm = VirtualMachine::new(image, &mut buf);
            vm.run_until_completion()
        };
        (String::from_utf8(buf).unwrap(), exit)
    }

    fn run_str(source: &str, expected: &'static str) {
        let (output, exit) = run(source);
        assert_eq!(ExitType::Halt, exit);
        assert_eq!(expected, output.as_str());
    }

    fn run_result(source: &str, expected: Cell) {
        let image = parser::parse(source).unwrap();
        let mut vm = VirtualMachine::new(image, Vec::new());
        assert_eq!(ExitType::Halt, vm.run_until_completion());
        assert_eq!(Some(expected), vm.result());
    }

    fn run_panic(source: &str, expected: PanicKind) {
        let (_, exit) = run(source);
        match exit {
            ExitType::Panic(panic) => assert_eq!(expected, panic.kind),
            ExitType::Halt => panic!("expected a {:?} panic, got a clean halt", expected),
        }
    }
}

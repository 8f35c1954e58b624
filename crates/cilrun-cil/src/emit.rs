//! Label-based IL assembler
//!
//! [`BodyBuilder`] produces [`MethodBody`] values without a metadata image:
//! instructions are appended in order, branch targets are `Label`s patched
//! when the body is finished, and exception clauses are declared through
//! label pairs. Branches always use the long IL form; the transformer
//! downstream picks its own short/long internal encoding, so compact IL is
//! not a goal here.

use thiserror::Error;

use crate::body::{ClauseKind, IlClause, MethodBody};
use crate::il::{Instr, Token};

/// Assembly-time errors.
#[derive(Debug, Error)]
pub enum EmitError {
    /// A label was referenced but never placed.
    #[error("label {0} was never placed")]
    UnboundLabel(usize),
}

/// A forward-declarable position in the code stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Label(usize);

struct Fixup {
    /// Byte position of the i32 delta to patch.
    patch_at: usize,
    /// Offset the delta is relative to (start of the next instruction).
    base: u32,
    label: Label,
}

struct PendingClause {
    kind: ClauseKind,
    try_start: Label,
    try_end: Label,
    handler_start: Label,
    handler_end: Label,
    catch_type: Token,
    filter_start: Option<Label>,
}

/// Incremental IL method body assembler.
pub struct BodyBuilder {
    code: Vec<u8>,
    labels: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
    clauses: Vec<PendingClause>,
    max_stack: u16,
    init_locals: bool,
}

impl BodyBuilder {
    /// Start an empty body. `max_stack` defaults to 8, init-locals to true.
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            clauses: Vec::new(),
            max_stack: 8,
            init_locals: true,
        }
    }

    /// Declare the maximum evaluation stack depth.
    pub fn max_stack(&mut self, depth: u16) -> &mut Self {
        self.max_stack = depth;
        self
    }

    /// Set the init-locals header flag.
    pub fn init_locals(&mut self, init: bool) -> &mut Self {
        self.init_locals = init;
        self
    }

    /// Current IL offset.
    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    /// Append a non-branching instruction.
    ///
    /// Branch instructions must go through the label-taking helpers so
    /// their deltas get patched; passing one here would emit its dummy
    /// operand verbatim.
    pub fn op(&mut self, instr: Instr) -> &mut Self {
        instr.encode(&mut self.code);
        self
    }

    /// Create a new, not yet placed label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Place `label` at the current offset.
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.offset());
        self
    }

    /// Create a label already placed at the current offset.
    pub fn here(&mut self) -> Label {
        let l = self.label();
        self.place(l);
        l
    }

    fn branch(&mut self, instr: Instr, label: Label) -> &mut Self {
        instr.encode(&mut self.code);
        let end = self.code.len();
        self.fixups.push(Fixup {
            patch_at: end - 4,
            base: end as u32,
            label,
        });
        self
    }

    /// Unconditional branch.
    pub fn br(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::br(0), target)
    }

    /// Branch if the top of stack is zero.
    pub fn brfalse(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::brfalse(0), target)
    }

    /// Branch if the top of stack is non-zero.
    pub fn brtrue(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::brtrue(0), target)
    }

    /// Branch if equal.
    pub fn beq(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::beq(0), target)
    }

    /// Branch if greater or equal.
    pub fn bge(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::bge(0), target)
    }

    /// Branch if greater.
    pub fn bgt(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::bgt(0), target)
    }

    /// Branch if less or equal.
    pub fn ble(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::ble(0), target)
    }

    /// Branch if less.
    pub fn blt(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::blt(0), target)
    }

    /// Branch if unequal or unordered.
    pub fn bne_un(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::bne_un(0), target)
    }

    /// Branch if greater or equal, unsigned or unordered.
    pub fn bge_un(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::bge_un(0), target)
    }

    /// Branch if greater, unsigned or unordered.
    pub fn bgt_un(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::bgt_un(0), target)
    }

    /// Branch if less or equal, unsigned or unordered.
    pub fn ble_un(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::ble_un(0), target)
    }

    /// Branch if less, unsigned or unordered.
    pub fn blt_un(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::blt_un(0), target)
    }

    /// Exit a protected region toward `target`.
    pub fn leave(&mut self, target: Label) -> &mut Self {
        self.branch(Instr::leave(0), target)
    }

    /// Jump table over the int32 on the stack.
    pub fn switch(&mut self, targets: &[Label]) -> &mut Self {
        Instr::switch(vec![0; targets.len()]).encode(&mut self.code);
        let end = self.code.len();
        for (i, label) in targets.iter().enumerate() {
            self.fixups.push(Fixup {
                patch_at: end - 4 * (targets.len() - i),
                base: end as u32,
                label: *label,
            });
        }
        self
    }

    /// Declare a typed catch clause.
    pub fn catch_clause(
        &mut self,
        try_start: Label,
        try_end: Label,
        handler_start: Label,
        handler_end: Label,
        catch_type: Token,
    ) -> &mut Self {
        self.clauses.push(PendingClause {
            kind: ClauseKind::Catch,
            try_start,
            try_end,
            handler_start,
            handler_end,
            catch_type,
            filter_start: None,
        });
        self
    }

    /// Declare a filter clause; the filter range ends at `handler_start`.
    pub fn filter_clause(
        &mut self,
        try_start: Label,
        try_end: Label,
        filter_start: Label,
        handler_start: Label,
        handler_end: Label,
    ) -> &mut Self {
        self.clauses.push(PendingClause {
            kind: ClauseKind::Filter,
            try_start,
            try_end,
            handler_start,
            handler_end,
            catch_type: Token(0),
            filter_start: Some(filter_start),
        });
        self
    }

    /// Declare a finally clause.
    pub fn finally_clause(
        &mut self,
        try_start: Label,
        try_end: Label,
        handler_start: Label,
        handler_end: Label,
    ) -> &mut Self {
        self.clauses.push(PendingClause {
            kind: ClauseKind::Finally,
            try_start,
            try_end,
            handler_start,
            handler_end,
            catch_type: Token(0),
            filter_start: None,
        });
        self
    }

    /// Declare a fault clause.
    pub fn fault_clause(
        &mut self,
        try_start: Label,
        try_end: Label,
        handler_start: Label,
        handler_end: Label,
    ) -> &mut Self {
        self.clauses.push(PendingClause {
            kind: ClauseKind::Fault,
            try_start,
            try_end,
            handler_start,
            handler_end,
            catch_type: Token(0),
            filter_start: None,
        });
        self
    }

    fn resolve(&self, label: Label) -> Result<u32, EmitError> {
        self.labels[label.0].ok_or(EmitError::UnboundLabel(label.0))
    }

    /// Patch all branches, resolve clause ranges, and produce the body.
    pub fn finish(mut self) -> Result<MethodBody, EmitError> {
        for fixup in &self.fixups {
            let target = self.labels[fixup.label.0].ok_or(EmitError::UnboundLabel(fixup.label.0))?;
            let delta = target as i64 - fixup.base as i64;
            self.code[fixup.patch_at..fixup.patch_at + 4]
                .copy_from_slice(&(delta as i32).to_le_bytes());
        }

        let mut clauses = Vec::with_capacity(self.clauses.len());
        for c in &self.clauses {
            let try_offset = self.resolve(c.try_start)?;
            let try_end = self.resolve(c.try_end)?;
            let handler_offset = self.resolve(c.handler_start)?;
            let handler_end = self.resolve(c.handler_end)?;
            clauses.push(IlClause {
                kind: c.kind,
                try_offset,
                try_len: try_end - try_offset,
                handler_offset,
                handler_len: handler_end - handler_offset,
                catch_type: c.catch_type,
                filter_offset: match c.filter_start {
                    Some(l) => self.resolve(l)?,
                    None => 0,
                },
            });
        }

        Ok(MethodBody {
            max_stack: self.max_stack,
            init_locals: self.init_locals,
            code: self.code,
            clauses,
        })
    }
}

impl Default for BodyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::InstrIter;

    #[test]
    fn forward_branch_is_patched() {
        let mut b = BodyBuilder::new();
        let done = b.label();
        b.op(Instr::ldarg_0);
        b.brtrue(done);
        b.op(Instr::ldc_i4_0);
        b.op(Instr::ret);
        b.place(done);
        b.op(Instr::ldc_i4_1);
        b.op(Instr::ret);
        let body = b.finish().unwrap();

        let instrs: Vec<_> = InstrIter::new(&body.code).map(|(_, i)| i.unwrap()).collect();
        // brtrue delta skips ldc.i4.0 + ret (2 bytes).
        assert_eq!(instrs[1], Instr::brtrue(2));
    }

    #[test]
    fn backward_branch_is_negative() {
        let mut b = BodyBuilder::new();
        let top = b.here();
        b.op(Instr::nop);
        b.br(top);
        let body = b.finish().unwrap();
        let instrs: Vec<_> = InstrIter::new(&body.code).map(|(_, i)| i.unwrap()).collect();
        // br sits at offset 1, is 5 bytes long, targets offset 0.
        assert_eq!(instrs[1], Instr::br(-6));
    }

    #[test]
    fn switch_targets_resolve() {
        let mut b = BodyBuilder::new();
        let a = b.label();
        let c = b.label();
        b.op(Instr::ldarg_0);
        b.switch(&[a, c]);
        b.place(a);
        b.op(Instr::ldc_i4_0);
        b.op(Instr::ret);
        b.place(c);
        b.op(Instr::ldc_i4_1);
        b.op(Instr::ret);
        let body = b.finish().unwrap();
        let instrs: Vec<_> = InstrIter::new(&body.code).map(|(_, i)| i.unwrap()).collect();
        assert_eq!(instrs[1], Instr::switch(vec![0, 2]));
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut b = BodyBuilder::new();
        let nowhere = b.label();
        b.br(nowhere);
        assert!(matches!(b.finish(), Err(EmitError::UnboundLabel(_))));
    }

    #[test]
    fn clause_offsets_resolve() {
        let mut b = BodyBuilder::new();
        let try_start = b.here();
        b.op(Instr::nop);
        let try_end_handler_start = b.label();
        b.leave(try_end_handler_start);
        b.place(try_end_handler_start);
        b.op(Instr::endfinally);
        let handler_end = b.here();
        b.op(Instr::ret);
        b.finally_clause(try_start, try_end_handler_start, try_end_handler_start, handler_end);
        let body = b.finish().unwrap();

        assert_eq!(body.clauses.len(), 1);
        let clause = &body.clauses[0];
        assert_eq!(clause.kind, ClauseKind::Finally);
        assert_eq!(clause.try_offset, 0);
        assert_eq!(clause.try_end(), 6);
        assert_eq!(clause.handler_offset, 6);
        assert_eq!(clause.handler_end(), 7);
    }
}

//! IL-to-mint transformation
//!
//! One forward pass over the IL decodes each instruction, tracks the
//! abstract evaluation stack, and appends mint words. Branch targets
//! discovered by the basic-block prescan carry saved stack states for
//! join checking; forward branches leave relocation records patched when
//! layout is final. The pass also assigns frame offsets, rewrites
//! exception clauses into mint offsets, emits sequence points, and
//! publishes the finished [`MethodCode`] through the method's one-shot
//! cell under the registry's compile lock.

mod bblocks;
mod dump;
mod intrinsics;
mod seqpoint;
mod translate;

use std::sync::Arc;

use cilrun_cil::body::{ClauseKind, IlClause, MethodBody};
use cilrun_cil::il::{IlReader, Instr};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::debug::MethodJitInfo;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::imethod::{
    CompiledMethod, DataItem, LineNumberEntry, MethodCode, MintClause, SeqPoint, SeqPointKind,
};
use crate::meta::{ClassId, MethodBodyKind, MetadataProvider, MintType, TypeDesc};
use crate::mintops::MintOp;
use crate::slot::{vt_align, StackType, SLOT_SIZE};

pub(crate) use dump::disassemble;

/// Transform `method` if it has not been transformed yet. Idempotent;
/// the compile lock serializes racing callers and the loser observes the
/// winner's publication.
pub(crate) fn ensure_transformed(
    engine: &Engine,
    method: &Arc<CompiledMethod>,
) -> EngineResult<()> {
    if method.code().is_some() {
        return Ok(());
    }
    match method.desc.kind {
        MethodBodyKind::Il | MethodBodyKind::Runtime => {}
        MethodBodyKind::Native | MethodBodyKind::Icall => return Ok(()),
        MethodBodyKind::Abstract => return Err(EngineError::MissingBody),
    }

    let _guard = engine.registry().compile_lock().lock();
    if method.code().is_some() {
        return Ok(());
    }

    let (code, jit_info) = transform_method(engine, method)?;

    // Debug info first, then the code payload: observers gate on the
    // payload, which is published with release ordering.
    engine.debug().publish(method, jit_info);

    let owner = engine.metadata().class_desc(method.desc.owner);
    if engine.config().should_dump(&owner.name, &method.desc.name) {
        debug!(
            target: "cilrun::transform",
            method = %method.desc.name,
            class = %owner.name,
            "\n{}",
            disassemble(&code)
        );
    }

    method.publish_code(code);
    Ok(())
}

/// Round `v` up to `align` (a power of two).
#[inline]
fn round_up(v: u32, align: u32) -> u32 {
    (v + align - 1) & !(align - 1)
}

/// One abstract stack entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StackEntry {
    /// Stack classification.
    pub st: StackType,
    /// Class, when known (objects, value types, boxed types).
    pub klass: Option<ClassId>,
    /// Aligned value-type area bytes owned by this entry (zero unless
    /// `st == Vt`).
    pub vt_size: u32,
}

impl StackEntry {
    fn new(st: StackType) -> Self {
        StackEntry {
            st,
            klass: None,
            vt_size: 0,
        }
    }
}

/// Saved stack state at a join point.
#[derive(Debug, Clone)]
struct SavedState {
    stack: Vec<StackEntry>,
    vt_sp: u32,
}

/// Forward-branch relocation record.
struct Reloc {
    /// Word index of the branch opcode.
    opcode_pos: usize,
    /// Word index of the 32-bit delta to patch.
    operand_pos: usize,
    /// IL target offset.
    target_il: u32,
}

/// Data item dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DataKey {
    Method(usize),
    Class(u32),
    Field(u32),
    Str(usize),
    Sig(usize),
}

/// Transformation state for one method.
pub(crate) struct TransformCtx<'e> {
    pub(crate) engine: &'e Engine,
    pub(crate) method: &'e Arc<CompiledMethod>,
    pub(crate) body: Arc<MethodBody>,
    /// Decoded instructions with their IL offsets.
    pub(crate) instrs: Vec<(u32, Instr)>,
    /// Argument types, `this` included and normalized.
    pub(crate) arg_types: Vec<TypeDesc>,
    /// Local types in IL order.
    pub(crate) local_types: Vec<TypeDesc>,
    pub(crate) arg_offsets: Vec<u32>,
    pub(crate) local_offsets: Vec<u32>,
    pub(crate) exvar_offsets: Vec<u32>,
    pub(crate) args_size: u32,
    pub(crate) locals_size: u32,
    /// Mint offset of the first body instruction (after the prologue).
    pub(crate) body_start: u32,

    pub(crate) code: Vec<u16>,
    data_items: Vec<DataItem>,
    data_keys: FxHashMap<DataKey, u16>,
    /// IL byte offset to mint word offset; one extra entry for the end.
    pub(crate) il2mint: Vec<u32>,
    relocs: Vec<Reloc>,

    pub(crate) stack: Vec<StackEntry>,
    pub(crate) max_stack: u32,
    pub(crate) vt_sp: u32,
    pub(crate) max_vt_sp: u32,
    /// True while translating unreachable code.
    pub(crate) dead: bool,

    leaders: FxHashMap<u32, bblocks::Leader>,
    states: FxHashMap<u32, SavedState>,

    seq_il_offsets: Option<rustc_hash::FxHashSet<u32>>,
    pub(crate) seq_points: Vec<SeqPoint>,
    pub(crate) line_numbers: Vec<LineNumberEntry>,

    // Prefix state, cleared after the prefixed instruction.
    pub(crate) prefix_volatile: bool,
    pub(crate) prefix_readonly: bool,
    pub(crate) prefix_tail: bool,
    pub(crate) prefix_constrained: Option<ClassId>,
}

fn transform_method(
    engine: &Engine,
    method: &Arc<CompiledMethod>,
) -> EngineResult<(MethodCode, MethodJitInfo)> {
    let meta = engine.metadata();
    let body = meta.method_body(method.handle)?;
    let local_types = meta.method_locals(method.handle)?;
    let desc = &method.desc;

    // Decode the full IL stream up front; translation needs lookahead
    // (tail-recursion) and the prescan shares the decode.
    let mut instrs = Vec::new();
    let mut reader = IlReader::new(&body.code);
    while !reader.is_at_end() {
        let offset = reader.offset() as u32;
        let instr = Instr::read(&mut reader)
            .map_err(|e| EngineError::Transform(format!("{} at IL_{offset:04x}", e)))?;
        instrs.push((offset, instr));
    }

    // Argument list: a value-type receiver arrives by managed pointer.
    let mut arg_types = Vec::with_capacity(desc.signature.arg_count());
    if desc.signature.has_this {
        let owner = meta.class_desc(desc.owner);
        if owner.is_valuetype {
            arg_types.push(TypeDesc::ByRef(Box::new(TypeDesc::ValueType(desc.owner))));
        } else {
            arg_types.push(TypeDesc::Object(desc.owner));
        }
    }
    arg_types.extend(desc.signature.params.iter().cloned());

    // Frame layout: args, then locals, then one exception slot per
    // clause. Offsets are absolute within the frame's arg+local area.
    let mut cursor = 0u32;
    let mut arg_offsets = Vec::with_capacity(arg_types.len());
    for ty in &arg_types {
        let (size, align) = ty.size_align(meta);
        cursor = round_up(cursor, align);
        arg_offsets.push(cursor);
        cursor += size;
    }
    let args_size = round_up(cursor, SLOT_SIZE);

    cursor = args_size;
    let mut local_offsets = Vec::with_capacity(local_types.len());
    for ty in &local_types {
        let (size, align) = ty.size_align(meta);
        cursor = round_up(cursor, align);
        local_offsets.push(cursor);
        cursor += size;
    }
    let mut exvar_offsets = Vec::with_capacity(body.clauses.len());
    for _ in &body.clauses {
        cursor = round_up(cursor, SLOT_SIZE);
        exvar_offsets.push(cursor);
        cursor += SLOT_SIZE;
    }
    let locals_size = round_up(cursor, SLOT_SIZE) - args_size;

    if args_size + locals_size > u16::MAX as u32 {
        return Err(EngineError::Limit(format!(
            "frame locals of {} exceed the 16-bit offset space",
            desc.name
        )));
    }

    let leaders = bblocks::find_leaders(&instrs, &body.clauses)?;
    let seq_il_offsets = meta
        .method_seq_points(method.handle)
        .map(|offsets| offsets.into_iter().collect());

    let il_len = body.code.len();
    let mut ctx = TransformCtx {
        engine,
        method,
        body: body.clone(),
        instrs,
        arg_types,
        local_types,
        arg_offsets,
        local_offsets,
        exvar_offsets,
        args_size,
        locals_size,
        body_start: 0,
        code: Vec::new(),
        data_items: Vec::new(),
        data_keys: FxHashMap::default(),
        il2mint: vec![u32::MAX; il_len + 1],
        relocs: Vec::new(),
        stack: Vec::new(),
        max_stack: 0,
        vt_sp: 0,
        max_vt_sp: 0,
        dead: false,
        leaders,
        states: FxHashMap::default(),
        seq_il_offsets,
        seq_points: Vec::new(),
        line_numbers: Vec::new(),
        prefix_volatile: false,
        prefix_readonly: false,
        prefix_tail: false,
        prefix_constrained: None,
    };

    ctx.seed_handler_states()?;
    ctx.emit_prologue();
    translate::translate(&mut ctx)?;
    ctx.il2mint[il_len] = ctx.code.len() as u32;
    ctx.patch_relocs()?;

    let clauses = ctx.rewrite_clauses()?;
    seqpoint::compute_successors(&ctx.code, &mut ctx.seq_points);

    let stack_size = ctx.max_stack;
    let vt_stack_size = round_up(ctx.max_vt_sp, SLOT_SIZE);
    let alloca_size =
        ctx.args_size + ctx.locals_size + stack_size * SLOT_SIZE + vt_stack_size;

    let jit_info = MethodJitInfo {
        method: method.handle,
        code_len: ctx.code.len() as u32,
        line_numbers: ctx.line_numbers.clone(),
        locals: ctx.local_types.clone(),
        params: desc.signature.params.clone(),
        num_clauses: clauses.len() as u32,
    };

    let code = MethodCode {
        code: ctx.code.into_boxed_slice(),
        data_items: ctx.data_items.into_boxed_slice(),
        arg_offsets: ctx.arg_offsets.into_boxed_slice(),
        local_offsets: ctx.local_offsets.into_boxed_slice(),
        exvar_offsets: ctx.exvar_offsets.into_boxed_slice(),
        clauses: clauses.into_boxed_slice(),
        stack_size,
        vt_stack_size,
        args_size: ctx.args_size,
        locals_size: ctx.locals_size,
        alloca_size,
        init_locals: body.init_locals,
        seq_points: ctx.seq_points.into_boxed_slice(),
        line_numbers: ctx.line_numbers.into_boxed_slice(),
    };

    Ok((code, jit_info))
}

impl<'e> TransformCtx<'e> {
    #[inline]
    pub(crate) fn meta(&self) -> &'e dyn MetadataProvider {
        self.engine.metadata()
    }

    // ====================================================================
    // Emission
    // ====================================================================

    #[inline]
    pub(crate) fn emit_op(&mut self, op: MintOp) {
        self.code.push(op as u16);
    }

    #[inline]
    pub(crate) fn emit_word(&mut self, w: u16) {
        self.code.push(w);
    }

    pub(crate) fn emit_i32(&mut self, v: i32) {
        let bits = v as u32;
        self.code.push(bits as u16);
        self.code.push((bits >> 16) as u16);
    }

    pub(crate) fn emit_i64(&mut self, v: i64) {
        let bits = v as u64;
        self.code.push(bits as u16);
        self.code.push((bits >> 16) as u16);
        self.code.push((bits >> 32) as u16);
        self.code.push((bits >> 48) as u16);
    }

    /// Check that a frame offset or payload size fits its 16-bit operand.
    pub(crate) fn operand_u16(&self, v: u32, what: &str) -> EngineResult<u16> {
        u16::try_from(v).map_err(|_| {
            EngineError::Limit(format!("{what} of {v} exceeds the 16-bit operand space"))
        })
    }

    fn intern(&mut self, key: DataKey, item: DataItem) -> EngineResult<u16> {
        if let Some(&idx) = self.data_keys.get(&key) {
            return Ok(idx);
        }
        let idx = u16::try_from(self.data_items.len())
            .map_err(|_| EngineError::Limit("data item pool overflow".into()))?;
        self.data_items.push(item);
        self.data_keys.insert(key, idx);
        Ok(idx)
    }

    pub(crate) fn class_item(&mut self, class: ClassId) -> EngineResult<u16> {
        self.intern(DataKey::Class(class.0), DataItem::Class(class))
    }

    pub(crate) fn method_item(&mut self, method: Arc<CompiledMethod>) -> EngineResult<u16> {
        self.intern(
            DataKey::Method(Arc::as_ptr(&method) as usize),
            DataItem::Method(method),
        )
    }

    pub(crate) fn field_item(&mut self, field: crate::meta::FieldId) -> EngineResult<u16> {
        self.intern(DataKey::Field(field.0), DataItem::Field(field))
    }

    pub(crate) fn str_item(&mut self, s: crate::object::ObjRef) -> EngineResult<u16> {
        self.intern(DataKey::Str(s.addr()), DataItem::Str(s))
    }

    pub(crate) fn sig_item(
        &mut self,
        sig: Arc<crate::meta::MethodSignature>,
    ) -> EngineResult<u16> {
        self.intern(
            DataKey::Sig(Arc::as_ptr(&sig) as usize),
            DataItem::Sig(sig),
        )
    }

    // ====================================================================
    // Abstract stack
    // ====================================================================

    pub(crate) fn push(&mut self, st: StackType) {
        self.push_entry(StackEntry::new(st));
    }

    pub(crate) fn push_klass(&mut self, st: StackType, klass: Option<ClassId>) {
        let mut e = StackEntry::new(st);
        e.klass = klass;
        self.push_entry(e);
    }

    /// Push a value type of `size` raw bytes; the entry owns its aligned
    /// share of the value-type area.
    pub(crate) fn push_vt(&mut self, klass: Option<ClassId>, size: u32) {
        let aligned = vt_align(size);
        self.vt_sp += aligned;
        self.max_vt_sp = self.max_vt_sp.max(self.vt_sp);
        self.push_entry(StackEntry {
            st: StackType::Vt,
            klass,
            vt_size: aligned,
        });
    }

    fn push_entry(&mut self, e: StackEntry) {
        self.stack.push(e);
        self.max_stack = self.max_stack.max(self.stack.len() as u32);
    }

    pub(crate) fn pop(&mut self) -> EngineResult<StackEntry> {
        let e = self
            .stack
            .pop()
            .ok_or_else(|| EngineError::Transform("evaluation stack underflow".into()))?;
        self.vt_sp -= e.vt_size;
        Ok(e)
    }

    pub(crate) fn peek(&self) -> EngineResult<&StackEntry> {
        self.stack
            .last()
            .ok_or_else(|| EngineError::Transform("evaluation stack underflow".into()))
    }

    /// Reinterpret a value-type top entry as its payload address. The
    /// slot already holds the pointer; the area stays allocated until the
    /// stack next empties, which both sides account identically.
    pub(crate) fn receiver_to_ptr(&mut self) -> EngineResult<()> {
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| EngineError::Transform("evaluation stack underflow".into()))?;
        if top.st == StackType::Vt {
            top.st = StackType::Mp;
            top.vt_size = 0;
        }
        Ok(())
    }

    /// Statement-boundary reset: no stack entry can reference the
    /// value-type area when the stack is empty.
    pub(crate) fn reset_vt_if_empty(&mut self) {
        if self.stack.is_empty() {
            self.vt_sp = 0;
        }
    }

    // ====================================================================
    // Branches and joins
    // ====================================================================

    /// Merge the current stack into the state stored at `target_il`,
    /// injecting an I4/I8 widening on the top entry when the two sides
    /// disagree only there. Records the state on first arrival.
    ///
    /// Widening is only legal on edges whose transfer carries no extra
    /// operands above the join values (fall-through, unconditional
    /// branches); conditional edges would convert an operand instead.
    pub(crate) fn merge_into(&mut self, target_il: u32, allow_widen: bool) -> EngineResult<()> {
        if let Some(saved) = self.states.get(&target_il) {
            let saved_stack = saved.stack.clone();
            if saved_stack.len() != self.stack.len() {
                return Err(EngineError::Transform(format!(
                    "stack depth mismatch at join IL_{target_il:04x}"
                )));
            }
            for i in 0..saved_stack.len() {
                let cur = self.stack[i];
                let want = saved_stack[i];
                if cur.st == want.st {
                    continue;
                }
                let at_top = i + 1 == saved_stack.len() && allow_widen;
                match (cur.st, want.st) {
                    (StackType::I4, StackType::I8) if at_top => {
                        self.emit_op(MintOp::ConvI8I4);
                        self.stack[i].st = StackType::I8;
                    }
                    (StackType::I8, StackType::I4) if at_top => {
                        self.emit_op(MintOp::ConvI4I8);
                        self.stack[i].st = StackType::I4;
                    }
                    (StackType::O, StackType::Mp) | (StackType::Mp, StackType::O) => {}
                    _ => {
                        return Err(EngineError::Transform(format!(
                            "stack type mismatch at join IL_{target_il:04x}"
                        )));
                    }
                }
            }
        } else {
            self.states.insert(
                target_il,
                SavedState {
                    stack: self.stack.clone(),
                    vt_sp: self.vt_sp,
                },
            );
        }
        Ok(())
    }

    /// Emit a branch opcode pair (long form, optional short form) to
    /// `target_il`. Backward branches that fit use the short form;
    /// forward branches emit the long form and a relocation.
    pub(crate) fn emit_branch(
        &mut self,
        long: MintOp,
        short: Option<MintOp>,
        target_il: u32,
        allow_widen: bool,
    ) -> EngineResult<()> {
        self.merge_into(target_il, allow_widen)?;
        let opcode_pos = self.code.len();
        let target = self.il2mint.get(target_il as usize).copied();
        match target {
            Some(mapped) if mapped != u32::MAX => {
                let delta = mapped as i64 - opcode_pos as i64;
                match (short, i16::try_from(delta)) {
                    (Some(short), Ok(short_delta)) => {
                        self.emit_op(short);
                        self.emit_word(short_delta as u16);
                    }
                    _ => {
                        self.emit_op(long);
                        self.emit_i32(delta as i32);
                    }
                }
            }
            Some(_) => {
                self.emit_op(long);
                let operand_pos = self.code.len();
                self.emit_i32(0);
                self.relocs.push(Reloc {
                    opcode_pos,
                    operand_pos,
                    target_il,
                });
            }
            None => {
                return Err(EngineError::Transform(format!(
                    "branch target IL_{target_il:04x} outside the method"
                )));
            }
        }
        Ok(())
    }

    /// Emit a switch: the header carries the target count, then one
    /// 32-bit delta per target, each relative to the opcode word.
    pub(crate) fn emit_switch(&mut self, targets_il: &[u32]) -> EngineResult<()> {
        for &t in targets_il {
            self.merge_into(t, false)?;
        }
        let opcode_pos = self.code.len();
        self.emit_op(MintOp::Switch);
        self.emit_i32(targets_il.len() as i32);
        for &target_il in targets_il {
            let mapped = self.il2mint.get(target_il as usize).copied();
            match mapped {
                Some(m) if m != u32::MAX => {
                    self.emit_i32((m as i64 - opcode_pos as i64) as i32);
                }
                Some(_) => {
                    let operand_pos = self.code.len();
                    self.emit_i32(0);
                    self.relocs.push(Reloc {
                        opcode_pos,
                        operand_pos,
                        target_il,
                    });
                }
                None => {
                    return Err(EngineError::Transform(format!(
                        "switch target IL_{target_il:04x} outside the method"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Emit a branch whose target is a known mint offset (intrinsic
    /// tail-recursion back-branch).
    pub(crate) fn emit_branch_to_mint(&mut self, target: u32) {
        let opcode_pos = self.code.len();
        let delta = target as i64 - opcode_pos as i64;
        if let Ok(short_delta) = i16::try_from(delta) {
            self.emit_op(MintOp::BrS);
            self.emit_word(short_delta as u16);
        } else {
            self.emit_op(MintOp::Br);
            self.emit_i32(delta as i32);
        }
    }

    fn patch_relocs(&mut self) -> EngineResult<()> {
        for reloc in &self.relocs {
            let mapped = self.il2mint[reloc.target_il as usize];
            if mapped == u32::MAX {
                return Err(EngineError::Transform(format!(
                    "unresolved branch to IL_{:04x}",
                    reloc.target_il
                )));
            }
            let delta = (mapped as i64 - reloc.opcode_pos as i64) as i32 as u32;
            self.code[reloc.operand_pos] = delta as u16;
            self.code[reloc.operand_pos + 1] = (delta >> 16) as u16;
        }
        Ok(())
    }

    // ====================================================================
    // Leaders, prologue, clauses, sequence points
    // ====================================================================

    /// Pre-seed abstract stack states for handler entries: catch and
    /// filter bodies start with the exception on the stack, finally and
    /// fault bodies start empty.
    fn seed_handler_states(&mut self) -> EngineResult<()> {
        let clauses = self.body.clauses.clone();
        for clause in &clauses {
            let exc_entry = || {
                let mut e = StackEntry::new(StackType::O);
                e.klass = None;
                vec![e]
            };
            let state = match clause.kind {
                ClauseKind::Catch => exc_entry(),
                ClauseKind::Filter => exc_entry(),
                ClauseKind::Finally | ClauseKind::Fault => Vec::new(),
            };
            self.states.insert(
                clause.handler_offset,
                SavedState {
                    stack: state,
                    vt_sp: 0,
                },
            );
            if clause.kind == ClauseKind::Filter {
                self.states.insert(
                    clause.filter_offset,
                    SavedState {
                        stack: exc_entry(),
                        vt_sp: 0,
                    },
                );
            }
        }
        Ok(())
    }

    fn emit_prologue(&mut self) {
        if self.seq_il_offsets.is_some() {
            self.record_seq_point(SeqPointKind::Entry, 0);
            self.emit_op(MintOp::SdbSeqPoint);
        }
        for i in 0..self.arg_types.len() {
            let ty = self.arg_types[i].clone();
            let offset = self.arg_offsets[i];
            let mt = ty.mint_type(self.meta());
            if mt == MintType::Vt {
                let (size, _) = ty.size_align(self.meta());
                self.emit_op(MintOp::StinargVt);
                self.emit_word(i as u16);
                self.emit_word(offset as u16);
                self.emit_word(size as u16);
            } else {
                self.emit_op(MintOp::Stinarg);
                self.emit_word(i as u16);
                self.emit_word(offset as u16);
                self.emit_word(mt.code());
            }
        }
        if self.body.init_locals && self.locals_size > 0 {
            self.emit_op(MintOp::InitLocals);
            self.emit_word(self.args_size as u16);
            self.emit_word(self.locals_size as u16);
        }
        self.body_start = self.code.len() as u32;
    }

    /// Per-instruction bookkeeping: leader joins, reachability, sequence
    /// points, interruption checks, the IL-to-mint map, and line numbers.
    /// Returns false when the instruction is unreachable and must be
    /// skipped.
    pub(crate) fn begin_instr(&mut self, il_offset: u32) -> EngineResult<bool> {
        let leader = self.leaders.get(&il_offset).cloned();
        if let Some(_leader) = &leader {
            // The fall-through edge's widening (if any) must precede the
            // leader's mapped offset so branch edges skip it.
            if !self.dead {
                self.merge_into(il_offset, true)?;
            }
            let saved = self.states.get(&il_offset).cloned();
            if let Some(saved) = saved {
                self.stack = saved.stack;
                self.vt_sp = saved.vt_sp;
                self.dead = false;
            }
            // A leader with no recorded state reached while dead is
            // genuinely unreachable; stay dead.
        }

        self.il2mint[il_offset as usize] = self.code.len() as u32;
        if self.dead {
            return Ok(false);
        }

        // Loop headers poll for interruption; the check sits at the
        // mapped offset so backedges execute it.
        if leader.map(|l| l.backward_target).unwrap_or(false) {
            if self.seq_il_offsets.is_some() {
                self.record_seq_point(SeqPointKind::InterruptCheck, il_offset);
                self.emit_op(MintOp::SdbIntrLoc);
            } else {
                self.emit_op(MintOp::Safepoint);
            }
        }

        self.line_numbers.push(LineNumberEntry {
            native_offset: self.code.len() as u32,
            il_offset,
        });

        if let Some(seq) = &self.seq_il_offsets {
            if seq.contains(&il_offset) {
                self.record_seq_point(SeqPointKind::Normal, il_offset);
                self.emit_op(MintOp::SdbSeqPoint);
            }
        }
        Ok(true)
    }

    /// Whether symbol information enables sequence-point emission.
    pub(crate) fn has_seq_points(&self) -> bool {
        self.seq_il_offsets.is_some()
    }

    pub(crate) fn record_seq_point(&mut self, kind: SeqPointKind, il_offset: u32) {
        self.seq_points.push(SeqPoint {
            il_offset,
            native_offset: self.code.len() as u32,
            kind,
            next: Vec::new(),
        });
    }

    fn rewrite_clauses(&mut self) -> EngineResult<Vec<MintClause>> {
        let map = |il: u32, what: &str| -> EngineResult<u32> {
            let mapped = self
                .il2mint
                .get(il as usize)
                .copied()
                .filter(|&m| m != u32::MAX);
            mapped.ok_or_else(|| {
                EngineError::Transform(format!("{what} IL_{il:04x} not mapped to mint code"))
            })
        };

        let clauses = self.body.clauses.clone();
        let mut out = Vec::with_capacity(clauses.len());
        for (i, clause) in clauses.iter().enumerate() {
            let catch_class = match clause.kind {
                ClauseKind::Catch => Some(
                    self.meta()
                        .resolve_class(clause.catch_type, self.method.ctx)?,
                ),
                _ => None,
            };
            out.push(MintClause {
                kind: clause.kind,
                try_start: map(clause.try_offset, "try start")?,
                try_end: map(clause.try_end(), "try end")?,
                handler_start: map(clause.handler_offset, "handler start")?,
                handler_end: map(clause.handler_end(), "handler end")?,
                filter_start: match clause.kind {
                    ClauseKind::Filter => map(clause.filter_offset, "filter start")?,
                    _ => 0,
                },
                catch_class,
                exvar_offset: self.exvar_offsets[i],
            });
        }
        Ok(out)
    }

    /// The innermost clause whose handler range contains `il_offset`,
    /// for `rethrow` and `leave` classification.
    pub(crate) fn enclosing_handler(&self, il_offset: u32) -> Option<(usize, &IlClause)> {
        self.body
            .clauses
            .iter()
            .enumerate()
            .find(|(_, c)| il_offset >= c.handler_offset && il_offset < c.handler_end())
    }

    /// Whether `il_offset` lies in any protected or handler region.
    pub(crate) fn in_any_clause(&self, il_offset: u32) -> bool {
        self.body.clauses.iter().any(|c| {
            c.covers(il_offset)
                || (il_offset >= c.handler_offset && il_offset < c.handler_end())
                || (c.kind == ClauseKind::Filter
                    && il_offset >= c.filter_offset
                    && il_offset < c.handler_offset)
        })
    }
}

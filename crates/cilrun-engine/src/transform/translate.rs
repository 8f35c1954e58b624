//! CIL-to-mint lowering
//!
//! One match arm per IL instruction. Stack-type-polymorphic IL opcodes
//! (arithmetic, comparisons, conversions, branches) select their typed
//! mint variant from the abstract stack; token-bearing opcodes resolve
//! through the metadata provider and bake offsets, sizes, and data-item
//! indices into the stream.

use cilrun_cil::il::{ExtInstr, Instr};

use crate::error::{EngineError, EngineResult};
use crate::imethod::SeqPointKind;
use crate::meta::{ClassId, FieldDesc, MintType, SpecialClass, TypeDesc};
use crate::mintops::MintOp;
use crate::object::HEADER_SIZE;
use crate::slot::StackType;

use super::{intrinsics, StackEntry, TransformCtx};

pub(super) fn translate(ctx: &mut TransformCtx<'_>) -> EngineResult<()> {
    let il_len = ctx.body.code.len() as u32;
    for i in 0..ctx.instrs.len() {
        let (il_off, instr) = ctx.instrs[i].clone();
        if !ctx.begin_instr(il_off)? {
            continue;
        }
        let next_il = ctx
            .instrs
            .get(i + 1)
            .map(|(off, _)| *off)
            .unwrap_or(il_len);
        let next_instr = ctx.instrs.get(i + 1).map(|(_, n)| n.clone());
        translate_instr(ctx, il_off, next_il, &instr, next_instr.as_ref())?;
        if !is_prefix(&instr) {
            ctx.prefix_volatile = false;
            ctx.prefix_readonly = false;
            ctx.prefix_tail = false;
            if !matches!(instr, Instr::prefixed(ExtInstr::constrained(_))) {
                ctx.prefix_constrained = None;
            }
        }
        ctx.reset_vt_if_empty();
    }
    Ok(())
}

fn is_prefix(instr: &Instr) -> bool {
    matches!(
        instr,
        Instr::prefixed(ExtInstr::volatile)
            | Instr::prefixed(ExtInstr::unaligned(_))
            | Instr::prefixed(ExtInstr::tail)
            | Instr::prefixed(ExtInstr::readonly)
            | Instr::prefixed(ExtInstr::constrained(_))
            | Instr::prefixed(ExtInstr::no_chk(_))
    )
}

/// Conversion target of a `conv.*` opcode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ConvTarget {
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    RUn,
    I,
    U,
}

fn translate_instr(
    ctx: &mut TransformCtx<'_>,
    il_off: u32,
    next_il: u32,
    instr: &Instr,
    next_instr: Option<&Instr>,
) -> EngineResult<()> {
    use Instr::*;

    let target = |delta: i32| (next_il as i64 + delta as i64) as u32;

    match instr {
        nop => ctx.emit_op(MintOp::Nop),
        brk => ctx.emit_op(MintOp::SdbBreakpoint),

        // ===== Arguments and locals =====
        ldarg_0 => ldarg(ctx, 0)?,
        ldarg_1 => ldarg(ctx, 1)?,
        ldarg_2 => ldarg(ctx, 2)?,
        ldarg_3 => ldarg(ctx, 3)?,
        ldarg_s(n) => ldarg(ctx, *n as usize)?,
        prefixed(ExtInstr::ldarg(n)) => ldarg(ctx, *n as usize)?,
        ldloc_0 => ldloc(ctx, 0)?,
        ldloc_1 => ldloc(ctx, 1)?,
        ldloc_2 => ldloc(ctx, 2)?,
        ldloc_3 => ldloc(ctx, 3)?,
        ldloc_s(n) => ldloc(ctx, *n as usize)?,
        prefixed(ExtInstr::ldloc(n)) => ldloc(ctx, *n as usize)?,
        stloc_0 => stloc(ctx, 0)?,
        stloc_1 => stloc(ctx, 1)?,
        stloc_2 => stloc(ctx, 2)?,
        stloc_3 => stloc(ctx, 3)?,
        stloc_s(n) => stloc(ctx, *n as usize)?,
        prefixed(ExtInstr::stloc(n)) => stloc(ctx, *n as usize)?,
        starg_s(n) => starg(ctx, *n as usize)?,
        prefixed(ExtInstr::starg(n)) => starg(ctx, *n as usize)?,
        ldarga_s(n) => {
            let offset = ctx.arg_offsets[*n as usize];
            ldvara(ctx, offset)?
        }
        prefixed(ExtInstr::ldarga(n)) => {
            let offset = ctx.arg_offsets[*n as usize];
            ldvara(ctx, offset)?
        }
        ldloca_s(n) => {
            let offset = ctx.local_offsets[*n as usize];
            ldvara(ctx, offset)?
        }
        prefixed(ExtInstr::ldloca(n)) => {
            let offset = ctx.local_offsets[*n as usize];
            ldvara(ctx, offset)?
        }

        // ===== Constants =====
        ldnull => {
            ctx.emit_op(MintOp::Ldnull);
            ctx.push(StackType::O);
        }
        ldc_i4_m1 => ldc_i4_small(ctx, MintOp::LdcI4M1),
        ldc_i4_0 => ldc_i4_small(ctx, MintOp::LdcI4_0),
        ldc_i4_1 => ldc_i4_small(ctx, MintOp::LdcI4_1),
        ldc_i4_2 => ldc_i4_small(ctx, MintOp::LdcI4_2),
        ldc_i4_3 => ldc_i4_small(ctx, MintOp::LdcI4_3),
        ldc_i4_4 => ldc_i4_small(ctx, MintOp::LdcI4_4),
        ldc_i4_5 => ldc_i4_small(ctx, MintOp::LdcI4_5),
        ldc_i4_6 => ldc_i4_small(ctx, MintOp::LdcI4_6),
        ldc_i4_7 => ldc_i4_small(ctx, MintOp::LdcI4_7),
        ldc_i4_8 => ldc_i4_small(ctx, MintOp::LdcI4_8),
        ldc_i4_s(v) => {
            ctx.emit_op(MintOp::LdcI4S);
            ctx.emit_word(*v as i16 as u16);
            ctx.push(StackType::I4);
        }
        ldc_i4(v) => {
            ctx.emit_op(MintOp::LdcI4);
            ctx.emit_i32(*v);
            ctx.push(StackType::I4);
        }
        ldc_i8(v) => {
            ctx.emit_op(MintOp::LdcI8);
            ctx.emit_i64(*v);
            ctx.push(StackType::I8);
        }
        ldc_r4(v) => {
            ctx.emit_op(MintOp::LdcR4);
            ctx.emit_i32(v.to_bits() as i32);
            ctx.push(StackType::R8);
        }
        ldc_r8(v) => {
            ctx.emit_op(MintOp::LdcR8);
            ctx.emit_i64(v.to_bits() as i64);
            ctx.push(StackType::R8);
        }
        ldstr(token) => {
            let s = ctx.engine.object_runtime().string_literal(*token)?;
            let item = ctx.str_item(s)?;
            ctx.emit_op(MintOp::Ldstr);
            ctx.emit_word(item);
            ctx.push(StackType::O);
        }
        ldtoken(token) => {
            let item = resolve_token_item(ctx, *token)?;
            ctx.emit_op(MintOp::Ldtoken);
            ctx.emit_word(item);
            ctx.push(StackType::Mp);
        }

        // ===== Stack manipulation =====
        dup => {
            let top = *ctx.peek()?;
            if top.st == StackType::Vt {
                ctx.emit_op(MintOp::DupVt);
                let size = ctx.operand_u16(top.vt_size, "duplicated value size")?;
                ctx.emit_word(size);
                ctx.push_vt(top.klass, top.vt_size);
            } else {
                ctx.emit_op(MintOp::Dup);
                ctx.push_klass(top.st, top.klass);
            }
        }
        pop => {
            let e = ctx.pop()?;
            if e.st == StackType::Vt {
                ctx.emit_op(MintOp::PopVt);
                let size = ctx.operand_u16(e.vt_size, "popped value size")?;
                ctx.emit_word(size);
            } else {
                ctx.emit_op(MintOp::Pop);
            }
        }

        // ===== Control flow =====
        br_s(d) => {
            let t = target(*d as i32);
            ctx.emit_branch(MintOp::Br, Some(MintOp::BrS), t, true)?;
            ctx.dead = true;
        }
        br(d) => {
            let t = target(*d);
            ctx.emit_branch(MintOp::Br, Some(MintOp::BrS), t, true)?;
            ctx.dead = true;
        }
        brfalse_s(d) => cond_branch_unary(ctx, false, target(*d as i32))?,
        brfalse(d) => cond_branch_unary(ctx, false, target(*d))?,
        brtrue_s(d) => cond_branch_unary(ctx, true, target(*d as i32))?,
        brtrue(d) => cond_branch_unary(ctx, true, target(*d))?,
        beq_s(d) => cond_branch(ctx, CondOp::Eq, target(*d as i32))?,
        beq(d) => cond_branch(ctx, CondOp::Eq, target(*d))?,
        bge_s(d) => cond_branch(ctx, CondOp::Ge, target(*d as i32))?,
        bge(d) => cond_branch(ctx, CondOp::Ge, target(*d))?,
        bgt_s(d) => cond_branch(ctx, CondOp::Gt, target(*d as i32))?,
        bgt(d) => cond_branch(ctx, CondOp::Gt, target(*d))?,
        ble_s(d) => cond_branch(ctx, CondOp::Le, target(*d as i32))?,
        ble(d) => cond_branch(ctx, CondOp::Le, target(*d))?,
        blt_s(d) => cond_branch(ctx, CondOp::Lt, target(*d as i32))?,
        blt(d) => cond_branch(ctx, CondOp::Lt, target(*d))?,
        bne_un_s(d) => cond_branch(ctx, CondOp::NeUn, target(*d as i32))?,
        bne_un(d) => cond_branch(ctx, CondOp::NeUn, target(*d))?,
        bge_un_s(d) => cond_branch(ctx, CondOp::GeUn, target(*d as i32))?,
        bge_un(d) => cond_branch(ctx, CondOp::GeUn, target(*d))?,
        bgt_un_s(d) => cond_branch(ctx, CondOp::GtUn, target(*d as i32))?,
        bgt_un(d) => cond_branch(ctx, CondOp::GtUn, target(*d))?,
        ble_un_s(d) => cond_branch(ctx, CondOp::LeUn, target(*d as i32))?,
        ble_un(d) => cond_branch(ctx, CondOp::LeUn, target(*d))?,
        blt_un_s(d) => cond_branch(ctx, CondOp::LtUn, target(*d as i32))?,
        blt_un(d) => cond_branch(ctx, CondOp::LtUn, target(*d))?,
        switch(deltas) => {
            ctx.pop()?;
            let targets: Vec<u32> = deltas.iter().map(|d| target(*d)).collect();
            ctx.emit_switch(&targets)?;
        }
        leave(d) => emit_leave(ctx, il_off, target(*d))?,
        leave_s(d) => emit_leave(ctx, il_off, target(*d as i32))?,
        ret => {
            emit_ret(ctx, il_off)?;
            ctx.dead = true;
        }

        // ===== Indirect access =====
        ldind_i1 => ldind(ctx, MintOp::LdindI1, StackType::I4)?,
        ldind_u1 => ldind(ctx, MintOp::LdindU1, StackType::I4)?,
        ldind_i2 => ldind(ctx, MintOp::LdindI2, StackType::I4)?,
        ldind_u2 => ldind(ctx, MintOp::LdindU2, StackType::I4)?,
        ldind_i4 | ldind_u4 => ldind(ctx, MintOp::LdindI4, StackType::I4)?,
        ldind_i8 => ldind(ctx, MintOp::LdindI8, StackType::I8)?,
        ldind_i => ldind(ctx, MintOp::LdindI8, StackType::Mp)?,
        ldind_r4 => ldind(ctx, MintOp::LdindR4, StackType::R8)?,
        ldind_r8 => ldind(ctx, MintOp::LdindR8, StackType::R8)?,
        ldind_ref => ldind(ctx, MintOp::LdindRef, StackType::O)?,
        stind_ref => stind(ctx, MintOp::StindRef)?,
        stind_i1 => stind(ctx, MintOp::StindI1)?,
        stind_i2 => stind(ctx, MintOp::StindI2)?,
        stind_i4 => stind(ctx, MintOp::StindI4)?,
        stind_i8 | stind_i => stind(ctx, MintOp::StindI8)?,
        stind_r4 => stind(ctx, MintOp::StindR4)?,
        stind_r8 => stind(ctx, MintOp::StindR8)?,

        // ===== Arithmetic =====
        add => binop(ctx, MintOp::AddI4, MintOp::AddI8, MintOp::AddR8)?,
        sub => binop(ctx, MintOp::SubI4, MintOp::SubI8, MintOp::SubR8)?,
        mul => binop(ctx, MintOp::MulI4, MintOp::MulI8, MintOp::MulR8)?,
        div => binop(ctx, MintOp::DivI4, MintOp::DivI8, MintOp::DivR8)?,
        div_un => int_binop(ctx, MintOp::DivUnI4, MintOp::DivUnI8)?,
        rem => binop(ctx, MintOp::RemI4, MintOp::RemI8, MintOp::RemR8)?,
        rem_un => int_binop(ctx, MintOp::RemUnI4, MintOp::RemUnI8)?,
        and => int_binop(ctx, MintOp::AndI4, MintOp::AndI8)?,
        or => int_binop(ctx, MintOp::OrI4, MintOp::OrI8)?,
        xor => int_binop(ctx, MintOp::XorI4, MintOp::XorI8)?,
        shl => shift(ctx, MintOp::ShlI4, MintOp::ShlI8)?,
        shr => shift(ctx, MintOp::ShrI4, MintOp::ShrI8)?,
        shr_un => shift(ctx, MintOp::ShrUnI4, MintOp::ShrUnI8)?,
        neg => unop(ctx, MintOp::NegI4, MintOp::NegI8, Some(MintOp::NegR8))?,
        not => unop(ctx, MintOp::NotI4, MintOp::NotI8, None)?,
        add_ovf => int_binop(ctx, MintOp::AddOvfI4, MintOp::AddOvfI8)?,
        add_ovf_un => int_binop(ctx, MintOp::AddOvfUnI4, MintOp::AddOvfUnI8)?,
        sub_ovf => int_binop(ctx, MintOp::SubOvfI4, MintOp::SubOvfI8)?,
        sub_ovf_un => int_binop(ctx, MintOp::SubOvfUnI4, MintOp::SubOvfUnI8)?,
        mul_ovf => int_binop(ctx, MintOp::MulOvfI4, MintOp::MulOvfI8)?,
        mul_ovf_un => int_binop(ctx, MintOp::MulOvfUnI4, MintOp::MulOvfUnI8)?,
        ckfinite => {
            ctx.pop()?;
            ctx.emit_op(MintOp::Ckfinite);
            ctx.push(StackType::R8);
        }
        prefixed(ExtInstr::ceq) => compare(ctx, MintOp::CeqI4, MintOp::CeqI8, MintOp::CeqR8)?,
        prefixed(ExtInstr::cgt) => compare(ctx, MintOp::CgtI4, MintOp::CgtI8, MintOp::CgtR8)?,
        prefixed(ExtInstr::cgt_un) => {
            compare(ctx, MintOp::CgtUnI4, MintOp::CgtUnI8, MintOp::CgtUnR8)?
        }
        prefixed(ExtInstr::clt) => compare(ctx, MintOp::CltI4, MintOp::CltI8, MintOp::CltR8)?,
        prefixed(ExtInstr::clt_un) => {
            compare(ctx, MintOp::CltUnI4, MintOp::CltUnI8, MintOp::CltUnR8)?
        }

        // ===== Conversions =====
        conv_i1 => emit_conv(ctx, ConvTarget::I1)?,
        conv_u1 => emit_conv(ctx, ConvTarget::U1)?,
        conv_i2 => emit_conv(ctx, ConvTarget::I2)?,
        conv_u2 => emit_conv(ctx, ConvTarget::U2)?,
        conv_i4 => emit_conv(ctx, ConvTarget::I4)?,
        conv_u4 => emit_conv(ctx, ConvTarget::U4)?,
        conv_i8 => emit_conv(ctx, ConvTarget::I8)?,
        conv_u8 => emit_conv(ctx, ConvTarget::U8)?,
        conv_r4 => emit_conv(ctx, ConvTarget::R4)?,
        conv_r8 => emit_conv(ctx, ConvTarget::R8)?,
        conv_r_un => emit_conv(ctx, ConvTarget::RUn)?,
        conv_i => emit_conv(ctx, ConvTarget::I)?,
        conv_u => emit_conv(ctx, ConvTarget::U)?,
        conv_ovf_i1 => emit_conv_ovf(ctx, ConvTarget::I1, false)?,
        conv_ovf_u1 => emit_conv_ovf(ctx, ConvTarget::U1, false)?,
        conv_ovf_i2 => emit_conv_ovf(ctx, ConvTarget::I2, false)?,
        conv_ovf_u2 => emit_conv_ovf(ctx, ConvTarget::U2, false)?,
        conv_ovf_i4 => emit_conv_ovf(ctx, ConvTarget::I4, false)?,
        conv_ovf_u4 => emit_conv_ovf(ctx, ConvTarget::U4, false)?,
        conv_ovf_i8 => emit_conv_ovf(ctx, ConvTarget::I8, false)?,
        conv_ovf_u8 => emit_conv_ovf(ctx, ConvTarget::U8, false)?,
        conv_ovf_i => emit_conv_ovf(ctx, ConvTarget::I, false)?,
        conv_ovf_u => emit_conv_ovf(ctx, ConvTarget::U, false)?,
        conv_ovf_i1_un => emit_conv_ovf(ctx, ConvTarget::I1, true)?,
        conv_ovf_u1_un => emit_conv_ovf(ctx, ConvTarget::U1, true)?,
        conv_ovf_i2_un => emit_conv_ovf(ctx, ConvTarget::I2, true)?,
        conv_ovf_u2_un => emit_conv_ovf(ctx, ConvTarget::U2, true)?,
        conv_ovf_i4_un => emit_conv_ovf(ctx, ConvTarget::I4, true)?,
        conv_ovf_u4_un => emit_conv_ovf(ctx, ConvTarget::U4, true)?,
        conv_ovf_i8_un => emit_conv_ovf(ctx, ConvTarget::I8, true)?,
        conv_ovf_u8_un => emit_conv_ovf(ctx, ConvTarget::U8, true)?,
        conv_ovf_i_un => emit_conv_ovf(ctx, ConvTarget::I, true)?,
        conv_ovf_u_un => emit_conv_ovf(ctx, ConvTarget::U, true)?,

        // ===== Calls =====
        call(token) => lower_call(ctx, *token, il_off, false, next_instr)?,
        callvirt(token) => lower_call(ctx, *token, il_off, true, next_instr)?,
        calli(token) => lower_calli(ctx, *token)?,
        newobj(token) => lower_newobj(ctx, *token)?,
        jmp(_) => {
            ctx.emit_op(MintOp::ThrowUnsupported);
            ctx.dead = true;
        }

        // ===== Objects =====
        castclass(token) => {
            let class = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            let item = ctx.class_item(class)?;
            ctx.pop()?;
            ctx.emit_op(MintOp::Castclass);
            ctx.emit_word(item);
            ctx.push_klass(StackType::O, Some(class));
        }
        isinst(token) => {
            let class = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            let item = ctx.class_item(class)?;
            ctx.pop()?;
            ctx.emit_op(MintOp::Isinst);
            ctx.emit_word(item);
            ctx.push_klass(StackType::O, Some(class));
        }
        box_val(token) => lower_box(ctx, *token)?,
        unbox(token) => {
            let class = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            let item = ctx.class_item(class)?;
            ctx.pop()?;
            ctx.emit_op(MintOp::Unbox);
            ctx.emit_word(item);
            ctx.push_klass(StackType::Mp, Some(class));
        }
        unbox_any(token) => lower_unbox_any(ctx, *token)?,
        throw => {
            ctx.pop()?;
            ctx.emit_op(MintOp::Throw);
            ctx.dead = true;
        }
        prefixed(ExtInstr::rethrow) => {
            let (idx, _) = ctx.enclosing_handler(il_off).ok_or_else(|| {
                EngineError::Transform("rethrow outside an exception handler".into())
            })?;
            let exvar = ctx.exvar_offsets[idx];
            ctx.emit_op(MintOp::Rethrow);
            ctx.emit_word(exvar as u16);
            ctx.dead = true;
        }
        endfinally => {
            ctx.emit_op(MintOp::EndFinally);
            ctx.dead = true;
        }
        prefixed(ExtInstr::endfilter) => {
            ctx.pop()?;
            ctx.emit_op(MintOp::EndFilter);
            ctx.dead = true;
        }

        // ===== Fields =====
        ldfld(token) => lower_ldfld(ctx, *token, false)?,
        ldflda(token) => lower_ldfld(ctx, *token, true)?,
        stfld(token) => lower_stfld(ctx, *token)?,
        ldsfld(token) => lower_ldsfld(ctx, *token, false)?,
        ldsflda(token) => lower_ldsfld(ctx, *token, true)?,
        stsfld(token) => lower_stsfld(ctx, *token)?,

        // ===== Object blocks =====
        ldobj(token) => {
            let class = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            lower_ldobj(ctx, class)?;
        }
        stobj(token) => {
            let class = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            lower_stobj(ctx, class)?;
        }
        cpobj(token) => {
            let class = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            let item = ctx.class_item(class)?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.emit_op(MintOp::Cpobj);
            ctx.emit_word(item);
        }
        prefixed(ExtInstr::initobj(token)) => {
            let class = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            let desc = ctx.meta().class_desc(class);
            let size = if desc.is_valuetype {
                desc.value_size
            } else {
                crate::object::WORD
            };
            let size = ctx.operand_u16(size, "initobj size")?;
            ctx.pop()?;
            ctx.emit_op(MintOp::Initobj);
            ctx.emit_word(size);
        }
        prefixed(ExtInstr::cpblk) => {
            ctx.pop()?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.emit_op(MintOp::Cpblk);
        }
        prefixed(ExtInstr::initblk) => {
            ctx.pop()?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.emit_op(MintOp::Initblk);
        }
        prefixed(ExtInstr::sizeof(token)) => {
            let class = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            let desc = ctx.meta().class_desc(class);
            let size = if desc.is_valuetype {
                desc.value_size
            } else {
                crate::object::WORD
            };
            ctx.emit_op(MintOp::LdcI4);
            ctx.emit_i32(size as i32);
            ctx.push(StackType::I4);
        }

        // ===== Arrays =====
        newarr(token) => {
            let elem = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            let array_class = ctx.meta().array_class(elem, 1);
            let item = ctx.class_item(array_class)?;
            ctx.pop()?;
            ctx.emit_op(MintOp::Newarr);
            ctx.emit_word(item);
            ctx.push_klass(StackType::O, Some(array_class));
        }
        ldlen => {
            ctx.pop()?;
            ctx.emit_op(MintOp::Ldlen);
            ctx.push(StackType::Mp);
        }
        ldelema(token) => {
            let elem = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            lower_ldelema(ctx, elem, 1)?;
        }
        ldelem_i1 => ldelem_typed(ctx, MintOp::LdelemI1, StackType::I4)?,
        ldelem_u1 => ldelem_typed(ctx, MintOp::LdelemU1, StackType::I4)?,
        ldelem_i2 => ldelem_typed(ctx, MintOp::LdelemI2, StackType::I4)?,
        ldelem_u2 => ldelem_typed(ctx, MintOp::LdelemU2, StackType::I4)?,
        ldelem_i4 | ldelem_u4 => ldelem_typed(ctx, MintOp::LdelemI4, StackType::I4)?,
        ldelem_i8 => ldelem_typed(ctx, MintOp::LdelemI8, StackType::I8)?,
        ldelem_i => ldelem_typed(ctx, MintOp::LdelemI8, StackType::Mp)?,
        ldelem_r4 => ldelem_typed(ctx, MintOp::LdelemR4, StackType::R8)?,
        ldelem_r8 => ldelem_typed(ctx, MintOp::LdelemR8, StackType::R8)?,
        ldelem_ref => ldelem_typed(ctx, MintOp::LdelemRef, StackType::O)?,
        ldelem(token) => {
            let elem = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            lower_ldelem_token(ctx, elem)?;
        }
        stelem_i | stelem_i8 => stelem_typed(ctx, MintOp::StelemI8)?,
        stelem_i1 => stelem_typed(ctx, MintOp::StelemI1)?,
        stelem_i2 => stelem_typed(ctx, MintOp::StelemI2)?,
        stelem_i4 => stelem_typed(ctx, MintOp::StelemI4)?,
        stelem_r4 => stelem_typed(ctx, MintOp::StelemR4)?,
        stelem_r8 => stelem_typed(ctx, MintOp::StelemR8)?,
        stelem_ref => stelem_typed(ctx, MintOp::StelemRef)?,
        stelem(token) => {
            let elem = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            lower_stelem_token(ctx, elem)?;
        }

        // ===== Function pointers =====
        prefixed(ExtInstr::ldftn(token)) => {
            let handle = ctx.meta().resolve_method(*token, ctx.method.ctx)?;
            let target = ctx.engine.resolve(handle, ctx.method.ctx)?;
            let item = ctx.method_item(target)?;
            ctx.emit_op(MintOp::Ldftn);
            ctx.emit_word(item);
            ctx.push(StackType::Mp);
        }
        prefixed(ExtInstr::ldvirtftn(token)) => {
            let handle = ctx.meta().resolve_method(*token, ctx.method.ctx)?;
            let target = ctx.engine.resolve(handle, ctx.method.ctx)?;
            let item = ctx.method_item(target)?;
            ctx.pop()?;
            ctx.emit_op(MintOp::Ldvirtftn);
            ctx.emit_word(item);
            ctx.push(StackType::Mp);
        }

        // ===== Prefixes =====
        prefixed(ExtInstr::volatile) => ctx.prefix_volatile = true,
        prefixed(ExtInstr::unaligned(_)) => {
            // Alignment hints are advisory; unaligned access is the
            // dispatcher's default.
        }
        prefixed(ExtInstr::tail) => ctx.prefix_tail = true,
        prefixed(ExtInstr::readonly) => ctx.prefix_readonly = true,
        prefixed(ExtInstr::constrained(token)) => {
            let class = ctx.meta().resolve_class(*token, ctx.method.ctx)?;
            ctx.prefix_constrained = Some(class);
        }
        prefixed(ExtInstr::no_chk(_)) => {
            // Fault-check elision is an optimization license, not an
            // obligation; checks stay on.
        }

        // ===== Unsupported constructs =====
        prefixed(ExtInstr::arglist)
        | prefixed(ExtInstr::localloc)
        | mkrefany(_)
        | refanyval(_)
        | prefixed(ExtInstr::refanytype) => {
            ctx.emit_op(MintOp::ThrowUnsupported);
            ctx.dead = true;
        }
    }
    Ok(())
}

// ========================================================================
// Locals and arguments
// ========================================================================

fn ldvar(ctx: &mut TransformCtx<'_>, ty: &TypeDesc, offset: u32) -> EngineResult<()> {
    let mt = ty.mint_type(ctx.meta());
    let offset16 = ctx.operand_u16(offset, "frame offset")?;
    let (op, st) = match mt {
        MintType::I1 => (MintOp::LdlocI1, StackType::I4),
        MintType::U1 => (MintOp::LdlocU1, StackType::I4),
        MintType::I2 => (MintOp::LdlocI2, StackType::I4),
        MintType::U2 => (MintOp::LdlocU2, StackType::I4),
        MintType::I4 => (MintOp::LdlocI4, StackType::I4),
        MintType::I8 => (MintOp::LdlocI8, StackType::I8),
        MintType::R4 => (MintOp::LdlocR4, StackType::R8),
        MintType::R8 => (MintOp::LdlocR8, StackType::R8),
        MintType::O => (MintOp::LdlocO, StackType::O),
        MintType::P => (MintOp::LdlocP, StackType::Mp),
        MintType::Vt => {
            let (size, _) = ty.size_align(ctx.meta());
            let size16 = ctx.operand_u16(size, "value size")?;
            ctx.emit_op(MintOp::LdlocVt);
            ctx.emit_word(offset16);
            ctx.emit_word(size16);
            ctx.push_vt(ty.class_id(), size);
            return Ok(());
        }
        MintType::Void => {
            return Err(EngineError::Transform("void-typed variable".into()));
        }
    };
    ctx.emit_op(op);
    ctx.emit_word(offset16);
    ctx.push_klass(st, ty.class_id());
    Ok(())
}

pub(super) fn stvar(ctx: &mut TransformCtx<'_>, ty: &TypeDesc, offset: u32) -> EngineResult<()> {
    let mt = ty.mint_type(ctx.meta());
    let offset16 = ctx.operand_u16(offset, "frame offset")?;
    ctx.pop()?;
    let op = match mt {
        MintType::I1 | MintType::U1 => MintOp::StlocI1,
        MintType::I2 | MintType::U2 => MintOp::StlocI2,
        MintType::I4 => MintOp::StlocI4,
        MintType::I8 => MintOp::StlocI8,
        MintType::R4 => MintOp::StlocR4,
        MintType::R8 => MintOp::StlocR8,
        MintType::O => MintOp::StlocO,
        MintType::P => MintOp::StlocP,
        MintType::Vt => {
            let (size, _) = ty.size_align(ctx.meta());
            let size16 = ctx.operand_u16(size, "value size")?;
            ctx.emit_op(MintOp::StlocVt);
            ctx.emit_word(offset16);
            ctx.emit_word(size16);
            return Ok(());
        }
        MintType::Void => {
            return Err(EngineError::Transform("void-typed variable".into()));
        }
    };
    ctx.emit_op(op);
    ctx.emit_word(offset16);
    Ok(())
}

fn ldarg(ctx: &mut TransformCtx<'_>, n: usize) -> EngineResult<()> {
    let ty = ctx
        .arg_types
        .get(n)
        .cloned()
        .ok_or_else(|| EngineError::Transform(format!("argument index {n} out of range")))?;
    let offset = ctx.arg_offsets[n];
    ldvar(ctx, &ty, offset)
}

fn starg(ctx: &mut TransformCtx<'_>, n: usize) -> EngineResult<()> {
    let ty = ctx
        .arg_types
        .get(n)
        .cloned()
        .ok_or_else(|| EngineError::Transform(format!("argument index {n} out of range")))?;
    let offset = ctx.arg_offsets[n];
    stvar(ctx, &ty, offset)
}

fn ldloc(ctx: &mut TransformCtx<'_>, n: usize) -> EngineResult<()> {
    let ty = ctx
        .local_types
        .get(n)
        .cloned()
        .ok_or_else(|| EngineError::Transform(format!("local index {n} out of range")))?;
    let offset = ctx.local_offsets[n];
    ldvar(ctx, &ty, offset)
}

fn stloc(ctx: &mut TransformCtx<'_>, n: usize) -> EngineResult<()> {
    let ty = ctx
        .local_types
        .get(n)
        .cloned()
        .ok_or_else(|| EngineError::Transform(format!("local index {n} out of range")))?;
    let offset = ctx.local_offsets[n];
    stvar(ctx, &ty, offset)
}

fn ldvara(ctx: &mut TransformCtx<'_>, offset: u32) -> EngineResult<()> {
    let offset16 = ctx.operand_u16(offset, "frame offset")?;
    ctx.emit_op(MintOp::Ldloca);
    ctx.emit_word(offset16);
    ctx.push(StackType::Mp);
    Ok(())
}

fn ldc_i4_small(ctx: &mut TransformCtx<'_>, op: MintOp) {
    ctx.emit_op(op);
    ctx.push(StackType::I4);
}

// ========================================================================
// Arithmetic and comparisons
// ========================================================================

fn arith_type(a: StackType, b: StackType) -> EngineResult<StackType> {
    use StackType::*;
    Ok(match (a, b) {
        (I4, I4) => I4,
        (I8, I8) => I8,
        (R8, R8) => R8,
        (Mp, Mp) | (Mp, I4) | (I4, Mp) | (Mp, I8) | (I8, Mp) => Mp,
        (O, I4) | (I4, O) | (O, Mp) | (Mp, O) => Mp,
        _ => {
            return Err(EngineError::Transform(format!(
                "operand type mismatch in binary operation: {a:?} vs {b:?}"
            )));
        }
    })
}

fn binop(ctx: &mut TransformCtx<'_>, i4: MintOp, i8: MintOp, r8: MintOp) -> EngineResult<()> {
    let b = ctx.pop()?;
    let a = ctx.pop()?;
    let st = arith_type(a.st, b.st)?;
    match st {
        StackType::I4 => {
            ctx.emit_op(i4);
            ctx.push(StackType::I4);
        }
        StackType::I8 => {
            ctx.emit_op(i8);
            ctx.push(StackType::I8);
        }
        StackType::R8 => {
            ctx.emit_op(r8);
            ctx.push(StackType::R8);
        }
        StackType::Mp => {
            // Pointer-sized operands run on the word-width variant. A
            // 32-bit operand mixing in is widened first when it is on top.
            if b.st == StackType::I4 {
                ctx.emit_op(MintOp::ConvI8I4);
            }
            ctx.emit_op(i8);
            ctx.push(StackType::Mp);
        }
        _ => unreachable!(),
    }
    Ok(())
}

fn int_binop(ctx: &mut TransformCtx<'_>, i4: MintOp, i8: MintOp) -> EngineResult<()> {
    let b = ctx.pop()?;
    let a = ctx.pop()?;
    match arith_type(a.st, b.st)? {
        StackType::I4 => {
            ctx.emit_op(i4);
            ctx.push(StackType::I4);
        }
        StackType::I8 => {
            ctx.emit_op(i8);
            ctx.push(StackType::I8);
        }
        StackType::Mp => {
            if b.st == StackType::I4 {
                ctx.emit_op(MintOp::ConvI8I4);
            }
            ctx.emit_op(i8);
            ctx.push(StackType::Mp);
        }
        other => {
            return Err(EngineError::Transform(format!(
                "integer operation applied to {other:?}"
            )));
        }
    }
    Ok(())
}

fn shift(ctx: &mut TransformCtx<'_>, i4: MintOp, i8: MintOp) -> EngineResult<()> {
    ctx.pop()?; // count, consumed as i32
    let value = ctx.pop()?;
    match value.st {
        StackType::I4 => {
            ctx.emit_op(i4);
            ctx.push(StackType::I4);
        }
        StackType::I8 => {
            ctx.emit_op(i8);
            ctx.push(StackType::I8);
        }
        StackType::Mp => {
            ctx.emit_op(i8);
            ctx.push(StackType::Mp);
        }
        other => {
            return Err(EngineError::Transform(format!(
                "shift applied to {other:?}"
            )));
        }
    }
    Ok(())
}

fn unop(
    ctx: &mut TransformCtx<'_>,
    i4: MintOp,
    i8: MintOp,
    r8: Option<MintOp>,
) -> EngineResult<()> {
    let v = ctx.pop()?;
    match (v.st, r8) {
        (StackType::I4, _) => {
            ctx.emit_op(i4);
            ctx.push(StackType::I4);
        }
        (StackType::I8, _) => {
            ctx.emit_op(i8);
            ctx.push(StackType::I8);
        }
        (StackType::Mp, _) => {
            ctx.emit_op(i8);
            ctx.push(StackType::Mp);
        }
        (StackType::R8, Some(op)) => {
            ctx.emit_op(op);
            ctx.push(StackType::R8);
        }
        (other, _) => {
            return Err(EngineError::Transform(format!(
                "unary operation applied to {other:?}"
            )));
        }
    }
    Ok(())
}

fn compare_type(a: StackType, b: StackType) -> EngineResult<StackType> {
    use StackType::*;
    Ok(match (a, b) {
        (I4, I4) => I4,
        (I8, I8) => I8,
        (R8, R8) => R8,
        (O, O) | (Mp, Mp) | (O, Mp) | (Mp, O) => I8,
        (Mp, I4) | (I4, Mp) | (O, I4) | (I4, O) => I8,
        _ => {
            return Err(EngineError::Transform(format!(
                "comparison type mismatch: {a:?} vs {b:?}"
            )));
        }
    })
}

fn compare(ctx: &mut TransformCtx<'_>, i4: MintOp, i8: MintOp, r8: MintOp) -> EngineResult<()> {
    let b = ctx.pop()?;
    let a = ctx.pop()?;
    match compare_type(a.st, b.st)? {
        StackType::I4 => ctx.emit_op(i4),
        StackType::I8 => {
            if b.st == StackType::I4 {
                ctx.emit_op(MintOp::ConvI8I4);
            }
            ctx.emit_op(i8);
        }
        StackType::R8 => ctx.emit_op(r8),
        _ => unreachable!(),
    }
    ctx.push(StackType::I4);
    Ok(())
}

// ========================================================================
// Branches
// ========================================================================

#[derive(Copy, Clone)]
enum CondOp {
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    NeUn,
    GeUn,
    GtUn,
    LeUn,
    LtUn,
}

fn cond_branch_unary(ctx: &mut TransformCtx<'_>, on_true: bool, target: u32) -> EngineResult<()> {
    let v = ctx.pop()?;
    use MintOp::*;
    let (long, short) = match (on_true, v.st) {
        (false, StackType::I4) => (BrfalseI4, BrfalseI4S),
        (false, StackType::I8) => (BrfalseI8, BrfalseI8S),
        (false, StackType::R8) => (BrfalseR8, BrfalseR8S),
        (false, StackType::O) | (false, StackType::Mp) => (BrfalseI8, BrfalseI8S),
        (true, StackType::I4) => (BrtrueI4, BrtrueI4S),
        (true, StackType::I8) => (BrtrueI8, BrtrueI8S),
        (true, StackType::R8) => (BrtrueR8, BrtrueR8S),
        (true, StackType::O) | (true, StackType::Mp) => (BrtrueI8, BrtrueI8S),
        (_, StackType::Vt) => {
            return Err(EngineError::Transform(
                "branch condition cannot be a value type".into(),
            ));
        }
    };
    ctx.emit_branch(long, Some(short), target, false)
}

fn cond_branch(ctx: &mut TransformCtx<'_>, cond: CondOp, target: u32) -> EngineResult<()> {
    let b = ctx.pop()?;
    let a = ctx.pop()?;
    let st = compare_type(a.st, b.st)?;
    if st == StackType::I8 && b.st == StackType::I4 {
        ctx.emit_op(MintOp::ConvI8I4);
    }
    use MintOp::*;
    let (long, short) = match (cond, st) {
        (CondOp::Eq, StackType::I4) => (BeqI4, BeqI4S),
        (CondOp::Eq, StackType::I8) => (BeqI8, BeqI8S),
        (CondOp::Eq, StackType::R8) => (BeqR8, BeqR8S),
        (CondOp::Ge, StackType::I4) => (BgeI4, BgeI4S),
        (CondOp::Ge, StackType::I8) => (BgeI8, BgeI8S),
        (CondOp::Ge, StackType::R8) => (BgeR8, BgeR8S),
        (CondOp::Gt, StackType::I4) => (BgtI4, BgtI4S),
        (CondOp::Gt, StackType::I8) => (BgtI8, BgtI8S),
        (CondOp::Gt, StackType::R8) => (BgtR8, BgtR8S),
        (CondOp::Le, StackType::I4) => (BleI4, BleI4S),
        (CondOp::Le, StackType::I8) => (BleI8, BleI8S),
        (CondOp::Le, StackType::R8) => (BleR8, BleR8S),
        (CondOp::Lt, StackType::I4) => (BltI4, BltI4S),
        (CondOp::Lt, StackType::I8) => (BltI8, BltI8S),
        (CondOp::Lt, StackType::R8) => (BltR8, BltR8S),
        (CondOp::NeUn, StackType::I4) => (BneUnI4, BneUnI4S),
        (CondOp::NeUn, StackType::I8) => (BneUnI8, BneUnI8S),
        (CondOp::NeUn, StackType::R8) => (BneUnR8, BneUnR8S),
        (CondOp::GeUn, StackType::I4) => (BgeUnI4, BgeUnI4S),
        (CondOp::GeUn, StackType::I8) => (BgeUnI8, BgeUnI8S),
        (CondOp::GeUn, StackType::R8) => (BgeUnR8, BgeUnR8S),
        (CondOp::GtUn, StackType::I4) => (BgtUnI4, BgtUnI4S),
        (CondOp::GtUn, StackType::I8) => (BgtUnI8, BgtUnI8S),
        (CondOp::GtUn, StackType::R8) => (BgtUnR8, BgtUnR8S),
        (CondOp::LeUn, StackType::I4) => (BleUnI4, BleUnI4S),
        (CondOp::LeUn, StackType::I8) => (BleUnI8, BleUnI8S),
        (CondOp::LeUn, StackType::R8) => (BleUnR8, BleUnR8S),
        (CondOp::LtUn, StackType::I4) => (BltUnI4, BltUnI4S),
        (CondOp::LtUn, StackType::I8) => (BltUnI8, BltUnI8S),
        (CondOp::LtUn, StackType::R8) => (BltUnR8, BltUnR8S),
        _ => unreachable!(),
    };
    ctx.emit_branch(long, Some(short), target, false)
}

fn emit_leave(ctx: &mut TransformCtx<'_>, il_off: u32, target: u32) -> EngineResult<()> {
    // Leave empties the evaluation stack before transferring.
    ctx.stack.clear();
    ctx.vt_sp = 0;
    let in_catch = ctx
        .enclosing_handler(il_off)
        .map(|(_, c)| matches!(c.kind, cilrun_cil::body::ClauseKind::Catch | cilrun_cil::body::ClauseKind::Filter))
        .unwrap_or(false);
    let op = if in_catch {
        MintOp::LeaveCheck
    } else {
        MintOp::Leave
    };
    ctx.emit_branch(op, None, target, true)?;
    ctx.dead = true;
    Ok(())
}

fn emit_ret(ctx: &mut TransformCtx<'_>, _il_off: u32) -> EngineResult<()> {
    if ctx.has_seq_points() {
        ctx.record_seq_point(SeqPointKind::Exit, _il_off);
        ctx.emit_op(MintOp::SdbSeqPoint);
    }
    let ret = ctx.method.desc.signature.ret.clone();
    match ret.mint_type(ctx.meta()) {
        MintType::Void => ctx.emit_op(MintOp::RetVoid),
        MintType::Vt => {
            let (size, _) = ret.size_align(ctx.meta());
            let size16 = ctx.operand_u16(size, "return value size")?;
            ctx.pop()?;
            ctx.emit_op(MintOp::RetVt);
            ctx.emit_word(size16);
        }
        _ => {
            ctx.pop()?;
            ctx.emit_op(MintOp::Ret);
        }
    }
    Ok(())
}

// ========================================================================
// Indirect loads and stores
// ========================================================================

fn ldind(ctx: &mut TransformCtx<'_>, op: MintOp, st: StackType) -> EngineResult<()> {
    ctx.pop()?;
    if ctx.prefix_volatile {
        ctx.emit_op(MintOp::Membar);
    }
    ctx.emit_op(op);
    ctx.push(st);
    Ok(())
}

fn stind(ctx: &mut TransformCtx<'_>, op: MintOp) -> EngineResult<()> {
    ctx.pop()?;
    ctx.pop()?;
    ctx.emit_op(op);
    if ctx.prefix_volatile {
        ctx.emit_op(MintOp::Membar);
    }
    Ok(())
}

// ========================================================================
// Conversions
// ========================================================================

/// Source classification: every pointer-sized source behaves as I8 on the
/// word width this engine targets.
fn conv_source(st: StackType) -> EngineResult<StackType> {
    Ok(match st {
        StackType::I4 => StackType::I4,
        StackType::I8 | StackType::Mp | StackType::O => StackType::I8,
        StackType::R8 => StackType::R8,
        StackType::Vt => {
            return Err(EngineError::Transform(
                "conversion applied to a value type".into(),
            ));
        }
    })
}

fn emit_conv(ctx: &mut TransformCtx<'_>, t: ConvTarget) -> EngineResult<()> {
    let src = conv_source(ctx.pop()?.st)?;
    use ConvTarget as T;
    use MintOp::*;
    use StackType::*;
    let (op, result) = match (t, src) {
        (T::I1, I4) => (Some(ConvI1I4), I4),
        (T::I1, I8) => (Some(ConvI1I8), I4),
        (T::I1, R8) => (Some(ConvI1R8), I4),
        (T::U1, I4) => (Some(ConvU1I4), I4),
        (T::U1, I8) => (Some(ConvU1I8), I4),
        (T::U1, R8) => (Some(ConvU1R8), I4),
        (T::I2, I4) => (Some(ConvI2I4), I4),
        (T::I2, I8) => (Some(ConvI2I8), I4),
        (T::I2, R8) => (Some(ConvI2R8), I4),
        (T::U2, I4) => (Some(ConvU2I4), I4),
        (T::U2, I8) => (Some(ConvU2I8), I4),
        (T::U2, R8) => (Some(ConvU2R8), I4),
        (T::I4, I4) | (T::U4, I4) => (None, I4),
        (T::I4, I8) | (T::U4, I8) => (Some(ConvI4I8), I4),
        (T::I4, R8) => (Some(ConvI4R8), I4),
        (T::U4, R8) => (Some(ConvU4R8), I4),
        (T::I8, I4) => (Some(ConvI8I4), I8),
        (T::I8, I8) => (None, I8),
        (T::I8, R8) => (Some(ConvI8R8), I8),
        (T::U8, I4) => (Some(ConvI8U4), I8),
        (T::U8, I8) => (None, I8),
        (T::U8, R8) => (Some(ConvU8R8), I8),
        (T::R4, I4) => (Some(ConvR4I4), R8),
        (T::R4, I8) => (Some(ConvR4I8), R8),
        (T::R4, R8) => (Some(ConvR4R8), R8),
        (T::R8, I4) => (Some(ConvR8I4), R8),
        (T::R8, I8) => (Some(ConvR8I8), R8),
        (T::R8, R8) => (None, R8),
        (T::RUn, I4) => (Some(ConvRUnI4), R8),
        (T::RUn, I8) => (Some(ConvRUnI8), R8),
        (T::RUn, R8) => (None, R8),
        (T::I, I4) => (Some(ConvI8I4), Mp),
        (T::I, I8) => (None, Mp),
        (T::I, R8) => (Some(ConvI8R8), Mp),
        (T::U, I4) => (Some(ConvI8U4), Mp),
        (T::U, I8) => (None, Mp),
        (T::U, R8) => (Some(ConvU8R8), Mp),
        _ => {
            return Err(EngineError::Transform(
                "malformed conversion source".into(),
            ));
        }
    };
    if let Some(op) = op {
        ctx.emit_op(op);
    }
    ctx.push(result);
    Ok(())
}

fn emit_conv_ovf(ctx: &mut TransformCtx<'_>, t: ConvTarget, un_source: bool) -> EngineResult<()> {
    let src = conv_source(ctx.pop()?.st)?;
    use ConvTarget as T;
    use MintOp::*;
    use StackType::*;
    let (op, result) = if un_source {
        match (t, src) {
            (T::I1, I4) => (Some(ConvOvfI1U4), I4),
            (T::I1, I8) => (Some(ConvOvfI1U8), I4),
            (T::I1, R8) => (Some(ConvOvfI1R8), I4),
            (T::U1, I4) => (Some(ConvOvfU1U4), I4),
            (T::U1, I8) => (Some(ConvOvfU1U8), I4),
            (T::U1, R8) => (Some(ConvOvfU1R8), I4),
            (T::I2, I4) => (Some(ConvOvfI2U4), I4),
            (T::I2, I8) => (Some(ConvOvfI2U8), I4),
            (T::I2, R8) => (Some(ConvOvfI2R8), I4),
            (T::U2, I4) => (Some(ConvOvfU2U4), I4),
            (T::U2, I8) => (Some(ConvOvfU2U8), I4),
            (T::U2, R8) => (Some(ConvOvfU2R8), I4),
            (T::I4, I4) => (Some(ConvOvfI4U4), I4),
            (T::I4, I8) => (Some(ConvOvfI4U8), I4),
            (T::I4, R8) => (Some(ConvOvfI4R8), I4),
            (T::U4, I4) => (None, I4),
            (T::U4, I8) => (Some(ConvOvfU4U8), I4),
            (T::U4, R8) => (Some(ConvOvfU4R8), I4),
            (T::I8, I4) => (Some(ConvI8U4), I8),
            (T::I8, I8) => (Some(ConvOvfI8U8), I8),
            (T::I8, R8) => (Some(ConvOvfI8R8), I8),
            (T::U8, I4) => (Some(ConvI8U4), I8),
            (T::U8, I8) => (None, I8),
            (T::U8, R8) => (Some(ConvOvfU8R8), I8),
            (T::I, I4) => (Some(ConvI8U4), Mp),
            (T::I, I8) => (Some(ConvOvfI8U8), Mp),
            (T::I, R8) => (Some(ConvOvfI8R8), Mp),
            (T::U, I4) => (Some(ConvI8U4), Mp),
            (T::U, I8) => (None, Mp),
            (T::U, R8) => (Some(ConvOvfU8R8), Mp),
            (T::R4 | T::R8 | T::RUn, _) => {
                return Err(EngineError::Transform(
                    "checked conversion to a float type".into(),
                ));
            }
            _ => {
                return Err(EngineError::Transform(
                    "malformed conversion source".into(),
                ));
            }
        }
    } else {
        match (t, src) {
            (T::I1, I4) => (Some(ConvOvfI1I4), I4),
            (T::I1, I8) => (Some(ConvOvfI1I8), I4),
            (T::I1, R8) => (Some(ConvOvfI1R8), I4),
            (T::U1, I4) => (Some(ConvOvfU1I4), I4),
            (T::U1, I8) => (Some(ConvOvfU1I8), I4),
            (T::U1, R8) => (Some(ConvOvfU1R8), I4),
            (T::I2, I4) => (Some(ConvOvfI2I4), I4),
            (T::I2, I8) => (Some(ConvOvfI2I8), I4),
            (T::I2, R8) => (Some(ConvOvfI2R8), I4),
            (T::U2, I4) => (Some(ConvOvfU2I4), I4),
            (T::U2, I8) => (Some(ConvOvfU2I8), I4),
            (T::U2, R8) => (Some(ConvOvfU2R8), I4),
            (T::I4, I4) => (None, I4),
            (T::I4, I8) => (Some(ConvOvfI4I8), I4),
            (T::I4, R8) => (Some(ConvOvfI4R8), I4),
            (T::U4, I4) => (Some(ConvOvfU4I4), I4),
            (T::U4, I8) => (Some(ConvOvfU4I8), I4),
            (T::U4, R8) => (Some(ConvOvfU4R8), I4),
            (T::I8, I4) => (Some(ConvI8I4), I8),
            (T::I8, I8) => (None, I8),
            (T::I8, R8) => (Some(ConvOvfI8R8), I8),
            (T::U8, I4) => (Some(ConvOvfU8I4), I8),
            (T::U8, I8) => (Some(ConvOvfU8I8), I8),
            (T::U8, R8) => (Some(ConvOvfU8R8), I8),
            (T::I, I4) => (Some(ConvI8I4), Mp),
            (T::I, I8) => (None, Mp),
            (T::I, R8) => (Some(ConvOvfI8R8), Mp),
            (T::U, I4) => (Some(ConvOvfU8I4), Mp),
            (T::U, I8) => (Some(ConvOvfU8I8), Mp),
            (T::U, R8) => (Some(ConvOvfU8R8), Mp),
            (T::R4 | T::R8 | T::RUn, _) => {
                return Err(EngineError::Transform(
                    "checked conversion to a float type".into(),
                ));
            }
            _ => {
                return Err(EngineError::Transform(
                    "malformed conversion source".into(),
                ));
            }
        }
    };
    if let Some(op) = op {
        ctx.emit_op(op);
    }
    ctx.push(result);
    Ok(())
}

// ========================================================================
// Fields
// ========================================================================

/// Adjust a metadata field offset to the receiver representation on the
/// stack: object references carry the header, payload pointers do not.
fn receiver_offset(recv: &StackEntry, field: &FieldDesc) -> u32 {
    if recv.st == StackType::O {
        field.offset
    } else {
        field.offset - HEADER_SIZE
    }
}

fn lower_ldfld(ctx: &mut TransformCtx<'_>, token: cilrun_cil::il::Token, addr_of: bool) -> EngineResult<()> {
    let field = ctx.meta().resolve_field(token, ctx.method.ctx)?;
    if field.is_static {
        // A static field reached through an instance: discard the object.
        let e = ctx.pop()?;
        if e.st == StackType::Vt {
            ctx.emit_op(MintOp::PopVt);
            let size = ctx.operand_u16(e.vt_size, "popped value size")?;
            ctx.emit_word(size);
        } else {
            ctx.emit_op(MintOp::Pop);
        }
        return lower_static_field(ctx, &field, addr_of, false);
    }

    let owner = ctx.meta().class_desc(field.owner);
    if owner.remotable {
        let item = ctx.field_item(field.id)?;
        ctx.pop()?;
        ctx.emit_op(MintOp::Ldrmfld);
        ctx.emit_word(item);
        ctx.push(StackType::O);
        return Ok(());
    }

    ctx.receiver_to_ptr()?;
    let recv = ctx.pop()?;
    let offset = receiver_offset(&recv, &field);
    let offset16 = ctx.operand_u16(offset, "field offset")?;

    if addr_of {
        ctx.emit_op(MintOp::Ldflda);
        ctx.emit_word(offset16);
        ctx.push_klass(StackType::Mp, field.ty.class_id());
        return Ok(());
    }

    if ctx.prefix_volatile {
        ctx.emit_op(MintOp::Membar);
    }
    let mt = field.ty.mint_type(ctx.meta());
    let (op, st) = match mt {
        MintType::I1 => (MintOp::LdfldI1, StackType::I4),
        MintType::U1 => (MintOp::LdfldU1, StackType::I4),
        MintType::I2 => (MintOp::LdfldI2, StackType::I4),
        MintType::U2 => (MintOp::LdfldU2, StackType::I4),
        MintType::I4 => (MintOp::LdfldI4, StackType::I4),
        MintType::I8 => (MintOp::LdfldI8, StackType::I8),
        MintType::R4 => (MintOp::LdfldR4, StackType::R8),
        MintType::R8 => (MintOp::LdfldR8, StackType::R8),
        MintType::O => (MintOp::LdfldO, StackType::O),
        MintType::P => (MintOp::LdfldP, StackType::Mp),
        MintType::Vt => {
            let (size, _) = field.ty.size_align(ctx.meta());
            let size16 = ctx.operand_u16(size, "field size")?;
            ctx.emit_op(MintOp::LdfldVt);
            ctx.emit_word(offset16);
            ctx.emit_word(size16);
            ctx.push_vt(field.ty.class_id(), size);
            return Ok(());
        }
        MintType::Void => {
            return Err(EngineError::Transform("void-typed field".into()));
        }
    };
    ctx.emit_op(op);
    ctx.emit_word(offset16);
    ctx.push_klass(st, field.ty.class_id());
    Ok(())
}

fn lower_stfld(ctx: &mut TransformCtx<'_>, token: cilrun_cil::il::Token) -> EngineResult<()> {
    let field = ctx.meta().resolve_field(token, ctx.method.ctx)?;
    if field.is_static {
        lower_static_field_store(ctx, &field)?;
        ctx.emit_op(MintOp::Pop);
        ctx.pop()?;
        return Ok(());
    }

    let owner = ctx.meta().class_desc(field.owner);
    if owner.remotable {
        let item = ctx.field_item(field.id)?;
        ctx.pop()?;
        ctx.pop()?;
        ctx.emit_op(MintOp::Strmfld);
        ctx.emit_word(item);
        return Ok(());
    }

    let value = ctx.pop()?;
    // The receiver sits below the value.
    let recv = {
        let len = ctx.stack.len();
        let recv = ctx
            .stack
            .get_mut(len.wrapping_sub(1))
            .ok_or_else(|| EngineError::Transform("evaluation stack underflow".into()))?;
        if recv.st == StackType::Vt {
            recv.st = StackType::Mp;
            recv.vt_size = 0;
        }
        *recv
    };
    ctx.pop()?;
    let _ = value;
    let offset = receiver_offset(&recv, &field);
    let offset16 = ctx.operand_u16(offset, "field offset")?;

    let mt = field.ty.mint_type(ctx.meta());
    let op = match mt {
        MintType::I1 | MintType::U1 => MintOp::StfldI1,
        MintType::I2 | MintType::U2 => MintOp::StfldI2,
        MintType::I4 => MintOp::StfldI4,
        MintType::I8 => MintOp::StfldI8,
        MintType::R4 => MintOp::StfldR4,
        MintType::R8 => MintOp::StfldR8,
        MintType::O => MintOp::StfldO,
        MintType::P => MintOp::StfldP,
        MintType::Vt => {
            let (size, _) = field.ty.size_align(ctx.meta());
            let size16 = ctx.operand_u16(size, "field size")?;
            ctx.emit_op(MintOp::StfldVt);
            ctx.emit_word(offset16);
            ctx.emit_word(size16);
            if ctx.prefix_volatile {
                ctx.emit_op(MintOp::Membar);
            }
            return Ok(());
        }
        MintType::Void => {
            return Err(EngineError::Transform("void-typed field".into()));
        }
    };
    ctx.emit_op(op);
    ctx.emit_word(offset16);
    if ctx.prefix_volatile {
        ctx.emit_op(MintOp::Membar);
    }
    Ok(())
}

fn lower_ldsfld(
    ctx: &mut TransformCtx<'_>,
    token: cilrun_cil::il::Token,
    addr_of: bool,
) -> EngineResult<()> {
    let field = ctx.meta().resolve_field(token, ctx.method.ctx)?;
    lower_static_field(ctx, &field, addr_of, ctx.prefix_volatile)
}

fn lower_static_field(
    ctx: &mut TransformCtx<'_>,
    field: &FieldDesc,
    addr_of: bool,
    volatile_: bool,
) -> EngineResult<()> {
    let item = ctx.field_item(field.id)?;
    if addr_of {
        ctx.emit_op(MintOp::Ldsflda);
        ctx.emit_word(item);
        ctx.push_klass(StackType::Mp, field.ty.class_id());
        return Ok(());
    }
    if volatile_ {
        ctx.emit_op(MintOp::Membar);
    }
    let mt = field.ty.mint_type(ctx.meta());
    let (op, st) = match mt {
        MintType::I1 => (MintOp::LdsfldI1, StackType::I4),
        MintType::U1 => (MintOp::LdsfldU1, StackType::I4),
        MintType::I2 => (MintOp::LdsfldI2, StackType::I4),
        MintType::U2 => (MintOp::LdsfldU2, StackType::I4),
        MintType::I4 => (MintOp::LdsfldI4, StackType::I4),
        MintType::I8 => (MintOp::LdsfldI8, StackType::I8),
        MintType::R4 => (MintOp::LdsfldR4, StackType::R8),
        MintType::R8 => (MintOp::LdsfldR8, StackType::R8),
        MintType::O => (MintOp::LdsfldO, StackType::O),
        MintType::P => (MintOp::LdsfldP, StackType::Mp),
        MintType::Vt => {
            let (size, _) = field.ty.size_align(ctx.meta());
            let size16 = ctx.operand_u16(size, "field size")?;
            ctx.emit_op(MintOp::LdsfldVt);
            ctx.emit_word(item);
            ctx.emit_word(size16);
            ctx.push_vt(field.ty.class_id(), size);
            return Ok(());
        }
        MintType::Void => {
            return Err(EngineError::Transform("void-typed field".into()));
        }
    };
    ctx.emit_op(op);
    ctx.emit_word(item);
    ctx.push_klass(st, field.ty.class_id());
    Ok(())
}

fn lower_stsfld(ctx: &mut TransformCtx<'_>, token: cilrun_cil::il::Token) -> EngineResult<()> {
    let field = ctx.meta().resolve_field(token, ctx.method.ctx)?;
    lower_static_field_store(ctx, &field)
}

fn lower_static_field_store(ctx: &mut TransformCtx<'_>, field: &FieldDesc) -> EngineResult<()> {
    let item = ctx.field_item(field.id)?;
    ctx.pop()?;
    let mt = field.ty.mint_type(ctx.meta());
    let op = match mt {
        MintType::I1 | MintType::U1 => MintOp::StsfldI1,
        MintType::I2 | MintType::U2 => MintOp::StsfldI2,
        MintType::I4 => MintOp::StsfldI4,
        MintType::I8 => MintOp::StsfldI8,
        MintType::R4 => MintOp::StsfldR4,
        MintType::R8 => MintOp::StsfldR8,
        MintType::O => MintOp::StsfldO,
        MintType::P => MintOp::StsfldP,
        MintType::Vt => {
            let (size, _) = field.ty.size_align(ctx.meta());
            let size16 = ctx.operand_u16(size, "field size")?;
            ctx.emit_op(MintOp::StsfldVt);
            ctx.emit_word(item);
            ctx.emit_word(size16);
            if ctx.prefix_volatile {
                ctx.emit_op(MintOp::Membar);
            }
            return Ok(());
        }
        MintType::Void => {
            return Err(EngineError::Transform("void-typed field".into()));
        }
    };
    ctx.emit_op(op);
    ctx.emit_word(item);
    if ctx.prefix_volatile {
        ctx.emit_op(MintOp::Membar);
    }
    Ok(())
}

// ========================================================================
// ldobj / stobj
// ========================================================================

fn lower_ldobj(ctx: &mut TransformCtx<'_>, class: ClassId) -> EngineResult<()> {
    let desc = ctx.meta().class_desc(class);
    let ty = if desc.is_valuetype {
        TypeDesc::ValueType(class)
    } else {
        TypeDesc::Object(class)
    };
    match ty.mint_type(ctx.meta()) {
        MintType::Vt => {
            let size16 = ctx.operand_u16(desc.value_size, "value size")?;
            ctx.pop()?;
            if ctx.prefix_volatile {
                ctx.emit_op(MintOp::Membar);
            }
            ctx.emit_op(MintOp::LdobjVt);
            ctx.emit_word(size16);
            ctx.push_vt(Some(class), desc.value_size);
            Ok(())
        }
        MintType::O => ldind(ctx, MintOp::LdindRef, StackType::O),
        MintType::I1 => ldind(ctx, MintOp::LdindI1, StackType::I4),
        MintType::U1 => ldind(ctx, MintOp::LdindU1, StackType::I4),
        MintType::I2 => ldind(ctx, MintOp::LdindI2, StackType::I4),
        MintType::U2 => ldind(ctx, MintOp::LdindU2, StackType::I4),
        MintType::I4 => ldind(ctx, MintOp::LdindI4, StackType::I4),
        MintType::I8 => ldind(ctx, MintOp::LdindI8, StackType::I8),
        MintType::R4 => ldind(ctx, MintOp::LdindR4, StackType::R8),
        MintType::R8 => ldind(ctx, MintOp::LdindR8, StackType::R8),
        MintType::P => ldind(ctx, MintOp::LdindI8, StackType::Mp),
        MintType::Void => Err(EngineError::Transform("ldobj of void".into())),
    }
}

fn lower_stobj(ctx: &mut TransformCtx<'_>, class: ClassId) -> EngineResult<()> {
    let desc = ctx.meta().class_desc(class);
    let ty = if desc.is_valuetype {
        TypeDesc::ValueType(class)
    } else {
        TypeDesc::Object(class)
    };
    match ty.mint_type(ctx.meta()) {
        MintType::Vt => {
            let size16 = ctx.operand_u16(desc.value_size, "value size")?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.emit_op(MintOp::StobjVt);
            ctx.emit_word(size16);
            if ctx.prefix_volatile {
                ctx.emit_op(MintOp::Membar);
            }
            Ok(())
        }
        MintType::O => stind(ctx, MintOp::StindRef),
        MintType::I1 | MintType::U1 => stind(ctx, MintOp::StindI1),
        MintType::I2 | MintType::U2 => stind(ctx, MintOp::StindI2),
        MintType::I4 => stind(ctx, MintOp::StindI4),
        MintType::I8 | MintType::P => stind(ctx, MintOp::StindI8),
        MintType::R4 => stind(ctx, MintOp::StindR4),
        MintType::R8 => stind(ctx, MintOp::StindR8),
        MintType::Void => Err(EngineError::Transform("stobj of void".into())),
    }
}

// ========================================================================
// Boxing
// ========================================================================

fn lower_box(ctx: &mut TransformCtx<'_>, token: cilrun_cil::il::Token) -> EngineResult<()> {
    let class = ctx.meta().resolve_class(token, ctx.method.ctx)?;
    let desc = ctx.meta().class_desc(class);
    if !desc.is_valuetype {
        // Boxing a reference type is a no-op.
        return Ok(());
    }
    let item = ctx.class_item(class)?;
    let mt = TypeDesc::ValueType(class).mint_type(ctx.meta());
    if mt == MintType::Vt {
        ctx.pop()?;
        ctx.emit_op(MintOp::Box);
        ctx.emit_word(item);
    } else {
        ctx.pop()?;
        ctx.emit_op(MintOp::BoxVal);
        ctx.emit_word(item);
        ctx.emit_word(mt.code());
    }
    ctx.push_klass(StackType::O, Some(class));
    Ok(())
}

fn lower_unbox_any(ctx: &mut TransformCtx<'_>, token: cilrun_cil::il::Token) -> EngineResult<()> {
    let class = ctx.meta().resolve_class(token, ctx.method.ctx)?;
    let desc = ctx.meta().class_desc(class);
    if !desc.is_valuetype {
        let item = ctx.class_item(class)?;
        ctx.pop()?;
        ctx.emit_op(MintOp::Castclass);
        ctx.emit_word(item);
        ctx.push_klass(StackType::O, Some(class));
        return Ok(());
    }
    if desc.nullable.is_some() {
        let item = ctx.class_item(class)?;
        let size16 = ctx.operand_u16(desc.value_size, "nullable size")?;
        ctx.pop()?;
        ctx.emit_op(MintOp::UnboxAnyNullable);
        ctx.emit_word(item);
        ctx.emit_word(size16);
        ctx.push_vt(Some(class), desc.value_size);
        return Ok(());
    }
    let item = ctx.class_item(class)?;
    ctx.pop()?;
    ctx.emit_op(MintOp::Unbox);
    ctx.emit_word(item);
    let mt = TypeDesc::ValueType(class).mint_type(ctx.meta());
    match mt {
        MintType::Vt => {
            let size16 = ctx.operand_u16(desc.value_size, "value size")?;
            ctx.emit_op(MintOp::LdobjVt);
            ctx.emit_word(size16);
            ctx.push_vt(Some(class), desc.value_size);
        }
        MintType::I1 => {
            ctx.emit_op(MintOp::LdindI1);
            ctx.push(StackType::I4);
        }
        MintType::U1 => {
            ctx.emit_op(MintOp::LdindU1);
            ctx.push(StackType::I4);
        }
        MintType::I2 => {
            ctx.emit_op(MintOp::LdindI2);
            ctx.push(StackType::I4);
        }
        MintType::U2 => {
            ctx.emit_op(MintOp::LdindU2);
            ctx.push(StackType::I4);
        }
        MintType::I4 => {
            ctx.emit_op(MintOp::LdindI4);
            ctx.push(StackType::I4);
        }
        MintType::I8 => {
            ctx.emit_op(MintOp::LdindI8);
            ctx.push(StackType::I8);
        }
        MintType::R4 => {
            ctx.emit_op(MintOp::LdindR4);
            ctx.push(StackType::R8);
        }
        MintType::R8 => {
            ctx.emit_op(MintOp::LdindR8);
            ctx.push(StackType::R8);
        }
        MintType::P => {
            ctx.emit_op(MintOp::LdindI8);
            ctx.push(StackType::Mp);
        }
        MintType::O | MintType::Void => {
            return Err(EngineError::Transform("malformed unbox target".into()));
        }
    }
    Ok(())
}

// ========================================================================
// Arrays
// ========================================================================

fn elem_size(ctx: &TransformCtx<'_>, elem: ClassId) -> u32 {
    let desc = ctx.meta().class_desc(elem);
    if desc.is_valuetype {
        desc.value_size
    } else {
        crate::object::WORD
    }
}

pub(super) fn lower_ldelema(
    ctx: &mut TransformCtx<'_>,
    elem: ClassId,
    rank: u32,
) -> EngineResult<()> {
    let elem_desc = ctx.meta().class_desc(elem);
    for _ in 0..rank {
        ctx.pop()?;
    }
    ctx.pop()?;
    if rank == 1 && !elem_desc.is_valuetype && !ctx.prefix_readonly {
        let item = ctx.class_item(elem)?;
        ctx.emit_op(MintOp::LdelemaTc);
        ctx.emit_word(item);
    } else {
        let size16 = ctx.operand_u16(elem_size(ctx, elem), "element size")?;
        ctx.emit_op(MintOp::Ldelema);
        ctx.emit_word(rank as u16);
        ctx.emit_word(size16);
    }
    ctx.push_klass(StackType::Mp, Some(elem));
    Ok(())
}

fn ldelem_typed(ctx: &mut TransformCtx<'_>, op: MintOp, st: StackType) -> EngineResult<()> {
    ctx.pop()?;
    ctx.pop()?;
    ctx.emit_op(op);
    ctx.push(st);
    Ok(())
}

fn stelem_typed(ctx: &mut TransformCtx<'_>, op: MintOp) -> EngineResult<()> {
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.emit_op(op);
    Ok(())
}

fn lower_ldelem_token(ctx: &mut TransformCtx<'_>, elem: ClassId) -> EngineResult<()> {
    let ty = {
        let desc = ctx.meta().class_desc(elem);
        if desc.is_valuetype {
            TypeDesc::ValueType(elem)
        } else {
            TypeDesc::Object(elem)
        }
    };
    match ty.mint_type(ctx.meta()) {
        MintType::Vt => {
            let size = elem_size(ctx, elem);
            let size16 = ctx.operand_u16(size, "element size")?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.emit_op(MintOp::LdelemVt);
            ctx.emit_word(size16);
            ctx.push_vt(Some(elem), size);
            Ok(())
        }
        MintType::O => ldelem_typed(ctx, MintOp::LdelemRef, StackType::O),
        MintType::I1 => ldelem_typed(ctx, MintOp::LdelemI1, StackType::I4),
        MintType::U1 => ldelem_typed(ctx, MintOp::LdelemU1, StackType::I4),
        MintType::I2 => ldelem_typed(ctx, MintOp::LdelemI2, StackType::I4),
        MintType::U2 => ldelem_typed(ctx, MintOp::LdelemU2, StackType::I4),
        MintType::I4 => ldelem_typed(ctx, MintOp::LdelemI4, StackType::I4),
        MintType::I8 => ldelem_typed(ctx, MintOp::LdelemI8, StackType::I8),
        MintType::R4 => ldelem_typed(ctx, MintOp::LdelemR4, StackType::R8),
        MintType::R8 => ldelem_typed(ctx, MintOp::LdelemR8, StackType::R8),
        MintType::P => ldelem_typed(ctx, MintOp::LdelemI8, StackType::Mp),
        MintType::Void => Err(EngineError::Transform("ldelem of void".into())),
    }
}

fn lower_stelem_token(ctx: &mut TransformCtx<'_>, elem: ClassId) -> EngineResult<()> {
    let ty = {
        let desc = ctx.meta().class_desc(elem);
        if desc.is_valuetype {
            TypeDesc::ValueType(elem)
        } else {
            TypeDesc::Object(elem)
        }
    };
    match ty.mint_type(ctx.meta()) {
        MintType::Vt => {
            let size = elem_size(ctx, elem);
            let size16 = ctx.operand_u16(size, "element size")?;
            let item = ctx.class_item(elem)?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.emit_op(MintOp::StelemVt);
            ctx.emit_word(item);
            ctx.emit_word(size16);
            Ok(())
        }
        MintType::O => stelem_typed(ctx, MintOp::StelemRef),
        MintType::I1 | MintType::U1 => stelem_typed(ctx, MintOp::StelemI1),
        MintType::I2 | MintType::U2 => stelem_typed(ctx, MintOp::StelemI2),
        MintType::I4 => stelem_typed(ctx, MintOp::StelemI4),
        MintType::I8 | MintType::P => stelem_typed(ctx, MintOp::StelemI8),
        MintType::R4 => stelem_typed(ctx, MintOp::StelemR4),
        MintType::R8 => stelem_typed(ctx, MintOp::StelemR8),
        MintType::Void => Err(EngineError::Transform("stelem of void".into())),
    }
}

// ========================================================================
// Calls
// ========================================================================

fn push_call_result(
    ctx: &mut TransformCtx<'_>,
    ret: &TypeDesc,
) -> EngineResult<()> {
    match ret.mint_type(ctx.meta()) {
        MintType::Void => {}
        MintType::Vt => {
            let (size, _) = ret.size_align(ctx.meta());
            let size16 = ctx.operand_u16(size, "return value size")?;
            ctx.push_vt(ret.class_id(), size);
            ctx.emit_op(MintOp::Vtresult);
            ctx.emit_word(size16);
        }
        mt => {
            ctx.push_klass(StackType::from_mint(mt), ret.class_id());
        }
    }
    Ok(())
}

fn lower_call(
    ctx: &mut TransformCtx<'_>,
    token: cilrun_cil::il::Token,
    il_off: u32,
    virtual_call: bool,
    next_instr: Option<&Instr>,
) -> EngineResult<()> {
    let handle = ctx.meta().resolve_method(token, ctx.method.ctx)?;
    let target = ctx.engine.resolve(handle, ctx.method.ctx)?;

    if intrinsics::try_intrinsic(ctx, &target, il_off, virtual_call, next_instr)? {
        return Ok(());
    }

    let sig = target.desc.signature.clone();
    let arg_count = sig.arg_count();

    // A value-type receiver reaching its own method goes by payload
    // address.
    if sig.has_this && ctx.prefix_constrained.is_none() {
        let len = ctx.stack.len();
        let recv_index = len
            .checked_sub(arg_count)
            .ok_or_else(|| EngineError::Transform("call argument underflow".into()))?;
        if let Some(recv) = ctx.stack.get_mut(recv_index) {
            if recv.st == StackType::Vt {
                recv.st = StackType::Mp;
                recv.vt_size = 0;
            }
        }
    }

    for _ in 0..arg_count {
        ctx.pop()?;
    }

    let m_item = ctx.method_item(target.clone())?;
    if let Some(class) = ctx.prefix_constrained.take() {
        let c_item = ctx.class_item(class)?;
        ctx.emit_op(MintOp::CallvirtCtd);
        ctx.emit_word(m_item);
        ctx.emit_word(c_item);
    } else if virtual_call {
        ctx.emit_op(MintOp::Callvirt);
        ctx.emit_word(m_item);
    } else {
        let owner = ctx.meta().class_desc(target.desc.owner);
        if ctx.engine.config().prefers_jit(&owner.name) {
            ctx.emit_op(MintOp::JitCall);
        } else {
            ctx.emit_op(MintOp::Call);
        }
        ctx.emit_word(m_item);
    }

    push_call_result(ctx, &sig.ret)
}

fn lower_calli(ctx: &mut TransformCtx<'_>, token: cilrun_cil::il::Token) -> EngineResult<()> {
    let sig = ctx.meta().resolve_signature(token)?;
    ctx.pop()?; // function pointer
    for _ in 0..sig.arg_count() {
        ctx.pop()?;
    }
    let item = ctx.sig_item(sig.clone())?;
    ctx.emit_op(MintOp::Calli);
    ctx.emit_word(item);
    push_call_result(ctx, &sig.ret)
}

fn lower_newobj(ctx: &mut TransformCtx<'_>, token: cilrun_cil::il::Token) -> EngineResult<()> {
    let handle = ctx.meta().resolve_method(token, ctx.method.ctx)?;
    let target = ctx.engine.resolve(handle, ctx.method.ctx)?;
    let owner = ctx.meta().class_desc(target.desc.owner);
    let nargs = target.desc.signature.params.len();

    // The dispatcher shuffles the constructor arguments up one slot to
    // make room for the receiver; reserve that headroom.
    ctx.max_stack = ctx.max_stack.max(ctx.stack.len() as u32 + 1);

    for _ in 0..nargs {
        ctx.pop()?;
    }
    let m_item = ctx.method_item(target.clone())?;

    if owner.special == Some(SpecialClass::String) {
        ctx.emit_op(MintOp::NewobjString);
        ctx.emit_word(m_item);
        ctx.push_klass(StackType::O, Some(owner.id));
    } else if owner.is_array() {
        ctx.emit_op(MintOp::NewobjArray);
        ctx.emit_word(m_item);
        ctx.emit_word(nargs as u16);
        ctx.push_klass(StackType::O, Some(owner.id));
    } else if owner.is_valuetype {
        let size16 = ctx.operand_u16(owner.value_size, "value size")?;
        ctx.emit_op(MintOp::NewobjVt);
        ctx.emit_word(m_item);
        ctx.emit_word(size16);
        ctx.push_vt(Some(owner.id), owner.value_size);
    } else {
        ctx.emit_op(MintOp::Newobj);
        ctx.emit_word(m_item);
        ctx.push_klass(StackType::O, Some(owner.id));
    }
    Ok(())
}

// ========================================================================
// Token items for ldtoken
// ========================================================================

fn resolve_token_item(ctx: &mut TransformCtx<'_>, token: cilrun_cil::il::Token) -> EngineResult<u16> {
    if let Ok(class) = ctx.meta().resolve_class(token, ctx.method.ctx) {
        return ctx.class_item(class);
    }
    if let Ok(handle) = ctx.meta().resolve_method(token, ctx.method.ctx) {
        let target = ctx.engine.resolve(handle, ctx.method.ctx)?;
        return ctx.method_item(target);
    }
    let field = ctx.meta().resolve_field(token, ctx.method.ctx)?;
    ctx.field_item(field.id)
}


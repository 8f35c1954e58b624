//! Intrinsic call recognition
//!
//! Before lowering a call, the transformer pattern-matches the callee
//! against a small set of well-known methods and replaces the call with
//! dedicated opcodes: string accessors, array accessors, operators of the
//! platform-sized magic numeric types, and self-tail-recursion that can
//! become a back-branch to the method body.

use std::sync::Arc;

use cilrun_cil::il::Instr;

use crate::error::EngineResult;
use crate::imethod::CompiledMethod;
use crate::meta::{MintType, SpecialClass, TypeDesc};
use crate::mintops::MintOp;
use crate::object::WORD;
use crate::slot::StackType;

use super::{translate, TransformCtx};

/// Attempt to lower the call to `target` as an intrinsic. Returns true
/// when the call was fully consumed.
pub(super) fn try_intrinsic(
    ctx: &mut TransformCtx<'_>,
    target: &Arc<CompiledMethod>,
    il_off: u32,
    virtual_call: bool,
    next_instr: Option<&Instr>,
) -> EngineResult<bool> {
    // Self-tail-recursion immediately followed by `ret`: store the
    // outgoing arguments back into the argument slots and branch to the
    // body start, bypassing the prologue. Protected regions keep the
    // real call so the clause machinery stays honest.
    if !virtual_call
        && ctx.prefix_constrained.is_none()
        && Arc::ptr_eq(target, ctx.method)
        && matches!(next_instr, Some(Instr::ret))
        && !ctx.in_any_clause(il_off)
    {
        for i in (0..ctx.arg_types.len()).rev() {
            let ty = ctx.arg_types[i].clone();
            let offset = ctx.arg_offsets[i];
            translate::stvar(ctx, &ty, offset)?;
        }
        let body_start = ctx.body_start;
        ctx.emit_branch_to_mint(body_start);
        ctx.dead = true;
        return Ok(true);
    }

    let owner = ctx.meta().class_desc(target.desc.owner);
    let name: &str = &target.desc.name;

    if owner.special == Some(SpecialClass::String) {
        match name {
            "get_Length" => {
                ctx.pop()?;
                ctx.emit_op(MintOp::Strlen);
                ctx.push(StackType::I4);
                return Ok(true);
            }
            "get_Chars" => {
                ctx.pop()?;
                ctx.pop()?;
                ctx.emit_op(MintOp::Getchr);
                ctx.push(StackType::I4);
                return Ok(true);
            }
            _ => return Ok(false),
        }
    }

    if owner.special == Some(SpecialClass::Array) || owner.is_array() {
        match name {
            "get_Rank" => {
                ctx.pop()?;
                ctx.emit_op(MintOp::ArrayRank);
                ctx.push(StackType::I4);
                return Ok(true);
            }
            "get_Length" => {
                ctx.pop()?;
                ctx.emit_op(MintOp::Ldlen);
                ctx.emit_op(MintOp::ConvI4I8);
                ctx.push(StackType::I4);
                return Ok(true);
            }
            _ => {}
        }
        if owner.is_array() {
            let elem = owner.element.expect("array class has an element");
            let elem_desc = ctx.meta().class_desc(elem);
            let esize = if elem_desc.is_valuetype {
                elem_desc.value_size
            } else {
                WORD
            };
            let elem_ty = if elem_desc.is_valuetype {
                TypeDesc::ValueType(elem)
            } else {
                TypeDesc::Object(elem)
            };
            let mt = elem_ty.mint_type(ctx.meta());
            match name {
                "Address" => {
                    translate::lower_ldelema(ctx, elem, owner.rank)?;
                    return Ok(true);
                }
                "Get" => {
                    for _ in 0..owner.rank {
                        ctx.pop()?;
                    }
                    ctx.pop()?;
                    ctx.emit_op(MintOp::ArrayGet);
                    ctx.emit_word(owner.rank as u16);
                    ctx.emit_word(ctx.operand_u16(esize, "element size")?);
                    ctx.emit_word(mt.code());
                    if mt == MintType::Vt {
                        ctx.push_vt(Some(elem), esize);
                    } else {
                        ctx.push_klass(StackType::from_mint(mt), Some(elem));
                    }
                    return Ok(true);
                }
                "Set" => {
                    ctx.pop()?; // value
                    for _ in 0..owner.rank {
                        ctx.pop()?;
                    }
                    ctx.pop()?;
                    ctx.emit_op(MintOp::ArraySet);
                    ctx.emit_word(owner.rank as u16);
                    ctx.emit_word(ctx.operand_u16(esize, "element size")?);
                    ctx.emit_word(mt.code());
                    return Ok(true);
                }
                _ => {}
            }
        }
        return Ok(false);
    }

    if owner.special == Some(SpecialClass::MagicNumeric) {
        // The rewrite assumes exactly one pointer-sized field; anything
        // else falls back to the plain call.
        if owner.value_size != WORD {
            return Ok(false);
        }
        let unsigned = owner.name.contains("UInt") || owner.name.ends_with("nuint");
        return lower_magic_numeric(ctx, name, unsigned);
    }

    Ok(false)
}

fn lower_magic_numeric(
    ctx: &mut TransformCtx<'_>,
    name: &str,
    unsigned: bool,
) -> EngineResult<bool> {
    let pick = |signed: MintOp, un: MintOp| if unsigned { un } else { signed };

    let binary = |ctx: &mut TransformCtx<'_>, op: MintOp| -> EngineResult<bool> {
        ctx.pop()?;
        ctx.pop()?;
        ctx.emit_op(op);
        ctx.push(StackType::Mp);
        Ok(true)
    };
    let comparison = |ctx: &mut TransformCtx<'_>, op: MintOp, negate: bool| -> EngineResult<bool> {
        ctx.pop()?;
        ctx.pop()?;
        ctx.emit_op(op);
        if negate {
            ctx.emit_op(MintOp::LdcI4_0);
            ctx.emit_op(MintOp::CeqI4);
        }
        ctx.push(StackType::I4);
        Ok(true)
    };

    match name {
        // The constructor collapses to a plain store through the
        // receiver pointer.
        ".ctor" => {
            ctx.pop()?;
            ctx.pop()?;
            ctx.emit_op(MintOp::StindI8);
            Ok(true)
        }
        "op_Addition" => binary(ctx, MintOp::AddP),
        "op_Subtraction" => binary(ctx, MintOp::SubP),
        "op_Multiply" => binary(ctx, MintOp::MulP),
        "op_Division" => binary(ctx, pick(MintOp::DivP, MintOp::DivUnP)),
        "op_Modulus" => binary(ctx, pick(MintOp::RemP, MintOp::RemUnP)),
        "op_BitwiseAnd" => binary(ctx, MintOp::AndP),
        "op_BitwiseOr" => binary(ctx, MintOp::OrP),
        "op_ExclusiveOr" => binary(ctx, MintOp::XorP),
        "op_LeftShift" => binary(ctx, MintOp::ShlP),
        "op_RightShift" => binary(ctx, pick(MintOp::ShrP, MintOp::ShrUnP)),
        "op_UnaryNegation" => {
            ctx.pop()?;
            ctx.emit_op(MintOp::NegP);
            ctx.push(StackType::Mp);
            Ok(true)
        }
        "op_OnesComplement" => {
            ctx.pop()?;
            ctx.emit_op(MintOp::NotP);
            ctx.push(StackType::Mp);
            Ok(true)
        }
        "op_Equality" => comparison(ctx, MintOp::CeqP, false),
        "op_Inequality" => comparison(ctx, MintOp::CeqP, true),
        "op_LessThan" => comparison(ctx, pick(MintOp::CltP, MintOp::CltUnP), false),
        "op_GreaterThan" => comparison(ctx, pick(MintOp::CgtP, MintOp::CgtUnP), false),
        "op_LessThanOrEqual" => comparison(ctx, pick(MintOp::CgtP, MintOp::CgtUnP), true),
        "op_GreaterThanOrEqual" => comparison(ctx, pick(MintOp::CltP, MintOp::CltUnP), true),
        _ => Ok(false),
    }
}

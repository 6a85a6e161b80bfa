//! IR-to-IR optimization passes.
//!
//! [`optimize`] runs the passes in a fixed order, once per module:
//! constant folding → copy propagation → common-subexpression elimination →
//! loop-invariant code motion → strength reduction → dead-store elimination
//! → dead-code elimination. Every pass preserves the structural IR
//! invariants (see [`crate::ir::IrFunction::validate`]) and the pipeline is
//! a fixed point: running it twice produces the same IR as running it once.

use crate::ir::{Instr, IrFunction, IrModule, Opcode, Operand};

pub fn optimize(module: &mut IrModule) {
    constant_folding(module);
    copy_propagation(module);
    common_subexpression_elimination(module);
    loop_invariant_code_motion(module);
    strength_reduction(module);
    dead_store_elimination(module);
    dead_code_elimination(module);
}

/// Evaluates pure binary ops over two integer constants in place.
/// Division and modulo by zero are left intact so the runtime behavior
/// (and diagnostics) stay with the generated program. Floats never fold.
pub fn constant_folding(module: &mut IrModule) {
    for func in &mut module.functions {
        for instr in &mut func.instrs {
            if !instr.op.is_foldable() {
                continue;
            }
            let (Some(Operand::Const(left)), Some(Operand::Const(right))) = (&instr.src1, &instr.src2) else {
                continue;
            };
            let (left, right) = (*left, *right);

            let result = match instr.op {
                Opcode::Add => left.wrapping_add(right),
                Opcode::Sub => left.wrapping_sub(right),
                Opcode::Mul => left.wrapping_mul(right),
                Opcode::Div if right != 0 => left.wrapping_div(right),
                Opcode::Mod if right != 0 => left.wrapping_rem(right),
                Opcode::Div | Opcode::Mod => continue,
                Opcode::Eq => i64::from(left == right),
                Opcode::Ne => i64::from(left != right),
                Opcode::Lt => i64::from(left < right),
                Opcode::Le => i64::from(left <= right),
                Opcode::Gt => i64::from(left > right),
                Opcode::Ge => i64::from(left >= right),
                Opcode::And => i64::from(left != 0 && right != 0),
                Opcode::Or => i64::from(left != 0 || right != 0),
                _ => continue,
            };

            instr.make_move(Operand::Const(result));
        }
    }
}

/// Rewrites uses of `t_d` to `t_s` after a `MOVE t_d, t_s`, up to the next
/// redefinition of `t_d`.
pub fn copy_propagation(module: &mut IrModule) {
    for func in &mut module.functions {
        for i in 0..func.instrs.len() {
            let (dest, src) = {
                let instr = &func.instrs[i];
                if instr.op != Opcode::Move {
                    continue;
                }
                match (&instr.dest, &instr.src1) {
                    (Some(Operand::Temp(d)), Some(Operand::Temp(s))) => (*d, *s),
                    _ => continue,
                }
            };

            for j in i + 1..func.instrs.len() {
                let instr = &mut func.instrs[j];
                for operand in [&mut instr.src1, &mut instr.src2].into_iter().flatten() {
                    if operand.as_temp() == Some(dest) {
                        *operand = Operand::Temp(src);
                    }
                }
                for arg in &mut instr.args {
                    if arg.as_temp() == Some(dest) {
                        *arg = Operand::Temp(src);
                    }
                }
                if instr.dest.as_ref().and_then(Operand::as_temp) == Some(dest) {
                    break;
                }
            }
        }
    }
}

fn operands_match(a: Option<&Operand>, b: Option<&Operand>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}

/// Replaces a pure binary instruction with a `MOVE` from the destination of
/// an identical earlier instruction whose result is still live.
pub fn common_subexpression_elimination(module: &mut IrModule) {
    for func in &mut module.functions {
        for i in 0..func.instrs.len() {
            let current = func.instrs[i].clone();
            if !current.op.is_pure_binary() {
                continue;
            }
            if current.dest.as_ref().and_then(Operand::as_temp).is_none() {
                continue;
            }
            if current.src1.is_none() || current.src2.is_none() {
                continue;
            }

            for j in 0..i {
                let prev = &func.instrs[j];
                if prev.op != current.op {
                    continue;
                }
                let Some(prev_temp) = prev.dest.as_ref().and_then(Operand::as_temp) else {
                    continue;
                };
                if !operands_match(prev.src1.as_ref(), current.src1.as_ref())
                    || !operands_match(prev.src2.as_ref(), current.src2.as_ref())
                {
                    continue;
                }

                let redefined = func.instrs[j + 1..i]
                    .iter()
                    .any(|between| between.dest.as_ref().and_then(Operand::as_temp) == Some(prev_temp));
                if !redefined {
                    func.instrs[i].make_move(Operand::Temp(prev_temp));
                    break;
                }
            }
        }
    }
}

fn defines_temp_in_range(func: &IrFunction, temp: u32, start: usize, end: usize) -> bool {
    func.instrs[start..=end]
        .iter()
        .any(|instr| instr.dest.as_ref().and_then(Operand::as_temp) == Some(temp))
}

fn operand_invariant(func: &IrFunction, operand: Option<&Operand>, start: usize, end: usize) -> bool {
    match operand {
        None => true,
        Some(Operand::Const(_) | Operand::Float(_) | Operand::Str(_) | Operand::Label(_)) => true,
        Some(Operand::Temp(id)) => !defines_temp_in_range(func, *id, start, end),
        // Named variables may be stored to anywhere; stay conservative.
        Some(Operand::Var(_)) => false,
    }
}

/// Hoists loop-invariant pure ops to just before the loop's start label.
/// Loops are recognized by conditional branches whose target label appears
/// earlier in the instruction list.
pub fn loop_invariant_code_motion(module: &mut IrModule) {
    for func in &mut module.functions {
        let count = func.instrs.len();
        let mut hoist_to: Vec<Option<usize>> = vec![None; count];

        for i in 0..count {
            let instr = &func.instrs[i];
            if instr.op != Opcode::Branch {
                continue;
            }
            let Some(target) = instr.src2.as_ref().and_then(Operand::as_label) else {
                continue;
            };
            let target = target.to_owned();

            let loop_start = func.instrs[..i].iter().position(|candidate| {
                candidate.op == Opcode::Label
                    && candidate.src1.as_ref().and_then(Operand::as_label) == Some(target.as_str())
            });
            let Some(loop_start) = loop_start else { continue };
            let loop_end = i;

            for k in loop_start + 1..loop_end {
                if hoist_to[k].is_some() {
                    continue;
                }
                let candidate = &func.instrs[k];
                if !candidate.op.is_hoistable() {
                    continue;
                }
                if candidate.dest.as_ref().and_then(Operand::as_temp).is_none() {
                    continue;
                }
                if operand_invariant(func, candidate.src1.as_ref(), loop_start, loop_end)
                    && operand_invariant(func, candidate.src2.as_ref(), loop_start, loop_end)
                {
                    hoist_to[k] = Some(loop_start);
                }
            }
        }

        if hoist_to.iter().all(Option::is_none) {
            continue;
        }

        let old = std::mem::take(&mut func.instrs);
        let mut rebuilt = Vec::with_capacity(old.len());
        for (index, instr) in old.iter().enumerate() {
            for (hoisted, target) in old.iter().zip(&hoist_to) {
                if *target == Some(index) {
                    rebuilt.push(hoisted.clone());
                }
            }
            if hoist_to[index].is_none() {
                rebuilt.push(instr.clone());
            }
        }
        func.instrs = rebuilt;
    }
}

/// `MUL x, 0` → `MOVE 0`; `MUL x, 1` → `MOVE x`; `MUL x, 2` → `ADD x, x`.
pub fn strength_reduction(module: &mut IrModule) {
    for func in &mut module.functions {
        for instr in &mut func.instrs {
            if instr.op != Opcode::Mul || instr.dest.as_ref().and_then(Operand::as_temp).is_none() {
                continue;
            }

            let (constant, value) = match (&instr.src1, &instr.src2) {
                (Some(other), Some(Operand::Const(c))) => (*c, other.clone()),
                (Some(Operand::Const(c)), Some(other)) => (*c, other.clone()),
                _ => continue,
            };
            if value.is_const() {
                // Two constants belong to the folder.
                continue;
            }

            match constant {
                0 => instr.make_move(Operand::Const(0)),
                1 => instr.make_move(value),
                2 => {
                    if matches!(value, Operand::Temp(_) | Operand::Var(_)) {
                        instr.op = Opcode::Add;
                        instr.src1 = Some(value.clone());
                        instr.src2 = Some(value);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Window (20 instructions) within which DSE looks for a redefinition.
const DSE_WINDOW: usize = 20;

/// Turns a temporary definition into a NOP when it is redefined before any
/// use, within a forward window that does not cross a label.
pub fn dead_store_elimination(module: &mut IrModule) {
    for func in &mut module.functions {
        for i in 0..func.instrs.len() {
            let Some(dest) = func.instrs[i].dest.as_ref().and_then(Operand::as_temp) else {
                continue;
            };

            let mut used = false;
            let mut redefined = false;
            for next in func.instrs.iter().skip(i + 1).take(DSE_WINDOW) {
                if next.op == Opcode::Label {
                    break;
                }
                let uses_dest = [next.src1.as_ref(), next.src2.as_ref()]
                    .into_iter()
                    .flatten()
                    .chain(next.args.iter())
                    .any(|operand| operand.as_temp() == Some(dest));
                if uses_dest {
                    used = true;
                    break;
                }
                if next.dest.as_ref().and_then(Operand::as_temp) == Some(dest) {
                    redefined = true;
                    break;
                }
            }

            if redefined && !used {
                func.instrs[i].make_nop();
            }
        }
    }
}

/// Drops instructions after an unconditional RETURN up to the next label,
/// plus every NOP.
pub fn dead_code_elimination(module: &mut IrModule) {
    for func in &mut module.functions {
        let mut reachable = vec![true; func.instrs.len()];
        for i in 0..func.instrs.len() {
            if func.instrs[i].op == Opcode::Return {
                for j in i + 1..func.instrs.len() {
                    if func.instrs[j].op == Opcode::Label {
                        break;
                    }
                    reachable[j] = false;
                }
            }
        }

        let mut index = 0;
        func.instrs.retain(|instr| {
            let keep = reachable[index] && instr.op != Opcode::Nop;
            index += 1;
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrFunction;

    fn func_with(instrs: Vec<Instr>, temps: usize) -> IrModule {
        let mut func = IrFunction::new("f");
        func.temp_types = vec!["long".to_owned(); temps];
        func.instrs = instrs;
        IrModule {
            globals: Vec::new(),
            functions: vec![func],
        }
    }

    fn binary(op: Opcode, dest: u32, src1: Operand, src2: Operand) -> Instr {
        Instr::new(op, Some(Operand::Temp(dest)), Some(src1), Some(src2))
    }

    #[test]
    fn folds_integer_arithmetic() {
        let mut module = func_with(
            vec![binary(Opcode::Add, 0, Operand::Const(2), Operand::Const(3))],
            1,
        );
        constant_folding(&mut module);
        let instr = &module.functions[0].instrs[0];
        assert_eq!(instr.op, Opcode::Move);
        assert_eq!(instr.src1, Some(Operand::Const(5)));
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let mut module = func_with(
            vec![
                binary(Opcode::Div, 0, Operand::Const(1), Operand::Const(0)),
                binary(Opcode::Mod, 1, Operand::Const(1), Operand::Const(0)),
            ],
            2,
        );
        constant_folding(&mut module);
        assert_eq!(module.functions[0].instrs[0].op, Opcode::Div);
        assert_eq!(module.functions[0].instrs[1].op, Opcode::Mod);
    }

    #[test]
    fn copy_propagation_rewrites_until_redefinition() {
        let mut module = func_with(
            vec![
                Instr::new(Opcode::Move, Some(Operand::Temp(1)), Some(Operand::Temp(0)), None),
                binary(Opcode::Add, 2, Operand::Temp(1), Operand::Const(1)),
                Instr::new(Opcode::Move, Some(Operand::Temp(1)), Some(Operand::Const(7)), None),
                binary(Opcode::Add, 3, Operand::Temp(1), Operand::Const(1)),
            ],
            4,
        );
        copy_propagation(&mut module);
        let instrs = &module.functions[0].instrs;
        assert_eq!(instrs[1].src1, Some(Operand::Temp(0)));
        // After t1 is redefined the original temp must be used again.
        assert_eq!(instrs[3].src1, Some(Operand::Temp(1)));
    }

    #[test]
    fn cse_reuses_previous_result() {
        let mut module = func_with(
            vec![
                binary(Opcode::Add, 0, Operand::Var("a".into()), Operand::Var("b".into())),
                binary(Opcode::Add, 1, Operand::Var("a".into()), Operand::Var("b".into())),
            ],
            2,
        );
        common_subexpression_elimination(&mut module);
        let instr = &module.functions[0].instrs[1];
        assert_eq!(instr.op, Opcode::Move);
        assert_eq!(instr.src1, Some(Operand::Temp(0)));
    }

    #[test]
    fn strength_reduction_rules() {
        let mut module = func_with(
            vec![
                binary(Opcode::Mul, 0, Operand::Temp(3), Operand::Const(0)),
                binary(Opcode::Mul, 1, Operand::Temp(3), Operand::Const(1)),
                binary(Opcode::Mul, 2, Operand::Temp(3), Operand::Const(2)),
            ],
            4,
        );
        strength_reduction(&mut module);
        let instrs = &module.functions[0].instrs;
        assert_eq!((instrs[0].op, instrs[0].src1.clone()), (Opcode::Move, Some(Operand::Const(0))));
        assert_eq!((instrs[1].op, instrs[1].src1.clone()), (Opcode::Move, Some(Operand::Temp(3))));
        assert_eq!(instrs[2].op, Opcode::Add);
        assert_eq!(instrs[2].src1, Some(Operand::Temp(3)));
        assert_eq!(instrs[2].src2, Some(Operand::Temp(3)));
    }

    #[test]
    fn dead_store_requires_redefinition_before_use() {
        let mut module = func_with(
            vec![
                Instr::new(Opcode::Move, Some(Operand::Temp(0)), Some(Operand::Const(1)), None),
                Instr::new(Opcode::Move, Some(Operand::Temp(0)), Some(Operand::Const(2)), None),
                binary(Opcode::Add, 1, Operand::Temp(0), Operand::Const(1)),
            ],
            2,
        );
        dead_store_elimination(&mut module);
        assert_eq!(module.functions[0].instrs[0].op, Opcode::Nop);
        assert_eq!(module.functions[0].instrs[1].op, Opcode::Move);
    }

    #[test]
    fn dead_store_stops_at_labels() {
        let mut module = func_with(
            vec![
                Instr::new(Opcode::Move, Some(Operand::Temp(0)), Some(Operand::Const(1)), None),
                Instr::label("L0"),
                Instr::new(Opcode::Move, Some(Operand::Temp(0)), Some(Operand::Const(2)), None),
            ],
            1,
        );
        dead_store_elimination(&mut module);
        assert_eq!(module.functions[0].instrs[0].op, Opcode::Move);
    }

    #[test]
    fn dce_drops_code_after_return_until_label() {
        let mut module = func_with(
            vec![
                Instr::new(Opcode::Return, None, Some(Operand::Const(0)), None),
                binary(Opcode::Add, 0, Operand::Const(1), Operand::Const(2)),
                Instr::label("L0"),
                Instr::new(Opcode::Return, None, Some(Operand::Const(1)), None),
            ],
            1,
        );
        dead_code_elimination(&mut module);
        let instrs = &module.functions[0].instrs;
        assert_eq!(instrs.len(), 3);
        assert_eq!(instrs[1].op, Opcode::Label);
    }

    #[test]
    fn licm_hoists_invariant_ops_before_loop() {
        // L0: t0 = 1 + 2; BRANCH t1 -> L0 (a backward conditional branch).
        let mut module = func_with(
            vec![
                Instr::label("L0"),
                binary(Opcode::Add, 0, Operand::Const(1), Operand::Const(2)),
                Instr::new(Opcode::Branch, None, Some(Operand::Temp(1)), Some(Operand::Label("L0".into()))),
            ],
            2,
        );
        loop_invariant_code_motion(&mut module);
        let instrs = &module.functions[0].instrs;
        assert_eq!(instrs[0].op, Opcode::Add);
        assert_eq!(instrs[1].op, Opcode::Label);
        assert!(module.functions[0].validate().is_ok());
    }

    #[test]
    fn optimizer_is_idempotent() {
        let mut module = func_with(
            vec![
                binary(Opcode::Add, 0, Operand::Const(2), Operand::Const(3)),
                Instr::new(Opcode::Move, Some(Operand::Temp(1)), Some(Operand::Temp(0)), None),
                binary(Opcode::Mul, 2, Operand::Temp(1), Operand::Const(2)),
                Instr::new(Opcode::Return, None, Some(Operand::Temp(2)), None),
                binary(Opcode::Add, 3, Operand::Const(1), Operand::Const(1)),
            ],
            4,
        );
        optimize(&mut module);
        let once = module.clone();
        optimize(&mut module);
        assert_eq!(module, once);
        assert!(module.functions[0].validate().is_ok());
    }
}

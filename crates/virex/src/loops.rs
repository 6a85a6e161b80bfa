//! Loop-pattern recognition over the linear IR.
//!
//! [`detect_simple_loop`] recognizes the counting-loop shape the IR
//! generator produces:
//!
//! ```text
//! STORE var, init          (immediately before the loop label)
//! LABEL L
//! CMP   t, var, limit
//! BRANCH t -> L_body
//! JUMP  L_end
//! ...
//! ADD   var, var, step     (closest to the back jump)
//! JUMP  L
//! ```
//!
//! The emitter rewrites recognized loops into `for` statements with
//! vectorization hints. Detection never crosses a function boundary, and
//! every piece (init, comparison, increment) must reference the same loop
//! variable or the caller falls back to the raw label/goto sequence.

use crate::ir::{IrFunction, Opcode, Operand};

/// A recognized counting loop. Indices point into the function's
/// instruction list.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopInfo {
    /// Index of the loop-start `LABEL`.
    pub start: usize,
    /// Index of the backward `JUMP` that closes the loop.
    pub end: usize,
    /// Index of the body `LABEL` the branch targets.
    pub body_start: usize,
    /// Index of the increment instruction.
    pub step_index: usize,
    pub loop_var: Operand,
    pub init: Operand,
    pub limit: Operand,
    pub step: Operand,
    pub cmp: Opcode,
}

/// Bounded lookahead for the back jump, matching a small window so a
/// pathological function does not turn detection quadratic.
const MAX_LOOP_SCAN: usize = 100;

fn same_variable(a: &Operand, b: &Operand) -> bool {
    match (a, b) {
        (Operand::Var(x), Operand::Var(y)) => x == y,
        (Operand::Temp(x), Operand::Temp(y)) => x == y,
        _ => false,
    }
}

/// Tries to recognize a simple counting loop starting at `start`.
pub fn detect_simple_loop(func: &IrFunction, start: usize) -> Option<LoopInfo> {
    let instrs = &func.instrs;

    let label = instrs.get(start)?;
    if label.op != Opcode::Label {
        return None;
    }
    let loop_label = label.src1.as_ref()?.as_label()?.to_owned();

    let cmp = instrs.get(start + 1)?;
    if !matches!(cmp.op, Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge) {
        return None;
    }
    let loop_var = cmp.src1.clone()?;
    let limit = cmp.src2.clone()?;

    let branch = instrs.get(start + 2)?;
    if branch.op != Opcode::Branch {
        return None;
    }
    let body_label = branch.src2.as_ref()?.as_label()?.to_owned();

    // Backward jump closing the loop.
    let mut end = None;
    for (offset, instr) in instrs.iter().enumerate().skip(start + 3).take(MAX_LOOP_SCAN) {
        if instr.op == Opcode::Jump
            && instr.src1.as_ref().and_then(Operand::as_label) == Some(loop_label.as_str())
        {
            end = Some(offset);
            break;
        }
    }
    let end = end?;

    // The body label must live inside the loop range.
    let body_start = instrs[start..end].iter().position(|instr| {
        instr.op == Opcode::Label && instr.src1.as_ref().and_then(Operand::as_label) == Some(body_label.as_str())
    })? + start;

    // Increment closest to the back jump: either `ADD var, var, step`
    // directly, or the generated `ADD t, var, step; STORE var, t` pair.
    let mut step_found = None;
    for k in (start + 1..end).rev() {
        let instr = &instrs[k];

        if instr.op == Opcode::Add
            && let Some(dest) = &instr.dest
            && same_variable(dest, &loop_var)
        {
            let (src1, src2) = (instr.src1.as_ref()?, instr.src2.as_ref()?);
            let step = if same_variable(src1, &loop_var) {
                src2.clone()
            } else {
                src1.clone()
            };
            step_found = Some((k, step));
            break;
        }

        if instr.op == Opcode::Store
            && let Some(target) = &instr.src1
            && same_variable(target, &loop_var)
            && let Some(Operand::Temp(temp)) = &instr.src2
        {
            // Walk back to the ADD producing the stored temporary.
            for j in (start + 1..k).rev() {
                let add = &instrs[j];
                if add.dest.as_ref().and_then(Operand::as_temp) != Some(*temp) {
                    continue;
                }
                if add.op != Opcode::Add {
                    break;
                }
                let (src1, src2) = (add.src1.as_ref()?, add.src2.as_ref()?);
                let step = if same_variable(src1, &loop_var) {
                    src2.clone()
                } else if same_variable(src2, &loop_var) {
                    src1.clone()
                } else {
                    break;
                };
                step_found = Some((j, step));
                break;
            }
            if step_found.is_some() {
                break;
            }
        }
    }
    let (step_index, step) = step_found?;

    // Init: the assignment immediately preceding the loop label must
    // initialize the loop variable.
    let init_instr = instrs.get(start.checked_sub(1)?)?;
    let init = match init_instr.op {
        Opcode::Store => {
            let target = init_instr.src1.as_ref()?;
            if !same_variable(target, &loop_var) {
                return None;
            }
            init_instr.src2.clone()?
        }
        Opcode::Move => {
            let target = init_instr.dest.as_ref()?;
            if !same_variable(target, &loop_var) {
                return None;
            }
            init_instr.src1.clone()?
        }
        _ => return None,
    };

    Some(LoopInfo {
        start,
        end,
        body_start,
        step_index,
        loop_var,
        init,
        limit,
        step,
        cmp: cmp.op,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Instr;

    fn counting_loop() -> IrFunction {
        let mut func = IrFunction::new("f");
        func.temp_types = vec!["int".to_owned()];
        let i = || Operand::Var("i_v0".to_owned());
        func.instrs = vec![
            Instr::new(Opcode::Store, None, Some(i()), Some(Operand::Const(0))),
            Instr::label("L0"),
            Instr::new(Opcode::Lt, Some(Operand::Temp(0)), Some(i()), Some(Operand::Const(100))),
            Instr::branch(Operand::Temp(0), "L1"),
            Instr::jump("L2"),
            Instr::label("L1"),
            Instr::new(Opcode::Add, Some(i()), Some(i()), Some(Operand::Const(1))),
            Instr::jump("L0"),
            Instr::label("L2"),
        ];
        func
    }

    #[test]
    fn recognizes_counting_loop() {
        let func = counting_loop();
        let info = detect_simple_loop(&func, 1).expect("loop should be recognized");
        assert_eq!(info.start, 1);
        assert_eq!(info.end, 7);
        assert_eq!(info.body_start, 5);
        assert_eq!(info.cmp, Opcode::Lt);
        assert_eq!(info.init, Operand::Const(0));
        assert_eq!(info.limit, Operand::Const(100));
        assert_eq!(info.step, Operand::Const(1));
    }

    #[test]
    fn rejects_without_init_of_same_variable() {
        let mut func = counting_loop();
        // Initialize a different variable before the label.
        func.instrs[0] =
            Instr::new(Opcode::Store, None, Some(Operand::Var("j_v1".into())), Some(Operand::Const(0)));
        assert!(detect_simple_loop(&func, 1).is_none());
    }

    #[test]
    fn rejects_without_increment() {
        let mut func = counting_loop();
        func.instrs[6] = Instr::new(
            Opcode::Add,
            Some(Operand::Var("other".into())),
            Some(Operand::Var("other".into())),
            Some(Operand::Const(1)),
        );
        assert!(detect_simple_loop(&func, 1).is_none());
    }

    #[test]
    fn temp_then_store_increment_is_recognized() {
        // The generator's shape for `i = i + 1`: ADD t1, i, 1; STORE i, t1.
        let mut func = counting_loop();
        func.temp_types.push("int32_t".to_owned());
        let i = || Operand::Var("i_v0".to_owned());
        func.instrs.splice(
            6..7,
            [
                Instr::new(Opcode::Add, Some(Operand::Temp(1)), Some(i()), Some(Operand::Const(1))),
                Instr::new(Opcode::Store, None, Some(i()), Some(Operand::Temp(1))),
            ],
        );
        let info = detect_simple_loop(&func, 1).expect("store-form increment should be recognized");
        assert_eq!(info.step, Operand::Const(1));
        assert_eq!(info.step_index, 6);
        assert_eq!(info.end, 8);
    }

    #[test]
    fn commuted_increment_is_recognized() {
        let mut func = counting_loop();
        func.instrs[6] = Instr::new(
            Opcode::Add,
            Some(Operand::Var("i_v0".into())),
            Some(Operand::Const(1)),
            Some(Operand::Var("i_v0".into())),
        );
        let info = detect_simple_loop(&func, 1).expect("commuted form should be recognized");
        assert_eq!(info.step, Operand::Const(1));
    }

    #[test]
    fn non_label_start_is_rejected() {
        let func = counting_loop();
        assert!(detect_simple_loop(&func, 0).is_none());
        assert!(detect_simple_loop(&func, 2).is_none());
    }
}

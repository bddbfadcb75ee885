use crate::bytecode::{Flag, FuncProto, Instr, Module, Opcode};
use std::collections::HashMap;
use std::fmt::Write;

/// Print disassembly of a whole module
pub fn print_module(module: &Module) {
    print!("{}", disassemble(module));
}

/// Return disassembly of a whole module as a String
pub fn disassemble(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== MODULE {} ===\n", module.name);
    for (i, proto) in module.protos.iter().enumerate() {
        out.push_str(&disassemble_proto(module, i, proto));
        out.push('\n');
    }
    out
}

/// Header, constant table and code of one prototype
pub fn disassemble_proto(module: &Module, index: usize, proto: &FuncProto) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(out, " [{}] {}", index, proto.name);
    if proto.is_native {
        let _ = writeln!(out, " native");
        let _ = writeln!(out, "════════════════════════════════════════");
        return out;
    }
    let _ = writeln!(
        out,
        " args {}  stack {}  {} instructions",
        proto.exp_args,
        proto.stack_size,
        proto.code.len()
    );
    if !proto.debug.file.is_empty() {
        let _ = writeln!(
            out,
            " {}:{}-{}",
            proto.debug.file, proto.debug.line_start, proto.debug.line_end
        );
    }
    let _ = writeln!(out, "════════════════════════════════════════");

    if !proto.constants.is_empty() {
        let _ = writeln!(out, " constants:");
        for (i, k) in proto.constants.iter().enumerate() {
            let _ = writeln!(out, "   k{:<3} {:?}", i, k.to_value());
        }
    }
    if !proto.locals.is_empty() {
        let _ = writeln!(out, " locals: {}", proto.locals.join(", "));
    }

    let jump_targets = collect_jump_targets(&proto.code);
    for (ip, instr) in proto.code.iter().enumerate() {
        if jump_targets.contains(&ip) {
            let _ = writeln!(out, "      ┌──────────────────────────────────");
        }
        let marker = if jump_targets.contains(&ip) { "► " } else { "  " };
        let _ = writeln!(
            out,
            "{:04} {}{}{}",
            ip,
            marker,
            instr,
            describe_operand(module, proto, ip, instr)
        );
    }
    out
}

/// Absolute target of a jump at `ip`, `None` for other instructions or
/// targets before the start.
pub fn jump_target(ip: usize, instr: &Instr) -> Option<usize> {
    let ix = usize::try_from(instr.index).ok()?;
    match (instr.op, instr.flag) {
        (Opcode::Test, _) | (Opcode::Jmp, Flag::Jf) => (ip + 1).checked_add(ix),
        (Opcode::Jmp, Flag::Jb) => ip.checked_sub(ix),
        _ => None,
    }
}

fn collect_jump_targets(code: &[Instr]) -> Vec<usize> {
    let mut targets = Vec::new();
    for (ip, instr) in code.iter().enumerate() {
        if let Some(target) = jump_target(ip, instr) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }
    targets
}

/// Trailing `; ...` comment naming what an instruction's operand refers to.
/// Empty when there is nothing to add.
pub fn describe_operand(module: &Module, proto: &FuncProto, ip: usize, instr: &Instr) -> String {
    let constant = |ix: u64| {
        usize::try_from(ix)
            .ok()
            .and_then(|i| proto.constants.get(i))
    };
    match (instr.op, instr.flag) {
        (Opcode::Push, Flag::K) => match constant(instr.index) {
            Some(k) => format!(" ; {:?}", k.to_value()),
            None => " ; <no constant>".to_string(),
        },
        (Opcode::Push, Flag::V) | (Opcode::Pop, _) => match constant(instr.index) {
            Some(k) => format!(" ; var {}", k),
            None => " ; <no constant>".to_string(),
        },
        (Opcode::Push, Flag::N) => " ; nil".to_string(),
        (Opcode::Push, Flag::T) => " ; [this]".to_string(),
        (Opcode::Push, Flag::A) => " ; [args]".to_string(),
        (Opcode::Push, Flag::F) => {
            let name = usize::try_from(instr.index)
                .ok()
                .and_then(|i| module.protos.get(i))
                .map(|p| p.name.as_str())
                .unwrap_or("<no function>");
            format!(" ; [func {}]", name)
        }
        (Opcode::Test, _) | (Opcode::Jmp, _) => match jump_target(ip, instr) {
            Some(target) if instr.flag == Flag::Jb => format!(" ; ↑ {:04}", target),
            Some(target) => format!(" ; ↓ {:04}", target),
            None => " ; <bad jump>".to_string(),
        },
        _ => String::new(),
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Instruction counts of a module, most frequent first
pub fn module_stats(module: &Module) -> String {
    let mut out = String::new();
    let total: usize = module.protos.iter().map(|p| p.code.len()).sum();
    let natives = module.protos.iter().filter(|p| p.is_native).count();

    let _ = writeln!(out, "=== BYTECODE STATISTICS ===\n");
    let _ = writeln!(out, "Functions:        {}", module.protos.len());
    let _ = writeln!(out, "  native:         {}", natives);
    let _ = writeln!(out, "Instructions:     {}", total);
    let _ = writeln!(out);

    let mut op_counts: HashMap<Opcode, usize> = HashMap::new();
    for proto in &module.protos {
        count_ops(&proto.code, &mut op_counts);
    }

    let _ = writeln!(out, "Op frequency:");
    let mut counts: Vec<_> = op_counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.mnemonic().cmp(b.0.mnemonic())));
    for (op, count) in counts.iter().take(10) {
        let pct = (*count as f64 / total as f64) * 100.0;
        let _ = writeln!(out, "  {:<14} {:>4} ({:>5.1}%)", op, count, pct);
    }
    out
}

fn count_ops(code: &[Instr], counts: &mut HashMap<Opcode, usize>) {
    for instr in code {
        *counts.entry(instr.op).or_insert(0) += 1;
    }
}
